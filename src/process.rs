use std::ffi::OsStr;
use std::path::Path;
use std::process::{ExitStatus, Output, Stdio};

use tracing::trace;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The command fundamentally failed to execute (usually means it didn't exist).
    #[error("running `{summary}` failed")]
    Exec {
        /// Summary of what the command was trying to do.
        summary: String,
        #[source]
        cause: std::io::Error,
    },
    #[error("`{summary}` exited with {status}")]
    Status { summary: String, status: ExitStatus },
}

/// A [`tokio::process::Command`] with a human summary and trace logging.
pub struct Cmd {
    inner: tokio::process::Command,
    summary: String,
    check_status: bool,
}

impl Cmd {
    /// Create a new command with a "summary" of what it is trying to do.
    pub fn new(command: impl AsRef<OsStr>, summary: impl Into<String>) -> Self {
        let inner = tokio::process::Command::new(command);
        Self {
            summary: summary.into(),
            inner,
            check_status: true,
        }
    }

    /// Set whether a non-zero exit status should be turned into an error.
    ///
    /// Defaults to `true`.
    pub fn check(&mut self, checked: bool) -> &mut Self {
        self.check_status = checked;
        self
    }

    pub fn arg<S: AsRef<OsStr>>(&mut self, arg: S) -> &mut Self {
        self.inner.arg(arg);
        self
    }

    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.inner.args(args);
        self
    }

    pub fn env<K, V>(&mut self, key: K, val: V) -> &mut Self
    where
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        self.inner.env(key, val);
        self
    }

    pub fn current_dir<P: AsRef<Path>>(&mut self, dir: P) -> &mut Self {
        self.inner.current_dir(dir);
        self
    }

    /// Equivalent to [`std::process::Command::output`], but logged, with the
    /// error wrapped, and the status checked (by default).
    pub async fn output(&mut self) -> Result<Output> {
        self.log_command();
        self.inner.stdin(Stdio::null());
        let output = self.inner.output().await.map_err(|cause| Error::Exec {
            summary: self.summary.clone(),
            cause,
        })?;
        if self.check_status && !output.status.success() {
            return Err(Error::Status {
                summary: self.summary.clone(),
                status: output.status,
            });
        }
        Ok(output)
    }

    fn log_command(&self) {
        trace!(
            summary = %self.summary,
            command = ?self.inner.as_std(),
            "Running command",
        );
    }
}
