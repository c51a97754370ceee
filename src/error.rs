use std::path::PathBuf;

use crate::version::{InvalidVersion, Version};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Error categories observable by callers.
///
/// Components fail with the variant that names their condition; the CLI
/// adapter maps the outermost recognizable variant to an exit code.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config file `{path}` is malformed")]
    ConfigMalformed {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("failed to persist config file `{path}`")]
    ConfigPersistFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("version `{0}` not found in the release catalog")]
    VersionNotFound(String),

    #[error("no installed version matches `{0}`")]
    NotInstalled(String),

    #[error("go{0} is already installed")]
    AlreadyInstalled(Version),

    #[error("go{version} has no binary archive for {os}/{arch}")]
    PlatformUnsupported {
        version: Version,
        os: &'static str,
        arch: &'static str,
    },

    #[error("downloading `{url}` failed after {attempts} attempt(s)")]
    NetworkExhausted {
        url: String,
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("server rejected download of `{url}` with HTTP {status}")]
    DownloadRejected { url: String, status: u16 },

    #[error(
        "checksum mismatch for `{path}`: expected {expected}, got {actual}; \
         the corrupt file was removed, re-run to download again"
    )]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("archive entry `{entry}` would escape the extraction directory")]
    ArchiveUnsafe { entry: String },

    #[error("unsupported archive type: `{0}`")]
    UnsupportedArchive(PathBuf),

    #[error("the archive did not contain a single top-level directory")]
    MalformedSdkArchive,

    #[error("cannot uninstall go{0}: it is the currently active version")]
    ActiveVersionProtected(Version),

    #[error(
        "the active toolchain link points at `{target}`, which is missing or incomplete; \
         run `govman use <version> --default` to repair it"
    )]
    ActiveUnhealthy { target: PathBuf },

    #[error(
        "project pin `{raw}` from `{file}` matches no installed version; \
         run `govman install {raw}` to install it"
    )]
    PinUnresolvable { raw: String, file: PathBuf },

    #[error(
        "project pin file `{file}` is malformed: `{raw}` \
         (expected a version like `1.24` or `1.24.3`)"
    )]
    PinMalformed { file: PathBuf, raw: String },

    #[error("no active Go version; run `govman use <version> --default` to set one")]
    NoActiveVersion,

    #[error("could not detect the current shell; pass one explicitly")]
    ShellUnknown,

    #[error("interrupted")]
    Interrupted,

    #[error(transparent)]
    InvalidVersion(#[from] InvalidVersion),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// The process exit code this error maps to.
    ///
    /// 1 general, 2 usage (handled by clap), 3 version not found/not
    /// installed, 4 download/network, 5 checksum, 6 permission.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::VersionNotFound(_) | Error::NotInstalled(_) | Error::PinUnresolvable { .. } => {
                3
            }
            Error::NetworkExhausted { .. } | Error::DownloadRejected { .. } | Error::Http(_) => 4,
            Error::ChecksumMismatch { .. } => 5,
            Error::Io(err) if err.kind() == std::io::ErrorKind::PermissionDenied => 6,
            Error::ConfigPersistFailed { source, .. }
                if source.kind() == std::io::ErrorKind::PermissionDenied =>
            {
                6
            }
            _ => 1,
        }
    }
}
