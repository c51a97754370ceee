use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::version::Version;

/// Extracts the `go<version>` segment from an activation target path.
static ACTIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"go(\d+\.\d+(?:\.\d+)?[a-zA-Z0-9]*)").unwrap());

/// The version a link resolves to, with its on-disk target.
#[derive(Debug, Clone)]
pub struct ActiveLink {
    pub version: Version,
    pub target: PathBuf,
}

/// Point `link` at `target`, replacing any previous link atomically.
///
/// A uniquely named sibling link is created first and renamed over `link`;
/// renaming a symlink is atomic on every supported filesystem, so readers
/// always observe either the old or the new target.
pub fn activate(target: &Path, link: &Path) -> Result<()> {
    let dir = link
        .parent()
        .ok_or_else(|| Error::Other(format!("`{}` has no parent", link.display())))?;
    fs_err::create_dir_all(dir)?;

    let name = link
        .file_name()
        .ok_or_else(|| Error::Other(format!("`{}` has no file name", link.display())))?
        .to_string_lossy()
        .into_owned();

    let mut staged = None;
    for n in 0..64 {
        let candidate = dir.join(format!(".{name}.{}.{n}", std::process::id()));
        match make_link(target, &candidate) {
            Ok(()) => {
                staged = Some(candidate);
                break;
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(err) => return Err(err.into()),
        }
    }
    let staged = staged.ok_or_else(|| {
        Error::Other(format!("could not stage a temporary link in `{}`", dir.display()))
    })?;

    if let Err(err) = fs_err::rename(&staged, link) {
        let _ = fs_err::remove_file(&staged);
        return Err(err.into());
    }

    debug!(link = %link.display(), target = %target.display(), "Activated toolchain");
    Ok(())
}

#[cfg(unix)]
fn make_link(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

/// Windows symlinks need Developer Mode; degrade to a hard link, then to a
/// copy, recording the origin so the active version stays readable.
#[cfg(windows)]
fn make_link(target: &Path, link: &Path) -> std::io::Result<()> {
    if std::os::windows::fs::symlink_file(target, link).is_ok() {
        return Ok(());
    }
    let result = fs_err::hard_link(target, link).or_else(|_| fs_err::copy(target, link).map(|_| ()));
    if result.is_ok() {
        let origin = link.with_extension("origin");
        let _ = fs_err::write(origin, target.to_string_lossy().as_bytes());
    }
    result
}

/// Read the version `link` points at.
///
/// Returns `Ok(None)` when no link exists. A link whose target is missing, or
/// whose path carries no recognizable `go<version>` segment, is
/// [`Error::ActiveUnhealthy`].
pub fn read_active(link: &Path) -> Result<Option<ActiveLink>> {
    let target = match fs_err::read_link(link) {
        Ok(target) => target,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(_) => match read_origin(link) {
            Some(target) => target,
            None => return Ok(None),
        },
    };

    if !target.is_file() {
        return Err(Error::ActiveUnhealthy { target });
    }

    let rendered = target.to_string_lossy();
    let version = ACTIVE_RE
        .captures_iter(&rendered)
        .filter_map(|captures| captures.get(1))
        .filter_map(|segment| segment.as_str().parse::<Version>().ok())
        .last();

    match version {
        Some(version) => {
            trace!(link = %link.display(), %version, "Resolved active toolchain");
            Ok(Some(ActiveLink { version, target }))
        }
        None => Err(Error::ActiveUnhealthy { target }),
    }
}

/// The fallback origin marker written by the Windows copy path.
fn read_origin(link: &Path) -> Option<PathBuf> {
    if !link.exists() {
        return None;
    }
    let origin = link.with_extension("origin");
    let contents = fs_err::read_to_string(origin).ok()?;
    Some(PathBuf::from(contents.trim()))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sdk(dir: &Path, version: &str) -> PathBuf {
        let bin = dir.join(format!("go{version}")).join("bin");
        fs_err::create_dir_all(&bin).unwrap();
        let go = bin.join("go");
        fs_err::write(&go, "#!/bin/sh\n").unwrap();
        go
    }

    #[test]
    fn activate_then_read_round_trips() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let go = sdk(dir.path(), "1.24.3");
        let link = dir.path().join("bin").join("go");

        activate(&go, &link)?;
        let active = read_active(&link)?.expect("the link must exist");
        assert_eq!(active.version.to_string(), "1.24.3");
        assert_eq!(active.target, go);
        Ok(())
    }

    #[test]
    fn activate_replaces_existing_link() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let old = sdk(dir.path(), "1.24.3");
        let new = sdk(dir.path(), "1.25.1");
        let link = dir.path().join("bin").join("go");

        activate(&old, &link)?;
        activate(&new, &link)?;

        let active = read_active(&link)?.expect("the link must exist");
        assert_eq!(active.version.to_string(), "1.25.1");
        // No staging debris is left behind.
        let leftovers: Vec<_> = fs_err::read_dir(dir.path().join("bin"))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with('.'))
            .collect();
        assert!(leftovers.is_empty());
        Ok(())
    }

    #[test]
    fn missing_link_reads_as_none() -> Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(read_active(&dir.path().join("go"))?.is_none());
        Ok(())
    }

    #[test]
    fn dangling_link_is_unhealthy() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let go = sdk(dir.path(), "1.24.3");
        let link = dir.path().join("bin").join("go");

        activate(&go, &link)?;
        fs_err::remove_dir_all(dir.path().join("go1.24.3"))?;

        assert!(matches!(
            read_active(&link),
            Err(Error::ActiveUnhealthy { .. })
        ));
        Ok(())
    }
}
