use std::path::{Path, PathBuf};

use tracing::trace;

use crate::error::{Error, Result};
use crate::fs::write_atomic;
use crate::version::{Version, VersionSpec};

/// A project pin: the raw file contents plus the parsed request.
///
/// The raw value is kept for diagnostics; resolution always goes through the
/// parsed spec.
#[derive(Debug, Clone)]
pub struct Pin {
    pub file: PathBuf,
    pub raw: String,
    pub spec: VersionSpec,
}

impl Pin {
    /// The best installed match for this pin.
    ///
    /// A pin that matches nothing is a diagnostic error naming both the
    /// requested value and the command that fixes it; it never silently falls
    /// through to the default version.
    pub fn resolve(&self, installed: &[Version]) -> Result<Version> {
        self.spec
            .best_match(installed)
            .ok_or_else(|| Error::PinUnresolvable {
                raw: self.raw.clone(),
                file: self.file.clone(),
            })
    }
}

/// Find the nearest pin file, walking from `start` toward the filesystem root.
pub fn find_pin(start: &Path, project_file: &str) -> Result<Option<Pin>> {
    for dir in start.ancestors() {
        let candidate = dir.join(project_file);
        if candidate.is_file() {
            trace!(path = %candidate.display(), "Found project pin");
            return read_pin(&candidate).map(Some);
        }
    }
    Ok(None)
}

/// Every pin reachable from `start` on the way to the root.
///
/// Used by prune to protect versions that any ancestor project still names.
pub fn all_pins(start: &Path, project_file: &str) -> Vec<Pin> {
    start
        .ancestors()
        .map(|dir| dir.join(project_file))
        .filter(|candidate| candidate.is_file())
        .filter_map(|candidate| read_pin(&candidate).ok())
        .collect()
}

/// Read and strictly parse a pin file.
pub fn read_pin(file: &Path) -> Result<Pin> {
    let raw = fs_err::read_to_string(file)?.trim().to_string();

    let spec = match raw.parse::<VersionSpec>() {
        // A pin names a version or a line; aliases and wildcards make the
        // project build non-reproducible and are rejected.
        Ok(spec @ (VersionSpec::Exact(_) | VersionSpec::Partial { .. })) => spec,
        _ => {
            return Err(Error::PinMalformed {
                file: file.to_path_buf(),
                raw,
            })
        }
    };

    Ok(Pin {
        file: file.to_path_buf(),
        raw,
        spec,
    })
}

/// Write `spec` as the project pin in `dir`.
pub fn write_pin(dir: &Path, project_file: &str, spec: &VersionSpec) -> Result<PathBuf> {
    let path = dir.join(project_file);
    write_atomic(&path, format!("{spec}\n"))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PROJECT_FILE;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn walk_up_finds_the_nearest_pin() -> Result<()> {
        let root = tempfile::tempdir()?;
        let nested = root.path().join("a").join("b").join("c");
        fs_err::create_dir_all(&nested)?;
        fs_err::write(root.path().join(PROJECT_FILE), "1.24\n")?;
        fs_err::write(root.path().join("a").join(PROJECT_FILE), "1.25.1\n")?;

        let pin = find_pin(&nested, PROJECT_FILE)?.expect("a pin must be found");
        assert_eq!(pin.raw, "1.25.1");
        assert_eq!(pin.file, root.path().join("a").join(PROJECT_FILE));
        Ok(())
    }

    #[test]
    fn no_pin_yields_none() -> Result<()> {
        let root = tempfile::tempdir()?;
        assert!(find_pin(root.path(), PROJECT_FILE)?.is_none());
        Ok(())
    }

    #[test]
    fn trailing_whitespace_is_trimmed() -> Result<()> {
        let root = tempfile::tempdir()?;
        let file = root.path().join(PROJECT_FILE);
        fs_err::write(&file, "  1.24.3 \n\n")?;

        let pin = read_pin(&file)?;
        assert_eq!(pin.raw, "1.24.3");
        assert_eq!(pin.spec, VersionSpec::Exact(v("1.24.3")));
        Ok(())
    }

    #[test]
    fn malformed_pin_is_a_precise_error() -> Result<()> {
        let root = tempfile::tempdir()?;
        let file = root.path().join(PROJECT_FILE);

        for raw in ["not-a-version", "latest", "1.24.*", ""] {
            fs_err::write(&file, raw)?;
            match read_pin(&file) {
                Err(Error::PinMalformed { file: reported, raw: kept }) => {
                    assert_eq!(reported, file);
                    assert_eq!(kept, raw.trim());
                }
                other => panic!("`{raw}` should be malformed, got {other:?}"),
            }
        }
        Ok(())
    }

    #[test]
    fn partial_pin_resolves_to_highest_installed_patch() -> Result<()> {
        let root = tempfile::tempdir()?;
        let file = root.path().join(PROJECT_FILE);
        fs_err::write(&file, "1.25\n")?;

        let pin = read_pin(&file)?;
        let installed = ["1.25.1", "1.25.9", "1.26.0"].map(|s| v(s));
        assert_eq!(pin.resolve(&installed)?, v("1.25.9"));
        Ok(())
    }

    #[test]
    fn unresolvable_pin_names_the_fix() -> Result<()> {
        let root = tempfile::tempdir()?;
        let file = root.path().join(PROJECT_FILE);
        fs_err::write(&file, "1.30\n")?;

        let pin = read_pin(&file)?;
        let err = pin.resolve(&[v("1.25.1")]).unwrap_err();
        assert!(matches!(err, Error::PinUnresolvable { .. }));
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("govman install 1.30"));
        Ok(())
    }

    #[test]
    fn write_then_read_round_trips() -> Result<()> {
        let root = tempfile::tempdir()?;
        let spec: VersionSpec = "1.25".parse().unwrap();

        let path = write_pin(root.path(), PROJECT_FILE, &spec)?;
        let pin = read_pin(&path)?;
        assert_eq!(pin.spec, spec);
        assert_eq!(pin.raw, "1.25");
        Ok(())
    }
}
