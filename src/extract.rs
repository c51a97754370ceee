use std::path::{Component, Path, PathBuf};

use async_compression::tokio::bufread::GzipDecoder;
use async_zip::base::read::stream::ZipFileReader;
use futures::StreamExt;
use tokio::io::BufReader;
use tokio_util::compat::FuturesAsyncReadCompatExt;
use tracing::{debug, trace};

use crate::cleanup;
use crate::error::{Error, Result};

const DEFAULT_BUF_SIZE: usize = 128 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveExtension {
    TarGz,
    Zip,
}

impl ArchiveExtension {
    /// Sniff the archive format from a file name.
    ///
    /// Go publishes `.tar.gz` for POSIX platforms and `.zip` for Windows.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        fn is_tar(path: &Path) -> bool {
            path.file_stem().is_some_and(|stem| {
                Path::new(stem)
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("tar"))
            })
        }

        let Some(extension) = path.as_ref().extension().and_then(|ext| ext.to_str()) else {
            return Err(Error::UnsupportedArchive(path.as_ref().to_path_buf()));
        };

        match extension {
            "zip" => Ok(Self::Zip),
            "tgz" => Ok(Self::TarGz),
            "gz" if is_tar(path.as_ref()) => Ok(Self::TarGz),
            _ => Err(Error::UnsupportedArchive(path.as_ref().to_path_buf())),
        }
    }
}

/// Extract `archive` so that its single top-level directory becomes `target_dir`.
///
/// Extraction is staged in a sibling `<target>.part` directory and only
/// renamed into place once every entry landed; on any failure (including
/// interruption) the staging directory is removed and `target_dir` is left
/// untouched. Entries and symlink targets that would escape the staging root
/// fail with [`Error::ArchiveUnsafe`].
pub async fn extract(archive: &Path, target_dir: &Path) -> Result<()> {
    let ext = ArchiveExtension::from_path(archive)?;
    let part_dir = part_dir_for(target_dir)?;

    if part_dir.exists() {
        debug!(path = %part_dir.display(), "Removing stale staging directory");
        fs_err::tokio::remove_dir_all(&part_dir).await?;
    }
    fs_err::tokio::create_dir_all(&part_dir).await?;

    let guard = cleanup::add_cleanup({
        let part_dir = part_dir.clone();
        move || {
            let _ = std::fs::remove_dir_all(&part_dir);
        }
    });

    let result = unpack_and_finalize(archive, ext, &part_dir, target_dir).await;

    cleanup::remove_cleanup(guard);
    if result.is_err() {
        let _ = fs_err::tokio::remove_dir_all(&part_dir).await;
    }
    result
}

fn part_dir_for(target_dir: &Path) -> Result<PathBuf> {
    let parent = target_dir
        .parent()
        .ok_or_else(|| Error::Other(format!("`{}` has no parent", target_dir.display())))?;
    let name = target_dir
        .file_name()
        .ok_or_else(|| Error::Other(format!("`{}` has no file name", target_dir.display())))?;
    Ok(parent.join(format!("{}.part", name.to_string_lossy())))
}

async fn unpack_and_finalize(
    archive: &Path,
    ext: ArchiveExtension,
    part_dir: &Path,
    target_dir: &Path,
) -> Result<()> {
    match ext {
        ArchiveExtension::TarGz => untar_gz(archive, part_dir).await?,
        ArchiveExtension::Zip => unzip(archive, part_dir).await?,
    }

    let inner = strip_component(part_dir)?;
    fs_err::tokio::rename(&inner, target_dir).await?;
    fs_err::tokio::remove_dir_all(part_dir).await?;
    trace!(target = %target_dir.display(), "Extraction complete");
    Ok(())
}

/// The single top-level directory of an unpacked archive.
///
/// The Go SDK archive always wraps its tree in one `go/` directory.
fn strip_component(source: &Path) -> Result<PathBuf> {
    let top_level =
        fs_err::read_dir(source)?.collect::<std::io::Result<Vec<fs_err::DirEntry>>>()?;
    match top_level.as_slice() {
        [root] if root.file_type()?.is_dir() => Ok(root.path()),
        _ => Err(Error::MalformedSdkArchive),
    }
}

/// Sanitize an archive member path: no roots, no prefixes, and no `..` that
/// climbs above the extraction root.
fn sanitize(path: &Path) -> Option<PathBuf> {
    let mut depth = 0usize;
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => return None,
            Component::ParentDir => {
                depth = depth.checked_sub(1)?;
                out.pop();
            }
            Component::CurDir => (),
            Component::Normal(part) => {
                depth += 1;
                out.push(part);
            }
        }
    }
    Some(out)
}

/// Whether a symlink at `entry_rel` (relative to the extraction root) pointing
/// at `link` stays under the root. Purely lexical.
fn symlink_is_contained(entry_rel: &Path, link: &Path) -> bool {
    if link.is_absolute() {
        return false;
    }
    // The link resolves relative to its own directory.
    let mut depth = entry_rel.components().count().saturating_sub(1);
    for component in link.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => return false,
            Component::CurDir => (),
            Component::ParentDir => {
                let Some(next) = depth.checked_sub(1) else {
                    return false;
                };
                depth = next;
            }
            Component::Normal(_) => depth += 1,
        }
    }
    true
}

async fn untar_gz(archive: &Path, target: &Path) -> Result<()> {
    let file = fs_err::tokio::File::open(archive).await?;
    let reader = BufReader::with_capacity(DEFAULT_BUF_SIZE, file);
    let decoder = GzipDecoder::new(reader);

    let mut tar = tokio_tar::ArchiveBuilder::new(decoder)
        .set_preserve_mtime(true)
        .set_preserve_permissions(true)
        .build();

    let mut entries = tar.entries()?;
    while let Some(entry) = entries.next().await {
        let mut entry = entry?;
        let raw = entry.path()?.into_owned();
        let Some(rel) = sanitize(&raw) else {
            return Err(Error::ArchiveUnsafe {
                entry: raw.to_string_lossy().into_owned(),
            });
        };
        if rel.as_os_str().is_empty() {
            continue;
        }
        let dest = target.join(&rel);

        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() {
            fs_err::tokio::create_dir_all(&dest).await?;
        } else if entry_type.is_symlink() {
            let Some(link) = entry.link_name()? else {
                continue;
            };
            if !symlink_is_contained(&rel, &link) {
                return Err(Error::ArchiveUnsafe {
                    entry: format!("{} -> {}", raw.display(), link.display()),
                });
            }
            if let Some(parent) = dest.parent() {
                fs_err::tokio::create_dir_all(parent).await?;
            }
            #[cfg(unix)]
            tokio::fs::symlink(link.as_ref(), &dest).await?;
            #[cfg(not(unix))]
            trace!(entry = %raw.display(), "Skipping symlink on a non-unix platform");
        } else if entry_type.is_hard_link() {
            let Some(link) = entry.link_name()? else {
                continue;
            };
            // Hard link names are archive-root-relative.
            let Some(link_rel) = sanitize(&link) else {
                return Err(Error::ArchiveUnsafe {
                    entry: format!("{} -> {}", raw.display(), link.display()),
                });
            };
            if let Some(parent) = dest.parent() {
                fs_err::tokio::create_dir_all(parent).await?;
            }
            fs_err::tokio::hard_link(target.join(link_rel), &dest).await?;
        } else if entry_type.is_file() {
            if let Some(parent) = dest.parent() {
                fs_err::tokio::create_dir_all(parent).await?;
            }
            entry.unpack(&dest).await?;
        } else {
            trace!(entry = %raw.display(), ?entry_type, "Skipping special archive entry");
        }
    }

    Ok(())
}

async fn unzip(archive: &Path, target: &Path) -> Result<()> {
    let file = fs_err::tokio::File::open(archive).await?;
    let mut reader = BufReader::with_capacity(DEFAULT_BUF_SIZE, file);
    let mut zip = ZipFileReader::with_tokio(&mut reader);

    while let Some(mut entry) = zip
        .next_with_entry()
        .await
        .map_err(|err| Error::Other(format!("malformed zip archive: {err}")))?
    {
        let raw = entry
            .reader()
            .entry()
            .filename()
            .as_str()
            .map_err(|err| Error::Other(format!("malformed zip entry name: {err}")))?
            .to_string();

        if raw.contains('\0') {
            return Err(Error::ArchiveUnsafe { entry: raw });
        }
        let Some(rel) = sanitize(Path::new(&raw)) else {
            return Err(Error::ArchiveUnsafe { entry: raw });
        };

        let is_dir = entry
            .reader()
            .entry()
            .dir()
            .map_err(|err| Error::Other(format!("malformed zip entry: {err}")))?
            || raw.ends_with('/');

        let dest = target.join(&rel);
        if is_dir {
            fs_err::tokio::create_dir_all(&dest).await?;
        } else if !rel.as_os_str().is_empty() {
            if let Some(parent) = dest.parent() {
                fs_err::tokio::create_dir_all(parent).await?;
            }
            let mut file = fs_err::tokio::File::create(&dest).await?;
            let mut reader = entry.reader_mut().compat();
            tokio::io::copy(&mut reader, &mut file).await?;
        }

        // Close the current entry before reading the next one.
        zip = entry
            .skip()
            .await
            .map_err(|err| Error::Other(format!("malformed zip archive: {err}")))?;
    }

    // Zip carries no POSIX modes we rely on; when extracting the Windows
    // archive on a POSIX host, restore the execute bit on the tools.
    #[cfg(unix)]
    mark_bin_executable(target)?;

    Ok(())
}

#[cfg(unix)]
fn mark_bin_executable(target: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    for top_level in fs_err::read_dir(target)? {
        let bin = top_level?.path().join("bin");
        if !bin.is_dir() {
            continue;
        }
        for entry in fs_err::read_dir(&bin)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                fs_err::set_permissions(entry.path(), std::fs::Permissions::from_mode(0o755))?;
            }
        }
    }
    Ok(())
}
