use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fs::write_atomic;
use crate::version::{Version, VersionSpec};
use crate::warn_user_once;

/// The on-disk name of the cached release index, inside the cache directory.
pub const INDEX_CACHE_FILE: &str = "releases.json";

/// The release index uses a short, independent timeout: it is one small JSON
/// round trip, unlike archive downloads.
const CATALOG_TIMEOUT: Duration = Duration::from_secs(30);

/// One downloadable file of a release, as published by the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseFile {
    pub filename: String,
    pub os: String,
    pub arch: String,
    pub sha256: String,
    pub size: u64,
    pub kind: String,
}

/// One released Go version with its platform files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    pub version: Version,
    pub stable: bool,
    #[serde(default)]
    pub files: Vec<ReleaseFile>,
}

/// The cached index: the raw release list plus when it was fetched.
#[derive(Debug, Serialize, Deserialize)]
struct CachedIndex {
    fetched_at: u64,
    releases: Vec<Release>,
}

#[derive(Clone)]
struct Snapshot {
    releases: Arc<Vec<Release>>,
    fetched_at: SystemTime,
}

/// The release catalog: a refreshing snapshot of the upstream index.
///
/// Readers share the snapshot behind a read/write guard; a single writer
/// refreshes it when it expires. A failed refresh falls back to a stale
/// snapshot (with a warning) when one exists.
pub struct Catalog {
    client: reqwest::Client,
    api_url: String,
    cache_file: PathBuf,
    cache_expiry: Duration,
    snapshot: RwLock<Option<Snapshot>>,
    token: CancellationToken,
}

impl Catalog {
    pub fn new(config: &Config, token: CancellationToken) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(CATALOG_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            api_url: config.go_releases.api_url.clone(),
            cache_file: config.cache_path(INDEX_CACHE_FILE),
            cache_expiry: Duration::from_secs(config.go_releases.cache_expiry_secs),
            snapshot: RwLock::new(None),
            token,
        })
    }

    /// The catalog's versions, sorted descending.
    pub async fn available(&self, include_unstable: bool) -> Result<Vec<Version>> {
        let releases = self.releases(false).await?;
        let mut versions: Vec<Version> = releases
            .iter()
            .map(|release| release.version.clone())
            .filter(|version| include_unstable || version.is_stable())
            .collect();
        versions.sort_unstable_by(|a, b| b.cmp(a));
        Ok(versions)
    }

    /// The download descriptor for `version` on the host platform.
    pub async fn descriptor(&self, version: &Version) -> Result<ReleaseFile> {
        let releases = self.releases(false).await?;
        select_file(&releases, version, host_os(), host_arch())
    }

    /// Expand a spec into concrete catalog versions, best first.
    ///
    /// A wildcard yields every match; other specs yield exactly one version.
    pub async fn resolve(&self, spec: &VersionSpec, include_unstable: bool) -> Result<Vec<Version>> {
        let available = self.available(include_unstable || spec_wants_unstable(spec)).await?;

        if let VersionSpec::Wildcard(_) = spec {
            let matches: Vec<Version> = available
                .iter()
                .filter(|version| spec.matches(version))
                .cloned()
                .collect();
            if matches.is_empty() {
                return Err(Error::VersionNotFound(spec.to_string()));
            }
            return Ok(matches);
        }

        spec.best_match(&available)
            .map(|version| vec![version])
            .ok_or_else(|| Error::VersionNotFound(spec.to_string()))
    }

    /// Force a refetch of the index, ignoring the cache expiry.
    pub async fn refresh(&self) -> Result<()> {
        self.releases(true).await.map(|_| ())
    }

    /// The current snapshot, refreshed if expired (double-checked).
    pub async fn releases(&self, refresh: bool) -> Result<Arc<Vec<Release>>> {
        {
            let guard = self.snapshot.read().await;
            if let Some(snapshot) = guard.as_ref() {
                if !refresh && !self.expired(snapshot) {
                    return Ok(Arc::clone(&snapshot.releases));
                }
            }
        }

        let mut guard = self.snapshot.write().await;
        // Another writer may have refreshed while we waited for the lock.
        if let Some(snapshot) = guard.as_ref() {
            if !refresh && !self.expired(snapshot) {
                return Ok(Arc::clone(&snapshot.releases));
            }
        }

        if guard.is_none() {
            if let Some(snapshot) = self.load_cached() {
                let fresh = !refresh && !self.expired(&snapshot);
                let releases = Arc::clone(&snapshot.releases);
                *guard = Some(snapshot);
                if fresh {
                    return Ok(releases);
                }
            }
        }

        match self.fetch().await {
            Ok(snapshot) => {
                self.store_cached(&snapshot);
                let releases = Arc::clone(&snapshot.releases);
                *guard = Some(snapshot);
                Ok(releases)
            }
            Err(err) => {
                if let Some(stale) = guard.as_ref() {
                    warn_user_once!(
                        "the Go release index could not be refreshed ({err}); using cached data"
                    );
                    Ok(Arc::clone(&stale.releases))
                } else {
                    Err(err)
                }
            }
        }
    }

    fn expired(&self, snapshot: &Snapshot) -> bool {
        snapshot
            .fetched_at
            .elapsed()
            .map_or(true, |age| age >= self.cache_expiry)
    }

    async fn fetch(&self) -> Result<Snapshot> {
        debug!(url = %self.api_url, "Fetching the Go release index");
        let request = async {
            let releases: Vec<Release> = self
                .client
                .get(&self.api_url)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            Ok::<_, Error>(releases)
        };

        let releases = tokio::select! {
            () = self.token.cancelled() => return Err(Error::Interrupted),
            releases = request => releases?,
        };

        trace!(count = releases.len(), "Fetched release index");
        Ok(Snapshot {
            releases: Arc::new(releases),
            fetched_at: SystemTime::now(),
        })
    }

    fn load_cached(&self) -> Option<Snapshot> {
        let contents = fs_err::read_to_string(&self.cache_file).ok()?;
        let index: CachedIndex = serde_json::from_str(&contents).ok()?;
        trace!(path = %self.cache_file.display(), "Loaded cached release index");
        Some(Snapshot {
            releases: Arc::new(index.releases),
            fetched_at: UNIX_EPOCH + Duration::from_secs(index.fetched_at),
        })
    }

    fn store_cached(&self, snapshot: &Snapshot) {
        let index = CachedIndex {
            fetched_at: snapshot
                .fetched_at
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            releases: snapshot.releases.as_ref().clone(),
        };
        match serde_json::to_string(&index) {
            Ok(contents) => {
                if let Err(err) = write_atomic(&self.cache_file, contents) {
                    debug!(?err, "Failed to write the release index cache");
                }
            }
            Err(err) => debug!(?err, "Failed to serialize the release index cache"),
        }
    }
}

/// `latest` may resolve to a prerelease only when nothing stable exists, so
/// keep prereleases in the pool for every spec that can name one.
fn spec_wants_unstable(spec: &VersionSpec) -> bool {
    match spec {
        VersionSpec::Exact(version) => !version.is_stable(),
        VersionSpec::Wildcard(_) => true,
        _ => false,
    }
}

/// Select the `(os, arch, kind=archive)` file of `version`.
fn select_file(
    releases: &[Release],
    version: &Version,
    os: &'static str,
    arch: &'static str,
) -> Result<ReleaseFile> {
    let wanted = version.to_string();
    let release = releases
        .iter()
        .find(|release| release.version.to_string() == wanted)
        .or_else(|| releases.iter().find(|release| release.version == *version))
        .ok_or_else(|| Error::VersionNotFound(wanted))?;

    release
        .files
        .iter()
        .find(|file| file.os == os && file.arch == arch && file.kind == "archive")
        .cloned()
        .ok_or_else(|| Error::PlatformUnsupported {
            version: version.clone(),
            os,
            arch,
        })
}

/// The running platform's OS, in Go's naming.
pub fn host_os() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

/// The running platform's architecture, in Go's naming.
pub fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86" => "386",
        "x86_64" => "amd64",
        "arm" => "arm",
        "aarch64" => "arm64",
        "loongarch64" => "loong64",
        "powerpc64" => "ppc64",
        "riscv64" => "riscv64",
        "s390x" => "s390x",
        other => other,
    }
}
