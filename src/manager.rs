use std::path::{Path, PathBuf};

use itertools::Itertools;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::autoswitch;
use crate::catalog::Catalog;
use crate::config::{go_exe, Config};
use crate::download::Downloader;
use crate::error::{Error, Result};
use crate::extract;
use crate::fs::{directory_size, CWD};
use crate::printer::{DownloadReporter, Printer};
use crate::process::Cmd;
use crate::shell::Shell;
use crate::symlink;
use crate::version::{Version, VersionSpec};

/// Where to apply a `use` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// The invoking shell only: emit a PATH-update statement.
    Session,
    /// The config default plus the active symlink.
    Default,
    /// The current directory's project pin file.
    Local,
}

/// Which precedence level produced the active version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationMethod {
    Session,
    Project,
    Default,
}

impl std::fmt::Display for ActivationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivationMethod::Session => f.write_str("session"),
            ActivationMethod::Project => f.write_str("project"),
            ActivationMethod::Default => f.write_str("default"),
        }
    }
}

#[derive(Debug)]
pub struct CurrentReport {
    pub version: Version,
    pub method: ActivationMethod,
}

/// The per-item outcome of a batch install.
#[derive(Debug, Default)]
pub struct InstallReport {
    pub installed: Vec<Version>,
    pub skipped: Vec<Version>,
    pub failed: Vec<(String, Error)>,
    /// Set when the batch made its first version the default.
    pub made_default: Option<Version>,
}

#[derive(Debug, Default)]
pub struct UninstallReport {
    pub removed: Vec<Version>,
    pub freed_bytes: u64,
    pub failed: Vec<(String, Error)>,
}

#[derive(Debug)]
pub struct UseOutcome {
    pub version: Version,
    pub scope: Scope,
    /// The PATH-update statement, for the session scope.
    pub statement: Option<String>,
    /// The pin file written, for the local scope.
    pub pin_file: Option<PathBuf>,
}

/// The version lifecycle orchestrator.
///
/// Owns nothing mutably besides its own clients; config and catalog are built
/// once per invocation and passed in.
pub struct Manager {
    config: Config,
    catalog: Catalog,
    downloader: Downloader,
    printer: Printer,
}

impl Manager {
    pub fn new(config: Config, printer: Printer, token: CancellationToken) -> Result<Self> {
        let catalog = Catalog::new(&config, token.clone())?;
        let downloader = Downloader::new(config.download.clone(), token)?;
        Ok(Self {
            config,
            catalog,
            downloader,
            printer,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The installed versions, newest first.
    pub fn installed(&self) -> Result<Vec<Version>> {
        let entries = match fs_err::read_dir(&self.config.install_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        Ok(entries
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!(?err, "Failed to read an installation entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_ok_and(|ty| ty.is_dir()))
            .filter_map(|entry| {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                let version: Version = name.strip_prefix("go")?.parse().ok()?;
                // A directory without the binary is a failed install, not a version.
                entry
                    .path()
                    .join("bin")
                    .join(go_exe())
                    .is_file()
                    .then_some(version)
            })
            .sorted_unstable_by(|a, b| b.cmp(a))
            .collect())
    }

    pub fn is_installed(&self, version: &Version) -> bool {
        self.config
            .version_bin_dir(version)
            .join(go_exe())
            .is_file()
    }

    /// Install every version the specs expand to. Per-item failures never
    /// abort the batch.
    pub async fn install(
        &self,
        specs: &[VersionSpec],
        include_unstable: bool,
    ) -> Result<InstallReport> {
        let mut report = InstallReport::default();

        for spec in specs {
            let versions = match self.catalog.resolve(spec, include_unstable).await {
                Ok(versions) => versions,
                Err(err) => {
                    report.failed.push((spec.to_string(), err));
                    continue;
                }
            };

            for version in versions {
                if self.is_installed(&version) {
                    debug!(%version, "Already installed, skipping");
                    report.skipped.push(version);
                    continue;
                }
                match self.install_one(&version).await {
                    Ok(()) => report.installed.push(version),
                    Err(err @ Error::Interrupted) => {
                        report.failed.push((version.to_string(), err));
                        return Ok(report);
                    }
                    Err(err) => report.failed.push((version.to_string(), err)),
                }
            }
        }

        // The very first installation becomes the default, so `go` works
        // right away without an explicit `use`.
        if self.config.default_version.is_none() {
            if let Some(version) = report.installed.iter().max().cloned() {
                match self
                    .use_version(&VersionSpec::Exact(version.clone()), Scope::Default, None)
                    .await
                {
                    Ok(_) => report.made_default = Some(version),
                    Err(err) => warn!(?err, %version, "Could not set the installed version as default"),
                }
            }
        }

        Ok(report)
    }

    async fn install_one(&self, version: &Version) -> Result<()> {
        let descriptor = self.catalog.descriptor(version).await?;
        let url = self.config.download_url(&descriptor.filename);
        let cache_path = self.config.cache_path(&descriptor.filename);

        debug!(%version, url, "Installing");
        let progress = DownloadReporter::new(self.printer, &descriptor.filename);
        let archive = self
            .downloader
            .fetch(
                &url,
                &descriptor.sha256,
                descriptor.size,
                &cache_path,
                &progress,
            )
            .await?;

        let target = self.config.version_dir(version);
        extract::extract(&archive, &target).await?;

        let binary = self.config.version_bin_dir(version).join(go_exe());
        if !binary.is_file() {
            return Err(Error::Other(format!(
                "extracted SDK is missing `{}`",
                binary.display()
            )));
        }
        Ok(())
    }

    /// Remove versions, refusing any that is active at some precedence level.
    pub async fn uninstall(&self, versions: &[Version]) -> Result<UninstallReport> {
        let protected = self.active_versions().await;
        let mut report = UninstallReport::default();

        for version in versions {
            if !self.is_installed(version) {
                report
                    .failed
                    .push((version.to_string(), Error::NotInstalled(version.to_string())));
                continue;
            }
            if protected.contains(version) {
                report.failed.push((
                    version.to_string(),
                    Error::ActiveVersionProtected(version.clone()),
                ));
                continue;
            }

            let dir = self.config.version_dir(version);
            let freed = directory_size(&dir).unwrap_or(0);
            match fs_err::remove_dir_all(&dir) {
                Ok(()) => {
                    debug!(%version, freed, "Uninstalled");
                    report.removed.push(version.clone());
                    report.freed_bytes += freed;
                }
                Err(err) => report.failed.push((version.to_string(), err.into())),
            }
        }

        Ok(report)
    }

    /// Resolve and activate a version at the requested scope.
    pub async fn use_version(
        &self,
        spec: &VersionSpec,
        scope: Scope,
        shell: Option<Shell>,
    ) -> Result<UseOutcome> {
        let version = self.resolve_installed(spec).await?;
        let bin_dir = self.config.version_bin_dir(&version);

        match scope {
            Scope::Session => {
                let shell = shell.ok_or(Error::ShellUnknown)?;
                Ok(UseOutcome {
                    version,
                    scope,
                    statement: Some(shell.path_export(&bin_dir)),
                    pin_file: None,
                })
            }
            Scope::Default => {
                let mut config = self.config.clone();
                config.default_version = Some(version.clone());
                config.save()?;
                symlink::activate(&bin_dir.join(go_exe()), &self.config.current_symlink())?;
                Ok(UseOutcome {
                    version,
                    scope,
                    statement: None,
                    pin_file: None,
                })
            }
            Scope::Local => {
                // Keep the user's (possibly partial) form in the pin; aliases
                // are frozen to the version they resolved to.
                let pinned = match spec {
                    VersionSpec::Exact(_) | VersionSpec::Partial { .. } => spec.clone(),
                    _ => VersionSpec::Exact(version.clone()),
                };
                let pin_file = autoswitch::write_pin(
                    &CWD,
                    &self.config.auto_switch.project_file,
                    &pinned,
                )?;
                Ok(UseOutcome {
                    version,
                    scope,
                    statement: None,
                    pin_file: Some(pin_file),
                })
            }
        }
    }

    /// Flexible resolution against the installed set, falling back to the
    /// catalog: a catalog-known version must still be installed to win.
    async fn resolve_installed(&self, spec: &VersionSpec) -> Result<Version> {
        let installed = self.installed()?;
        if let Some(version) = spec.best_match(&installed) {
            return Ok(version);
        }

        match self.catalog.resolve(spec, true).await {
            Ok(versions) => match versions.into_iter().next() {
                Some(version) if self.is_installed(&version) => Ok(version),
                _ => Err(Error::NotInstalled(spec.to_string())),
            },
            Err(Error::VersionNotFound(spec)) => Err(Error::VersionNotFound(spec)),
            // The catalog being unreachable must not mask the real answer.
            Err(_) => Err(Error::NotInstalled(spec.to_string())),
        }
    }

    /// The active version and how it was selected: session > project > default.
    pub async fn current(&self) -> Result<CurrentReport> {
        self.current_from(&CWD).await
    }

    async fn current_from(&self, cwd: &Path) -> Result<CurrentReport> {
        if let Some(version) = self.session_version().await {
            return Ok(CurrentReport {
                version,
                method: ActivationMethod::Session,
            });
        }

        if let Some(pin) =
            autoswitch::find_pin(cwd, &self.config.auto_switch.project_file)?
        {
            // A pin that matches nothing is a diagnostic error, never a
            // silent fall-through to the default.
            let version = pin.resolve(&self.installed()?)?;
            return Ok(CurrentReport {
                version,
                method: ActivationMethod::Project,
            });
        }

        let link = self.config.current_symlink();
        if let Some(active) = symlink::read_active(&link)? {
            return Ok(CurrentReport {
                version: active.version,
                method: ActivationMethod::Default,
            });
        }

        if let Some(version) = self.config.default_version.clone() {
            if self.is_installed(&version) {
                return Ok(CurrentReport {
                    version,
                    method: ActivationMethod::Default,
                });
            }
            return Err(Error::ActiveUnhealthy {
                target: self.config.version_dir(&version),
            });
        }

        Err(Error::NoActiveVersion)
    }

    /// The version reachable as `go` on the ambient PATH, unless it is our
    /// own default symlink (which belongs to the default precedence level).
    async fn session_version(&self) -> Option<Version> {
        let go_path = which::which(go_exe()).ok()?;
        if go_path == self.config.current_symlink() {
            trace!("PATH resolves to the default symlink, not a session override");
            return None;
        }

        let output = Cmd::new(&go_path, "go version")
            .arg("version")
            .check(true)
            .output()
            .await
            .ok()?;
        let stdout = String::from_utf8(output.stdout).ok()?;
        parse_go_version_output(&stdout)
    }

    /// Versions that currently win at some precedence level.
    async fn active_versions(&self) -> Vec<Version> {
        let installed = self.installed().unwrap_or_default();
        let mut active = Vec::new();

        if let Some(version) = self.session_version().await {
            active.push(version);
        }
        if let Ok(Some(pin)) =
            autoswitch::find_pin(&CWD, &self.config.auto_switch.project_file)
        {
            if let Ok(version) = pin.resolve(&installed) {
                active.push(version);
            }
        }
        if let Some(version) = self.config.default_version.clone() {
            active.push(version);
        }
        if let Ok(Some(link)) = symlink::read_active(&self.config.current_symlink()) {
            active.push(link.version);
        }

        active
    }

    /// Versions protected from pruning: the managed session version, the
    /// default, and everything a reachable project pin resolves to.
    pub async fn prune_candidates(&self) -> Result<Vec<Version>> {
        let installed = self.installed()?;
        let mut protected = Vec::new();

        if let Some(version) = self.session_version().await {
            if installed.contains(&version) {
                protected.push(version);
            }
        }
        if let Some(version) = self.config.default_version.clone() {
            protected.push(version);
        }
        if let Ok(Some(link)) = symlink::read_active(&self.config.current_symlink()) {
            protected.push(link.version);
        }
        for pin in autoswitch::all_pins(&CWD, &self.config.auto_switch.project_file) {
            if let Ok(version) = pin.resolve(&installed) {
                protected.push(version);
            }
        }

        Ok(installed
            .into_iter()
            .filter(|version| !protected.contains(version))
            .collect())
    }

    /// Remove every non-protected installed version.
    pub async fn prune(&self) -> Result<UninstallReport> {
        let candidates = self.prune_candidates().await?;
        let mut report = UninstallReport::default();

        for version in candidates {
            let dir = self.config.version_dir(&version);
            let freed = directory_size(&dir).unwrap_or(0);
            match fs_err::remove_dir_all(&dir) {
                Ok(()) => {
                    debug!(%version, "Pruned");
                    report.removed.push(version);
                    report.freed_bytes += freed;
                }
                Err(err) => report.failed.push((version.to_string(), err.into())),
            }
        }

        Ok(report)
    }

    /// Delete cached archives and the cached release index. Returns freed bytes.
    pub fn clean(&self) -> Result<u64> {
        let mut freed = 0;
        let entries = match fs_err::read_dir(&self.config.cache_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };

        for entry in entries {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if metadata.is_dir() {
                freed += directory_size(&entry.path()).unwrap_or(0);
                fs_err::remove_dir_all(entry.path())?;
            } else {
                freed += metadata.len();
                fs_err::remove_file(entry.path())?;
            }
        }
        Ok(freed)
    }
}

/// Parse `go version` output, e.g. `go version go1.24.5 linux/amd64`.
fn parse_go_version_output(stdout: &str) -> Option<Version> {
    let token = stdout.split_ascii_whitespace().nth(2)?;
    token.strip_prefix("go")?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Store {
        manager: Manager,
        _home: tempfile::TempDir,
    }

    fn store(versions: &[&str]) -> Store {
        let home = tempfile::tempdir().unwrap();
        let config = Config::load(home.path()).unwrap();
        for version in versions {
            install_fake(&config, version);
        }
        let manager =
            Manager::new(config, Printer::Quiet, CancellationToken::new()).unwrap();
        Store {
            manager,
            _home: home,
        }
    }

    fn install_fake(config: &Config, version: &str) {
        let version: Version = version.parse().unwrap();
        let bin = config.version_bin_dir(&version);
        fs_err::create_dir_all(&bin).unwrap();
        fs_err::write(bin.join(go_exe()), "#!/bin/sh\n").unwrap();
    }

    #[test]
    fn installed_lists_complete_sdks_newest_first() {
        let store = store(&["1.24.0", "1.25.1", "1.25.4"]);
        // A directory without bin/go is not an installation.
        fs_err::create_dir_all(store.manager.config().install_dir.join("go1.30.0")).unwrap();
        // Nor is an unrelated directory.
        fs_err::create_dir_all(store.manager.config().install_dir.join("downloads")).unwrap();

        let installed: Vec<String> = store
            .manager
            .installed()
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(installed, ["1.25.4", "1.25.1", "1.24.0"]);
    }

    #[tokio::test]
    async fn use_session_emits_a_path_statement() {
        let store = store(&["1.24.0", "1.25.1", "1.25.4"]);
        let spec: VersionSpec = "1.25".parse().unwrap();

        let outcome = store
            .manager
            .use_version(&spec, Scope::Session, Some(Shell::Bash))
            .await
            .unwrap();

        assert_eq!(outcome.version.to_string(), "1.25.4");
        let statement = outcome.statement.unwrap();
        assert!(statement.starts_with("export PATH=\""));
        assert!(statement.contains("go1.25.4"));
        let re = regex::Regex::new(Shell::Bash.validation_regex()).unwrap();
        assert!(re.is_match(&statement));
    }

    #[tokio::test]
    async fn use_unknown_version_is_not_installed() {
        let store = store(&["1.24.0"]);
        let spec: VersionSpec = "1.26".parse().unwrap();

        let err = store
            .manager
            .use_version(&spec, Scope::Session, Some(Shell::Bash))
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn use_default_persists_and_activates() {
        let store = store(&["1.25.1"]);
        let spec: VersionSpec = "1.25.1".parse().unwrap();

        store
            .manager
            .use_version(&spec, Scope::Default, None)
            .await
            .unwrap();

        let config = Config::load(store.manager.config().home()).unwrap();
        assert_eq!(config.default_version.clone().map(|v| v.to_string()), Some("1.25.1".into()));

        let active = symlink::read_active(&config.current_symlink())
            .unwrap()
            .expect("the symlink must exist");
        assert_eq!(active.version.to_string(), "1.25.1");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn uninstall_refuses_the_default_version() {
        let store = store(&["1.25.1", "1.24.0"]);
        let spec: VersionSpec = "1.25.1".parse().unwrap();
        store
            .manager
            .use_version(&spec, Scope::Default, None)
            .await
            .unwrap();

        // Reload to observe the persisted default.
        let config = Config::load(store.manager.config().home()).unwrap();
        let manager = Manager::new(config, Printer::Quiet, CancellationToken::new()).unwrap();

        let report = manager
            .uninstall(&["1.25.1".parse().unwrap()])
            .await
            .unwrap();
        assert!(report.removed.is_empty());
        assert!(matches!(
            report.failed.as_slice(),
            [(_, Error::ActiveVersionProtected(_))]
        ));

        // The other version goes away and reports its size.
        let report = manager
            .uninstall(&["1.24.0".parse().unwrap()])
            .await
            .unwrap();
        assert_eq!(report.removed.len(), 1);
        assert!(report.freed_bytes > 0);
        assert!(!manager.is_installed(&"1.24.0".parse().unwrap()));
    }

    /// Seed a fresh release-index cache so catalog resolution never leaves disk.
    fn seed_catalog(config: &Config, versions: &[&str]) {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let releases: Vec<serde_json::Value> = versions
            .iter()
            .map(|version| {
                serde_json::json!({
                    "version": format!("go{version}"),
                    "stable": true,
                    "files": [{
                        "filename": format!("go{version}.{}-{}.tar.gz",
                            crate::catalog::host_os(), crate::catalog::host_arch()),
                        "os": crate::catalog::host_os(),
                        "arch": crate::catalog::host_arch(),
                        "sha256": "a".repeat(64),
                        "size": 4096,
                        "kind": "archive",
                    }],
                })
            })
            .collect();
        let index = serde_json::json!({ "fetched_at": now, "releases": releases });
        fs_err::write(
            config.cache_path(crate::catalog::INDEX_CACHE_FILE),
            serde_json::to_string(&index).unwrap(),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn second_install_reports_already_installed() {
        let store = store(&["1.25.1"]);
        seed_catalog(store.manager.config(), &["1.25.1"]);

        let specs = vec!["1.25.1".parse::<VersionSpec>().unwrap()];
        let report = store.manager.install(&specs, false).await.unwrap();

        assert!(report.installed.is_empty());
        assert_eq!(report.skipped.len(), 1);
        assert!(report.failed.is_empty());
        // The on-disk SDK is untouched.
        assert!(store.manager.is_installed(&"1.25.1".parse().unwrap()));
    }

    #[tokio::test]
    async fn wildcard_matching_nothing_is_an_error() {
        let store = store(&[]);
        seed_catalog(store.manager.config(), &["1.25.1"]);

        let specs = vec!["1.14.*".parse::<VersionSpec>().unwrap()];
        let report = store.manager.install(&specs, false).await.unwrap();
        assert!(matches!(
            report.failed.as_slice(),
            [(_, Error::VersionNotFound(_))]
        ));
    }

    #[test]
    fn go_version_output_parses() {
        assert_eq!(
            parse_go_version_output("go version go1.24.5 linux/amd64").map(|v| v.to_string()),
            Some("1.24.5".to_string())
        );
        assert_eq!(
            parse_go_version_output("go version go1.25rc1 darwin/arm64").map(|v| v.to_string()),
            Some("1.25rc1".to_string())
        );
        assert_eq!(parse_go_version_output("weird"), None);
    }

    #[tokio::test]
    async fn clean_empties_the_cache() {
        let store = store(&[]);
        let cache = &store.manager.config().cache_dir;
        fs_err::write(cache.join("go1.25.1.linux-amd64.tar.gz"), [0u8; 128]).unwrap();
        fs_err::write(cache.join("releases.json"), "[]").unwrap();

        let freed = store.manager.clean().unwrap();
        assert!(freed >= 128);
        assert_eq!(fs_err::read_dir(cache).unwrap().count(), 0);
    }
}
