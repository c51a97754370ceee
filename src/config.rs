use std::path::{Component, Path, PathBuf};

use etcetera::BaseStrategy;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::env_vars::EnvVars;
use crate::error::{Error, Result};
use crate::fs::write_atomic;
use crate::version::Version;

pub const CONFIG_FILE: &str = "config.yaml";

/// The default per-project pin file name.
pub const PROJECT_FILE: &str = ".govman-goversion";

const GO_RELEASES_API: &str = "https://go.dev/dl/?mode=json&include=all";
const GO_DOWNLOAD_TEMPLATE: &str = "https://go.dev/dl/%s";

/// The govman home directory: `$GOVMAN_HOME`, or `~/.govman`.
pub fn govman_home() -> Result<PathBuf> {
    if let Some(home) = std::env::var_os(EnvVars::GOVMAN_HOME) {
        return Ok(PathBuf::from(home));
    }
    let strategy = etcetera::choose_base_strategy()
        .map_err(|err| Error::Other(format!("could not determine the home directory: {err}")))?;
    Ok(strategy.home_dir().join(".govman"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    /// Fetch archive segments concurrently when the server supports ranges.
    pub parallel: bool,
    /// Maximum concurrent connections for a parallel fetch.
    pub max_connections: u32,
    /// Per-attempt timeout, in seconds.
    pub timeout_secs: u64,
    /// Retries after the first failed attempt.
    pub retry_count: u32,
    /// Delay between attempts, in seconds.
    pub retry_delay_secs: u64,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            parallel: true,
            max_connections: 4,
            timeout_secs: 600,
            retry_count: 3,
            retry_delay_secs: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MirrorSettings {
    /// Prefix archive downloads with `url` instead of the upstream template.
    pub enabled: bool,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSwitchSettings {
    /// Whether the shell hook re-activates on directory changes.
    pub enabled: bool,
    /// The per-project pin file name.
    pub project_file: String,
}

impl Default for AutoSwitchSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            project_file: PROJECT_FILE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseSources {
    /// The release index endpoint (a JSON array of releases).
    pub api_url: String,
    /// Archive URL template; `%s` is replaced by the file name.
    pub download_url_template: String,
    /// How long a fetched release index stays fresh, in seconds.
    pub cache_expiry_secs: u64,
}

impl Default for ReleaseSources {
    fn default() -> Self {
        Self {
            api_url: GO_RELEASES_API.to_string(),
            download_url_template: GO_DOWNLOAD_TEMPLATE.to_string(),
            cache_expiry_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where extracted SDK trees live.
    pub install_dir: PathBuf,
    /// Where downloaded archives and the cached release index live.
    pub cache_dir: PathBuf,
    /// The version activated when no session or project override applies.
    pub default_version: Option<Version>,
    pub download: DownloadSettings,
    pub mirror: MirrorSettings,
    pub auto_switch: AutoSwitchSettings,
    pub go_releases: ReleaseSources,

    #[serde(skip)]
    home: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            install_dir: PathBuf::new(),
            cache_dir: PathBuf::new(),
            default_version: None,
            download: DownloadSettings::default(),
            mirror: MirrorSettings::default(),
            auto_switch: AutoSwitchSettings::default(),
            go_releases: ReleaseSources::default(),
            home: PathBuf::new(),
        }
    }
}

impl Config {
    /// In-memory defaults rooted at `home`.
    pub fn defaults(home: &Path) -> Self {
        Self {
            install_dir: home.join("versions"),
            cache_dir: home.join("cache"),
            home: home.to_path_buf(),
            ..Self::default()
        }
    }

    /// Load the config from `home/config.yaml`.
    ///
    /// A missing file yields the defaults; a present but unparsable file is
    /// [`Error::ConfigMalformed`]. The directory layout is created on load.
    pub fn load(home: &Path) -> Result<Self> {
        let path = home.join(CONFIG_FILE);
        let mut config = match fs_err::read_to_string(&path) {
            Ok(contents) => {
                serde_yaml::from_str::<Config>(&contents).map_err(|err| Error::ConfigMalformed {
                    path: path.clone(),
                    source: err.into(),
                })?
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                Self::defaults(home)
            }
            Err(err) => return Err(err.into()),
        };

        config.home = home.to_path_buf();
        if config.install_dir.as_os_str().is_empty() {
            config.install_dir = home.join("versions");
        }
        if config.cache_dir.as_os_str().is_empty() {
            config.cache_dir = home.join("cache");
        }

        config.install_dir = expand_path(&config.install_dir, &path)?;
        config.cache_dir = expand_path(&config.cache_dir, &path)?;
        config.download.max_connections = config.download.max_connections.max(1);

        for dir in [
            config.home.clone(),
            config.install_dir.clone(),
            config.cache_dir.clone(),
            config.bin_dir(),
        ] {
            create_dir_0755(&dir)?;
        }

        Ok(config)
    }

    /// Persist the config to `home/config.yaml` via write-temp-then-rename.
    pub fn save(&self) -> Result<()> {
        let path = self.home.join(CONFIG_FILE);
        let contents = serde_yaml::to_string(self).map_err(|err| Error::ConfigPersistFailed {
            path: path.clone(),
            source: std::io::Error::other(err),
        })?;
        write_atomic(&path, contents).map_err(|source| Error::ConfigPersistFailed {
            path: path.clone(),
            source,
        })
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn config_path(&self) -> PathBuf {
        self.home.join(CONFIG_FILE)
    }

    /// The directory holding the tool's own binary and the active `go` link.
    pub fn bin_dir(&self) -> PathBuf {
        self.home.join("bin")
    }

    /// The installation directory for a version, e.g. `versions/go1.24.3`.
    pub fn version_dir(&self, version: &Version) -> PathBuf {
        self.install_dir.join(version.dir_name())
    }

    /// The `bin` directory inside an installed SDK.
    pub fn version_bin_dir(&self, version: &Version) -> PathBuf {
        self.version_dir(version).join("bin")
    }

    /// The symlink naming the active default toolchain.
    pub fn current_symlink(&self) -> PathBuf {
        self.bin_dir().join(go_exe())
    }

    /// Where a downloaded archive is cached.
    pub fn cache_path(&self, filename: &str) -> PathBuf {
        self.cache_dir.join(filename)
    }

    /// The archive URL for `filename`, honoring a configured mirror.
    pub fn download_url(&self, filename: &str) -> String {
        if self.mirror.enabled && !self.mirror.url.is_empty() {
            format!("{}/{}", self.mirror.url.trim_end_matches('/'), filename)
        } else {
            self.go_releases.download_url_template.replacen("%s", filename, 1)
        }
    }
}

pub fn go_exe() -> &'static str {
    if cfg!(windows) {
        "go.exe"
    } else {
        "go"
    }
}

/// Expand a leading `~`, then reject relative paths and `..` components.
fn expand_path(path: &Path, config_path: &Path) -> Result<PathBuf> {
    let expanded = if let Ok(rest) = path.strip_prefix("~") {
        let strategy = etcetera::choose_base_strategy().map_err(|err| {
            Error::Other(format!("could not determine the home directory: {err}"))
        })?;
        strategy.home_dir().join(rest)
    } else {
        path.to_path_buf()
    };

    if !expanded.is_absolute() {
        return Err(Error::ConfigMalformed {
            path: config_path.to_path_buf(),
            source: format!("path `{}` is not absolute", path.display()).into(),
        });
    }
    if expanded
        .components()
        .any(|component| matches!(component, Component::ParentDir))
    {
        return Err(Error::ConfigMalformed {
            path: config_path.to_path_buf(),
            source: format!("path `{}` contains a `..` component", path.display()).into(),
        });
    }

    Ok(expanded)
}

#[cfg(unix)]
fn create_dir_0755(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    match std::fs::DirBuilder::new().recursive(true).mode(0o755).create(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(err) => Err(err),
    }
}

#[cfg(not(unix))]
fn create_dir_0755(path: &Path) -> std::io::Result<()> {
    fs_err::create_dir_all(path)
}
