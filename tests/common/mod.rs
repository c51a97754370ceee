#![allow(dead_code, unreachable_pub)]

use std::path::Path;
use std::process::Command;

use assert_fs::fixture::{ChildPath, PathChild};

pub struct TestContext {
    temp_dir: ChildPath,
    home_dir: ChildPath,
    user_home: ChildPath,

    /// Standard filters for this test context.
    filters: Vec<(String, String)>,

    // To keep the directory alive.
    #[allow(dead_code)]
    _root: tempfile::TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        let root = tempfile::TempDir::new().expect("Failed to create test root directory");

        let temp_dir = ChildPath::new(root.path()).child("temp");
        fs_err::create_dir_all(&temp_dir).expect("Failed to create test working directory");

        let home_dir = ChildPath::new(root.path()).child("govman");
        fs_err::create_dir_all(&home_dir).expect("Failed to create test govman home");

        let user_home = ChildPath::new(root.path()).child("home");
        fs_err::create_dir_all(&user_home).expect("Failed to create test user home");

        let mut filters = Vec::new();
        filters.extend(
            Self::path_patterns(&temp_dir)
                .into_iter()
                .map(|pattern| (pattern, "[TEMP_DIR]/".to_string())),
        );
        filters.extend(
            Self::path_patterns(&home_dir)
                .into_iter()
                .map(|pattern| (pattern, "[GOVMAN_HOME]/".to_string())),
        );
        filters.extend(
            Self::path_patterns(&user_home)
                .into_iter()
                .map(|pattern| (pattern, "[HOME]/".to_string())),
        );

        Self {
            temp_dir,
            home_dir,
            user_home,
            filters,
            _root: root,
        }
    }

    /// Generate an escaped regex pattern for the given path.
    fn path_pattern(path: impl AsRef<Path>) -> String {
        format!(
            // Trim the trailing separator for cross-platform directories filters
            r"{}\\?/?",
            regex::escape(&path.as_ref().display().to_string())
                // Make separators platform agnostic because on Windows we will display
                // paths with Unix-style separators sometimes
                .replace(r"\\", r"(\\|\/)")
        )
    }

    /// Generate various escaped regex patterns for the given path.
    pub fn path_patterns(path: impl AsRef<Path>) -> Vec<String> {
        let mut patterns = Vec::new();

        // We can only canonicalize paths that exist already
        if path.as_ref().exists() {
            patterns.push(Self::path_pattern(
                path.as_ref()
                    .canonicalize()
                    .expect("Failed to create canonical path"),
            ));
        }

        // Include a non-canonicalized version
        patterns.push(Self::path_pattern(path));

        patterns
    }

    pub fn command(&self) -> Command {
        let bin = assert_cmd::cargo::cargo_bin("govman");
        let mut cmd = Command::new(bin);
        cmd.current_dir(self.workdir());
        cmd.env("GOVMAN_HOME", &*self.home_dir);
        cmd.env("HOME", &*self.user_home);
        // A controlled PATH so no ambient `go` bleeds into session detection.
        cmd.env("PATH", self.home_dir.child("bin").path());
        cmd.env_remove("SHELL");
        cmd
    }

    pub fn install(&self) -> Command {
        let mut command = self.command();
        command.arg("install");
        command
    }

    pub fn uninstall(&self) -> Command {
        let mut command = self.command();
        command.arg("uninstall");
        command
    }

    pub fn use_version(&self) -> Command {
        let mut command = self.command();
        command.arg("use");
        command
    }

    pub fn current(&self) -> Command {
        let mut command = self.command();
        command.arg("current");
        command
    }

    pub fn list(&self) -> Command {
        let mut command = self.command();
        command.arg("list");
        command
    }

    pub fn init(&self) -> Command {
        let mut command = self.command();
        command.arg("init");
        command
    }

    pub fn prune(&self) -> Command {
        let mut command = self.command();
        command.arg("prune");
        command
    }

    /// Fabricate an installed SDK in the test home.
    pub fn seed_install(&self, version: &str) {
        let bin = self
            .home_dir
            .child("versions")
            .child(format!("go{version}"))
            .child("bin");
        fs_err::create_dir_all(&bin).expect("Failed to create fake SDK");
        let go = bin.child(if cfg!(windows) { "go.exe" } else { "go" });
        fs_err::write(&go, "#!/bin/sh\nexit 0\n").expect("Failed to write fake go binary");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs_err::set_permissions(&go, std::fs::Permissions::from_mode(0o755))
                .expect("Failed to chmod fake go binary");
        }
    }

    /// The version directories currently present in the test home.
    pub fn installed_dirs(&self) -> Vec<String> {
        let versions = self.home_dir.child("versions");
        let mut names: Vec<String> = fs_err::read_dir(versions.path())
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .map(|entry| entry.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    /// The govman home path, e.g. to build expected output strings.
    pub fn home(&self) -> &Path {
        self.home_dir.path()
    }

    /// The user home path (rc files land here).
    pub fn user_home(&self) -> &Path {
        self.user_home.path()
    }

    /// Get the working directory for the test context.
    pub fn workdir(&self) -> &ChildPath {
        &self.temp_dir
    }

    /// Standard snapshot filters _plus_ those for this test context.
    pub fn filters(&self) -> Vec<(&str, &str)> {
        self.filters
            .iter()
            .map(|(p, r)| (p.as_str(), r.as_str()))
            .chain(INSTA_FILTERS.iter().copied())
            .collect()
    }
}

#[doc(hidden)] // Macro and test context only, don't use directly.
pub const INSTA_FILTERS: &[(&str, &str)] = &[
    // File sizes
    (r"(\s|\()(\d+\.)?\d+\s?([KM]i)?B", "$1[SIZE]"),
    // Rewrite Windows output to Unix output
    (r"\\([\w\d]|\.\.)", "/$1"),
    (r"govman.exe", "govman"),
];

#[allow(unused_macros)]
macro_rules! cmd_snapshot {
    ($spawnable:expr, @$snapshot:literal) => {{
        cmd_snapshot!($crate::common::INSTA_FILTERS.iter().copied().collect::<Vec<_>>(), $spawnable, @$snapshot)
    }};
    ($filters:expr, $spawnable:expr, @$snapshot:literal) => {{
        let mut settings = insta::Settings::clone_current();
        for (matcher, replacement) in $filters {
            settings.add_filter(matcher, replacement);
        }
        let _guard = settings.bind_to_scope();
        insta_cmd::assert_cmd_snapshot!($spawnable, @$snapshot);
    }};
}

#[allow(unused_imports)]
pub(crate) use cmd_snapshot;
