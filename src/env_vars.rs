pub struct EnvVars;

impl EnvVars {
    pub const PATH: &'static str = "PATH";

    pub const SHELL: &'static str = "SHELL";

    /// Overrides the default `~/.govman` home directory.
    pub const GOVMAN_HOME: &'static str = "GOVMAN_HOME";

    /// Keeps the selected `go` binary from downloading its own toolchains.
    pub const GOTOOLCHAIN: &'static str = "GOTOOLCHAIN";

    pub const RUST_LOG: &'static str = "RUST_LOG";
}
