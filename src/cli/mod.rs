use std::process::ExitCode;

use clap::builder::styling::{AnsiColor, Effects};
use clap::builder::Styles;
use clap::{ArgAction, Args, Parser, Subcommand};

use govman::shell::Shell;

mod clean;
mod current;
mod init;
mod install;
mod list;
mod prune;
mod uninstall;
mod use_version;

pub(crate) use clean::clean;
pub(crate) use current::current;
pub(crate) use init::init;
pub(crate) use install::install;
pub(crate) use list::list;
pub(crate) use prune::prune;
pub(crate) use uninstall::uninstall;
pub(crate) use use_version::use_version;

#[derive(Copy, Clone)]
pub(crate) enum ExitStatus {
    /// The command succeeded.
    Success,
    /// Some items of a batch command failed.
    Failure,
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        match status {
            ExitStatus::Success => Self::from(0),
            ExitStatus::Failure => Self::from(1),
        }
    }
}

#[derive(Debug, Copy, Clone, clap::ValueEnum)]
pub(crate) enum ColorChoice {
    /// Enables colored output only when going to a terminal with support.
    Auto,
    /// Enables colored output regardless of the detected environment.
    Always,
    /// Disables colored output.
    Never,
}

impl From<ColorChoice> for anstream::ColorChoice {
    fn from(value: ColorChoice) -> Self {
        match value {
            ColorChoice::Auto => Self::Auto,
            ColorChoice::Always => Self::Always,
            ColorChoice::Never => Self::Never,
        }
    }
}

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

#[derive(Parser)]
#[command(
    name = "govman",
    author,
    version,
    about = "Manage Go toolchain versions in user space"
)]
#[command(styles = STYLES)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,

    #[command(flatten)]
    pub(crate) globals: GlobalArgs,
}

#[derive(Debug, Parser)]
#[command(next_help_heading = "Global options", next_display_order = 1000)]
pub(crate) struct GlobalArgs {
    /// Whether to use color in output.
    #[arg(global = true, long, value_enum, default_value_t = ColorChoice::Auto)]
    pub(crate) color: ColorChoice,

    /// Hide all progress outputs (spinners and bars).
    #[arg(global = true, long)]
    pub(crate) no_progress: bool,

    /// Do not print any output.
    #[arg(global = true, long, short, conflicts_with = "verbose")]
    pub(crate) quiet: bool,

    /// Use verbose output.
    #[arg(global = true, short, long, action = ArgAction::Count)]
    pub(crate) verbose: u8,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Download and install Go versions.
    ///
    /// Accepts exact versions (`1.25.1`), lines (`1.25`), the `latest`/
    /// `stable` aliases, and wildcards (`1.24.*`).
    Install(InstallArgs),
    /// Remove installed Go versions.
    Uninstall(UninstallArgs),
    /// Activate a version for the session, the project, or as the default.
    Use(UseArgs),
    /// Show the active version and how it was selected.
    Current,
    /// List installed (or, with `--remote`, available) versions.
    List(ListArgs),
    /// Remove every installed version no pin, default, or session needs.
    Prune(PruneArgs),
    /// Delete cached downloads and the cached release index.
    Clean,
    /// Print (or install) the shell integration block.
    Init(InitArgs),
    /// Generate shell completion scripts.
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub(crate) struct InstallArgs {
    /// The version specs to install.
    #[arg(required = true, value_name = "VERSION")]
    pub(crate) versions: Vec<String>,

    /// Include release candidates, betas, and alphas.
    #[arg(long)]
    pub(crate) unstable: bool,
}

#[derive(Debug, Args)]
pub(crate) struct UninstallArgs {
    /// The versions to remove.
    #[arg(required = true, value_name = "VERSION")]
    pub(crate) versions: Vec<String>,
}

#[derive(Debug, Args)]
pub(crate) struct UseArgs {
    /// The version (or line, alias, wildcard) to activate.
    #[arg(value_name = "VERSION")]
    pub(crate) version: String,

    /// Persist as the default version and repoint the `go` symlink.
    #[arg(long)]
    pub(crate) default: bool,

    /// Pin the version in the current directory's project file.
    #[arg(long, conflicts_with = "default")]
    pub(crate) local: bool,

    /// The shell dialect for the emitted PATH statement.
    #[arg(long, value_enum)]
    pub(crate) shell: Option<Shell>,
}

#[derive(Debug, Args)]
pub(crate) struct ListArgs {
    /// List versions from the release catalog instead of the installed set.
    #[arg(long)]
    pub(crate) remote: bool,

    /// Include release candidates, betas, and alphas.
    #[arg(long)]
    pub(crate) unstable: bool,

    /// Refetch the release catalog even if the cached copy is fresh.
    #[arg(long, requires = "remote")]
    pub(crate) refresh: bool,
}

#[derive(Debug, Args)]
pub(crate) struct PruneArgs {
    /// Actually remove the versions instead of listing them.
    #[arg(short, long)]
    pub(crate) yes: bool,
}

#[derive(Debug, Args)]
pub(crate) struct InitArgs {
    /// The shell dialect; detected from `$SHELL` when omitted.
    #[arg(value_enum)]
    pub(crate) shell: Option<Shell>,

    /// Write the block into the shell's rc file instead of printing it.
    #[arg(long)]
    pub(crate) apply: bool,

    /// Remove a previously installed block from the rc file.
    #[arg(long, conflicts_with = "apply")]
    pub(crate) remove: bool,
}

#[derive(Debug, Args)]
pub(crate) struct CompletionsArgs {
    /// The shell to generate the completion script for.
    #[arg(value_enum)]
    pub(crate) shell: clap_complete::Shell,
}
