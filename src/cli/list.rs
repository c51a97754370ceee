use std::fmt::Write;

use anyhow::Result;
use owo_colors::OwoColorize;

use govman::manager::Manager;
use govman::Printer;

use crate::cli::{ExitStatus, ListArgs};

pub(crate) async fn list(manager: &Manager, printer: Printer, args: ListArgs) -> Result<ExitStatus> {
    if args.remote {
        if args.refresh {
            manager.catalog().refresh().await?;
        }
        for version in manager.catalog().available(args.unstable).await? {
            writeln!(printer.stdout(), "go{version}")?;
        }
        return Ok(ExitStatus::Success);
    }

    let installed = manager.installed()?;
    if installed.is_empty() {
        writeln!(
            printer.stdout(),
            "No Go versions installed. Run `govman install latest` to get started."
        )?;
        return Ok(ExitStatus::Success);
    }

    let default = manager.config().default_version.clone();
    for version in installed {
        if default.as_ref() == Some(&version) {
            writeln!(
                printer.stdout(),
                "go{version} {}",
                "(default)".dimmed()
            )?;
        } else {
            writeln!(printer.stdout(), "go{version}")?;
        }
    }
    Ok(ExitStatus::Success)
}
