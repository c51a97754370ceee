use std::fmt::Write;

use anyhow::Result;
use indicatif::HumanBytes;
use owo_colors::OwoColorize;

use govman::manager::Manager;
use govman::Printer;

use crate::cli::{ExitStatus, PruneArgs};

pub(crate) async fn prune(manager: &Manager, printer: Printer, args: PruneArgs) -> Result<ExitStatus> {
    let candidates = manager.prune_candidates().await?;
    if candidates.is_empty() {
        writeln!(printer.stdout(), "Nothing to prune.")?;
        return Ok(ExitStatus::Success);
    }

    if !args.yes {
        writeln!(printer.stdout(), "Would remove:")?;
        for version in &candidates {
            writeln!(printer.stdout(), "  go{version}")?;
        }
        writeln!(
            printer.stdout(),
            "Run `govman prune --yes` to remove them."
        )?;
        return Ok(ExitStatus::Success);
    }

    let report = manager.prune().await?;
    for version in &report.removed {
        writeln!(printer.stdout(), "Removed go{version}")?;
    }
    writeln!(
        printer.stdout(),
        "Freed {}",
        HumanBytes(report.freed_bytes)
    )?;

    for (version, err) in &report.failed {
        writeln!(
            printer.stderr(),
            "{}: failed to remove {version}: {err}",
            "error".red().bold()
        )?;
    }
    if report.failed.is_empty() {
        Ok(ExitStatus::Success)
    } else {
        Ok(ExitStatus::Failure)
    }
}
