use std::fmt::Write;

use anyhow::Result;
use indicatif::HumanBytes;
use owo_colors::OwoColorize;

use govman::manager::Manager;
use govman::{Printer, Version};

use crate::cli::{ExitStatus, UninstallArgs};

pub(crate) async fn uninstall(
    manager: &Manager,
    printer: Printer,
    args: UninstallArgs,
) -> Result<ExitStatus> {
    let versions = args
        .versions
        .iter()
        .map(|raw| raw.parse::<Version>())
        .collect::<Result<Vec<_>, _>>()?;

    let mut report = manager.uninstall(&versions).await?;

    for version in &report.removed {
        writeln!(printer.stdout(), "Uninstalled go{version}")?;
    }
    if !report.removed.is_empty() {
        writeln!(
            printer.stdout(),
            "Freed {}",
            HumanBytes(report.freed_bytes)
        )?;
    }

    if report.failed.len() == 1 && report.removed.is_empty() {
        let (version, err) = report.failed.remove(0);
        return Err(anyhow::Error::from(err).context(format!("failed to uninstall {version}")));
    }
    for (version, err) in &report.failed {
        writeln!(
            printer.stderr(),
            "{}: failed to uninstall {version}: {err}",
            "error".red().bold()
        )?;
    }

    if report.failed.is_empty() {
        Ok(ExitStatus::Success)
    } else {
        Ok(ExitStatus::Failure)
    }
}
