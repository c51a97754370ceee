use std::fmt::Write;

use anyhow::Result;
use owo_colors::OwoColorize;

use govman::manager::Manager;
use govman::{Printer, VersionSpec};

use crate::cli::{ExitStatus, InstallArgs};

pub(crate) async fn install(
    manager: &Manager,
    printer: Printer,
    args: InstallArgs,
) -> Result<ExitStatus> {
    let specs = args
        .versions
        .iter()
        .map(|raw| raw.parse::<VersionSpec>())
        .collect::<Result<Vec<_>, _>>()?;

    let mut report = manager.install(&specs, args.unstable).await?;

    for version in &report.installed {
        writeln!(
            printer.stdout(),
            "{} go{version} installed",
            "✓".green().bold()
        )?;
    }
    for version in &report.skipped {
        writeln!(
            printer.stdout(),
            "{}",
            govman::Error::AlreadyInstalled(version.clone())
        )?;
    }
    if let Some(version) = &report.made_default {
        writeln!(printer.stdout(), "Set go{version} as the default version")?;
    }

    // A batch that failed outright propagates its single cause so the exit
    // code reflects it; partial failures are reported per item.
    if report.failed.len() == 1 && report.installed.is_empty() && report.skipped.is_empty() {
        let (spec, err) = report.failed.remove(0);
        return Err(anyhow::Error::from(err).context(format!("failed to install {spec}")));
    }
    for (spec, err) in &report.failed {
        writeln!(
            printer.stderr(),
            "{}: failed to install {spec}: {err}",
            "error".red().bold()
        )?;
    }

    if report.failed.is_empty() {
        Ok(ExitStatus::Success)
    } else {
        Ok(ExitStatus::Failure)
    }
}
