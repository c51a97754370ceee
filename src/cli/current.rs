use std::fmt::Write;

use anyhow::Result;

use govman::manager::Manager;
use govman::Printer;

use crate::cli::ExitStatus;

pub(crate) async fn current(manager: &Manager, printer: Printer) -> Result<ExitStatus> {
    let report = manager.current().await?;
    writeln!(printer.stdout(), "go{} ({})", report.version, report.method)?;
    Ok(ExitStatus::Success)
}
