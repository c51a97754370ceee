use std::fmt::Write;

use anyhow::Result;
use indicatif::HumanBytes;

use govman::manager::Manager;
use govman::Printer;

use crate::cli::ExitStatus;

pub(crate) fn clean(manager: &Manager, printer: Printer) -> Result<ExitStatus> {
    let freed = manager.clean()?;
    writeln!(printer.stdout(), "Cleaned cache, freed {}", HumanBytes(freed))?;
    Ok(ExitStatus::Success)
}
