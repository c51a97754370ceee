use std::fmt::Write;

use anyhow::{Context, Result};
use etcetera::BaseStrategy;

use govman::shell::{self, Shell};
use govman::{Config, Error, Printer};

use crate::cli::{ExitStatus, InitArgs};

pub(crate) fn init(config: &Config, printer: Printer, args: InitArgs) -> Result<ExitStatus> {
    let shell = args
        .shell
        .or_else(Shell::detect)
        .ok_or(Error::ShellUnknown)?;

    if args.remove {
        let rc = rc_file(shell)?;
        if shell::remove_from_rc(&rc)? {
            writeln!(
                printer.stdout(),
                "Removed govman from {}. Restart your shell to apply.",
                rc.display()
            )?;
        } else {
            writeln!(printer.stdout(), "No govman block in {}.", rc.display())?;
        }
        return Ok(ExitStatus::Success);
    }

    let block = shell.render_init(&config.bin_dir());

    if args.apply {
        let rc = rc_file(shell)?;
        shell::install_into_rc(&rc, &block)?;
        writeln!(
            printer.stdout(),
            "Added govman to {}. Restart your shell to apply.",
            rc.display()
        )?;
        return Ok(ExitStatus::Success);
    }

    // Printed for `eval`-style consumption or manual inspection.
    #[allow(clippy::print_stdout)]
    {
        print!("{block}");
    }
    Ok(ExitStatus::Success)
}

fn rc_file(shell: Shell) -> Result<std::path::PathBuf> {
    let home = etcetera::choose_base_strategy()
        .context("could not determine the home directory")?
        .home_dir()
        .to_path_buf();
    shell
        .rc_file(&home)
        .with_context(|| format!("{shell} has no rc file to edit"))
}
