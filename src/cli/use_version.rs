use std::fmt::Write;

use anyhow::{Context, Result};

use govman::fs::Simplified;
use govman::manager::{Manager, Scope};
use govman::shell::Shell;
use govman::{Error, Printer, VersionSpec};

use crate::cli::{ExitStatus, UseArgs};

pub(crate) async fn use_version(
    manager: &Manager,
    printer: Printer,
    args: UseArgs,
) -> Result<ExitStatus> {
    let spec: VersionSpec = args.version.parse()?;
    let scope = if args.default {
        Scope::Default
    } else if args.local {
        Scope::Local
    } else {
        Scope::Session
    };

    let shell = match scope {
        Scope::Session => Some(
            args.shell
                .or_else(Shell::detect)
                .ok_or(Error::ShellUnknown)?,
        ),
        _ => args.shell,
    };

    let outcome = manager
        .use_version(&spec, scope, shell)
        .await
        .with_context(|| format!("failed to activate {spec}"))?;

    match scope {
        Scope::Session => {
            // The stdout contract: exactly one PATH-update statement, which
            // the shell wrapper validates and evaluates. Never suppressed.
            #[allow(clippy::print_stdout)]
            {
                println!(
                    "{}",
                    outcome
                        .statement
                        .expect("The session scope always yields a statement")
                );
            }
        }
        Scope::Default => {
            writeln!(printer.stdout(), "Now using go{} (default)", outcome.version)?;
        }
        Scope::Local => {
            let pin_file = outcome
                .pin_file
                .expect("The local scope always writes a pin file");
            writeln!(
                printer.stdout(),
                "Pinned {spec} in {} (resolves to go{})",
                pin_file.user_display(),
                outcome.version
            )?;
        }
    }

    Ok(ExitStatus::Success)
}
