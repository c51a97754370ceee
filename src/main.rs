use std::process::ExitCode;
use std::str::FromStr;

use anstream::eprintln;
use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use govman::cleanup::cleanup;
use govman::config::govman_home;
use govman::manager::Manager;
use govman::{warnings, Config, Printer};

use crate::cli::{Cli, Command, ExitStatus};

mod cli;

fn setup_logging(verbose: u8) -> Result<()> {
    let directive = match verbose {
        0 => LevelFilter::OFF.into(),
        1 => Directive::from_str("govman=debug")?,
        _ => Directive::from_str("govman=trace")?,
    };

    let filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env()
        .context("Invalid RUST_LOG directive")?;
    let format = tracing_subscriber::fmt::format().with_target(false);
    let layer = tracing_subscriber::fmt::layer()
        .event_format(format)
        .with_writer(anstream::stderr)
        .with_filter(filter);

    tracing_subscriber::registry().with(layer).init();
    Ok(())
}

async fn run(cli: Cli) -> Result<ExitStatus> {
    anstream::ColorChoice::write_global(cli.globals.color.into());
    setup_logging(cli.globals.verbose)?;

    let printer = if cli.globals.quiet {
        Printer::Quiet
    } else if cli.globals.verbose > 0 {
        Printer::Verbose
    } else if cli.globals.no_progress {
        Printer::NoProgress
    } else {
        Printer::Default
    };

    if cli.globals.quiet {
        warnings::disable();
    } else {
        warnings::enable();
    }

    if let Command::Completions(args) = &cli.command {
        clap_complete::generate(
            args.shell,
            &mut Cli::command(),
            "govman",
            &mut std::io::stdout(),
        );
        return Ok(ExitStatus::Success);
    }

    let token = CancellationToken::new();
    let interrupt_token = token.clone();
    let _ = ctrlc::set_handler(move || {
        interrupt_token.cancel();
        cleanup();
        #[allow(clippy::exit)]
        std::process::exit(130);
    });

    let home = govman_home()?;
    debug!("govman home: {}", home.display());
    let config = Config::load(&home)?;

    match cli.command {
        Command::Init(args) => cli::init(&config, printer, args),
        command => {
            let manager = Manager::new(config, printer, token)?;
            match command {
                Command::Install(args) => cli::install(&manager, printer, args).await,
                Command::Uninstall(args) => cli::uninstall(&manager, printer, args).await,
                Command::Use(args) => cli::use_version(&manager, printer, args).await,
                Command::Current => cli::current(&manager, printer).await,
                Command::List(args) => cli::list(&manager, printer, args).await,
                Command::Prune(args) => cli::prune(&manager, printer, args).await,
                Command::Clean => cli::clean(&manager, printer),
                Command::Init(_) | Command::Completions(_) => unreachable!(),
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Usage errors exit 2, `--help`/`--version` exit 0; clap handles both.
    let cli = Cli::parse();

    match run(cli).await {
        Ok(status) => status.into(),
        Err(err) => {
            let code = err
                .chain()
                .find_map(|cause| cause.downcast_ref::<govman::Error>())
                .map_or(1, govman::Error::exit_code);

            eprintln!("{}: {err}", "error".red().bold());
            for cause in err.chain().skip(1) {
                eprintln!("  {}: {cause}", "caused by".red());
            }
            ExitCode::from(code)
        }
    }
}
