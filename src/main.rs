mod commands;
mod sysexits;

use crate::commands::Cli;
use clap::Parser;
use std::process;
use tokio::runtime::Builder;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Entry point for the tarcel CLI application.
/// Parses command-line arguments and runs the requested operation.
fn main() {
    let cli = Cli::parse();
    let commands = match cli.commands {
        Some(commands) => commands,
        None => {
            eprintln!(
                "tarcel requires at least one command to execute. See 'tarcel --help' for usage."
            );
            process::exit(sysexits::EX_KEYWORD);
        }
    };

    let default_filter = if cli.verbose {
        "tarcel=debug"
    } else {
        "tarcel=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let rt = match Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to start the async runtime: {e}");
            process::exit(sysexits::EX_SOFTWARE);
        }
    };

    if let Err(e) = rt.block_on(commands::run(commands, cli.config)) {
        eprintln!("Error: {e:#}");
        process::exit(sysexits::exit_code(&e));
    }
}
