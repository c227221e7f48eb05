//! Command-line interface definition for tarcel.
//!
//! This module defines all CLI commands and their arguments, and runs each
//! one against a [`Tarcel`] built from the configuration file.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tarcel::config::{self, Config};
use tarcel::{CompressionLevel, Tarcel};

/// Command-line interface definition for tarcel.
#[derive(Parser)]
#[command(version, about, long_about = None)]
pub(crate) struct Cli {
    /// Configuration file to use instead of the default one.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    /// Show debug output of every pipeline stage.
    #[arg(short, long, global = true)]
    pub verbose: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    pub commands: Option<Commands>,
}

/// Supported tarcel commands.
#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Pack a directory into a gzip-compressed tarball.
    Pack {
        /// Directory to pack.
        source: PathBuf,
        /// Tarball to write.
        target: PathBuf,
        /// Compression level. Defaults to the configured level.
        #[arg(short, long)]
        level: Option<CompressionLevel>,
    },
    /// Unpack a gzip-compressed tarball into a directory.
    Unpack {
        /// Tarball to read.
        tarball: PathBuf,
        /// Directory to unpack into. Created if missing.
        dir: PathBuf,
    },
    /// Upload a tarball to the remote store.
    Upload {
        /// Object name in the remote store.
        name: String,
        /// Tarball to upload.
        tarball: PathBuf,
    },
    /// Download a tarball from the remote store.
    Download {
        /// Object name in the remote store.
        name: String,
        /// File to write the tarball to.
        tarball: PathBuf,
    },
    /// Check whether a tarball exists in the remote store.
    Exists {
        /// Object name in the remote store.
        name: String,
    },
    /// Remove a tarball from the remote store.
    Remove {
        /// Object name in the remote store.
        name: String,
    },
    /// Display the absolute path of the configuration file.
    Config {
        /// Write a default configuration file if none exists.
        #[arg(long)]
        init: bool,
    },
}

/// Runs one command to completion.
pub(crate) async fn run(commands: Commands, config_path: Option<PathBuf>) -> Result<()> {
    let explicit = config_path.is_some();
    let config_path = match config_path {
        Some(path) => path,
        None => config::config_file()?,
    };

    match commands {
        Commands::Pack {
            source,
            target,
            level,
        } => {
            let tarcel = open(&config_path, explicit)?;
            let tarcel = match level {
                Some(level) => tarcel.with_level(level),
                None => tarcel,
            };
            tarcel
                .pack(&source, &target)
                .await
                .with_context(|| format!("Failed to pack '{}'", source.display()))?;
        }
        Commands::Unpack { tarball, dir } => {
            open(&config_path, explicit)?
                .unpack(&tarball, &dir)
                .await
                .with_context(|| format!("Failed to unpack '{}'", tarball.display()))?;
        }
        Commands::Upload { name, tarball } => {
            let url = open(&config_path, explicit)?
                .upload(&name, &tarball)
                .await
                .with_context(|| format!("Failed to upload '{}'", tarball.display()))?;
            if let Some(url) = url {
                println!("{url}");
            }
        }
        Commands::Download { name, tarball } => {
            let downloaded = open(&config_path, explicit)?
                .download(&name, &tarball)
                .await
                .with_context(|| format!("Failed to download '{name}'"))?;
            println!("{}", downloaded.path.display());
        }
        Commands::Exists { name } => {
            let exists = open(&config_path, explicit)?
                .exists(&name)
                .await
                .with_context(|| format!("Failed to look up '{name}'"))?;
            println!("{exists}");
        }
        Commands::Remove { name } => {
            open(&config_path, explicit)?
                .remove(&name)
                .await
                .with_context(|| format!("Failed to remove '{name}'"))?;
        }
        Commands::Config { init } => show_config(&config_path, init)?,
    }
    Ok(())
}

/// Builds a [`Tarcel`] from the configuration file. A file named with
/// `--config` must exist; the default one may be absent.
fn open(path: &Path, explicit: bool) -> Result<Tarcel> {
    let config = if explicit {
        Config::load(path)?
    } else {
        Config::load_or_default(path)?
    };
    Ok(Tarcel::from_config(&config)?)
}

/// Prints the configuration file path, writing a default file first when
/// `init` is set and none exists.
fn show_config(path: &Path, init: bool) -> Result<()> {
    if init && !path.exists() {
        Config::default().write(path)?;
    }
    println!("config file: {}", path.display());
    Ok(())
}
