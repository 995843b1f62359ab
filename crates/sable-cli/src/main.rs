//! Sable CLI - command-line shell over the Sable editor core.

mod exec;
mod render;
mod watch;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sable_core::Config;

#[derive(Parser)]
#[command(name = "sable")]
#[command(about = "Command-line shell over the Sable editor core")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to $SABLE_CONFIG or the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a shell command, streaming its output and forwarding stdin lines
    Exec {
        /// Command line passed to the shell
        command: String,

        /// Working directory
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Watch a source file or directory and report changes
    Watch {
        /// Path to watch
        path: PathBuf,
    },

    /// Print the effective configuration as JSON
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::discover()?,
    };

    match cli.command {
        Commands::Exec { command, dir } => {
            let code = exec::execute(&config, &command, dir.as_deref())?;
            std::process::exit(code);
        }

        Commands::Watch { path } => watch::execute(&config, &path)?,

        Commands::Config => println!("{}", serde_json::to_string_pretty(&config)?),
    }

    Ok(())
}
