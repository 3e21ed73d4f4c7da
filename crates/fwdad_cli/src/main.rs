//! fwdad - Command Line Front End for Forward-Mode AD Levels
//!
//! # Commands
//!
//! - `fwdad demo` - Walk through nested dual levels step by step
//! - `fwdad jvp --x <values> --dx <values>` - Directional derivative of x·x + sin(x)
//! - `fwdad check` - Print the effective configuration
//!
//! Configuration is layered: defaults, then `--config` file, then `FWDAD_*`
//! environment variables, then the flags below.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use fwdad_core::config::{build_config, ConfigOverrides, ForwardAdConfig};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod error;

pub use error::{CliError, Result};

/// Forward-mode AD level bookkeeping CLI
#[derive(Parser)]
#[command(name = "fwdad")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "FWDAD_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Maximum number of nested levels
    #[arg(long, global = true)]
    max_depth: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the nested dual level walkthrough
    Demo,

    /// Compute f(x) = x·x + sin(x) and its tangent along dx
    Jvp {
        /// Comma-separated input values
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
        x: Vec<f64>,

        /// Comma-separated tangent direction, same length as x
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
        dx: Vec<f64>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check configuration and print the effective settings
    Check,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let overrides = ConfigOverrides {
        config_file: cli.config.clone(),
        max_depth: cli.max_depth,
        log_level: if cli.verbose {
            Some("debug".to_string())
        } else {
            cli.log_level.clone()
        },
    };
    let config = build_config(&overrides)?;

    init_tracing(&config);
    info!(max_depth = config.max_depth, "fwdad starting");

    match cli.command {
        Commands::Demo => commands::demo::run(&config),
        Commands::Jvp { x, dx, json } => commands::jvp::run(&config, &x, &dx, json),
        Commands::Check => commands::check::run(&config),
    }
}

/// Initialise tracing; `RUST_LOG` directives refine the configured level.
fn init_tracing(config: &ForwardAdConfig) {
    let filter = EnvFilter::builder()
        .with_default_directive(config.log_level.to_level_filter().into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
