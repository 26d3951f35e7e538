use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod format;

use commands::VitalKind;
use format::OutputFormat;

#[derive(Parser)]
#[command(name = "smartring")]
#[command(author, version, about = "Diagnostics for smart ring telemetry", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconstruct the latest sleep block from a getSleepData dump
    Sleep {
        /// JSON file with the raw reply (`-` for stdin)
        file: PathBuf,
    },

    /// Heart-rate samples, hourly ranges and summary from a getHeartRateData dump
    HeartRate {
        /// JSON file with the raw reply (`-` for stdin)
        file: PathBuf,
    },

    /// Normalize a vitals dump
    Vitals {
        /// Which vital the dump holds
        #[arg(short, long, value_enum)]
        kind: VitalKind,

        /// JSON file with the raw reply (`-` for stdin)
        file: PathBuf,
    },

    /// Today's activity totals from a getStepsData dump
    Steps {
        /// JSON file with the raw reply (`-` for stdin)
        file: PathBuf,
    },

    /// Run the command queue against a simulated ring
    Demo,

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the config file location
    Path,
    /// Print the effective configuration
    Show,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    // When quiet mode is enabled, suppress info-level logging
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    let output = match cli.command {
        Commands::Config { action } => {
            let path = config::resolve_path(config_path);
            match action {
                ConfigAction::Path => format!("{}\n", path.display()),
                ConfigAction::Show => config::load(config_path)?.to_toml_string()?,
                ConfigAction::Init { force } => {
                    config::init(&path, force)?;
                    if !cli.quiet {
                        tracing::info!("Wrote {}", path.display());
                    }
                    String::new()
                }
            }
        }
        Commands::Sleep { file } => {
            let offset = config::load(config_path)?.utc_offset();
            commands::sleep(commands::read_payload(&file)?, offset, cli.format)?
        }
        Commands::HeartRate { file } => {
            let offset = config::load(config_path)?.utc_offset();
            commands::heart_rate(commands::read_payload(&file)?, offset, cli.format)?
        }
        Commands::Vitals { kind, file } => {
            let offset = config::load(config_path)?.utc_offset();
            commands::vitals(kind, commands::read_payload(&file)?, offset, cli.format)?
        }
        Commands::Steps { file } => {
            let offset = config::load(config_path)?.utc_offset();
            commands::steps(commands::read_payload(&file)?, offset, cli.format)?
        }
        Commands::Demo => commands::demo(config::load(config_path)?, cli.format).await?,
    };

    print!("{}", output);
    if cli.format == OutputFormat::Json && !output.ends_with('\n') {
        println!();
    }
    Ok(())
}
