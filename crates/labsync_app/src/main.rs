//! labsync command line.
//!
//! Usage:
//!   labsync run --config labsync.toml [--output-folder DIR] [--log-level LEVEL]
//!   labsync check-config --config labsync.toml
//!   labsync init-config [--output labsync.toml]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use labsync_core::config::ConfigManager;
use labsync_core::logging::{init_tracing, LogLevel};
use labsync_core::orchestrator::create_standard_orchestrator;

#[derive(Parser, Debug)]
#[command(name = "labsync")]
#[command(about = "Download, validate and reconcile lab metadata batches", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch every batch, process it and reconcile the drop-off
    Run {
        /// Path to configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Override paths.output_folder
        #[arg(long)]
        output_folder: Option<PathBuf>,

        /// Override logging.level (trace, debug, info, warn, error)
        #[arg(long)]
        log_level: Option<LogLevel>,
    },

    /// Load the configuration and report what would be ignored
    CheckConfig {
        /// Path to configuration file
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Write a commented default configuration file
    InitConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "labsync.toml")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            output_folder,
            log_level,
        } => run_command(config, output_folder, log_level),

        Commands::CheckConfig { config } => check_config_command(config),

        Commands::InitConfig { output } => {
            init_tracing(LogLevel::Info, None);
            ConfigManager::write_default(&output)
                .with_context(|| format!("writing {}", output.display()))?;
            Ok(())
        }
    }
}

fn run_command(
    config_path: PathBuf,
    output_folder: Option<PathBuf>,
    log_level: Option<LogLevel>,
) -> Result<()> {
    let mut config = ConfigManager::new(&config_path);
    config
        .load()
        .with_context(|| format!("loading {}", config_path.display()))?;

    if let Some(folder) = output_folder {
        config.set_output_folder(folder.display().to_string());
    }
    config.ensure_output_folder()?;

    let settings = config.resolved_settings();
    let level = log_level.unwrap_or(settings.logging.level);
    let log_dir = settings.logging.file_log.then(|| config.logs_folder());
    // Held until exit so the log file is flushed.
    let _guard = init_tracing(level, log_dir.as_deref());

    for warning in config.warnings() {
        tracing::warn!("{}", warning);
    }
    tracing::info!(
        "labsync {} starting, output folder {}",
        labsync_core::version(),
        config.output_folder().display()
    );

    let summary = create_standard_orchestrator(&settings).run()?;

    let c = summary.counters;
    tracing::info!(
        "Totals: {} fetched, {} processed, {} failed, {} skipped",
        c.fetched,
        c.processed,
        c.failed,
        c.skipped
    );
    tracing::info!(
        "Samples: {} valid, {} invalid",
        c.valid_samples,
        c.invalid_samples
    );
    if summary.all_valid() {
        tracing::info!("Run summary written to {}", summary.report_path.display());
    } else {
        tracing::warn!(
            "{} units reported errors, see {}",
            summary.logs.invalid_units(),
            summary.report_path.display()
        );
    }
    Ok(())
}

fn check_config_command(config_path: PathBuf) -> Result<()> {
    init_tracing(LogLevel::Info, None);

    let mut config = ConfigManager::new(&config_path);
    config
        .load()
        .with_context(|| format!("loading {}", config_path.display()))?;

    let settings = config.resolved_settings();
    tracing::info!(
        "Config OK: {} warnings; remote root {}, batches to {}",
        config.warnings().len(),
        settings.download.remote_root,
        settings.download.output_location
    );
    Ok(())
}
