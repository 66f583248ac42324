//! Run orchestration and per-unit reconciliation.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator
//!     ├── Fetcher (once per run)
//!     └── per batch: UnitProcessor
//!             ├── Normalizer
//!             ├── Validator
//!             └── RemoteReconciler (template, invalid uploads, deletes, report)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use labsync_core::config::ConfigManager;
//! use labsync_core::orchestrator::create_standard_orchestrator;
//!
//! let mut config = ConfigManager::new("labsync.toml");
//! config.load().unwrap();
//! config.ensure_output_folder().unwrap();
//!
//! let orchestrator = create_standard_orchestrator(&config.resolved_settings());
//! let summary = orchestrator.run().unwrap();
//! println!("{} units processed", summary.counters.processed);
//! ```

mod errors;
#[cfg(test)]
mod fixtures;
mod runner;
mod types;
mod unit;

pub use errors::{RunError, RunResult, UnitError, UnitResult};
pub use runner::Orchestrator;
pub use types::{RunCounters, RunSummary, UnitOutput};
pub use unit::UnitProcessor;

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Settings;
use crate::remote::{LocalMirror, RemoteClient};
use crate::stages::{CommandNormalizer, CommandValidator, MirrorFetcher};

/// Build the orchestrator for resolved `settings`.
///
/// Wires the mounted drop-off (`download.remote_root`), the mirror
/// fetcher and the command-backed normalize/validate stages.
pub fn create_standard_orchestrator(settings: &Settings) -> Orchestrator {
    let client: Arc<dyn RemoteClient> = Arc::new(LocalMirror::new(&settings.download.remote_root));

    let fetcher = MirrorFetcher::new(client.clone(), &settings.download.output_location)
        .with_target_folders(settings.download.target_folders.clone());

    let processor = UnitProcessor::new(
        Box::new(CommandNormalizer::from_settings(&settings.read_lab_metadata)),
        Box::new(CommandValidator::from_settings(&settings.validate)),
        &settings.paths.template_folder,
    );

    let logs_folder =
        PathBuf::from(&settings.paths.output_folder).join(&settings.paths.logs_subfolder);

    Orchestrator::new(Box::new(fetcher), client, processor, logs_folder)
}
