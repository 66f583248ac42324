//! Configuration management for labsync.
//!
//! This module provides:
//! - TOML-based configuration with one table per concern
//! - Statically declared stage tables, checked for unknown keys on load
//! - Output-folder placeholder substitution
//! - Atomic file writes (write to temp, then rename)
//!
//! # Example
//!
//! ```no_run
//! use labsync_core::config::ConfigManager;
//!
//! let mut config = ConfigManager::new("labsync.toml");
//! config.load().unwrap();
//! for warning in config.warnings() {
//!     eprintln!("{}", warning);
//! }
//!
//! config.ensure_output_folder().unwrap();
//! let settings = config.resolved_settings();
//! println!("Batches go to {}", settings.download.output_location);
//! ```

mod manager;
mod settings;

pub use manager::{parse_and_check, ConfigError, ConfigManager, ConfigResult, ConfigWarning};
pub use settings::{
    ConfigSection, DownloadSettings, LoggingSettings, PathSettings, ReadLabMetadataSettings,
    Settings, ValidateSettings, OUTPUT_PLACEHOLDERS,
};
