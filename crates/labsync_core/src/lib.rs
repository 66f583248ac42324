//! labsync core - batch wrapper around the lab metadata tools.
//!
//! This crate contains the orchestration and reconciliation logic with
//! zero CLI dependencies:
//! - `config`: TOML settings with per-stage sections
//! - `logging`: tracing setup and the per-unit log aggregator
//! - `models`: batches and sample records
//! - `remote`: remote drop-off client and reconciler
//! - `stages`: fetch / normalize / validate collaborators
//! - `orchestrator`: unit processor and run loop

pub mod config;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod remote;
pub mod stages;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
