//! Data models for labsync.
//!
//! - `Batch`: one remote folder materialized locally
//! - `SampleRecord`: one metadata row with its read file pair

mod batch;
mod sample;

pub use batch::{Batch, FetchStatus};
pub use sample::{
    records_from_json, SampleRecord, R1_FILE_FIELD, R1_PATH_FIELD, R2_FILE_FIELD, SAMPLE_ID_FIELD,
};
