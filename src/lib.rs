pub mod analysis;
pub mod commands;
pub mod error;
pub mod models;

pub use commands::pipeline::{run_gold_internal, run_pipeline};
pub use error::{PipelineError, PipelineResult, ValidationError};
