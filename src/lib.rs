pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod processor;
pub mod storage;

pub use error::{PipelineError, Result};
