//! Utility modules shared across the pipeline.

pub mod http;
pub mod json;
pub mod path;
pub mod retry;
