// src/lib.rs

pub mod config;
pub mod convert;
pub mod error;
pub mod fetch;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod store;

pub use config::PipelineConfig;
pub use error::EtlError;
pub use pipeline::{Pipeline, RunSummary};
