// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Failure kinds the pipeline must be able to tell apart.
///
/// Everything else travels as a plain `anyhow::Error` with context attached;
/// these variants are wrapped into it and can be recovered with
/// `err.downcast_ref::<EtlError>()`.
#[derive(Debug, Error)]
pub enum EtlError {
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("{path} is not valid {encoding} text")]
    Decode {
        path: PathBuf,
        encoding: &'static str,
    },

    #[error("country dimension must hold exactly one row to attribute facts, found {0}")]
    CountryCardinality(usize),

    #[error("failed to persist table '{table}' to {path}: {reason}")]
    Store {
        table: String,
        path: PathBuf,
        reason: String,
    },
}
