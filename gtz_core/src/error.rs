//! Typed error kinds (§7). Most fallible code in this workspace returns
//! `anyhow::Result`, matching the teacher (`ancf_core`/`ancf_cli` use
//! `anyhow` exclusively). `GtzError` exists only where the CLI needs to pick
//! an exit path or message prefix by *kind* rather than by message text.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GtzError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("input format error at {file}:{line}: {message}")]
    InputFormat {
        file: String,
        line: u64,
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("resource error: {0}")]
    Resource(String),
}

impl GtzError {
    /// Exit code convention used by `gtz_cli`: every kind maps to a distinct
    /// non-zero code so scripts can distinguish failure classes, while the
    /// process still prints a single human-readable diagnostic line.
    pub fn exit_code(&self) -> i32 {
        match self {
            GtzError::Configuration(_) => 2,
            GtzError::InputFormat { .. } => 3,
            GtzError::Io(_) => 4,
            GtzError::Integrity(_) => 5,
            GtzError::Resource(_) => 6,
        }
    }
}
