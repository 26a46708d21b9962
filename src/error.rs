//! Error types for the zone store.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by [`crate::zones::ZoneStore`] mutations.
#[derive(Error, Debug)]
pub enum ZoneError {
    #[error("zone {width}x{height} is too small (both sides must exceed {min} px)")]
    Degenerate { width: u32, height: u32, min: u32 },

    #[error("failed to persist zones to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode zones: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ZoneError {
    pub fn is_degenerate(&self) -> bool {
        matches!(self, Self::Degenerate { .. })
    }
}
