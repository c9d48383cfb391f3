//! Error types for capy-icons
//!
//! None of these cross the engine's public surface: every failure degrades to
//! a placeholder bitmap, an `Option` or a `bool` at the boundary.

use crate::source::Tier;
use std::path::PathBuf;

/// Icon engine errors
#[derive(Debug, thiserror::Error)]
pub enum IconError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// A tier of the extraction chain found nothing.
    #[error("No {tier:?} icon found for {path:?}")]
    ExtractionMiss { path: PathBuf, tier: Tier },

    /// The artifact exists but is too small to be a real image.
    #[error("Degenerate artifact {path:?} ({size} bytes)")]
    Degenerate { path: PathBuf, size: u64 },

    /// The artifact is large enough but does not decode.
    #[error("Corrupt artifact {path:?}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Failed to persist {path:?}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: Box<IconError>,
    },

    #[error("Config error: {0}")]
    Config(String),
}

impl IconError {
    /// Artifacts in this state are deleted and regenerated on next encounter.
    pub fn is_repairable(&self) -> bool {
        matches!(self, IconError::Degenerate { .. } | IconError::Corrupt { .. })
    }
}

pub type IconResult<T> = Result<T, IconError>;
