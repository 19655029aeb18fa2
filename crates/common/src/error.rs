//! Error types shared across Mediamark crates.

use std::path::PathBuf;

/// Top-level error type for Mediamark operations.
#[derive(Debug, thiserror::Error)]
pub enum MediamarkError {
    #[error("Track insertion failed: {message}")]
    TrackInsertion { message: String },

    #[error("Export failed: {message}")]
    ExportBackend { message: String },

    #[error("Export cancelled")]
    ExportCancelled,

    #[error("Could not prepare output at {}: {source}", path.display())]
    TempFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Overlay content unavailable: {message}")]
    ContentResolution { message: String },

    #[error("Asset error: {message}")]
    Asset { message: String },

    #[error("Export job {job_id} is still running")]
    ExportInProgress { job_id: u64 },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using MediamarkError.
pub type MediamarkResult<T> = Result<T, MediamarkError>;

/// Coarse classification of a [`MediamarkError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TrackInsertion,
    ExportBackend,
    TempFile,
    ContentResolution,
    Asset,
    Busy,
    Config,
    Unsupported,
    Io,
    Other,
}

impl MediamarkError {
    pub fn track_insertion(msg: impl Into<String>) -> Self {
        Self::TrackInsertion {
            message: msg.into(),
        }
    }

    pub fn export_backend(msg: impl Into<String>) -> Self {
        Self::ExportBackend {
            message: msg.into(),
        }
    }

    pub fn content_resolution(msg: impl Into<String>) -> Self {
        Self::ContentResolution {
            message: msg.into(),
        }
    }

    pub fn asset(msg: impl Into<String>) -> Self {
        Self::Asset {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Classify this error. Cancellation counts as an export backend outcome.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TrackInsertion { .. } => ErrorKind::TrackInsertion,
            Self::ExportBackend { .. } | Self::ExportCancelled => ErrorKind::ExportBackend,
            Self::TempFile { .. } => ErrorKind::TempFile,
            Self::ContentResolution { .. } => ErrorKind::ContentResolution,
            Self::Asset { .. } | Self::FileNotFound { .. } => ErrorKind::Asset,
            Self::ExportInProgress { .. } => ErrorKind::Busy,
            Self::Config { .. } | Self::Json(_) => ErrorKind::Config,
            Self::Unsupported { .. } => ErrorKind::Unsupported,
            Self::Io(_) => ErrorKind::Io,
            Self::Other(_) => ErrorKind::Other,
        }
    }

    /// Whether this error reports a cancelled export.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::ExportCancelled)
    }
}
