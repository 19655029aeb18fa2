//! Results handed back by a processing call.

use std::path::{Path, PathBuf};

use mediamark_common::error::MediamarkResult;
use serde::{Deserialize, Serialize};

/// Artifact produced by a successful processing call.
///
/// Video items fill `processed_url`; image items fill `image`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MediaProcessResult {
    pub processed_url: Option<PathBuf>,
    pub image: Option<PathBuf>,
}

impl MediaProcessResult {
    pub fn video(path: impl Into<PathBuf>) -> Self {
        Self {
            processed_url: Some(path.into()),
            image: None,
        }
    }

    pub fn image(path: impl Into<PathBuf>) -> Self {
        Self {
            processed_url: None,
            image: Some(path.into()),
        }
    }

    /// Whichever artifact is present.
    pub fn artifact(&self) -> Option<&Path> {
        self.processed_url.as_deref().or(self.image.as_deref())
    }
}

/// Outcome of one processing call: exactly one of artifact or error.
pub type ProcessOutcome = MediamarkResult<MediaProcessResult>;
