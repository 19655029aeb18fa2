//! Output path management for exports.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use mediamark_common::config::OutputConfig;
use mediamark_common::error::{MediamarkError, MediamarkResult};

static UNIQUE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Remove any file at `path`. A missing file is not an error.
pub fn ensure_clear(path: &Path) -> MediamarkResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Removed previous output");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(MediamarkError::TempFile {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Clear `path` and make sure its parent directory exists.
pub fn prepare(path: &Path) -> MediamarkResult<()> {
    ensure_clear(path)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| MediamarkError::TempFile {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

/// Best-effort removal of a partial output.
pub fn discard(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "Discarded partial output"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to discard partial output")
        }
    }
}

/// Where an export writes its file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLocation {
    /// The same path every time; each export replaces the last.
    Fixed(PathBuf),
    /// A fresh file per export inside `dir`.
    Unique { dir: PathBuf, extension: String },
}

impl OutputLocation {
    pub fn from_config(config: &OutputConfig) -> Self {
        if config.unique_names {
            OutputLocation::Unique {
                dir: config.dir.clone(),
                extension: Path::new(&config.file_name)
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("mp4")
                    .to_string(),
            }
        } else {
            OutputLocation::Fixed(config.dir.join(&config.file_name))
        }
    }

    /// Path for the next export.
    pub fn resolve(&self) -> PathBuf {
        match self {
            OutputLocation::Fixed(path) => path.clone(),
            OutputLocation::Unique { dir, extension } => {
                let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
                let seq = UNIQUE_COUNTER.fetch_add(1, Ordering::Relaxed);
                dir.join(format!(
                    "mediamark-{stamp}-{}-{seq}.{extension}",
                    std::process::id()
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_clear_removes_stale_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed.mp4");
        std::fs::write(&path, b"stale").unwrap();

        ensure_clear(&path).unwrap();
        assert!(!path.exists());
        // Second call on a missing path is a no-op.
        ensure_clear(&path).unwrap();
    }

    #[test]
    fn test_ensure_clear_reports_undeletable_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("occupied");
        std::fs::create_dir(&path).unwrap();

        let err = ensure_clear(&path).unwrap_err();
        assert!(matches!(err, MediamarkError::TempFile { .. }));
    }

    #[test]
    fn test_prepare_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.mp4");
        prepare(&path).unwrap();
        assert!(path.parent().unwrap().is_dir());
    }

    #[test]
    fn test_unique_location_never_repeats() {
        let location = OutputLocation::Unique {
            dir: PathBuf::from("/tmp/mediamark"),
            extension: "mp4".to_string(),
        };
        let a = location.resolve();
        let b = location.resolve();
        assert_ne!(a, b);
        assert_eq!(a.extension().and_then(|e| e.to_str()), Some("mp4"));
    }

    #[test]
    fn test_fixed_location_from_config() {
        let config = OutputConfig {
            dir: PathBuf::from("/tmp/out"),
            file_name: "processed.mp4".to_string(),
            unique_names: false,
        };
        assert_eq!(
            OutputLocation::from_config(&config).resolve(),
            PathBuf::from("/tmp/out/processed.mp4")
        );
    }
}
