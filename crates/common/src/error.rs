//! Error types shared across Framecast crates.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for Framecast operations.
///
/// Enumeration and selection errors abort before any stream is opened.
/// Once capturing, only the stop path can fail, and its variants always
/// carry the artifact path.
#[derive(Debug, thiserror::Error)]
pub enum FramecastError {
    #[error("Platform query failed: {message}")]
    PlatformQuery { message: String },

    #[error("No recordable surfaces found")]
    NothingRecordable,

    #[error("Invalid selection: {message}")]
    InvalidSelection { message: String },

    #[error("Surface not found (ID: {id})")]
    SurfaceNotFound { id: u64 },

    #[error("Failed to start capture: {message}")]
    CaptureStart { message: String },

    #[error("Finalize did not complete within {}s; {} may be corrupt", timeout.as_secs(), path.display())]
    FinalizeTimeout { path: PathBuf, timeout: Duration },

    #[error("Failed to finalize {}: {message}", path.display())]
    Finalize { path: PathBuf, message: String },

    #[error("Capture error: {message}")]
    Capture { message: String },

    #[error("Encode error: {message}")]
    Encode { message: String },

    #[error("Platform error: {message}")]
    Platform { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using FramecastError.
pub type FramecastResult<T> = Result<T, FramecastError>;

impl FramecastError {
    pub fn platform_query(msg: impl Into<String>) -> Self {
        Self::PlatformQuery {
            message: msg.into(),
        }
    }

    pub fn invalid_selection(msg: impl Into<String>) -> Self {
        Self::InvalidSelection {
            message: msg.into(),
        }
    }

    pub fn capture_start(msg: impl Into<String>) -> Self {
        Self::CaptureStart {
            message: msg.into(),
        }
    }

    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture {
            message: msg.into(),
        }
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode {
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

    /// Path of the artifact a stop-path failure left behind.
    pub fn artifact_path(&self) -> Option<&PathBuf> {
        match self {
            Self::FinalizeTimeout { path, .. } | Self::Finalize { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Short operator guidance for caller-input errors.
    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            Self::InvalidSelection { .. } => {
                Some("Use `desktop`, `id:<surface-id>`, or a number from `framecast list`")
            }
            Self::SurfaceNotFound { .. } => {
                Some("Surface IDs change between runs; re-run `framecast list` or `framecast pick`")
            }
            Self::NothingRecordable => Some("Open a window or record the whole screen with `desktop`"),
            Self::PlatformQuery { .. } => Some("Run `framecast check` to see which capabilities are missing"),
            _ => None,
        }
    }
}
