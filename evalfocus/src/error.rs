use std::path::PathBuf;
use thiserror::Error;

/// Failures the CLI reports with a dedicated exit status.
#[derive(Debug, Error)]
pub enum FocusError {
    #[error("model file does not exist: {0}")]
    ModelNotFound(PathBuf),

    #[error("input image does not exist: {0}")]
    ImageNotFound(PathBuf),

    #[error("failed to decode image {path}: {reason}")]
    ImageDecode { path: PathBuf, reason: String },
}

impl FocusError {
    /// Exit status used when a required input cannot be obtained.
    pub const EXIT_CANTOPEN: i32 = 2;
}
