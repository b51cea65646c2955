//! Error types for glb-pack

use thiserror::Error;

/// Main error type for packing operations
#[derive(Error, Debug)]
pub enum PackError {
    #[error("Resource not found: '{uri}' (no entry for key '{key}')")]
    ResourceNotFound { uri: String, key: String },

    #[error("Failed to fetch '{uri}': {reason}")]
    Fetch { uri: String, reason: String },

    #[error("Unsupported glTF schema version: {0}")]
    UnsupportedSchemaVersion(String),

    #[error("Image processing failed for image {index}: {source}")]
    ImageProcessing {
        index: usize,
        #[source]
        source: image::ImageError,
    },

    #[error("Scaling not applicable: {0}")]
    ScaleNotApplicable(String),

    #[error("Invalid scale request: {0}")]
    InvalidScaleRequest(String),

    #[error("Invalid glTF document: {0}")]
    InvalidDocument(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Container too large: {0} bytes (GLB lengths are 32-bit)")]
    ContainerTooLarge(u64),

    #[error("Malformed GLB container: {0}")]
    MalformedContainer(String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl PackError {
    /// True for failures that only affect a scaled variant.
    ///
    /// Resolution, planning and encoding failures abort every variant of a
    /// request; these two only abort the variant that asked for scaling.
    pub fn is_variant_local(&self) -> bool {
        matches!(
            self,
            PackError::ScaleNotApplicable(_) | PackError::ImageProcessing { .. }
        )
    }

    /// True when scaling was skipped because it was unnecessary.
    pub fn is_not_applicable(&self) -> bool {
        matches!(self, PackError::ScaleNotApplicable(_))
    }

    pub(crate) fn fetch(uri: &str, reason: impl std::fmt::Display) -> Self {
        PackError::Fetch {
            uri: uri.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for packing operations
pub type Result<T> = std::result::Result<T, PackError>;
