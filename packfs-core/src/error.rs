//! Error types for the packfs system.

use thiserror::Error;

/// Comprehensive error type for packfs operations.
///
/// The [`Vfs`](crate::Vfs) facade never hands these to its callers; it turns
/// them into sentinels (`None`, `false`, empty listings) and logs them. They
/// surface directly from the lower-level container and layer APIs.
#[derive(Debug, Error)]
pub enum VfsError {
    /// Path is absent from every place that was searched.
    #[error("Path not found: {path}")]
    NotFound {
        path: String,
    },

    /// Invalid path provided.
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath {
        path: String,
        reason: String,
    },

    /// I/O error from the underlying stream or filesystem.
    #[error("I/O error")]
    Io {
        #[from]
        #[source]
        source: std::io::Error,
    },

    /// Container could not be read at all.
    #[error("Malformed container: {reason}")]
    MalformedContainer {
        reason: String,
    },

    /// Entry uses a compression method this reader cannot decode.
    #[error("Unsupported compression method {method} for entry '{name}'")]
    UnsupportedCompression {
        name: String,
        method: u16,
    },

    /// Entry name does not fit in the archive's fixed name field.
    #[error("Entry name '{name}' is longer than {max} bytes")]
    NameTooLong {
        name: String,
        max: usize,
    },

    /// Overlay resolution hit its recursion limit.
    #[error("Overlay resolution for '{path}' exceeded depth {depth}")]
    OverlayDepthExceeded {
        path: String,
        depth: usize,
    },

    /// Configuration failed validation.
    #[error("Invalid configuration: {}", errors.join("; "))]
    InvalidConfig {
        errors: Vec<String>,
    },
}

/// Result type alias for packfs operations.
pub type Result<T> = std::result::Result<T, VfsError>;
