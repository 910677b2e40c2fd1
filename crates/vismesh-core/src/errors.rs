//! Error types for the visual mesh toolkit.

use thiserror::Error;

/// Unified error type for all visual mesh operations.
///
/// Every failure in the toolkit is fail-fast: configuration problems abort
/// before any computation, native-boundary problems abort at startup, and
/// shape violations abort the forward pass that detected them. Nothing here
/// is retried internally.
#[derive(Error, Debug)]
pub enum VisualMeshError {
    /// Configuration validation errors (malformed descriptor, bad widths)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Native operator boundary errors (missing kernel binary, symbol lookup)
    #[error("Native operator error in {context}: {message}")]
    Native { context: String, message: String },

    /// Tensor shape / contract violations
    #[error("Shape error in {context}: {message}")]
    Shape { context: String, message: String },

    /// Numerical errors reported by an operator kernel
    #[error("Numerical error: {0}")]
    Numerical(String),

    /// I/O errors (dataset reading, checkpoint writing)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML export errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl VisualMeshError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        VisualMeshError::Config(message.into())
    }

    /// Creates a native operator error with context.
    pub fn native(context: impl Into<String>, message: impl Into<String>) -> Self {
        VisualMeshError::Native {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Creates a shape error with context.
    pub fn shape(context: impl Into<String>, message: impl Into<String>) -> Self {
        VisualMeshError::Shape {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Creates a numerical error.
    pub fn numerical(message: impl Into<String>) -> Self {
        VisualMeshError::Numerical(message.into())
    }
}

/// Result type alias used throughout the toolkit.
pub type Result<T> = std::result::Result<T, VisualMeshError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_context() {
        let err = VisualMeshError::shape("GraphConvolution::forward", "expected degree 7, got 5");
        let text = err.to_string();
        assert!(text.contains("GraphConvolution::forward"));
        assert!(text.contains("degree 7"));
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: VisualMeshError = io.into();
        assert!(matches!(err, VisualMeshError::Io(_)));
    }
}
