//! Error types for script runtimes.

use thiserror::Error;

/// Errors that can occur while hosting script runtimes.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Script source failed to compile or threw while running.
    #[error("Execution error in runtime '{runtime}': {message}")]
    Execution { runtime: String, message: String },

    /// A function, object or method name did not resolve.
    #[error("Unresolved name: {0}")]
    Resolution(String),

    /// A name resolved to something that cannot be called that way.
    #[error("Not callable: {0}")]
    NotCallable(String),

    /// The script ran, but its result has no host representation.
    #[error("Export error: {0}")]
    Export(String),

    /// A host value could not be handed to the script.
    #[error("Conversion error: {0}")]
    Conversion(String),

    /// Attempt to rebind a read-only global.
    #[error("Read-only binding: {0}")]
    ReadOnlyBinding(String),

    /// The runtime has been shut down.
    #[error("Runtime is shut down: {0}")]
    Shutdown(String),

    /// Configuration failed validation.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl RuntimeError {
    pub(crate) fn execution(runtime: &str, err: impl std::fmt::Display) -> Self {
        RuntimeError::Execution {
            runtime: runtime.to_string(),
            message: err.to_string(),
        }
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;
