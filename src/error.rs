//! Error types for the document composer

use thiserror::Error;

/// Result type alias for composer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while rendering, composing or publishing documents
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to launch the browser or prepare a context
    #[error("Engine initialization failed: {0}")]
    InitializationError(String),

    /// Failed to load a URL
    #[error("Failed to load URL: {0}")]
    LoadError(String),

    /// Failed to render or print content
    #[error("Rendering failed: {0}")]
    RenderError(String),

    /// Failed to execute JavaScript in the page
    #[error("Script execution failed: {0}")]
    ScriptError(String),

    /// Operation timed out
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// The page loaded but still shows placeholder or unrendered content
    #[error("Content not ready: {0}")]
    ContentNotReady(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Network error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// PDF parsing or serialization failed
    #[error("PDF error: {0}")]
    PdfError(String),

    /// Every part handed to a merge was absent
    #[error("Nothing to merge: all parts are absent")]
    EmptyMerge,

    /// The external prepress tool failed
    #[error("Prepress optimization failed: {0}")]
    OptimizerError(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CDP-specific error
    #[cfg(feature = "cdp")]
    #[error("CDP error: {0}")]
    CdpError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether a batch may retry the attempt that produced this error.
    ///
    /// `ContentNotReady` is always retryable. Navigation failures and
    /// timeouts are retried only when `retry_load_failures` is set.
    pub fn is_retryable(&self, retry_load_failures: bool) -> bool {
        match self {
            Error::ContentNotReady(_) => true,
            Error::LoadError(_) | Error::Timeout(_) => retry_load_failures,
            _ => false,
        }
    }
}

#[cfg(feature = "cdp")]
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::CdpError(err.to_string())
    }
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        Error::PdfError(err.to_string())
    }
}
