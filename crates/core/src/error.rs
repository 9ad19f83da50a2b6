//! Error types for officekit.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the officekit library.
#[derive(Error, Debug)]
pub enum OfficeError {
    /// A document operation was attempted before the engine was initialized.
    #[error("Office engine is not initialized; call initialize() first")]
    Uninitialized,

    /// No LibreOffice installation could be located.
    #[error("LibreOffice not found. Please install LibreOffice or set EngineConfig::install_dir")]
    EngineNotFound,

    /// The engine library was found but could not be started.
    #[error("Failed to start office engine: {message}")]
    EngineStartFailed { message: String },

    /// The engine refused to load a document.
    #[error("Failed to open '{path}': {message}")]
    OpenFailed { path: PathBuf, message: String },

    /// The engine failed to write a document.
    #[error("Failed to save '{path}' as {format}: {message}")]
    SaveFailed {
        path: PathBuf,
        format: String,
        message: String,
    },

    /// The session was used after `close()`.
    #[error("Document session for '{path}' is closed")]
    Closed { path: PathBuf },

    /// Page, sheet or slide index outside the document.
    #[error("Page index {index} out of range (document has {count} pages)")]
    PageOutOfRange { index: usize, count: usize },

    /// Requested tile dimensions are zero or too large.
    #[error("Invalid tile dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// A tile buffer could not be allocated.
    #[error("Out of memory allocating a {bytes} byte tile buffer")]
    OutOfMemory { bytes: usize },

    /// `destroy()` was called while document sessions are still open.
    #[error("Cannot destroy office engine while {count} document session(s) are open")]
    SessionsOpen { count: usize },

    /// PNG encoding failed.
    #[error("PNG encoding failed: {0}")]
    PngEncodingError(String),

    /// Output directory or file could not be written.
    #[error("Failed to write output '{path}': {message}")]
    OutputDirError { path: PathBuf, message: String },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A blocking task on the background pool panicked or was cancelled.
    #[error("Background task failed: {0}")]
    TaskFailed(String),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of an [`OfficeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Engine not initialized.
    Uninitialized,
    /// Document could not be loaded.
    OpenFailure,
    /// Save/export step failed.
    ConversionFailure,
    /// Allocation failure.
    ResourceExhausted,
    /// Operation on a closed session.
    UseAfterClose,
    /// Bad index, dimensions or configuration.
    InvalidArgument,
    /// Engine startup or teardown problem.
    Lifecycle,
    /// Filesystem or encoding problem outside the engine.
    Io,
}

impl OfficeError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            OfficeError::Uninitialized => ErrorKind::Uninitialized,
            OfficeError::OpenFailed { .. } => ErrorKind::OpenFailure,
            OfficeError::SaveFailed { .. } => ErrorKind::ConversionFailure,
            OfficeError::OutOfMemory { .. } => ErrorKind::ResourceExhausted,
            OfficeError::Closed { .. } => ErrorKind::UseAfterClose,
            OfficeError::PageOutOfRange { .. }
            | OfficeError::InvalidDimensions { .. }
            | OfficeError::InvalidConfig(_) => ErrorKind::InvalidArgument,
            OfficeError::EngineNotFound
            | OfficeError::EngineStartFailed { .. }
            | OfficeError::SessionsOpen { .. }
            | OfficeError::TaskFailed(_) => ErrorKind::Lifecycle,
            OfficeError::PngEncodingError(_)
            | OfficeError::OutputDirError { .. }
            | OfficeError::Io(_) => ErrorKind::Io,
        }
    }
}

/// Result type alias for convenience.
pub type Result<T> = std::result::Result<T, OfficeError>;

impl From<tokio::task::JoinError> for OfficeError {
    fn from(e: tokio::task::JoinError) -> Self {
        OfficeError::TaskFailed(e.to_string())
    }
}
