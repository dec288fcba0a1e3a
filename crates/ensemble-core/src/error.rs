//! Engine error codes

use thiserror::Error;

/// Errors reported by engine operations.
///
/// The success case is carried by `Ok`; these are the failure codes shared
/// by the engine, the backends, and source loaders built on top of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Some parameter is invalid
    #[error("some parameter is invalid")]
    InvalidParameter,

    /// File not found
    #[error("file not found")]
    FileNotFound,

    /// File found, but could not be loaded
    #[error("file found, but could not be loaded")]
    FileLoadFailed,

    /// Shared library not found, or wrong version
    #[error("shared library not found, or wrong version")]
    DllNotFound,

    /// Out of memory
    #[error("out of memory")]
    OutOfMemory,

    /// Feature not implemented
    #[error("feature not implemented")]
    NotImplemented,

    /// Other error
    #[error("other error")]
    Unknown,
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
