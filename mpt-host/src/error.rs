//! Host error types
//!
//! Re-exports mpt-error and provides host-specific conveniences.

pub use mpt_error::{Error, ErrorKind, ErrorStatus, Result};

use std::path::Path;

// =============================================================================
// Host-specific error constructors
// =============================================================================

/// Create an IoFailed error for a path, keeping the io error as source
pub fn io_error(action: &str, path: &Path, err: std::io::Error) -> Error {
    let kind = match err.kind() {
        std::io::ErrorKind::NotFound => ErrorKind::FileNotFound,
        std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
        _ => ErrorKind::IoFailed,
    };
    Error::new(kind, format!("failed to {} {}: {}", action, path.display(), err))
        .with_context("path", path.display().to_string())
        .set_source(err)
}

/// Create a SerializationFailed error
pub fn serialization_error(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::SerializationFailed, message)
}

/// Create a ParseFailed error
pub fn parse_error(message: impl Into<String>) -> Error {
    Error::parse_failed(message)
}

/// Create a StorageFailed error
pub fn storage_failed(message: impl Into<String>) -> Error {
    Error::storage_failed(message)
}

/// Create a ConfigInvalid error
pub fn config_invalid(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::ConfigInvalid, message)
}

/// Create an InvalidArgument error
pub fn invalid_argument(message: impl Into<String>) -> Error {
    Error::invalid_argument(message)
}

/// Create a FileNotFound error for a store directory that may not be created
pub fn store_not_found(path: &Path) -> Error {
    Error::new(
        ErrorKind::FileNotFound,
        format!("store directory {} does not exist", path.display()),
    )
    .with_context("path", path.display().to_string())
}
