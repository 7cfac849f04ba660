//! Error kinds for trie operations

use std::fmt;

/// The kind of error that occurred.
///
/// This enum categorizes errors to help users write clear error handling logic.
/// Users can match on ErrorKind to decide how to handle specific error cases.
/// Note that an absent key is never an error: lookups return `None` for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // =========================================================================
    // General errors
    // =========================================================================
    /// An unexpected error occurred - catch-all for unhandled cases
    Unexpected,

    /// The requested feature or operation is not supported
    Unsupported,

    /// Invalid configuration or parameters
    ConfigInvalid,

    /// Invalid argument passed to function
    InvalidArgument,

    // =========================================================================
    // Trie structure errors
    // =========================================================================
    /// Hex-prefix flag bits are inconsistent with the encoded path
    MalformedPath,

    /// Stored bytes do not decode into a valid node
    CorruptNode,

    /// A referenced digest is absent from the backing store
    MissingNode,

    /// A branch violates the two-children-or-value invariant
    InvalidBranchShape,

    /// The walker found a node that is its own ancestor
    CyclicParent,

    /// A proof does not authenticate against the given root
    InvalidProof,

    // =========================================================================
    // Storage errors
    // =========================================================================
    /// Storage operation failed
    StorageFailed,

    /// Serialization/deserialization failed
    SerializationFailed,

    // =========================================================================
    // IO errors
    // =========================================================================
    /// File not found
    FileNotFound,

    /// Permission denied
    PermissionDenied,

    /// IO operation failed
    IoFailed,

    // =========================================================================
    // Parse errors
    // =========================================================================
    /// Failed to parse input
    ParseFailed,
}

impl ErrorKind {
    /// Returns the error kind as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            // General
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::Unsupported => "Unsupported",
            ErrorKind::ConfigInvalid => "ConfigInvalid",
            ErrorKind::InvalidArgument => "InvalidArgument",

            // Trie
            ErrorKind::MalformedPath => "MalformedPath",
            ErrorKind::CorruptNode => "CorruptNode",
            ErrorKind::MissingNode => "MissingNode",
            ErrorKind::InvalidBranchShape => "InvalidBranchShape",
            ErrorKind::CyclicParent => "CyclicParent",
            ErrorKind::InvalidProof => "InvalidProof",

            // Storage
            ErrorKind::StorageFailed => "StorageFailed",
            ErrorKind::SerializationFailed => "SerializationFailed",

            // IO
            ErrorKind::FileNotFound => "FileNotFound",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::IoFailed => "IoFailed",

            // Parse
            ErrorKind::ParseFailed => "ParseFailed",
        }
    }

    /// Check if this error kind is retryable by default.
    ///
    /// Only storage-side failures qualify; the trie engine itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::StorageFailed | ErrorKind::IoFailed)
    }

    /// Structural corruption of the trie, as opposed to bad caller input.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ErrorKind::CorruptNode
                | ErrorKind::MissingNode
                | ErrorKind::InvalidBranchShape
                | ErrorKind::CyclicParent
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
