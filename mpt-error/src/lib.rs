//! # mpt-error
//!
//! Unified error handling for the mpt workspace, following OpenDAL's error handling practices.
//!
//! ## Design Philosophy
//!
//! - **ErrorKind**: Know what error occurred (e.g., MissingNode, CorruptNode)
//! - **ErrorStatus**: Decide how to handle it (Permanent, Temporary, Persistent)
//! - **Error Context**: Assist in locating the cause with rich context
//! - **Error Source**: Wrap underlying errors without leaking raw types
//!
//! ## Usage
//!
//! ```rust
//! use mpt_error::{Error, ErrorKind};
//!
//! fn example() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::MissingNode, "node not present in store")
//!         .with_operation("trie::get")
//!         .with_context("digest", "0x56e8..")
//!         .with_context("depth", "3"))
//! }
//! ```
//!
//! ## Principles
//!
//! - All functions return `Result<T, mpt_error::Error>`
//! - External errors are wrapped with `set_source(err)`
//! - Same error handled once, subsequent ops only append context
//! - Don't abuse `From<OtherError>` to prevent raw error leakage

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using the mpt Error
pub type Result<T> = std::result::Result<T, Error>;
