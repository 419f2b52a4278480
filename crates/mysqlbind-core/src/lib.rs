//! Core types for mysqlbind.
//!
//! This crate holds the vocabulary shared by the binding layer and the
//! drivers built on top of it:
//!
//! - `Error` and its kinds, carrying native errno/SQLSTATE verbatim
//! - `FieldType`, the `buffer_type` of a bind descriptor
//! - `LibraryVersion`, including the `my_bool` to `bool` cutover

pub mod error;
pub mod types;
pub mod version;

pub use error::{
    BindError, BindErrorKind, ConfigError, ConnectionError, ConnectionErrorKind, Error, Result,
    StatementError, StatementErrorKind,
};
pub use types::FieldType;
pub use version::LibraryVersion;
