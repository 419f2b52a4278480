//! Version-portable prepared-statement binding for libmysqlclient.
//!
// FFI bindings require unsafe code - this is expected for database drivers
#![allow(unsafe_code)]
//!
//! `MYSQL_BIND` changed shape in client library 8.0: the null and error
//! flags went from a one-byte `my_bool` to a C `bool`. This crate gives
//! callers one descriptor type, [`MysqlBind`], and converts it to whatever
//! the linked library expects around every bind and fetch call.
//!
//! # Layers
//!
//! - [`codec`]: `bool` to and from the library's flag representation
//! - [`marshal`]: stable to native descriptor conversion and the
//!   [`StatementBinder`] that drives bind, fetch and release
//! - [`alloc`]: the shadow cells the legacy representation needs
//! - `connection` / `statement` (feature `native`): safe-ish wrappers over
//!   the real client library
//!
//! # Example
//!
//! ```rust,ignore
//! use mysqlbind::{ClientConfig, Connection, FetchStatus, FieldType, MysqlBind};
//!
//! let conn = Connection::connect(&ClientConfig::from_url("mysql://app@localhost/shop")?)?;
//! let mut stmt = conn.prepare("INSERT INTO t VALUES (?, ?)")?;
//!
//! let mut id: i32 = 1;
//! let mut name_null = true;
//! let mut params = [
//!     MysqlBind::new(FieldType::Long).with_scalar(&mut id),
//!     MysqlBind::new(FieldType::VarString).with_is_null(&mut name_null),
//! ];
//! unsafe { stmt.bind_params(&mut params)? };
//! stmt.execute()?;
//! stmt.release_param_allocations();
//! ```

pub mod alloc;
pub mod bind;
pub mod codec;
pub mod config;
#[cfg(feature = "native")]
pub mod connection;
pub mod ffi;
pub mod marshal;
#[cfg(feature = "native")]
pub mod statement;

#[cfg(test)]
mod testing;

pub use crate::alloc::{AllocationRecord, ShadowCell};
pub use bind::MysqlBind;
pub use codec::{FlagRepr, NativeFlag, mysql_false, mysql_true};
pub use config::ClientConfig;
#[cfg(feature = "native")]
pub use connection::{Connection, client_info, client_version};
pub use marshal::{BindStatus, FetchStatus, ParamBinding, StatementApi, StatementBinder};
pub use mysqlbind_core::{Error, FieldType, LibraryVersion, Result};
#[cfg(feature = "native")]
pub use statement::{ResultMetadata, Statement};
