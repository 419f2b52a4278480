//! Low-level FFI bindings to libmysqlclient.
//!
//! These bindings are manually written to provide full control over the
//! interface. We only expose what the binding layer needs.
//!
//! `MYSQL_BIND` changed between client library versions: before 8.0 the
//! null and error flags are `my_bool` (a C `char`), from 8.0 they are C
//! `bool`. Everything else is laid out identically, so the descriptor is
//! modelled once as [`RawBind<F>`] over the flag type.
//!
//! The extern declarations are only compiled with the `native` feature, which
//! also links the library (see `build.rs`).

#![allow(non_camel_case_types)]
#![allow(clippy::upper_case_acronyms)]

#[cfg(feature = "native")]
use std::ffi::c_int;
use std::ffi::{c_char, c_uchar, c_uint, c_ulong, c_void};
use std::ptr;

/// Opaque MYSQL connection handle.
#[repr(C)]
pub struct MYSQL {
    _private: [u8; 0],
}

/// Opaque MYSQL_STMT prepared statement handle.
#[repr(C)]
pub struct MYSQL_STMT {
    _private: [u8; 0],
}

/// Opaque MYSQL_RES result metadata handle.
#[repr(C)]
pub struct MYSQL_RES {
    _private: [u8; 0],
}

/// Opaque MYSQL_FIELD column description.
#[repr(C)]
pub struct MYSQL_FIELD {
    _private: [u8; 0],
}

/// Opaque network buffer passed to `store_param_func`.
#[repr(C)]
pub struct NET {
    _private: [u8; 0],
}

/// Pre-8.0 boolean: a plain C `char`.
pub type my_bool = c_char;

/// `enum enum_field_types` is an `int`-sized C enum.
pub type enum_field_types = c_uint;

/// `enum mysql_option` is an `int`-sized C enum.
pub type mysql_option = c_uint;

// mysql_stmt_fetch return codes
pub const MYSQL_NO_DATA: i32 = 100;
pub const MYSQL_DATA_TRUNCATED: i32 = 101;

// mysql_option values (stable across 5.7 and 8.0)
pub const MYSQL_OPT_CONNECT_TIMEOUT: mysql_option = 0;
pub const MYSQL_OPT_COMPRESS: mysql_option = 1;
pub const MYSQL_INIT_COMMAND: mysql_option = 3;
pub const MYSQL_SET_CHARSET_NAME: mysql_option = 7;
pub const MYSQL_OPT_LOCAL_INFILE: mysql_option = 8;
pub const MYSQL_OPT_PROTOCOL: mysql_option = 9;
pub const MYSQL_OPT_READ_TIMEOUT: mysql_option = 11;
pub const MYSQL_OPT_WRITE_TIMEOUT: mysql_option = 12;

// enum mysql_protocol_type
pub const MYSQL_PROTOCOL_DEFAULT: c_uint = 0;
pub const MYSQL_PROTOCOL_TCP: c_uint = 1;
pub const MYSQL_PROTOCOL_SOCKET: c_uint = 2;

// Client capability flags accepted by mysql_real_connect
pub const CLIENT_COMPRESS: c_ulong = 32;

/// Per-parameter serializer installed by the library.
pub type store_param_fn<F> = unsafe extern "C" fn(net: *mut NET, param: *mut RawBind<F>);

/// Per-column fetch/skip routine installed by the library.
pub type fetch_result_fn<F> =
    unsafe extern "C" fn(param: *mut RawBind<F>, field: *mut MYSQL_FIELD, row: *mut *mut c_uchar);

/// Mirror of `MYSQL_BIND`, generic over the physical flag type.
///
/// `F` is [`my_bool`] for libraries older than 8.0 and `bool` from 8.0.
/// Both are one byte wide, so the two instantiations have the same size and
/// field offsets; only the meaning of the flag bytes differs.
#[repr(C)]
#[derive(Debug)]
pub struct RawBind<F> {
    pub length: *mut c_ulong,
    pub is_null: *mut F,
    pub buffer: *mut c_void,
    pub error: *mut F,
    pub row_ptr: *mut c_uchar,
    pub store_param_func: Option<store_param_fn<F>>,
    pub fetch_result: Option<fetch_result_fn<F>>,
    pub skip_result: Option<fetch_result_fn<F>>,
    pub buffer_length: c_ulong,
    pub offset: c_ulong,
    pub length_value: c_ulong,
    pub param_number: c_uint,
    pub pack_length: c_uint,
    pub buffer_type: enum_field_types,
    pub error_value: F,
    pub is_unsigned: F,
    pub long_data_used: F,
    pub is_null_value: F,
    pub extension: *mut c_void,
}

/// `MYSQL_BIND` as declared by client libraries before 8.0.
pub type LegacyBind = RawBind<my_bool>;

/// `MYSQL_BIND` as declared by client libraries from 8.0 on.
pub type NativeBind = RawBind<bool>;

impl<F: Default> Default for RawBind<F> {
    fn default() -> Self {
        Self {
            length: ptr::null_mut(),
            is_null: ptr::null_mut(),
            buffer: ptr::null_mut(),
            error: ptr::null_mut(),
            row_ptr: ptr::null_mut(),
            store_param_func: None,
            fetch_result: None,
            skip_result: None,
            buffer_length: 0,
            offset: 0,
            length_value: 0,
            param_number: 0,
            pack_length: 0,
            buffer_type: 0,
            error_value: F::default(),
            is_unsigned: F::default(),
            long_data_used: F::default(),
            is_null_value: F::default(),
            extension: ptr::null_mut(),
        }
    }
}

#[cfg(feature = "native")]
unsafe extern "C" {
    // Library init (mysql_library_init is a macro for this)
    pub fn mysql_server_init(argc: c_int, argv: *mut *mut c_char, groups: *mut *mut c_char)
    -> c_int;

    // Version info
    pub fn mysql_get_client_version() -> c_ulong;
    pub fn mysql_get_client_info() -> *const c_char;

    // Connection management
    pub fn mysql_init(mysql: *mut MYSQL) -> *mut MYSQL;

    pub fn mysql_real_connect(
        mysql: *mut MYSQL,
        host: *const c_char,
        user: *const c_char,
        passwd: *const c_char,
        db: *const c_char,
        port: c_uint,
        unix_socket: *const c_char,
        clientflag: c_ulong,
    ) -> *mut MYSQL;

    pub fn mysql_close(mysql: *mut MYSQL);
    pub fn mysql_ping(mysql: *mut MYSQL) -> c_int;
    pub fn mysql_options(mysql: *mut MYSQL, option: mysql_option, arg: *const c_void) -> c_int;
    pub fn mysql_set_character_set(mysql: *mut MYSQL, csname: *const c_char) -> c_int;
    pub fn mysql_character_set_name(mysql: *mut MYSQL) -> *const c_char;
    pub fn mysql_get_server_version(mysql: *mut MYSQL) -> c_ulong;

    // Connection errors
    pub fn mysql_errno(mysql: *mut MYSQL) -> c_uint;
    pub fn mysql_error(mysql: *mut MYSQL) -> *const c_char;
    pub fn mysql_sqlstate(mysql: *mut MYSQL) -> *const c_char;

    // Statement lifecycle
    pub fn mysql_stmt_init(mysql: *mut MYSQL) -> *mut MYSQL_STMT;
    pub fn mysql_stmt_prepare(stmt: *mut MYSQL_STMT, query: *const c_char, length: c_ulong)
    -> c_int;
    pub fn mysql_stmt_execute(stmt: *mut MYSQL_STMT) -> c_int;
    pub fn mysql_stmt_close(stmt: *mut MYSQL_STMT) -> my_bool;
    pub fn mysql_stmt_reset(stmt: *mut MYSQL_STMT) -> my_bool;

    // Statement metadata
    pub fn mysql_stmt_param_count(stmt: *mut MYSQL_STMT) -> c_ulong;
    pub fn mysql_stmt_field_count(stmt: *mut MYSQL_STMT) -> c_uint;
    pub fn mysql_stmt_result_metadata(stmt: *mut MYSQL_STMT) -> *mut MYSQL_RES;
    pub fn mysql_stmt_affected_rows(stmt: *mut MYSQL_STMT) -> u64;
    pub fn mysql_stmt_insert_id(stmt: *mut MYSQL_STMT) -> u64;

    // Statement errors
    pub fn mysql_stmt_errno(stmt: *mut MYSQL_STMT) -> c_uint;
    pub fn mysql_stmt_error(stmt: *mut MYSQL_STMT) -> *const c_char;
    pub fn mysql_stmt_sqlstate(stmt: *mut MYSQL_STMT) -> *const c_char;

    // Descriptor binding. The array element type depends on the linked
    // library version, so it crosses the boundary untyped.
    pub fn mysql_stmt_bind_param(stmt: *mut MYSQL_STMT, bnd: *mut c_void) -> my_bool;
    pub fn mysql_stmt_bind_result(stmt: *mut MYSQL_STMT, bnd: *mut c_void) -> my_bool;
    pub fn mysql_stmt_fetch(stmt: *mut MYSQL_STMT) -> c_int;

    // Result metadata
    pub fn mysql_num_fields(res: *mut MYSQL_RES) -> c_uint;
    pub fn mysql_free_result(res: *mut MYSQL_RES);
}

/// Copy a possibly-null C string returned by the library into an owned string.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string valid for the
/// duration of the call.
pub unsafe fn owned_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: non-null and NUL-terminated per the caller's contract
    let s = unsafe { std::ffi::CStr::from_ptr(ptr) };
    Some(s.to_string_lossy().into_owned())
}
