//! The stable, version-independent bind descriptor.
//!
//! [`MysqlBind`] is what callers build for each parameter or result column.
//! Its null and error flags are always `bool`, whatever the linked client
//! library expects; the marshaling layer converts to and from the native
//! `MYSQL_BIND` around every bind and fetch call.
//!
//! Descriptors hold raw pointers into caller-owned memory. The caller keeps
//! every buffer, length and flag cell alive and unmoved for as long as the
//! statement may read or write through them.

use std::ffi::{c_uchar, c_uint, c_ulong, c_void};
use std::mem::size_of;
use std::ptr;

use mysqlbind_core::FieldType;

/// Caller-facing bind descriptor for one parameter or result column.
///
/// For the null flag, the `is_null` pointer is authoritative when present
/// and `is_null_value` otherwise; the same holds for `error` and
/// `error_value`, and for `length` and `length_value`. There are no per-field
/// callbacks: the library's default serializers are always used.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MysqlBind {
    /// Receives the actual data length after a fetch
    pub length: *mut c_ulong,
    /// Supplies (parameters) or receives (results) the null flag
    pub is_null: *mut bool,
    /// Data buffer of `buffer_length` bytes
    pub buffer: *mut c_void,
    /// Receives the truncation flag after a fetch
    pub error: *mut bool,
    /// Library cursor into the current row; passed through untouched
    pub row_ptr: *mut c_uchar,
    pub buffer_length: c_ulong,
    pub offset: c_ulong,
    pub length_value: c_ulong,
    pub param_number: c_uint,
    pub pack_length: c_uint,
    pub buffer_type: FieldType,
    pub error_value: bool,
    pub is_unsigned: bool,
    pub long_data_used: bool,
    pub is_null_value: bool,
    /// Opaque extension payload, copied but never dereferenced
    pub extension: *mut c_void,
}

impl Default for MysqlBind {
    fn default() -> Self {
        Self::new(FieldType::Null)
    }
}

impl MysqlBind {
    /// An empty descriptor of the given wire type.
    pub const fn new(buffer_type: FieldType) -> Self {
        Self {
            length: ptr::null_mut(),
            is_null: ptr::null_mut(),
            buffer: ptr::null_mut(),
            error: ptr::null_mut(),
            row_ptr: ptr::null_mut(),
            buffer_length: 0,
            offset: 0,
            length_value: 0,
            param_number: 0,
            pack_length: 0,
            buffer_type,
            error_value: false,
            is_unsigned: false,
            long_data_used: false,
            is_null_value: false,
            extension: ptr::null_mut(),
        }
    }

    /// A parameter descriptor that always sends SQL NULL.
    pub const fn null() -> Self {
        let mut bind = Self::new(FieldType::Null);
        bind.is_null_value = true;
        bind
    }

    /// Point the descriptor at a fixed-size scalar such as `i32` or `f64`.
    ///
    /// The library reads and writes the full width of fixed-size wire types,
    /// so `T` must match it: `Long` takes a 4-byte scalar, `LongLong` an
    /// 8-byte one. Mismatches are caught by a debug assertion.
    pub fn with_scalar<T: Copy>(mut self, value: &mut T) -> Self {
        debug_assert!(
            self.buffer_type
                .fixed_size()
                .is_none_or(|width| width == size_of::<T>()),
            "{:?} needs a {}-byte scalar, got {} bytes",
            self.buffer_type,
            self.buffer_type.fixed_size().unwrap_or(0),
            size_of::<T>(),
        );
        self.buffer = ptr::from_mut(value).cast();
        self.buffer_length = size_of::<T>() as c_ulong;
        self
    }

    /// Point the descriptor at a byte buffer (strings, blobs, decimals).
    pub fn with_buffer(mut self, buffer: &mut [u8]) -> Self {
        self.buffer = buffer.as_mut_ptr().cast();
        self.buffer_length = buffer.len() as c_ulong;
        self
    }

    /// Report the data length through `length`.
    pub fn with_length(mut self, length: &mut c_ulong) -> Self {
        self.length = length;
        self
    }

    /// Supply or receive the null flag through `is_null`.
    pub fn with_is_null(mut self, is_null: &mut bool) -> Self {
        self.is_null = is_null;
        self
    }

    /// Receive the truncation flag through `error`.
    pub fn with_error(mut self, error: &mut bool) -> Self {
        self.error = error;
        self
    }

    pub fn unsigned(mut self, is_unsigned: bool) -> Self {
        self.is_unsigned = is_unsigned;
        self
    }

    /// The authoritative null flag.
    ///
    /// # Safety
    /// `is_null` must be null or valid for reads.
    pub unsafe fn null_flag(&self) -> bool {
        if self.is_null.is_null() {
            self.is_null_value
        } else {
            // SAFETY: non-null and readable per the caller's contract
            unsafe { self.is_null.read() }
        }
    }

    /// The authoritative truncation flag.
    ///
    /// # Safety
    /// `error` must be null or valid for reads.
    pub unsafe fn error_flag(&self) -> bool {
        if self.error.is_null() {
            self.error_value
        } else {
            // SAFETY: non-null and readable per the caller's contract
            unsafe { self.error.read() }
        }
    }

    /// The authoritative data length.
    ///
    /// # Safety
    /// `length` must be null or valid for reads.
    pub unsafe fn data_length(&self) -> c_ulong {
        if self.length.is_null() {
            self.length_value
        } else {
            // SAFETY: non-null and readable per the caller's contract
            unsafe { self.length.read() }
        }
    }
}
