//! In-process stand-in for the client library's statement primitives.
//!
//! [`FakeStatement`] copies bound descriptors the way `mysql_stmt_bind_*`
//! does, reads parameters back on execute, and writes queued rows through
//! the bound result pointers on fetch. Flag cells of both representations
//! hold 0 or 1 in a single byte, so the fake handles them untyped.

use std::collections::VecDeque;
use std::ffi::{c_int, c_ulong};
use std::ptr;

use crate::codec::{NativeFlag, decode};
use crate::ffi::{MYSQL_DATA_TRUNCATED, MYSQL_NO_DATA, RawBind};
use crate::marshal::{BindStatus, StatementApi};

/// A parameter as the library saw it at bind time.
#[derive(Debug, Clone)]
pub struct BoundParam {
    /// Null flag decoded from the native cell, or the fallback scalar
    pub is_null: bool,
    pub buffer_type: u32,
    pub buffer_length: c_ulong,
    pub has_callbacks: bool,
    null_cell: *const u8,
    null_value: bool,
}

#[derive(Debug, Clone, Copy)]
struct ResultSlot {
    buffer: *mut u8,
    buffer_length: usize,
    length: *mut c_ulong,
    is_null: *mut u8,
    error: *mut u8,
}

#[derive(Debug, Default)]
pub struct FakeStatement {
    param_count: usize,
    field_count: usize,
    /// Make every bind call report failure
    pub fail_bind: bool,
    native_calls: usize,
    params: Vec<BoundParam>,
    results: Vec<ResultSlot>,
    rows: VecDeque<Vec<Option<Vec<u8>>>>,
}

impl FakeStatement {
    pub fn new(param_count: usize, field_count: usize) -> Self {
        Self {
            param_count,
            field_count,
            ..Self::default()
        }
    }

    /// Queue a row; `None` columns are SQL NULL.
    pub fn push_row(&mut self, row: Vec<Option<Vec<u8>>>) {
        assert_eq!(row.len(), self.field_count, "row width");
        self.rows.push_back(row);
    }

    pub fn bound_params(&self) -> &[BoundParam] {
        &self.params
    }

    /// Number of bind and fetch calls that reached the library.
    pub fn native_calls(&self) -> usize {
        self.native_calls
    }

    /// Read every parameter's null flag through the bound cells.
    ///
    /// # Safety
    /// The cells of the last parameter bind must still be live.
    pub unsafe fn execute(&self) -> Vec<bool> {
        self.params
            .iter()
            .map(|p| {
                if p.null_cell.is_null() {
                    p.null_value
                } else {
                    // SAFETY: live per the caller's contract
                    unsafe { p.null_cell.read() == 1 }
                }
            })
            .collect()
    }
}

/// # Safety
/// `bytes` must fit in `slot.buffer`'s allocation up to `slot.buffer_length`.
unsafe fn write_column(slot: &ResultSlot, value: Option<&[u8]>) -> bool {
    let (null, len, truncated) = match value {
        None => (1u8, 0, false),
        Some(bytes) => {
            let n = bytes.len().min(slot.buffer_length);
            if n > 0 {
                // SAFETY: n fits the bound buffer
                unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), slot.buffer, n) };
            }
            (0u8, bytes.len(), bytes.len() > slot.buffer_length)
        }
    };

    // SAFETY: bound pointers are live per the caller's contract
    unsafe {
        if !slot.length.is_null() {
            slot.length.write(len as c_ulong);
        }
        if !slot.is_null.is_null() {
            slot.is_null.write(null);
        }
        if !slot.error.is_null() {
            slot.error.write(u8::from(truncated));
        }
    }
    truncated
}

impl StatementApi for FakeStatement {
    fn param_count(&self) -> usize {
        self.param_count
    }

    fn field_count(&self) -> usize {
        self.field_count
    }

    unsafe fn bind_param<F: NativeFlag>(&mut self, binds: &mut [RawBind<F>]) -> BindStatus {
        self.native_calls += 1;
        if self.fail_bind {
            return BindStatus::Failed;
        }
        self.params = binds
            .iter()
            .map(|b| BoundParam {
                is_null: if b.is_null.is_null() {
                    b.is_null_value.to_bool()
                } else {
                    // SAFETY: valid per the trait contract
                    unsafe { decode(b.is_null) }
                },
                buffer_type: b.buffer_type,
                buffer_length: b.buffer_length,
                has_callbacks: b.store_param_func.is_some()
                    || b.fetch_result.is_some()
                    || b.skip_result.is_some(),
                null_cell: b.is_null.cast::<u8>(),
                null_value: b.is_null_value.to_bool(),
            })
            .collect();
        BindStatus::Ok
    }

    unsafe fn bind_result<F: NativeFlag>(&mut self, binds: &mut [RawBind<F>]) -> BindStatus {
        self.native_calls += 1;
        if self.fail_bind {
            return BindStatus::Failed;
        }
        self.results = binds
            .iter()
            .map(|b| ResultSlot {
                buffer: b.buffer.cast(),
                buffer_length: b.buffer_length as usize,
                length: b.length,
                is_null: b.is_null.cast(),
                error: b.error.cast(),
            })
            .collect();
        BindStatus::Ok
    }

    unsafe fn fetch(&mut self) -> c_int {
        self.native_calls += 1;
        let Some(row) = self.rows.pop_front() else {
            return MYSQL_NO_DATA;
        };

        let mut truncated = false;
        for (slot, value) in self.results.iter().zip(&row) {
            // SAFETY: forwarded trait contract
            truncated |= unsafe { write_column(slot, value.as_deref()) };
        }

        if truncated { MYSQL_DATA_TRUNCATED } else { 0 }
    }
}
