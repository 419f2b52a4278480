//! Shadow cells and the per-bind allocation record.
//!
//! Under the legacy flag representation the library cannot write through a
//! caller's `*mut bool`, so each present null/error flag is mirrored into a
//! heap-allocated one-byte [`ShadowCell`]. A parameter bind produces an
//! [`AllocationRecord`] that owns those cells until the statement has been
//! executed.
//!
//! Cells are freed exactly once by construction: a cell is either owned by
//! a record slot (freed when the record is released or dropped), or has been
//! handed to a native descriptor array with [`ShadowCell::into_raw`] and is
//! reclaimed with [`ShadowCell::from_raw`].

use std::fmt;
use std::ptr::NonNull;

use crate::ffi::my_bool;

#[cfg(test)]
thread_local! {
    static LIVE_CELLS: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

/// Number of shadow cells currently allocated on this thread.
#[cfg(test)]
pub(crate) fn live_shadow_cells() -> usize {
    LIVE_CELLS.with(std::cell::Cell::get)
}

/// A heap-allocated legacy flag byte standing in for a native `bool`.
pub struct ShadowCell(NonNull<my_bool>);

// SAFETY: the cell is uniquely owned heap memory; the native library only
// touches it during calls made by the owning thread.
unsafe impl Send for ShadowCell {}

impl ShadowCell {
    /// Allocate a cell holding `value`.
    pub fn new(value: my_bool) -> Self {
        let ptr = NonNull::from(Box::leak(Box::new(value)));
        #[cfg(test)]
        LIVE_CELLS.with(|n| n.set(n.get() + 1));
        tracing::trace!(cell = ?ptr, value, "allocated shadow cell");
        Self(ptr)
    }

    /// Raw pointer handed to the native library.
    pub fn as_ptr(&self) -> *mut my_bool {
        self.0.as_ptr()
    }

    /// Current byte value of the cell.
    pub fn get(&self) -> my_bool {
        // SAFETY: the cell is live for as long as `self` exists
        unsafe { self.0.as_ptr().read() }
    }

    /// Give up ownership without freeing; pair with [`ShadowCell::from_raw`].
    pub fn into_raw(self) -> NonNull<my_bool> {
        let ptr = self.0;
        std::mem::forget(self);
        ptr
    }

    /// Reclaim a cell previously leaked with [`ShadowCell::into_raw`].
    ///
    /// # Safety
    /// `ptr` must come from `into_raw` and must not have been reclaimed before.
    pub unsafe fn from_raw(ptr: NonNull<my_bool>) -> Self {
        Self(ptr)
    }
}

impl Drop for ShadowCell {
    fn drop(&mut self) {
        tracing::trace!(cell = ?self.0, "freed shadow cell");
        #[cfg(test)]
        LIVE_CELLS.with(|n| n.set(n.get() - 1));
        // SAFETY: allocated by Box in `new`, and ownership is unique
        drop(unsafe { Box::from_raw(self.0.as_ptr()) });
    }
}

impl fmt::Debug for ShadowCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowCell")
            .field("ptr", &self.0)
            .field("value", &self.get())
            .finish()
    }
}

/// Shadow cells allocated by one parameter bind.
///
/// Slots alternate per descriptor: `2 * i` holds the `is_null` shadow and
/// `2 * i + 1` the `error` shadow of descriptor `i`. An empty slot means no
/// allocation was needed (native representation, or no flag reference).
///
/// The cells must outlive the statement execution that reads them. Release
/// the record afterwards with [`AllocationRecord::release`]; dropping it has
/// the same effect.
#[derive(Debug, Default)]
#[must_use = "shadow cells must stay alive until the statement is executed"]
pub struct AllocationRecord {
    slots: Vec<Option<ShadowCell>>,
}

impl AllocationRecord {
    /// An empty record sized for `count` descriptors.
    pub fn with_descriptors(count: usize) -> Self {
        let mut slots = Vec::with_capacity(count * 2);
        slots.resize_with(count * 2, || None);
        Self { slots }
    }

    /// Total number of slots (twice the descriptor count).
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of descriptors this record covers.
    pub fn descriptor_count(&self) -> usize {
        self.slots.len() / 2
    }

    /// Number of slots holding a live cell.
    pub fn allocated(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// The `is_null` shadow of descriptor `index`, if one was allocated.
    pub fn is_null_cell(&self, index: usize) -> Option<&ShadowCell> {
        self.slots.get(index * 2).and_then(Option::as_ref)
    }

    /// The `error` shadow of descriptor `index`, if one was allocated.
    pub fn error_cell(&self, index: usize) -> Option<&ShadowCell> {
        self.slots.get(index * 2 + 1).and_then(Option::as_ref)
    }

    /// Store the pair of cells for descriptor `index`, growing if needed.
    pub(crate) fn record(
        &mut self,
        index: usize,
        is_null: Option<ShadowCell>,
        error: Option<ShadowCell>,
    ) {
        let needed = (index + 1) * 2;
        if self.slots.len() < needed {
            self.slots.resize_with(needed, || None);
        }
        self.slots[index * 2] = is_null;
        self.slots[index * 2 + 1] = error;
    }

    /// Free every allocated cell, returning how many were freed.
    ///
    /// Consumes the record, so it cannot be released twice.
    pub fn release(self) -> usize {
        let freed = self.allocated();
        tracing::debug!(
            slots = self.slots.len(),
            freed,
            "releasing parameter allocation record"
        );
        drop(self);
        freed
    }
}
