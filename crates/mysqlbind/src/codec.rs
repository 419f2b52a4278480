//! Version-adaptive boolean codec.
//!
//! Callers always describe null and error flags as `bool`. The client library
//! wants `my_bool` before 8.0 and `bool` from 8.0, and a legacy library may
//! write any `char` into a flag, which is not a valid Rust `bool`. This module
//! is the only place that knows about the difference.
//!
//! [`FlagRepr`] is resolved once per connection. Marshaling code then runs
//! generically over the matching [`NativeFlag`] type, so no call site
//! branches on the version.

use std::fmt;
use std::ptr;

use mysqlbind_core::LibraryVersion;
use serde::{Deserialize, Serialize};

use crate::alloc::ShadowCell;
use crate::ffi::my_bool;

/// Physical representation of descriptor flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagRepr {
    /// One-byte `my_bool` cells; requires shadow allocations
    Legacy,
    /// Native `bool`; caller cells are passed through
    Native,
}

impl FlagRepr {
    /// Pick the representation used by a client library version.
    pub const fn for_version(version: LibraryVersion) -> Self {
        if version.has_native_bool() {
            FlagRepr::Native
        } else {
            FlagRepr::Legacy
        }
    }

    /// Whether binding under this representation allocates shadow cells.
    pub const fn allocates(self) -> bool {
        matches!(self, FlagRepr::Legacy)
    }

    pub const fn name(self) -> &'static str {
        match self {
            FlagRepr::Legacy => "legacy",
            FlagRepr::Native => "native",
        }
    }
}

impl fmt::Display for FlagRepr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The byte a representation uses for `true`.
pub const fn mysql_true(repr: FlagRepr) -> u8 {
    match repr {
        FlagRepr::Legacy => <my_bool as NativeFlag>::TRUE as u8,
        FlagRepr::Native => <bool as NativeFlag>::TRUE as u8,
    }
}

/// The byte a representation uses for `false`.
pub const fn mysql_false(repr: FlagRepr) -> u8 {
    match repr {
        FlagRepr::Legacy => <my_bool as NativeFlag>::FALSE as u8,
        FlagRepr::Native => <bool as NativeFlag>::FALSE as u8,
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for crate::ffi::my_bool {}
    impl Sealed for bool {}
}

/// A physical flag type that can appear in a native bind descriptor.
///
/// Implemented for [`my_bool`] (legacy) and `bool` (native) only.
pub trait NativeFlag: sealed::Sealed + Copy + Default + fmt::Debug + 'static {
    /// The representation this type stands for.
    const REPR: FlagRepr;
    const TRUE: Self;
    const FALSE: Self;

    fn from_bool(value: bool) -> Self;

    fn to_bool(self) -> bool;

    /// Encode the flag behind `src` for the native library.
    ///
    /// A null `src` encodes to a null pointer without allocating.
    ///
    /// # Safety
    /// `src` must be null or valid for reads.
    unsafe fn encode(src: *mut bool) -> Encoded<Self>;
}

impl NativeFlag for my_bool {
    const REPR: FlagRepr = FlagRepr::Legacy;
    const TRUE: Self = 1;
    const FALSE: Self = 0;

    fn from_bool(value: bool) -> Self {
        if value { Self::TRUE } else { Self::FALSE }
    }

    fn to_bool(self) -> bool {
        self == Self::TRUE
    }

    unsafe fn encode(src: *mut bool) -> Encoded<Self> {
        if src.is_null() {
            return Encoded::absent();
        }
        // SAFETY: non-null and readable per the caller's contract
        let value = unsafe { src.read() };
        let cell = ShadowCell::new(Self::from_bool(value));
        Encoded {
            ptr: cell.as_ptr(),
            shadow: Some(cell),
        }
    }
}

impl NativeFlag for bool {
    const REPR: FlagRepr = FlagRepr::Native;
    const TRUE: Self = true;
    const FALSE: Self = false;

    fn from_bool(value: bool) -> Self {
        value
    }

    fn to_bool(self) -> bool {
        self
    }

    unsafe fn encode(src: *mut bool) -> Encoded<Self> {
        Encoded {
            ptr: src,
            shadow: None,
        }
    }
}

/// Read a physical flag back as a `bool`.
///
/// # Safety
/// `cell` must be non-null and valid for reads.
pub unsafe fn decode<F: NativeFlag>(cell: *const F) -> bool {
    debug_assert!(!cell.is_null(), "decode called with a null flag cell");
    // SAFETY: non-null and readable per the caller's contract; every byte
    // value is a valid `my_bool`, and the native library only writes 0/1
    // into `bool` cells
    unsafe { cell.read() }.to_bool()
}

/// An encoded flag: the pointer to hand to the library, plus the shadow cell
/// behind it when one had to be allocated.
#[derive(Debug)]
pub struct Encoded<F> {
    ptr: *mut F,
    shadow: Option<ShadowCell>,
}

impl<F> Encoded<F> {
    /// The encoding of an absent flag reference.
    pub fn absent() -> Self {
        Self {
            ptr: ptr::null_mut(),
            shadow: None,
        }
    }

    pub fn as_ptr(&self) -> *mut F {
        self.ptr
    }

    pub fn is_absent(&self) -> bool {
        self.ptr.is_null()
    }

    /// Whether encoding allocated a shadow cell.
    pub fn is_shadow(&self) -> bool {
        self.shadow.is_some()
    }

    /// Split into the physical pointer and the owned shadow cell, if any.
    ///
    /// The pointer stays valid only as long as the returned cell is kept.
    pub fn into_parts(self) -> (*mut F, Option<ShadowCell>) {
        (self.ptr, self.shadow)
    }
}
