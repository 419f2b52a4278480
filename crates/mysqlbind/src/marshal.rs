//! Descriptor marshaling between stable and native bind arrays.
//!
//! Every bind, fetch and release goes through this module:
//!
//! 1. [`forward_convert`] turns the caller's [`MysqlBind`] slice into a
//!    native `MYSQL_BIND` array of the resolved flag type, encoding each
//!    null/error reference through the codec.
//! 2. The native primitive runs against that array.
//! 3. [`backward_convert`] copies the (possibly mutated) native fields back
//!    and decodes flags through the caller's references.
//!
//! [`StatementBinder`] ties the steps to a statement handle. It owns the
//! result descriptor array the library keeps pointing into after a
//! successful result bind, and frees its shadow cells exactly once.

use std::ffi::c_int;
use std::fmt;
use std::mem;
use std::ptr::{self, NonNull};

use mysqlbind_core::{BindError, FieldType, Result};

use crate::alloc::{AllocationRecord, ShadowCell};
use crate::bind::MysqlBind;
use crate::codec::{FlagRepr, NativeFlag, decode};
use crate::ffi::{LegacyBind, MYSQL_DATA_TRUNCATED, MYSQL_NO_DATA, NativeBind, RawBind, my_bool};

/// The native statement primitives the marshaling layer drives.
///
/// Implemented by the libmysqlclient statement handle. The bind calls are
/// generic over the flag type because the element type of the descriptor
/// array depends on the linked library.
pub trait StatementApi {
    /// Number of `?` placeholders in the prepared statement.
    fn param_count(&self) -> usize;

    /// Number of columns in the statement's result set.
    fn field_count(&self) -> usize;

    /// Bind parameter descriptors (`mysql_stmt_bind_param`).
    ///
    /// # Safety
    /// Every pointer in `binds` must stay valid until the statement has been
    /// executed.
    unsafe fn bind_param<F: NativeFlag>(&mut self, binds: &mut [RawBind<F>]) -> BindStatus;

    /// Bind result descriptors (`mysql_stmt_bind_result`).
    ///
    /// # Safety
    /// Every pointer in `binds` must stay valid for as long as rows may be
    /// fetched into them.
    unsafe fn bind_result<F: NativeFlag>(&mut self, binds: &mut [RawBind<F>]) -> BindStatus;

    /// Fetch the next row into the bound result descriptors (`mysql_stmt_fetch`).
    ///
    /// # Safety
    /// The pointers of the last successful result bind must still be valid.
    unsafe fn fetch(&mut self) -> c_int;
}

/// Outcome of a native bind call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindStatus {
    Ok,
    Failed,
}

impl BindStatus {
    /// Map the `my_bool` returned by `mysql_stmt_bind_*` (zero on success).
    pub fn from_native(status: my_bool) -> Self {
        if status == 0 {
            BindStatus::Ok
        } else {
            BindStatus::Failed
        }
    }

    pub fn is_ok(self) -> bool {
        self == BindStatus::Ok
    }
}

/// Outcome of `mysql_stmt_fetch`, carrying the native code unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// A row was fetched into the descriptors
    Row,
    /// The result set is exhausted
    NoData,
    /// A row was fetched but at least one column did not fit its buffer
    Truncated,
    /// The fetch failed; the code is the native return value
    Error(c_int),
}

impl FetchStatus {
    pub fn from_code(code: c_int) -> Self {
        match code {
            0 => FetchStatus::Row,
            MYSQL_NO_DATA => FetchStatus::NoData,
            MYSQL_DATA_TRUNCATED => FetchStatus::Truncated,
            other => FetchStatus::Error(other),
        }
    }

    /// The native return code this status was built from.
    pub fn code(self) -> c_int {
        match self {
            FetchStatus::Row => 0,
            FetchStatus::NoData => MYSQL_NO_DATA,
            FetchStatus::Truncated => MYSQL_DATA_TRUNCATED,
            FetchStatus::Error(code) => code,
        }
    }

    /// Whether row data was written into the descriptors.
    pub fn has_row(self) -> bool {
        matches!(self, FetchStatus::Row | FetchStatus::Truncated)
    }
}

/// Result of a parameter bind: the native status plus the shadow cells the
/// bind allocated.
///
/// The allocations are returned even when the bind failed, so partial work
/// is still released exactly once.
#[derive(Debug)]
#[must_use = "the allocation record must outlive statement execution"]
pub struct ParamBinding {
    pub allocations: AllocationRecord,
    pub status: BindStatus,
}

impl ParamBinding {
    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }
}

/// Convert stable descriptors into a native array of flag type `F`.
///
/// With a `record`, the shadow cells for descriptor `i` are stored at slots
/// `2 * (start_index + i)` and `2 * (start_index + i) + 1`. Without one, the
/// cells are handed to the returned array and must be reclaimed with
/// [`release_native_cells`]. The native callbacks are always left unset.
///
/// # Safety
/// Every non-null `is_null` and `error` reference in `stable` must be valid
/// for reads.
pub unsafe fn forward_convert<F: NativeFlag>(
    stable: &[MysqlBind],
    mut record: Option<&mut AllocationRecord>,
    start_index: usize,
) -> Vec<RawBind<F>> {
    let mut native = Vec::with_capacity(stable.len());

    for (i, bind) in stable.iter().enumerate() {
        // SAFETY: references are null or readable per the caller's contract
        let (is_null, null_cell) = unsafe { F::encode(bind.is_null) }.into_parts();
        // SAFETY: as above
        let (error, error_cell) = unsafe { F::encode(bind.error) }.into_parts();

        match record.as_deref_mut() {
            Some(record) => record.record(start_index + i, null_cell, error_cell),
            None => {
                for cell in [null_cell, error_cell].into_iter().flatten() {
                    cell.into_raw();
                }
            }
        }

        native.push(RawBind {
            length: bind.length,
            is_null,
            buffer: bind.buffer,
            error,
            row_ptr: bind.row_ptr,
            store_param_func: None,
            fetch_result: None,
            skip_result: None,
            buffer_length: bind.buffer_length,
            offset: bind.offset,
            length_value: bind.length_value,
            param_number: bind.param_number,
            pack_length: bind.pack_length,
            buffer_type: bind.buffer_type.code(),
            error_value: F::from_bool(bind.error_value),
            is_unsigned: F::from_bool(bind.is_unsigned),
            long_data_used: F::from_bool(bind.long_data_used),
            is_null_value: F::from_bool(bind.is_null_value),
            extension: bind.extension,
        });
    }

    native
}

/// Copy native descriptors back into their stable counterparts.
///
/// Pointers and scalars are copied over. Flags are decoded through the
/// stable `is_null`/`error` references when present; the `is_null_value` and
/// `error_value` fallbacks are never overwritten.
///
/// # Safety
/// Every non-null flag pointer in `native` must be valid for reads, and the
/// matching references in `stable` valid for writes.
pub unsafe fn backward_convert<F: NativeFlag>(native: &[RawBind<F>], stable: &mut [MysqlBind]) {
    debug_assert_eq!(native.len(), stable.len(), "descriptor arrays differ in length");

    for (raw, bind) in native.iter().zip(stable.iter_mut()) {
        bind.length = raw.length;
        bind.buffer = raw.buffer;
        bind.row_ptr = raw.row_ptr;
        bind.buffer_length = raw.buffer_length;
        bind.offset = raw.offset;
        bind.length_value = raw.length_value;
        bind.param_number = raw.param_number;
        bind.pack_length = raw.pack_length;
        match FieldType::from_code(raw.buffer_type) {
            Some(ty) => bind.buffer_type = ty,
            None => tracing::warn!(
                code = raw.buffer_type,
                kept = ?bind.buffer_type,
                "native descriptor has an unknown buffer type"
            ),
        }
        bind.is_unsigned = raw.is_unsigned.to_bool();
        bind.long_data_used = raw.long_data_used.to_bool();
        bind.extension = raw.extension;

        if !bind.is_null.is_null() && !raw.is_null.is_null() {
            // SAFETY: both pointers valid per the caller's contract
            unsafe { bind.is_null.write(decode(raw.is_null)) };
        }
        if !bind.error.is_null() && !raw.error.is_null() {
            // SAFETY: as above
            unsafe { bind.error.write(decode(raw.error)) };
        }
    }
}

/// Free the shadow cells a native array owns and null the freed pointers.
///
/// Does nothing for the native `bool` representation, whose flag pointers
/// belong to the caller. Calling it again on the same array frees nothing.
///
/// # Safety
/// Under the legacy representation every non-null flag pointer in `binds`
/// must be a cell leaked by [`forward_convert`] without a record.
pub unsafe fn release_native_cells<F: NativeFlag>(binds: &mut [RawBind<F>]) -> usize {
    if !F::REPR.allocates() {
        return 0;
    }

    let mut freed = 0;
    for bind in binds {
        for slot in [&mut bind.is_null, &mut bind.error] {
            let ptr = mem::replace(slot, ptr::null_mut());
            if let Some(cell) = NonNull::new(ptr.cast::<my_bool>()) {
                // SAFETY: leaked by forward_convert and not reclaimed since,
                // because every reclaimed slot is nulled
                drop(unsafe { ShadowCell::from_raw(cell) });
                freed += 1;
            }
        }
    }
    freed
}

/// Result descriptor array the library keeps pointing into after a bind.
enum RetainedResults {
    Legacy(Vec<LegacyBind>),
    Native(Vec<NativeBind>),
}

impl RetainedResults {
    fn len(&self) -> usize {
        match self {
            RetainedResults::Legacy(binds) => binds.len(),
            RetainedResults::Native(binds) => binds.len(),
        }
    }
}

enum ResultState {
    Unbound,
    Bound(RetainedResults),
    Released,
}

/// Marshals descriptors for one prepared statement.
///
/// The flag representation is fixed at construction and every call is
/// dispatched to the matching native descriptor type.
pub struct StatementBinder<S: StatementApi> {
    stmt: S,
    repr: FlagRepr,
    results: ResultState,
}

impl<S: StatementApi> StatementBinder<S> {
    pub fn new(stmt: S, repr: FlagRepr) -> Self {
        Self {
            stmt,
            repr,
            results: ResultState::Unbound,
        }
    }

    pub fn repr(&self) -> FlagRepr {
        self.repr
    }

    pub fn statement(&self) -> &S {
        &self.stmt
    }

    pub fn statement_mut(&mut self) -> &mut S {
        &mut self.stmt
    }

    /// Whether result descriptors are currently bound.
    pub fn has_bound_results(&self) -> bool {
        matches!(self.results, ResultState::Bound(_))
    }

    /// Bind parameter descriptors.
    ///
    /// The returned record holds one slot pair per descriptor and must be
    /// kept until the statement has been executed. Legacy shadow cells
    /// capture the flag values at bind time, so rebind after changing a
    /// null flag.
    ///
    /// # Safety
    /// Every pointer in `params` must stay valid until the statement has
    /// been executed.
    pub unsafe fn bind_params(&mut self, params: &mut [MysqlBind]) -> Result<ParamBinding> {
        let expected = self.stmt.param_count();
        if params.len() != expected {
            return Err(BindError::count_mismatch("bind_params", expected, params.len()).into());
        }

        // SAFETY: forwarded caller contract
        let binding = unsafe {
            match self.repr {
                FlagRepr::Legacy => self.bind_params_as::<my_bool>(params),
                FlagRepr::Native => self.bind_params_as::<bool>(params),
            }
        };

        tracing::debug!(
            count = params.len(),
            repr = %self.repr,
            shadow_cells = binding.allocations.allocated(),
            status = ?binding.status,
            "bound parameters"
        );
        Ok(binding)
    }

    unsafe fn bind_params_as<F: NativeFlag>(&mut self, params: &mut [MysqlBind]) -> ParamBinding {
        let mut allocations = AllocationRecord::with_descriptors(params.len());
        // SAFETY: forwarded caller contract
        let mut native = unsafe { forward_convert::<F>(params, Some(&mut allocations), 0) };
        // SAFETY: the shadow cells live in `allocations`, returned to the caller
        let status = unsafe { self.stmt.bind_param(&mut native) };
        // SAFETY: every shadow cell is still owned by `allocations`
        unsafe { backward_convert(&native, params) };
        ParamBinding {
            allocations,
            status,
        }
    }

    /// Bind result descriptors, replacing any previous binding.
    ///
    /// Shadow cells of a previous binding are released first. On native
    /// failure the new cells are freed before returning.
    ///
    /// # Safety
    /// Every pointer in `columns` must stay valid until the results are
    /// released or rebound.
    pub unsafe fn bind_results(&mut self, columns: &mut [MysqlBind]) -> Result<BindStatus> {
        let expected = self.stmt.field_count();
        if columns.len() != expected {
            return Err(BindError::count_mismatch("bind_results", expected, columns.len()).into());
        }

        self.release_result_allocations();

        // SAFETY: forwarded caller contract
        let status = unsafe {
            match self.repr {
                FlagRepr::Legacy => self.bind_results_as::<my_bool>(columns),
                FlagRepr::Native => self.bind_results_as::<bool>(columns),
            }
        };

        tracing::debug!(count = columns.len(), repr = %self.repr, ?status, "bound results");
        Ok(status)
    }

    unsafe fn bind_results_as<F: NativeFlag>(&mut self, columns: &mut [MysqlBind]) -> BindStatus
    where
        RetainedResults: From<Vec<RawBind<F>>>,
    {
        // SAFETY: forwarded caller contract
        let mut native = unsafe { forward_convert::<F>(columns, None, 0) };
        // SAFETY: the cells leaked into `native` stay alive while it is retained
        let status = unsafe { self.stmt.bind_result(&mut native) };
        // SAFETY: as above
        unsafe { backward_convert(&native, columns) };

        if status.is_ok() {
            self.results = ResultState::Bound(native.into());
        } else {
            // SAFETY: the cells were leaked into `native` just above
            let freed = unsafe { release_native_cells(&mut native) };
            tracing::warn!(freed, "result bind failed, released shadow cells");
            self.results = ResultState::Unbound;
        }
        status
    }

    /// Fetch the next row and copy it into `columns`.
    ///
    /// Conversion runs against the retained array of the last successful
    /// result bind. The native status is returned unchanged.
    ///
    /// # Safety
    /// `columns` must reference the same caller memory that was bound.
    pub unsafe fn fetch(&mut self, columns: &mut [MysqlBind]) -> Result<FetchStatus> {
        let ResultState::Bound(retained) = &self.results else {
            return Err(BindError::not_bound().into());
        };
        if retained.len() != columns.len() {
            return Err(BindError::count_mismatch("fetch", retained.len(), columns.len()).into());
        }

        // SAFETY: results are bound, so the retained pointers are live
        let code = unsafe { self.stmt.fetch() };

        if let ResultState::Bound(retained) = &self.results {
            // SAFETY: the retained cells are live until released, and the
            // caller memory is valid per the contract
            unsafe {
                match retained {
                    RetainedResults::Legacy(binds) => backward_convert(binds, columns),
                    RetainedResults::Native(binds) => backward_convert(binds, columns),
                }
            }
        }

        let status = FetchStatus::from_code(code);
        tracing::debug!(count = columns.len(), ?status, "fetched row");
        Ok(status)
    }

    /// Free the shadow cells of the bound result array.
    ///
    /// Returns the number of cells freed: zero under the native
    /// representation and on any call after the first. Fetching afterwards
    /// fails until results are bound again.
    pub fn release_result_allocations(&mut self) -> usize {
        let freed = match mem::replace(&mut self.results, ResultState::Released) {
            ResultState::Bound(RetainedResults::Legacy(mut binds)) => {
                // SAFETY: the retained legacy array only holds leaked cells
                unsafe { release_native_cells(&mut binds) }
            }
            ResultState::Bound(RetainedResults::Native(_)) => 0,
            ResultState::Unbound => {
                self.results = ResultState::Unbound;
                return 0;
            }
            ResultState::Released => 0,
        };
        tracing::debug!(freed, "released result allocations");
        freed
    }
}

impl<S: StatementApi> Drop for StatementBinder<S> {
    fn drop(&mut self) {
        self.release_result_allocations();
    }
}

impl<S: StatementApi + fmt::Debug> fmt::Debug for StatementBinder<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let results = match &self.results {
            ResultState::Unbound => "unbound".to_string(),
            ResultState::Bound(retained) => format!("bound({})", retained.len()),
            ResultState::Released => "released".to_string(),
        };
        f.debug_struct("StatementBinder")
            .field("stmt", &self.stmt)
            .field("repr", &self.repr)
            .field("results", &results)
            .finish()
    }
}

impl From<Vec<LegacyBind>> for RetainedResults {
    fn from(binds: Vec<LegacyBind>) -> Self {
        RetainedResults::Legacy(binds)
    }
}

impl From<Vec<NativeBind>> for RetainedResults {
    fn from(binds: Vec<NativeBind>) -> Self {
        RetainedResults::Native(binds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::live_shadow_cells;
    use crate::testing::FakeStatement;
    use mysqlbind_core::{BindErrorKind, Error};
    use std::ffi::{c_uchar, c_ulong, c_void};

    const REPRS: [FlagRepr; 2] = [FlagRepr::Legacy, FlagRepr::Native];

    /// Descriptor with every scalar populated from `seed`, no flag references.
    fn populated(seed: u64) -> MysqlBind {
        const TYPES: [FieldType; 6] = [
            FieldType::Long,
            FieldType::VarString,
            FieldType::Blob,
            FieldType::Double,
            FieldType::DateTime,
            FieldType::NewDecimal,
        ];
        let mut x = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        let mut next = || {
            x = x.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
            x >> 33
        };

        let mut bind = MysqlBind::new(TYPES[(next() % 6) as usize]);
        bind.buffer = (next() as usize | 8) as *mut c_void;
        bind.length = (next() as usize | 8) as *mut c_ulong;
        bind.row_ptr = (next() as usize) as *mut c_uchar;
        bind.extension = (next() as usize) as *mut c_void;
        bind.buffer_length = next() as c_ulong;
        bind.offset = next() as c_ulong;
        bind.length_value = next() as c_ulong;
        bind.param_number = next() as u32;
        bind.pack_length = next() as u32;
        bind.error_value = next() % 2 == 0;
        bind.is_unsigned = next() % 2 == 0;
        bind.long_data_used = next() % 2 == 0;
        bind.is_null_value = next() % 2 == 0;
        bind
    }

    /// Copy of `bind` with every field backward conversion writes reset.
    fn cleared(bind: &MysqlBind) -> MysqlBind {
        let mut out = MysqlBind::new(FieldType::Null);
        out.is_null = bind.is_null;
        out.error = bind.error;
        out.error_value = bind.error_value;
        out.is_null_value = bind.is_null_value;
        out
    }

    fn fidelity<F: NativeFlag>() {
        for seed in 0..64 {
            let original = [populated(seed), populated(seed + 1000)];
            let native = unsafe { forward_convert::<F>(&original, None, 0) };

            for raw in &native {
                assert!(raw.store_param_func.is_none());
                assert!(raw.fetch_result.is_none());
                assert!(raw.skip_result.is_none());
                assert!(raw.is_null.is_null() && raw.error.is_null());
            }

            let mut restored = [cleared(&original[0]), cleared(&original[1])];
            unsafe { backward_convert(&native, &mut restored) };
            assert_eq!(restored, original);
        }
    }

    #[test]
    fn test_conversion_fidelity() {
        fidelity::<my_bool>();
        fidelity::<bool>();
    }

    #[test]
    fn test_forward_records_at_offset() {
        let mut flag = true;
        let stable = [MysqlBind::new(FieldType::Long).with_is_null(&mut flag)];
        let mut record = AllocationRecord::with_descriptors(3);

        let native = unsafe { forward_convert::<my_bool>(&stable, Some(&mut record), 2) };
        assert_eq!(record.allocated(), 1);
        let cell = record.is_null_cell(2).expect("shadow cell at start index");
        assert_eq!(native[0].is_null, cell.as_ptr());
        assert_eq!(cell.get(), 1);
    }

    #[test]
    fn test_unknown_buffer_type_is_kept() {
        let mut stable = [MysqlBind::new(FieldType::Long)];
        let mut native = unsafe { forward_convert::<bool>(&stable, None, 0) };
        native[0].buffer_type = 0x42;
        unsafe { backward_convert(&native, &mut stable) };
        assert_eq!(stable[0].buffer_type, FieldType::Long);
    }

    #[test]
    fn test_fetch_status_codes() {
        for code in [0, MYSQL_NO_DATA, MYSQL_DATA_TRUNCATED, 1, -1] {
            assert_eq!(FetchStatus::from_code(code).code(), code);
        }
        assert_eq!(FetchStatus::from_code(1), FetchStatus::Error(1));
        assert!(FetchStatus::Truncated.has_row());
        assert!(!FetchStatus::NoData.has_row());
        assert_eq!(BindStatus::from_native(0), BindStatus::Ok);
        assert_eq!(BindStatus::from_native(1), BindStatus::Failed);
    }

    #[test]
    fn test_allocation_symmetry() {
        for n in [1usize, 3, 8] {
            let before = live_shadow_cells();
            let mut nulls = vec![false; n];
            let mut errors = vec![false; n];
            let mut params: Vec<MysqlBind> = nulls
                .iter_mut()
                .zip(errors.iter_mut())
                .map(|(is_null, error)| {
                    MysqlBind::new(FieldType::Long)
                        .with_is_null(is_null)
                        .with_error(error)
                })
                .collect();

            let mut binder = StatementBinder::new(FakeStatement::new(n, 0), FlagRepr::Legacy);
            let binding = unsafe { binder.bind_params(&mut params) }.unwrap();
            assert!(binding.is_ok());
            assert_eq!(binding.allocations.len(), 2 * n);
            assert_eq!(binding.allocations.allocated(), 2 * n);
            assert_eq!(live_shadow_cells(), before + 2 * n);

            assert_eq!(binding.allocations.release(), 2 * n);
            assert_eq!(live_shadow_cells(), before);
        }
    }

    #[test]
    fn test_native_repr_allocates_nothing() {
        let before = live_shadow_cells();
        let mut flags = [true, false, true, false];
        let mut params: Vec<MysqlBind> = flags
            .iter_mut()
            .map(|flag| MysqlBind::new(FieldType::Tiny).with_is_null(flag))
            .collect();

        let mut binder = StatementBinder::new(FakeStatement::new(4, 0), FlagRepr::Native);
        let binding = unsafe { binder.bind_params(&mut params) }.unwrap();
        assert_eq!(binding.allocations.len(), 8);
        assert_eq!(binding.allocations.allocated(), 0);
        assert_eq!(live_shadow_cells(), before);
        assert_eq!(binding.allocations.release(), 0);
    }

    #[test]
    fn test_insert_two_params_end_to_end() {
        for repr in REPRS {
            let before = live_shadow_cells();

            // INSERT INTO t VALUES (?, ?)
            let mut id: i32 = 7;
            let mut name = *b"unused";
            let mut id_null = false;
            let mut name_null = true;
            let mut params = [
                MysqlBind::new(FieldType::Long)
                    .with_scalar(&mut id)
                    .with_is_null(&mut id_null),
                MysqlBind::new(FieldType::VarString)
                    .with_buffer(&mut name)
                    .with_is_null(&mut name_null),
            ];

            let mut binder = StatementBinder::new(FakeStatement::new(2, 0), repr);
            let binding = unsafe { binder.bind_params(&mut params) }.unwrap();
            assert!(binding.is_ok());

            let bound = binder.statement().bound_params();
            assert_eq!(bound.len(), 2);
            assert!(!bound[0].is_null);
            assert!(bound[1].is_null);
            assert!(bound.iter().all(|p| !p.has_callbacks));
            assert_eq!(bound[0].buffer_type, FieldType::Long.code());
            assert_eq!(bound[0].buffer_length, 4);
            assert_eq!(bound[1].buffer_length, 6);

            let executed = unsafe { binder.statement_mut().execute() };
            assert_eq!(executed, vec![false, true]);

            let expected = if repr.allocates() { 2 } else { 0 };
            assert_eq!(binding.allocations.release(), expected);
            assert_eq!(live_shadow_cells(), before);
            assert!(!id_null && name_null);
        }
    }

    #[test]
    fn test_failed_param_bind_still_returns_record() {
        let before = live_shadow_cells();
        let mut flag = false;
        let mut params = [MysqlBind::new(FieldType::Long).with_is_null(&mut flag)];

        let mut fake = FakeStatement::new(1, 0);
        fake.fail_bind = true;
        let mut binder = StatementBinder::new(fake, FlagRepr::Legacy);
        let binding = unsafe { binder.bind_params(&mut params) }.unwrap();
        assert_eq!(binding.status, BindStatus::Failed);
        assert_eq!(binding.allocations.allocated(), 1);

        drop(binding);
        assert_eq!(live_shadow_cells(), before);
    }

    #[test]
    fn test_param_count_mismatch() {
        let mut params = [MysqlBind::null()];
        let mut binder = StatementBinder::new(FakeStatement::new(2, 0), FlagRepr::Native);
        let err = unsafe { binder.bind_params(&mut params) }.unwrap_err();
        assert!(matches!(
            err,
            Error::Bind(ref e) if e.kind == BindErrorKind::CountMismatch
        ));
        assert_eq!(binder.statement().native_calls(), 0);
    }

    struct Columns {
        id: i64,
        name: [u8; 8],
        note: [u8; 4],
        lengths: [c_ulong; 3],
        nulls: [bool; 3],
        errors: [bool; 3],
    }

    impl Columns {
        fn new() -> Self {
            Self {
                id: 0,
                name: [0; 8],
                note: [0; 4],
                lengths: [0; 3],
                nulls: [false; 3],
                errors: [false; 3],
            }
        }

        fn binds(&mut self) -> [MysqlBind; 3] {
            let [l0, l1, l2] = &mut self.lengths;
            let [n0, n1, n2] = &mut self.nulls;
            let [e0, e1, e2] = &mut self.errors;
            [
                MysqlBind::new(FieldType::LongLong)
                    .with_scalar(&mut self.id)
                    .with_length(l0)
                    .with_is_null(n0)
                    .with_error(e0),
                MysqlBind::new(FieldType::VarString)
                    .with_buffer(&mut self.name)
                    .with_length(l1)
                    .with_is_null(n1)
                    .with_error(e1),
                MysqlBind::new(FieldType::Blob)
                    .with_buffer(&mut self.note)
                    .with_length(l2)
                    .with_is_null(n2)
                    .with_error(e2),
            ]
        }
    }

    #[test]
    fn test_fetch_three_columns() {
        for repr in REPRS {
            let before = live_shadow_cells();
            let mut fake = FakeStatement::new(0, 3);
            fake.push_row(vec![
                Some(42i64.to_ne_bytes().to_vec()),
                Some(b"alice".to_vec()),
                None,
            ]);
            fake.push_row(vec![
                Some(1i64.to_ne_bytes().to_vec()),
                Some(b"bob".to_vec()),
                Some(b"too long".to_vec()),
            ]);

            let mut cols = Columns::new();
            let mut binds = cols.binds();
            let mut binder = StatementBinder::new(fake, repr);

            let status = unsafe { binder.bind_results(&mut binds) }.unwrap();
            assert!(status.is_ok());
            let shadow = if repr.allocates() { 6 } else { 0 };
            assert_eq!(live_shadow_cells(), before + shadow);

            let row = unsafe { binder.fetch(&mut binds) }.unwrap();
            assert_eq!(row, FetchStatus::Row);
            let lengths: Vec<c_ulong> = binds.iter().map(|b| unsafe { b.data_length() }).collect();
            let nulls: Vec<bool> = binds.iter().map(|b| unsafe { b.null_flag() }).collect();
            assert_eq!(lengths, vec![8, 5, 0]);
            assert_eq!(nulls, vec![false, false, true]);
            assert_eq!(binds[0].buffer_length, 8);
            assert_eq!(binds[1].buffer_length, 8);
            assert_eq!(binds[2].buffer_type, FieldType::Blob);
            assert!(binds.iter().all(|b| b.offset == 0));

            let row = unsafe { binder.fetch(&mut binds) }.unwrap();
            assert_eq!(row, FetchStatus::Truncated);
            assert!(unsafe { binds[2].error_flag() });
            assert!(!unsafe { binds[2].null_flag() });
            assert_eq!(unsafe { binds[2].data_length() }, 8);
            assert_eq!(binds[2].buffer_length, 4);

            assert_eq!(unsafe { binder.fetch(&mut binds) }.unwrap(), FetchStatus::NoData);

            assert_eq!(binder.release_result_allocations(), shadow);
            assert_eq!(binder.release_result_allocations(), 0);
            assert_eq!(live_shadow_cells(), before);

            assert_eq!(cols.id, 1);
            assert_eq!(&cols.name[..3], b"bob");
            assert_eq!(&cols.note, b"too ");
            assert_eq!(cols.nulls, [false, false, false]);
            assert_eq!(cols.errors, [false, false, true]);
        }
    }

    #[test]
    fn test_fetch_after_release_is_rejected() {
        let mut cols = Columns::new();
        let mut binds = cols.binds();
        let mut binder = StatementBinder::new(FakeStatement::new(0, 3), FlagRepr::Legacy);

        let err = unsafe { binder.fetch(&mut binds) }.unwrap_err();
        assert!(matches!(err, Error::Bind(ref e) if e.kind == BindErrorKind::NotBound));

        unsafe { binder.bind_results(&mut binds) }.unwrap();
        binder.release_result_allocations();
        let err = unsafe { binder.fetch(&mut binds) }.unwrap_err();
        assert!(matches!(err, Error::Bind(ref e) if e.kind == BindErrorKind::NotBound));
    }

    #[test]
    fn test_result_count_mismatch() {
        let before = live_shadow_cells();
        let mut cols = Columns::new();
        let mut binds = cols.binds();
        let mut binder = StatementBinder::new(FakeStatement::new(0, 3), FlagRepr::Legacy);

        let err = unsafe { binder.bind_results(&mut binds[..2]) }.unwrap_err();
        assert!(matches!(
            err,
            Error::Bind(ref e) if e.kind == BindErrorKind::CountMismatch
        ));
        assert_eq!(binder.statement().native_calls(), 0);
        assert!(!binder.has_bound_results());
        assert_eq!(live_shadow_cells(), before);
    }

    #[test]
    fn test_fetch_count_mismatch_leaves_row_queued() {
        let before = live_shadow_cells();
        let mut fake = FakeStatement::new(0, 3);
        fake.push_row(vec![Some(5i64.to_ne_bytes().to_vec()), None, None]);

        let mut cols = Columns::new();
        let mut binds = cols.binds();
        let mut binder = StatementBinder::new(fake, FlagRepr::Legacy);
        unsafe { binder.bind_results(&mut binds) }.unwrap();
        assert_eq!(binder.statement().native_calls(), 1);

        let err = unsafe { binder.fetch(&mut binds[..1]) }.unwrap_err();
        assert!(matches!(
            err,
            Error::Bind(ref e) if e.kind == BindErrorKind::CountMismatch
        ));
        assert_eq!(binder.statement().native_calls(), 1);

        let row = unsafe { binder.fetch(&mut binds) }.unwrap();
        assert_eq!(row, FetchStatus::Row);
        assert_eq!(binder.statement().native_calls(), 2);

        assert_eq!(binder.release_result_allocations(), 6);
        assert_eq!(live_shadow_cells(), before);
        assert_eq!(cols.id, 5);
    }

    #[test]
    fn test_failed_result_bind_frees_cells() {
        let before = live_shadow_cells();
        let mut cols = Columns::new();
        let mut binds = cols.binds();
        let mut fake = FakeStatement::new(0, 3);
        fake.fail_bind = true;
        let mut binder = StatementBinder::new(fake, FlagRepr::Legacy);

        let status = unsafe { binder.bind_results(&mut binds) }.unwrap();
        assert_eq!(status, BindStatus::Failed);
        assert!(!binder.has_bound_results());
        assert_eq!(live_shadow_cells(), before);
    }

    #[test]
    fn test_rebind_and_drop_release_cells() {
        let before = live_shadow_cells();
        let mut cols = Columns::new();
        let mut binds = cols.binds();
        {
            let mut binder = StatementBinder::new(FakeStatement::new(0, 3), FlagRepr::Legacy);
            unsafe { binder.bind_results(&mut binds) }.unwrap();
            unsafe { binder.bind_results(&mut binds) }.unwrap();
            assert_eq!(live_shadow_cells(), before + 6);
        }
        assert_eq!(live_shadow_cells(), before);
    }

    #[test]
    fn test_release_native_cells_nulls_pointers() {
        let before = live_shadow_cells();
        let mut flag = true;
        let stable = [MysqlBind::new(FieldType::Long)
            .with_is_null(&mut flag)
            .with_error(&mut flag)];
        let mut native = unsafe { forward_convert::<my_bool>(&stable, None, 0) };
        assert_eq!(live_shadow_cells(), before + 2);

        assert_eq!(unsafe { release_native_cells(&mut native) }, 2);
        assert!(native[0].is_null.is_null() && native[0].error.is_null());
        assert_eq!(unsafe { release_native_cells(&mut native) }, 0);
        assert_eq!(live_shadow_cells(), before);
    }
}
