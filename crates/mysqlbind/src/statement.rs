//! Native prepared statements.
//!
//! [`Statement`] drives the marshaling layer against a live `MYSQL_STMT*`.
//! The call order is prepare, [`Statement::bind_params`],
//! [`Statement::execute`], [`Statement::bind_results`], then
//! [`Statement::fetch`] until [`FetchStatus::NoData`]. Shadow cells are
//! owned by the statement and freed by the two release calls, by rebinding,
//! or on drop.

// Allow casts in FFI code where we need to match C types exactly
#![allow(clippy::cast_possible_truncation)]

use std::ffi::c_int;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};

use mysqlbind_core::{BindError, BindErrorKind, Error, Result, StatementError, StatementErrorKind};

use crate::alloc::AllocationRecord;
use crate::bind::MysqlBind;
use crate::codec::{FlagRepr, NativeFlag};
use crate::connection::Connection;
use crate::ffi::{self, RawBind};
use crate::marshal::{BindStatus, FetchStatus, StatementApi, StatementBinder};

/// Owning wrapper over a `MYSQL_STMT*`, closed on drop.
#[derive(Debug)]
pub(crate) struct StmtHandle {
    stmt: *mut ffi::MYSQL_STMT,
}

impl StmtHandle {
    pub(crate) fn new(stmt: *mut ffi::MYSQL_STMT) -> Self {
        Self { stmt }
    }

    /// The last error reported on this statement.
    pub(crate) fn error(&self, sql: Option<&str>) -> StatementError {
        // SAFETY: the statement handle is live
        let (errno, message, sqlstate) = unsafe {
            (
                ffi::mysql_stmt_errno(self.stmt),
                ffi::owned_string(ffi::mysql_stmt_error(self.stmt)),
                ffi::owned_string(ffi::mysql_stmt_sqlstate(self.stmt)),
            )
        };
        StatementError {
            kind: StatementErrorKind::from_errno(errno),
            errno,
            sqlstate,
            message: message.unwrap_or_default(),
            sql: sql.map(str::to_string),
        }
    }

    fn close(&mut self) -> bool {
        let stmt = std::mem::replace(&mut self.stmt, ptr::null_mut());
        if stmt.is_null() {
            return true;
        }
        // SAFETY: live handle, nulled above so it is closed exactly once
        unsafe { ffi::mysql_stmt_close(stmt) == 0 }
    }
}

impl Drop for StmtHandle {
    fn drop(&mut self) {
        if !self.close() {
            tracing::warn!("mysql_stmt_close failed while dropping a statement");
        }
    }
}

impl StatementApi for StmtHandle {
    fn param_count(&self) -> usize {
        // SAFETY: the statement handle is live
        unsafe { ffi::mysql_stmt_param_count(self.stmt) as usize }
    }

    fn field_count(&self) -> usize {
        // SAFETY: the statement handle is live
        unsafe { ffi::mysql_stmt_field_count(self.stmt) as usize }
    }

    unsafe fn bind_param<F: NativeFlag>(&mut self, binds: &mut [RawBind<F>]) -> BindStatus {
        // SAFETY: `F` matches the linked library's MYSQL_BIND layout and the
        // library copies the array; pointer validity is the caller's contract
        let rc = unsafe { ffi::mysql_stmt_bind_param(self.stmt, binds.as_mut_ptr().cast()) };
        BindStatus::from_native(rc)
    }

    unsafe fn bind_result<F: NativeFlag>(&mut self, binds: &mut [RawBind<F>]) -> BindStatus {
        // SAFETY: as for bind_param
        let rc = unsafe { ffi::mysql_stmt_bind_result(self.stmt, binds.as_mut_ptr().cast()) };
        BindStatus::from_native(rc)
    }

    unsafe fn fetch(&mut self) -> c_int {
        // SAFETY: the statement handle is live; bound pointers are the
        // caller's contract
        unsafe { ffi::mysql_stmt_fetch(self.stmt) }
    }
}

/// Result set metadata of a prepared statement, freed on drop.
#[derive(Debug)]
pub struct ResultMetadata {
    res: NonNull<ffi::MYSQL_RES>,
}

impl ResultMetadata {
    /// Number of columns in the result set.
    pub fn field_count(&self) -> usize {
        // SAFETY: the result handle is live
        unsafe { ffi::mysql_num_fields(self.res.as_ptr()) as usize }
    }
}

impl Drop for ResultMetadata {
    fn drop(&mut self) {
        // SAFETY: live and freed exactly once
        unsafe { ffi::mysql_free_result(self.res.as_ptr()) };
    }
}

/// A prepared statement borrowed from its [`Connection`].
#[derive(Debug)]
pub struct Statement<'conn> {
    binder: StatementBinder<StmtHandle>,
    /// Records of the current parameter bind, plus any from failed binds
    /// the library may still point into
    param_records: Vec<AllocationRecord>,
    params_released: bool,
    sql: String,
    _conn: PhantomData<&'conn Connection>,
}

impl Statement<'_> {
    pub(crate) fn new(handle: StmtHandle, repr: FlagRepr, sql: &str) -> Self {
        Self {
            binder: StatementBinder::new(handle, repr),
            param_records: Vec::new(),
            params_released: false,
            sql: sql.to_string(),
            _conn: PhantomData,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn flag_repr(&self) -> FlagRepr {
        self.binder.repr()
    }

    pub fn param_count(&self) -> usize {
        self.binder.statement().param_count()
    }

    pub fn field_count(&self) -> usize {
        self.binder.statement().field_count()
    }

    fn error(&self) -> Error {
        let err = self.binder.statement().error(Some(&self.sql));
        tracing::warn!(errno = err.errno, message = %err.message, "statement call failed");
        Error::Statement(err)
    }

    /// Result set metadata, or `None` for statements without a result set.
    pub fn result_metadata(&self) -> Result<Option<ResultMetadata>> {
        let stmt = self.binder.statement().stmt;
        // SAFETY: the statement handle is live
        let res = unsafe { ffi::mysql_stmt_result_metadata(stmt) };
        match NonNull::new(res) {
            Some(res) => Ok(Some(ResultMetadata { res })),
            // SAFETY: as above
            None if unsafe { ffi::mysql_stmt_errno(stmt) } != 0 => Err(self.error()),
            None => Ok(None),
        }
    }

    /// Bind parameter descriptors.
    ///
    /// The statement keeps the shadow cells until
    /// [`Statement::release_param_allocations`], the next successful bind,
    /// or drop. Flag values are captured at bind time under the legacy
    /// representation; rebind after changing them.
    ///
    /// # Safety
    /// Every pointer in `params` must stay valid until the statement has
    /// been executed.
    #[tracing::instrument(level = "debug", skip(self, params), fields(count = params.len()))]
    pub unsafe fn bind_params(&mut self, params: &mut [MysqlBind]) -> Result<()> {
        // SAFETY: forwarded caller contract
        let binding = unsafe { self.binder.bind_params(params) }?;
        let ok = binding.is_ok();
        if ok {
            self.param_records.clear();
        }
        self.param_records.push(binding.allocations);
        self.params_released = false;

        if ok { Ok(()) } else { Err(self.error()) }
    }

    /// Execute the statement with the bound parameters.
    #[tracing::instrument(level = "debug", skip(self), fields(sql = %self.sql))]
    pub fn execute(&mut self) -> Result<()> {
        if self.params_released && self.binder.repr().allocates() && self.param_count() > 0 {
            return Err(Error::Bind(BindError {
                kind: BindErrorKind::NotBound,
                message: "parameter allocations were released; bind parameters again".to_string(),
            }));
        }

        // SAFETY: the statement handle is live and the shadow cells of the
        // last parameter bind are held in `param_records`
        let rc = unsafe { ffi::mysql_stmt_execute(self.binder.statement().stmt) };
        if rc == 0 { Ok(()) } else { Err(self.error()) }
    }

    /// Free the shadow cells of the parameter bind.
    ///
    /// Returns the number of cells freed. Executing again requires a new
    /// parameter bind under the legacy representation.
    pub fn release_param_allocations(&mut self) -> usize {
        self.params_released = true;
        self.param_records.drain(..).map(AllocationRecord::release).sum()
    }

    /// Bind result descriptors, replacing any previous result binding.
    ///
    /// # Safety
    /// Every pointer in `columns` must stay valid until the results are
    /// released, rebound, or the statement is dropped.
    #[tracing::instrument(level = "debug", skip(self, columns), fields(count = columns.len()))]
    pub unsafe fn bind_results(&mut self, columns: &mut [MysqlBind]) -> Result<()> {
        // SAFETY: forwarded caller contract
        let status = unsafe { self.binder.bind_results(columns) }?;
        if status.is_ok() { Ok(()) } else { Err(self.error()) }
    }

    /// Fetch the next row into the bound result descriptors.
    ///
    /// Returns [`FetchStatus::Row`], [`FetchStatus::Truncated`] or
    /// [`FetchStatus::NoData`]; a native fetch failure becomes an error.
    ///
    /// # Safety
    /// `columns` must reference the same caller memory that was bound.
    pub unsafe fn fetch(&mut self, columns: &mut [MysqlBind]) -> Result<FetchStatus> {
        // SAFETY: forwarded caller contract
        match unsafe { self.binder.fetch(columns) }? {
            FetchStatus::Error(code) => {
                tracing::debug!(code, "fetch failed");
                Err(self.error())
            }
            status => Ok(status),
        }
    }

    /// Free the shadow cells of the result bind. Safe to call repeatedly.
    pub fn release_result_allocations(&mut self) -> usize {
        self.binder.release_result_allocations()
    }

    /// Rows changed by the last execute.
    pub fn affected_rows(&self) -> u64 {
        // SAFETY: the statement handle is live
        unsafe { ffi::mysql_stmt_affected_rows(self.binder.statement().stmt) }
    }

    /// AUTO_INCREMENT value generated by the last execute.
    pub fn insert_id(&self) -> u64 {
        // SAFETY: the statement handle is live
        unsafe { ffi::mysql_stmt_insert_id(self.binder.statement().stmt) }
    }

    /// Reset the statement on the server, discarding unfetched rows.
    pub fn reset(&mut self) -> Result<()> {
        // SAFETY: the statement handle is live
        let rc = unsafe { ffi::mysql_stmt_reset(self.binder.statement().stmt) };
        if rc == 0 { Ok(()) } else { Err(self.error()) }
    }

    /// Release every allocation and close the statement handle.
    #[tracing::instrument(level = "debug", skip(self), fields(sql = %self.sql))]
    pub fn close(mut self) -> Result<()> {
        self.binder.release_result_allocations();
        if self.binder.statement_mut().close() {
            self.release_param_allocations();
            Ok(())
        } else {
            Err(Error::Statement(StatementError {
                kind: StatementErrorKind::Database,
                errno: 0,
                sqlstate: None,
                message: "mysql_stmt_close failed".to_string(),
                sql: Some(self.sql.clone()),
            }))
        }
    }
}
