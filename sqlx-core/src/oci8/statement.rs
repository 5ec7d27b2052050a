use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use crate::error::Error;
use crate::logger::{NoticeLogger, QueryLogger};
use crate::oci8::arena::Key;
use crate::oci8::bind::BindSet;
use crate::oci8::connection::ConnectionShared;
use crate::oci8::define::DefineSet;
use crate::oci8::handle::{HandleSet, OwnedHandle};
use crate::oci8::native::constants::*;
use crate::oci8::native::{Attr, AttrKind, BindBuffer, HandleType, OciApi, RawHandle};
use crate::oci8::options::Oci8ConnectOptions;
use crate::oci8::placeholder;
use crate::oci8::rows::{CancelSignal, Oci8Rows};
use crate::oci8::status::{check, translate, ErrorScope, Outcome};
use crate::oci8::{Oci8Arguments, Oci8QueryResult};

/// Lifecycle of a prepared statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementState {
    Created,
    Prepared,
    Bound,
    Executed,
    /// A query ran and its rows are waiting to be fetched.
    ResultSet,
    /// A non-query ran; its outcome has been read.
    Completed,
    Closed,
}

/// Everything a prepared statement owns on the native side.
///
/// Defines and binds are declared before the handle so their locators and
/// buffers are released first.
#[derive(Debug)]
pub(crate) struct StatementSlot {
    pub(crate) defines: Option<DefineSet>,
    pub(crate) binds: Option<BindSet>,
    pub(crate) handle: OwnedHandle,
    pub(crate) sql: String,
    pub(crate) placeholders: usize,
    pub(crate) stmt_type: u16,
    pub(crate) state: StatementState,
    /// Bumped by every execute; rows and results remember the execution
    /// they came from.
    pub(crate) execution: u64,
}

impl StatementSlot {
    pub(crate) fn prepare(
        handles: &HandleSet,
        options: &Oci8ConnectOptions,
        sql: &str,
    ) -> Result<Self, Error> {
        let parsed = placeholder::parse(sql, options.placeholder_style);
        let handle = handles.alloc(HandleType::Stmt, ErrorScope::Statement)?;

        let api = handles.api();
        let err = handles.err()?;
        let logger = handles.logger();
        let stmt = handle.raw();

        let status = api.stmt_prepare(stmt, err, &parsed.sql, OCI_NTV_SYNTAX);
        check(api, status, err, ErrorScope::Statement, "OCIStmtPrepare", logger)?;

        let status = api.attr_set(
            stmt,
            HandleType::Stmt,
            Attr::PrefetchRows(options.prefetch_rows),
            err,
        );
        check(api, status, err, ErrorScope::Statement, "OCIAttrSet(OCI_ATTR_PREFETCH_ROWS)", logger)?;

        let status = api.attr_set(
            stmt,
            HandleType::Stmt,
            Attr::PrefetchMemory(options.prefetch_memory),
            err,
        );
        check(api, status, err, ErrorScope::Statement, "OCIAttrSet(OCI_ATTR_PREFETCH_MEMORY)", logger)?;

        let (status, stmt_type) = api.attr_get(stmt, HandleType::Stmt, AttrKind::StmtType, err);
        check(api, status, err, ErrorScope::Statement, "OCIAttrGet(OCI_ATTR_STMT_TYPE)", logger)?;

        let stmt_type = stmt_type
            .as_u64()
            .and_then(|t| u16::try_from(t).ok())
            .unwrap_or(OCI_STMT_UNKNOWN);

        log::trace!("prepared statement {} of type {}", stmt, stmt_type);

        Ok(StatementSlot {
            defines: None,
            binds: None,
            handle,
            placeholders: parsed.placeholder_count(),
            sql: parsed.sql.into_owned(),
            stmt_type,
            state: StatementState::Prepared,
            execution: 0,
        })
    }

    pub(crate) fn is_query(&self) -> bool {
        self.stmt_type == OCI_STMT_SELECT
    }

    fn bind(
        &mut self,
        handles: &HandleSet,
        options: &Oci8ConnectOptions,
        args: &Oci8Arguments,
    ) -> Result<(), Error> {
        if self.state == StatementState::ResultSet {
            // the open cursor belongs to the previous binding
            self.defines = None;
            self.execution += 1;
        }

        self.binds = None;
        self.state = StatementState::Prepared;

        let binds = BindSet::encode(
            args,
            self.placeholders,
            options.placeholder_style,
            options.piece_size,
        )?;

        binds.register(handles.api(), self.handle.raw(), handles.err()?, handles.logger())?;

        self.binds = Some(binds);
        self.state = StatementState::Bound;

        Ok(())
    }

    fn execute(
        &mut self,
        handles: &HandleSet,
        options: &Oci8ConnectOptions,
        in_transaction: bool,
        cancel: &CancelSignal,
    ) -> Result<Oci8QueryResult, Error> {
        match self.state {
            StatementState::Closed => return Err(Error::Closed("statement")),
            StatementState::Created => {
                return Err(Error::State("statement has not been prepared".into()))
            }
            StatementState::Prepared if self.placeholders > 0 => {
                return Err(Error::State(format!(
                    "statement has {} placeholders but nothing is bound",
                    self.placeholders
                )))
            }
            _ => {}
        }

        self.defines = None;
        self.execution += 1;

        if let Some(binds) = &mut self.binds {
            binds.prepare_for_execute();
        }

        let api = handles.api();
        let err = handles.err()?;
        let svc = handles.svc()?;
        let logger = handles.logger();
        let stmt = self.handle.raw();
        let is_query = self.is_query();

        let iters = if is_query {
            0
        } else {
            self.binds.as_ref().map_or(1, BindSet::iters)
        };

        let mode = if in_transaction {
            OCI_DEFAULT
        } else {
            OCI_COMMIT_ON_SUCCESS
        };

        run(
            api,
            Native { svc, stmt, err },
            self.binds.as_mut(),
            iters,
            mode,
            cancel,
            logger,
        )?;

        self.state = StatementState::Executed;

        if is_query {
            self.state = StatementState::ResultSet;

            return Ok(Oci8QueryResult::default());
        }

        let rows_affected = read_row_count(api, stmt, err, logger);

        let out_values = match &self.binds {
            Some(binds) => binds.read_outputs(options.timezone)?,
            None => Vec::new(),
        };

        self.state = StatementState::Completed;

        Ok(Oci8QueryResult {
            rows_affected,
            out_values,
            ..Oci8QueryResult::default()
        })
    }
}

#[derive(Clone, Copy)]
struct Native {
    svc: RawHandle,
    stmt: RawHandle,
    err: RawHandle,
}

/// Call execute until the library is done with the statement: supply
/// pieces while it needs data and call again while it is still executing.
fn run(
    api: &dyn OciApi,
    native: Native,
    mut binds: Option<&mut BindSet>,
    iters: u32,
    mode: u32,
    cancel: &CancelSignal,
    logger: &NoticeLogger,
) -> Result<(), Error> {
    let Native { svc, stmt, err } = native;

    loop {
        if cancel.is_cancelled() {
            let status = api.break_execution(svc, err);

            if let Err(e) = check(api, status, err, ErrorScope::Execute, "OCIBreak", logger) {
                logger.notice(format_args!("interrupting execution failed: {}", e));
            }

            return Err(Error::Cancelled);
        }

        let buffers: &mut [BindBuffer] = match binds.as_deref_mut() {
            Some(binds) => binds.buffers_mut(),
            None => &mut [],
        };

        let status = api.stmt_execute(svc, stmt, err, buffers, iters, mode);

        match translate(api, status, err, HandleType::Error) {
            Outcome::Success | Outcome::NoData => return Ok(()),

            Outcome::SuccessWithInfo(message) => {
                logger.notice(format_args!("OCIStmtExecute: {}", message));
                return Ok(());
            }

            Outcome::StillExecuting => continue,

            Outcome::NeedData => {
                let (status, request) = api.stmt_get_piece_info(stmt, err);
                check(api, status, err, ErrorScope::Execute, "OCIStmtGetPieceInfo", logger)?;

                let request = request
                    .ok_or_else(|| err_protocol!("OCIStmtGetPieceInfo did not name a bind"))?;

                let binds = binds.as_deref_mut().ok_or_else(|| {
                    err_protocol!("OCIStmtExecute asked for data but nothing is bound")
                })?;

                let (piece, data) = binds.next_piece(request)?;

                let status = api.stmt_set_piece(stmt, err, request, piece, data);
                check(api, status, err, ErrorScope::Execute, "OCIStmtSetPieceInfo", logger)?;
            }

            Outcome::InvalidHandle => return Err(Error::InvalidHandle("OCIStmtExecute")),

            Outcome::Error { code, message } => {
                return Err(ErrorScope::Execute.error(code, message))
            }
        }
    }
}

fn read_row_count(
    api: &dyn OciApi,
    stmt: RawHandle,
    err: RawHandle,
    logger: &NoticeLogger,
) -> Result<u64, Error> {
    let (status, count) = api.attr_get(stmt, HandleType::Stmt, AttrKind::RowCount, err);
    check(api, status, err, ErrorScope::Execute, "OCIAttrGet(OCI_ATTR_ROW_COUNT)", logger)?;

    count
        .as_u64()
        .ok_or_else(|| err_protocol!("OCI_ATTR_ROW_COUNT returned {:?}", count))
}

/// A prepared statement.
///
/// The statement shares its connection; it is released by [`close`] (or
/// when dropped), or when the connection closes, whichever comes first.
///
/// [`close`]: Oci8Statement::close
pub struct Oci8Statement {
    shared: Arc<ConnectionShared>,
    key: Key,
    closed: bool,
}

impl Oci8Statement {
    pub(crate) fn new(shared: Arc<ConnectionShared>, key: Key) -> Self {
        Self {
            shared,
            key,
            closed: false,
        }
    }

    /// Encode and register `args`, replacing any earlier binding.
    ///
    /// Each row of `args` is one execution of a batch.
    pub fn bind(&mut self, args: Oci8Arguments) -> Result<(), Error> {
        if self.closed {
            return Err(Error::Closed("statement"));
        }

        let mut inner = self.shared.lock()?;
        let (handles, slot) = inner.split(self.key)?;

        slot.bind(handles, &self.shared.options, &args)
    }

    /// Run a statement that does not return rows.
    pub fn execute(&mut self) -> Result<Oci8QueryResult, Error> {
        self.execute_with(&CancelSignal::new())
    }

    /// Like [`execute`](Self::execute), giving up with [`Error::Cancelled`]
    /// once `cancel` is raised.
    pub fn execute_with(&mut self, cancel: &CancelSignal) -> Result<Oci8QueryResult, Error> {
        if self.closed {
            return Err(Error::Closed("statement"));
        }

        let mut guard = self.shared.lock()?;
        let inner = &mut *guard;
        let in_transaction = inner.in_transaction;
        let (handles, slot) = inner.split(self.key)?;

        let mut query_logger =
            QueryLogger::new(slot.sql.clone(), self.shared.options.log_settings.clone());

        let mut result = slot.execute(handles, &self.shared.options, in_transaction, cancel)?;

        if let Ok(n) = &result.rows_affected {
            query_logger.increase_rows_affected(*n);
        }

        result.source = Some((Arc::clone(&self.shared), self.key, slot.execution));

        Ok(result)
    }

    /// Run a query and iterate its rows.
    pub fn query(&mut self) -> Result<Oci8Rows, Error> {
        self.query_with(CancelSignal::new())
    }

    /// Like [`query`](Self::query); `cancel` stays attached to the rows and
    /// is polled before every round-trip.
    pub fn query_with(&mut self, cancel: CancelSignal) -> Result<Oci8Rows, Error> {
        if self.closed {
            return Err(Error::Closed("statement"));
        }

        let mut guard = self.shared.lock()?;
        let inner = &mut *guard;
        let in_transaction = inner.in_transaction;
        let (handles, slot) = inner.split(self.key)?;

        if !slot.is_query() {
            return Err(Error::State(format!(
                "statement of type {} does not return rows; use execute",
                slot.stmt_type
            )));
        }

        let query_logger =
            QueryLogger::new(slot.sql.clone(), self.shared.options.log_settings.clone());

        slot.execute(handles, &self.shared.options, in_transaction, &cancel)?;
        let execution = slot.execution;

        drop(guard);

        Ok(Oci8Rows::new(
            Arc::clone(&self.shared),
            self.key,
            execution,
            cancel,
            query_logger,
        ))
    }

    pub fn state(&self) -> StatementState {
        if self.closed {
            return StatementState::Closed;
        }

        self.shared
            .lock()
            .ok()
            .and_then(|inner| inner.statements.get(self.key).map(|slot| slot.state))
            .unwrap_or(StatementState::Closed)
    }

    /// Statement text as sent to the server, after placeholder rewriting.
    pub fn sql(&self) -> Result<String, Error> {
        let inner = self.shared.lock()?;

        inner
            .statements
            .get(self.key)
            .map(|slot| slot.sql.clone())
            .ok_or(Error::Closed("statement"))
    }

    /// Release the statement handle and every buffer it owns. Rows still
    /// reading from it report [`Error::Closed`]. Closing twice is a no-op.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }

        self.closed = true;

        let slot = match self.shared.lock() {
            Ok(mut inner) => inner.statements.remove(self.key),
            Err(_) => None,
        };

        drop(slot);
    }
}

impl Drop for Oci8Statement {
    fn drop(&mut self) {
        self.close();
    }
}

impl Debug for Oci8Statement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Oci8Statement")
            .field("key", &self.key)
            .field("closed", &self.closed)
            .finish()
    }
}
