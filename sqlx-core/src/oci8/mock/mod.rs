//! An in-process stand-in for the native client library.
//!
//! [`MockOci`] implements [`OciApi`] against a small in-memory database so the
//! driver can be exercised without an Oracle installation. It tracks every
//! handle it issues, records every call, and can be told to fail calls with
//! [`MockFault`].
//!
//! ```rust
//! # use std::sync::Arc;
//! # use sqlx_core_oci8::oci8::mock::{MockColumn, MockOci};
//! # use sqlx_core_oci8::oci8::{Oci8DataType, Oci8Value};
//! let mock = MockOci::new();
//! mock.create_table("t", &[
//!     MockColumn::new("id", Oci8DataType::Number { precision: 10, scale: 0 }),
//!     MockColumn::new("name", Oci8DataType::Varchar2).size(20),
//! ]);
//! mock.insert_row("t", vec![Oci8Value::Integer(1), Oci8Value::Text("one".into())]);
//! assert_eq!(mock.table_rows("t").len(), 1);
//! ```
//!
//! Statements understand a small SQL dialect: single table `SELECT` with
//! equality filters, `INSERT`, `UPDATE`, `DELETE` and `BEGIN proc(...); END;`
//! calls of procedures registered with [`MockOci::register_procedure`].

use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::oci8::codec::LOCATOR_LEN;
use crate::oci8::native::constants::*;
use crate::oci8::native::{
    Attr, AttrKind, AttrValue, BindBuffer, BindDesc, ColumnDescription, Credentials,
    DefineBuffer, DefineDesc, HandleType, OciApi, Piece, PieceRequest, Placeholder, RawHandle,
    Sword,
};
use crate::oci8::Oci8Value;

mod engine;
mod parser;

use engine::{decode_bind, encode_as, kind_of, lob_bytes, ora, Database, OraError, Params, ResultSet, Undo};
use parser::Sql;

pub use engine::{MockColumn, Procedure};

/// A native call, as recorded by [`MockOci::calls`] and matched by faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockCall {
    EnvCreate,
    HandleAlloc(HandleType),
    HandleFree(HandleType),
    ErrorGet,
    NlsCharsetId,
    ServerAttach,
    ServerDetach,
    AttrSet,
    AttrGet,
    SessionBegin,
    SessionEnd,
    Ping,
    StmtPrepare,
    BindByPos,
    BindByName,
    StmtExecute,
    StmtGetPieceInfo,
    StmtSetPiece(Piece),
    ParamGet,
    DefineByPos,
    /// `rows` is the number of rows requested; `0` cancels the cursor.
    StmtFetch { rows: u32 },
    LobRead,
    TransStart,
    TransCommit,
    TransRollback,
    Break,
}

impl MockCall {
    fn matches(&self, call: &MockCall) -> bool {
        match (self, call) {
            (MockCall::StmtFetch { .. }, MockCall::StmtFetch { .. }) => true,
            _ => self == call,
        }
    }
}

#[derive(Debug, Clone)]
enum FaultAction {
    /// Record the error on the call's error handle and return `OCI_ERROR`.
    Error { code: i32, message: String },
    /// Return the status without doing anything.
    Status(Sword),
}

/// A failure to inject into the next matching call(s).
///
/// Fetch faults match any number of requested rows.
#[derive(Debug, Clone)]
pub struct MockFault {
    call: MockCall,
    action: FaultAction,
    skip: usize,
    remaining: usize,
}

impl MockFault {
    pub fn error(call: MockCall, code: i32, message: &str) -> Self {
        Self {
            call,
            action: FaultAction::Error {
                code,
                message: message.to_owned(),
            },
            skip: 0,
            remaining: 1,
        }
    }

    pub fn status(call: MockCall, status: Sword) -> Self {
        Self {
            call,
            action: FaultAction::Status(status),
            skip: 0,
            remaining: 1,
        }
    }

    /// Fire for the next `n` matching calls instead of only the next one.
    pub fn times(mut self, n: usize) -> Self {
        self.remaining = n;
        self
    }

    /// Let `n` matching calls through before firing.
    pub fn after(mut self, n: usize) -> Self {
        self.skip = n;
        self
    }
}

/// Counters of handle allocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandleStats {
    pub allocated: usize,
    pub freed: usize,
    /// Handles allocated and not freed yet.
    pub outstanding: usize,
    /// Frees of unknown or already freed handles.
    pub invalid_frees: usize,
}

#[derive(Debug)]
struct HandleEntry {
    kind: HandleType,
    parent: Option<RawHandle>,
}

#[derive(Debug, Default)]
struct SvcState {
    server: Option<RawHandle>,
    session: Option<RawHandle>,
    undo: Vec<Undo>,
    read_only: bool,
}

#[derive(Debug, Default)]
struct SessionState {
    username: String,
    password: String,
    active: bool,
}

#[derive(Debug)]
struct PieceEntry {
    bind: usize,
    row: usize,
    data: Vec<u8>,
    started: bool,
    done: bool,
}

#[derive(Debug, Default)]
struct StmtState {
    sql: Option<Sql>,
    placeholders: Vec<String>,
    stmt_type: u16,
    result: Option<ResultSet>,
    row_count: u64,
    rows_fetched: u32,
    row_id: Option<String>,
    pieces: Option<Vec<PieceEntry>>,
    svc: Option<RawHandle>,
}

#[derive(Debug)]
struct MockState {
    next_id: usize,
    handles: HashMap<RawHandle, HandleEntry>,
    stats: HandleStats,
    calls: Vec<MockCall>,
    faults: Vec<MockFault>,
    errors: HashMap<RawHandle, (i32, String)>,
    attached: HashMap<RawHandle, String>,
    svcs: HashMap<RawHandle, SvcState>,
    sessions: HashMap<RawHandle, SessionState>,
    stmts: HashMap<RawHandle, StmtState>,
    lobs: HashMap<RawHandle, Vec<u8>>,
    db: Database,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            next_id: 0x1000,
            handles: HashMap::new(),
            stats: HandleStats::default(),
            calls: Vec::new(),
            faults: Vec::new(),
            errors: HashMap::new(),
            attached: HashMap::new(),
            svcs: HashMap::new(),
            sessions: HashMap::new(),
            stmts: HashMap::new(),
            lobs: HashMap::new(),
            db: Database::new(),
        }
    }
}

impl MockState {
    /// Record `call` and return the fault to apply, if one fires.
    fn enter(&mut self, call: MockCall) -> Option<FaultAction> {
        self.calls.push(call);

        let index = self
            .faults
            .iter()
            .position(|fault| fault.call.matches(&call))?;

        let fault = &mut self.faults[index];

        if fault.skip > 0 {
            fault.skip -= 1;
            return None;
        }

        let action = fault.action.clone();
        fault.remaining = fault.remaining.saturating_sub(1);

        if fault.remaining == 0 {
            self.faults.remove(index);
        }

        Some(action)
    }

    /// Apply a fault to a call reporting through `err`.
    fn fail(&mut self, action: FaultAction, err: RawHandle) -> Sword {
        match action {
            FaultAction::Error { code, message } => {
                self.errors.insert(err, (code, message));
                OCI_ERROR
            }
            FaultAction::Status(status) => status,
        }
    }

    fn raise(&mut self, err: RawHandle, error: OraError) -> Sword {
        self.errors.insert(err, (error.code, error.message));
        OCI_ERROR
    }

    fn is_kind(&self, handle: RawHandle, kind: HandleType) -> bool {
        self.handles.get(&handle).map_or(false, |entry| entry.kind == kind)
    }

    fn issue(&mut self, kind: HandleType, parent: Option<RawHandle>) -> RawHandle {
        self.next_id += 0x10;

        let Some(handle) = RawHandle::new(self.next_id) else {
            unreachable!("handle ids start above zero")
        };

        self.handles.insert(handle, HandleEntry { kind, parent });
        self.stats.allocated += 1;
        self.stats.outstanding += 1;

        match kind {
            HandleType::SvcCtx => {
                self.svcs.insert(handle, SvcState::default());
            }
            HandleType::Session => {
                self.sessions.insert(handle, SessionState::default());
            }
            HandleType::Stmt => {
                self.stmts.insert(handle, StmtState::default());
            }
            HandleType::Env
            | HandleType::Error
            | HandleType::Server
            | HandleType::LobLocator => {}
        }

        handle
    }

    /// The service context's session, if it has begun.
    fn check_session(&self, svc: RawHandle) -> Result<(), OraError> {
        let active = self
            .svcs
            .get(&svc)
            .and_then(|svc| svc.session)
            .and_then(|session| self.sessions.get(&session))
            .map_or(false, |session| session.active);

        if active {
            Ok(())
        } else {
            Err(ora(3114, "not connected to ORACLE"))
        }
    }
}

/// The mock client library. Clones share state, so a test can keep one
/// clone for inspection and hand another to the driver.
#[derive(Clone, Default)]
pub struct MockOci {
    state: Arc<Mutex<MockState>>,
}

impl Debug for MockOci {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockOci")
            .field("handles", &self.handle_stats())
            .finish()
    }
}

impl MockOci {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every call made so far, oldest first.
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// How many times `call` was made.
    pub fn count(&self, call: MockCall) -> usize {
        self.lock().calls.iter().filter(|c| call.matches(c)).count()
    }

    pub fn inject(&self, fault: MockFault) {
        self.lock().faults.push(fault);
    }

    /// Record a diagnostic on a handle, as a failed call would.
    pub fn set_error(&self, handle: RawHandle, code: i32, message: &str) {
        self.lock().errors.insert(handle, (code, message.to_owned()));
    }

    pub fn handle_stats(&self) -> HandleStats {
        self.lock().stats
    }

    /// Live handles of one type.
    pub fn live_handles(&self, kind: HandleType) -> usize {
        self.lock()
            .handles
            .values()
            .filter(|entry| entry.kind == kind)
            .count()
    }

    pub fn create_table(&self, name: &str, columns: &[MockColumn]) {
        self.lock().db.create_table(name, columns.to_vec());
    }

    /// Add a committed row.
    ///
    /// # Panics
    ///
    /// Panics if the table does not exist or the row violates a constraint.
    #[track_caller]
    pub fn insert_row(&self, table: &str, values: Vec<Oci8Value>) {
        if let Err(error) = self.lock().db.insert_row(table, values) {
            panic!("{}", error.message);
        }
    }

    /// Committed and uncommitted rows of a table, in insertion order.
    pub fn table_rows(&self, table: &str) -> Vec<Vec<Oci8Value>> {
        self.lock().db.rows(table).unwrap_or_default()
    }

    pub fn register_procedure<F>(&self, name: &str, procedure: F)
    where
        F: Fn(&mut [Oci8Value]) -> Result<(), (i32, String)> + Send + Sync + 'static,
    {
        self.lock().db.register_procedure(name, Arc::new(procedure));
    }
}

/// The buffer index bound to the `index`th distinct placeholder `name`.
fn bound(binds: &[BindBuffer], name: &str, index: usize) -> Option<usize> {
    binds.iter().position(|bind| match &bind.desc.placeholder {
        Placeholder::Name(n) => n.eq_ignore_ascii_case(name),
        Placeholder::Position(p) => *p as usize == index + 1,
    })
}

/// Input value of `bind` for batch row `row`.
fn input_value(
    bind: &BindBuffer,
    index: usize,
    row: usize,
    pieces: &[PieceEntry],
) -> Result<Oci8Value, OraError> {
    let desc = &bind.desc;

    if !desc.direction.is_input() || row >= bind.buffer.rows() || bind.buffer.is_null(row) {
        return Ok(Oci8Value::Null);
    }

    if desc.data_at_exec {
        let piece = pieces
            .iter()
            .find(|p| p.bind == index && p.row == row)
            .ok_or_else(|| ora(3129, "the next piece to be inserted is required"))?;

        return decode_bind(desc.data_type, &piece.data);
    }

    match bind.buffer.value(row) {
        Some(bytes) => decode_bind(desc.data_type, bytes),
        None => Ok(Oci8Value::Null),
    }
}

fn write_output(bind: &mut BindBuffer, row: usize, value: &Oci8Value) -> Result<(), OraError> {
    if !bind.desc.direction.is_output() || row >= bind.buffer.rows() {
        return Ok(());
    }

    if value.is_null() {
        bind.buffer.write(row, None);
        return Ok(());
    }

    let too_small = || ora(6502, "PL/SQL: numeric or value error: character string buffer too small");

    let kind = kind_of(bind.desc.data_type).ok_or_else(too_small)?;
    let bytes = encode_as(value, kind)?;

    if bind.buffer.write(row, Some(&bytes)) {
        Ok(())
    } else {
        Err(too_small())
    }
}

impl MockOci {
    fn execute(
        state: &mut MockState,
        svc: RawHandle,
        stmt: RawHandle,
        binds: &mut [BindBuffer],
        iters: u32,
        mode: u32,
    ) -> Result<Sword, OraError> {
        state.check_session(svc)?;

        let MockState {
            stmts, svcs, db, ..
        } = state;

        let stmt_state = stmts
            .get_mut(&stmt)
            .ok_or_else(|| ora(24337, "statement handle not prepared"))?;
        let sql = stmt_state
            .sql
            .clone()
            .ok_or_else(|| ora(24337, "statement handle not prepared"))?;

        stmt_state.svc = Some(svc);

        // piecewise inputs first
        let pieces = match stmt_state.pieces.take() {
            Some(pieces) if pieces.iter().all(|p| p.done) => pieces,
            Some(pieces) => {
                stmt_state.pieces = Some(pieces);
                return Ok(OCI_NEED_DATA);
            }
            None => {
                let wanted: Vec<PieceEntry> = binds
                    .iter()
                    .enumerate()
                    .filter(|(_, bind)| bind.desc.data_at_exec && bind.desc.direction.is_input())
                    .flat_map(|(index, bind)| {
                        (0..bind.buffer.rows())
                            .filter(|row| !bind.buffer.is_null(*row))
                            .map(move |row| PieceEntry {
                                bind: index,
                                row,
                                data: Vec::new(),
                                started: false,
                                done: false,
                            })
                    })
                    .collect();

                if !wanted.is_empty() {
                    stmt_state.pieces = Some(wanted);
                    return Ok(OCI_NEED_DATA);
                }

                Vec::new()
            }
        };

        stmt_state.result = None;
        stmt_state.row_count = 0;
        stmt_state.rows_fetched = 0;
        stmt_state.row_id = None;

        let names = stmt_state.placeholders.clone();
        let mut slots = Vec::with_capacity(names.len());

        for (index, name) in names.iter().enumerate() {
            let slot = bound(binds, name, index)
                .ok_or_else(|| ora(ORA_NOT_ALL_VARIABLES_BOUND, "not all variables bound"))?;
            slots.push(slot);
        }

        let row_values = |binds: &[BindBuffer], row: usize| -> Result<Vec<Oci8Value>, OraError> {
            slots
                .iter()
                .map(|slot| input_value(&binds[*slot], *slot, row, &pieces))
                .collect()
        };

        if let Sql::Select { .. } = sql {
            let values = row_values(&*binds, 0)?;
            let result = db.query(
                &sql,
                &Params {
                    names: &names,
                    values: &values,
                },
            )?;

            stmt_state.result = Some(result);
            return Ok(OCI_SUCCESS);
        }

        let svc_state = svcs.entry(svc).or_default();

        if svc_state.read_only && !matches!(sql, Sql::Call { .. }) {
            return Err(ora(
                1456,
                "may not perform insert/delete/update operation inside a READ ONLY transaction",
            ));
        }

        let mark = svc_state.undo.len();
        let mut total = 0;
        let mut last_row_id = None;

        for row in 0..iters.max(1) as usize {
            let outcome = row_values(&*binds, row).and_then(|values| {
                db.execute(
                    &sql,
                    &Params {
                        names: &names,
                        values: &values,
                    },
                    &mut svc_state.undo,
                )
            });

            let effect = match outcome {
                Ok(effect) => effect,
                Err(error) => {
                    db.rollback_to(&mut svc_state.undo, mark);
                    return Err(error);
                }
            };

            for (name, value) in &effect.outputs {
                let Some(index) = names.iter().position(|n| n.eq_ignore_ascii_case(name)) else {
                    continue;
                };

                if let Err(error) = write_output(&mut binds[slots[index]], row, value) {
                    db.rollback_to(&mut svc_state.undo, mark);
                    return Err(error);
                }
            }

            total += effect.rows;
            last_row_id = effect.row_id.or(last_row_id);
        }

        if mode & OCI_COMMIT_ON_SUCCESS != 0 {
            svc_state.undo.clear();
        }

        stmt_state.row_count = total;
        stmt_state.row_id = if total > 0 { last_row_id } else { None };

        Ok(OCI_SUCCESS)
    }

    fn fetch(
        state: &mut MockState,
        stmt: RawHandle,
        defines: &mut [DefineBuffer],
        nrows: u32,
    ) -> Result<Sword, OraError> {
        let MockState { stmts, lobs, .. } = state;

        let stmt_state = stmts
            .get_mut(&stmt)
            .ok_or_else(|| ora(24337, "statement handle not prepared"))?;

        if nrows == 0 {
            stmt_state.result = None;
            stmt_state.rows_fetched = 0;
            return Ok(OCI_SUCCESS);
        }

        let result = stmt_state
            .result
            .as_mut()
            .ok_or_else(|| ora(1002, "fetch out of sequence"))?;

        let mut fetched = 0;
        let mut truncated = false;

        while fetched < nrows as usize && result.cursor < result.rows.len() {
            let values = &result.rows[result.cursor];

            for (define, value) in defines.iter_mut().zip(values) {
                let buffer = &mut define.buffer;

                if fetched >= buffer.rows() {
                    continue;
                }

                if value.is_null() {
                    // only the indicator; the slot keeps its previous bytes
                    buffer.set_indicator(fetched, IND_NULL);
                    continue;
                }

                let kind = kind_of(define.desc.data_type)
                    .ok_or_else(|| ora(1460, "unimplemented or unreasonable conversion requested"))?;

                if kind.is_lob() {
                    let slot = buffer.slot(fetched);
                    let id = slot
                        .get(..LOCATOR_LEN)
                        .and_then(|bytes| <[u8; LOCATOR_LEN]>::try_from(bytes).ok())
                        .map(u64::from_ne_bytes)
                        .and_then(|id| RawHandle::new(id as usize))
                        .ok_or_else(|| ora(22275, "invalid LOB locator specified"))?;

                    lobs.insert(id, lob_bytes(value));
                    buffer.set_indicator(fetched, IND_NOT_NULL);
                    buffer.set_length(fetched, LOCATOR_LEN);
                    continue;
                }

                let bytes = encode_as(value, kind)?;

                if !buffer.write(fetched, Some(&bytes)) {
                    truncated = true;
                }
            }

            result.cursor += 1;
            fetched += 1;
        }

        stmt_state.rows_fetched = fetched as u32;
        stmt_state.row_count += fetched as u64;

        if truncated {
            return Ok(OCI_SUCCESS_WITH_INFO);
        }

        if fetched < nrows as usize {
            return Ok(OCI_NO_DATA);
        }

        Ok(OCI_SUCCESS)
    }
}

impl OciApi for MockOci {
    fn env_create(&self, _mode: u32, _charset: u16) -> (Sword, Option<RawHandle>) {
        let mut state = self.lock();

        if let Some(action) = state.enter(MockCall::EnvCreate) {
            let status = match action {
                FaultAction::Error { .. } => OCI_ERROR,
                FaultAction::Status(status) => status,
            };
            return (status, None);
        }

        (OCI_SUCCESS, Some(state.issue(HandleType::Env, None)))
    }

    fn handle_alloc(&self, parent: RawHandle, kind: HandleType) -> (Sword, Option<RawHandle>) {
        let mut state = self.lock();

        if let Some(action) = state.enter(MockCall::HandleAlloc(kind)) {
            return (state.fail(action, parent), None);
        }

        if !state.is_kind(parent, HandleType::Env) {
            return (OCI_INVALID_HANDLE, None);
        }

        (OCI_SUCCESS, Some(state.issue(kind, Some(parent))))
    }

    fn handle_free(&self, handle: RawHandle, kind: HandleType) -> Sword {
        let mut state = self.lock();

        if let Some(action) = state.enter(MockCall::HandleFree(kind)) {
            return match action {
                FaultAction::Error { .. } => OCI_ERROR,
                FaultAction::Status(status) => status,
            };
        }

        if !state.is_kind(handle, kind) {
            state.stats.invalid_frees += 1;
            return OCI_INVALID_HANDLE;
        }

        state.handles.remove(&handle);
        state.stats.freed += 1;
        state.stats.outstanding -= 1;

        state.errors.remove(&handle);
        state.attached.remove(&handle);
        state.svcs.remove(&handle);
        state.sessions.remove(&handle);
        state.stmts.remove(&handle);
        state.lobs.remove(&handle);

        OCI_SUCCESS
    }

    fn error_get(
        &self,
        handle: RawHandle,
        _kind: HandleType,
        record: u32,
        buf: &mut [u8],
    ) -> (Sword, i32) {
        let mut state = self.lock();

        if let Some(action) = state.enter(MockCall::ErrorGet) {
            return match action {
                FaultAction::Error { code, .. } => (OCI_ERROR, code),
                FaultAction::Status(status) => (status, 0),
            };
        }

        match state.errors.get(&handle) {
            Some((code, message)) if record == 1 && !buf.is_empty() => {
                let len = message.len().min(buf.len() - 1);
                buf[..len].copy_from_slice(&message.as_bytes()[..len]);
                buf[len] = 0;
                (OCI_SUCCESS, *code)
            }
            _ => (OCI_NO_DATA, 0),
        }
    }

    fn nls_charset_id(&self, _env: RawHandle, name: &str) -> u16 {
        let mut state = self.lock();

        if state.enter(MockCall::NlsCharsetId).is_some() {
            return 0;
        }

        match name.to_ascii_uppercase().as_str() {
            "AL32UTF8" => 873,
            "UTF8" => 871,
            "US7ASCII" => 1,
            _ => 0,
        }
    }

    fn server_attach(&self, srv: RawHandle, err: RawHandle, dblink: &str, _mode: u32) -> Sword {
        let mut state = self.lock();

        if let Some(action) = state.enter(MockCall::ServerAttach) {
            return state.fail(action, err);
        }

        if !state.is_kind(srv, HandleType::Server) || !state.is_kind(err, HandleType::Error) {
            return OCI_INVALID_HANDLE;
        }

        state.attached.insert(srv, dblink.to_owned());

        OCI_SUCCESS
    }

    fn server_detach(&self, srv: RawHandle, err: RawHandle, _mode: u32) -> Sword {
        let mut state = self.lock();

        if let Some(action) = state.enter(MockCall::ServerDetach) {
            return state.fail(action, err);
        }

        if state.attached.remove(&srv).is_none() {
            return state.raise(err, ora(24324, "service handle not initialized"));
        }

        OCI_SUCCESS
    }

    fn attr_set(&self, handle: RawHandle, kind: HandleType, attr: Attr<'_>, err: RawHandle) -> Sword {
        let mut state = self.lock();

        if let Some(action) = state.enter(MockCall::AttrSet) {
            return state.fail(action, err);
        }

        if !state.is_kind(handle, kind) {
            return OCI_INVALID_HANDLE;
        }

        match (kind, attr) {
            (HandleType::SvcCtx, Attr::Server(srv)) => {
                if let Some(svc) = state.svcs.get_mut(&handle) {
                    svc.server = Some(srv);
                }
            }
            (HandleType::SvcCtx, Attr::Session(session)) => {
                if let Some(svc) = state.svcs.get_mut(&handle) {
                    svc.session = Some(session);
                }
            }
            (HandleType::Session, Attr::Username(username)) => {
                if let Some(session) = state.sessions.get_mut(&handle) {
                    session.username = username.to_owned();
                }
            }
            (HandleType::Session, Attr::Password(password)) => {
                if let Some(session) = state.sessions.get_mut(&handle) {
                    session.password = password.to_owned();
                }
            }
            (HandleType::Stmt, Attr::PrefetchRows(_) | Attr::PrefetchMemory(_)) => {}
            (kind, attr) => {
                return state.raise(
                    err,
                    ora(24315, format_args!("illegal attribute type {:?} on {}", attr, kind.name())),
                )
            }
        }

        OCI_SUCCESS
    }

    fn attr_get(
        &self,
        handle: RawHandle,
        kind: HandleType,
        attr: AttrKind,
        err: RawHandle,
    ) -> (Sword, AttrValue) {
        let mut state = self.lock();

        if let Some(action) = state.enter(MockCall::AttrGet) {
            return (state.fail(action, err), AttrValue::None);
        }

        if kind != HandleType::Stmt {
            return (
                state.raise(err, ora(24315, "illegal attribute type")),
                AttrValue::None,
            );
        }

        let Some(stmt) = state.stmts.get(&handle) else {
            return (OCI_INVALID_HANDLE, AttrValue::None);
        };

        let value = match attr {
            AttrKind::RowCount => AttrValue::U64(stmt.row_count),
            AttrKind::RowsFetched => AttrValue::U32(stmt.rows_fetched),
            AttrKind::StmtType => AttrValue::U16(stmt.stmt_type),
            AttrKind::RowId => match &stmt.row_id {
                Some(row_id) => AttrValue::Text(row_id.clone()),
                None => return (OCI_NO_DATA, AttrValue::None),
            },
            AttrKind::ParamCount => match &stmt.result {
                Some(result) => AttrValue::U32(result.columns.len() as u32),
                None => AttrValue::None,
            },
        };

        if value == AttrValue::None {
            let error = ora(24338, "statement handle not executed");
            return (state.raise(err, error), AttrValue::None);
        }

        (OCI_SUCCESS, value)
    }

    fn session_begin(
        &self,
        svc: RawHandle,
        err: RawHandle,
        session: RawHandle,
        credentials: Credentials,
        _mode: u32,
    ) -> Sword {
        let mut state = self.lock();

        if let Some(action) = state.enter(MockCall::SessionBegin) {
            return state.fail(action, err);
        }

        let attached = state
            .svcs
            .get(&svc)
            .and_then(|svc| svc.server)
            .map_or(false, |srv| state.attached.contains_key(&srv));

        if !attached {
            return state.raise(err, ora(3121, "no interface driver connected - function not performed"));
        }

        let denied = match state.sessions.get(&session) {
            Some(s) => credentials == Credentials::Rdbms && s.username.is_empty(),
            None => return OCI_INVALID_HANDLE,
        };

        if denied {
            return state.raise(err, ora(1017, "invalid username/password; logon denied"));
        }

        if let Some(s) = state.sessions.get_mut(&session) {
            s.active = true;
        }
        if let Some(svc) = state.svcs.get_mut(&svc) {
            svc.session = Some(session);
        }

        OCI_SUCCESS
    }

    fn session_end(&self, svc: RawHandle, err: RawHandle, session: RawHandle, _mode: u32) -> Sword {
        let mut state = self.lock();

        if let Some(action) = state.enter(MockCall::SessionEnd) {
            return state.fail(action, err);
        }

        match state.sessions.get_mut(&session) {
            Some(s) if s.active => s.active = false,
            _ => return state.raise(err, ora(3114, "not connected to ORACLE")),
        }

        let MockState { svcs, db, .. } = &mut *state;

        // uncommitted work dies with the session
        if let Some(svc) = svcs.get_mut(&svc) {
            db.rollback_to(&mut svc.undo, 0);
            svc.read_only = false;
        }

        OCI_SUCCESS
    }

    fn ping(&self, svc: RawHandle, err: RawHandle, _mode: u32) -> Sword {
        let mut state = self.lock();

        if let Some(action) = state.enter(MockCall::Ping) {
            return state.fail(action, err);
        }

        match state.check_session(svc) {
            Ok(()) => OCI_SUCCESS,
            Err(error) => state.raise(err, error),
        }
    }

    fn stmt_prepare(&self, stmt: RawHandle, err: RawHandle, sql: &str, _mode: u32) -> Sword {
        let mut state = self.lock();

        if let Some(action) = state.enter(MockCall::StmtPrepare) {
            return state.fail(action, err);
        }

        let parsed = match parser::parse(sql) {
            Ok(parsed) => parsed,
            Err(reason) => {
                log::trace!("mock cannot parse {:?}: {}", sql, reason);
                return state.raise(err, ora(900, "invalid SQL statement"));
            }
        };

        let Some(stmt) = state.stmts.get_mut(&stmt) else {
            return OCI_INVALID_HANDLE;
        };

        *stmt = StmtState {
            placeholders: parsed.placeholders(),
            stmt_type: parsed.stmt_type(),
            sql: Some(parsed),
            ..StmtState::default()
        };

        OCI_SUCCESS
    }

    fn bind_by_pos(&self, stmt: RawHandle, err: RawHandle, position: u32, _bind: &BindDesc) -> Sword {
        let mut state = self.lock();

        if let Some(action) = state.enter(MockCall::BindByPos) {
            return state.fail(action, err);
        }

        let Some(stmt) = state.stmts.get(&stmt) else {
            return OCI_INVALID_HANDLE;
        };

        if position == 0 || position as usize > stmt.placeholders.len() {
            return state.raise(err, ora(ORA_ILLEGAL_VARIABLE, "illegal variable name/number"));
        }

        OCI_SUCCESS
    }

    fn bind_by_name(&self, stmt: RawHandle, err: RawHandle, name: &str, _bind: &BindDesc) -> Sword {
        let mut state = self.lock();

        if let Some(action) = state.enter(MockCall::BindByName) {
            return state.fail(action, err);
        }

        let Some(stmt) = state.stmts.get(&stmt) else {
            return OCI_INVALID_HANDLE;
        };

        let name = name.trim_start_matches(':');

        if !stmt.placeholders.iter().any(|p| p.eq_ignore_ascii_case(name)) {
            return state.raise(err, ora(ORA_ILLEGAL_VARIABLE, "illegal variable name/number"));
        }

        OCI_SUCCESS
    }

    fn stmt_execute(
        &self,
        svc: RawHandle,
        stmt: RawHandle,
        err: RawHandle,
        binds: &mut [BindBuffer],
        iters: u32,
        mode: u32,
    ) -> Sword {
        let mut state = self.lock();

        if let Some(action) = state.enter(MockCall::StmtExecute) {
            return state.fail(action, err);
        }

        if !state.is_kind(stmt, HandleType::Stmt) || !state.is_kind(svc, HandleType::SvcCtx) {
            return OCI_INVALID_HANDLE;
        }

        match Self::execute(&mut state, svc, stmt, binds, iters, mode) {
            Ok(status) => status,
            Err(error) => state.raise(err, error),
        }
    }

    fn stmt_get_piece_info(&self, stmt: RawHandle, err: RawHandle) -> (Sword, Option<PieceRequest>) {
        let mut state = self.lock();

        if let Some(action) = state.enter(MockCall::StmtGetPieceInfo) {
            return (state.fail(action, err), None);
        }

        let pending = state
            .stmts
            .get(&stmt)
            .and_then(|stmt| stmt.pieces.as_ref())
            .and_then(|pieces| pieces.iter().find(|p| !p.done))
            .map(|p| PieceRequest {
                bind: p.bind,
                iteration: p.row as u32,
                piece: if p.started { Piece::Next } else { Piece::First },
            });

        match pending {
            Some(request) => (OCI_SUCCESS, Some(request)),
            None => (
                state.raise(err, ora(24344, "no piece of data is expected")),
                None,
            ),
        }
    }

    fn stmt_set_piece(
        &self,
        stmt: RawHandle,
        err: RawHandle,
        request: PieceRequest,
        piece: Piece,
        data: &[u8],
    ) -> Sword {
        let mut state = self.lock();

        if let Some(action) = state.enter(MockCall::StmtSetPiece(piece)) {
            return state.fail(action, err);
        }

        let entry = state
            .stmts
            .get_mut(&stmt)
            .and_then(|stmt| stmt.pieces.as_mut())
            .and_then(|pieces| {
                pieces
                    .iter_mut()
                    .find(|p| p.bind == request.bind && p.row == request.iteration as usize)
            });

        let Some(entry) = entry else {
            return state.raise(err, ora(24344, "no piece of data is expected"));
        };

        entry.data.extend_from_slice(data);
        entry.started = true;
        entry.done = matches!(piece, Piece::One | Piece::Last);

        OCI_SUCCESS
    }

    fn param_get(&self, stmt: RawHandle, err: RawHandle, position: u32) -> (Sword, Option<ColumnDescription>) {
        let mut state = self.lock();

        if let Some(action) = state.enter(MockCall::ParamGet) {
            return (state.fail(action, err), None);
        }

        let desc = state
            .stmts
            .get(&stmt)
            .and_then(|stmt| stmt.result.as_ref())
            .and_then(|result| result.columns.get((position as usize).checked_sub(1)?))
            .cloned();

        match desc {
            Some(desc) => (OCI_SUCCESS, Some(desc)),
            None => (
                state.raise(err, ora(24334, "no descriptor for this position")),
                None,
            ),
        }
    }

    fn define_by_pos(&self, stmt: RawHandle, err: RawHandle, position: u32, define: &DefineDesc) -> Sword {
        let mut state = self.lock();

        if let Some(action) = state.enter(MockCall::DefineByPos) {
            return state.fail(action, err);
        }

        let columns = state
            .stmts
            .get(&stmt)
            .and_then(|stmt| stmt.result.as_ref())
            .map_or(0, |result| result.columns.len());

        if position == 0 || position as usize > columns {
            return state.raise(err, ora(1007, "variable not in select list"));
        }

        if kind_of(define.data_type).is_none() {
            return state.raise(
                err,
                ora(3115, format_args!("unsupported network datatype {}", define.data_type)),
            );
        }

        OCI_SUCCESS
    }

    fn stmt_fetch(
        &self,
        stmt: RawHandle,
        err: RawHandle,
        defines: &mut [DefineBuffer],
        nrows: u32,
        _orientation: u16,
        _mode: u32,
    ) -> Sword {
        let mut state = self.lock();

        if let Some(action) = state.enter(MockCall::StmtFetch { rows: nrows }) {
            return state.fail(action, err);
        }

        if !state.is_kind(stmt, HandleType::Stmt) {
            return OCI_INVALID_HANDLE;
        }

        match Self::fetch(&mut state, stmt, defines, nrows) {
            Ok(OCI_SUCCESS_WITH_INFO) => {
                state.errors.insert(
                    err,
                    (24345, "ORA-24345: A Truncation or null fetch error occurred".into()),
                );
                OCI_SUCCESS_WITH_INFO
            }
            Ok(status) => status,
            Err(error) => state.raise(err, error),
        }
    }

    fn lob_read(
        &self,
        _svc: RawHandle,
        err: RawHandle,
        locator: RawHandle,
        offset: u64,
        buf: &mut [u8],
    ) -> (Sword, usize) {
        let mut state = self.lock();

        if let Some(action) = state.enter(MockCall::LobRead) {
            return (state.fail(action, err), 0);
        }

        let Some(data) = state.lobs.get(&locator) else {
            return (
                state.raise(err, ora(22275, "invalid LOB locator specified")),
                0,
            );
        };

        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
        let len = (data.len() - start).min(buf.len());
        buf[..len].copy_from_slice(&data[start..start + len]);

        if start + len < data.len() {
            (OCI_NEED_DATA, len)
        } else {
            (OCI_SUCCESS, len)
        }
    }

    fn trans_start(&self, svc: RawHandle, err: RawHandle, _timeout: u32, flags: u32) -> Sword {
        let mut state = self.lock();

        if let Some(action) = state.enter(MockCall::TransStart) {
            return state.fail(action, err);
        }

        match state.svcs.get_mut(&svc) {
            Some(svc) => {
                svc.read_only = flags & OCI_TRANS_READONLY != 0;
                OCI_SUCCESS
            }
            None => OCI_INVALID_HANDLE,
        }
    }

    fn trans_commit(&self, svc: RawHandle, err: RawHandle, _flags: u32) -> Sword {
        let mut state = self.lock();

        if let Some(action) = state.enter(MockCall::TransCommit) {
            return state.fail(action, err);
        }

        match state.svcs.get_mut(&svc) {
            Some(svc) => {
                svc.undo.clear();
                svc.read_only = false;
                OCI_SUCCESS
            }
            None => OCI_INVALID_HANDLE,
        }
    }

    fn trans_rollback(&self, svc: RawHandle, err: RawHandle, _flags: u32) -> Sword {
        let mut state = self.lock();

        if let Some(action) = state.enter(MockCall::TransRollback) {
            return state.fail(action, err);
        }

        let MockState { svcs, db, .. } = &mut *state;

        match svcs.get_mut(&svc) {
            Some(svc) => {
                db.rollback_to(&mut svc.undo, 0);
                svc.read_only = false;
                OCI_SUCCESS
            }
            None => OCI_INVALID_HANDLE,
        }
    }

    fn break_execution(&self, svc: RawHandle, err: RawHandle) -> Sword {
        let mut state = self.lock();

        if let Some(action) = state.enter(MockCall::Break) {
            return state.fail(action, err);
        }

        for stmt in state.stmts.values_mut() {
            if stmt.svc == Some(svc) {
                stmt.pieces = None;
            }
        }

        OCI_SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_counts_handles_and_rejects_double_frees() {
        let mock = MockOci::new();
        let (_, env) = mock.env_create(OCI_DEFAULT, 0);
        let env = env.unwrap();
        let (_, err) = mock.handle_alloc(env, HandleType::Error);
        let err = err.unwrap();

        assert_eq!(mock.handle_free(err, HandleType::Error), OCI_SUCCESS);
        assert_eq!(mock.handle_free(err, HandleType::Error), OCI_INVALID_HANDLE);
        assert_eq!(mock.handle_free(env, HandleType::Env), OCI_SUCCESS);

        assert_eq!(
            mock.handle_stats(),
            HandleStats {
                allocated: 2,
                freed: 2,
                outstanding: 0,
                invalid_frees: 1,
            }
        );
    }

    #[test]
    fn it_fires_faults_after_the_skipped_calls() {
        let mock = MockOci::new();
        mock.inject(MockFault::status(MockCall::EnvCreate, OCI_ERROR).after(1).times(2));

        assert_eq!(mock.env_create(OCI_DEFAULT, 0).0, OCI_SUCCESS);
        assert_eq!(mock.env_create(OCI_DEFAULT, 0).0, OCI_ERROR);
        assert_eq!(mock.env_create(OCI_DEFAULT, 0).0, OCI_ERROR);
        assert_eq!(mock.env_create(OCI_DEFAULT, 0).0, OCI_SUCCESS);
        assert_eq!(mock.count(MockCall::EnvCreate), 4);
    }

    #[test]
    fn it_resolves_well_known_charsets() {
        let mock = MockOci::new();
        let (_, env) = mock.env_create(OCI_DEFAULT, 0);
        let env = env.unwrap();

        assert_eq!(mock.nls_charset_id(env, "al32utf8"), 873);
        assert_eq!(mock.nls_charset_id(env, "KLINGON"), 0);
    }
}
