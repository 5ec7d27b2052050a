//! The native client library as the driver consumes it.
//!
//! [`OciApi`] mirrors the OCI calls one to one: every method returns the raw
//! status word (`sword`) of the call it stands for, and output values travel
//! beside it. Nothing here interprets a status; that is the job of
//! [`status`](crate::oci8::status).
//!
//! Buffers are handed to the library for the duration of a single call
//! (`stmt_execute` reads binds, `stmt_fetch` writes defines) instead of being
//! registered by address, so the driver never shares memory with the library
//! beyond one call.

use std::fmt;
use std::num::NonZeroUsize;

mod buffer;
pub mod constants;

pub use buffer::{
    BindBuffer, BindDesc, BindDirection, DefineBuffer, DefineDesc, NativeBuffer, Placeholder,
};

/// Status word returned by every OCI call.
pub type Sword = i32;

/// Opaque identifier of a handle (or descriptor) issued by the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawHandle(NonZeroUsize);

impl RawHandle {
    pub fn new(id: usize) -> Option<Self> {
        NonZeroUsize::new(id).map(RawHandle)
    }

    pub fn get(self) -> usize {
        self.0.get()
    }
}

impl fmt::Display for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleType {
    Env,
    Error,
    Server,
    SvcCtx,
    Session,
    Stmt,
    /// LOB locator descriptor
    LobLocator,
}

impl HandleType {
    pub fn name(self) -> &'static str {
        match self {
            HandleType::Env => "OCI_HTYPE_ENV",
            HandleType::Error => "OCI_HTYPE_ERROR",
            HandleType::Server => "OCI_HTYPE_SERVER",
            HandleType::SvcCtx => "OCI_HTYPE_SVCCTX",
            HandleType::Session => "OCI_HTYPE_SESSION",
            HandleType::Stmt => "OCI_HTYPE_STMT",
            HandleType::LobLocator => "OCI_DTYPE_LOB",
        }
    }
}

/// Attributes the driver writes with `OCIAttrSet`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attr<'a> {
    /// `OCI_ATTR_SERVER` on a service context
    Server(RawHandle),
    /// `OCI_ATTR_SESSION` on a service context
    Session(RawHandle),
    /// `OCI_ATTR_USERNAME` on a session
    Username(&'a str),
    /// `OCI_ATTR_PASSWORD` on a session
    Password(&'a str),
    /// `OCI_ATTR_PREFETCH_ROWS` on a statement
    PrefetchRows(u32),
    /// `OCI_ATTR_PREFETCH_MEMORY` on a statement
    PrefetchMemory(u32),
}

/// Attributes the driver reads with `OCIAttrGet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    /// `OCI_ATTR_ROW_COUNT`
    RowCount,
    /// `OCI_ATTR_ROWID`, rendered as its character form
    RowId,
    /// `OCI_ATTR_STMT_TYPE`
    StmtType,
    /// `OCI_ATTR_ROWS_FETCHED`
    RowsFetched,
    /// `OCI_ATTR_PARAM_COUNT`
    ParamCount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    None,
    U16(u16),
    U32(u32),
    U64(u64),
    Text(String),
}

impl AttrValue {
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            AttrValue::U16(v) => Some(v.into()),
            AttrValue::U32(v) => Some(v.into()),
            AttrValue::U64(v) => Some(v),
            AttrValue::None | AttrValue::Text(_) => None,
        }
    }
}

/// How `OCISessionBegin` authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credentials {
    /// Username and password attributes set on the session handle.
    Rdbms,
    /// Operating system or wallet authentication.
    External,
}

impl Credentials {
    pub fn code(self) -> u32 {
        match self {
            Credentials::Rdbms => constants::OCI_CRED_RDBMS,
            Credentials::External => constants::OCI_CRED_EXT,
        }
    }
}

/// One select-list item as described by `OCIParamGet` and its attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescription {
    pub name: String,
    /// Internal (`SQLT_*`) type code.
    pub data_type: u16,
    /// Maximum size in bytes, as reported by `OCI_ATTR_DATA_SIZE`.
    pub data_size: u16,
    pub precision: i16,
    pub scale: i8,
    pub nullable: bool,
    pub charset_form: u8,
}

/// Piece marker passed with piecewise data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Piece {
    One,
    First,
    Next,
    Last,
}

/// What `OCIStmtGetPieceInfo` says the library wants next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PieceRequest {
    /// Index into the bind slice passed to the pending execute.
    pub bind: usize,
    /// Row of the batch the piece belongs to.
    pub iteration: u32,
    pub piece: Piece,
}

/// The OCI entry points the driver uses.
///
/// Implementations must be usable from any thread, but the driver never
/// calls into one set of connection handles from two threads at once.
pub trait OciApi: Send + Sync + fmt::Debug {
    /// `OCIEnvNlsCreate`
    fn env_create(&self, mode: u32, charset: u16) -> (Sword, Option<RawHandle>);

    /// `OCIHandleAlloc` / `OCIDescriptorAlloc`
    fn handle_alloc(&self, parent: RawHandle, kind: HandleType) -> (Sword, Option<RawHandle>);

    /// `OCIHandleFree` / `OCIDescriptorFree`
    fn handle_free(&self, handle: RawHandle, kind: HandleType) -> Sword;

    /// `OCIErrorGet`: copies the NUL terminated message text into `buf` and
    /// returns the server error code beside the status.
    fn error_get(
        &self,
        handle: RawHandle,
        kind: HandleType,
        record: u32,
        buf: &mut [u8],
    ) -> (Sword, i32);

    /// `OCINlsCharSetNameToId`, `0` when the name is unknown.
    fn nls_charset_id(&self, env: RawHandle, name: &str) -> u16;

    /// `OCIServerAttach`
    fn server_attach(&self, srv: RawHandle, err: RawHandle, dblink: &str, mode: u32) -> Sword;

    /// `OCIServerDetach`
    fn server_detach(&self, srv: RawHandle, err: RawHandle, mode: u32) -> Sword;

    /// `OCIAttrSet`
    fn attr_set(&self, handle: RawHandle, kind: HandleType, attr: Attr<'_>, err: RawHandle)
        -> Sword;

    /// `OCIAttrGet`
    fn attr_get(
        &self,
        handle: RawHandle,
        kind: HandleType,
        attr: AttrKind,
        err: RawHandle,
    ) -> (Sword, AttrValue);

    /// `OCISessionBegin`
    fn session_begin(
        &self,
        svc: RawHandle,
        err: RawHandle,
        session: RawHandle,
        credentials: Credentials,
        mode: u32,
    ) -> Sword;

    /// `OCISessionEnd`
    fn session_end(&self, svc: RawHandle, err: RawHandle, session: RawHandle, mode: u32) -> Sword;

    /// `OCIPing`
    fn ping(&self, svc: RawHandle, err: RawHandle, mode: u32) -> Sword;

    /// `OCIStmtPrepare`
    fn stmt_prepare(&self, stmt: RawHandle, err: RawHandle, sql: &str, mode: u32) -> Sword;

    /// `OCIBindByPos`
    fn bind_by_pos(&self, stmt: RawHandle, err: RawHandle, position: u32, bind: &BindDesc)
        -> Sword;

    /// `OCIBindByName`
    fn bind_by_name(&self, stmt: RawHandle, err: RawHandle, name: &str, bind: &BindDesc) -> Sword;

    /// `OCIStmtExecute`: reads input binds, writes output binds back.
    fn stmt_execute(
        &self,
        svc: RawHandle,
        stmt: RawHandle,
        err: RawHandle,
        binds: &mut [BindBuffer],
        iters: u32,
        mode: u32,
    ) -> Sword;

    /// `OCIStmtGetPieceInfo`
    fn stmt_get_piece_info(&self, stmt: RawHandle, err: RawHandle)
        -> (Sword, Option<PieceRequest>);

    /// `OCIStmtSetPieceInfo` with the piece's bytes.
    fn stmt_set_piece(
        &self,
        stmt: RawHandle,
        err: RawHandle,
        request: PieceRequest,
        piece: Piece,
        data: &[u8],
    ) -> Sword;

    /// `OCIParamGet` for a select-list position, plus its describe attributes.
    fn param_get(
        &self,
        stmt: RawHandle,
        err: RawHandle,
        position: u32,
    ) -> (Sword, Option<ColumnDescription>);

    /// `OCIDefineByPos`
    fn define_by_pos(
        &self,
        stmt: RawHandle,
        err: RawHandle,
        position: u32,
        define: &DefineDesc,
    ) -> Sword;

    /// `OCIStmtFetch2`: writes up to `nrows` rows into `defines`.
    fn stmt_fetch(
        &self,
        stmt: RawHandle,
        err: RawHandle,
        defines: &mut [DefineBuffer],
        nrows: u32,
        orientation: u16,
        mode: u32,
    ) -> Sword;

    /// `OCILobRead2` in polling mode: fills `buf` from byte `offset` and
    /// returns `OCI_NEED_DATA` while more data remains.
    fn lob_read(
        &self,
        svc: RawHandle,
        err: RawHandle,
        locator: RawHandle,
        offset: u64,
        buf: &mut [u8],
    ) -> (Sword, usize);

    /// `OCITransStart`
    fn trans_start(&self, svc: RawHandle, err: RawHandle, timeout: u32, flags: u32) -> Sword;

    /// `OCITransCommit`
    fn trans_commit(&self, svc: RawHandle, err: RawHandle, flags: u32) -> Sword;

    /// `OCITransRollback`
    fn trans_rollback(&self, svc: RawHandle, err: RawHandle, flags: u32) -> Sword;

    /// `OCIBreak`
    fn break_execution(&self, svc: RawHandle, err: RawHandle) -> Sword;
}
