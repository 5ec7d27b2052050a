use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

use chrono_tz::Tz;
use log::LevelFilter;

use crate::connection::{ConnectOptions, LogSettings};
use crate::error::Error;
use crate::oci8::native::constants::*;
use crate::oci8::native::OciApi;
use crate::oci8::Oci8Connection;

mod parse;

/// Isolation requested when a transaction begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionMode {
    /// The server default. No explicit transaction is started.
    #[default]
    ReadWrite,
    ReadOnly,
    Serializable,
}

impl TransactionMode {
    pub(crate) fn code(self) -> u32 {
        match self {
            TransactionMode::ReadWrite => OCI_TRANS_READWRITE,
            TransactionMode::ReadOnly => OCI_TRANS_READONLY,
            TransactionMode::Serializable => OCI_TRANS_SERIALIZABLE,
        }
    }
}

/// Privilege the session is opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationMode {
    #[default]
    Default,
    SysDba,
    SysOper,
    SysAsm,
}

impl OperationMode {
    pub(crate) fn code(self) -> u32 {
        match self {
            OperationMode::Default => OCI_DEFAULT,
            OperationMode::SysDba => OCI_SYSDBA,
            OperationMode::SysOper => OCI_SYSOPER,
            OperationMode::SysAsm => OCI_SYSASM,
        }
    }
}

/// How parameters are written in statement text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaceholderStyle {
    /// `:name` or `:1` placeholders, bound as written.
    #[default]
    Named,
    /// `?` placeholders, renumbered to `:1..:n` before prepare.
    QuestionMark,
}

/// Options and flags which can be used to configure an Oracle connection.
///
/// Two connection string forms are accepted:
/// ```text
/// oracle://[username[:password]@]host[:port][/service_name][?param=value&...]
/// [username/[password]@]connect_identifier[?param=value&...]
/// ```
///
/// The second form takes any connect identifier the client library
/// understands (EZConnect, a TNS alias, or a full descriptor).
///
/// Supported parameters:
/// - `loc`: IANA time zone used to interpret `DATE` and `TIMESTAMP` values (default `UTC`).
/// - `isolation`: `READONLY`, `SERIALIZABLE` or `DEFAULT`.
/// - `as`: `SYSDBA`, `SYSOPER` or `SYSASM`.
/// - `questionph`: `true` to write parameters as `?`.
/// - `prefetch_rows`: rows fetched per round-trip (default 10).
/// - `prefetch_memory`: byte budget of the prefetch, `0` for no limit.
/// - `externalauth`: `true` to authenticate with external credentials.
///
/// A connection string without username and password also selects
/// external authentication.
///
/// No native client library is chosen by parsing; set one with
/// [`api`](Self::api) before connecting.
#[derive(Clone)]
pub struct Oci8ConnectOptions {
    pub(crate) connect: String,
    pub(crate) username: String,
    pub(crate) password: String,
    pub(crate) prefetch_rows: u32,
    pub(crate) prefetch_memory: u32,
    pub(crate) timezone: Tz,
    pub(crate) transaction_mode: TransactionMode,
    pub(crate) operation_mode: OperationMode,
    pub(crate) placeholder_style: PlaceholderStyle,
    pub(crate) external_auth: bool,
    pub(crate) charset: Option<u16>,
    pub(crate) cancel_cursor_on_close: bool,
    pub(crate) long_buffer_size: usize,
    pub(crate) lob_chunk_size: usize,
    pub(crate) piece_size: usize,
    pub(crate) log_settings: LogSettings,
    pub(crate) api: Option<Arc<dyn OciApi>>,
}

impl Default for Oci8ConnectOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl Oci8ConnectOptions {
    pub fn new() -> Self {
        Self {
            connect: String::new(),
            username: String::new(),
            password: String::new(),
            prefetch_rows: 10,
            prefetch_memory: 0,
            timezone: Tz::UTC,
            transaction_mode: TransactionMode::default(),
            operation_mode: OperationMode::default(),
            placeholder_style: PlaceholderStyle::default(),
            external_auth: false,
            charset: None,
            cancel_cursor_on_close: true,
            long_buffer_size: 32 * 1024,
            lob_chunk_size: 4000,
            piece_size: 4000,
            log_settings: Default::default(),
            api: None,
        }
    }

    /// Connect identifier handed to `OCIServerAttach`.
    pub fn connect(mut self, connect: &str) -> Self {
        self.connect = connect.to_owned();
        self
    }

    pub fn username(mut self, username: &str) -> Self {
        self.username = username.to_owned();
        self
    }

    pub fn password(mut self, password: &str) -> Self {
        self.password = password.to_owned();
        self
    }

    /// Rows requested per fetch round-trip; also the size of the fetch
    /// window. `0` is treated as `1`.
    pub fn prefetch_rows(mut self, rows: u32) -> Self {
        self.prefetch_rows = rows;
        self
    }

    pub fn prefetch_memory(mut self, bytes: u32) -> Self {
        self.prefetch_memory = bytes;
        self
    }

    /// Time zone `DATE` and `TIMESTAMP` values (which carry none) are read in.
    pub fn timezone(mut self, tz: Tz) -> Self {
        self.timezone = tz;
        self
    }

    pub fn transaction_mode(mut self, mode: TransactionMode) -> Self {
        self.transaction_mode = mode;
        self
    }

    pub fn operation_mode(mut self, mode: OperationMode) -> Self {
        self.operation_mode = mode;
        self
    }

    pub fn placeholder_style(mut self, style: PlaceholderStyle) -> Self {
        self.placeholder_style = style;
        self
    }

    pub fn external_auth(mut self, external: bool) -> Self {
        self.external_auth = external;
        self
    }

    /// Character set id passed to environment creation, overriding the
    /// process-wide default resolved by [`bootstrap`](crate::oci8::charset::bootstrap).
    pub fn charset(mut self, charset: u16) -> Self {
        self.charset = Some(charset);
        self
    }

    /// Whether closing an unfinished result set tells the server to drop the
    /// cursor (a zero-row fetch). On by default.
    pub fn cancel_cursor_on_close(mut self, cancel: bool) -> Self {
        self.cancel_cursor_on_close = cancel;
        self
    }

    /// Fetch buffer size for `LONG` and `LONG RAW` columns.
    pub fn long_buffer_size(mut self, size: usize) -> Self {
        self.long_buffer_size = size.max(1);
        self
    }

    /// Bytes requested per `OCILobRead2` call.
    pub fn lob_chunk_size(mut self, size: usize) -> Self {
        self.lob_chunk_size = size.max(1);
        self
    }

    /// Inputs longer than this are bound for piecewise transfer, in pieces
    /// of this size.
    pub fn piece_size(mut self, size: usize) -> Self {
        self.piece_size = size.max(1);
        self
    }

    /// The native client library connections are opened through.
    pub fn api(mut self, api: Arc<dyn OciApi>) -> Self {
        self.api = Some(api);
        self
    }

    pub fn get_connect(&self) -> &str {
        &self.connect
    }

    pub fn get_username(&self) -> &str {
        &self.username
    }

    pub fn get_prefetch_rows(&self) -> u32 {
        self.prefetch_rows
    }

    pub fn get_timezone(&self) -> Tz {
        self.timezone
    }

    pub fn get_transaction_mode(&self) -> TransactionMode {
        self.transaction_mode
    }

    pub fn get_operation_mode(&self) -> OperationMode {
        self.operation_mode
    }

    pub fn get_placeholder_style(&self) -> PlaceholderStyle {
        self.placeholder_style
    }

    pub fn is_external_auth(&self) -> bool {
        self.external_auth
    }

    pub(crate) fn fetch_window(&self) -> u32 {
        self.prefetch_rows.max(1)
    }
}

impl Debug for Oci8ConnectOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Oci8ConnectOptions")
            .field("connect", &self.connect)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("prefetch_rows", &self.prefetch_rows)
            .field("prefetch_memory", &self.prefetch_memory)
            .field("timezone", &self.timezone)
            .field("transaction_mode", &self.transaction_mode)
            .field("operation_mode", &self.operation_mode)
            .field("placeholder_style", &self.placeholder_style)
            .field("external_auth", &self.external_auth)
            .field("charset", &self.charset)
            .field("cancel_cursor_on_close", &self.cancel_cursor_on_close)
            .field("api", &self.api.is_some())
            .finish()
    }
}

impl ConnectOptions for Oci8ConnectOptions {
    type Connection = Oci8Connection;

    fn connect(&self) -> Result<Self::Connection, Error> {
        Oci8Connection::establish(self)
    }

    fn log_statements(&mut self, level: LevelFilter) -> &mut Self {
        self.log_settings.log_statements(level);
        self
    }

    fn log_slow_statements(&mut self, level: LevelFilter, duration: Duration) -> &mut Self {
        self.log_settings.log_slow_statements(level, duration);
        self
    }

    fn log_notices(&mut self, level: LevelFilter) -> &mut Self {
        self.log_settings.log_notices(level);
        self
    }
}
