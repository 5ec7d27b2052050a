use std::fmt::{self, Debug, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::connection::Connection;
use crate::error::Error;
use crate::logger::NoticeLogger;
use crate::oci8::arena::{Arena, Key};
use crate::oci8::charset::default_charset;
use crate::oci8::handle::HandleSet;
use crate::oci8::native::constants::OCI_DEFAULT;
use crate::oci8::statement::StatementSlot;
use crate::oci8::status::{check, ErrorScope};
use crate::oci8::transaction::{self, Oci8Transaction};
use crate::oci8::{Oci8Arguments, Oci8ConnectOptions, Oci8QueryResult, Oci8Row, Oci8Statement};

mod worker;

pub use worker::Oci8Worker;

/// State shared by a connection and the statements, rows and results it
/// hands out.
pub(crate) struct ConnectionShared {
    pub(crate) options: Oci8ConnectOptions,
    inner: Mutex<ConnectionInner>,
}

impl ConnectionShared {
    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, ConnectionInner>, Error> {
        self.inner
            .lock()
            .map_err(|_| err_protocol!("connection state was poisoned by a panicking thread"))
    }
}

/// The native side of a connection. Statements are declared first so they
/// are released before the handles they were allocated from.
pub(crate) struct ConnectionInner {
    pub(crate) statements: Arena<StatementSlot>,
    pub(crate) handles: Option<HandleSet>,
    pub(crate) in_transaction: bool,
}

impl ConnectionInner {
    pub(crate) fn handles(&self) -> Result<&HandleSet, Error> {
        self.handles.as_ref().ok_or(Error::Closed("connection"))
    }

    /// The connection's handles together with one of its statements.
    pub(crate) fn split(&mut self, key: Key) -> Result<(&HandleSet, &mut StatementSlot), Error> {
        let handles = self.handles.as_ref().ok_or(Error::Closed("connection"))?;
        let slot = self
            .statements
            .get_mut(key)
            .ok_or(Error::Closed("statement"))?;

        Ok((handles, slot))
    }

    fn close(&mut self) {
        let statements = self.statements.drain();

        if !statements.is_empty() {
            log::debug!("closing {} statements left open", statements.len());
        }

        drop(statements);

        let Some(handles) = self.handles.take() else {
            return;
        };

        if self.in_transaction {
            self.in_transaction = false;

            let api = handles.api();

            if let (Ok(svc), Ok(err)) = (handles.svc(), handles.err()) {
                let status = api.trans_rollback(svc, err, OCI_DEFAULT);

                if let Err(error) = check(
                    api,
                    status,
                    err,
                    ErrorScope::Transaction,
                    "OCITransRollback",
                    handles.logger(),
                ) {
                    handles
                        .logger()
                        .notice(format_args!("rolling back on close failed: {}", error));
                }
            }
        }

        handles.close();
    }
}

/// A connection to an Oracle database through the native client library.
///
/// All work blocks the calling thread. Statements, rows and results keep the
/// connection's native state alive until they are dropped, but none of them
/// can be used once the connection is closed.
pub struct Oci8Connection {
    pub(crate) shared: Arc<ConnectionShared>,
}

impl Oci8Connection {
    /// Open a session as described by `options`.
    ///
    /// The character set is taken from the options, then from the process
    /// default resolved by [`bootstrap`](crate::oci8::charset::bootstrap),
    /// then left to the client library.
    pub fn establish(options: &Oci8ConnectOptions) -> Result<Self, Error> {
        let api = options.api.clone().ok_or_else(|| {
            Error::Configuration("no native client library was configured".into())
        })?;

        let charset = options.charset.or_else(default_charset).unwrap_or(0);
        let logger = NoticeLogger::new(options.log_settings.notices_level);
        let handles = HandleSet::open(api, options, charset, logger)?;

        Ok(Self {
            shared: Arc::new(ConnectionShared {
                options: options.clone(),
                inner: Mutex::new(ConnectionInner {
                    statements: Arena::default(),
                    handles: Some(handles),
                    in_transaction: false,
                }),
            }),
        })
    }

    pub fn options(&self) -> &Oci8ConnectOptions {
        &self.shared.options
    }

    /// Prepare `sql` for execution.
    ///
    /// With [`PlaceholderStyle::QuestionMark`](crate::oci8::PlaceholderStyle)
    /// every `?` outside literals and comments becomes `:1`, `:2`, ...
    pub fn prepare(&mut self, sql: &str) -> Result<Oci8Statement, Error> {
        let mut inner = self.shared.lock()?;
        let slot = StatementSlot::prepare(inner.handles()?, &self.shared.options, sql)?;
        let key = inner.statements.insert(slot);

        Ok(Oci8Statement::new(Arc::clone(&self.shared), key))
    }

    /// Prepare, bind and execute a statement that returns no rows.
    ///
    /// The row identifier is read before the statement is released, so
    /// [`Oci8QueryResult::row_id`] keeps working on the returned result.
    pub fn execute(&mut self, sql: &str, args: Oci8Arguments) -> Result<Oci8QueryResult, Error> {
        let mut stmt = self.prepare(sql)?;
        stmt.bind(args)?;

        let result = stmt.execute()?;
        let _ = result.row_id();

        Ok(result)
    }

    /// Prepare, bind and run a query, collecting every row.
    pub fn fetch_all(&mut self, sql: &str, args: Oci8Arguments) -> Result<Vec<Oci8Row>, Error> {
        let mut stmt = self.prepare(sql)?;
        stmt.bind(args)?;

        stmt.query()?.collect()
    }

    pub fn ping(&mut self) -> Result<(), Error> {
        let inner = self.shared.lock()?;
        let handles = inner.handles()?;
        let api = handles.api();
        let err = handles.err()?;

        let status = api.ping(handles.svc()?, err, OCI_DEFAULT);
        check(api, status, err, ErrorScope::Connection, "OCIPing", handles.logger())
    }

    pub fn begin(&mut self) -> Result<(), Error> {
        let mut inner = self.shared.lock()?;
        transaction::begin(&mut inner, self.shared.options.transaction_mode)
    }

    pub fn commit(&mut self) -> Result<(), Error> {
        transaction::commit(&mut *self.shared.lock()?)
    }

    pub fn rollback(&mut self) -> Result<(), Error> {
        transaction::rollback(&mut *self.shared.lock()?)
    }

    /// Begin a transaction that rolls back unless committed.
    pub fn begin_transaction(&mut self) -> Result<Oci8Transaction<'_>, Error> {
        Oci8Transaction::begin(self)
    }

    pub fn in_transaction(&self) -> bool {
        self.shared
            .lock()
            .map(|inner| inner.in_transaction)
            .unwrap_or(false)
    }

    pub fn is_closed(&self) -> bool {
        self.shared
            .lock()
            .map(|inner| inner.handles.is_none())
            .unwrap_or(true)
    }

    /// Release every statement and native handle. An open transaction is
    /// rolled back. Failures are logged; closing again is a no-op.
    pub fn close(&mut self) {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .close();
    }
}

impl Connection for Oci8Connection {
    type Options = Oci8ConnectOptions;

    fn close(&mut self) {
        Oci8Connection::close(self)
    }

    fn ping(&mut self) -> Result<(), Error> {
        Oci8Connection::ping(self)
    }

    fn begin(&mut self) -> Result<(), Error> {
        Oci8Connection::begin(self)
    }

    fn commit(&mut self) -> Result<(), Error> {
        Oci8Connection::commit(self)
    }

    fn rollback(&mut self) -> Result<(), Error> {
        Oci8Connection::rollback(self)
    }
}

impl Drop for Oci8Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl Debug for Oci8Connection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Oci8Connection")
            .field("options", &self.shared.options)
            .field("closed", &self.is_closed())
            .finish()
    }
}
