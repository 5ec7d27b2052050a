use std::fmt::{self, Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::Error;
use crate::logger::QueryLogger;
use crate::oci8::arena::Key;
use crate::oci8::connection::ConnectionShared;
use crate::oci8::define::{cancel_cursor, DefineSet};
use crate::oci8::statement::StatementState;
use crate::oci8::{Oci8Column, Oci8Row};

/// A cooperative cancellation flag.
///
/// Clones share the flag. Raising it makes the statement or rows it was
/// handed to stop at their next round-trip with [`Error::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowsState {
    /// Executed, nothing fetched yet.
    Open,
    Fetching,
    Exhausted,
    Cancelled,
    Closed,
    /// A fetch failed; rows already returned stay valid.
    Failed,
}

impl RowsState {
    fn is_terminal(self) -> bool {
        !matches!(self, RowsState::Open | RowsState::Fetching)
    }
}

/// Rows of an executed query, fetched in windows of the configured prefetch
/// size.
///
/// The fetch buffers live with the statement and are released as soon as
/// the rows are exhausted, cancelled or closed.
pub struct Oci8Rows {
    shared: Arc<ConnectionShared>,
    key: Key,
    execution: u64,
    state: RowsState,
    cancel: CancelSignal,
    columns: Option<Arc<[Oci8Column]>>,
    /// Logs the query once the rows reach an end state.
    logger: Option<QueryLogger>,
}

impl Oci8Rows {
    pub(crate) fn new(
        shared: Arc<ConnectionShared>,
        key: Key,
        execution: u64,
        cancel: CancelSignal,
        logger: QueryLogger,
    ) -> Self {
        Self {
            shared,
            key,
            execution,
            state: RowsState::Open,
            cancel,
            columns: None,
            logger: Some(logger),
        }
    }

    /// The next row, or `None` once the result set is exhausted.
    ///
    /// After cancellation or close every call returns `None`; after a failed
    /// fetch every call fails.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<Oci8Row>, Error> {
        match self.state {
            RowsState::Failed => {
                return Err(Error::State(
                    "an earlier fetch failed; no more rows can be read".into(),
                ))
            }
            state if state.is_terminal() => return Ok(None),
            _ => {}
        }

        let result = match self.advance() {
            Ok(Some(row)) => {
                if let Some(logger) = &mut self.logger {
                    logger.increment_rows_returned();
                }

                Ok(Some(row))
            }

            Ok(None) => {
                self.state = RowsState::Exhausted;
                Ok(None)
            }

            Err(Error::Cancelled) => {
                self.release(true);
                self.state = RowsState::Cancelled;
                Err(Error::Cancelled)
            }

            Err(e @ Error::Closed(_)) => {
                self.state = RowsState::Closed;
                Err(e)
            }

            Err(e) => {
                self.release(false);
                self.state = RowsState::Failed;
                Err(e)
            }
        };

        if self.state.is_terminal() {
            self.logger = None;
        }

        result
    }

    fn advance(&mut self) -> Result<Option<Oci8Row>, Error> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut guard = self.shared.lock()?;
        let (handles, slot) = guard.split(self.key)?;

        if slot.execution != self.execution {
            return Err(Error::Closed("result set"));
        }

        let stmt = slot.handle.raw();

        if slot.defines.is_none() {
            let defines = DefineSet::define_columns(handles, stmt, &self.shared.options)?;
            self.columns = Some(Arc::clone(defines.columns()));
            slot.defines = Some(defines);
            self.state = RowsState::Fetching;
        }

        loop {
            let defines = match &mut slot.defines {
                Some(defines) => defines,
                None => return Err(err_protocol!("fetch buffers vanished mid-iteration")),
            };

            if defines.has_buffered_row() {
                return defines.materialize(handles, &self.cancel).map(Some);
            }

            if defines.is_exhausted() {
                slot.defines = None;
                slot.state = StatementState::Completed;

                return Ok(None);
            }

            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            defines.fetch(handles, stmt)?;
        }
    }

    /// Drop the fetch buffers of this result set, optionally terminating the
    /// server-side cursor first.
    fn release(&mut self, terminate: bool) {
        let Ok(mut guard) = self.shared.lock() else {
            return;
        };

        let Ok((handles, slot)) = guard.split(self.key) else {
            return;
        };

        if slot.execution != self.execution {
            return;
        }

        if terminate && slot.state == StatementState::ResultSet {
            cancel_cursor(handles, slot.handle.raw());
        }

        slot.defines = None;
        slot.state = StatementState::Completed;
    }

    pub fn state(&self) -> RowsState {
        self.state
    }

    /// Columns of the result set, known once the first row was requested.
    pub fn columns(&self) -> &[Oci8Column] {
        self.columns.as_deref().unwrap_or(&[])
    }

    /// Bytes currently held in fetch buffers for this result set.
    pub fn buffered_bytes(&self) -> usize {
        let Ok(inner) = self.shared.lock() else {
            return 0;
        };

        inner
            .statements
            .get(self.key)
            .filter(|slot| slot.execution == self.execution)
            .and_then(|slot| slot.defines.as_ref())
            .map_or(0, DefineSet::allocated_bytes)
    }

    /// Stop reading. Unread rows are discarded and, unless disabled with
    /// `cancel_cursor_on_close`, the cursor is closed on the server.
    ///
    /// Closing twice, or after the rows ran out, is a no-op.
    pub fn close(&mut self) {
        if self.state.is_terminal() {
            return;
        }

        self.release(self.shared.options.cancel_cursor_on_close);
        self.state = RowsState::Closed;
        self.logger = None;
    }
}

impl Iterator for Oci8Rows {
    type Item = Result<Oci8Row, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == RowsState::Failed {
            return None;
        }

        Oci8Rows::next(self).transpose()
    }
}

impl Drop for Oci8Rows {
    fn drop(&mut self) {
        self.close();
    }
}

impl Debug for Oci8Rows {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Oci8Rows")
            .field("key", &self.key)
            .field("execution", &self.execution)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_shares_cancellation_between_clones() {
        let signal = CancelSignal::new();
        let other = signal.clone();

        assert!(!other.is_cancelled());
        signal.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn it_treats_every_end_state_as_terminal() {
        assert!(!RowsState::Open.is_terminal());
        assert!(!RowsState::Fetching.is_terminal());
        assert!(RowsState::Exhausted.is_terminal());
        assert!(RowsState::Cancelled.is_terminal());
        assert!(RowsState::Closed.is_terminal());
        assert!(RowsState::Failed.is_terminal());
    }

    #[test]
    fn it_logs_a_query_once_its_rows_run_out() {
        use crate::oci8::mock::{MockColumn, MockOci};
        use crate::oci8::{Oci8ConnectOptions, Oci8Connection, Oci8DataType, Oci8Value};

        let mock = MockOci::new();
        mock.create_table("t", &[MockColumn::new("v", Oci8DataType::Varchar2)]);
        mock.insert_row("t", vec![Oci8Value::Text("a".into())]);
        mock.insert_row("t", vec![Oci8Value::Text("b".into())]);

        let options = Oci8ConnectOptions::new()
            .username("scott")
            .password("tiger")
            .api(Arc::new(mock.clone()));

        let mut conn = Oci8Connection::establish(&options).unwrap();
        let mut stmt = conn.prepare("SELECT * FROM t").unwrap();
        let mut rows = stmt.query().unwrap();

        assert!(rows.next().unwrap().is_some());
        assert!(rows.next().unwrap().is_some());
        assert_eq!(rows.logger.as_ref().map(|l| l.rows_returned), Some(2));

        assert!(rows.next().unwrap().is_none());
        assert!(rows.logger.is_none());
    }
}
