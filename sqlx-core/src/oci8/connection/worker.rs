use std::thread;

use either::Either;
use flume::TrySendError;
use futures_channel::oneshot;
use futures_core::stream::BoxStream;

use crate::error::Error;
use crate::oci8::{Oci8Arguments, Oci8ConnectOptions, Oci8Connection, Oci8QueryResult, Oci8Row};

/// Rows buffered between the worker thread and the stream reading them.
const ROW_CHANNEL_SIZE: usize = 64;

type CommandResult = Result<(), Error>;
type CommandSender = oneshot::Sender<CommandResult>;
type FetchItem = Result<Either<Oci8QueryResult, Oci8Row>, Error>;

/// A connection driven from async code.
///
/// A dedicated thread owns the connection and runs one command at a time;
/// every method queues a command and awaits its reply without blocking the
/// executor.
#[derive(Debug)]
pub struct Oci8Worker {
    command_tx: flume::Sender<Command>,
    join_handle: Option<thread::JoinHandle<()>>,
}

enum Command {
    Ping {
        tx: CommandSender,
    },
    Begin {
        tx: CommandSender,
    },
    Commit {
        tx: CommandSender,
    },
    Rollback {
        tx: CommandSender,
    },
    Execute {
        sql: Box<str>,
        args: Oci8Arguments,
        tx: oneshot::Sender<Result<Oci8QueryResult, Error>>,
    },
    Fetch {
        sql: Box<str>,
        args: Oci8Arguments,
        tx: flume::Sender<FetchItem>,
    },
    Shutdown {
        tx: oneshot::Sender<()>,
    },
}

impl Drop for Oci8Worker {
    fn drop(&mut self) {
        self.shutdown_sync();
    }
}

impl Oci8Worker {
    pub async fn establish(options: Oci8ConnectOptions) -> Result<Self, Error> {
        let (command_tx, command_rx) = flume::bounded(64);
        let (conn_tx, conn_rx) = oneshot::channel();

        let thread = thread::Builder::new()
            .name("sqlx-oci8-conn".into())
            .spawn(move || worker_thread_main(options, command_rx, conn_tx))
            .map_err(|e| err_protocol!("failed to spawn the connection thread: {}", e))?;

        conn_rx.await.map_err(|_| Error::WorkerCrashed)??;

        Ok(Oci8Worker {
            command_tx,
            join_handle: Some(thread),
        })
    }

    pub async fn ping(&mut self) -> Result<(), Error> {
        let (tx, rx) = oneshot::channel();
        send_command_and_await(&self.command_tx, Command::Ping { tx }, rx).await?
    }

    pub async fn begin(&mut self) -> Result<(), Error> {
        let (tx, rx) = oneshot::channel();
        send_command_and_await(&self.command_tx, Command::Begin { tx }, rx).await?
    }

    pub async fn commit(&mut self) -> Result<(), Error> {
        let (tx, rx) = oneshot::channel();
        send_command_and_await(&self.command_tx, Command::Commit { tx }, rx).await?
    }

    pub async fn rollback(&mut self) -> Result<(), Error> {
        let (tx, rx) = oneshot::channel();
        send_command_and_await(&self.command_tx, Command::Rollback { tx }, rx).await?
    }

    /// Run a statement that returns no rows.
    pub async fn execute(
        &mut self,
        sql: &str,
        args: Oci8Arguments,
    ) -> Result<Oci8QueryResult, Error> {
        let (tx, rx) = oneshot::channel();
        let command = Command::Execute {
            sql: sql.into(),
            args,
            tx,
        };

        send_command_and_await(&self.command_tx, command, rx).await?
    }

    /// Run a query and stream its rows, followed by a final result.
    ///
    /// Rows are read ahead into a bounded buffer. Dropping the stream
    /// closes the result set on the worker.
    pub async fn fetch(
        &mut self,
        sql: &str,
        args: Oci8Arguments,
    ) -> Result<BoxStream<'static, FetchItem>, Error> {
        let (tx, rx) = flume::bounded(ROW_CHANNEL_SIZE);

        self.command_tx
            .send_async(Command::Fetch {
                sql: sql.into(),
                args,
                tx,
            })
            .await
            .map_err(|_| Error::WorkerCrashed)?;

        Ok(Box::pin(rx.into_stream()))
    }

    /// Run a query and collect every row.
    pub async fn fetch_all(&mut self, sql: &str, args: Oci8Arguments) -> Result<Vec<Oci8Row>, Error> {
        let (tx, rx) = flume::bounded(ROW_CHANNEL_SIZE);

        self.command_tx
            .send_async(Command::Fetch {
                sql: sql.into(),
                args,
                tx,
            })
            .await
            .map_err(|_| Error::WorkerCrashed)?;

        let mut rows = Vec::new();

        while let Ok(item) = rx.recv_async().await {
            match item? {
                Either::Left(_) => break,
                Either::Right(row) => rows.push(row),
            }
        }

        Ok(rows)
    }

    /// Close the connection and stop the thread.
    pub async fn close(mut self) -> Result<(), Error> {
        let (tx, rx) = oneshot::channel();
        send_command_and_await(&self.command_tx, Command::Shutdown { tx }, rx).await?;

        if let Some(join_handle) = self.join_handle.take() {
            join_handle.join().map_err(|_| Error::WorkerCrashed)?;
        }

        Ok(())
    }

    fn shutdown_sync(&mut self) {
        // try_send: a drop must never block on a full queue
        if let Some(join_handle) = self.join_handle.take() {
            let (mut tx, _rx) = oneshot::channel();

            while let Err(TrySendError::Full(Command::Shutdown { tx: t })) =
                self.command_tx.try_send(Command::Shutdown { tx })
            {
                tx = t;
                log::warn!("oci8 worker thread queue is full, retrying...");
                thread::sleep(std::time::Duration::from_millis(10));
            }

            if join_handle.join().is_err() {
                log::error!("oci8 worker thread panicked before shutting down");
            }
        }
    }
}

fn worker_thread_main(
    options: Oci8ConnectOptions,
    command_rx: flume::Receiver<Command>,
    conn_tx: oneshot::Sender<Result<(), Error>>,
) {
    let mut conn = match Oci8Connection::establish(&options) {
        Ok(conn) => {
            let _ = conn_tx.send(Ok(()));
            conn
        }
        Err(e) => {
            let _ = conn_tx.send(Err(e));
            return;
        }
    };

    while let Ok(cmd) = command_rx.recv() {
        if let Some(shutdown_tx) = process_command(cmd, &mut conn) {
            conn.close();
            let _ = shutdown_tx.send(());
            break;
        }
    }

    // every sender is gone or shutdown was requested
}

/// Returns the reply channel of a shutdown command.
fn process_command(cmd: Command, conn: &mut Oci8Connection) -> Option<oneshot::Sender<()>> {
    match cmd {
        Command::Ping { tx } => send_result(tx, conn.ping()),
        Command::Begin { tx } => send_result(tx, conn.begin()),
        Command::Commit { tx } => send_result(tx, conn.commit()),
        Command::Rollback { tx } => send_result(tx, conn.rollback()),
        Command::Execute { sql, args, tx } => send_result(tx, conn.execute(&sql, args)),
        Command::Fetch { sql, args, tx } => handle_fetch(conn, &sql, args, &tx),
        Command::Shutdown { tx } => return Some(tx),
    }

    None
}

fn send_result<T>(tx: oneshot::Sender<T>, result: T) {
    let _ = tx.send(result);
}

fn handle_fetch(conn: &mut Oci8Connection, sql: &str, args: Oci8Arguments, tx: &flume::Sender<FetchItem>) {
    let mut stmt = match conn.prepare(sql) {
        Ok(stmt) => stmt,
        Err(e) => return send_error(tx, e),
    };

    if let Err(e) = stmt.bind(args) {
        return send_error(tx, e);
    }

    let mut rows = match stmt.query() {
        Ok(rows) => rows,
        Err(e) => return send_error(tx, e),
    };

    loop {
        let item = match rows.next() {
            Ok(Some(row)) => Ok(Either::Right(row)),
            Ok(None) => Ok(Either::Left(Oci8QueryResult::default())),
            Err(e) => Err(e),
        };

        let last = !matches!(item, Ok(Either::Right(_)));

        if tx.send(item).is_err() {
            // the stream was dropped
            rows.close();
            return;
        }

        if last {
            return;
        }
    }
}

fn send_error(tx: &flume::Sender<FetchItem>, error: Error) {
    let _ = tx.send(Err(error));
}

async fn send_command_and_await<T>(
    command_tx: &flume::Sender<Command>,
    cmd: Command,
    rx: oneshot::Receiver<T>,
) -> Result<T, Error> {
    command_tx
        .send_async(cmd)
        .await
        .map_err(|_| Error::WorkerCrashed)?;

    rx.await.map_err(|_| Error::WorkerCrashed)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures_executor::block_on;
    use futures_util::StreamExt;

    use super::*;
    use crate::oci8::mock::{MockCall, MockColumn, MockOci};
    use crate::oci8::{Oci8DataType, Oci8Value};

    fn options(mock: &MockOci) -> Oci8ConnectOptions {
        Oci8ConnectOptions::new()
            .username("scott")
            .password("tiger")
            .prefetch_rows(8)
            .api(Arc::new(mock.clone()))
    }

    #[test]
    fn it_ends_the_stream_after_a_failed_query() {
        let mock = MockOci::new();

        block_on(async {
            let mut conn = Oci8Worker::establish(options(&mock)).await.unwrap();

            let mut stream = conn
                .fetch("SELECT * FROM missing", Oci8Arguments::default())
                .await
                .unwrap();

            let err = stream.next().await.unwrap().unwrap_err();
            assert_eq!(err.as_database_error().map(|e| e.code()), Some(942));
            assert!(stream.next().await.is_none());

            conn.close().await.unwrap();
        });
    }

    #[test]
    fn it_stops_reading_ahead_at_the_buffer_limit() {
        let mock = MockOci::new();
        mock.create_table("n", &[MockColumn::new("v", Oci8DataType::Number { precision: 9, scale: 0 })]);
        for v in 0..1000 {
            mock.insert_row("n", vec![Oci8Value::Integer(v)]);
        }

        block_on(async {
            let mut conn = Oci8Worker::establish(options(&mock)).await.unwrap();
            let mut stream = conn.fetch("SELECT * FROM n", Oci8Arguments::default()).await.unwrap();

            assert!(stream.next().await.is_some());

            // give the worker time to fill the channel
            thread::sleep(std::time::Duration::from_millis(50));

            let fetches = mock
                .calls()
                .into_iter()
                .filter(|call| matches!(call, MockCall::StmtFetch { .. }))
                .count();
            assert!(fetches <= (ROW_CHANNEL_SIZE + 2) / 8 + 2, "{} fetches", fetches);

            drop(stream);
            conn.close().await.unwrap();
        });

        assert_eq!(mock.handle_stats().outstanding, 0);
    }
}
