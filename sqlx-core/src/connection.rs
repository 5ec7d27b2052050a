use crate::error::Error;
use log::LevelFilter;
use std::fmt::Debug;
use std::str::FromStr;
use std::time::Duration;

/// Represents a single database connection.
///
/// Every method blocks the calling thread on the native client library.
pub trait Connection: Send {
    type Options: ConnectOptions<Connection = Self>;

    /// Explicitly close this database connection.
    ///
    /// Closing never fails: teardown problems are logged and swallowed so the
    /// native resources are always released. Calling it again is a no-op.
    fn close(&mut self);

    /// Checks if a connection to the database is still valid.
    fn ping(&mut self) -> Result<(), Error>;

    /// Start a transaction on this connection.
    fn begin(&mut self) -> Result<(), Error>;

    /// Commit the transaction started with [`begin`][Connection::begin].
    fn commit(&mut self) -> Result<(), Error>;

    /// Roll back the transaction started with [`begin`][Connection::begin].
    fn rollback(&mut self) -> Result<(), Error>;

    /// Execute the function inside a transaction.
    ///
    /// If the function returns an error, the transaction will be rolled back. If it does not
    /// return an error, the transaction will be committed.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use sqlx_core_oci8::connection::Connection;
    /// use sqlx_core_oci8::error::Error;
    /// use sqlx_core_oci8::oci8::{Oci8Arguments, Oci8Connection};
    ///
    /// fn transfer(conn: &mut Oci8Connection) -> Result<u64, Error> {
    ///     conn.transaction(|conn| {
    ///         let mut stmt = conn.prepare("UPDATE accounts SET balance = :1 WHERE id = :2")?;
    ///         let mut args = Oci8Arguments::default();
    ///         args.add(100_i64);
    ///         args.add(1_i64);
    ///         stmt.bind(args)?;
    ///         stmt.execute()?.rows_affected()
    ///     })
    /// }
    /// ```
    fn transaction<F, R, E>(&mut self, callback: F) -> Result<R, E>
    where
        F: FnOnce(&mut Self) -> Result<R, E>,
        E: From<Error>,
        Self: Sized,
    {
        self.begin()?;

        match callback(self) {
            Ok(ret) => {
                self.commit()?;

                Ok(ret)
            }
            Err(err) => {
                self.rollback()?;

                Err(err)
            }
        }
    }

    /// Establish a new database connection.
    ///
    /// A value of [`Options`][Self::Options] is parsed from the provided connection string. This parsing
    /// is database-specific.
    #[inline]
    fn connect(url: &str) -> Result<Self, Error>
    where
        Self: Sized,
        Self::Options: FromStr<Err = Error>,
    {
        let options: Self::Options = url.parse()?;

        options.connect()
    }
}

#[derive(Clone, Debug)]
pub(crate) struct LogSettings {
    pub(crate) statements_level: LevelFilter,
    pub(crate) slow_statements_level: LevelFilter,
    pub(crate) slow_statements_duration: Duration,
    pub(crate) notices_level: LevelFilter,
}

impl Default for LogSettings {
    fn default() -> Self {
        LogSettings {
            statements_level: LevelFilter::Debug,
            slow_statements_level: LevelFilter::Warn,
            slow_statements_duration: Duration::from_secs(1),
            notices_level: LevelFilter::Off,
        }
    }
}

impl LogSettings {
    pub(crate) fn log_statements(&mut self, level: LevelFilter) {
        self.statements_level = level;
    }
    pub(crate) fn log_slow_statements(&mut self, level: LevelFilter, duration: Duration) {
        self.slow_statements_level = level;
        self.slow_statements_duration = duration;
    }
    pub(crate) fn log_notices(&mut self, level: LevelFilter) {
        self.notices_level = level;
    }
}

pub trait ConnectOptions: 'static + Send + Sync + FromStr<Err = Error> + Debug + Clone {
    type Connection: Connection;

    fn from_url(url: &str) -> Result<Self, Error> {
        Self::from_str(url)
    }

    /// Establish a new database connection with the options specified by `self`.
    fn connect(&self) -> Result<Self::Connection, Error>;

    /// Read the connection string from `DATABASE_URL`, loading a `.env` file first if present.
    fn from_env() -> Result<Self, Error> {
        let _ = dotenvy::dotenv();
        let url = std::env::var("DATABASE_URL").map_err(Error::config)?;
        Self::from_str(&url)
    }

    /// Log executed statements with the specified `level`
    fn log_statements(&mut self, level: LevelFilter) -> &mut Self;

    /// Log executed statements with a duration above the specified `duration`
    /// at the specified `level`.
    fn log_slow_statements(&mut self, level: LevelFilter, duration: Duration) -> &mut Self;

    /// Route recoverable notices and teardown failures to the log at `level`.
    ///
    /// `LevelFilter::Off` (the default) discards them.
    fn log_notices(&mut self, level: LevelFilter) -> &mut Self;
}
