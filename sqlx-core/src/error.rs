//! Types for working with errors produced by SQLx.

use std::error::Error as StdError;
use std::fmt::Display;
use std::sync::Arc;

use crate::oci8::Oci8DatabaseError;

/// A specialized `Result` type for SQLx.
pub type Result<T, E = Error> = std::result::Result<T, E>;

// Convenience type alias for usage within SQLx.
// Do not make this type public.
pub type BoxDynError = Box<dyn StdError + 'static + Send + Sync>;

/// Represents all the ways a method can fail within SQLx.
///
/// Errors are cheap to clone so that results which are resolved once and
/// read many times (rows affected, row identifiers) can hand them out again.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Error occurred while parsing a connection string.
    #[error("error with configuration: {0}")]
    Configuration(String),

    /// Setting up or tearing down the native handles failed.
    #[error("connection error: {0}")]
    Connection(Box<Oci8DatabaseError>),

    /// The statement could not be prepared.
    #[error("statement error: {0}")]
    Statement(Box<Oci8DatabaseError>),

    /// Parameters could not be bound to the statement.
    #[error("bind error: {0}")]
    Bind(#[from] BindError),

    /// The native execute call failed.
    #[error("execute error: {0}")]
    Execute(Box<Oci8DatabaseError>),

    /// A row could not be fetched or materialized.
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// The operation is not valid in the current lifecycle state.
    #[error("invalid state: {0}")]
    State(String),

    /// The object (or one of its owners) has been closed.
    #[error("{0} is closed")]
    Closed(&'static str),

    /// The operation observed a cancellation request.
    #[error("operation was cancelled")]
    Cancelled,

    /// The native library rejected a handle as invalid.
    #[error("invalid handle passed to {0}")]
    InvalidHandle(&'static str),

    /// The call succeeded but the server attached an informational message.
    ///
    /// Driver operations never return this: they log the message through the
    /// notice logger and succeed. It is here for code that turns an
    /// [`Outcome::SuccessWithInfo`](crate::oci8::status::Outcome) into an
    /// `Error` of its own; check it with [`Error::is_success_with_info`].
    #[error("success with info: {0}")]
    SuccessWithInfo(String),

    /// The statement did not produce a row identifier.
    #[error("result has no rowid")]
    NoRowId,

    /// No column found for the given name.
    #[error("no column found for name: {0}")]
    ColumnNotFound(String),

    /// Column index was out of bounds.
    #[error("column index out of bounds: the len is {len}, but the index is {index}")]
    ColumnIndexOutOfBounds { index: usize, len: usize },

    /// Error occurred while decoding a value.
    #[error("error occurred while decoding: {0}")]
    Decode(Arc<dyn StdError + Send + Sync>),

    /// Unexpected or invalid data encountered while communicating with the native library.
    #[error("encountered unexpected or invalid data: {0}")]
    Protocol(String),

    /// A background worker has crashed.
    #[error("attempted to communicate with a crashed background worker")]
    WorkerCrashed,
}

impl Error {
    #[inline]
    pub(crate) fn config(err: impl Display) -> Self {
        Error::Configuration(err.to_string())
    }

    #[inline]
    pub(crate) fn decode(err: impl Into<BoxDynError>) -> Self {
        Error::Decode(Arc::from(err.into()))
    }

    /// `true` for the "success with informational message" sentinel.
    pub fn is_success_with_info(&self) -> bool {
        matches!(self, Error::SuccessWithInfo(_))
    }

    /// `true` for the "operation produced no row identifier" sentinel.
    pub fn is_no_row_id(&self) -> bool {
        matches!(self, Error::NoRowId)
    }

    /// The native database error behind this error, if there is one.
    pub fn as_database_error(&self) -> Option<&Oci8DatabaseError> {
        match self {
            Error::Connection(e) | Error::Statement(e) | Error::Execute(e) => Some(e),
            Error::Bind(BindError::Native(e)) | Error::Fetch(FetchError::Native(e)) => Some(e),
            _ => None,
        }
    }
}

/// Failures while encoding and registering input parameters.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum BindError {
    #[error("statement has {expected} placeholders but {actual} parameters were supplied")]
    CountMismatch { expected: usize, actual: usize },

    #[error("parameter {index}: unsupported type {type_name}")]
    UnsupportedType { index: usize, type_name: String },

    #[error("parameter {index}: {len} bytes do not fit the declared capacity of {capacity} bytes")]
    Overflow {
        index: usize,
        len: usize,
        capacity: usize,
    },

    #[error("parameter {index}: value type changes between rows of the batch")]
    TypeMismatch { index: usize },

    #[error("parameter {index}: {message}")]
    OutOfRange { index: usize, message: String },

    #[error("named parameter `{0}` cannot be used with `?` placeholders")]
    NamedInPositional(String),

    #[error("{0}")]
    Native(Box<Oci8DatabaseError>),
}

/// Failures while fetching or materializing rows.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum FetchError {
    #[error("column {column}: value of {len} bytes was truncated to the {capacity} byte buffer")]
    Truncated {
        column: usize,
        len: usize,
        capacity: usize,
    },

    #[error("column {column}: {message}")]
    Malformed { column: usize, message: String },

    #[error("{0}")]
    Native(Box<Oci8DatabaseError>),
}

/// The classes of database error a caller commonly reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Unique/primary key constraint violation.
    UniqueViolation,
    /// Foreign key constraint violation.
    ForeignKeyViolation,
    /// Not-null constraint violation.
    NotNullViolation,
    /// Check constraint violation.
    CheckViolation,
    /// An unmapped error.
    Other,
}

/// Format an error message as a `Protocol` error
macro_rules! err_protocol {
    ($expr:expr) => {
        $crate::error::Error::Protocol($expr.into())
    };

    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::Error::Protocol(format!($fmt, $($arg)*))
    };
}
