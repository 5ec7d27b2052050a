//! Translation of OCI status words into driver outcomes.

use crate::error::{BindError, Error, FetchError};
use crate::logger::NoticeLogger;
use crate::oci8::native::constants::*;
use crate::oci8::native::{HandleType, OciApi, RawHandle, Sword};
use crate::oci8::Oci8DatabaseError;

/// Size of the buffer `OCIErrorGet` writes message text into.
pub(crate) const ERROR_TEXT_CAPACITY: usize = 1024;

/// Every status a native call can end with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    SuccessWithInfo(String),
    NoData,
    NeedData,
    StillExecuting,
    InvalidHandle,
    Error { code: i32, message: String },
}

/// Interpret `status` as returned by a call that reported through the
/// error (or environment) handle `handle`.
///
/// Message text is only read for `OCI_ERROR` and `OCI_SUCCESS_WITH_INFO`;
/// the other statuses carry no diagnostic record.
pub fn translate(api: &dyn OciApi, status: Sword, handle: RawHandle, kind: HandleType) -> Outcome {
    match status {
        OCI_SUCCESS => Outcome::Success,
        OCI_NO_DATA => Outcome::NoData,
        OCI_NEED_DATA => Outcome::NeedData,
        OCI_STILL_EXECUTING => Outcome::StillExecuting,
        OCI_INVALID_HANDLE => Outcome::InvalidHandle,

        OCI_SUCCESS_WITH_INFO => {
            let (_, message) = error_text(api, handle, kind);
            Outcome::SuccessWithInfo(message)
        }

        OCI_ERROR => {
            let (code, message) = error_text(api, handle, kind);
            Outcome::Error { code, message }
        }

        other => Outcome::Error {
            code: 0,
            message: format!("unexpected OCI status {}", other),
        },
    }
}

fn error_text(api: &dyn OciApi, handle: RawHandle, kind: HandleType) -> (i32, String) {
    let mut buf = [0_u8; ERROR_TEXT_CAPACITY];
    let (status, code) = api.error_get(handle, kind, 1, &mut buf);

    if status != OCI_SUCCESS {
        return (code, "no diagnostic record available".to_owned());
    }

    let end = memchr::memchr(0, &buf).unwrap_or(buf.len());
    let message = String::from_utf8_lossy(&buf[..end]);

    (code, message.trim_end().to_owned())
}

/// Which driver operation a native failure is reported as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorScope {
    Connection,
    Statement,
    Bind,
    Execute,
    Fetch,
    Transaction,
}

impl ErrorScope {
    pub(crate) fn error(self, code: i32, message: String) -> Error {
        let err = Box::new(Oci8DatabaseError::new(code, message));

        match self {
            ErrorScope::Connection => Error::Connection(err),
            ErrorScope::Statement => Error::Statement(err),
            ErrorScope::Bind => Error::Bind(BindError::Native(err)),
            ErrorScope::Execute | ErrorScope::Transaction => Error::Execute(err),
            ErrorScope::Fetch => Error::Fetch(FetchError::Native(err)),
        }
    }
}

impl Outcome {
    /// Accept `Success`, log `SuccessWithInfo`, and turn everything else
    /// into an error of `scope`. `call` names the native function for
    /// diagnostics.
    pub(crate) fn ok_or_error(
        self,
        scope: ErrorScope,
        call: &'static str,
        logger: &NoticeLogger,
    ) -> Result<(), Error> {
        match self {
            Outcome::Success => Ok(()),
            Outcome::SuccessWithInfo(message) => {
                logger.notice(format_args!("{}: {}", call, message));
                Ok(())
            }
            Outcome::NoData => Err(err_protocol!("{} returned OCI_NO_DATA", call)),
            Outcome::NeedData => Err(err_protocol!("{} returned OCI_NEED_DATA", call)),
            Outcome::StillExecuting => {
                Err(err_protocol!("{} returned OCI_STILL_EXECUTING", call))
            }
            Outcome::InvalidHandle => Err(Error::InvalidHandle(call)),
            Outcome::Error { code, message } => Err(scope.error(code, message)),
        }
    }
}

/// Translate and check in one go, for calls that only ever succeed or fail.
pub(crate) fn check(
    api: &dyn OciApi,
    status: Sword,
    err: RawHandle,
    scope: ErrorScope,
    call: &'static str,
    logger: &NoticeLogger,
) -> Result<(), Error> {
    translate(api, status, err, HandleType::Error).ok_or_error(scope, call, logger)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oci8::mock::{MockCall, MockOci};

    fn env_and_err(api: &MockOci) -> (RawHandle, RawHandle) {
        let (_, env) = api.env_create(OCI_DEFAULT, 0);
        let env = env.unwrap();
        let (_, err) = api.handle_alloc(env, HandleType::Error);
        (env, err.unwrap())
    }

    #[test]
    fn it_maps_plain_statuses_without_reading_diagnostics() {
        let api = MockOci::new();
        let (_, err) = env_and_err(&api);

        assert_eq!(translate(&api, OCI_SUCCESS, err, HandleType::Error), Outcome::Success);
        assert_eq!(translate(&api, OCI_NO_DATA, err, HandleType::Error), Outcome::NoData);
        assert_eq!(translate(&api, OCI_NEED_DATA, err, HandleType::Error), Outcome::NeedData);
        assert_eq!(
            translate(&api, OCI_STILL_EXECUTING, err, HandleType::Error),
            Outcome::StillExecuting
        );
        assert_eq!(
            translate(&api, OCI_INVALID_HANDLE, err, HandleType::Error),
            Outcome::InvalidHandle
        );

        assert!(!api.calls().contains(&MockCall::ErrorGet));
    }

    #[test]
    fn it_reads_the_message_of_an_error() {
        let api = MockOci::new();
        let (_, err) = env_and_err(&api);

        api.set_error(err, 942, "ORA-00942: table or view does not exist");

        assert_eq!(
            translate(&api, OCI_ERROR, err, HandleType::Error),
            Outcome::Error {
                code: 942,
                message: "ORA-00942: table or view does not exist".into()
            }
        );
    }

    #[test]
    fn it_bounds_long_messages() {
        let api = MockOci::new();
        let (_, err) = env_and_err(&api);

        let long = format!("ORA-20000: {}", "é".repeat(ERROR_TEXT_CAPACITY));
        api.set_error(err, 20000, &long);

        match translate(&api, OCI_ERROR, err, HandleType::Error) {
            Outcome::Error { code, message } => {
                assert_eq!(code, 20000);
                assert!(message.starts_with("ORA-20000: éé"));
                assert!(message.len() <= ERROR_TEXT_CAPACITY + 2);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn it_treats_success_with_info_as_success() {
        let api = MockOci::new();
        let (_, err) = env_and_err(&api);
        api.set_error(err, 28002, "ORA-28002: the password will expire within 7 days");

        let outcome = translate(&api, OCI_SUCCESS_WITH_INFO, err, HandleType::Error);
        assert!(matches!(outcome, Outcome::SuccessWithInfo(ref m) if m.contains("28002")));
        assert!(outcome
            .ok_or_error(ErrorScope::Connection, "OCISessionBegin", &NoticeLogger::disabled())
            .is_ok());
    }

    #[test]
    fn it_synthesizes_a_message_for_unknown_statuses() {
        let api = MockOci::new();
        let (_, err) = env_and_err(&api);

        let err = translate(&api, 42, err, HandleType::Error)
            .ok_or_error(ErrorScope::Execute, "OCIStmtExecute", &NoticeLogger::disabled())
            .unwrap_err();

        assert!(matches!(err, Error::Execute(ref e) if e.message().contains("42")));
    }

    #[test]
    fn it_scopes_native_failures() {
        let err = ErrorScope::Fetch.error(1406, "ORA-01406: truncated".into());
        assert!(matches!(err, Error::Fetch(FetchError::Native(_))));

        let err = ErrorScope::Transaction.error(2091, "ORA-02091: rolled back".into());
        assert_eq!(err.as_database_error().map(|e| e.code()), Some(2091));
    }
}
