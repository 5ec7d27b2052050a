//! Ownership of native handles.
//!
//! Every handle the driver allocates lives in an [`OwnedHandle`], which frees
//! it exactly once when dropped. A [`HandleSet`] groups the handles of one
//! logical connection and tears them down in reverse order of acquisition.

use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use crate::error::Error;
use crate::logger::NoticeLogger;
use crate::oci8::native::constants::*;
use crate::oci8::native::{Attr, Credentials, HandleType, OciApi, RawHandle};
use crate::oci8::options::Oci8ConnectOptions;
use crate::oci8::status::{check, translate, ErrorScope, Outcome};

pub(crate) struct OwnedHandle {
    api: Arc<dyn OciApi>,
    raw: RawHandle,
    kind: HandleType,
    logger: NoticeLogger,
}

impl OwnedHandle {
    /// Create an environment handle.
    pub(crate) fn env(
        api: &Arc<dyn OciApi>,
        mode: u32,
        charset: u16,
        logger: NoticeLogger,
    ) -> Result<Self, Error> {
        let (status, raw) = api.env_create(mode, charset);

        let raw = match raw {
            Some(raw) => raw,
            None => {
                return Err(ErrorScope::Connection.error(
                    0,
                    format!("OCIEnvNlsCreate failed with status {}", status),
                ))
            }
        };

        let env = OwnedHandle {
            api: Arc::clone(api),
            raw,
            kind: HandleType::Env,
            logger,
        };

        // diagnostics of a failed environment live on the environment itself
        translate(&**api, status, raw, HandleType::Env).ok_or_error(
            ErrorScope::Connection,
            "OCIEnvNlsCreate",
            &logger,
        )?;

        Ok(env)
    }

    /// Allocate a child handle (or descriptor) of an environment.
    pub(crate) fn alloc(env: &OwnedHandle, kind: HandleType, scope: ErrorScope) -> Result<Self, Error> {
        let (status, raw) = env.api.handle_alloc(env.raw, kind);

        match (translate(&*env.api, status, env.raw, HandleType::Env), raw) {
            (Outcome::Success, Some(raw)) => Ok(env.child(raw, kind)),

            (Outcome::SuccessWithInfo(message), Some(raw)) => {
                env.logger
                    .notice(format_args!("OCIHandleAlloc({}): {}", kind.name(), message));
                Ok(env.child(raw, kind))
            }

            (outcome, raw) => {
                // never leave a half-allocated handle behind
                if let Some(raw) = raw {
                    drop(env.child(raw, kind));
                }

                Err(match outcome {
                    Outcome::Error { code, message } => scope.error(code, message),
                    Outcome::InvalidHandle => Error::InvalidHandle("OCIHandleAlloc"),
                    other => scope.error(
                        0,
                        format!("OCIHandleAlloc({}) failed: {:?}", kind.name(), other),
                    ),
                })
            }
        }
    }

    fn child(&self, raw: RawHandle, kind: HandleType) -> Self {
        OwnedHandle {
            api: Arc::clone(&self.api),
            raw,
            kind,
            logger: self.logger,
        }
    }

    pub(crate) fn raw(&self) -> RawHandle {
        self.raw
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        let status = self.api.handle_free(self.raw, self.kind);

        if status != OCI_SUCCESS {
            self.logger.notice(format_args!(
                "OCIHandleFree({}, {}) failed with status {}",
                self.kind.name(),
                self.raw,
                status
            ));
        }
    }
}

impl Debug for OwnedHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedHandle")
            .field("raw", &self.raw)
            .field("kind", &self.kind)
            .finish()
    }
}

/// The environment, error, server, service context and session handles of
/// one connection.
///
/// Fields are declared in release order: dropping a partially built set
/// frees whatever was acquired, newest first.
pub(crate) struct HandleSet {
    session_active: bool,
    server_attached: bool,

    session: Option<OwnedHandle>,
    svc: Option<OwnedHandle>,
    srv: Option<OwnedHandle>,
    err: Option<OwnedHandle>,
    env: Option<OwnedHandle>,

    api: Arc<dyn OciApi>,
    logger: NoticeLogger,
}

impl HandleSet {
    pub(crate) fn open(
        api: Arc<dyn OciApi>,
        options: &Oci8ConnectOptions,
        charset: u16,
        logger: NoticeLogger,
    ) -> Result<Self, Error> {
        let mut set = HandleSet {
            session_active: false,
            server_attached: false,
            session: None,
            svc: None,
            srv: None,
            err: None,
            env: None,
            api: Arc::clone(&api),
            logger,
        };

        set.env = Some(OwnedHandle::env(
            &api,
            OCI_DEFAULT | OCI_THREADED,
            charset,
            logger,
        )?);

        let err = set.alloc(HandleType::Error, ErrorScope::Connection)?;
        let err_raw = err.raw();
        set.err = Some(err);

        let srv = set.alloc(HandleType::Server, ErrorScope::Connection)?;
        let srv_raw = srv.raw();
        set.srv = Some(srv);

        let svc = set.alloc(HandleType::SvcCtx, ErrorScope::Connection)?;
        let svc_raw = svc.raw();
        set.svc = Some(svc);

        let status = api.server_attach(srv_raw, err_raw, &options.connect, OCI_DEFAULT);
        check(&*api, status, err_raw, ErrorScope::Connection, "OCIServerAttach", &logger)?;
        set.server_attached = true;

        let status = api.attr_set(svc_raw, HandleType::SvcCtx, Attr::Server(srv_raw), err_raw);
        check(&*api, status, err_raw, ErrorScope::Connection, "OCIAttrSet(OCI_ATTR_SERVER)", &logger)?;

        let session = set.alloc(HandleType::Session, ErrorScope::Connection)?;
        let session_raw = session.raw();
        set.session = Some(session);

        let credentials = if options.external_auth {
            Credentials::External
        } else {
            let status = api.attr_set(
                session_raw,
                HandleType::Session,
                Attr::Username(&options.username),
                err_raw,
            );
            check(&*api, status, err_raw, ErrorScope::Connection, "OCIAttrSet(OCI_ATTR_USERNAME)", &logger)?;

            let status = api.attr_set(
                session_raw,
                HandleType::Session,
                Attr::Password(&options.password),
                err_raw,
            );
            check(&*api, status, err_raw, ErrorScope::Connection, "OCIAttrSet(OCI_ATTR_PASSWORD)", &logger)?;

            Credentials::Rdbms
        };

        let status = api.session_begin(
            svc_raw,
            err_raw,
            session_raw,
            credentials,
            options.operation_mode.code(),
        );
        check(&*api, status, err_raw, ErrorScope::Connection, "OCISessionBegin", &logger)?;
        set.session_active = true;

        let status = api.attr_set(
            svc_raw,
            HandleType::SvcCtx,
            Attr::Session(session_raw),
            err_raw,
        );
        check(&*api, status, err_raw, ErrorScope::Connection, "OCIAttrSet(OCI_ATTR_SESSION)", &logger)?;

        log::debug!(
            "opened session on {:?} as {}",
            options.connect,
            if options.external_auth { "<external>" } else { &options.username }
        );

        Ok(set)
    }

    /// Allocate another handle under this connection's environment.
    pub(crate) fn alloc(&self, kind: HandleType, scope: ErrorScope) -> Result<OwnedHandle, Error> {
        match &self.env {
            Some(env) => OwnedHandle::alloc(env, kind, scope),
            None => Err(Error::Closed("connection")),
        }
    }

    pub(crate) fn api(&self) -> &dyn OciApi {
        &*self.api
    }

    pub(crate) fn logger(&self) -> &NoticeLogger {
        &self.logger
    }

    pub(crate) fn err(&self) -> Result<RawHandle, Error> {
        raw_of(&self.err)
    }

    pub(crate) fn svc(&self) -> Result<RawHandle, Error> {
        raw_of(&self.svc)
    }

    /// End the session, detach the server and free every handle.
    ///
    /// Failures are reported to the notice logger and otherwise ignored.
    pub(crate) fn close(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        let api = Arc::clone(&self.api);
        let logger = self.logger;
        let err = self.err.as_ref().map(OwnedHandle::raw);

        if let (true, Some(err)) = (self.session_active, err) {
            self.session_active = false;

            if let (Some(svc), Some(session)) = (&self.svc, &self.session) {
                let status = api.session_end(svc.raw(), err, session.raw(), OCI_DEFAULT);
                report(&*api, status, err, "OCISessionEnd", &logger);
            }
        }

        if let (true, Some(err)) = (self.server_attached, err) {
            self.server_attached = false;

            if let Some(srv) = &self.srv {
                let status = api.server_detach(srv.raw(), err, OCI_DEFAULT);
                report(&*api, status, err, "OCIServerDetach", &logger);
            }
        }

        // newest first
        self.session.take();
        self.svc.take();
        self.srv.take();
        self.err.take();
        self.env.take();
    }
}

impl Drop for HandleSet {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl Debug for HandleSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleSet")
            .field("env", &self.env)
            .field("svc", &self.svc)
            .field("session_active", &self.session_active)
            .finish()
    }
}

fn raw_of(handle: &Option<OwnedHandle>) -> Result<RawHandle, Error> {
    handle
        .as_ref()
        .map(OwnedHandle::raw)
        .ok_or(Error::Closed("connection"))
}

fn report(api: &dyn OciApi, status: i32, err: RawHandle, call: &'static str, logger: &NoticeLogger) {
    match translate(api, status, err, HandleType::Error) {
        Outcome::Success => {}
        Outcome::SuccessWithInfo(message) => logger.notice(format_args!("{}: {}", call, message)),
        Outcome::Error { code, message } => {
            logger.notice(format_args!("{} failed: ORA-{:05}: {}", call, code, message))
        }
        other @ (Outcome::NoData
        | Outcome::NeedData
        | Outcome::StillExecuting
        | Outcome::InvalidHandle) => {
            logger.notice(format_args!("{} failed: {:?}", call, other))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oci8::mock::{MockCall, MockFault, MockOci};

    fn options() -> Oci8ConnectOptions {
        Oci8ConnectOptions::new()
            .connect("localhost/XEPDB1")
            .username("scott")
            .password("tiger")
    }

    #[test]
    fn it_releases_everything_on_close() {
        let mock = MockOci::new();
        let api: Arc<dyn OciApi> = Arc::new(mock.clone());

        let set = HandleSet::open(api, &options(), 873, NoticeLogger::disabled()).unwrap();
        assert_eq!(mock.handle_stats().outstanding, 5);

        set.close();

        let stats = mock.handle_stats();
        assert_eq!(stats.allocated, stats.freed);
        assert_eq!(stats.outstanding, 0);

        let calls = mock.calls();
        let end = calls.iter().position(|c| *c == MockCall::SessionEnd).unwrap();
        let detach = calls.iter().position(|c| *c == MockCall::ServerDetach).unwrap();
        assert!(end < detach);
    }

    #[test]
    fn it_releases_partial_sets_when_attach_fails() {
        let mock = MockOci::new();
        mock.inject(MockFault::error(
            MockCall::ServerAttach,
            12541,
            "ORA-12541: TNS:no listener",
        ));
        let api: Arc<dyn OciApi> = Arc::new(mock.clone());

        let err = HandleSet::open(api, &options(), 0, NoticeLogger::disabled()).unwrap_err();

        assert!(matches!(err, Error::Connection(ref e) if e.code() == 12541));
        assert_eq!(mock.handle_stats().outstanding, 0);
        assert!(!mock.calls().contains(&MockCall::ServerDetach));
    }

    #[test]
    fn it_detaches_when_the_session_cannot_begin() {
        let mock = MockOci::new();
        mock.inject(MockFault::error(
            MockCall::SessionBegin,
            1017,
            "ORA-01017: invalid username/password; logon denied",
        ));
        let api: Arc<dyn OciApi> = Arc::new(mock.clone());

        let err = HandleSet::open(api, &options(), 0, NoticeLogger::disabled()).unwrap_err();

        assert_eq!(err.as_database_error().map(|e| e.code()), Some(1017));
        assert!(mock.calls().contains(&MockCall::ServerDetach));
        assert!(!mock.calls().contains(&MockCall::SessionEnd));
        assert_eq!(mock.handle_stats().outstanding, 0);
    }

    #[test]
    fn it_swallows_teardown_failures() {
        let mock = MockOci::new();
        let api: Arc<dyn OciApi> = Arc::new(mock.clone());
        let set = HandleSet::open(api, &options(), 0, NoticeLogger::disabled()).unwrap();

        mock.inject(MockFault::error(MockCall::SessionEnd, 3113, "ORA-03113: end-of-file"));
        set.close();

        assert_eq!(mock.handle_stats().outstanding, 0);
    }
}
