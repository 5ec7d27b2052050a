use std::ops::{Deref, DerefMut};

use crate::error::Error;
use crate::oci8::connection::ConnectionInner;
use crate::oci8::native::constants::{OCI_DEFAULT, OCI_TRANS_NEW};
use crate::oci8::options::TransactionMode;
use crate::oci8::status::{check, ErrorScope};
use crate::oci8::Oci8Connection;

/// Seconds a started transaction may stay idle before the server may
/// reclaim it.
const TRANSACTION_TIMEOUT: u32 = 60;

pub(crate) fn begin(inner: &mut ConnectionInner, mode: TransactionMode) -> Result<(), Error> {
    if inner.in_transaction {
        return Err(Error::State(
            "a transaction is already open; nested transactions are not supported".into(),
        ));
    }

    // read-write is what the server gives an implicit transaction anyway
    if mode != TransactionMode::ReadWrite {
        let handles = inner.handles()?;
        let api = handles.api();
        let err = handles.err()?;

        let status = api.trans_start(
            handles.svc()?,
            err,
            TRANSACTION_TIMEOUT,
            mode.code() | OCI_TRANS_NEW,
        );
        check(api, status, err, ErrorScope::Transaction, "OCITransStart", handles.logger())?;
    }

    inner.in_transaction = true;

    Ok(())
}

pub(crate) fn commit(inner: &mut ConnectionInner) -> Result<(), Error> {
    finish(inner, Finish::Commit)
}

pub(crate) fn rollback(inner: &mut ConnectionInner) -> Result<(), Error> {
    finish(inner, Finish::Rollback)
}

#[derive(Clone, Copy)]
enum Finish {
    Commit,
    Rollback,
}

fn finish(inner: &mut ConnectionInner, how: Finish) -> Result<(), Error> {
    if !inner.in_transaction {
        return Err(Error::State("no transaction is open".into()));
    }

    // a failed commit or rollback still ends the transaction
    inner.in_transaction = false;

    let handles = inner.handles()?;
    let api = handles.api();
    let err = handles.err()?;
    let svc = handles.svc()?;

    match how {
        Finish::Commit => {
            let status = api.trans_commit(svc, err, OCI_DEFAULT);
            check(api, status, err, ErrorScope::Transaction, "OCITransCommit", handles.logger())
        }
        Finish::Rollback => {
            let status = api.trans_rollback(svc, err, OCI_DEFAULT);
            check(api, status, err, ErrorScope::Transaction, "OCITransRollback", handles.logger())
        }
    }
}

/// An open transaction that rolls back when dropped without a commit.
///
/// ```rust,no_run
/// # use sqlx_core_oci8::error::Error;
/// # use sqlx_core_oci8::oci8::{Oci8Arguments, Oci8Connection};
/// # fn example(conn: &mut Oci8Connection) -> Result<(), Error> {
/// let mut tx = conn.begin_transaction()?;
/// tx.execute("DELETE FROM t", Oci8Arguments::default())?;
/// tx.commit()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Oci8Transaction<'c> {
    conn: &'c mut Oci8Connection,
    open: bool,
}

impl<'c> Oci8Transaction<'c> {
    pub(crate) fn begin(conn: &'c mut Oci8Connection) -> Result<Self, Error> {
        conn.begin()?;

        Ok(Self { conn, open: true })
    }

    pub fn commit(mut self) -> Result<(), Error> {
        self.open = false;
        self.conn.commit()
    }

    pub fn rollback(mut self) -> Result<(), Error> {
        self.open = false;
        self.conn.rollback()
    }
}

impl Deref for Oci8Transaction<'_> {
    type Target = Oci8Connection;

    fn deref(&self) -> &Self::Target {
        self.conn
    }
}

impl DerefMut for Oci8Transaction<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn
    }
}

impl Drop for Oci8Transaction<'_> {
    fn drop(&mut self) {
        if self.open {
            if let Err(error) = self.conn.rollback() {
                log::warn!("failed to roll back a dropped transaction: {}", error);
            }
        }
    }
}
