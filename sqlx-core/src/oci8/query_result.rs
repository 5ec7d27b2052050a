use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::oci8::arena::Key;
use crate::error::Error;
use crate::oci8::connection::ConnectionShared;
use crate::oci8::native::{AttrKind, AttrValue, HandleType};
use crate::oci8::status::{translate, ErrorScope, Outcome};
use crate::oci8::types::Decode;
use crate::oci8::Oci8Value;

/// The value an output (or in/out) parameter held after execute.
#[derive(Debug, Clone, PartialEq)]
pub struct Oci8OutValue {
    pub(crate) name: Option<String>,
    pub(crate) position: usize,
    pub(crate) row: usize,
    pub(crate) value: Oci8Value,
}

impl Oci8OutValue {
    /// Placeholder name, for parameters bound by name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// 1-based parameter position.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Row of the batch the value belongs to.
    pub fn row(&self) -> usize {
        self.row
    }

    pub fn value(&self) -> &Oci8Value {
        &self.value
    }

    pub fn try_decode<T: Decode>(&self) -> Result<T, Error> {
        T::decode(&self.value).map_err(Error::decode)
    }
}

/// Outcome of one execution.
///
/// The affected row count and the row identifier are each read from the
/// statement once; the value (or the error met reading it) is kept and
/// handed out again on every later call.
pub struct Oci8QueryResult {
    pub(crate) rows_affected: Result<u64, Error>,
    pub(crate) row_id: OnceCell<Result<String, Error>>,
    pub(crate) out_values: Vec<Oci8OutValue>,
    pub(crate) source: Option<(Arc<ConnectionShared>, Key, u64)>,
}

impl Oci8QueryResult {
    pub fn rows_affected(&self) -> Result<u64, Error> {
        self.rows_affected.clone()
    }

    /// The `ROWID` of the last row the statement touched.
    ///
    /// Fails with [`Error::NoRowId`] when the statement produced none (a
    /// query, DDL, or DML that matched no rows). Must be called before the
    /// statement executes again or closes.
    pub fn row_id(&self) -> Result<String, Error> {
        self.row_id.get_or_init(|| self.resolve_row_id()).clone()
    }

    pub fn out_values(&self) -> &[Oci8OutValue] {
        &self.out_values
    }

    /// The first-row value of the output parameter bound as `:name`.
    pub fn out_value(&self, name: &str) -> Option<&Oci8Value> {
        let name = name.trim_start_matches(':');

        self.out_values
            .iter()
            .find(|out| out.row == 0 && matches!(&out.name, Some(n) if n.eq_ignore_ascii_case(name)))
            .map(|out| &out.value)
    }

    fn resolve_row_id(&self) -> Result<String, Error> {
        let (shared, key, execution) = self.source.as_ref().ok_or(Error::NoRowId)?;

        let mut guard = shared.lock()?;
        let inner = &mut *guard;
        let handles = inner.handles.as_ref().ok_or(Error::Closed("connection"))?;
        let slot = inner
            .statements
            .get(*key)
            .ok_or(Error::Closed("statement"))?;

        if slot.execution != *execution {
            return Err(Error::State(
                "statement was executed again; its earlier row id is gone".into(),
            ));
        }

        let api = handles.api();
        let err = handles.err()?;
        let (status, value) = api.attr_get(slot.handle.raw(), HandleType::Stmt, AttrKind::RowId, err);

        match translate(api, status, err, HandleType::Error) {
            Outcome::NoData => Err(Error::NoRowId),
            outcome => {
                outcome.ok_or_error(ErrorScope::Execute, "OCIAttrGet(OCI_ATTR_ROWID)", handles.logger())?;

                match value {
                    AttrValue::Text(row_id) if !row_id.is_empty() => Ok(row_id),
                    _ => Err(Error::NoRowId),
                }
            }
        }
    }
}

impl Debug for Oci8QueryResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Oci8QueryResult")
            .field("rows_affected", &self.rows_affected)
            .field("row_id", &self.row_id.get())
            .field("out_values", &self.out_values)
            .finish()
    }
}

impl Default for Oci8QueryResult {
    fn default() -> Self {
        Self {
            rows_affected: Ok(0),
            row_id: OnceCell::new(),
            out_values: Vec::new(),
            source: None,
        }
    }
}

impl Extend<Oci8QueryResult> for Oci8QueryResult {
    fn extend<T: IntoIterator<Item = Oci8QueryResult>>(&mut self, iter: T) {
        for elem in iter {
            self.rows_affected = match (&self.rows_affected, elem.rows_affected) {
                (Ok(a), Ok(b)) => Ok(a + b),
                (Err(e), _) => Err(e.clone()),
                (_, Err(e)) => Err(e),
            };
            self.out_values.extend(elem.out_values);
            self.row_id = elem.row_id;
            self.source = elem.source;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn affected(rows_affected: Result<u64, Error>) -> Oci8QueryResult {
        Oci8QueryResult {
            rows_affected,
            ..Default::default()
        }
    }

    #[test]
    fn it_sums_affected_rows_across_results() {
        let mut total = Oci8QueryResult::default();
        total.extend([affected(Ok(2)), affected(Ok(3))]);

        assert_eq!(total.rows_affected().unwrap(), 5);
        assert!(matches!(total.row_id(), Err(Error::NoRowId)));
    }

    #[test]
    fn it_keeps_the_first_failure_to_count_rows() {
        let mut total = affected(Ok(1));
        total.extend([
            affected(Err(Error::State("first".into()))),
            affected(Ok(4)),
            affected(Err(Error::State("second".into()))),
        ]);

        assert!(matches!(total.rows_affected(), Err(Error::State(msg)) if msg == "first"));
    }
}
