use std::sync::Arc;

use crate::column::ColumnIndex;
use crate::error::Error;
use crate::oci8::types::{Decode, Type};
use crate::oci8::{Oci8Column, Oci8Value};
use crate::type_info::TypeInfo;

/// A fully materialized row. It stays valid after its result set, statement
/// or connection is closed.
#[derive(Debug, Clone)]
pub struct Oci8Row {
    pub(crate) columns: Arc<[Oci8Column]>,
    pub(crate) values: Vec<Oci8Value>,
}

impl Oci8Row {
    pub fn columns(&self) -> &[Oci8Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn try_get_raw<I>(&self, index: I) -> Result<&Oci8Value, Error>
    where
        I: ColumnIndex<Self>,
    {
        let idx = index.index(self)?;
        Ok(&self.values[idx])
    }

    /// Index into the row and decode a single value.
    ///
    /// A `NULL` only decodes into an `Option`.
    pub fn try_get<T, I>(&self, index: I) -> Result<T, Error>
    where
        T: Decode + Type,
        I: ColumnIndex<Self>,
    {
        let idx = index.index(self)?;
        let value = &self.values[idx];
        let column = &self.columns[idx];

        if !value.is_null() && !T::compatible(&column.type_info) {
            return Err(Error::decode(format!(
                "mismatched types; Rust type `{}` is not compatible with SQL type `{}` of column {:?}",
                std::any::type_name::<T>(),
                column.type_info.name(),
                column.name
            )));
        }

        T::decode(value).map_err(|e| Error::decode(format!("column {:?}: {}", column.name, e)))
    }

    /// Index into the row and decode a single value.
    ///
    /// # Panics
    ///
    /// Panics if the column does not exist or its value cannot be decoded
    /// into `T`. See [`try_get`](Self::try_get) for a non-panicking version.
    #[track_caller]
    pub fn get<T, I>(&self, index: I) -> T
    where
        T: Decode + Type,
        I: ColumnIndex<Self>,
    {
        match self.try_get(index) {
            Ok(value) => value,
            Err(error) => panic!("{}", error),
        }
    }
}

impl ColumnIndex<Oci8Row> for usize {
    fn index(&self, row: &Oci8Row) -> Result<usize, Error> {
        if *self >= row.values.len() {
            return Err(Error::ColumnIndexOutOfBounds {
                index: *self,
                len: row.values.len(),
            });
        }

        Ok(*self)
    }
}

impl ColumnIndex<Oci8Row> for str {
    fn index(&self, row: &Oci8Row) -> Result<usize, Error> {
        // Try exact match first (for performance)
        if let Some(pos) = row.columns.iter().position(|col| col.name == self) {
            return Ok(pos);
        }

        // Oracle folds unquoted identifiers to upper case
        row.columns
            .iter()
            .position(|col| col.name.eq_ignore_ascii_case(self))
            .ok_or_else(|| Error::ColumnNotFound(self.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oci8::{Oci8DataType, Oci8TypeInfo};

    fn create_test_row() -> Oci8Row {
        let column = |name: &str, ordinal, data_type| Oci8Column {
            name: name.into(),
            ordinal,
            type_info: Oci8TypeInfo(data_type),
            nullable: true,
        };

        Oci8Row {
            columns: vec![
                column(
                    "ID",
                    0,
                    Oci8DataType::Number {
                        precision: 10,
                        scale: 0,
                    },
                ),
                column("NAME", 1, Oci8DataType::Varchar2),
                column("Quoted_Col", 2, Oci8DataType::BinaryDouble),
            ]
            .into(),
            values: vec![
                Oci8Value::Integer(7),
                Oci8Value::Null,
                Oci8Value::Float(std::f64::consts::PI),
            ],
        }
    }

    #[test]
    fn test_case_insensitive_column_match() {
        let row = create_test_row();

        assert_eq!("ID".index(&row).unwrap(), 0);
        assert_eq!("id".index(&row).unwrap(), 0);
        assert_eq!("name".index(&row).unwrap(), 1);
        assert_eq!("QUOTED_COL".index(&row).unwrap(), 2);
        assert!(matches!("missing".index(&row), Err(Error::ColumnNotFound(ref n)) if n == "missing"));
        assert!(matches!(
            3_usize.index(&row),
            Err(Error::ColumnIndexOutOfBounds { index: 3, len: 3 })
        ));
    }

    #[test]
    fn test_typed_access() {
        let row = create_test_row();

        assert_eq!(row.get::<i64, _>("id"), 7);
        assert_eq!(row.get::<Option<String>, _>(1), None);
        assert!(row.try_get::<String, _>("NAME").is_err());
        assert!(row.try_get::<String, _>(0).is_err());
        assert!((row.get::<f64, _>(2) - std::f64::consts::PI).abs() < f64::EPSILON);
    }
}
