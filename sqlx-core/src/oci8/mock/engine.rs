//! Tables, procedures and statement evaluation behind [`MockOci`](super::MockOci).
//!
//! Changes apply to the shared tables immediately; a service context keeps
//! an undo log of what its open transaction changed so rollback can put the
//! rows back.

use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Debug, Display, Formatter};
use std::sync::Arc;

use bigdecimal::{BigDecimal, FromPrimitive, ToPrimitive};
use chrono::NaiveDateTime;
use chrono_tz::Tz;

use super::parser::{Condition, Item, Operand, Sql};
use crate::oci8::codec::{self, NativeKind};
use crate::oci8::native::constants::*;
use crate::oci8::native::ColumnDescription;
use crate::oci8::{Oci8DataType, Oci8Value};

/// A server error: the `ORA-nnnnn` code and its full message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OraError {
    pub(crate) code: i32,
    pub(crate) message: String,
}

pub(crate) fn ora(code: i32, text: impl Display) -> OraError {
    OraError {
        code,
        message: format!("ORA-{:05}: {}", code, text),
    }
}

pub(crate) type OraResult<T> = Result<T, OraError>;

/// A stored procedure: receives its arguments in order and may overwrite
/// any of them; overwritten values bound as outputs are sent back.
pub type Procedure = Arc<dyn Fn(&mut [Oci8Value]) -> Result<(), (i32, String)> + Send + Sync>;

/// Definition of a column of a mock table.
#[derive(Debug, Clone, PartialEq)]
pub struct MockColumn {
    pub(crate) name: String,
    pub(crate) data_type: Oci8DataType,
    pub(crate) size: Option<u16>,
    pub(crate) unique: bool,
    pub(crate) nullable: bool,
}

impl MockColumn {
    pub fn new(name: &str, data_type: Oci8DataType) -> Self {
        Self {
            name: name.to_ascii_uppercase(),
            data_type,
            size: None,
            unique: false,
            nullable: true,
        }
    }

    /// Maximum length in bytes (characters for text columns).
    pub fn size(mut self, size: u16) -> Self {
        self.size = Some(size);
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    fn describe(&self) -> ColumnDescription {
        let (data_type, precision, scale, charset_form, default_size) = match self.data_type {
            Oci8DataType::Varchar2 => (SQLT_CHR, 0, 0, SQLCS_IMPLICIT, 4000),
            Oci8DataType::NVarchar2 => (SQLT_CHR, 0, 0, SQLCS_NCHAR, 2000),
            Oci8DataType::Char => (SQLT_AFC, 0, 0, SQLCS_IMPLICIT, 1),
            Oci8DataType::NChar => (SQLT_AFC, 0, 0, SQLCS_NCHAR, 1),
            Oci8DataType::Number { precision, scale } => (SQLT_NUM, precision, scale, 0, 22),
            Oci8DataType::Float { precision } => (SQLT_NUM, precision, -127, 0, 22),
            Oci8DataType::BinaryFloat => (SQLT_IBFLOAT, 0, 0, 0, 4),
            Oci8DataType::BinaryDouble => (SQLT_IBDOUBLE, 0, 0, 0, 8),
            Oci8DataType::Long => (SQLT_LNG, 0, 0, SQLCS_IMPLICIT, 0),
            Oci8DataType::LongRaw => (SQLT_LBI, 0, 0, 0, 0),
            Oci8DataType::Raw => (SQLT_BIN, 0, 0, 0, 2000),
            Oci8DataType::Date => (SQLT_DAT, 0, 0, 0, 7),
            Oci8DataType::Timestamp => (SQLT_TIMESTAMP_INTERNAL, 0, 6, 0, 11),
            Oci8DataType::TimestampTz => (SQLT_TIMESTAMP_TZ_INTERNAL, 0, 6, 0, 13),
            Oci8DataType::TimestampLtz => (SQLT_TIMESTAMP_LTZ_INTERNAL, 0, 6, 0, 11),
            Oci8DataType::IntervalYearToMonth => (SQLT_INTERVAL_YM_INTERNAL, 2, 0, 0, 5),
            Oci8DataType::IntervalDayToSecond => (SQLT_INTERVAL_DS_INTERNAL, 2, 6, 0, 11),
            Oci8DataType::RowId => (SQLT_RDD, 0, 0, 0, 10),
            Oci8DataType::URowId => (SQLT_UROWID, 0, 0, 0, 4000),
            Oci8DataType::Clob => (SQLT_CLOB, 0, 0, SQLCS_IMPLICIT, 4000),
            Oci8DataType::NClob => (SQLT_CLOB, 0, 0, SQLCS_NCHAR, 4000),
            Oci8DataType::Blob => (SQLT_BLOB, 0, 0, 0, 4000),
            Oci8DataType::Null => (SQLT_CHR, 0, 0, SQLCS_IMPLICIT, 1),
            Oci8DataType::Unknown(code) => (code, 0, 0, 0, 0),
        };

        ColumnDescription {
            name: self.name.clone(),
            data_type,
            data_size: self.size.unwrap_or(default_size),
            precision,
            scale,
            nullable: self.nullable,
            charset_form,
        }
    }

    /// Bring `value` to the column's storage form.
    fn coerce(&self, value: Oci8Value) -> OraResult<Oci8Value> {
        let stored = coerce(value, self.data_type)?;

        if let (Some(size), Oci8Value::Text(text)) = (self.size, &stored) {
            let len = match self.data_type {
                Oci8DataType::Varchar2 | Oci8DataType::Char => text.len(),
                _ => text.chars().count(),
            };

            if len > usize::from(size) {
                return Err(ora(
                    12899,
                    format_args!(
                        "value too large for column \"{}\" (actual: {}, maximum: {})",
                        self.name, len, size
                    ),
                ));
            }
        }

        Ok(stored)
    }
}

/// A result column computed from values rather than a table.
fn describe_value(name: &str, value: &Oci8Value) -> ColumnDescription {
    let (data_type, size, precision, scale) = match value {
        Oci8Value::Null => (SQLT_CHR, 1, 0, 0),
        Oci8Value::Integer(_) => (SQLT_NUM, 22, 18, 0),
        Oci8Value::Number(_) => (SQLT_NUM, 22, 0, -127),
        Oci8Value::Float(_) => (SQLT_IBDOUBLE, 8, 0, 0),
        Oci8Value::Text(text) => (SQLT_CHR, text.len().max(1), 0, 0),
        Oci8Value::Binary(bytes) => (SQLT_BIN, bytes.len().max(1), 0, 0),
        Oci8Value::Timestamp(_) => (SQLT_TIMESTAMP_TZ_INTERNAL, 13, 0, 9),
        Oci8Value::LocalTimestamp(_) => (SQLT_TIMESTAMP_INTERNAL, 11, 0, 9),
        Oci8Value::IntervalDayToSecond(_) => (SQLT_INTERVAL_DS_INTERNAL, 11, 9, 9),
        Oci8Value::IntervalYearToMonth(_) => (SQLT_INTERVAL_YM_INTERNAL, 5, 9, 0),
    };

    ColumnDescription {
        name: name.to_owned(),
        data_type,
        data_size: u16::try_from(size).unwrap_or(u16::MAX),
        precision,
        scale,
        nullable: true,
        charset_form: if data_type == SQLT_CHR { SQLCS_IMPLICIT } else { 0 },
    }
}

fn parse_number(text: &str) -> OraResult<BigDecimal> {
    codec::decode_number_text(text.as_bytes()).map_err(|_| ora(1722, "invalid number"))
}

fn inconsistent(expected: &str, value: &Oci8Value) -> OraError {
    ora(
        932,
        format_args!("inconsistent datatypes: expected {} got {}", expected, value.type_info()),
    )
}

fn coerce(value: Oci8Value, data_type: Oci8DataType) -> OraResult<Oci8Value> {
    if value.is_null() {
        return Ok(value);
    }

    Ok(match data_type {
        Oci8DataType::Number { .. } | Oci8DataType::Float { .. } => Oci8Value::Number(match value {
            Oci8Value::Integer(v) => BigDecimal::from(v),
            Oci8Value::Number(v) => v,
            Oci8Value::Float(v) => {
                BigDecimal::from_f64(v).ok_or_else(|| ora(1722, "invalid number"))?
            }
            Oci8Value::Text(text) => parse_number(&text)?,
            other => return Err(inconsistent("NUMBER", &other)),
        }),

        Oci8DataType::BinaryFloat | Oci8DataType::BinaryDouble => Oci8Value::Float(match value {
            Oci8Value::Integer(v) => v as f64,
            Oci8Value::Float(v) => v,
            Oci8Value::Number(v) => v.to_f64().ok_or_else(|| ora(1722, "invalid number"))?,
            Oci8Value::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| ora(1722, "invalid number"))?,
            other => return Err(inconsistent("BINARY_DOUBLE", &other)),
        }),

        Oci8DataType::Varchar2
        | Oci8DataType::NVarchar2
        | Oci8DataType::Char
        | Oci8DataType::NChar
        | Oci8DataType::Long
        | Oci8DataType::Clob
        | Oci8DataType::NClob
        | Oci8DataType::RowId
        | Oci8DataType::URowId => Oci8Value::Text(render_text(&value)),

        Oci8DataType::Raw | Oci8DataType::LongRaw | Oci8DataType::Blob => match value {
            Oci8Value::Binary(bytes) => Oci8Value::Binary(bytes),
            Oci8Value::Text(text) => Oci8Value::Binary(text.into_bytes()),
            other => return Err(inconsistent("BINARY", &other)),
        },

        Oci8DataType::Date | Oci8DataType::Timestamp => match value {
            Oci8Value::Timestamp(dt) => Oci8Value::LocalTimestamp(dt.naive_local()),
            Oci8Value::LocalTimestamp(dt) => Oci8Value::LocalTimestamp(dt),
            other => return Err(inconsistent("DATE", &other)),
        },

        Oci8DataType::TimestampTz | Oci8DataType::TimestampLtz => match value {
            Oci8Value::Timestamp(dt) => Oci8Value::Timestamp(dt),
            Oci8Value::LocalTimestamp(dt) => Oci8Value::Timestamp(dt.and_utc().fixed_offset()),
            other => return Err(inconsistent("TIMESTAMP WITH TIME ZONE", &other)),
        },

        Oci8DataType::IntervalYearToMonth => match value {
            Oci8Value::IntervalYearToMonth(months) => Oci8Value::IntervalYearToMonth(months),
            other => return Err(inconsistent("INTERVAL YEAR TO MONTH", &other)),
        },

        Oci8DataType::IntervalDayToSecond => match value {
            Oci8Value::IntervalDayToSecond(delta) => Oci8Value::IntervalDayToSecond(delta),
            other => return Err(inconsistent("INTERVAL DAY TO SECOND", &other)),
        },

        Oci8DataType::Null | Oci8DataType::Unknown(_) => value,
    })
}

/// Character form of a value, as the server converts it for `VARCHAR2`.
pub(crate) fn render_text(value: &Oci8Value) -> String {
    match value {
        Oci8Value::Null => String::new(),
        Oci8Value::Integer(v) => v.to_string(),
        Oci8Value::Float(v) => v.to_string(),
        Oci8Value::Number(v) => v.to_string(),
        Oci8Value::Text(text) => text.clone(),
        Oci8Value::Binary(bytes) => bytes.iter().map(|b| format!("{:02X}", b)).collect(),
        Oci8Value::Timestamp(dt) => dt.format("%Y-%m-%d %H:%M:%S%.f %:z").to_string(),
        Oci8Value::LocalTimestamp(dt) => dt.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
        Oci8Value::IntervalDayToSecond(delta) => delta.to_string(),
        Oci8Value::IntervalYearToMonth(months) => {
            let sign = if *months < 0 { '-' } else { '+' };
            format!("{}{:02}-{:02}", sign, months.abs() / 12, months.abs() % 12)
        }
    }
}

/// The external kind behind a `SQLT_*` code on a bind or define.
pub(crate) fn kind_of(sqlt: u16) -> Option<NativeKind> {
    Some(match sqlt {
        SQLT_INT => NativeKind::Integer,
        SQLT_BDOUBLE => NativeKind::Double,
        SQLT_BFLOAT => NativeKind::Float,
        SQLT_CHR | SQLT_STR | SQLT_AFC => NativeKind::Text,
        SQLT_LNG => NativeKind::LongText,
        SQLT_BIN => NativeKind::Binary,
        SQLT_LBI => NativeKind::LongBinary,
        SQLT_DAT => NativeKind::Date,
        SQLT_TIMESTAMP => NativeKind::Timestamp,
        SQLT_TIMESTAMP_TZ => NativeKind::TimestampTz,
        SQLT_INTERVAL_YM => NativeKind::IntervalYearToMonth,
        SQLT_INTERVAL_DS => NativeKind::IntervalDayToSecond,
        SQLT_CLOB => NativeKind::Clob,
        SQLT_BLOB => NativeKind::Blob,
        _ => return None,
    })
}

fn naive_of(value: &Oci8Value) -> Option<NaiveDateTime> {
    match value {
        Oci8Value::Timestamp(dt) => Some(dt.naive_local()),
        Oci8Value::LocalTimestamp(dt) => Some(*dt),
        _ => None,
    }
}

fn integer_of(value: &Oci8Value) -> Option<i64> {
    match value {
        Oci8Value::Integer(v) => Some(*v),
        Oci8Value::Number(v) if v.is_integer() => v.to_i64(),
        Oci8Value::Float(v) if v.fract() == 0.0 => BigDecimal::from_f64(*v)?.to_i64(),
        Oci8Value::Text(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn double_of(value: &Oci8Value) -> Option<f64> {
    match value {
        Oci8Value::Integer(v) => Some(*v as f64),
        Oci8Value::Float(v) => Some(*v),
        Oci8Value::Number(v) => v.to_f64(),
        Oci8Value::Text(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Convert a non-null value into the external representation `kind`, the
/// way the server does when filling a define or an output bind.
pub(crate) fn encode_as(value: &Oci8Value, kind: NativeKind) -> OraResult<Vec<u8>> {
    let invalid = || ora(1722, "invalid number");
    let unsupported = || ora(1460, "unimplemented or unreasonable conversion requested");

    Ok(match kind {
        NativeKind::Integer => codec::encode_i64(integer_of(value).ok_or_else(invalid)?).to_vec(),
        NativeKind::Double => codec::encode_f64(double_of(value).ok_or_else(invalid)?).to_vec(),
        NativeKind::Float => codec::encode_f32(double_of(value).ok_or_else(invalid)? as f32).to_vec(),
        NativeKind::NumberText | NativeKind::Text | NativeKind::LongText => {
            render_text(value).into_bytes()
        }
        NativeKind::Binary | NativeKind::LongBinary => match value {
            Oci8Value::Binary(bytes) => bytes.clone(),
            Oci8Value::Text(text) => text.clone().into_bytes(),
            _ => return Err(unsupported()),
        },
        NativeKind::Date => {
            let naive = naive_of(value).ok_or_else(unsupported)?;
            codec::encode_date(&naive).map_err(|_| unsupported())?.to_vec()
        }
        NativeKind::Timestamp => {
            let naive = naive_of(value).ok_or_else(unsupported)?;
            codec::encode_timestamp(&naive).map_err(|_| unsupported())?.to_vec()
        }
        NativeKind::TimestampTz => {
            let dt = match value {
                Oci8Value::Timestamp(dt) => *dt,
                Oci8Value::LocalTimestamp(dt) => dt.and_utc().fixed_offset(),
                _ => return Err(unsupported()),
            };
            codec::encode_timestamp_tz(&dt).map_err(|_| unsupported())?.to_vec()
        }
        NativeKind::IntervalYearToMonth => match value {
            Oci8Value::IntervalYearToMonth(months) => codec::encode_interval_ym(*months).to_vec(),
            _ => return Err(unsupported()),
        },
        NativeKind::IntervalDayToSecond => match value {
            Oci8Value::IntervalDayToSecond(delta) => {
                codec::encode_interval_ds(delta).map_err(|_| unsupported())?.to_vec()
            }
            _ => return Err(unsupported()),
        },
        NativeKind::Clob | NativeKind::Blob => return Err(unsupported()),
    })
}

/// Bytes a LOB locator points at after a fetch.
pub(crate) fn lob_bytes(value: &Oci8Value) -> Vec<u8> {
    match value {
        Oci8Value::Binary(bytes) => bytes.clone(),
        other => render_text(other).into_bytes(),
    }
}

#[derive(Debug, Clone)]
struct StoredRow {
    row_id: String,
    values: Vec<Oci8Value>,
}

#[derive(Debug, Clone)]
struct Table {
    columns: Vec<MockColumn>,
    rows: Vec<StoredRow>,
}

impl Table {
    fn column(&self, name: &str) -> OraResult<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| ora(904, format_args!("\"{}\": invalid identifier", name)))
    }

    fn check_constraints(&self, table: &str, values: &[Oci8Value], skip: Option<usize>) -> OraResult<()> {
        for (index, column) in self.columns.iter().enumerate() {
            let value = &values[index];

            if !column.nullable && value.is_null() {
                return Err(ora(
                    1400,
                    format_args!("cannot insert NULL into (\"{}\".\"{}\")", table, column.name),
                ));
            }

            if column.unique && !value.is_null() {
                let duplicate = self
                    .rows
                    .iter()
                    .enumerate()
                    .any(|(i, row)| Some(i) != skip && row.values[index] == *value);

                if duplicate {
                    return Err(ora(
                        1,
                        format_args!("unique constraint ({}.{}) violated", table, column.name),
                    ));
                }
            }
        }

        Ok(())
    }
}

/// One change made inside a transaction, in the form needed to revert it.
#[derive(Debug, Clone)]
pub(crate) enum Undo {
    Inserted { table: String, row_id: String },
    Updated { table: String, row_id: String, values: Vec<Oci8Value> },
    Deleted { table: String, index: usize, row_id: String, values: Vec<Oci8Value> },
}

/// Rows produced by a query, consumed by fetches.
#[derive(Debug, Clone, Default)]
pub(crate) struct ResultSet {
    pub(crate) columns: Vec<ColumnDescription>,
    pub(crate) rows: Vec<Vec<Oci8Value>>,
    pub(crate) cursor: usize,
}

/// What a non-query execution did.
#[derive(Debug, Clone, Default)]
pub(crate) struct Effect {
    pub(crate) rows: u64,
    pub(crate) row_id: Option<String>,
    /// Final values of placeholder arguments of a procedure call.
    pub(crate) outputs: Vec<(String, Oci8Value)>,
}

/// Looks up the value bound to a placeholder name.
pub(crate) struct Params<'a> {
    pub(crate) names: &'a [String],
    pub(crate) values: &'a [Oci8Value],
}

impl Params<'_> {
    fn eval(&self, operand: &Operand) -> Oci8Value {
        match operand {
            Operand::Literal(value) => value.clone(),
            Operand::Placeholder(name) => self
                .names
                .iter()
                .position(|n| n.eq_ignore_ascii_case(name))
                .and_then(|index| self.values.get(index))
                .cloned()
                .unwrap_or_default(),
        }
    }
}

#[derive(Default)]
pub(crate) struct Database {
    tables: BTreeMap<String, Table>,
    procedures: HashMap<String, Procedure>,
    next_row: u64,
}

impl Debug for Database {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("tables", &self.tables.keys().collect::<Vec<_>>())
            .field("procedures", &self.procedures.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Database {
    pub(crate) fn new() -> Self {
        let mut db = Database::default();

        db.create_table("DUAL", vec![MockColumn::new("DUMMY", Oci8DataType::Varchar2).size(1)]);
        if let Some(dual) = db.tables.get_mut("DUAL") {
            dual.rows.push(StoredRow {
                row_id: "AAAAB0AABAAAAB0AAA".into(),
                values: vec![Oci8Value::Text("X".into())],
            });
        }

        db
    }

    pub(crate) fn create_table(&mut self, name: &str, columns: Vec<MockColumn>) {
        self.tables.insert(
            name.to_ascii_uppercase(),
            Table {
                columns,
                rows: Vec::new(),
            },
        );
    }

    pub(crate) fn register_procedure(&mut self, name: &str, procedure: Procedure) {
        self.procedures.insert(name.to_ascii_uppercase(), procedure);
    }

    pub(crate) fn rows(&self, table: &str) -> Option<Vec<Vec<Oci8Value>>> {
        self.tables
            .get(&table.to_ascii_uppercase())
            .map(|t| t.rows.iter().map(|row| row.values.clone()).collect())
    }

    fn next_row_id(&mut self) -> String {
        self.next_row += 1;
        format!("AAAR3sAAEAAAAC{:04X}", self.next_row & 0xffff)
    }

    fn table(&self, name: &str) -> OraResult<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| ora(942, "table or view does not exist"))
    }

    fn table_mut(&mut self, name: &str) -> OraResult<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| ora(942, "table or view does not exist"))
    }

    /// Indices of the rows every condition holds for.
    fn filter(table: &Table, conditions: &[Condition], params: &Params<'_>) -> OraResult<Vec<usize>> {
        let mut resolved = Vec::with_capacity(conditions.len());

        for condition in conditions {
            let index = table.column(&condition.column)?;
            let value = coerce(params.eval(&condition.operand), table.columns[index].data_type)?;
            resolved.push((index, value));
        }

        Ok(table
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| {
                resolved
                    .iter()
                    .all(|(index, value)| !value.is_null() && row.values[*index] == *value)
            })
            .map(|(i, _)| i)
            .collect())
    }

    /// Insert a row outside of any transaction.
    pub(crate) fn insert_row(&mut self, table: &str, values: Vec<Oci8Value>) -> OraResult<()> {
        let name = table.to_ascii_uppercase();
        let row_id = self.next_row_id();
        let target = self.table_mut(&name)?;

        if values.len() != target.columns.len() {
            return Err(ora(947, "not enough values"));
        }

        let values = target
            .columns
            .iter()
            .zip(values)
            .map(|(column, value)| column.coerce(value))
            .collect::<OraResult<Vec<_>>>()?;

        target.check_constraints(&name, &values, None)?;
        target.rows.push(StoredRow { row_id, values });

        Ok(())
    }

    pub(crate) fn query(&self, sql: &Sql, params: &Params<'_>) -> OraResult<ResultSet> {
        let (items, table_name, conditions) = match sql {
            Sql::Select {
                items,
                table,
                conditions,
            } => (items, table, conditions),
            _ => return Err(ora(24333, "zero iteration count")),
        };

        let table = self.table(table_name)?;
        let matched = Self::filter(table, conditions, params)?;

        if items.iter().any(|item| *item == Item::Count) {
            let mut columns = Vec::new();
            let mut row = Vec::new();

            for item in items {
                match item {
                    Item::Count => {
                        let value = Oci8Value::Integer(matched.len() as i64);
                        columns.push(describe_value("COUNT(*)", &value));
                        row.push(value);
                    }
                    Item::Operand { operand, label } => {
                        let value = params.eval(operand);
                        columns.push(describe_value(label, &value));
                        row.push(value);
                    }
                    Item::Star | Item::Column { .. } => {
                        return Err(ora(937, "not a single-group group function"))
                    }
                }
            }

            return Ok(ResultSet {
                columns,
                rows: vec![row],
                cursor: 0,
            });
        }

        enum Source {
            Column(usize),
            Value(Oci8Value),
        }

        let mut columns = Vec::new();
        let mut sources = Vec::new();

        for item in items {
            match item {
                Item::Star => {
                    for (index, column) in table.columns.iter().enumerate() {
                        columns.push(column.describe());
                        sources.push(Source::Column(index));
                    }
                }
                Item::Column { name, label } => {
                    let index = table.column(name)?;
                    let mut desc = table.columns[index].describe();
                    desc.name = label.clone();
                    columns.push(desc);
                    sources.push(Source::Column(index));
                }
                Item::Operand { operand, label } => {
                    let value = params.eval(operand);
                    columns.push(describe_value(label, &value));
                    sources.push(Source::Value(value));
                }
                Item::Count => {}
            }
        }

        let rows = matched
            .into_iter()
            .map(|i| {
                sources
                    .iter()
                    .map(|source| match source {
                        Source::Column(index) => table.rows[i].values[*index].clone(),
                        Source::Value(value) => value.clone(),
                    })
                    .collect()
            })
            .collect();

        Ok(ResultSet {
            columns,
            rows,
            cursor: 0,
        })
    }

    /// Run a DML statement or procedure call once, recording what changed
    /// in `undo`.
    pub(crate) fn execute(
        &mut self,
        sql: &Sql,
        params: &Params<'_>,
        undo: &mut Vec<Undo>,
    ) -> OraResult<Effect> {
        match sql {
            Sql::Select { .. } => Err(ora(900, "invalid SQL statement")),

            Sql::Insert {
                table,
                columns,
                values,
            } => {
                let row_id = self.next_row_id();
                let target = self.table_mut(table)?;

                let indices = match columns {
                    Some(names) => names
                        .iter()
                        .map(|name| target.column(name))
                        .collect::<OraResult<Vec<_>>>()?,
                    None => (0..target.columns.len()).collect(),
                };

                if values.len() > indices.len() {
                    return Err(ora(913, "too many values"));
                }
                if values.len() < indices.len() {
                    return Err(ora(947, "not enough values"));
                }

                let mut row = vec![Oci8Value::Null; target.columns.len()];

                for (index, operand) in indices.into_iter().zip(values) {
                    row[index] = target.columns[index].coerce(params.eval(operand))?;
                }

                target.check_constraints(table, &row, None)?;
                target.rows.push(StoredRow {
                    row_id: row_id.clone(),
                    values: row,
                });

                undo.push(Undo::Inserted {
                    table: table.clone(),
                    row_id: row_id.clone(),
                });

                Ok(Effect {
                    rows: 1,
                    row_id: Some(row_id),
                    outputs: Vec::new(),
                })
            }

            Sql::Update {
                table,
                assignments,
                conditions,
            } => {
                let target = self.table_mut(table)?;
                let matched = Self::filter(target, conditions, params)?;

                let mut changes = Vec::with_capacity(assignments.len());
                for (name, operand) in assignments {
                    let index = target.column(name)?;
                    changes.push((index, target.columns[index].coerce(params.eval(operand))?));
                }

                let mut effect = Effect::default();

                for i in matched {
                    let mut values = target.rows[i].values.clone();

                    for (index, value) in &changes {
                        if value.is_null() && !target.columns[*index].nullable {
                            return Err(ora(
                                1407,
                                format_args!(
                                    "cannot update (\"{}\".\"{}\") to NULL",
                                    table, target.columns[*index].name
                                ),
                            ));
                        }
                        values[*index] = value.clone();
                    }

                    target.check_constraints(table, &values, Some(i))?;

                    let row = &mut target.rows[i];
                    let old = std::mem::replace(&mut row.values, values);

                    undo.push(Undo::Updated {
                        table: table.clone(),
                        row_id: row.row_id.clone(),
                        values: old,
                    });

                    effect.rows += 1;
                    effect.row_id = Some(row.row_id.clone());
                }

                Ok(effect)
            }

            Sql::Delete { table, conditions } => {
                let target = self.table_mut(table)?;
                let matched = Self::filter(target, conditions, params)?;
                let mut effect = Effect::default();

                for i in matched.into_iter().rev() {
                    let row = target.rows.remove(i);

                    effect.rows += 1;
                    effect.row_id = Some(row.row_id.clone());

                    undo.push(Undo::Deleted {
                        table: table.clone(),
                        index: i,
                        row_id: row.row_id,
                        values: row.values,
                    });
                }

                Ok(effect)
            }

            Sql::Call { procedure, args } => {
                let body = self.procedures.get(procedure).cloned().ok_or_else(|| {
                    ora(
                        6550,
                        format_args!(
                            "line 1, column 7:\nPLS-00201: identifier '{}' must be declared",
                            procedure
                        ),
                    )
                })?;

                let mut values: Vec<Oci8Value> = args.iter().map(|arg| params.eval(arg)).collect();

                body(&mut values).map_err(|(code, text)| ora(code, text))?;

                let outputs = args
                    .iter()
                    .zip(values)
                    .filter_map(|(arg, value)| match arg {
                        Operand::Placeholder(name) => Some((name.clone(), value)),
                        Operand::Literal(_) => None,
                    })
                    .collect();

                Ok(Effect {
                    rows: 1,
                    row_id: None,
                    outputs,
                })
            }
        }
    }

    /// Revert the changes in `undo` past `mark`, newest first.
    pub(crate) fn rollback_to(&mut self, undo: &mut Vec<Undo>, mark: usize) {
        while undo.len() > mark {
            let Some(change) = undo.pop() else { break };

            match change {
                Undo::Inserted { table, row_id } => {
                    if let Some(t) = self.tables.get_mut(&table) {
                        t.rows.retain(|row| row.row_id != row_id);
                    }
                }
                Undo::Updated {
                    table,
                    row_id,
                    values,
                } => {
                    if let Some(row) = self
                        .tables
                        .get_mut(&table)
                        .and_then(|t| t.rows.iter_mut().find(|row| row.row_id == row_id))
                    {
                        row.values = values;
                    }
                }
                Undo::Deleted {
                    table,
                    index,
                    row_id,
                    values,
                } => {
                    if let Some(t) = self.tables.get_mut(&table) {
                        let index = index.min(t.rows.len());
                        t.rows.insert(index, StoredRow { row_id, values });
                    }
                }
            }
        }
    }
}

/// Decode the bytes of an input bind as the server reads them.
pub(crate) fn decode_bind(data_type: u16, bytes: &[u8]) -> OraResult<Oci8Value> {
    let kind = kind_of(data_type)
        .ok_or_else(|| ora(3115, format_args!("unsupported network datatype {}", data_type)))?;

    kind.decode(bytes, Tz::UTC)
        .map_err(|_| ora(1460, "unimplemented or unreasonable conversion requested"))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::oci8::mock::parser::parse;

    fn people() -> Database {
        let mut db = Database::new();
        db.create_table(
            "people",
            vec![
                MockColumn::new("id", Oci8DataType::Number { precision: 10, scale: 0 }).unique(),
                MockColumn::new("name", Oci8DataType::Varchar2).size(5).not_null(),
            ],
        );
        db.insert_row("people", vec![Oci8Value::Integer(1), Oci8Value::Text("ann".into())])
            .unwrap();
        db.insert_row("people", vec![Oci8Value::Integer(2), Oci8Value::Text("bob".into())])
            .unwrap();
        db
    }

    fn no_params() -> Params<'static> {
        Params {
            names: &[],
            values: &[],
        }
    }

    #[test]
    fn it_filters_rows_by_equality() {
        let db = people();
        let sql = parse("SELECT name FROM people WHERE id = :1").unwrap();
        let names = sql.placeholders();

        let result = db
            .query(
                &sql,
                &Params {
                    names: &names,
                    values: &[Oci8Value::Text("2".into())],
                },
            )
            .unwrap();

        assert_eq!(result.rows, vec![vec![Oci8Value::Text("bob".into())]]);
        assert_eq!(result.columns[0].name, "NAME");
        assert_eq!(result.columns[0].data_size, 5);
    }

    #[test]
    fn it_enforces_constraints() {
        let mut db = people();
        let mut undo = Vec::new();

        let err = db
            .execute(&parse("INSERT INTO people VALUES (1, 'cy')").unwrap(), &no_params(), &mut undo)
            .unwrap_err();
        assert_eq!(err.code, 1);

        let err = db
            .execute(&parse("INSERT INTO people (id) VALUES (3)").unwrap(), &no_params(), &mut undo)
            .unwrap_err();
        assert_eq!(err.code, 1400);

        let err = db
            .execute(
                &parse("INSERT INTO people VALUES (3, 'too long')").unwrap(),
                &no_params(),
                &mut undo,
            )
            .unwrap_err();
        assert_eq!(err.code, 12899);

        assert!(undo.is_empty());
    }

    #[test]
    fn it_reverts_changes_newest_first() {
        let mut db = people();
        let mut undo = Vec::new();

        db.execute(&parse("UPDATE people SET name = 'zed' WHERE id = 1").unwrap(), &no_params(), &mut undo)
            .unwrap();
        db.execute(&parse("DELETE FROM people").unwrap(), &no_params(), &mut undo)
            .unwrap();
        db.execute(&parse("INSERT INTO people VALUES (9, 'new')").unwrap(), &no_params(), &mut undo)
            .unwrap();

        db.rollback_to(&mut undo, 0);

        assert_eq!(
            db.rows("people").unwrap(),
            vec![
                vec![Oci8Value::Number(1.into()), Oci8Value::Text("ann".into())],
                vec![Oci8Value::Number(2.into()), Oci8Value::Text("bob".into())],
            ]
        );
    }

    #[test]
    fn it_converts_values_for_defines() {
        let number = Oci8Value::Number(BigDecimal::from_str("42").unwrap());

        assert_eq!(encode_as(&number, NativeKind::Integer).unwrap(), 42_i64.to_ne_bytes());
        assert_eq!(encode_as(&number, NativeKind::Text).unwrap(), b"42");
        assert_eq!(
            encode_as(&Oci8Value::Text("x".into()), NativeKind::Integer).unwrap_err().code,
            1722
        );
    }

    #[test]
    fn it_counts_matching_rows() {
        let db = people();
        let result = db
            .query(&parse("SELECT COUNT(*) FROM people").unwrap(), &no_params())
            .unwrap();

        assert_eq!(result.rows, vec![vec![Oci8Value::Integer(2)]]);
    }
}
