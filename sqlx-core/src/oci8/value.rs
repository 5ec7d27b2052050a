use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeDelta};

use crate::oci8::Oci8TypeInfo;

/// A single value, as fetched from a column or supplied as a parameter.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Oci8Value {
    #[default]
    Null,
    /// `NUMBER` with scale 0 and at most 18 digits.
    Integer(i64),
    /// `BINARY_FLOAT` / `BINARY_DOUBLE`.
    Float(f64),
    /// Any other `NUMBER` or `FLOAT`, without loss of precision.
    Number(BigDecimal),
    Text(String),
    Binary(Vec<u8>),
    /// A point in time with its offset. Columns without a zone are read in
    /// the connection's configured time zone.
    Timestamp(DateTime<FixedOffset>),
    /// A wall clock time without zone, bound as a plain `TIMESTAMP`.
    LocalTimestamp(NaiveDateTime),
    IntervalDayToSecond(TimeDelta),
    /// Signed number of months.
    IntervalYearToMonth(i32),
}

impl Oci8Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Oci8Value::Null)
    }

    pub fn type_info(&self) -> Oci8TypeInfo {
        match self {
            Oci8Value::Null => Oci8TypeInfo::NULL,
            Oci8Value::Integer(_) | Oci8Value::Number(_) => Oci8TypeInfo::NUMBER,
            Oci8Value::Float(_) => Oci8TypeInfo::BINARY_DOUBLE,
            Oci8Value::Text(_) => Oci8TypeInfo::VARCHAR2,
            Oci8Value::Binary(_) => Oci8TypeInfo::RAW,
            Oci8Value::Timestamp(_) => Oci8TypeInfo::TIMESTAMP_TZ,
            Oci8Value::LocalTimestamp(_) => Oci8TypeInfo::TIMESTAMP,
            Oci8Value::IntervalDayToSecond(_) => Oci8TypeInfo::INTERVAL_DS,
            Oci8Value::IntervalYearToMonth(_) => Oci8TypeInfo::INTERVAL_YM,
        }
    }

    /// Discriminant used to check that every row of a batch binds the same
    /// kind of value to a parameter. Null matches anything.
    pub(crate) fn same_kind(&self, other: &Oci8Value) -> bool {
        self.is_null()
            || other.is_null()
            || std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}
