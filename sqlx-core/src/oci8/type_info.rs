use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::oci8::native::constants::*;
use crate::oci8::native::ColumnDescription;
use crate::type_info::TypeInfo;

/// Oracle column types, as reported by describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Oci8DataType {
    Varchar2,
    NVarchar2,
    Char,
    NChar,
    /// `NUMBER(p, s)`; precision `0` means unconstrained.
    Number { precision: i16, scale: i8 },
    /// `FLOAT(p)`, a `NUMBER` with binary precision.
    Float { precision: i16 },
    BinaryFloat,
    BinaryDouble,
    Long,
    LongRaw,
    Raw,
    Date,
    Timestamp,
    TimestampTz,
    TimestampLtz,
    IntervalYearToMonth,
    IntervalDayToSecond,
    RowId,
    URowId,
    Clob,
    NClob,
    Blob,
    /// Type of a bind whose value is null.
    Null,
    /// A native type code the driver has no mapping for.
    Unknown(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Oci8TypeInfo(pub(crate) Oci8DataType);

impl Oci8TypeInfo {
    pub const VARCHAR2: Self = Self(Oci8DataType::Varchar2);
    pub const NUMBER: Self = Self(Oci8DataType::Number {
        precision: 0,
        scale: 0,
    });
    pub const BINARY_FLOAT: Self = Self(Oci8DataType::BinaryFloat);
    pub const BINARY_DOUBLE: Self = Self(Oci8DataType::BinaryDouble);
    pub const RAW: Self = Self(Oci8DataType::Raw);
    pub const DATE: Self = Self(Oci8DataType::Date);
    pub const TIMESTAMP: Self = Self(Oci8DataType::Timestamp);
    pub const TIMESTAMP_TZ: Self = Self(Oci8DataType::TimestampTz);
    pub const INTERVAL_YM: Self = Self(Oci8DataType::IntervalYearToMonth);
    pub const INTERVAL_DS: Self = Self(Oci8DataType::IntervalDayToSecond);
    pub const CLOB: Self = Self(Oci8DataType::Clob);
    pub const BLOB: Self = Self(Oci8DataType::Blob);
    pub const NULL: Self = Self(Oci8DataType::Null);

    pub fn data_type(&self) -> Oci8DataType {
        self.0
    }

    pub(crate) fn from_description(desc: &ColumnDescription) -> Self {
        let nchar = desc.charset_form == SQLCS_NCHAR;

        Self(match desc.data_type {
            SQLT_CHR | SQLT_STR if nchar => Oci8DataType::NVarchar2,
            SQLT_CHR | SQLT_STR => Oci8DataType::Varchar2,
            SQLT_AFC if nchar => Oci8DataType::NChar,
            SQLT_AFC => Oci8DataType::Char,
            SQLT_NUM | SQLT_FLT if desc.scale == -127 && desc.precision != 0 => {
                Oci8DataType::Float {
                    precision: desc.precision,
                }
            }
            SQLT_NUM | SQLT_INT => Oci8DataType::Number {
                precision: desc.precision,
                scale: desc.scale,
            },
            SQLT_FLT => Oci8DataType::Float {
                precision: desc.precision,
            },
            SQLT_IBFLOAT | SQLT_BFLOAT => Oci8DataType::BinaryFloat,
            SQLT_IBDOUBLE | SQLT_BDOUBLE => Oci8DataType::BinaryDouble,
            SQLT_LNG => Oci8DataType::Long,
            SQLT_LBI => Oci8DataType::LongRaw,
            SQLT_BIN => Oci8DataType::Raw,
            SQLT_DAT => Oci8DataType::Date,
            SQLT_TIMESTAMP | SQLT_TIMESTAMP_INTERNAL => Oci8DataType::Timestamp,
            SQLT_TIMESTAMP_TZ | SQLT_TIMESTAMP_TZ_INTERNAL => Oci8DataType::TimestampTz,
            SQLT_TIMESTAMP_LTZ | SQLT_TIMESTAMP_LTZ_INTERNAL => Oci8DataType::TimestampLtz,
            SQLT_INTERVAL_YM | SQLT_INTERVAL_YM_INTERNAL => Oci8DataType::IntervalYearToMonth,
            SQLT_INTERVAL_DS | SQLT_INTERVAL_DS_INTERNAL => Oci8DataType::IntervalDayToSecond,
            SQLT_RID | SQLT_RDD => Oci8DataType::RowId,
            SQLT_UROWID => Oci8DataType::URowId,
            SQLT_CLOB if nchar => Oci8DataType::NClob,
            SQLT_CLOB => Oci8DataType::Clob,
            SQLT_BLOB => Oci8DataType::Blob,
            other => Oci8DataType::Unknown(other),
        })
    }

    pub(crate) fn is_character(&self) -> bool {
        matches!(
            self.0,
            Oci8DataType::Varchar2
                | Oci8DataType::NVarchar2
                | Oci8DataType::Char
                | Oci8DataType::NChar
                | Oci8DataType::Long
                | Oci8DataType::Clob
                | Oci8DataType::NClob
                | Oci8DataType::RowId
                | Oci8DataType::URowId
        )
    }

    pub(crate) fn is_numeric(&self) -> bool {
        matches!(
            self.0,
            Oci8DataType::Number { .. }
                | Oci8DataType::Float { .. }
                | Oci8DataType::BinaryFloat
                | Oci8DataType::BinaryDouble
        )
    }

    pub(crate) fn is_binary(&self) -> bool {
        matches!(
            self.0,
            Oci8DataType::Raw | Oci8DataType::LongRaw | Oci8DataType::Blob
        )
    }

    pub(crate) fn is_datetime(&self) -> bool {
        matches!(
            self.0,
            Oci8DataType::Date
                | Oci8DataType::Timestamp
                | Oci8DataType::TimestampTz
                | Oci8DataType::TimestampLtz
        )
    }

    /// `true` for unmapped types, which are fetched as text.
    pub(crate) fn is_unknown(&self) -> bool {
        matches!(self.0, Oci8DataType::Unknown(_))
    }
}

impl TypeInfo for Oci8TypeInfo {
    fn is_null(&self) -> bool {
        matches!(self.0, Oci8DataType::Null)
    }

    fn name(&self) -> &str {
        match self.0 {
            Oci8DataType::Varchar2 => "VARCHAR2",
            Oci8DataType::NVarchar2 => "NVARCHAR2",
            Oci8DataType::Char => "CHAR",
            Oci8DataType::NChar => "NCHAR",
            Oci8DataType::Number { .. } => "NUMBER",
            Oci8DataType::Float { .. } => "FLOAT",
            Oci8DataType::BinaryFloat => "BINARY_FLOAT",
            Oci8DataType::BinaryDouble => "BINARY_DOUBLE",
            Oci8DataType::Long => "LONG",
            Oci8DataType::LongRaw => "LONG RAW",
            Oci8DataType::Raw => "RAW",
            Oci8DataType::Date => "DATE",
            Oci8DataType::Timestamp => "TIMESTAMP",
            Oci8DataType::TimestampTz => "TIMESTAMP WITH TIME ZONE",
            Oci8DataType::TimestampLtz => "TIMESTAMP WITH LOCAL TIME ZONE",
            Oci8DataType::IntervalYearToMonth => "INTERVAL YEAR TO MONTH",
            Oci8DataType::IntervalDayToSecond => "INTERVAL DAY TO SECOND",
            Oci8DataType::RowId => "ROWID",
            Oci8DataType::URowId => "UROWID",
            Oci8DataType::Clob => "CLOB",
            Oci8DataType::NClob => "NCLOB",
            Oci8DataType::Blob => "BLOB",
            Oci8DataType::Null => "NULL",
            Oci8DataType::Unknown(_) => "UNKNOWN",
        }
    }
}

impl Display for Oci8TypeInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.0 {
            Oci8DataType::Number {
                precision: p @ 1..,
                scale,
            } => write!(f, "NUMBER({},{})", p, scale),
            Oci8DataType::Unknown(code) => write!(f, "UNKNOWN({})", code),
            _ => f.write_str(self.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn describe(data_type: u16, precision: i16, scale: i8, charset_form: u8) -> ColumnDescription {
        ColumnDescription {
            name: "C".into(),
            data_type,
            data_size: 22,
            precision,
            scale,
            nullable: true,
            charset_form,
        }
    }

    #[test]
    fn it_names_described_columns() {
        let ty = Oci8TypeInfo::from_description(&describe(SQLT_NUM, 10, 2, SQLCS_IMPLICIT));
        assert_eq!(ty.to_string(), "NUMBER(10,2)");

        let ty = Oci8TypeInfo::from_description(&describe(SQLT_NUM, 126, -127, SQLCS_IMPLICIT));
        assert_eq!(ty.name(), "FLOAT");

        let ty = Oci8TypeInfo::from_description(&describe(SQLT_CHR, 0, 0, SQLCS_NCHAR));
        assert_eq!(ty.name(), "NVARCHAR2");

        let ty = Oci8TypeInfo::from_description(&describe(SQLT_TIMESTAMP_TZ_INTERNAL, 0, 6, 0));
        assert_eq!(ty.name(), "TIMESTAMP WITH TIME ZONE");

        let ty = Oci8TypeInfo::from_description(&describe(999, 0, 0, 0));
        assert!(ty.is_unknown());
        assert_eq!(ty.to_string(), "UNKNOWN(999)");
    }
}
