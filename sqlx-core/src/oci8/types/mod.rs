//! Conversions between Rust types and Oracle values.
//!
//! | Rust type                       | Oracle type(s)                              |
//! |---------------------------------|---------------------------------------------|
//! | `bool`                          | NUMBER (0 or 1)                             |
//! | `i8`..`i64`, `u8`..`u64`        | NUMBER                                      |
//! | `f32`, `f64`                    | BINARY_FLOAT, BINARY_DOUBLE, NUMBER         |
//! | `&str`, `String`                | VARCHAR2, CHAR, NVARCHAR2, CLOB, LONG, ...  |
//! | `&[u8]`, `Vec<u8>`              | RAW, LONG RAW, BLOB                         |
//! | `bigdecimal::BigDecimal`        | NUMBER                                      |
//! | `chrono::DateTime<FixedOffset>` | TIMESTAMP WITH TIME ZONE, DATE, TIMESTAMP   |
//! | `chrono::DateTime<Utc>`         | TIMESTAMP WITH TIME ZONE, DATE, TIMESTAMP   |
//! | `chrono::NaiveDateTime`         | TIMESTAMP, DATE                             |
//! | `chrono::NaiveDate`             | DATE                                        |
//! | `chrono::TimeDelta`             | INTERVAL DAY TO SECOND                      |
//!
//! `DATE` and `TIMESTAMP` columns are read in the connection's time zone.
//!
//! # Nullable
//!
//! `Option<T>` is supported where `T` implements `Type`. An `Option<T>`
//! represents a potentially `NULL` value.

use crate::error::BoxDynError;
use crate::oci8::{Oci8TypeInfo, Oci8Value};

mod bigdecimal;
mod bool;
mod bytes;
mod chrono;
mod float;
mod int;
mod str;

/// Indicates that a SQL type is supported for a Rust type.
pub trait Type {
    /// The SQL type a value of this type is sent as.
    fn type_info() -> Oci8TypeInfo;

    /// Whether a column of type `ty` can be decoded into this type.
    fn compatible(ty: &Oci8TypeInfo) -> bool {
        *ty == Self::type_info()
    }
}

/// Encode a single value to be sent to the database.
pub trait Encode {
    fn encode(self) -> Oci8Value
    where
        Self: Sized,
    {
        self.encode_by_ref()
    }

    fn encode_by_ref(&self) -> Oci8Value;
}

/// Decode a single value from the database.
pub trait Decode: Sized {
    fn decode(value: &Oci8Value) -> Result<Self, BoxDynError>;
}

pub(crate) fn unexpected_null() -> BoxDynError {
    "unexpected null; try decoding as an `Option`".into()
}

pub(crate) fn mismatch(expected: &str, value: &Oci8Value) -> BoxDynError {
    match value {
        Oci8Value::Null => unexpected_null(),
        _ => format!("cannot decode {} from {:?}", expected, value.type_info().data_type()).into(),
    }
}

impl<T: Type> Type for Option<T> {
    fn type_info() -> Oci8TypeInfo {
        T::type_info()
    }

    fn compatible(ty: &Oci8TypeInfo) -> bool {
        T::compatible(ty)
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode(self) -> Oci8Value {
        match self {
            Some(v) => v.encode(),
            None => Oci8Value::Null,
        }
    }

    fn encode_by_ref(&self) -> Oci8Value {
        match self {
            Some(v) => v.encode_by_ref(),
            None => Oci8Value::Null,
        }
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(value: &Oci8Value) -> Result<Self, BoxDynError> {
        if value.is_null() {
            return Ok(None);
        }

        T::decode(value).map(Some)
    }
}

impl<T: Encode + ?Sized> Encode for &'_ T {
    fn encode_by_ref(&self) -> Oci8Value {
        (**self).encode_by_ref()
    }
}

impl Type for Oci8Value {
    fn type_info() -> Oci8TypeInfo {
        Oci8TypeInfo::NULL
    }

    fn compatible(_: &Oci8TypeInfo) -> bool {
        true
    }
}

impl Encode for Oci8Value {
    fn encode(self) -> Oci8Value {
        self
    }

    fn encode_by_ref(&self) -> Oci8Value {
        self.clone()
    }
}

impl Decode for Oci8Value {
    fn decode(value: &Oci8Value) -> Result<Self, BoxDynError> {
        Ok(value.clone())
    }
}
