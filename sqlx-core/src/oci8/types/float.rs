use bigdecimal::ToPrimitive;

use crate::error::BoxDynError;
use crate::oci8::types::{mismatch, Decode, Encode, Type};
use crate::oci8::{Oci8TypeInfo, Oci8Value};

impl Type for f64 {
    fn type_info() -> Oci8TypeInfo {
        Oci8TypeInfo::BINARY_DOUBLE
    }

    fn compatible(ty: &Oci8TypeInfo) -> bool {
        ty.is_numeric()
    }
}

impl Type for f32 {
    fn type_info() -> Oci8TypeInfo {
        Oci8TypeInfo::BINARY_FLOAT
    }

    fn compatible(ty: &Oci8TypeInfo) -> bool {
        ty.is_numeric()
    }
}

impl Encode for f64 {
    fn encode_by_ref(&self) -> Oci8Value {
        Oci8Value::Float(*self)
    }
}

impl Encode for f32 {
    fn encode_by_ref(&self) -> Oci8Value {
        Oci8Value::Float(f64::from(*self))
    }
}

impl Decode for f64 {
    fn decode(value: &Oci8Value) -> Result<Self, BoxDynError> {
        match value {
            Oci8Value::Float(v) => Ok(*v),
            Oci8Value::Integer(v) => Ok(*v as f64),
            Oci8Value::Number(v) => v
                .to_f64()
                .ok_or_else(|| format!("NUMBER {} does not fit a double", v).into()),
            _ => Err(mismatch("a float", value)),
        }
    }
}

impl Decode for f32 {
    fn decode(value: &Oci8Value) -> Result<Self, BoxDynError> {
        Ok(f64::decode(value)? as f32)
    }
}
