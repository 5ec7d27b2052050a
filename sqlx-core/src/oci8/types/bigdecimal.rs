use bigdecimal::{BigDecimal, FromPrimitive};

use crate::error::BoxDynError;
use crate::oci8::types::{mismatch, Decode, Encode, Type};
use crate::oci8::{Oci8TypeInfo, Oci8Value};

impl Type for BigDecimal {
    fn type_info() -> Oci8TypeInfo {
        Oci8TypeInfo::NUMBER
    }

    fn compatible(ty: &Oci8TypeInfo) -> bool {
        ty.is_numeric()
    }
}

impl Encode for BigDecimal {
    fn encode(self) -> Oci8Value {
        Oci8Value::Number(self)
    }

    fn encode_by_ref(&self) -> Oci8Value {
        Oci8Value::Number(self.clone())
    }
}

impl Decode for BigDecimal {
    fn decode(value: &Oci8Value) -> Result<Self, BoxDynError> {
        match value {
            Oci8Value::Number(v) => Ok(v.clone()),
            Oci8Value::Integer(v) => Ok(BigDecimal::from(*v)),
            Oci8Value::Float(v) => BigDecimal::from_f64(*v)
                .ok_or_else(|| format!("{} has no decimal representation", v).into()),
            _ => Err(mismatch("a decimal", value)),
        }
    }
}
