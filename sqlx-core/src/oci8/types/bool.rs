use crate::error::BoxDynError;
use crate::oci8::types::{Decode, Encode, Type};
use crate::oci8::{Oci8TypeInfo, Oci8Value};

// Oracle has no SQL boolean; NUMBER(1) with 0 and 1 is the convention.

impl Type for bool {
    fn type_info() -> Oci8TypeInfo {
        Oci8TypeInfo::NUMBER
    }

    fn compatible(ty: &Oci8TypeInfo) -> bool {
        ty.is_numeric()
    }
}

impl Encode for bool {
    fn encode_by_ref(&self) -> Oci8Value {
        Oci8Value::Integer(i64::from(*self))
    }
}

impl Decode for bool {
    fn decode(value: &Oci8Value) -> Result<Self, BoxDynError> {
        Ok(i64::decode(value)? != 0)
    }
}
