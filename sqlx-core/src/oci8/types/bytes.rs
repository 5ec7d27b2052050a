use crate::error::BoxDynError;
use crate::oci8::types::{mismatch, Decode, Encode, Type};
use crate::oci8::{Oci8TypeInfo, Oci8Value};

impl Type for [u8] {
    fn type_info() -> Oci8TypeInfo {
        Oci8TypeInfo::RAW
    }

    fn compatible(ty: &Oci8TypeInfo) -> bool {
        ty.is_binary()
    }
}

impl Type for Vec<u8> {
    fn type_info() -> Oci8TypeInfo {
        <[u8] as Type>::type_info()
    }

    fn compatible(ty: &Oci8TypeInfo) -> bool {
        <[u8] as Type>::compatible(ty)
    }
}

impl Encode for [u8] {
    fn encode_by_ref(&self) -> Oci8Value {
        Oci8Value::Binary(self.to_vec())
    }
}

impl Encode for Vec<u8> {
    fn encode(self) -> Oci8Value {
        Oci8Value::Binary(self)
    }

    fn encode_by_ref(&self) -> Oci8Value {
        Oci8Value::Binary(self.clone())
    }
}

impl Decode for Vec<u8> {
    fn decode(value: &Oci8Value) -> Result<Self, BoxDynError> {
        match value {
            Oci8Value::Binary(b) => Ok(b.clone()),
            _ => Err(mismatch("bytes", value)),
        }
    }
}
