use crate::error::BoxDynError;
use crate::oci8::types::{mismatch, Decode, Encode, Type};
use crate::oci8::{Oci8TypeInfo, Oci8Value};

impl Type for str {
    fn type_info() -> Oci8TypeInfo {
        Oci8TypeInfo::VARCHAR2
    }

    fn compatible(ty: &Oci8TypeInfo) -> bool {
        ty.is_character() || ty.is_unknown()
    }
}

impl Type for String {
    fn type_info() -> Oci8TypeInfo {
        <str as Type>::type_info()
    }

    fn compatible(ty: &Oci8TypeInfo) -> bool {
        <str as Type>::compatible(ty)
    }
}

impl Encode for str {
    fn encode_by_ref(&self) -> Oci8Value {
        Oci8Value::Text(self.to_owned())
    }
}

impl Encode for String {
    fn encode(self) -> Oci8Value {
        Oci8Value::Text(self)
    }

    fn encode_by_ref(&self) -> Oci8Value {
        Oci8Value::Text(self.clone())
    }
}

impl Decode for String {
    fn decode(value: &Oci8Value) -> Result<Self, BoxDynError> {
        match value {
            Oci8Value::Text(s) => Ok(s.clone()),
            _ => Err(mismatch("text", value)),
        }
    }
}
