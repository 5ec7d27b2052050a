use bigdecimal::ToPrimitive;

use crate::error::BoxDynError;
use crate::oci8::types::{mismatch, Decode, Encode, Type};
use crate::oci8::{Oci8TypeInfo, Oci8Value};

fn decode_i64(value: &Oci8Value) -> Result<i64, BoxDynError> {
    match value {
        Oci8Value::Integer(v) => Ok(*v),
        Oci8Value::Number(v) if v.is_integer() => v
            .to_i64()
            .ok_or_else(|| format!("NUMBER {} is out of range for an integer", v).into()),
        Oci8Value::Number(v) => Err(format!("NUMBER {} has a fractional part", v).into()),
        Oci8Value::Text(s) => Ok(s.trim().parse()?),
        _ => Err(mismatch("an integer", value)),
    }
}

macro_rules! impl_int {
    ($($ty:ty),*) => {$(
        impl Type for $ty {
            fn type_info() -> Oci8TypeInfo {
                Oci8TypeInfo::NUMBER
            }

            fn compatible(ty: &Oci8TypeInfo) -> bool {
                ty.is_numeric() || ty.is_character() || ty.is_unknown()
            }
        }

        impl Encode for $ty {
            fn encode_by_ref(&self) -> Oci8Value {
                Oci8Value::Integer(i64::from(*self))
            }
        }

        impl Decode for $ty {
            fn decode(value: &Oci8Value) -> Result<Self, BoxDynError> {
                Ok(<$ty>::try_from(decode_i64(value)?)?)
            }
        }
    )*};
}

impl_int!(i8, i16, i32, i64, u8, u16, u32);

impl Type for u64 {
    fn type_info() -> Oci8TypeInfo {
        Oci8TypeInfo::NUMBER
    }

    fn compatible(ty: &Oci8TypeInfo) -> bool {
        <i64 as Type>::compatible(ty)
    }
}

impl Encode for u64 {
    fn encode_by_ref(&self) -> Oci8Value {
        match i64::try_from(*self) {
            Ok(v) => Oci8Value::Integer(v),
            // NUMBER holds 38 digits, more than u64 ever needs
            Err(_) => Oci8Value::Number((*self).into()),
        }
    }
}

impl Decode for u64 {
    fn decode(value: &Oci8Value) -> Result<Self, BoxDynError> {
        match value {
            Oci8Value::Number(v) if v.is_integer() => v
                .to_u64()
                .ok_or_else(|| format!("NUMBER {} is out of range for u64", v).into()),
            _ => Ok(u64::try_from(decode_i64(value)?)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    #[test]
    fn it_decodes_integral_numbers() {
        let big = Oci8Value::Number(BigDecimal::from_str("42").unwrap());
        assert_eq!(i32::decode(&big).unwrap(), 42);

        let frac = Oci8Value::Number(BigDecimal::from_str("4.2").unwrap());
        assert!(i64::decode(&frac).is_err());

        assert!(u8::decode(&Oci8Value::Integer(300)).is_err());
        assert!(i64::decode(&Oci8Value::Null).is_err());
    }

    #[test]
    fn it_encodes_large_u64_as_number() {
        assert_eq!(7_u64.encode(), Oci8Value::Integer(7));
        assert!(matches!(u64::MAX.encode(), Oci8Value::Number(_)));
        assert_eq!(u64::decode(&u64::MAX.encode()).unwrap(), u64::MAX);
    }
}
