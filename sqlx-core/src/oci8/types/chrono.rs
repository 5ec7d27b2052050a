use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};

use crate::error::BoxDynError;
use crate::oci8::types::{mismatch, Decode, Encode, Type};
use crate::oci8::{Oci8TypeInfo, Oci8Value};

impl Type for DateTime<FixedOffset> {
    fn type_info() -> Oci8TypeInfo {
        Oci8TypeInfo::TIMESTAMP_TZ
    }

    fn compatible(ty: &Oci8TypeInfo) -> bool {
        ty.is_datetime()
    }
}

impl Type for DateTime<Utc> {
    fn type_info() -> Oci8TypeInfo {
        Oci8TypeInfo::TIMESTAMP_TZ
    }

    fn compatible(ty: &Oci8TypeInfo) -> bool {
        ty.is_datetime()
    }
}

impl Type for NaiveDateTime {
    fn type_info() -> Oci8TypeInfo {
        Oci8TypeInfo::TIMESTAMP
    }

    fn compatible(ty: &Oci8TypeInfo) -> bool {
        ty.is_datetime()
    }
}

impl Type for NaiveDate {
    fn type_info() -> Oci8TypeInfo {
        Oci8TypeInfo::DATE
    }

    fn compatible(ty: &Oci8TypeInfo) -> bool {
        ty.is_datetime()
    }
}

impl Type for TimeDelta {
    fn type_info() -> Oci8TypeInfo {
        Oci8TypeInfo::INTERVAL_DS
    }
}

impl Encode for DateTime<FixedOffset> {
    fn encode_by_ref(&self) -> Oci8Value {
        Oci8Value::Timestamp(*self)
    }
}

impl Encode for DateTime<Utc> {
    fn encode_by_ref(&self) -> Oci8Value {
        Oci8Value::Timestamp(self.fixed_offset())
    }
}

impl Encode for NaiveDateTime {
    fn encode_by_ref(&self) -> Oci8Value {
        Oci8Value::LocalTimestamp(*self)
    }
}

impl Encode for NaiveDate {
    fn encode_by_ref(&self) -> Oci8Value {
        Oci8Value::LocalTimestamp(self.and_time(NaiveTime::MIN))
    }
}

impl Encode for TimeDelta {
    fn encode_by_ref(&self) -> Oci8Value {
        Oci8Value::IntervalDayToSecond(*self)
    }
}

impl Decode for DateTime<FixedOffset> {
    fn decode(value: &Oci8Value) -> Result<Self, BoxDynError> {
        match value {
            Oci8Value::Timestamp(v) => Ok(*v),
            _ => Err(mismatch("a timestamp", value)),
        }
    }
}

impl Decode for DateTime<Utc> {
    fn decode(value: &Oci8Value) -> Result<Self, BoxDynError> {
        Ok(DateTime::<FixedOffset>::decode(value)?.with_timezone(&Utc))
    }
}

impl Decode for NaiveDateTime {
    fn decode(value: &Oci8Value) -> Result<Self, BoxDynError> {
        match value {
            Oci8Value::Timestamp(v) => Ok(v.naive_local()),
            Oci8Value::LocalTimestamp(v) => Ok(*v),
            _ => Err(mismatch("a timestamp", value)),
        }
    }
}

impl Decode for NaiveDate {
    fn decode(value: &Oci8Value) -> Result<Self, BoxDynError> {
        Ok(NaiveDateTime::decode(value)?.date())
    }
}

impl Decode for TimeDelta {
    fn decode(value: &Oci8Value) -> Result<Self, BoxDynError> {
        match value {
            Oci8Value::IntervalDayToSecond(v) => Ok(*v),
            _ => Err(mismatch("an interval", value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_reads_wall_clock_time_of_zoned_values() {
        let ts = DateTime::parse_from_rfc3339("2024-03-31T08:15:00+02:00").unwrap();
        let value = ts.encode();

        assert_eq!(
            NaiveDateTime::decode(&value).unwrap().to_string(),
            "2024-03-31 08:15:00"
        );
        assert_eq!(
            DateTime::<Utc>::decode(&value).unwrap().to_rfc3339(),
            "2024-03-31T06:15:00+00:00"
        );
    }
}
