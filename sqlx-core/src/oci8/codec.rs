//! Native wire layouts of the fixed-width external types.
//!
//! Dates and times use Oracle's external formats: excess-100 century and
//! year, excess-1 hour/minute/second, big-endian fractional nanoseconds, and
//! excess-20/excess-60 time zone hour and minute. Intervals store every field
//! with an excess (2^31 or 60) so negative values sort correctly.

use std::borrow::Cow;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Timelike,
};
use chrono_tz::Tz;

use crate::oci8::native::constants::*;
use crate::oci8::{Oci8DataType, Oci8TypeInfo, Oci8Value};

pub(crate) const INT_LEN: usize = 8;
pub(crate) const DOUBLE_LEN: usize = 8;
pub(crate) const FLOAT_LEN: usize = 4;
pub(crate) const DATE_LEN: usize = 7;
pub(crate) const TIMESTAMP_LEN: usize = 11;
pub(crate) const TIMESTAMP_TZ_LEN: usize = 13;
pub(crate) const INTERVAL_DS_LEN: usize = 11;
pub(crate) const INTERVAL_YM_LEN: usize = 5;
/// Width of a LOB locator slot in a define buffer.
pub(crate) const LOCATOR_LEN: usize = 8;
/// Text width of a `NUMBER` fetched as characters.
pub(crate) const NUMBER_TEXT_LEN: usize = 64;

const EXCESS_32: u32 = 0x8000_0000;
const SECONDS_PER_DAY: i64 = 86_400;

pub(crate) type CodecResult<T> = Result<T, String>;

fn expect_len(bytes: &[u8], len: usize, what: &str) -> CodecResult<()> {
    if bytes.len() == len {
        Ok(())
    } else {
        Err(format!("{} needs {} bytes, got {}", what, len, bytes.len()))
    }
}

pub(crate) fn encode_i64(v: i64) -> [u8; INT_LEN] {
    v.to_ne_bytes()
}

pub(crate) fn decode_i64(bytes: &[u8]) -> CodecResult<i64> {
    let raw: [u8; INT_LEN] = bytes
        .try_into()
        .map_err(|_| format!("integer needs {} bytes, got {}", INT_LEN, bytes.len()))?;
    Ok(i64::from_ne_bytes(raw))
}

pub(crate) fn encode_f64(v: f64) -> [u8; DOUBLE_LEN] {
    v.to_ne_bytes()
}

pub(crate) fn decode_f64(bytes: &[u8]) -> CodecResult<f64> {
    let raw: [u8; DOUBLE_LEN] = bytes
        .try_into()
        .map_err(|_| format!("BINARY_DOUBLE needs {} bytes, got {}", DOUBLE_LEN, bytes.len()))?;
    Ok(f64::from_ne_bytes(raw))
}

#[cfg(any(test, feature = "mock"))]
pub(crate) fn encode_f32(v: f32) -> [u8; FLOAT_LEN] {
    v.to_ne_bytes()
}

pub(crate) fn decode_f32(bytes: &[u8]) -> CodecResult<f32> {
    let raw: [u8; FLOAT_LEN] = bytes
        .try_into()
        .map_err(|_| format!("BINARY_FLOAT needs {} bytes, got {}", FLOAT_LEN, bytes.len()))?;
    Ok(f32::from_ne_bytes(raw))
}

/// Parse the character form of a `NUMBER` as the server writes it
/// (`.5`, `-.25`, `1E+40`).
pub(crate) fn decode_number_text(bytes: &[u8]) -> CodecResult<BigDecimal> {
    let text = std::str::from_utf8(bytes).map_err(|e| e.to_string())?.trim();

    let normalized = if let Some(rest) = text.strip_prefix("-.") {
        format!("-0.{}", rest)
    } else if let Some(rest) = text.strip_prefix('.') {
        format!("0.{}", rest)
    } else {
        text.to_owned()
    };

    BigDecimal::from_str(&normalized).map_err(|e| format!("invalid NUMBER text {:?}: {}", text, e))
}

fn encode_datetime_prefix(dt: &NaiveDateTime) -> CodecResult<[u8; DATE_LEN]> {
    let year = dt.year();

    if !(1..=9999).contains(&year) {
        return Err(format!("year {} is outside 1..=9999", year));
    }

    Ok([
        (year / 100 + 100) as u8,
        (year % 100 + 100) as u8,
        dt.month() as u8,
        dt.day() as u8,
        dt.hour() as u8 + 1,
        dt.minute() as u8 + 1,
        dt.second() as u8 + 1,
    ])
}

fn decode_datetime_prefix(bytes: &[u8], nanos: u32) -> CodecResult<NaiveDateTime> {
    let year = (i32::from(bytes[0]) - 100) * 100 + (i32::from(bytes[1]) - 100);

    NaiveDate::from_ymd_opt(year, bytes[2].into(), bytes[3].into())
        .and_then(|date| {
            date.and_hms_nano_opt(
                u32::from(bytes[4]).wrapping_sub(1),
                u32::from(bytes[5]).wrapping_sub(1),
                u32::from(bytes[6]).wrapping_sub(1),
                nanos,
            )
        })
        .ok_or_else(|| format!("invalid date bytes {:?}", &bytes[..DATE_LEN]))
}

#[cfg(any(test, feature = "mock"))]
pub(crate) fn encode_date(dt: &NaiveDateTime) -> CodecResult<[u8; DATE_LEN]> {
    encode_datetime_prefix(dt)
}

pub(crate) fn decode_date(bytes: &[u8]) -> CodecResult<NaiveDateTime> {
    expect_len(bytes, DATE_LEN, "DATE")?;
    decode_datetime_prefix(bytes, 0)
}

pub(crate) fn encode_timestamp(dt: &NaiveDateTime) -> CodecResult<[u8; TIMESTAMP_LEN]> {
    let mut out = [0; TIMESTAMP_LEN];
    out[..DATE_LEN].copy_from_slice(&encode_datetime_prefix(dt)?);
    // leap seconds fold into the last second
    out[DATE_LEN..].copy_from_slice(&dt.nanosecond().min(999_999_999).to_be_bytes());
    Ok(out)
}

pub(crate) fn decode_timestamp(bytes: &[u8]) -> CodecResult<NaiveDateTime> {
    expect_len(bytes, TIMESTAMP_LEN, "TIMESTAMP")?;
    let nanos = u32::from_be_bytes([bytes[7], bytes[8], bytes[9], bytes[10]]);
    decode_datetime_prefix(bytes, nanos)
}

pub(crate) fn encode_timestamp_tz(dt: &DateTime<FixedOffset>) -> CodecResult<[u8; TIMESTAMP_TZ_LEN]> {
    let offset = dt.offset().local_minus_utc();
    let (hours, minutes) = (offset / 3600, (offset % 3600) / 60);

    let mut out = [0; TIMESTAMP_TZ_LEN];
    out[..TIMESTAMP_LEN].copy_from_slice(&encode_timestamp(&dt.naive_utc())?);
    out[11] = (hours + 20) as u8;
    out[12] = (minutes + 60) as u8;
    Ok(out)
}

pub(crate) fn decode_timestamp_tz(bytes: &[u8]) -> CodecResult<DateTime<FixedOffset>> {
    expect_len(bytes, TIMESTAMP_TZ_LEN, "TIMESTAMP WITH TIME ZONE")?;

    if bytes[11] & 0x80 != 0 {
        return Err("region based time zones are not supported".into());
    }

    let utc = decode_timestamp(&bytes[..TIMESTAMP_LEN])?;
    let hours = i32::from(bytes[11]) - 20;
    let minutes = i32::from(bytes[12]) - 60;

    let offset = FixedOffset::east_opt(hours * 3600 + minutes * 60)
        .ok_or_else(|| format!("invalid time zone offset {:+}:{:02}", hours, minutes))?;

    Ok(DateTime::from_naive_utc_and_offset(utc, offset))
}

pub(crate) fn encode_interval_ds(delta: &TimeDelta) -> CodecResult<[u8; INTERVAL_DS_LEN]> {
    let negative = *delta < TimeDelta::zero();
    let abs = if negative { -*delta } else { *delta };
    let sign = if negative { -1 } else { 1 };

    let secs = abs.num_seconds();
    let days = secs / SECONDS_PER_DAY;
    let rem = secs % SECONDS_PER_DAY;

    let days = i32::try_from(days * sign).map_err(|_| "interval exceeds the day range".to_string())?;
    let hours = (rem / 3600) as i32 * sign as i32;
    let minutes = (rem % 3600 / 60) as i32 * sign as i32;
    let seconds = (rem % 60) as i32 * sign as i32;
    let nanos = abs.subsec_nanos() * sign as i32;

    let mut out = [0; INTERVAL_DS_LEN];
    out[..4].copy_from_slice(&(days as u32).wrapping_add(EXCESS_32).to_be_bytes());
    out[4] = (hours + 60) as u8;
    out[5] = (minutes + 60) as u8;
    out[6] = (seconds + 60) as u8;
    out[7..].copy_from_slice(&(nanos as u32).wrapping_add(EXCESS_32).to_be_bytes());
    Ok(out)
}

pub(crate) fn decode_interval_ds(bytes: &[u8]) -> CodecResult<TimeDelta> {
    expect_len(bytes, INTERVAL_DS_LEN, "INTERVAL DAY TO SECOND")?;

    let days = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]).wrapping_sub(EXCESS_32)
        as i32;
    let hours = i64::from(bytes[4]) - 60;
    let minutes = i64::from(bytes[5]) - 60;
    let seconds = i64::from(bytes[6]) - 60;
    let nanos = u32::from_be_bytes([bytes[7], bytes[8], bytes[9], bytes[10]])
        .wrapping_sub(EXCESS_32) as i32;

    let secs = i64::from(days) * SECONDS_PER_DAY + hours * 3600 + minutes * 60 + seconds;

    TimeDelta::try_seconds(secs)
        .and_then(|d| d.checked_add(&TimeDelta::nanoseconds(nanos.into())))
        .ok_or_else(|| "interval out of range".to_string())
}

pub(crate) fn encode_interval_ym(months: i32) -> [u8; INTERVAL_YM_LEN] {
    let years = months / 12;
    let rest = months % 12;

    let mut out = [0; INTERVAL_YM_LEN];
    out[..4].copy_from_slice(&(years as u32).wrapping_add(EXCESS_32).to_be_bytes());
    out[4] = (rest + 60) as u8;
    out
}

pub(crate) fn decode_interval_ym(bytes: &[u8]) -> CodecResult<i32> {
    expect_len(bytes, INTERVAL_YM_LEN, "INTERVAL YEAR TO MONTH")?;

    let years = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]).wrapping_sub(EXCESS_32)
        as i32;
    let months = i32::from(bytes[4]) - 60;

    years
        .checked_mul(12)
        .and_then(|m| m.checked_add(months))
        .ok_or_else(|| "interval out of range".to_string())
}

/// Attach `tz` to a wall clock time read from a column without a zone.
///
/// Times inside a daylight saving gap do not exist locally; they are taken
/// as UTC. Ambiguous times resolve to the earlier instant.
pub(crate) fn localize(naive: NaiveDateTime, tz: Tz) -> DateTime<FixedOffset> {
    tz.from_local_datetime(&naive)
        .earliest()
        .unwrap_or_else(|| tz.from_utc_datetime(&naive))
        .fixed_offset()
}

/// External representation a bind or define buffer is declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NativeKind {
    Integer,
    Double,
    Float,
    /// `NUMBER` exchanged as text, so no digit is lost.
    NumberText,
    Text,
    /// Text transferred with `SQLT_LNG` (long or piecewise values).
    LongText,
    Binary,
    /// Bytes transferred with `SQLT_LBI` (long or piecewise values).
    LongBinary,
    Date,
    Timestamp,
    TimestampTz,
    IntervalYearToMonth,
    IntervalDayToSecond,
    Clob,
    Blob,
}

impl NativeKind {
    pub(crate) fn sqlt(self) -> u16 {
        match self {
            NativeKind::Integer => SQLT_INT,
            NativeKind::Double => SQLT_BDOUBLE,
            NativeKind::Float => SQLT_BFLOAT,
            NativeKind::NumberText | NativeKind::Text => SQLT_CHR,
            NativeKind::LongText => SQLT_LNG,
            NativeKind::Binary => SQLT_BIN,
            NativeKind::LongBinary => SQLT_LBI,
            NativeKind::Date => SQLT_DAT,
            NativeKind::Timestamp => SQLT_TIMESTAMP,
            NativeKind::TimestampTz => SQLT_TIMESTAMP_TZ,
            NativeKind::IntervalYearToMonth => SQLT_INTERVAL_YM,
            NativeKind::IntervalDayToSecond => SQLT_INTERVAL_DS,
            NativeKind::Clob => SQLT_CLOB,
            NativeKind::Blob => SQLT_BLOB,
        }
    }

    /// Width of one element, `None` for variable length kinds.
    pub(crate) fn fixed_len(self) -> Option<usize> {
        match self {
            NativeKind::Integer => Some(INT_LEN),
            NativeKind::Double => Some(DOUBLE_LEN),
            NativeKind::Float => Some(FLOAT_LEN),
            NativeKind::Date => Some(DATE_LEN),
            NativeKind::Timestamp => Some(TIMESTAMP_LEN),
            NativeKind::TimestampTz => Some(TIMESTAMP_TZ_LEN),
            NativeKind::IntervalYearToMonth => Some(INTERVAL_YM_LEN),
            NativeKind::IntervalDayToSecond => Some(INTERVAL_DS_LEN),
            NativeKind::Clob | NativeKind::Blob => Some(LOCATOR_LEN),
            NativeKind::NumberText
            | NativeKind::Text
            | NativeKind::LongText
            | NativeKind::Binary
            | NativeKind::LongBinary => None,
        }
    }

    pub(crate) fn is_lob(self) -> bool {
        matches!(self, NativeKind::Clob | NativeKind::Blob)
    }

    /// Kind a parameter value is bound as.
    pub(crate) fn of_value(value: &Oci8Value) -> NativeKind {
        match value {
            Oci8Value::Null | Oci8Value::Text(_) => NativeKind::Text,
            Oci8Value::Integer(_) => NativeKind::Integer,
            Oci8Value::Float(_) => NativeKind::Double,
            Oci8Value::Number(_) => NativeKind::NumberText,
            Oci8Value::Binary(_) => NativeKind::Binary,
            Oci8Value::Timestamp(_) => NativeKind::TimestampTz,
            Oci8Value::LocalTimestamp(_) => NativeKind::Timestamp,
            Oci8Value::IntervalDayToSecond(_) => NativeKind::IntervalDayToSecond,
            Oci8Value::IntervalYearToMonth(_) => NativeKind::IntervalYearToMonth,
        }
    }

    /// Kind an output parameter of SQL type `ty` is bound as.
    pub(crate) fn of_output(ty: &Oci8TypeInfo) -> Option<NativeKind> {
        Some(match ty.data_type() {
            Oci8DataType::Number { .. } | Oci8DataType::Float { .. } => NativeKind::NumberText,
            Oci8DataType::BinaryFloat => NativeKind::Float,
            Oci8DataType::BinaryDouble => NativeKind::Double,
            Oci8DataType::Raw | Oci8DataType::LongRaw => NativeKind::Binary,
            Oci8DataType::Date => NativeKind::Date,
            Oci8DataType::Timestamp => NativeKind::Timestamp,
            Oci8DataType::TimestampTz | Oci8DataType::TimestampLtz => NativeKind::TimestampTz,
            Oci8DataType::IntervalYearToMonth => NativeKind::IntervalYearToMonth,
            Oci8DataType::IntervalDayToSecond => NativeKind::IntervalDayToSecond,
            Oci8DataType::Clob | Oci8DataType::NClob | Oci8DataType::Blob => return None,
            Oci8DataType::Varchar2
            | Oci8DataType::NVarchar2
            | Oci8DataType::Char
            | Oci8DataType::NChar
            | Oci8DataType::Long
            | Oci8DataType::RowId
            | Oci8DataType::URowId
            | Oci8DataType::Null
            | Oci8DataType::Unknown(_) => NativeKind::Text,
        })
    }

    /// The kind to use when a value is too long for one piece.
    pub(crate) fn long_form(self) -> NativeKind {
        match self {
            NativeKind::Text | NativeKind::NumberText => NativeKind::LongText,
            NativeKind::Binary => NativeKind::LongBinary,
            other => other,
        }
    }

    /// Decode one element. LOB locators are not values and fail here.
    pub(crate) fn decode(self, bytes: &[u8], tz: Tz) -> CodecResult<Oci8Value> {
        Ok(match self {
            NativeKind::Integer => Oci8Value::Integer(decode_i64(bytes)?),
            NativeKind::Double => Oci8Value::Float(decode_f64(bytes)?),
            NativeKind::Float => Oci8Value::Float(decode_f32(bytes)?.into()),
            NativeKind::NumberText => Oci8Value::Number(decode_number_text(bytes)?),
            NativeKind::Text | NativeKind::LongText => Oci8Value::Text(
                String::from_utf8(bytes.to_vec()).map_err(|e| e.to_string())?,
            ),
            NativeKind::Binary | NativeKind::LongBinary => Oci8Value::Binary(bytes.to_vec()),
            NativeKind::Date => Oci8Value::Timestamp(localize(decode_date(bytes)?, tz)),
            NativeKind::Timestamp => Oci8Value::Timestamp(localize(decode_timestamp(bytes)?, tz)),
            NativeKind::TimestampTz => Oci8Value::Timestamp(decode_timestamp_tz(bytes)?),
            NativeKind::IntervalYearToMonth => {
                Oci8Value::IntervalYearToMonth(decode_interval_ym(bytes)?)
            }
            NativeKind::IntervalDayToSecond => {
                Oci8Value::IntervalDayToSecond(decode_interval_ds(bytes)?)
            }
            NativeKind::Clob | NativeKind::Blob => {
                return Err("LOB locators must be read, not decoded".into())
            }
        })
    }
}

/// Native bytes of a parameter value; `None` for null.
pub(crate) fn encode_value(value: &Oci8Value) -> CodecResult<Option<Cow<'_, [u8]>>> {
    Ok(Some(match value {
        Oci8Value::Null => return Ok(None),
        Oci8Value::Integer(v) => Cow::Owned(encode_i64(*v).to_vec()),
        Oci8Value::Float(v) => Cow::Owned(encode_f64(*v).to_vec()),
        Oci8Value::Number(v) => Cow::Owned(v.to_string().into_bytes()),
        Oci8Value::Text(v) => Cow::Borrowed(v.as_bytes()),
        Oci8Value::Binary(v) => Cow::Borrowed(v.as_slice()),
        Oci8Value::Timestamp(v) => Cow::Owned(encode_timestamp_tz(v)?.to_vec()),
        Oci8Value::LocalTimestamp(v) => Cow::Owned(encode_timestamp(v)?.to_vec()),
        Oci8Value::IntervalDayToSecond(v) => Cow::Owned(encode_interval_ds(v)?.to_vec()),
        Oci8Value::IntervalYearToMonth(v) => Cow::Owned(encode_interval_ym(*v).to_vec()),
    }))
}
