use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeDelta};
use sqlx_oci8::oci8::mock::{MockColumn, MockOci};
use sqlx_oci8::oci8::{Oci8Arguments, Oci8ConnectOptions, Oci8Connection, Oci8DataType};
use sqlx_oci8::Error;

fn setup(data_type: Oci8DataType) -> (MockOci, Oci8ConnectOptions) {
    let _ = env_logger::builder().is_test(true).try_init();

    let mock = MockOci::new();
    mock.create_table("v", &[MockColumn::new("val", data_type)]);

    let options = Oci8ConnectOptions::new()
        .username("scott")
        .password("tiger")
        .api(Arc::new(mock.clone()));

    (mock, options)
}

/// Write every value through a bind and read it back through a define.
macro_rules! test_type {
    ($name:ident<$ty:ty>($data_type:expr, $($value:expr),+ $(,)?)) => {
        #[test]
        fn $name() -> anyhow::Result<()> {
            let (mock, options) = setup($data_type);
            let mut conn = Oci8Connection::establish(&options)?;

            $(
                let expected: $ty = $value;

                conn.execute("DELETE FROM v", Oci8Arguments::default())?;

                let mut args = Oci8Arguments::default();
                args.add(expected.clone());
                conn.execute("INSERT INTO v VALUES (:1)", args)?;

                let rows = conn.fetch_all("SELECT * FROM v", Oci8Arguments::default())?;
                assert_eq!(rows.len(), 1);

                let actual: $ty = rows[0].try_get(0)?;
                assert_eq!(actual, expected, "value {:?}", stringify!($value));
            )+

            conn.close();
            assert_eq!(mock.handle_stats().outstanding, 0);

            Ok(())
        }
    };
}

fn ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").unwrap()
}

test_type!(integer<i64>(
    Oci8DataType::Number { precision: 18, scale: 0 },
    0,
    -1,
    i64::from(i32::MAX) + 1,
    999_999_999_999_999_999,
));

test_type!(small_integer<i32>(
    Oci8DataType::Number { precision: 10, scale: 0 },
    7,
    i32::MIN,
));

test_type!(boolean<bool>(Oci8DataType::Number { precision: 1, scale: 0 }, true, false));

test_type!(decimal<BigDecimal>(
    Oci8DataType::Number { precision: 10, scale: 2 },
    BigDecimal::from_str("12.34").unwrap(),
    BigDecimal::from_str("-0.01").unwrap(),
    BigDecimal::from(100_000),
));

test_type!(double<f64>(Oci8DataType::BinaryDouble, 0.5, -1.25e10, f64::MIN_POSITIVE));

test_type!(text<String>(
    Oci8DataType::Varchar2,
    "hello".to_owned(),
    "émoji 🦀".to_owned(),
    "x".repeat(3_000),
));

test_type!(raw<Vec<u8>>(Oci8DataType::Raw, vec![0, 1, 2, 255], vec![0xde, 0xad]));

test_type!(date<NaiveDate>(
    Oci8DataType::Date,
    NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
));

test_type!(timestamp<NaiveDateTime>(
    Oci8DataType::Timestamp,
    ts("2024-03-31 23:59:59.123456789"),
    ts("1999-12-31 00:00:00"),
));

test_type!(timestamp_tz<DateTime<FixedOffset>>(
    Oci8DataType::TimestampTz,
    DateTime::parse_from_rfc3339("2024-03-31T08:15:00.5+02:00").unwrap(),
    DateTime::parse_from_rfc3339("2001-01-01T00:00:00-09:30").unwrap(),
));

test_type!(interval<TimeDelta>(
    Oci8DataType::IntervalDayToSecond,
    TimeDelta::try_seconds(90_061).unwrap(),
    -TimeDelta::try_milliseconds(1_500).unwrap(),
));

test_type!(nullable_integer<Option<i64>>(
    Oci8DataType::Number { precision: 10, scale: 0 },
    Some(3),
    None,
));

test_type!(nullable_text<Option<String>>(Oci8DataType::Varchar2, None, Some("x".to_owned())));

#[test]
fn it_keeps_the_offset_of_zoned_timestamps() -> anyhow::Result<()> {
    let (_mock, options) = setup(Oci8DataType::TimestampTz);
    let mut conn = Oci8Connection::establish(&options)?;

    let value = DateTime::parse_from_rfc3339("2024-06-01T12:00:00+05:45")?;
    let mut args = Oci8Arguments::default();
    args.add(value);
    conn.execute("INSERT INTO v VALUES (:1)", args)?;

    let rows = conn.fetch_all("SELECT * FROM v", Oci8Arguments::default())?;
    let read: DateTime<FixedOffset> = rows[0].try_get("val")?;

    assert_eq!(read.offset().local_minus_utc(), 5 * 3600 + 45 * 60);
    assert_eq!(read.to_rfc3339(), "2024-06-01T12:00:00+05:45");

    Ok(())
}

#[test]
fn it_reads_large_clobs_in_chunks() -> anyhow::Result<()> {
    let (mock, options) = setup(Oci8DataType::Clob);
    let mut conn = Oci8Connection::establish(&options.lob_chunk_size(64).piece_size(256))?;

    let text: String = (0..2_000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();

    let mut args = Oci8Arguments::default();
    args.add(text.clone());
    conn.execute("INSERT INTO v VALUES (:1)", args)?;

    let rows = conn.fetch_all("SELECT * FROM v", Oci8Arguments::default())?;
    let read: String = rows[0].try_get("val")?;

    assert_eq!(read, text);
    assert!(mock.count(sqlx_oci8::oci8::mock::MockCall::LobRead) >= 2000 / 64);

    Ok(())
}

#[test]
fn it_refuses_to_decode_into_an_incompatible_type() -> anyhow::Result<()> {
    let (_mock, options) = setup(Oci8DataType::Varchar2);
    let mut conn = Oci8Connection::establish(&options)?;

    let mut args = Oci8Arguments::default();
    args.add("not a date");
    conn.execute("INSERT INTO v VALUES (:1)", args)?;

    let rows = conn.fetch_all("SELECT * FROM v", Oci8Arguments::default())?;

    assert!(matches!(rows[0].try_get::<NaiveDate, _>(0), Err(Error::Decode(_))));
    assert_eq!(rows[0].try_get::<String, _>(0)?, "not a date");

    Ok(())
}

#[test]
fn it_reports_null_into_a_non_option() -> anyhow::Result<()> {
    let (_mock, options) = setup(Oci8DataType::Number { precision: 10, scale: 0 });
    let mut conn = Oci8Connection::establish(&options)?;

    let mut args = Oci8Arguments::default();
    args.add(None::<i64>);
    conn.execute("INSERT INTO v VALUES (:1)", args)?;

    let rows = conn.fetch_all("SELECT * FROM v", Oci8Arguments::default())?;

    assert!(rows[0].try_get::<i64, _>(0).is_err());
    assert_eq!(rows[0].try_get::<Option<i64>, _>(0)?, None);

    Ok(())
}
