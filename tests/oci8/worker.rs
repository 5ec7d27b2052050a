use std::sync::Arc;

use either::Either;
use futures::TryStreamExt;
use sqlx_oci8::oci8::mock::{MockCall, MockColumn, MockFault, MockOci};
use sqlx_oci8::oci8::{Oci8Arguments, Oci8ConnectOptions, Oci8DataType, Oci8Value, Oci8Worker};
use sqlx_oci8::{Error, ErrorKind};

fn setup(rows: i64) -> (MockOci, Oci8ConnectOptions) {
    let _ = env_logger::builder().is_test(true).try_init();

    let mock = MockOci::new();
    mock.create_table(
        "nums",
        &[MockColumn::new("n", Oci8DataType::Number { precision: 10, scale: 0 }).unique()],
    );

    for n in 0..rows {
        mock.insert_row("nums", vec![Oci8Value::Integer(n)]);
    }

    let options = Oci8ConnectOptions::new()
        .connect("localhost/XEPDB1")
        .username("scott")
        .password("tiger")
        .prefetch_rows(16)
        .api(Arc::new(mock.clone()));

    (mock, options)
}

fn one(value: i64) -> Oci8Arguments {
    let mut args = Oci8Arguments::default();
    args.add(value);
    args
}

#[tokio::test]
async fn it_runs_commands_on_the_worker_thread() -> anyhow::Result<()> {
    let (mock, options) = setup(3);

    let mut conn = Oci8Worker::establish(options).await?;
    conn.ping().await?;

    let done = conn.execute("INSERT INTO nums VALUES (:1)", one(3)).await?;
    assert_eq!(done.rows_affected()?, 1);

    let rows = conn.fetch_all("SELECT * FROM nums", Oci8Arguments::default()).await?;
    let values: Vec<i64> = rows.iter().map(|row| row.try_get(0)).collect::<Result<_, _>>()?;
    assert_eq!(values, [0, 1, 2, 3]);

    conn.close().await?;

    assert_eq!(mock.handle_stats().outstanding, 0);
    assert_eq!(mock.count(MockCall::SessionEnd), 1);

    Ok(())
}

#[tokio::test]
async fn it_streams_rows_then_a_final_result() -> anyhow::Result<()> {
    let (_mock, options) = setup(100);
    let mut conn = Oci8Worker::establish(options).await?;

    let mut stream = conn.fetch("SELECT * FROM nums", Oci8Arguments::default()).await?;

    let mut rows = 0;
    let mut results = 0;

    while let Some(item) = stream.try_next().await? {
        match item {
            Either::Left(_) => results += 1,
            Either::Right(row) => {
                assert_eq!(row.try_get::<i64, _>("n")?, rows);
                rows += 1;
            }
        }
    }

    assert_eq!(rows, 100);
    assert_eq!(results, 1);

    conn.close().await?;

    Ok(())
}

#[tokio::test]
async fn it_closes_the_result_set_when_the_stream_is_dropped() -> anyhow::Result<()> {
    let (mock, options) = setup(500);
    let mut conn = Oci8Worker::establish(options).await?;

    {
        let mut stream = conn.fetch("SELECT * FROM nums", Oci8Arguments::default()).await?;
        assert!(stream.try_next().await?.is_some());
    }

    // the connection stays usable once the abandoned query is gone
    let rows = conn.fetch_all("SELECT * FROM nums WHERE n = :1", one(42)).await?;
    assert_eq!(rows.len(), 1);

    conn.close().await?;

    // at most the buffered rows were read before the cursor was cancelled
    let fetched = mock
        .calls()
        .into_iter()
        .filter(|call| matches!(call, MockCall::StmtFetch { .. }))
        .count();
    assert!(fetched < 500 / 16);
    assert_eq!(mock.handle_stats().outstanding, 0);

    Ok(())
}

#[tokio::test]
async fn it_rolls_back_through_the_worker() -> anyhow::Result<()> {
    let (_mock, options) = setup(1);
    let mut conn = Oci8Worker::establish(options).await?;

    conn.begin().await?;
    conn.execute("DELETE FROM nums", Oci8Arguments::default()).await?;
    assert!(conn.fetch_all("SELECT * FROM nums", Oci8Arguments::default()).await?.is_empty());
    conn.rollback().await?;

    assert_eq!(conn.fetch_all("SELECT * FROM nums", Oci8Arguments::default()).await?.len(), 1);

    conn.begin().await?;
    conn.execute("INSERT INTO nums VALUES (:1)", one(9)).await?;
    conn.commit().await?;

    assert_eq!(conn.fetch_all("SELECT * FROM nums", Oci8Arguments::default()).await?.len(), 2);

    conn.close().await?;

    Ok(())
}

#[tokio::test]
async fn it_returns_statement_errors_without_losing_the_connection() -> anyhow::Result<()> {
    let (_mock, options) = setup(1);
    let mut conn = Oci8Worker::establish(options).await?;

    let err = conn
        .execute("INSERT INTO nums VALUES (:1)", one(0))
        .await
        .expect_err("duplicate key");
    let db = err.as_database_error().expect("a database error");
    assert_eq!(db.kind(), ErrorKind::UniqueViolation);

    conn.ping().await?;
    conn.close().await?;

    Ok(())
}

#[tokio::test]
async fn it_fails_to_establish_when_the_logon_is_rejected() {
    let (mock, options) = setup(0);
    mock.inject(MockFault::error(MockCall::SessionBegin, 1017, "invalid username/password; logon denied"));

    let err = Oci8Worker::establish(options).await.expect_err("logon should fail");
    assert!(matches!(err, Error::Connection(_)));

    assert_eq!(mock.handle_stats().outstanding, 0);
}

#[tokio::test]
async fn it_shuts_down_when_dropped() -> anyhow::Result<()> {
    let (mock, options) = setup(0);

    let conn = Oci8Worker::establish(options).await?;
    drop(conn);

    assert_eq!(mock.handle_stats().outstanding, 0);

    Ok(())
}
