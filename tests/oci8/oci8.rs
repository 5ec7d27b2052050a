use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sqlx_oci8::error::{BindError, FetchError};
use sqlx_oci8::oci8::mock::{MockCall, MockColumn, MockFault, MockOci};
use sqlx_oci8::oci8::native::constants::{OCI_STILL_EXECUTING, OCI_SUCCESS_WITH_INFO};
use sqlx_oci8::oci8::native::HandleType;
use sqlx_oci8::oci8::{
    CancelSignal, Oci8Argument, Oci8Arguments, Oci8ConnectOptions, Oci8Connection, Oci8DataType,
    Oci8TypeInfo, Oci8Value, PlaceholderStyle, RowsState, StatementState,
};
use sqlx_oci8::{Column, Connection, Error, ErrorKind};

fn setup() -> (MockOci, Oci8ConnectOptions) {
    let _ = env_logger::builder().is_test(true).try_init();

    let mock = MockOci::new();
    mock.create_table(
        "t",
        &[
            MockColumn::new("id", Oci8DataType::Number { precision: 10, scale: 0 })
                .unique()
                .not_null(),
            MockColumn::new("name", Oci8DataType::Varchar2).size(20),
        ],
    );
    mock.insert_row("t", vec![Oci8Value::Integer(1), Oci8Value::Text("one".into())]);
    mock.insert_row("t", vec![Oci8Value::Integer(2), Oci8Value::Text("two".into())]);

    let options = Oci8ConnectOptions::new()
        .connect("localhost/XEPDB1")
        .username("scott")
        .password("tiger")
        .api(Arc::new(mock.clone()));

    (mock, options)
}

fn args<const N: usize>(values: [Oci8Value; N]) -> Oci8Arguments {
    let mut args = Oci8Arguments::default();
    for value in values {
        args.add(value);
    }
    args
}

#[test]
fn it_connects_pings_and_releases_every_handle() -> anyhow::Result<()> {
    let (mock, options) = setup();

    let mut conn = Oci8Connection::establish(&options)?;
    conn.ping()?;
    assert!(!conn.is_closed());

    {
        let mut stmt = conn.prepare("SELECT * FROM t")?;
        let rows: Vec<_> = stmt.query()?.collect::<Result<_, _>>()?;
        assert_eq!(rows.len(), 2);
    }

    conn.close();

    let stats = mock.handle_stats();
    assert_eq!(stats.outstanding, 0);
    assert_eq!(stats.allocated, stats.freed);
    assert_eq!(stats.invalid_frees, 0);

    Ok(())
}

#[test]
fn it_reports_a_rejected_logon() {
    let (mock, options) = setup();
    mock.inject(MockFault::error(
        MockCall::SessionBegin,
        1017,
        "ORA-01017: invalid username/password; logon denied",
    ));

    let err = Oci8Connection::establish(&options).unwrap_err();

    assert!(matches!(err, Error::Connection(_)));
    assert_eq!(err.as_database_error().map(|e| e.code()), Some(1017));
    assert_eq!(mock.handle_stats().outstanding, 0);
}

#[test]
fn it_closes_only_once() -> anyhow::Result<()> {
    let (mock, options) = setup();
    let mut conn = Oci8Connection::establish(&options)?;

    conn.close();
    conn.close();
    Connection::close(&mut conn);

    assert!(conn.is_closed());
    assert_eq!(mock.count(MockCall::SessionEnd), 1);
    assert_eq!(mock.count(MockCall::ServerDetach), 1);
    assert_eq!(mock.handle_stats().invalid_frees, 0);

    assert!(matches!(conn.ping(), Err(Error::Closed("connection"))));
    assert!(matches!(conn.prepare("SELECT * FROM t"), Err(Error::Closed("connection"))));

    Ok(())
}

#[test]
fn it_invalidates_statements_of_a_closed_connection() -> anyhow::Result<()> {
    let (mock, options) = setup();
    let mut conn = Oci8Connection::establish(&options)?;
    let mut stmt = conn.prepare("SELECT * FROM t")?;

    conn.close();

    assert_eq!(stmt.state(), StatementState::Closed);
    assert!(matches!(stmt.execute(), Err(Error::Closed(_))));

    stmt.close();
    drop(stmt);

    assert_eq!(mock.handle_stats().outstanding, 0);
    assert_eq!(mock.handle_stats().invalid_frees, 0);

    Ok(())
}

#[test]
fn it_selects_with_question_mark_placeholders() -> anyhow::Result<()> {
    let (_mock, options) = setup();
    let options = options.placeholder_style(PlaceholderStyle::QuestionMark);
    let mut conn = Oci8Connection::establish(&options)?;

    let mut stmt = conn.prepare("SELECT id, name FROM t WHERE id = ?")?;
    assert_eq!(stmt.sql()?, "SELECT id, name FROM t WHERE id = :1");

    stmt.bind(args([Oci8Value::Integer(2)]))?;
    let rows: Vec<_> = stmt.query()?.collect::<Result<_, _>>()?;

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].try_get::<i64, _>("id")?, 2);
    assert_eq!(rows[0].try_get::<String, _>(1)?, "two");
    assert_eq!(rows[0].columns()[1].name(), "NAME");

    Ok(())
}

#[test]
fn it_rejects_a_parameter_count_mismatch() -> anyhow::Result<()> {
    let (mock, options) = setup();
    let options = options.placeholder_style(PlaceholderStyle::QuestionMark);
    let mut conn = Oci8Connection::establish(&options)?;

    let mut stmt = conn.prepare("SELECT id FROM t WHERE id = ?")?;
    let err = stmt
        .bind(args([Oci8Value::Integer(1), Oci8Value::Integer(2)]))
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Bind(BindError::CountMismatch {
            expected: 1,
            actual: 2
        })
    ));
    assert_eq!(mock.count(MockCall::BindByPos), 0);

    // nothing bound yet
    assert!(matches!(stmt.execute(), Err(Error::State(_))));

    Ok(())
}

#[test]
fn it_reads_null_over_stale_bytes() -> anyhow::Result<()> {
    let (mock, options) = setup();
    mock.insert_row("t", vec![Oci8Value::Integer(3), Oci8Value::Null]);

    // one row per fetch, so every row lands in the same slot
    let mut conn = Oci8Connection::establish(&options.prefetch_rows(1))?;
    let rows = conn.fetch_all("SELECT name FROM t", Oci8Arguments::default())?;

    let names: Vec<Option<String>> = rows
        .iter()
        .map(|row| row.try_get("name"))
        .collect::<Result<_, _>>()?;

    assert_eq!(names, [Some("one".to_owned()), Some("two".to_owned()), None]);
    assert!(rows[2].try_get::<String, _>("name").is_err());

    Ok(())
}

#[test]
fn it_releases_buffers_and_locators_when_cancelled() -> anyhow::Result<()> {
    let (mock, options) = setup();
    mock.create_table(
        "docs",
        &[
            MockColumn::new("id", Oci8DataType::Number { precision: 10, scale: 0 }),
            MockColumn::new("body", Oci8DataType::Clob),
        ],
    );
    for id in 1..=5 {
        mock.insert_row(
            "docs",
            vec![Oci8Value::Integer(id), Oci8Value::Text("x".repeat(100))],
        );
    }

    let mut conn = Oci8Connection::establish(&options.prefetch_rows(2).lob_chunk_size(16))?;
    let mut stmt = conn.prepare("SELECT id, body FROM docs")?;
    let cancel = CancelSignal::new();
    let mut rows = stmt.query_with(cancel.clone())?;

    let first = rows.next()?.expect("a first row");
    assert_eq!(first.try_get::<String, _>("body")?.len(), 100);
    assert_eq!(mock.live_handles(HandleType::LobLocator), 2);
    assert!(rows.buffered_bytes() > 0);

    cancel.cancel();

    assert!(matches!(rows.next(), Err(Error::Cancelled)));
    assert_eq!(rows.state(), RowsState::Cancelled);
    assert!(rows.next()?.is_none());

    assert_eq!(mock.live_handles(HandleType::LobLocator), 0);
    assert_eq!(rows.buffered_bytes(), 0);
    let cursor_cancels = mock
        .calls()
        .into_iter()
        .filter(|call| *call == MockCall::StmtFetch { rows: 0 })
        .count();
    assert_eq!(cursor_cancels, 1);

    Ok(())
}

#[test]
fn it_closes_a_result_set_early() -> anyhow::Result<()> {
    let (mock, options) = setup();
    let mut conn = Oci8Connection::establish(&options.prefetch_rows(1))?;
    let mut stmt = conn.prepare("SELECT * FROM t")?;
    let mut rows = stmt.query()?;

    assert!(rows.next()?.is_some());
    rows.close();
    rows.close();

    assert_eq!(rows.state(), RowsState::Closed);
    assert!(rows.next()?.is_none());
    assert!(mock.calls().contains(&MockCall::StmtFetch { rows: 0 }));

    // the statement can run again
    drop(rows);
    assert_eq!(stmt.query()?.count(), 2);

    Ok(())
}

#[test]
fn it_fails_the_rows_on_a_truncated_long_value() -> anyhow::Result<()> {
    let (mock, options) = setup();
    mock.create_table(
        "notes",
        &[
            MockColumn::new("id", Oci8DataType::Number { precision: 10, scale: 0 }),
            MockColumn::new("body", Oci8DataType::Long),
        ],
    );
    mock.insert_row("notes", vec![Oci8Value::Integer(1), Oci8Value::Text("a".into())]);
    mock.insert_row("notes", vec![Oci8Value::Integer(2), Oci8Value::Text("b".into())]);
    mock.insert_row("notes", vec![Oci8Value::Integer(3), Oci8Value::Text("z".repeat(50))]);

    let mut conn = Oci8Connection::establish(&options.long_buffer_size(8))?;
    let mut stmt = conn.prepare("SELECT id, body FROM notes")?;
    let mut rows = stmt.query()?;

    assert_eq!(rows.next()?.expect("row 1").try_get::<String, _>("body")?, "a");
    assert_eq!(rows.next()?.expect("row 2").try_get::<String, _>("body")?, "b");

    match rows.next() {
        Err(Error::Fetch(FetchError::Truncated {
            column, capacity, ..
        })) => {
            assert_eq!(column, 1);
            assert_eq!(capacity, 8);
        }
        other => panic!("expected a truncated value, got {:?}", other.map(|_| ())),
    }

    assert!(matches!(rows.next(), Err(Error::State(_))));
    assert_eq!(rows.state(), RowsState::Failed);
    assert_eq!(rows.buffered_bytes(), 0);

    drop(rows);
    drop(stmt);
    conn.close();
    assert_eq!(mock.handle_stats().outstanding, 0);

    Ok(())
}

#[test]
fn it_hides_rolled_back_changes_from_a_new_connection() -> anyhow::Result<()> {
    let (_mock, options) = setup();

    let mut conn = Oci8Connection::establish(&options)?;
    conn.begin()?;
    assert!(conn.in_transaction());

    let result = conn.execute(
        "UPDATE t SET name = :1 WHERE id = :2",
        args([Oci8Value::Text("uno".into()), Oci8Value::Integer(1)]),
    )?;
    assert_eq!(result.rows_affected()?, 1);

    conn.rollback()?;
    assert!(!conn.in_transaction());

    let mut other = Oci8Connection::establish(&options)?;
    let rows = other.fetch_all("SELECT name FROM t WHERE id = 1", Oci8Arguments::default())?;

    assert_eq!(rows[0].try_get::<String, _>("name")?, "one");

    Ok(())
}

#[test]
fn it_keeps_committed_changes() -> anyhow::Result<()> {
    let (mock, options) = setup();

    let mut conn = Oci8Connection::establish(&options)?;
    let mut tx = conn.begin_transaction()?;
    tx.execute(
        "INSERT INTO t (id, name) VALUES (:1, :2)",
        args([Oci8Value::Integer(3), Oci8Value::Text("three".into())]),
    )?;
    tx.commit()?;

    // a dropped transaction rolls back
    {
        let mut tx = conn.begin_transaction()?;
        tx.execute("DELETE FROM t", Oci8Arguments::default())?;
    }

    conn.close();

    assert_eq!(mock.table_rows("t").len(), 3);
    assert_eq!(mock.count(MockCall::TransCommit), 1);
    assert_eq!(mock.count(MockCall::TransRollback), 1);

    Ok(())
}

#[test]
fn it_rolls_back_an_open_transaction_on_close() -> anyhow::Result<()> {
    let (mock, options) = setup();

    let mut conn = Oci8Connection::establish(&options)?;
    conn.begin()?;
    conn.execute("DELETE FROM t WHERE id = 2", Oci8Arguments::default())?;
    assert_eq!(mock.table_rows("t").len(), 1);

    conn.close();

    assert_eq!(mock.table_rows("t").len(), 2);
    assert!(mock.calls().contains(&MockCall::TransRollback));

    Ok(())
}

#[test]
fn it_rejects_nested_transactions() -> anyhow::Result<()> {
    let (_mock, options) = setup();
    let mut conn = Oci8Connection::establish(&options)?;

    conn.begin()?;
    assert!(matches!(conn.begin(), Err(Error::State(_))));
    conn.commit()?;
    assert!(matches!(conn.commit(), Err(Error::State(_))));

    Ok(())
}

#[test]
fn it_clears_the_transaction_after_a_failed_commit() -> anyhow::Result<()> {
    let (mock, options) = setup();
    let mut conn = Oci8Connection::establish(&options)?;

    conn.begin()?;
    conn.execute("DELETE FROM t WHERE id = 1", Oci8Arguments::default())?;

    mock.inject(MockFault::error(
        MockCall::TransCommit,
        2091,
        "ORA-02091: transaction rolled back",
    ));

    let err = conn.commit().unwrap_err();
    assert_eq!(err.as_database_error().map(|e| e.code()), Some(2091));
    assert!(!conn.in_transaction());

    // a new transaction can start right away
    conn.begin()?;
    assert!(conn.in_transaction());
    conn.rollback()?;

    Ok(())
}

#[test]
fn it_accepts_an_informational_status_as_success() -> anyhow::Result<()> {
    let (mock, options) = setup();
    let mut conn = Oci8Connection::establish(&options)?;

    mock.inject(MockFault::status(MockCall::Ping, OCI_SUCCESS_WITH_INFO));
    conn.ping()?;

    assert!(!conn.is_closed());
    conn.ping()?;

    Ok(())
}

#[test]
fn it_retries_while_the_server_is_still_executing() -> anyhow::Result<()> {
    let (mock, options) = setup();
    let mut conn = Oci8Connection::establish(&options)?;

    mock.inject(MockFault::status(MockCall::StmtExecute, OCI_STILL_EXECUTING).times(3));

    let mut stmt = conn.prepare("UPDATE t SET name = 'uno' WHERE id = 1")?;
    let result = stmt.execute()?;

    assert_eq!(result.rows_affected()?, 1);
    assert_eq!(mock.count(MockCall::StmtExecute), 4);
    assert_eq!(mock.table_rows("t")[0][1], Oci8Value::Text("uno".into()));

    Ok(())
}

#[test]
fn it_breaks_a_still_executing_statement_when_cancelled() -> anyhow::Result<()> {
    let (mock, options) = setup();
    let mut conn = Oci8Connection::establish(&options)?;

    mock.inject(MockFault::status(MockCall::StmtExecute, OCI_STILL_EXECUTING).times(usize::MAX));

    let mut stmt = conn.prepare("UPDATE t SET name = 'uno' WHERE id = 1")?;
    let cancel = CancelSignal::new();

    let canceller = {
        let cancel = cancel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            cancel.cancel();
        })
    };

    let result = stmt.execute_with(&cancel);
    canceller.join().expect("canceller thread");

    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(mock.count(MockCall::Break) >= 1);
    assert!(mock.count(MockCall::StmtExecute) >= 1);

    Ok(())
}

#[test]
fn it_binds_each_occurrence_of_a_repeated_name() -> anyhow::Result<()> {
    let (_mock, options) = setup();
    let mut conn = Oci8Connection::establish(&options)?;

    let sql = "SELECT name FROM t WHERE id = :v AND id = :v";

    let err = conn.fetch_all(sql, args([Oci8Value::Integer(1)])).unwrap_err();
    assert!(matches!(
        err,
        Error::Bind(BindError::CountMismatch { expected: 2, actual: 1 })
    ));

    let rows = conn.fetch_all(sql, args([Oci8Value::Integer(1), Oci8Value::Integer(1)]))?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].try_get::<String, _>("name")?, "one");

    Ok(())
}

#[test]
fn it_reports_row_ids() -> anyhow::Result<()> {
    let (_mock, options) = setup();
    let mut conn = Oci8Connection::establish(&options)?;

    let inserted = conn.execute(
        "INSERT INTO t VALUES (:1, :2)",
        args([Oci8Value::Integer(7), Oci8Value::Text("seven".into())]),
    )?;
    let row_id = inserted.row_id()?;
    assert!(!row_id.is_empty());
    assert_eq!(inserted.row_id()?, row_id);

    let missed = conn.execute(
        "UPDATE t SET name = 'none' WHERE id = :1",
        args([Oci8Value::Integer(99)]),
    )?;
    assert_eq!(missed.rows_affected()?, 0);

    let err = missed.row_id().unwrap_err();
    assert!(err.is_no_row_id());

    Ok(())
}

#[test]
fn it_classifies_constraint_violations() -> anyhow::Result<()> {
    let (mock, options) = setup();
    let mut conn = Oci8Connection::establish(&options)?;

    let err = conn
        .execute(
            "INSERT INTO t VALUES (:1, :2)",
            args([Oci8Value::Integer(1), Oci8Value::Text("again".into())]),
        )
        .unwrap_err();

    let db = err.as_database_error().expect("a database error");
    assert_eq!(db.code(), 1);
    assert_eq!(db.kind(), ErrorKind::UniqueViolation);
    assert!(matches!(err, Error::Execute(_)));

    let err = conn
        .execute(
            "INSERT INTO t (name) VALUES (:1)",
            args([Oci8Value::Text("anonymous".into())]),
        )
        .unwrap_err();
    assert_eq!(
        err.as_database_error().map(|e| e.kind()),
        Some(ErrorKind::NotNullViolation)
    );

    assert_eq!(mock.table_rows("t").len(), 2);

    Ok(())
}

#[test]
fn it_runs_batches() -> anyhow::Result<()> {
    let (mock, options) = setup();
    let mut conn = Oci8Connection::establish(&options)?;

    let mut batch = Oci8Arguments::default();
    for (id, name) in [(10, "ten"), (11, "eleven"), (12, "twelve")] {
        if !batch.is_empty() {
            batch.next_row();
        }
        batch.add(id);
        batch.add(name);
    }
    assert_eq!(batch.batch_size(), 3);

    let result = conn.execute("INSERT INTO t VALUES (:1, :2)", batch)?;

    assert_eq!(result.rows_affected()?, 3);
    assert_eq!(mock.table_rows("t").len(), 5);

    Ok(())
}

#[test]
fn it_reverts_a_batch_that_fails_halfway() -> anyhow::Result<()> {
    let (mock, options) = setup();
    let mut conn = Oci8Connection::establish(&options)?;

    let mut batch = Oci8Arguments::default();
    batch.add(20);
    batch.next_row();
    batch.add(1);

    let err = conn
        .execute("INSERT INTO t (id) VALUES (:1)", batch)
        .unwrap_err();

    assert_eq!(err.as_database_error().map(|e| e.code()), Some(1));
    assert_eq!(mock.table_rows("t").len(), 2);

    Ok(())
}

#[test]
fn it_sends_long_values_in_pieces() -> anyhow::Result<()> {
    let (mock, options) = setup();
    let mut conn = Oci8Connection::establish(&options.piece_size(4))?;

    conn.execute(
        "INSERT INTO t VALUES (:1, :2)",
        args([Oci8Value::Integer(5), Oci8Value::Text("abcdefghij".into())]),
    )?;

    let pieces: Vec<_> = mock
        .calls()
        .into_iter()
        .filter(|call| matches!(call, MockCall::StmtSetPiece(_)))
        .collect();
    assert_eq!(pieces.len(), 3);

    let rows = mock.table_rows("t");
    assert_eq!(rows[2][1], Oci8Value::Text("abcdefghij".into()));

    Ok(())
}

#[test]
fn it_calls_procedures_with_output_parameters() -> anyhow::Result<()> {
    let (mock, options) = setup();
    mock.register_procedure("add_one", |args| {
        let Oci8Value::Integer(n) = args[0] else {
            return Err((6502, "PL/SQL: numeric or value error".into()));
        };
        args[1] = Oci8Value::Integer(n + 1);
        Ok(())
    });

    let mut conn = Oci8Connection::establish(&options)?;

    let mut call = Oci8Arguments::default();
    call.add_named("x", 41_i64);
    call.add_argument(Oci8Argument::output(Oci8TypeInfo::NUMBER, 0).named("total"));

    let result = conn.execute("BEGIN add_one(:x, :total); END;", call)?;

    let total = result.out_values()[0].try_decode::<i64>()?;
    assert_eq!(total, 42);
    assert!(result.out_value(":total").is_some());
    assert!(result.out_value("x").is_none());

    Ok(())
}

#[test]
fn it_surfaces_unknown_tables() -> anyhow::Result<()> {
    let (mock, options) = setup();
    let mut conn = Oci8Connection::establish(&options)?;

    let err = conn
        .fetch_all("SELECT * FROM missing", Oci8Arguments::default())
        .unwrap_err();

    assert_eq!(err.as_database_error().map(|e| e.code()), Some(942));
    assert!(err.to_string().contains("ORA-00942"));

    // the failed statement was released with its handle
    conn.close();
    assert_eq!(mock.handle_stats().outstanding, 0);

    Ok(())
}
