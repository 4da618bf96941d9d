#![cfg(feature = "sqlite")]

use std::time::Duration;

use serde_json::json;
use sql_reconnect::prelude::*;
use tempfile::TempDir;

fn file_config(dir: &TempDir) -> ConnectionConfig {
    let path = dir.path().join("app.db");
    ConnectionConfig::builder(ConnectionDescriptor::path(path.to_string_lossy()))
        .reconnect_attempts(2)
        .transaction_restart_delay(Duration::from_millis(100))
        .build()
        .unwrap()
}

async fn open(dir: &TempDir) -> ResilientConnection<SqliteDriver> {
    let conn = ResilientConnection::connect(SqliteDriver::default(), file_config(dir))
        .await
        .unwrap();
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, profile TEXT)",
    )
    .await
    .unwrap();
    conn
}

async fn count(conn: &ResilientConnection<SqliteDriver>) -> i64 {
    let rs = conn
        .run_query("SELECT COUNT(*) AS n FROM users", &[], &[])
        .await
        .unwrap();
    *rs.scalar().and_then(RowValues::as_int).unwrap()
}

#[tokio::test]
async fn data_survives_close_and_lazy_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let conn = open(&dir).await;
    assert!(conn.is_resilient());

    let inserted = conn
        .run_update(
            "INSERT INTO users (id, name) VALUES (?1, ?2)",
            &[RowValues::Int(1), RowValues::Text("alice".into())],
            &[],
        )
        .await
        .unwrap();
    assert_eq!(inserted, 1);

    conn.close().await.unwrap();
    assert!(!conn.is_connected().await);

    assert_eq!(count(&conn).await, 1);
    assert_eq!(conn.reconnect_count(), 1);
    assert_eq!(conn.generation().await, 2);
}

#[tokio::test]
async fn nested_transactions_map_to_savepoints() {
    let dir = tempfile::tempdir().unwrap();
    let conn = open(&dir).await;
    let insert = "INSERT INTO users (name) VALUES (?1)";

    conn.begin_transaction().await.unwrap();
    conn.run_update(insert, &[RowValues::Text("outer".into())], &[])
        .await
        .unwrap();

    conn.begin_transaction().await.unwrap();
    assert_eq!(conn.transaction_nesting_level().await, 2);
    conn.run_update(insert, &[RowValues::Text("inner".into())], &[])
        .await
        .unwrap();
    conn.rollback().await.unwrap();

    conn.begin_transaction().await.unwrap();
    conn.run_update(insert, &[RowValues::Text("kept".into())], &[])
        .await
        .unwrap();
    conn.commit().await.unwrap();
    conn.commit().await.unwrap();
    assert!(!conn.is_transaction_active().await);

    let rs = conn
        .run_query("SELECT name FROM users ORDER BY id", &[], &[])
        .await
        .unwrap();
    let names: Vec<_> = rs
        .results
        .iter()
        .filter_map(|row| row.get("name").and_then(RowValues::as_text))
        .collect();
    assert_eq!(names, vec!["outer", "kept"]);
    assert!(conn.rollback().await.is_err());
}

#[tokio::test]
async fn rolled_back_transaction_leaves_no_rows() {
    let dir = tempfile::tempdir().unwrap();
    let conn = open(&dir).await;

    conn.begin_transaction().await.unwrap();
    conn.run_update(
        "INSERT INTO users (name) VALUES (?1)",
        &[RowValues::Text("ghost".into())],
        &[],
    )
    .await
    .unwrap();
    conn.rollback().await.unwrap();

    assert_eq!(count(&conn).await, 0);
}

#[tokio::test]
async fn prepared_statement_rebinds_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let conn = open(&dir).await;
    conn.execute_batch(
        "INSERT INTO users (id, name) VALUES (1, 'alice'); INSERT INTO users (id, name) VALUES (2, 'bob');",
    )
    .await
    .unwrap();

    let mut stmt = conn
        .prepare("SELECT name FROM users WHERE id = :id")
        .await
        .unwrap();
    stmt.bind_value("id", RowValues::Int(2), None).unwrap();
    let rs = stmt.execute(None).await.unwrap();
    assert_eq!(rs.scalar(), Some(&RowValues::Text("bob".into())));

    conn.close().await.unwrap();

    let rs = stmt.execute(None).await.unwrap();
    assert_eq!(rs.scalar(), Some(&RowValues::Text("bob".into())));
    assert_eq!(conn.reconnect_count(), 1);
}

#[tokio::test]
async fn reference_binding_drives_repeated_inserts() {
    let dir = tempfile::tempdir().unwrap();
    let conn = open(&dir).await;
    let mut stmt = conn
        .prepare("INSERT INTO users (name) VALUES (?1)")
        .await
        .unwrap();
    let name = ParamRef::new(RowValues::Null);
    stmt.bind_param(1usize, &name, Some(ParamType::String), Some(3))
        .unwrap();

    for value in ["carol", "dave", "erin"] {
        name.set(RowValues::Text(value.into()));
        assert_eq!(stmt.execute_update(None).await.unwrap(), 1);
    }

    let rs = conn
        .run_query("SELECT name FROM users ORDER BY id", &[], &[])
        .await
        .unwrap();
    let names: Vec<_> = rs
        .results
        .iter()
        .filter_map(|row| row.get("name").and_then(RowValues::as_text))
        .collect();
    assert_eq!(names, vec!["car", "dav", "eri"]);
}

#[tokio::test]
async fn codecs_decode_stored_columns() {
    let dir = tempfile::tempdir().unwrap();
    let conn = open(&dir).await;
    let profile = json!({"plan": "pro", "seats": 3});
    let stored = JsonCodec.encode(&profile).unwrap();
    conn.run_update(
        "INSERT INTO users (name, profile) VALUES (?1, ?2)",
        &[RowValues::Text("frank@example.org".into()), stored],
        &[],
    )
    .await
    .unwrap();

    let rs = conn
        .run_query("SELECT name, profile FROM users", &[], &[])
        .await
        .unwrap();
    let row = &rs.results[0];
    assert_eq!(row.get_decoded("profile", &JsonCodec).unwrap(), profile);
    let email = row.get_decoded("name", &EmailAddressCodec).unwrap();
    assert_eq!(email.domain(), "example.org");
    assert!(row.get_decoded("missing", &JsonCodec).is_err());
}

#[tokio::test]
async fn lock_safe_update_waits_out_a_writer() {
    let dir = tempfile::tempdir().unwrap();
    let writer = open(&dir).await;
    let driver = SqliteDriver::new(SqliteOptions::new().with_busy_timeout(Duration::ZERO));
    let contender = ResilientConnection::connect(driver, file_config(&dir))
        .await
        .unwrap();

    writer.begin_transaction().await.unwrap();
    writer
        .run_update("INSERT INTO users (name) VALUES ('writer')", &[], &[])
        .await
        .unwrap();

    let insert = "INSERT INTO users (name) VALUES ('contender')";
    let direct = contender.run_update(insert, &[], &[]).await;
    assert!(direct.unwrap_err().to_string().contains("database is locked"));

    let (contended, committed) = tokio::join!(
        contender.lock_safe_update(insert, &[], 20),
        async {
            tokio::time::sleep(Duration::from_millis(250)).await;
            writer.commit().await
        }
    );
    committed.unwrap();
    assert_eq!(contended.unwrap(), 1);
    assert_eq!(count(&writer).await, 2);
    // lock contention never reopens the session
    assert_eq!(contender.reconnect_count(), 0);
}

#[tokio::test]
async fn missing_path_is_a_config_error() {
    let config = ConnectionConfig::new(ConnectionDescriptor::default());
    let err = ResilientConnection::connect(SqliteDriver::default(), config)
        .await
        .unwrap_err();
    assert!(matches!(err, SqlReconnectError::ConfigError(_)));
}
