#![cfg(feature = "postgres")]

use std::env;
use std::time::Duration;

use sql_reconnect::prelude::*;
use tokio_postgres::NoTls;

/// Live-server settings, or `None` when `TESTING_PG_HOST` is not set.
fn live_config() -> Option<ConnectionConfig> {
    let host = env::var("TESTING_PG_HOST").ok()?;
    let port = env::var("TESTING_PG_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(5432);
    let descriptor = ConnectionDescriptor::server(host, port)
        .with_credentials(
            env::var("TESTING_PG_USER").unwrap_or_else(|_| "postgres".to_string()),
            env::var("TESTING_PG_PASSWORD").unwrap_or_default(),
        )
        .with_dbname(env::var("TESTING_PG_DBNAME").unwrap_or_else(|_| "postgres".to_string()));
    Some(
        ConnectionConfig::builder(descriptor)
            .reconnect_attempts(2)
            .transaction_restart_delay(Duration::from_millis(200))
            .build()
            .unwrap(),
    )
}

async fn backend_pid(conn: &ResilientConnection<PostgresDriver>) -> i64 {
    let rs = conn
        .run_query("SELECT pg_backend_pid()::BIGINT AS pid", &[], &[])
        .await
        .unwrap();
    *rs.scalar().and_then(RowValues::as_int).unwrap()
}

/// Kill `pid` from a separate, unwrapped session.
async fn terminate(config: &ConnectionConfig, pid: i64) {
    let d = &config.descriptor;
    let mut pg = tokio_postgres::Config::new();
    pg.host(d.host.as_deref().unwrap())
        .port(d.port.unwrap_or(5432))
        .user(d.user.as_deref().unwrap())
        .password(d.password.clone().unwrap_or_default())
        .dbname(d.dbname.as_deref().unwrap());
    let (client, connection) = pg.connect(NoTls).await.unwrap();
    let task = tokio::spawn(connection);
    client
        .execute(
            "SELECT pg_terminate_backend($1::INT)",
            &[&i32::try_from(pid).unwrap()],
        )
        .await
        .unwrap();
    drop(client);
    let _ = task.await;
}

#[tokio::test]
async fn terminated_backend_is_replaced() {
    let Some(config) = live_config() else {
        eprintln!("TESTING_PG_HOST not set; skipping live postgres test");
        return;
    };
    let conn = ResilientConnection::connect(PostgresDriver, config.clone())
        .await
        .unwrap();
    assert!(conn.is_resilient());

    let first = backend_pid(&conn).await;
    terminate(&config, first).await;

    let second = backend_pid(&conn).await;
    assert_ne!(first, second);
    assert_eq!(conn.reconnect_count(), 1);
}

#[tokio::test]
async fn prepared_statement_survives_terminated_backend() {
    let Some(config) = live_config() else {
        return;
    };
    let conn = ResilientConnection::connect(PostgresDriver, config.clone())
        .await
        .unwrap();
    let mut stmt = conn
        .prepare("SELECT $1::BIGINT + $2::BIGINT AS total")
        .await
        .unwrap();
    stmt.bind_value(1usize, RowValues::Int(40), None).unwrap();
    stmt.bind_value(2usize, RowValues::Int(2), None).unwrap();

    let pid = backend_pid(&conn).await;
    terminate(&config, pid).await;

    let rs = stmt.execute(None).await.unwrap();
    assert_eq!(rs.scalar(), Some(&RowValues::Int(42)));
    assert!(stmt.bind_value("name", RowValues::Int(1), None).is_err());
}

#[tokio::test]
async fn terminated_backend_inside_transaction_is_reported() {
    let Some(config) = live_config() else {
        return;
    };
    let conn = ResilientConnection::connect(PostgresDriver, config.clone())
        .await
        .unwrap();
    conn.begin_transaction().await.unwrap();
    let pid = backend_pid(&conn).await;
    terminate(&config, pid).await;

    assert!(conn.run_query("SELECT 1", &[], &[]).await.is_err());
    assert_eq!(conn.reconnect_count(), 0);

    // closing resets the level; the next call reopens
    conn.close().await.unwrap();
    assert!(!conn.is_transaction_active().await);
    assert!(backend_pid(&conn).await > 0);
}
