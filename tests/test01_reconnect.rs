#![cfg(feature = "test-utils")]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use sql_reconnect::capability::CustomCapability;
use sql_reconnect::config::ConnectionConfig;
use sql_reconnect::instrumentation::HookError;
use sql_reconnect::prelude::*;
use sql_reconnect::test_utils::{DriverEvent, ScriptedDriver, ScriptedOp, scripted_config};

const GONE_AWAY: &str = "SQLSTATE[HY000]: General error: 2006 MySQL server has gone away";
const DNS_FAILURE: &str = "SQLSTATE[HY000] [2002] php_network_getaddresses: getaddrinfo failed: Name or service not known";

async fn open(
    driver: &ScriptedDriver,
    attempts: u32,
) -> Result<ResilientConnection<ScriptedDriver>, SqlReconnectError> {
    ResilientConnection::connect(driver.clone(), scripted_config(attempts)).await
}

#[tokio::test]
async fn gone_away_twice_succeeds_on_third_attempt() -> Result<(), SqlReconnectError> {
    let driver = ScriptedDriver::new();
    let conn = open(&driver, 2).await?;
    driver.fail_times(ScriptedOp::Query, 2, GONE_AWAY);

    let rs = conn.run_query("SELECT 1", &[], &[]).await?;

    assert_eq!(rs.scalar(), Some(&RowValues::Int(1)));
    assert_eq!(driver.attempts(ScriptedOp::Query), 3);
    assert_eq!(driver.connect_count(), 3);
    assert_eq!(driver.close_count(), 2);
    assert_eq!(conn.reconnect_count(), 2);
    assert_eq!(conn.generation().await, 3);
    Ok(())
}

#[tokio::test]
async fn exhausted_budget_surfaces_last_driver_error() -> Result<(), SqlReconnectError> {
    let driver = ScriptedDriver::new();
    let conn = open(&driver, 2).await?;
    driver.fail_times(ScriptedOp::Query, 3, GONE_AWAY);

    let err = conn.run_query("SELECT 1", &[], &[]).await.unwrap_err();

    assert!(matches!(err, SqlReconnectError::ExecutionError(ref m) if m == GONE_AWAY));
    assert_eq!(driver.attempts(ScriptedOp::Query), 3);
    Ok(())
}

#[tokio::test]
async fn every_reconnect_closes_before_reopening() -> Result<(), SqlReconnectError> {
    let driver = ScriptedDriver::new();
    let conn = open(&driver, 1).await?;
    driver.clear_events();
    driver.fail_next(ScriptedOp::Raw, GONE_AWAY);

    conn.run_raw("SHOW STATUS").await?;

    assert_eq!(
        driver.events(),
        vec![
            DriverEvent::Raw {
                sql: "SHOW STATUS".into()
            },
            DriverEvent::Close { generation: 1 },
            DriverEvent::Connect { generation: 2 },
            DriverEvent::Raw {
                sql: "SHOW STATUS".into()
            },
        ]
    );
    Ok(())
}

#[tokio::test]
async fn non_transient_errors_are_not_retried() -> Result<(), SqlReconnectError> {
    let driver = ScriptedDriver::new();
    let conn = open(&driver, 3).await?;
    driver.fail_next(ScriptedOp::Execute, "You have an error in your SQL syntax");

    let err = conn
        .run_update("UPDTE t SET a = 1", &[], &[])
        .await
        .unwrap_err();

    assert!(err.to_string().contains("SQL syntax"));
    assert_eq!(driver.attempts(ScriptedOp::Execute), 1);
    assert_eq!(driver.connect_count(), 1);
    Ok(())
}

#[tokio::test]
async fn open_transaction_refuses_reconnect() -> Result<(), SqlReconnectError> {
    let driver = ScriptedDriver::new();
    let conn = open(&driver, 3).await?;
    conn.begin_transaction().await?;
    driver.fail_next(ScriptedOp::Execute, GONE_AWAY);

    let err = conn
        .run_update("UPDATE t SET a = 1", &[], &[])
        .await
        .unwrap_err();

    assert!(err.to_string().contains("gone away"));
    assert_eq!(driver.attempts(ScriptedOp::Execute), 1);
    assert_eq!(driver.connect_count(), 1);
    assert_eq!(conn.transaction_nesting_level().await, 1);
    Ok(())
}

#[tokio::test]
async fn nested_levels_use_savepoints() -> Result<(), SqlReconnectError> {
    let driver = ScriptedDriver::new();
    let conn = open(&driver, 1).await?;
    driver.clear_events();

    conn.begin_transaction().await?;
    conn.begin_transaction().await?;
    assert_eq!(conn.transaction_nesting_level().await, 2);
    driver.fail_next(ScriptedOp::Batch, "savepoint does not exist");
    assert!(conn.rollback().await.is_err());
    assert_eq!(conn.transaction_nesting_level().await, 1);
    conn.commit().await?;
    assert!(!conn.is_transaction_active().await);
    assert!(conn.commit().await.is_err());

    let batches: Vec<_> = driver
        .events()
        .into_iter()
        .filter_map(|event| match event {
            DriverEvent::Batch { sql } => Some(sql),
            _ => None,
        })
        .collect();
    assert_eq!(
        batches,
        vec![
            "BEGIN",
            "SAVEPOINT sqlreconnect_1",
            "ROLLBACK TO SAVEPOINT sqlreconnect_1",
            "COMMIT",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn missing_capability_means_single_attempt() -> Result<(), SqlReconnectError> {
    let driver = ScriptedDriver::new().with_capability(None);
    let conn = ResilientConnection::builder(driver.clone(), scripted_config(5))
        .connect()
        .await?;
    driver.fail_next(ScriptedOp::Query, GONE_AWAY);

    assert!(!conn.is_resilient());
    assert_eq!(conn.attempt_budget(), 0);
    assert!(conn.run_query("SELECT 1", &[], &[]).await.is_err());
    assert_eq!(driver.attempts(ScriptedOp::Query), 1);
    Ok(())
}

#[tokio::test]
async fn descriptor_override_sets_the_budget() -> Result<(), SqlReconnectError> {
    let mut config = scripted_config(5);
    config.descriptor.driver_options.reconnect_attempts = Some(1);
    let driver = ScriptedDriver::new();
    let conn = ResilientConnection::connect(driver.clone(), config.clone()).await?;
    assert_eq!(conn.attempt_budget(), 1);

    let no_signatures: Arc<dyn DriverCapability> =
        Arc::new(CustomCapability::new(Vec::<String>::new()));
    let conn = ResilientConnection::builder(driver, config)
        .capability(Some(no_signatures))
        .build()?;
    assert_eq!(conn.attempt_budget(), 0);
    assert!(!conn.is_resilient());
    Ok(())
}

#[tokio::test]
async fn close_is_idempotent_and_reopens_lazily() -> Result<(), SqlReconnectError> {
    let driver = ScriptedDriver::new();
    let conn = open(&driver, 1).await?;

    conn.close().await?;
    conn.close().await?;
    assert_eq!(driver.close_count(), 1);
    assert!(!conn.is_connected().await);

    conn.run_update("DELETE FROM t", &[], &[]).await?;
    assert!(conn.is_connected().await);
    assert_eq!(driver.connect_count(), 2);
    assert_eq!(conn.reconnect_count(), 1);
    Ok(())
}

#[tokio::test]
async fn build_does_not_connect() -> Result<(), SqlReconnectError> {
    let driver = ScriptedDriver::new();
    let conn = ResilientConnection::builder(driver.clone(), scripted_config(1)).build()?;
    assert_eq!(driver.connect_count(), 0);
    conn.execute_batch("CREATE TABLE t (a INT)").await?;
    assert_eq!(driver.connect_count(), 1);
    assert_eq!(conn.reconnect_count(), 0);
    Ok(())
}

#[tokio::test]
async fn dns_failure_at_connect_stalls_then_retries() -> Result<(), SqlReconnectError> {
    let config = ConnectionConfig::builder(scripted_config(1).descriptor)
        .reconnect_attempts(1)
        .transaction_restart_delay(Duration::from_millis(150))
        .build()?;
    let driver = ScriptedDriver::new();
    driver.fail_next(ScriptedOp::Connect, DNS_FAILURE);

    let started = Instant::now();
    let conn = ResilientConnection::connect(driver.clone(), config).await?;

    assert!(started.elapsed() >= Duration::from_millis(150));
    assert!(conn.is_connected().await);
    assert_eq!(driver.attempts(ScriptedOp::Connect), 2);
    Ok(())
}

#[tokio::test]
async fn plain_disconnect_does_not_stall() -> Result<(), SqlReconnectError> {
    let config = ConnectionConfig::builder(scripted_config(1).descriptor)
        .reconnect_attempts(1)
        .transaction_restart_delay(Duration::from_secs(5))
        .build()?;
    let driver = ScriptedDriver::new();
    let conn = ResilientConnection::connect(driver.clone(), config).await?;
    driver.fail_next(ScriptedOp::Query, GONE_AWAY);

    let started = Instant::now();
    conn.run_query("SELECT 1", &[], &[]).await?;
    assert!(started.elapsed() < Duration::from_secs(5));
    Ok(())
}

#[tokio::test]
async fn declared_types_coerce_before_the_driver() -> Result<(), SqlReconnectError> {
    let driver = ScriptedDriver::new();
    let conn = open(&driver, 1).await?;
    driver.clear_events();

    conn.run_update(
        "UPDATE t SET flag = ?, n = ?",
        &[RowValues::Int(1), RowValues::Text("12".into())],
        &[Some(ParamType::Boolean), Some(ParamType::Integer)],
    )
    .await?;

    assert_eq!(
        driver.events(),
        vec![DriverEvent::Execute {
            sql: "UPDATE t SET flag = ?, n = ?".into(),
            params: vec![RowValues::Bool(true), RowValues::Int(12)],
        }]
    );
    Ok(())
}

#[derive(Debug, Default)]
struct CountingLogger {
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl QueryLogger for CountingLogger {
    fn start_query(&self, _sql: &str) -> Result<(), HookError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Err("logger backend unavailable".into())
    }

    fn stop_query(&self) -> Result<(), HookError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn logger_brackets_every_attempt_and_failures_are_ignored() -> Result<(), SqlReconnectError>
{
    let logger = Arc::new(CountingLogger::default());
    let driver = ScriptedDriver::new();
    let conn = ResilientConnection::builder(driver.clone(), scripted_config(1))
        .logger(logger.clone())
        .connect()
        .await?;
    driver.fail_next(ScriptedOp::Query, GONE_AWAY);

    conn.run_query("SELECT 1", &[], &[]).await?;

    assert_eq!(logger.starts.load(Ordering::SeqCst), 2);
    assert_eq!(logger.stops.load(Ordering::SeqCst), 2);
    Ok(())
}
