use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::capability::{CustomCapability, DriverCapability};
use crate::config::ConnectionDescriptor;
use crate::driver::{Driver, DriverConnection, DriverStatement, apply_length};
use crate::error::SqlReconnectError;
use crate::results::ResultSet;
use crate::types::{DatabaseType, ParamKey, RowValues};

/// Driver operations a failure can be scripted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptedOp {
    Connect,
    Query,
    Execute,
    Raw,
    Batch,
    Prepare,
    ExecutePrepared,
}

/// Everything the fake driver was asked to do, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    Connect { generation: u64 },
    Close { generation: u64 },
    Query { sql: String, params: Vec<RowValues> },
    Execute { sql: String, params: Vec<RowValues> },
    Raw { sql: String },
    Batch { sql: String },
    Prepare { sql: String },
    Bind { key: ParamKey, value: RowValues },
    ExecutePrepared { sql: String, bound: Vec<(ParamKey, RowValues)> },
}

/// Capability recognising `MySQL`'s wording: "gone away" reconnects, DNS failures stall,
/// "try restarting transaction" is lock contention.
#[must_use]
pub fn mysql_like_capability() -> Arc<dyn DriverCapability> {
    Arc::new(
        CustomCapability::new(["MySQL server has gone away", "getaddrinfo failed"])
            .with_stall_on(["getaddrinfo failed"])
            .with_lock_signatures(["try restarting transaction"]),
    )
}

#[derive(Debug)]
struct ScriptState {
    failures: HashMap<ScriptedOp, VecDeque<String>>,
    events: Vec<DriverEvent>,
    connects: u64,
    closes: u64,
    result: ResultSet,
    affected_rows: usize,
}

impl ScriptState {
    /// Record `event`, then fail if a failure is queued for `op`.
    fn step(&mut self, op: ScriptedOp, event: DriverEvent) -> Result<(), SqlReconnectError> {
        self.events.push(event);
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(message) if op == ScriptedOp::Connect => {
                Err(SqlReconnectError::ConnectionError(message))
            }
            Some(message) => Err(SqlReconnectError::ExecutionError(message)),
            None => Ok(()),
        }
    }
}

/// In-memory driver that records every call and fails on demand.
///
/// Clones share state, so a test keeps one clone to inspect what the connection did
/// with the other.
#[derive(Debug, Clone)]
pub struct ScriptedDriver {
    state: Arc<Mutex<ScriptState>>,
    capability: Option<Arc<dyn DriverCapability>>,
    database_type: DatabaseType,
}

impl Default for ScriptedDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedDriver {
    /// Every query returns one row `value = 1`; every update affects one row.
    #[must_use]
    pub fn new() -> Self {
        let mut result = ResultSet::with_capacity(1);
        result.set_column_names(Arc::new(vec!["value".to_string()]));
        result.add_row_values(vec![RowValues::Int(1)]);
        Self {
            state: Arc::new(Mutex::new(ScriptState {
                failures: HashMap::new(),
                events: Vec::new(),
                connects: 0,
                closes: 0,
                result,
                affected_rows: 1,
            })),
            capability: Some(mysql_like_capability()),
            database_type: DatabaseType::Mysql,
        }
    }

    #[must_use]
    pub fn with_capability(mut self, capability: Option<Arc<dyn DriverCapability>>) -> Self {
        self.capability = capability;
        self
    }

    #[must_use]
    pub fn with_database_type(mut self, database_type: DatabaseType) -> Self {
        self.database_type = database_type;
        self
    }

    #[must_use]
    pub fn with_result(self, result: ResultSet) -> Self {
        self.lock().result = result;
        self
    }

    #[must_use]
    pub fn with_affected_rows(self, affected_rows: usize) -> Self {
        self.lock().affected_rows = affected_rows;
        self
    }

    /// Queue one failure for the next `op`.
    pub fn fail_next(&self, op: ScriptedOp, message: impl Into<String>) {
        self.fail_times(op, 1, message);
    }

    /// Queue `times` identical failures for `op`.
    pub fn fail_times(&self, op: ScriptedOp, times: usize, message: impl Into<String>) {
        let message = message.into();
        let mut state = self.lock();
        let queue = state.failures.entry(op).or_default();
        for _ in 0..times {
            queue.push_back(message.clone());
        }
    }

    #[must_use]
    pub fn events(&self) -> Vec<DriverEvent> {
        self.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.lock().events.clear();
    }

    #[must_use]
    pub fn connect_count(&self) -> u64 {
        self.lock().connects
    }

    #[must_use]
    pub fn close_count(&self) -> u64 {
        self.lock().closes
    }

    /// Number of recorded attempts of `op`, failed ones included.
    #[must_use]
    pub fn attempts(&self, op: ScriptedOp) -> usize {
        self.lock()
            .events
            .iter()
            .filter(|event| {
                matches!(
                    (op, event),
                    (ScriptedOp::Connect, DriverEvent::Connect { .. })
                        | (ScriptedOp::Query, DriverEvent::Query { .. })
                        | (ScriptedOp::Execute, DriverEvent::Execute { .. })
                        | (ScriptedOp::Raw, DriverEvent::Raw { .. })
                        | (ScriptedOp::Batch, DriverEvent::Batch { .. })
                        | (ScriptedOp::Prepare, DriverEvent::Prepare { .. })
                        | (
                            ScriptedOp::ExecutePrepared,
                            DriverEvent::ExecutePrepared { .. }
                        )
                )
            })
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Driver for ScriptedDriver {
    type Connection = ScriptedConnection;

    fn database_type(&self) -> DatabaseType {
        self.database_type
    }

    fn capability(&self) -> Option<Arc<dyn DriverCapability>> {
        self.capability.clone()
    }

    async fn connect(
        &self,
        _descriptor: &ConnectionDescriptor,
    ) -> Result<ScriptedConnection, SqlReconnectError> {
        let mut state = self.lock();
        let generation = state.connects + 1;
        state.step(ScriptedOp::Connect, DriverEvent::Connect { generation })?;
        state.connects = generation;
        Ok(ScriptedConnection {
            driver: self.clone(),
            generation,
        })
    }
}

/// A session handed out by [`ScriptedDriver`].
#[derive(Debug)]
pub struct ScriptedConnection {
    driver: ScriptedDriver,
    generation: u64,
}

impl ScriptedConnection {
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Statement half of the fake driver; keeps bindings in first-bound order.
#[derive(Debug)]
pub struct ScriptedStatement {
    driver: ScriptedDriver,
    sql: String,
    bound: Vec<(ParamKey, RowValues)>,
}

impl DriverStatement for ScriptedStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn bind(
        &mut self,
        key: &ParamKey,
        value: RowValues,
        length: Option<usize>,
    ) -> Result<(), SqlReconnectError> {
        let value = apply_length(value, length);
        self.driver.lock().events.push(DriverEvent::Bind {
            key: key.clone(),
            value: value.clone(),
        });
        match self.bound.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.bound.push((key.clone(), value)),
        }
        Ok(())
    }
}

#[async_trait]
impl DriverConnection for ScriptedConnection {
    type Statement = ScriptedStatement;

    async fn query(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, SqlReconnectError> {
        let mut state = self.driver.lock();
        state.step(
            ScriptedOp::Query,
            DriverEvent::Query {
                sql: sql.to_string(),
                params: params.to_vec(),
            },
        )?;
        Ok(state.result.clone())
    }

    async fn execute(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<usize, SqlReconnectError> {
        let mut state = self.driver.lock();
        state.step(
            ScriptedOp::Execute,
            DriverEvent::Execute {
                sql: sql.to_string(),
                params: params.to_vec(),
            },
        )?;
        Ok(state.affected_rows)
    }

    async fn query_raw(&mut self, sql: &str) -> Result<ResultSet, SqlReconnectError> {
        let mut state = self.driver.lock();
        state.step(ScriptedOp::Raw, DriverEvent::Raw { sql: sql.to_string() })?;
        Ok(state.result.clone())
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<(), SqlReconnectError> {
        self.driver
            .lock()
            .step(ScriptedOp::Batch, DriverEvent::Batch { sql: sql.to_string() })
    }

    async fn prepare(&mut self, sql: &str) -> Result<ScriptedStatement, SqlReconnectError> {
        self.driver
            .lock()
            .step(ScriptedOp::Prepare, DriverEvent::Prepare { sql: sql.to_string() })?;
        Ok(ScriptedStatement {
            driver: self.driver.clone(),
            sql: sql.to_string(),
            bound: Vec::new(),
        })
    }

    async fn execute_prepared(
        &mut self,
        statement: &mut ScriptedStatement,
    ) -> Result<ResultSet, SqlReconnectError> {
        let mut state = self.driver.lock();
        state.step(
            ScriptedOp::ExecutePrepared,
            DriverEvent::ExecutePrepared {
                sql: statement.sql.clone(),
                bound: statement.bound.clone(),
            },
        )?;
        Ok(state.result.clone())
    }

    async fn close(self) -> Result<(), SqlReconnectError> {
        let mut state = self.driver.lock();
        state.closes += 1;
        state.events.push(DriverEvent::Close {
            generation: self.generation,
        });
        Ok(())
    }
}
