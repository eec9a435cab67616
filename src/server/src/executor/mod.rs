use crate::acl::UserIdentity;
use crate::datasource::Value;
use crate::protocol::mysql::basic::Column;
use crate::protocol::mysql::binary::BinValue;

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

/// What the session hands the external executor along with the SQL text.
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub identity: UserIdentity,
    pub database: Option<String>,
    pub connection_id: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone)]
pub enum QueryOutput {
    ResultSet(ResultSet),
    Ok {
        affected_rows: u64,
        last_insert_id: u64,
        info: String,
    },
}

/// Session-observable side effects reported alongside a statement's result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStateChange {
    Database(String),
    SystemVariable { name: String, value: String },
    IsolationLevel(String),
}

/// One statement's worth of reply. A multi-statement batch yields several;
/// the session marks all but the last with SERVER_MORE_RESULTS_EXISTS.
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub output: QueryOutput,
    /// Transaction event: `Some(true)` entered, `Some(false)` left.
    pub in_transaction: Option<bool>,
    pub state_changes: Vec<SessionStateChange>,
}

impl ExecOutcome {
    pub fn ok() -> Self {
        ExecOutcome {
            output: QueryOutput::Ok {
                affected_rows: 0,
                last_insert_id: 0,
                info: String::new(),
            },
            in_transaction: None,
            state_changes: Vec::new(),
        }
    }

    pub fn result_set(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Self {
        ExecOutcome {
            output: QueryOutput::ResultSet(ResultSet { columns, rows }),
            in_transaction: None,
            state_changes: Vec::new(),
        }
    }
}

/// Metadata of a statement the external parser prepared.
#[derive(Debug, Clone, Default)]
pub struct PreparedInfo {
    pub params: Vec<Column>,
    pub columns: Vec<Column>,
}

#[derive(Debug, Clone, Error)]
#[error("executor error {code}: {message}")]
pub struct ExecutorError {
    pub code: u16,
    pub sqlstate: [u8; 5],
    pub message: String,
}

impl ExecutorError {
    pub fn new(code: u16, sqlstate: &[u8; 5], message: impl Into<String>) -> Self {
        ExecutorError {
            code,
            sqlstate: *sqlstate,
            message: message.into(),
        }
    }
}

/// The external SQL parser/planner/executor, seen from the session as a
/// typed interface. Parsing and planning never happen inside the front-end.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn query(
        &self,
        ctx: &QueryContext,
        sql: &str,
    ) -> Result<Vec<ExecOutcome>, ExecutorError>;

    async fn prepare(&self, ctx: &QueryContext, sql: &str) -> Result<PreparedInfo, ExecutorError>;

    async fn execute_prepared(
        &self,
        ctx: &QueryContext,
        sql: &str,
        params: &[BinValue],
    ) -> Result<Vec<ExecOutcome>, ExecutorError>;

    /// `COM_PROCESS_KILL`; observed out-of-band by running statements.
    async fn kill(&self, connection_id: u32) -> Result<(), ExecutorError>;
}

/// Table-driven executor used by tests and the demo binary: canned outcomes
/// per SQL text, OK for everything else.
#[derive(Default)]
pub struct StaticExecutor {
    outcomes: HashMap<String, ExecOutcome>,
    prepared: HashMap<String, PreparedInfo>,
}

impl StaticExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcome(mut self, sql: impl Into<String>, outcome: ExecOutcome) -> Self {
        self.outcomes.insert(sql.into(), outcome);
        self
    }

    pub fn with_prepared(mut self, sql: impl Into<String>, info: PreparedInfo) -> Self {
        self.prepared.insert(sql.into(), info);
        self
    }
}

#[async_trait]
impl QueryExecutor for StaticExecutor {
    async fn query(
        &self,
        _ctx: &QueryContext,
        sql: &str,
    ) -> Result<Vec<ExecOutcome>, ExecutorError> {
        Ok(vec![self
            .outcomes
            .get(sql)
            .cloned()
            .unwrap_or_else(ExecOutcome::ok)])
    }

    async fn prepare(&self, _ctx: &QueryContext, sql: &str) -> Result<PreparedInfo, ExecutorError> {
        Ok(self.prepared.get(sql).cloned().unwrap_or_default())
    }

    async fn execute_prepared(
        &self,
        _ctx: &QueryContext,
        sql: &str,
        _params: &[BinValue],
    ) -> Result<Vec<ExecOutcome>, ExecutorError> {
        Ok(vec![self
            .outcomes
            .get(sql)
            .cloned()
            .unwrap_or_else(ExecOutcome::ok)])
    }

    async fn kill(&self, _connection_id: u32) -> Result<(), ExecutorError> {
        Ok(())
    }
}
