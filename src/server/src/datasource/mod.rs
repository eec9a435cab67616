pub mod memory;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Attribute key under which a view's metadata travels in [`TableInfo`].
pub const VIEW_META_KEY: &str = "view_meta";

/// A cell value as produced by data sources, virtual tables and executors.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Int(i64),
    Float(f64),
    Null,
}

impl Value {
    /// Text-protocol rendering; `None` maps to the NULL marker.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Text(s) => Some(s.clone()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyKind {
    #[default]
    None,
    Primary,
    Unique,
}

/// Which column of which table a foreign-key column points at. The
/// referenced table lives in the same data source as the referencing one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyRef {
    pub table: String,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared SQL type text, e.g. `INT(11)` or `VARCHAR(255)`.
    pub column_type: String,
    pub nullable: bool,
    pub key: KeyKind,
    pub default: Option<String>,
    pub references: Option<ForeignKeyRef>,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        ColumnInfo {
            name: name.into(),
            column_type: column_type.into(),
            nullable: true,
            key: KeyKind::None,
            default: None,
            references: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.key = KeyKind::Primary;
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.key = KeyKind::Unique;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.references = Some(ForeignKeyRef {
            table: table.into(),
            column: column.into(),
        });
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub collation: Option<String>,
    /// Free-form attributes; [`VIEW_META_KEY`] carries [`ViewInfo`] as JSON.
    pub attributes: HashMap<String, String>,
}

impl TableInfo {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnInfo>) -> Self {
        TableInfo {
            name: name.into(),
            columns,
            collation: None,
            attributes: HashMap::new(),
        }
    }

    pub fn view_info(&self) -> Option<ViewInfo> {
        self.attributes
            .get(VIEW_META_KEY)
            .and_then(|raw| serde_json::from_str(raw).ok())
    }

    pub fn with_view_info(mut self, view: &ViewInfo) -> Self {
        if let Ok(raw) = serde_json::to_string(view) {
            self.attributes.insert(VIEW_META_KEY.to_string(), raw);
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ViewInfo {
    pub definition: String,
    pub updatable: bool,
    pub check_option: CheckOption,
    pub security_type: SecurityType,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CheckOption {
    None,
    Local,
    Cascaded,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SecurityType {
    Definer,
    Invoker,
}

#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("data source is not connected")]
    NotConnected,
    #[error("data source is read-only")]
    ReadOnly,
    #[error("table {0} does not exist")]
    NoSuchTable(String),
    #[error("operation not supported by this data source: {0}")]
    NotSupported(&'static str),
    #[error("backend error {code}: {message}")]
    Backend { code: u16, message: String },
}

impl DataSourceError {
    /// Vendor error code surfaced in ERR packets.
    pub fn vendor_code(&self) -> u16 {
        match self {
            DataSourceError::NotConnected => 2006,
            DataSourceError::ReadOnly => 1036,
            DataSourceError::NoSuchTable(_) => 1146,
            DataSourceError::NotSupported(_) => 1235,
            DataSourceError::Backend { code, .. } => *code,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DataSourceConfig {
    pub name: String,
    pub writable: bool,
}

#[derive(Debug, Clone, Default)]
pub struct QueryOpts {
    pub limit: Option<u64>,
    pub offset: u64,
}

/// A pluggable storage back-end. One registered instance backs one database
/// name visible to clients.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn connect(&self) -> Result<(), DataSourceError>;
    async fn close(&self) -> Result<(), DataSourceError>;
    fn is_connected(&self) -> bool;
    fn is_writable(&self) -> bool;
    fn get_config(&self) -> DataSourceConfig;
    async fn get_tables(&self) -> Result<Vec<String>, DataSourceError>;
    async fn get_table_info(&self, name: &str) -> Result<TableInfo, DataSourceError>;
    async fn query(
        &self,
        sql: &str,
        opts: &QueryOpts,
    ) -> Result<Vec<Vec<Value>>, DataSourceError>;
    async fn insert(&self, table: &str, rows: Vec<Vec<Value>>) -> Result<u64, DataSourceError>;
    async fn update(&self, table: &str, rows: Vec<Vec<Value>>) -> Result<u64, DataSourceError>;
    async fn delete(&self, table: &str, keys: Vec<Value>) -> Result<u64, DataSourceError>;
    async fn create_table(&self, info: TableInfo) -> Result<(), DataSourceError>;
    async fn drop_table(&self, name: &str) -> Result<(), DataSourceError>;
    async fn truncate_table(&self, name: &str) -> Result<(), DataSourceError>;
    async fn execute(&self, sql: &str) -> Result<u64, DataSourceError>;
}

/// Append-mostly map of database name to data source. Individual sources
/// serialise their own operations.
#[derive(Default)]
pub struct DataSourceRegistry {
    sources: DashMap<String, Arc<dyn DataSource>>,
    default_source: parking_lot::RwLock<Option<String>>,
}

impl DataSourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, source: Arc<dyn DataSource>) {
        let name = source.get_config().name;
        let mut default = self.default_source.write();
        if default.is_none() {
            *default = Some(name.clone());
        }
        drop(default);
        self.sources.insert(name, source);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn DataSource>> {
        self.sources.get(name).map(|s| Arc::clone(s.value()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    /// Registered database names, sorted for deterministic listings.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sources.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn default_name(&self) -> Option<String> {
        self.default_source.read().clone()
    }
}
