use crate::datasource::{
    DataSource, DataSourceConfig, DataSourceError, QueryOpts, TableInfo, Value,
};

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

struct MemTable {
    info: TableInfo,
    rows: Vec<Vec<Value>>,
}

/// An in-process data source holding its tables in a map. Backs the demo
/// binary and the metadata paths exercised by tests; it does not parse SQL.
pub struct MemoryDataSource {
    name: String,
    connected: AtomicBool,
    tables: RwLock<BTreeMap<String, MemTable>>,
}

impl MemoryDataSource {
    pub fn new(name: impl Into<String>) -> Self {
        MemoryDataSource {
            name: name.into(),
            connected: AtomicBool::new(true),
            tables: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn with_table(self, info: TableInfo) -> Self {
        self.tables.write().insert(
            info.name.clone(),
            MemTable {
                info,
                rows: Vec::new(),
            },
        );
        self
    }

    /// Full-table scan, for the demo executor.
    pub fn scan(&self, table: &str) -> Result<Vec<Vec<Value>>, DataSourceError> {
        self.tables
            .read()
            .get(table)
            .map(|t| t.rows.clone())
            .ok_or_else(|| DataSourceError::NoSuchTable(table.to_string()))
    }
}

#[async_trait]
impl DataSource for MemoryDataSource {
    async fn connect(&self) -> Result<(), DataSourceError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), DataSourceError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_writable(&self) -> bool {
        true
    }

    fn get_config(&self) -> DataSourceConfig {
        DataSourceConfig {
            name: self.name.clone(),
            writable: true,
        }
    }

    async fn get_tables(&self) -> Result<Vec<String>, DataSourceError> {
        if !self.is_connected() {
            return Err(DataSourceError::NotConnected);
        }
        Ok(self.tables.read().keys().cloned().collect())
    }

    async fn get_table_info(&self, name: &str) -> Result<TableInfo, DataSourceError> {
        if !self.is_connected() {
            return Err(DataSourceError::NotConnected);
        }
        self.tables
            .read()
            .get(name)
            .map(|t| t.info.clone())
            .ok_or_else(|| DataSourceError::NoSuchTable(name.to_string()))
    }

    async fn query(
        &self,
        _sql: &str,
        _opts: &QueryOpts,
    ) -> Result<Vec<Vec<Value>>, DataSourceError> {
        Err(DataSourceError::NotSupported("sql over memory tables"))
    }

    async fn insert(&self, table: &str, rows: Vec<Vec<Value>>) -> Result<u64, DataSourceError> {
        let mut tables = self.tables.write();
        let t = tables
            .get_mut(table)
            .ok_or_else(|| DataSourceError::NoSuchTable(table.to_string()))?;
        let n = rows.len() as u64;
        t.rows.extend(rows);
        Ok(n)
    }

    async fn update(&self, table: &str, rows: Vec<Vec<Value>>) -> Result<u64, DataSourceError> {
        let mut tables = self.tables.write();
        let t = tables
            .get_mut(table)
            .ok_or_else(|| DataSourceError::NoSuchTable(table.to_string()))?;
        let n = rows.len().min(t.rows.len());
        for (slot, row) in t.rows.iter_mut().zip(rows.into_iter()) {
            *slot = row;
        }
        Ok(n as u64)
    }

    async fn delete(&self, table: &str, keys: Vec<Value>) -> Result<u64, DataSourceError> {
        let mut tables = self.tables.write();
        let t = tables
            .get_mut(table)
            .ok_or_else(|| DataSourceError::NoSuchTable(table.to_string()))?;
        let before = t.rows.len();
        t.rows.retain(|row| !row.iter().any(|v| keys.contains(v)));
        Ok((before - t.rows.len()) as u64)
    }

    async fn create_table(&self, info: TableInfo) -> Result<(), DataSourceError> {
        self.tables.write().insert(
            info.name.clone(),
            MemTable {
                info,
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    async fn drop_table(&self, name: &str) -> Result<(), DataSourceError> {
        self.tables
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| DataSourceError::NoSuchTable(name.to_string()))
    }

    async fn truncate_table(&self, name: &str) -> Result<(), DataSourceError> {
        let mut tables = self.tables.write();
        let t = tables
            .get_mut(name)
            .ok_or_else(|| DataSourceError::NoSuchTable(name.to_string()))?;
        t.rows.clear();
        Ok(())
    }

    async fn execute(&self, _sql: &str) -> Result<u64, DataSourceError> {
        Err(DataSourceError::NotSupported("sql over memory tables"))
    }
}
