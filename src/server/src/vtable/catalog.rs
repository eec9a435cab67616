use crate::datasource::{ColumnInfo, DataSourceRegistry, Value};
use crate::protocol::mysql::charset::{
    collation_catalog, DEFAULT_CHARACTER_SET, DEFAULT_COLLATION_NAME,
};
use crate::protocol::mysql::constants::DEFAULT_WAIT_TIMEOUT_SECS;
use crate::server::SERVER_VERSION;
use crate::vtable::{finish_query, row, Filter, QueryOptions, QueryResult, VirtualTable, VtError};

use async_trait::async_trait;
use std::sync::Arc;

/// `information_schema.engines`: every data source shows up as a storage
/// engine; the default source reports SUPPORT = DEFAULT.
pub struct EnginesTable {
    registry: Arc<DataSourceRegistry>,
}

impl EnginesTable {
    pub fn new(registry: Arc<DataSourceRegistry>) -> Self {
        EnginesTable { registry }
    }
}

#[async_trait]
impl VirtualTable for EnginesTable {
    fn table_name(&self) -> &'static str {
        "engines"
    }

    fn schema(&self) -> Vec<ColumnInfo> {
        vec![
            ColumnInfo::new("ENGINE", "VARCHAR(64)"),
            ColumnInfo::new("SUPPORT", "VARCHAR(8)"),
            ColumnInfo::new("COMMENT", "VARCHAR(160)"),
            ColumnInfo::new("TRANSACTIONS", "VARCHAR(3)"),
            ColumnInfo::new("XA", "VARCHAR(3)"),
            ColumnInfo::new("SAVEPOINTS", "VARCHAR(3)"),
        ]
    }

    async fn query(
        &self,
        filters: &[Filter],
        options: &QueryOptions,
    ) -> Result<QueryResult, VtError> {
        let default = self.registry.default_name();
        let rows = self
            .registry
            .names()
            .into_iter()
            .map(|name| {
                let support = if default.as_deref() == Some(name.as_str()) {
                    "DEFAULT"
                } else {
                    "YES"
                };
                row([
                    ("ENGINE", Value::Text(name)),
                    ("SUPPORT", Value::Text(support.into())),
                    ("COMMENT", Value::Text("Pluggable data source".into())),
                    ("TRANSACTIONS", Value::Text("NO".into())),
                    ("XA", Value::Text("NO".into())),
                    ("SAVEPOINTS", Value::Text("NO".into())),
                ])
            })
            .collect();
        finish_query(rows, filters, options, true)
    }
}

/// `information_schema.plugins`: the built-in auth plugin plus one storage
/// engine plugin per registered data source.
pub struct PluginsTable {
    registry: Arc<DataSourceRegistry>,
}

impl PluginsTable {
    pub fn new(registry: Arc<DataSourceRegistry>) -> Self {
        PluginsTable { registry }
    }
}

#[async_trait]
impl VirtualTable for PluginsTable {
    fn table_name(&self) -> &'static str {
        "plugins"
    }

    fn schema(&self) -> Vec<ColumnInfo> {
        vec![
            ColumnInfo::new("PLUGIN_NAME", "VARCHAR(64)"),
            ColumnInfo::new("PLUGIN_VERSION", "VARCHAR(20)"),
            ColumnInfo::new("PLUGIN_STATUS", "VARCHAR(16)"),
            ColumnInfo::new("PLUGIN_TYPE", "VARCHAR(80)"),
            ColumnInfo::new("PLUGIN_LIBRARY", "VARCHAR(64)"),
            ColumnInfo::new("PLUGIN_LICENSE", "VARCHAR(80)"),
        ]
    }

    async fn query(
        &self,
        filters: &[Filter],
        options: &QueryOptions,
    ) -> Result<QueryResult, VtError> {
        let mut rows = vec![row([
            ("PLUGIN_NAME", Value::Text("mysql_native_password".into())),
            ("PLUGIN_VERSION", Value::Text("1.0".into())),
            ("PLUGIN_STATUS", Value::Text("ACTIVE".into())),
            ("PLUGIN_TYPE", Value::Text("AUTHENTICATION".into())),
            ("PLUGIN_LIBRARY", Value::Null),
            ("PLUGIN_LICENSE", Value::Text("GPL".into())),
        ])];
        for name in self.registry.names() {
            rows.push(row([
                ("PLUGIN_NAME", Value::Text(name)),
                ("PLUGIN_VERSION", Value::Text("1.0".into())),
                ("PLUGIN_STATUS", Value::Text("ACTIVE".into())),
                ("PLUGIN_TYPE", Value::Text("STORAGE ENGINE".into())),
                ("PLUGIN_LIBRARY", Value::Null),
                ("PLUGIN_LICENSE", Value::Text("GPL".into())),
            ]));
        }
        finish_query(rows, filters, options, true)
    }
}

/// `information_schema.collations`. Filters here compare case-sensitively,
/// unlike most information-schema tables.
pub struct CollationsTable;

#[async_trait]
impl VirtualTable for CollationsTable {
    fn table_name(&self) -> &'static str {
        "collations"
    }

    fn schema(&self) -> Vec<ColumnInfo> {
        vec![
            ColumnInfo::new("COLLATION_NAME", "VARCHAR(32)"),
            ColumnInfo::new("CHARACTER_SET_NAME", "VARCHAR(32)"),
            ColumnInfo::new("ID", "BIGINT(11)"),
            ColumnInfo::new("IS_DEFAULT", "VARCHAR(3)"),
            ColumnInfo::new("IS_COMPILED", "VARCHAR(3)"),
            ColumnInfo::new("SORTLEN", "BIGINT(3)"),
        ]
    }

    async fn query(
        &self,
        filters: &[Filter],
        options: &QueryOptions,
    ) -> Result<QueryResult, VtError> {
        let rows = collation_catalog()
            .iter()
            .map(|(name, charset, id, default)| {
                row([
                    ("COLLATION_NAME", Value::Text((*name).into())),
                    ("CHARACTER_SET_NAME", Value::Text((*charset).into())),
                    ("ID", Value::Int(*id as i64)),
                    (
                        "IS_DEFAULT",
                        Value::Text(if *default { "Yes" } else { "" }.into()),
                    ),
                    ("IS_COMPILED", Value::Text("Yes".into())),
                    ("SORTLEN", Value::Int(1)),
                ])
            })
            .collect();
        finish_query(rows, filters, options, false)
    }
}

/// `information_schema.system_variables`: the global variables this
/// front-end reports.
pub struct SystemVariablesTable;

pub fn system_variables() -> Vec<(&'static str, String)> {
    vec![
        ("version", SERVER_VERSION.to_string()),
        ("character_set_server", DEFAULT_CHARACTER_SET.to_string()),
        ("collation_server", DEFAULT_COLLATION_NAME.to_string()),
        ("wait_timeout", DEFAULT_WAIT_TIMEOUT_SECS.to_string()),
        ("max_allowed_packet", (64 * 1024 * 1024).to_string()),
        ("autocommit", "ON".to_string()),
        ("lower_case_table_names", "0".to_string()),
        ("sql_mode", String::new()),
    ]
}

#[async_trait]
impl VirtualTable for SystemVariablesTable {
    fn table_name(&self) -> &'static str {
        "system_variables"
    }

    fn schema(&self) -> Vec<ColumnInfo> {
        vec![
            ColumnInfo::new("VARIABLE_NAME", "VARCHAR(64)"),
            ColumnInfo::new("VARIABLE_VALUE", "VARCHAR(1024)"),
        ]
    }

    async fn query(
        &self,
        filters: &[Filter],
        options: &QueryOptions,
    ) -> Result<QueryResult, VtError> {
        let rows = system_variables()
            .into_iter()
            .map(|(name, value)| {
                row([
                    ("VARIABLE_NAME", Value::Text(name.into())),
                    ("VARIABLE_VALUE", Value::Text(value)),
                ])
            })
            .collect();
        finish_query(rows, filters, options, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::memory::MemoryDataSource;

    fn registry() -> Arc<DataSourceRegistry> {
        let registry = Arc::new(DataSourceRegistry::new());
        registry.register(Arc::new(MemoryDataSource::new("mydb")));
        registry.register(Arc::new(MemoryDataSource::new("other")));
        registry
    }

    #[tokio::test]
    async fn default_engine_is_marked() {
        let table = EnginesTable::new(registry());
        let result = table.query(&[], &QueryOptions::default()).await.unwrap();
        let supports: Vec<(String, String)> = result
            .rows
            .iter()
            .map(|r| {
                (
                    r["ENGINE"].to_text().unwrap(),
                    r["SUPPORT"].to_text().unwrap(),
                )
            })
            .collect();
        assert!(supports.contains(&("mydb".into(), "DEFAULT".into())));
        assert!(supports.contains(&("other".into(), "YES".into())));
    }

    #[tokio::test]
    async fn collation_filters_are_case_sensitive() {
        let table = CollationsTable;
        let exact = vec![Filter::new("COLLATION_NAME", "=", "utf8mb4_general_ci")];
        let result = table.query(&exact, &QueryOptions::default()).await.unwrap();
        assert_eq!(result.total, 1);

        let wrong_case = vec![Filter::new("COLLATION_NAME", "=", "UTF8MB4_GENERAL_CI")];
        let result = table
            .query(&wrong_case, &QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(result.total, 0);
    }

    #[tokio::test]
    async fn plugins_include_auth_and_engines() {
        let table = PluginsTable::new(registry());
        let result = table.query(&[], &QueryOptions::default()).await.unwrap();
        let names: Vec<String> = result
            .rows
            .iter()
            .map(|r| r["PLUGIN_NAME"].to_text().unwrap())
            .collect();
        assert!(names.contains(&"mysql_native_password".to_string()));
        assert!(names.contains(&"mydb".to_string()));
    }

    #[tokio::test]
    async fn variables_contain_version() {
        let table = SystemVariablesTable;
        let filters = vec![Filter::new("variable_name", "=", "version")];
        let result = table.query(&filters, &QueryOptions::default()).await.unwrap();
        assert_eq!(result.total, 1);
    }
}
