use crate::datasource::{ColumnInfo, DataSourceRegistry, Value};
use crate::protocol::mysql::charset::{DEFAULT_CHARACTER_SET, DEFAULT_COLLATION_NAME};
use crate::vtable::{finish_query, row, Filter, QueryOptions, QueryResult, VirtualTable, VtError};

use async_trait::async_trait;
use std::sync::Arc;

/// `information_schema.schemata`: one row per data source plus the virtual
/// databases themselves.
pub struct SchemataTable {
    registry: Arc<DataSourceRegistry>,
    virtual_dbs: Vec<String>,
}

impl SchemataTable {
    pub fn new(registry: Arc<DataSourceRegistry>, virtual_dbs: Vec<String>) -> Self {
        SchemataTable {
            registry,
            virtual_dbs,
        }
    }
}

#[async_trait]
impl VirtualTable for SchemataTable {
    fn table_name(&self) -> &'static str {
        "schemata"
    }

    fn schema(&self) -> Vec<ColumnInfo> {
        vec![
            ColumnInfo::new("CATALOG_NAME", "VARCHAR(512)"),
            ColumnInfo::new("SCHEMA_NAME", "VARCHAR(64)"),
            ColumnInfo::new("DEFAULT_CHARACTER_SET_NAME", "VARCHAR(32)"),
            ColumnInfo::new("DEFAULT_COLLATION_NAME", "VARCHAR(32)"),
            ColumnInfo::new("SQL_PATH", "VARCHAR(512)"),
        ]
    }

    async fn query(
        &self,
        filters: &[Filter],
        options: &QueryOptions,
    ) -> Result<QueryResult, VtError> {
        let mut names = self.virtual_dbs.clone();
        names.extend(self.registry.names());
        let rows = names
            .into_iter()
            .map(|name| {
                row([
                    ("CATALOG_NAME", Value::Text("def".into())),
                    ("SCHEMA_NAME", Value::Text(name)),
                    (
                        "DEFAULT_CHARACTER_SET_NAME",
                        Value::Text(DEFAULT_CHARACTER_SET.into()),
                    ),
                    (
                        "DEFAULT_COLLATION_NAME",
                        Value::Text(DEFAULT_COLLATION_NAME.into()),
                    ),
                    ("SQL_PATH", Value::Null),
                ])
            })
            .collect();
        finish_query(rows, filters, options, true)
    }
}
