use crate::datasource::{ColumnInfo, DataSourceRegistry, Value};
use crate::protocol::mysql::charset::DEFAULT_COLLATION_NAME;
use crate::vtable::privileges::PRIVILEGE_TABLES;
use crate::vtable::{finish_query, row, Filter, QueryOptions, QueryResult, Row, VirtualTable, VtError};

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// `information_schema.tables`: data-source tables plus the virtual-schema
/// tables. Privilege tables stay hidden from everyone but root.
pub struct TablesTable {
    registry: Arc<DataSourceRegistry>,
    information_schema_tables: Vec<String>,
    mysql_tables: Vec<String>,
}

impl TablesTable {
    pub fn new(
        registry: Arc<DataSourceRegistry>,
        information_schema_tables: Vec<String>,
        mysql_tables: Vec<String>,
    ) -> Self {
        TablesTable {
            registry,
            information_schema_tables,
            mysql_tables,
        }
    }

    fn system_view_row(schema: &str, name: &str) -> Row {
        row([
            ("TABLE_CATALOG", Value::Text("def".into())),
            ("TABLE_SCHEMA", Value::Text(schema.into())),
            ("TABLE_NAME", Value::Text(name.to_uppercase())),
            ("TABLE_TYPE", Value::Text("SYSTEM VIEW".into())),
            ("ENGINE", Value::Null),
            ("VERSION", Value::Int(10)),
            ("ROW_FORMAT", Value::Null),
            ("TABLE_ROWS", Value::Null),
            ("TABLE_COLLATION", Value::Text(DEFAULT_COLLATION_NAME.into())),
            ("TABLE_COMMENT", Value::Text(String::new())),
        ])
    }
}

#[async_trait]
impl VirtualTable for TablesTable {
    fn table_name(&self) -> &'static str {
        "tables"
    }

    fn schema(&self) -> Vec<ColumnInfo> {
        vec![
            ColumnInfo::new("TABLE_CATALOG", "VARCHAR(512)"),
            ColumnInfo::new("TABLE_SCHEMA", "VARCHAR(64)"),
            ColumnInfo::new("TABLE_NAME", "VARCHAR(64)"),
            ColumnInfo::new("TABLE_TYPE", "VARCHAR(64)"),
            ColumnInfo::new("ENGINE", "VARCHAR(64)"),
            ColumnInfo::new("VERSION", "BIGINT(21)"),
            ColumnInfo::new("ROW_FORMAT", "VARCHAR(10)"),
            ColumnInfo::new("TABLE_ROWS", "BIGINT(21)"),
            ColumnInfo::new("TABLE_COLLATION", "VARCHAR(32)"),
            ColumnInfo::new("TABLE_COMMENT", "VARCHAR(2048)"),
        ]
    }

    async fn query(
        &self,
        filters: &[Filter],
        options: &QueryOptions,
    ) -> Result<QueryResult, VtError> {
        let mut rows = Vec::new();

        let is_root = options
            .user
            .as_ref()
            .map(|u| u.user.eq_ignore_ascii_case("root"))
            .unwrap_or(false);
        for name in &self.information_schema_tables {
            if !is_root && PRIVILEGE_TABLES.contains(&name.as_str()) {
                continue;
            }
            rows.push(Self::system_view_row("information_schema", name));
        }
        if is_root {
            for name in &self.mysql_tables {
                rows.push(Self::system_view_row("mysql", name));
            }
        }

        for source_name in self.registry.names() {
            let Some(source) = self.registry.get(&source_name) else {
                continue;
            };
            // a source that cannot enumerate right now contributes nothing
            let tables = match source.get_tables().await {
                Ok(tables) => tables,
                Err(e) => {
                    debug!("skipping {source_name} in tables listing: {e}");
                    continue;
                }
            };
            for table in tables {
                let info = source.get_table_info(&table).await.ok();
                let is_view = info.as_ref().and_then(|i| i.view_info()).is_some();
                let collation = info
                    .as_ref()
                    .and_then(|i| i.collation.clone())
                    .unwrap_or_else(|| DEFAULT_COLLATION_NAME.to_string());
                rows.push(row([
                    ("TABLE_CATALOG", Value::Text("def".into())),
                    ("TABLE_SCHEMA", Value::Text(source_name.clone())),
                    ("TABLE_NAME", Value::Text(table)),
                    (
                        "TABLE_TYPE",
                        Value::Text(if is_view { "VIEW" } else { "BASE TABLE" }.into()),
                    ),
                    ("ENGINE", Value::Text(source_name.clone())),
                    ("VERSION", Value::Int(10)),
                    ("ROW_FORMAT", Value::Text("Dynamic".into())),
                    ("TABLE_ROWS", Value::Null),
                    ("TABLE_COLLATION", Value::Text(collation)),
                    ("TABLE_COMMENT", Value::Text(String::new())),
                ]));
            }
        }

        finish_query(rows, filters, options, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::UserIdentity;
    use crate::datasource::memory::MemoryDataSource;
    use crate::datasource::TableInfo;

    fn fixture() -> TablesTable {
        let registry = Arc::new(DataSourceRegistry::new());
        registry.register(Arc::new(
            MemoryDataSource::new("mydb").with_table(TableInfo::new("users", vec![])),
        ));
        TablesTable::new(
            registry,
            vec![
                "schemata".into(),
                "tables".into(),
                "user_privileges".into(),
                "schema_privileges".into(),
                "table_privileges".into(),
                "column_privileges".into(),
            ],
            vec!["user".into(), "db".into()],
        )
    }

    fn names_for(result: &QueryResult) -> Vec<String> {
        result
            .rows
            .iter()
            .map(|r| r["TABLE_NAME"].to_text().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn non_root_does_not_see_privilege_tables() {
        let table = fixture();
        let options = QueryOptions {
            user: Some(UserIdentity {
                user: "guest".into(),
                host: "%".into(),
            }),
            ..QueryOptions::default()
        };
        let filters = vec![Filter::new("table_schema", "=", "information_schema")];
        let result = table.query(&filters, &options).await.unwrap();
        let names = names_for(&result);
        for hidden in [
            "USER_PRIVILEGES",
            "SCHEMA_PRIVILEGES",
            "TABLE_PRIVILEGES",
            "COLUMN_PRIVILEGES",
        ] {
            assert!(!names.contains(&hidden.to_string()), "{hidden} leaked");
        }
        assert!(names.contains(&"SCHEMATA".to_string()));
    }

    #[tokio::test]
    async fn root_sees_privilege_and_mysql_tables() {
        let table = fixture();
        let options = QueryOptions {
            user: Some(UserIdentity {
                user: "root".into(),
                host: "%".into(),
            }),
            ..QueryOptions::default()
        };
        let result = table.query(&[], &options).await.unwrap();
        let names = names_for(&result);
        assert!(names.contains(&"USER_PRIVILEGES".to_string()));
        assert!(names.contains(&"USER".to_string()));
        assert!(names.contains(&"users".to_string()));
    }

    #[tokio::test]
    async fn data_source_tables_are_base_tables() {
        let table = fixture();
        let filters = vec![Filter::new("table_schema", "=", "mydb")];
        let result = table.query(&filters, &QueryOptions::default()).await.unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(
            result.rows[0]["TABLE_TYPE"].to_text().as_deref(),
            Some("BASE TABLE")
        );
    }
}
