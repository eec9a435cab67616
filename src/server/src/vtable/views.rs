use crate::datasource::{CheckOption, ColumnInfo, DataSourceRegistry, SecurityType, Value};
use crate::protocol::mysql::charset::{DEFAULT_CHARACTER_SET, DEFAULT_COLLATION_NAME};
use crate::vtable::{finish_query, row, Filter, QueryOptions, QueryResult, VirtualTable, VtError};

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// `information_schema.views`, derived from the view metadata blob attached
/// to each view's table info.
pub struct ViewsTable {
    registry: Arc<DataSourceRegistry>,
}

impl ViewsTable {
    pub fn new(registry: Arc<DataSourceRegistry>) -> Self {
        ViewsTable { registry }
    }
}

fn check_option_text(value: CheckOption) -> &'static str {
    match value {
        CheckOption::None => "NONE",
        CheckOption::Local => "LOCAL",
        CheckOption::Cascaded => "CASCADED",
    }
}

fn security_type_text(value: SecurityType) -> &'static str {
    match value {
        SecurityType::Definer => "DEFINER",
        SecurityType::Invoker => "INVOKER",
    }
}

#[async_trait]
impl VirtualTable for ViewsTable {
    fn table_name(&self) -> &'static str {
        "views"
    }

    fn schema(&self) -> Vec<ColumnInfo> {
        vec![
            ColumnInfo::new("TABLE_CATALOG", "VARCHAR(512)"),
            ColumnInfo::new("TABLE_SCHEMA", "VARCHAR(64)"),
            ColumnInfo::new("TABLE_NAME", "VARCHAR(64)"),
            ColumnInfo::new("VIEW_DEFINITION", "LONGTEXT"),
            ColumnInfo::new("CHECK_OPTION", "VARCHAR(8)"),
            ColumnInfo::new("IS_UPDATABLE", "VARCHAR(3)"),
            ColumnInfo::new("DEFINER", "VARCHAR(93)"),
            ColumnInfo::new("SECURITY_TYPE", "VARCHAR(7)"),
            ColumnInfo::new("CHARACTER_SET_CLIENT", "VARCHAR(32)"),
            ColumnInfo::new("COLLATION_CONNECTION", "VARCHAR(32)"),
        ]
    }

    async fn query(
        &self,
        filters: &[Filter],
        options: &QueryOptions,
    ) -> Result<QueryResult, VtError> {
        let mut rows = Vec::new();
        for source_name in self.registry.names() {
            let Some(source) = self.registry.get(&source_name) else {
                continue;
            };
            let tables = match source.get_tables().await {
                Ok(tables) => tables,
                Err(e) => {
                    debug!("skipping {source_name} in views listing: {e}");
                    continue;
                }
            };
            for table in tables {
                let Ok(info) = source.get_table_info(&table).await else {
                    continue;
                };
                let Some(view) = info.view_info() else {
                    continue;
                };
                rows.push(row([
                    ("TABLE_CATALOG", Value::Text("def".into())),
                    ("TABLE_SCHEMA", Value::Text(source_name.clone())),
                    ("TABLE_NAME", Value::Text(table)),
                    ("VIEW_DEFINITION", Value::Text(view.definition.clone())),
                    (
                        "CHECK_OPTION",
                        Value::Text(check_option_text(view.check_option).into()),
                    ),
                    (
                        "IS_UPDATABLE",
                        Value::Text(if view.updatable { "YES" } else { "NO" }.into()),
                    ),
                    ("DEFINER", Value::Text("root@%".into())),
                    (
                        "SECURITY_TYPE",
                        Value::Text(security_type_text(view.security_type).into()),
                    ),
                    (
                        "CHARACTER_SET_CLIENT",
                        Value::Text(DEFAULT_CHARACTER_SET.into()),
                    ),
                    (
                        "COLLATION_CONNECTION",
                        Value::Text(DEFAULT_COLLATION_NAME.into()),
                    ),
                ]));
            }
        }
        finish_query(rows, filters, options, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::memory::MemoryDataSource;
    use crate::datasource::{TableInfo, ViewInfo};

    #[tokio::test]
    async fn only_tables_with_view_metadata_appear() {
        let registry = Arc::new(DataSourceRegistry::new());
        let view = ViewInfo {
            definition: "select id, name from users where active = 1".into(),
            updatable: false,
            check_option: CheckOption::Cascaded,
            security_type: SecurityType::Invoker,
        };
        registry.register(Arc::new(
            MemoryDataSource::new("mydb")
                .with_table(TableInfo::new("users", vec![]))
                .with_table(TableInfo::new("active_users", vec![]).with_view_info(&view)),
        ));

        let table = ViewsTable::new(registry);
        let result = table.query(&[], &QueryOptions::default()).await.unwrap();
        assert_eq!(result.total, 1);
        let row = &result.rows[0];
        assert_eq!(row["TABLE_NAME"].to_text().as_deref(), Some("active_users"));
        assert_eq!(row["CHECK_OPTION"].to_text().as_deref(), Some("CASCADED"));
        assert_eq!(row["IS_UPDATABLE"].to_text().as_deref(), Some("NO"));
        assert_eq!(row["SECURITY_TYPE"].to_text().as_deref(), Some("INVOKER"));
    }
}
