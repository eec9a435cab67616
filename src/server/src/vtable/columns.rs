use crate::datasource::{ColumnInfo, DataSourceRegistry, KeyKind, Value};
use crate::vtable::{
    finish_query, parse_declared_type, row, Filter, QueryOptions, QueryResult, VirtualTable,
    VtError,
};

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Declared type bases that carry a character length.
fn is_character_type(base: &str) -> bool {
    matches!(base, "char" | "varchar" | "binary" | "varbinary")
}

/// `information_schema.columns`, derived from live data-source metadata.
pub struct ColumnsTable {
    registry: Arc<DataSourceRegistry>,
}

impl ColumnsTable {
    pub fn new(registry: Arc<DataSourceRegistry>) -> Self {
        ColumnsTable { registry }
    }
}

#[async_trait]
impl VirtualTable for ColumnsTable {
    fn table_name(&self) -> &'static str {
        "columns"
    }

    fn schema(&self) -> Vec<ColumnInfo> {
        vec![
            ColumnInfo::new("TABLE_CATALOG", "VARCHAR(512)"),
            ColumnInfo::new("TABLE_SCHEMA", "VARCHAR(64)"),
            ColumnInfo::new("TABLE_NAME", "VARCHAR(64)"),
            ColumnInfo::new("COLUMN_NAME", "VARCHAR(64)"),
            ColumnInfo::new("ORDINAL_POSITION", "BIGINT(21)"),
            ColumnInfo::new("COLUMN_DEFAULT", "LONGTEXT"),
            ColumnInfo::new("IS_NULLABLE", "VARCHAR(3)"),
            ColumnInfo::new("DATA_TYPE", "VARCHAR(64)"),
            ColumnInfo::new("CHARACTER_MAXIMUM_LENGTH", "BIGINT(21)"),
            ColumnInfo::new("CHARACTER_OCTET_LENGTH", "BIGINT(21)"),
            ColumnInfo::new("COLUMN_TYPE", "LONGTEXT"),
            ColumnInfo::new("COLUMN_KEY", "VARCHAR(3)"),
            ColumnInfo::new("EXTRA", "VARCHAR(30)"),
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
                    debug!("skipping {source_name} in columns listing: {e}");
                    continue;
                }
            };
            for table in tables {
                let info = match source.get_table_info(&table).await {
                    Ok(info) => info,
                    Err(e) => {
                        debug!("skipping {source_name}.{table}: {e}");
                        continue;
                    }
                };
                for (idx, col) in info.columns.iter().enumerate() {
                    let (base, declared_len) = parse_declared_type(&col.column_type);
                    let char_len = if is_character_type(&base) {
                        declared_len
                    } else {
                        None
                    };
                    let key = match col.key {
                        KeyKind::Primary => "PRI",
                        KeyKind::Unique => "UNI",
                        KeyKind::None => "",
                    };
                    rows.push(row([
                        ("TABLE_CATALOG", Value::Text("def".into())),
                        ("TABLE_SCHEMA", Value::Text(source_name.clone())),
                        ("TABLE_NAME", Value::Text(table.clone())),
                        ("COLUMN_NAME", Value::Text(col.name.clone())),
                        ("ORDINAL_POSITION", Value::Int(idx as i64 + 1)),
                        (
                            "COLUMN_DEFAULT",
                            col.default
                                .clone()
                                .map(Value::Text)
                                .unwrap_or(Value::Null),
                        ),
                        (
                            "IS_NULLABLE",
                            Value::Text(if col.nullable { "YES" } else { "NO" }.into()),
                        ),
                        ("DATA_TYPE", Value::Text(base)),
                        (
                            "CHARACTER_MAXIMUM_LENGTH",
                            char_len.map(|l| Value::Int(l as i64)).unwrap_or(Value::Null),
                        ),
                        (
                            "CHARACTER_OCTET_LENGTH",
                            char_len
                                .map(|l| Value::Int(4 * l as i64))
                                .unwrap_or(Value::Null),
                        ),
                        ("COLUMN_TYPE", Value::Text(col.column_type.to_lowercase())),
                        ("COLUMN_KEY", Value::Text(key.into())),
                        ("EXTRA", Value::Text(String::new())),
                    ]));
                }
            }
        }
        finish_query(rows, filters, options, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::memory::MemoryDataSource;
    use crate::datasource::TableInfo;

    fn fixture() -> ColumnsTable {
        let registry = Arc::new(DataSourceRegistry::new());
        registry.register(Arc::new(MemoryDataSource::new("mydb").with_table(
            TableInfo::new(
                "users",
                vec![
                    ColumnInfo::new("id", "INT(11)").primary_key(),
                    ColumnInfo::new("email", "VARCHAR(255)").unique(),
                    ColumnInfo::new("bio", "TEXT"),
                ],
            ),
        )));
        ColumnsTable::new(registry)
    }

    #[tokio::test]
    async fn derives_column_metadata() {
        let table = fixture();
        let result = table.query(&[], &QueryOptions::default()).await.unwrap();
        assert_eq!(result.total, 3);

        let id = &result.rows[0];
        assert_eq!(id["COLUMN_NAME"].to_text().as_deref(), Some("id"));
        assert_eq!(id["ORDINAL_POSITION"], Value::Int(1));
        assert_eq!(id["DATA_TYPE"].to_text().as_deref(), Some("int"));
        assert_eq!(id["COLUMN_KEY"].to_text().as_deref(), Some("PRI"));
        assert_eq!(id["IS_NULLABLE"].to_text().as_deref(), Some("NO"));
        assert_eq!(id["CHARACTER_MAXIMUM_LENGTH"], Value::Null);

        let email = &result.rows[1];
        assert_eq!(email["ORDINAL_POSITION"], Value::Int(2));
        assert_eq!(email["DATA_TYPE"].to_text().as_deref(), Some("varchar"));
        assert_eq!(email["CHARACTER_MAXIMUM_LENGTH"], Value::Int(255));
        assert_eq!(email["CHARACTER_OCTET_LENGTH"], Value::Int(1020));
        assert_eq!(email["COLUMN_KEY"].to_text().as_deref(), Some("UNI"));

        let bio = &result.rows[2];
        assert_eq!(bio["DATA_TYPE"].to_text().as_deref(), Some("text"));
        assert_eq!(bio["COLUMN_KEY"].to_text().as_deref(), Some(""));
    }

    #[tokio::test]
    async fn filter_by_table_and_column() {
        let table = fixture();
        let filters = vec![
            Filter::new("table_name", "=", "users"),
            Filter::new("column_name", "LIKE", "e%"),
        ];
        let result = table.query(&filters, &QueryOptions::default()).await.unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(
            result.rows[0]["COLUMN_NAME"].to_text().as_deref(),
            Some("email")
        );
    }
}
