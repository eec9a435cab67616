use crate::datasource::{ColumnInfo, DataSourceRegistry, KeyKind, TableInfo, Value};
use crate::vtable::{finish_query, row, Filter, QueryOptions, QueryResult, Row, VirtualTable, VtError};

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// One key constraint derived from table metadata.
struct Constraint {
    name: String,
    kind: &'static str,
    /// Column names in ordinal order.
    columns: Vec<String>,
    /// `(schema, table, column)` of the referenced side, foreign keys only.
    /// The schema is the data source the referenced table lives in.
    referenced: Option<(String, String, String)>,
}

/// Derive the primary-key, unique and foreign-key constraints of one table.
fn table_constraints(source_name: &str, info: &TableInfo) -> Vec<Constraint> {
    let mut out = Vec::new();
    let primary: Vec<String> = info
        .columns
        .iter()
        .filter(|c| c.key == KeyKind::Primary)
        .map(|c| c.name.clone())
        .collect();
    if !primary.is_empty() {
        out.push(Constraint {
            name: "PRIMARY".to_string(),
            kind: "PRIMARY KEY",
            columns: primary,
            referenced: None,
        });
    }
    for col in info.columns.iter().filter(|c| c.key == KeyKind::Unique) {
        out.push(Constraint {
            name: col.name.clone(),
            kind: "UNIQUE",
            columns: vec![col.name.clone()],
            referenced: None,
        });
    }
    let mut fk_ordinal = 0;
    for col in &info.columns {
        if let Some(fk) = &col.references {
            fk_ordinal += 1;
            out.push(Constraint {
                name: format!("{}_ibfk_{}", info.name, fk_ordinal),
                kind: "FOREIGN KEY",
                columns: vec![col.name.clone()],
                referenced: Some((
                    source_name.to_string(),
                    fk.table.clone(),
                    fk.column.clone(),
                )),
            });
        }
    }
    out
}

async fn collect<F>(registry: &DataSourceRegistry, mut emit: F)
where
    F: FnMut(&str, &TableInfo, &Constraint),
{
    for source_name in registry.names() {
        let Some(source) = registry.get(&source_name) else {
            continue;
        };
        let tables = match source.get_tables().await {
            Ok(tables) => tables,
            Err(e) => {
                debug!("skipping {source_name} in constraint listing: {e}");
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
            for constraint in table_constraints(&source_name, &info) {
                emit(&source_name, &info, &constraint);
            }
        }
    }
}

/// `information_schema.table_constraints`.
pub struct TableConstraintsTable {
    registry: Arc<DataSourceRegistry>,
}

impl TableConstraintsTable {
    pub fn new(registry: Arc<DataSourceRegistry>) -> Self {
        TableConstraintsTable { registry }
    }
}

#[async_trait]
impl VirtualTable for TableConstraintsTable {
    fn table_name(&self) -> &'static str {
        "table_constraints"
    }

    fn schema(&self) -> Vec<ColumnInfo> {
        vec![
            ColumnInfo::new("CONSTRAINT_CATALOG", "VARCHAR(512)"),
            ColumnInfo::new("CONSTRAINT_SCHEMA", "VARCHAR(64)"),
            ColumnInfo::new("CONSTRAINT_NAME", "VARCHAR(64)"),
            ColumnInfo::new("TABLE_SCHEMA", "VARCHAR(64)"),
            ColumnInfo::new("TABLE_NAME", "VARCHAR(64)"),
            ColumnInfo::new("CONSTRAINT_TYPE", "VARCHAR(64)"),
        ]
    }

    async fn query(
        &self,
        filters: &[Filter],
        options: &QueryOptions,
    ) -> Result<QueryResult, VtError> {
        let mut rows: Vec<Row> = Vec::new();
        collect(&self.registry, |source_name, info, constraint| {
            rows.push(row([
                ("CONSTRAINT_CATALOG", Value::Text("def".into())),
                ("CONSTRAINT_SCHEMA", Value::Text(source_name.into())),
                ("CONSTRAINT_NAME", Value::Text(constraint.name.clone())),
                ("TABLE_SCHEMA", Value::Text(source_name.into())),
                ("TABLE_NAME", Value::Text(info.name.clone())),
                ("CONSTRAINT_TYPE", Value::Text(constraint.kind.into())),
            ]));
        })
        .await;
        finish_query(rows, filters, options, true)
    }
}

/// `information_schema.key_column_usage`.
pub struct KeyColumnUsageTable {
    registry: Arc<DataSourceRegistry>,
}

impl KeyColumnUsageTable {
    pub fn new(registry: Arc<DataSourceRegistry>) -> Self {
        KeyColumnUsageTable { registry }
    }
}

#[async_trait]
impl VirtualTable for KeyColumnUsageTable {
    fn table_name(&self) -> &'static str {
        "key_column_usage"
    }

    fn schema(&self) -> Vec<ColumnInfo> {
        vec![
            ColumnInfo::new("CONSTRAINT_CATALOG", "VARCHAR(512)"),
            ColumnInfo::new("CONSTRAINT_SCHEMA", "VARCHAR(64)"),
            ColumnInfo::new("CONSTRAINT_NAME", "VARCHAR(64)"),
            ColumnInfo::new("TABLE_CATALOG", "VARCHAR(512)"),
            ColumnInfo::new("TABLE_SCHEMA", "VARCHAR(64)"),
            ColumnInfo::new("TABLE_NAME", "VARCHAR(64)"),
            ColumnInfo::new("COLUMN_NAME", "VARCHAR(64)"),
            ColumnInfo::new("ORDINAL_POSITION", "BIGINT(10)"),
            ColumnInfo::new("POSITION_IN_UNIQUE_CONSTRAINT", "BIGINT(10)"),
            ColumnInfo::new("REFERENCED_TABLE_SCHEMA", "VARCHAR(64)"),
            ColumnInfo::new("REFERENCED_TABLE_NAME", "VARCHAR(64)"),
            ColumnInfo::new("REFERENCED_COLUMN_NAME", "VARCHAR(64)"),
        ]
    }

    async fn query(
        &self,
        filters: &[Filter],
        options: &QueryOptions,
    ) -> Result<QueryResult, VtError> {
        let mut rows: Vec<Row> = Vec::new();
        collect(&self.registry, |source_name, info, constraint| {
            for (idx, column) in constraint.columns.iter().enumerate() {
                let (ref_schema, ref_table, ref_column) = match &constraint.referenced {
                    Some((s, t, c)) => (
                        Value::Text(s.clone()),
                        Value::Text(t.clone()),
                        Value::Text(c.clone()),
                    ),
                    None => (Value::Null, Value::Null, Value::Null),
                };
                rows.push(row([
                    ("CONSTRAINT_CATALOG", Value::Text("def".into())),
                    ("CONSTRAINT_SCHEMA", Value::Text(source_name.into())),
                    ("CONSTRAINT_NAME", Value::Text(constraint.name.clone())),
                    ("TABLE_CATALOG", Value::Text("def".into())),
                    ("TABLE_SCHEMA", Value::Text(source_name.into())),
                    ("TABLE_NAME", Value::Text(info.name.clone())),
                    ("COLUMN_NAME", Value::Text(column.clone())),
                    ("ORDINAL_POSITION", Value::Int(idx as i64 + 1)),
                    (
                        "POSITION_IN_UNIQUE_CONSTRAINT",
                        if constraint.referenced.is_some() {
                            Value::Int(idx as i64 + 1)
                        } else {
                            Value::Null
                        },
                    ),
                    ("REFERENCED_TABLE_SCHEMA", ref_schema),
                    ("REFERENCED_TABLE_NAME", ref_table),
                    ("REFERENCED_COLUMN_NAME", ref_column),
                ]));
            }
        })
        .await;
        finish_query(rows, filters, options, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::memory::MemoryDataSource;

    fn registry() -> Arc<DataSourceRegistry> {
        let registry = Arc::new(DataSourceRegistry::new());
        registry.register(Arc::new(
            MemoryDataSource::new("mydb")
                .with_table(TableInfo::new(
                    "users",
                    vec![
                        ColumnInfo::new("id", "INT(11)").primary_key(),
                        ColumnInfo::new("email", "VARCHAR(255)").unique(),
                    ],
                ))
                .with_table(TableInfo::new(
                    "orders",
                    vec![
                        ColumnInfo::new("id", "INT(11)").primary_key(),
                        ColumnInfo::new("user_id", "INT(11)").references("users", "id"),
                    ],
                )),
        ));
        registry
    }

    #[tokio::test]
    async fn constraint_kinds_are_derived() {
        let table = TableConstraintsTable::new(registry());
        let result = table.query(&[], &QueryOptions::default()).await.unwrap();
        let kinds: Vec<(String, String)> = result
            .rows
            .iter()
            .map(|r| {
                (
                    r["TABLE_NAME"].to_text().unwrap(),
                    r["CONSTRAINT_TYPE"].to_text().unwrap(),
                )
            })
            .collect();
        assert!(kinds.contains(&("users".into(), "PRIMARY KEY".into())));
        assert!(kinds.contains(&("users".into(), "UNIQUE".into())));
        assert!(kinds.contains(&("orders".into(), "FOREIGN KEY".into())));
    }

    #[tokio::test]
    async fn foreign_key_references_the_schema_of_the_referenced_table() {
        let table = KeyColumnUsageTable::new(registry());
        let filters = vec![Filter::new("column_name", "=", "user_id")];
        let result = table.query(&filters, &QueryOptions::default()).await.unwrap();
        assert_eq!(result.total, 1);
        let row = &result.rows[0];
        assert_eq!(
            row["REFERENCED_TABLE_SCHEMA"].to_text().as_deref(),
            Some("mydb")
        );
        assert_eq!(
            row["REFERENCED_TABLE_NAME"].to_text().as_deref(),
            Some("users")
        );
        assert_eq!(
            row["REFERENCED_COLUMN_NAME"].to_text().as_deref(),
            Some("id")
        );
    }

    #[tokio::test]
    async fn primary_key_ordinals_are_sequential() {
        let registry = Arc::new(DataSourceRegistry::new());
        registry.register(Arc::new(MemoryDataSource::new("mydb").with_table(
            TableInfo::new(
                "pairs",
                vec![
                    ColumnInfo::new("a", "INT(11)").primary_key(),
                    ColumnInfo::new("b", "INT(11)").primary_key(),
                ],
            ),
        )));
        let table = KeyColumnUsageTable::new(registry);
        let result = table.query(&[], &QueryOptions::default()).await.unwrap();
        let ordinals: Vec<i64> = result
            .rows
            .iter()
            .map(|r| match &r["ORDINAL_POSITION"] {
                Value::Int(i) => *i,
                _ => panic!("ordinal must be an int"),
            })
            .collect();
        assert_eq!(ordinals, vec![1, 2]);
    }
}
