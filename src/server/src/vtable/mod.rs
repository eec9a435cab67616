pub mod acl_view;
pub mod catalog;
pub mod columns;
pub mod constraints;
pub mod mysql_schema;
pub mod privileges;
pub mod provider;
pub mod schemata;
pub mod tables;
pub mod views;

use crate::acl::UserIdentity;
use crate::datasource::{ColumnInfo, Value};

use async_trait::async_trait;
use hashbrown::HashMap;
use thiserror::Error;

/// A row is a mapping from column name to value; consumers emit cells in
/// schema order.
pub type Row = HashMap<String, Value>;

#[derive(Debug, Error)]
pub enum VtError {
    #[error("unsupported filter operator: {0}")]
    UnsupportedOperator(String),
}

/// One conjunctive filter; the operator is one of `=`, `!=`, `LIKE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field: String,
    pub op: String,
    pub value: String,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: impl Into<String>, value: impl Into<String>) -> Self {
        Filter {
            field: field.into(),
            op: op.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub limit: Option<usize>,
    pub offset: usize,
    /// Identity of the requesting session; some tables tailor their rows.
    pub user: Option<UserIdentity>,
}

#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    /// Row count after filtering but before offset/limit.
    pub total: usize,
}

/// A named provider with a fixed schema whose rows are computed on demand.
#[async_trait]
pub trait VirtualTable: Send + Sync {
    fn table_name(&self) -> &'static str;
    fn schema(&self) -> Vec<ColumnInfo>;
    async fn query(&self, filters: &[Filter], options: &QueryOptions)
        -> Result<QueryResult, VtError>;
}

/// Case-insensitive LIKE over the supported pattern subset: `%`,
/// `prefix%`, `%suffix` and a bare literal.
pub fn like_match(pattern: &str, value: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let value = value.to_lowercase();
    if pattern == "%" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('%') {
        if !prefix.contains('%') {
            return value.starts_with(prefix);
        }
    }
    if let Some(suffix) = pattern.strip_prefix('%') {
        if !suffix.contains('%') {
            return value.ends_with(suffix);
        }
    }
    pattern == value
}

fn field_text(row: &Row, field: &str) -> String {
    if let Some(v) = row.get(field) {
        return v.to_text().unwrap_or_default();
    }
    // filters name fields however the query spelled them
    row.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(field))
        .and_then(|(_, v)| v.to_text())
        .unwrap_or_default()
}

/// Apply conjunctive filters. Equality comparisons are case-sensitive
/// unless the table opts out; LIKE is always case-insensitive.
pub fn filter_rows(
    rows: Vec<Row>,
    filters: &[Filter],
    case_insensitive_eq: bool,
) -> Result<Vec<Row>, VtError> {
    for f in filters {
        match f.op.as_str() {
            "=" | "!=" | "LIKE" => {}
            other => return Err(VtError::UnsupportedOperator(other.to_string())),
        }
    }
    let keep = |row: &Row| -> bool {
        filters.iter().all(|f| {
            let cell = field_text(row, &f.field);
            match f.op.as_str() {
                "=" => {
                    if case_insensitive_eq {
                        cell.eq_ignore_ascii_case(&f.value)
                    } else {
                        cell == f.value
                    }
                }
                "!=" => {
                    if case_insensitive_eq {
                        !cell.eq_ignore_ascii_case(&f.value)
                    } else {
                        cell != f.value
                    }
                }
                "LIKE" => like_match(&f.value, &cell),
                _ => unreachable!("operators validated above"),
            }
        })
    };
    Ok(rows.into_iter().filter(|r| keep(r)).collect())
}

/// Shared post-processing: filter, count, then page.
pub fn finish_query(
    rows: Vec<Row>,
    filters: &[Filter],
    options: &QueryOptions,
    case_insensitive_eq: bool,
) -> Result<QueryResult, VtError> {
    let filtered = filter_rows(rows, filters, case_insensitive_eq)?;
    let total = filtered.len();
    let paged: Vec<Row> = filtered
        .into_iter()
        .skip(options.offset)
        .take(options.limit.unwrap_or(usize::MAX))
        .collect();
    Ok(QueryResult { rows: paged, total })
}

pub fn row(pairs: impl IntoIterator<Item = (&'static str, Value)>) -> Row {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Split a declared SQL type like `VARCHAR(255)` into its lowercase base
/// name and the parenthesised length, when present.
pub fn parse_declared_type(declared: &str) -> (String, Option<u64>) {
    let trimmed = declared.trim();
    match trimmed.split_once('(') {
        Some((base, rest)) => {
            let len = rest
                .split(&[')', ','][..])
                .next()
                .and_then(|n| n.trim().parse().ok());
            (base.trim().to_lowercase(), len)
        }
        None => (trimmed.to_lowercase(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rows() -> Vec<Row> {
        vec![
            row([("name", Value::Text("users".into())), ("n", Value::Int(1))]),
            row([("name", Value::Text("orders".into())), ("n", Value::Int(2))]),
            row([("name", Value::Text("user_stats".into())), ("n", Value::Int(3))]),
        ]
    }

    #[test]
    fn like_pattern_subset() {
        assert!(like_match("%", "anything"));
        assert!(like_match("user%", "USERS"));
        assert!(!like_match("user%", "orders"));
        assert!(like_match("%stats", "user_stats"));
        assert!(like_match("orders", "ORDERS"));
        assert!(!like_match("orders", "orders2"));
    }

    #[test]
    fn filters_are_conjunctive() {
        let filters = vec![
            Filter::new("name", "LIKE", "user%"),
            Filter::new("n", "!=", "1"),
        ];
        let out = filter_rows(sample_rows(), &filters, false).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(field_text(&out[0], "name"), "user_stats");
    }

    #[test]
    fn unknown_operator_is_an_error() {
        let filters = vec![Filter::new("name", ">", "a")];
        assert!(matches!(
            filter_rows(sample_rows(), &filters, false),
            Err(VtError::UnsupportedOperator(_))
        ));
    }

    #[test]
    fn paging_happens_after_filtering() {
        let options = QueryOptions {
            limit: Some(1),
            offset: 1,
            user: None,
        };
        let result = finish_query(sample_rows(), &[], &options, false).unwrap();
        assert_eq!(result.total, 3);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(field_text(&result.rows[0], "name"), "orders");
    }

    #[test]
    fn declared_type_parsing() {
        assert_eq!(parse_declared_type("INT(11)"), ("int".into(), Some(11)));
        assert_eq!(
            parse_declared_type("VARCHAR(255)"),
            ("varchar".into(), Some(255))
        );
        assert_eq!(parse_declared_type("text"), ("text".into(), None));
        assert_eq!(
            parse_declared_type("DECIMAL(10,2)"),
            ("decimal".into(), Some(10))
        );
    }
}
