use crate::datasource::{ColumnInfo, Value};
use crate::vtable::acl_view::{AclScopedGrant, AclView};
use crate::vtable::{finish_query, row, Filter, QueryOptions, QueryResult, Row, VirtualTable, VtError};

use async_trait::async_trait;
use std::sync::Arc;

/// Privilege flag rendering for `mysql.*` tables ("Y"/"N", unlike the
/// "YES"/"NO" used by information_schema).
fn yn(granted: bool) -> Value {
    Value::Text(if granted { "Y" } else { "N" }.into())
}

/// `(column, privilege)` pairs of the `mysql.user` flag columns.
const USER_PRIV_COLUMNS: [(&str, &str); 16] = [
    ("Select_priv", "SELECT"),
    ("Insert_priv", "INSERT"),
    ("Update_priv", "UPDATE"),
    ("Delete_priv", "DELETE"),
    ("Create_priv", "CREATE"),
    ("Drop_priv", "DROP"),
    ("Reload_priv", "RELOAD"),
    ("Shutdown_priv", "SHUTDOWN"),
    ("Process_priv", "PROCESS"),
    ("File_priv", "FILE"),
    ("Grant_priv", "GRANT OPTION"),
    ("References_priv", "REFERENCES"),
    ("Index_priv", "INDEX"),
    ("Alter_priv", "ALTER"),
    ("Super_priv", "SUPER"),
    ("Create_user_priv", "CREATE USER"),
];

/// The subset of flag columns `mysql.db` carries.
const DB_PRIV_COLUMNS: [(&str, &str); 10] = [
    ("Select_priv", "SELECT"),
    ("Insert_priv", "INSERT"),
    ("Update_priv", "UPDATE"),
    ("Delete_priv", "DELETE"),
    ("Create_priv", "CREATE"),
    ("Drop_priv", "DROP"),
    ("Grant_priv", "GRANT OPTION"),
    ("References_priv", "REFERENCES"),
    ("Index_priv", "INDEX"),
    ("Alter_priv", "ALTER"),
];

fn has(privileges: &[(String, bool)], name: &str) -> bool {
    privileges
        .iter()
        .any(|(p, granted)| *granted && p.eq_ignore_ascii_case(name))
}

/// Render a granted set the way the `*_priv` SET columns do:
/// `Select,Insert`.
fn priv_set(privileges: &[(String, bool)]) -> String {
    privileges
        .iter()
        .filter(|(_, granted)| *granted)
        .map(|(name, _)| {
            let mut out = String::new();
            for (i, part) in name.split_whitespace().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                let mut chars = part.chars();
                if let Some(first) = chars.next() {
                    out.push(first.to_ascii_uppercase());
                    out.extend(chars.flat_map(|c| c.to_lowercase()));
                }
            }
            out
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// `mysql.user`.
pub struct MysqlUserTable {
    acl: Arc<dyn AclView>,
}

impl MysqlUserTable {
    pub fn new(acl: Arc<dyn AclView>) -> Self {
        MysqlUserTable { acl }
    }
}

#[async_trait]
impl VirtualTable for MysqlUserTable {
    fn table_name(&self) -> &'static str {
        "user"
    }

    fn schema(&self) -> Vec<ColumnInfo> {
        let mut columns = vec![
            ColumnInfo::new("Host", "CHAR(255)"),
            ColumnInfo::new("User", "CHAR(32)"),
            ColumnInfo::new("Password", "CHAR(41)"),
        ];
        for (name, _) in USER_PRIV_COLUMNS {
            columns.push(ColumnInfo::new(name, "ENUM('N','Y')"));
        }
        columns
    }

    async fn query(
        &self,
        filters: &[Filter],
        options: &QueryOptions,
    ) -> Result<QueryResult, VtError> {
        let rows = self
            .acl
            .users()
            .into_iter()
            .map(|u| {
                let mut r: Row = row([
                    ("Host", Value::Text(u.host.clone())),
                    ("User", Value::Text(u.user.clone())),
                    ("Password", Value::Text(u.password.clone())),
                ]);
                for (column, privilege) in USER_PRIV_COLUMNS {
                    r.insert(column.to_string(), yn(has(&u.privileges, privilege)));
                }
                r
            })
            .collect();
        finish_query(rows, filters, options, true)
    }
}

/// `mysql.db`.
pub struct MysqlDbTable {
    acl: Arc<dyn AclView>,
}

impl MysqlDbTable {
    pub fn new(acl: Arc<dyn AclView>) -> Self {
        MysqlDbTable { acl }
    }
}

#[async_trait]
impl VirtualTable for MysqlDbTable {
    fn table_name(&self) -> &'static str {
        "db"
    }

    fn schema(&self) -> Vec<ColumnInfo> {
        let mut columns = vec![
            ColumnInfo::new("Host", "CHAR(255)"),
            ColumnInfo::new("Db", "CHAR(64)"),
            ColumnInfo::new("User", "CHAR(32)"),
        ];
        for (name, _) in DB_PRIV_COLUMNS {
            columns.push(ColumnInfo::new(name, "ENUM('N','Y')"));
        }
        columns
    }

    async fn query(
        &self,
        filters: &[Filter],
        options: &QueryOptions,
    ) -> Result<QueryResult, VtError> {
        let rows = self
            .acl
            .db_grants()
            .into_iter()
            .map(|g| {
                let mut r: Row = row([
                    ("Host", Value::Text(g.host.clone())),
                    ("Db", Value::Text(g.db.clone())),
                    ("User", Value::Text(g.user.clone())),
                ]);
                for (column, privilege) in DB_PRIV_COLUMNS {
                    r.insert(column.to_string(), yn(has(&g.privileges, privilege)));
                }
                r
            })
            .collect();
        finish_query(rows, filters, options, true)
    }
}

fn scoped_priv_row(g: &AclScopedGrant, with_column: bool) -> Row {
    let mut r: Row = row([
        ("Host", Value::Text(g.host.clone())),
        ("Db", Value::Text(g.db.clone())),
        ("User", Value::Text(g.user.clone())),
        ("Table_name", Value::Text(g.table.clone())),
    ]);
    if with_column {
        r.insert("Column_name".to_string(), Value::Text(g.column.clone()));
        r.insert(
            "Column_priv".to_string(),
            Value::Text(priv_set(&g.privileges)),
        );
    } else {
        r.insert("Grantor".to_string(), Value::Text(String::new()));
        r.insert(
            "Table_priv".to_string(),
            Value::Text(priv_set(&g.privileges)),
        );
        r.insert("Column_priv".to_string(), Value::Text(String::new()));
    }
    r
}

/// `mysql.tables_priv`.
pub struct MysqlTablesPrivTable {
    acl: Arc<dyn AclView>,
}

impl MysqlTablesPrivTable {
    pub fn new(acl: Arc<dyn AclView>) -> Self {
        MysqlTablesPrivTable { acl }
    }
}

#[async_trait]
impl VirtualTable for MysqlTablesPrivTable {
    fn table_name(&self) -> &'static str {
        "tables_priv"
    }

    fn schema(&self) -> Vec<ColumnInfo> {
        vec![
            ColumnInfo::new("Host", "CHAR(255)"),
            ColumnInfo::new("Db", "CHAR(64)"),
            ColumnInfo::new("User", "CHAR(32)"),
            ColumnInfo::new("Table_name", "CHAR(64)"),
            ColumnInfo::new("Grantor", "VARCHAR(93)"),
            ColumnInfo::new("Table_priv", "SET"),
            ColumnInfo::new("Column_priv", "SET"),
        ]
    }

    async fn query(
        &self,
        filters: &[Filter],
        options: &QueryOptions,
    ) -> Result<QueryResult, VtError> {
        let rows = self
            .acl
            .table_grants()
            .iter()
            .map(|g| scoped_priv_row(g, false))
            .collect();
        finish_query(rows, filters, options, true)
    }
}

/// `mysql.columns_priv`.
pub struct MysqlColumnsPrivTable {
    acl: Arc<dyn AclView>,
}

impl MysqlColumnsPrivTable {
    pub fn new(acl: Arc<dyn AclView>) -> Self {
        MysqlColumnsPrivTable { acl }
    }
}

#[async_trait]
impl VirtualTable for MysqlColumnsPrivTable {
    fn table_name(&self) -> &'static str {
        "columns_priv"
    }

    fn schema(&self) -> Vec<ColumnInfo> {
        vec![
            ColumnInfo::new("Host", "CHAR(255)"),
            ColumnInfo::new("Db", "CHAR(64)"),
            ColumnInfo::new("User", "CHAR(32)"),
            ColumnInfo::new("Table_name", "CHAR(64)"),
            ColumnInfo::new("Column_name", "CHAR(64)"),
            ColumnInfo::new("Column_priv", "SET"),
        ]
    }

    async fn query(
        &self,
        filters: &[Filter],
        options: &QueryOptions,
    ) -> Result<QueryResult, VtError> {
        let rows = self
            .acl
            .column_grants()
            .iter()
            .map(|g| scoped_priv_row(g, true))
            .collect();
        finish_query(rows, filters, options, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::adapter::AclManagerAdapter;
    use crate::acl::{AclManager, GrantScope};

    fn acl_fixture() -> Arc<dyn AclView> {
        let acl = Arc::new(AclManager::in_memory());
        acl.create_user("app", "10.0.%", "pw").unwrap();
        acl.grant("app", "10.0.%", GrantScope::Global, &["SELECT"]).unwrap();
        acl.grant(
            "app",
            "10.0.%",
            GrantScope::Table("shop".into(), "orders".into()),
            &["SELECT", "INSERT"],
        )
        .unwrap();
        acl.grant(
            "app",
            "10.0.%",
            GrantScope::Column("shop".into(), "users".into(), "email".into()),
            &["SELECT"],
        )
        .unwrap();
        Arc::new(AclManagerAdapter::new(acl))
    }

    #[tokio::test]
    async fn user_table_uses_y_n_flags() {
        let table = MysqlUserTable::new(acl_fixture());
        let filters = vec![Filter::new("User", "=", "app")];
        let result = table.query(&filters, &QueryOptions::default()).await.unwrap();
        assert_eq!(result.total, 1);
        let row = &result.rows[0];
        assert_eq!(row["Select_priv"].to_text().as_deref(), Some("Y"));
        assert_eq!(row["Insert_priv"].to_text().as_deref(), Some("N"));
        assert_eq!(row["Grant_priv"].to_text().as_deref(), Some("N"));

        let root = vec![Filter::new("User", "=", "root")];
        let result = table.query(&root, &QueryOptions::default()).await.unwrap();
        assert_eq!(result.rows[0]["Grant_priv"].to_text().as_deref(), Some("Y"));
    }

    #[tokio::test]
    async fn tables_priv_renders_a_set() {
        let table = MysqlTablesPrivTable::new(acl_fixture());
        let result = table.query(&[], &QueryOptions::default()).await.unwrap();
        assert_eq!(result.total, 1);
        let row = &result.rows[0];
        assert_eq!(row["Db"].to_text().as_deref(), Some("shop"));
        assert_eq!(row["Table_name"].to_text().as_deref(), Some("orders"));
        assert_eq!(row["Table_priv"].to_text().as_deref(), Some("Insert,Select"));
    }

    #[tokio::test]
    async fn columns_priv_carries_the_column() {
        let table = MysqlColumnsPrivTable::new(acl_fixture());
        let result = table.query(&[], &QueryOptions::default()).await.unwrap();
        assert_eq!(result.total, 1);
        let row = &result.rows[0];
        assert_eq!(row["Column_name"].to_text().as_deref(), Some("email"));
        assert_eq!(row["Column_priv"].to_text().as_deref(), Some("Select"));
    }
}
