use crate::acl::GRANT_OPTION;
use crate::datasource::{ColumnInfo, Value};
use crate::vtable::acl_view::AclView;
use crate::vtable::{finish_query, row, Filter, QueryOptions, QueryResult, VirtualTable, VtError};

use async_trait::async_trait;
use std::sync::Arc;

/// Table names that stay hidden from users without GRANT OPTION.
pub const PRIVILEGE_TABLES: [&str; 4] = [
    "user_privileges",
    "schema_privileges",
    "table_privileges",
    "column_privileges",
];

fn grantee(user: &str, host: &str) -> String {
    format!("'{user}'@'{host}'")
}

/// `information_schema.user_privileges`: one row per granted global
/// privilege, GRANT OPTION excluded and reflected in IS_GRANTABLE instead.
pub struct UserPrivilegesTable {
    acl: Arc<dyn AclView>,
}

impl UserPrivilegesTable {
    pub fn new(acl: Arc<dyn AclView>) -> Self {
        UserPrivilegesTable { acl }
    }
}

#[async_trait]
impl VirtualTable for UserPrivilegesTable {
    fn table_name(&self) -> &'static str {
        "user_privileges"
    }

    fn schema(&self) -> Vec<ColumnInfo> {
        vec![
            ColumnInfo::new("GRANTEE", "VARCHAR(81)"),
            ColumnInfo::new("TABLE_CATALOG", "VARCHAR(512)"),
            ColumnInfo::new("PRIVILEGE_TYPE", "VARCHAR(64)"),
            ColumnInfo::new("IS_GRANTABLE", "VARCHAR(3)"),
        ]
    }

    async fn query(
        &self,
        filters: &[Filter],
        options: &QueryOptions,
    ) -> Result<QueryResult, VtError> {
        let mut rows = Vec::new();
        for user in self.acl.users() {
            let grantable = user
                .privileges
                .iter()
                .any(|(name, granted)| *granted && name == GRANT_OPTION);
            for (name, granted) in &user.privileges {
                if !granted || name == GRANT_OPTION {
                    continue;
                }
                rows.push(row([
                    ("GRANTEE", Value::Text(grantee(&user.user, &user.host))),
                    ("TABLE_CATALOG", Value::Text("def".into())),
                    ("PRIVILEGE_TYPE", Value::Text(name.clone())),
                    (
                        "IS_GRANTABLE",
                        Value::Text(if grantable { "YES" } else { "NO" }.into()),
                    ),
                ]));
            }
        }
        finish_query(rows, filters, options, true)
    }
}

/// The schema-, table- and column-scope privilege tables are registered
/// with real schemas but currently produce no rows.
pub struct EmptyPrivilegesTable {
    name: &'static str,
    extra_scope_columns: &'static [&'static str],
}

impl EmptyPrivilegesTable {
    pub fn schema_privileges() -> Self {
        EmptyPrivilegesTable {
            name: "schema_privileges",
            extra_scope_columns: &["TABLE_SCHEMA"],
        }
    }

    pub fn table_privileges() -> Self {
        EmptyPrivilegesTable {
            name: "table_privileges",
            extra_scope_columns: &["TABLE_SCHEMA", "TABLE_NAME"],
        }
    }

    pub fn column_privileges() -> Self {
        EmptyPrivilegesTable {
            name: "column_privileges",
            extra_scope_columns: &["TABLE_SCHEMA", "TABLE_NAME", "COLUMN_NAME"],
        }
    }
}

#[async_trait]
impl VirtualTable for EmptyPrivilegesTable {
    fn table_name(&self) -> &'static str {
        self.name
    }

    fn schema(&self) -> Vec<ColumnInfo> {
        let mut columns = vec![
            ColumnInfo::new("GRANTEE", "VARCHAR(81)"),
            ColumnInfo::new("TABLE_CATALOG", "VARCHAR(512)"),
        ];
        for name in self.extra_scope_columns {
            columns.push(ColumnInfo::new(*name, "VARCHAR(64)"));
        }
        columns.push(ColumnInfo::new("PRIVILEGE_TYPE", "VARCHAR(64)"));
        columns.push(ColumnInfo::new("IS_GRANTABLE", "VARCHAR(3)"));
        columns
    }

    async fn query(
        &self,
        filters: &[Filter],
        options: &QueryOptions,
    ) -> Result<QueryResult, VtError> {
        finish_query(Vec::new(), filters, options, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::adapter::AclManagerAdapter;
    use crate::acl::{AclManager, GrantScope};

    fn view_with_app_user() -> Arc<dyn AclView> {
        let acl = Arc::new(AclManager::in_memory());
        acl.create_user("app", "%", "pw").unwrap();
        acl.grant("app", "%", GrantScope::Global, &["SELECT", "INSERT"])
            .unwrap();
        Arc::new(AclManagerAdapter::new(acl))
    }

    #[tokio::test]
    async fn one_row_per_granted_privilege() {
        let table = UserPrivilegesTable::new(view_with_app_user());
        let filters = vec![Filter::new("grantee", "=", "'app'@'%'")];
        let result = table.query(&filters, &QueryOptions::default()).await.unwrap();
        let privs: Vec<String> = result
            .rows
            .iter()
            .map(|r| r["PRIVILEGE_TYPE"].to_text().unwrap())
            .collect();
        assert_eq!(privs, vec!["INSERT", "SELECT"]);
        for r in &result.rows {
            assert_eq!(r["IS_GRANTABLE"].to_text().as_deref(), Some("NO"));
        }
    }

    #[tokio::test]
    async fn grant_option_flips_is_grantable_but_is_not_a_row() {
        let acl = Arc::new(AclManager::in_memory());
        let table = UserPrivilegesTable::new(Arc::new(AclManagerAdapter::new(acl)));
        let filters = vec![Filter::new("grantee", "=", "'root'@'%'")];
        let result = table.query(&filters, &QueryOptions::default()).await.unwrap();
        assert!(!result.rows.is_empty());
        for r in &result.rows {
            assert_eq!(r["IS_GRANTABLE"].to_text().as_deref(), Some("YES"));
            assert_ne!(
                r["PRIVILEGE_TYPE"].to_text().as_deref(),
                Some("GRANT OPTION")
            );
        }
    }

    #[tokio::test]
    async fn scoped_privilege_tables_are_empty() {
        let table = EmptyPrivilegesTable::table_privileges();
        assert_eq!(table.schema().len(), 6);
        let result = table.query(&[], &QueryOptions::default()).await.unwrap();
        assert_eq!(result.total, 0);
    }
}
