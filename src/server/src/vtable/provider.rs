use crate::datasource::DataSourceRegistry;
use crate::vtable::acl_view::{self, AclView};
use crate::vtable::catalog::{CollationsTable, EnginesTable, PluginsTable, SystemVariablesTable};
use crate::vtable::columns::ColumnsTable;
use crate::vtable::constraints::{KeyColumnUsageTable, TableConstraintsTable};
use crate::vtable::mysql_schema::{
    MysqlColumnsPrivTable, MysqlDbTable, MysqlTablesPrivTable, MysqlUserTable,
};
use crate::vtable::privileges::{EmptyPrivilegesTable, UserPrivilegesTable, PRIVILEGE_TABLES};
use crate::vtable::schemata::SchemataTable;
use crate::vtable::tables::TablesTable;
use crate::vtable::views::ViewsTable;
use crate::vtable::VirtualTable;

use std::collections::HashMap;
use std::sync::Arc;

pub const INFORMATION_SCHEMA: &str = "information_schema";
pub const MYSQL_SCHEMA: &str = "mysql";

/// Registry of every virtual table, keyed by lowercase name. Privilege
/// tables and the `mysql` schema only exist when an ACL handle is
/// available, either supplied at construction or taken from the
/// process-wide registration.
pub struct VirtualTableProvider {
    information_schema: HashMap<String, Arc<dyn VirtualTable>>,
    mysql: HashMap<String, Arc<dyn VirtualTable>>,
    acl: Option<Arc<dyn AclView>>,
}

impl VirtualTableProvider {
    pub fn new(registry: Arc<DataSourceRegistry>, acl: Option<Arc<dyn AclView>>) -> Self {
        let acl = acl.or_else(acl_view::acl_view);

        let mut information_schema_names: Vec<String> = vec![
            "schemata".into(),
            "tables".into(),
            "columns".into(),
            "table_constraints".into(),
            "key_column_usage".into(),
            "views".into(),
            "engines".into(),
            "plugins".into(),
            "collations".into(),
            "system_variables".into(),
        ];
        let mut mysql_names: Vec<String> = Vec::new();
        let mut virtual_dbs = vec![INFORMATION_SCHEMA.to_string()];
        if acl.is_some() {
            information_schema_names.extend(PRIVILEGE_TABLES.iter().map(|n| n.to_string()));
            mysql_names.extend(["user", "db", "tables_priv", "columns_priv"].map(String::from));
            virtual_dbs.push(MYSQL_SCHEMA.to_string());
        }

        let mut provider = VirtualTableProvider {
            information_schema: HashMap::new(),
            mysql: HashMap::new(),
            acl: acl.clone(),
        };

        provider.register_information_schema(Arc::new(SchemataTable::new(
            Arc::clone(&registry),
            virtual_dbs,
        )));
        provider.register_information_schema(Arc::new(TablesTable::new(
            Arc::clone(&registry),
            information_schema_names,
            mysql_names,
        )));
        provider.register_information_schema(Arc::new(ColumnsTable::new(Arc::clone(&registry))));
        provider.register_information_schema(Arc::new(TableConstraintsTable::new(Arc::clone(
            &registry,
        ))));
        provider.register_information_schema(Arc::new(KeyColumnUsageTable::new(Arc::clone(
            &registry,
        ))));
        provider.register_information_schema(Arc::new(ViewsTable::new(Arc::clone(&registry))));
        provider.register_information_schema(Arc::new(EnginesTable::new(Arc::clone(&registry))));
        provider.register_information_schema(Arc::new(PluginsTable::new(Arc::clone(&registry))));
        provider.register_information_schema(Arc::new(CollationsTable));
        provider.register_information_schema(Arc::new(SystemVariablesTable));

        if let Some(acl) = acl {
            provider.register_information_schema(Arc::new(UserPrivilegesTable::new(Arc::clone(
                &acl,
            ))));
            provider
                .register_information_schema(Arc::new(EmptyPrivilegesTable::schema_privileges()));
            provider
                .register_information_schema(Arc::new(EmptyPrivilegesTable::table_privileges()));
            provider
                .register_information_schema(Arc::new(EmptyPrivilegesTable::column_privileges()));

            provider.register_mysql(Arc::new(MysqlUserTable::new(Arc::clone(&acl))));
            provider.register_mysql(Arc::new(MysqlDbTable::new(Arc::clone(&acl))));
            provider.register_mysql(Arc::new(MysqlTablesPrivTable::new(Arc::clone(&acl))));
            provider.register_mysql(Arc::new(MysqlColumnsPrivTable::new(acl)));
        }

        provider
    }

    fn register_information_schema(&mut self, table: Arc<dyn VirtualTable>) {
        self.information_schema
            .insert(table.table_name().to_lowercase(), table);
    }

    fn register_mysql(&mut self, table: Arc<dyn VirtualTable>) {
        self.mysql.insert(table.table_name().to_lowercase(), table);
    }

    /// Case-insensitive lookup in `information_schema`.
    pub fn get_virtual_table(&self, name: &str) -> Option<Arc<dyn VirtualTable>> {
        self.information_schema.get(&name.to_lowercase()).cloned()
    }

    /// Case-insensitive lookup across both virtual schemas.
    pub fn get_table(&self, db: &str, name: &str) -> Option<Arc<dyn VirtualTable>> {
        if db.eq_ignore_ascii_case(INFORMATION_SCHEMA) {
            self.get_virtual_table(name)
        } else if db.eq_ignore_ascii_case(MYSQL_SCHEMA) {
            self.mysql.get(&name.to_lowercase()).cloned()
        } else {
            None
        }
    }

    pub fn is_virtual_database(&self, db: &str) -> bool {
        db.eq_ignore_ascii_case(INFORMATION_SCHEMA)
            || (!self.mysql.is_empty() && db.eq_ignore_ascii_case(MYSQL_SCHEMA))
    }

    pub fn virtual_databases(&self) -> Vec<&'static str> {
        if self.mysql.is_empty() {
            vec![INFORMATION_SCHEMA]
        } else {
            vec![INFORMATION_SCHEMA, MYSQL_SCHEMA]
        }
    }

    /// `information_schema` table names visible to the given user; the
    /// privilege tables require GRANT OPTION.
    pub fn list_virtual_tables_for_user(&self, user: &str, host: &str) -> Vec<String> {
        let privileged = self
            .acl
            .as_ref()
            .map(|acl| acl.has_grant_option(user, host))
            .unwrap_or(false);
        let mut names: Vec<String> = self
            .information_schema
            .keys()
            .filter(|name| privileged || !PRIVILEGE_TABLES.contains(&name.as_str()))
            .cloned()
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::adapter::AclManagerAdapter;
    use crate::acl::AclManager;
    use crate::datasource::memory::MemoryDataSource;

    fn provider_with_acl() -> VirtualTableProvider {
        let registry = Arc::new(DataSourceRegistry::new());
        registry.register(Arc::new(MemoryDataSource::new("mydb")));
        let acl = Arc::new(AclManager::in_memory());
        acl.create_user("guest", "%", "").unwrap();
        VirtualTableProvider::new(registry, Some(Arc::new(AclManagerAdapter::new(acl))))
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let provider = provider_with_acl();
        let a = provider.get_virtual_table("PLUGINS").unwrap();
        let b = provider.get_virtual_table("plugins").unwrap();
        let c = provider.get_virtual_table("Plugins").unwrap();
        assert_eq!(a.table_name(), "plugins");
        assert_eq!(b.table_name(), "plugins");
        assert_eq!(c.table_name(), "plugins");
    }

    #[test]
    fn privilege_tables_require_grant_option() {
        let provider = provider_with_acl();
        let visible = provider.list_virtual_tables_for_user("guest", "%");
        assert!(!visible.contains(&"user_privileges".to_string()));
        assert!(visible.contains(&"tables".to_string()));

        let visible = provider.list_virtual_tables_for_user("root", "%");
        assert!(visible.contains(&"user_privileges".to_string()));
    }

    #[test]
    fn without_acl_no_privilege_or_mysql_tables() {
        let _guard = crate::vtable::acl_view::GLOBAL_HANDLE_TEST_LOCK.lock();
        let registry = Arc::new(DataSourceRegistry::new());
        crate::vtable::acl_view::reset_acl_view();
        let provider = VirtualTableProvider::new(registry, None);
        assert!(provider.get_virtual_table("user_privileges").is_none());
        assert!(provider.get_table("mysql", "user").is_none());
        assert_eq!(provider.virtual_databases(), vec![INFORMATION_SCHEMA]);
    }

    #[test]
    fn mysql_schema_routing() {
        let provider = provider_with_acl();
        assert!(provider.get_table("MySQL", "USER").is_some());
        assert!(provider.get_table("information_schema", "collations").is_some());
        assert!(provider.get_table("nope", "user").is_none());
        assert!(provider.is_virtual_database("Information_Schema"));
    }
}
