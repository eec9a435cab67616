use crate::acl::AclManager;
use crate::vtable::acl_view::{AclScopedGrant, AclUserEntry, AclView};

use itertools::Itertools;
use std::collections::HashMap;
use std::sync::Arc;

fn sorted_privileges(map: &HashMap<String, bool>) -> Vec<(String, bool)> {
    map.iter().map(|(k, v)| (k.clone(), *v)).sorted().collect()
}

/// Thin adapter giving the virtual tables their capability view of the ACL
/// manager without a dependency from the ACL module on the vtable module.
pub struct AclManagerAdapter {
    inner: Arc<AclManager>,
}

impl AclManagerAdapter {
    pub fn new(inner: Arc<AclManager>) -> Self {
        AclManagerAdapter { inner }
    }
}

impl AclView for AclManagerAdapter {
    fn is_loaded(&self) -> bool {
        self.inner.is_loaded()
    }

    fn check_permission(
        &self,
        user: &str,
        host: &str,
        privilege: &str,
        db: &str,
        table: &str,
        column: &str,
    ) -> bool {
        self.inner
            .check_permission(user, host, privilege, db, table, column)
    }

    fn has_grant_option(&self, user: &str, host: &str) -> bool {
        self.inner.has_grant_option(user, host)
    }

    fn users(&self) -> Vec<AclUserEntry> {
        self.inner
            .get_users()
            .into_iter()
            .map(|u| AclUserEntry {
                host: u.host,
                user: u.user,
                password: u.password,
                privileges: sorted_privileges(&u.privileges),
            })
            .collect()
    }

    fn db_grants(&self) -> Vec<AclScopedGrant> {
        self.inner
            .db_permissions()
            .into_iter()
            .map(|p| AclScopedGrant {
                host: p.host,
                db: p.db,
                user: p.user,
                table: String::new(),
                column: String::new(),
                privileges: sorted_privileges(&p.privileges),
            })
            .collect()
    }

    fn table_grants(&self) -> Vec<AclScopedGrant> {
        self.inner
            .table_permissions()
            .into_iter()
            .map(|p| AclScopedGrant {
                host: p.host,
                db: p.db,
                user: p.user,
                table: p.table,
                column: String::new(),
                privileges: sorted_privileges(&p.privileges),
            })
            .collect()
    }

    fn column_grants(&self) -> Vec<AclScopedGrant> {
        self.inner
            .column_permissions()
            .into_iter()
            .map(|p| AclScopedGrant {
                host: p.host,
                db: p.db,
                user: p.user,
                table: p.table,
                column: p.column,
                privileges: sorted_privileges(&p.privileges),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::{AclManager, GrantScope};

    #[test]
    fn adapter_exposes_users_and_grants() {
        let acl = Arc::new(AclManager::in_memory());
        acl.create_user("app", "%", "pw").unwrap();
        acl.grant("app", "%", GrantScope::Db("shop".into()), &["SELECT", "INSERT"])
            .unwrap();
        let adapter = AclManagerAdapter::new(Arc::clone(&acl));

        assert!(adapter.is_loaded());
        let users = adapter.users();
        assert!(users.iter().any(|u| u.user == "app" && !u.password.is_empty()));

        let grants = adapter.db_grants();
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].db, "shop");
        assert_eq!(
            grants[0].privileges,
            vec![("INSERT".to_string(), true), ("SELECT".to_string(), true)]
        );
        assert!(adapter.check_permission("app", "h", "SELECT", "shop", "t", "c"));
    }
}
