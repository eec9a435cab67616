use parking_lot::RwLock;
use std::sync::Arc;

/// One account as the virtual tables see it: host, user, stored password
/// hash and the global privilege map, sorted by privilege name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclUserEntry {
    pub host: String,
    pub user: String,
    pub password: String,
    pub privileges: Vec<(String, bool)>,
}

/// A db-, table- or column-scoped grant record; unused scope columns stay
/// empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclScopedGrant {
    pub host: String,
    pub db: String,
    pub user: String,
    pub table: String,
    pub column: String,
    pub privileges: Vec<(String, bool)>,
}

/// The narrow capability surface the virtual tables need from the ACL
/// engine. Declared here, implemented by an adapter on the ACL side, so the
/// ACL crate module stays free of any dependency on this one.
pub trait AclView: Send + Sync {
    fn is_loaded(&self) -> bool;
    fn check_permission(
        &self,
        user: &str,
        host: &str,
        privilege: &str,
        db: &str,
        table: &str,
        column: &str,
    ) -> bool;
    fn has_grant_option(&self, user: &str, host: &str) -> bool;
    fn users(&self) -> Vec<AclUserEntry>;
    fn db_grants(&self) -> Vec<AclScopedGrant>;
    fn table_grants(&self) -> Vec<AclScopedGrant>;
    fn column_grants(&self) -> Vec<AclScopedGrant>;
}

static ACL_HANDLE: RwLock<Option<Arc<dyn AclView>>> = RwLock::new(None);

/// Install the process-wide ACL handle. Guarded by the same lock the
/// reader takes, so a swap never races a lookup.
pub fn register_acl_view(view: Arc<dyn AclView>) {
    *ACL_HANDLE.write() = Some(view);
}

/// Fetch the process-wide ACL handle under the read lock.
pub fn acl_view() -> Option<Arc<dyn AclView>> {
    ACL_HANDLE.read().clone()
}

#[cfg(test)]
pub(crate) fn reset_acl_view() {
    *ACL_HANDLE.write() = None;
}

/// Tests touching the process-wide handle serialise on this.
#[cfg(test)]
pub(crate) static GLOBAL_HANDLE_TEST_LOCK: parking_lot::Mutex<()> = parking_lot::Mutex::new(());
