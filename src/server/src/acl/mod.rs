pub mod adapter;
pub mod native_password;
pub mod store;

use crate::acl::store::{AclStore, PermissionsFile, StoreError, UsersFile};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::info;

pub const GRANT_OPTION: &str = "GRANT OPTION";
pub const ALL_PRIVILEGES: &str = "ALL PRIVILEGES";

/// Every concrete privilege name; `ALL PRIVILEGES` expands to this set on
/// both grant and revoke.
pub fn known_privileges() -> &'static [&'static str] {
    &[
        "SELECT",
        "INSERT",
        "UPDATE",
        "DELETE",
        "CREATE",
        "DROP",
        "RELOAD",
        "SHUTDOWN",
        "PROCESS",
        "FILE",
        "REFERENCES",
        "INDEX",
        "ALTER",
        "SHOW DATABASES",
        "SUPER",
        "CREATE TEMPORARY TABLES",
        "LOCK TABLES",
        "EXECUTE",
        "REPLICATION SLAVE",
        "REPLICATION CLIENT",
        "CREATE VIEW",
        "SHOW VIEW",
        "CREATE ROUTINE",
        "ALTER ROUTINE",
        "CREATE USER",
        "EVENT",
        "TRIGGER",
        GRANT_OPTION,
    ]
}

/// Authenticated `(user, host)` pair; the host is the matched account host
/// pattern, not the client address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub user: String,
    pub host: String,
}

impl fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'@'{}'", self.user, self.host)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub host: String,
    pub user: String,
    /// `*`-prefixed uppercase hex SHA1(SHA1(password)), or empty for none.
    pub password: String,
    #[serde(default)]
    pub privileges: HashMap<String, bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DbPermission {
    pub host: String,
    pub db: String,
    pub user: String,
    #[serde(default)]
    pub privileges: HashMap<String, bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TablePermission {
    pub host: String,
    pub db: String,
    pub user: String,
    pub table: String,
    #[serde(default)]
    pub privileges: HashMap<String, bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnPermission {
    pub host: String,
    pub db: String,
    pub user: String,
    pub table: String,
    pub column: String,
    #[serde(default)]
    pub privileges: HashMap<String, bool>,
}

#[derive(Debug, Error)]
pub enum AclError {
    #[error("access denied for user '{user}'@'{host}'")]
    AuthFailed { user: String, host: String },
    #[error("user '{0}' does not exist")]
    UnknownUser(String),
    #[error("user '{0}' already exists")]
    DuplicateUser(String),
    /// The in-memory change is kept; the caller may retry persistence.
    #[error("failed to persist grant tables: {0}")]
    Persistence(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantScope {
    Global,
    Db(String),
    Table(String, String),
    Column(String, String, String),
}

/// `%` and `_` wildcard match, case-insensitive; used for host patterns.
fn pattern_match(pattern: &str, value: &str) -> bool {
    fn inner(p: &[u8], v: &[u8]) -> bool {
        match (p.first(), v.first()) {
            (None, None) => true,
            (Some(b'%'), _) => inner(&p[1..], v) || (!v.is_empty() && inner(p, &v[1..])),
            (Some(b'_'), Some(_)) => inner(&p[1..], &v[1..]),
            (Some(pc), Some(vc)) => {
                pc.eq_ignore_ascii_case(vc) && inner(&p[1..], &v[1..])
            }
            _ => false,
        }
    }
    inner(pattern.as_bytes(), value.as_bytes())
}

fn host_matches(entry_host: &str, client_host: &str) -> bool {
    entry_host == "%" || pattern_match(entry_host, client_host)
}

fn name_eq(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

fn has_privilege(map: &HashMap<String, bool>, privilege: &str) -> bool {
    map.iter()
        .any(|(name, granted)| *granted && name_eq(name, privilege))
}

fn expand_privileges(privileges: &[&str]) -> Vec<String> {
    if privileges.iter().any(|p| name_eq(p, ALL_PRIVILEGES)) {
        known_privileges().iter().map(|p| p.to_string()).collect()
    } else {
        privileges.iter().map(|p| p.to_uppercase()).collect()
    }
}

#[derive(Default)]
struct AclState {
    users: Vec<User>,
    db: Vec<DbPermission>,
    tables_priv: Vec<TablePermission>,
    columns_priv: Vec<ColumnPermission>,
    loaded: bool,
}

impl AclState {
    fn find_user(&self, user: &str, host: &str) -> Option<&User> {
        self.users
            .iter()
            .find(|u| name_eq(&u.user, user) && name_eq(&u.host, host))
    }

    fn find_user_mut(&mut self, user: &str, host: &str) -> Option<&mut User> {
        self.users
            .iter_mut()
            .find(|u| name_eq(&u.user, user) && name_eq(&u.host, host))
    }

    /// Account lookup for a connecting client: exact `(host, user)` first,
    /// then any entry whose user matches and whose host pattern covers the
    /// client host.
    fn match_account(&self, user: &str, client_host: &str) -> Option<&User> {
        self.find_user(user, client_host).or_else(|| {
            self.users
                .iter()
                .find(|u| name_eq(&u.user, user) && host_matches(&u.host, client_host))
        })
    }
}

/// The layered permission store shared by every session, guarded by one
/// read-write lock. Mutators persist to disk before releasing the lock.
pub struct AclManager {
    state: RwLock<AclState>,
    store: Option<AclStore>,
}

fn root_user() -> User {
    User {
        host: "%".to_string(),
        user: "root".to_string(),
        password: String::new(),
        privileges: known_privileges()
            .iter()
            .map(|p| (p.to_string(), true))
            .collect(),
    }
}

impl AclManager {
    /// Open the grant tables under `data_dir`, bootstrapping a passwordless
    /// root account when no users file exists yet.
    pub fn open(data_dir: &Path) -> Result<Self, AclError> {
        let store = AclStore::new(data_dir)?;
        let mut state = AclState::default();
        match store.load()? {
            Some((users, permissions)) => {
                state.users = users.users;
                state.db = permissions.db;
                state.tables_priv = permissions.tables_priv;
                state.columns_priv = permissions.columns_priv;
            }
            None => {
                info!("no users file found, bootstrapping 'root'@'%'");
                state.users.push(root_user());
                store.save(
                    &UsersFile {
                        users: state.users.clone(),
                    },
                    &PermissionsFile::default(),
                )?;
            }
        }
        state.loaded = true;
        Ok(AclManager {
            state: RwLock::new(state),
            store: Some(store),
        })
    }

    /// A manager with the bootstrap root account and no backing files.
    pub fn in_memory() -> Self {
        AclManager {
            state: RwLock::new(AclState {
                users: vec![root_user()],
                loaded: true,
                ..AclState::default()
            }),
            store: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.state.read().loaded
    }

    /// Challenge-response authentication for `mysql_native_password`.
    pub fn authenticate(
        &self,
        user: &str,
        client_host: &str,
        salt: &[u8],
        response: &[u8],
    ) -> Result<UserIdentity, AclError> {
        let state = self.state.read();
        let denied = || AclError::AuthFailed {
            user: user.to_string(),
            host: client_host.to_string(),
        };
        let account = state
            .match_account(user, client_host)
            .ok_or_else(&denied)?;
        if !native_password::verify(salt, &account.password, response) {
            return Err(denied());
        }
        Ok(UserIdentity {
            user: account.user.clone(),
            host: account.host.clone(),
        })
    }

    /// Layered privilege check: global, then db, table and column scope.
    /// A grant at any scope suffices.
    pub fn check_permission(
        &self,
        user: &str,
        host: &str,
        privilege: &str,
        db: &str,
        table: &str,
        column: &str,
    ) -> bool {
        let state = self.state.read();
        if let Some(u) = state.match_account(user, host) {
            if has_privilege(&u.privileges, privilege) {
                return true;
            }
        }
        if state.db.iter().any(|p| {
            host_matches(&p.host, host)
                && name_eq(&p.user, user)
                && (p.db == "%" || p.db == db)
                && has_privilege(&p.privileges, privilege)
        }) {
            return true;
        }
        if state.tables_priv.iter().any(|p| {
            host_matches(&p.host, host)
                && name_eq(&p.user, user)
                && (p.db == "%" || p.db == db)
                && p.table == table
                && has_privilege(&p.privileges, privilege)
        }) {
            return true;
        }
        state.columns_priv.iter().any(|p| {
            host_matches(&p.host, host)
                && name_eq(&p.user, user)
                && (p.db == "%" || p.db == db)
                && p.table == table
                && p.column == column
                && has_privilege(&p.privileges, privilege)
        })
    }

    /// True when the global map or any db-level entry for the user carries
    /// GRANT OPTION. Map reads are inlined; the lock is taken once.
    pub fn has_grant_option(&self, user: &str, host: &str) -> bool {
        let state = self.state.read();
        if let Some(u) = state.match_account(user, host) {
            if has_privilege(&u.privileges, GRANT_OPTION) {
                return true;
            }
        }
        state.db.iter().any(|p| {
            host_matches(&p.host, host)
                && name_eq(&p.user, user)
                && has_privilege(&p.privileges, GRANT_OPTION)
        })
    }

    pub fn get_users(&self) -> Vec<User> {
        self.state.read().users.clone()
    }

    pub fn db_permissions(&self) -> Vec<DbPermission> {
        self.state.read().db.clone()
    }

    pub fn table_permissions(&self) -> Vec<TablePermission> {
        self.state.read().tables_priv.clone()
    }

    pub fn column_permissions(&self) -> Vec<ColumnPermission> {
        self.state.read().columns_priv.clone()
    }

    pub fn create_user(&self, user: &str, host: &str, password: &str) -> Result<(), AclError> {
        let mut state = self.state.write();
        if state.find_user(user, host).is_some() {
            return Err(AclError::DuplicateUser(format!("{user}@{host}")));
        }
        state.users.push(User {
            host: host.to_string(),
            user: user.to_string(),
            password: native_password::hash_password(password),
            privileges: HashMap::new(),
        });
        self.persist(&state)
    }

    pub fn drop_user(&self, user: &str, host: &str) -> Result<(), AclError> {
        let mut state = self.state.write();
        let before = state.users.len();
        state
            .users
            .retain(|u| !(name_eq(&u.user, user) && name_eq(&u.host, host)));
        if state.users.len() == before {
            return Err(AclError::UnknownUser(format!("{user}@{host}")));
        }
        state
            .db
            .retain(|p| !(name_eq(&p.user, user) && name_eq(&p.host, host)));
        state
            .tables_priv
            .retain(|p| !(name_eq(&p.user, user) && name_eq(&p.host, host)));
        state
            .columns_priv
            .retain(|p| !(name_eq(&p.user, user) && name_eq(&p.host, host)));
        self.persist(&state)
    }

    pub fn set_password(&self, user: &str, host: &str, password: &str) -> Result<(), AclError> {
        let mut state = self.state.write();
        let u = state
            .find_user_mut(user, host)
            .ok_or_else(|| AclError::UnknownUser(format!("{user}@{host}")))?;
        u.password = native_password::hash_password(password);
        self.persist(&state)
    }

    pub fn grant(
        &self,
        user: &str,
        host: &str,
        scope: GrantScope,
        privileges: &[&str],
    ) -> Result<(), AclError> {
        let expanded = expand_privileges(privileges);
        let mut state = self.state.write();
        if state.find_user(user, host).is_none() {
            return Err(AclError::UnknownUser(format!("{user}@{host}")));
        }
        match scope {
            GrantScope::Global => {
                if let Some(u) = state.find_user_mut(user, host) {
                    for p in expanded {
                        u.privileges.insert(p, true);
                    }
                }
            }
            GrantScope::Db(db) => {
                let idx = state
                    .db
                    .iter()
                    .position(|p| name_eq(&p.user, user) && name_eq(&p.host, host) && p.db == db)
                    .unwrap_or_else(|| {
                        state.db.push(DbPermission {
                            host: host.to_string(),
                            db,
                            user: user.to_string(),
                            privileges: HashMap::new(),
                        });
                        state.db.len() - 1
                    });
                for p in expanded {
                    state.db[idx].privileges.insert(p, true);
                }
            }
            GrantScope::Table(db, table) => {
                let idx = state
                    .tables_priv
                    .iter()
                    .position(|p| {
                        name_eq(&p.user, user)
                            && name_eq(&p.host, host)
                            && p.db == db
                            && p.table == table
                    })
                    .unwrap_or_else(|| {
                        state.tables_priv.push(TablePermission {
                            host: host.to_string(),
                            db,
                            user: user.to_string(),
                            table,
                            privileges: HashMap::new(),
                        });
                        state.tables_priv.len() - 1
                    });
                for p in expanded {
                    state.tables_priv[idx].privileges.insert(p, true);
                }
            }
            GrantScope::Column(db, table, column) => {
                let idx = state
                    .columns_priv
                    .iter()
                    .position(|p| {
                        name_eq(&p.user, user)
                            && name_eq(&p.host, host)
                            && p.db == db
                            && p.table == table
                            && p.column == column
                    })
                    .unwrap_or_else(|| {
                        state.columns_priv.push(ColumnPermission {
                            host: host.to_string(),
                            db,
                            user: user.to_string(),
                            table,
                            column,
                            privileges: HashMap::new(),
                        });
                        state.columns_priv.len() - 1
                    });
                for p in expanded {
                    state.columns_priv[idx].privileges.insert(p, true);
                }
            }
        }
        self.persist(&state)
    }

    /// Remove privileges at one scope. A broader grant stays visible to
    /// `check_permission`.
    pub fn revoke(
        &self,
        user: &str,
        host: &str,
        scope: GrantScope,
        privileges: &[&str],
    ) -> Result<(), AclError> {
        let expanded = expand_privileges(privileges);
        let mut state = self.state.write();
        match scope {
            GrantScope::Global => {
                if let Some(u) = state.find_user_mut(user, host) {
                    for p in &expanded {
                        u.privileges.remove(p);
                    }
                }
            }
            GrantScope::Db(db) => {
                for entry in state
                    .db
                    .iter_mut()
                    .filter(|p| name_eq(&p.user, user) && name_eq(&p.host, host) && p.db == db)
                {
                    for p in &expanded {
                        entry.privileges.remove(p);
                    }
                }
                state.db.retain(|p| !p.privileges.is_empty());
            }
            GrantScope::Table(db, table) => {
                for entry in state.tables_priv.iter_mut().filter(|p| {
                    name_eq(&p.user, user)
                        && name_eq(&p.host, host)
                        && p.db == db
                        && p.table == table
                }) {
                    for p in &expanded {
                        entry.privileges.remove(p);
                    }
                }
                state.tables_priv.retain(|p| !p.privileges.is_empty());
            }
            GrantScope::Column(db, table, column) => {
                for entry in state.columns_priv.iter_mut().filter(|p| {
                    name_eq(&p.user, user)
                        && name_eq(&p.host, host)
                        && p.db == db
                        && p.table == table
                        && p.column == column
                }) {
                    for p in &expanded {
                        entry.privileges.remove(p);
                    }
                }
                state.columns_priv.retain(|p| !p.privileges.is_empty());
            }
        }
        self.persist(&state)
    }

    fn persist(&self, state: &AclState) -> Result<(), AclError> {
        if let Some(store) = &self.store {
            store.save(
                &UsersFile {
                    users: state.users.clone(),
                },
                &PermissionsFile {
                    db: state.db.clone(),
                    tables_priv: state.tables_priv.clone(),
                    columns_priv: state.columns_priv.clone(),
                },
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn salt() -> [u8; 20] {
        *b"abcdefghijklmnopqrst"
    }

    #[test]
    fn bootstrap_root_authenticates_with_empty_password() {
        let acl = AclManager::in_memory();
        let identity = acl.authenticate("root", "10.0.0.1", &salt(), b"").unwrap();
        assert_eq!(identity.user, "root");
        assert_eq!(identity.host, "%");
        assert!(acl.check_permission("root", "%", "SELECT", "any", "t", "c"));
    }

    #[test]
    fn auth_rejects_wrong_password() {
        let acl = AclManager::in_memory();
        acl.create_user("app", "%", "sekret").unwrap();
        let good = native_password::scramble_response(&salt(), "sekret");
        let bad = native_password::scramble_response(&salt(), "wrong");
        assert!(acl.authenticate("app", "web1", &salt(), &good).is_ok());
        assert!(matches!(
            acl.authenticate("app", "web1", &salt(), &bad),
            Err(AclError::AuthFailed { .. })
        ));
    }

    #[test]
    fn host_lookup_prefers_exact_then_pattern() {
        let acl = AclManager::in_memory();
        acl.create_user("app", "10.0.%", "a").unwrap();
        acl.create_user("app", "10.0.0.5", "b").unwrap();
        let response = native_password::scramble_response(&salt(), "b");
        let identity = acl.authenticate("app", "10.0.0.5", &salt(), &response).unwrap();
        assert_eq!(identity.host, "10.0.0.5");

        let response = native_password::scramble_response(&salt(), "a");
        let identity = acl.authenticate("app", "10.0.1.9", &salt(), &response).unwrap();
        assert_eq!(identity.host, "10.0.%");
    }

    #[test]
    fn user_and_host_compare_case_insensitively() {
        let acl = AclManager::in_memory();
        acl.create_user("App", "WEB1", "").unwrap();
        assert!(acl.authenticate("app", "web1", &salt(), b"").is_ok());
    }

    #[test]
    fn privilege_layering_grants_at_each_scope() {
        let acl = AclManager::in_memory();
        acl.create_user("u", "%", "").unwrap();
        assert!(!acl.check_permission("u", "h", "SELECT", "d", "t", "c"));

        acl.grant("u", "%", GrantScope::Column("d".into(), "t".into(), "c".into()), &["SELECT"])
            .unwrap();
        assert!(acl.check_permission("u", "h", "SELECT", "d", "t", "c"));
        assert!(!acl.check_permission("u", "h", "SELECT", "d", "t", "other"));

        acl.grant("u", "%", GrantScope::Table("d".into(), "t".into()), &["SELECT"])
            .unwrap();
        assert!(acl.check_permission("u", "h", "SELECT", "d", "t", "other"));

        acl.grant("u", "%", GrantScope::Db("d".into()), &["SELECT"]).unwrap();
        assert!(acl.check_permission("u", "h", "SELECT", "d", "t2", ""));

        acl.grant("u", "%", GrantScope::Global, &["SELECT"]).unwrap();
        assert!(acl.check_permission("u", "h", "SELECT", "elsewhere", "", ""));
    }

    #[test]
    fn revoke_at_narrow_scope_keeps_broader_grant() {
        let acl = AclManager::in_memory();
        acl.create_user("u", "%", "").unwrap();
        acl.grant("u", "%", GrantScope::Global, &["SELECT"]).unwrap();
        acl.grant("u", "%", GrantScope::Db("d".into()), &["SELECT"]).unwrap();

        acl.revoke("u", "%", GrantScope::Db("d".into()), &["SELECT"]).unwrap();
        assert!(acl.check_permission("u", "h", "SELECT", "d", "t", "c"));

        acl.revoke("u", "%", GrantScope::Global, &["SELECT"]).unwrap();
        assert!(!acl.check_permission("u", "h", "SELECT", "d", "t", "c"));
    }

    #[test]
    fn all_privileges_expands_on_grant_and_revoke() {
        let acl = AclManager::in_memory();
        acl.create_user("u", "%", "").unwrap();
        acl.grant("u", "%", GrantScope::Global, &[ALL_PRIVILEGES]).unwrap();
        assert!(acl.check_permission("u", "h", "INSERT", "", "", ""));
        assert!(acl.has_grant_option("u", "h"));

        acl.revoke("u", "%", GrantScope::Global, &[ALL_PRIVILEGES]).unwrap();
        assert!(!acl.check_permission("u", "h", "INSERT", "", "", ""));
        assert!(!acl.has_grant_option("u", "h"));
    }

    #[test]
    fn grant_option_via_db_scope() {
        let acl = AclManager::in_memory();
        acl.create_user("u", "%", "").unwrap();
        assert!(!acl.has_grant_option("u", "h"));
        acl.grant("u", "%", GrantScope::Db("d".into()), &[GRANT_OPTION]).unwrap();
        assert!(acl.has_grant_option("u", "h"));
    }

    #[test]
    fn drop_user_removes_scoped_permissions() {
        let acl = AclManager::in_memory();
        acl.create_user("u", "%", "").unwrap();
        acl.grant("u", "%", GrantScope::Db("d".into()), &["SELECT"]).unwrap();
        acl.drop_user("u", "%").unwrap();
        assert!(acl.db_permissions().is_empty());
        assert!(matches!(
            acl.drop_user("u", "%"),
            Err(AclError::UnknownUser(_))
        ));
    }

    #[test]
    fn pattern_match_wildcards() {
        assert!(pattern_match("%", "anything"));
        assert!(pattern_match("10.0.%", "10.0.3.7"));
        assert!(pattern_match("web_", "web1"));
        assert!(!pattern_match("web_", "web12"));
        assert!(pattern_match("HOST", "host"));
        assert!(!pattern_match("10.0.%", "192.168.0.1"));
    }
}
