use crate::acl::{ColumnPermission, DbPermission, TablePermission, User};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const USERS_FILE: &str = "users.json";
const PERMISSIONS_FILE: &str = "permissions.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("grant table io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("grant table format error: {0}")]
    Format(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UsersFile {
    pub users: Vec<User>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PermissionsFile {
    #[serde(default)]
    pub db: Vec<DbPermission>,
    #[serde(default)]
    pub tables_priv: Vec<TablePermission>,
    #[serde(default)]
    pub columns_priv: Vec<ColumnPermission>,
}

/// On-disk home of the grant tables. Callers serialise access through the
/// ACL manager's lock; writes replace each file atomically.
pub struct AclStore {
    dir: PathBuf,
}

impl AclStore {
    pub fn new(dir: &Path) -> Result<Self, StoreError> {
        if !dir.exists() {
            fs_err::create_dir_all(dir)?;
            set_mode(dir, 0o755)?;
        }
        Ok(AclStore {
            dir: dir.to_path_buf(),
        })
    }

    /// `None` when no users file exists yet (first start). A missing
    /// permissions file loads as empty tables.
    pub fn load(&self) -> Result<Option<(UsersFile, PermissionsFile)>, StoreError> {
        let users_path = self.dir.join(USERS_FILE);
        if !users_path.exists() {
            return Ok(None);
        }
        let users: UsersFile = serde_json::from_slice(&fs_err::read(&users_path)?)?;
        let permissions_path = self.dir.join(PERMISSIONS_FILE);
        let permissions = if permissions_path.exists() {
            serde_json::from_slice(&fs_err::read(&permissions_path)?)?
        } else {
            PermissionsFile::default()
        };
        Ok(Some((users, permissions)))
    }

    pub fn save(&self, users: &UsersFile, permissions: &PermissionsFile) -> Result<(), StoreError> {
        self.write_atomic(USERS_FILE, &serde_json::to_vec_pretty(users)?, 0o600)?;
        self.write_atomic(
            PERMISSIONS_FILE,
            &serde_json::to_vec_pretty(permissions)?,
            0o644,
        )
    }

    fn write_atomic(&self, name: &str, bytes: &[u8], mode: u32) -> Result<(), StoreError> {
        let tmp = self.dir.join(format!(".{name}.tmp"));
        let target = self.dir.join(name);
        fs_err::write(&tmp, bytes)?;
        set_mode(&tmp, mode)?;
        fs_err::rename(&tmp, &target)?;
        Ok(())
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs_err::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}
