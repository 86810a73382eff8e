//! User store and permission checks backing the serving gate.
//!
//! Users live in `users.json` under the data root: Argon2 PHC password hash,
//! an admin flag and a list of named rights per user. Group configuration
//! names a required right; `has_right` answers whether an actor holds it,
//! with admins passing every check. The store is tiny and read per check,
//! which keeps serving stateless and lets operators edit it in place.

use anyhow::{anyhow, Result};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::resolver::PermissionChecker;

pub const DEFAULT_ADMIN_USER: &str = "admin";
const DEFAULT_ADMIN_PASSWORD: &str = "filegate";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub password_hash: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub rights: Vec<String>,
}

fn users_path(data_root: &Path) -> PathBuf {
    data_root.join("users.json")
}

fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!(e.to_string()))?
        .to_string();
    Ok(phc)
}

fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        let argon2 = Argon2::default();
        argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    } else {
        false
    }
}

fn read_users(path: &Path) -> Result<HashMap<String, UserRecord>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_users(path: &Path, users: &HashMap<String, UserRecord>) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).ok();
    }
    let raw = serde_json::to_string_pretty(users)?;
    std::fs::write(path, raw)?;
    Ok(())
}

/// Provision the user store with an admin account on first run. Idempotent:
/// an existing store, whatever it contains, is left untouched.
pub fn ensure_default_admin(data_root: &Path) -> Result<()> {
    let p = users_path(data_root);
    if p.exists() {
        return Ok(());
    }
    let hash = hash_password(DEFAULT_ADMIN_PASSWORD)?;
    let mut users = HashMap::new();
    users.insert(
        DEFAULT_ADMIN_USER.to_string(),
        UserRecord {
            password_hash: hash,
            is_admin: true,
            rights: Vec::new(),
        },
    );
    write_users(&p, &users)
}

/// Create or replace a user. Used by operator tooling and test setup.
pub fn add_user(
    data_root: &Path,
    username: &str,
    password: &str,
    is_admin: bool,
    rights: &[&str],
) -> Result<()> {
    let p = users_path(data_root);
    let mut users = read_users(&p)?;
    let hash = hash_password(password)?;
    users.insert(
        username.to_string(),
        UserRecord {
            password_hash: hash,
            is_admin,
            rights: rights.iter().map(|r| r.to_string()).collect(),
        },
    );
    write_users(&p, &users)
}

pub fn authenticate(data_root: &Path, username: &str, password: &str) -> Result<bool> {
    let users = read_users(&users_path(data_root))?;
    match users.get(username) {
        Some(rec) => Ok(verify_password(&rec.password_hash, password)),
        None => Ok(false),
    }
}

/// Does `username` hold `right`? Admins pass every check; unknown users fail.
pub fn has_right(data_root: &Path, username: &str, right: &str) -> Result<bool> {
    let users = read_users(&users_path(data_root))?;
    match users.get(username) {
        Some(rec) if rec.is_admin => Ok(true),
        Some(rec) => Ok(rec.rights.iter().any(|r| r == right)),
        None => Ok(false),
    }
}

/// `PermissionChecker` over the on-disk user store. Anonymous actors and
/// store read failures fail closed.
#[derive(Debug, Clone)]
pub struct UserStore {
    root: PathBuf,
}

impl UserStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl PermissionChecker for UserStore {
    fn has_right(&self, actor: Option<&str>, right: &str) -> bool {
        let Some(actor) = actor else {
            return false;
        };
        match has_right(&self.root, actor, right) {
            Ok(allowed) => allowed,
            Err(e) => {
                tracing::error!(actor = actor, right = right, error = %e, "permission lookup failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn password_hash_round_trip() {
        let phc = hash_password("hunter2").unwrap();
        assert!(phc.starts_with("$argon2"));
        assert!(verify_password(&phc, "hunter2"));
        assert!(!verify_password(&phc, "hunter3"));
        assert!(!verify_password("not a phc string", "hunter2"));
    }

    #[test]
    fn default_admin_provisioning_is_idempotent() {
        let dir = tempdir().unwrap();
        ensure_default_admin(dir.path()).unwrap();
        assert!(authenticate(dir.path(), DEFAULT_ADMIN_USER, "filegate").unwrap());

        // A second run must not reset existing accounts.
        add_user(dir.path(), "erin", "pw", false, &["viewphotos"]).unwrap();
        ensure_default_admin(dir.path()).unwrap();
        assert!(authenticate(dir.path(), "erin", "pw").unwrap());
    }

    #[test]
    fn rights_and_admin_override() {
        let dir = tempdir().unwrap();
        add_user(dir.path(), "erin", "pw", false, &["viewphotos"]).unwrap();
        add_user(dir.path(), "root", "pw", true, &[]).unwrap();

        assert!(has_right(dir.path(), "erin", "viewphotos").unwrap());
        assert!(!has_right(dir.path(), "erin", "viewscans").unwrap());
        assert!(has_right(dir.path(), "root", "viewscans").unwrap());
        assert!(!has_right(dir.path(), "nobody", "viewphotos").unwrap());
    }

    #[test]
    fn user_store_fails_closed_for_anonymous() {
        let dir = tempdir().unwrap();
        add_user(dir.path(), "erin", "pw", false, &["viewphotos"]).unwrap();
        let store = UserStore::new(dir.path().to_path_buf());
        assert!(!PermissionChecker::has_right(&store, None, "viewphotos"));
        assert!(PermissionChecker::has_right(&store, Some("erin"), "viewphotos"));
    }
}
