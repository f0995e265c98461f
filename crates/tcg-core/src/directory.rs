use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::info;

use tcg_store::KeyTree;

use crate::error::EngineError;

/// Outcome of resolving an identity against the user directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStatus {
    /// No record existed; one was created with the submitted password.
    New,
    /// Record exists and the password matches (or was backfilled onto a
    /// legacy record that had none).
    Ok,
    /// Record exists and the password does not match. Callers must reject
    /// the request with an authorization failure.
    Mismatch,
}

/// Credential storage with auto-registration.
///
/// Passwords are compared as submitted plaintext. That is the wire contract
/// this system inherited; hashing here would break existing clients. The
/// weakness is deliberate and documented, not an invitation to harden.
pub struct UserDirectory<S> {
    store: Arc<S>,
}

impl<S: KeyTree> UserDirectory<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn resolve(&self, username: &str, password: &str) -> Result<ResolveStatus, EngineError> {
        let path = format!("users/{username}/password");
        match self.store.get(&path)? {
            None if self.store.get(&format!("users/{username}"))?.is_none() => {
                self.store.set(&path, json!(password))?;
                info!("Registered new user: {username}");
                Ok(ResolveStatus::New)
            }
            None => {
                // legacy record with no password field: backfill
                self.store.set(&path, json!(password))?;
                info!("Backfilled password for legacy user: {username}");
                Ok(ResolveStatus::Ok)
            }
            Some(Value::String(stored)) if stored == password => Ok(ResolveStatus::Ok),
            Some(_) => Ok(ResolveStatus::Mismatch),
        }
    }

    /// Require a matching (or freshly created) identity; `Mismatch` becomes
    /// an auth error.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<(), EngineError> {
        match self.resolve(username, password)? {
            ResolveStatus::Mismatch => Err(EngineError::Auth),
            ResolveStatus::New | ResolveStatus::Ok => Ok(()),
        }
    }

    /// Stamp `users/{username}/cooldown` with the current time. Creates the
    /// record if absent — gift targets need not have authenticated before.
    pub fn stamp_cooldown(&self, username: &str) -> Result<(), EngineError> {
        self.store.set(
            &format!("users/{username}/cooldown"),
            json!(Utc::now().to_rfc3339()),
        )?;
        Ok(())
    }

    pub fn exists(&self, username: &str) -> Result<bool, EngineError> {
        Ok(self.store.get(&format!("users/{username}"))?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tcg_store::MemoryTree;

    fn directory() -> UserDirectory<MemoryTree> {
        UserDirectory::new(Arc::new(MemoryTree::new()))
    }

    #[test]
    fn first_contact_registers() {
        let dir = directory();
        assert_eq!(dir.resolve("alice", "pw").unwrap(), ResolveStatus::New);
        assert_eq!(dir.resolve("alice", "pw").unwrap(), ResolveStatus::Ok);
    }

    #[test]
    fn wrong_password_is_mismatch() {
        let dir = directory();
        dir.resolve("alice", "pw").unwrap();
        assert_eq!(dir.resolve("alice", "nope").unwrap(), ResolveStatus::Mismatch);
        assert!(matches!(
            dir.authenticate("alice", "nope"),
            Err(EngineError::Auth)
        ));
    }

    #[test]
    fn legacy_record_without_password_is_backfilled() {
        let store = Arc::new(MemoryTree::new());
        store
            .set("users/alice/cooldown", json!("2024-01-01T00:00:00Z"))
            .unwrap();
        let dir = UserDirectory::new(store.clone());

        assert_eq!(dir.resolve("alice", "pw").unwrap(), ResolveStatus::Ok);
        assert_eq!(
            store.get("users/alice/password").unwrap(),
            Some(json!("pw"))
        );
    }

    #[test]
    fn cooldown_stamp_creates_target_without_password() {
        let store = Arc::new(MemoryTree::new());
        let dir = UserDirectory::new(store.clone());

        dir.stamp_cooldown("bob").unwrap();
        assert!(dir.exists("bob").unwrap());
        assert_eq!(store.get("users/bob/password").unwrap(), None);
    }
}
