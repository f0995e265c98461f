pub mod memory;
pub mod sqlite;

pub use memory::MemoryTree;
pub use sqlite::SqliteTree;

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store lock poisoned")]
    LockPoisoned,
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("corrupt value at '{path}': {source}")]
    Corrupt {
        path: String,
        source: serde_json::Error,
    },
    #[error("transaction on '{0}' did not commit")]
    Conflict(String),
}

/// A persistent tree of JSON values addressed by slash-separated paths.
///
/// Writing `Null` (or a value that flattens to nothing, such as an empty
/// object) at a path is equivalent to removing it: absence and emptiness are
/// indistinguishable, which is what gives card-presence markers their
/// "key exists means owned" semantics.
pub trait KeyTree: Send + Sync {
    /// Read the value at `path`, including any subtree below it.
    fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// Replace the value at `path`, discarding whatever subtree was there.
    fn set(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// Delete `path` and everything below it. Removing an absent path is a
    /// no-op.
    fn remove(&self, path: &str) -> Result<(), StoreError>;

    /// Atomic compare-and-update of a single path. `apply` is given the
    /// current value (`None` if absent) and returns the replacement; the
    /// store retries it on write conflict and returns the value that
    /// actually committed. `apply` must be pure — it may run more than once.
    fn transaction(
        &self,
        path: &str,
        apply: &dyn Fn(Option<Value>) -> Value,
    ) -> Result<Value, StoreError>;
}

impl<T: KeyTree + ?Sized> KeyTree for std::sync::Arc<T> {
    fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        (**self).get(path)
    }

    fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        (**self).set(path, value)
    }

    fn remove(&self, path: &str) -> Result<(), StoreError> {
        (**self).remove(path)
    }

    fn transaction(
        &self,
        path: &str,
        apply: &dyn Fn(Option<Value>) -> Value,
    ) -> Result<Value, StoreError> {
        (**self).transaction(path, apply)
    }
}
