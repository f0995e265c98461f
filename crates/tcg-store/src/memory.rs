use std::sync::Mutex;

use serde_json::{Map, Value};

use crate::{KeyTree, StoreError};

/// In-memory key tree: a single JSON object guarded by a mutex.
///
/// Used by tests and as the reference semantics for [`SqliteTree`]. The
/// mutex makes `transaction` trivially atomic.
///
/// [`SqliteTree`]: crate::SqliteTree
#[derive(Default)]
pub struct MemoryTree {
    root: Mutex<Value>,
}

impl MemoryTree {
    pub fn new() -> Self {
        Self {
            root: Mutex::new(Value::Object(Map::new())),
        }
    }

    fn with_root<T>(
        &self,
        f: impl FnOnce(&mut Value) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut root = self.root.lock().map_err(|_| StoreError::LockPoisoned)?;
        f(&mut root)
    }
}

impl KeyTree for MemoryTree {
    fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        self.with_root(|root| Ok(node_at(root, path).cloned()))
    }

    fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        self.with_root(|root| {
            if is_empty_value(&value) {
                remove_at(root, path);
            } else {
                set_at(root, path, value);
            }
            Ok(())
        })
    }

    fn remove(&self, path: &str) -> Result<(), StoreError> {
        self.with_root(|root| {
            remove_at(root, path);
            Ok(())
        })
    }

    fn transaction(
        &self,
        path: &str,
        apply: &dyn Fn(Option<Value>) -> Value,
    ) -> Result<Value, StoreError> {
        self.with_root(|root| {
            let next = apply(node_at(root, path).cloned());
            if is_empty_value(&next) {
                remove_at(root, path);
            } else {
                set_at(root, path, next.clone());
            }
            Ok(next)
        })
    }
}

/// `Null` and empty objects flatten to nothing: storing them is a removal.
fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.iter().all(|(_, v)| is_empty_value(v)),
        _ => false,
    }
}

fn node_at<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut node = root;
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        node = node.as_object()?.get(segment)?;
    }
    Some(node)
}

fn set_at(root: &mut Value, path: &str, value: Value) {
    let mut node = root;
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let Some((last, parents)) = segments.split_last() else {
        *node = value;
        return;
    };
    for segment in parents {
        // writing below a scalar replaces it with a subtree
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Value::Object(map) = node else {
            return;
        };
        node = map
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    let Value::Object(map) = node else {
        return;
    };
    map.insert((*last).to_string(), value);
}

fn remove_at(root: &mut Value, path: &str) {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    remove_segments(root, &segments);
}

/// Recursive removal that prunes parents left empty, so that "no cards in a
/// set" and "no such set" collapse to the same shape.
fn remove_segments(node: &mut Value, segments: &[&str]) -> bool {
    let Some(map) = node.as_object_mut() else {
        return false;
    };
    match segments {
        [] => false,
        [last] => {
            map.remove(*last);
            map.is_empty()
        }
        [first, rest @ ..] => {
            let prune = match map.get_mut(*first) {
                Some(child) => remove_segments(child, rest),
                None => false,
            };
            if prune {
                map.remove(*first);
            }
            map.is_empty()
        }
    }
}
