use std::sync::Arc;

use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use tcg_store::KeyTree;

use crate::error::EngineError;

/// Owned-card sets, one subtree per user: `cards/{user}/{set}/{id}` holds a
/// presence marker. Key present means owned (exactly once), key absent
/// means not owned; there are no quantities.
pub struct CollectionStore<S> {
    store: Arc<S>,
}

impl<S: KeyTree> CollectionStore<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Apply a batch command: `set:id,id;set:-id,-id;...`.
    ///
    /// The sign of the *first* id in each list picks add or remove for the
    /// whole list. Malformed entries are skipped with a warning; a bad
    /// entry never aborts the rest of the batch. Each add/remove is an
    /// individual store write, so a crash mid-batch leaves earlier entries
    /// applied.
    pub fn apply_batch(&self, username: &str, command: &str) -> Result<(), EngineError> {
        for entry in command.split(';').filter(|e| !e.is_empty()) {
            let Some((set_name, id_list)) = entry.split_once(':') else {
                warn!("Skipping malformed collection entry: {entry}");
                continue;
            };
            if set_name.is_empty() || id_list.is_empty() {
                warn!("Skipping malformed collection entry: {entry}");
                continue;
            }

            let removing = id_list
                .split(',')
                .next()
                .is_some_and(|first| first.starts_with('-'));

            for token in id_list.split(',') {
                let digits = token.strip_prefix('-').unwrap_or(token);
                let Ok(id) = digits.parse::<u32>() else {
                    warn!("Skipping invalid card id '{token}' in entry: {entry}");
                    continue;
                };
                let path = format!("cards/{username}/{set_name}/{id}");
                if removing {
                    // removing an id that is not owned is a no-op
                    self.store.remove(&path)?;
                    debug!("Removed card: {path}");
                } else {
                    self.store.set(&path, json!("T"))?;
                    debug!("Added card: {path}");
                }
            }
        }
        Ok(())
    }

    /// One user's collection, legacy encodings healed.
    pub fn collection(&self, username: &str) -> Result<Map<String, Value>, EngineError> {
        let mut sets = match self.store.get(&format!("cards/{username}"))? {
            Some(Value::Object(sets)) => sets,
            _ => Map::new(),
        };
        self.heal_user(username, &mut sets)?;
        Ok(sets)
    }

    /// Every user's collection, legacy encodings healed. Clients never see
    /// a raw legacy shape.
    pub fn all_collections(&self) -> Result<Map<String, Value>, EngineError> {
        let Some(Value::Object(users)) = self.store.get("cards")? else {
            return Ok(Map::new());
        };
        let mut healed = Map::new();
        for (username, sets) in users {
            let mut sets = match sets {
                Value::Object(sets) => sets,
                _ => Map::new(),
            };
            self.heal_user(&username, &mut sets)?;
            if !sets.is_empty() {
                healed.insert(username, Value::Object(sets));
            }
        }
        Ok(healed)
    }

    /// Convert any set stored as a JSON array (a historical encoding where
    /// the card id was the array index) into the canonical id-keyed map,
    /// writing the healed form back so the store converges on first read.
    fn heal_user(&self, username: &str, sets: &mut Map<String, Value>) -> Result<(), EngineError> {
        let mut emptied = Vec::new();
        for (set_name, value) in sets.iter_mut() {
            let Value::Array(entries) = value else {
                continue;
            };
            let mut map = Map::new();
            for (id, marker) in entries.iter().enumerate() {
                if is_owned_marker(marker) {
                    map.insert(id.to_string(), json!("T"));
                }
            }
            debug!("Healed legacy array set cards/{username}/{set_name}");
            let path = format!("cards/{username}/{set_name}");
            if map.is_empty() {
                self.store.remove(&path)?;
                emptied.push(set_name.clone());
            } else {
                self.store.set(&path, Value::Object(map.clone()))?;
                *value = Value::Object(map);
            }
        }
        for set_name in emptied {
            sets.remove(&set_name);
        }
        Ok(())
    }
}

/// Presence markers accumulated over schema generations: `"T"`, `true`,
/// or an object. Anything except null/false counts as owned.
fn is_owned_marker(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}
