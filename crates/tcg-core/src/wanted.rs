use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use tcg_store::KeyTree;

use crate::error::EngineError;

/// The schema generations a stored wanted-list set can carry. Decoded once
/// at the storage boundary; everything past this point works on id sets.
#[derive(Debug)]
enum WantedValue {
    /// Oldest form: `true` meant "card 0 of this set is wanted".
    LegacyBoolean(bool),
    /// Middle form: a map of id string → `true`.
    LegacyIdMap(Map<String, Value>),
    /// Current form: comma-joined id string.
    Canonical(String),
}

fn decode(value: &Value) -> Option<WantedValue> {
    match value {
        Value::Bool(b) => Some(WantedValue::LegacyBoolean(*b)),
        Value::Object(map) => Some(WantedValue::LegacyIdMap(map.clone())),
        Value::String(s) => Some(WantedValue::Canonical(s.clone())),
        _ => None,
    }
}

/// Per-user wanted-card sets under `wanted/{user}/{set}`, with
/// multi-generation migration applied transparently on every read.
///
/// Reads are self-healing: any legacy value encountered is rewritten in
/// canonical form, so the store converges without an offline migration
/// pass. The read-modify-write in [`apply_batch`] is deliberately not
/// transactional; see the lost-update note on that method.
///
/// [`apply_batch`]: WantedListReconciler::apply_batch
pub struct WantedListReconciler<S> {
    store: Arc<S>,
}

impl<S: KeyTree> WantedListReconciler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Read one user's wanted list in canonical form, migrating and writing
    /// back any legacy entries found. Idempotent: a second call reads only
    /// canonical strings and passes them through unchanged.
    pub fn normalize(&self, username: &str) -> Result<BTreeMap<String, String>, EngineError> {
        let Some(Value::Object(sets)) = self.store.get(&format!("wanted/{username}"))? else {
            return Ok(BTreeMap::new());
        };

        let mut canonical = BTreeMap::new();
        for (set_name, value) in sets {
            let path = format!("wanted/{username}/{set_name}");
            match decode(&value) {
                // already canonical: pass through as stored
                Some(WantedValue::Canonical(s)) => {
                    canonical.insert(set_name, s);
                }
                Some(WantedValue::LegacyBoolean(true)) => {
                    debug!("Migrating legacy boolean wanted entry at {path}");
                    self.store.set(&path, json!("0"))?;
                    canonical.insert(set_name, "0".to_string());
                }
                Some(WantedValue::LegacyBoolean(false)) => {
                    self.store.remove(&path)?;
                }
                Some(WantedValue::LegacyIdMap(map)) => {
                    debug!("Migrating legacy id-map wanted entry at {path}");
                    let ids = ids_from_map(&map);
                    if ids.is_empty() {
                        self.store.remove(&path)?;
                    } else {
                        let joined = encode(&ids);
                        self.store.set(&path, json!(joined))?;
                        canonical.insert(set_name, encode(&ids));
                    }
                }
                None => {
                    warn!("Unrecognized wanted value at {path}: {value}");
                }
            }
        }
        Ok(canonical)
    }

    /// Apply a batch command `set:id,id;set:-id,-id;...` and return the
    /// user's full canonical wanted list afterwards.
    ///
    /// A leading `-` on the first id puts the whole list in removal form; a
    /// redundant `-` on later ids is tolerated and stripped. Adds union
    /// into the existing set, removals subtract from it, and a set that
    /// empties out has its key deleted rather than storing `""`.
    ///
    /// Fetch-then-write is not transactional: two concurrent batches on the
    /// same `(user, set)` can read the same snapshot and one side's update
    /// is silently overwritten. Accepted for this domain's low concurrency;
    /// the sequence ledger is the only path that needed better.
    pub fn apply_batch(
        &self,
        username: &str,
        command: &str,
    ) -> Result<BTreeMap<String, String>, EngineError> {
        for entry in split_command(command) {
            let Some((set_name, id_spec)) = entry.split_once(':') else {
                warn!("Skipping malformed wanted entry: {entry}");
                continue;
            };
            if set_name.is_empty() || id_spec.is_empty() {
                warn!("Skipping malformed wanted entry: {entry}");
                continue;
            }

            let removing = id_spec.starts_with('-');
            let mut ids = BTreeSet::new();
            for token in id_spec.split(',') {
                let digits = token.strip_prefix('-').unwrap_or(token);
                match digits.parse::<u32>() {
                    Ok(id) => {
                        ids.insert(id);
                    }
                    Err(_) => warn!("Skipping invalid wanted id '{token}' in entry: {entry}"),
                }
            }
            if ids.is_empty() {
                continue;
            }

            let path = format!("wanted/{username}/{set_name}");
            let mut current = self.current_set(&path)?;
            if removing {
                for id in &ids {
                    current.remove(id);
                }
            } else {
                current.extend(ids);
            }

            if current.is_empty() {
                self.store.remove(&path)?;
            } else {
                self.store.set(&path, json!(encode(&current)))?;
            }
        }
        self.normalize(username)
    }

    /// Current id set at `path`, whichever generation it is stored in.
    fn current_set(&self, path: &str) -> Result<BTreeSet<u32>, EngineError> {
        let Some(value) = self.store.get(path)? else {
            return Ok(BTreeSet::new());
        };
        Ok(match decode(&value) {
            Some(WantedValue::Canonical(s)) => parse_canonical(&s),
            Some(WantedValue::LegacyBoolean(true)) => BTreeSet::from([0]),
            Some(WantedValue::LegacyIdMap(map)) => ids_from_map(&map),
            Some(WantedValue::LegacyBoolean(false)) | None => BTreeSet::new(),
        })
    }
}

/// Split a wanted-list command into `set:idSpec` entries. Two spellings
/// are accepted: the batch form `set:id,id;set:-id` and an older sibling
/// where each comma-joined token is its own individually signed `set:id`
/// pair.
fn split_command(command: &str) -> Vec<String> {
    if !command.contains(';') {
        let tokens: Vec<&str> = command.split(',').filter(|t| !t.is_empty()).collect();
        if tokens.len() > 1 && tokens.iter().all(|t| t.contains(':')) {
            return tokens.into_iter().map(str::to_string).collect();
        }
    }
    command
        .split(';')
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .collect()
}

fn ids_from_map(map: &Map<String, Value>) -> BTreeSet<u32> {
    map.iter()
        .filter(|(_, v)| matches!(v, Value::Bool(true)))
        .filter_map(|(k, _)| k.parse().ok())
        .collect()
}

fn parse_canonical(s: &str) -> BTreeSet<u32> {
    s.split(',').filter_map(|t| t.trim().parse().ok()).collect()
}

fn encode(ids: &BTreeSet<u32>) -> String {
    let strings: Vec<String> = ids.iter().map(u32::to_string).collect();
    strings.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tcg_store::MemoryTree;

    fn fixture() -> (Arc<MemoryTree>, WantedListReconciler<MemoryTree>) {
        let store = Arc::new(MemoryTree::new());
        (store.clone(), WantedListReconciler::new(store))
    }

    #[test]
    fn legacy_boolean_migrates_to_card_zero() {
        let (store, wanted) = fixture();
        store.set("wanted/alice/sv1", json!(true)).unwrap();

        let canonical = wanted.normalize("alice").unwrap();
        assert_eq!(canonical.get("sv1").map(String::as_str), Some("0"));
        assert_eq!(store.get("wanted/alice/sv1").unwrap(), Some(json!("0")));
    }

    #[test]
    fn legacy_id_map_migrates_to_sorted_join() {
        let (store, wanted) = fixture();
        store
            .set(
                "wanted/alice/sv3",
                json!({ "11": true, "2": true, "7": false }),
            )
            .unwrap();

        let canonical = wanted.normalize("alice").unwrap();
        assert_eq!(canonical.get("sv3").map(String::as_str), Some("2,11"));
        assert_eq!(store.get("wanted/alice/sv3").unwrap(), Some(json!("2,11")));
    }

    #[test]
    fn normalize_is_idempotent() {
        let (store, wanted) = fixture();
        store.set("wanted/alice/sv1", json!(true)).unwrap();
        store
            .set("wanted/alice/sv3", json!({ "5": true, "1": true }))
            .unwrap();
        store.set("wanted/alice/sv5", json!("3,9")).unwrap();

        let first = wanted.normalize("alice").unwrap();
        let second = wanted.normalize("alice").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn add_then_remove() {
        let (_, wanted) = fixture();
        wanted.apply_batch("alice", "sv3:10,11").unwrap();
        let canonical = wanted.apply_batch("alice", "sv3:-10").unwrap();
        assert_eq!(canonical.get("sv3").map(String::as_str), Some("11"));
    }

    #[test]
    fn duplicates_collapse() {
        let (_, wanted) = fixture();
        let canonical = wanted.apply_batch("alice", "sv1:4,4,2;sv1:2").unwrap();
        assert_eq!(canonical.get("sv1").map(String::as_str), Some("2,4"));
    }

    #[test]
    fn redundant_minus_on_later_ids_is_stripped() {
        let (_, wanted) = fixture();
        wanted.apply_batch("alice", "sv1:1,2,3").unwrap();
        let canonical = wanted.apply_batch("alice", "sv1:-1,-3").unwrap();
        assert_eq!(canonical.get("sv1").map(String::as_str), Some("2"));
    }

    #[test]
    fn emptied_set_key_is_deleted() {
        let (store, wanted) = fixture();
        wanted.apply_batch("alice", "sv1:5").unwrap();
        let canonical = wanted.apply_batch("alice", "sv1:-5").unwrap();
        assert!(!canonical.contains_key("sv1"));
        assert_eq!(store.get("wanted/alice/sv1").unwrap(), None);
    }

    #[test]
    fn batch_applies_against_legacy_value() {
        let (store, wanted) = fixture();
        store.set("wanted/alice/sv1", json!(true)).unwrap();
        let canonical = wanted.apply_batch("alice", "sv1:3").unwrap();
        assert_eq!(canonical.get("sv1").map(String::as_str), Some("0,3"));
    }

    #[test]
    fn older_pairwise_format_is_accepted() {
        let (_, wanted) = fixture();
        let canonical = wanted
            .apply_batch("alice", "sv1:3,sv2:5,sv1:-3")
            .unwrap();
        assert!(!canonical.contains_key("sv1"));
        assert_eq!(canonical.get("sv2").map(String::as_str), Some("5"));
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let (_, wanted) = fixture();
        let canonical = wanted
            .apply_batch("alice", "nocolon;sv1:x;sv2:8;:3")
            .unwrap();
        assert_eq!(canonical.len(), 1);
        assert_eq!(canonical.get("sv2").map(String::as_str), Some("8"));
    }

    /// Known consistency gap: whole-set last-write-wins. Two writers that
    /// read the same snapshot overwrite each other; one side's id is lost.
    #[test]
    fn interleaved_read_modify_write_loses_an_update() {
        let (store, wanted) = fixture();
        wanted.apply_batch("alice", "sv1:1").unwrap();

        // both writers read "1", then write their own union back
        store.set("wanted/alice/sv1", json!("1,2")).unwrap();
        store.set("wanted/alice/sv1", json!("1,3")).unwrap();

        let canonical = wanted.normalize("alice").unwrap();
        assert_eq!(canonical.get("sv1").map(String::as_str), Some("1,3"));
    }
}
