use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use tcg_store::{KeyTree, StoreError};

use crate::error::EngineError;

/// Ledger names with dedicated counters under `counters/`.
pub const MESSAGES: &str = "messages";
pub const TRADES: &str = "trades";
pub const GIFT_LOGS: &str = "giftLogs";

/// Gap-free monotonically increasing id allocator.
///
/// Each ledger is a single integer at `counters/{name}`, advanced through
/// the store's compare-and-update transaction: the store re-presents the
/// current value to `(current ?? -1) + 1` and commits only if no concurrent
/// writer got in between, retrying internally. Allocations within one
/// ledger are linearizable; across ledgers there is no ordering.
pub struct SequenceLedger<S> {
    store: Arc<S>,
}

impl<S: KeyTree> SequenceLedger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Allocate the next id for `ledger`. A transaction that does not
    /// commit is fatal for the request: there is no fallback id source.
    pub fn allocate(&self, ledger: &str) -> Result<i64, EngineError> {
        let path = format!("counters/{ledger}");
        let committed = self
            .store
            .transaction(&path, &|current| {
                let current = current.as_ref().and_then(Value::as_i64).unwrap_or(-1);
                Value::from(current + 1)
            })
            .map_err(|err| match err {
                StoreError::Conflict(_) => EngineError::LedgerAllocation(ledger.to_string()),
                other => EngineError::Store(other),
            })?;

        let seq = committed
            .as_i64()
            .ok_or_else(|| EngineError::LedgerAllocation(ledger.to_string()))?;
        debug!("Allocated {ledger} sequence {seq}");
        Ok(seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::thread;
    use tcg_store::MemoryTree;

    #[test]
    fn counters_start_at_zero_and_are_gap_free() {
        let ledger = SequenceLedger::new(Arc::new(MemoryTree::new()));
        for expected in 0..5 {
            assert_eq!(ledger.allocate(MESSAGES).unwrap(), expected);
        }
    }

    #[test]
    fn ledgers_are_independent() {
        let ledger = SequenceLedger::new(Arc::new(MemoryTree::new()));
        assert_eq!(ledger.allocate(MESSAGES).unwrap(), 0);
        assert_eq!(ledger.allocate(TRADES).unwrap(), 0);
        assert_eq!(ledger.allocate(MESSAGES).unwrap(), 1);
    }

    #[test]
    fn concurrent_allocations_are_distinct_and_dense() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 25;

        let store = Arc::new(MemoryTree::new());
        let mut handles = Vec::new();
        for _ in 0..THREADS {
            let store = store.clone();
            handles.push(thread::spawn(move || {
                let ledger = SequenceLedger::new(store);
                (0..PER_THREAD)
                    .map(|_| ledger.allocate(MESSAGES).unwrap())
                    .collect::<Vec<_>>()
            }));
        }

        let mut seen = BTreeSet::new();
        for handle in handles {
            for seq in handle.join().unwrap() {
                assert!(seen.insert(seq), "duplicate sequence {seq}");
            }
        }
        let total = (THREADS * PER_THREAD) as i64;
        assert_eq!(seen.first(), Some(&0));
        assert_eq!(seen.last(), Some(&(total - 1)));
        assert_eq!(seen.len() as i64, total);
    }
}
