use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use tcg_store::KeyTree;
use tcg_types::{CardRef, TradeRecord};

use crate::directory::UserDirectory;
use crate::error::EngineError;
use crate::ledger::{self, SequenceLedger};

/// Trades: resolve the proposer, record the proposal under its allocated
/// sequence number. Recording moves no cards; settlement is out of band.
pub struct TradeWorkflow<S> {
    directory: UserDirectory<S>,
    ledger: SequenceLedger<S>,
    store: Arc<S>,
}

impl<S: KeyTree> TradeWorkflow<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            directory: UserDirectory::new(store.clone()),
            ledger: SequenceLedger::new(store.clone()),
            store,
        }
    }

    /// Record a proposal: `offered` and `requested` are comma-joined
    /// `setName:cardId` lists. Malformed pairs are skipped with a warning,
    /// but a proposal offering nothing valid is rejected.
    pub fn propose(
        &self,
        username: &str,
        password: &str,
        other: &str,
        offered: &str,
        requested: &str,
    ) -> Result<(i64, TradeRecord), EngineError> {
        if other.is_empty() {
            return Err(EngineError::Validation("to"));
        }
        self.directory.authenticate(username, password)?;

        let offered = parse_card_list(offered);
        if offered.is_empty() {
            return Err(EngineError::Validation("offered"));
        }
        let requested = parse_card_list(requested);

        let seq = self.ledger.allocate(ledger::TRADES)?;
        let record = TradeRecord {
            from: username.to_string(),
            to: other.to_string(),
            offered,
            requested,
            timestamp: Utc::now(),
        };
        self.store
            .set(&format!("trades/{seq}"), serde_json::to_value(&record)?)?;
        info!("Trade {seq} recorded: {username} -> {other}");
        Ok((seq, record))
    }
}

fn parse_card_list(list: &str) -> Vec<CardRef> {
    let mut cards = Vec::new();
    for pair in list.split(',').filter(|p| !p.is_empty()) {
        let parsed = pair
            .split_once(':')
            .and_then(|(set, id)| Some((set, id.parse::<u32>().ok()?)))
            .filter(|(set, _)| !set.is_empty());
        match parsed {
            Some((set, id)) => cards.push(CardRef {
                set: set.to_string(),
                id,
            }),
            None => warn!("Skipping malformed trade pair: {pair}"),
        }
    }
    cards
}

#[cfg(test)]
mod tests {
    use super::*;
    use tcg_store::{KeyTree, MemoryTree};

    #[test]
    fn proposal_gets_sequenced_and_stored() {
        let store = Arc::new(MemoryTree::new());
        let trades = TradeWorkflow::new(store.clone());

        let (seq, record) = trades
            .propose("alice", "pw", "bob", "sv1:3,sv2:7", "sv3:1")
            .unwrap();
        assert_eq!(seq, 0);
        assert_eq!(record.offered.len(), 2);
        assert_eq!(record.requested.len(), 1);
        assert!(store.get("trades/0").unwrap().is_some());

        let (seq, _) = trades.propose("alice", "pw", "bob", "sv1:4", "").unwrap();
        assert_eq!(seq, 1);
    }

    #[test]
    fn malformed_pairs_are_skipped() {
        let store = Arc::new(MemoryTree::new());
        let trades = TradeWorkflow::new(store);

        let (_, record) = trades
            .propose("alice", "pw", "bob", "sv1:3,broken,sv2:x,:9", "sv1:1")
            .unwrap();
        assert_eq!(
            record.offered,
            vec![CardRef {
                set: "sv1".into(),
                id: 3
            }]
        );
    }

    #[test]
    fn missing_counterparty_or_offer_is_rejected() {
        let store = Arc::new(MemoryTree::new());
        let trades = TradeWorkflow::new(store);

        assert!(matches!(
            trades.propose("alice", "pw", "", "sv1:1", ""),
            Err(EngineError::Validation("to"))
        ));
        assert!(matches!(
            trades.propose("alice", "pw", "bob", "junk", ""),
            Err(EngineError::Validation("offered"))
        ));
    }
}
