use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use tcg_store::KeyTree;
use tcg_types::GiftLog;

use crate::directory::UserDirectory;
use crate::error::EngineError;
use crate::ledger::{self, SequenceLedger};

/// Gifts: authenticate the sender, stamp the target, append to the gift
/// log. The target's collection is never touched here — fulfillment reads
/// the log out of band.
pub struct GiftWorkflow<S> {
    directory: UserDirectory<S>,
    ledger: SequenceLedger<S>,
    store: Arc<S>,
}

impl<S: KeyTree> GiftWorkflow<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            directory: UserDirectory::new(store.clone()),
            ledger: SequenceLedger::new(store.clone()),
            store,
        }
    }

    /// Send `amount` of pack `pack` to `target`. The target is created on
    /// the spot if unseen — without a password, since targets need not
    /// have authenticated before — and receives a cooldown stamp.
    pub fn send(
        &self,
        sender: &str,
        password: &str,
        target: &str,
        pack: u32,
        amount: u32,
    ) -> Result<(i64, GiftLog), EngineError> {
        if target.is_empty() {
            return Err(EngineError::Validation("target"));
        }
        if amount < 1 {
            return Err(EngineError::Validation("amount"));
        }
        self.directory.authenticate(sender, password)?;
        self.directory.stamp_cooldown(target)?;

        let seq = self.ledger.allocate(ledger::GIFT_LOGS)?;
        let record = GiftLog {
            from: sender.to_string(),
            to: target.to_string(),
            pack,
            amount,
            timestamp: Utc::now(),
        };
        self.store
            .set(&format!("giftLogs/{seq}"), serde_json::to_value(&record)?)?;
        info!("Gift log {seq}: {sender} -> {target} ({amount} of pack {pack})");
        Ok((seq, record))
    }
}
