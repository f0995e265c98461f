pub mod chat;
pub mod collection;
pub mod directory;
pub mod error;
pub mod gift;
pub mod ledger;
pub mod ratelimit;
pub mod trade;
pub mod wanted;

pub use chat::ChatWorkflow;
pub use collection::CollectionStore;
pub use directory::{ResolveStatus, UserDirectory};
pub use error::EngineError;
pub use gift::GiftWorkflow;
pub use ledger::SequenceLedger;
pub use ratelimit::RateLimiter;
pub use trade::TradeWorkflow;
pub use wanted::WantedListReconciler;

use std::sync::Arc;

use tcg_store::KeyTree;

/// All engine components over one shared backing store. One instance per
/// process; everything else is per-request.
pub struct Engine<S> {
    pub directory: UserDirectory<S>,
    pub cards: CollectionStore<S>,
    pub wanted: WantedListReconciler<S>,
    pub chat: ChatWorkflow<S>,
    pub trades: TradeWorkflow<S>,
    pub gifts: GiftWorkflow<S>,
}

impl<S: KeyTree> Engine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            directory: UserDirectory::new(store.clone()),
            cards: CollectionStore::new(store.clone()),
            wanted: WantedListReconciler::new(store.clone()),
            chat: ChatWorkflow::new(store.clone()),
            trades: TradeWorkflow::new(store.clone()),
            gifts: GiftWorkflow::new(store),
        }
    }
}
