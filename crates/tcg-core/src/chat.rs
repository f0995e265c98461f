use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use tcg_store::KeyTree;
use tcg_types::ChatMessage;

use crate::directory::UserDirectory;
use crate::error::EngineError;
use crate::ledger::{self, SequenceLedger};

pub const DEFAULT_LOG_LIMIT: usize = 50;

/// Chat: resolve identity, optionally append a message under its allocated
/// sequence number, and return the recent log.
pub struct ChatWorkflow<S> {
    directory: UserDirectory<S>,
    ledger: SequenceLedger<S>,
    store: Arc<S>,
}

impl<S: KeyTree> ChatWorkflow<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            directory: UserDirectory::new(store.clone()),
            ledger: SequenceLedger::new(store.clone()),
            store,
        }
    }

    /// The `/` exchange: authenticate (registering on first contact), post
    /// `msg` if one was sent, and return the last `limit` messages.
    pub fn visit(
        &self,
        username: &str,
        password: &str,
        msg: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, EngineError> {
        self.directory.authenticate(username, password)?;

        if let Some(msg) = msg.filter(|m| !m.is_empty()) {
            let seq = self.ledger.allocate(ledger::MESSAGES)?;
            let record = ChatMessage {
                user: username.to_string(),
                msg: msg.to_string(),
                timestamp: Utc::now(),
            };
            self.store
                .set(&format!("messages/{seq}"), serde_json::to_value(&record)?)?;
            info!("Message {seq} saved: {username}");
        }

        self.log(limit)
    }

    /// Last `limit` messages ordered by timestamp, oldest first.
    pub fn log(&self, limit: usize) -> Result<Vec<ChatMessage>, EngineError> {
        let Some(serde_json::Value::Object(entries)) = self.store.get("messages")? else {
            return Ok(Vec::new());
        };

        let mut messages: Vec<ChatMessage> = entries
            .into_iter()
            .filter_map(|(seq, value)| match serde_json::from_value(value) {
                Ok(message) => Some(message),
                Err(err) => {
                    warn!("Skipping corrupt message record {seq}: {err}");
                    None
                }
            })
            .collect();

        messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        if messages.len() > limit {
            messages.drain(..messages.len() - limit);
        }
        Ok(messages)
    }
}
