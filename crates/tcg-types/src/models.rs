use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat message as stored under `messages/{seq}` and returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub user: String,
    pub msg: String,
    pub timestamp: DateTime<Utc>,
}

/// One card named in a trade proposal: a set name plus a card id within it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardRef {
    pub set: String,
    pub id: u32,
}

/// A proposed trade, stored under `trades/{seq}`. Records intent only;
/// no cards move when the record is written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub from: String,
    pub to: String,
    pub offered: Vec<CardRef>,
    pub requested: Vec<CardRef>,
    pub timestamp: DateTime<Utc>,
}

/// A gift grant, stored under `giftLogs/{seq}`. Fulfillment is performed
/// out-of-band by a consumer reading this log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GiftLog {
    pub from: String,
    pub to: String,
    pub pack: u32,
    pub amount: u32,
    pub timestamp: DateTime<Utc>,
}
