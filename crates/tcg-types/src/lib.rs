pub mod models;

pub use models::{CardRef, ChatMessage, GiftLog, TradeRecord};
