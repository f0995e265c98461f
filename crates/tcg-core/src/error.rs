use thiserror::Error;

use tcg_store::StoreError;

/// Engine-level failures surfaced to the HTTP boundary.
///
/// Malformed entries *inside* a batch command are not errors: they are
/// skipped with a warning and the rest of the batch proceeds.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A required field is missing or unusable; names the field for the
    /// client.
    #[error("missing or invalid field: {0}")]
    Validation(&'static str),

    /// Password mismatch for a known user.
    #[error("invalid password")]
    Auth,

    /// Too many requests from one source inside the window.
    #[error("rate limited")]
    RateLimited,

    /// The sequence counter transaction did not commit. Fatal for the
    /// request: there is no fallback ID source.
    #[error("sequence allocation failed for ledger '{0}'")]
    LedgerAllocation(String),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("serialization: {0}")]
    Serde(#[from] serde_json::Error),
}
