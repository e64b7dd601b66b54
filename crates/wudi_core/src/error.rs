//! Error taxonomy (spec.md §7). Kept as two small enums rather than one:
//! `SessionError` never actually escapes a socket session (everything is
//! absorbed into a classification or a proxy rotation), but naming its
//! cases documents the taxonomy the state machine implements. `TaskError`
//! is what the task executor can fail with.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("transient network failure: {0}")]
    Transient(String),
    #[error("proxy requires authentication")]
    ProxyAuthRequired,
    #[error("proxy banned by target site")]
    Banned,
    #[error("target asked us to wait")]
    ToldToWait,
    #[error("malformed response body")]
    MalformedBody,
    #[error("proxy pool drained")]
    PoolDrained,
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("input file is corrupt or unreadable")]
    CorruptInput,
    #[error("task has zero total numbers")]
    ZeroTotal,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store error: {0}")]
    Store(#[from] wudi_store::StoreError),
}
