use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyRepositoryError {
    #[error("proxy pool is empty")]
    PoolEmpty,
    #[error("proxy vendor marked this account unavailable")]
    QuotaUnavailable,
    #[error("proxy vendor reports no extraction quota remaining")]
    NoExtractionRemaining,
    #[error("refresh is rate-limited; next refresh allowed in {0:?}")]
    RateLimited(Duration),
    #[error("vendor response could not be used: {0}")]
    MalformedResponse(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
