/// Transport-layer failures: everything that can go wrong talking to the
/// shared key-value store, independent of [`dfm_core::DfmError`] (which is
/// the taxonomy that crosses into client-visible `Response`s).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("malformed stream entry: {0}")]
    MalformedEntry(String),
}

pub type TransportResult<T> = Result<T, TransportError>;
