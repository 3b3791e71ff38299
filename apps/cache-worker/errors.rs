use alchemy_arc::ArcError;
use alchemy_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("chain source error: {0}")]
    Source(#[from] ArcError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] StoreError),

    #[error("cache lease lost during the pass")]
    LeaseLost,
}
