use crate::errors::WorkerError;
use alchemy_arc::Network;
use async_trait::async_trait;
use redis::{AsyncCommands, Client, Script, aio::MultiplexedConnection};
use std::{fmt, time::Duration};
use tracing::{debug, info, instrument};

const RENEW_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("PEXPIRE", KEYS[1], ARGV[2])
else
    return 0
end
"#;

const UNLOCK_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

pub fn lock_key(network: Network) -> String {
    format!("alchemy-caching-{network}")
}

pub fn cursor_key(network: Network) -> String {
    format!("alchemy-last-block-{network}")
}

/// Proof of holding the cache lease. Only the holder can renew or release it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LeaseToken(String);

impl LeaseToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Unique per process and acquisition attempt.
    pub fn generate() -> Self {
        let nanos = chrono::Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_default();
        Self(format!("{}-{nanos}", std::process::id()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LeaseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cross-process coordination of cache passes: one lease per network and the
/// last block folded into the snapshot.
#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Returns `None` when another worker holds the lease.
    async fn try_lock(&self, ttl: Duration) -> Result<Option<LeaseToken>, WorkerError>;

    /// Returns `false` when the lease expired or was taken over.
    async fn renew_lock(&self, token: &LeaseToken, ttl: Duration) -> Result<bool, WorkerError>;

    async fn unlock(&self, token: &LeaseToken) -> Result<(), WorkerError>;

    async fn last_cached_block(&self) -> Result<u64, WorkerError>;

    async fn set_last_cached_block(&self, block: u64) -> Result<(), WorkerError>;
}

pub struct RedisCoordinator {
    connection: MultiplexedConnection,
    lock_key: String,
    cursor_key: String,
    renew: Script,
    unlock: Script,
}

impl RedisCoordinator {
    #[instrument(skip(redis_url))]
    pub async fn connect(redis_url: &str, network: Network) -> Result<Self, WorkerError> {
        let client = Client::open(redis_url)?;
        let mut connection = client.get_multiplexed_async_connection().await?;

        let _: String = redis::cmd("PING").query_async(&mut connection).await?;
        info!("Redis connection established successfully");

        Ok(Self {
            connection,
            lock_key: lock_key(network),
            cursor_key: cursor_key(network),
            renew: Script::new(RENEW_SCRIPT),
            unlock: Script::new(UNLOCK_SCRIPT),
        })
    }
}

fn millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl Coordinator for RedisCoordinator {
    async fn try_lock(&self, ttl: Duration) -> Result<Option<LeaseToken>, WorkerError> {
        let token = LeaseToken::generate();
        let mut connection = self.connection.clone();
        let acquired: Option<String> = redis::cmd("SET")
            .arg(&self.lock_key)
            .arg(token.as_str())
            .arg("NX")
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut connection)
            .await?;

        debug!(key = %self.lock_key, acquired = acquired.is_some(), "Cache lease attempt");
        Ok(acquired.map(|_| token))
    }

    async fn renew_lock(&self, token: &LeaseToken, ttl: Duration) -> Result<bool, WorkerError> {
        let mut connection = self.connection.clone();
        let renewed: i64 = self
            .renew
            .key(&self.lock_key)
            .arg(token.as_str())
            .arg(millis(ttl))
            .invoke_async(&mut connection)
            .await?;
        Ok(renewed == 1)
    }

    async fn unlock(&self, token: &LeaseToken) -> Result<(), WorkerError> {
        let mut connection = self.connection.clone();
        let deleted: i64 = self
            .unlock
            .key(&self.lock_key)
            .arg(token.as_str())
            .invoke_async(&mut connection)
            .await?;
        debug!(key = %self.lock_key, released = deleted == 1, "Cache lease released");
        Ok(())
    }

    async fn last_cached_block(&self) -> Result<u64, WorkerError> {
        let mut connection = self.connection.clone();
        let block: Option<u64> = connection.get(&self.cursor_key).await?;
        Ok(block.unwrap_or_default())
    }

    async fn set_last_cached_block(&self, block: u64) -> Result<(), WorkerError> {
        let mut connection = self.connection.clone();
        connection.set::<_, _, ()>(&self.cursor_key, block).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_scoped_by_network() {
        assert_eq!(lock_key(Network::Rinkeby), "alchemy-caching-rinkeby");
        assert_eq!(cursor_key(Network::Main), "alchemy-last-block-main");
    }

    #[test]
    fn generated_tokens_differ() {
        let first = LeaseToken::generate();
        std::thread::sleep(Duration::from_millis(1));
        assert_ne!(first, LeaseToken::generate());
    }

    #[test]
    fn ttl_is_at_least_one_millisecond() {
        assert_eq!(millis(Duration::ZERO), 1);
        assert_eq!(millis(Duration::from_secs(300)), 300_000);
    }
}
