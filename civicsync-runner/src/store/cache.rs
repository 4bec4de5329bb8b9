//! Key/value cache with per-key TTL.

use super::StoreError;
use redis::Commands;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub trait KvCache: Send + Sync {
    /// Stored text for `key`, or `None` if absent or expired.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Overwrite `key`, expiring after `ttl`.
    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;
}

/// In-process cache for single-node deployments and tests.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, (String, Instant)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KvCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some((value, expires)) if Instant::now() < *expires => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.lock()
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }
}

/// Redis-backed cache. Opens a short-lived connection per call so an
/// unreachable server surfaces as an error on that call only.
pub struct RedisCache {
    client: redis::Client,
    connect_timeout: Duration,
    prefix: Option<String>,
}

impl RedisCache {
    #[tracing::instrument(level = "debug", skip(url))]
    pub fn new(url: &str, connect_timeout: Duration, prefix: Option<String>) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            connect_timeout,
            prefix,
        })
    }

    fn key(&self, key: &str) -> String {
        match &self.prefix {
            Some(p) => format!("{p}:{key}"),
            None => key.to_string(),
        }
    }

    fn connection(&self) -> Result<redis::Connection, StoreError> {
        Ok(self.client.get_connection_with_timeout(self.connect_timeout)?)
    }
}

impl KvCache for RedisCache {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection()?;
        let value: Option<String> = conn.get(self.key(key))?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        let _: () = conn.set_ex(self.key(key), value, ttl.as_secs().max(1))?;
        Ok(())
    }
}
