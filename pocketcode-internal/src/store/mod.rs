use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::SecretString;

use crate::error::Error;
use crate::subscription::SubscriptionRecord;
use crate::usage_limit::{UsageCounter, UsageRecord};

mod memory;
mod redis_store;

pub use memory::InMemoryStore;
pub use redis_store::RedisStore;

/// Client for the document store holding usage counters, subscription records
/// and provider API keys, keyed by user id.
///
/// Constructed once at startup and cloned into every collaborator.
#[derive(Clone, Debug)]
pub enum StoreConnectionInfo {
    Memory(Arc<InMemoryStore>),
    Redis(RedisStore),
}

impl StoreConnectionInfo {
    pub fn new_memory() -> Self {
        Self::Memory(Arc::new(InMemoryStore::new()))
    }

    pub async fn new_redis(url: &str, timeout: Duration) -> Result<Self, Error> {
        Ok(Self::Redis(RedisStore::new(url, timeout).await?))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StoreConnectionInfo::Memory(_) => "memory",
            StoreConnectionInfo::Redis(_) => "redis",
        }
    }

    /// Fetch the usage record for `user_id`, creating a zeroed one stamped with `now` if absent.
    pub async fn get_or_create_usage(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<UsageRecord, Error> {
        match self {
            StoreConnectionInfo::Memory(store) => store.get_or_create_usage(user_id, now),
            StoreConnectionInfo::Redis(store) => store.get_or_create_usage(user_id, now).await,
        }
    }

    /// Add `amount` to one counter. The counter update itself is atomic; a missing record is created.
    pub async fn increment_usage(
        &self,
        user_id: &str,
        counter: UsageCounter,
        amount: u64,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        match self {
            StoreConnectionInfo::Memory(store) => {
                store.increment_usage(user_id, counter, amount, now)
            }
            StoreConnectionInfo::Redis(store) => {
                store.increment_usage(user_id, counter, amount, now).await
            }
        }
    }

    pub async fn get_subscription(
        &self,
        user_id: &str,
    ) -> Result<Option<SubscriptionRecord>, Error> {
        match self {
            StoreConnectionInfo::Memory(store) => store.get_subscription(user_id),
            StoreConnectionInfo::Redis(store) => store.get_subscription(user_id).await,
        }
    }

    pub async fn put_provider_key(&self, user_id: &str, api_key: &SecretString) -> Result<(), Error> {
        match self {
            StoreConnectionInfo::Memory(store) => store.put_provider_key(user_id, api_key),
            StoreConnectionInfo::Redis(store) => store.put_provider_key(user_id, api_key).await,
        }
    }

    pub async fn has_provider_key(&self, user_id: &str) -> Result<bool, Error> {
        match self {
            StoreConnectionInfo::Memory(store) => store.has_provider_key(user_id),
            StoreConnectionInfo::Redis(store) => store.has_provider_key(user_id).await,
        }
    }

    pub async fn health(&self) -> Result<(), Error> {
        match self {
            StoreConnectionInfo::Memory(store) => store.health(),
            StoreConnectionInfo::Redis(store) => store.health().await,
        }
    }
}
