use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use secrecy::SecretString;

use crate::error::{Error, ErrorDetails};
use crate::subscription::SubscriptionRecord;
use crate::usage_limit::{UsageCounter, UsageRecord};

/// In-process document store for local development and tests.
///
/// Each map entry is locked for the duration of a single operation, so individual
/// increments are atomic. Nothing here is persisted across restarts.
#[derive(Debug)]
pub struct InMemoryStore {
    usage: DashMap<String, UsageRecord>,
    subscriptions: DashMap<String, SubscriptionRecord>,
    provider_keys: DashMap<String, SecretString>,
    healthy: AtomicBool,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            usage: DashMap::new(),
            subscriptions: DashMap::new(),
            provider_keys: DashMap::new(),
            healthy: AtomicBool::new(true),
        }
    }

    /// Simulate an unavailable backing store. Every operation fails while unhealthy.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }

    /// Stands in for the billing integration, which owns subscription writes.
    pub fn set_subscription(&self, user_id: &str, record: SubscriptionRecord) {
        self.subscriptions.insert(user_id.to_string(), record);
    }

    pub fn set_usage(&self, record: UsageRecord) {
        self.usage.insert(record.user_id.clone(), record);
    }

    fn check_health(&self) -> Result<(), Error> {
        if self.healthy.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(Error::new(ErrorDetails::Store {
                message: "In-memory store is unavailable".to_string(),
            }))
        }
    }

    pub(super) fn get_or_create_usage(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<UsageRecord, Error> {
        self.check_health()?;
        let record = self
            .usage
            .entry(user_id.to_string())
            .or_insert_with(|| UsageRecord::zeroed(user_id, now));
        Ok(record.value().clone())
    }

    pub(super) fn increment_usage(
        &self,
        user_id: &str,
        counter: UsageCounter,
        amount: u64,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.check_health()?;
        let mut record = self
            .usage
            .entry(user_id.to_string())
            .or_insert_with(|| UsageRecord::zeroed(user_id, now));
        match counter {
            UsageCounter::BuildMinutes => {
                record.build_minutes = record.build_minutes.saturating_add(amount)
            }
            UsageCounter::AiCalls => record.ai_calls = record.ai_calls.saturating_add(amount),
        }
        Ok(())
    }

    pub(super) fn get_subscription(
        &self,
        user_id: &str,
    ) -> Result<Option<SubscriptionRecord>, Error> {
        self.check_health()?;
        Ok(self.subscriptions.get(user_id).map(|entry| *entry.value()))
    }

    pub(super) fn put_provider_key(&self, user_id: &str, api_key: &SecretString) -> Result<(), Error> {
        self.check_health()?;
        self.provider_keys
            .insert(user_id.to_string(), api_key.clone());
        Ok(())
    }

    pub(super) fn has_provider_key(&self, user_id: &str) -> Result<bool, Error> {
        self.check_health()?;
        Ok(self.provider_keys.contains_key(user_id))
    }

    pub(super) fn health(&self) -> Result<(), Error> {
        self.check_health()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::{Plan, SubscriptionState};

    #[test]
    fn test_get_or_create_is_idempotent() {
        let store = InMemoryStore::new();
        let first_seen = Utc::now();
        let created = store.get_or_create_usage("user-1", first_seen).unwrap();
        assert_eq!(created.build_minutes, 0);
        assert_eq!(created.ai_calls, 0);

        // A later read must not restamp the record
        let later = first_seen + chrono::Duration::hours(1);
        let fetched = store.get_or_create_usage("user-1", later).unwrap();
        assert_eq!(fetched.last_reset, first_seen);
    }

    #[test]
    fn test_increment_creates_missing_record() {
        let store = InMemoryStore::new();
        store
            .increment_usage("user-1", UsageCounter::AiCalls, 1, Utc::now())
            .unwrap();
        let record = store.get_or_create_usage("user-1", Utc::now()).unwrap();
        assert_eq!(record.ai_calls, 1);
        assert_eq!(record.build_minutes, 0);
    }

    #[test]
    fn test_unhealthy_store_fails_every_operation() {
        let store = InMemoryStore::new();
        store.set_subscription(
            "user-1",
            SubscriptionRecord::new(Plan::Pro, SubscriptionState::Active),
        );
        store.set_healthy(false);
        assert!(store.get_or_create_usage("user-1", Utc::now()).is_err());
        assert!(store
            .increment_usage("user-1", UsageCounter::BuildMinutes, 2, Utc::now())
            .is_err());
        assert!(store.get_subscription("user-1").is_err());
        assert!(store.health().is_err());

        store.set_healthy(true);
        assert!(store.get_subscription("user-1").unwrap().is_some());
    }

    #[test]
    fn test_provider_keys() {
        let store = InMemoryStore::new();
        assert!(!store.has_provider_key("user-1").unwrap());
        store
            .put_provider_key("user-1", &SecretString::from("sk-test".to_string()))
            .unwrap();
        assert!(store.has_provider_key("user-1").unwrap());
        assert!(!store.has_provider_key("user-2").unwrap());
    }
}
