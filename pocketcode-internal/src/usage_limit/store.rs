use chrono::Utc;

use crate::error::{Error, ErrorDetails};
use crate::store::StoreConnectionInfo;
use crate::usage_limit::{UsageCounter, UsageRecord};

/// Persistent per-user usage counters
#[derive(Clone, Debug)]
pub struct UsageStore {
    store: StoreConnectionInfo,
}

impl UsageStore {
    pub fn new(store: StoreConnectionInfo) -> Self {
        Self { store }
    }

    /// Fetch the user's usage record, creating a zeroed one on first access
    pub async fn get(&self, user_id: &str) -> Result<UsageRecord, Error> {
        self.store.get_or_create_usage(user_id, Utc::now()).await
    }

    pub async fn increment_build_minutes(&self, user_id: &str, minutes: u64) -> Result<(), Error> {
        if minutes == 0 {
            return Err(Error::new(ErrorDetails::InvalidRequest {
                message: "Build minutes increment must be positive".to_string(),
            }));
        }
        self.store
            .increment_usage(user_id, UsageCounter::BuildMinutes, minutes, Utc::now())
            .await
    }

    pub async fn increment_ai_calls(&self, user_id: &str) -> Result<(), Error> {
        self.store
            .increment_usage(user_id, UsageCounter::AiCalls, 1, Utc::now())
            .await
    }
}
