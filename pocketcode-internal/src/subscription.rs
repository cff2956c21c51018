//! Subscription lookup.
//!
//! Subscription records are written by the billing integration; this crate only reads them.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::store::StoreConnectionInfo;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    #[default]
    Free,
    Pro,
}

/// Account standing of a subscription record.
///
/// `Active` here does not mean "paying": a free account in good standing is also `Active`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionState {
    #[default]
    Active,
    Inactive,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub plan: Plan,
    pub status: SubscriptionState,
}

impl SubscriptionRecord {
    pub fn new(plan: Plan, status: SubscriptionState) -> Self {
        Self { plan, status }
    }

    pub fn is_active(&self) -> bool {
        self.plan == Plan::Pro && self.status == SubscriptionState::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatus {
    pub plan: Plan,
    pub status: SubscriptionState,
    /// The only field the usage gate looks at
    pub is_active: bool,
}

impl From<SubscriptionRecord> for SubscriptionStatus {
    fn from(record: SubscriptionRecord) -> Self {
        Self {
            plan: record.plan,
            status: record.status,
            is_active: record.is_active(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SubscriptionLookup {
    store: StoreConnectionInfo,
}

impl SubscriptionLookup {
    pub fn new(store: StoreConnectionInfo) -> Self {
        Self { store }
    }

    /// Resolve a user's plan. Users without a record are on the free plan.
    pub async fn get_status(&self, user_id: &str) -> Result<SubscriptionStatus, Error> {
        let record = self
            .store
            .get_subscription(user_id)
            .await?
            .unwrap_or_default();
        Ok(record.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use std::sync::Arc;

    #[test]
    fn test_is_active_requires_pro_and_active() {
        assert!(SubscriptionRecord::new(Plan::Pro, SubscriptionState::Active).is_active());
        assert!(!SubscriptionRecord::new(Plan::Pro, SubscriptionState::Inactive).is_active());
        assert!(!SubscriptionRecord::new(Plan::Pro, SubscriptionState::Cancelled).is_active());
        assert!(!SubscriptionRecord::new(Plan::Free, SubscriptionState::Active).is_active());
    }

    #[test]
    fn test_record_deserialization() {
        let record: SubscriptionRecord =
            serde_json::from_str(r#"{"plan": "pro", "status": "cancelled"}"#).unwrap();
        assert_eq!(record.plan, Plan::Pro);
        assert_eq!(record.status, SubscriptionState::Cancelled);

        let err = serde_json::from_str::<SubscriptionRecord>(r#"{"plan": "enterprise"}"#);
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_missing_record_defaults_to_free() {
        let store = StoreConnectionInfo::Memory(Arc::new(InMemoryStore::new()));
        let lookup = SubscriptionLookup::new(store);
        let status = lookup.get_status("nobody").await.unwrap();
        assert_eq!(status.plan, Plan::Free);
        assert_eq!(status.status, SubscriptionState::Active);
        assert!(!status.is_active);
    }

    #[tokio::test]
    async fn test_pro_record_is_active() {
        let memory = Arc::new(InMemoryStore::new());
        memory.set_subscription(
            "user-1",
            SubscriptionRecord::new(Plan::Pro, SubscriptionState::Active),
        );
        let lookup = SubscriptionLookup::new(StoreConnectionInfo::Memory(memory));
        let status = lookup.get_status("user-1").await.unwrap();
        assert!(status.is_active);
    }

    #[tokio::test]
    async fn test_lookup_propagates_store_failure() {
        let memory = Arc::new(InMemoryStore::new());
        memory.set_healthy(false);
        let lookup = SubscriptionLookup::new(StoreConnectionInfo::Memory(memory));
        assert!(lookup.get_status("user-1").await.is_err());
    }
}
