use crate::error::Error;
use crate::usage_limit::{UsageAction, UsageStore};

/// Records usage for an action that has already succeeded.
///
/// The build charge is a flat amount per build, not measured build time.
#[derive(Clone, Debug)]
pub struct UsageRecorder {
    usage: UsageStore,
    build_minutes_per_build: u64,
}

impl UsageRecorder {
    pub fn new(usage: UsageStore, build_minutes_per_build: u64) -> Self {
        Self {
            usage,
            build_minutes_per_build,
        }
    }

    pub async fn record(&self, user_id: &str, action: UsageAction) -> Result<(), Error> {
        match action {
            UsageAction::Build => {
                self.usage
                    .increment_build_minutes(user_id, self.build_minutes_per_build)
                    .await?
            }
            UsageAction::AiCall => self.usage.increment_ai_calls(user_id).await?,
        }
        tracing::debug!(user_id, ?action, "Recorded usage");
        metrics::counter!(
            "pocketcode_usage_recorded_total",
            "action" => action.as_str()
        )
        .increment(1);
        Ok(())
    }
}

impl UsageAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageAction::Build => "build",
            UsageAction::AiCall => "ai_call",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, StoreConnectionInfo};
    use std::sync::Arc;

    fn recorder(build_minutes_per_build: u64) -> (UsageStore, UsageRecorder) {
        let store = StoreConnectionInfo::Memory(Arc::new(InMemoryStore::new()));
        let usage = UsageStore::new(store);
        (
            usage.clone(),
            UsageRecorder::new(usage, build_minutes_per_build),
        )
    }

    #[tokio::test]
    async fn test_build_charges_flat_minutes() {
        let (usage, recorder) = recorder(2);
        recorder.record("user-1", UsageAction::Build).await.unwrap();
        let record = usage.get("user-1").await.unwrap();
        assert_eq!(record.build_minutes, 2);
        assert_eq!(record.ai_calls, 0);
    }

    #[tokio::test]
    async fn test_build_charge_is_configurable() {
        let (usage, recorder) = recorder(5);
        recorder.record("user-1", UsageAction::Build).await.unwrap();
        recorder.record("user-1", UsageAction::Build).await.unwrap();
        assert_eq!(usage.get("user-1").await.unwrap().build_minutes, 10);
    }

    #[tokio::test]
    async fn test_ai_call_charges_one_call() {
        let (usage, recorder) = recorder(2);
        recorder.record("user-1", UsageAction::AiCall).await.unwrap();
        let record = usage.get("user-1").await.unwrap();
        assert_eq!(record.ai_calls, 1);
        assert_eq!(record.build_minutes, 0);
    }
}
