pub mod middleware;
pub mod policy;
pub mod recorder;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use middleware::{usage_gate_middleware, UsageGate, UsageGateDecision};
pub use policy::has_exceeded;
pub use recorder::UsageRecorder;
pub use store::UsageStore;

/// Per-user usage counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub user_id: String,
    pub build_minutes: u64,
    pub ai_calls: u64,
    /// Written once when the record is created. Nothing resets the counters yet.
    pub last_reset: DateTime<Utc>,
}

impl UsageRecord {
    pub fn zeroed(user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            build_minutes: 0,
            ai_calls: 0,
            last_reset: now,
        }
    }
}

/// Free-tier thresholds, shared by every request in the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FreeTierLimits {
    #[serde(default = "default_build_minutes_limit")]
    pub build_minutes: u64,
    #[serde(default = "default_ai_calls_limit")]
    pub ai_calls: u64,
}

fn default_build_minutes_limit() -> u64 {
    100
}

fn default_ai_calls_limit() -> u64 {
    50
}

impl Default for FreeTierLimits {
    fn default() -> Self {
        Self {
            build_minutes: default_build_minutes_limit(),
            ai_calls: default_ai_calls_limit(),
        }
    }
}

/// A gated action whose usage is recorded after it succeeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageAction {
    Build,
    AiCall,
}

/// A counter stored on a [`UsageRecord`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageCounter {
    BuildMinutes,
    AiCalls,
}

impl UsageCounter {
    pub fn field_name(&self) -> &'static str {
        match self {
            UsageCounter::BuildMinutes => "build_minutes",
            UsageCounter::AiCalls => "ai_calls",
        }
    }
}
