use crate::usage_limit::{FreeTierLimits, UsageRecord};

/// A user has exceeded the free tier once either counter reaches its limit
pub fn has_exceeded(usage: &UsageRecord, limits: &FreeTierLimits) -> bool {
    usage.build_minutes >= limits.build_minutes || usage.ai_calls >= limits.ai_calls
}
