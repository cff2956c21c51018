use axum::extract::State;
use axum::response::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::AuthenticatedUser;
use crate::error::Error;
use crate::gateway_util::AppState;
use crate::subscription::SubscriptionStatus;
use crate::usage_limit::has_exceeded;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageResponse {
    pub user_id: String,
    pub build_minutes: u64,
    pub ai_calls: u64,
    pub last_reset: DateTime<Utc>,
    pub build_minutes_limit: u64,
    pub ai_calls_limit: u64,
    /// Whether the free-tier policy alone would reject the next gated request
    pub limits_exceeded: bool,
    pub subscription: SubscriptionStatus,
}

/// Reports the caller's usage counters alongside their subscription and the free-tier limits.
///
/// Reading usage creates the record if it does not exist yet.
pub async fn usage_handler(
    State(app_state): AppState,
    user: AuthenticatedUser,
) -> Result<Json<UsageResponse>, Error> {
    let subscription = app_state.subscriptions.get_status(&user.user_id).await?;
    let usage = app_state.usage_store.get(&user.user_id).await?;
    let limits = app_state.usage_gate.limits();

    Ok(Json(UsageResponse {
        limits_exceeded: has_exceeded(&usage, limits),
        user_id: usage.user_id,
        build_minutes: usage.build_minutes,
        ai_calls: usage.ai_calls,
        last_reset: usage.last_reset,
        build_minutes_limit: limits.build_minutes,
        ai_calls_limit: limits.ai_calls,
        subscription,
    }))
}
