use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::AuthenticatedUser;
use crate::error::{Error, ErrorDetails};
use crate::subscription::SubscriptionLookup;
use crate::usage_limit::{has_exceeded, FreeTierLimits, UsageStore};

/// Outcome of a usage gate check
#[derive(Debug)]
pub enum UsageGateDecision {
    Pass,
    Reject(Error),
}

impl UsageGateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, UsageGateDecision::Pass)
    }

    fn outcome(&self) -> &'static str {
        match self {
            UsageGateDecision::Pass => "pass",
            UsageGateDecision::Reject(e) => e.code(),
        }
    }
}

/// Decides whether a user may start a gated action.
///
/// Every check reads the subscription and usage records from the store again;
/// nothing is cached between requests. The check and the later usage increment
/// are separate store round trips, so concurrent requests from the same user can
/// all pass before any of them is recorded.
#[derive(Clone, Debug)]
pub struct UsageGate {
    subscriptions: SubscriptionLookup,
    usage: UsageStore,
    limits: FreeTierLimits,
}

impl UsageGate {
    pub fn new(subscriptions: SubscriptionLookup, usage: UsageStore, limits: FreeTierLimits) -> Self {
        Self {
            subscriptions,
            usage,
            limits,
        }
    }

    pub fn limits(&self) -> &FreeTierLimits {
        &self.limits
    }

    pub async fn check(&self, user_id: Option<&str>) -> UsageGateDecision {
        let Some(user_id) = user_id else {
            return UsageGateDecision::Reject(Error::new(ErrorDetails::Unauthenticated));
        };

        let subscription = match self.subscriptions.get_status(user_id).await {
            Ok(subscription) => subscription,
            Err(e) => return UsageGateDecision::Reject(e),
        };

        // Paid users are never limited here
        if subscription.is_active {
            debug!("Usage gate passed for active subscriber {user_id}");
            return UsageGateDecision::Pass;
        }

        let usage = match self.usage.get(user_id).await {
            Ok(usage) => usage,
            Err(e) => return UsageGateDecision::Reject(e),
        };

        if has_exceeded(&usage, &self.limits) {
            warn!(
                "Free tier limits exceeded for user {user_id}: build_minutes={}/{}, ai_calls={}/{}",
                usage.build_minutes,
                self.limits.build_minutes,
                usage.ai_calls,
                self.limits.ai_calls
            );
            return UsageGateDecision::Reject(Error::new_without_logging(
                ErrorDetails::LimitsExceeded {
                    user_id: user_id.to_string(),
                    build_minutes: usage.build_minutes,
                    ai_calls: usage.ai_calls,
                },
            ));
        }

        debug!(
            "Usage gate passed for user {user_id}: build_minutes={}, ai_calls={}",
            usage.build_minutes, usage.ai_calls
        );
        UsageGateDecision::Pass
    }
}

/// Middleware guarding routes that consume free-tier usage.
///
/// Must run after the identity layer so that `AuthenticatedUser` is in the request extensions.
pub async fn usage_gate_middleware(
    State(gate): State<Arc<UsageGate>>,
    request: Request,
    next: Next,
) -> Result<Response, Error> {
    let user_id = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|user| user.user_id.clone());

    let decision = gate.check(user_id.as_deref()).await;
    metrics::counter!(
        "pocketcode_usage_gate_decisions_total",
        "outcome" => decision.outcome()
    )
    .increment(1);

    match decision {
        UsageGateDecision::Pass => Ok(next.run(request).await),
        UsageGateDecision::Reject(e) => Err(e),
    }
}
