use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisResult};
use secrecy::{ExposeSecret, SecretString};
use tokio::time::timeout;

use crate::error::{DisplayOrDebugGateway, Error, ErrorDetails};
use crate::subscription::SubscriptionRecord;
use crate::usage_limit::{UsageCounter, UsageRecord};

const USAGE_KEY_PREFIX: &str = "usage:";
const SUBSCRIPTION_KEY_PREFIX: &str = "subscription:";
const PROVIDER_KEY_KEY_PREFIX: &str = "provider_key:";

const LAST_RESET_FIELD: &str = "last_reset";

fn usage_key(user_id: &str) -> String {
    format!("{USAGE_KEY_PREFIX}{user_id}")
}

fn subscription_key(user_id: &str) -> String {
    format!("{SUBSCRIPTION_KEY_PREFIX}{user_id}")
}

fn provider_key_key(user_id: &str) -> String {
    format!("{PROVIDER_KEY_KEY_PREFIX}{user_id}")
}

/// Redis-backed document store.
///
/// Usage records live in a hash per user so that counters can be bumped with `HINCRBY`.
/// Subscription records are JSON strings maintained by the billing integration.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    timeout: Duration,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    pub async fn new(url: &str, timeout: Duration) -> Result<Self, Error> {
        let client = redis::Client::open(url).map_err(|e| {
            Error::new(ErrorDetails::Config {
                message: format!("Failed to create Redis client: {e}"),
            })
        })?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                Error::new(ErrorDetails::Store {
                    message: format!("Failed to get Redis connection: {e}"),
                })
            })?;
        tracing::info!("Connected to Redis document store");
        Ok(Self { conn, timeout })
    }

    /// Run a single Redis round trip, bounded by the configured timeout
    async fn run<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = RedisResult<T>>,
    ) -> Result<T, Error> {
        match timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(Error::new(ErrorDetails::Store {
                message: format!(
                    "Redis error during {operation}: {}",
                    DisplayOrDebugGateway::new(e)
                ),
            })),
            Err(_) => Err(Error::new(ErrorDetails::Store {
                message: format!("Redis timeout during {operation}"),
            })),
        }
    }

    /// Queue `HSETNX` for every field so that a partially-written hash is completed
    /// without touching existing values.
    fn ensure_usage_fields(pipe: &mut redis::Pipeline, key: &str, now: DateTime<Utc>) {
        pipe.hset_nx(key, UsageCounter::BuildMinutes.field_name(), 0)
            .ignore()
            .hset_nx(key, UsageCounter::AiCalls.field_name(), 0)
            .ignore()
            .hset_nx(key, LAST_RESET_FIELD, now.to_rfc3339())
            .ignore();
    }

    pub(super) async fn get_or_create_usage(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<UsageRecord, Error> {
        let key = usage_key(user_id);
        let mut pipe = redis::pipe();
        pipe.atomic();
        Self::ensure_usage_fields(&mut pipe, &key, now);
        pipe.hgetall(&key);

        let mut conn = self.conn.clone();
        let (fields,): (HashMap<String, String>,) = self
            .run("usage lookup", pipe.query_async(&mut conn))
            .await?;
        parse_usage_record(user_id, &fields)
    }

    pub(super) async fn increment_usage(
        &self,
        user_id: &str,
        counter: UsageCounter,
        amount: u64,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        let key = usage_key(user_id);
        let mut pipe = redis::pipe();
        pipe.atomic();
        Self::ensure_usage_fields(&mut pipe, &key, now);
        pipe.hincr(&key, counter.field_name(), amount).ignore();

        let mut conn = self.conn.clone();
        self.run("usage increment", pipe.query_async::<()>(&mut conn))
            .await
    }

    pub(super) async fn get_subscription(
        &self,
        user_id: &str,
    ) -> Result<Option<SubscriptionRecord>, Error> {
        let mut conn = self.conn.clone();
        let key = subscription_key(user_id);
        let data: Option<String> = self
            .run("subscription lookup", conn.get(&key))
            .await?;
        data.map(|data| {
            serde_json::from_str::<SubscriptionRecord>(&data).map_err(|e| {
                Error::new(ErrorDetails::Store {
                    message: format!("Malformed subscription record for user {user_id}: {e}"),
                })
            })
        })
        .transpose()
    }

    pub(super) async fn put_provider_key(
        &self,
        user_id: &str,
        api_key: &SecretString,
    ) -> Result<(), Error> {
        let mut conn = self.conn.clone();
        let key = provider_key_key(user_id);
        self.run(
            "provider key write",
            conn.set::<_, _, ()>(&key, api_key.expose_secret()),
        )
        .await
    }

    pub(super) async fn has_provider_key(&self, user_id: &str) -> Result<bool, Error> {
        let mut conn = self.conn.clone();
        let key = provider_key_key(user_id);
        self.run("provider key lookup", conn.exists(&key)).await
    }

    pub(super) async fn health(&self) -> Result<(), Error> {
        let mut conn = self.conn.clone();
        let _: String = self
            .run("ping", redis::cmd("PING").query_async(&mut conn))
            .await?;
        Ok(())
    }
}

fn parse_counter(
    user_id: &str,
    fields: &HashMap<String, String>,
    counter: UsageCounter,
) -> Result<u64, Error> {
    let name = counter.field_name();
    fields
        .get(name)
        .ok_or_else(|| {
            Error::new(ErrorDetails::Store {
                message: format!("Usage record for user {user_id} is missing `{name}`"),
            })
        })?
        .parse::<u64>()
        .map_err(|e| {
            Error::new(ErrorDetails::Store {
                message: format!("Usage record for user {user_id} has invalid `{name}`: {e}"),
            })
        })
}

fn parse_usage_record(
    user_id: &str,
    fields: &HashMap<String, String>,
) -> Result<UsageRecord, Error> {
    let last_reset = fields
        .get(LAST_RESET_FIELD)
        .ok_or_else(|| {
            Error::new(ErrorDetails::Store {
                message: format!("Usage record for user {user_id} is missing `{LAST_RESET_FIELD}`"),
            })
        })
        .and_then(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    Error::new(ErrorDetails::Store {
                        message: format!(
                            "Usage record for user {user_id} has invalid `{LAST_RESET_FIELD}`: {e}"
                        ),
                    })
                })
        })?;

    Ok(UsageRecord {
        user_id: user_id.to_string(),
        build_minutes: parse_counter(user_id, fields, UsageCounter::BuildMinutes)?,
        ai_calls: parse_counter(user_id, fields, UsageCounter::AiCalls)?,
        last_reset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_keys() {
        assert_eq!(usage_key("user-1"), "usage:user-1");
        assert_eq!(subscription_key("user-1"), "subscription:user-1");
        assert_eq!(provider_key_key("user-1"), "provider_key:user-1");
    }

    #[test]
    fn test_parse_usage_record() {
        let record = parse_usage_record(
            "user-1",
            &fields(&[
                ("build_minutes", "42"),
                ("ai_calls", "7"),
                ("last_reset", "2025-01-01T00:00:00+00:00"),
            ]),
        )
        .unwrap();
        assert_eq!(record.user_id, "user-1");
        assert_eq!(record.build_minutes, 42);
        assert_eq!(record.ai_calls, 7);
        assert_eq!(record.last_reset.to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_parse_usage_record_rejects_bad_fields() {
        let missing = parse_usage_record(
            "user-1",
            &fields(&[("build_minutes", "1"), ("last_reset", "2025-01-01T00:00:00Z")]),
        );
        assert!(missing.is_err());

        let negative = parse_usage_record(
            "user-1",
            &fields(&[
                ("build_minutes", "-1"),
                ("ai_calls", "0"),
                ("last_reset", "2025-01-01T00:00:00Z"),
            ]),
        );
        assert!(negative.is_err());

        let bad_timestamp = parse_usage_record(
            "user-1",
            &fields(&[
                ("build_minutes", "1"),
                ("ai_calls", "0"),
                ("last_reset", "yesterday"),
            ]),
        );
        assert!(bad_timestamp.is_err());
    }
}
