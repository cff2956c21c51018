use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{rejection::JsonRejection, FromRequest, Json, Request};
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use serde::de::DeserializeOwned;
use tokio::sync::oneshot::Sender;
use tracing::instrument;

use crate::auth::{resolve_identity, Auth};
use crate::config_parser::Config;
use crate::endpoints;
use crate::error::{Error, ErrorDetails};
use crate::store::StoreConnectionInfo;
use crate::subscription::SubscriptionLookup;
use crate::usage_limit::{usage_gate_middleware, UsageGate, UsageRecorder, UsageStore};

pub const REDIS_URL_ENV_VAR: &str = "POCKETCODE_REDIS_URL";

/// Represents the authentication state of the gateway
#[derive(Clone, Debug)]
pub enum AuthenticationInfo {
    Enabled(Auth),
    Disabled { mock_user_id: Option<String> },
}

/// State for the API
#[derive(Clone, Debug)]
pub struct AppStateData {
    pub config: Arc<Config>,
    pub store: StoreConnectionInfo,
    pub authentication_info: AuthenticationInfo,
    pub subscriptions: SubscriptionLookup,
    pub usage_store: UsageStore,
    pub usage_gate: Arc<UsageGate>,
    pub usage_recorder: UsageRecorder,
}
pub type AppState = axum::extract::State<AppStateData>;

impl AppStateData {
    pub async fn new(config: Arc<Config>) -> Result<Self, Error> {
        let redis_url = std::env::var(REDIS_URL_ENV_VAR).ok();
        let store = setup_store(&config, redis_url).await?;
        Ok(Self::new_with_store(config, store))
    }

    pub fn new_with_store(config: Arc<Config>, store: StoreConnectionInfo) -> Self {
        let subscriptions = SubscriptionLookup::new(store.clone());
        let usage_store = UsageStore::new(store.clone());
        let usage_gate = Arc::new(UsageGate::new(
            subscriptions.clone(),
            usage_store.clone(),
            config.gateway.free_tier,
        ));
        let usage_recorder = UsageRecorder::new(
            usage_store.clone(),
            config.gateway.usage.build_minutes_per_build,
        );
        Self {
            authentication_info: setup_authentication(&config),
            config,
            store,
            subscriptions,
            usage_store,
            usage_gate,
            usage_recorder,
        }
    }
}

pub fn setup_authentication(config: &Config) -> AuthenticationInfo {
    let authentication = &config.gateway.authentication;
    if !authentication.enabled {
        match &authentication.mock_user_id {
            Some(user_id) => tracing::warn!(
                "Authentication disabled; every request will be attributed to `{user_id}`"
            ),
            None => tracing::warn!(
                "Authentication disabled without `mock_user_id`; user routes will reject every request"
            ),
        }
        return AuthenticationInfo::Disabled {
            mock_user_id: authentication.mock_user_id.clone(),
        };
    }
    if authentication.api_keys.is_empty() {
        tracing::warn!("Authentication enabled but no API keys configured");
    }
    AuthenticationInfo::Enabled(Auth::new(authentication.api_keys.clone()))
}

/// Connect to the document store: Redis when a URL is provided, otherwise an in-process store.
pub async fn setup_store(
    config: &Config,
    redis_url: Option<String>,
) -> Result<StoreConnectionInfo, Error> {
    match redis_url.filter(|url| !url.trim().is_empty()) {
        Some(url) => StoreConnectionInfo::new_redis(&url, config.gateway.store.timeout()).await,
        None => {
            tracing::warn!(
                "Missing environment variable `{REDIS_URL_ENV_VAR}`; usage and subscription data will be kept in memory and lost on restart"
            );
            Ok(StoreConnectionInfo::new_memory())
        }
    }
}

/// Builds every API route with its middleware. `/metrics` is added by the binary.
///
/// Identity is resolved for all `/api/v1` routes; the usage gate only wraps
/// routes that consume free-tier usage.
pub fn build_api_router(app_state: AppStateData) -> Router {
    let gated_routes = Router::new()
        .route(
            "/api/v1/projects/{id}/build",
            post(endpoints::builds::start_build_handler),
        )
        .route(
            "/api/v1/ai/generate",
            post(endpoints::ai::generate_handler),
        )
        .route_layer(middleware::from_fn_with_state(
            app_state.usage_gate.clone(),
            usage_gate_middleware,
        ));

    Router::new()
        .merge(gated_routes)
        .route(
            "/api/v1/user/keys",
            post(endpoints::keys::store_provider_key_handler),
        )
        .route("/api/v1/user/usage", get(endpoints::usage::usage_handler))
        .route_layer(middleware::from_fn_with_state(
            app_state.authentication_info.clone(),
            resolve_identity,
        ))
        .route("/health", get(endpoints::status::health_handler))
        .route("/ready", get(endpoints::status::readiness_handler))
        .route("/status", get(endpoints::status::status_handler))
        .fallback(endpoints::fallback::handle_404)
        .with_state(app_state)
}

/// Custom Axum extractor that validates the JSON body and deserializes it into a custom type
///
/// When this extractor is present, we don't check if the `Content-Type` header is `application/json`,
/// and instead simply assume that the request body is a JSON object.
pub struct StructuredJson<T>(pub T);

impl<S, T> FromRequest<S> for StructuredJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
    T: Send + Sync + DeserializeOwned,
{
    type Rejection = Error;

    #[instrument(skip_all, level = "trace", name = "StructuredJson::from_request")]
    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = bytes::Bytes::from_request(req, state).await.map_err(|e| {
            Error::new(ErrorDetails::JsonRequest {
                message: format!("{} ({})", e, e.status()),
            })
        })?;

        let value = Json::<serde_json::Value>::from_bytes(&bytes)
            .map_err(|e| {
                Error::new(ErrorDetails::JsonRequest {
                    message: format!("{} ({})", e, e.status()),
                })
            })?
            .0;

        // `serde_path_to_error` names the offending field in the message
        let deserialized: T = serde_path_to_error::deserialize(&value).map_err(|e| {
            Error::new(ErrorDetails::JsonRequest {
                message: e.to_string(),
            })
        })?;

        Ok(StructuredJson(deserialized))
    }
}

pub struct ShutdownHandle {
    #[expect(dead_code)]
    sender: Sender<()>,
}

/// Starts the API router on an unused local port.
///
/// Returns the address the gateway is listening on and a `ShutdownHandle`
/// which shuts the gateway down when dropped.
pub async fn start_ephemeral_gateway(
    config: Config,
    store: StoreConnectionInfo,
) -> Result<(SocketAddr, ShutdownHandle), Error> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| {
            Error::new(ErrorDetails::InternalError {
                message: format!("Failed to bind to a port: {e}"),
            })
        })?;
    let bind_addr = listener.local_addr().map_err(|e| {
        Error::new(ErrorDetails::InternalError {
            message: format!("Failed to get local address: {e}"),
        })
    })?;

    let app_state = AppStateData::new_with_store(Arc::new(config), store);
    let router = build_api_router(app_state);

    let (sender, recv) = tokio::sync::oneshot::channel::<()>();
    let shutdown_fut = async move {
        let _ = recv.await;
    };

    tokio::spawn(
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_fut)
            .into_future(),
    );
    Ok((bind_addr, ShutdownHandle { sender }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{hash_api_key, ApiKeyMetadata};
    use crate::testing::get_unit_test_app_state_data;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_setup_authentication() {
        let mut config = Config::default();
        let auth = setup_authentication(&config);
        assert!(matches!(auth, AuthenticationInfo::Enabled(ref a) if a.is_empty()));
        assert!(logs_contain("Authentication enabled but no API keys configured"));

        config.gateway.authentication.api_keys.insert(
            hash_api_key("test-key"),
            ApiKeyMetadata {
                user_id: "user-1".to_string(),
            },
        );
        let AuthenticationInfo::Enabled(auth) = setup_authentication(&config) else {
            panic!("expected authentication to be enabled");
        };
        assert_eq!(auth.validate_api_key("test-key").unwrap().user_id, "user-1");

        config.gateway.authentication.enabled = false;
        config.gateway.authentication.mock_user_id = Some("dev-user".to_string());
        assert!(matches!(
            setup_authentication(&config),
            AuthenticationInfo::Disabled { mock_user_id: Some(ref id) } if id == "dev-user"
        ));
        assert!(logs_contain("every request will be attributed to `dev-user`"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_setup_store_without_redis() {
        let config = Config::default();
        let store = setup_store(&config, None).await.unwrap();
        assert_eq!(store.kind(), "memory");
        assert!(logs_contain("Missing environment variable `POCKETCODE_REDIS_URL`"));

        let store = setup_store(&config, Some("  ".to_string())).await.unwrap();
        assert_eq!(store.kind(), "memory");
    }

    #[tokio::test]
    async fn test_setup_store_invalid_redis_url() {
        let config = Config::default();
        let err = setup_store(&config, Some("not-a-redis-url".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err.get_details(), ErrorDetails::Config { .. }));
    }

    #[test]
    fn test_app_state_uses_configured_limits() {
        let mut config = Config::default();
        config.gateway.free_tier.build_minutes = 10;
        let (_, app_state) = get_unit_test_app_state_data(config);
        assert_eq!(app_state.usage_gate.limits().build_minutes, 10);
        assert_eq!(app_state.store.kind(), "memory");
    }
}
