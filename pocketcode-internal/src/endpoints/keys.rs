use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::AuthenticatedUser;
use crate::error::{Error, ErrorDetails};
use crate::gateway_util::{AppState, StructuredJson};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreKeyParams {
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Stores the caller's own AI provider key. The key is never logged or echoed back.
pub async fn store_provider_key_handler(
    State(app_state): AppState,
    user: AuthenticatedUser,
    StructuredJson(params): StructuredJson<StoreKeyParams>,
) -> Result<(StatusCode, Json<Value>), Error> {
    let api_key = params
        .api_key
        .filter(|key| !key.trim().is_empty())
        .map(SecretString::from)
        .ok_or_else(|| {
            Error::new(ErrorDetails::InvalidRequest {
                message: "API key is required".to_string(),
            })
        })?;

    app_state
        .store
        .put_provider_key(&user.user_id, &api_key)
        .await?;
    tracing::info!("Stored provider API key for user {}", user.user_id);

    Ok((StatusCode::CREATED, Json(json!({ "status": "stored" }))))
}
