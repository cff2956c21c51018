use axum::extract::State;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{Error, ErrorDetails};
use crate::gateway_util::{AppState, StructuredJson};
use crate::usage_limit::UsageAction;

#[derive(Debug, Deserialize)]
pub struct GenerateParams {
    #[serde(default)]
    pub prompt: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub id: Uuid,
    pub prompt: String,
    pub output: String,
    pub provider_key_configured: bool,
}

fn require_prompt(params: GenerateParams) -> Result<String, Error> {
    match params.prompt {
        Some(prompt) if !prompt.trim().is_empty() => Ok(prompt),
        _ => Err(Error::new(ErrorDetails::InvalidRequest {
            message: "Prompt is required".to_string(),
        })),
    }
}

/// Runs an AI generation for the caller and charges one AI call once it succeeds.
///
/// Generation itself is a placeholder; the response echoes the prompt.
pub async fn generate_handler(
    State(app_state): AppState,
    user: AuthenticatedUser,
    StructuredJson(params): StructuredJson<GenerateParams>,
) -> Result<Json<GenerateResponse>, Error> {
    let prompt = require_prompt(params)?;
    let provider_key_configured = app_state.store.has_provider_key(&user.user_id).await?;

    let response = GenerateResponse {
        id: Uuid::now_v7(),
        output: format!("Generated code for: {}", prompt.trim()),
        prompt,
        provider_key_configured,
    };

    app_state
        .usage_recorder
        .record(&user.user_id, UsageAction::AiCall)
        .await?;

    tracing::debug!("Completed generation {} for user {}", response.id, user.user_id);
    Ok(Json(response))
}
