use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{Error, ErrorDetails};
use crate::gateway_util::AppState;
use crate::usage_limit::UsageAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Queued,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildAccepted {
    pub build_id: Uuid,
    pub project_id: String,
    pub status: BuildStatus,
}

/// Accepts a build for a project and charges the flat build fee.
///
/// Builds are only queued here; the build runner picks them up separately.
pub async fn start_build_handler(
    State(app_state): AppState,
    user: AuthenticatedUser,
    Path(project_id): Path<String>,
) -> Result<(StatusCode, Json<BuildAccepted>), Error> {
    if project_id.trim().is_empty() {
        return Err(Error::new(ErrorDetails::InvalidRequest {
            message: "Project id is required".to_string(),
        }));
    }
    let build = BuildAccepted {
        build_id: Uuid::now_v7(),
        project_id,
        status: BuildStatus::Queued,
    };
    tracing::info!(
        "Queued build {} for project {} (user {})",
        build.build_id,
        build.project_id,
        user.user_id
    );

    app_state
        .usage_recorder
        .record(&user.user_id, UsageAction::Build)
        .await?;

    Ok((StatusCode::ACCEPTED, Json(build)))
}
