use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use crate::core::error::Error;
use crate::core::state::AppState;
use crate::types::request::UserSettings;
use crate::types::response::UserResponse;
use crate::types::user::{Principal, Role};

pub(crate) async fn get(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<UserResponse>, Error> {
    let principal = principal.require(Role::User)?;

    let user = state
        .user_controller
        .get(principal.local_user_id())
        .await?;

    Ok(Json(user.into()))
}

pub(crate) async fn patch(
    State(state): State<AppState>,
    principal: Principal,
    Json(settings): Json<UserSettings>,
) -> Result<Json<UserResponse>, Error> {
    let principal = principal.require(Role::User)?;

    let user = state
        .user_controller
        .update_settings(principal.local_user_id(), settings)
        .await?;

    Ok(Json(user.into()))
}

pub(crate) async fn delete(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<StatusCode, Error> {
    let principal = principal.require(Role::User)?;

    state
        .user_controller
        .delete(principal.local_user_id())
        .await?;

    tracing::info!(user_id = principal.local_user_id(), "Deleted user");

    Ok(StatusCode::NO_CONTENT)
}
