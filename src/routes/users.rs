//! User administration routes.

use axum::extract::State;
use axum::response::Json;
use serde::Deserialize;

use super::auth::{AuthUser, UserResponse};
use crate::error::ApiError;
use crate::extract::{JsonBody, PathParam};
use crate::repository::users;
use crate::services::roles::{self, Role, ensure_role};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RoleUpdate {
    pub role: String,
}

/// `PATCH /api/users/{user_id}/role`: admin-only role change.
pub async fn update_role(
    State(state): State<AppState>,
    auth: AuthUser,
    PathParam(user_id): PathParam<i64>,
    JsonBody(body): JsonBody<RoleUpdate>,
) -> Result<Json<UserResponse>, ApiError> {
    ensure_role(auth.user.role, roles::USERS_MANAGE)?;
    let role: Role = body.role.parse()?;

    let target = users::get_user_by_id(&state.pool, user_id)
        .await?
        .ok_or_else(ApiError::not_found)?;
    if target.role == role {
        return Ok(Json(target.into()));
    }

    let user = users::update_role(&state.pool, user_id, role)
        .await?
        .ok_or_else(ApiError::not_found)?;
    tracing::info!(admin_id = auth.user.id, user_id, %role, "role changed");
    Ok(Json(user.into()))
}
