use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    Json,
};
use serde_json::Value;

use super::{json_body, path_id};
use crate::db::UserRepository;
use crate::models::{User, UserUpdate};
use crate::server::auth::RequestContext;
use crate::server::error::ApiError;
use crate::server::permissions::{check, Action, Resource};
use crate::server::AppState;

const NO_CHANGES: &str = "Supply role or is_active.";

fn repo(state: &AppState) -> UserRepository {
    UserRepository::new(state.pool.clone())
}

/// The caller's own profile.
pub async fn me(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<User>, ApiError> {
    check(&ctx, Resource::CurrentUser, Action::Retrieve)?;
    repo(&state)
        .get_by_id(ctx.user_id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

pub async fn list(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<Vec<User>>, ApiError> {
    check(&ctx, Resource::Users, Action::List)?;
    Ok(Json(repo(&state).list().await?))
}

pub async fn retrieve(
    State(state): State<AppState>,
    ctx: RequestContext,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<User>, ApiError> {
    check(&ctx, Resource::Users, Action::Retrieve)?;
    let id = path_id(path)?;
    repo(&state)
        .get_by_id(id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// Changes a user's role or active flag.
pub async fn partial_update(
    State(state): State<AppState>,
    ctx: RequestContext,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<User>, ApiError> {
    check(&ctx, Resource::Users, Action::PartialUpdate)?;
    let id = path_id(path)?;
    let body = json_body(body)?;
    let update: UserUpdate =
        serde_json::from_value(body).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if update.is_empty() {
        return Err(ApiError::BadRequest(NO_CHANGES.into()));
    }

    let user = repo(&state)
        .update(id, &update)
        .await?
        .ok_or(ApiError::NotFound)?;
    tracing::info!(
        id,
        role = %user.role,
        is_active = user.is_active,
        admin = %ctx.username,
        "Updated user"
    );
    Ok(Json(user))
}
