//! Farm type and crop endpoints. The router tags each route with its
//! [`ReferenceKind`] through an `Extension`.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    Extension, Json,
};
use serde_json::Value;

use super::{json_body, path_id};
use crate::db::ReferenceRepository;
use crate::models::validation::as_object;
use crate::models::{ReferenceItem, ReferenceKind, ReferencePatch};
use crate::server::auth::RequestContext;
use crate::server::error::ApiError;
use crate::server::permissions::{check, Action, Resource};
use crate::server::AppState;

fn resource(kind: ReferenceKind) -> Resource {
    match kind {
        ReferenceKind::FarmType => Resource::FarmType,
        ReferenceKind::Crop => Resource::Crop,
    }
}

fn repo(state: &AppState, kind: ReferenceKind) -> ReferenceRepository {
    ReferenceRepository::new(state.pool.clone(), kind)
}

pub async fn list(
    State(state): State<AppState>,
    Extension(kind): Extension<ReferenceKind>,
    ctx: RequestContext,
) -> Result<Json<Vec<ReferenceItem>>, ApiError> {
    check(&ctx, resource(kind), Action::List)?;
    Ok(Json(repo(&state, kind).list().await?))
}

pub async fn retrieve(
    State(state): State<AppState>,
    Extension(kind): Extension<ReferenceKind>,
    ctx: RequestContext,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<ReferenceItem>, ApiError> {
    check(&ctx, resource(kind), Action::Retrieve)?;
    let id = path_id(path)?;
    repo(&state, kind)
        .get_by_id(id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

pub async fn create(
    State(state): State<AppState>,
    Extension(kind): Extension<ReferenceKind>,
    ctx: RequestContext,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<ReferenceItem>), ApiError> {
    check(&ctx, resource(kind), Action::Create)?;
    let body = json_body(body)?;
    let input = ReferencePatch::from_json(as_object(&body)?)?.into_input()?;

    let item = repo(&state, kind).create(&input, ctx.user_id).await?;
    tracing::info!(id = item.id, %kind, username = %ctx.username, "Created reference item");
    Ok((StatusCode::CREATED, Json(item)))
}

/// `PUT`: every writable field is replaced; an omitted description resets to blank.
pub async fn update(
    State(state): State<AppState>,
    Extension(kind): Extension<ReferenceKind>,
    ctx: RequestContext,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ReferenceItem>, ApiError> {
    check(&ctx, resource(kind), Action::Update)?;
    let id = path_id(path)?;
    let repo = repo(&state, kind);
    if repo.get_by_id(id).await?.is_none() {
        return Err(ApiError::NotFound);
    }

    let body = json_body(body)?;
    let input = ReferencePatch::from_json(as_object(&body)?)?.into_input()?;
    let patch = ReferencePatch {
        name: Some(input.name),
        description: Some(input.description),
    };

    repo.update(id, &patch)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

pub async fn partial_update(
    State(state): State<AppState>,
    Extension(kind): Extension<ReferenceKind>,
    ctx: RequestContext,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ReferenceItem>, ApiError> {
    check(&ctx, resource(kind), Action::PartialUpdate)?;
    let id = path_id(path)?;
    let repo = repo(&state, kind);
    if repo.get_by_id(id).await?.is_none() {
        return Err(ApiError::NotFound);
    }

    let body = json_body(body)?;
    let patch = ReferencePatch::from_json(as_object(&body)?)?;

    repo.update(id, &patch)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

pub async fn destroy(
    State(state): State<AppState>,
    Extension(kind): Extension<ReferenceKind>,
    ctx: RequestContext,
    path: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    check(&ctx, resource(kind), Action::Destroy)?;
    let id = path_id(path)?;
    let effects = repo(&state, kind)
        .delete(id)
        .await?
        .ok_or(ApiError::NotFound)?;

    tracing::info!(
        id,
        %kind,
        cascaded = effects.cascaded,
        "Deleted reference item"
    );
    Ok(StatusCode::NO_CONTENT)
}
