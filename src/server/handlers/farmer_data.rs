//! Farmer record endpoints, scoped by role, plus the offline sync batch.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    Json,
};
use serde_json::Value;

use super::{json_body, path_id};
use crate::db::{is_unique_violation, FarmerDataRepository};
use crate::models::validation::as_object;
use crate::models::{FarmerData, FarmerDataInput, FarmerDataPatch, FieldErrors};
use crate::server::auth::RequestContext;
use crate::server::error::ApiError;
use crate::server::permissions::{check, farmer_data_scope, Action, Resource};
use crate::server::sync::{self, SyncReport};
use crate::server::AppState;

const DUPLICATE_LOCAL_ID: &str = "farmer data with this local id already exists.";

fn repo(state: &AppState) -> FarmerDataRepository {
    FarmerDataRepository::new(state.pool.clone())
}

/// Rejects farm type / crop ids that point nowhere.
async fn check_references(
    state: &AppState,
    farm_type: Option<i64>,
    crop: Option<i64>,
) -> Result<(), ApiError> {
    let mut conn = state.pool.acquire().await?;
    let missing = FarmerDataRepository::missing_references(&mut conn, farm_type, crop).await?;
    missing.into_result(()).map_err(ApiError::from)
}

fn map_store_error(err: sqlx::Error) -> ApiError {
    if is_unique_violation(&err) {
        ApiError::Validation(FieldErrors::single("local_id", DUPLICATE_LOCAL_ID))
    } else {
        ApiError::Database(err)
    }
}

pub async fn list(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<Vec<FarmerData>>, ApiError> {
    check(&ctx, Resource::FarmerData, Action::List)?;
    Ok(Json(repo(&state).list(farmer_data_scope(&ctx)).await?))
}

pub async fn retrieve(
    State(state): State<AppState>,
    ctx: RequestContext,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<FarmerData>, ApiError> {
    check(&ctx, Resource::FarmerData, Action::Retrieve)?;
    let id = path_id(path)?;
    repo(&state)
        .get(id, farmer_data_scope(&ctx))
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

pub async fn create(
    State(state): State<AppState>,
    ctx: RequestContext,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<FarmerData>), ApiError> {
    check(&ctx, Resource::FarmerData, Action::Create)?;
    let body = json_body(body)?;
    let input = FarmerDataInput::from_json(as_object(&body)?)?;
    check_references(&state, Some(input.farm_type), Some(input.crop)).await?;

    let record = repo(&state)
        .create(&input, ctx.user_id)
        .await
        .map_err(map_store_error)?;
    tracing::info!(id = record.id, username = %ctx.username, "Created farmer record");
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn update(
    State(state): State<AppState>,
    ctx: RequestContext,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<FarmerData>, ApiError> {
    check(&ctx, Resource::FarmerData, Action::Update)?;
    let id = path_id(path)?;
    apply_patch(&state, &ctx, id, body, true).await
}

pub async fn partial_update(
    State(state): State<AppState>,
    ctx: RequestContext,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<FarmerData>, ApiError> {
    check(&ctx, Resource::FarmerData, Action::PartialUpdate)?;
    let id = path_id(path)?;
    apply_patch(&state, &ctx, id, body, false).await
}

async fn apply_patch(
    state: &AppState,
    ctx: &RequestContext,
    id: i64,
    body: Result<Json<Value>, JsonRejection>,
    complete: bool,
) -> Result<Json<FarmerData>, ApiError> {
    let scope = farmer_data_scope(ctx);
    let repo = repo(state);
    if repo.get(id, scope).await?.is_none() {
        return Err(ApiError::NotFound);
    }

    let body = json_body(body)?;
    let patch = FarmerDataPatch::from_json(as_object(&body)?)?;
    if complete {
        patch.require_complete()?;
    }
    check_references(state, patch.farm_type, patch.crop).await?;

    repo.update(id, scope, &patch)
        .await
        .map_err(map_store_error)?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

pub async fn destroy(
    State(state): State<AppState>,
    ctx: RequestContext,
    path: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    check(&ctx, Resource::FarmerData, Action::Destroy)?;
    let id = path_id(path)?;
    repo(&state)
        .delete(id, farmer_data_scope(&ctx))
        .await?
        .ok_or(ApiError::NotFound)?;

    tracing::info!(id, username = %ctx.username, "Deleted farmer record");
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /farmer-data/sync/`: reconciles a batch of offline records.
pub async fn sync(
    State(state): State<AppState>,
    ctx: RequestContext,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<SyncReport>, ApiError> {
    check(&ctx, Resource::FarmerData, Action::Sync)?;
    let body = json_body(body)?;
    let Some(items) = body.as_array() else {
        return Err(ApiError::BadRequest(
            "Expected a list of items but got a different type.".to_string(),
        ));
    };

    tracing::info!(username = %ctx.username, items = items.len(), "Sync requested");
    Ok(Json(sync::reconcile(&state.pool, ctx.user_id, items).await?))
}
