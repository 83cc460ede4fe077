//! Offline-record reconciliation.
//!
//! A mobile client submits the records it captured offline as a JSON array.
//! Each item carries the client's `local_id`; together with the caller it
//! identifies a record across submissions, so a resubmitted batch updates the
//! rows it created the first time instead of duplicating them.
//!
//! The batch is all-or-nothing: every item runs on one write transaction, and
//! the first failing item drops it without commit. Because the transaction
//! takes the write lock before its first lookup, concurrent batches run one
//! after the other and a later batch sees the rows an earlier one committed.

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::{SqliteConnection, SqlitePool};

use super::error::ApiError;
use crate::db::{self, FarmerDataRepository};
use crate::models::validation::{self, FieldErrors};
use crate::models::{FarmerData, FarmerDataInput, FarmerDataPatch, LOCAL_ID_MAX_LEN};

pub const SYNC_COMPLETED: &str = "Sync completed successfully";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub status: &'static str,
}

/// What happened to one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Created,
    Updated,
}

/// Reconciles `items` against the caller's farmer records.
pub async fn reconcile(
    pool: &SqlitePool,
    caller: i64,
    items: &[Value],
) -> Result<SyncReport, ApiError> {
    let mut tx = db::begin_write(pool).await?;
    let mut report = SyncReport {
        created: 0,
        updated: 0,
        status: SYNC_COMPLETED,
    };

    for (index, item) in items.iter().enumerate() {
        let outcome = reconcile_item(&mut *tx, caller, item)
            .await?
            .map_err(|errors| {
                tracing::info!(index, %errors, "Sync batch rejected");
                ApiError::SyncItem { index, errors }
            })?;

        tracing::debug!(index, ?outcome, "Reconciled sync item");
        match outcome {
            Outcome::Created => report.created += 1,
            Outcome::Updated => report.updated += 1,
        }
    }

    tx.commit().await?;

    tracing::info!(
        user_id = caller,
        created = report.created,
        updated = report.updated,
        "Sync completed"
    );
    Ok(report)
}

/// Store errors surface through the outer `Result`, item validation errors
/// through the inner one.
async fn reconcile_item(
    conn: &mut SqliteConnection,
    caller: i64,
    item: &Value,
) -> Result<Result<Outcome, FieldErrors>, sqlx::Error> {
    let obj = match validation::as_object(item) {
        Ok(obj) => obj,
        Err(errors) => return Ok(Err(errors)),
    };
    let local_id = match read_local_id(obj) {
        Ok(local_id) => local_id,
        Err(errors) => return Ok(Err(errors)),
    };

    if let Some(local_id) = &local_id {
        if let Some(existing) = FarmerDataRepository::find_by_local_id(conn, local_id, caller).await? {
            return update_existing(conn, existing, obj).await;
        }
    }

    let input = match FarmerDataInput::from_json(obj) {
        Ok(input) => FarmerDataInput { local_id, ..input },
        Err(errors) => return Ok(Err(errors)),
    };
    let missing =
        FarmerDataRepository::missing_references(conn, Some(input.farm_type), Some(input.crop))
            .await?;
    if !missing.is_empty() {
        return Ok(Err(missing));
    }

    let Some(local_id) = &input.local_id else {
        FarmerDataRepository::insert(conn, &input, caller).await?;
        return Ok(Ok(Outcome::Created));
    };

    create_keyed(conn, &input, obj, caller, local_id).await
}

/// Inserts a keyed record, merging into the stored one if the key is taken.
async fn create_keyed(
    conn: &mut SqliteConnection,
    input: &FarmerDataInput,
    obj: &Map<String, Value>,
    caller: i64,
    local_id: &str,
) -> Result<Result<Outcome, FieldErrors>, sqlx::Error> {
    if FarmerDataRepository::insert_if_absent(conn, input, caller)
        .await?
        .is_some()
    {
        return Ok(Ok(Outcome::Created));
    }

    match FarmerDataRepository::find_by_local_id(conn, local_id, caller).await? {
        Some(existing) => update_existing(conn, existing, obj).await,
        None => Err(sqlx::Error::RowNotFound),
    }
}

async fn update_existing(
    conn: &mut SqliteConnection,
    mut record: FarmerData,
    obj: &Map<String, Value>,
) -> Result<Result<Outcome, FieldErrors>, sqlx::Error> {
    let patch = match FarmerDataPatch::from_json(obj) {
        Ok(patch) => FarmerDataPatch {
            local_id: None,
            ..patch
        },
        Err(errors) => return Ok(Err(errors)),
    };
    let missing = FarmerDataRepository::missing_references(conn, patch.farm_type, patch.crop).await?;
    if !missing.is_empty() {
        return Ok(Err(missing));
    }

    patch.apply(&mut record);
    record.is_synced = true;
    record.updated_at = Utc::now();
    FarmerDataRepository::save(conn, &record).await?;

    Ok(Ok(Outcome::Updated))
}

/// Reads the item's local id. Absent, null and blank all mean "none".
fn read_local_id(obj: &Map<String, Value>) -> Result<Option<String>, FieldErrors> {
    let mut errors = FieldErrors::new();
    let local_id = validation::text(obj, "local_id", LOCAL_ID_MAX_LEN, true, &mut errors)
        .nullable()
        .flatten()
        .filter(|s| !s.is_empty());
    errors.into_result(local_id)
}
