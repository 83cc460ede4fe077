use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};

use super::integrity::{self, DeleteEffects};
use super::{parse_timestamp, ReferenceRepository};
use crate::models::{FarmerData, FarmerDataInput, FarmerDataPatch, FieldErrors, ReferenceKind};

/// Which farmer records a query may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Every row (admin).
    All,
    /// Only rows created by this user (clerk).
    Owner(i64),
}

impl Scope {
    fn owner(&self) -> Option<i64> {
        match self {
            Scope::All => None,
            Scope::Owner(id) => Some(*id),
        }
    }
}

pub struct FarmerDataRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct FarmerDataRow {
    id: i64,
    farmer_name: String,
    national_id: String,
    farm_type: i64,
    crop: i64,
    location: String,
    created_by: i64,
    created_at: String,
    updated_at: String,
    local_id: Option<String>,
    is_synced: bool,
}

impl TryFrom<FarmerDataRow> for FarmerData {
    type Error = sqlx::Error;

    fn try_from(row: FarmerDataRow) -> Result<Self, Self::Error> {
        Ok(FarmerData {
            id: row.id,
            farmer_name: row.farmer_name,
            national_id: row.national_id,
            farm_type: row.farm_type,
            crop: row.crop,
            location: row.location,
            created_by: row.created_by,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
            local_id: row.local_id,
            is_synced: row.is_synced,
        })
    }
}

impl FarmerDataRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, scope: Scope) -> Result<Vec<FarmerData>, sqlx::Error> {
        let owner = scope.owner();

        let rows: Vec<FarmerDataRow> = sqlx::query_as(
            "SELECT * FROM farmer_data WHERE (? IS NULL OR created_by = ?) ORDER BY id",
        )
        .bind(owner)
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(FarmerData::try_from).collect()
    }

    pub async fn get(&self, id: i64, scope: Scope) -> Result<Option<FarmerData>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        Self::get_in(&mut *conn, id, scope).await
    }

    pub async fn create(
        &self,
        input: &FarmerDataInput,
        created_by: i64,
    ) -> Result<FarmerData, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        Self::insert(&mut conn, input, created_by).await
    }

    /// Merges `patch` into a record visible under `scope`.
    ///
    /// Returns `None` if the record does not exist or is out of scope.
    pub async fn update(
        &self,
        id: i64,
        scope: Scope,
        patch: &FarmerDataPatch,
    ) -> Result<Option<FarmerData>, sqlx::Error> {
        let mut tx = super::begin_write(&self.pool).await?;

        let Some(mut record) = Self::get_in(&mut *tx, id, scope).await? else {
            return Ok(None);
        };
        patch.apply(&mut record);
        record.updated_at = Utc::now();
        Self::save(&mut *tx, &record).await?;

        tx.commit().await?;
        Ok(Some(record))
    }

    /// Deletes a record visible under `scope`.
    pub async fn delete(&self, id: i64, scope: Scope) -> Result<Option<DeleteEffects>, sqlx::Error> {
        let mut tx = super::begin_write(&self.pool).await?;

        if Self::get_in(&mut *tx, id, scope).await?.is_none() {
            return Ok(None);
        }
        let effects = integrity::delete_row(&mut *tx, "farmer_data", id).await?;

        tx.commit().await?;
        Ok(effects)
    }

    async fn get_in(
        conn: &mut SqliteConnection,
        id: i64,
        scope: Scope,
    ) -> Result<Option<FarmerData>, sqlx::Error> {
        let owner = scope.owner();

        let row: Option<FarmerDataRow> = sqlx::query_as(
            "SELECT * FROM farmer_data WHERE id = ? AND (? IS NULL OR created_by = ?)",
        )
        .bind(id)
        .bind(owner)
        .bind(owner)
        .fetch_optional(conn)
        .await?;

        row.map(FarmerData::try_from).transpose()
    }

    /// Inserts a new record with `created_by` set by the server.
    pub async fn insert(
        conn: &mut SqliteConnection,
        input: &FarmerDataInput,
        created_by: i64,
    ) -> Result<FarmerData, sqlx::Error> {
        let now = Utc::now().to_rfc3339();

        let row: FarmerDataRow = sqlx::query_as(
            r#"
            INSERT INTO farmer_data (farmer_name, national_id, farm_type, crop, location, created_by, created_at, updated_at, local_id, is_synced)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1)
            RETURNING *
            "#,
        )
        .bind(&input.farmer_name)
        .bind(&input.national_id)
        .bind(input.farm_type)
        .bind(input.crop)
        .bind(&input.location)
        .bind(created_by)
        .bind(&now)
        .bind(&now)
        .bind(&input.local_id)
        .fetch_one(conn)
        .await?;

        row.try_into()
    }

    /// Inserts a synced record unless (created_by, local_id) is already taken.
    ///
    /// Returns `None` when another writer got there first; the caller then
    /// treats the item as an update.
    pub async fn insert_if_absent(
        conn: &mut SqliteConnection,
        input: &FarmerDataInput,
        created_by: i64,
    ) -> Result<Option<FarmerData>, sqlx::Error> {
        let now = Utc::now().to_rfc3339();

        let row: Option<FarmerDataRow> = sqlx::query_as(
            r#"
            INSERT INTO farmer_data (farmer_name, national_id, farm_type, crop, location, created_by, created_at, updated_at, local_id, is_synced)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1)
            ON CONFLICT (created_by, local_id) WHERE local_id IS NOT NULL DO NOTHING
            RETURNING *
            "#,
        )
        .bind(&input.farmer_name)
        .bind(&input.national_id)
        .bind(input.farm_type)
        .bind(input.crop)
        .bind(&input.location)
        .bind(created_by)
        .bind(&now)
        .bind(&now)
        .bind(&input.local_id)
        .fetch_optional(conn)
        .await?;

        row.map(FarmerData::try_from).transpose()
    }

    pub async fn find_by_local_id(
        conn: &mut SqliteConnection,
        local_id: &str,
        created_by: i64,
    ) -> Result<Option<FarmerData>, sqlx::Error> {
        let row: Option<FarmerDataRow> =
            sqlx::query_as("SELECT * FROM farmer_data WHERE local_id = ? AND created_by = ?")
                .bind(local_id)
                .bind(created_by)
                .fetch_optional(conn)
                .await?;

        row.map(FarmerData::try_from).transpose()
    }

    /// Writes every mutable column of `record` back to its row.
    pub async fn save(conn: &mut SqliteConnection, record: &FarmerData) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE farmer_data
            SET farmer_name = ?, national_id = ?, farm_type = ?, crop = ?, location = ?,
                local_id = ?, is_synced = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&record.farmer_name)
        .bind(&record.national_id)
        .bind(record.farm_type)
        .bind(record.crop)
        .bind(&record.location)
        .bind(&record.local_id)
        .bind(record.is_synced)
        .bind(record.updated_at.to_rfc3339())
        .bind(record.id)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Reports farm type / crop ids that do not resolve to a row.
    pub async fn missing_references(
        conn: &mut SqliteConnection,
        farm_type: Option<i64>,
        crop: Option<i64>,
    ) -> Result<FieldErrors, sqlx::Error> {
        let mut errors = FieldErrors::new();

        for (kind, id) in [(ReferenceKind::FarmType, farm_type), (ReferenceKind::Crop, crop)] {
            let Some(id) = id else { continue };
            if !ReferenceRepository::exists(&mut *conn, kind, id).await? {
                errors.add(
                    kind.farmer_data_column(),
                    format!("Invalid pk \"{}\" - object does not exist.", id),
                );
            }
        }

        Ok(errors)
    }
}
