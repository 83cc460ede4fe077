use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};

use super::integrity::{self, DeleteEffects};
use super::parse_timestamp;
use crate::models::{ReferenceInput, ReferenceItem, ReferenceKind, ReferencePatch};

/// Farm types and crops share a row shape, so one repository serves both.
pub struct ReferenceRepository {
    pool: SqlitePool,
    kind: ReferenceKind,
}

#[derive(sqlx::FromRow)]
struct ReferenceRow {
    id: i64,
    name: String,
    description: String,
    created_by: Option<i64>,
    created_at: String,
}

impl TryFrom<ReferenceRow> for ReferenceItem {
    type Error = sqlx::Error;

    fn try_from(row: ReferenceRow) -> Result<Self, Self::Error> {
        Ok(ReferenceItem {
            id: row.id,
            name: row.name,
            description: row.description,
            created_by: row.created_by,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

impl ReferenceRepository {
    pub fn new(pool: SqlitePool, kind: ReferenceKind) -> Self {
        Self { pool, kind }
    }

    pub async fn create(
        &self,
        input: &ReferenceInput,
        created_by: i64,
    ) -> Result<ReferenceItem, sqlx::Error> {
        let created_at = Utc::now().to_rfc3339();
        let sql = format!(
            "INSERT INTO {} (name, description, created_by, created_at) VALUES (?, ?, ?, ?) RETURNING *",
            self.kind.table()
        );

        let row: ReferenceRow = sqlx::query_as(&sql)
            .bind(&input.name)
            .bind(&input.description)
            .bind(created_by)
            .bind(&created_at)
            .fetch_one(&self.pool)
            .await?;

        row.try_into()
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<ReferenceItem>, sqlx::Error> {
        let sql = format!("SELECT * FROM {} WHERE id = ?", self.kind.table());

        let row: Option<ReferenceRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(ReferenceItem::try_from).transpose()
    }

    pub async fn list(&self) -> Result<Vec<ReferenceItem>, sqlx::Error> {
        let sql = format!("SELECT * FROM {} ORDER BY id", self.kind.table());

        let rows: Vec<ReferenceRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        rows.into_iter().map(ReferenceItem::try_from).collect()
    }

    /// Applies `patch` to an existing row. `created_by`/`created_at` never change.
    pub async fn update(
        &self,
        id: i64,
        patch: &ReferencePatch,
    ) -> Result<Option<ReferenceItem>, sqlx::Error> {
        let Some(mut item) = self.get_by_id(id).await? else {
            return Ok(None);
        };
        patch.apply(&mut item);

        let sql = format!(
            "UPDATE {} SET name = ?, description = ? WHERE id = ?",
            self.kind.table()
        );
        sqlx::query(&sql)
            .bind(&item.name)
            .bind(&item.description)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(Some(item))
    }

    /// Deletes a row and everything that depends on it.
    pub async fn delete(&self, id: i64) -> Result<Option<DeleteEffects>, sqlx::Error> {
        let mut tx = super::begin_write(&self.pool).await?;
        let effects = integrity::delete_row(&mut *tx, self.kind.table(), id).await?;
        tx.commit().await?;
        Ok(effects)
    }

    /// Checks a reference on an open connection (used inside transactions).
    pub async fn exists(
        conn: &mut SqliteConnection,
        kind: ReferenceKind,
        id: i64,
    ) -> Result<bool, sqlx::Error> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE id = ?", kind.table());
        let (count,): (i64,) = sqlx::query_as(&sql).bind(id).fetch_one(conn).await?;
        Ok(count > 0)
    }
}
