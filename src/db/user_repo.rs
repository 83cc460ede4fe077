use chrono::Utc;
use sqlx::SqlitePool;

use super::parse_timestamp;
use crate::models::{Role, User, UserUpdate};

pub struct UserRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: Option<String>,
    role: String,
    is_active: bool,
    created_at: String,
}

impl TryFrom<UserRow> for User {
    type Error = sqlx::Error;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            username: row.username,
            email: row.email,
            role: row
                .role
                .parse::<Role>()
                .map_err(|e| sqlx::Error::Decode(e.into()))?,
            is_active: row.is_active,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

const USER_COLUMNS: &str = "id, username, email, role, is_active, created_at";

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        username: &str,
        email: Option<&str>,
        role: Role,
        token_hash: &str,
    ) -> Result<User, sqlx::Error> {
        let created_at = Utc::now().to_rfc3339();

        let row: UserRow = sqlx::query_as(&format!(
            "INSERT INTO users (username, email, role, is_active, token_hash, created_at) VALUES (?, ?, ?, 1, ?, ?) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(username)
        .bind(email)
        .bind(role.as_str())
        .bind(token_hash)
        .bind(&created_at)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(User::try_from).transpose()
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE username = ?",
            USER_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    /// Looks up the owner of an API token by its hash. Inactive users are returned too.
    pub async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE token_hash = ?",
            USER_COLUMNS
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    pub async fn list(&self) -> Result<Vec<User>, sqlx::Error> {
        let rows: Vec<UserRow> =
            sqlx::query_as(&format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS))
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(User::try_from).collect()
    }

    /// Applies a role/active change. Returns `None` if the user does not exist.
    pub async fn update(&self, id: i64, update: &UserUpdate) -> Result<Option<User>, sqlx::Error> {
        let Some(mut user) = self.get_by_id(id).await? else {
            return Ok(None);
        };

        if let Some(role) = update.role {
            user.role = role;
        }
        if let Some(is_active) = update.is_active {
            user.is_active = is_active;
        }

        sqlx::query("UPDATE users SET role = ?, is_active = ? WHERE id = ?")
            .bind(user.role.as_str())
            .bind(user.is_active)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(Some(user))
    }

    /// Replaces a user's token hash. Returns false if the user does not exist.
    pub async fn set_token_hash(&self, id: i64, token_hash: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET token_hash = ? WHERE id = ?")
            .bind(token_hash)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
