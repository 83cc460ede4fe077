//! Referential-integrity policies.
//!
//! Every foreign key in the schema is listed here together with what happens
//! to the referencing rows when the referenced row is deleted. Deletes go
//! through [`delete_row`], which applies these actions explicitly inside the
//! caller's transaction before removing the row itself:
//!
//! ```text
//! users        --(SET NULL)-->  farm_types.created_by, crops.created_by
//! users        --(CASCADE)--->  farmer_data.created_by
//! farm_types   --(CASCADE)--->  farmer_data.farm_type
//! crops        --(CASCADE)--->  farmer_data.crop
//! ```
//!
//! The schema's `ON DELETE` clauses mirror this table.

use sqlx::SqliteConnection;
use std::fmt;

/// Action taken on referencing rows when the referenced row goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    Cascade,
    SetNull,
}

impl OnDelete {
    /// Returns the SQL spelling, as reported by `PRAGMA foreign_key_list`.
    pub fn as_sql(&self) -> &'static str {
        match self {
            OnDelete::Cascade => "CASCADE",
            OnDelete::SetNull => "SET NULL",
        }
    }
}

impl fmt::Display for OnDelete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// One foreign key and its on-delete action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKeyPolicy {
    pub child_table: &'static str,
    pub column: &'static str,
    pub parent_table: &'static str,
    pub on_delete: OnDelete,
}

pub const POLICIES: &[ForeignKeyPolicy] = &[
    ForeignKeyPolicy {
        child_table: "farm_types",
        column: "created_by",
        parent_table: "users",
        on_delete: OnDelete::SetNull,
    },
    ForeignKeyPolicy {
        child_table: "crops",
        column: "created_by",
        parent_table: "users",
        on_delete: OnDelete::SetNull,
    },
    ForeignKeyPolicy {
        child_table: "farmer_data",
        column: "farm_type",
        parent_table: "farm_types",
        on_delete: OnDelete::Cascade,
    },
    ForeignKeyPolicy {
        child_table: "farmer_data",
        column: "crop",
        parent_table: "crops",
        on_delete: OnDelete::Cascade,
    },
    ForeignKeyPolicy {
        child_table: "farmer_data",
        column: "created_by",
        parent_table: "users",
        on_delete: OnDelete::Cascade,
    },
];

/// Policies whose parent is `table`.
pub fn policies_for(table: &str) -> impl Iterator<Item = &'static ForeignKeyPolicy> + '_ {
    POLICIES.iter().filter(move |p| p.parent_table == table)
}

/// Counts of rows touched by a delete, beyond the row itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteEffects {
    pub cascaded: u64,
    pub nulled: u64,
}

/// Applies every policy that points at `table`/`id`, following cascades
/// down to the leaves. Cascaded rows are deleted children-first.
pub async fn apply_on_delete(
    conn: &mut SqliteConnection,
    table: &str,
    id: i64,
) -> Result<DeleteEffects, sqlx::Error> {
    let mut effects = DeleteEffects::default();
    let mut pending = vec![(table, id)];
    let mut doomed: Vec<(&'static str, i64)> = Vec::new();

    while let Some((table, id)) = pending.pop() {
        for policy in policies_for(table) {
            match policy.on_delete {
                OnDelete::SetNull => {
                    let sql = format!(
                        "UPDATE {} SET {} = NULL WHERE {} = ?",
                        policy.child_table, policy.column, policy.column
                    );
                    let result = sqlx::query(&sql).bind(id).execute(&mut *conn).await?;
                    effects.nulled += result.rows_affected();
                }
                OnDelete::Cascade => {
                    let sql = format!(
                        "SELECT id FROM {} WHERE {} = ?",
                        policy.child_table, policy.column
                    );
                    let children: Vec<(i64,)> =
                        sqlx::query_as(&sql).bind(id).fetch_all(&mut *conn).await?;
                    for (child_id,) in children {
                        pending.push((policy.child_table, child_id));
                        doomed.push((policy.child_table, child_id));
                    }
                }
            }
        }
    }

    for (table, id) in doomed.into_iter().rev() {
        let sql = format!("DELETE FROM {} WHERE id = ?", table);
        effects.cascaded += sqlx::query(&sql)
            .bind(id)
            .execute(&mut *conn)
            .await?
            .rows_affected();
    }

    Ok(effects)
}

/// Deletes one row after applying its on-delete policies.
///
/// Returns `None` if the row did not exist.
pub async fn delete_row(
    conn: &mut SqliteConnection,
    table: &str,
    id: i64,
) -> Result<Option<DeleteEffects>, sqlx::Error> {
    let sql = format!("SELECT COUNT(*) FROM {} WHERE id = ?", table);
    let (count,): (i64,) = sqlx::query_as(&sql).bind(id).fetch_one(&mut *conn).await?;
    if count == 0 {
        return Ok(None);
    }

    let effects = apply_on_delete(&mut *conn, table, id).await?;

    let sql = format!("DELETE FROM {} WHERE id = ?", table);
    sqlx::query(&sql).bind(id).execute(&mut *conn).await?;

    Ok(Some(effects))
}
