//! Application model.
//!
//! Rows of the policy matrix: one per `(logical_access_name, unit,
//! position_role, role_name)` entitlement.

use accord_core::{Application, NewApplication};
use sqlx::{FromRow, PgConnection};

/// A row of the `applications` table.
#[derive(Debug, Clone, FromRow)]
pub struct ApplicationRow {
    pub id: i64,
    pub logical_access_name: String,
    pub unit: String,
    pub position_role: String,
    pub role_name: Option<String>,
    pub access_category: Option<String>,
    pub owner: Option<String>,
    pub description: Option<String>,
}

impl From<ApplicationRow> for Application {
    fn from(row: ApplicationRow) -> Self {
        Application {
            id: row.id,
            logical_access_name: row.logical_access_name,
            unit: row.unit,
            position_role: row.position_role,
            role_name: row.role_name,
            access_category: row.access_category,
            owner: row.owner,
            description: row.description,
        }
    }
}

impl ApplicationRow {
    /// Policy rows for an exact `(unit, position)` placement.
    pub async fn list_for_placement(
        conn: &mut PgConnection,
        unit: &str,
        position: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM applications
            WHERE unit = $1 AND position_role = $2
            ORDER BY id
            ",
        )
        .bind(unit)
        .bind(position)
        .fetch_all(conn)
        .await
    }

    /// Every policy row.
    pub async fn list_all(conn: &mut PgConnection) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM applications ORDER BY id")
            .fetch_all(conn)
            .await
    }

    /// Create a policy row.
    pub async fn create(
        conn: &mut PgConnection,
        input: &NewApplication,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r"
            INSERT INTO applications (
                logical_access_name, unit, position_role, role_name,
                access_category, owner, description
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            ",
        )
        .bind(&input.logical_access_name)
        .bind(&input.unit)
        .bind(&input.position_role)
        .bind(&input.role_name)
        .bind(&input.access_category)
        .bind(&input.owner)
        .bind(&input.description)
        .fetch_one(conn)
        .await
    }

    /// Delete a policy row.
    pub async fn delete(conn: &mut PgConnection, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM applications WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
