//! Employee model.
//!
//! Authoritative headcount records. `active = false` marks an offboarded
//! employee; rows are never deleted.

use accord_core::{Employee, ScotiaId};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};

/// A row of the `employees` table.
#[derive(Debug, Clone, FromRow)]
pub struct EmployeeRow {
    pub scotia_id: String,
    pub full_name: String,
    pub email: String,
    pub position: String,
    pub unit: String,
    pub active: bool,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl From<EmployeeRow> for Employee {
    fn from(row: EmployeeRow) -> Self {
        Employee {
            scotia_id: ScotiaId::from(row.scotia_id),
            full_name: row.full_name,
            email: row.email,
            position: row.position,
            unit: row.unit,
            active: row.active,
            start_date: row.start_date,
            end_date: row.end_date,
        }
    }
}

impl EmployeeRow {
    /// Find an employee by headcount id.
    pub async fn find_by_id(
        conn: &mut PgConnection,
        scotia_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM employees WHERE scotia_id = $1")
            .bind(scotia_id)
            .fetch_optional(conn)
            .await
    }

    /// Insert a new employee. Fails with a unique violation if the id exists.
    pub async fn insert(conn: &mut PgConnection, record: &Employee) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            INSERT INTO employees (
                scotia_id, full_name, email, position, unit, active, start_date, end_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(record.scotia_id.as_str())
        .bind(&record.full_name)
        .bind(&record.email)
        .bind(&record.position)
        .bind(&record.unit)
        .bind(record.active)
        .bind(record.start_date)
        .bind(record.end_date)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Insert an employee or overwrite every attribute of the existing row.
    pub async fn upsert(conn: &mut PgConnection, record: &Employee) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            INSERT INTO employees (
                scotia_id, full_name, email, position, unit, active, start_date, end_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (scotia_id) DO UPDATE SET
                full_name = EXCLUDED.full_name,
                email = EXCLUDED.email,
                position = EXCLUDED.position,
                unit = EXCLUDED.unit,
                active = EXCLUDED.active,
                start_date = EXCLUDED.start_date,
                end_date = EXCLUDED.end_date,
                updated_at = NOW()
            ",
        )
        .bind(record.scotia_id.as_str())
        .bind(&record.full_name)
        .bind(&record.email)
        .bind(&record.position)
        .bind(&record.unit)
        .bind(record.active)
        .bind(record.start_date)
        .bind(record.end_date)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Move an employee to a new placement.
    pub async fn update_position(
        conn: &mut PgConnection,
        scotia_id: &str,
        position: &str,
        unit: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            UPDATE employees
            SET position = $2, unit = $3, updated_at = NOW()
            WHERE scotia_id = $1
            ",
        )
        .bind(scotia_id)
        .bind(position)
        .bind(unit)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Deactivate an employee. Idempotent; the first `end_date` is kept.
    pub async fn deactivate(
        conn: &mut PgConnection,
        scotia_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            UPDATE employees
            SET active = FALSE, end_date = COALESCE(end_date, $2), updated_at = NOW()
            WHERE scotia_id = $1
            ",
        )
        .bind(scotia_id)
        .bind(at)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List employees ordered by id.
    pub async fn list(
        conn: &mut PgConnection,
        active_only: bool,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM employees
            WHERE ($1 = FALSE OR active)
            ORDER BY scotia_id
            ",
        )
        .bind(active_only)
        .fetch_all(conn)
        .await
    }
}
