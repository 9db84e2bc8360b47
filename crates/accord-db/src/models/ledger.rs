//! Access ledger model.
//!
//! Append-only record of access transitions. Rows are inserted by the ticket
//! writer and only ever mutated by status updates.

use accord_core::{
    CaseId, LedgerEvent, LedgerStatus, LedgerStatusUpdate, NewLedgerEvent, ProcessAccess,
    ScotiaId,
};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};

use crate::error::DbError;

/// A row of the `access_ledger` table.
#[derive(Debug, Clone, FromRow)]
pub struct LedgerRow {
    pub id: i64,
    pub scotia_id: String,
    pub case_id: String,
    pub process_access: String,
    pub app_access_name: String,
    pub role_name: Option<String>,
    pub status: String,
    pub record_date: DateTime<Utc>,
    pub responsible: String,
    pub description: Option<String>,
    pub closing_date: Option<DateTime<Utc>>,
    pub quality_status: Option<String>,
    pub quality_comment: Option<String>,
}

impl TryFrom<LedgerRow> for LedgerEvent {
    type Error = DbError;

    fn try_from(row: LedgerRow) -> Result<Self, Self::Error> {
        let process_access: ProcessAccess = row
            .process_access
            .parse()
            .map_err(|e| DbError::InvalidRow(format!("ledger {}: {e}", row.id)))?;
        let status: LedgerStatus = row
            .status
            .parse()
            .map_err(|e| DbError::InvalidRow(format!("ledger {}: {e}", row.id)))?;

        Ok(LedgerEvent {
            id: row.id,
            scotia_id: ScotiaId::from(row.scotia_id),
            case_id: CaseId::from_raw(row.case_id),
            process_access,
            app_access_name: row.app_access_name,
            role_name: row.role_name,
            status,
            record_date: row.record_date,
            responsible: row.responsible,
            description: row.description,
            closing_date: row.closing_date,
            quality_status: row.quality_status,
            quality_comment: row.quality_comment,
        })
    }
}

/// Convert a batch of rows, failing on the first malformed one.
pub fn into_events(rows: Vec<LedgerRow>) -> Result<Vec<LedgerEvent>, DbError> {
    rows.into_iter().map(LedgerEvent::try_from).collect()
}

impl LedgerRow {
    /// Append an event.
    pub async fn insert(
        conn: &mut PgConnection,
        event: &NewLedgerEvent,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r"
            INSERT INTO access_ledger (
                scotia_id, case_id, process_access, app_access_name, role_name,
                status, record_date, responsible, description
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            ",
        )
        .bind(event.scotia_id.as_str())
        .bind(event.case_id.as_str())
        .bind(event.process_access.as_str())
        .bind(&event.app_access_name)
        .bind(&event.role_name)
        .bind(event.status.as_str())
        .bind(event.record_date)
        .bind(&event.responsible)
        .bind(&event.description)
        .fetch_one(conn)
        .await
    }

    /// Events for one `(employee, app, process)` recorded at or after `since`.
    pub async fn find_recent(
        conn: &mut PgConnection,
        scotia_id: &str,
        app_access_name: &str,
        process_access: ProcessAccess,
        since: DateTime<Utc>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM access_ledger
            WHERE scotia_id = $1
              AND app_access_name = $2
              AND process_access = $3
              AND record_date >= $4
            ORDER BY record_date DESC, id DESC
            ",
        )
        .bind(scotia_id)
        .bind(app_access_name)
        .bind(process_access.as_str())
        .bind(since)
        .fetch_all(conn)
        .await
    }

    /// Every event of an employee, newest first.
    pub async fn list_for_employee(
        conn: &mut PgConnection,
        scotia_id: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM access_ledger
            WHERE scotia_id = $1
            ORDER BY record_date DESC, id DESC
            ",
        )
        .bind(scotia_id)
        .fetch_all(conn)
        .await
    }

    /// Every event of a case, in insertion order.
    pub async fn list_for_case(
        conn: &mut PgConnection,
        case_id: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM access_ledger WHERE case_id = $1 ORDER BY id")
            .bind(case_id)
            .fetch_all(conn)
            .await
    }

    /// Fetch one event.
    pub async fn find_by_id(conn: &mut PgConnection, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM access_ledger WHERE id = $1")
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// Apply a status update; unset optional fields keep their stored value.
    pub async fn update_status(
        conn: &mut PgConnection,
        id: i64,
        update: &LedgerStatusUpdate,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            UPDATE access_ledger
            SET status = $2,
                closing_date = COALESCE($3, closing_date),
                quality_status = COALESCE($4, quality_status),
                quality_comment = COALESCE($5, quality_comment)
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(id)
        .bind(update.status.as_str())
        .bind(update.closing_date)
        .bind(&update.quality_status)
        .bind(&update.quality_comment)
        .fetch_optional(conn)
        .await
    }
}
