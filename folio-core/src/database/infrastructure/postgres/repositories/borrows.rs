use async_trait::async_trait;
use chrono::{DateTime, Utc};
use folio_model::{
    BorrowId, BorrowRecord, BorrowStatus, PatronId, PenaltyStatus, PenaltyType,
    ReturnHistory, TitleId,
};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::database::ports::borrows::{BorrowsRepository, ReturnOutcome};
use crate::error::{CirculationError, Result};

#[derive(Debug, Clone)]
pub struct PostgresBorrowsRepository {
    pool: PgPool,
}

impl PostgresBorrowsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn map_row(row: &PgRow) -> Result<BorrowRecord> {
        let id: Uuid = row.try_get("id").map_err(|e| {
            CirculationError::Internal(format!("Failed to read borrow id: {e}"))
        })?;
        let title_id: Uuid = row.try_get("title_id").map_err(|e| {
            CirculationError::Internal(format!("Failed to read title_id: {e}"))
        })?;
        let patron_id: Uuid = row.try_get("patron_id").map_err(|e| {
            CirculationError::Internal(format!("Failed to read patron_id: {e}"))
        })?;
        let status: String = row.try_get("status").map_err(|e| {
            CirculationError::Internal(format!("Failed to read status: {e}"))
        })?;
        let borrowed_at: DateTime<Utc> =
            row.try_get("borrowed_at").map_err(|e| {
                CirculationError::Internal(format!(
                    "Failed to read borrowed_at: {e}"
                ))
            })?;
        let due_date: DateTime<Utc> = row.try_get("due_date").map_err(|e| {
            CirculationError::Internal(format!("Failed to read due_date: {e}"))
        })?;
        let returned_at: Option<DateTime<Utc>> =
            row.try_get("returned_at").map_err(|e| {
                CirculationError::Internal(format!(
                    "Failed to read returned_at: {e}"
                ))
            })?;
        let penalty_amount: Decimal =
            row.try_get("penalty_amount").map_err(|e| {
                CirculationError::Internal(format!(
                    "Failed to read penalty_amount: {e}"
                ))
            })?;
        let penalty_outstanding: Decimal =
            row.try_get("penalty_outstanding").map_err(|e| {
                CirculationError::Internal(format!(
                    "Failed to read penalty_outstanding: {e}"
                ))
            })?;
        let penalty_status: String =
            row.try_get("penalty_status").map_err(|e| {
                CirculationError::Internal(format!(
                    "Failed to read penalty_status: {e}"
                ))
            })?;
        let penalty_type: Option<String> =
            row.try_get("penalty_type").map_err(|e| {
                CirculationError::Internal(format!(
                    "Failed to read penalty_type: {e}"
                ))
            })?;
        let overdue_notified_at: Option<DateTime<Utc>> =
            row.try_get("overdue_notified_at").map_err(|e| {
                CirculationError::Internal(format!(
                    "Failed to read overdue_notified_at: {e}"
                ))
            })?;

        Ok(BorrowRecord {
            id: BorrowId(id),
            title_id: TitleId(title_id),
            patron_id: PatronId(patron_id),
            status: BorrowStatus::parse(&status)?,
            borrowed_at,
            due_date,
            returned_at,
            penalty_amount,
            penalty_outstanding,
            penalty_status: PenaltyStatus::parse(&penalty_status)?,
            penalty_type: penalty_type
                .as_deref()
                .map(PenaltyType::parse)
                .transpose()?,
            overdue_notified_at,
        })
    }
}

#[async_trait]
impl BorrowsRepository for PostgresBorrowsRepository {
    async fn insert(&self, record: &BorrowRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO borrow_records (
                id,
                title_id,
                patron_id,
                status,
                borrowed_at,
                due_date,
                penalty_amount,
                penalty_outstanding,
                penalty_status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id.to_uuid())
        .bind(record.title_id.to_uuid())
        .bind(record.patron_id.to_uuid())
        .bind(record.status.as_str())
        .bind(record.borrowed_at)
        .bind(record.due_date)
        .bind(record.penalty_amount)
        .bind(record.penalty_outstanding)
        .bind(record.penalty_status.as_str())
        .execute(self.pool())
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                CirculationError::Conflict(format!(
                    "borrow record {} already exists",
                    record.id
                ))
            }
            _ => CirculationError::Internal(format!(
                "Failed to insert borrow record: {e}"
            )),
        })?;

        Ok(())
    }

    async fn get(&self, id: BorrowId) -> Result<Option<BorrowRecord>> {
        let row = sqlx::query(
            r#"
            SELECT
                id,
                title_id,
                patron_id,
                status,
                borrowed_at,
                due_date,
                returned_at,
                penalty_amount,
                penalty_outstanding,
                penalty_status,
                penalty_type,
                overdue_notified_at
            FROM borrow_records
            WHERE id = $1
            "#,
        )
        .bind(id.to_uuid())
        .fetch_optional(self.pool())
        .await
        .map_err(|e| {
            CirculationError::Internal(format!(
                "Failed to load borrow record: {e}"
            ))
        })?;

        row.map(|row| Self::map_row(&row)).transpose()
    }

    async fn remove(&self, id: BorrowId) -> Result<()> {
        sqlx::query("DELETE FROM borrow_records WHERE id = $1")
            .bind(id.to_uuid())
            .execute(self.pool())
            .await
            .map_err(|e| {
                CirculationError::Internal(format!(
                    "Failed to remove borrow record: {e}"
                ))
            })?;

        Ok(())
    }

    async fn list_open_for_patron(
        &self,
        patron_id: PatronId,
    ) -> Result<Vec<BorrowRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT
                id,
                title_id,
                patron_id,
                status,
                borrowed_at,
                due_date,
                returned_at,
                penalty_amount,
                penalty_outstanding,
                penalty_status,
                penalty_type,
                overdue_notified_at
            FROM borrow_records
            WHERE patron_id = $1
              AND returned_at IS NULL
            ORDER BY borrowed_at
            "#,
        )
        .bind(patron_id.to_uuid())
        .fetch_all(self.pool())
        .await
        .map_err(|e| {
            CirculationError::Internal(format!(
                "Failed to list open borrows: {e}"
            ))
        })?;

        rows.iter().map(Self::map_row).collect()
    }

    async fn count_open_for_title(&self, title_id: TitleId) -> Result<u32> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM borrow_records
            WHERE title_id = $1
              AND returned_at IS NULL
            "#,
        )
        .bind(title_id.to_uuid())
        .fetch_one(self.pool())
        .await
        .map_err(|e| {
            CirculationError::Internal(format!(
                "Failed to count open borrows: {e}"
            ))
        })?;

        Ok(count as u32)
    }

    async fn close(&self, id: BorrowId, outcome: &ReturnOutcome) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE borrow_records
            SET status = $2,
                returned_at = $3,
                penalty_amount = $4,
                penalty_outstanding = $4,
                penalty_status = $5,
                penalty_type = $6
            WHERE id = $1
              AND returned_at IS NULL
            "#,
        )
        .bind(id.to_uuid())
        .bind(outcome.status.as_str())
        .bind(outcome.returned_at)
        .bind(outcome.penalty_amount)
        .bind(outcome.penalty_status.as_str())
        .bind(outcome.penalty_type.map(|t| t.as_str()))
        .execute(self.pool())
        .await
        .map_err(|e| {
            CirculationError::Internal(format!(
                "Failed to close borrow record: {e}"
            ))
        })?;

        Ok(result.rows_affected() == 1)
    }

    async fn settle_penalty(&self, id: BorrowId, amount: Decimal) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE borrow_records
            SET penalty_outstanding = penalty_outstanding - $2,
                penalty_status = CASE
                    WHEN penalty_outstanding - $2 = 0 THEN 'PAID'
                    ELSE penalty_status
                END
            WHERE id = $1
              AND penalty_status = 'PENDING'
              AND $2 > 0
              AND penalty_outstanding >= $2
            "#,
        )
        .bind(id.to_uuid())
        .bind(amount)
        .execute(self.pool())
        .await
        .map_err(|e| {
            CirculationError::Internal(format!(
                "Failed to settle penalty: {e}"
            ))
        })?;

        Ok(result.rows_affected() == 1)
    }

    async fn waive_penalty(&self, id: BorrowId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE borrow_records
            SET penalty_status = 'WAIVED',
                penalty_outstanding = 0
            WHERE id = $1
            "#,
        )
        .bind(id.to_uuid())
        .execute(self.pool())
        .await
        .map_err(|e| {
            CirculationError::Internal(format!(
                "Failed to waive penalty: {e}"
            ))
        })?;

        Ok(result.rows_affected() == 1)
    }

    async fn return_history(&self, patron_id: PatronId) -> Result<ReturnHistory> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS total
            FROM borrow_records
            WHERE patron_id = $1
              AND returned_at IS NOT NULL
            GROUP BY status
            "#,
        )
        .bind(patron_id.to_uuid())
        .fetch_all(self.pool())
        .await
        .map_err(|e| {
            CirculationError::Internal(format!(
                "Failed to load return history: {e}"
            ))
        })?;

        let mut history = ReturnHistory::default();
        for row in &rows {
            let status: String = row.try_get("status").map_err(|e| {
                CirculationError::Internal(format!(
                    "Failed to read status: {e}"
                ))
            })?;
            let total: i64 = row.try_get("total").map_err(|e| {
                CirculationError::Internal(format!(
                    "Failed to read status count: {e}"
                ))
            })?;
            match BorrowStatus::parse(&status)? {
                BorrowStatus::LateReturned => {
                    history.late_returns += total as u32
                }
                BorrowStatus::Damaged => history.damaged_returns += total as u32,
                BorrowStatus::Lost => history.lost_returns += total as u32,
                BorrowStatus::Borrowed | BorrowStatus::Returned => {}
            }
        }

        Ok(history)
    }

    async fn list_overdue(
        &self,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<BorrowRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT
                id,
                title_id,
                patron_id,
                status,
                borrowed_at,
                due_date,
                returned_at,
                penalty_amount,
                penalty_outstanding,
                penalty_status,
                penalty_type,
                overdue_notified_at
            FROM borrow_records
            WHERE returned_at IS NULL
              AND due_date < $1
            ORDER BY due_date
            "#,
        )
        .bind(as_of)
        .fetch_all(self.pool())
        .await
        .map_err(|e| {
            CirculationError::Internal(format!(
                "Failed to list overdue borrows: {e}"
            ))
        })?;

        rows.iter().map(Self::map_row).collect()
    }

    async fn list_overdue_unnotified(
        &self,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<BorrowRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT
                id,
                title_id,
                patron_id,
                status,
                borrowed_at,
                due_date,
                returned_at,
                penalty_amount,
                penalty_outstanding,
                penalty_status,
                penalty_type,
                overdue_notified_at
            FROM borrow_records
            WHERE returned_at IS NULL
              AND due_date < $1
              AND overdue_notified_at IS NULL
            ORDER BY due_date
            "#,
        )
        .bind(as_of)
        .fetch_all(self.pool())
        .await
        .map_err(|e| {
            CirculationError::Internal(format!(
                "Failed to list overdue borrows: {e}"
            ))
        })?;

        rows.iter().map(Self::map_row).collect()
    }

    async fn mark_overdue_notified(
        &self,
        id: BorrowId,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE borrow_records
            SET overdue_notified_at = $2
            WHERE id = $1
              AND returned_at IS NULL
              AND overdue_notified_at IS NULL
            "#,
        )
        .bind(id.to_uuid())
        .bind(at)
        .execute(self.pool())
        .await
        .map_err(|e| {
            CirculationError::Internal(format!(
                "Failed to mark overdue notice: {e}"
            ))
        })?;

        Ok(result.rows_affected() == 1)
    }
}
