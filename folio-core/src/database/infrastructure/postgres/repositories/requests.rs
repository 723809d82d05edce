use async_trait::async_trait;
use chrono::{DateTime, Utc};
use folio_model::{
    BorrowId, BorrowRequest, PatronId, RequestId, RequestStatus, StaffId,
    TitleId,
};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::database::ports::requests::RequestsRepository;
use crate::error::{CirculationError, Result};

#[derive(Debug, Clone)]
pub struct PostgresRequestsRepository {
    pool: PgPool,
}

impl PostgresRequestsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn map_row(row: &PgRow) -> Result<BorrowRequest> {
        let id: Uuid = row.try_get("id").map_err(|e| {
            CirculationError::Internal(format!("Failed to read request id: {e}"))
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
        let requested_at: DateTime<Utc> =
            row.try_get("requested_at").map_err(|e| {
                CirculationError::Internal(format!(
                    "Failed to read requested_at: {e}"
                ))
            })?;
        let issued_record_id: Option<Uuid> =
            row.try_get("issued_record_id").map_err(|e| {
                CirculationError::Internal(format!(
                    "Failed to read issued_record_id: {e}"
                ))
            })?;
        let reason: Option<String> = row.try_get("reason").map_err(|e| {
            CirculationError::Internal(format!("Failed to read reason: {e}"))
        })?;
        let processed_by: Option<Uuid> =
            row.try_get("processed_by").map_err(|e| {
                CirculationError::Internal(format!(
                    "Failed to read processed_by: {e}"
                ))
            })?;
        let processed_at: Option<DateTime<Utc>> =
            row.try_get("processed_at").map_err(|e| {
                CirculationError::Internal(format!(
                    "Failed to read processed_at: {e}"
                ))
            })?;

        Ok(BorrowRequest {
            id: RequestId(id),
            title_id: TitleId(title_id),
            patron_id: PatronId(patron_id),
            status: RequestStatus::parse(&status)?,
            requested_at,
            issued_record_id: issued_record_id.map(BorrowId),
            reason,
            processed_by: processed_by.map(StaffId),
            processed_at,
        })
    }
}

#[async_trait]
impl RequestsRepository for PostgresRequestsRepository {
    async fn insert(&self, request: &BorrowRequest) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO borrow_requests (id, title_id, patron_id, status, requested_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(request.id.to_uuid())
        .bind(request.title_id.to_uuid())
        .bind(request.patron_id.to_uuid())
        .bind(request.status.as_str())
        .bind(request.requested_at)
        .execute(self.pool())
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                CirculationError::Conflict(format!(
                    "request {} already exists",
                    request.id
                ))
            }
            _ => CirculationError::Internal(format!(
                "Failed to insert request: {e}"
            )),
        })?;

        Ok(())
    }

    async fn get(&self, id: RequestId) -> Result<Option<BorrowRequest>> {
        let row = sqlx::query(
            r#"
            SELECT
                id,
                title_id,
                patron_id,
                status,
                requested_at,
                issued_record_id,
                reason,
                processed_by,
                processed_at
            FROM borrow_requests
            WHERE id = $1
            "#,
        )
        .bind(id.to_uuid())
        .fetch_optional(self.pool())
        .await
        .map_err(|e| {
            CirculationError::Internal(format!("Failed to load request: {e}"))
        })?;

        row.map(|row| Self::map_row(&row)).transpose()
    }

    async fn list_pending(&self) -> Result<Vec<BorrowRequest>> {
        let rows = sqlx::query(
            r#"
            SELECT
                id,
                title_id,
                patron_id,
                status,
                requested_at,
                issued_record_id,
                reason,
                processed_by,
                processed_at
            FROM borrow_requests
            WHERE status = 'PENDING'
            ORDER BY requested_at
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(|e| {
            CirculationError::Internal(format!(
                "Failed to list pending requests: {e}"
            ))
        })?;

        rows.iter().map(Self::map_row).collect()
    }

    async fn list_for_patron(
        &self,
        patron_id: PatronId,
    ) -> Result<Vec<BorrowRequest>> {
        let rows = sqlx::query(
            r#"
            SELECT
                id,
                title_id,
                patron_id,
                status,
                requested_at,
                issued_record_id,
                reason,
                processed_by,
                processed_at
            FROM borrow_requests
            WHERE patron_id = $1
            ORDER BY requested_at
            "#,
        )
        .bind(patron_id.to_uuid())
        .fetch_all(self.pool())
        .await
        .map_err(|e| {
            CirculationError::Internal(format!(
                "Failed to list patron requests: {e}"
            ))
        })?;

        rows.iter().map(Self::map_row).collect()
    }

    async fn has_open_interest(
        &self,
        patron_id: PatronId,
        title_id: TitleId,
    ) -> Result<bool> {
        let open: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM borrow_requests
                WHERE patron_id = $1 AND title_id = $2 AND status = 'PENDING'
            ) OR EXISTS(
                SELECT 1 FROM borrow_records
                WHERE patron_id = $1 AND title_id = $2 AND returned_at IS NULL
            )
            "#,
        )
        .bind(patron_id.to_uuid())
        .bind(title_id.to_uuid())
        .fetch_one(self.pool())
        .await
        .map_err(|e| {
            CirculationError::Internal(format!(
                "Failed to check open interest: {e}"
            ))
        })?;

        Ok(open)
    }

    async fn count_in_window(
        &self,
        patron_id: PatronId,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<u32> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM borrow_requests
            WHERE patron_id = $1
              AND requested_at >= $2
              AND requested_at < $3
            "#,
        )
        .bind(patron_id.to_uuid())
        .bind(from)
        .bind(until)
        .fetch_one(self.pool())
        .await
        .map_err(|e| {
            CirculationError::Internal(format!(
                "Failed to count requests: {e}"
            ))
        })?;

        Ok(count as u32)
    }

    async fn mark_approved(
        &self,
        id: RequestId,
        borrow_id: BorrowId,
        staff_id: StaffId,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE borrow_requests
            SET status = 'APPROVED',
                issued_record_id = $2,
                processed_by = $3,
                processed_at = $4
            WHERE id = $1
              AND status = 'PENDING'
            "#,
        )
        .bind(id.to_uuid())
        .bind(borrow_id.to_uuid())
        .bind(staff_id.to_uuid())
        .bind(at)
        .execute(self.pool())
        .await
        .map_err(|e| {
            CirculationError::Internal(format!(
                "Failed to approve request: {e}"
            ))
        })?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_rejected(
        &self,
        id: RequestId,
        staff_id: StaffId,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE borrow_requests
            SET status = 'REJECTED',
                reason = $2,
                processed_by = $3,
                processed_at = $4
            WHERE id = $1
              AND status = 'PENDING'
            "#,
        )
        .bind(id.to_uuid())
        .bind(reason)
        .bind(staff_id.to_uuid())
        .bind(at)
        .execute(self.pool())
        .await
        .map_err(|e| {
            CirculationError::Internal(format!(
                "Failed to reject request: {e}"
            ))
        })?;

        Ok(result.rows_affected() == 1)
    }
}
