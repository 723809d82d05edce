use async_trait::async_trait;
use chrono::{DateTime, Utc};
use folio_model::{
    PatronId, ScoreBreakdown, TitleId, WaitlistEntry, WaitlistEntryId,
};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::database::ports::waitlist::WaitlistRepository;
use crate::error::{CirculationError, Result};

#[derive(Debug, Clone)]
pub struct PostgresWaitlistRepository {
    pool: PgPool,
}

impl PostgresWaitlistRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn map_row(row: &PgRow) -> Result<WaitlistEntry> {
        let id: Uuid = row.try_get("id").map_err(|e| {
            CirculationError::Internal(format!("Failed to read entry id: {e}"))
        })?;
        let title_id: Uuid = row.try_get("title_id").map_err(|e| {
            CirculationError::Internal(format!("Failed to read title_id: {e}"))
        })?;
        let patron_id: Uuid = row.try_get("patron_id").map_err(|e| {
            CirculationError::Internal(format!("Failed to read patron_id: {e}"))
        })?;
        let joined_at: DateTime<Utc> = row.try_get("joined_at").map_err(|e| {
            CirculationError::Internal(format!("Failed to read joined_at: {e}"))
        })?;
        let is_active: bool = row.try_get("is_active").map_err(|e| {
            CirculationError::Internal(format!("Failed to read is_active: {e}"))
        })?;
        let priority_score: f64 =
            row.try_get("priority_score").map_err(|e| {
                CirculationError::Internal(format!(
                    "Failed to read priority_score: {e}"
                ))
            })?;
        let waiting: f64 = row.try_get("waiting_component").map_err(|e| {
            CirculationError::Internal(format!(
                "Failed to read waiting_component: {e}"
            ))
        })?;
        let membership_bonus: f64 =
            row.try_get("membership_bonus").map_err(|e| {
                CirculationError::Internal(format!(
                    "Failed to read membership_bonus: {e}"
                ))
            })?;
        let history_penalty: f64 =
            row.try_get("history_penalty").map_err(|e| {
                CirculationError::Internal(format!(
                    "Failed to read history_penalty: {e}"
                ))
            })?;
        let queue_position: i32 =
            row.try_get("queue_position").map_err(|e| {
                CirculationError::Internal(format!(
                    "Failed to read queue_position: {e}"
                ))
            })?;
        let waiting_days: i64 = row.try_get("waiting_days").map_err(|e| {
            CirculationError::Internal(format!(
                "Failed to read waiting_days: {e}"
            ))
        })?;

        Ok(WaitlistEntry {
            id: WaitlistEntryId(id),
            title_id: TitleId(title_id),
            patron_id: PatronId(patron_id),
            joined_at,
            is_active,
            priority_score,
            breakdown: ScoreBreakdown {
                waiting,
                membership_bonus,
                history_penalty,
            },
            queue_position: queue_position as u32,
            waiting_days,
        })
    }
}

#[async_trait]
impl WaitlistRepository for PostgresWaitlistRepository {
    async fn insert(&self, entry: &WaitlistEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO waitlist_entries (
                id,
                title_id,
                patron_id,
                joined_at,
                is_active,
                priority_score,
                waiting_component,
                membership_bonus,
                history_penalty,
                queue_position,
                waiting_days
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(entry.id.to_uuid())
        .bind(entry.title_id.to_uuid())
        .bind(entry.patron_id.to_uuid())
        .bind(entry.joined_at)
        .bind(entry.is_active)
        .bind(entry.priority_score)
        .bind(entry.breakdown.waiting)
        .bind(entry.breakdown.membership_bonus)
        .bind(entry.breakdown.history_penalty)
        .bind(entry.queue_position as i32)
        .bind(entry.waiting_days)
        .execute(self.pool())
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                CirculationError::Conflict(format!(
                    "waitlist entry for title {} and patron {} already exists",
                    entry.title_id, entry.patron_id
                ))
            }
            _ => CirculationError::Internal(format!(
                "Failed to insert waitlist entry: {e}"
            )),
        })?;

        Ok(())
    }

    async fn find(
        &self,
        patron_id: PatronId,
        title_id: TitleId,
    ) -> Result<Option<WaitlistEntry>> {
        let row = sqlx::query(
            r#"
            SELECT
                id,
                title_id,
                patron_id,
                joined_at,
                is_active,
                priority_score,
                waiting_component,
                membership_bonus,
                history_penalty,
                queue_position,
                waiting_days
            FROM waitlist_entries
            WHERE patron_id = $1
              AND title_id = $2
            "#,
        )
        .bind(patron_id.to_uuid())
        .bind(title_id.to_uuid())
        .fetch_optional(self.pool())
        .await
        .map_err(|e| {
            CirculationError::Internal(format!(
                "Failed to load waitlist entry: {e}"
            ))
        })?;

        row.map(|row| Self::map_row(&row)).transpose()
    }

    async fn list_active_for_title(
        &self,
        title_id: TitleId,
    ) -> Result<Vec<WaitlistEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT
                id,
                title_id,
                patron_id,
                joined_at,
                is_active,
                priority_score,
                waiting_component,
                membership_bonus,
                history_penalty,
                queue_position,
                waiting_days
            FROM waitlist_entries
            WHERE title_id = $1
              AND is_active
            ORDER BY priority_score DESC, joined_at ASC
            "#,
        )
        .bind(title_id.to_uuid())
        .fetch_all(self.pool())
        .await
        .map_err(|e| {
            CirculationError::Internal(format!(
                "Failed to list active waitlist entries: {e}"
            ))
        })?;

        rows.iter().map(Self::map_row).collect()
    }

    async fn titles_with_active_entries(&self) -> Result<Vec<TitleId>> {
        let rows: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT title_id
            FROM waitlist_entries
            WHERE is_active
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(|e| {
            CirculationError::Internal(format!(
                "Failed to list waitlisted titles: {e}"
            ))
        })?;

        Ok(rows.into_iter().map(TitleId).collect())
    }

    async fn reactivate(
        &self,
        id: WaitlistEntryId,
        joined_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE waitlist_entries
            SET is_active = TRUE,
                joined_at = $2,
                priority_score = 0,
                waiting_component = 0,
                membership_bonus = 0,
                history_penalty = 0,
                queue_position = 0,
                waiting_days = 0
            WHERE id = $1
              AND NOT is_active
            "#,
        )
        .bind(id.to_uuid())
        .bind(joined_at)
        .execute(self.pool())
        .await
        .map_err(|e| {
            CirculationError::Internal(format!(
                "Failed to reactivate waitlist entry: {e}"
            ))
        })?;

        Ok(result.rows_affected() == 1)
    }

    async fn deactivate(&self, id: WaitlistEntryId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE waitlist_entries
            SET is_active = FALSE,
                queue_position = 0
            WHERE id = $1
              AND is_active
            "#,
        )
        .bind(id.to_uuid())
        .execute(self.pool())
        .await
        .map_err(|e| {
            CirculationError::Internal(format!(
                "Failed to deactivate waitlist entry: {e}"
            ))
        })?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_ranking(
        &self,
        id: WaitlistEntryId,
        score: f64,
        breakdown: ScoreBreakdown,
        waiting_days: i64,
        position: u32,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE waitlist_entries
            SET priority_score = $2,
                waiting_component = $3,
                membership_bonus = $4,
                history_penalty = $5,
                waiting_days = $6,
                queue_position = $7
            WHERE id = $1
              AND is_active
            "#,
        )
        .bind(id.to_uuid())
        .bind(score)
        .bind(breakdown.waiting)
        .bind(breakdown.membership_bonus)
        .bind(breakdown.history_penalty)
        .bind(waiting_days)
        .bind(position as i32)
        .execute(self.pool())
        .await
        .map_err(|e| {
            CirculationError::Internal(format!(
                "Failed to update waitlist ranking: {e}"
            ))
        })?;

        Ok(())
    }

    async fn pop_top(&self, title_id: TitleId) -> Result<Option<WaitlistEntry>> {
        // SKIP LOCKED keeps concurrent allocators from claiming the same
        // row; each one locks and flips a distinct candidate.
        let row = sqlx::query(
            r#"
            UPDATE waitlist_entries
            SET is_active = FALSE,
                queue_position = 0
            WHERE id = (
                SELECT id
                FROM waitlist_entries
                WHERE title_id = $1
                  AND is_active
                ORDER BY priority_score DESC, joined_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING
                id,
                title_id,
                patron_id,
                joined_at,
                is_active,
                priority_score,
                waiting_component,
                membership_bonus,
                history_penalty,
                queue_position,
                waiting_days
            "#,
        )
        .bind(title_id.to_uuid())
        .fetch_optional(self.pool())
        .await
        .map_err(|e| {
            CirculationError::Internal(format!(
                "Failed to pop waitlist entry: {e}"
            ))
        })?;

        row.map(|row| Self::map_row(&row)).transpose()
    }
}
