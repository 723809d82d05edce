use async_trait::async_trait;
use chrono::{DateTime, Utc};
use folio_model::{Title, TitleId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::database::ports::titles::TitlesRepository;
use crate::error::{CirculationError, Result};

#[derive(Debug, Clone)]
pub struct PostgresTitlesRepository {
    pool: PgPool,
}

impl PostgresTitlesRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn map_row(row: &PgRow) -> Result<Title> {
        let id: Uuid = row.try_get("id").map_err(|e| {
            CirculationError::Internal(format!("Failed to read title id: {e}"))
        })?;
        let name: String = row.try_get("name").map_err(|e| {
            CirculationError::Internal(format!("Failed to read title name: {e}"))
        })?;
        let total: i32 = row.try_get("total").map_err(|e| {
            CirculationError::Internal(format!("Failed to read total: {e}"))
        })?;
        let available: i32 = row.try_get("available").map_err(|e| {
            CirculationError::Internal(format!("Failed to read available: {e}"))
        })?;
        let issued: i32 = row.try_get("issued").map_err(|e| {
            CirculationError::Internal(format!("Failed to read issued: {e}"))
        })?;
        let created_at: DateTime<Utc> = row.try_get("created_at").map_err(|e| {
            CirculationError::Internal(format!("Failed to read created_at: {e}"))
        })?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(|e| {
            CirculationError::Internal(format!("Failed to read updated_at: {e}"))
        })?;

        Ok(Title {
            id: TitleId(id),
            name,
            total,
            available,
            issued,
            created_at,
            updated_at,
        })
    }
}

#[async_trait]
impl TitlesRepository for PostgresTitlesRepository {
    async fn insert(&self, title: &Title) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO titles (id, name, total, available, issued, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(title.id.to_uuid())
        .bind(&title.name)
        .bind(title.total)
        .bind(title.available)
        .bind(title.issued)
        .bind(title.created_at)
        .bind(title.updated_at)
        .execute(self.pool())
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                CirculationError::Conflict(format!(
                    "title {} already exists",
                    title.id
                ))
            }
            _ => CirculationError::Internal(format!(
                "Failed to insert title: {e}"
            )),
        })?;

        Ok(())
    }

    async fn get(&self, id: TitleId) -> Result<Option<Title>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, total, available, issued, created_at, updated_at
            FROM titles
            WHERE id = $1
            "#,
        )
        .bind(id.to_uuid())
        .fetch_optional(self.pool())
        .await
        .map_err(|e| {
            CirculationError::Internal(format!("Failed to load title: {e}"))
        })?;

        row.map(|row| Self::map_row(&row)).transpose()
    }

    async fn list(&self) -> Result<Vec<Title>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, total, available, issued, created_at, updated_at
            FROM titles
            ORDER BY created_at
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(|e| {
            CirculationError::Internal(format!("Failed to list titles: {e}"))
        })?;

        rows.iter().map(Self::map_row).collect()
    }

    async fn reserve(&self, id: TitleId) -> Result<bool> {
        // One conditional update; the WHERE clause is the stock check.
        let result = sqlx::query(
            r#"
            UPDATE titles
            SET available = available - 1,
                issued = issued + 1,
                updated_at = now()
            WHERE id = $1
              AND available > 0
            "#,
        )
        .bind(id.to_uuid())
        .execute(self.pool())
        .await
        .map_err(|e| {
            CirculationError::Internal(format!("Failed to reserve copy: {e}"))
        })?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        // Nothing moved: either the title is out of stock or unknown.
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM titles WHERE id = $1)",
        )
        .bind(id.to_uuid())
        .fetch_one(self.pool())
        .await
        .map_err(|e| {
            CirculationError::Internal(format!("Failed to check title: {e}"))
        })?;

        if exists {
            Ok(false)
        } else {
            Err(CirculationError::NotFound(format!("title {id}")))
        }
    }

    async fn release(&self, id: TitleId) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE titles
            SET available = LEAST(available + 1, total),
                issued = GREATEST(issued - 1, 0),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id.to_uuid())
        .execute(self.pool())
        .await
        .map_err(|e| {
            CirculationError::Internal(format!("Failed to release copy: {e}"))
        })?;

        if result.rows_affected() == 0 {
            return Err(CirculationError::NotFound(format!("title {id}")));
        }

        Ok(())
    }

    async fn adjust_total(&self, id: TitleId, new_total: i32) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE titles
            SET total = $2,
                available = $2 - issued,
                updated_at = now()
            WHERE id = $1
              AND issued <= $2
            "#,
        )
        .bind(id.to_uuid())
        .bind(new_total)
        .execute(self.pool())
        .await
        .map_err(|e| {
            CirculationError::Internal(format!(
                "Failed to adjust title stock: {e}"
            ))
        })?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM titles WHERE id = $1)",
        )
        .bind(id.to_uuid())
        .fetch_one(self.pool())
        .await
        .map_err(|e| {
            CirculationError::Internal(format!("Failed to check title: {e}"))
        })?;

        if exists {
            Ok(false)
        } else {
            Err(CirculationError::NotFound(format!("title {id}")))
        }
    }

    async fn reconcile_issued(
        &self,
        id: TitleId,
        expected: i32,
        open: i32,
    ) -> Result<bool> {
        // The CAS on the stored `issued` means any counter movement
        // since `expected` was read turns this into a no-op.
        let result = sqlx::query(
            r#"
            UPDATE titles
            SET issued = $3,
                available = total - $3,
                updated_at = now()
            WHERE id = $1
              AND issued = $2
              AND issued <> $3
              AND $3 BETWEEN 0 AND total
            "#,
        )
        .bind(id.to_uuid())
        .bind(expected)
        .bind(open)
        .execute(self.pool())
        .await
        .map_err(|e| {
            CirculationError::Internal(format!(
                "Failed to reconcile title stock: {e}"
            ))
        })?;

        Ok(result.rows_affected() == 1)
    }
}
