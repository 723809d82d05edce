use async_trait::async_trait;
use chrono::{DateTime, Utc};
use folio_model::{
    PatronId, ScoreBreakdown, TitleId, WaitlistEntry, WaitlistEntryId,
};

use crate::error::Result;

// Waitlist entries. One row per (title, patron) pair for its whole
// lifetime; activity is a flag, not row existence.
#[async_trait]
pub trait WaitlistRepository: Send + Sync {
    /// Inserts a brand-new entry. Errors with `Conflict` when the pair
    /// already has a row (active or not).
    async fn insert(&self, entry: &WaitlistEntry) -> Result<()>;
    async fn find(
        &self,
        patron_id: PatronId,
        title_id: TitleId,
    ) -> Result<Option<WaitlistEntry>>;
    /// Active entries for a title, highest priority first, FIFO on
    /// ties.
    async fn list_active_for_title(&self, title_id: TitleId) -> Result<Vec<WaitlistEntry>>;
    async fn titles_with_active_entries(&self) -> Result<Vec<TitleId>>;

    // Activity transitions are conditional so that racing joins,
    // leaves, and allocations cannot resurrect or double-claim a row.
    /// Re-activates an inactive row with a fresh `joined_at` and a
    /// cleared ranking. `Ok(false)` when the row is already active.
    async fn reactivate(
        &self,
        id: WaitlistEntryId,
        joined_at: DateTime<Utc>,
    ) -> Result<bool>;
    /// Deactivates an active row. `Ok(false)` when already inactive.
    async fn deactivate(&self, id: WaitlistEntryId) -> Result<bool>;

    /// Writes the computed ranking onto a still-active row. A row that
    /// went inactive in the meantime is left untouched.
    async fn update_ranking(
        &self,
        id: WaitlistEntryId,
        score: f64,
        breakdown: ScoreBreakdown,
        waiting_days: i64,
        position: u32,
    ) -> Result<()>;

    /// Atomically deactivates and returns the highest-priority active
    /// entry for the title, by stored ranking. `Ok(None)` when nobody
    /// is waiting. Concurrent calls each claim a distinct entry.
    async fn pop_top(&self, title_id: TitleId) -> Result<Option<WaitlistEntry>>;
}
