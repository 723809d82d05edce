use async_trait::async_trait;
use chrono::{DateTime, Utc};
use folio_model::{
    BorrowId, BorrowRecord, BorrowStatus, PatronId, PenaltyStatus, PenaltyType,
    ReturnHistory, TitleId,
};
use rust_decimal::Decimal;

use crate::error::Result;

/// Storage write applied when a loan is closed.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnOutcome {
    pub status: BorrowStatus,
    pub returned_at: DateTime<Utc>,
    pub penalty_amount: Decimal,
    pub penalty_status: PenaltyStatus,
    pub penalty_type: Option<PenaltyType>,
}

// Borrow records (leases) and their penalty ledger.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BorrowsRepository: Send + Sync {
    async fn insert(&self, record: &BorrowRecord) -> Result<()>;
    async fn get(&self, id: BorrowId) -> Result<Option<BorrowRecord>>;
    /// Removes a record outright. Only the approval rollback path uses
    /// this; returned loans are closed, never deleted.
    async fn remove(&self, id: BorrowId) -> Result<()>;
    async fn list_open_for_patron(&self, patron_id: PatronId) -> Result<Vec<BorrowRecord>>;
    /// Open loans against one title; the ground truth its ledger
    /// counters are reconciled against.
    async fn count_open_for_title(&self, title_id: TitleId) -> Result<u32>;

    /// Closes an open record. `Ok(false)` when it was already closed.
    async fn close(&self, id: BorrowId, outcome: &ReturnOutcome) -> Result<bool>;

    // Penalty settlement. Both are conditional single updates so that
    // concurrent payments cannot overdraw the outstanding amount.
    /// Draws `amount` from the outstanding penalty; flips the status to
    /// PAID when it reaches zero. `Ok(false)` when the penalty is not
    /// payable (not PENDING, or amount exceeds what is owed).
    async fn settle_penalty(&self, id: BorrowId, amount: Decimal) -> Result<bool>;
    /// Unconditionally waives the penalty. `Ok(false)` for unknown ids.
    async fn waive_penalty(&self, id: BorrowId) -> Result<bool>;

    /// Closed-loan aggregate feeding waitlist scoring.
    async fn return_history(&self, patron_id: PatronId) -> Result<ReturnHistory>;

    /// All open records past due, reminded or not.
    async fn list_overdue(
        &self,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<BorrowRecord>>;

    // Overdue sweep
    async fn list_overdue_unnotified(
        &self,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<BorrowRecord>>;
    /// Stamps the record so later sweeps skip it. `Ok(false)` when a
    /// concurrent sweep already stamped it.
    async fn mark_overdue_notified(
        &self,
        id: BorrowId,
        at: DateTime<Utc>,
    ) -> Result<bool>;
}
