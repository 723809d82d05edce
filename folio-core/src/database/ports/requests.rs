use async_trait::async_trait;
use chrono::{DateTime, Utc};
use folio_model::{BorrowId, BorrowRequest, PatronId, RequestId, StaffId, TitleId};

use crate::error::Result;

// Borrow-request rows and the guards request intake runs against them.
#[async_trait]
pub trait RequestsRepository: Send + Sync {
    /// Inserts a new request. Errors with `Conflict` when the patron
    /// already has a PENDING request for the title.
    async fn insert(&self, request: &BorrowRequest) -> Result<()>;
    async fn get(&self, id: RequestId) -> Result<Option<BorrowRequest>>;
    async fn list_pending(&self) -> Result<Vec<BorrowRequest>>;
    async fn list_for_patron(&self, patron_id: PatronId) -> Result<Vec<BorrowRequest>>;

    // Intake guards
    /// True when the pair already has a PENDING request or an open
    /// borrow. Used to block duplicate interest in one title.
    async fn has_open_interest(
        &self,
        patron_id: PatronId,
        title_id: TitleId,
    ) -> Result<bool>;
    /// Requests of any status the patron filed in `[from, until)`.
    async fn count_in_window(
        &self,
        patron_id: PatronId,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<u32>;

    // Terminal transitions, conditional on the row still being PENDING.
    // `Ok(false)` means no PENDING row matched.
    async fn mark_approved(
        &self,
        id: RequestId,
        borrow_id: BorrowId,
        staff_id: StaffId,
        at: DateTime<Utc>,
    ) -> Result<bool>;
    async fn mark_rejected(
        &self,
        id: RequestId,
        staff_id: StaffId,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<bool>;
}
