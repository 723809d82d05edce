//! In-memory adapter backed by concurrent maps.
//!
//! Implements the same repository ports as the Postgres adapter with
//! the same conditional-update semantics, which makes it suitable for
//! tests and for embedded deployments that do not need durability.

mod borrows;
mod requests;
mod titles;
mod waitlist;

use std::sync::Arc;

use dashmap::DashMap;
use folio_model::{
    BorrowId, BorrowRecord, BorrowRequest, PatronId, RequestId, Title,
    TitleId, WaitlistEntry,
};

pub use borrows::InMemoryBorrowsRepository;
pub use requests::InMemoryRequestsRepository;
pub use titles::InMemoryTitlesRepository;
pub use waitlist::InMemoryWaitlistRepository;

/// Shared stores handed out to the per-aggregate repositories.
///
/// Cloning is cheap and every clone sees the same data, mirroring how
/// the Postgres repositories share one pool.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDatabase {
    titles: Arc<DashMap<TitleId, Title>>,
    requests: Arc<DashMap<RequestId, BorrowRequest>>,
    // Pending-pair index standing in for the Postgres partial unique
    // index; its entry lock serializes inserts for one pair.
    pending_pairs: Arc<DashMap<(PatronId, TitleId), RequestId>>,
    borrows: Arc<DashMap<BorrowId, BorrowRecord>>,
    waitlist: Arc<DashMap<(TitleId, PatronId), WaitlistEntry>>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn titles_repository(&self) -> InMemoryTitlesRepository {
        InMemoryTitlesRepository::new(self.titles.clone())
    }

    pub fn requests_repository(&self) -> InMemoryRequestsRepository {
        InMemoryRequestsRepository::new(
            self.requests.clone(),
            self.pending_pairs.clone(),
            self.borrows.clone(),
        )
    }

    pub fn borrows_repository(&self) -> InMemoryBorrowsRepository {
        InMemoryBorrowsRepository::new(self.borrows.clone())
    }

    pub fn waitlist_repository(&self) -> InMemoryWaitlistRepository {
        InMemoryWaitlistRepository::new(self.waitlist.clone())
    }
}
