use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use folio_model::{
    BorrowId, BorrowRecord, BorrowRequest, PatronId, RequestId, RequestStatus,
    StaffId, TitleId,
};

use crate::database::ports::requests::RequestsRepository;
use crate::error::{CirculationError, Result};

#[derive(Debug, Clone)]
pub struct InMemoryRequestsRepository {
    requests: Arc<DashMap<RequestId, BorrowRequest>>,
    // One slot per (patron, title) pair with a pending request. Insert
    // claims the slot under its entry lock; approval and rejection
    // vacate it.
    pending_pairs: Arc<DashMap<(PatronId, TitleId), RequestId>>,
    // Needed by the open-interest guard, which spans both aggregates.
    borrows: Arc<DashMap<BorrowId, BorrowRecord>>,
}

impl InMemoryRequestsRepository {
    pub fn new(
        requests: Arc<DashMap<RequestId, BorrowRequest>>,
        pending_pairs: Arc<DashMap<(PatronId, TitleId), RequestId>>,
        borrows: Arc<DashMap<BorrowId, BorrowRecord>>,
    ) -> Self {
        Self {
            requests,
            pending_pairs,
            borrows,
        }
    }
}

#[async_trait]
impl RequestsRepository for InMemoryRequestsRepository {
    async fn insert(&self, request: &BorrowRequest) -> Result<()> {
        // Same guard the Postgres backend gets from its partial unique
        // index on (patron, title) WHERE status = PENDING. The pair
        // slot's entry lock is held across the check and the insert, so
        // two racing inserts for one pair cannot both pass.
        let pair = (request.patron_id, request.title_id);
        let slot = match self.pending_pairs.entry(pair) {
            Entry::Occupied(_) => {
                return Err(CirculationError::Conflict(format!(
                    "patron {} already has a pending request for title {}",
                    request.patron_id, request.title_id
                )));
            }
            Entry::Vacant(slot) => slot,
        };

        match self.requests.entry(request.id) {
            Entry::Occupied(_) => Err(CirculationError::Conflict(format!(
                "request {} already exists",
                request.id
            ))),
            Entry::Vacant(row) => {
                row.insert(request.clone());
                slot.insert(request.id);
                Ok(())
            }
        }
    }

    async fn get(&self, id: RequestId) -> Result<Option<BorrowRequest>> {
        Ok(self.requests.get(&id).map(|request| request.clone()))
    }

    async fn list_pending(&self) -> Result<Vec<BorrowRequest>> {
        let mut pending: Vec<BorrowRequest> = self
            .requests
            .iter()
            .filter(|entry| entry.status == RequestStatus::Pending)
            .map(|entry| entry.clone())
            .collect();
        pending.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));
        Ok(pending)
    }

    async fn list_for_patron(
        &self,
        patron_id: PatronId,
    ) -> Result<Vec<BorrowRequest>> {
        let mut requests: Vec<BorrowRequest> = self
            .requests
            .iter()
            .filter(|entry| entry.patron_id == patron_id)
            .map(|entry| entry.clone())
            .collect();
        requests.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));
        Ok(requests)
    }

    async fn has_open_interest(
        &self,
        patron_id: PatronId,
        title_id: TitleId,
    ) -> Result<bool> {
        let pending = self.requests.iter().any(|entry| {
            entry.patron_id == patron_id
                && entry.title_id == title_id
                && entry.status == RequestStatus::Pending
        });
        if pending {
            return Ok(true);
        }

        Ok(self.borrows.iter().any(|record| {
            record.patron_id == patron_id
                && record.title_id == title_id
                && record.returned_at.is_none()
        }))
    }

    async fn count_in_window(
        &self,
        patron_id: PatronId,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<u32> {
        let count = self
            .requests
            .iter()
            .filter(|entry| {
                entry.patron_id == patron_id
                    && entry.requested_at >= from
                    && entry.requested_at < until
            })
            .count();
        Ok(count as u32)
    }

    async fn mark_approved(
        &self,
        id: RequestId,
        borrow_id: BorrowId,
        staff_id: StaffId,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        // The row guard is released before the pair slot is vacated;
        // insert takes the two locks in the opposite order.
        let pair = match self.requests.get_mut(&id) {
            Some(mut request)
                if request.status == RequestStatus::Pending =>
            {
                request.status = RequestStatus::Approved;
                request.issued_record_id = Some(borrow_id);
                request.processed_by = Some(staff_id);
                request.processed_at = Some(at);
                (request.patron_id, request.title_id)
            }
            _ => return Ok(false),
        };
        self.pending_pairs.remove_if(&pair, |_, pending| *pending == id);
        Ok(true)
    }

    async fn mark_rejected(
        &self,
        id: RequestId,
        staff_id: StaffId,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let pair = match self.requests.get_mut(&id) {
            Some(mut request)
                if request.status == RequestStatus::Pending =>
            {
                request.status = RequestStatus::Rejected;
                request.reason = Some(reason.to_string());
                request.processed_by = Some(staff_id);
                request.processed_at = Some(at);
                (request.patron_id, request.title_id)
            }
            _ => return Ok(false),
        };
        self.pending_pairs.remove_if(&pair, |_, pending| *pending == id);
        Ok(true)
    }
}
