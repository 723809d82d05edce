use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use folio_model::{
    BorrowId, BorrowRecord, PatronId, PenaltyStatus, ReturnHistory, TitleId,
};
use rust_decimal::Decimal;

use crate::database::ports::borrows::{BorrowsRepository, ReturnOutcome};
use crate::error::{CirculationError, Result};

#[derive(Debug, Clone)]
pub struct InMemoryBorrowsRepository {
    borrows: Arc<DashMap<BorrowId, BorrowRecord>>,
}

impl InMemoryBorrowsRepository {
    pub fn new(borrows: Arc<DashMap<BorrowId, BorrowRecord>>) -> Self {
        Self { borrows }
    }
}

#[async_trait]
impl BorrowsRepository for InMemoryBorrowsRepository {
    async fn insert(&self, record: &BorrowRecord) -> Result<()> {
        match self.borrows.entry(record.id) {
            Entry::Occupied(_) => Err(CirculationError::Conflict(format!(
                "borrow record {} already exists",
                record.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, id: BorrowId) -> Result<Option<BorrowRecord>> {
        Ok(self.borrows.get(&id).map(|record| record.clone()))
    }

    async fn remove(&self, id: BorrowId) -> Result<()> {
        self.borrows.remove(&id);
        Ok(())
    }

    async fn list_open_for_patron(
        &self,
        patron_id: PatronId,
    ) -> Result<Vec<BorrowRecord>> {
        let mut records: Vec<BorrowRecord> = self
            .borrows
            .iter()
            .filter(|record| {
                record.patron_id == patron_id && record.returned_at.is_none()
            })
            .map(|record| record.clone())
            .collect();
        records.sort_by(|a, b| a.borrowed_at.cmp(&b.borrowed_at));
        Ok(records)
    }

    async fn count_open_for_title(&self, title_id: TitleId) -> Result<u32> {
        let count = self
            .borrows
            .iter()
            .filter(|record| {
                record.title_id == title_id && record.returned_at.is_none()
            })
            .count();
        Ok(count as u32)
    }

    async fn close(&self, id: BorrowId, outcome: &ReturnOutcome) -> Result<bool> {
        match self.borrows.get_mut(&id) {
            Some(mut record) if record.returned_at.is_none() => {
                record.status = outcome.status;
                record.returned_at = Some(outcome.returned_at);
                record.penalty_amount = outcome.penalty_amount;
                record.penalty_outstanding = outcome.penalty_amount;
                record.penalty_status = outcome.penalty_status;
                record.penalty_type = outcome.penalty_type;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn settle_penalty(
        &self,
        id: BorrowId,
        amount: Decimal,
    ) -> Result<bool> {
        match self.borrows.get_mut(&id) {
            Some(mut record)
                if record.penalty_status == PenaltyStatus::Pending
                    && amount > Decimal::ZERO
                    && amount <= record.penalty_outstanding =>
            {
                record.penalty_outstanding -= amount;
                if record.penalty_outstanding == Decimal::ZERO {
                    record.penalty_status = PenaltyStatus::Paid;
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn waive_penalty(&self, id: BorrowId) -> Result<bool> {
        match self.borrows.get_mut(&id) {
            Some(mut record) => {
                record.penalty_status = PenaltyStatus::Waived;
                record.penalty_outstanding = Decimal::ZERO;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn return_history(&self, patron_id: PatronId) -> Result<ReturnHistory> {
        let mut history = ReturnHistory::default();
        for record in self.borrows.iter() {
            if record.patron_id == patron_id && record.returned_at.is_some() {
                history.record(record.status);
            }
        }
        Ok(history)
    }

    async fn list_overdue(
        &self,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<BorrowRecord>> {
        let mut records: Vec<BorrowRecord> = self
            .borrows
            .iter()
            .filter(|record| record.is_overdue_at(as_of))
            .map(|record| record.clone())
            .collect();
        records.sort_by(|a, b| a.due_date.cmp(&b.due_date));
        Ok(records)
    }

    async fn list_overdue_unnotified(
        &self,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<BorrowRecord>> {
        let mut records: Vec<BorrowRecord> = self
            .borrows
            .iter()
            .filter(|record| {
                record.returned_at.is_none()
                    && record.due_date < as_of
                    && record.overdue_notified_at.is_none()
            })
            .map(|record| record.clone())
            .collect();
        records.sort_by(|a, b| a.due_date.cmp(&b.due_date));
        Ok(records)
    }

    async fn mark_overdue_notified(
        &self,
        id: BorrowId,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        match self.borrows.get_mut(&id) {
            Some(mut record)
                if record.returned_at.is_none()
                    && record.overdue_notified_at.is_none() =>
            {
                record.overdue_notified_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
