use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use folio_model::{BorrowId, BorrowRecord, PatronId, PenaltyStatus, TitleId};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::circulation::penalty::{self, ReturnCondition};
use crate::database::ports::borrows::{BorrowsRepository, ReturnOutcome};
use crate::error::{CirculationError, Result};
use crate::ledger::InventoryLedger;
use crate::policy::LendingPolicy;
use crate::providers::{CatalogProvider, EventKind, NotificationSink, dispatch};
use crate::waitlist::WaitlistService;

/// Issues and closes borrow leases, and settles the penalties closing
/// them can raise.
///
/// Only this service creates or closes borrow records. A close releases
/// the copy back to the ledger and immediately offers it to the title's
/// waitlist, in that order, before anything else can claim it.
#[derive(Clone)]
pub struct CirculationService {
    borrows: Arc<dyn BorrowsRepository>,
    ledger: InventoryLedger,
    waitlist: WaitlistService,
    catalog: Arc<dyn CatalogProvider>,
    notifications: Arc<dyn NotificationSink>,
    policy: LendingPolicy,
}

impl fmt::Debug for CirculationService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CirculationService")
            .field("borrows_repo", &Arc::strong_count(&self.borrows))
            .field("policy", &self.policy)
            .finish()
    }
}

impl CirculationService {
    pub fn new(
        borrows: Arc<dyn BorrowsRepository>,
        ledger: InventoryLedger,
        waitlist: WaitlistService,
        catalog: Arc<dyn CatalogProvider>,
        notifications: Arc<dyn NotificationSink>,
        policy: LendingPolicy,
    ) -> Self {
        Self {
            borrows,
            ledger,
            waitlist,
            catalog,
            notifications,
            policy,
        }
    }

    /// Opens a lease against an already-reserved copy.
    ///
    /// The caller owns the reservation; this only persists the record.
    pub async fn issue(
        &self,
        patron_id: PatronId,
        title_id: TitleId,
        due_date: DateTime<Utc>,
    ) -> Result<BorrowRecord> {
        let record = BorrowRecord::new(title_id, patron_id, due_date);
        self.borrows.insert(&record).await?;
        debug!(
            borrow_id = %record.id,
            %patron_id,
            %title_id,
            due = %due_date,
            "Issued borrow record"
        );
        Ok(record)
    }

    /// Deletes a just-issued record whose approval fell through. The
    /// record must not have been exposed to the patron yet.
    pub(crate) async fn rescind(&self, id: BorrowId) -> Result<()> {
        self.borrows.remove(id).await
    }

    /// Closes an open lease and prices the return.
    ///
    /// Lost outranks damaged outranks late. Lost and damaged charge the
    /// full replacement price; a late intact copy charges per whole day
    /// past due. The freed copy goes back to the ledger and is offered
    /// to the waitlist before this call returns.
    pub async fn return_book(
        &self,
        id: BorrowId,
        returned_at: DateTime<Utc>,
        condition: ReturnCondition,
    ) -> Result<BorrowRecord> {
        let record = self.borrows.get(id).await?.ok_or_else(|| {
            CirculationError::NotFound(format!("borrow record {id}"))
        })?;
        if record.returned_at.is_some() {
            return Err(CirculationError::Conflict(format!(
                "borrow record {id} is already closed"
            )));
        }

        let entry = self.catalog.lookup(record.title_id).await?;
        let days_late = penalty::days_late(record.due_date, returned_at);
        let graded = penalty::assess(
            condition,
            days_late,
            entry.mrp,
            self.policy.late_fee_rate,
        );
        let outcome = ReturnOutcome {
            status: graded.status,
            returned_at,
            penalty_amount: graded.penalty_amount,
            penalty_status: if graded.penalty_amount > Decimal::ZERO {
                PenaltyStatus::Pending
            } else {
                PenaltyStatus::None
            },
            penalty_type: graded.penalty_type,
        };

        if !self.borrows.close(id, &outcome).await? {
            return Err(CirculationError::Conflict(format!(
                "borrow record {id} is already closed"
            )));
        }
        info!(
            borrow_id = %id,
            title_id = %record.title_id,
            status = %outcome.status,
            penalty = %outcome.penalty_amount,
            days_late,
            "Closed borrow record"
        );

        // The close is committed; a release failure must not surface as
        // an error, or the retry would hit the already-closed guard and
        // the copy would stay stranded. The reconciler's stock pass
        // re-derives the counters from the open records.
        if let Err(err) = self.ledger.release(record.title_id).await {
            warn!(
                title_id = %record.title_id,
                error = %err,
                "Post-return release failed"
            );
        }
        // The freed copy is offered to the top waiter straight away. A
        // failure here must not unwind the committed return; the next
        // reconciler pass or return will offer again.
        if let Err(err) = self.waitlist.allocate_next(record.title_id).await {
            warn!(
                title_id = %record.title_id,
                error = %err,
                "Post-return waitlist allocation failed"
            );
        }

        if outcome.penalty_amount > Decimal::ZERO {
            dispatch(
                self.notifications.clone(),
                record.patron_id,
                EventKind::PenaltyAssessed,
                json!({
                    "borrow_id": id,
                    "amount": outcome.penalty_amount,
                    "penalty_type": outcome.penalty_type,
                }),
            );
        }

        let mut closed = record;
        closed.status = outcome.status;
        closed.returned_at = Some(returned_at);
        closed.penalty_amount = outcome.penalty_amount;
        closed.penalty_outstanding = outcome.penalty_amount;
        closed.penalty_status = outcome.penalty_status;
        closed.penalty_type = outcome.penalty_type;
        Ok(closed)
    }

    /// Pays part or all of a pending penalty. Covering the full
    /// outstanding amount settles it as PAID.
    pub async fn pay_penalty(
        &self,
        id: BorrowId,
        amount: Decimal,
    ) -> Result<BorrowRecord> {
        if amount <= Decimal::ZERO {
            return Err(CirculationError::InvalidAmount(
                "penalty payment must be positive".into(),
            ));
        }

        let record = self.borrows.get(id).await?.ok_or_else(|| {
            CirculationError::NotFound(format!("borrow record {id}"))
        })?;
        if record.penalty_status != PenaltyStatus::Pending {
            return Err(CirculationError::InvalidAmount(format!(
                "borrow record {id} has no payable penalty"
            )));
        }
        if amount > record.penalty_outstanding {
            return Err(CirculationError::InvalidAmount(format!(
                "payment {amount} exceeds the outstanding {}",
                record.penalty_outstanding
            )));
        }

        if !self.borrows.settle_penalty(id, amount).await? {
            // Lost a race against a concurrent payment or waiver.
            return Err(CirculationError::InvalidAmount(format!(
                "payment {amount} no longer matches the outstanding penalty"
            )));
        }
        debug!(borrow_id = %id, %amount, "Penalty payment settled");

        self.borrows.get(id).await?.ok_or_else(|| {
            CirculationError::NotFound(format!("borrow record {id}"))
        })
    }

    /// Writes off the penalty entirely, whatever its current state.
    pub async fn waive_penalty(&self, id: BorrowId) -> Result<BorrowRecord> {
        if !self.borrows.waive_penalty(id).await? {
            return Err(CirculationError::NotFound(format!(
                "borrow record {id}"
            )));
        }
        info!(borrow_id = %id, "Penalty waived");

        self.borrows.get(id).await?.ok_or_else(|| {
            CirculationError::NotFound(format!("borrow record {id}"))
        })
    }

    pub async fn record(&self, id: BorrowId) -> Result<BorrowRecord> {
        self.borrows.get(id).await?.ok_or_else(|| {
            CirculationError::NotFound(format!("borrow record {id}"))
        })
    }

    pub async fn open_loans(
        &self,
        patron_id: PatronId,
    ) -> Result<Vec<BorrowRecord>> {
        self.borrows.list_open_for_patron(patron_id).await
    }

    /// Open loans past due as of the given instant, soonest due first.
    pub async fn overdue_loans(
        &self,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<BorrowRecord>> {
        self.borrows.list_overdue(as_of).await
    }
}
