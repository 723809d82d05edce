//! Timer-driven upkeep: overdue reminders and waitlist re-ranking.

mod runtime;

pub use runtime::BackgroundReconciler;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info};

use crate::database::ports::borrows::BorrowsRepository;
use crate::database::ports::titles::TitlesRepository;
use crate::error::Result;
use crate::providers::{EventKind, NotificationSink, dispatch};
use crate::waitlist::WaitlistService;

/// Counts from one pass of the overdue sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverdueSweep {
    /// Open overdue loans the pass looked at.
    pub scanned: u32,
    /// Loans stamped and reminded by this pass.
    pub notified: u32,
}

/// Periodic maintenance over the circulation state.
///
/// Both passes are idempotent, so overlapping runs from a double-fired
/// timer or a second process are harmless.
#[derive(Clone)]
pub struct Reconciler {
    titles: Arc<dyn TitlesRepository>,
    borrows: Arc<dyn BorrowsRepository>,
    waitlist: WaitlistService,
    notifications: Arc<dyn NotificationSink>,
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("borrows_repo", &Arc::strong_count(&self.borrows))
            .finish()
    }
}

impl Reconciler {
    pub fn new(
        titles: Arc<dyn TitlesRepository>,
        borrows: Arc<dyn BorrowsRepository>,
        waitlist: WaitlistService,
        notifications: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            titles,
            borrows,
            waitlist,
            notifications,
        }
    }

    /// Reminds patrons of loans past due, at most once per overdue
    /// spell.
    ///
    /// The stamp is a conditional update, so a loan claimed by a
    /// concurrent sweep between listing and stamping is skipped rather
    /// than reminded twice.
    pub async fn sweep_overdue(
        &self,
        now: DateTime<Utc>,
    ) -> Result<OverdueSweep> {
        let overdue = self.borrows.list_overdue_unnotified(now).await?;
        let mut sweep = OverdueSweep {
            scanned: overdue.len() as u32,
            notified: 0,
        };

        for record in overdue {
            if !self.borrows.mark_overdue_notified(record.id, now).await? {
                continue;
            }
            dispatch(
                self.notifications.clone(),
                record.patron_id,
                EventKind::BorrowOverdue,
                json!({
                    "borrow_id": record.id,
                    "title_id": record.title_id,
                    "due_date": record.due_date,
                }),
            );
            sweep.notified += 1;
        }

        if sweep.notified > 0 {
            info!(
                scanned = sweep.scanned,
                notified = sweep.notified,
                "Overdue sweep sent reminders"
            );
        } else {
            debug!(scanned = sweep.scanned, "Overdue sweep found nothing new");
        }
        Ok(sweep)
    }

    /// Re-ranks every active waitlist so stored positions and scores
    /// keep tracking elapsed waiting time. Returns the entries
    /// re-ranked.
    pub async fn refresh_waitlists(&self) -> Result<u32> {
        self.waitlist.refresh_all(None).await
    }

    /// Re-derives each title's counters from its open loans.
    ///
    /// A release that failed after its loan was closed leaves `issued`
    /// one too high and the copy stranded. This pass writes the
    /// counters the open records imply, through a compare-and-set on
    /// the stored value so a legitimate reserve or release landing
    /// mid-pass wins. Returns the titles corrected.
    pub async fn reconcile_stock(&self) -> Result<u32> {
        let mut corrected = 0;
        for title in self.titles.list().await? {
            let open =
                self.borrows.count_open_for_title(title.id).await? as i32;
            if open == title.issued {
                continue;
            }
            if self
                .titles
                .reconcile_issued(title.id, title.issued, open)
                .await?
            {
                info!(
                    title_id = %title.id,
                    stored = title.issued,
                    open,
                    "Reconciled title counters against open loans"
                );
                corrected += 1;
            }
        }
        Ok(corrected)
    }
}
