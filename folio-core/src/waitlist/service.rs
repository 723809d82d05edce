use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use folio_model::{PatronId, TitleId, WaitlistEntry};
use serde_json::json;
use tracing::{debug, info};

use crate::database::ports::borrows::BorrowsRepository;
use crate::database::ports::waitlist::WaitlistRepository;
use crate::error::{CirculationError, Result};
use crate::providers::{EventKind, NotificationSink, SubscriptionOracle, dispatch};
use crate::waitlist::scoring;

/// Priority-ordered waiting list per title.
///
/// Entries rank by stored score, highest first, join order on ties.
/// Rankings are written through on every join, leave and allocation and
/// on the reconciler cadence, so the stored order is the one an
/// allocation actually uses.
#[derive(Clone)]
pub struct WaitlistService {
    waitlist: Arc<dyn WaitlistRepository>,
    borrows: Arc<dyn BorrowsRepository>,
    subscriptions: Arc<dyn SubscriptionOracle>,
    notifications: Arc<dyn NotificationSink>,
}

impl fmt::Debug for WaitlistService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitlistService")
            .field("waitlist_repo", &Arc::strong_count(&self.waitlist))
            .field("borrows_repo", &Arc::strong_count(&self.borrows))
            .finish()
    }
}

impl WaitlistService {
    pub fn new(
        waitlist: Arc<dyn WaitlistRepository>,
        borrows: Arc<dyn BorrowsRepository>,
        subscriptions: Arc<dyn SubscriptionOracle>,
        notifications: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            waitlist,
            borrows,
            subscriptions,
            notifications,
        }
    }

    /// Puts the patron in line for the title.
    ///
    /// A pair that waited before gets its old entry reactivated with a
    /// fresh `joined_at`; the pair never accumulates a second row. An
    /// already-active entry is a `Conflict`.
    pub async fn join(
        &self,
        patron_id: PatronId,
        title_id: TitleId,
    ) -> Result<WaitlistEntry> {
        let already_waiting = || {
            CirculationError::Conflict(format!(
                "patron {patron_id} is already waiting for title {title_id}"
            ))
        };

        match self.waitlist.find(patron_id, title_id).await? {
            Some(existing) if existing.is_active => return Err(already_waiting()),
            Some(existing) => {
                if !self.waitlist.reactivate(existing.id, Utc::now()).await? {
                    return Err(already_waiting());
                }
                debug!(%patron_id, %title_id, "Rejoined waitlist");
            }
            None => {
                let entry = WaitlistEntry::new(title_id, patron_id);
                self.waitlist.insert(&entry).await.map_err(|err| match err {
                    CirculationError::Conflict(_) => already_waiting(),
                    other => other,
                })?;
                debug!(%patron_id, %title_id, "Joined waitlist");
            }
        }

        self.refresh_title(title_id).await?;
        self.waitlist.find(patron_id, title_id).await?.ok_or_else(|| {
            CirculationError::Internal(format!(
                "waitlist entry for patron {patron_id} on title {title_id} vanished after join"
            ))
        })
    }

    /// Withdraws the patron's active entry and re-ranks the rest.
    pub async fn leave(
        &self,
        patron_id: PatronId,
        title_id: TitleId,
    ) -> Result<()> {
        let not_waiting = || {
            CirculationError::NotFound(format!(
                "active waitlist entry for patron {patron_id} on title {title_id}"
            ))
        };

        let entry = self
            .waitlist
            .find(patron_id, title_id)
            .await?
            .filter(|entry| entry.is_active)
            .ok_or_else(not_waiting)?;

        if !self.waitlist.deactivate(entry.id).await? {
            return Err(not_waiting());
        }
        debug!(%patron_id, %title_id, "Left waitlist");

        self.refresh_title(title_id).await?;
        Ok(())
    }

    /// Offers a freed copy to the highest-priority waiter.
    ///
    /// Deactivating the winning entry is the allocation signal; the
    /// patron is expected to follow up with a borrow request. Returns
    /// `None` when nobody is waiting. Each call claims at most one
    /// entry, and concurrent calls claim distinct entries.
    pub async fn allocate_next(
        &self,
        title_id: TitleId,
    ) -> Result<Option<WaitlistEntry>> {
        self.refresh_title(title_id).await?;

        let Some(entry) = self.waitlist.pop_top(title_id).await? else {
            return Ok(None);
        };
        self.refresh_title(title_id).await?;

        info!(
            patron_id = %entry.patron_id,
            %title_id,
            score = entry.priority_score,
            "Allocated freed copy to top waiter"
        );
        dispatch(
            self.notifications.clone(),
            entry.patron_id,
            EventKind::CopyAvailable,
            json!({ "title_id": title_id }),
        );

        Ok(Some(entry))
    }

    /// Active entries for the title in stored rank order.
    pub async fn queue(&self, title_id: TitleId) -> Result<Vec<WaitlistEntry>> {
        self.waitlist.list_active_for_title(title_id).await
    }

    /// Freshly re-ranked view of the title's queue. Stored rankings can
    /// trail reality by up to one reconciler interval; this pays for a
    /// recompute to serve current scores and positions.
    pub async fn snapshot(
        &self,
        title_id: TitleId,
    ) -> Result<Vec<WaitlistEntry>> {
        self.refresh_title(title_id).await?;
        self.queue(title_id).await
    }

    pub async fn entry(
        &self,
        patron_id: PatronId,
        title_id: TitleId,
    ) -> Result<Option<WaitlistEntry>> {
        self.waitlist.find(patron_id, title_id).await
    }

    /// Recomputes scores and positions for one title's active entries,
    /// all graded at a single instant so the pass is deterministic.
    /// Returns the number of entries re-ranked.
    pub async fn refresh_title(&self, title_id: TitleId) -> Result<u32> {
        let now = Utc::now();
        let entries = self.waitlist.list_active_for_title(title_id).await?;

        let mut ranked = Vec::with_capacity(entries.len());
        for entry in entries {
            let waiting_days = entry.waiting_days_at(now);
            let premium =
                self.subscriptions.is_premium(entry.patron_id).await?;
            let history =
                self.borrows.return_history(entry.patron_id).await?;
            let breakdown =
                scoring::breakdown(waiting_days, premium, &history);
            ranked.push((entry, breakdown, waiting_days));
        }

        ranked.sort_by(|(a, a_score, _), (b, b_score, _)| {
            b_score
                .total()
                .total_cmp(&a_score.total())
                .then(a.joined_at.cmp(&b.joined_at))
        });

        for (index, (entry, breakdown, waiting_days)) in
            ranked.iter().enumerate()
        {
            self.waitlist
                .update_ranking(
                    entry.id,
                    breakdown.total(),
                    *breakdown,
                    *waiting_days,
                    index as u32 + 1,
                )
                .await?;
        }

        Ok(ranked.len() as u32)
    }

    /// Refreshes one title, or every title with active waiters when
    /// none is given, and reports the entries re-ranked. Safe to re-run
    /// at any cadence; a second pass over unchanged entries writes the
    /// same rankings again.
    pub async fn refresh_all(&self, title_id: Option<TitleId>) -> Result<u32> {
        let titles = match title_id {
            Some(id) => vec![id],
            None => self.waitlist.titles_with_active_entries().await?,
        };

        let mut refreshed = 0;
        for id in titles {
            refreshed += self.refresh_title(id).await?;
        }
        Ok(refreshed)
    }
}
