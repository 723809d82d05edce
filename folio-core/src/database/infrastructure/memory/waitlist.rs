use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use folio_model::{
    PatronId, ScoreBreakdown, TitleId, WaitlistEntry, WaitlistEntryId,
};

use crate::database::ports::waitlist::WaitlistRepository;
use crate::error::{CirculationError, Result};

// Keyed by (title, patron) so pair uniqueness is structural and a
// racing double-join cannot create two rows.
#[derive(Debug, Clone)]
pub struct InMemoryWaitlistRepository {
    entries: Arc<DashMap<(TitleId, PatronId), WaitlistEntry>>,
}

fn rank_order(a: &WaitlistEntry, b: &WaitlistEntry) -> Ordering {
    b.priority_score
        .total_cmp(&a.priority_score)
        .then(a.joined_at.cmp(&b.joined_at))
}

impl InMemoryWaitlistRepository {
    pub fn new(
        entries: Arc<DashMap<(TitleId, PatronId), WaitlistEntry>>,
    ) -> Self {
        Self { entries }
    }

    fn key_of(&self, id: WaitlistEntryId) -> Option<(TitleId, PatronId)> {
        self.entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| (entry.title_id, entry.patron_id))
    }
}

#[async_trait]
impl WaitlistRepository for InMemoryWaitlistRepository {
    async fn insert(&self, entry: &WaitlistEntry) -> Result<()> {
        match self.entries.entry((entry.title_id, entry.patron_id)) {
            Entry::Occupied(_) => Err(CirculationError::Conflict(format!(
                "waitlist entry for title {} and patron {} already exists",
                entry.title_id, entry.patron_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(entry.clone());
                Ok(())
            }
        }
    }

    async fn find(
        &self,
        patron_id: PatronId,
        title_id: TitleId,
    ) -> Result<Option<WaitlistEntry>> {
        Ok(self
            .entries
            .get(&(title_id, patron_id))
            .map(|entry| entry.clone()))
    }

    async fn list_active_for_title(
        &self,
        title_id: TitleId,
    ) -> Result<Vec<WaitlistEntry>> {
        let mut active: Vec<WaitlistEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.title_id == title_id && entry.is_active)
            .map(|entry| entry.clone())
            .collect();
        active.sort_by(rank_order);
        Ok(active)
    }

    async fn titles_with_active_entries(&self) -> Result<Vec<TitleId>> {
        let titles: HashSet<TitleId> = self
            .entries
            .iter()
            .filter(|entry| entry.is_active)
            .map(|entry| entry.title_id)
            .collect();
        Ok(titles.into_iter().collect())
    }

    async fn reactivate(
        &self,
        id: WaitlistEntryId,
        joined_at: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(key) = self.key_of(id) else {
            return Ok(false);
        };
        match self.entries.get_mut(&key) {
            Some(mut entry) if !entry.is_active => {
                entry.is_active = true;
                entry.joined_at = joined_at;
                entry.priority_score = 0.0;
                entry.breakdown = ScoreBreakdown::default();
                entry.waiting_days = 0;
                entry.queue_position = 0;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn deactivate(&self, id: WaitlistEntryId) -> Result<bool> {
        let Some(key) = self.key_of(id) else {
            return Ok(false);
        };
        match self.entries.get_mut(&key) {
            Some(mut entry) if entry.is_active => {
                entry.is_active = false;
                entry.queue_position = 0;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_ranking(
        &self,
        id: WaitlistEntryId,
        score: f64,
        breakdown: ScoreBreakdown,
        waiting_days: i64,
        position: u32,
    ) -> Result<()> {
        let Some(key) = self.key_of(id) else {
            return Ok(());
        };
        if let Some(mut entry) = self.entries.get_mut(&key) {
            // An entry that went inactive between the caller's read and
            // this write keeps its resting state.
            if entry.is_active {
                entry.priority_score = score;
                entry.breakdown = breakdown;
                entry.waiting_days = waiting_days;
                entry.queue_position = position;
            }
        }
        Ok(())
    }

    async fn pop_top(
        &self,
        title_id: TitleId,
    ) -> Result<Option<WaitlistEntry>> {
        loop {
            let mut active: Vec<WaitlistEntry> = self
                .entries
                .iter()
                .filter(|entry| entry.title_id == title_id && entry.is_active)
                .map(|entry| entry.clone())
                .collect();
            active.sort_by(rank_order);
            let Some(top) = active.into_iter().next() else {
                return Ok(None);
            };

            // Claim under the row lock; if a concurrent caller won the
            // race, rescan for the next candidate.
            if let Some(mut entry) =
                self.entries.get_mut(&(top.title_id, top.patron_id))
            {
                if entry.is_active {
                    entry.is_active = false;
                    entry.queue_position = 0;
                    return Ok(Some(entry.clone()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> InMemoryWaitlistRepository {
        InMemoryWaitlistRepository::new(Arc::new(DashMap::new()))
    }

    fn entry_with_score(
        title_id: TitleId,
        score: f64,
        joined_at: DateTime<Utc>,
    ) -> WaitlistEntry {
        let mut entry = WaitlistEntry::new(title_id, PatronId::new());
        entry.priority_score = score;
        entry.joined_at = joined_at;
        entry
    }

    #[tokio::test]
    async fn duplicate_pair_insert_conflicts() {
        let repo = repo();
        let entry = WaitlistEntry::new(TitleId::new(), PatronId::new());
        repo.insert(&entry).await.unwrap();

        let mut again = entry.clone();
        again.id = WaitlistEntryId::new();
        assert!(matches!(
            repo.insert(&again).await,
            Err(CirculationError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn pop_prefers_score_then_fifo() {
        let repo = repo();
        let title = TitleId::new();
        let now = Utc::now();

        let low = entry_with_score(title, 1.0, now);
        let tied_late = entry_with_score(title, 5.0, now + chrono::Duration::hours(1));
        let tied_early = entry_with_score(title, 5.0, now);
        for entry in [&low, &tied_late, &tied_early] {
            repo.insert(entry).await.unwrap();
        }

        let first = repo.pop_top(title).await.unwrap().unwrap();
        assert_eq!(first.id, tied_early.id);
        let second = repo.pop_top(title).await.unwrap().unwrap();
        assert_eq!(second.id, tied_late.id);
        let third = repo.pop_top(title).await.unwrap().unwrap();
        assert_eq!(third.id, low.id);
        assert!(repo.pop_top(title).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_pops_claim_distinct_entries() {
        let repo = repo();
        let title = TitleId::new();
        let now = Utc::now();
        repo.insert(&entry_with_score(title, 2.0, now)).await.unwrap();
        repo.insert(&entry_with_score(title, 1.0, now)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move { repo.pop_top(title).await }));
        }

        let mut claimed = HashSet::new();
        let mut granted = 0;
        for handle in handles {
            if let Some(entry) = handle.await.expect("join").expect("pop") {
                claimed.insert(entry.id);
                granted += 1;
            }
        }

        assert_eq!(granted, 2, "no caller claims an already-popped entry");
        assert_eq!(claimed.len(), 2, "each waiter is claimed exactly once");
    }

    #[tokio::test]
    async fn reactivate_only_flips_inactive_rows() {
        let repo = repo();
        let entry = WaitlistEntry::new(TitleId::new(), PatronId::new());
        repo.insert(&entry).await.unwrap();

        assert!(!repo.reactivate(entry.id, Utc::now()).await.unwrap());
        assert!(repo.deactivate(entry.id).await.unwrap());
        assert!(!repo.deactivate(entry.id).await.unwrap());

        let rejoined = Utc::now();
        assert!(repo.reactivate(entry.id, rejoined).await.unwrap());
        let stored = repo
            .find(entry.patron_id, entry.title_id)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.is_active);
        assert_eq!(stored.joined_at, rejoined);
        assert_eq!(stored.priority_score, 0.0);
    }
}
