use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::{DashMap, mapref::entry::Entry};
use folio_model::{Title, TitleId};

use crate::database::ports::titles::TitlesRepository;
use crate::error::{CirculationError, Result};

#[derive(Debug, Clone)]
pub struct InMemoryTitlesRepository {
    titles: Arc<DashMap<TitleId, Title>>,
}

impl InMemoryTitlesRepository {
    pub fn new(titles: Arc<DashMap<TitleId, Title>>) -> Self {
        Self { titles }
    }
}

#[async_trait]
impl TitlesRepository for InMemoryTitlesRepository {
    async fn insert(&self, title: &Title) -> Result<()> {
        match self.titles.entry(title.id) {
            Entry::Occupied(_) => Err(CirculationError::Conflict(format!(
                "title {} already exists",
                title.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(title.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, id: TitleId) -> Result<Option<Title>> {
        Ok(self.titles.get(&id).map(|title| title.clone()))
    }

    async fn list(&self) -> Result<Vec<Title>> {
        let mut titles: Vec<Title> =
            self.titles.iter().map(|entry| entry.clone()).collect();
        titles.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(titles)
    }

    // The map guard gives exclusive access to the row, so the check and
    // the decrement happen under one lock.
    async fn reserve(&self, id: TitleId) -> Result<bool> {
        match self.titles.get_mut(&id) {
            Some(mut title) => {
                if title.available > 0 {
                    title.available -= 1;
                    title.issued += 1;
                    title.updated_at = Utc::now();
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            None => {
                Err(CirculationError::NotFound(format!("title {id}")))
            }
        }
    }

    // Capped at the total so a stray double-release cannot push the
    // counters past the stocked copies.
    async fn release(&self, id: TitleId) -> Result<()> {
        match self.titles.get_mut(&id) {
            Some(mut title) => {
                title.available = (title.available + 1).min(title.total);
                title.issued = (title.issued - 1).max(0);
                title.updated_at = Utc::now();
                Ok(())
            }
            None => {
                Err(CirculationError::NotFound(format!("title {id}")))
            }
        }
    }

    async fn adjust_total(&self, id: TitleId, new_total: i32) -> Result<bool> {
        match self.titles.get_mut(&id) {
            Some(mut title) => {
                if new_total < title.issued {
                    return Ok(false);
                }
                title.total = new_total;
                title.available = new_total - title.issued;
                title.updated_at = Utc::now();
                Ok(true)
            }
            None => {
                Err(CirculationError::NotFound(format!("title {id}")))
            }
        }
    }

    async fn reconcile_issued(
        &self,
        id: TitleId,
        expected: i32,
        open: i32,
    ) -> Result<bool> {
        match self.titles.get_mut(&id) {
            Some(mut title) => {
                if title.issued != expected
                    || open == expected
                    || open < 0
                    || open > title.total
                {
                    return Ok(false);
                }
                title.issued = open;
                title.available = title.total - open;
                title.updated_at = Utc::now();
                Ok(true)
            }
            None => {
                Err(CirculationError::NotFound(format!("title {id}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo_with_copies(total: i32) -> (InMemoryTitlesRepository, TitleId) {
        let repo = InMemoryTitlesRepository::new(Arc::new(DashMap::new()));
        let title = Title::new("The Left Hand of Darkness", total);
        let id = title.id;
        repo.titles.insert(id, title);
        (repo, id)
    }

    #[tokio::test]
    async fn reserve_fails_once_stock_is_exhausted() {
        let (repo, id) = repo_with_copies(1);
        assert!(repo.reserve(id).await.unwrap());
        assert!(!repo.reserve(id).await.unwrap());

        let title = repo.get(id).await.unwrap().unwrap();
        assert_eq!(title.available, 0);
        assert_eq!(title.issued, 1);
        assert!(title.validate().is_ok());
    }

    #[tokio::test]
    async fn reserve_unknown_title_is_not_found() {
        let repo = InMemoryTitlesRepository::new(Arc::new(DashMap::new()));
        assert!(matches!(
            repo.reserve(TitleId::new()).await,
            Err(CirculationError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_reserves_grant_exactly_the_remaining_copies() {
        let (repo, id) = repo_with_copies(3);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move { repo.reserve(id).await }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.expect("join").expect("reserve") {
                granted += 1;
            }
        }

        assert_eq!(granted, 3, "exactly the remaining copies are granted");
        let title = repo.get(id).await.unwrap().unwrap();
        assert_eq!(title.available, 0);
        assert_eq!(title.issued, 3);
    }

    #[tokio::test]
    async fn release_without_reserve_keeps_counters_in_range() {
        let (repo, id) = repo_with_copies(2);
        repo.release(id).await.unwrap();

        let title = repo.get(id).await.unwrap().unwrap();
        assert_eq!(title.available, 2);
        assert_eq!(title.issued, 0);
        assert!(title.validate().is_ok());
    }

    #[tokio::test]
    async fn release_undoes_a_reserve() {
        let (repo, id) = repo_with_copies(2);
        assert!(repo.reserve(id).await.unwrap());
        repo.release(id).await.unwrap();

        let title = repo.get(id).await.unwrap().unwrap();
        assert_eq!(title.available, 2);
        assert_eq!(title.issued, 0);
    }
}
