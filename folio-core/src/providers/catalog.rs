use async_trait::async_trait;
use dashmap::DashMap;
use folio_model::{CatalogEntry, TitleId};

use crate::error::{CirculationError, Result};

/// Read-only catalog facts: replacement price and access level.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    async fn lookup(&self, title_id: TitleId) -> Result<CatalogEntry>;
}

/// In-process catalog backed by a concurrent map.
#[derive(Debug, Default)]
pub struct StaticCatalog {
    entries: DashMap<TitleId, CatalogEntry>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, title_id: TitleId, entry: CatalogEntry) {
        self.entries.insert(title_id, entry);
    }
}

#[async_trait]
impl CatalogProvider for StaticCatalog {
    async fn lookup(&self, title_id: TitleId) -> Result<CatalogEntry> {
        self.entries
            .get(&title_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| {
                CirculationError::NotFound(format!("catalog entry {title_id}"))
            })
    }
}
