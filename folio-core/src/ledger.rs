use std::fmt;
use std::sync::Arc;

use folio_model::{Title, TitleId};
use tracing::debug;

use crate::database::ports::titles::TitlesRepository;
use crate::error::{CirculationError, Result};

/// Inventory front for titles and their copy counters.
///
/// All stock movement funnels through [`reserve`](Self::reserve) and
/// [`release`](Self::release), which are single conditional updates in
/// storage. Callers racing for the last copy serialize there; exactly
/// one of them wins.
#[derive(Clone)]
pub struct InventoryLedger {
    titles: Arc<dyn TitlesRepository>,
}

impl fmt::Debug for InventoryLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InventoryLedger")
            .field("titles_repo", &Arc::strong_count(&self.titles))
            .finish()
    }
}

impl InventoryLedger {
    pub fn new(titles: Arc<dyn TitlesRepository>) -> Self {
        Self { titles }
    }

    pub async fn add_title(&self, name: &str, total: i32) -> Result<Title> {
        let title = Title::new(name, total);
        title.validate()?;
        self.titles.insert(&title).await?;
        debug!(title_id = %title.id, total, "Stocked new title");
        Ok(title)
    }

    pub async fn title(&self, id: TitleId) -> Result<Title> {
        self.titles
            .get(id)
            .await?
            .ok_or_else(|| CirculationError::NotFound(format!("title {id}")))
    }

    pub async fn list_titles(&self) -> Result<Vec<Title>> {
        self.titles.list().await
    }

    /// Claims one copy for an approval in flight.
    pub async fn reserve(&self, id: TitleId) -> Result<()> {
        if self.titles.reserve(id).await? {
            Ok(())
        } else {
            Err(CirculationError::OutOfStock(id))
        }
    }

    /// Returns a claimed copy to the shelf.
    pub async fn release(&self, id: TitleId) -> Result<()> {
        self.titles.release(id).await
    }

    /// Restocks or retires copies. The new total can never undercut the
    /// copies currently out on loan.
    pub async fn adjust_total_copies(
        &self,
        id: TitleId,
        new_total: i32,
    ) -> Result<Title> {
        if !self.titles.adjust_total(id, new_total).await? {
            return Err(CirculationError::Conflict(format!(
                "title {id} has more copies on loan than the new total {new_total}"
            )));
        }
        debug!(title_id = %id, new_total, "Adjusted title stock");
        self.title(id).await
    }
}
