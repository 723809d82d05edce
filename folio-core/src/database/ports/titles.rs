use async_trait::async_trait;
use folio_model::{Title, TitleId};

use crate::error::Result;

// Copy counters per title. The reserve/release pair is the only write
// path for `available`/`issued`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TitlesRepository: Send + Sync {
    async fn insert(&self, title: &Title) -> Result<()>;
    async fn get(&self, id: TitleId) -> Result<Option<Title>>;
    async fn list(&self) -> Result<Vec<Title>>;

    /// Moves one copy from available to issued iff a copy is free.
    ///
    /// Must be a single conditional update against storage, never a
    /// read followed by a write. Returns `Ok(false)` when stock is
    /// exhausted and errors with `NotFound` for an unknown title.
    async fn reserve(&self, id: TitleId) -> Result<bool>;

    /// Moves one copy back from issued to available. `issued` is
    /// floored at zero.
    async fn release(&self, id: TitleId) -> Result<()>;

    /// Sets `total` to `new_total`, moving the difference in and out of
    /// `available`. `Ok(false)` when `new_total` would drop the title
    /// below its currently issued copies; the counters stay untouched.
    async fn adjust_total(&self, id: TitleId, new_total: i32) -> Result<bool>;

    /// Forces `issued` to `open` and `available` to the remainder, but
    /// only while the stored `issued` still equals `expected`. A
    /// compare-and-set: any counter movement since `expected` was read
    /// makes it a no-op. `Ok(false)` when nothing changed.
    async fn reconcile_issued(
        &self,
        id: TitleId,
        expected: i32,
        open: i32,
    ) -> Result<bool>;
}
