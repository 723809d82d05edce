use std::any::type_name_of_val;
use std::fmt;
use std::sync::Arc;

use crate::database::infrastructure::memory::InMemoryDatabase;
#[cfg(feature = "database")]
use crate::database::infrastructure::postgres::PostgresDatabase;
#[cfg(feature = "database")]
use crate::database::infrastructure::postgres::repositories::{
    PostgresBorrowsRepository, PostgresRequestsRepository,
    PostgresTitlesRepository, PostgresWaitlistRepository,
};
use crate::database::ports::{
    borrows::BorrowsRepository, requests::RequestsRepository,
    titles::TitlesRepository, waitlist::WaitlistRepository,
};

/// Aggregates the repository ports the engine's services run on.
///
/// One unit of work is one storage backend; every port in it shares
/// that backend, so cross-aggregate guards (request intake consulting
/// open borrows) see one consistent store.
#[derive(Clone)]
pub struct CirculationUnitOfWork {
    pub titles: Arc<dyn TitlesRepository>,
    pub requests: Arc<dyn RequestsRepository>,
    pub borrows: Arc<dyn BorrowsRepository>,
    pub waitlist: Arc<dyn WaitlistRepository>,
}

impl fmt::Debug for CirculationUnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CirculationUnitOfWork")
            .field("titles", &type_name_of_val(self.titles.as_ref()))
            .field("requests", &type_name_of_val(self.requests.as_ref()))
            .field("borrows", &type_name_of_val(self.borrows.as_ref()))
            .field("waitlist", &type_name_of_val(self.waitlist.as_ref()))
            .finish()
    }
}

impl CirculationUnitOfWork {
    /// All ports backed by the in-memory store.
    pub fn from_in_memory(db: &InMemoryDatabase) -> Result<Self, String> {
        CirculationUnitOfWorkBuilder::new()
            .with_in_memory(db)
            .build()
    }

    /// All ports backed by one Postgres pool.
    #[cfg(feature = "database")]
    pub fn from_postgres(db: Arc<PostgresDatabase>) -> Result<Self, String> {
        CirculationUnitOfWorkBuilder::new().with_postgres(db).build()
    }
}

#[derive(Default)]
pub struct CirculationUnitOfWorkBuilder {
    titles: Option<Arc<dyn TitlesRepository>>,
    requests: Option<Arc<dyn RequestsRepository>>,
    borrows: Option<Arc<dyn BorrowsRepository>>,
    waitlist: Option<Arc<dyn WaitlistRepository>>,
}

impl fmt::Debug for CirculationUnitOfWorkBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CirculationUnitOfWorkBuilder")
            .field("titles", &self.titles.is_some())
            .field("requests", &self.requests.is_some())
            .field("borrows", &self.borrows.is_some())
            .field("waitlist", &self.waitlist.is_some())
            .finish()
    }
}

impl CirculationUnitOfWorkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_titles(mut self, repo: Arc<dyn TitlesRepository>) -> Self {
        self.titles = Some(repo);
        self
    }

    pub fn with_requests(mut self, repo: Arc<dyn RequestsRepository>) -> Self {
        self.requests = Some(repo);
        self
    }

    pub fn with_borrows(mut self, repo: Arc<dyn BorrowsRepository>) -> Self {
        self.borrows = Some(repo);
        self
    }

    pub fn with_waitlist(mut self, repo: Arc<dyn WaitlistRepository>) -> Self {
        self.waitlist = Some(repo);
        self
    }

    /// Populates every port from the shared in-memory store.
    pub fn with_in_memory(mut self, db: &InMemoryDatabase) -> Self {
        self.titles = Some(Arc::new(db.titles_repository()));
        self.requests = Some(Arc::new(db.requests_repository()));
        self.borrows = Some(Arc::new(db.borrows_repository()));
        self.waitlist = Some(Arc::new(db.waitlist_repository()));
        self
    }

    /// Populates every port with Postgres adapters over the pool.
    #[cfg(feature = "database")]
    pub fn with_postgres(mut self, db: Arc<PostgresDatabase>) -> Self {
        let pool = db.pool().clone();

        self.titles =
            Some(Arc::new(PostgresTitlesRepository::new(pool.clone())));
        self.requests =
            Some(Arc::new(PostgresRequestsRepository::new(pool.clone())));
        self.borrows =
            Some(Arc::new(PostgresBorrowsRepository::new(pool.clone())));
        self.waitlist = Some(Arc::new(PostgresWaitlistRepository::new(pool)));

        self
    }

    /// Builds a validated unit of work. Errors name the first missing
    /// repository; mixed backends are the caller's responsibility.
    pub fn build(self) -> Result<CirculationUnitOfWork, String> {
        Ok(CirculationUnitOfWork {
            titles: self
                .titles
                .ok_or_else(|| "missing TitlesRepository".to_string())?,
            requests: self
                .requests
                .ok_or_else(|| "missing RequestsRepository".to_string())?,
            borrows: self
                .borrows
                .ok_or_else(|| "missing BorrowsRepository".to_string())?,
            waitlist: self
                .waitlist
                .ok_or_else(|| "missing WaitlistRepository".to_string())?,
        })
    }
}
