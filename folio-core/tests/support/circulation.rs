use std::sync::Arc;

use anyhow::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use folio_core::database::InMemoryDatabase;
use folio_core::providers::{
    EventKind, RecordingNotificationSink, StaticCatalog,
    StaticSubscriptionOracle,
};
use folio_core::{CirculationFacade, CirculationUnitOfWork, LendingPolicy};
use folio_model::{
    AccessLevel, BorrowId, CatalogEntry, PatronId, RequestId, StaffId, TitleId,
};

/// Routes engine logs to the test writer when `RUST_LOG` asks for them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_test_writer()
        .try_init();
}

/// End-to-end circulation harness over the in-memory backend.
pub struct TestCirculationHarness {
    facade: CirculationFacade,
    catalog: Arc<StaticCatalog>,
    subscriptions: Arc<StaticSubscriptionOracle>,
    notifications: Arc<RecordingNotificationSink>,
}

impl TestCirculationHarness {
    /// Assembles every service over a fresh in-memory store with the
    /// default lending policy.
    pub fn new() -> Result<Self> {
        init_tracing();
        let db = InMemoryDatabase::new();
        let unit_of_work = Arc::new(
            CirculationUnitOfWork::from_in_memory(&db)
                .map_err(anyhow::Error::msg)?,
        );
        let catalog = Arc::new(StaticCatalog::new());
        let subscriptions = Arc::new(StaticSubscriptionOracle::default());
        let notifications = Arc::new(RecordingNotificationSink::new());
        let facade = CirculationFacade::assemble(
            unit_of_work,
            subscriptions.clone(),
            catalog.clone(),
            notifications.clone(),
            LendingPolicy::default(),
        );

        Ok(Self {
            facade,
            catalog,
            subscriptions,
            notifications,
        })
    }

    pub fn facade(&self) -> &CirculationFacade {
        &self.facade
    }

    pub fn subscriptions(&self) -> &StaticSubscriptionOracle {
        &self.subscriptions
    }

    /// Stocks copies of a title and lists it in the catalog at a
    /// nominal replacement price.
    pub async fn stock_title(
        &self,
        name: &str,
        copies: i32,
    ) -> Result<TitleId> {
        self.stock_priced_title(name, copies, dec!(350.00)).await
    }

    /// Stocks a title with an explicit replacement price for penalty
    /// assertions.
    pub async fn stock_priced_title(
        &self,
        name: &str,
        copies: i32,
        mrp: Decimal,
    ) -> Result<TitleId> {
        let title = self.facade.ledger().add_title(name, copies).await?;
        self.catalog.insert(
            title.id,
            CatalogEntry::new(name, mrp, AccessLevel::Normal),
        );
        Ok(title.id)
    }

    /// Walks a patron through request and approval, returning the
    /// request and the lease it produced.
    pub async fn approved_loan(
        &self,
        patron_id: PatronId,
        title_id: TitleId,
    ) -> Result<(RequestId, BorrowId)> {
        let request =
            self.facade.requests().create(patron_id, title_id).await?;
        let approved = self
            .facade
            .requests()
            .approve(request.id, StaffId::new(), None)
            .await?;
        let borrow_id = approved
            .issued_record_id
            .expect("approved request links its borrow record");
        Ok((request.id, borrow_id))
    }

    /// Lets fire-and-forget delivery tasks run, then drains the sink.
    pub async fn drain_notifications(
        &self,
    ) -> Vec<(PatronId, EventKind, serde_json::Value)> {
        tokio::task::yield_now().await;
        self.notifications.take()
    }
}
