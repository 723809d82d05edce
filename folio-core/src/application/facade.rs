use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::application::unit_of_work::CirculationUnitOfWork;
use crate::circulation::CirculationService;
use crate::ledger::InventoryLedger;
use crate::policy::LendingPolicy;
use crate::providers::{CatalogProvider, NotificationSink, SubscriptionOracle};
use crate::reconciler::{BackgroundReconciler, Reconciler};
use crate::requests::RequestService;
use crate::waitlist::WaitlistService;

/// Aggregates the engine's services over one unit of work.
///
/// Assembly is the only place the dependency graph between services is
/// spelled out; everything downstream borrows a ready-made service.
#[derive(Clone)]
pub struct CirculationFacade {
    ledger: InventoryLedger,
    requests: RequestService,
    circulation: CirculationService,
    waitlist: WaitlistService,
    reconciler: Reconciler,
    unit_of_work: Arc<CirculationUnitOfWork>,
}

impl fmt::Debug for CirculationFacade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CirculationFacade").finish_non_exhaustive()
    }
}

impl CirculationFacade {
    /// Wires every service against the unit of work and the external
    /// collaborators.
    pub fn assemble(
        unit_of_work: Arc<CirculationUnitOfWork>,
        subscriptions: Arc<dyn SubscriptionOracle>,
        catalog: Arc<dyn CatalogProvider>,
        notifications: Arc<dyn NotificationSink>,
        policy: LendingPolicy,
    ) -> Self {
        let ledger = InventoryLedger::new(unit_of_work.titles.clone());
        let waitlist = WaitlistService::new(
            unit_of_work.waitlist.clone(),
            unit_of_work.borrows.clone(),
            subscriptions.clone(),
            notifications.clone(),
        );
        let circulation = CirculationService::new(
            unit_of_work.borrows.clone(),
            ledger.clone(),
            waitlist.clone(),
            catalog.clone(),
            notifications.clone(),
            policy.clone(),
        );
        let requests = RequestService::new(
            unit_of_work.requests.clone(),
            ledger.clone(),
            circulation.clone(),
            subscriptions,
            catalog,
            notifications.clone(),
            policy,
        );
        let reconciler = Reconciler::new(
            unit_of_work.titles.clone(),
            unit_of_work.borrows.clone(),
            waitlist.clone(),
            notifications,
        );

        Self {
            ledger,
            requests,
            circulation,
            waitlist,
            reconciler,
            unit_of_work,
        }
    }

    pub fn ledger(&self) -> &InventoryLedger {
        &self.ledger
    }

    pub fn requests(&self) -> &RequestService {
        &self.requests
    }

    pub fn circulation(&self) -> &CirculationService {
        &self.circulation
    }

    pub fn waitlist(&self) -> &WaitlistService {
        &self.waitlist
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn unit_of_work(&self) -> Arc<CirculationUnitOfWork> {
        self.unit_of_work.clone()
    }

    /// Starts the periodic overdue sweep and waitlist refresh.
    pub fn spawn_reconciler(&self, cadence: Duration) -> BackgroundReconciler {
        BackgroundReconciler::spawn(self.reconciler.clone(), cadence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_model::{AccessLevel, CatalogEntry, PatronId, StaffId};
    use rust_decimal_macros::dec;

    use crate::database::infrastructure::memory::InMemoryDatabase;
    use crate::providers::{
        LogNotificationSink, StaticCatalog, StaticSubscriptionOracle,
    };

    #[tokio::test]
    async fn assembled_services_share_one_store() {
        let db = InMemoryDatabase::new();
        let unit_of_work =
            CirculationUnitOfWork::from_in_memory(&db).expect("built");
        let catalog = Arc::new(StaticCatalog::new());
        let facade = CirculationFacade::assemble(
            Arc::new(unit_of_work),
            Arc::new(StaticSubscriptionOracle::default()),
            catalog.clone(),
            Arc::new(LogNotificationSink),
            LendingPolicy::default(),
        );

        let title = facade.ledger().add_title("Dune", 1).await.unwrap();
        catalog.insert(
            title.id,
            CatalogEntry::new("Dune", dec!(100), AccessLevel::Normal),
        );

        let request = facade
            .requests()
            .create(PatronId::new(), title.id)
            .await
            .unwrap();
        let approved = facade
            .requests()
            .approve(request.id, StaffId::new(), None)
            .await
            .unwrap();

        let loans = facade
            .circulation()
            .open_loans(request.patron_id)
            .await
            .unwrap();
        assert_eq!(loans.len(), 1);
        assert_eq!(Some(loans[0].id), approved.issued_record_id);

        let stock = facade.ledger().title(title.id).await.unwrap();
        assert_eq!(stock.available, 0);
        assert_eq!(stock.issued, 1);
    }
}
