use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use folio_model::{
    BorrowRequest, PatronId, RequestId, RequestStatus, StaffId, TitleId,
};
use serde_json::json;
use tracing::{debug, error, info};

use crate::circulation::CirculationService;
use crate::database::ports::requests::RequestsRepository;
use crate::error::{CirculationError, Result};
use crate::ledger::InventoryLedger;
use crate::policy::LendingPolicy;
use crate::providers::{
    CatalogProvider, EventKind, NotificationSink, SubscriptionOracle, dispatch,
};

/// Outcome of a batch approval. Items fail independently; one stuck
/// request never poisons the rest of the batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkApprovalReport {
    pub approved: u32,
    pub failed: u32,
    pub failures: Vec<BulkApprovalFailure>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkApprovalFailure {
    pub request_id: RequestId,
    pub reason: String,
}

/// The request state machine: PENDING, then exactly one of APPROVED or
/// REJECTED.
///
/// Approval composes the ledger reservation and the lease issue as one
/// all-or-nothing unit: any failure after a successful reserve puts the
/// copy back before the error reaches the caller.
#[derive(Clone)]
pub struct RequestService {
    requests: Arc<dyn RequestsRepository>,
    ledger: InventoryLedger,
    circulation: CirculationService,
    subscriptions: Arc<dyn SubscriptionOracle>,
    catalog: Arc<dyn CatalogProvider>,
    notifications: Arc<dyn NotificationSink>,
    policy: LendingPolicy,
}

impl fmt::Debug for RequestService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestService")
            .field("requests_repo", &Arc::strong_count(&self.requests))
            .field("policy", &self.policy)
            .finish()
    }
}

impl RequestService {
    pub fn new(
        requests: Arc<dyn RequestsRepository>,
        ledger: InventoryLedger,
        circulation: CirculationService,
        subscriptions: Arc<dyn SubscriptionOracle>,
        catalog: Arc<dyn CatalogProvider>,
        notifications: Arc<dyn NotificationSink>,
        policy: LendingPolicy,
    ) -> Self {
        Self {
            requests,
            ledger,
            circulation,
            subscriptions,
            catalog,
            notifications,
            policy,
        }
    }

    /// Files a new borrow request for the patron.
    ///
    /// Guards run in order: no duplicate interest in the title, monthly
    /// quota for standard members, then access level of the title.
    pub async fn create(
        &self,
        patron_id: PatronId,
        title_id: TitleId,
    ) -> Result<BorrowRequest> {
        if self.requests.has_open_interest(patron_id, title_id).await? {
            return Err(CirculationError::DuplicateOrActiveRequest);
        }

        let premium = self.subscriptions.is_premium(patron_id).await?;
        if !premium {
            let (from, until) = month_window(Utc::now());
            let filed = self
                .requests
                .count_in_window(patron_id, from, until)
                .await?;
            if filed >= self.policy.monthly_request_quota {
                return Err(CirculationError::MonthlyQuotaExceeded {
                    limit: self.policy.monthly_request_quota,
                });
            }
        }

        let entry = self.catalog.lookup(title_id).await?;
        if entry.is_premium_only() && !premium {
            return Err(CirculationError::AccessDenied);
        }

        let request = BorrowRequest::new(title_id, patron_id);
        // A patron racing themselves can slip past the interest check;
        // the storage uniqueness guard catches that as a duplicate.
        self.requests.insert(&request).await.map_err(|err| match err {
            CirculationError::Conflict(_) => {
                CirculationError::DuplicateOrActiveRequest
            }
            other => other,
        })?;

        debug!(request_id = %request.id, %patron_id, %title_id, "Filed borrow request");
        Ok(request)
    }

    /// Approves a pending request: reserve a copy, issue the lease,
    /// mark the request.
    ///
    /// The due date is the override when given, otherwise now plus the
    /// patron's loan duration. On any failure past the reservation the
    /// copy is released again and the request stays PENDING.
    pub async fn approve(
        &self,
        request_id: RequestId,
        processed_by: StaffId,
        due_date_override: Option<DateTime<Utc>>,
    ) -> Result<BorrowRequest> {
        let request = self.requests.get(request_id).await?.ok_or_else(|| {
            CirculationError::NotFound(format!("request {request_id}"))
        })?;
        if request.status != RequestStatus::Pending {
            return Err(CirculationError::InvalidStateTransition {
                id: request_id,
                status: request.status,
            });
        }

        let now = Utc::now();
        let due_date = match due_date_override {
            Some(due) => due,
            None => {
                let days = self
                    .subscriptions
                    .loan_duration_days(request.patron_id)
                    .await?;
                now + Duration::days(days)
            }
        };

        self.ledger.reserve(request.title_id).await?;

        let record = match self
            .circulation
            .issue(request.patron_id, request.title_id, due_date)
            .await
        {
            Ok(record) => record,
            Err(err) => {
                self.unwind_reservation(request.title_id).await;
                return Err(err);
            }
        };

        if !self
            .requests
            .mark_approved(request_id, record.id, processed_by, now)
            .await?
        {
            // Another decision landed first. Unwind the lease and the
            // reservation, then report the state that beat us.
            if let Err(err) = self.circulation.rescind(record.id).await {
                error!(
                    borrow_id = %record.id,
                    error = %err,
                    "Failed to rescind lease while unwinding approval"
                );
            }
            self.unwind_reservation(request.title_id).await;

            return Err(match self.requests.get(request_id).await? {
                Some(current) => CirculationError::InvalidStateTransition {
                    id: request_id,
                    status: current.status,
                },
                None => CirculationError::NotFound(format!(
                    "request {request_id}"
                )),
            });
        }

        info!(
            %request_id,
            patron_id = %request.patron_id,
            title_id = %request.title_id,
            borrow_id = %record.id,
            "Approved borrow request"
        );
        dispatch(
            self.notifications.clone(),
            request.patron_id,
            EventKind::RequestApproved,
            json!({
                "request_id": request_id,
                "title_id": request.title_id,
                "due_date": due_date,
            }),
        );

        let mut approved = request;
        approved.status = RequestStatus::Approved;
        approved.issued_record_id = Some(record.id);
        approved.processed_by = Some(processed_by);
        approved.processed_at = Some(now);
        Ok(approved)
    }

    /// Rejects a pending request with a staff-supplied reason.
    pub async fn reject(
        &self,
        request_id: RequestId,
        processed_by: StaffId,
        reason: &str,
    ) -> Result<BorrowRequest> {
        let request = self.requests.get(request_id).await?.ok_or_else(|| {
            CirculationError::NotFound(format!("request {request_id}"))
        })?;
        if request.status != RequestStatus::Pending {
            return Err(CirculationError::InvalidStateTransition {
                id: request_id,
                status: request.status,
            });
        }

        let now = Utc::now();
        if !self
            .requests
            .mark_rejected(request_id, processed_by, reason, now)
            .await?
        {
            return Err(match self.requests.get(request_id).await? {
                Some(current) => CirculationError::InvalidStateTransition {
                    id: request_id,
                    status: current.status,
                },
                None => CirculationError::NotFound(format!(
                    "request {request_id}"
                )),
            });
        }

        info!(%request_id, patron_id = %request.patron_id, "Rejected borrow request");
        dispatch(
            self.notifications.clone(),
            request.patron_id,
            EventKind::RequestRejected,
            json!({ "request_id": request_id, "reason": reason }),
        );

        let mut rejected = request;
        rejected.status = RequestStatus::Rejected;
        rejected.reason = Some(reason.to_string());
        rejected.processed_by = Some(processed_by);
        rejected.processed_at = Some(now);
        Ok(rejected)
    }

    /// Approves each id independently and reports per-id outcomes.
    pub async fn bulk_approve(
        &self,
        request_ids: &[RequestId],
        processed_by: StaffId,
    ) -> BulkApprovalReport {
        let mut report = BulkApprovalReport::default();
        for &request_id in request_ids {
            match self.approve(request_id, processed_by, None).await {
                Ok(_) => report.approved += 1,
                Err(err) => {
                    report.failed += 1;
                    report.failures.push(BulkApprovalFailure {
                        request_id,
                        reason: err.to_string(),
                    });
                }
            }
        }
        info!(
            approved = report.approved,
            failed = report.failed,
            "Bulk approval finished"
        );
        report
    }

    pub async fn request(&self, id: RequestId) -> Result<BorrowRequest> {
        self.requests.get(id).await?.ok_or_else(|| {
            CirculationError::NotFound(format!("request {id}"))
        })
    }

    pub async fn list_pending(&self) -> Result<Vec<BorrowRequest>> {
        self.requests.list_pending().await
    }

    pub async fn list_for_patron(
        &self,
        patron_id: PatronId,
    ) -> Result<Vec<BorrowRequest>> {
        self.requests.list_for_patron(patron_id).await
    }

    /// Best-effort release after a failed approval step. The original
    /// error is what the caller sees; a failed unwind is only logged.
    async fn unwind_reservation(&self, title_id: TitleId) {
        if let Err(err) = self.ledger.release(title_id).await {
            error!(
                %title_id,
                error = %err,
                "Failed to release reservation while unwinding approval"
            );
        }
    }
}

/// Calendar-month window `[first of this month, first of next)` in UTC.
fn month_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let (year, month) = (now.year(), now.month());
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    (month_start(year, month), month_start(next_year, next_month))
}

fn month_start(year: i32, month: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .expect("first day of a real month")
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time")
        .and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use folio_model::{AccessLevel, CatalogEntry};
    use rust_decimal_macros::dec;

    use crate::circulation::ReturnCondition;
    use crate::database::infrastructure::memory::InMemoryDatabase;
    use crate::database::ports::borrows::MockBorrowsRepository;
    use crate::providers::{
        LogNotificationSink, StaticCatalog, StaticSubscriptionOracle,
    };
    use crate::waitlist::WaitlistService;

    struct Fixture {
        service: RequestService,
        circulation: CirculationService,
        ledger: InventoryLedger,
        catalog: Arc<StaticCatalog>,
        subscriptions: Arc<StaticSubscriptionOracle>,
    }

    fn fixture() -> Fixture {
        let db = InMemoryDatabase::new();
        build_fixture(db.clone(), Arc::new(db.borrows_repository()))
    }

    /// Same wiring as `fixture`, but leases persist through the given
    /// repository so tests can make the issue step fail.
    fn fixture_with_borrows(
        borrows: Arc<dyn crate::database::ports::borrows::BorrowsRepository>,
    ) -> Fixture {
        build_fixture(InMemoryDatabase::new(), borrows)
    }

    fn build_fixture(
        db: InMemoryDatabase,
        borrows: Arc<dyn crate::database::ports::borrows::BorrowsRepository>,
    ) -> Fixture {
        let ledger = InventoryLedger::new(Arc::new(db.titles_repository()));
        let catalog = Arc::new(StaticCatalog::new());
        let subscriptions = Arc::new(StaticSubscriptionOracle::default());
        let notifications = Arc::new(LogNotificationSink);
        let waitlist = WaitlistService::new(
            Arc::new(db.waitlist_repository()),
            borrows.clone(),
            subscriptions.clone(),
            notifications.clone(),
        );
        let circulation = CirculationService::new(
            borrows,
            ledger.clone(),
            waitlist,
            catalog.clone(),
            notifications.clone(),
            LendingPolicy::default(),
        );
        let service = RequestService::new(
            Arc::new(db.requests_repository()),
            ledger.clone(),
            circulation.clone(),
            subscriptions.clone(),
            catalog.clone(),
            notifications,
            LendingPolicy::default(),
        );
        Fixture {
            service,
            circulation,
            ledger,
            catalog,
            subscriptions,
        }
    }

    impl Fixture {
        async fn stocked_title(&self, copies: i32) -> TitleId {
            self.titled(copies, AccessLevel::Normal).await
        }

        async fn titled(&self, copies: i32, access: AccessLevel) -> TitleId {
            let title = self.ledger.add_title("Foundation", copies).await.unwrap();
            self.catalog.insert(
                title.id,
                CatalogEntry::new("Foundation", dec!(100), access),
            );
            title.id
        }
    }

    #[tokio::test]
    async fn duplicate_pending_request_is_refused() {
        let fx = fixture();
        let title = fx.stocked_title(2).await;
        let patron = PatronId::new();

        fx.service.create(patron, title).await.unwrap();
        assert!(matches!(
            fx.service.create(patron, title).await,
            Err(CirculationError::DuplicateOrActiveRequest)
        ));
    }

    #[tokio::test]
    async fn open_loan_blocks_a_new_request_until_returned() {
        let fx = fixture();
        let title = fx.stocked_title(2).await;
        let patron = PatronId::new();

        let request = fx.service.create(patron, title).await.unwrap();
        let approved = fx
            .service
            .approve(request.id, StaffId::new(), None)
            .await
            .unwrap();

        assert!(matches!(
            fx.service.create(patron, title).await,
            Err(CirculationError::DuplicateOrActiveRequest)
        ));

        fx.circulation
            .return_book(
                approved.issued_record_id.unwrap(),
                Utc::now(),
                ReturnCondition::Intact,
            )
            .await
            .unwrap();
        fx.service.create(patron, title).await.unwrap();
    }

    #[tokio::test]
    async fn fourth_request_in_a_month_hits_the_quota() {
        let fx = fixture();
        let patron = PatronId::new();
        for _ in 0..3 {
            let title = fx.stocked_title(1).await;
            fx.service.create(patron, title).await.unwrap();
        }

        let fourth = fx.stocked_title(1).await;
        assert!(matches!(
            fx.service.create(patron, fourth).await,
            Err(CirculationError::MonthlyQuotaExceeded { limit: 3 })
        ));
    }

    #[tokio::test]
    async fn premium_members_are_exempt_from_the_quota() {
        let fx = fixture();
        let patron = PatronId::new();
        fx.subscriptions.grant_premium(patron);

        for _ in 0..5 {
            let title = fx.stocked_title(1).await;
            fx.service.create(patron, title).await.unwrap();
        }
    }

    #[tokio::test]
    async fn premium_title_requires_membership() {
        let fx = fixture();
        let title = fx.titled(1, AccessLevel::Premium).await;
        let standard = PatronId::new();
        let premium = PatronId::new();
        fx.subscriptions.grant_premium(premium);

        assert!(matches!(
            fx.service.create(standard, title).await,
            Err(CirculationError::AccessDenied)
        ));
        fx.service.create(premium, title).await.unwrap();
    }

    #[tokio::test]
    async fn approval_reserves_a_copy_and_links_the_lease() {
        let fx = fixture();
        let title = fx.stocked_title(1).await;
        let patron = PatronId::new();
        let staff = StaffId::new();

        let request = fx.service.create(patron, title).await.unwrap();
        let approved = fx.service.approve(request.id, staff, None).await.unwrap();

        assert_eq!(approved.status, RequestStatus::Approved);
        assert_eq!(approved.processed_by, Some(staff));
        let borrow_id = approved.issued_record_id.unwrap();

        let record = fx.circulation.record(borrow_id).await.unwrap();
        let loan_days = (record.due_date - record.borrowed_at).num_days();
        assert!((13..=14).contains(&loan_days), "standard loan is 14 days");

        let stock = fx.ledger.title(title).await.unwrap();
        assert_eq!(stock.available, 0);
        assert_eq!(stock.issued, 1);
    }

    #[tokio::test]
    async fn premium_patrons_get_the_long_loan() {
        let fx = fixture();
        let title = fx.stocked_title(1).await;
        let patron = PatronId::new();
        fx.subscriptions.grant_premium(patron);

        let request = fx.service.create(patron, title).await.unwrap();
        let approved = fx
            .service
            .approve(request.id, StaffId::new(), None)
            .await
            .unwrap();

        let record = fx
            .circulation
            .record(approved.issued_record_id.unwrap())
            .await
            .unwrap();
        let loan_days = (record.due_date - record.borrowed_at).num_days();
        assert!((29..=30).contains(&loan_days), "premium loan is 30 days");
    }

    #[tokio::test]
    async fn due_date_override_wins_over_the_policy() {
        let fx = fixture();
        let title = fx.stocked_title(1).await;
        let request = fx
            .service
            .create(PatronId::new(), title)
            .await
            .unwrap();

        let due = Utc.with_ymd_and_hms(2026, 12, 24, 12, 0, 0).unwrap();
        let approved = fx
            .service
            .approve(request.id, StaffId::new(), Some(due))
            .await
            .unwrap();

        let record = fx
            .circulation
            .record(approved.issued_record_id.unwrap())
            .await
            .unwrap();
        assert_eq!(record.due_date, due);
    }

    #[tokio::test]
    async fn deciding_a_decided_request_is_an_invalid_transition() {
        let fx = fixture();
        let title = fx.stocked_title(2).await;
        let staff = StaffId::new();
        let request = fx
            .service
            .create(PatronId::new(), title)
            .await
            .unwrap();

        fx.service.approve(request.id, staff, None).await.unwrap();
        assert!(matches!(
            fx.service.approve(request.id, staff, None).await,
            Err(CirculationError::InvalidStateTransition {
                status: RequestStatus::Approved,
                ..
            })
        ));
        assert!(matches!(
            fx.service.reject(request.id, staff, "late").await,
            Err(CirculationError::InvalidStateTransition { .. })
        ));
    }

    #[tokio::test]
    async fn exhausted_stock_leaves_the_request_pending() {
        let fx = fixture();
        let title = fx.stocked_title(1).await;
        let staff = StaffId::new();

        let first = fx.service.create(PatronId::new(), title).await.unwrap();
        let second = fx.service.create(PatronId::new(), title).await.unwrap();

        fx.service.approve(first.id, staff, None).await.unwrap();
        assert!(matches!(
            fx.service.approve(second.id, staff, None).await,
            Err(CirculationError::OutOfStock(_))
        ));

        let still_pending = fx.service.request(second.id).await.unwrap();
        assert_eq!(still_pending.status, RequestStatus::Pending);
        let stock = fx.ledger.title(title).await.unwrap();
        assert_eq!(stock.available, 0);
        assert_eq!(stock.issued, 1);
    }

    #[tokio::test]
    async fn failed_issue_rolls_the_reservation_back() {
        let mut borrows = MockBorrowsRepository::new();
        borrows.expect_insert().returning(|_| {
            Err(CirculationError::Internal("lease store is down".into()))
        });
        let fx = fixture_with_borrows(Arc::new(borrows));

        let title = fx.stocked_title(1).await;
        let request = fx
            .service
            .create(PatronId::new(), title)
            .await
            .unwrap();

        assert!(matches!(
            fx.service.approve(request.id, StaffId::new(), None).await,
            Err(CirculationError::Internal(_))
        ));

        // Counters exactly as before the call, and the request is
        // still open for a retry.
        let stock = fx.ledger.title(title).await.unwrap();
        assert_eq!(stock.available, 1);
        assert_eq!(stock.issued, 0);
        let request = fx.service.request(request.id).await.unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn rejection_records_the_reason() {
        let fx = fixture();
        let title = fx.stocked_title(1).await;
        let staff = StaffId::new();
        let request = fx
            .service
            .create(PatronId::new(), title)
            .await
            .unwrap();

        let rejected = fx
            .service
            .reject(request.id, staff, "title withdrawn from lending")
            .await
            .unwrap();
        assert_eq!(rejected.status, RequestStatus::Rejected);
        assert_eq!(
            rejected.reason.as_deref(),
            Some("title withdrawn from lending")
        );
        assert_eq!(rejected.processed_by, Some(staff));

        let stock = fx.ledger.title(title).await.unwrap();
        assert_eq!(stock.available, 1, "rejection never touches stock");
    }

    #[tokio::test]
    async fn bulk_approval_isolates_per_item_failures() {
        let fx = fixture();
        let title = fx.stocked_title(1).await;
        let staff = StaffId::new();

        let first = fx.service.create(PatronId::new(), title).await.unwrap();
        let second = fx.service.create(PatronId::new(), title).await.unwrap();
        let unknown = RequestId::new();

        let report = fx
            .service
            .bulk_approve(&[first.id, second.id, unknown], staff)
            .await;

        assert_eq!(report.approved, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].request_id, second.id);
        assert!(report.failures[0].reason.contains("no available copies"));
        assert_eq!(report.failures[1].request_id, unknown);
        assert!(report.failures[1].reason.contains("not found"));
    }

    #[test]
    fn month_window_spans_exactly_one_calendar_month() {
        let inside = Utc.with_ymd_and_hms(2026, 12, 15, 9, 30, 0).unwrap();
        let (from, until) = month_window(inside);
        assert_eq!(from, Utc.with_ymd_and_hms(2026, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(until, Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap());
    }
}
