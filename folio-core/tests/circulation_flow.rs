//! Full request-to-return walkthroughs against the assembled engine.

use anyhow::Result;
use chrono::{Duration, Utc};
use folio_core::CirculationError;
use folio_core::circulation::ReturnCondition;
use folio_core::providers::EventKind;
use folio_model::{
    BorrowStatus, PatronId, PenaltyStatus, PenaltyType, RequestStatus, StaffId,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[path = "support/mod.rs"]
mod support;

use support::circulation::TestCirculationHarness;

#[tokio::test]
async fn approval_turns_a_request_into_a_due_dated_loan() -> Result<()> {
    let harness = TestCirculationHarness::new()?;
    let patron = PatronId::new();
    let title = harness.stock_title("The Left Hand of Darkness", 2).await?;

    let request = harness.facade().requests().create(patron, title).await?;
    assert_eq!(request.status, RequestStatus::Pending);

    let staff = StaffId::new();
    let approved = harness
        .facade()
        .requests()
        .approve(request.id, staff, None)
        .await?;
    assert_eq!(approved.status, RequestStatus::Approved);
    assert_eq!(approved.processed_by, Some(staff));

    let borrow_id = approved
        .issued_record_id
        .expect("approval links the lease");
    let record = harness.facade().circulation().record(borrow_id).await?;
    assert_eq!(record.patron_id, patron);
    assert_eq!(record.title_id, title);
    assert_eq!(record.status, BorrowStatus::Borrowed);
    let loan_days = (record.due_date - Utc::now()).num_days();
    assert!(
        (13..=14).contains(&loan_days),
        "standard loan should run two weeks, got {loan_days} days"
    );

    let stock = harness.facade().ledger().title(title).await?;
    assert_eq!(stock.available, 1);
    assert_eq!(stock.issued, 1);

    let events = harness.drain_notifications().await;
    assert!(
        events
            .iter()
            .any(|(to, kind, _)| *to == patron
                && *kind == EventKind::RequestApproved),
        "the patron should hear about the approval"
    );
    Ok(())
}

#[tokio::test]
async fn an_on_time_return_restores_stock_without_charges() -> Result<()> {
    let harness = TestCirculationHarness::new()?;
    let patron = PatronId::new();
    let title = harness.stock_title("Rocannon's World", 1).await?;
    let (_, borrow_id) = harness.approved_loan(patron, title).await?;

    let closed = harness
        .facade()
        .circulation()
        .return_book(borrow_id, Utc::now(), ReturnCondition::Intact)
        .await?;
    assert_eq!(closed.status, BorrowStatus::Returned);
    assert_eq!(closed.penalty_amount, Decimal::ZERO);
    assert_eq!(closed.penalty_status, PenaltyStatus::None);

    let stock = harness.facade().ledger().title(title).await?;
    assert_eq!(stock.available, 1);
    assert_eq!(stock.issued, 0);

    // The lease is closed for good; a second drop-off is refused.
    let again = harness
        .facade()
        .circulation()
        .return_book(borrow_id, Utc::now(), ReturnCondition::Intact)
        .await;
    assert!(matches!(again, Err(CirculationError::Conflict(_))));
    Ok(())
}

#[tokio::test]
async fn a_late_return_is_charged_per_day_past_due() -> Result<()> {
    let harness = TestCirculationHarness::new()?;
    let patron = PatronId::new();
    let title = harness
        .stock_priced_title("The Dispossessed", 1, dec!(200.00))
        .await?;

    let request = harness.facade().requests().create(patron, title).await?;
    let overdue_since = Utc::now() - Duration::days(3) - Duration::hours(1);
    let approved = harness
        .facade()
        .requests()
        .approve(request.id, StaffId::new(), Some(overdue_since))
        .await?;
    let borrow_id = approved
        .issued_record_id
        .expect("approval links the lease");

    let closed = harness
        .facade()
        .circulation()
        .return_book(borrow_id, Utc::now(), ReturnCondition::Intact)
        .await?;
    assert_eq!(closed.status, BorrowStatus::LateReturned);
    assert_eq!(closed.penalty_amount, dec!(60.00));
    assert_eq!(closed.penalty_status, PenaltyStatus::Pending);
    assert_eq!(closed.penalty_type, Some(PenaltyType::Late));

    let events = harness.drain_notifications().await;
    let assessed = events
        .iter()
        .find(|(_, kind, _)| *kind == EventKind::PenaltyAssessed)
        .expect("a pending penalty is announced to the patron");
    assert_eq!(assessed.0, patron);
    assert_eq!(assessed.2["amount"], serde_json::json!("60.00"));
    Ok(())
}

#[tokio::test]
async fn a_lost_copy_is_billed_at_replacement_price() -> Result<()> {
    let harness = TestCirculationHarness::new()?;
    let patron = PatronId::new();
    let title = harness
        .stock_priced_title("Planet of Exile", 1, dec!(449.50))
        .await?;
    let (_, borrow_id) = harness.approved_loan(patron, title).await?;

    let closed = harness
        .facade()
        .circulation()
        .return_book(borrow_id, Utc::now(), ReturnCondition::Lost)
        .await?;
    assert_eq!(closed.status, BorrowStatus::Lost);
    assert_eq!(closed.penalty_amount, dec!(449.50));
    assert_eq!(closed.penalty_type, Some(PenaltyType::Lost));
    Ok(())
}

#[tokio::test]
async fn instalments_whittle_a_penalty_down_to_paid() -> Result<()> {
    let harness = TestCirculationHarness::new()?;
    let patron = PatronId::new();
    let title = harness
        .stock_priced_title("City of Illusions", 1, dec!(300.00))
        .await?;
    let (_, borrow_id) = harness.approved_loan(patron, title).await?;
    harness
        .facade()
        .circulation()
        .return_book(borrow_id, Utc::now(), ReturnCondition::Damaged)
        .await?;

    let after_first = harness
        .facade()
        .circulation()
        .pay_penalty(borrow_id, dec!(100.00))
        .await?;
    assert_eq!(after_first.penalty_status, PenaltyStatus::Pending);
    assert_eq!(after_first.penalty_outstanding, dec!(200.00));

    let overdraft = harness
        .facade()
        .circulation()
        .pay_penalty(borrow_id, dec!(250.00))
        .await;
    assert!(matches!(overdraft, Err(CirculationError::InvalidAmount(_))));

    let settled = harness
        .facade()
        .circulation()
        .pay_penalty(borrow_id, dec!(200.00))
        .await?;
    assert_eq!(settled.penalty_status, PenaltyStatus::Paid);
    assert_eq!(settled.penalty_outstanding, Decimal::ZERO);

    // Nothing left to collect.
    let extra = harness
        .facade()
        .circulation()
        .pay_penalty(borrow_id, dec!(1.00))
        .await;
    assert!(matches!(extra, Err(CirculationError::InvalidAmount(_))));
    Ok(())
}

#[tokio::test]
async fn a_waiver_writes_the_debt_off() -> Result<()> {
    let harness = TestCirculationHarness::new()?;
    let patron = PatronId::new();
    let title = harness.stock_title("The Word for World Is Forest", 1).await?;
    let (_, borrow_id) = harness.approved_loan(patron, title).await?;
    harness
        .facade()
        .circulation()
        .return_book(borrow_id, Utc::now(), ReturnCondition::Lost)
        .await?;

    let waived = harness
        .facade()
        .circulation()
        .waive_penalty(borrow_id)
        .await?;
    assert_eq!(waived.penalty_status, PenaltyStatus::Waived);
    assert_eq!(waived.penalty_outstanding, Decimal::ZERO);
    Ok(())
}

#[tokio::test]
async fn the_overdue_sweep_reminds_each_borrower_once() -> Result<()> {
    let harness = TestCirculationHarness::new()?;
    let patron = PatronId::new();
    let title = harness.stock_title("Malafrena", 1).await?;

    let request = harness.facade().requests().create(patron, title).await?;
    let overdue_since = Utc::now() - Duration::days(2);
    harness
        .facade()
        .requests()
        .approve(request.id, StaffId::new(), Some(overdue_since))
        .await?;
    harness.drain_notifications().await;

    let sweep = harness
        .facade()
        .reconciler()
        .sweep_overdue(Utc::now())
        .await?;
    assert_eq!(sweep.scanned, 1);
    assert_eq!(sweep.notified, 1);

    let events = harness.drain_notifications().await;
    assert!(
        events
            .iter()
            .any(|(to, kind, _)| *to == patron
                && *kind == EventKind::BorrowOverdue),
        "the borrower should get the overdue reminder"
    );

    // A second pass finds nothing new to say.
    let repeat = harness
        .facade()
        .reconciler()
        .sweep_overdue(Utc::now())
        .await?;
    assert_eq!(repeat.notified, 0);
    Ok(())
}
