//! Waitlist ordering, membership weighting, and freed-copy offers.

use anyhow::Result;
use chrono::{Duration, Utc};
use folio_core::CirculationError;
use folio_core::circulation::ReturnCondition;
use folio_core::providers::EventKind;
use folio_model::{PatronId, StaffId};

#[path = "support/mod.rs"]
mod support;

use support::circulation::TestCirculationHarness;

#[tokio::test]
async fn waiters_with_equal_scores_queue_in_join_order() -> Result<()> {
    let harness = TestCirculationHarness::new()?;
    let title = harness.stock_title("Tehanu", 1).await?;
    let borrower = PatronId::new();
    harness.approved_loan(borrower, title).await?;

    let early = PatronId::new();
    let late = PatronId::new();
    harness.facade().waitlist().join(early, title).await?;
    harness.facade().waitlist().join(late, title).await?;

    let queue = harness.facade().waitlist().queue(title).await?;
    assert_eq!(queue.len(), 2);
    assert_eq!(queue[0].patron_id, early);
    assert_eq!(queue[0].queue_position, 1);
    assert_eq!(queue[1].patron_id, late);
    assert_eq!(queue[1].queue_position, 2);

    // One active entry per patron and title.
    let again = harness.facade().waitlist().join(early, title).await;
    assert!(matches!(again, Err(CirculationError::Conflict(_))));
    Ok(())
}

#[tokio::test]
async fn premium_membership_outranks_a_head_start() -> Result<()> {
    let harness = TestCirculationHarness::new()?;
    let title = harness.stock_title("The Farthest Shore", 1).await?;
    harness.approved_loan(PatronId::new(), title).await?;

    let standard = PatronId::new();
    let member = PatronId::new();
    harness.facade().waitlist().join(standard, title).await?;
    harness.facade().waitlist().join(member, title).await?;
    harness.subscriptions().grant_premium(member);

    // The stored ranking predates the membership change.
    let stale = harness.facade().waitlist().queue(title).await?;
    assert_eq!(stale[0].patron_id, standard);

    let fresh = harness.facade().waitlist().snapshot(title).await?;
    assert_eq!(fresh[0].patron_id, member);
    assert_eq!(fresh[0].breakdown.membership_bonus, 8.0);
    assert_eq!(fresh[0].estimated_wait_days(), 7);
    assert_eq!(fresh[1].patron_id, standard);
    assert_eq!(fresh[1].estimated_wait_days(), 14);
    Ok(())
}

#[tokio::test]
async fn a_freed_copy_is_offered_to_the_top_waiter_first() -> Result<()> {
    let harness = TestCirculationHarness::new()?;
    let title = harness.stock_title("The Other Wind", 1).await?;
    let borrower = PatronId::new();
    let (_, borrow_id) = harness.approved_loan(borrower, title).await?;

    let waiter = PatronId::new();
    harness.facade().waitlist().join(waiter, title).await?;
    harness.drain_notifications().await;

    harness
        .facade()
        .circulation()
        .return_book(borrow_id, Utc::now(), ReturnCondition::Intact)
        .await?;

    let entry = harness
        .facade()
        .waitlist()
        .entry(waiter, title)
        .await?
        .expect("the claimed entry is kept for history");
    assert!(!entry.is_active, "allocation retires the entry");
    assert!(harness.facade().waitlist().queue(title).await?.is_empty());

    let events = harness.drain_notifications().await;
    assert!(
        events
            .iter()
            .any(|(to, kind, _)| *to == waiter
                && *kind == EventKind::CopyAvailable),
        "the winner should be told a copy is free"
    );

    // The offered copy is on the shelf for the winner's request.
    harness.approved_loan(waiter, title).await?;
    Ok(())
}

#[tokio::test]
async fn leaving_and_rejoining_reuses_one_entry() -> Result<()> {
    let harness = TestCirculationHarness::new()?;
    let title = harness.stock_title("Tales from Earthsea", 1).await?;
    harness.approved_loan(PatronId::new(), title).await?;

    let patron = PatronId::new();
    let first = harness.facade().waitlist().join(patron, title).await?;
    harness.facade().waitlist().leave(patron, title).await?;
    assert!(harness.facade().waitlist().queue(title).await?.is_empty());

    let gone = harness.facade().waitlist().leave(patron, title).await;
    assert!(matches!(gone, Err(CirculationError::NotFound(_))));

    let second = harness.facade().waitlist().join(patron, title).await?;
    assert_eq!(second.id, first.id, "the old row is reactivated");
    assert!(second.is_active);
    assert_eq!(second.queue_position, 1);
    Ok(())
}

#[tokio::test]
async fn each_return_feeds_exactly_one_waiter() -> Result<()> {
    let harness = TestCirculationHarness::new()?;
    let title = harness.stock_title("The Beginning Place", 2).await?;
    let first_borrower = PatronId::new();
    let second_borrower = PatronId::new();
    let (_, first_loan) = harness.approved_loan(first_borrower, title).await?;
    let (_, second_loan) =
        harness.approved_loan(second_borrower, title).await?;

    let head = PatronId::new();
    let tail = PatronId::new();
    harness.facade().waitlist().join(head, title).await?;
    harness.facade().waitlist().join(tail, title).await?;

    harness
        .facade()
        .circulation()
        .return_book(first_loan, Utc::now(), ReturnCondition::Intact)
        .await?;
    let head_entry = harness
        .facade()
        .waitlist()
        .entry(head, title)
        .await?
        .expect("entry kept after allocation");
    assert!(!head_entry.is_active);
    let tail_entry = harness
        .facade()
        .waitlist()
        .entry(tail, title)
        .await?
        .expect("entry still queued");
    assert!(tail_entry.is_active, "one return claims one waiter");

    harness
        .facade()
        .circulation()
        .return_book(second_loan, Utc::now(), ReturnCondition::Intact)
        .await?;
    assert!(harness.facade().waitlist().queue(title).await?.is_empty());

    let nobody = harness.facade().waitlist().allocate_next(title).await?;
    assert!(nobody.is_none(), "an empty queue allocates nothing");
    Ok(())
}

#[tokio::test]
async fn a_record_of_late_returns_drags_the_rank_down() -> Result<()> {
    let harness = TestCirculationHarness::new()?;
    let sloppy = PatronId::new();

    // One late return on an unrelated title puts a mark on the history.
    let other = harness.stock_title("Orsinian Tales", 1).await?;
    let request = harness.facade().requests().create(sloppy, other).await?;
    let overdue_since = Utc::now() - Duration::days(4);
    let approved = harness
        .facade()
        .requests()
        .approve(request.id, StaffId::new(), Some(overdue_since))
        .await?;
    harness
        .facade()
        .circulation()
        .return_book(
            approved.issued_record_id.expect("lease id"),
            Utc::now(),
            ReturnCondition::Intact,
        )
        .await?;

    let contested = harness.stock_title("Searoad", 1).await?;
    harness.approved_loan(PatronId::new(), contested).await?;

    let punctual = PatronId::new();
    harness.facade().waitlist().join(sloppy, contested).await?;
    harness.facade().waitlist().join(punctual, contested).await?;

    let queue = harness.facade().waitlist().queue(contested).await?;
    assert_eq!(queue[0].patron_id, punctual);
    assert_eq!(queue[1].patron_id, sloppy);
    assert_eq!(queue[1].breakdown.history_penalty, -3.0);
    Ok(())
}
