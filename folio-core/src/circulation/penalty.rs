use chrono::{DateTime, Utc};
use folio_model::{BorrowStatus, PenaltyType};
use rust_decimal::Decimal;

/// Physical condition a copy comes back in, as reported at the desk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnCondition {
    #[default]
    Intact,
    Damaged,
    Lost,
}

/// One assessed return: terminal status plus the charge it carries.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub status: BorrowStatus,
    pub penalty_amount: Decimal,
    pub penalty_type: Option<PenaltyType>,
}

/// Whole days the return landed past the due date, floored at zero.
/// A copy back within the due day is not late.
pub fn days_late(due_date: DateTime<Utc>, returned_at: DateTime<Utc>) -> i64 {
    (returned_at - due_date).num_days().max(0)
}

/// Grades a return and prices its penalty.
///
/// Condition outranks lateness: a lost copy is LOST and a damaged copy
/// is DAMAGED even when it also came back late, and both charge the
/// full replacement price. Only an intact late copy is LATE_RETURNED,
/// at `days_late` times `late_fee_rate` of the price per day.
pub fn assess(
    condition: ReturnCondition,
    days_late: i64,
    mrp: Decimal,
    late_fee_rate: Decimal,
) -> Assessment {
    match condition {
        ReturnCondition::Lost => Assessment {
            status: BorrowStatus::Lost,
            penalty_amount: mrp.round_dp(2),
            penalty_type: Some(PenaltyType::Lost),
        },
        ReturnCondition::Damaged => Assessment {
            status: BorrowStatus::Damaged,
            penalty_amount: mrp.round_dp(2),
            penalty_type: Some(PenaltyType::Damaged),
        },
        ReturnCondition::Intact if days_late > 0 => Assessment {
            status: BorrowStatus::LateReturned,
            penalty_amount: (Decimal::from(days_late) * mrp * late_fee_rate)
                .round_dp(2),
            penalty_type: Some(PenaltyType::Late),
        },
        ReturnCondition::Intact => Assessment {
            status: BorrowStatus::Returned,
            penalty_amount: Decimal::ZERO,
            penalty_type: None,
        },
    }
}
