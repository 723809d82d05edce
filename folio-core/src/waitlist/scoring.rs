use folio_model::{ReturnHistory, ScoreBreakdown};

/// Weight of one full day spent waiting.
pub const WAITING_DAY_WEIGHT: f64 = 1.0;
/// Flat bonus while the patron holds an active premium membership.
pub const PREMIUM_BONUS: f64 = 8.0;

// Per-event deductions for a patron's return record, each capped so a
// long history cannot bury them at the bottom of every queue forever.
pub const LATE_RETURN_WEIGHT: f64 = 3.0;
pub const LATE_RETURN_CAP: u32 = 5;
pub const DAMAGED_RETURN_WEIGHT: f64 = 8.0;
pub const DAMAGED_RETURN_CAP: u32 = 3;
pub const LOST_RETURN_WEIGHT: f64 = 15.0;
pub const LOST_RETURN_CAP: u32 = 2;

/// Non-positive deduction derived from the patron's return history.
pub fn history_penalty(history: &ReturnHistory) -> f64 {
    let late = f64::from(history.late_returns.min(LATE_RETURN_CAP));
    let damaged = f64::from(history.damaged_returns.min(DAMAGED_RETURN_CAP));
    let lost = f64::from(history.lost_returns.min(LOST_RETURN_CAP));

    -(late * LATE_RETURN_WEIGHT)
        - damaged * DAMAGED_RETURN_WEIGHT
        - lost * LOST_RETURN_WEIGHT
}

/// Scores one waiter at a fixed instant. The total orders the queue
/// descending; ties fall back to join order.
pub fn breakdown(
    waiting_days: i64,
    premium: bool,
    history: &ReturnHistory,
) -> ScoreBreakdown {
    ScoreBreakdown {
        waiting: waiting_days as f64 * WAITING_DAY_WEIGHT,
        membership_bonus: if premium { PREMIUM_BONUS } else { 0.0 },
        history_penalty: history_penalty(history),
    }
}
