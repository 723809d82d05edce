use chrono::{DateTime, Utc};

use crate::ids::{PatronId, TitleId, WaitlistEntryId};

/// The additive components of a waitlist priority score.
///
/// Kept alongside the total so queue views can show a patron why they
/// rank where they do.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScoreBreakdown {
    /// `waiting_days` weighted at 1.0 per day.
    pub waiting: f64,
    /// Flat bonus for an active premium membership.
    pub membership_bonus: f64,
    /// Non-positive deduction from late, damaged and lost returns.
    pub history_penalty: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.waiting + self.membership_bonus + self.history_penalty
    }
}

/// A standing claim on the next free copy of a title.
///
/// At most one active entry exists per (patron, title) pair. Leaving or
/// being allocated deactivates the entry; a later join reactivates it
/// with a fresh `joined_at` rather than inserting a duplicate.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WaitlistEntry {
    pub id: WaitlistEntryId,
    pub title_id: TitleId,
    pub patron_id: PatronId,
    pub joined_at: DateTime<Utc>,
    pub is_active: bool,
    pub priority_score: f64,
    pub breakdown: ScoreBreakdown,
    /// 1-based rank among the title's active entries; 0 once inactive.
    pub queue_position: u32,
    pub waiting_days: i64,
}

impl WaitlistEntry {
    pub fn new(title_id: TitleId, patron_id: PatronId) -> Self {
        Self {
            id: WaitlistEntryId::new(),
            title_id,
            patron_id,
            joined_at: Utc::now(),
            is_active: true,
            priority_score: 0.0,
            breakdown: ScoreBreakdown::default(),
            queue_position: 0,
            waiting_days: 0,
        }
    }

    /// Display heuristic only; one position is assumed to clear a week.
    pub fn estimated_wait_days(&self) -> i64 {
        i64::from(self.queue_position) * 7
    }

    /// Whole days since the entry joined (or last rejoined), floored at 0.
    pub fn waiting_days_at(&self, now: DateTime<Utc>) -> i64 {
        (now - self.joined_at).num_days().max(0)
    }
}
