use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::{ModelError, Result};
use crate::ids::{BorrowId, PatronId, TitleId};

/// State of a borrow record, fixed at return time.
///
/// `Borrowed` is the only open state. The four closed states record how
/// the loan ended; a closed record is never re-opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum BorrowStatus {
    Borrowed,
    Returned,
    LateReturned,
    Lost,
    Damaged,
}

impl BorrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BorrowStatus::Borrowed => "BORROWED",
            BorrowStatus::Returned => "RETURNED",
            BorrowStatus::LateReturned => "LATE_RETURNED",
            BorrowStatus::Lost => "LOST",
            BorrowStatus::Damaged => "DAMAGED",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "BORROWED" => Ok(BorrowStatus::Borrowed),
            "RETURNED" => Ok(BorrowStatus::Returned),
            "LATE_RETURNED" => Ok(BorrowStatus::LateReturned),
            "LOST" => Ok(BorrowStatus::Lost),
            "DAMAGED" => Ok(BorrowStatus::Damaged),
            other => Err(ModelError::UnknownStatus {
                kind: "borrow status",
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for BorrowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settlement state of the penalty attached to a borrow record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum PenaltyStatus {
    /// No penalty was assessed for this loan.
    None,
    /// Assessed and not yet fully settled.
    Pending,
    Paid,
    Waived,
}

impl PenaltyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PenaltyStatus::None => "NONE",
            PenaltyStatus::Pending => "PENDING",
            PenaltyStatus::Paid => "PAID",
            PenaltyStatus::Waived => "WAIVED",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "NONE" => Ok(PenaltyStatus::None),
            "PENDING" => Ok(PenaltyStatus::Pending),
            "PAID" => Ok(PenaltyStatus::Paid),
            "WAIVED" => Ok(PenaltyStatus::Waived),
            other => Err(ModelError::UnknownStatus {
                kind: "penalty status",
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for PenaltyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a penalty was assessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum PenaltyType {
    Late,
    Lost,
    Damaged,
}

impl PenaltyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PenaltyType::Late => "LATE",
            PenaltyType::Lost => "LOST",
            PenaltyType::Damaged => "DAMAGED",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "LATE" => Ok(PenaltyType::Late),
            "LOST" => Ok(PenaltyType::Lost),
            "DAMAGED" => Ok(PenaltyType::Damaged),
            other => Err(ModelError::UnknownStatus {
                kind: "penalty type",
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for PenaltyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One lease of one copy to one patron.
///
/// `penalty_amount` is the amount assessed at return time and never
/// changes afterwards; `penalty_outstanding` is what remains owed and
/// is what payments draw down.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BorrowRecord {
    pub id: BorrowId,
    pub title_id: TitleId,
    pub patron_id: PatronId,
    pub status: BorrowStatus,
    pub borrowed_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub penalty_amount: Decimal,
    pub penalty_outstanding: Decimal,
    pub penalty_status: PenaltyStatus,
    pub penalty_type: Option<PenaltyType>,
    /// Stamped by the overdue sweep so repeated sweeps skip the record.
    pub overdue_notified_at: Option<DateTime<Utc>>,
}

impl BorrowRecord {
    pub fn new(title_id: TitleId, patron_id: PatronId, due_date: DateTime<Utc>) -> Self {
        Self {
            id: BorrowId::new(),
            title_id,
            patron_id,
            status: BorrowStatus::Borrowed,
            borrowed_at: Utc::now(),
            due_date,
            returned_at: None,
            penalty_amount: Decimal::ZERO,
            penalty_outstanding: Decimal::ZERO,
            penalty_status: PenaltyStatus::None,
            penalty_type: None,
            overdue_notified_at: None,
        }
    }

    /// An open record is one whose copy is still out with the patron.
    pub fn is_open(&self) -> bool {
        self.returned_at.is_none()
    }

    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && now > self.due_date
    }
}

/// Aggregate of a patron's closed loans, bucketed by how they ended.
///
/// Feeds the waitlist priority score; late counts late *returns*, so a
/// still-open overdue loan does not count until it comes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReturnHistory {
    pub late_returns: u32,
    pub damaged_returns: u32,
    pub lost_returns: u32,
}

impl ReturnHistory {
    pub fn record(&mut self, status: BorrowStatus) {
        match status {
            BorrowStatus::LateReturned => self.late_returns += 1,
            BorrowStatus::Damaged => self.damaged_returns += 1,
            BorrowStatus::Lost => self.lost_returns += 1,
            BorrowStatus::Borrowed | BorrowStatus::Returned => {}
        }
    }
}
