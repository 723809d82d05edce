use chrono::{DateTime, Utc};

use crate::error::{ModelError, Result};
use crate::ids::{BorrowId, PatronId, RequestId, StaffId, TitleId};

/// Lifecycle state of a borrow request.
///
/// `Pending` is the only non-terminal state. Once a request reaches
/// `Approved` or `Rejected` it never transitions again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Approved => "APPROVED",
            RequestStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "PENDING" => Ok(RequestStatus::Pending),
            "APPROVED" => Ok(RequestStatus::Approved),
            "REJECTED" => Ok(RequestStatus::Rejected),
            other => Err(ModelError::UnknownStatus {
                kind: "request status",
                value: other.to_string(),
            }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }

    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        matches!(
            (self, next),
            (
                RequestStatus::Pending,
                RequestStatus::Approved | RequestStatus::Rejected
            )
        )
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A patron's request to borrow a title, awaiting staff review.
///
/// Requests are never deleted. A terminal request keeps the staff member
/// and instant of the decision; an approved one additionally points at
/// the borrow record it produced.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BorrowRequest {
    pub id: RequestId,
    pub title_id: TitleId,
    pub patron_id: PatronId,
    pub status: RequestStatus,
    pub requested_at: DateTime<Utc>,
    /// Lease created on approval. `None` while pending or rejected.
    pub issued_record_id: Option<BorrowId>,
    /// Staff-supplied explanation, set on rejection.
    pub reason: Option<String>,
    pub processed_by: Option<StaffId>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl BorrowRequest {
    pub fn new(title_id: TitleId, patron_id: PatronId) -> Self {
        Self {
            id: RequestId::new(),
            title_id,
            patron_id,
            status: RequestStatus::Pending,
            requested_at: Utc::now(),
            issued_record_id: None,
            reason: None,
            processed_by: None,
            processed_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_transitions_to_both_terminal_states() {
        assert!(RequestStatus::Pending.can_transition_to(RequestStatus::Approved));
        assert!(RequestStatus::Pending.can_transition_to(RequestStatus::Rejected));
    }

    #[test]
    fn terminal_states_absorb() {
        for status in [RequestStatus::Approved, RequestStatus::Rejected] {
            assert!(status.is_terminal());
            assert!(!status.can_transition_to(RequestStatus::Pending));
            assert!(!status.can_transition_to(RequestStatus::Approved));
            assert!(!status.can_transition_to(RequestStatus::Rejected));
        }
    }

    #[test]
    fn status_round_trips_through_storage_form() {
        for status in [
            RequestStatus::Pending,
            RequestStatus::Approved,
            RequestStatus::Rejected,
        ] {
            assert_eq!(RequestStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(RequestStatus::parse("CANCELLED").is_err());
    }

    #[test]
    fn new_request_starts_pending_and_unprocessed() {
        let request = BorrowRequest::new(TitleId::new(), PatronId::new());
        assert!(request.is_pending());
        assert!(request.issued_record_id.is_none());
        assert!(request.processed_by.is_none());
    }
}
