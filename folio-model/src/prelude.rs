//! Convenience surface for consumers of the model types.
//! Prefer importing from this module instead of individual tree nodes when
//! working in service or presentation layers.

pub use super::borrow::{
    BorrowRecord, BorrowStatus, PenaltyStatus, PenaltyType, ReturnHistory,
};
pub use super::catalog::{AccessLevel, CatalogEntry};
pub use super::error::{ModelError, Result as ModelResult};
pub use super::ids::{
    BorrowId, PatronId, RequestId, StaffId, TitleId, WaitlistEntryId,
};
pub use super::request::{BorrowRequest, RequestStatus};
pub use super::title::Title;
pub use super::waitlist::{ScoreBreakdown, WaitlistEntry};
