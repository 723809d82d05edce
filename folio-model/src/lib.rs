//! Core data model definitions shared across Folio crates.
#![allow(missing_docs)]

pub mod borrow;
pub mod catalog;
pub mod error;
pub mod ids;
pub mod prelude;
pub mod request;
pub mod title;
pub mod waitlist;

// Intentionally curated re-exports for downstream consumers.
pub use borrow::{
    BorrowRecord, BorrowStatus, PenaltyStatus, PenaltyType, ReturnHistory,
};
pub use catalog::{AccessLevel, CatalogEntry};
pub use error::{ModelError, Result as ModelResult};
pub use ids::{BorrowId, PatronId, RequestId, StaffId, TitleId, WaitlistEntryId};
pub use request::{BorrowRequest, RequestStatus};
pub use title::Title;
pub use waitlist::{ScoreBreakdown, WaitlistEntry};
