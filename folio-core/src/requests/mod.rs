//! Borrow request intake and staff review.

mod service;

pub use service::{BulkApprovalFailure, BulkApprovalReport, RequestService};
