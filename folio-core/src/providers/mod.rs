//! External collaborators consumed by the engine.
//!
//! Membership, catalog pricing, and notification delivery live outside
//! the circulation core. Each seam is a trait here so callers can plug
//! in their own backends; minimal in-process implementations ship for
//! tests and single-node deployments.

pub mod catalog;
pub mod notify;
pub mod subscription;

pub use catalog::{CatalogProvider, StaticCatalog};
pub use notify::{
    dispatch, EventKind, LogNotificationSink, NotificationSink,
    RecordingNotificationSink,
};
pub use subscription::{StaticSubscriptionOracle, SubscriptionOracle};
