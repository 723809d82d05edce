//! # Folio Core
//!
//! Circulation and allocation engine for the Folio lending system:
//! inventory accounting, borrow request lifecycle, waitlist queueing,
//! and penalty computation.
//!
//! ## Overview
//!
//! `folio-core` owns every state transition a lending operation runs on:
//!
//! - **Inventory Ledger**: atomic reserve/release of title copies, so
//!   concurrent approvals can never oversubscribe the shelf
//! - **Request Lifecycle**: intake guards (duplicates, monthly quota,
//!   access level) and the PENDING → APPROVED/REJECTED state machine
//! - **Circulation**: lease issue and return, with condition grading and
//!   penalty assessment, payment, and waiver
//! - **Waitlist**: weighted-priority queues over exhausted titles with
//!   atomic pop-top allocation of freed copies
//! - **Reconciler**: timer-driven overdue reminders and queue re-ranking
//! - **Storage Abstraction**: repository ports with Postgres and
//!   in-memory adapters sharing one conditional-update contract
//!
//! ## Feature Flags
//!
//! - `database`: enables the Postgres adapter and embedded migrations
//!   (sqlx). The in-memory backend is always available.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use folio_core::{
//!     CirculationFacade, CirculationUnitOfWork, LendingPolicy,
//!     database::InMemoryDatabase,
//!     providers::{LogNotificationSink, StaticCatalog, StaticSubscriptionOracle},
//! };
//! use folio_model::{AccessLevel, CatalogEntry, PatronId, StaffId};
//! use rust_decimal::Decimal;
//!
//! async fn lend_one_copy() -> Result<(), folio_core::CirculationError> {
//!     let db = InMemoryDatabase::new();
//!     let unit_of_work = CirculationUnitOfWork::from_in_memory(&db)
//!         .map_err(folio_core::CirculationError::Internal)?;
//!
//!     let catalog = Arc::new(StaticCatalog::new());
//!     let facade = CirculationFacade::assemble(
//!         Arc::new(unit_of_work),
//!         Arc::new(StaticSubscriptionOracle::default()),
//!         catalog.clone(),
//!         Arc::new(LogNotificationSink),
//!         LendingPolicy::default(),
//!     );
//!
//!     let title = facade.ledger().add_title("A Wizard of Earthsea", 3).await?;
//!     catalog.insert(
//!         title.id,
//!         CatalogEntry::new(
//!             "A Wizard of Earthsea",
//!             Decimal::new(2500, 2),
//!             AccessLevel::Normal,
//!         ),
//!     );
//!
//!     let request = facade.requests().create(PatronId::new(), title.id).await?;
//!     facade.requests().approve(request.id, StaffId::new(), None).await?;
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

/// Application-level composition utilities (unit of work, facade)
pub mod application;

/// Lease issue, return grading, and penalty settlement
pub mod circulation;

/// Layered configuration loading (env, TOML file, defaults)
pub mod config;

/// Repository ports plus the Postgres and in-memory adapters
pub mod database;

#[cfg(feature = "database")]
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Error taxonomy and result alias
pub mod error;

/// Inventory accounting over title copy counters
pub mod ledger;

/// Lending rules: quotas, loan durations, late fee rate
pub mod policy;

/// External collaborator seams (membership, catalog, notifications)
pub mod providers;

/// Periodic overdue sweep and waitlist refresh
pub mod reconciler;

/// Borrow request intake and staff review
pub mod requests;

/// Priority waitlists over exhausted titles
pub mod waitlist;

pub use application::{
    CirculationFacade, CirculationUnitOfWork, CirculationUnitOfWorkBuilder,
};
pub use circulation::CirculationService;
pub use config::{CirculationConfig, ConfigLoader};
pub use error::{CirculationError, Result};
pub use ledger::InventoryLedger;
pub use policy::LendingPolicy;
pub use reconciler::{BackgroundReconciler, OverdueSweep, Reconciler};
pub use requests::RequestService;
pub use waitlist::WaitlistService;
