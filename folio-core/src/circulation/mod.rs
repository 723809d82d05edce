//! Borrow leases: issue, return, penalty settlement.

pub mod penalty;
mod service;

pub use penalty::{Assessment, ReturnCondition, assess, days_late};
pub use service::CirculationService;
