//! Composition root: repository facade and service assembly.

mod facade;
pub mod unit_of_work;

pub use facade::CirculationFacade;
pub use unit_of_work::{CirculationUnitOfWork, CirculationUnitOfWorkBuilder};
