//! Repository ports (interfaces) grouped by aggregate.
//! Services depend on these traits only; the Postgres and in-memory
//! adapters under `database::infrastructure` implement them.

pub mod borrows;
pub mod requests;
pub mod titles;
pub mod waitlist;

pub use borrows::{BorrowsRepository, ReturnOutcome};
pub use requests::RequestsRepository;
pub use titles::TitlesRepository;
pub use waitlist::WaitlistRepository;
