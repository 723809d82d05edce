pub mod borrows;
pub mod requests;
pub mod titles;
pub mod waitlist;

pub use borrows::PostgresBorrowsRepository;
pub use requests::PostgresRequestsRepository;
pub use titles::PostgresTitlesRepository;
pub use waitlist::PostgresWaitlistRepository;
