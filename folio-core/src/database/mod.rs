pub mod infrastructure;
pub mod ports;

pub use infrastructure::memory::InMemoryDatabase;
#[cfg(feature = "database")]
pub use infrastructure::postgres::PostgresDatabase;
