pub mod matches;
pub mod memory;
pub mod migrations;
pub mod pool;
pub mod postings;
pub mod store;
pub mod util;

pub use memory::MemoryStore;
pub use migrations::{MigrationError, run_migrations};
pub use pool::{DbPoolError, PgPool, create_pool_from_url, create_pool_with_size};
pub use postings::PgStore;
pub use store::{MatchStore, PostingStore, StoreError, UpsertOutcome};
