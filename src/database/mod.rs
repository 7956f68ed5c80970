pub mod memory_store;
pub mod pg_store;
pub mod pool;
pub mod store;

pub use memory_store::MemoryStore;
pub use pg_store::PgStore;
pub use store::{DurableStore, Fact, Mutation, MutationOutcome};
