//! Document store driver boundary.
//!
//! Repositories talk to the store only through [`DocumentStore`]; the
//! connection/pool behind it is owned and lifecycle-managed by the caller.

pub(crate) mod filter;
pub mod in_memory;
#[cfg(feature = "mongodb")]
pub mod mongo;
pub mod r#trait;

pub use in_memory::InMemoryDocumentStore;
#[cfg(feature = "mongodb")]
pub use mongo::MongoDocumentStore;
pub use r#trait::{DocumentStore, FindOptions, UpdateOutcome};
