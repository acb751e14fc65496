//! Infrastructure layer: document store driver, repositories, registry, config.

pub mod config;
pub mod entities;
pub mod reference;
pub mod registry;
pub mod repository;
pub mod store;


pub use config::{ConfigError, DEFAULT_CONFIG, RepositoryConfig, load_config};
pub use reference::ReferenceValidator;
pub use registry::{Model, ModelRegistry, RegistryError, Repositories};
pub use repository::EntityRepository;
pub use store::{DocumentStore, FindOptions, InMemoryDocumentStore, UpdateOutcome};
