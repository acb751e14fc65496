//! `docrepo-core` — storage-agnostic building blocks for the document repositories.
//!
//! This crate performs **no I/O**: identities, references, entity declarations,
//! structural validation, pagination math, the error taxonomy and the
//! storage/domain format translator all live here as plain functions over data.

pub mod entity;
pub mod error;
pub mod id;
pub mod query;
pub mod reference;
pub mod schema;
pub mod translate;

pub use entity::{DeletePolicy, Entity, EntitySchema, ReferenceField};
pub use error::{ErrorKind, RepoError, RepoResult, StoreError};
pub use id::{EntityId, IdParseError};
pub use query::{DEFAULT_ITEMS_PER_PAGE, Page, PageOutOfRange, QueryResult};
pub use reference::{Identified, Reference, ReferenceShapeError};
pub use schema::{FieldKind, FieldSpec, SchemaError, ValidationMode, Violation};
pub use translate::{DEFAULT_VERSION_KEY, FormatError, FormatTranslator, IdFallback};

/// Re-exported so entity crates and callers use the same BSON version.
pub use bson;
