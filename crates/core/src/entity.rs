//! Entity declarations: what a repository needs to know about one entity type.

use serde::de::DeserializeOwned;

use crate::reference::Identified;
use crate::schema::{FieldKind, FieldSpec};

/// Storage key of the identity field.
pub const ID_FIELD: &str = "_id";
/// Domain-side name of the identity field.
pub const DOMAIN_ID_FIELD: &str = "id";
pub const CREATED_AT: &str = "createdAt";
pub const UPDATED_AT: &str = "updatedAt";
/// Soft-delete marker.
pub const DELETED_AT: &str = "deletedAt";

/// Fields that are always server-assigned and may never appear in an update.
pub const IMMUTABLE_FIELDS: [&str; 4] = [ID_FIELD, DOMAIN_ID_FIELD, CREATED_AT, UPDATED_AT];

/// A persisted domain type with a declared storage schema.
///
/// Implementors are the typed, domain-shaped view of one collection: they are
/// decoded from documents that already went through the format translator.
pub trait Entity: Identified + DeserializeOwned + Send + Sync + 'static {
    /// Registry key; also used in diagnostics.
    const NAME: &'static str;

    fn schema() -> EntitySchema;
}

/// How `delete_by_id` removes an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletePolicy {
    /// Remove the stored document.
    #[default]
    Hard,
    /// Stamp `deletedAt` and hide the document from reads.
    Soft,
}

/// A field that points at another entity by identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceField {
    pub name: &'static str,
    /// `Entity::NAME` of the referenced entity.
    pub target: &'static str,
    /// Array of references instead of a single one.
    pub many: bool,
    pub required: bool,
    /// Resolve into the referenced document on `get_by_id`.
    pub populate: bool,
    /// Only mutable through the dedicated add/remove operations.
    pub guarded: bool,
}

impl ReferenceField {
    pub fn one(name: &'static str, target: &'static str) -> Self {
        Self {
            name,
            target,
            many: false,
            required: false,
            populate: false,
            guarded: false,
        }
    }

    pub fn many(name: &'static str, target: &'static str) -> Self {
        Self {
            many: true,
            ..Self::one(name, target)
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn populated(mut self) -> Self {
        self.populate = true;
        self
    }

    pub fn guarded(mut self) -> Self {
        self.guarded = true;
        self
    }
}

/// Storage schema of one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySchema {
    pub collection: &'static str,
    pub fields: Vec<FieldSpec>,
    pub references: Vec<ReferenceField>,
    pub delete_policy: DeletePolicy,
}

impl EntitySchema {
    pub fn new(collection: &'static str) -> Self {
        Self {
            collection,
            fields: Vec::new(),
            references: Vec::new(),
            delete_policy: DeletePolicy::Hard,
        }
    }

    pub fn required(mut self, name: &'static str, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec::required(name, kind));
        self
    }

    pub fn optional(mut self, name: &'static str, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec::optional(name, kind));
        self
    }

    pub fn defaulted(mut self, name: &'static str, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec::defaulted(name, kind));
        self
    }

    pub fn reference(mut self, reference: ReferenceField) -> Self {
        self.references.push(reference);
        self
    }

    pub fn soft_delete(mut self) -> Self {
        self.delete_policy = DeletePolicy::Soft;
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn reference_field(&self, name: &str) -> Option<&ReferenceField> {
        self.references.iter().find(|r| r.name == name)
    }

    pub fn is_soft_delete(&self) -> bool {
        self.delete_policy == DeletePolicy::Soft
    }

    /// Collection fields that must go through add/remove operations.
    pub fn guarded_fields(&self) -> impl Iterator<Item = &ReferenceField> {
        self.references.iter().filter(|r| r.guarded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_fields_and_references() {
        let schema = EntitySchema::new("users")
            .required("email", FieldKind::String)
            .optional("name", FieldKind::String)
            .reference(ReferenceField::many("sessions", "session").guarded())
            .reference(ReferenceField::one("owner", "account").required().populated());

        assert_eq!(schema.collection, "users");
        assert!(schema.field("email").unwrap().required);
        assert!(!schema.field("name").unwrap().required);
        assert!(schema.reference_field("owner").unwrap().populate);
        assert_eq!(
            schema.guarded_fields().map(|r| r.name).collect::<Vec<_>>(),
            vec!["sessions"]
        );
        assert!(!schema.is_soft_delete());
        assert!(schema.soft_delete().is_soft_delete());
    }
}
