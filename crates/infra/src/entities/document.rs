use serde::{Deserialize, Serialize};

use docrepo_core::{Entity, EntitySchema, FieldKind, Reference, ReferenceField};

use super::{Project, User};

/// A stored document (named to stay clear of `bson::Document`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: String,
    pub project: Reference<Project>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<Reference<User>>,
    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
}

impl Entity for DocumentRecord {
    const NAME: &'static str = "document";

    fn schema() -> EntitySchema {
        EntitySchema::new("documents")
            .required("title", FieldKind::String)
            .optional("content", FieldKind::String)
            .reference(ReferenceField::one("project", "project").required().populated())
            .reference(ReferenceField::one("createdBy", "user"))
            .soft_delete()
    }
}
