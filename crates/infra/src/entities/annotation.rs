use serde::{Deserialize, Serialize};

use docrepo_core::{Entity, EntitySchema, FieldKind, Reference, ReferenceField};

use super::{DocumentRecord, User};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub id: String,
    pub document: Reference<DocumentRecord>,
    pub author: Reference<User>,
    pub body: String,
    /// Client-defined anchor (range, coordinates).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<bson::Document>,
    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
}

impl Entity for Annotation {
    const NAME: &'static str = "annotation";

    fn schema() -> EntitySchema {
        EntitySchema::new("annotations")
            .required("body", FieldKind::String)
            .optional("position", FieldKind::Object)
            .reference(ReferenceField::one("document", "document").required())
            .reference(ReferenceField::one("author", "user").required().populated())
    }
}
