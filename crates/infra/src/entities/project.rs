use serde::{Deserialize, Serialize};

use docrepo_core::{Entity, EntityId, EntitySchema, FieldKind, Reference, ReferenceField};

use super::Account;

/// Soft-deleted: removal stamps `deletedAt` and hides the project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub account: Reference<Account>,
    pub name: String,
    #[serde(default)]
    pub members: Vec<EntityId>,
    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
}

impl Entity for Project {
    const NAME: &'static str = "project";

    fn schema() -> EntitySchema {
        EntitySchema::new("projects")
            .required("name", FieldKind::String)
            .reference(ReferenceField::one("account", "account").required().populated())
            .reference(ReferenceField::many("members", "user"))
            .soft_delete()
    }
}
