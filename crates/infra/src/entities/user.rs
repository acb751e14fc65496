use serde::{Deserialize, Serialize};

use docrepo_core::{Entity, EntityId, EntitySchema, FieldKind, ReferenceField};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub accounts: Vec<EntityId>,
    #[serde(default)]
    pub sessions: Vec<EntityId>,
    #[serde(default)]
    pub projects: Vec<EntityId>,
    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
}

impl Entity for User {
    const NAME: &'static str = "user";

    /// The membership lists are guarded: they only change through
    /// `add_to_collection` / `remove_from_collection`.
    fn schema() -> EntitySchema {
        EntitySchema::new("users")
            .required("email", FieldKind::String)
            .optional("name", FieldKind::String)
            .reference(ReferenceField::many("accounts", "account").guarded())
            .reference(ReferenceField::many("sessions", "session").guarded())
            .reference(ReferenceField::many("projects", "project").guarded())
    }
}
