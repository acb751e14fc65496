use serde::{Deserialize, Serialize};

use docrepo_core::{Entity, EntityId, EntitySchema, FieldKind, Reference, ReferenceField};

use super::User;

/// Billing and tenancy root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<Reference<User>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    /// Members; changed through the collection operations only.
    #[serde(default)]
    pub users: Vec<EntityId>,
    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
}

impl Entity for Account {
    const NAME: &'static str = "account";

    fn schema() -> EntitySchema {
        EntitySchema::new("accounts")
            .required("name", FieldKind::String)
            .optional("plan", FieldKind::String)
            .reference(ReferenceField::one("owner", "user"))
            .reference(ReferenceField::many("users", "user").guarded())
    }
}
