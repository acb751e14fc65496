use serde::{Deserialize, Serialize};

use docrepo_core::{Entity, EntitySchema, FieldKind, Reference, ReferenceField};

use super::User;

/// Login session. `user` comes back populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub user: Reference<User>,
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<bson::DateTime>,
    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
}

impl Session {
    pub fn is_expired(&self, at: bson::DateTime) -> bool {
        self.expires_at.is_some_and(|expires| expires <= at)
    }
}

impl Entity for Session {
    const NAME: &'static str = "session";

    fn schema() -> EntitySchema {
        EntitySchema::new("sessions")
            .required("token", FieldKind::String)
            .optional("expiresAt", FieldKind::Date)
            .reference(ReferenceField::one("user", "user").required().populated())
    }
}
