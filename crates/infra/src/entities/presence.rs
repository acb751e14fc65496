use serde::{Deserialize, Serialize};

use docrepo_core::{Entity, EntitySchema, FieldKind, Reference, ReferenceField};

use super::{DocumentRecord, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Active,
    Idle,
    Away,
}

impl PresenceStatus {
    /// Stored spelling of every status.
    pub const VALUES: &'static [&'static str] = &["active", "idle", "away"];
}

/// Who is looking at which document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub id: String,
    pub user: Reference<User>,
    pub document: Reference<DocumentRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PresenceStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<bson::DateTime>,
    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
}

impl Entity for Presence {
    const NAME: &'static str = "presence";

    fn schema() -> EntitySchema {
        EntitySchema::new("presences")
            .optional("status", FieldKind::OneOf(PresenceStatus::VALUES))
            .optional("lastSeenAt", FieldKind::Date)
            .reference(ReferenceField::one("user", "user").required())
            .reference(ReferenceField::one("document", "document").required())
    }
}
