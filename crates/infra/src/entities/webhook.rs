use serde::{Deserialize, Serialize};

use docrepo_core::{Entity, EntitySchema, FieldKind, Reference, ReferenceField};

use super::Account;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    pub id: String,
    pub account: Reference<Account>,
    pub url: String,
    /// Event names delivered to `url`.
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default = "enabled")]
    pub active: bool,
    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
}

fn enabled() -> bool {
    true
}

impl Webhook {
    pub fn subscribes_to(&self, event: &str) -> bool {
        self.active && self.events.iter().any(|e| e == event)
    }
}

impl Entity for Webhook {
    const NAME: &'static str = "webhook";

    fn schema() -> EntitySchema {
        EntitySchema::new("webhooks")
            .required("url", FieldKind::String)
            .defaulted("events", FieldKind::Strings)
            .defaulted("active", FieldKind::Bool)
            .reference(ReferenceField::one("account", "account").required())
    }
}
