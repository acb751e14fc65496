use serde::{Deserialize, Serialize};

use docrepo_core::{Entity, EntitySchema, FieldKind, Reference, ReferenceField};

use super::Account;

/// Payment recorded against an account, in minor currency units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerPayment {
    pub id: String,
    pub account: Reference<Account>,
    pub amount: i64,
    /// ISO 4217 code.
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Identifier at the payment provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
}

impl Entity for CustomerPayment {
    const NAME: &'static str = "customer_payment";

    fn schema() -> EntitySchema {
        EntitySchema::new("customer_payments")
            .required("amount", FieldKind::Int)
            .required("currency", FieldKind::String)
            .optional("status", FieldKind::String)
            .optional("externalId", FieldKind::String)
            .reference(ReferenceField::one("account", "account").required())
    }
}
