//! Storage/domain format translation.
//!
//! Storage shape: identity under `_id` as a native `ObjectId`, plus a
//! store-injected version marker (`__v` by default).
//! Domain shape: identity under `id` as its hex string, no version marker.
//!
//! Both directions recurse through nested documents and arrays, so populated
//! references and arrays of sub-documents come out clean as well. Dates,
//! non-identity `ObjectId`s, `null` and scalars are copied as-is.

use bson::oid::ObjectId;
use bson::{Bson, Document};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entity::{DOMAIN_ID_FIELD, ID_FIELD};
use crate::id::EntityId;

/// Default name of the store's optimistic-concurrency marker.
pub const DEFAULT_VERSION_KEY: &str = "__v";

/// A document that cannot be translated without losing data.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cannot translate `{path}`: {reason}")]
pub struct FormatError {
    /// Dotted key path to the offending value (`members[1]._id`).
    pub path: String,
    pub reason: String,
}

/// What `to_storage` does with an `id` that is not a valid identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdFallback {
    /// Mint a fresh identity in its place.
    #[default]
    Regenerate,
    /// Fail with a [`FormatError`].
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatTranslator {
    version_key: String,
    id_fallback: IdFallback,
}

impl Default for FormatTranslator {
    fn default() -> Self {
        Self::new(DEFAULT_VERSION_KEY, IdFallback::default())
    }
}

impl FormatTranslator {
    pub fn new(version_key: impl Into<String>, id_fallback: IdFallback) -> Self {
        Self {
            version_key: version_key.into(),
            id_fallback,
        }
    }

    pub fn version_key(&self) -> &str {
        &self.version_key
    }

    pub fn id_fallback(&self) -> IdFallback {
        self.id_fallback
    }

    /// Storage shape to domain shape.
    pub fn to_domain(&self, raw: &Document) -> Result<Document, FormatError> {
        self.document_to_domain(raw, "")
    }

    pub fn to_domain_many(&self, raws: &[Document]) -> Result<Vec<Document>, FormatError> {
        raws.iter().map(|raw| self.to_domain(raw)).collect()
    }

    /// Domain shape to storage shape.
    ///
    /// Fails only under [`IdFallback::Reject`].
    pub fn to_storage(&self, domain: &Document) -> Result<Document, FormatError> {
        self.document_to_storage(domain, "")
    }

    /// Domain shape rendered as relaxed extended JSON, for callers that speak JSON.
    pub fn to_json(&self, domain: Document) -> serde_json::Value {
        Bson::Document(domain).into_relaxed_extjson()
    }

    fn document_to_domain(&self, raw: &Document, prefix: &str) -> Result<Document, FormatError> {
        let mut out = Document::new();
        for (key, value) in raw {
            if key == &self.version_key {
                continue;
            }
            let path = join(prefix, key);
            if key == ID_FIELD {
                out.insert(DOMAIN_ID_FIELD, render_identity(value, &path)?);
            } else {
                out.insert(key.clone(), self.value_to_domain(value, &path)?);
            }
        }
        Ok(out)
    }

    fn value_to_domain(&self, value: &Bson, path: &str) -> Result<Bson, FormatError> {
        match value {
            Bson::Document(doc) => Ok(Bson::Document(self.document_to_domain(doc, path)?)),
            Bson::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.value_to_domain(item, &format!("{path}[{i}]")))
                .collect::<Result<Vec<_>, _>>()
                .map(Bson::Array),
            other => Ok(other.clone()),
        }
    }

    fn document_to_storage(&self, domain: &Document, prefix: &str) -> Result<Document, FormatError> {
        let mut out = Document::new();
        for (key, value) in domain {
            let path = join(prefix, key);
            if key == DOMAIN_ID_FIELD {
                out.insert(ID_FIELD, self.parse_identity(value, &path)?);
            } else {
                out.insert(key.clone(), self.value_to_storage(value, &path)?);
            }
        }
        Ok(out)
    }

    fn value_to_storage(&self, value: &Bson, path: &str) -> Result<Bson, FormatError> {
        match value {
            Bson::Document(doc) => Ok(Bson::Document(self.document_to_storage(doc, path)?)),
            Bson::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.value_to_storage(item, &format!("{path}[{i}]")))
                .collect::<Result<Vec<_>, _>>()
                .map(Bson::Array),
            other => Ok(other.clone()),
        }
    }

    fn parse_identity(&self, value: &Bson, path: &str) -> Result<Bson, FormatError> {
        if let Some(id) = EntityId::from_bson(value) {
            return Ok(id.into());
        }
        match self.id_fallback {
            IdFallback::Regenerate => {
                let fresh = ObjectId::new();
                tracing::warn!(path, found = %value, replacement = %fresh, "malformed id replaced with a fresh identity");
                Ok(Bson::ObjectId(fresh))
            }
            IdFallback::Reject => Err(FormatError {
                path: path.to_string(),
                reason: format!("expected a 24-character hex identity, found {value}"),
            }),
        }
    }
}

fn render_identity(value: &Bson, path: &str) -> Result<Bson, FormatError> {
    EntityId::from_bson(value)
        .map(|id| Bson::String(id.to_hex()))
        .ok_or_else(|| FormatError {
            path: path.to_string(),
            reason: format!("identity cannot be rendered as a string: {value}"),
        })
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}
