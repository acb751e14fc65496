//! References between entities.
//!
//! A reference is persisted as a bare identity, but callers may hand one in as
//! a bare id, as a hex string, or as an embedded object carrying `_id` / `id`.
//! Reads may return it either bare or populated with the referenced entity.
//! [`Reference`] makes that distinction explicit so repositories normalize it
//! once, at the boundary.

use bson::{Bson, Document};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::id::EntityId;

/// Anything that can report the identity it carries.
pub trait Identified {
    fn identity(&self) -> Option<EntityId>;
}

/// `_id` wins when it parses; otherwise `id` is tried.
impl Identified for Document {
    fn identity(&self) -> Option<EntityId> {
        self.get("_id")
            .and_then(EntityId::from_bson)
            .or_else(|| self.get("id").and_then(EntityId::from_bson))
    }
}

/// A reference value that could not be reduced to an identity.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("cannot read a reference from {found}")]
pub struct ReferenceShapeError {
    pub found: String,
}

/// Either a bare identity or the embedded (populated) entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Reference<T> {
    Id(EntityId),
    Embedded(Box<T>),
}

impl<T> Reference<T> {
    pub fn embedded(value: T) -> Self {
        Self::Embedded(Box::new(value))
    }

    pub fn is_populated(&self) -> bool {
        matches!(self, Self::Embedded(_))
    }

    pub fn as_embedded(&self) -> Option<&T> {
        match self {
            Self::Embedded(value) => Some(value),
            Self::Id(_) => None,
        }
    }
}

impl<T: Identified> Reference<T> {
    /// The identity this reference points at.
    ///
    /// `None` only when an embedded value carries no readable identity.
    pub fn target_id(&self) -> Option<EntityId> {
        match self {
            Self::Id(id) => Some(*id),
            Self::Embedded(value) => value.identity(),
        }
    }
}

impl Reference<Document> {
    /// Classify an untyped reference value.
    pub fn from_bson(value: &Bson) -> Result<Self, ReferenceShapeError> {
        match value {
            Bson::Document(doc) => Ok(Self::Embedded(Box::new(doc.clone()))),
            other => EntityId::from_bson(other)
                .map(Self::Id)
                .ok_or_else(|| ReferenceShapeError {
                    found: other.to_string(),
                }),
        }
    }

    /// Reduce an untyped reference value to the identity it names.
    pub fn normalize(value: &Bson) -> Result<EntityId, ReferenceShapeError> {
        Self::from_bson(value)?
            .target_id()
            .ok_or_else(|| ReferenceShapeError {
                found: value.to_string(),
            })
    }
}

impl<T> From<EntityId> for Reference<T> {
    fn from(value: EntityId) -> Self {
        Self::Id(value)
    }
}

impl<T: Serialize> Serialize for Reference<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Id(id) => id.serialize(serializer),
            Self::Embedded(value) => value.serialize(serializer),
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Reference<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Bson::deserialize(deserializer)? {
            Bson::Document(doc) => bson::from_document(doc)
                .map(|value| Self::Embedded(Box::new(value)))
                .map_err(D::Error::custom),
            other => EntityId::from_bson(&other)
                .map(Self::Id)
                .ok_or_else(|| D::Error::custom(format!("expected a reference, found {other}"))),
        }
    }
}
