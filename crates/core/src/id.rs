//! Store-native identifiers.

use core::str::FromStr;

use bson::Bson;
use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Identity of a persisted entity.
///
/// Wraps the store's native `ObjectId`. Callers only ever see the canonical
/// 24-character lowercase hex rendering.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct EntityId(ObjectId);

/// A string that is not a valid identity rendering.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("malformed entity id `{value}`: expected 24 hexadecimal characters")]
pub struct IdParseError {
    pub value: String,
}

impl EntityId {
    /// Mint a fresh identity.
    pub fn new() -> Self {
        Self(ObjectId::new())
    }

    pub fn from_object_id(oid: ObjectId) -> Self {
        Self(oid)
    }

    pub fn as_object_id(&self) -> &ObjectId {
        &self.0
    }

    pub fn parse(s: &str) -> Result<Self, IdParseError> {
        ObjectId::parse_str(s).map(Self).map_err(|_| IdParseError {
            value: s.to_string(),
        })
    }

    /// Read an identity out of a stored or caller-supplied value.
    ///
    /// Accepts a native `ObjectId` or its hex rendering; anything else is `None`.
    pub fn from_bson(value: &Bson) -> Option<Self> {
        match value {
            Bson::ObjectId(oid) => Some(Self(*oid)),
            Bson::String(s) => Self::parse(s).ok(),
            _ => None,
        }
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }

    /// Creation instant embedded in the identity (second precision).
    pub fn generated_at(&self) -> DateTime<Utc> {
        self.0.timestamp().to_chrono()
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for EntityId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0.to_hex())
    }
}

impl FromStr for EntityId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<ObjectId> for EntityId {
    fn from(value: ObjectId) -> Self {
        Self(value)
    }
}

impl From<EntityId> for ObjectId {
    fn from(value: EntityId) -> Self {
        value.0
    }
}

impl From<EntityId> for Bson {
    fn from(value: EntityId) -> Self {
        Bson::ObjectId(value.0)
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Bson::deserialize(deserializer)?;
        Self::from_bson(&value)
            .ok_or_else(|| D::Error::custom(format!("expected an entity id, found {value}")))
    }
}
