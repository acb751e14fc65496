//! Structural validation of storage-shaped documents against an [`EntitySchema`].

use bson::{Bson, Document};
use thiserror::Error;

use crate::entity::{CREATED_AT, DELETED_AT, EntitySchema, ID_FIELD, ReferenceField, UPDATED_AT};

/// Fields owned by the repository rather than by an entity schema.
const SYSTEM_FIELDS: [&str; 4] = [ID_FIELD, CREATED_AT, UPDATED_AT, DELETED_AT];

/// Value type accepted by a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    /// 32- or 64-bit integer.
    Int,
    /// Any number.
    Double,
    Bool,
    Date,
    ObjectId,
    Array,
    /// Array whose items are all strings.
    Strings,
    Object,
    /// String drawn from a closed set of values.
    OneOf(&'static [&'static str]),
    Any,
}

impl FieldKind {
    pub fn accepts(self, value: &Bson) -> bool {
        match self {
            Self::String => matches!(value, Bson::String(_)),
            Self::Int => matches!(value, Bson::Int32(_) | Bson::Int64(_)),
            Self::Double => matches!(value, Bson::Double(_) | Bson::Int32(_) | Bson::Int64(_)),
            Self::Bool => matches!(value, Bson::Boolean(_)),
            Self::Date => matches!(value, Bson::DateTime(_)),
            Self::ObjectId => matches!(value, Bson::ObjectId(_)),
            Self::Array => matches!(value, Bson::Array(_)),
            Self::Strings => match value {
                Bson::Array(items) => items.iter().all(|item| matches!(item, Bson::String(_))),
                _ => false,
            },
            Self::Object => matches!(value, Bson::Document(_)),
            Self::OneOf(allowed) => match value {
                Bson::String(s) => allowed.contains(&s.as_str()),
                _ => false,
            },
            Self::Any => true,
        }
    }
}

impl core::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::OneOf(allowed) => return write!(f, "one of {}", allowed.join("|")),
            Self::String => "string",
            Self::Int => "int",
            Self::Double => "double",
            Self::Bool => "bool",
            Self::Date => "date",
            Self::ObjectId => "objectId",
            Self::Array => "array",
            Self::Strings => "array of strings",
            Self::Object => "object",
            Self::Any => "any",
        };
        f.write_str(name)
    }
}

/// One typed attribute of an entity.
///
/// `nullable` fields accept an explicit `null`; others must be absent or
/// carry a value of `kind`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub nullable: bool,
}

impl FieldSpec {
    pub fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
            nullable: false,
        }
    }

    /// May be absent or `null`.
    pub fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            nullable: true,
        }
    }

    /// May be absent, in which case the entity supplies a default; never `null`.
    pub fn defaulted(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            nullable: false,
        }
    }
}

/// Whether absent required fields count as violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// A complete document about to be inserted.
    Full,
    /// A partial update: only the supplied fields are checked.
    Partial,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    Missing {
        field: String,
    },
    WrongType {
        field: String,
        expected: String,
        found: &'static str,
    },
    Unknown {
        field: String,
    },
    /// The document as a whole does not form a valid entity.
    Unrepresentable {
        reason: String,
    },
}

impl core::fmt::Display for Violation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Missing { field } => write!(f, "`{field}` is required"),
            Self::WrongType {
                field,
                expected,
                found,
            } => write!(f, "`{field}` must be {expected}, found {found}"),
            Self::Unknown { field } => write!(f, "`{field}` is not a declared field"),
            Self::Unrepresentable { reason } => f.write_str(reason),
        }
    }
}

/// Structural validation failure; lists every violation found.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{entity} failed structural validation: {}", render(.violations))]
pub struct SchemaError {
    pub entity: &'static str,
    pub violations: Vec<Violation>,
}

impl SchemaError {
    pub fn single(entity: &'static str, violation: Violation) -> Self {
        Self {
            entity,
            violations: vec![violation],
        }
    }

    /// Names of every offending field, in document order.
    pub fn fields(&self) -> Vec<&str> {
        self.violations
            .iter()
            .filter_map(|v| match v {
                Violation::Missing { field }
                | Violation::WrongType { field, .. }
                | Violation::Unknown { field } => Some(field.as_str()),
                Violation::Unrepresentable { .. } => None,
            })
            .collect()
    }
}

fn render(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn bson_type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Array(_) => "array",
        Bson::Document(_) => "object",
        Bson::Boolean(_) => "bool",
        Bson::Null => "null",
        Bson::Int32(_) | Bson::Int64(_) => "int",
        Bson::DateTime(_) => "date",
        Bson::ObjectId(_) => "objectId",
        Bson::Timestamp(_) => "timestamp",
        Bson::Binary(_) => "binary",
        Bson::Decimal128(_) => "decimal",
        _ => "other",
    }
}

impl EntitySchema {
    /// Check a storage-shaped document against the declared fields.
    ///
    /// Reference fields must already be normalized to bare identities. `null`
    /// is accepted for nullable fields and optional single references.
    pub fn validate(
        &self,
        entity: &'static str,
        doc: &Document,
        mode: ValidationMode,
    ) -> Result<(), SchemaError> {
        let mut violations = Vec::new();

        for (key, value) in doc {
            if SYSTEM_FIELDS.contains(&key.as_str()) {
                continue;
            }
            if let Some(spec) = self.field(key) {
                check_field(spec, value, &mut violations);
            } else if let Some(reference) = self.reference_field(key) {
                check_reference(reference, value, &mut violations);
            } else {
                violations.push(Violation::Unknown { field: key.clone() });
            }
        }

        if mode == ValidationMode::Full {
            let required = self
                .fields
                .iter()
                .filter(|f| f.required)
                .map(|f| f.name)
                .chain(self.references.iter().filter(|r| r.required).map(|r| r.name));
            for name in required {
                if !doc.contains_key(name) {
                    violations.push(Violation::Missing {
                        field: name.to_string(),
                    });
                }
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(SchemaError { entity, violations })
        }
    }
}

fn check_field(spec: &FieldSpec, value: &Bson, violations: &mut Vec<Violation>) {
    if matches!(value, Bson::Null) {
        if spec.required {
            violations.push(Violation::Missing {
                field: spec.name.to_string(),
            });
        } else if !spec.nullable {
            violations.push(Violation::WrongType {
                field: spec.name.to_string(),
                expected: spec.kind.to_string(),
                found: "null",
            });
        }
        return;
    }
    if !spec.kind.accepts(value) {
        violations.push(Violation::WrongType {
            field: spec.name.to_string(),
            expected: spec.kind.to_string(),
            found: bson_type_name(value),
        });
    }
}

fn check_reference(reference: &ReferenceField, value: &Bson, violations: &mut Vec<Violation>) {
    let ok = match (reference.many, value) {
        (false, Bson::Null) if !reference.required => true,
        (false, Bson::ObjectId(_)) => true,
        (true, Bson::Array(items)) => items.iter().all(|item| matches!(item, Bson::ObjectId(_))),
        _ => false,
    };
    if !ok {
        violations.push(Violation::WrongType {
            field: reference.name.to_string(),
            expected: if reference.many {
                format!("array of references to {}", reference.target)
            } else {
                format!("reference to {}", reference.target)
            },
            found: bson_type_name(value),
        });
    }
}
