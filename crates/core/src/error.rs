//! Error taxonomy shared by every repository.
//!
//! The set of kinds is closed so the service layer above can branch on
//! "not found" vs "caller error" vs "infrastructure failure" without parsing
//! messages. Every variant carries the operation that failed and the entity it
//! ran against, plus whatever structured detail applies (offending field,
//! value, ids, wrapped cause).

use thiserror::Error;

use crate::schema::SchemaError;
use crate::translate::FormatError;

/// Result type used by repository operations.
pub type RepoResult<T> = Result<T, RepoError>;

/// Fieldless discriminant of [`RepoError`], for programmatic branching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    InvalidOperation,
    DataValidation,
    DatabaseOperation,
    Unexpected,
    Format,
}

/// Failure reported by the document store driver.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("duplicate key in `{collection}`: {key}")]
    DuplicateKey { collection: String, key: String },

    #[error("unsupported operator `{0}`")]
    UnsupportedOperator(String),

    #[error("malformed request: {0}")]
    InvalidRequest(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Repository-level error.
#[derive(Debug, Error, Clone)]
pub enum RepoError {
    /// The requested entity (or entities) do not exist.
    #[error("{operation}: {entity} not found: {}", .ids.join(", "))]
    NotFound {
        operation: &'static str,
        entity: &'static str,
        ids: Vec<String>,
    },

    /// A well-formed argument that is semantically wrong (unmatched id on a
    /// targeted mutation, page out of range, missing referenced entity).
    #[error("{operation}: invalid argument `{field}` = `{value}` for {entity}: {reason}")]
    InvalidArgument {
        operation: &'static str,
        entity: &'static str,
        field: String,
        value: String,
        reason: String,
        #[source]
        source: Option<Box<RepoError>>,
    },

    /// A state transition the domain forbids (writing an immutable field,
    /// attaching a non-existent related entity on update).
    #[error("{operation}: invalid operation on {entity}.{field}: {reason}")]
    InvalidOperation {
        operation: &'static str,
        entity: &'static str,
        field: String,
        value: String,
        reason: String,
        #[source]
        source: Option<Box<RepoError>>,
    },

    #[error("{operation}: {source}")]
    DataValidation {
        operation: &'static str,
        entity: &'static str,
        #[source]
        source: SchemaError,
    },

    #[error("{operation}: store failure on {entity}: {source}")]
    DatabaseOperation {
        operation: &'static str,
        entity: &'static str,
        #[source]
        source: StoreError,
    },

    /// An internal invariant did not hold.
    #[error("{operation}: unexpected failure on {entity}: {reason}")]
    Unexpected {
        operation: &'static str,
        entity: &'static str,
        reason: String,
    },

    #[error("{operation}: {source}")]
    Format {
        operation: &'static str,
        entity: &'static str,
        #[source]
        source: FormatError,
    },
}

impl RepoError {
    pub fn not_found<I, S>(operation: &'static str, entity: &'static str, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        Self::NotFound {
            operation,
            entity,
            ids: ids.into_iter().map(|id| id.to_string()).collect(),
        }
    }

    pub fn invalid_argument(
        operation: &'static str,
        entity: &'static str,
        field: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidArgument {
            operation,
            entity,
            field: field.into(),
            value: value.to_string(),
            reason: reason.into(),
            source: None,
        }
    }

    pub fn invalid_operation(
        operation: &'static str,
        entity: &'static str,
        field: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidOperation {
            operation,
            entity,
            field: field.into(),
            value: value.to_string(),
            reason: reason.into(),
            source: None,
        }
    }

    pub fn data_validation(operation: &'static str, entity: &'static str, source: SchemaError) -> Self {
        Self::DataValidation {
            operation,
            entity,
            source,
        }
    }

    pub fn database(operation: &'static str, entity: &'static str, source: StoreError) -> Self {
        Self::DatabaseOperation {
            operation,
            entity,
            source,
        }
    }

    pub fn unexpected(operation: &'static str, entity: &'static str, reason: impl Into<String>) -> Self {
        Self::Unexpected {
            operation,
            entity,
            reason: reason.into(),
        }
    }

    pub fn format(operation: &'static str, entity: &'static str, source: FormatError) -> Self {
        Self::Format {
            operation,
            entity,
            source,
        }
    }

    /// Attach the error that triggered this one.
    ///
    /// Only caller-error kinds carry a nested cause; other kinds are returned
    /// unchanged.
    pub fn caused_by(mut self, cause: RepoError) -> Self {
        match &mut self {
            Self::InvalidArgument { source, .. } | Self::InvalidOperation { source, .. } => {
                *source = Some(Box::new(cause));
            }
            _ => {}
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::InvalidOperation { .. } => ErrorKind::InvalidOperation,
            Self::DataValidation { .. } => ErrorKind::DataValidation,
            Self::DatabaseOperation { .. } => ErrorKind::DatabaseOperation,
            Self::Unexpected { .. } => ErrorKind::Unexpected,
            Self::Format { .. } => ErrorKind::Format,
        }
    }

    pub fn operation(&self) -> &'static str {
        match self {
            Self::NotFound { operation, .. }
            | Self::InvalidArgument { operation, .. }
            | Self::InvalidOperation { operation, .. }
            | Self::DataValidation { operation, .. }
            | Self::DatabaseOperation { operation, .. }
            | Self::Unexpected { operation, .. }
            | Self::Format { operation, .. } => *operation,
        }
    }

    pub fn entity(&self) -> &'static str {
        match self {
            Self::NotFound { entity, .. }
            | Self::InvalidArgument { entity, .. }
            | Self::InvalidOperation { entity, .. }
            | Self::DataValidation { entity, .. }
            | Self::DatabaseOperation { entity, .. }
            | Self::Unexpected { entity, .. }
            | Self::Format { entity, .. } => *entity,
        }
    }

    /// Offending field, for the kinds that name one.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::InvalidArgument { field, .. } | Self::InvalidOperation { field, .. } => {
                Some(field.as_str())
            }
            Self::Format { source, .. } => Some(source.path.as_str()),
            _ => None,
        }
    }

    /// Ids reported missing by a `NotFound`, directly or as the nested cause.
    pub fn missing_ids(&self) -> Option<&[String]> {
        match self {
            Self::NotFound { ids, .. } => Some(ids.as_slice()),
            Self::InvalidArgument {
                source: Some(cause),
                ..
            }
            | Self::InvalidOperation {
                source: Some(cause),
                ..
            } => cause.missing_ids(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Violation;
    use std::error::Error as _;

    #[test]
    fn kinds_and_context_are_exposed() {
        let err = RepoError::invalid_argument("query", "user", "page", 3, "maximum page is 1");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(err.operation(), "query");
        assert_eq!(err.entity(), "user");
        assert_eq!(err.field(), Some("page"));
        assert_eq!(
            err.to_string(),
            "query: invalid argument `page` = `3` for user: maximum page is 1"
        );
    }

    #[test]
    fn nested_not_found_is_reachable() {
        let missing = RepoError::not_found("all_exist", "account", ["abc"]);
        let err = RepoError::invalid_operation("update_by_id", "project", "account", "abc", "no such account")
            .caused_by(missing);

        assert_eq!(err.missing_ids(), Some(&["abc".to_string()][..]));
        assert!(err.source().is_some());
    }

    #[test]
    fn caused_by_leaves_other_kinds_alone() {
        let err = RepoError::unexpected("create", "user", "insert returned no id")
            .caused_by(RepoError::not_found("x", "y", ["z"]));
        assert!(err.source().is_none());
    }

    #[test]
    fn data_validation_wraps_schema_error() {
        let schema_err = SchemaError::single(
            "user",
            Violation::Missing {
                field: "email".into(),
            },
        );
        let err = RepoError::data_validation("create", "user", schema_err.clone());
        assert_eq!(err.kind(), ErrorKind::DataValidation);
        assert_eq!(err.source().unwrap().to_string(), schema_err.to_string());
    }
}
