//! Reference normalization and update-object validation.

use bson::{Bson, Document};
use tracing::instrument;

use docrepo_core::entity::{DELETED_AT, IMMUTABLE_FIELDS};
use docrepo_core::schema::bson_type_name;
use docrepo_core::{
    Entity, EntityId, Reference, RepoError, RepoResult, SchemaError, ValidationMode, Violation,
};

use super::{EntityRepository, ResolvedReference};
use crate::store::DocumentStore;

/// How a reference to a missing entity is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MissingReference {
    /// On create: the caller supplied a bad id.
    Argument,
    /// On update: the caller tried to attach a non-existent entity.
    Operation,
}

/// Reference ids found in one document, grouped by field.
pub(crate) type PendingReferences<'a, S> = Vec<(&'a ResolvedReference<S>, Vec<EntityId>)>;

impl<T: Entity, S: DocumentStore> EntityRepository<T, S> {
    /// Check a domain-shaped partial update without writing anything.
    #[instrument(skip(self, partial), fields(entity = T::NAME), err)]
    pub async fn validate_update_object(&self, partial: &Document) -> RepoResult<()> {
        self.prepare_update("validate_update_object", partial)
            .await
            .map(|_| ())
    }

    /// Validate `partial` and return it in storage shape with references
    /// reduced to bare ids.
    ///
    /// Cheap local checks run before any existence lookup.
    pub(crate) async fn prepare_update(
        &self,
        operation: &'static str,
        partial: &Document,
    ) -> RepoResult<Document> {
        for (key, value) in partial {
            if IMMUTABLE_FIELDS.contains(&key.as_str())
                || key == DELETED_AT
                || key == self.translator.version_key()
            {
                return Err(RepoError::invalid_operation(
                    operation,
                    T::NAME,
                    key.as_str(),
                    value,
                    "field is server-assigned and cannot be updated",
                ));
            }
            if self
                .model
                .schema
                .reference_field(key)
                .is_some_and(|r| r.guarded)
            {
                return Err(RepoError::invalid_operation(
                    operation,
                    T::NAME,
                    key.as_str(),
                    value,
                    "collection field is only changed through add_to_collection/remove_from_collection",
                ));
            }
        }

        let mut storage = self
            .translator
            .to_storage(partial)
            .map_err(|e| RepoError::format(operation, T::NAME, e))?;
        let pending = self.normalize_references(operation, &mut storage)?;
        self.model
            .schema
            .validate(T::NAME, &storage, ValidationMode::Partial)
            .map_err(|e| RepoError::data_validation(operation, T::NAME, e))?;
        self.check_references(operation, &pending, MissingReference::Operation)
            .await?;
        Ok(storage)
    }

    /// Rewrite every reference field present in `doc` to bare identities.
    ///
    /// Embedded objects are reduced to the id they carry. Values that are
    /// neither fail as `DataValidation`; `null` is left for the schema check.
    pub(crate) fn normalize_references(
        &self,
        operation: &'static str,
        doc: &mut Document,
    ) -> RepoResult<PendingReferences<'_, S>> {
        let mut pending = Vec::new();
        let mut violations = Vec::new();

        for reference in &self.references {
            let field = &reference.field;
            let Some(value) = doc.get(field.name) else {
                continue;
            };
            if matches!(value, Bson::Null) {
                continue;
            }

            let normalized = match (field.many, value) {
                (true, Bson::Array(items)) => items
                    .iter()
                    .map(Reference::<Document>::normalize)
                    .collect::<Result<Vec<_>, _>>()
                    .ok()
                    .map(|ids| (Bson::Array(ids.iter().copied().map(Bson::from).collect()), ids)),
                (true, _) => None,
                (false, single) => Reference::<Document>::normalize(single)
                    .ok()
                    .map(|id| (Bson::from(id), vec![id])),
            };

            match normalized {
                Some((stored, ids)) => {
                    doc.insert(field.name, stored);
                    pending.push((reference, ids));
                }
                None => {
                    let target = reference.target.entity;
                    violations.push(Violation::WrongType {
                        field: field.name.to_string(),
                        expected: if field.many {
                            format!("an array of {target} references")
                        } else {
                            format!("a {target} reference")
                        },
                        found: bson_type_name(value),
                    });
                }
            }
        }

        if violations.is_empty() {
            Ok(pending)
        } else {
            Err(RepoError::data_validation(
                operation,
                T::NAME,
                SchemaError {
                    entity: T::NAME,
                    violations,
                },
            ))
        }
    }

    /// Decode the storage-shaped document a write would leave behind.
    ///
    /// Catches values the schema admits but the entity type cannot hold, so
    /// they fail as `DataValidation` before anything is written.
    pub(crate) fn ensure_representable(
        &self,
        operation: &'static str,
        candidate: &Document,
    ) -> RepoResult<()> {
        let domain = self
            .translator
            .to_domain(candidate)
            .map_err(|e| RepoError::format(operation, T::NAME, e))?;
        bson::from_document::<T>(domain).map(|_| ()).map_err(|e| {
            RepoError::data_validation(
                operation,
                T::NAME,
                SchemaError::single(
                    T::NAME,
                    Violation::Unrepresentable {
                        reason: e.to_string(),
                    },
                ),
            )
        })
    }

    /// Confirm every pending reference exists, one batched query per field.
    pub(crate) async fn check_references(
        &self,
        operation: &'static str,
        pending: &PendingReferences<'_, S>,
        missing: MissingReference,
    ) -> RepoResult<()> {
        for (reference, ids) in pending {
            let err = match reference.validator.all_exist(ids).await {
                Ok(_) => continue,
                Err(err) if err.is_not_found() => err,
                Err(err) => return Err(err),
            };

            let field = reference.field.name;
            let value = err.missing_ids().map(|ids| ids.join(", ")).unwrap_or_default();
            let reason = format!("referenced {} does not exist", reference.target.entity);
            let classified = match missing {
                MissingReference::Argument => {
                    RepoError::invalid_argument(operation, T::NAME, field, value, reason)
                }
                MissingReference::Operation => {
                    RepoError::invalid_operation(operation, T::NAME, field, value, reason)
                }
            };
            return Err(classified.caused_by(err));
        }
        Ok(())
    }
}
