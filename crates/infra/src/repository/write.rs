//! Mutating operations.
//!
//! Validation (identity, structure, references) completes before the single
//! store write; create and update finish with a read-back through `get_by_id`.

use bson::oid::ObjectId;
use bson::{Document, doc};
use chrono::Utc;
use serde::Serialize;
use tracing::instrument;

use docrepo_core::entity::{CREATED_AT, DELETED_AT, DOMAIN_ID_FIELD, ID_FIELD, UPDATED_AT};
use docrepo_core::{Entity, EntityId, FormatError, RepoError, RepoResult, ValidationMode};

use super::validate::MissingReference;
use super::{EntityRepository, ResolvedReference};
use crate::store::DocumentStore;

fn now() -> bson::DateTime {
    bson::DateTime::from_chrono(Utc::now())
}

impl<T: Entity, S: DocumentStore> EntityRepository<T, S> {
    /// Insert a new entity from its domain shape and return it read back.
    ///
    /// ## Errors
    ///
    /// - `InvalidOperation` if `input` carries an identity
    /// - `DataValidation` for structural failures or malformed references
    /// - `InvalidArgument` if a referenced entity does not exist
    /// - `Unexpected` if the store reports no identity for the insert
    #[instrument(skip(self, input), fields(entity = T::NAME), err)]
    pub async fn create_document(&self, input: Document) -> RepoResult<Document> {
        const OP: &str = "create";
        for key in [ID_FIELD, DOMAIN_ID_FIELD] {
            if let Some(value) = input.get(key) {
                return Err(RepoError::invalid_operation(
                    OP,
                    T::NAME,
                    key,
                    value,
                    "identity is assigned on insert",
                ));
            }
        }

        let mut storage = self
            .translator
            .to_storage(&input)
            .map_err(|e| RepoError::format(OP, T::NAME, e))?;
        storage.remove(DELETED_AT);
        storage.remove(self.translator.version_key());

        let pending = self.normalize_references(OP, &mut storage)?;
        let stamp = now();
        storage.insert(CREATED_AT, stamp);
        storage.insert(UPDATED_AT, stamp);
        self.model
            .schema
            .validate(T::NAME, &storage, ValidationMode::Full)
            .map_err(|e| RepoError::data_validation(OP, T::NAME, e))?;
        let mut candidate = storage.clone();
        candidate.insert(ID_FIELD, ObjectId::new());
        self.ensure_representable(OP, &candidate)?;
        self.check_references(OP, &pending, MissingReference::Argument)
            .await?;

        let ids = self
            .store
            .insert(self.collection(), vec![storage])
            .await
            .map_err(|e| self.store_failure(OP, e))?;
        let id = ids
            .first()
            .and_then(EntityId::from_bson)
            .ok_or_else(|| RepoError::unexpected(OP, T::NAME, "insert returned no identity"))?;

        tracing::debug!(entity = T::NAME, %id, "created");
        self.get_document_by_id(&id.to_hex()).await
    }

    pub async fn create(&self, input: Document) -> RepoResult<T> {
        let doc = self.create_document(input).await?;
        self.decode("create", doc)
    }

    /// Create from any serializable input struct.
    pub async fn create_from<I: Serialize>(&self, input: &I) -> RepoResult<T> {
        let doc = bson::to_document(input).map_err(|e| {
            RepoError::format(
                "create",
                T::NAME,
                FormatError {
                    path: T::NAME.to_string(),
                    reason: e.to_string(),
                },
            )
        })?;
        self.create(doc).await
    }

    /// Apply a partial update and return the entity read back.
    ///
    /// The merged result is checked against the entity type before the
    /// write. Fails `InvalidArgument` when `{_id: id}` matched no live
    /// document.
    #[instrument(skip(self, partial), fields(entity = T::NAME), err)]
    pub async fn update_document_by_id(&self, id: &str, partial: Document) -> RepoResult<Document> {
        const OP: &str = "update_by_id";
        let oid = self.parse_id(OP, "id", id)?;
        let mut set = self.prepare_update(OP, &partial).await?;
        set.insert(UPDATED_AT, now());

        let mut candidate = self
            .store
            .find_by_id(self.collection(), oid.as_object_id())
            .await
            .map_err(|e| self.store_failure(OP, e))?
            .filter(|doc| self.model.is_visible(doc))
            .ok_or_else(|| {
                RepoError::invalid_argument(OP, T::NAME, "id", oid, "no document matched")
            })?;
        for (key, value) in &set {
            candidate.insert(key.clone(), value.clone());
        }
        self.ensure_representable(OP, &candidate)?;

        let outcome = self
            .store
            .update_one(
                self.collection(),
                self.model.visible(doc! { ID_FIELD: oid }),
                doc! { "$set": set },
            )
            .await
            .map_err(|e| self.store_failure(OP, e))?;
        if outcome.matched != 1 {
            return Err(RepoError::invalid_argument(
                OP,
                T::NAME,
                "id",
                oid,
                "no document matched",
            ));
        }

        self.get_document_by_id(id).await
    }

    pub async fn update_by_id(&self, id: &str, partial: Document) -> RepoResult<T> {
        let doc = self.update_document_by_id(id, partial).await?;
        self.decode("update_by_id", doc)
    }

    /// Remove an entity according to its delete policy.
    ///
    /// Soft deletes stamp `deletedAt`; deleting an already soft-deleted
    /// entity matches nothing and fails like any other miss.
    #[instrument(skip(self), fields(entity = T::NAME), err)]
    pub async fn delete_by_id(&self, id: &str) -> RepoResult<()> {
        const OP: &str = "delete_by_id";
        let oid = self.parse_id(OP, "id", id)?;

        let affected = if self.model.schema.is_soft_delete() {
            let stamp = now();
            self.store
                .update_one(
                    self.collection(),
                    self.model.visible(doc! { ID_FIELD: oid }),
                    doc! { "$set": { DELETED_AT: stamp, UPDATED_AT: stamp } },
                )
                .await
                .map_err(|e| self.store_failure(OP, e))?
                .matched
        } else {
            self.store
                .delete_one(self.collection(), doc! { ID_FIELD: oid })
                .await
                .map_err(|e| self.store_failure(OP, e))?
        };

        if affected != 1 {
            return Err(RepoError::invalid_argument(
                OP,
                T::NAME,
                "id",
                oid,
                "no document matched",
            ));
        }
        tracing::debug!(entity = T::NAME, %oid, "deleted");
        Ok(())
    }

    /// Set-add `member` to a guarded collection field.
    #[instrument(skip(self), fields(entity = T::NAME), err)]
    pub async fn add_to_collection(&self, id: &str, field: &str, member: &str) -> RepoResult<T> {
        const OP: &str = "add_to_collection";
        let reference = self.guarded_collection(OP, field, member)?;
        let oid = self.parse_id(OP, "id", id)?;
        let member_id = self.parse_id(OP, field, member)?;

        if !reference.validator.exists_by_id(&member_id).await? {
            let missing = RepoError::not_found(OP, reference.target.entity, [member_id]);
            return Err(RepoError::invalid_operation(
                OP,
                T::NAME,
                field,
                member_id,
                format!("referenced {} does not exist", reference.target.entity),
            )
            .caused_by(missing));
        }

        self.update_collection(OP, oid, doc! {
            "$addToSet": { field: member_id },
            "$set": { UPDATED_AT: now() },
        })
        .await?;
        self.get_by_id(id).await
    }

    /// Remove `member` from a guarded collection field. Removing an absent
    /// member is not an error.
    #[instrument(skip(self), fields(entity = T::NAME), err)]
    pub async fn remove_from_collection(&self, id: &str, field: &str, member: &str) -> RepoResult<T> {
        const OP: &str = "remove_from_collection";
        self.guarded_collection(OP, field, member)?;
        let oid = self.parse_id(OP, "id", id)?;
        let member_id = self.parse_id(OP, field, member)?;

        self.update_collection(OP, oid, doc! {
            "$pull": { field: member_id },
            "$set": { UPDATED_AT: now() },
        })
        .await?;
        self.get_by_id(id).await
    }

    fn guarded_collection(
        &self,
        operation: &'static str,
        field: &str,
        member: &str,
    ) -> RepoResult<&ResolvedReference<S>> {
        self.references
            .iter()
            .find(|r| r.field.name == field && r.field.guarded && r.field.many)
            .ok_or_else(|| {
                RepoError::invalid_operation(
                    operation,
                    T::NAME,
                    field,
                    member,
                    "not a guarded collection field",
                )
            })
    }

    async fn update_collection(
        &self,
        operation: &'static str,
        oid: EntityId,
        update: Document,
    ) -> RepoResult<()> {
        let outcome = self
            .store
            .update_one(self.collection(), self.model.visible(doc! { ID_FIELD: oid }), update)
            .await
            .map_err(|e| self.store_failure(operation, e))?;
        if outcome.matched != 1 {
            return Err(RepoError::invalid_argument(
                operation,
                T::NAME,
                "id",
                oid,
                "no document matched",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use docrepo_core::{EntitySchema, ErrorKind, FieldKind, Identified, ReferenceField};
    use serde::Deserialize;

    use crate::config::RepositoryConfig;
    use crate::registry::Model;
    use crate::store::InMemoryDocumentStore;

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Note {
        id: String,
        text: String,
        #[serde(default)]
        tags: Vec<EntityId>,
        #[serde(default)]
        priority: Option<u8>,
        created_at: bson::DateTime,
        updated_at: bson::DateTime,
    }

    impl Identified for Note {
        fn identity(&self) -> Option<EntityId> {
            EntityId::parse(&self.id).ok()
        }
    }

    impl Entity for Note {
        const NAME: &'static str = "note";

        fn schema() -> EntitySchema {
            EntitySchema::new("notes")
                .required("text", FieldKind::String)
                .optional("priority", FieldKind::Int)
                .reference(ReferenceField::many("tags", "tag").guarded())
                .soft_delete()
        }
    }

    fn notes() -> (Arc<InMemoryDocumentStore>, EntityRepository<Note, InMemoryDocumentStore>) {
        let store = Arc::new(InMemoryDocumentStore::new());
        let model = Arc::new(Model {
            entity: Note::NAME,
            schema: Note::schema(),
        });
        let tags = Arc::new(Model {
            entity: "tag",
            schema: EntitySchema::new("tags"),
        });
        let targets = vec![(ReferenceField::many("tags", "tag").guarded(), tags)];
        let repo = EntityRepository::new(
            Arc::clone(&store),
            model,
            targets,
            Arc::new(RepositoryConfig::default()),
        );
        (store, repo)
    }

    #[tokio::test]
    async fn create_stamps_timestamps_and_reads_back() {
        let (_, repo) = notes();
        let note = repo.create(doc! { "text": "hello" }).await.unwrap();
        assert_eq!(note.text, "hello");
        assert_eq!(note.created_at, note.updated_at);
        assert!(note.tags.is_empty());
    }

    #[tokio::test]
    async fn create_rejects_supplied_identity_and_bad_structure() {
        let (_, repo) = notes();
        let err = repo
            .create(doc! { "id": EntityId::new().to_hex(), "text": "x" })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);

        let err = repo.create(doc! { "text": 5 }).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataValidation);
    }

    #[tokio::test]
    async fn values_the_entity_cannot_hold_never_reach_the_store() {
        let (store, repo) = notes();
        let err = repo
            .create(doc! { "text": "n", "priority": 1000 })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataValidation);
        assert_eq!(store.len("notes").await, 0);

        let note = repo.create(doc! { "text": "n", "priority": 3 }).await.unwrap();
        assert_eq!(note.priority, Some(3));
        let err = repo
            .update_by_id(&note.id, doc! { "priority": -1 })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataValidation);
        assert_eq!(repo.get_by_id(&note.id).await.unwrap().priority, Some(3));
    }

    #[tokio::test]
    async fn guarded_fields_go_through_collection_ops() {
        let (store, repo) = notes();
        let tag = store.insert("tags", vec![doc! {}]).await.unwrap();
        let tag = EntityId::from_bson(&tag[0]).unwrap().to_hex();
        let note = repo.create(doc! { "text": "n" }).await.unwrap();

        let err = repo
            .update_by_id(&note.id, doc! { "tags": [tag.clone()] })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        assert_eq!(err.field(), Some("tags"));

        let added = repo.add_to_collection(&note.id, "tags", &tag).await.unwrap();
        let again = repo.add_to_collection(&note.id, "tags", &tag).await.unwrap();
        assert_eq!(added.tags.len(), 1);
        assert_eq!(again.tags.len(), 1);

        let removed = repo.remove_from_collection(&note.id, "tags", &tag).await.unwrap();
        assert!(removed.tags.is_empty());

        let err = repo
            .add_to_collection(&note.id, "tags", &EntityId::new().to_hex())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        assert!(err.missing_ids().is_some());

        let err = repo.add_to_collection(&note.id, "text", &tag).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    }

    #[tokio::test]
    async fn soft_delete_hides_and_cannot_repeat() {
        let (store, repo) = notes();
        let note = repo.create(doc! { "text": "bye" }).await.unwrap();

        repo.delete_by_id(&note.id).await.unwrap();
        assert_eq!(store.len("notes").await, 1);
        assert!(repo.get_by_id(&note.id).await.unwrap_err().is_not_found());
        assert!(!repo.id_exists(&note.id).await.unwrap());

        let err = repo.delete_by_id(&note.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = repo
            .update_by_id(&note.id, doc! { "text": "back" })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn deleted_at_is_not_writable() {
        let (_, repo) = notes();
        let note = repo.create(doc! { "text": "t" }).await.unwrap();
        let err = repo
            .update_by_id(&note.id, doc! { "deletedAt": bson::DateTime::now() })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        assert_eq!(err.field(), Some("deletedAt"));
    }
}
