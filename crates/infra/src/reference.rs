//! Reference existence checks against one target entity.

use std::collections::HashSet;
use std::sync::Arc;

use bson::{Bson, doc};

use docrepo_core::entity::ID_FIELD;
use docrepo_core::{EntityId, RepoError, RepoResult};

use crate::registry::Model;
use crate::store::{DocumentStore, FindOptions};

/// Confirms that ids exist in the collection of one entity.
///
/// Soft-deleted documents count as absent.
pub struct ReferenceValidator<S> {
    store: Arc<S>,
    model: Arc<Model>,
}

impl<S> Clone for ReferenceValidator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            model: Arc::clone(&self.model),
        }
    }
}

impl<S: DocumentStore> ReferenceValidator<S> {
    pub fn new(store: Arc<S>, model: Arc<Model>) -> Self {
        Self { store, model }
    }

    pub fn entity(&self) -> &'static str {
        self.model.entity
    }

    /// Single lookup by id. Store failures surface as `DatabaseOperation`,
    /// never as `false`.
    pub async fn exists_by_id(&self, id: &EntityId) -> RepoResult<bool> {
        let found = self
            .store
            .find_by_id(self.model.collection(), id.as_object_id())
            .await
            .map_err(|e| {
                tracing::error!(entity = self.model.entity, error = %e, "existence lookup failed");
                RepoError::database("exists_by_id", self.model.entity, e)
            })?;
        Ok(found.is_some_and(|doc| self.model.is_visible(&doc)))
    }

    /// All-or-nothing existence check in one round trip.
    ///
    /// Fails `NotFound` listing exactly the ids that are missing.
    pub async fn all_exist(&self, ids: &[EntityId]) -> RepoResult<bool> {
        let mut requested = Vec::with_capacity(ids.len());
        let mut seen = HashSet::with_capacity(ids.len());
        for id in ids {
            if seen.insert(*id) {
                requested.push(*id);
            }
        }
        if requested.is_empty() {
            return Ok(true);
        }

        let wanted: Vec<Bson> = requested.iter().map(|id| Bson::from(*id)).collect();
        let filter = self.model.visible(doc! { ID_FIELD: { "$in": wanted } });
        let found = self
            .store
            .find(
                self.model.collection(),
                filter,
                FindOptions::default().with_projection(doc! { ID_FIELD: 1 }),
            )
            .await
            .map_err(|e| {
                tracing::error!(entity = self.model.entity, error = %e, "existence query failed");
                RepoError::database("all_exist", self.model.entity, e)
            })?;

        let found: HashSet<EntityId> = found
            .iter()
            .filter_map(|doc| doc.get(ID_FIELD).and_then(EntityId::from_bson))
            .collect();
        let missing: Vec<String> = requested
            .iter()
            .filter(|id| !found.contains(*id))
            .map(EntityId::to_hex)
            .collect();

        if missing.is_empty() {
            Ok(true)
        } else {
            tracing::warn!(
                entity = self.model.entity,
                missing = ?missing,
                "referenced entities do not exist"
            );
            Err(RepoError::not_found("all_exist", self.model.entity, missing))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryDocumentStore;
    use docrepo_core::{EntitySchema, ErrorKind, FieldKind};

    fn validator(soft: bool) -> (Arc<InMemoryDocumentStore>, ReferenceValidator<InMemoryDocumentStore>) {
        let mut schema = EntitySchema::new("accounts").required("name", FieldKind::String);
        if soft {
            schema = schema.soft_delete();
        }
        let store = Arc::new(InMemoryDocumentStore::new());
        let model = Arc::new(Model {
            entity: "account",
            schema,
        });
        (Arc::clone(&store), ReferenceValidator::new(store, model))
    }

    async fn seed(store: &InMemoryDocumentStore, doc: bson::Document) -> EntityId {
        let ids = store.insert("accounts", vec![doc]).await.unwrap();
        EntityId::from_bson(&ids[0]).unwrap()
    }

    #[tokio::test]
    async fn all_exist_accepts_present_ids() {
        let (store, validator) = validator(false);
        let a = seed(&store, doc! { "name": "a" }).await;
        let b = seed(&store, doc! { "name": "b" }).await;

        assert!(validator.all_exist(&[a, b, a]).await.unwrap());
        assert!(validator.all_exist(&[]).await.unwrap());
        assert!(validator.exists_by_id(&a).await.unwrap());
    }

    #[tokio::test]
    async fn all_exist_names_only_missing_ids() {
        let (store, validator) = validator(false);
        let present = seed(&store, doc! { "name": "a" }).await;
        let absent = EntityId::new();

        let err = validator.all_exist(&[present, absent]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.missing_ids(), Some(&[absent.to_hex()][..]));
        assert!(!validator.exists_by_id(&absent).await.unwrap());
    }

    #[tokio::test]
    async fn soft_deleted_targets_count_as_absent() {
        let (store, validator) = validator(true);
        let gone = seed(&store, doc! { "name": "a", "deletedAt": bson::DateTime::now() }).await;

        assert!(!validator.exists_by_id(&gone).await.unwrap());
        assert!(validator.all_exist(&[gone]).await.unwrap_err().is_not_found());
    }
}
