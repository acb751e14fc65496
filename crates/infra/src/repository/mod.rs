//! Generic repository engine.
//!
//! One [`EntityRepository`] per entity type, bound to a shared
//! [`DocumentStore`]. Reads live here; mutations in `write`, update
//! validation in `validate`.
//!
//! Every operation classifies failures into [`RepoError`] before returning;
//! errors already classified by a nested call pass through unchanged.

mod validate;
mod write;

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use bson::{Bson, Document, doc};
use tracing::instrument;

use docrepo_core::entity::{DOMAIN_ID_FIELD, ID_FIELD};
use docrepo_core::{
    Entity, EntityId, FormatError, FormatTranslator, Page, QueryResult, ReferenceField, RepoError,
    RepoResult,
};

use crate::config::RepositoryConfig;
use crate::reference::ReferenceValidator;
use crate::registry::Model;
use crate::store::{DocumentStore, FindOptions};

/// A reference field together with the repository-side view of its target.
pub(crate) struct ResolvedReference<S> {
    pub(crate) field: ReferenceField,
    pub(crate) target: Arc<Model>,
    pub(crate) validator: ReferenceValidator<S>,
}

impl<S> Clone for ResolvedReference<S> {
    fn clone(&self) -> Self {
        Self {
            field: self.field.clone(),
            target: Arc::clone(&self.target),
            validator: self.validator.clone(),
        }
    }
}

pub struct EntityRepository<T, S> {
    store: Arc<S>,
    model: Arc<Model>,
    references: Vec<ResolvedReference<S>>,
    validator: ReferenceValidator<S>,
    translator: FormatTranslator,
    config: Arc<RepositoryConfig>,
    _entity: PhantomData<fn() -> T>,
}

impl<T, S> Clone for EntityRepository<T, S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            model: Arc::clone(&self.model),
            references: self.references.clone(),
            validator: self.validator.clone(),
            translator: self.translator.clone(),
            config: Arc::clone(&self.config),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity, S: DocumentStore> EntityRepository<T, S> {
    /// Bind a registered model to `store`.
    ///
    /// `targets` pairs every reference field of the model with the model it
    /// points at; [`crate::registry::Repositories`] resolves them.
    pub fn new(
        store: Arc<S>,
        model: Arc<Model>,
        targets: Vec<(ReferenceField, Arc<Model>)>,
        config: Arc<RepositoryConfig>,
    ) -> Self {
        let references = targets
            .into_iter()
            .map(|(field, target)| ResolvedReference {
                field,
                validator: ReferenceValidator::new(Arc::clone(&store), Arc::clone(&target)),
                target,
            })
            .collect();
        Self {
            validator: ReferenceValidator::new(Arc::clone(&store), Arc::clone(&model)),
            translator: config.translator(),
            store,
            model,
            references,
            config,
            _entity: PhantomData,
        }
    }

    pub fn entity(&self) -> &'static str {
        T::NAME
    }

    pub fn collection(&self) -> &'static str {
        self.model.collection()
    }

    pub fn translator(&self) -> &FormatTranslator {
        &self.translator
    }

    pub(crate) fn parse_id(&self, operation: &'static str, field: &str, raw: &str) -> RepoResult<EntityId> {
        EntityId::parse(raw).map_err(|e| {
            RepoError::invalid_argument(operation, T::NAME, field, raw, e.to_string())
        })
    }

    /// Whether `id` names a live entity of this type.
    #[instrument(skip(self), fields(entity = T::NAME), err)]
    pub async fn id_exists(&self, id: &str) -> RepoResult<bool> {
        let id = self.parse_id("id_exists", "id", id)?;
        self.validator.exists_by_id(&id).await
    }

    /// All-or-nothing existence check, for other entities validating
    /// references into this one.
    #[instrument(skip(self, ids), fields(entity = T::NAME, count = ids.len()), err)]
    pub async fn all_ids_exist<I: AsRef<str>>(&self, ids: &[I]) -> RepoResult<bool> {
        let ids = ids
            .iter()
            .map(|raw| self.parse_id("all_ids_exist", "ids", raw.as_ref()))
            .collect::<RepoResult<Vec<_>>>()?;
        self.validator.all_exist(&ids).await
    }

    /// Domain-shaped document with declared references populated.
    #[instrument(skip(self), fields(entity = T::NAME), err)]
    pub async fn get_document_by_id(&self, id: &str) -> RepoResult<Document> {
        const OP: &str = "get_by_id";
        let oid = self.parse_id(OP, "id", id)?;

        let raw = self
            .store
            .find_by_id(self.collection(), oid.as_object_id())
            .await
            .map_err(|e| self.store_failure(OP, e))?
            .filter(|doc| self.model.is_visible(doc))
            .ok_or_else(|| RepoError::not_found(OP, T::NAME, [oid]))?;

        let populated = self.populate(OP, raw).await?;
        self.translator
            .to_domain(&populated)
            .map_err(|e| RepoError::format(OP, T::NAME, e))
    }

    pub async fn get_by_id(&self, id: &str) -> RepoResult<T> {
        let doc = self.get_document_by_id(id).await?;
        self.decode("get_by_id", doc)
    }

    /// Same as [`Self::get_document_by_id`], rendered as relaxed extended JSON.
    pub async fn get_json_by_id(&self, id: &str) -> RepoResult<serde_json::Value> {
        let doc = self.get_document_by_id(id).await?;
        Ok(self.translator.to_json(doc))
    }

    /// Paged query returning domain-shaped documents.
    ///
    /// `filter` is domain-shaped: identities are hex strings under `id`.
    /// An empty match set is `NotFound`, not an empty page. A page starting
    /// past the last match is `InvalidArgument`.
    #[instrument(skip(self, filter), fields(entity = T::NAME, filter = %filter), err)]
    pub async fn query_documents(
        &self,
        filter: Document,
        page: u64,
        items_per_page: u64,
    ) -> RepoResult<QueryResult<Document>> {
        const OP: &str = "query";
        if items_per_page == 0 {
            return Err(RepoError::invalid_argument(
                OP,
                T::NAME,
                "itemsPerPage",
                items_per_page,
                "must be greater than zero",
            ));
        }
        let page = Page::new(page, self.config.clamp_items_per_page(items_per_page));
        let described = filter.to_string();
        let filter = self.model.visible(self.storage_filter(OP, &filter)?);

        let count = self
            .store
            .count(self.collection(), filter.clone())
            .await
            .map_err(|e| self.store_failure(OP, e))?;
        if count == 0 {
            return Err(RepoError::not_found(OP, T::NAME, [format!("filter {described}")]));
        }

        let skip = page.offset_within(count).map_err(|out| {
            RepoError::invalid_argument(
                OP,
                T::NAME,
                "page",
                out.page,
                format!("maximum page is {}", out.max_page),
            )
        })?;

        let raws = self
            .store
            .find(
                self.collection(),
                filter,
                FindOptions::page(skip, page.items_per_page).with_sort(doc! { ID_FIELD: 1 }),
            )
            .await
            .map_err(|e| self.store_failure(OP, e))?;
        let results = self
            .translator
            .to_domain_many(&raws)
            .map_err(|e| RepoError::format(OP, T::NAME, e))?;

        Ok(QueryResult {
            results,
            number_of_items: count,
            page: page.page,
            items_per_page: page.items_per_page,
        })
    }

    pub async fn query(
        &self,
        filter: Document,
        page: u64,
        items_per_page: u64,
    ) -> RepoResult<QueryResult<T>> {
        self.query_documents(filter, page, items_per_page)
            .await?
            .try_map(|doc| self.decode("query", doc))
    }

    /// First page at the configured default page size.
    pub async fn query_default(&self, filter: Document) -> RepoResult<QueryResult<T>> {
        self.query(filter, 0, self.config.default_items_per_page).await
    }

    /// Rewrite a domain-shaped filter into storage shape.
    ///
    /// `id` becomes `_id`. Hex strings compared against the identity or a
    /// declared reference field become object ids, also inside `$in`,
    /// `$nin`, `$eq`, `$ne` and `$all`. Logical operators are walked.
    fn storage_filter(&self, operation: &'static str, filter: &Document) -> RepoResult<Document> {
        let mut out = Document::new();
        for (key, value) in filter {
            match key.as_str() {
                "$and" | "$or" | "$nor" => {
                    let Bson::Array(clauses) = value else {
                        return Err(RepoError::invalid_argument(
                            operation,
                            T::NAME,
                            key.as_str(),
                            value,
                            "expects an array of filters",
                        ));
                    };
                    let translated = clauses
                        .iter()
                        .map(|clause| match clause {
                            Bson::Document(d) => self.storage_filter(operation, d).map(Bson::Document),
                            other => Err(RepoError::invalid_argument(
                                operation,
                                T::NAME,
                                key.as_str(),
                                other,
                                "expects an array of filters",
                            )),
                        })
                        .collect::<RepoResult<Vec<_>>>()?;
                    out.insert(key.clone(), translated);
                }
                DOMAIN_ID_FIELD | ID_FIELD => {
                    out.insert(ID_FIELD, self.identity_condition(operation, key, value)?);
                }
                name if self.model.schema.reference_field(name).is_some() => {
                    out.insert(key.clone(), self.identity_condition(operation, key, value)?);
                }
                _ => {
                    out.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(out)
    }

    fn identity_condition(&self, operation: &'static str, field: &str, value: &Bson) -> RepoResult<Bson> {
        match value {
            Bson::String(raw) => self.parse_id(operation, field, raw).map(Bson::from),
            Bson::Array(items) => items
                .iter()
                .map(|item| self.identity_condition(operation, field, item))
                .collect::<RepoResult<Vec<_>>>()
                .map(Bson::Array),
            Bson::Document(ops) if !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')) => {
                let mut out = Document::new();
                for (op, arg) in ops {
                    let arg = match op.as_str() {
                        "$eq" | "$ne" | "$in" | "$nin" | "$all" => {
                            self.identity_condition(operation, field, arg)?
                        }
                        _ => arg.clone(),
                    };
                    out.insert(op.clone(), arg);
                }
                Ok(Bson::Document(out))
            }
            other => Ok(other.clone()),
        }
    }

    fn decode(&self, operation: &'static str, doc: Document) -> RepoResult<T> {
        bson::from_document(doc).map_err(|e| {
            RepoError::format(
                operation,
                T::NAME,
                FormatError {
                    path: T::NAME.to_string(),
                    reason: e.to_string(),
                },
            )
        })
    }

    pub(crate) fn store_failure(&self, operation: &'static str, err: docrepo_core::StoreError) -> RepoError {
        tracing::error!(entity = T::NAME, operation, error = %err, "store call failed");
        RepoError::database(operation, T::NAME, err)
    }

    /// Replace populated reference ids with the referenced documents.
    ///
    /// Dangling or soft-deleted targets keep their bare id.
    async fn populate(&self, operation: &'static str, mut raw: Document) -> RepoResult<Document> {
        for reference in self.references.iter().filter(|r| r.field.populate) {
            let name = reference.field.name;
            let collection = reference.target.collection();
            match raw.get(name).cloned() {
                Some(Bson::ObjectId(oid)) => {
                    let found = self
                        .store
                        .find_by_id(collection, &oid)
                        .await
                        .map_err(|e| self.store_failure(operation, e))?;
                    if let Some(target) = found.filter(|d| reference.target.is_visible(d)) {
                        raw.insert(name, target);
                    }
                }
                Some(Bson::Array(items)) => {
                    let ids: Vec<Bson> = items
                        .iter()
                        .filter(|item| matches!(item, Bson::ObjectId(_)))
                        .cloned()
                        .collect();
                    if ids.is_empty() {
                        continue;
                    }
                    let filter = reference.target.visible(doc! { ID_FIELD: { "$in": ids } });
                    let found = self
                        .store
                        .find(collection, filter, FindOptions::default())
                        .await
                        .map_err(|e| self.store_failure(operation, e))?;
                    let mut by_id: HashMap<String, Document> = found
                        .into_iter()
                        .filter_map(|d| {
                            let key = d.get(ID_FIELD)?.to_string();
                            Some((key, d))
                        })
                        .collect();
                    let resolved: Vec<Bson> = items
                        .iter()
                        .map(|item| match by_id.remove(&item.to_string()) {
                            Some(target) => Bson::Document(target),
                            None => item.clone(),
                        })
                        .collect();
                    raw.insert(name, resolved);
                }
                _ => {}
            }
        }
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryDocumentStore;
    use docrepo_core::{EntitySchema, ErrorKind, FieldKind, Identified};
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Tag {
        id: String,
        label: String,
    }

    impl Identified for Tag {
        fn identity(&self) -> Option<EntityId> {
            EntityId::parse(&self.id).ok()
        }
    }

    impl Entity for Tag {
        const NAME: &'static str = "tag";

        fn schema() -> EntitySchema {
            EntitySchema::new("tags").required("label", FieldKind::String)
        }
    }

    fn repo(max_items_per_page: u64) -> (Arc<InMemoryDocumentStore>, EntityRepository<Tag, InMemoryDocumentStore>) {
        let store = Arc::new(InMemoryDocumentStore::new());
        let model = Arc::new(Model {
            entity: Tag::NAME,
            schema: Tag::schema(),
        });
        let config = Arc::new(RepositoryConfig {
            max_items_per_page,
            ..RepositoryConfig::default()
        });
        (Arc::clone(&store), EntityRepository::new(store, model, vec![], config))
    }

    async fn seed(store: &InMemoryDocumentStore, labels: &[&str]) -> Vec<String> {
        let docs = labels.iter().map(|l| doc! { "label": *l }).collect();
        store
            .insert("tags", docs)
            .await
            .unwrap()
            .iter()
            .map(|id| EntityId::from_bson(id).unwrap().to_hex())
            .collect()
    }

    #[tokio::test]
    async fn get_by_id_strips_version_marker() {
        let (store, repo) = repo(100);
        let ids = seed(&store, &["red"]).await;

        let doc = repo.get_document_by_id(&ids[0]).await.unwrap();
        assert_eq!(doc.get_str("id").unwrap(), ids[0]);
        assert!(!doc.contains_key("__v"));
        assert!(!doc.contains_key("_id"));

        let tag = repo.get_by_id(&ids[0]).await.unwrap();
        assert_eq!(tag.label, "red");
    }

    #[tokio::test]
    async fn get_by_id_classifies_misses_and_garbage() {
        let (_, repo) = repo(100);
        let missing = repo.get_by_id(&EntityId::new().to_hex()).await.unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NotFound);

        let garbage = repo.get_by_id("not-an-id").await.unwrap_err();
        assert_eq!(garbage.kind(), ErrorKind::InvalidArgument);
        assert_eq!(garbage.field(), Some("id"));
    }

    #[tokio::test]
    async fn query_clamps_page_size_and_sorts_by_id() {
        let (store, repo) = repo(2);
        let ids = seed(&store, &["a", "b", "c"]).await;

        let first = repo.query(doc! {}, 0, 50).await.unwrap();
        assert_eq!(first.items_per_page, 2);
        assert_eq!(first.number_of_items, 3);
        assert_eq!(
            first.results.iter().map(|t| t.id.clone()).collect::<Vec<_>>(),
            ids[..2].to_vec()
        );
        assert!(first.has_more());

        let second = repo.query(doc! {}, 1, 2).await.unwrap();
        assert_eq!(second.results.len(), 1);
        assert_eq!(second.results[0].label, "c");
    }

    #[tokio::test]
    async fn query_rejects_zero_page_size() {
        let (store, repo) = repo(100);
        seed(&store, &["a"]).await;
        let err = repo.query(doc! {}, 0, 0).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(err.field(), Some("itemsPerPage"));
    }
}
