use std::sync::Arc;

use bson::oid::ObjectId;
use bson::{Bson, Document};

use docrepo_core::StoreError;

/// Options for [`DocumentStore::find`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Inclusion (`{field: 1}`) or exclusion (`{field: 0}`) projection.
    pub projection: Option<Document>,
    /// `{field: 1 | -1, ...}`, applied before skip/limit.
    pub sort: Option<Document>,
    pub skip: Option<u64>,
    /// `None` or `Some(0)` means unbounded.
    pub limit: Option<u64>,
}

impl FindOptions {
    pub fn page(skip: u64, limit: u64) -> Self {
        Self {
            skip: Some(skip),
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn with_projection(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn with_sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }
}

/// Result of [`DocumentStore::update_one`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
}

/// The document store driver this layer sits on.
///
/// The store owns per-document atomicity, unique `_id` enforcement and the
/// version marker; repositories add validation, classification and
/// translation on top. Filters and updates use the store's native query
/// language (`{_id: {$in: [...]}}`, `{$set: {...}}`).
///
/// ## Implementation Requirements
///
/// - `insert` is all-or-nothing per call and returns the `_id` of every
///   inserted document, in input order.
/// - `update_one` and `delete_one` touch at most the first matching document.
/// - Errors are reported as [`StoreError`]; "no match" is never an error.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_by_id(
        &self,
        collection: &str,
        id: &ObjectId,
    ) -> Result<Option<Document>, StoreError>;

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> Result<Vec<Document>, StoreError>;

    async fn count(&self, collection: &str, filter: Document) -> Result<u64, StoreError>;

    async fn insert(&self, collection: &str, docs: Vec<Document>) -> Result<Vec<Bson>, StoreError>;

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<UpdateOutcome, StoreError>;

    /// Returns the number of deleted documents (0 or 1).
    async fn delete_one(&self, collection: &str, filter: Document) -> Result<u64, StoreError>;
}

#[async_trait::async_trait]
impl<S> DocumentStore for Arc<S>
where
    S: DocumentStore + ?Sized,
{
    async fn find_by_id(
        &self,
        collection: &str,
        id: &ObjectId,
    ) -> Result<Option<Document>, StoreError> {
        (**self).find_by_id(collection, id).await
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        (**self).find(collection, filter, options).await
    }

    async fn count(&self, collection: &str, filter: Document) -> Result<u64, StoreError> {
        (**self).count(collection, filter).await
    }

    async fn insert(&self, collection: &str, docs: Vec<Document>) -> Result<Vec<Bson>, StoreError> {
        (**self).insert(collection, docs).await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<UpdateOutcome, StoreError> {
        (**self).update_one(collection, filter, update).await
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> Result<u64, StoreError> {
        (**self).delete_one(collection, filter).await
    }
}
