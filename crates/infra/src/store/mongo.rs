//! MongoDB-backed document store (cargo feature `mongodb`).
//!
//! Thin mapping onto the official driver; connection pooling and lifecycle
//! stay with the `mongodb::Client` the caller hands in.

use bson::oid::ObjectId;
use bson::{Bson, Document, doc};
use futures::TryStreamExt;
use mongodb::error::{Error as MongoError, ErrorKind as MongoErrorKind, WriteFailure};
use mongodb::options::FindOptions as MongoFindOptions;
use mongodb::{Collection, Database};

use docrepo_core::StoreError;

use super::r#trait::{DocumentStore, FindOptions, UpdateOutcome};

const DUPLICATE_KEY_CODE: i32 = 11000;

pub struct MongoDocumentStore {
    db: Database,
}

impl MongoDocumentStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Connect with a connection string and bind to `database`.
    pub async fn connect(uri: &str, database: &str) -> Result<Self, StoreError> {
        let client = mongodb::Client::with_uri_str(uri)
            .await
            .map_err(|e| map_error("<connect>", e))?;
        tracing::info!(database, "connected to document store");
        Ok(Self::new(client.database(database)))
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection::<Document>(name)
    }
}

fn map_error(collection: &str, err: MongoError) -> StoreError {
    if let Some(key) = duplicate_key(&err.kind) {
        return StoreError::DuplicateKey {
            collection: collection.to_string(),
            key,
        };
    }
    match err.kind.as_ref() {
        MongoErrorKind::ServerSelection { .. } | MongoErrorKind::Io(_) => {
            StoreError::Unavailable(err.to_string())
        }
        _ => StoreError::Backend(err.to_string()),
    }
}

/// Message of the first duplicate-key write error. `insert_many` reports
/// them as bulk write failures, single writes as write errors.
fn duplicate_key(kind: &MongoErrorKind) -> Option<String> {
    match kind {
        MongoErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY_CODE => {
            Some(e.message.clone())
        }
        MongoErrorKind::BulkWrite(failure) => failure
            .write_errors
            .iter()
            .flatten()
            .find(|e| e.code == DUPLICATE_KEY_CODE)
            .map(|e| e.message.clone()),
        _ => None,
    }
}

#[async_trait::async_trait]
impl DocumentStore for MongoDocumentStore {
    async fn find_by_id(
        &self,
        collection: &str,
        id: &ObjectId,
    ) -> Result<Option<Document>, StoreError> {
        self.collection(collection)
            .find_one(doc! { "_id": *id }, None)
            .await
            .map_err(|e| map_error(collection, e))
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        let limit = options
            .limit
            .filter(|l| *l > 0)
            .map(|l| i64::try_from(l).unwrap_or(i64::MAX));
        let driver_options = MongoFindOptions::builder()
            .projection(options.projection)
            .sort(options.sort)
            .skip(options.skip)
            .limit(limit)
            .build();

        let cursor = self
            .collection(collection)
            .find(filter, driver_options)
            .await
            .map_err(|e| map_error(collection, e))?;
        cursor
            .try_collect()
            .await
            .map_err(|e| map_error(collection, e))
    }

    async fn count(&self, collection: &str, filter: Document) -> Result<u64, StoreError> {
        self.collection(collection)
            .count_documents(filter, None)
            .await
            .map_err(|e| map_error(collection, e))
    }

    async fn insert(&self, collection: &str, docs: Vec<Document>) -> Result<Vec<Bson>, StoreError> {
        if docs.is_empty() {
            return Ok(vec![]);
        }
        let result = self
            .collection(collection)
            .insert_many(docs, None)
            .await
            .map_err(|e| map_error(collection, e))?;

        let mut ids: Vec<(usize, Bson)> = result.inserted_ids.into_iter().collect();
        ids.sort_by_key(|(index, _)| *index);
        Ok(ids.into_iter().map(|(_, id)| id).collect())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<UpdateOutcome, StoreError> {
        let result = self
            .collection(collection)
            .update_one(filter, update, None)
            .await
            .map_err(|e| map_error(collection, e))?;
        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> Result<u64, StoreError> {
        let result = self
            .collection(collection)
            .delete_one(filter, None)
            .await
            .map_err(|e| map_error(collection, e))?;
        Ok(result.deleted_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::error::BulkWriteFailure;

    fn bulk_failure(code: i32) -> MongoError {
        let failure: BulkWriteFailure = bson::from_document(doc! {
            "writeErrors": [{ "index": 0, "code": code, "errmsg": "E11000 duplicate key error" }],
        })
        .unwrap();
        MongoError::from(MongoErrorKind::BulkWrite(failure))
    }

    #[test]
    fn bulk_insert_duplicates_map_to_duplicate_key() {
        let err = map_error("users", bulk_failure(DUPLICATE_KEY_CODE));
        assert_eq!(
            err,
            StoreError::DuplicateKey {
                collection: "users".into(),
                key: "E11000 duplicate key error".into(),
            }
        );
    }

    #[test]
    fn other_bulk_failures_stay_backend_errors() {
        assert!(matches!(map_error("users", bulk_failure(121)), StoreError::Backend(_)));
    }
}
