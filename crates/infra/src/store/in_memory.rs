use std::collections::{HashMap, HashSet};

use bson::oid::ObjectId;
use bson::{Bson, Document};
use tokio::sync::RwLock;

use docrepo_core::{DEFAULT_VERSION_KEY, StoreError};

use super::filter::{apply_update, matches, project, sort};
use super::r#trait::{DocumentStore, FindOptions, UpdateOutcome};

/// In-memory document store.
///
/// Intended for tests/dev. Collections keep insertion order; every lookup is a
/// linear scan. Behaves like the real store where repositories can observe it:
/// assigns `_id` when absent, rejects duplicate `_id`s, injects the version
/// marker on insert and bumps it whenever an array field changes.
#[derive(Debug)]
pub struct InMemoryDocumentStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    version_key: String,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::with_version_key(DEFAULT_VERSION_KEY)
    }

    pub fn with_version_key(version_key: impl Into<String>) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            version_key: version_key.into(),
        }
    }

    /// Number of stored documents in `collection`, soft-deleted ones included.
    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, Vec::len)
    }

    fn bump_version(&self, doc: &mut Document) {
        let next = match doc.get(&self.version_key) {
            Some(Bson::Int32(v)) => Bson::Int32(v.saturating_add(1)),
            Some(Bson::Int64(v)) => Bson::Int64(v.saturating_add(1)),
            _ => Bson::Int32(1),
        };
        doc.insert(self.version_key.clone(), next);
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn find_by_id(
        &self,
        collection: &str,
        id: &ObjectId,
    ) -> Result<Option<Document>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).and_then(|docs| {
            docs.iter()
                .find(|d| d.get_object_id("_id").is_ok_and(|stored| stored == *id))
                .cloned()
        }))
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(vec![]);
        };

        let mut found = Vec::new();
        for doc in docs {
            if matches(doc, &filter)? {
                found.push(doc.clone());
            }
        }
        drop(collections);

        if let Some(spec) = &options.sort {
            sort(&mut found, spec);
        }

        let skip = usize::try_from(options.skip.unwrap_or(0)).unwrap_or(usize::MAX);
        let limit = match options.limit {
            None | Some(0) => usize::MAX,
            Some(n) => usize::try_from(n).unwrap_or(usize::MAX),
        };

        Ok(found
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|doc| match &options.projection {
                Some(projection) => project(&doc, projection),
                None => doc,
            })
            .collect())
    }

    async fn count(&self, collection: &str, filter: Document) -> Result<u64, StoreError> {
        let collections = self.collections.read().await;
        let mut n = 0;
        for doc in collections.get(collection).into_iter().flatten() {
            if matches(doc, &filter)? {
                n += 1;
            }
        }
        Ok(n)
    }

    async fn insert(&self, collection: &str, docs: Vec<Document>) -> Result<Vec<Bson>, StoreError> {
        let mut collections = self.collections.write().await;
        let stored = collections.entry(collection.to_string()).or_default();

        let mut seen: HashSet<String> = stored
            .iter()
            .filter_map(|d| d.get("_id").map(ToString::to_string))
            .collect();

        // Validate the whole batch before touching the collection.
        let mut prepared = Vec::with_capacity(docs.len());
        for mut doc in docs {
            if !doc.contains_key("_id") {
                doc.insert("_id", ObjectId::new());
            }
            let key = doc.get("_id").map(ToString::to_string).unwrap_or_default();
            if !seen.insert(key.clone()) {
                return Err(StoreError::DuplicateKey {
                    collection: collection.to_string(),
                    key,
                });
            }
            if !doc.contains_key(&self.version_key) {
                doc.insert(self.version_key.clone(), 0_i32);
            }
            prepared.push(doc);
        }

        let ids = prepared
            .iter()
            .filter_map(|d| d.get("_id").cloned())
            .collect();
        stored.extend(prepared);
        Ok(ids)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<UpdateOutcome, StoreError> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(UpdateOutcome::default());
        };

        for doc in docs.iter_mut() {
            if !matches(doc, &filter)? {
                continue;
            }
            let mut next = doc.clone();
            let effect = apply_update(&mut next, &update)?;
            if effect.arrays_changed {
                self.bump_version(&mut next);
            }
            if effect.modified {
                *doc = next;
            }
            return Ok(UpdateOutcome {
                matched: 1,
                modified: u64::from(effect.modified),
            });
        }
        Ok(UpdateOutcome::default())
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> Result<u64, StoreError> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };

        let mut position = None;
        for (i, doc) in docs.iter().enumerate() {
            if matches(doc, &filter)? {
                position = Some(i);
                break;
            }
        }
        Ok(match position {
            Some(i) => {
                docs.remove(i);
                1
            }
            None => 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[tokio::test]
    async fn insert_assigns_ids_and_version_marker() {
        let store = InMemoryDocumentStore::new();
        let ids = store
            .insert("users", vec![doc! { "email": "a@x" }, doc! { "email": "b@x" }])
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);

        let oid = ids[0].as_object_id().unwrap();
        let stored = store.find_by_id("users", &oid).await.unwrap().unwrap();
        assert_eq!(stored.get_i32("__v").unwrap(), 0);
        assert_eq!(stored.get_str("email").unwrap(), "a@x");
    }

    #[tokio::test]
    async fn duplicate_ids_reject_the_whole_batch() {
        let store = InMemoryDocumentStore::new();
        let id = ObjectId::new();
        store.insert("users", vec![doc! { "_id": id }]).await.unwrap();

        let err = store
            .insert("users", vec![doc! { "email": "new" }, doc! { "_id": id }])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));
        assert_eq!(store.len("users").await, 1);
    }

    #[tokio::test]
    async fn find_pages_and_projects() {
        let store = InMemoryDocumentStore::new();
        let docs = (0..5).map(|n| doc! { "n": n }).collect();
        store.insert("nums", docs).await.unwrap();

        let page = store
            .find(
                "nums",
                doc! {},
                FindOptions::page(1, 2).with_projection(doc! { "n": 1, "_id": 0 }),
            )
            .await
            .unwrap();
        assert_eq!(page, vec![doc! { "n": 1 }, doc! { "n": 2 }]);
        assert_eq!(store.count("nums", doc! { "n": { "$gte": 3 } }).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn update_reports_matched_and_modified() {
        let store = InMemoryDocumentStore::new();
        let ids = store.insert("users", vec![doc! { "name": "a", "sessions": [] }]).await.unwrap();
        let id = ids[0].clone();

        let outcome = store
            .update_one("users", doc! { "_id": id.clone() }, doc! { "$set": { "name": "b" } })
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome { matched: 1, modified: 1 });

        let outcome = store
            .update_one("users", doc! { "_id": ObjectId::new() }, doc! { "$set": { "name": "c" } })
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::default());

        store
            .update_one(
                "users",
                doc! { "_id": id.clone() },
                doc! { "$addToSet": { "sessions": ObjectId::new() } },
            )
            .await
            .unwrap();
        let stored = store.find_by_id("users", &id.as_object_id().unwrap()).await.unwrap().unwrap();
        assert_eq!(stored.get_i32("__v").unwrap(), 1);
    }

    #[tokio::test]
    async fn version_marker_saturates_at_the_maximum() {
        let store = InMemoryDocumentStore::new();
        let ids = store
            .insert("users", vec![doc! { "sessions": [], "__v": i32::MAX }])
            .await
            .unwrap();
        let id = ids[0].as_object_id().unwrap();

        store
            .update_one("users", doc! { "_id": id }, doc! { "$addToSet": { "sessions": ObjectId::new() } })
            .await
            .unwrap();
        let stored = store.find_by_id("users", &id).await.unwrap().unwrap();
        assert_eq!(stored.get_i32("__v").unwrap(), i32::MAX);
    }

    #[tokio::test]
    async fn delete_removes_first_match_only() {
        let store = InMemoryDocumentStore::new();
        store
            .insert("tags", vec![doc! { "t": "x" }, doc! { "t": "x" }])
            .await
            .unwrap();
        assert_eq!(store.delete_one("tags", doc! { "t": "x" }).await.unwrap(), 1);
        assert_eq!(store.len("tags").await, 1);
        assert_eq!(store.delete_one("tags", doc! { "t": "y" }).await.unwrap(), 0);
    }
}
