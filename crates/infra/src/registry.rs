//! Explicit model registry.
//!
//! Built once by an initialization routine: every entity is registered, the
//! registry is frozen (which also checks that every reference target is
//! known), and only then are repositories handed out.

use std::collections::HashMap;
use std::sync::Arc;

use bson::{Document, doc};
use thiserror::Error;

use docrepo_core::entity::DELETED_AT;
use docrepo_core::{Entity, EntitySchema};

use crate::config::RepositoryConfig;
use crate::repository::EntityRepository;
use crate::store::DocumentStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{what} `{name}` is already registered")]
    Duplicate { what: &'static str, name: String },

    #[error("entity `{0}` is not registered")]
    Unregistered(String),

    #[error("`{entity}.{field}` references unregistered entity `{target}`")]
    UnknownTarget {
        entity: &'static str,
        field: &'static str,
        target: &'static str,
    },

    #[error("registry is frozen; `{0}` can no longer be registered")]
    Frozen(String),
}

/// One registered entity: its name and declared schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    pub entity: &'static str,
    pub schema: EntitySchema,
}

impl Model {
    pub fn collection(&self) -> &'static str {
        self.schema.collection
    }

    /// Restrict `filter` to documents callers may see.
    ///
    /// Soft-deleted documents are invisible to every read and mutation.
    pub fn visible(&self, filter: Document) -> Document {
        if !self.schema.is_soft_delete() {
            return filter;
        }
        let live = doc! { DELETED_AT: { "$exists": false } };
        if filter.is_empty() {
            live
        } else {
            doc! { "$and": [filter, live] }
        }
    }

    pub fn is_visible(&self, doc: &Document) -> bool {
        !self.schema.is_soft_delete() || !doc.contains_key(DELETED_AT)
    }
}

#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: HashMap<&'static str, Arc<Model>>,
    frozen: bool,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Entity>(&mut self) -> Result<(), RegistryError> {
        self.register_model(T::NAME, T::schema())
    }

    pub fn register_model(
        &mut self,
        entity: &'static str,
        schema: EntitySchema,
    ) -> Result<(), RegistryError> {
        if self.frozen {
            return Err(RegistryError::Frozen(entity.to_string()));
        }
        if self.models.contains_key(entity) {
            return Err(RegistryError::Duplicate {
                what: "entity",
                name: entity.to_string(),
            });
        }
        if self.models.values().any(|m| m.collection() == schema.collection) {
            return Err(RegistryError::Duplicate {
                what: "collection",
                name: schema.collection.to_string(),
            });
        }

        tracing::debug!(entity, collection = schema.collection, "registered model");
        self.models.insert(entity, Arc::new(Model { entity, schema }));
        Ok(())
    }

    /// End the registration phase.
    ///
    /// Fails if any reference field points at an entity that was never
    /// registered; the registry stays open in that case.
    pub fn freeze(&mut self) -> Result<(), RegistryError> {
        for model in self.models.values() {
            for reference in &model.schema.references {
                if !self.models.contains_key(reference.target) {
                    return Err(RegistryError::UnknownTarget {
                        entity: model.entity,
                        field: reference.name,
                        target: reference.target,
                    });
                }
            }
        }
        self.frozen = true;
        Ok(())
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn model(&self, entity: &str) -> Result<Arc<Model>, RegistryError> {
        self.models
            .get(entity)
            .cloned()
            .ok_or_else(|| RegistryError::Unregistered(entity.to_string()))
    }

    pub fn contains(&self, entity: &str) -> bool {
        self.models.contains_key(entity)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Frozen registry bound to a shared store; the factory for repositories.
pub struct Repositories<S> {
    registry: Arc<ModelRegistry>,
    store: Arc<S>,
    config: Arc<RepositoryConfig>,
}

impl<S> Clone for Repositories<S> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S: DocumentStore> Repositories<S> {
    /// Freeze `registry` (if still open) and bind it to `store`.
    pub fn new(
        mut registry: ModelRegistry,
        store: Arc<S>,
        config: RepositoryConfig,
    ) -> Result<Self, RegistryError> {
        if !registry.is_frozen() {
            registry.freeze()?;
        }
        Ok(Self {
            registry: Arc::new(registry),
            store,
            config: Arc::new(config),
        })
    }

    pub fn repository<T: Entity>(&self) -> Result<EntityRepository<T, S>, RegistryError> {
        let model = self.registry.model(T::NAME)?;
        let mut targets = Vec::with_capacity(model.schema.references.len());
        for reference in &model.schema.references {
            let target = self
                .registry
                .model(reference.target)
                .map_err(|_| RegistryError::UnknownTarget {
                    entity: model.entity,
                    field: reference.name,
                    target: reference.target,
                })?;
            targets.push((reference.clone(), target));
        }
        Ok(EntityRepository::new(
            Arc::clone(&self.store),
            model,
            targets,
            Arc::clone(&self.config),
        ))
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docrepo_core::{FieldKind, ReferenceField};

    fn users() -> EntitySchema {
        EntitySchema::new("users").required("email", FieldKind::String)
    }

    #[test]
    fn duplicate_names_and_collections_fail_loudly() {
        let mut registry = ModelRegistry::new();
        registry.register_model("user", users()).unwrap();

        assert_eq!(
            registry.register_model("user", users()),
            Err(RegistryError::Duplicate {
                what: "entity",
                name: "user".into()
            })
        );
        assert!(matches!(
            registry.register_model("member", users()),
            Err(RegistryError::Duplicate { what: "collection", .. })
        ));
    }

    #[test]
    fn freeze_checks_reference_targets() {
        let mut registry = ModelRegistry::new();
        registry
            .register_model(
                "session",
                EntitySchema::new("sessions").reference(ReferenceField::one("user", "user")),
            )
            .unwrap();

        assert!(matches!(
            registry.freeze(),
            Err(RegistryError::UnknownTarget { target: "user", .. })
        ));
        assert!(!registry.is_frozen());

        registry.register_model("user", users()).unwrap();
        registry.freeze().unwrap();
        assert!(matches!(
            registry.register_model("webhook", EntitySchema::new("webhooks")),
            Err(RegistryError::Frozen(_))
        ));
    }

    #[test]
    fn visibility_filter_only_applies_to_soft_delete() {
        let hard = Model {
            entity: "user",
            schema: users(),
        };
        assert_eq!(hard.visible(doc! { "a": 1 }), doc! { "a": 1 });

        let soft = Model {
            entity: "project",
            schema: EntitySchema::new("projects").soft_delete(),
        };
        assert_eq!(soft.visible(doc! {}), doc! { "deletedAt": { "$exists": false } });
        assert_eq!(
            soft.visible(doc! { "a": 1 }),
            doc! { "$and": [{ "a": 1 }, { "deletedAt": { "$exists": false } }] }
        );
        assert!(!soft.is_visible(&doc! { "deletedAt": bson::DateTime::now() }));
    }
}
