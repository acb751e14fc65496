use serde::{Deserialize, Serialize};

use docrepo_core::{Entity, EntitySchema, FieldKind, Reference, ReferenceField};

use super::Project;

/// Alerting limit on one project metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Threshold {
    pub id: String,
    pub project: Reference<Project>,
    pub metric: String,
    pub value: f64,
    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
}

impl Threshold {
    pub fn is_exceeded_by(&self, observed: f64) -> bool {
        observed > self.value
    }
}

impl Entity for Threshold {
    const NAME: &'static str = "threshold";

    fn schema() -> EntitySchema {
        EntitySchema::new("thresholds")
            .required("metric", FieldKind::String)
            .required("value", FieldKind::Double)
            .reference(ReferenceField::one("project", "project").required())
    }
}
