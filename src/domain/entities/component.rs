//! Component record - One typed fact about an entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::value_objects::{ComponentId, EntityId};

/// Versions start here and grow by one per successful update
pub const INITIAL_VERSION: i64 = 1;

/// A typed payload attached to an entity
///
/// At most one active component of a given type exists per entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: ComponentId,
    pub entity_id: EntityId,
    pub component_type: String,
    pub data: Value,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Component {
    pub fn new(entity_id: EntityId, component_type: impl Into<String>, data: Value) -> Self {
        let now = Utc::now();
        Self {
            id: ComponentId::new(),
            entity_id,
            component_type: component_type.into(),
            data,
            version: INITIAL_VERSION,
            created_at: now,
            modified_at: now,
            deleted_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}
