//! Relationship record - A directed, typed edge between two entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::value_objects::{EntityId, RelationshipId};

/// A directed edge `from_entity -> to_entity`
///
/// Relationships are not deduplicated. Two identical edges are two facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: RelationshipId,
    pub from_entity: EntityId,
    pub to_entity: EntityId,
    pub relationship_type: String,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Relationship {
    pub fn new(
        from_entity: EntityId,
        to_entity: EntityId,
        relationship_type: impl Into<String>,
    ) -> Self {
        Self {
            id: RelationshipId::new(),
            from_entity,
            to_entity,
            relationship_type: relationship_type.into(),
            metadata: None,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// The endpoint on the other side of `entity`, if `entity` is an endpoint
    pub fn other_end(&self, entity: EntityId) -> Option<EntityId> {
        if self.from_entity == entity {
            Some(self.to_entity)
        } else if self.to_entity == entity {
            Some(self.from_entity)
        } else {
            None
        }
    }
}

/// Which edges of an entity a relationship query returns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Edges leaving the entity
    Outgoing,
    /// Edges arriving at the entity
    Incoming,
    #[default]
    Both,
}
