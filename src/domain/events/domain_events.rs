//! World events - The append-only history of everything that happened
//!
//! Every successful mutation produces exactly one event named as a past-tense
//! fact. Events are never updated or removed; they are the sole history of a
//! world and folding them in order reconstructs its current state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::value_objects::{ComponentId, EntityId, EventId};

/// Event types emitted by the engine itself
pub mod event_types {
    pub const WORLD_CREATED: &str = "world.created";
    pub const ENTITY_CREATED: &str = "entity.created";
    pub const ENTITY_UPDATED: &str = "entity.updated";
    pub const ENTITY_DELETED: &str = "entity.deleted";
    pub const ENTITY_RESTORED: &str = "entity.restored";
    pub const COMPONENT_ADDED: &str = "component.added";
    pub const COMPONENT_UPDATED: &str = "component.updated";
    pub const COMPONENT_REMOVED: &str = "component.removed";
    pub const COMPONENT_RESTORED: &str = "component.restored";
    pub const RELATIONSHIP_CREATED: &str = "relationship.created";
    pub const RELATIONSHIP_DELETED: &str = "relationship.deleted";
    pub const RELATIONSHIP_RESTORED: &str = "relationship.restored";

    /// Every engine event type with a short description
    pub const CORE: [(&str, &str); 12] = [
        (WORLD_CREATED, "A new world was initialized"),
        (ENTITY_CREATED, "An entity was created"),
        (ENTITY_UPDATED, "An entity was renamed"),
        (ENTITY_DELETED, "An entity was soft-deleted"),
        (ENTITY_RESTORED, "A soft-deleted entity was restored"),
        (COMPONENT_ADDED, "A component was attached to an entity"),
        (COMPONENT_UPDATED, "A component's data changed"),
        (COMPONENT_REMOVED, "A component was soft-deleted"),
        (COMPONENT_RESTORED, "A soft-deleted component was restored"),
        (RELATIONSHIP_CREATED, "A relationship was created"),
        (RELATIONSHIP_DELETED, "A relationship was soft-deleted"),
        (RELATIONSHIP_RESTORED, "A soft-deleted relationship was restored"),
    ];

    pub fn is_core(event_type: &str) -> bool {
        CORE.iter().any(|(name, _)| *name == event_type)
    }
}

/// Actor recorded when the engine acts on its own behalf
pub const SYSTEM_ACTOR: &str = "system";

/// One immutable entry in the event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldEvent {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_id: Option<EntityId>,
    pub component_id: Option<ComponentId>,
    pub actor_id: Option<String>,
    pub data: Value,
}

impl WorldEvent {
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            id: EventId::new(),
            timestamp: Utc::now(),
            event_type: event_type.into(),
            entity_id: None,
            component_id: None,
            actor_id: None,
            data,
        }
    }

    pub fn for_entity(mut self, entity_id: EntityId) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    pub fn for_component(mut self, component_id: ComponentId) -> Self {
        self.component_id = Some(component_id);
        self
    }

    pub fn by_actor(mut self, actor_id: Option<&str>) -> Self {
        self.actor_id = actor_id.map(str::to_string);
        self
    }
}

/// Order of an event query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

/// Predicate for event log queries
///
/// Unset fields match everything. A missing limit falls back to the engine's
/// configured default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventFilter {
    pub entity_id: Option<EntityId>,
    pub event_type: Option<String>,
    pub component_id: Option<ComponentId>,
    pub limit: Option<u32>,
    pub order: EventOrder,
}

impl EventFilter {
    pub fn for_entity(entity_id: EntityId) -> Self {
        Self {
            entity_id: Some(entity_id),
            ..Default::default()
        }
    }

    pub fn of_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn for_component(mut self, component_id: ComponentId) -> Self {
        self.component_id = Some(component_id);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn oldest_first(mut self) -> Self {
        self.order = EventOrder::OldestFirst;
        self
    }
}
