//! Event replay projection
//!
//! Folds an entity's events, oldest first, into the name and component set
//! they describe. The engine never replays its own log; this exists for
//! collaborators that rebuild state from events and for auditing that the log
//! is complete.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::events::{event_types, WorldEvent};
use crate::domain::value_objects::ComponentId;

/// A component as reconstructed from events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedComponent {
    pub component_id: Option<ComponentId>,
    pub data: Value,
}

/// State of one entity rebuilt from its event history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentProjection {
    pub name: Option<String>,
    pub deleted: bool,
    /// Active components keyed by type
    pub components: BTreeMap<String, ProjectedComponent>,
}

impl ComponentProjection {
    /// Replay events in the order given
    pub fn replay<'a>(events: impl IntoIterator<Item = &'a WorldEvent>) -> Self {
        let mut projection = Self::default();
        for event in events {
            projection.apply(event);
        }
        projection
    }

    pub fn apply(&mut self, event: &WorldEvent) {
        let data = &event.data;
        let component_type = data
            .get("component_type")
            .and_then(Value::as_str)
            .map(str::to_string);

        match event.event_type.as_str() {
            event_types::ENTITY_CREATED => {
                self.name = data.get("name").and_then(Value::as_str).map(str::to_string);
            }
            event_types::ENTITY_UPDATED => {
                self.name = data.get("new_name").and_then(Value::as_str).map(str::to_string);
            }
            event_types::ENTITY_DELETED => self.deleted = true,
            event_types::ENTITY_RESTORED => self.deleted = false,
            event_types::COMPONENT_ADDED | event_types::COMPONENT_RESTORED => {
                if let Some(component_type) = component_type {
                    self.components.insert(
                        component_type,
                        ProjectedComponent {
                            component_id: event.component_id,
                            data: data.get("data").cloned().unwrap_or(Value::Null),
                        },
                    );
                }
            }
            event_types::COMPONENT_UPDATED => {
                if let Some(component_type) = component_type {
                    self.components.insert(
                        component_type,
                        ProjectedComponent {
                            component_id: event.component_id,
                            data: data.get("new_data").cloned().unwrap_or(Value::Null),
                        },
                    );
                }
            }
            event_types::COMPONENT_REMOVED => {
                if let Some(component_type) = component_type {
                    self.components.remove(&component_type);
                }
            }
            _ => {}
        }
    }

    /// Component payloads keyed by type
    pub fn component_data(&self) -> BTreeMap<String, Value> {
        self.components
            .iter()
            .map(|(kind, component)| (kind.clone(), component.data.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::EntityId;
    use serde_json::json;

    #[test]
    fn test_replay_follows_add_update_remove() {
        let entity = EntityId::new();
        let health = ComponentId::new();
        let events = vec![
            WorldEvent::new(event_types::ENTITY_CREATED, json!({"entity_id": entity, "name": "Goblin"}))
                .for_entity(entity),
            WorldEvent::new(
                event_types::COMPONENT_ADDED,
                json!({"component_type": "Health", "data": {"hp": 7}}),
            )
            .for_entity(entity)
            .for_component(health),
            WorldEvent::new(
                event_types::COMPONENT_ADDED,
                json!({"component_type": "Identity", "data": {"description": "Sneaky"}}),
            )
            .for_entity(entity),
            WorldEvent::new(
                event_types::COMPONENT_UPDATED,
                json!({"component_type": "Health", "old_data": {"hp": 7}, "new_data": {"hp": 3}}),
            )
            .for_entity(entity)
            .for_component(health),
            WorldEvent::new(
                event_types::COMPONENT_REMOVED,
                json!({"component_type": "Identity"}),
            )
            .for_entity(entity),
        ];

        let projection = ComponentProjection::replay(&events);
        assert_eq!(projection.name.as_deref(), Some("Goblin"));
        assert_eq!(
            projection.component_data(),
            BTreeMap::from([("Health".to_string(), json!({"hp": 3}))])
        );
    }

    #[test]
    fn test_replay_tracks_rename_and_deletion() {
        let events = vec![
            WorldEvent::new(event_types::ENTITY_CREATED, json!({"name": "Inn"})),
            WorldEvent::new(event_types::ENTITY_UPDATED, json!({"old_name": "Inn", "new_name": "Tavern"})),
            WorldEvent::new(event_types::ENTITY_DELETED, json!({})),
        ];
        let projection = ComponentProjection::replay(&events);
        assert_eq!(projection.name.as_deref(), Some("Tavern"));
        assert!(projection.deleted);
    }
}
