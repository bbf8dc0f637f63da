//! World Transaction - A batch of changes that commit or roll back together
//!
//! Each change is validated and written on the transaction's connection, and
//! its event is appended to the log in the same transaction. Subscribers only
//! hear about the events after [`WorldTransaction::commit`] succeeds. The
//! first failed call aborts the batch. Later calls and the commit fail with
//! `TransactionAborted`, which carries the first failure's code. Dropping the
//! transaction rolls everything back.

use chrono::Utc;
use serde_json::{json, Value};
use sqlx::{Sqlite, Transaction};
use tracing::{debug, warn};

use super::spatial_resolver::SpatialResolver;
use super::state_engine::StateEngine;
use crate::application::error::{EngineError, ErrorCode};
use crate::domain::entities::{Component, Direction, Entity, RegistryKind, Relationship};
use crate::domain::events::{event_types, EventFilter, WorldEvent};
use crate::domain::value_objects::{ComponentId, EntityId, RegionRef, RelationshipId};

pub struct WorldTransaction<'e> {
    engine: &'e StateEngine,
    tx: Transaction<'static, Sqlite>,
    pending: Vec<WorldEvent>,
    aborted: Option<ErrorCode>,
}

impl<'e> WorldTransaction<'e> {
    pub(crate) fn new(engine: &'e StateEngine, tx: Transaction<'static, Sqlite>) -> Self {
        Self {
            engine,
            tx,
            pending: Vec::new(),
            aborted: None,
        }
    }

    /// Events staged so far, in order
    pub fn pending_events(&self) -> &[WorldEvent] {
        &self.pending
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    /// Commit the batch, then publish its events in order
    pub async fn commit(self) -> Result<Vec<WorldEvent>, EngineError> {
        if let Some(cause) = self.aborted {
            self.tx.rollback().await?;
            return Err(EngineError::TransactionAborted { cause });
        }

        self.tx.commit().await?;
        debug!(events = self.pending.len(), "Transaction committed");
        self.engine.dispatch(&self.pending);
        Ok(self.pending)
    }

    /// Discard the batch; no events are published
    pub async fn rollback(self) -> Result<(), EngineError> {
        self.tx.rollback().await?;
        debug!(discarded = self.pending.len(), "Transaction rolled back");
        Ok(())
    }

    fn track<T>(&mut self, result: Result<T, EngineError>) -> Result<T, EngineError> {
        if let Err(err) = &result {
            warn!(code = %err.code(), "Aborting transaction: {}", err);
            if self.aborted.is_none() {
                self.aborted = Some(err.code());
            }
        }
        result
    }

    fn ensure_open(&self) -> Result<(), EngineError> {
        match self.aborted {
            Some(cause) => Err(EngineError::TransactionAborted { cause }),
            None => Ok(()),
        }
    }

    async fn record(&mut self, event: WorldEvent) -> Result<WorldEvent, EngineError> {
        self.engine.stage_event(&mut self.tx, &event).await?;
        self.pending.push(event.clone());
        Ok(event)
    }

    // ========================================================================
    // Entities
    // ========================================================================

    pub async fn create_entity(&mut self, name: &str, actor: Option<&str>) -> Result<Entity, EngineError> {
        self.ensure_open()?;
        let result = self.try_create_entity(name, actor).await;
        self.track(result)
    }

    async fn try_create_entity(&mut self, name: &str, actor: Option<&str>) -> Result<Entity, EngineError> {
        let entity = Entity::new(validate_name(name)?);
        self.engine.store().entities().insert(&mut self.tx, &entity).await?;

        self.record(
            WorldEvent::new(
                event_types::ENTITY_CREATED,
                json!({ "entity_id": entity.id, "name": entity.name }),
            )
            .for_entity(entity.id)
            .by_actor(actor),
        )
        .await?;
        Ok(entity)
    }

    pub async fn update_entity(
        &mut self,
        id: EntityId,
        name: &str,
        actor: Option<&str>,
    ) -> Result<Entity, EngineError> {
        self.ensure_open()?;
        let result = self.try_update_entity(id, name, actor).await;
        self.track(result)
    }

    async fn try_update_entity(
        &mut self,
        id: EntityId,
        name: &str,
        actor: Option<&str>,
    ) -> Result<Entity, EngineError> {
        let existing = self.engine.require_active_entity(&mut self.tx, id).await?;
        let name = validate_name(name)?;
        let now = Utc::now();
        self.engine.store().entities().rename(&mut self.tx, id, &name, now).await?;

        self.record(
            WorldEvent::new(
                event_types::ENTITY_UPDATED,
                json!({ "entity_id": id, "old_name": existing.name, "new_name": name }),
            )
            .for_entity(id)
            .by_actor(actor),
        )
        .await?;

        Ok(Entity {
            name,
            modified_at: now,
            ..existing
        })
    }

    pub async fn delete_entity(&mut self, id: EntityId, actor: Option<&str>) -> Result<Entity, EngineError> {
        self.ensure_open()?;
        let result = self.try_delete_entity(id, actor).await;
        self.track(result)
    }

    async fn try_delete_entity(&mut self, id: EntityId, actor: Option<&str>) -> Result<Entity, EngineError> {
        let existing = self.engine.require_active_entity(&mut self.tx, id).await?;
        let now = Utc::now();
        self.engine
            .store()
            .entities()
            .soft_delete(&mut self.tx, id, actor, now)
            .await?;

        self.record(
            WorldEvent::new(
                event_types::ENTITY_DELETED,
                json!({ "entity_id": id, "name": existing.name }),
            )
            .for_entity(id)
            .by_actor(actor),
        )
        .await?;

        Ok(Entity {
            deleted_at: Some(now),
            deleted_by: actor.map(str::to_string),
            ..existing
        })
    }

    pub async fn restore_entity(&mut self, id: EntityId, actor: Option<&str>) -> Result<Entity, EngineError> {
        self.ensure_open()?;
        let result = self.try_restore_entity(id, actor).await;
        self.track(result)
    }

    async fn try_restore_entity(&mut self, id: EntityId, actor: Option<&str>) -> Result<Entity, EngineError> {
        let existing = self
            .engine
            .store()
            .entities()
            .get(&mut self.tx, id)
            .await?
            .ok_or(EngineError::EntityNotFound(id))?;
        if existing.is_active() {
            return Err(EngineError::Validation(format!("Entity {} is not deleted", id)));
        }
        self.engine.spatial().validate_return(&mut self.tx, id).await?;
        self.engine.store().entities().restore(&mut self.tx, id).await?;

        self.record(
            WorldEvent::new(
                event_types::ENTITY_RESTORED,
                json!({ "entity_id": id, "name": existing.name }),
            )
            .for_entity(id)
            .by_actor(actor),
        )
        .await?;

        Ok(Entity {
            deleted_at: None,
            deleted_by: None,
            ..existing
        })
    }

    pub async fn get_entity(&mut self, id: EntityId) -> Result<Option<Entity>, EngineError> {
        self.engine.read_entity(&mut self.tx, id).await
    }

    // ========================================================================
    // Components
    // ========================================================================

    pub async fn add_component(
        &mut self,
        entity_id: EntityId,
        component_type: &str,
        data: Value,
        actor: Option<&str>,
    ) -> Result<Component, EngineError> {
        self.ensure_open()?;
        let result = self.try_add_component(entity_id, component_type, data, actor).await;
        self.track(result)
    }

    async fn try_add_component(
        &mut self,
        entity_id: EntityId,
        component_type: &str,
        mut data: Value,
        actor: Option<&str>,
    ) -> Result<Component, EngineError> {
        self.engine.require_active_entity(&mut self.tx, entity_id).await?;
        if SpatialResolver::is_position_type(component_type) {
            RegionRef::normalize_position_data(&mut data);
        }
        self.engine.validate_component_data(component_type, &data)?;

        let existing = self
            .engine
            .store()
            .components()
            .active_for(&mut self.tx, entity_id, component_type)
            .await?;
        if existing.is_some() {
            return Err(EngineError::DuplicateComponent {
                entity_id,
                component_type: component_type.to_string(),
            });
        }

        if SpatialResolver::is_position_type(component_type) {
            self.engine
                .spatial()
                .validate_position(&mut self.tx, entity_id, &data)
                .await?;
        }

        let component = Component::new(entity_id, component_type, data);
        self.engine.store().components().insert(&mut self.tx, &component).await?;

        self.record(
            WorldEvent::new(
                event_types::COMPONENT_ADDED,
                json!({
                    "entity_id": entity_id,
                    "component_id": component.id,
                    "component_type": component.component_type,
                    "data": component.data,
                }),
            )
            .for_entity(entity_id)
            .for_component(component.id)
            .by_actor(actor),
        )
        .await?;
        Ok(component)
    }

    pub async fn update_component(
        &mut self,
        entity_id: EntityId,
        component_type: &str,
        data: Value,
        expected_version: Option<i64>,
        actor: Option<&str>,
    ) -> Result<Component, EngineError> {
        self.ensure_open()?;
        let result = self
            .try_update_component(entity_id, component_type, data, expected_version, actor)
            .await;
        self.track(result)
    }

    async fn try_update_component(
        &mut self,
        entity_id: EntityId,
        component_type: &str,
        mut data: Value,
        expected_version: Option<i64>,
        actor: Option<&str>,
    ) -> Result<Component, EngineError> {
        self.engine.require_active_entity(&mut self.tx, entity_id).await?;
        if SpatialResolver::is_position_type(component_type) {
            RegionRef::normalize_position_data(&mut data);
        }
        self.engine.validate_component_data(component_type, &data)?;

        let current = self
            .engine
            .store()
            .components()
            .active_for(&mut self.tx, entity_id, component_type)
            .await?
            .ok_or_else(|| EngineError::ComponentNotFound {
                entity_id,
                component_type: component_type.to_string(),
            })?;

        let expected = expected_version.unwrap_or(current.version);
        if expected != current.version {
            return Err(EngineError::VersionConflict {
                component_id: current.id,
                expected,
                actual: current.version,
            });
        }

        if SpatialResolver::is_position_type(component_type) {
            self.engine
                .spatial()
                .validate_position(&mut self.tx, entity_id, &data)
                .await?;
        }

        let now = Utc::now();
        let changed = self
            .engine
            .store()
            .components()
            .compare_and_update(&mut self.tx, &current, expected, &data, now)
            .await?;
        if changed == 0 {
            let actual = self
                .engine
                .store()
                .components()
                .get(&mut self.tx, current.id)
                .await?
                .map_or(current.version, |component| component.version);
            return Err(EngineError::VersionConflict {
                component_id: current.id,
                expected,
                actual,
            });
        }

        let updated = Component {
            data,
            version: current.version + 1,
            modified_at: now,
            ..current.clone()
        };

        self.record(
            WorldEvent::new(
                event_types::COMPONENT_UPDATED,
                json!({
                    "entity_id": entity_id,
                    "component_id": updated.id,
                    "component_type": updated.component_type,
                    "old_data": current.data,
                    "new_data": updated.data,
                    "version": updated.version,
                }),
            )
            .for_entity(entity_id)
            .for_component(updated.id)
            .by_actor(actor),
        )
        .await?;
        Ok(updated)
    }

    pub async fn remove_component(
        &mut self,
        entity_id: EntityId,
        component_type: &str,
        actor: Option<&str>,
    ) -> Result<Component, EngineError> {
        self.ensure_open()?;
        let result = self.try_remove_component(entity_id, component_type, actor).await;
        self.track(result)
    }

    async fn try_remove_component(
        &mut self,
        entity_id: EntityId,
        component_type: &str,
        actor: Option<&str>,
    ) -> Result<Component, EngineError> {
        self.engine.require_active_entity(&mut self.tx, entity_id).await?;
        let current = self
            .engine
            .store()
            .components()
            .active_for(&mut self.tx, entity_id, component_type)
            .await?
            .ok_or_else(|| EngineError::ComponentNotFound {
                entity_id,
                component_type: component_type.to_string(),
            })?;

        let now = Utc::now();
        self.engine
            .store()
            .components()
            .soft_delete(&mut self.tx, current.id, now)
            .await?;

        self.record(
            WorldEvent::new(
                event_types::COMPONENT_REMOVED,
                json!({
                    "entity_id": entity_id,
                    "component_id": current.id,
                    "component_type": current.component_type,
                    "data": current.data,
                }),
            )
            .for_entity(entity_id)
            .for_component(current.id)
            .by_actor(actor),
        )
        .await?;

        Ok(Component {
            deleted_at: Some(now),
            ..current
        })
    }

    pub async fn restore_component(
        &mut self,
        component_id: ComponentId,
        actor: Option<&str>,
    ) -> Result<Component, EngineError> {
        self.ensure_open()?;
        let result = self.try_restore_component(component_id, actor).await;
        self.track(result)
    }

    async fn try_restore_component(
        &mut self,
        component_id: ComponentId,
        actor: Option<&str>,
    ) -> Result<Component, EngineError> {
        let component = self
            .engine
            .store()
            .components()
            .get(&mut self.tx, component_id)
            .await?
            .ok_or(EngineError::ComponentRecordNotFound(component_id))?;
        if component.is_active() {
            return Err(EngineError::Validation(format!(
                "Component {} is not deleted",
                component_id
            )));
        }

        let entity_id = component.entity_id;
        self.engine.require_active_entity(&mut self.tx, entity_id).await?;
        self.engine
            .require_type(RegistryKind::Component, &component.component_type)?;

        let occupied = self
            .engine
            .store()
            .components()
            .active_for(&mut self.tx, entity_id, &component.component_type)
            .await?;
        if occupied.is_some() {
            return Err(EngineError::DuplicateComponent {
                entity_id,
                component_type: component.component_type,
            });
        }

        if SpatialResolver::is_position_type(&component.component_type) {
            self.engine
                .spatial()
                .validate_position(&mut self.tx, entity_id, &component.data)
                .await?;
        }

        self.engine.store().components().restore(&mut self.tx, &component).await?;

        self.record(
            WorldEvent::new(
                event_types::COMPONENT_RESTORED,
                json!({
                    "entity_id": entity_id,
                    "component_id": component.id,
                    "component_type": component.component_type,
                    "data": component.data,
                }),
            )
            .for_entity(entity_id)
            .for_component(component.id)
            .by_actor(actor),
        )
        .await?;

        Ok(Component {
            deleted_at: None,
            ..component
        })
    }

    pub async fn get_component(
        &mut self,
        entity_id: EntityId,
        component_type: &str,
    ) -> Result<Option<Component>, EngineError> {
        self.engine
            .read_component(&mut self.tx, entity_id, component_type)
            .await
    }

    pub async fn get_entity_components(&mut self, entity_id: EntityId) -> Result<Vec<Component>, EngineError> {
        self.engine.read_entity_components(&mut self.tx, entity_id).await
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    pub async fn create_relationship(
        &mut self,
        from_entity: EntityId,
        to_entity: EntityId,
        relationship_type: &str,
        metadata: Option<Value>,
        actor: Option<&str>,
    ) -> Result<Relationship, EngineError> {
        self.ensure_open()?;
        let result = self
            .try_create_relationship(from_entity, to_entity, relationship_type, metadata, actor)
            .await;
        self.track(result)
    }

    async fn try_create_relationship(
        &mut self,
        from_entity: EntityId,
        to_entity: EntityId,
        relationship_type: &str,
        metadata: Option<Value>,
        actor: Option<&str>,
    ) -> Result<Relationship, EngineError> {
        let engine = self.engine;
        engine.require_active_entity(&mut self.tx, from_entity).await?;
        engine.require_active_entity(&mut self.tx, to_entity).await?;
        let registration = engine.require_type(RegistryKind::Relationship, relationship_type)?;

        for (endpoint, required) in [
            (from_entity, &registration.from_requires),
            (to_entity, &registration.to_requires),
        ] {
            for component_type in required {
                let carried = engine
                    .store()
                    .components()
                    .active_for(&mut self.tx, endpoint, component_type)
                    .await?;
                if carried.is_none() {
                    return Err(EngineError::Validation(format!(
                        "'{}' requires entity {} to have a {} component",
                        relationship_type, endpoint, component_type
                    )));
                }
            }
        }

        let mut relationship = Relationship::new(from_entity, to_entity, relationship_type);
        relationship.metadata = metadata;
        self.engine
            .store()
            .relationships()
            .insert(&mut self.tx, &relationship)
            .await?;

        self.record(
            WorldEvent::new(event_types::RELATIONSHIP_CREATED, relationship_payload(&relationship))
                .for_entity(from_entity)
                .by_actor(actor),
        )
        .await?;
        Ok(relationship)
    }

    pub async fn delete_relationship(
        &mut self,
        id: RelationshipId,
        actor: Option<&str>,
    ) -> Result<Relationship, EngineError> {
        self.ensure_open()?;
        let result = self.try_delete_relationship(id, actor).await;
        self.track(result)
    }

    async fn try_delete_relationship(
        &mut self,
        id: RelationshipId,
        actor: Option<&str>,
    ) -> Result<Relationship, EngineError> {
        let relationship = self
            .engine
            .store()
            .relationships()
            .get(&mut self.tx, id)
            .await?
            .filter(Relationship::is_active)
            .ok_or(EngineError::RelationshipNotFound(id))?;

        let now = Utc::now();
        self.engine
            .store()
            .relationships()
            .soft_delete(&mut self.tx, id, now)
            .await?;

        self.record(
            WorldEvent::new(event_types::RELATIONSHIP_DELETED, relationship_payload(&relationship))
                .for_entity(relationship.from_entity)
                .by_actor(actor),
        )
        .await?;

        Ok(Relationship {
            deleted_at: Some(now),
            ..relationship
        })
    }

    pub async fn restore_relationship(
        &mut self,
        id: RelationshipId,
        actor: Option<&str>,
    ) -> Result<Relationship, EngineError> {
        self.ensure_open()?;
        let result = self.try_restore_relationship(id, actor).await;
        self.track(result)
    }

    async fn try_restore_relationship(
        &mut self,
        id: RelationshipId,
        actor: Option<&str>,
    ) -> Result<Relationship, EngineError> {
        let relationship = self
            .engine
            .store()
            .relationships()
            .get(&mut self.tx, id)
            .await?
            .ok_or(EngineError::RelationshipNotFound(id))?;
        if relationship.is_active() {
            return Err(EngineError::Validation(format!(
                "Relationship {} is not deleted",
                id
            )));
        }
        self.engine
            .require_active_entity(&mut self.tx, relationship.from_entity)
            .await?;
        self.engine
            .require_active_entity(&mut self.tx, relationship.to_entity)
            .await?;

        self.engine.store().relationships().restore(&mut self.tx, id).await?;

        self.record(
            WorldEvent::new(event_types::RELATIONSHIP_RESTORED, relationship_payload(&relationship))
                .for_entity(relationship.from_entity)
                .by_actor(actor),
        )
        .await?;

        Ok(Relationship {
            deleted_at: None,
            ..relationship
        })
    }

    pub async fn get_relationships(
        &mut self,
        entity_id: EntityId,
        relationship_type: Option<&str>,
        direction: Direction,
    ) -> Result<Vec<Relationship>, EngineError> {
        self.engine
            .read_relationships(&mut self.tx, entity_id, relationship_type, direction)
            .await
    }

    // ========================================================================
    // Events and queries
    // ========================================================================

    pub async fn emit_event(
        &mut self,
        event_type: &str,
        data: Value,
        entity_id: Option<EntityId>,
        actor: Option<&str>,
    ) -> Result<WorldEvent, EngineError> {
        self.ensure_open()?;
        let result = self.try_emit_event(event_type, data, entity_id, actor).await;
        self.track(result)
    }

    async fn try_emit_event(
        &mut self,
        event_type: &str,
        data: Value,
        entity_id: Option<EntityId>,
        actor: Option<&str>,
    ) -> Result<WorldEvent, EngineError> {
        self.engine.require_type(RegistryKind::Event, event_type)?;
        if event_types::is_core(event_type) {
            return Err(EngineError::Validation(format!(
                "'{}' is emitted by the engine itself",
                event_type
            )));
        }

        let mut event = WorldEvent::new(event_type, data).by_actor(actor);
        if let Some(entity_id) = entity_id {
            self.engine.require_active_entity(&mut self.tx, entity_id).await?;
            event = event.for_entity(entity_id);
        }
        self.record(event).await
    }

    pub async fn get_events(&mut self, filter: &EventFilter) -> Result<Vec<WorldEvent>, EngineError> {
        self.engine.read_events(&mut self.tx, filter).await
    }

    pub async fn query_entities(&mut self, component_types: &[&str]) -> Result<Vec<Entity>, EngineError> {
        self.engine
            .read_entities_with(&mut self.tx, component_types)
            .await
    }
}

fn validate_name(name: &str) -> Result<String, EngineError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(EngineError::Validation("Entity name cannot be empty".to_string()));
    }
    if name.len() > 255 {
        return Err(EngineError::Validation(
            "Entity name cannot exceed 255 characters".to_string(),
        ));
    }
    Ok(name.to_string())
}

fn relationship_payload(relationship: &Relationship) -> Value {
    json!({
        "relationship_id": relationship.id,
        "from_entity": relationship.from_entity,
        "to_entity": relationship.to_entity,
        "relationship_type": relationship.relationship_type,
        "metadata": relationship.metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::event_bus::ALL_EVENTS;
    use crate::infrastructure::config::EngineConfig;
    use crate::modules::CoreComponentsModule;
    use std::sync::{Arc, Mutex};

    async fn engine_with_log() -> (StateEngine, Arc<Mutex<Vec<String>>>) {
        let engine = StateEngine::open(
            EngineConfig::in_memory("Batch World"),
            vec![Arc::new(CoreComponentsModule)],
        )
        .await
        .unwrap();
        let heard = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&heard);
        engine.event_bus().subscribe(ALL_EVENTS, move |event: &WorldEvent| -> anyhow::Result<()> {
            log.lock().unwrap().push(event.event_type.clone());
            Ok(())
        });
        (engine, heard)
    }

    #[tokio::test]
    async fn test_events_are_published_only_after_commit() {
        let (engine, heard) = engine_with_log().await;

        let mut tx = engine.transaction().await.unwrap();
        let tavern = tx.create_entity("Tavern", Some("gm")).await.unwrap();
        tx.add_component(tavern.id, "Position", json!({"x": 100, "y": 200}), None)
            .await
            .unwrap();
        let table = tx.create_entity("Table", Some("gm")).await.unwrap();
        // the parent only exists inside this transaction
        tx.add_component(
            table.id,
            "Position",
            json!({"x": 5, "y": 3, "region": tavern.id.to_string()}),
            None,
        )
        .await
        .unwrap();
        assert!(tx.get_component(table.id, "Position").await.unwrap().is_some());
        assert_eq!(tx.pending_events().len(), 4);
        assert!(heard.lock().unwrap().is_empty());

        let published = tx.commit().await.unwrap();
        assert_eq!(published.len(), 4);
        assert_eq!(
            *heard.lock().unwrap(),
            vec![
                event_types::ENTITY_CREATED,
                event_types::COMPONENT_ADDED,
                event_types::ENTITY_CREATED,
                event_types::COMPONENT_ADDED,
            ]
        );

        let position = engine.resolve_world_position(table.id).await.unwrap().unwrap();
        assert_eq!((position.x, position.y), (105.0, 203.0));
    }

    #[tokio::test]
    async fn test_failed_call_aborts_the_whole_batch() {
        let (engine, heard) = engine_with_log().await;
        let events_before = engine
            .get_events(&EventFilter::default().limit(1000))
            .await
            .unwrap()
            .len();

        let mut tx = engine.transaction().await.unwrap();
        let goblin = tx.create_entity("Goblin", None).await.unwrap();
        let err = tx
            .add_component(goblin.id, "NPC", json!({"disposition": "sleepy"}), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationFailed);
        assert!(tx.is_aborted());

        let err = tx.create_entity("Hobgoblin", None).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::TransactionAborted { cause: ErrorCode::ValidationFailed }
        ));
        let err = tx.commit().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationFailed);

        assert!(heard.lock().unwrap().is_empty());
        assert_eq!(engine.get_entity(goblin.id).await.unwrap(), None);
        assert_eq!(
            engine
                .get_events(&EventFilter::default().limit(1000))
                .await
                .unwrap()
                .len(),
            events_before
        );
    }

    #[tokio::test]
    async fn test_rollback_discards_changes() {
        let (engine, heard) = engine_with_log().await;
        let keep = engine.create_entity("Keep", None).await.unwrap();
        heard.lock().unwrap().clear();

        let mut tx = engine.transaction().await.unwrap();
        tx.update_entity(keep.id, "Ruined Keep", None).await.unwrap();
        tx.delete_entity(keep.id, None).await.unwrap();
        assert_eq!(tx.get_entity(keep.id).await.unwrap(), None);
        tx.rollback().await.unwrap();

        assert!(heard.lock().unwrap().is_empty());
        assert_eq!(engine.get_entity(keep.id).await.unwrap(), Some(keep));
    }

    #[test]
    fn test_name_rules() {
        assert!(validate_name("  ").is_err());
        assert!(validate_name(&"a".repeat(256)).is_err());
        assert_eq!(validate_name(" Mill ").unwrap(), "Mill");
    }
}
