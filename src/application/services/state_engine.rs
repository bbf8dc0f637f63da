//! State Engine - The single mutation surface of a world
//!
//! Every change goes through here: referenced entities are checked, types are
//! looked up in the registry, payloads are validated (including the spatial
//! rules for positions), the change is written inside a store transaction and,
//! once that transaction commits, exactly one event per change is published.
//!
//! Single calls run in their own transaction. [`StateEngine::transaction`]
//! groups calls so they commit or roll back together; events are only
//! published after the whole group commits.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde_json::{json, Value};
use sqlx::SqliteConnection;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::event_bus::EventBus;
use super::module_loader::{LoadReport, ModuleLoader, WorldModule};
use super::spatial_resolver::{RegionOccupancy, SpatialResolver};
use super::type_registry::TypeRegistry;
use super::world_transaction::WorldTransaction;
use crate::application::error::EngineError;
use crate::domain::entities::{
    Component, Direction, Entity, RegistryKind, Relationship, TypeRegistration,
};
use crate::domain::events::{event_types, EventFilter, WorldEvent, SYSTEM_ACTOR};
use crate::domain::services::schema;
use crate::domain::value_objects::{
    ComponentId, EntityId, RegionRef, RelationshipId, WorldPosition,
};
use crate::infrastructure::config::EngineConfig;
use crate::infrastructure::persistence::{SqliteRecordStore, StoredType};
use crate::modules::CoreModule;

/// One engine per world, shared between callers behind a mutex
pub type SharedWorld = Arc<Mutex<StateEngine>>;

pub struct StateEngine {
    config: EngineConfig,
    store: SqliteRecordStore,
    registry: TypeRegistry,
    event_bus: Arc<EventBus>,
    spatial: SpatialResolver,
    modules: Vec<Arc<dyn WorldModule>>,
}

impl StateEngine {
    /// Open a world, load the core module followed by `modules`, and record
    /// `world.created` if the world is new
    #[instrument(skip(config, modules), fields(world = %config.world_name))]
    pub async fn open(
        config: EngineConfig,
        modules: Vec<Arc<dyn WorldModule>>,
    ) -> Result<Self, EngineError> {
        let store =
            SqliteRecordStore::connect(&config.database_url, config.max_connections).await?;
        let event_bus = Arc::new(EventBus::new(store.clone()));
        let spatial = SpatialResolver::new(store.clone(), config.max_hierarchy_depth);

        let mut engine = Self {
            config,
            store,
            registry: TypeRegistry::new(),
            event_bus,
            spatial,
            modules: Vec::new(),
        };

        let mut all: Vec<Arc<dyn WorldModule>> = vec![Arc::new(CoreModule)];
        all.extend(modules);
        engine.load_modules(all).await?;
        engine.check_stored_types().await?;
        engine.initialize_world().await?;

        info!(
            components = engine.registry.count(RegistryKind::Component),
            relationships = engine.registry.count(RegistryKind::Relationship),
            events = engine.registry.count(RegistryKind::Event),
            "World opened"
        );
        Ok(engine)
    }

    /// Register modules not yet loaded, persist their types and let them subscribe
    ///
    /// Modules already loaded are skipped, so calling this again with the
    /// same set is a no-op and with a larger set only adds the new ones.
    #[instrument(skip(self, modules), fields(count = modules.len()))]
    pub async fn load_modules(
        &mut self,
        modules: Vec<Arc<dyn WorldModule>>,
    ) -> Result<LoadReport, EngineError> {
        let mut staged = self.registry.clone();
        let report = ModuleLoader::load(&mut staged, &modules)?;

        let mut tx = self.store.begin().await?;
        for module in &report.registered {
            for registration in staged.registered_by(module) {
                self.store.types().insert_if_absent(&mut tx, registration).await?;
            }
        }
        tx.commit().await?;
        self.registry = staged;

        for module in modules {
            if report.registered.iter().any(|name| name == module.name()) {
                module.subscribe(&self.event_bus);
                self.modules.push(module);
            }
        }

        Ok(report)
    }

    /// Type registrations persisted by this and earlier sessions
    pub async fn stored_types(&self, kind: RegistryKind) -> Result<Vec<StoredType>, EngineError> {
        let mut conn = self.store.pool().acquire().await?;
        Ok(self.store.types().list(&mut conn, kind).await?)
    }

    /// Warn about stored types whose module is absent or now owned elsewhere
    async fn check_stored_types(&self) -> Result<(), EngineError> {
        for kind in RegistryKind::ALL {
            for stored in self.stored_types(kind).await? {
                match self.registry.get(kind, &stored.type_name) {
                    None => warn!(
                        %kind,
                        type_name = %stored.type_name,
                        module = %stored.module,
                        "Stored type is not registered by any loaded module"
                    ),
                    Some(registration) if registration.owning_module != stored.module => warn!(
                        %kind,
                        type_name = %stored.type_name,
                        stored_module = %stored.module,
                        loaded_module = %registration.owning_module,
                        "Stored type changed owner"
                    ),
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }

    async fn initialize_world(&self) -> Result<(), EngineError> {
        let mut conn = self.store.pool().acquire().await?;
        if self.store.events().count(&mut conn).await? > 0 {
            debug!("Existing world, skipping initialization");
            return Ok(());
        }
        drop(conn);

        let event = WorldEvent::new(
            event_types::WORLD_CREATED,
            json!({ "world_name": self.config.world_name }),
        )
        .by_actor(Some(SYSTEM_ACTOR));
        self.event_bus.publish(event).await?;
        info!(world = %self.config.world_name, "World created");
        Ok(())
    }

    /// Start a batch of changes that commit or roll back together
    pub async fn transaction(&self) -> Result<WorldTransaction<'_>, EngineError> {
        Ok(WorldTransaction::new(self, self.store.begin().await?))
    }

    pub fn into_shared(self) -> SharedWorld {
        Arc::new(Mutex::new(self))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn store(&self) -> &SqliteRecordStore {
        &self.store
    }

    pub(crate) fn spatial(&self) -> &SpatialResolver {
        &self.spatial
    }

    pub fn loaded_modules(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(|module| module.name())
    }

    pub async fn close(&self) {
        self.store.close().await;
    }

    // ========================================================================
    // Entities
    // ========================================================================

    #[instrument(skip(self))]
    pub async fn create_entity(&self, name: &str, actor: Option<&str>) -> Result<Entity, EngineError> {
        let mut tx = self.transaction().await?;
        let entity = tx.create_entity(name, actor).await?;
        tx.commit().await?;
        info!(entity_id = %entity.id, "Created entity: {}", entity.name);
        Ok(entity)
    }

    #[instrument(skip(self), fields(entity_id = %id))]
    pub async fn update_entity(
        &self,
        id: EntityId,
        name: &str,
        actor: Option<&str>,
    ) -> Result<Entity, EngineError> {
        let mut tx = self.transaction().await?;
        let entity = tx.update_entity(id, name, actor).await?;
        tx.commit().await?;
        info!("Renamed entity to: {}", entity.name);
        Ok(entity)
    }

    #[instrument(skip(self), fields(entity_id = %id))]
    pub async fn delete_entity(&self, id: EntityId, actor: Option<&str>) -> Result<Entity, EngineError> {
        let mut tx = self.transaction().await?;
        let entity = tx.delete_entity(id, actor).await?;
        tx.commit().await?;
        info!("Deleted entity: {}", entity.name);
        Ok(entity)
    }

    #[instrument(skip(self), fields(entity_id = %id))]
    pub async fn restore_entity(&self, id: EntityId, actor: Option<&str>) -> Result<Entity, EngineError> {
        let mut tx = self.transaction().await?;
        let entity = tx.restore_entity(id, actor).await?;
        tx.commit().await?;
        info!("Restored entity: {}", entity.name);
        Ok(entity)
    }

    pub async fn get_entity(&self, id: EntityId) -> Result<Option<Entity>, EngineError> {
        let mut conn = self.store.pool().acquire().await?;
        self.read_entity(&mut conn, id).await
    }

    pub async fn list_entities(&self) -> Result<Vec<Entity>, EngineError> {
        let mut conn = self.store.pool().acquire().await?;
        Ok(self.store.entities().list_active(&mut conn).await?)
    }

    /// Soft-deleted entities that `restore_entity` can bring back
    pub async fn list_deleted_entities(&self) -> Result<Vec<Entity>, EngineError> {
        let mut conn = self.store.pool().acquire().await?;
        Ok(self.store.entities().list_deleted(&mut conn).await?)
    }

    pub async fn count_entities(&self) -> Result<i64, EngineError> {
        let mut conn = self.store.pool().acquire().await?;
        Ok(self.store.entities().count_active(&mut conn).await?)
    }

    // ========================================================================
    // Components
    // ========================================================================

    #[instrument(skip(self, data), fields(entity_id = %entity_id))]
    pub async fn add_component(
        &self,
        entity_id: EntityId,
        component_type: &str,
        data: Value,
        actor: Option<&str>,
    ) -> Result<Component, EngineError> {
        let mut tx = self.transaction().await?;
        let component = tx.add_component(entity_id, component_type, data, actor).await?;
        tx.commit().await?;
        info!(component_id = %component.id, "Added {} component", component.component_type);
        Ok(component)
    }

    /// Replace a component's data; with `expected_version`, only from that version
    #[instrument(skip(self, data), fields(entity_id = %entity_id))]
    pub async fn update_component(
        &self,
        entity_id: EntityId,
        component_type: &str,
        data: Value,
        expected_version: Option<i64>,
        actor: Option<&str>,
    ) -> Result<Component, EngineError> {
        let mut tx = self.transaction().await?;
        let component = tx
            .update_component(entity_id, component_type, data, expected_version, actor)
            .await?;
        tx.commit().await?;
        info!(
            component_id = %component.id,
            version = component.version,
            "Updated {} component",
            component.component_type
        );
        Ok(component)
    }

    #[instrument(skip(self), fields(entity_id = %entity_id))]
    pub async fn remove_component(
        &self,
        entity_id: EntityId,
        component_type: &str,
        actor: Option<&str>,
    ) -> Result<Component, EngineError> {
        let mut tx = self.transaction().await?;
        let component = tx.remove_component(entity_id, component_type, actor).await?;
        tx.commit().await?;
        info!(component_id = %component.id, "Removed {} component", component.component_type);
        Ok(component)
    }

    #[instrument(skip(self), fields(component_id = %component_id))]
    pub async fn restore_component(
        &self,
        component_id: ComponentId,
        actor: Option<&str>,
    ) -> Result<Component, EngineError> {
        let mut tx = self.transaction().await?;
        let component = tx.restore_component(component_id, actor).await?;
        tx.commit().await?;
        info!("Restored {} component", component.component_type);
        Ok(component)
    }

    pub async fn get_component(
        &self,
        entity_id: EntityId,
        component_type: &str,
    ) -> Result<Option<Component>, EngineError> {
        let mut conn = self.store.pool().acquire().await?;
        self.read_component(&mut conn, entity_id, component_type).await
    }

    pub async fn get_entity_components(&self, entity_id: EntityId) -> Result<Vec<Component>, EngineError> {
        let mut conn = self.store.pool().acquire().await?;
        self.read_entity_components(&mut conn, entity_id).await
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    #[instrument(skip(self, metadata), fields(from = %from_entity, to = %to_entity))]
    pub async fn create_relationship(
        &self,
        from_entity: EntityId,
        to_entity: EntityId,
        relationship_type: &str,
        metadata: Option<Value>,
        actor: Option<&str>,
    ) -> Result<Relationship, EngineError> {
        let mut tx = self.transaction().await?;
        let relationship = tx
            .create_relationship(from_entity, to_entity, relationship_type, metadata, actor)
            .await?;
        tx.commit().await?;
        info!(relationship_id = %relationship.id, "Created {} relationship", relationship_type);
        Ok(relationship)
    }

    #[instrument(skip(self), fields(relationship_id = %id))]
    pub async fn delete_relationship(
        &self,
        id: RelationshipId,
        actor: Option<&str>,
    ) -> Result<Relationship, EngineError> {
        let mut tx = self.transaction().await?;
        let relationship = tx.delete_relationship(id, actor).await?;
        tx.commit().await?;
        info!("Deleted {} relationship", relationship.relationship_type);
        Ok(relationship)
    }

    #[instrument(skip(self), fields(relationship_id = %id))]
    pub async fn restore_relationship(
        &self,
        id: RelationshipId,
        actor: Option<&str>,
    ) -> Result<Relationship, EngineError> {
        let mut tx = self.transaction().await?;
        let relationship = tx.restore_relationship(id, actor).await?;
        tx.commit().await?;
        info!("Restored {} relationship", relationship.relationship_type);
        Ok(relationship)
    }

    pub async fn get_relationships(
        &self,
        entity_id: EntityId,
        relationship_type: Option<&str>,
        direction: Direction,
    ) -> Result<Vec<Relationship>, EngineError> {
        let mut conn = self.store.pool().acquire().await?;
        self.read_relationships(&mut conn, entity_id, relationship_type, direction)
            .await
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Publish a module-defined event through the log and the bus
    #[instrument(skip(self, data))]
    pub async fn emit_event(
        &self,
        event_type: &str,
        data: Value,
        entity_id: Option<EntityId>,
        actor: Option<&str>,
    ) -> Result<WorldEvent, EngineError> {
        let mut tx = self.transaction().await?;
        let event = tx.emit_event(event_type, data, entity_id, actor).await?;
        tx.commit().await?;
        Ok(event)
    }

    pub async fn get_events(&self, filter: &EventFilter) -> Result<Vec<WorldEvent>, EngineError> {
        let mut conn = self.store.pool().acquire().await?;
        self.read_events(&mut conn, filter).await
    }

    /// Every event about an entity, oldest first
    pub async fn entity_history(&self, entity_id: EntityId) -> Result<Vec<WorldEvent>, EngineError> {
        self.get_events(&EventFilter::for_entity(entity_id).oldest_first().limit(u32::MAX))
            .await
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Active entities carrying every one of `component_types`
    pub async fn query_entities(&self, component_types: &[&str]) -> Result<Vec<Entity>, EngineError> {
        let mut conn = self.store.pool().acquire().await?;
        self.read_entities_with(&mut conn, component_types).await
    }

    /// Active entities whose component payloads mention `query`
    pub async fn search_text(&self, query: &str) -> Result<Vec<Entity>, EngineError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.store.pool().acquire().await?;
        let ids = self.store.components().search(&mut conn, query).await?;
        Ok(self.store.entities().active_among(&mut conn, &ids).await?)
    }

    // ========================================================================
    // Spatial
    // ========================================================================

    /// Absolute position of an entity, or `None` when its region chain is broken
    pub async fn resolve_world_position(
        &self,
        entity_id: EntityId,
    ) -> Result<Option<WorldPosition>, EngineError> {
        let mut conn = self.store.pool().acquire().await?;
        self.spatial.resolve_world_position(&mut conn, entity_id).await
    }

    /// Fail `RegionFull` when `region` cannot take another occupant
    pub async fn check_capacity(&self, region: EntityId) -> Result<RegionOccupancy, EngineError> {
        let mut conn = self.store.pool().acquire().await?;
        self.spatial.check_capacity(&mut conn, region).await
    }

    pub async fn entities_in_region(&self, region: &RegionRef) -> Result<Vec<Entity>, EngineError> {
        let mut conn = self.store.pool().acquire().await?;
        let ids = self.spatial.entities_in_region(&mut conn, region).await?;
        Ok(self.store.entities().active_among(&mut conn, &ids).await?)
    }

    pub async fn count_entities_in_region(&self, region: &RegionRef) -> Result<usize, EngineError> {
        let mut conn = self.store.pool().acquire().await?;
        Ok(self.spatial.entities_in_region(&mut conn, region).await?.len())
    }

    // ========================================================================
    // Connection-level reads and checks shared with WorldTransaction
    // ========================================================================

    pub(crate) async fn read_entity(
        &self,
        conn: &mut SqliteConnection,
        id: EntityId,
    ) -> Result<Option<Entity>, EngineError> {
        Ok(self
            .store
            .entities()
            .get(conn, id)
            .await?
            .filter(Entity::is_active))
    }

    pub(crate) async fn require_active_entity(
        &self,
        conn: &mut SqliteConnection,
        id: EntityId,
    ) -> Result<Entity, EngineError> {
        match self.store.entities().get(conn, id).await? {
            None => Err(EngineError::EntityNotFound(id)),
            Some(entity) if !entity.is_active() => Err(EngineError::EntityDeleted(id)),
            Some(entity) => Ok(entity),
        }
    }

    pub(crate) fn require_type(
        &self,
        kind: RegistryKind,
        name: &str,
    ) -> Result<&TypeRegistration, EngineError> {
        self.registry
            .get(kind, name)
            .ok_or_else(|| EngineError::UnregisteredType {
                kind,
                name: name.to_string(),
            })
    }

    /// Shape checks for a component payload: registered type, object, schema
    pub(crate) fn validate_component_data(
        &self,
        component_type: &str,
        data: &Value,
    ) -> Result<(), EngineError> {
        let registration = self.require_type(RegistryKind::Component, component_type)?;
        if !data.is_object() {
            return Err(EngineError::Validation(format!(
                "'{}' data must be a JSON object",
                component_type
            )));
        }
        if let Some(schema) = &registration.schema {
            schema::validate(schema, data).map_err(|violation| EngineError::Schema {
                component_type: component_type.to_string(),
                violation,
            })?;
        }
        Ok(())
    }

    pub(crate) async fn read_component(
        &self,
        conn: &mut SqliteConnection,
        entity_id: EntityId,
        component_type: &str,
    ) -> Result<Option<Component>, EngineError> {
        if self.read_entity(conn, entity_id).await?.is_none() {
            return Ok(None);
        }
        Ok(self
            .store
            .components()
            .active_for(conn, entity_id, component_type)
            .await?)
    }

    pub(crate) async fn read_entity_components(
        &self,
        conn: &mut SqliteConnection,
        entity_id: EntityId,
    ) -> Result<Vec<Component>, EngineError> {
        if self.read_entity(conn, entity_id).await?.is_none() {
            return Ok(Vec::new());
        }
        Ok(self.store.components().for_entity(conn, entity_id).await?)
    }

    /// Active relationships of an active entity whose other end is also active
    pub(crate) async fn read_relationships(
        &self,
        conn: &mut SqliteConnection,
        entity_id: EntityId,
        relationship_type: Option<&str>,
        direction: Direction,
    ) -> Result<Vec<Relationship>, EngineError> {
        if self.read_entity(conn, entity_id).await?.is_none() {
            return Ok(Vec::new());
        }

        let relationships = self
            .store
            .relationships()
            .for_entity(conn, entity_id, relationship_type, direction)
            .await?;

        let mut endpoint_active: HashMap<EntityId, bool> = HashMap::new();
        let mut visible = Vec::with_capacity(relationships.len());
        for relationship in relationships {
            let Some(other) = relationship.other_end(entity_id) else {
                continue;
            };
            let active = match endpoint_active.get(&other) {
                Some(active) => *active,
                None => {
                    let active = self.read_entity(conn, other).await?.is_some();
                    endpoint_active.insert(other, active);
                    active
                }
            };
            if active {
                visible.push(relationship);
            }
        }
        Ok(visible)
    }

    pub(crate) async fn read_events(
        &self,
        conn: &mut SqliteConnection,
        filter: &EventFilter,
    ) -> Result<Vec<WorldEvent>, EngineError> {
        Ok(self
            .store
            .events()
            .query(conn, filter, self.config.default_event_limit)
            .await?)
    }

    pub(crate) async fn read_entities_with(
        &self,
        conn: &mut SqliteConnection,
        component_types: &[&str],
    ) -> Result<Vec<Entity>, EngineError> {
        let Some((first, rest)) = component_types.split_first() else {
            return Ok(self.store.entities().list_active(conn).await?);
        };

        let mut matching: BTreeSet<EntityId> = self
            .store
            .components()
            .entities_with(conn, first)
            .await?
            .into_iter()
            .collect();
        for component_type in rest {
            if matching.is_empty() {
                break;
            }
            let carriers: BTreeSet<EntityId> = self
                .store
                .components()
                .entities_with(conn, component_type)
                .await?
                .into_iter()
                .collect();
            matching.retain(|id| carriers.contains(id));
        }

        let ids: Vec<EntityId> = matching.into_iter().collect();
        Ok(self.store.entities().active_among(conn, &ids).await?)
    }

    pub(crate) fn dispatch(&self, events: &[WorldEvent]) {
        for event in events {
            self.event_bus.dispatch(event);
        }
    }

    pub(crate) async fn stage_event(
        &self,
        conn: &mut SqliteConnection,
        event: &WorldEvent,
    ) -> Result<(), EngineError> {
        Ok(self.event_bus.stage(conn, event).await?)
    }
}
