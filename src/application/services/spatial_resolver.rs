//! Spatial Resolver - Region hierarchy checks for position-bearing components
//!
//! A `Position` component names its region either as an abstract zone or as
//! the id of a parent entity. Parents form an implicit tree in component data.
//! The resolver keeps that tree acyclic, enforces `Container` capacity and
//! turns a chain of local offsets into an absolute position.

use std::collections::HashSet;

use serde_json::Value;
use sqlx::SqliteConnection;
use thiserror::Error;
use tracing::debug;

use crate::application::error::EngineError;
use crate::domain::entities::Component;
use crate::domain::value_objects::{EntityId, LocalOffset, RegionRef, WorldPosition, REGION_FIELD};
use crate::infrastructure::persistence::SqliteRecordStore;

/// Component type carrying a region and local offset
pub const POSITION_COMPONENT: &str = "Position";
/// Component type limiting how many entities a region holds
pub const CONTAINER_COMPONENT: &str = "Container";
const CAPACITY_FIELD: &str = "capacity";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpatialError {
    #[error("Entity {entity_id} cannot be placed in '{region}': {reason}")]
    InvalidParent {
        entity_id: EntityId,
        region: String,
        reason: String,
    },
    #[error("Placing entity {entity_id} inside {parent} would create a cycle")]
    CircularReference { entity_id: EntityId, parent: EntityId },
    #[error("Region {region} is full ({occupants}/{capacity})")]
    RegionFull {
        region: EntityId,
        capacity: u64,
        occupants: u64,
    },
}

/// How full an entity region is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionOccupancy {
    pub region: EntityId,
    pub occupants: u64,
    /// `None` means unlimited
    pub capacity: Option<u64>,
}

impl RegionOccupancy {
    pub fn has_room(&self) -> bool {
        self.capacity.map_or(true, |capacity| self.occupants < capacity)
    }
}

pub struct SpatialResolver {
    store: SqliteRecordStore,
    max_depth: usize,
}

impl SpatialResolver {
    pub fn new(store: SqliteRecordStore, max_depth: usize) -> Self {
        Self { store, max_depth }
    }

    pub fn is_position_type(component_type: &str) -> bool {
        component_type == POSITION_COMPONENT
    }

    /// Check a position payload that is about to be written for `entity_id`
    pub async fn validate_position(
        &self,
        conn: &mut SqliteConnection,
        entity_id: EntityId,
        data: &Value,
    ) -> Result<(), EngineError> {
        let Some(parent) = Self::parent_of(data) else {
            return Ok(());
        };

        let current = self.position_of(conn, entity_id).await?;
        let already_there = current
            .as_ref()
            .and_then(|position| Self::parent_of(&position.data))
            .is_some_and(|region| region == parent);

        self.check_placement(conn, entity_id, parent, !already_there).await
    }

    /// Check that a deleted entity's Position is still valid before it comes back
    ///
    /// A deleted entity does not count as an occupant, so it needs a free
    /// slot in its parent just like a new arrival.
    pub async fn validate_return(
        &self,
        conn: &mut SqliteConnection,
        entity_id: EntityId,
    ) -> Result<(), EngineError> {
        let Some(parent) = self
            .position_of(conn, entity_id)
            .await?
            .and_then(|position| Self::parent_of(&position.data))
        else {
            return Ok(());
        };

        self.check_placement(conn, entity_id, parent, true).await
    }

    async fn check_placement(
        &self,
        conn: &mut SqliteConnection,
        entity_id: EntityId,
        parent: EntityId,
        arriving: bool,
    ) -> Result<(), EngineError> {
        if parent == entity_id {
            return Err(SpatialError::CircularReference { entity_id, parent }.into());
        }

        let invalid = |reason: &str| SpatialError::InvalidParent {
            entity_id,
            region: parent.to_string(),
            reason: reason.to_string(),
        };

        match self.store.entities().get(conn, parent).await? {
            None => return Err(invalid("no such entity").into()),
            Some(entity) if !entity.is_active() => return Err(invalid("entity is deleted").into()),
            Some(_) => {}
        }
        if self.position_of(conn, parent).await?.is_none() {
            return Err(invalid("entity has no Position").into());
        }

        self.check_ancestors(conn, entity_id, parent).await?;

        if arriving {
            self.check_capacity(conn, parent).await?;
        }
        Ok(())
    }

    fn parent_of(data: &Value) -> Option<EntityId> {
        RegionRef::from_position_data(data).and_then(|region| region.entity_id())
    }

    /// Walk up from `parent`; reaching `entity_id` means the write closes a loop
    async fn check_ancestors(
        &self,
        conn: &mut SqliteConnection,
        entity_id: EntityId,
        parent: EntityId,
    ) -> Result<(), EngineError> {
        let mut current = parent;
        for _ in 0..self.max_depth {
            let next = self
                .position_of(conn, current)
                .await?
                .and_then(|position| RegionRef::from_position_data(&position.data))
                .and_then(|region| region.entity_id());

            match next {
                Some(next) if next == entity_id => {
                    return Err(SpatialError::CircularReference { entity_id, parent }.into());
                }
                Some(next) => current = next,
                None => return Ok(()),
            }
        }

        Err(SpatialError::InvalidParent {
            entity_id,
            region: parent.to_string(),
            reason: format!("hierarchy is deeper than {} levels", self.max_depth),
        }
        .into())
    }

    /// Occupant count and limit of an entity region
    pub async fn occupancy(
        &self,
        conn: &mut SqliteConnection,
        region: EntityId,
    ) -> Result<RegionOccupancy, EngineError> {
        let capacity = self
            .store
            .components()
            .active_for(conn, region, CONTAINER_COMPONENT)
            .await?
            .and_then(|container| capacity_of(&container.data));

        let occupants = self
            .store
            .components()
            .entities_where_field(conn, POSITION_COMPONENT, REGION_FIELD, &region.to_string())
            .await?
            .len() as u64;

        Ok(RegionOccupancy {
            region,
            occupants,
            capacity,
        })
    }

    /// Fail `RegionFull` when the region cannot take another occupant
    pub async fn check_capacity(
        &self,
        conn: &mut SqliteConnection,
        region: EntityId,
    ) -> Result<RegionOccupancy, EngineError> {
        match self.store.entities().get(conn, region).await? {
            None => return Err(EngineError::EntityNotFound(region)),
            Some(entity) if !entity.is_active() => return Err(EngineError::EntityDeleted(region)),
            Some(_) => {}
        }

        let occupancy = self.occupancy(conn, region).await?;
        match occupancy.capacity {
            Some(capacity) if !occupancy.has_room() => Err(SpatialError::RegionFull {
                region,
                capacity,
                occupants: occupancy.occupants,
            }
            .into()),
            _ => Ok(occupancy),
        }
    }

    /// Sum local offsets up the region chain
    ///
    /// `None` when the chain breaks: a missing or deleted entity, a missing
    /// Position, a loop, or a chain longer than the depth limit.
    pub async fn resolve_world_position(
        &self,
        conn: &mut SqliteConnection,
        entity_id: EntityId,
    ) -> Result<Option<WorldPosition>, EngineError> {
        let mut position = WorldPosition::origin();
        let mut visited = HashSet::new();
        let mut current = entity_id;

        for _ in 0..=self.max_depth {
            if !visited.insert(current) {
                debug!(entity_id = %entity_id, "Region chain loops");
                return Ok(None);
            }
            match self.store.entities().get(conn, current).await? {
                Some(entity) if entity.is_active() => {}
                _ => return Ok(None),
            }
            let Some(component) = self.position_of(conn, current).await? else {
                return Ok(None);
            };

            position = position.offset_by(LocalOffset::from_position_data(&component.data));
            match RegionRef::from_position_data(&component.data) {
                None => return Ok(Some(position)),
                Some(RegionRef::Zone(zone)) => {
                    position.zone = Some(zone);
                    return Ok(Some(position));
                }
                Some(RegionRef::Entity(parent)) => current = parent,
            }
        }

        Ok(None)
    }

    /// Active entities whose Position names `region`
    pub async fn entities_in_region(
        &self,
        conn: &mut SqliteConnection,
        region: &RegionRef,
    ) -> Result<Vec<EntityId>, EngineError> {
        Ok(self
            .store
            .components()
            .entities_where_field(conn, POSITION_COMPONENT, REGION_FIELD, &region.to_string())
            .await?)
    }

    async fn position_of(
        &self,
        conn: &mut SqliteConnection,
        entity_id: EntityId,
    ) -> Result<Option<Component>, EngineError> {
        Ok(self
            .store
            .components()
            .active_for(conn, entity_id, POSITION_COMPONENT)
            .await?)
    }
}

/// Container limit; whole-number floats such as `2.0` count as integers
fn capacity_of(container: &Value) -> Option<u64> {
    let capacity = container.get(CAPACITY_FIELD)?;
    capacity.as_u64().or_else(|| {
        capacity
            .as_f64()
            .filter(|value| *value >= 0.0 && value.fract() == 0.0)
            .map(|value| value as u64)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Entity, TypeRegistration};
    use serde_json::json;

    struct Fixture {
        store: SqliteRecordStore,
        resolver: SpatialResolver,
    }

    impl Fixture {
        async fn new(max_depth: usize) -> Self {
            let store = SqliteRecordStore::connect("sqlite::memory:", 1).await.unwrap();
            let mut conn = store.pool().acquire().await.unwrap();
            for name in [POSITION_COMPONENT, CONTAINER_COMPONENT] {
                store
                    .types()
                    .insert_if_absent(&mut conn, &TypeRegistration::component(name, "").owned_by("test"))
                    .await
                    .unwrap();
            }
            let resolver = SpatialResolver::new(store.clone(), max_depth);
            Self { store, resolver }
        }

        async fn place(&self, name: &str, position: Value) -> EntityId {
            let mut conn = self.store.pool().acquire().await.unwrap();
            let entity = Entity::new(name);
            self.store.entities().insert(&mut conn, &entity).await.unwrap();
            self.store
                .components()
                .insert(&mut conn, &Component::new(entity.id, POSITION_COMPONENT, position))
                .await
                .unwrap();
            entity.id
        }
    }

    fn code(err: EngineError) -> crate::application::error::ErrorCode {
        err.code()
    }

    #[tokio::test]
    async fn test_world_position_accumulates_offsets() {
        let fx = Fixture::new(100).await;
        let tavern = fx.place("Tavern", json!({"x": 100, "y": 200, "z": 0, "region": "overworld"})).await;
        let table = fx.place("Table", json!({"x": 5, "y": 3, "region": tavern.to_string()})).await;

        let mut conn = fx.store.pool().acquire().await.unwrap();
        let position = fx.resolver.resolve_world_position(&mut conn, table).await.unwrap().unwrap();
        assert_eq!(
            position,
            WorldPosition { x: 105.0, y: 203.0, z: 0.0, zone: Some("overworld".to_string()) }
        );
    }

    #[tokio::test]
    async fn test_parent_cycle_is_rejected() {
        let fx = Fixture::new(100).await;
        let a = fx.place("A", json!({"x": 0})).await;
        let b = fx.place("B", json!({"x": 0, "region": a.to_string()})).await;

        let mut conn = fx.store.pool().acquire().await.unwrap();
        let err = fx
            .resolver
            .validate_position(&mut conn, a, &json!({"region": b.to_string()}))
            .await
            .unwrap_err();
        assert_eq!(code(err), crate::application::error::ErrorCode::CircularReference);

        let err = fx
            .resolver
            .validate_position(&mut conn, a, &json!({"region": a.to_string()}))
            .await
            .unwrap_err();
        assert_eq!(code(err), crate::application::error::ErrorCode::CircularReference);
    }

    #[tokio::test]
    async fn test_parent_must_exist_and_be_positioned() {
        let fx = Fixture::new(100).await;
        let child = fx.place("Coin", json!({"x": 0})).await;
        let mut conn = fx.store.pool().acquire().await.unwrap();

        let missing = json!({"region": EntityId::new().to_string()});
        let err = fx.resolver.validate_position(&mut conn, child, &missing).await.unwrap_err();
        assert_eq!(code(err), crate::application::error::ErrorCode::InvalidParent);

        let unplaced = Entity::new("Void");
        fx.store.entities().insert(&mut conn, &unplaced).await.unwrap();
        let err = fx
            .resolver
            .validate_position(&mut conn, child, &json!({"region": unplaced.id.to_string()}))
            .await
            .unwrap_err();
        assert_eq!(code(err), crate::application::error::ErrorCode::InvalidParent);

        assert!(fx
            .resolver
            .validate_position(&mut conn, child, &json!({"region": "anywhere"}))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_depth_limit_rejects_deep_chains() {
        let fx = Fixture::new(2).await;
        let root = fx.place("Root", json!({})).await;
        let mid = fx.place("Mid", json!({"region": root.to_string()})).await;
        let leaf = fx.place("Leaf", json!({"region": mid.to_string()})).await;
        let newcomer = fx.place("New", json!({})).await;

        let mut conn = fx.store.pool().acquire().await.unwrap();
        let err = fx
            .resolver
            .validate_position(&mut conn, newcomer, &json!({"region": leaf.to_string()}))
            .await
            .unwrap_err();
        assert_eq!(code(err), crate::application::error::ErrorCode::InvalidParent);
    }

    #[tokio::test]
    async fn test_capacity_counts_occupants() {
        let fx = Fixture::new(100).await;
        let chest = fx.place("Chest", json!({"region": "overworld"})).await;
        let mut conn = fx.store.pool().acquire().await.unwrap();
        fx.store
            .components()
            .insert(&mut conn, &Component::new(chest, CONTAINER_COMPONENT, json!({"capacity": 1})))
            .await
            .unwrap();
        drop(conn);

        let coin = fx.place("Coin", json!({"region": chest.to_string()})).await;
        let gem = fx.place("Gem", json!({})).await;

        let mut conn = fx.store.pool().acquire().await.unwrap();
        let occupancy = fx.resolver.occupancy(&mut conn, chest).await.unwrap();
        assert_eq!(occupancy, RegionOccupancy { region: chest, occupants: 1, capacity: Some(1) });

        let err = fx
            .resolver
            .validate_position(&mut conn, gem, &json!({"region": chest.to_string()}))
            .await
            .unwrap_err();
        assert_eq!(code(err), crate::application::error::ErrorCode::RegionFull);

        // the current occupant may move within the region
        assert!(fx
            .resolver
            .validate_position(&mut conn, coin, &json!({"x": 2, "region": chest.to_string()}))
            .await
            .is_ok());

        let inside = fx
            .resolver
            .entities_in_region(&mut conn, &RegionRef::Entity(chest))
            .await
            .unwrap();
        assert_eq!(inside, vec![coin]);
    }

    #[tokio::test]
    async fn test_broken_chain_is_unresolvable() {
        let fx = Fixture::new(100).await;
        let orphan = fx.place("Orphan", json!({"region": EntityId::new().to_string()})).await;
        let mut conn = fx.store.pool().acquire().await.unwrap();
        assert_eq!(fx.resolver.resolve_world_position(&mut conn, orphan).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_whole_number_float_capacity_is_enforced() {
        let fx = Fixture::new(100).await;
        let pouch = fx.place("Pouch", json!({})).await;
        let mut conn = fx.store.pool().acquire().await.unwrap();
        fx.store
            .components()
            .insert(&mut conn, &Component::new(pouch, CONTAINER_COMPONENT, json!({"capacity": 1.0})))
            .await
            .unwrap();
        drop(conn);

        fx.place("Coin", json!({"region": pouch.to_string()})).await;
        let gem = fx.place("Gem", json!({})).await;

        let mut conn = fx.store.pool().acquire().await.unwrap();
        let occupancy = fx.resolver.occupancy(&mut conn, pouch).await.unwrap();
        assert_eq!(occupancy.capacity, Some(1));
        let err = fx
            .resolver
            .validate_position(&mut conn, gem, &json!({"region": pouch.to_string()}))
            .await
            .unwrap_err();
        assert_eq!(code(err), crate::application::error::ErrorCode::RegionFull);

        assert_eq!(capacity_of(&json!({"capacity": 1.5})), None);
        assert_eq!(capacity_of(&json!({"capacity": null})), None);
        assert_eq!(capacity_of(&json!({"capacity": 3})), Some(3));
    }

    #[tokio::test]
    async fn test_capacity_of_missing_region_is_not_found() {
        let fx = Fixture::new(100).await;
        let mut conn = fx.store.pool().acquire().await.unwrap();
        let err = fx.resolver.check_capacity(&mut conn, EntityId::new()).await.unwrap_err();
        assert_eq!(code(err), crate::application::error::ErrorCode::NotFound);

        let gone = Entity::new("Gone");
        fx.store.entities().insert(&mut conn, &gone).await.unwrap();
        fx.store
            .entities()
            .soft_delete(&mut conn, gone.id, None, chrono::Utc::now())
            .await
            .unwrap();
        let err = fx.resolver.check_capacity(&mut conn, gone.id).await.unwrap_err();
        assert_eq!(code(err), crate::application::error::ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_returning_entity_needs_a_free_slot() {
        let fx = Fixture::new(100).await;
        let chest = fx.place("Chest", json!({})).await;
        let mut conn = fx.store.pool().acquire().await.unwrap();
        fx.store
            .components()
            .insert(&mut conn, &Component::new(chest, CONTAINER_COMPONENT, json!({"capacity": 1})))
            .await
            .unwrap();
        drop(conn);

        let coin = fx.place("Coin", json!({"region": chest.to_string()})).await;
        let mut conn = fx.store.pool().acquire().await.unwrap();
        fx.store
            .entities()
            .soft_delete(&mut conn, coin, None, chrono::Utc::now())
            .await
            .unwrap();
        assert!(fx.resolver.validate_return(&mut conn, coin).await.is_ok());
        drop(conn);

        fx.place("Gem", json!({"region": chest.to_string()})).await;
        let mut conn = fx.store.pool().acquire().await.unwrap();
        let err = fx.resolver.validate_return(&mut conn, coin).await.unwrap_err();
        assert_eq!(code(err), crate::application::error::ErrorCode::RegionFull);
    }
}
