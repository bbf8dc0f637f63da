//! SQLite persistence adapters
//!
//! [`SqliteRecordStore`] owns the connection pool and hands out one repository
//! per record family. Repositories are pure data access: they run on whatever
//! connection they are given, so the caller decides the transaction scope.

mod component_repository;
mod entity_repository;
mod event_repository;
mod relationship_repository;
mod schema;
mod type_repository;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::info;

pub use component_repository::SqliteComponentRepository;
pub use entity_repository::SqliteEntityRepository;
pub use event_repository::SqliteEventRepository;
pub use relationship_repository::SqliteRelationshipRepository;
pub use type_repository::{SqliteTypeRepository, StoredType};

/// Connection pool for one world database
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Open (creating if needed) the database at `database_url` and ensure its schema
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Each connection to an in-memory database is a separate database
        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { max_connections.max(1) })
            .min_connections(if in_memory { 1 } else { 0 })
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        schema::migrate(&pool).await?;
        info!(database_url = %database_url, "World store opened");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open a transaction; dropping it without commit rolls back
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }

    pub fn entities(&self) -> SqliteEntityRepository {
        SqliteEntityRepository
    }

    pub fn components(&self) -> SqliteComponentRepository {
        SqliteComponentRepository
    }

    pub fn relationships(&self) -> SqliteRelationshipRepository {
        SqliteRelationshipRepository
    }

    pub fn events(&self) -> SqliteEventRepository {
        SqliteEventRepository
    }

    pub fn types(&self) -> SqliteTypeRepository {
        SqliteTypeRepository
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Parse a stored id column, reporting bad values as decode errors
fn parse_id<T>(raw: &str) -> Result<T, sqlx::Error>
where
    T: FromStr<Err = uuid::Error>,
{
    raw.parse().map_err(|e: uuid::Error| sqlx::Error::Decode(Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Component, Direction, Entity, Relationship, TypeRegistration};
    use crate::domain::events::{EventFilter, WorldEvent};
    use crate::domain::value_objects::EntityId;
    use serde_json::json;

    async fn store() -> SqliteRecordStore {
        let store = SqliteRecordStore::connect("sqlite::memory:", 1).await.unwrap();
        let mut conn = store.pool().acquire().await.unwrap();
        for registration in [
            TypeRegistration::component("Identity", "").owned_by("test"),
            TypeRegistration::relationship("knows", "").owned_by("test"),
            TypeRegistration::event("thing.happened", "").owned_by("test"),
        ] {
            store.types().insert_if_absent(&mut conn, &registration).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_entity_soft_delete_hides_from_active_list() {
        let store = store().await;
        let mut conn = store.pool().acquire().await.unwrap();
        let entity = Entity::new("Lantern");
        store.entities().insert(&mut conn, &entity).await.unwrap();

        let affected = store
            .entities()
            .soft_delete(&mut conn, entity.id, Some("gm"), chrono::Utc::now())
            .await
            .unwrap();
        assert_eq!(affected, 1);
        assert!(store.entities().list_active(&mut conn).await.unwrap().is_empty());

        let deleted = store.entities().get(&mut conn, entity.id).await.unwrap().unwrap();
        assert_eq!(deleted.deleted_by.as_deref(), Some("gm"));

        store.entities().restore(&mut conn, entity.id).await.unwrap();
        let restored = store.entities().get(&mut conn, entity.id).await.unwrap().unwrap();
        assert_eq!(restored, entity);
    }

    #[tokio::test]
    async fn test_second_active_component_violates_unique_index() {
        let store = store().await;
        let mut conn = store.pool().acquire().await.unwrap();
        let entity = Entity::new("Orc");
        store.entities().insert(&mut conn, &entity).await.unwrap();

        let first = Component::new(entity.id, "Identity", json!({"description": "Big"}));
        store.components().insert(&mut conn, &first).await.unwrap();
        let second = Component::new(entity.id, "Identity", json!({"description": "Bigger"}));
        assert!(store.components().insert(&mut conn, &second).await.is_err());
    }

    #[tokio::test]
    async fn test_compare_and_update_rejects_stale_version() {
        let store = store().await;
        let mut conn = store.pool().acquire().await.unwrap();
        let entity = Entity::new("Orc");
        store.entities().insert(&mut conn, &entity).await.unwrap();
        let component = Component::new(entity.id, "Identity", json!({"description": "Big"}));
        store.components().insert(&mut conn, &component).await.unwrap();

        let now = chrono::Utc::now();
        let changed = store
            .components()
            .compare_and_update(&mut conn, &component, 1, &json!({"description": "Huge"}), now)
            .await
            .unwrap();
        assert_eq!(changed, 1);

        let stale = store
            .components()
            .compare_and_update(&mut conn, &component, 1, &json!({"description": "Tiny"}), now)
            .await
            .unwrap();
        assert_eq!(stale, 0);

        let stored = store.components().get(&mut conn, component.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.data, json!({"description": "Huge"}));
    }

    #[tokio::test]
    async fn test_text_index_follows_component_writes() {
        let store = store().await;
        let mut conn = store.pool().acquire().await.unwrap();
        let entity = Entity::new("Mill");
        store.entities().insert(&mut conn, &entity).await.unwrap();
        let component = Component::new(entity.id, "Identity", json!({"description": "creaky windmill"}));
        store.components().insert(&mut conn, &component).await.unwrap();

        let hits = store.components().search(&mut conn, "windmill").await.unwrap();
        assert_eq!(hits, vec![entity.id]);

        store
            .components()
            .compare_and_update(&mut conn, &component, 1, &json!({"description": "burnt ruin"}), chrono::Utc::now())
            .await
            .unwrap();
        assert!(store.components().search(&mut conn, "windmill").await.unwrap().is_empty());
        assert_eq!(store.components().search(&mut conn, "ruin").await.unwrap(), vec![entity.id]);

        store
            .components()
            .soft_delete(&mut conn, component.id, chrono::Utc::now())
            .await
            .unwrap();
        assert!(store.components().search(&mut conn, "ruin").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_relationship_direction_filters() {
        let store = store().await;
        let mut conn = store.pool().acquire().await.unwrap();
        let a = Entity::new("A");
        let b = Entity::new("B");
        store.entities().insert(&mut conn, &a).await.unwrap();
        store.entities().insert(&mut conn, &b).await.unwrap();
        let edge = Relationship::new(a.id, b.id, "knows").with_metadata(json!({"since": 3}));
        store.relationships().insert(&mut conn, &edge).await.unwrap();

        let repo = store.relationships();
        let outgoing = repo.for_entity(&mut conn, a.id, None, Direction::Outgoing).await.unwrap();
        assert_eq!(outgoing, vec![edge.clone()]);
        assert!(repo.for_entity(&mut conn, a.id, None, Direction::Incoming).await.unwrap().is_empty());
        assert_eq!(repo.for_entity(&mut conn, b.id, Some("knows"), Direction::Both).await.unwrap().len(), 1);
        assert!(repo.for_entity(&mut conn, b.id, Some("hates"), Direction::Both).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_event_query_order_and_limit() {
        let store = store().await;
        let mut conn = store.pool().acquire().await.unwrap();
        let entity = Entity::new("Clock");
        store.entities().insert(&mut conn, &entity).await.unwrap();
        for tick in 0..5 {
            let event = WorldEvent::new("thing.happened", json!({"tick": tick})).for_entity(entity.id);
            store.events().append(&mut conn, &event).await.unwrap();
        }

        let newest = store
            .events()
            .query(&mut conn, &EventFilter::for_entity(entity.id).limit(2), 100)
            .await
            .unwrap();
        let ticks: Vec<_> = newest.iter().map(|e| e.data["tick"].clone()).collect();
        assert_eq!(ticks, vec![json!(4), json!(3)]);

        let oldest = store
            .events()
            .query(&mut conn, &EventFilter::default().oldest_first(), 100)
            .await
            .unwrap();
        assert_eq!(oldest.first().map(|e| e.data["tick"].clone()), Some(json!(0)));
        assert_eq!(store.events().count(&mut conn).await.unwrap(), 5);

        let other = store
            .events()
            .query(&mut conn, &EventFilter::for_entity(EntityId::new()), 100)
            .await
            .unwrap();
        assert!(other.is_empty());
    }
}
