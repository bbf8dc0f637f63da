//! Entity rows

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use super::parse_id;
use crate::domain::entities::Entity;
use crate::domain::value_objects::EntityId;

#[derive(sqlx::FromRow)]
struct EntityRow {
    id: String,
    name: String,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
    deleted_by: Option<String>,
}

impl TryFrom<EntityRow> for Entity {
    type Error = sqlx::Error;

    fn try_from(row: EntityRow) -> Result<Self, Self::Error> {
        Ok(Entity {
            id: parse_id(&row.id)?,
            name: row.name,
            created_at: row.created_at,
            modified_at: row.modified_at,
            deleted_at: row.deleted_at,
            deleted_by: row.deleted_by,
        })
    }
}

const COLUMNS: &str = "id, name, created_at, modified_at, deleted_at, deleted_by";

/// Repository for entity records
pub struct SqliteEntityRepository;

impl SqliteEntityRepository {
    pub async fn insert(&self, conn: &mut SqliteConnection, entity: &Entity) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO entities (id, name, created_at, modified_at, deleted_at, deleted_by)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(entity.id.to_string())
        .bind(&entity.name)
        .bind(entity.created_at)
        .bind(entity.modified_at)
        .bind(entity.deleted_at)
        .bind(&entity.deleted_by)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Fetch an entity whether or not it is deleted
    pub async fn get(&self, conn: &mut SqliteConnection, id: EntityId) -> Result<Option<Entity>, sqlx::Error> {
        let row: Option<EntityRow> =
            sqlx::query_as(&format!("SELECT {} FROM entities WHERE id = ?", COLUMNS))
                .bind(id.to_string())
                .fetch_optional(conn)
                .await?;
        row.map(Entity::try_from).transpose()
    }

    pub async fn list_active(&self, conn: &mut SqliteConnection) -> Result<Vec<Entity>, sqlx::Error> {
        let rows: Vec<EntityRow> = sqlx::query_as(&format!(
            "SELECT {} FROM entities WHERE deleted_at IS NULL ORDER BY name, id",
            COLUMNS
        ))
        .fetch_all(conn)
        .await?;
        rows.into_iter().map(Entity::try_from).collect()
    }

    /// Soft-deleted entities, most recently deleted first
    pub async fn list_deleted(&self, conn: &mut SqliteConnection) -> Result<Vec<Entity>, sqlx::Error> {
        let rows: Vec<EntityRow> = sqlx::query_as(&format!(
            "SELECT {} FROM entities WHERE deleted_at IS NOT NULL ORDER BY deleted_at DESC, id",
            COLUMNS
        ))
        .fetch_all(conn)
        .await?;
        rows.into_iter().map(Entity::try_from).collect()
    }

    /// Active entities among `ids`, ordered by name
    pub async fn active_among(
        &self,
        conn: &mut SqliteConnection,
        ids: &[EntityId],
    ) -> Result<Vec<Entity>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM entities WHERE deleted_at IS NULL AND id IN (",
            COLUMNS
        ));
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id.to_string());
        }
        separated.push_unseparated(") ORDER BY name, id");

        let rows: Vec<EntityRow> = query.build_query_as().fetch_all(conn).await?;
        rows.into_iter().map(Entity::try_from).collect()
    }

    pub async fn rename(
        &self,
        conn: &mut SqliteConnection,
        id: EntityId,
        name: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE entities SET name = ?, modified_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(name)
        .bind(at)
        .bind(id.to_string())
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn soft_delete(
        &self,
        conn: &mut SqliteConnection,
        id: EntityId,
        actor: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE entities SET deleted_at = ?, deleted_by = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(at)
        .bind(actor)
        .bind(id.to_string())
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn restore(&self, conn: &mut SqliteConnection, id: EntityId) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE entities SET deleted_at = NULL, deleted_by = NULL WHERE id = ? AND deleted_at IS NOT NULL",
        )
        .bind(id.to_string())
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn count_active(&self, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM entities WHERE deleted_at IS NULL")
                .fetch_one(conn)
                .await?;
        Ok(count)
    }
}
