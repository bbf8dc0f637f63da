//! Relationship rows

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use super::parse_id;
use crate::domain::entities::{Direction, Relationship};
use crate::domain::value_objects::{EntityId, RelationshipId};

#[derive(sqlx::FromRow)]
struct RelationshipRow {
    id: String,
    from_entity: String,
    to_entity: String,
    relationship_type: String,
    metadata: Option<Json<Value>>,
    created_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<RelationshipRow> for Relationship {
    type Error = sqlx::Error;

    fn try_from(row: RelationshipRow) -> Result<Self, Self::Error> {
        Ok(Relationship {
            id: parse_id(&row.id)?,
            from_entity: parse_id(&row.from_entity)?,
            to_entity: parse_id(&row.to_entity)?,
            relationship_type: row.relationship_type,
            metadata: row.metadata.map(|json| json.0),
            created_at: row.created_at,
            deleted_at: row.deleted_at,
        })
    }
}

const COLUMNS: &str =
    "id, from_entity, to_entity, relationship_type, metadata, created_at, deleted_at";

/// Repository for relationship records
pub struct SqliteRelationshipRepository;

impl SqliteRelationshipRepository {
    pub async fn insert(&self, conn: &mut SqliteConnection, relationship: &Relationship) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO relationships
                (id, from_entity, to_entity, relationship_type, metadata, created_at, deleted_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(relationship.id.to_string())
        .bind(relationship.from_entity.to_string())
        .bind(relationship.to_entity.to_string())
        .bind(&relationship.relationship_type)
        .bind(relationship.metadata.as_ref().map(Json))
        .bind(relationship.created_at)
        .bind(relationship.deleted_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Fetch a relationship whether or not it is deleted
    pub async fn get(&self, conn: &mut SqliteConnection, id: RelationshipId) -> Result<Option<Relationship>, sqlx::Error> {
        let row: Option<RelationshipRow> =
            sqlx::query_as(&format!("SELECT {} FROM relationships WHERE id = ?", COLUMNS))
                .bind(id.to_string())
                .fetch_optional(conn)
                .await?;
        row.map(Relationship::try_from).transpose()
    }

    /// Active relationships touching `entity_id`, oldest first
    pub async fn for_entity(
        &self,
        conn: &mut SqliteConnection,
        entity_id: EntityId,
        relationship_type: Option<&str>,
        direction: Direction,
    ) -> Result<Vec<Relationship>, sqlx::Error> {
        let id = entity_id.to_string();
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM relationships WHERE deleted_at IS NULL AND ",
            COLUMNS
        ));

        match direction {
            Direction::Outgoing => {
                query.push("from_entity = ").push_bind(id);
            }
            Direction::Incoming => {
                query.push("to_entity = ").push_bind(id);
            }
            Direction::Both => {
                query
                    .push("(from_entity = ")
                    .push_bind(id.clone())
                    .push(" OR to_entity = ")
                    .push_bind(id)
                    .push(")");
            }
        }
        if let Some(relationship_type) = relationship_type {
            query
                .push(" AND relationship_type = ")
                .push_bind(relationship_type.to_string());
        }
        query.push(" ORDER BY created_at, rowid");

        let rows: Vec<RelationshipRow> = query.build_query_as().fetch_all(conn).await?;
        rows.into_iter().map(Relationship::try_from).collect()
    }

    pub async fn soft_delete(
        &self,
        conn: &mut SqliteConnection,
        id: RelationshipId,
        at: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE relationships SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(at)
        .bind(id.to_string())
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn restore(&self, conn: &mut SqliteConnection, id: RelationshipId) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE relationships SET deleted_at = NULL WHERE id = ? AND deleted_at IS NOT NULL",
        )
        .bind(id.to_string())
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }
}
