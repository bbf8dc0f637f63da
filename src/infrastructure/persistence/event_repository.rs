//! Event log rows
//!
//! The log is append-only: this repository has no update or delete.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use super::parse_id;
use crate::domain::events::{EventFilter, EventOrder, WorldEvent};

#[derive(sqlx::FromRow)]
struct EventRow {
    event_id: String,
    timestamp: DateTime<Utc>,
    event_type: String,
    entity_id: Option<String>,
    component_id: Option<String>,
    actor_id: Option<String>,
    data: Json<Value>,
}

impl TryFrom<EventRow> for WorldEvent {
    type Error = sqlx::Error;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(WorldEvent {
            id: parse_id(&row.event_id)?,
            timestamp: row.timestamp,
            event_type: row.event_type,
            entity_id: row.entity_id.as_deref().map(parse_id).transpose()?,
            component_id: row.component_id.as_deref().map(parse_id).transpose()?,
            actor_id: row.actor_id,
            data: row.data.0,
        })
    }
}

/// Repository for the event log
pub struct SqliteEventRepository;

impl SqliteEventRepository {
    pub async fn append(&self, conn: &mut SqliteConnection, event: &WorldEvent) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO events
                (event_id, timestamp, event_type, entity_id, component_id, actor_id, data)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(event.id.to_string())
        .bind(event.timestamp)
        .bind(&event.event_type)
        .bind(event.entity_id.map(|id| id.to_string()))
        .bind(event.component_id.map(|id| id.to_string()))
        .bind(&event.actor_id)
        .bind(Json(&event.data))
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Events matching `filter`, in append order or its reverse
    pub async fn query(
        &self,
        conn: &mut SqliteConnection,
        filter: &EventFilter,
        default_limit: u32,
    ) -> Result<Vec<WorldEvent>, sqlx::Error> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT event_id, timestamp, event_type, entity_id, component_id, actor_id, data
             FROM events WHERE 1 = 1",
        );
        if let Some(entity_id) = filter.entity_id {
            query.push(" AND entity_id = ").push_bind(entity_id.to_string());
        }
        if let Some(event_type) = &filter.event_type {
            query.push(" AND event_type = ").push_bind(event_type.clone());
        }
        if let Some(component_id) = filter.component_id {
            query.push(" AND component_id = ").push_bind(component_id.to_string());
        }
        // rowid follows commit order
        query.push(match filter.order {
            EventOrder::NewestFirst => " ORDER BY rowid DESC",
            EventOrder::OldestFirst => " ORDER BY rowid ASC",
        });
        query
            .push(" LIMIT ")
            .push_bind(i64::from(filter.limit.unwrap_or(default_limit)));

        let rows: Vec<EventRow> = query.build_query_as().fetch_all(conn).await?;
        rows.into_iter().map(WorldEvent::try_from).collect()
    }

    pub async fn count(&self, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM events")
            .fetch_one(conn)
            .await?;
        Ok(count)
    }
}
