//! Component rows and the text index that mirrors their payloads

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::SqliteConnection;

use super::parse_id;
use crate::domain::entities::Component;
use crate::domain::value_objects::{ComponentId, EntityId};

#[derive(sqlx::FromRow)]
struct ComponentRow {
    id: String,
    entity_id: String,
    component_type: String,
    data: Json<Value>,
    version: i64,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<ComponentRow> for Component {
    type Error = sqlx::Error;

    fn try_from(row: ComponentRow) -> Result<Self, Self::Error> {
        Ok(Component {
            id: parse_id(&row.id)?,
            entity_id: parse_id(&row.entity_id)?,
            component_type: row.component_type,
            data: row.data.0,
            version: row.version,
            created_at: row.created_at,
            modified_at: row.modified_at,
            deleted_at: row.deleted_at,
        })
    }
}

const COLUMNS: &str =
    "id, entity_id, component_type, data, version, created_at, modified_at, deleted_at";

/// Repository for component records
///
/// Every write keeps `components_fts` in step with the active components.
pub struct SqliteComponentRepository;

impl SqliteComponentRepository {
    pub async fn insert(&self, conn: &mut SqliteConnection, component: &Component) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO components
                (id, entity_id, component_type, data, version, created_at, modified_at, deleted_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(component.id.to_string())
        .bind(component.entity_id.to_string())
        .bind(&component.component_type)
        .bind(Json(&component.data))
        .bind(component.version)
        .bind(component.created_at)
        .bind(component.modified_at)
        .bind(component.deleted_at)
        .execute(&mut *conn)
        .await?;

        if component.is_active() {
            self.index(conn, component).await?;
        }
        Ok(())
    }

    /// Fetch a component whether or not it is deleted
    pub async fn get(&self, conn: &mut SqliteConnection, id: ComponentId) -> Result<Option<Component>, sqlx::Error> {
        let row: Option<ComponentRow> =
            sqlx::query_as(&format!("SELECT {} FROM components WHERE id = ?", COLUMNS))
                .bind(id.to_string())
                .fetch_optional(conn)
                .await?;
        row.map(Component::try_from).transpose()
    }

    pub async fn active_for(
        &self,
        conn: &mut SqliteConnection,
        entity_id: EntityId,
        component_type: &str,
    ) -> Result<Option<Component>, sqlx::Error> {
        let row: Option<ComponentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM components
             WHERE entity_id = ? AND component_type = ? AND deleted_at IS NULL",
            COLUMNS
        ))
        .bind(entity_id.to_string())
        .bind(component_type)
        .fetch_optional(conn)
        .await?;
        row.map(Component::try_from).transpose()
    }

    /// Active components of an entity, ordered by type
    pub async fn for_entity(&self, conn: &mut SqliteConnection, entity_id: EntityId) -> Result<Vec<Component>, sqlx::Error> {
        let rows: Vec<ComponentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM components
             WHERE entity_id = ? AND deleted_at IS NULL
             ORDER BY component_type",
            COLUMNS
        ))
        .bind(entity_id.to_string())
        .fetch_all(conn)
        .await?;
        rows.into_iter().map(Component::try_from).collect()
    }

    /// Active entities carrying an active component of this type
    pub async fn entities_with(&self, conn: &mut SqliteConnection, component_type: &str) -> Result<Vec<EntityId>, sqlx::Error> {
        let ids: Vec<(String,)> = sqlx::query_as(
            "SELECT c.entity_id FROM components c
             JOIN entities e ON e.id = c.entity_id
             WHERE c.component_type = ? AND c.deleted_at IS NULL AND e.deleted_at IS NULL",
        )
        .bind(component_type)
        .fetch_all(conn)
        .await?;
        ids.into_iter().map(|(id,)| parse_id(&id)).collect()
    }

    /// Active entities whose component of `component_type` has `field` equal to `value`
    pub async fn entities_where_field(
        &self,
        conn: &mut SqliteConnection,
        component_type: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<EntityId>, sqlx::Error> {
        let ids: Vec<(String,)> = sqlx::query_as(
            "SELECT c.entity_id FROM components c
             JOIN entities e ON e.id = c.entity_id
             WHERE c.component_type = ? AND c.deleted_at IS NULL AND e.deleted_at IS NULL
               AND json_extract(c.data, ?) = ?
             ORDER BY e.name, e.id",
        )
        .bind(component_type)
        .bind(format!("$.{}", field))
        .bind(value)
        .fetch_all(conn)
        .await?;
        ids.into_iter().map(|(id,)| parse_id(&id)).collect()
    }

    /// Replace data and bump the version, but only from `expected_version`
    ///
    /// Returns the number of rows changed; zero means the version moved on
    /// or the component is gone.
    pub async fn compare_and_update(
        &self,
        conn: &mut SqliteConnection,
        component: &Component,
        expected_version: i64,
        data: &Value,
        at: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE components SET data = ?, version = version + 1, modified_at = ?
             WHERE id = ? AND version = ? AND deleted_at IS NULL",
        )
        .bind(Json(data))
        .bind(at)
        .bind(component.id.to_string())
        .bind(expected_version)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() > 0 {
            self.unindex(conn, component.id).await?;
            let updated = Component {
                data: data.clone(),
                ..component.clone()
            };
            self.index(conn, &updated).await?;
        }
        Ok(result.rows_affected())
    }

    pub async fn soft_delete(
        &self,
        conn: &mut SqliteConnection,
        id: ComponentId,
        at: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE components SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(at)
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;
        self.unindex(conn, id).await?;
        Ok(result.rows_affected())
    }

    pub async fn restore(&self, conn: &mut SqliteConnection, component: &Component) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE components SET deleted_at = NULL WHERE id = ? AND deleted_at IS NOT NULL",
        )
        .bind(component.id.to_string())
        .execute(&mut *conn)
        .await?;
        if result.rows_affected() > 0 {
            self.index(conn, component).await?;
        }
        Ok(result.rows_affected())
    }

    /// Active entities whose component payloads match a text query
    pub async fn search(&self, conn: &mut SqliteConnection, query: &str) -> Result<Vec<EntityId>, sqlx::Error> {
        let ids: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT f.entity_id FROM components_fts f
             JOIN entities e ON e.id = f.entity_id
             WHERE components_fts MATCH ? AND e.deleted_at IS NULL",
        )
        .bind(phrase(query))
        .fetch_all(conn)
        .await?;
        ids.into_iter().map(|(id,)| parse_id(&id)).collect()
    }

    async fn index(&self, conn: &mut SqliteConnection, component: &Component) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO components_fts (component_id, entity_id, component_type, content)
             VALUES (?, ?, ?, ?)",
        )
        .bind(component.id.to_string())
        .bind(component.entity_id.to_string())
        .bind(&component.component_type)
        .bind(searchable_text(&component.component_type, &component.data))
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn unindex(&self, conn: &mut SqliteConnection, id: ComponentId) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM components_fts WHERE component_id = ?")
            .bind(id.to_string())
            .execute(conn)
            .await?;
        Ok(())
    }
}

/// Quote a user query as a single FTS phrase
fn phrase(query: &str) -> String {
    format!("\"{}\"", query.replace('"', "\"\""))
}

/// Flatten a payload into the words the text index should hold
fn searchable_text(component_type: &str, data: &Value) -> String {
    fn collect(value: &Value, out: &mut Vec<String>) {
        match value {
            Value::String(s) => out.push(s.clone()),
            Value::Number(n) => out.push(n.to_string()),
            Value::Bool(b) => out.push(b.to_string()),
            Value::Array(items) => items.iter().for_each(|item| collect(item, out)),
            Value::Object(fields) => {
                for (key, value) in fields {
                    out.push(key.clone());
                    collect(value, out);
                }
            }
            Value::Null => {}
        }
    }

    let mut words = vec![component_type.to_string()];
    collect(data, &mut words);
    words.join(" ")
}
