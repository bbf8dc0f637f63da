//! Table and index definitions for a world database
//!
//! Every statement is idempotent so opening an existing world is safe.

use sqlx::SqlitePool;
use tracing::debug;

use crate::domain::entities::RegistryKind;

const RECORD_TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS entities (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        created_at TEXT NOT NULL,
        modified_at TEXT NOT NULL,
        deleted_at TEXT,
        deleted_by TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS components (
        id TEXT PRIMARY KEY,
        entity_id TEXT NOT NULL REFERENCES entities(id),
        component_type TEXT NOT NULL REFERENCES component_types(type),
        data TEXT NOT NULL,
        version INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        modified_at TEXT NOT NULL,
        deleted_at TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS relationships (
        id TEXT PRIMARY KEY,
        from_entity TEXT NOT NULL REFERENCES entities(id),
        to_entity TEXT NOT NULL REFERENCES entities(id),
        relationship_type TEXT NOT NULL REFERENCES relationship_types(type),
        metadata TEXT,
        created_at TEXT NOT NULL,
        deleted_at TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS events (
        event_id TEXT PRIMARY KEY,
        timestamp TEXT NOT NULL,
        event_type TEXT NOT NULL REFERENCES event_types(type),
        entity_id TEXT REFERENCES entities(id),
        component_id TEXT,
        actor_id TEXT,
        data TEXT NOT NULL
    )
    "#,
    r#"
    CREATE VIRTUAL TABLE IF NOT EXISTS components_fts USING fts5(
        component_id UNINDEXED,
        entity_id UNINDEXED,
        component_type UNINDEXED,
        content
    )
    "#,
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_entities_active_name ON entities(name) WHERE deleted_at IS NULL",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_components_active_entity_type ON components(entity_id, component_type) WHERE deleted_at IS NULL",
    "CREATE INDEX IF NOT EXISTS idx_components_active_type ON components(component_type) WHERE deleted_at IS NULL",
    "CREATE INDEX IF NOT EXISTS idx_relationships_active_from ON relationships(from_entity, relationship_type) WHERE deleted_at IS NULL",
    "CREATE INDEX IF NOT EXISTS idx_relationships_active_to ON relationships(to_entity, relationship_type) WHERE deleted_at IS NULL",
    "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
    "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_id)",
    "CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type)",
];

fn type_table(kind: RegistryKind) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            type TEXT PRIMARY KEY,
            description TEXT NOT NULL,
            schema_version TEXT,
            module TEXT NOT NULL,
            category TEXT,
            created_at TEXT NOT NULL
        )
        "#,
        kind.table_name()
    )
}

/// Create every table and index a world needs
pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let mut conn = pool.acquire().await?;

    for kind in RegistryKind::ALL {
        sqlx::query(&type_table(kind)).execute(&mut *conn).await?;
    }
    for statement in RECORD_TABLES.iter().chain(INDEXES) {
        sqlx::query(statement).execute(&mut *conn).await?;
    }

    debug!("World schema ready");
    Ok(())
}
