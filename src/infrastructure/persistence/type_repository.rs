//! Persisted type registrations
//!
//! The registry tables exist so stored records can reference their types.
//! Rows are written once and never updated.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::domain::entities::{RegistryKind, TypeRegistration};

/// A registration as stored on disk
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct StoredType {
    #[sqlx(rename = "type")]
    pub type_name: String,
    pub description: String,
    pub schema_version: Option<String>,
    pub module: String,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Repository for the four type-registry tables
pub struct SqliteTypeRepository;

impl SqliteTypeRepository {
    /// Store a registration unless its name is already present
    ///
    /// Returns whether a row was written.
    pub async fn insert_if_absent(
        &self,
        conn: &mut SqliteConnection,
        registration: &TypeRegistration,
    ) -> Result<bool, sqlx::Error> {
        let statement = format!(
            "INSERT OR IGNORE INTO {} (type, description, schema_version, module, category, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            registration.kind.table_name()
        );
        let result = sqlx::query(&statement)
            .bind(&registration.type_name)
            .bind(&registration.description)
            .bind(&registration.schema_version)
            .bind(&registration.owning_module)
            .bind(&registration.category)
            .bind(registration.created_at)
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list(&self, conn: &mut SqliteConnection, kind: RegistryKind) -> Result<Vec<StoredType>, sqlx::Error> {
        let statement = format!(
            "SELECT type, description, schema_version, module, category, created_at
             FROM {} ORDER BY type",
            kind.table_name()
        );
        sqlx::query_as(&statement).fetch_all(conn).await
    }
}
