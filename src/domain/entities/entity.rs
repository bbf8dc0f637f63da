//! Entity record - The identity anchor every fact hangs from

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::EntityId;

/// Something that exists in the world
///
/// An entity carries no domain data of its own. Everything meaningful about it
/// lives in components. Entities are soft-deleted and can be restored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    /// Actor that performed the soft delete
    pub deleted_by: Option<String>,
}

impl Entity {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::new(),
            name: name.into(),
            created_at: now,
            modified_at: now,
            deleted_at: None,
            deleted_by: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}
