//! Engine errors and the closed set of result codes collaborators see

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::services::module_loader::ModuleLoadError;
use super::services::spatial_resolver::SpatialError;
use super::services::type_registry::RegistryError;
use crate::domain::entities::RegistryKind;
use crate::domain::services::SchemaViolation;
use crate::domain::value_objects::{ComponentId, EntityId, RelationshipId};

/// Every failure maps onto exactly one of these
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    NotFound,
    DuplicateType,
    DuplicateComponent,
    ValidationFailed,
    InvalidParent,
    CircularReference,
    RegionFull,
    CircularDependency,
    MissingDependency,
    VersionConflict,
    StorageError,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Entity {0} not found")]
    EntityNotFound(EntityId),
    #[error("Entity {0} is deleted")]
    EntityDeleted(EntityId),
    #[error("Entity {entity_id} has no active '{component_type}' component")]
    ComponentNotFound {
        entity_id: EntityId,
        component_type: String,
    },
    #[error("Component {0} not found")]
    ComponentRecordNotFound(ComponentId),
    #[error("Relationship {0} not found")]
    RelationshipNotFound(RelationshipId),
    #[error("{kind} type '{name}' is not registered")]
    UnregisteredType { kind: RegistryKind, name: String },
    #[error("Entity {entity_id} already has an active '{component_type}' component")]
    DuplicateComponent {
        entity_id: EntityId,
        component_type: String,
    },
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("'{component_type}' payload rejected at {}", violation)]
    Schema {
        component_type: String,
        #[source]
        violation: SchemaViolation,
    },
    #[error("Component {component_id} is at version {actual}, expected {expected}")]
    VersionConflict {
        component_id: ComponentId,
        expected: i64,
        actual: i64,
    },
    /// Carries the code of the failure that aborted the batch
    #[error("Transaction was aborted by an earlier {cause} failure")]
    TransactionAborted { cause: ErrorCode },
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Spatial(#[from] SpatialError),
    #[error(transparent)]
    Module(#[from] ModuleLoadError),
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::EntityNotFound(_)
            | EngineError::EntityDeleted(_)
            | EngineError::ComponentNotFound { .. }
            | EngineError::ComponentRecordNotFound(_)
            | EngineError::RelationshipNotFound(_) => ErrorCode::NotFound,
            EngineError::UnregisteredType { .. }
            | EngineError::Validation(_)
            | EngineError::Schema { .. } => ErrorCode::ValidationFailed,
            EngineError::DuplicateComponent { .. } => ErrorCode::DuplicateComponent,
            EngineError::VersionConflict { .. } => ErrorCode::VersionConflict,
            EngineError::Registry(err) => registry_code(err),
            EngineError::Spatial(err) => match err {
                SpatialError::InvalidParent { .. } => ErrorCode::InvalidParent,
                SpatialError::CircularReference { .. } => ErrorCode::CircularReference,
                SpatialError::RegionFull { .. } => ErrorCode::RegionFull,
            },
            EngineError::Module(err) => match err {
                ModuleLoadError::CircularDependency { .. } => ErrorCode::CircularDependency,
                ModuleLoadError::MissingDependency { .. } => ErrorCode::MissingDependency,
                ModuleLoadError::DuplicateModule(_) => ErrorCode::ValidationFailed,
                ModuleLoadError::Registration { source, .. } => registry_code(source),
            },
            EngineError::TransactionAborted { cause } => *cause,
            EngineError::Storage(_)
            | EngineError::Serialization(_) => ErrorCode::StorageError,
        }
    }
}

fn registry_code(err: &RegistryError) -> ErrorCode {
    match err {
        RegistryError::DuplicateType { .. } => ErrorCode::DuplicateType,
        RegistryError::EmptyName { .. } => ErrorCode::ValidationFailed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_for_nested_errors() {
        let cycle = EngineError::from(ModuleLoadError::CircularDependency {
            cycle: vec!["A".into(), "B".into(), "A".into()],
        });
        assert_eq!(cycle.code(), ErrorCode::CircularDependency);
        assert_eq!(cycle.to_string(), "Circular module dependency: A -> B -> A");

        let duplicate = EngineError::from(ModuleLoadError::Registration {
            module: "rpg".into(),
            source: RegistryError::DuplicateType {
                kind: RegistryKind::Component,
                name: "Position".into(),
                existing_module: "core_components".into(),
            },
        });
        assert_eq!(duplicate.code(), ErrorCode::DuplicateType);

        let deleted = EngineError::EntityDeleted(EntityId::new());
        assert_eq!(deleted.code(), ErrorCode::NotFound);

        let storage = EngineError::from(sqlx::Error::PoolClosed);
        assert_eq!(storage.code(), ErrorCode::StorageError);
    }

    #[test]
    fn test_aborted_transaction_keeps_original_code() {
        let err = EngineError::TransactionAborted {
            cause: ErrorCode::RegionFull,
        };
        assert_eq!(err.code(), ErrorCode::RegionFull);
        assert!(err.to_string().contains("RegionFull"));
    }
}
