//! Standard component and relationship types
//!
//! - `Identity`: what an entity is, in prose and tags
//! - `Position`: local offset plus the region it is relative to
//! - `Container`: how many entities may occupy this entity as a region
//! - `Location`: marks an entity as a place
//! - `PlayerCharacter`, `NPC`: who is driving an entity
//! - `located_at`, `contains`: the spatial relationship types

use serde_json::json;

use super::core_events::CORE_MODULE;
use crate::application::services::module_loader::WorldModule;
use crate::application::services::spatial_resolver::{CONTAINER_COMPONENT, POSITION_COMPONENT};
use crate::application::services::type_registry::{ModuleRegistrar, RegistryError};
use crate::domain::entities::TypeRegistration;

pub const CORE_COMPONENTS_MODULE: &str = "core_components";

#[derive(Debug, Default, Clone, Copy)]
pub struct CoreComponentsModule;

impl WorldModule for CoreComponentsModule {
    fn name(&self) -> &str {
        CORE_COMPONENTS_MODULE
    }

    fn dependencies(&self) -> Vec<String> {
        vec![CORE_MODULE.to_string()]
    }

    fn register(&self, registrar: &mut ModuleRegistrar<'_>) -> Result<(), RegistryError> {
        let components = [
            (
                "Identity",
                "What an entity is",
                json!({
                    "type": "object",
                    "properties": {
                        "description": {"type": "string", "minLength": 1},
                        "tags": {"type": "array", "items": {"type": "string"}}
                    },
                    "required": ["description"]
                }),
            ),
            (
                POSITION_COMPONENT,
                "Offset within a region, which is a named zone or a parent entity",
                json!({
                    "type": "object",
                    "properties": {
                        "x": {"type": "number"},
                        "y": {"type": "number"},
                        "z": {"type": "number"},
                        "region": {"type": "string"}
                    }
                }),
            ),
            (
                CONTAINER_COMPONENT,
                "Occupancy limit for entities positioned inside this one",
                json!({
                    "type": "object",
                    "properties": {
                        "capacity": {
                            "oneOf": [
                                {"type": "integer", "minimum": 0},
                                {"type": "null"}
                            ]
                        }
                    },
                    "required": ["capacity"],
                    "additionalProperties": false
                }),
            ),
            (
                "Location",
                "Marks an entity as a place",
                json!({
                    "type": "object",
                    "properties": {
                        "region": {"type": "string"},
                        "features": {"type": "array", "items": {"type": "string"}},
                        "visited": {"type": "boolean"}
                    },
                    "required": ["region"]
                }),
            ),
            (
                "PlayerCharacter",
                "Entity controlled by a player",
                json!({
                    "type": "object",
                    "properties": {},
                    "additionalProperties": false
                }),
            ),
            (
                "NPC",
                "Entity controlled by the game master",
                json!({
                    "type": "object",
                    "properties": {
                        "occupation": {"type": "string"},
                        "disposition": {
                            "type": "string",
                            "enum": ["friendly", "neutral", "hostile", "fearful", "admiring"]
                        },
                        "dialogue_state": {"type": "string"},
                        "met_player": {"type": "boolean"}
                    },
                    "required": ["disposition"]
                }),
            ),
        ];

        for (name, description, schema) in components {
            registrar.register(
                TypeRegistration::component(name, description)
                    .with_schema(schema)
                    .with_schema_version("1.0"),
            )?;
        }

        registrar.relationship("located_at", "Entity is physically at a location")?;
        registrar.relationship("contains", "Entity contains another entity")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::module_loader::ModuleLoader;
    use crate::application::services::type_registry::TypeRegistry;
    use crate::domain::entities::RegistryKind;
    use crate::domain::services::schema::validate;
    use crate::modules::CoreModule;
    use std::sync::Arc;

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        let modules: Vec<Arc<dyn WorldModule>> =
            vec![Arc::new(CoreComponentsModule), Arc::new(CoreModule)];
        ModuleLoader::load(&mut registry, &modules).unwrap();
        registry
    }

    #[test]
    fn test_registers_standard_types_after_core() {
        let registry = registry();
        assert_eq!(registry.count(RegistryKind::Component), 6);
        assert_eq!(registry.count(RegistryKind::Event), 12);
        assert!(registry.exists(RegistryKind::Relationship, "located_at"));
        assert!(registry.exists(RegistryKind::Relationship, "contains"));
        assert_eq!(
            registry.get(RegistryKind::Component, "NPC").unwrap().owning_module,
            CORE_COMPONENTS_MODULE
        );
    }

    #[test]
    fn test_container_schema_accepts_null_and_counts() {
        let registry = registry();
        let schema = registry
            .get(RegistryKind::Component, CONTAINER_COMPONENT)
            .and_then(|r| r.schema.clone())
            .unwrap();
        assert!(validate(&schema, &json!({"capacity": null})).is_ok());
        assert!(validate(&schema, &json!({"capacity": 4})).is_ok());
        assert!(validate(&schema, &json!({"capacity": -2})).is_err());
        assert!(validate(&schema, &json!({})).is_err());
    }

    #[test]
    fn test_npc_disposition_is_constrained() {
        let registry = registry();
        let schema = registry
            .get(RegistryKind::Component, "NPC")
            .and_then(|r| r.schema.clone())
            .unwrap();
        assert!(validate(&schema, &json!({"disposition": "hostile"})).is_ok());
        assert!(validate(&schema, &json!({"disposition": "smug"})).is_err());
    }
}
