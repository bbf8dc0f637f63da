//! Type Registry - The single authority on which types exist
//!
//! One registry is built per world. Modules populate it at load time through a
//! [`ModuleRegistrar`]; after that every validation path asks it whether a
//! component, relationship, event or roll type is known. Registrations are
//! never mutated or removed, and a duplicate name within a kind is an error.

use std::collections::BTreeMap;
use std::ops::Deref;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::domain::entities::{RegistryKind, TypeRegistration};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("{kind} type '{name}' is already registered by module '{existing_module}'")]
    DuplicateType {
        kind: RegistryKind,
        name: String,
        existing_module: String,
    },
    #[error("{kind} type name cannot be empty")]
    EmptyName { kind: RegistryKind },
}

/// Version of a module that finished registering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedModule {
    pub name: String,
    pub version: String,
}

/// Registered types for one world, one namespace per [`RegistryKind`]
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: BTreeMap<RegistryKind, BTreeMap<String, TypeRegistration>>,
    modules: BTreeMap<String, LoadedModule>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a registration, rejecting a name already taken within its kind
    pub fn register(&mut self, registration: TypeRegistration) -> Result<(), RegistryError> {
        let kind = registration.kind;
        if registration.type_name.trim().is_empty() {
            return Err(RegistryError::EmptyName { kind });
        }

        let namespace = self.types.entry(kind).or_default();
        if let Some(existing) = namespace.get(&registration.type_name) {
            return Err(RegistryError::DuplicateType {
                kind,
                name: registration.type_name,
                existing_module: existing.owning_module.clone(),
            });
        }

        debug!(
            kind = %kind,
            type_name = %registration.type_name,
            module = %registration.owning_module,
            "Registered type"
        );
        namespace.insert(registration.type_name.clone(), registration);
        Ok(())
    }

    pub fn exists(&self, kind: RegistryKind, name: &str) -> bool {
        self.get(kind, name).is_some()
    }

    pub fn get(&self, kind: RegistryKind, name: &str) -> Option<&TypeRegistration> {
        self.types.get(&kind).and_then(|namespace| namespace.get(name))
    }

    /// All registrations of a kind, ordered by name
    pub fn list(&self, kind: RegistryKind) -> Vec<&TypeRegistration> {
        self.types
            .get(&kind)
            .map(|namespace| namespace.values().collect())
            .unwrap_or_default()
    }

    pub fn count(&self, kind: RegistryKind) -> usize {
        self.types.get(&kind).map(BTreeMap::len).unwrap_or(0)
    }

    /// Everything a module registered, across kinds
    pub fn registered_by(&self, module: &str) -> Vec<&TypeRegistration> {
        self.types
            .values()
            .flat_map(BTreeMap::values)
            .filter(|registration| registration.owning_module == module)
            .collect()
    }

    pub fn is_module_loaded(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn loaded_modules(&self) -> impl Iterator<Item = &LoadedModule> {
        self.modules.values()
    }

    pub(crate) fn mark_module_loaded(&mut self, name: &str, version: &str) {
        self.modules.insert(
            name.to_string(),
            LoadedModule {
                name: name.to_string(),
                version: version.to_string(),
            },
        );
    }
}

/// Registry handle given to a module while it registers
///
/// Every registration made through it is stamped with the module's name.
/// Reads go straight through to the registry so a module can check that its
/// dependencies' types exist.
pub struct ModuleRegistrar<'a> {
    registry: &'a mut TypeRegistry,
    module: String,
}

impl<'a> ModuleRegistrar<'a> {
    pub fn new(registry: &'a mut TypeRegistry, module: impl Into<String>) -> Self {
        Self {
            registry,
            module: module.into(),
        }
    }

    pub fn register(&mut self, registration: TypeRegistration) -> Result<(), RegistryError> {
        self.registry
            .register(registration.owned_by(self.module.clone()))
    }

    pub fn component(
        &mut self,
        name: &str,
        description: &str,
        schema: Option<Value>,
    ) -> Result<(), RegistryError> {
        let mut registration = TypeRegistration::component(name, description);
        registration.schema = schema;
        self.register(registration)
    }

    pub fn relationship(&mut self, name: &str, description: &str) -> Result<(), RegistryError> {
        self.register(TypeRegistration::relationship(name, description))
    }

    pub fn event(&mut self, name: &str, description: &str) -> Result<(), RegistryError> {
        self.register(TypeRegistration::event(name, description))
    }

    pub fn roll(
        &mut self,
        name: &str,
        description: &str,
        category: Option<&str>,
    ) -> Result<(), RegistryError> {
        let registration = TypeRegistration::roll(name, description);
        self.register(match category {
            Some(category) => registration.with_category(category),
            None => registration,
        })
    }
}

impl Deref for ModuleRegistrar<'_> {
    type Target = TypeRegistry;

    fn deref(&self) -> &Self::Target {
        self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_duplicate_type_is_rejected_with_owner() {
        let mut registry = TypeRegistry::new();
        ModuleRegistrar::new(&mut registry, "core_components")
            .component("Position", "Where it is", None)
            .unwrap();

        let err = ModuleRegistrar::new(&mut registry, "rpg")
            .component("Position", "Shadowing attempt", None)
            .unwrap_err();

        assert_eq!(
            err,
            RegistryError::DuplicateType {
                kind: RegistryKind::Component,
                name: "Position".to_string(),
                existing_module: "core_components".to_string(),
            }
        );
    }

    #[test]
    fn test_kinds_are_independent_namespaces() {
        let mut registry = TypeRegistry::new();
        let mut registrar = ModuleRegistrar::new(&mut registry, "test");
        registrar.component("attack", "An attack component", None).unwrap();
        registrar.roll("attack", "An attack roll", None).unwrap();

        assert!(registry.exists(RegistryKind::Component, "attack"));
        assert!(registry.exists(RegistryKind::Roll, "attack"));
        assert!(!registry.exists(RegistryKind::Event, "attack"));
    }

    #[test]
    fn test_list_is_ordered_by_name() {
        let mut registry = TypeRegistry::new();
        let mut registrar = ModuleRegistrar::new(&mut registry, "test");
        for name in ["Zeta", "Alpha", "Mid"] {
            registrar
                .component(name, "", Some(json!({"type": "object"})))
                .unwrap();
        }

        let names: Vec<_> = registry
            .list(RegistryKind::Component)
            .into_iter()
            .map(|r| r.type_name.as_str())
            .collect();
        assert_eq!(names, vec!["Alpha", "Mid", "Zeta"]);
    }

    #[test]
    fn test_registrar_stamps_owner_and_reads_through() {
        let mut registry = TypeRegistry::new();
        let mut registrar = ModuleRegistrar::new(&mut registry, "spells");
        registrar.roll("fireball", "Fire damage", Some("magic")).unwrap();
        assert!(registrar.exists(RegistryKind::Roll, "fireball"));

        let fireball = registry.get(RegistryKind::Roll, "fireball").unwrap();
        assert_eq!(fireball.owning_module, "spells");
        assert_eq!(fireball.category.as_deref(), Some("magic"));
        assert_eq!(registry.registered_by("spells").len(), 1);
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let mut registry = TypeRegistry::new();
        let err = registry
            .register(TypeRegistration::event("  ", "blank"))
            .unwrap_err();
        assert_eq!(err, RegistryError::EmptyName { kind: RegistryKind::Event });
    }
}
