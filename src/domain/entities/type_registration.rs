//! Type registrations - Metadata the registry holds for every known type

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Category a roll type falls into when its module names none
pub const DEFAULT_ROLL_CATEGORY: &str = "general";

/// The four independent namespaces of registered types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryKind {
    Component,
    Relationship,
    Event,
    Roll,
}

impl RegistryKind {
    pub const ALL: [RegistryKind; 4] = [
        RegistryKind::Component,
        RegistryKind::Relationship,
        RegistryKind::Event,
        RegistryKind::Roll,
    ];

    /// Backing table for this kind
    pub fn table_name(&self) -> &'static str {
        match self {
            RegistryKind::Component => "component_types",
            RegistryKind::Relationship => "relationship_types",
            RegistryKind::Event => "event_types",
            RegistryKind::Roll => "roll_types",
        }
    }
}

impl std::fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryKind::Component => write!(f, "component"),
            RegistryKind::Relationship => write!(f, "relationship"),
            RegistryKind::Event => write!(f, "event"),
            RegistryKind::Roll => write!(f, "roll"),
        }
    }
}

/// A registered type
///
/// Written once when its module loads, never mutated afterwards. The schema
/// and endpoint requirements live only in memory; modules re-supply them on
/// every open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeRegistration {
    pub kind: RegistryKind,
    pub type_name: String,
    pub description: String,
    pub schema_version: Option<String>,
    /// Module that registered this type
    pub owning_module: String,
    pub category: Option<String>,
    /// JSON schema payloads of this type must satisfy
    pub schema: Option<Value>,
    /// Component types the source of a relationship must carry
    pub from_requires: Vec<String>,
    /// Component types the target of a relationship must carry
    pub to_requires: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl TypeRegistration {
    fn new(kind: RegistryKind, type_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind,
            type_name: type_name.into(),
            description: description.into(),
            schema_version: None,
            owning_module: String::new(),
            category: None,
            schema: None,
            from_requires: Vec::new(),
            to_requires: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn component(type_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(RegistryKind::Component, type_name, description)
    }

    pub fn relationship(type_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(RegistryKind::Relationship, type_name, description)
    }

    pub fn event(type_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(RegistryKind::Event, type_name, description)
    }

    pub fn roll(type_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(RegistryKind::Roll, type_name, description)
            .with_category(DEFAULT_ROLL_CATEGORY)
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_schema_version(mut self, version: impl Into<String>) -> Self {
        self.schema_version = Some(version.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn owned_by(mut self, module: impl Into<String>) -> Self {
        self.owning_module = module.into();
        self
    }

    pub fn requiring_from(mut self, component_type: impl Into<String>) -> Self {
        self.from_requires.push(component_type.into());
        self
    }

    pub fn requiring_to(mut self, component_type: impl Into<String>) -> Self {
        self.to_requires.push(component_type.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roll_types_default_to_general_category() {
        let roll = TypeRegistration::roll("attack", "Attack roll");
        assert_eq!(roll.category.as_deref(), Some(DEFAULT_ROLL_CATEGORY));

        let custom = TypeRegistration::roll("fireball", "Spell damage").with_category("magic");
        assert_eq!(custom.category.as_deref(), Some("magic"));
    }

    #[test]
    fn test_each_kind_has_its_own_table() {
        let tables: std::collections::HashSet<_> =
            RegistryKind::ALL.iter().map(|k| k.table_name()).collect();
        assert_eq!(tables.len(), 4);
    }
}
