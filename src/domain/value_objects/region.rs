//! Region value objects
//!
//! A position-bearing component names its region as a plain string. Past the
//! JSON boundary that string is parsed once into a [`RegionRef`]: anything
//! shaped like an entity id is a parent reference, anything else is a named
//! abstract zone.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::EntityId;

/// Field of a position payload naming its region
pub const REGION_FIELD: &str = "region";

/// Where a positioned entity lives
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RegionRef {
    /// A named abstract area ("overworld", "inventory")
    Zone(String),
    /// Positioned relative to another entity
    Entity(EntityId),
}

impl RegionRef {
    /// Parse a raw region string. Empty strings name no region at all.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        Some(match raw.parse::<EntityId>() {
            Ok(id) => RegionRef::Entity(id),
            Err(_) => RegionRef::Zone(raw.to_string()),
        })
    }

    /// Read the region out of a position payload
    pub fn from_position_data(data: &Value) -> Option<Self> {
        data.get(REGION_FIELD)
            .and_then(Value::as_str)
            .and_then(Self::parse)
    }

    /// Rewrite a position payload's region into the form occupancy queries
    /// match on: trimmed zones and lowercase hyphenated entity ids
    pub fn normalize_position_data(data: &mut Value) {
        let Some(region) = Self::from_position_data(data) else {
            return;
        };
        if let Some(object) = data.as_object_mut() {
            object.insert(REGION_FIELD.to_string(), Value::String(region.to_string()));
        }
    }

    pub fn entity_id(&self) -> Option<EntityId> {
        match self {
            RegionRef::Entity(id) => Some(*id),
            RegionRef::Zone(_) => None,
        }
    }
}

impl std::fmt::Display for RegionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegionRef::Zone(name) => write!(f, "{}", name),
            RegionRef::Entity(id) => write!(f, "{}", id),
        }
    }
}

impl std::str::FromStr for RegionRef {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| anyhow::anyhow!("Region cannot be empty"))
    }
}

/// Offset of an entity relative to its region
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalOffset {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl LocalOffset {
    /// Missing coordinates default to zero
    pub fn from_position_data(data: &Value) -> Self {
        let axis = |name: &str| data.get(name).and_then(Value::as_f64).unwrap_or(0.0);
        Self {
            x: axis("x"),
            y: axis("y"),
            z: axis("z"),
        }
    }
}

/// Absolute position after walking the region chain to its root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// The zone the chain ended in, if the root named one
    pub zone: Option<String>,
}

impl WorldPosition {
    pub fn origin() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            zone: None,
        }
    }

    pub fn offset_by(mut self, offset: LocalOffset) -> Self {
        self.x += offset.x;
        self.y += offset.y;
        self.z += offset.z;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_region_parse_distinguishes_zone_and_entity() {
        let id = EntityId::new();
        assert_eq!(RegionRef::parse(&id.to_string()), Some(RegionRef::Entity(id)));
        assert_eq!(
            RegionRef::parse("overworld"),
            Some(RegionRef::Zone("overworld".to_string()))
        );
        assert_eq!(RegionRef::parse("   "), None);
    }

    #[test]
    fn test_normalize_canonicalizes_entity_ids() {
        let id = EntityId::new();
        let canonical = id.to_string();

        for raw in [
            canonical.to_uppercase(),
            canonical.replace('-', ""),
            format!("{{{}}}", canonical),
            format!("  {}  ", canonical),
        ] {
            let mut data = json!({"x": 1, "region": raw});
            RegionRef::normalize_position_data(&mut data);
            assert_eq!(data, json!({"x": 1, "region": canonical}));
        }

        let mut zone = json!({"region": " Overworld "});
        RegionRef::normalize_position_data(&mut zone);
        assert_eq!(zone["region"], json!("Overworld"));

        let mut nowhere = json!({"x": 2});
        RegionRef::normalize_position_data(&mut nowhere);
        assert_eq!(nowhere, json!({"x": 2}));
    }

    #[test]
    fn test_offset_defaults_missing_axes() {
        let offset = LocalOffset::from_position_data(&json!({"x": 5, "y": 2.5}));
        assert_eq!(offset, LocalOffset { x: 5.0, y: 2.5, z: 0.0 });
    }

    #[test]
    fn test_region_from_position_data() {
        let data = json!({"x": 1, "region": "forest"});
        assert_eq!(
            RegionRef::from_position_data(&data),
            Some(RegionRef::Zone("forest".to_string()))
        );
        assert_eq!(RegionRef::from_position_data(&json!({"x": 1})), None);
    }
}
