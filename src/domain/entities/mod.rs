//! Domain entities - World records with identity

mod component;
mod entity;
mod relationship;
mod type_registration;

pub use component::{Component, INITIAL_VERSION};
pub use entity::Entity;
pub use relationship::{Direction, Relationship};
pub use type_registration::{RegistryKind, TypeRegistration, DEFAULT_ROLL_CATEGORY};
