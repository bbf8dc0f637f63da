//! Domain layer - World records and pure logic with no storage dependencies
//!
//! This layer contains:
//! - Entities: Entity, Component, Relationship, TypeRegistration
//! - Value Objects: typed ids, region references, positions
//! - Domain Events: the append-only world event record
//! - Domain Services: schema checking and event replay

pub mod entities;
pub mod events;
pub mod services;
pub mod value_objects;
