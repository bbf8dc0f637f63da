//! Application layer - World services built on the domain model
//!
//! This layer contains:
//! - Services: registry, module loader, event bus, spatial resolver, engine
//! - Ports: interfaces collaborators implement
//! - DTOs: structured results for callers across a boundary
//! - Errors: the engine error type and its result codes

pub mod dto;
pub mod error;
pub mod ports;
pub mod services;
