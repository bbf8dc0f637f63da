//! WorldState Engine - Persistence and consistency core for simulated worlds
//!
//! Worlds are made of entities, typed components attached to them, typed
//! relationships between them and an append-only log of events describing
//! every change. Modules extend the type system at load time; the
//! [`StateEngine`] is the only way to change a world.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod modules;

pub use application::dto::Outcome;
pub use application::error::{EngineError, ErrorCode};
pub use application::services::{
    EventBus, ModuleDescriptor, SharedWorld, StateEngine, TypeRegistry, WorldModule,
    WorldTransaction,
};
pub use infrastructure::config::EngineConfig;
