//! Application services - The world-state core
//!
//! Leaf-first: the type registry answers which types exist, the module loader
//! fills it in dependency order, the event bus persists and fans out events,
//! the spatial resolver guards region hierarchies, and the state engine ties
//! them together as the single mutation surface.

pub mod event_bus;
pub mod module_loader;
pub mod spatial_resolver;
pub mod state_engine;
pub mod type_registry;
pub mod world_transaction;

pub use event_bus::{EventBus, SubscriptionId, ALL_EVENTS};
pub use module_loader::{LoadReport, ModuleDescriptor, ModuleLoadError, ModuleLoader, WorldModule};
pub use spatial_resolver::{
    RegionOccupancy, SpatialError, SpatialResolver, CONTAINER_COMPONENT, POSITION_COMPONENT,
};
pub use state_engine::{SharedWorld, StateEngine};
pub use type_registry::{LoadedModule, ModuleRegistrar, RegistryError, TypeRegistry};
pub use world_transaction::WorldTransaction;
