//! The engine's own event types

use crate::application::services::module_loader::WorldModule;
use crate::application::services::type_registry::{ModuleRegistrar, RegistryError};
use crate::domain::events::event_types;

pub const CORE_MODULE: &str = "core";

/// Registers every event type the engine emits by itself
#[derive(Debug, Default, Clone, Copy)]
pub struct CoreModule;

impl WorldModule for CoreModule {
    fn name(&self) -> &str {
        CORE_MODULE
    }

    fn register(&self, registrar: &mut ModuleRegistrar<'_>) -> Result<(), RegistryError> {
        for (event_type, description) in event_types::CORE {
            registrar.event(event_type, description)?;
        }
        Ok(())
    }
}
