//! Built-in world modules
//!
//! `core` is loaded by the engine into every world. `core_components` is the
//! standard set of spatial and identity types most worlds start from.

mod core_events;
mod core_components;

pub use self::core_events::{CoreModule, CORE_MODULE};
pub use self::core_components::{CoreComponentsModule, CORE_COMPONENTS_MODULE};
