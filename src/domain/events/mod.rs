//! Domain events - Notifications of state changes within the world

pub mod domain_events;

pub use domain_events::{event_types, EventFilter, EventOrder, WorldEvent, SYSTEM_ACTOR};
