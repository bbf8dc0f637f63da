//! Event handler port - What the event bus calls when an event is published

use crate::domain::events::WorldEvent;

/// A subscriber to world events
///
/// Handlers run synchronously inside `publish`. A returned error is logged by
/// the bus and never reaches the publisher.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &WorldEvent) -> anyhow::Result<()>;
}

impl<F> EventHandler for F
where
    F: Fn(&WorldEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn handle(&self, event: &WorldEvent) -> anyhow::Result<()> {
        self(event)
    }
}
