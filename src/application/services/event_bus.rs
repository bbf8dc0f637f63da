//! Event Bus - Persist-then-notify publish/subscribe for world events
//!
//! An event is appended to the log before any subscriber sees it. Subscribers
//! for a type run in registration order, followed by the catch-all
//! subscribers. A subscriber that errors or panics is logged and skipped; the
//! publisher and the remaining subscribers are unaffected.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use sqlx::SqliteConnection;
use tracing::{debug, error, instrument};

use crate::application::error::EngineError;
use crate::application::ports::outbound::EventHandler;
use crate::domain::events::WorldEvent;
use crate::infrastructure::persistence::SqliteRecordStore;

/// Subscribe under this type to receive every event
pub const ALL_EVENTS: &str = "*";

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    handler: Arc<dyn EventHandler>,
}

pub struct EventBus {
    store: SqliteRecordStore,
    subscriptions: RwLock<HashMap<String, Vec<Subscription>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new(store: SqliteRecordStore) -> Self {
        Self {
            store,
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe<H>(&self, event_type: &str, handler: H) -> SubscriptionId
    where
        H: EventHandler + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event_type.to_string())
            .or_default()
            .push(Subscription {
                id,
                handler: Arc::new(handler),
            });
        debug!(event_type = %event_type, subscription = id.0, "Subscribed");
        id
    }

    /// Returns whether the subscription existed
    pub fn unsubscribe(&self, event_type: &str, id: SubscriptionId) -> bool {
        let mut subscriptions = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(handlers) = subscriptions.get_mut(event_type) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|subscription| subscription.id != id);
        let removed = handlers.len() < before;
        if handlers.is_empty() {
            subscriptions.remove(event_type);
        }
        removed
    }

    /// Persist an event in its own transaction, then notify subscribers
    #[instrument(skip(self, event), fields(event_type = %event.event_type, event_id = %event.id))]
    pub async fn publish(&self, event: WorldEvent) -> Result<WorldEvent, EngineError> {
        let mut tx = self.store.begin().await?;
        self.stage(&mut tx, &event).await?;
        tx.commit().await?;
        self.dispatch(&event);
        Ok(event)
    }

    /// Append an event inside a caller-owned transaction without notifying
    ///
    /// The caller dispatches once its transaction has committed.
    pub async fn stage(&self, conn: &mut SqliteConnection, event: &WorldEvent) -> Result<(), sqlx::Error> {
        self.store.events().append(conn, event).await
    }

    /// Notify subscribers of an already persisted event
    ///
    /// Returns how many subscribers failed.
    pub fn dispatch(&self, event: &WorldEvent) -> usize {
        let handlers: Vec<(SubscriptionId, Arc<dyn EventHandler>)> = {
            let subscriptions = self
                .subscriptions
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            [event.event_type.as_str(), ALL_EVENTS]
                .iter()
                .filter_map(|key| subscriptions.get(*key))
                .flatten()
                .map(|subscription| (subscription.id, Arc::clone(&subscription.handler)))
                .collect()
        };

        let mut failures = 0;
        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler.handle(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    error!(
                        event_type = %event.event_type,
                        subscription = id.0,
                        "Event subscriber failed: {:#}",
                        e
                    );
                }
                Err(_) => {
                    failures += 1;
                    error!(
                        event_type = %event.event_type,
                        subscription = id.0,
                        "Event subscriber panicked"
                    );
                }
            }
        }
        failures
    }

    /// Drop subscribers for one type, or all of them
    pub fn clear_listeners(&self, event_type: Option<&str>) {
        let mut subscriptions = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match event_type {
            Some(event_type) => {
                subscriptions.remove(event_type);
            }
            None => subscriptions.clear(),
        }
    }

    pub fn listener_count(&self, event_type: Option<&str>) -> usize {
        let subscriptions = self
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match event_type {
            Some(event_type) => subscriptions.get(event_type).map(Vec::len).unwrap_or(0),
            None => subscriptions.values().map(Vec::len).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::TypeRegistration;
    use crate::domain::events::EventFilter;
    use serde_json::json;
    use std::sync::Mutex;

    async fn bus() -> EventBus {
        let store = SqliteRecordStore::connect("sqlite::memory:", 1).await.unwrap();
        let mut conn = store.pool().acquire().await.unwrap();
        store
            .types()
            .insert_if_absent(&mut conn, &TypeRegistration::event("door.opened", "").owned_by("test"))
            .await
            .unwrap();
        EventBus::new(store)
    }

    #[tokio::test]
    async fn test_publish_persists_then_notifies_in_order() {
        let bus = bus().await;
        let seen = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second"] {
            let seen = Arc::clone(&seen);
            bus.subscribe("door.opened", move |_: &WorldEvent| -> anyhow::Result<()> {
                seen.lock().unwrap().push(label);
                Ok(())
            });
        }
        let all = Arc::clone(&seen);
        bus.subscribe(ALL_EVENTS, move |_: &WorldEvent| -> anyhow::Result<()> {
            all.lock().unwrap().push("catch-all");
            Ok(())
        });

        let event = bus.publish(WorldEvent::new("door.opened", json!({}))).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "catch-all"]);

        let mut conn = bus.store.pool().acquire().await.unwrap();
        let stored = bus
            .store
            .events()
            .query(&mut conn, &EventFilter::default(), 10)
            .await
            .unwrap();
        assert_eq!(stored, vec![event]);
    }

    #[tokio::test]
    async fn test_failing_subscribers_are_isolated() {
        let bus = bus().await;
        let reached = Arc::new(Mutex::new(false));

        bus.subscribe("door.opened", |_: &WorldEvent| -> anyhow::Result<()> { anyhow::bail!("handler broke") });
        bus.subscribe("door.opened", |_: &WorldEvent| -> anyhow::Result<()> {
            panic!("handler exploded")
        });
        let flag = Arc::clone(&reached);
        bus.subscribe("door.opened", move |_: &WorldEvent| -> anyhow::Result<()> {
            *flag.lock().unwrap() = true;
            Ok(())
        });

        let result = bus.publish(WorldEvent::new("door.opened", json!({}))).await;
        assert!(result.is_ok());
        assert!(*reached.lock().unwrap());

        let failures = bus.dispatch(&WorldEvent::new("door.opened", json!({})));
        assert_eq!(failures, 2);
    }

    #[tokio::test]
    async fn test_unsubscribe_and_listener_management() {
        let bus = bus().await;
        let a = bus.subscribe("door.opened", |_: &WorldEvent| -> anyhow::Result<()> { Ok(()) });
        bus.subscribe("door.opened", |_: &WorldEvent| -> anyhow::Result<()> { Ok(()) });
        bus.subscribe("door.closed", |_: &WorldEvent| -> anyhow::Result<()> { Ok(()) });
        assert_eq!(bus.listener_count(None), 3);

        assert!(bus.unsubscribe("door.opened", a));
        assert!(!bus.unsubscribe("door.opened", a));
        assert_eq!(bus.listener_count(Some("door.opened")), 1);

        bus.clear_listeners(Some("door.closed"));
        assert_eq!(bus.listener_count(Some("door.closed")), 0);
        bus.clear_listeners(None);
        assert_eq!(bus.listener_count(None), 0);
    }

    #[tokio::test]
    async fn test_unregistered_event_type_is_not_stored() {
        let bus = bus().await;
        let called = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&called);
        bus.subscribe(ALL_EVENTS, move |_: &WorldEvent| -> anyhow::Result<()> {
            *flag.lock().unwrap() = true;
            Ok(())
        });

        let result = bus.publish(WorldEvent::new("never.registered", json!({}))).await;
        assert!(result.is_err());
        assert!(!*called.lock().unwrap());
    }
}
