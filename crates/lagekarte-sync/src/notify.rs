//! Change notification fan-out for the UI layer.
//!
//! Listeners are invoked synchronously, in registration order, every time the
//! local entity store changes, whether through a local save or an applied
//! remote message. A listener that fails or panics is logged and skipped;
//! later listeners still run.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use lagekarte_store::StoreChange;
use serde_json::Value;
use tracing::error;

/// Where a change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Made through this instance's controller.
    Local,
    /// Applied from a message received over the network.
    Remote,
}

/// One store change delivered to listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncEvent {
    /// Where the change came from.
    pub origin: Origin,
    /// What changed.
    pub change: StoreChange,
}

impl SyncEvent {
    /// A change made locally.
    pub const fn local(change: StoreChange) -> Self {
        Self {
            origin: Origin::Local,
            change,
        }
    }

    /// A change applied from the network.
    pub const fn remote(change: StoreChange) -> Self {
        Self {
            origin: Origin::Remote,
            change,
        }
    }

    /// Event type name (`station_update`, `full_sync`, ...).
    pub const fn event_type(&self) -> &'static str {
        self.change.event_type()
    }

    /// The changed entity (or id) as JSON.
    pub fn payload(&self) -> Value {
        let value = match &self.change {
            StoreChange::StationUpdated(station) => serde_json::to_value(station),
            StoreChange::StationDeleted(id) => serde_json::to_value(id),
            StoreChange::VehicleUpdated(vehicle) | StoreChange::VehicleMoved(vehicle) => {
                serde_json::to_value(vehicle)
            }
            StoreChange::VehicleDeleted(id) => serde_json::to_value(id),
            StoreChange::FullSync(state) => serde_json::to_value(state),
        };
        value.unwrap_or(Value::Null)
    }
}

/// Handle returned by [`Notifier::add_listener`], used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = dyn Fn(&SyncEvent) -> anyhow::Result<()> + Send + Sync;

/// Ordered set of change listeners.
#[derive(Default)]
pub struct Notifier {
    listeners: Mutex<Vec<(ListenerId, Arc<Listener>)>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("listeners", &self.len())
            .finish_non_exhaustive()
    }
}

impl Notifier {
    /// Create a notifier with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. It runs after every listener registered before
    /// it.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&SyncEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let listener: Arc<Listener> = Arc::new(listener);
        self.lock().push((id, listener));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Deliver `event` to every listener in registration order.
    ///
    /// The listener list is copied before delivery, so a listener may add or
    /// remove listeners without deadlocking; such changes take effect from
    /// the next event.
    pub fn notify(&self, event: &SyncEvent) {
        let listeners: Vec<(ListenerId, Arc<Listener>)> = self.lock().clone();
        for (id, listener) in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(listener = id.0, event = event.event_type(), error = %e, "Listener failed");
                }
                Err(_) => {
                    error!(listener = id.0, event = event.event_type(), "Listener panicked");
                }
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(ListenerId, Arc<Listener>)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use lagekarte_types::{Station, StationId};

    use super::*;

    fn station_event() -> SyncEvent {
        let mut station = Station::new("FW Ost", 51.0, 12.0);
        station.id = StationId::from("s1");
        SyncEvent::local(StoreChange::StationUpdated(station))
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let notifier = Notifier::new();
        let calls = Arc::new(Mutex::new(Vec::new()));
        for n in 0..3 {
            let calls = Arc::clone(&calls);
            notifier.add_listener(move |_| {
                calls.lock().unwrap().push(n);
                Ok(())
            });
        }
        notifier.notify(&station_event());
        assert_eq!(*calls.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    #[allow(clippy::panic)]
    fn failing_and_panicking_listeners_do_not_stop_delivery() {
        let notifier = Notifier::new();
        let reached = Arc::new(AtomicU64::new(0));

        notifier.add_listener(|_| Err(anyhow::anyhow!("render failed")));
        notifier.add_listener(|_| panic!("listener bug"));
        let counter = Arc::clone(&reached);
        notifier.add_listener(move |event| {
            assert_eq!(event.event_type(), "station_update");
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        notifier.notify(&station_event());
        notifier.notify(&station_event());
        assert_eq!(reached.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn removed_listener_is_not_called() {
        let notifier = Notifier::new();
        let reached = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&reached);
        let id = notifier.add_listener(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(notifier.remove_listener(id));
        assert!(!notifier.remove_listener(id));
        notifier.notify(&station_event());
        assert_eq!(reached.load(Ordering::SeqCst), 0);
        assert!(notifier.is_empty());
    }

    #[test]
    fn payload_carries_the_entity() {
        let event = station_event();
        let payload = event.payload();
        assert_eq!(payload["id"], "s1");
        assert_eq!(payload["name"], "FW Ost");
        assert_eq!(event.origin, Origin::Local);
    }
}
