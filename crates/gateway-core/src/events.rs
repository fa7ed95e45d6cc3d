//! Event system shared by every gateway component.
//!
//! Health Check publishes into the Stats Cache and the Failover Buffer
//! without either depending on the other — spec §9 "Cyclic references" —
//! by emitting through this listener trait instead of holding a direct
//! reference to its consumers.

#[cfg(feature = "tracing")]
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// An event emitted by a gateway component.
pub trait GatewayEvent: Send + Sync + fmt::Debug {
    /// e.g. "tablet_added", "health_update", "buffer_released".
    fn event_type(&self) -> &'static str;

    fn timestamp(&self) -> Instant;
}

/// Listens for events of a particular type.
pub trait EventListener<E: GatewayEvent>: Send + Sync {
    fn on_event(&self, event: &E);
}

pub type BoxedEventListener<E> = Arc<dyn EventListener<E>>;

/// A collection of listeners for one event type.
#[derive(Clone)]
pub struct EventListeners<E: GatewayEvent> {
    listeners: Vec<BoxedEventListener<E>>,
}

impl<E: GatewayEvent> EventListeners<E> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Emit an event to every registered listener. A panicking listener is
    /// caught so the rest still run.
    pub fn emit(&self, event: &E) {
        for (index, listener) in self.listeners.iter().enumerate() {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event);
            }));

            if let Err(_panic_payload) = result {
                #[cfg(feature = "tracing")]
                log_listener_panic(index, event, _panic_payload.as_ref());

                #[cfg(not(feature = "tracing"))]
                let _ = index;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}

impl<E: GatewayEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps a plain closure as a listener.
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _phantom: std::marker::PhantomData<E>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: GatewayEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}

#[cfg(feature = "tracing")]
fn log_listener_panic<E: GatewayEvent>(index: usize, event: &E, panic_payload: &(dyn Any + Send)) {
    let panic_message = panic_payload
        .downcast_ref::<&'static str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic_payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());

    tracing::warn!(
        listener_index = index,
        event_type = event.event_type(),
        panic_message = %panic_message,
        "gateway event listener panicked"
    );
}
