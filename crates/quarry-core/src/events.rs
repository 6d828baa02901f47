//! In-process event fan-out.
//!
//! Pattern crates (breaker, queue, health monitor) define their own event
//! enums and publish them through [`EventListeners`]. Subscribers are
//! external; the core makes no assumptions about what they do.

use std::fmt;
use std::sync::Arc;

/// Trait for events emitted by quarry components.
pub trait ComponentEvent: Send + Sync + fmt::Debug {
    /// Short machine-readable kind, e.g. `"state_transition"`.
    fn event_type(&self) -> &'static str;

    /// The component instance that emitted this event, e.g. an account
    /// name or a queue path.
    fn component(&self) -> &str;
}

/// Trait for listening to component events.
pub trait EventListener<E: ComponentEvent>: Send + Sync {
    fn on_event(&self, event: &E);
}

/// A collection of event listeners.
#[derive(Clone)]
pub struct EventListeners<E: ComponentEvent> {
    listeners: Vec<Arc<dyn EventListener<E>>>,
}

impl<E: ComponentEvent> EventListeners<E> {
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

    /// Emits an event to all registered listeners.
    ///
    /// A panicking listener is isolated: the panic is caught, logged, and
    /// the remaining listeners still run.
    pub fn emit(&self, event: &E) {
        for (index, listener) in self.listeners.iter().enumerate() {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event);
            }));
            if result.is_err() {
                tracing::warn!(
                    listener_index = index,
                    component = event.component(),
                    event_type = event.event_type(),
                    "event listener panicked"
                );
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

impl<E: ComponentEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// A function-based event listener.
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _phantom: std::marker::PhantomData<fn(&E)>,
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
    E: ComponentEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}
