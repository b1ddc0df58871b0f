//! Event bus and connection envelopes
//!
//! Listeners subscribe to an [`EventKind`]; publishing an event runs every
//! listener for that kind, one after another, in the order they subscribed.

use async_trait::async_trait;
use dashmap::DashMap;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, trace};

pub mod event;
pub mod message;
pub mod transport;

pub use event::{Event, EventKind};
pub use message::{ChatMessage, ClientMessage, ContextType, InitMessage, ProtocolError, ServerMessage};
pub use transport::{ClientEnd, ClientSender, Outbound, ServerReceiver, Transport};

/// Error a listener may return; logged by the bus, never propagated
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Event callback
#[async_trait]
pub trait EventListener: Send + Sync {
    async fn on_event(&self, event: &mut Event) -> Result<(), ListenerError>;

    /// Name used in logs
    fn name(&self) -> &str {
        "listener"
    }
}

/// Adapter for synchronous closures
struct FnListener<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F> EventListener for FnListener<F>
where
    F: Fn(&mut Event) -> Result<(), ListenerError> + Send + Sync,
{
    async fn on_event(&self, event: &mut Event) -> Result<(), ListenerError> {
        (self.f)(event)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

type ListenerList = Vec<Arc<dyn EventListener>>;

/// Per-kind ordered listener lists
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<DashMap<EventKind, ListenerList>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener for `kind`. Duplicates are kept.
    pub fn subscribe(&self, kind: EventKind, listener: Arc<dyn EventListener>) {
        trace!("◆ SUBSCRIBE {} -> {}", kind, listener.name());
        self.listeners.entry(kind).or_default().push(listener);
    }

    /// Append a synchronous closure listener
    pub fn subscribe_fn<F>(&self, kind: EventKind, name: impl Into<String>, f: F)
    where
        F: Fn(&mut Event) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.subscribe(
            kind,
            Arc::new(FnListener {
                name: name.into(),
                f,
            }),
        );
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.get(&kind).map(|l| l.len()).unwrap_or(0)
    }

    /// Dispatch to each listener in turn and return the event.
    ///
    /// A stopped (stoppable) event halts dispatch; a failing or panicking
    /// listener is logged and the rest still run.
    pub async fn publish(&self, mut event: Event) -> Event {
        let listeners: ListenerList = self
            .listeners
            .get(&event.kind)
            .map(|l| l.clone())
            .unwrap_or_default();

        trace!("◆ PUBLISH {} to {} listener(s)", event.kind, listeners.len());

        for listener in listeners {
            if event.is_stoppable() && event.is_stopped() {
                trace!("◆ {} stopped before {}", event.kind, listener.name());
                break;
            }
            match AssertUnwindSafe(listener.on_event(&mut event))
                .catch_unwind()
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(
                    "◆ LISTENER {} FAILED ON {}: {}",
                    listener.name(),
                    event.kind,
                    e
                ),
                Err(panic) => error!(
                    "◆ LISTENER {} PANICKED ON {}: {}",
                    listener.name(),
                    event.kind,
                    panic_message(&*panic)
                ),
            }
        }

        event
    }
}

/// Text of a caught panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("kinds", &self.listeners.len())
            .finish()
    }
}
