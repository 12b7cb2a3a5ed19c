// Render events and the listener registry
//
// The scheduler task and the renderer both emit events here; callers subscribe
// per container key. Listeners run synchronously on the emitting task, so they
// should be quick. Anything heavy belongs behind a channel.

use crate::snapshot::ContainerSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

/// Lifecycle events for one container
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")] // {"type": "update", ...}
pub enum RenderEvent {
    /// `render` finished for the container
    Mounted {
        container_key: String,
        timestamp: DateTime<Utc>,
    },

    /// The container settled back to idle after a dispatch
    Update {
        container_key: String,
        timestamp: DateTime<Utc>,
        snapshot: ContainerSnapshot,
    },

    /// The platform adapter rejected a dispatch
    DispatchFailed {
        container_key: String,
        timestamp: DateTime<Utc>,
        message: String,
    },
}

impl RenderEvent {
    pub fn mounted(container_key: impl Into<String>) -> Self {
        RenderEvent::Mounted {
            container_key: container_key.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn update(snapshot: ContainerSnapshot) -> Self {
        RenderEvent::Update {
            container_key: snapshot.key.clone(),
            timestamp: Utc::now(),
            snapshot,
        }
    }

    pub fn dispatch_failed(container_key: impl Into<String>, error: &anyhow::Error) -> Self {
        RenderEvent::DispatchFailed {
            container_key: container_key.into(),
            timestamp: Utc::now(),
            message: format!("{error:#}"),
        }
    }

    pub fn container_key(&self) -> &str {
        match self {
            RenderEvent::Mounted { container_key, .. }
            | RenderEvent::Update { container_key, .. }
            | RenderEvent::DispatchFailed { container_key, .. } => container_key,
        }
    }
}

pub type Listener = Arc<dyn Fn(&RenderEvent) + Send + Sync>;

/// Outcome delivered to a one-shot waiter
pub type Settlement = Result<ContainerSnapshot, String>;

/// Returned by [`ListenerRegistry::on`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: HashMap<String, Vec<(ListenerId, Listener)>>,
    waiters: HashMap<String, Vec<oneshot::Sender<Settlement>>>,
}

/// Per-container subscriptions, shared between the renderer and scheduler tasks
#[derive(Default)]
pub struct ListenerRegistry {
    inner: Mutex<Registry>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        // A panicking listener never runs under the lock, so the data is intact
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to every event for `container_key`
    pub fn on(
        &self,
        container_key: impl Into<String>,
        listener: impl Fn(&RenderEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        let mut registry = self.lock();
        registry.next_id += 1;
        let id = ListenerId(registry.next_id);
        registry
            .listeners
            .entry(container_key.into())
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a subscription; false if it was already gone
    pub fn off(&self, id: ListenerId) -> bool {
        let mut registry = self.lock();
        let mut removed = false;
        registry.listeners.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|(entry, _)| *entry != id);
            removed |= entries.len() != before;
            !entries.is_empty()
        });
        removed
    }

    /// Register a one-shot waiter for the next settlement of `container_key`
    ///
    /// Resolves with the dispatched snapshot on `Update`, or with the error
    /// message on `DispatchFailed`, whichever comes first.
    pub fn wait(&self, container_key: impl Into<String>) -> oneshot::Receiver<Settlement> {
        let (tx, rx) = oneshot::channel();
        self.lock()
            .waiters
            .entry(container_key.into())
            .or_default()
            .push(tx);
        rx
    }

    /// Drop all pending waiters; their receivers observe a closed channel
    pub fn close_waiters(&self) {
        self.lock().waiters.clear();
    }

    /// Same as [`close_waiters`](Self::close_waiters), for one container
    pub fn close_waiters_for(&self, container_key: &str) {
        self.lock().waiters.remove(container_key);
    }

    pub fn listener_count(&self, container_key: &str) -> usize {
        self.lock()
            .listeners
            .get(container_key)
            .map_or(0, Vec::len)
    }

    /// Deliver an event to waiters, then to listeners
    pub fn emit(&self, event: RenderEvent) {
        let key = event.container_key();
        let (listeners, waiters) = {
            let mut registry = self.lock();
            let waiters = match &event {
                RenderEvent::Mounted { .. } => Vec::new(),
                _ => registry.waiters.remove(key).unwrap_or_default(),
            };
            let listeners: Vec<Listener> = registry
                .listeners
                .get(key)
                .map(|entries| entries.iter().map(|(_, l)| Arc::clone(l)).collect())
                .unwrap_or_default();
            (listeners, waiters)
        };

        for waiter in waiters {
            let settlement = match &event {
                RenderEvent::Update { snapshot, .. } => Ok(snapshot.clone()),
                RenderEvent::DispatchFailed { message, .. } => Err(message.clone()),
                RenderEvent::Mounted { .. } => continue,
            };
            // Receiver may have given up; that's fine
            let _ = waiter.send(settlement);
        }

        tracing::trace!(container = key, listeners = listeners.len(), "emitting render event");
        for listener in listeners {
            listener(&event);
        }
    }
}
