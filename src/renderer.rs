//! Render orchestrator
//!
//! Public entry point. A [`Renderer`] owns the mutation surface and wires
//! each mounted container to its own update scheduler, the platform adapter,
//! the listener registry and, optionally, a navigator and storage backend.
//!
//! ```text
//! diffing layer ──▶ MutationSurface ──snapshot──▶ UpdateScheduler ──adapt──▶ Adapter
//!                          │                             │
//!                          └────────── events ◀──────────┘──▶ listeners / waiters
//! ```

use crate::adapter::{Adapter, MenuEntry, Navigator};
use crate::builder::BuildError;
use crate::events::{ListenerId, ListenerRegistry, RenderEvent};
use crate::host::{HostError, MutationSurface};
use crate::scheduler::{SchedulerConfig, UpdateScheduler};
use crate::snapshot::ContainerSnapshot;
use crate::storage::StorageBackend;
use crate::tree::{ComponentJson, ContainerId};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Host(#[from] HostError),

    #[error("dispatch failed: {0}")]
    Dispatch(String),

    #[error("platform adapter error: {0:#}")]
    Adapter(anyhow::Error),

    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),

    #[error("no storage backend configured")]
    NoStorage,

    #[error("nothing stored for container `{0}`")]
    NothingStored(String),

    #[error("scheduler for `{0}` stopped before the container settled")]
    SchedulerStopped(String),

    #[error("no component with id `{id}` in container `{container}`")]
    UnknownTarget { container: String, id: String },
}

/// Options for [`Renderer::redirect_to`]
#[derive(Debug, Clone, Copy, Default)]
pub struct RedirectOptions {
    /// Re-render the container after recording the route
    pub should_render: bool,
}

pub struct Renderer {
    surface: MutationSurface,
    adapter: Arc<dyn Adapter>,
    listeners: Arc<ListenerRegistry>,
    config: SchedulerConfig,
    navigator: Option<Arc<dyn Navigator>>,
    storage: Option<Arc<dyn StorageBackend>>,
    tasks: HashMap<ContainerId, JoinHandle<()>>,
}

impl Renderer {
    pub fn new(adapter: Arc<dyn Adapter>, config: SchedulerConfig) -> Self {
        Self {
            surface: MutationSurface::new(),
            adapter,
            listeners: Arc::new(ListenerRegistry::new()),
            config,
            navigator: None,
            storage: None,
            tasks: HashMap::new(),
        }
    }

    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn StorageBackend>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn surface(&self) -> &MutationSurface {
        &self.surface
    }

    /// The diffing layer drives mutations through this
    pub fn surface_mut(&mut self) -> &mut MutationSurface {
        &mut self.surface
    }

    pub fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.listeners
    }

    pub fn create_container(&mut self, key: impl Into<String>) -> ContainerId {
        self.surface.create_container(key)
    }

    /// Mount (first call) or re-announce a container
    pub async fn render(&mut self, container: ContainerId) -> Result<(), RenderError> {
        let key = self.surface.container_key(container)?;
        if self.surface.scheduler_for(container).is_none() {
            let (handle, task) = UpdateScheduler::spawn(
                &key,
                self.config,
                Arc::clone(&self.adapter),
                Arc::clone(&self.listeners),
            );
            self.surface.create_root(container, handle)?;
            self.tasks.insert(container, task);
            info!(container = %key, "container mounted");
        }

        let snapshot = self.surface.snapshot(container)?;
        self.adapter
            .component_on_mount(&snapshot)
            .await
            .map_err(RenderError::Adapter)?;
        self.listeners.emit(RenderEvent::mounted(key));
        Ok(())
    }

    /// Record a navigation intent for the container, optionally re-rendering
    pub async fn redirect_to(
        &mut self,
        container: ContainerId,
        target: &str,
        options: RedirectOptions,
    ) -> Result<(), RenderError> {
        let snapshot = self.surface.snapshot(container)?;
        let route_key = self.adapter.get_route_key(&snapshot);
        let route = self.adapter.parse_route(target);

        match &self.navigator {
            Some(navigator) => navigator
                .redirect(&route_key, &route)
                .map_err(RenderError::Storage)?,
            None => warn!(
                %route_key,
                to = target,
                "no navigator configured, redirect not recorded"
            ),
        }

        if options.should_render {
            self.render(container).await?;
        }
        Ok(())
    }

    pub fn on(
        &self,
        container_key: impl Into<String>,
        listener: impl Fn(&RenderEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        self.listeners.on(container_key, listener)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.listeners.off(id)
    }

    /// Future for the container's next settlement
    ///
    /// The waiter is registered when this is called, not when the future is
    /// first polled, so commits made in between are not missed.
    pub fn wait_for_update(
        &self,
        container_key: &str,
    ) -> impl Future<Output = Result<ContainerSnapshot, RenderError>> + Send + 'static {
        let rx = self.listeners.wait(container_key);
        let key = container_key.to_string();
        async move {
            match rx.await {
                Ok(Ok(snapshot)) => Ok(snapshot),
                Ok(Err(message)) => Err(RenderError::Dispatch(message)),
                Err(_) => Err(RenderError::SchedulerStopped(key)),
            }
        }
    }

    /// Invoke the handlers of the component with `id`; returns how many ran
    pub fn dispatch_interaction(
        &self,
        container: ContainerId,
        id: &str,
    ) -> Result<usize, RenderError> {
        let tree = self.surface.tree();
        let unknown = || RenderError::UnknownTarget {
            container: self.surface.container_key(container).unwrap_or_default(),
            id: id.to_string(),
        };
        let node = tree.find_by_id(container, id).ok_or_else(unknown)?;
        let component = tree.node(node).map_err(HostError::from)?;

        let mut invoked = 0;
        for (name, handler) in component.props().handlers() {
            if handler.invoke() {
                invoked += 1;
            } else {
                warn!(id, prop = %name, "handler has no callback (restored from storage?)");
            }
        }
        debug!(id, invoked, "interaction dispatched");
        Ok(invoked)
    }

    pub async fn set_menus(&self, menus: &[MenuEntry]) -> Result<(), RenderError> {
        self.adapter
            .set_menus(menus)
            .await
            .map_err(RenderError::Adapter)
    }

    /// Save the container's serialized children
    pub fn persist(&self, container: ContainerId) -> Result<(), RenderError> {
        let storage = self.storage.as_ref().ok_or(RenderError::NoStorage)?;
        let key = self.surface.container_key(container)?;
        let children = self.surface.serialize(container)?;
        let value = serde_json::to_value(&children)
            .map_err(|e| RenderError::Storage(anyhow::Error::new(e)))?;
        storage
            .save_state(&key, &value)
            .map_err(RenderError::Storage)?;
        debug!(container = %key, roots = children.len(), "container persisted");
        Ok(())
    }

    /// Rebuild the container from its saved children
    pub fn rehydrate(&mut self, container: ContainerId) -> Result<(), RenderError> {
        let storage = self.storage.as_ref().ok_or(RenderError::NoStorage)?;
        let key = self.surface.container_key(container)?;
        let value = storage
            .restore_state(&key)
            .map_err(RenderError::Storage)?
            .ok_or_else(|| RenderError::NothingStored(key.clone()))?;
        let children: Vec<ComponentJson> = serde_json::from_value(value)
            .map_err(|e| HostError::Build(BuildError::Malformed(e.to_string())))?;
        self.surface.restore(container, &children)?;
        info!(container = %key, roots = children.len(), "container rehydrated");
        Ok(())
    }

    /// Stop the container's scheduler and drop it from the arena
    ///
    /// Waiters registered on the container resolve with `SchedulerStopped`.
    pub async fn unmount(&mut self, container: ContainerId) -> Result<(), RenderError> {
        let key = self.surface.container_key(container)?;
        if let Some(scheduler) = self.surface.remove_container(container)? {
            scheduler.shutdown();
        }
        if let Some(task) = self.tasks.remove(&container) {
            if let Err(e) = task.await {
                warn!(container = %key, "scheduler task ended abnormally: {}", e);
            }
        }
        self.listeners.close_waiters_for(&key);
        info!(container = %key, "container unmounted");
        Ok(())
    }

    /// Stop every scheduler, then let the adapter clean up
    pub async fn shutdown(self) -> Result<(), RenderError> {
        for scheduler in self.surface.schedulers() {
            scheduler.shutdown();
        }
        for task in self.tasks.into_values() {
            if let Err(e) = task.await {
                warn!("scheduler task ended abnormally: {}", e);
            }
        }
        self.listeners.close_waiters();
        self.adapter.on_destroy().await.map_err(RenderError::Adapter)?;
        info!(adapter = self.adapter.name(), "renderer shut down");
        Ok(())
    }
}
