//! Platform adapter seam
//!
//! The engine knows nothing about any chat platform. Everything
//! platform-specific (turning a container into a message, menus, route
//! parsing) sits behind [`Adapter`]. Router persistence sits behind
//! [`Navigator`].

use crate::snapshot::ContainerSnapshot;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One bot command shown in the platform's menu
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuEntry {
    pub command: String,
    pub description: String,
}

impl MenuEntry {
    pub fn new(command: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            description: description.into(),
        }
    }
}

/// Parsed route: a path plus query parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub path: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl Route {
    /// Parse `"/path?a=1&b"`; a bare parameter maps to an empty string
    pub fn parse(route: &str) -> Self {
        let (path, query) = route.split_once('?').unwrap_or((route, ""));
        let params = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
                (k.to_string(), v.to_string())
            })
            .collect();
        Self {
            path: if path.is_empty() { "/".into() } else { path.into() },
            params,
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.path)?;
        for (i, (k, v)) in self.params.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            if v.is_empty() {
                write!(f, "{sep}{k}")?;
            } else {
                write!(f, "{sep}{k}={v}")?;
            }
        }
        Ok(())
    }
}

/// Bridge between the engine and one chat platform
///
/// Implementations must be `Send + Sync`: every container's scheduler task
/// holds a shared reference.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Human-readable name for logs
    fn name(&self) -> &'static str;

    /// Turn a settled container into a platform message
    ///
    /// Called from the scheduler with `is_update = true` once per debounce
    /// window. The returned value is the platform's message object.
    async fn adapt(
        &self,
        container: &ContainerSnapshot,
        is_update: bool,
    ) -> anyhow::Result<serde_json::Value>;

    /// First-mount hook, awaited by `render`
    async fn component_on_mount(&self, _container: &ContainerSnapshot) -> anyhow::Result<()> {
        Ok(())
    }

    async fn set_menus(&self, _menus: &[MenuEntry]) -> anyhow::Result<()> {
        Ok(())
    }

    /// Route a platform message points at, if any
    fn get_current_route(&self, _message: &serde_json::Value) -> Option<String> {
        None
    }

    fn parse_route(&self, route: &str) -> Route {
        Route::parse(route)
    }

    /// Key the router stores this container's route under
    fn get_route_key(&self, container: &ContainerSnapshot) -> String {
        container.key.clone()
    }

    /// Called once when the renderer shuts down
    async fn on_destroy(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Records navigation intents for the router
pub trait Navigator: Send + Sync {
    fn redirect(&self, route_key: &str, target: &Route) -> anyhow::Result<()>;
}
