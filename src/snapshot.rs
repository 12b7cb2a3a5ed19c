//! Container snapshots
//!
//! The scheduler never touches the live tree. At commit time the mutation
//! surface serializes the container into an owned snapshot, and that is what
//! waits in the debounce window and what the platform adapter eventually
//! receives.

use crate::suspend::{self, SuspendError};
use crate::tree::{ComponentJson, ContainerId, Tree, UpdateFlag};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Owned copy of one container at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSnapshot {
    /// Container key (e.g. chat id)
    pub key: String,
    /// Root children in rendering order
    pub children: Vec<ComponentJson>,
    /// Suspend marker state when the snapshot was taken
    pub suspended: bool,
    pub taken_at: DateTime<Utc>,
    /// Live container's "has updated" flag, cleared when this snapshot is dispatched
    #[serde(skip)]
    pub(crate) update_flag: UpdateFlag,
}

impl ContainerSnapshot {
    /// Serialize a live container and run the suspend detector over it
    pub fn capture(tree: &Tree, container: ContainerId) -> Result<Self, SuspendError> {
        let suspended = suspend::is_suspended(tree, container)?;
        let live = tree.container(container)?;
        Ok(Self {
            key: live.key().to_string(),
            children: tree.container_to_json(container)?,
            suspended,
            taken_at: Utc::now(),
            update_flag: live.update_flag().clone(),
        })
    }

    /// Build from already-serialized children (e.g. restored from storage)
    pub fn from_parts(
        key: impl Into<String>,
        children: Vec<ComponentJson>,
    ) -> Result<Self, SuspendError> {
        let key = key.into();
        let suspended = suspend::is_suspended_json(&key, &children)?;
        Ok(Self {
            key,
            children,
            suspended,
            taken_at: Utc::now(),
            update_flag: UpdateFlag::default(),
        })
    }

    /// Depth-first lookup by component id
    pub fn find(&self, id: &str) -> Option<&ComponentJson> {
        self.children
            .iter()
            .find_map(|child| child.find(&|node| node.id == id))
    }
}
