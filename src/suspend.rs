//! Suspend detection
//!
//! A committed container is expected to hold exactly one `suspendable` marker
//! somewhere in its subtree. Its `shouldSuspend` prop decides whether outward
//! dispatch is paused. A tree without the marker is malformed for this engine
//! and is reported as an error rather than read as "not suspended".

use crate::tree::{ComponentJson, ContainerId, InstanceType, NodeId, Props, Tree, TreeError};
use thiserror::Error;

/// Prop on the marker node that pauses dispatch
pub const SHOULD_SUSPEND_PROP: &str = "shouldSuspend";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SuspendError {
    #[error("no suspendable instance found in container `{0}`")]
    NoSuspendableInstance(String),

    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// First marker node in depth-first order
pub fn find_suspendable(tree: &Tree, container: ContainerId) -> Result<NodeId, SuspendError> {
    tree.descendants(container)?
        .into_iter()
        .find(|id| {
            tree.get(*id)
                .is_some_and(|node| *node.kind() == InstanceType::Suspendable)
        })
        .ok_or_else(|| {
            let key = tree
                .container(container)
                .map(|c| c.key().to_string())
                .unwrap_or_default();
            SuspendError::NoSuspendableInstance(key)
        })
}

/// Whether the container's marker currently asks to suspend
pub fn is_suspended(tree: &Tree, container: ContainerId) -> Result<bool, SuspendError> {
    let marker = find_suspendable(tree, container)?;
    Ok(should_suspend(tree.node(marker)?.props()))
}

/// Same check over a serialized container
pub fn is_suspended_json(key: &str, children: &[ComponentJson]) -> Result<bool, SuspendError> {
    children
        .iter()
        .find_map(|child| child.find(&|node| node.kind == InstanceType::Suspendable))
        .map(|marker| should_suspend(&marker.props))
        .ok_or_else(|| SuspendError::NoSuspendableInstance(key.to_string()))
}

/// Missing or non-boolean flag reads as "not suspended"
fn should_suspend(props: &Props) -> bool {
    props
        .get(SHOULD_SUSPEND_PROP)
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}
