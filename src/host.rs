//! Mutation surface
//!
//! The verbs an external reconciler drives: create nodes, attach and detach
//! them, commit prop changes. This layer owns the arena, the builder and the
//! scheduler handle of every mounted container, and it is the only place that
//! turns a committed root change into a snapshot for the scheduler.

use crate::builder::{BuildError, Builder, HostContext};
use crate::scheduler::SchedulerHandle;
use crate::snapshot::ContainerSnapshot;
use crate::suspend::SuspendError;
use crate::tree::{
    ComponentJson, ContainerId, InstanceType, NodeId, Props, RootHandle, Tree, TreeError,
    VALUE_PROP,
};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HostError {
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Suspend(#[from] SuspendError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("container `{0}` already has a root")]
    AlreadyMounted(String),
}

/// Host-side operations over the component arena
#[derive(Debug, Default)]
pub struct MutationSurface {
    tree: Tree,
    builder: Builder,
    roots: HashMap<RootHandle, SchedulerHandle>,
    next_root: u64,
}

impl MutationSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn builder(&self) -> &Builder {
        &self.builder
    }

    pub fn create_container(&mut self, key: impl Into<String>) -> ContainerId {
        self.tree.create_container(key)
    }

    pub fn container_key(&self, container: ContainerId) -> Result<String, HostError> {
        Ok(self.tree.container(container)?.key().to_string())
    }

    // ─── creation ──────────────────────────────────────────────────────────

    /// Build a node; a rejected component renders as an error text instead
    pub fn create_instance(
        &mut self,
        kind: impl Into<InstanceType>,
        props: Props,
        container: ContainerId,
        ctx: &HostContext,
    ) -> NodeId {
        let kind = kind.into();
        match self
            .builder
            .build(&mut self.tree, kind.clone(), props, container, ctx)
        {
            Ok(node) => node,
            Err(e) => {
                warn!(%kind, container = ctx.container_key(), "component rejected: {}", e);
                self.builder.build_fallback(&mut self.tree, &e, container, ctx)
            }
        }
    }

    pub fn create_text_instance(
        &mut self,
        text: &str,
        container: ContainerId,
        ctx: &HostContext,
    ) -> NodeId {
        self.create_instance(
            InstanceType::Text,
            Props::from_pairs([(VALUE_PROP, text)]),
            container,
            ctx,
        )
    }

    // ─── structure ─────────────────────────────────────────────────────────

    /// Attach while the parent is still being built
    pub fn append_initial_child(
        &mut self,
        parent: NodeId,
        child: NodeId,
    ) -> Result<(), HostError> {
        self.append_child(parent, child)
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), HostError> {
        Ok(self.tree.append_child(parent, child)?)
    }

    pub fn append_child_to_container(
        &mut self,
        container: ContainerId,
        child: NodeId,
    ) -> Result<(), HostError> {
        Ok(self.tree.append_to_container(container, child)?)
    }

    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        before: NodeId,
    ) -> Result<(), HostError> {
        Ok(self.tree.insert_before(parent, child, before)?)
    }

    pub fn insert_in_container_before(
        &mut self,
        container: ContainerId,
        child: NodeId,
        before: NodeId,
    ) -> Result<(), HostError> {
        Ok(self
            .tree
            .insert_in_container_before(container, child, before)?)
    }

    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), HostError> {
        Ok(self.tree.remove_child(parent, child)?)
    }

    pub fn remove_child_from_container(
        &mut self,
        container: ContainerId,
        child: NodeId,
    ) -> Result<(), HostError> {
        Ok(self.tree.remove_from_container(container, child)?)
    }

    /// Pre-mount hook; never asks for a post-mount commit
    pub fn finalize_initial_children(&mut self, instance: NodeId) -> Result<bool, HostError> {
        self.builder.finalize_before_mount(&mut self.tree, instance)?;
        Ok(false)
    }

    /// Start a full rebuild: reset the container's key session and drop
    /// every root child
    pub fn clear_container(&mut self, container: ContainerId) -> Result<(), HostError> {
        self.tree.clear_container(container)?;
        self.builder.clear(container);
        Ok(())
    }

    /// Tear a container down for good
    ///
    /// Frees its nodes, forgets its key session and unbinds its root. The
    /// returned scheduler, if it was mounted, is still running.
    pub fn remove_container(
        &mut self,
        container: ContainerId,
    ) -> Result<Option<SchedulerHandle>, HostError> {
        let removed = self.tree.remove_container(container)?;
        self.builder.forget(container);
        debug!(container = removed.key(), "container removed");
        Ok(removed.root().and_then(|root| self.roots.remove(&root)))
    }

    // ─── commits ───────────────────────────────────────────────────────────

    /// Absorb new props; a changed root schedules its container
    pub fn commit_update(
        &mut self,
        instance: NodeId,
        old: &Props,
        new: &Props,
    ) -> Result<(), HostError> {
        let node = self.tree.node_mut(instance)?;
        let changed = node.commit_update(old, new);
        if !(changed && node.is_root()) {
            return Ok(());
        }
        let Some(container) = self.tree.container_of(instance) else {
            return Ok(());
        };

        self.tree.container(container)?.update_flag().mark();
        let snapshot = self.snapshot(container)?;
        let Some(root) = self.tree.container(container)?.root() else {
            debug!(container = %snapshot.key, "commit before first render, not scheduling");
            return Ok(());
        };
        let Some(scheduler) = self.roots.get(&root) else {
            warn!(container = %snapshot.key, "root has no scheduler");
            return Ok(());
        };
        if !scheduler.schedule(snapshot) {
            warn!(container = scheduler.key(), "scheduler already stopped, commit dropped");
        }
        Ok(())
    }

    /// Overwrite a text node's value; never schedules
    pub fn commit_text_update(
        &mut self,
        instance: NodeId,
        _old: &str,
        new: &str,
    ) -> Result<(), HostError> {
        self.tree.node_mut(instance)?.set_text(new);
        Ok(())
    }

    // ─── roots and snapshots ───────────────────────────────────────────────

    /// Install a root on a container and bind it to its scheduler
    pub fn create_root(
        &mut self,
        container: ContainerId,
        scheduler: SchedulerHandle,
    ) -> Result<RootHandle, HostError> {
        let existing = self.tree.container(container)?;
        if existing.root().is_some() {
            return Err(HostError::AlreadyMounted(existing.key().to_string()));
        }
        self.next_root += 1;
        let root = RootHandle(self.next_root);
        self.tree.set_root(container, root)?;
        self.roots.insert(root, scheduler);
        Ok(root)
    }

    pub fn scheduler_for(&self, container: ContainerId) -> Option<&SchedulerHandle> {
        let root = self.tree.container(container).ok()?.root()?;
        self.roots.get(&root)
    }

    pub(crate) fn schedulers(&self) -> impl Iterator<Item = &SchedulerHandle> {
        self.roots.values()
    }

    /// Owned copy of the container with its suspend state
    pub fn snapshot(&self, container: ContainerId) -> Result<ContainerSnapshot, HostError> {
        Ok(ContainerSnapshot::capture(&self.tree, container)?)
    }

    pub fn serialize(&self, container: ContainerId) -> Result<Vec<ComponentJson>, HostError> {
        Ok(self.tree.container_to_json(container)?)
    }

    /// Replace a container's children with a serialized tree
    ///
    /// Either every child is restored or the container is left empty.
    pub fn restore(
        &mut self,
        container: ContainerId,
        children: &[ComponentJson],
    ) -> Result<(), HostError> {
        self.clear_container(container)?;
        for child in children {
            let restored = self
                .builder
                .build_from_json(&mut self.tree, child, container)
                .and_then(|node| Ok(self.tree.append_to_container(container, node)?));
            if let Err(e) = restored {
                self.clear_container(container)?;
                return Err(e.into());
            }
        }
        debug!(
            container = %self.container_key(container)?,
            nodes = children.iter().map(ComponentJson::node_count).sum::<usize>(),
            "container restored"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::testing::RecordingAdapter;
    use crate::events::ListenerRegistry;
    use crate::scheduler::{SchedulerConfig, SchedulerPhase, UpdateScheduler};
    use crate::tree::Handler;
    use serde_json::json;
    use std::sync::Arc;

    fn surface() -> (MutationSurface, ContainerId, HostContext) {
        let mut surface = MutationSurface::new();
        let container = surface.create_container("chat");
        (surface, container, HostContext::new("chat"))
    }

    /// Mounts a marker and a root node, returning the root node
    fn populate(
        surface: &mut MutationSurface,
        container: ContainerId,
        ctx: &HostContext,
    ) -> NodeId {
        let marker = surface.create_instance(
            "suspendable",
            Props::from_pairs([("shouldSuspend", false)]),
            container,
            ctx,
        );
        let root = surface.create_instance("container", Props::new(), container, ctx);
        surface.append_child_to_container(container, marker).unwrap();
        surface.append_child_to_container(container, root).unwrap();
        root
    }

    #[test]
    fn test_unsupported_component_falls_back_to_text() {
        let (mut surface, container, ctx) = surface();
        let node = surface.create_instance("carousel", Props::new(), container, &ctx);

        let component = surface.tree().node(node).unwrap();
        assert_eq!(*component.kind(), InstanceType::Text);
        assert_eq!(component.text(), Some("Unsupported component: <carousel>"));
    }

    #[test]
    fn test_missing_key_falls_back_to_text() {
        let (mut surface, container, ctx) = surface();
        let props = Props::new().with("onClick", Handler::new("go()", || {}));
        let node = surface.create_instance("button", props, container, &ctx);

        let component = surface.tree().node(node).unwrap();
        assert_eq!(*component.kind(), InstanceType::Text);
        assert!(component.text().unwrap().contains("no `key` prop"));
    }

    #[test]
    fn test_text_instance_and_text_update() {
        let (mut surface, container, ctx) = surface();
        let text = surface.create_text_instance("hello", container, &ctx);
        surface.commit_text_update(text, "hello", "bye").unwrap();
        assert_eq!(surface.tree().node(text).unwrap().text(), Some("bye"));
    }

    #[test]
    fn test_finalize_initial_children_never_requests_commit() {
        let (mut surface, container, ctx) = surface();
        let header = surface.create_instance("header", Props::new(), container, &ctx);
        let text = surface.create_text_instance("Title", container, &ctx);
        surface.append_initial_child(header, text).unwrap();

        assert_eq!(surface.finalize_initial_children(header), Ok(false));
        surface.append_child_to_container(container, header).unwrap();
        assert_eq!(surface.tree().container(container).unwrap().children().len(), 3);
    }

    #[test]
    fn test_structural_errors_surface() {
        let (mut surface, container, ctx) = surface();
        let a = surface.create_text_instance("a", container, &ctx);
        let b = surface.create_text_instance("b", container, &ctx);

        assert!(matches!(
            surface.remove_child_from_container(container, a),
            Err(HostError::Tree(TreeError::NotAChild { .. }))
        ));
        assert!(matches!(
            surface.insert_in_container_before(container, a, b),
            Err(HostError::Tree(TreeError::NotAChild { .. }))
        ));
    }

    #[test]
    fn test_commit_on_non_root_does_not_mark_container() {
        let (mut surface, container, ctx) = surface();
        let root = populate(&mut surface, container, &ctx);
        let leaf = surface.create_text_instance("x", container, &ctx);
        surface.append_child(root, leaf).unwrap();

        let old = surface.tree().node(leaf).unwrap().props().clone();
        surface
            .commit_update(leaf, &old, &old.with("value", "y"))
            .unwrap();

        assert!(!surface.tree().container(container).unwrap().has_updated());
        assert_eq!(surface.tree().node(leaf).unwrap().text(), Some("y"));
    }

    #[test]
    fn test_unchanged_root_commit_does_not_mark_container() {
        let (mut surface, container, ctx) = surface();
        let root = populate(&mut surface, container, &ctx);
        let props = surface.tree().node(root).unwrap().props().clone();

        surface.commit_update(root, &props, &props).unwrap();
        assert!(!surface.tree().container(container).unwrap().has_updated());
    }

    #[test]
    fn test_root_commit_without_marker_is_error() {
        let (mut surface, container, ctx) = surface();
        let root = surface.create_instance("container", Props::new(), container, &ctx);
        surface.append_child_to_container(container, root).unwrap();

        let old = Props::new();
        let err = surface
            .commit_update(root, &old, &old.with("title", "x"))
            .unwrap_err();
        assert_eq!(
            err,
            HostError::Suspend(SuspendError::NoSuspendableInstance("chat".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_root_commit_reaches_scheduler() {
        let (mut surface, container, ctx) = surface();
        let root = populate(&mut surface, container, &ctx);
        let adapter = Arc::new(RecordingAdapter::default());
        let (handle, _task) = UpdateScheduler::spawn(
            "chat",
            SchedulerConfig::production(),
            adapter.clone(),
            Arc::new(ListenerRegistry::new()),
        );
        surface.create_root(container, handle).unwrap();

        let old = surface.tree().node(root).unwrap().props().clone();
        surface
            .commit_update(root, &old, &old.with("title", "x"))
            .unwrap();
        assert!(surface.tree().container(container).unwrap().has_updated());

        let scheduler = surface.scheduler_for(container).unwrap();
        assert!(scheduler.wait_for_phase(SchedulerPhase::Debouncing).await);
        assert!(scheduler.wait_for_phase(SchedulerPhase::Idle).await);
        assert_eq!(adapter.call_count(), 1);
        assert!(!surface.tree().container(container).unwrap().has_updated());
    }

    #[tokio::test]
    async fn test_create_root_twice_is_error() {
        let (mut surface, container, _) = surface();
        let spawn = || {
            UpdateScheduler::spawn(
                "chat",
                SchedulerConfig::production(),
                Arc::new(RecordingAdapter::default()),
                Arc::new(ListenerRegistry::new()),
            )
            .0
        };
        surface.create_root(container, spawn()).unwrap();
        assert_eq!(
            surface.create_root(container, spawn()),
            Err(HostError::AlreadyMounted("chat".into()))
        );
    }

    #[test]
    fn test_clear_container_resets_keys() {
        let (mut surface, container, ctx) = surface();
        let props = Props::from_pairs([("key", "go")]).with("onClick", Handler::new("go()", || {}));
        let button = surface.create_instance("button", props.clone(), container, &ctx);
        surface.append_child_to_container(container, button).unwrap();
        assert!(surface.builder().session(container).unwrap().contains_key("go"));

        surface.clear_container(container).unwrap();
        assert!(!surface.builder().session(container).unwrap().contains_key("go"));
        assert_eq!(surface.tree().live_nodes(), 0);

        let again = surface.create_instance("button", props, container, &ctx);
        assert_eq!(*surface.tree().node(again).unwrap().kind(), InstanceType::Button);
    }

    fn button(key: &str) -> Props {
        Props::from_pairs([("key", key)]).with("onClick", Handler::new("inc()", || {}))
    }

    #[test]
    fn test_same_key_in_two_containers() {
        let (mut surface, first, ctx) = surface();
        let second = surface.create_container("other");
        let other_ctx = HostContext::new("other");

        let a = surface.create_instance("button", button("inc"), first, &ctx);
        let b = surface.create_instance("button", button("inc"), second, &other_ctx);
        assert_eq!(*surface.tree().node(a).unwrap().kind(), InstanceType::Button);
        assert_eq!(*surface.tree().node(b).unwrap().kind(), InstanceType::Button);

        surface.clear_container(second).unwrap();
        assert!(surface.builder().session(first).unwrap().contains_key("inc"));

        // Still a duplicate inside the first container's cycle
        let again = surface.create_instance("button", button("inc"), first, &ctx);
        assert_eq!(*surface.tree().node(again).unwrap().kind(), InstanceType::Text);
    }

    #[test]
    fn test_keyed_text_nodes_get_distinct_ids() {
        let (mut surface, container, ctx) = surface();
        let props = Props::from_pairs([("key", "row"), ("value", "x")]);
        let a = surface.create_instance("text", props.clone(), container, &ctx);
        let b = surface.create_instance("text", props, container, &ctx);
        surface.append_child_to_container(container, a).unwrap();
        surface.append_child_to_container(container, b).unwrap();

        let ids: Vec<_> = surface
            .serialize(container)
            .unwrap()
            .into_iter()
            .map(|json| json.id)
            .collect();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn test_insert_before_finalized_header_keeps_breaks_around_it() {
        let (mut surface, container, ctx) = surface();
        let root = surface.create_instance("container", Props::new(), container, &ctx);
        let header = surface.create_instance("header", Props::new(), container, &ctx);
        surface.finalize_initial_children(header).unwrap();
        surface.append_child(root, header).unwrap();

        let text = surface.create_text_instance("intro", container, &ctx);
        surface.insert_before(root, text, header).unwrap();

        let kinds: Vec<_> = surface
            .tree()
            .node(root)
            .unwrap()
            .children()
            .iter()
            .map(|id| surface.tree().node(*id).unwrap().kind().clone())
            .collect();
        assert_eq!(
            kinds,
            vec![
                InstanceType::Text,
                InstanceType::LineBreak,
                InstanceType::Header,
                InstanceType::LineBreak,
            ]
        );
    }

    #[tokio::test]
    async fn test_remove_container_releases_everything() {
        let (mut surface, container, ctx) = surface();
        populate(&mut surface, container, &ctx);
        let keep = surface.create_container("keep");
        let kept = surface.create_text_instance("stay", keep, &HostContext::new("keep"));
        surface.append_child_to_container(keep, kept).unwrap();

        let (handle, _task) = UpdateScheduler::spawn(
            "chat",
            SchedulerConfig::production(),
            Arc::new(RecordingAdapter::default()),
            Arc::new(ListenerRegistry::new()),
        );
        surface.create_root(container, handle).unwrap();

        let scheduler = surface.remove_container(container).unwrap();
        assert_eq!(scheduler.map(|s| s.key().to_string()), Some("chat".into()));
        assert!(surface.builder().session(container).is_none());
        assert!(surface.scheduler_for(container).is_none());
        assert_eq!(surface.schedulers().count(), 0);
        assert_eq!(surface.tree().live_nodes(), 1);
        assert!(matches!(
            surface.remove_container(container),
            Err(HostError::Tree(TreeError::ContainerNotFound(_)))
        ));

        // Freed slots go to the next container
        let next = surface.create_container("next");
        let ctx = HostContext::new("next");
        surface.create_text_instance("a", next, &ctx);
        surface.create_text_instance("b", next, &ctx);
        assert_eq!(surface.tree().capacity(), 3);
    }

    #[test]
    fn test_restore_is_all_or_nothing() {
        let (mut surface, container, ctx) = surface();
        populate(&mut surface, container, &ctx);
        let saved = surface.serialize(container).unwrap();

        let bad: Vec<ComponentJson> = serde_json::from_value(json!([
            { "id": "ok", "type": "text" },
            { "id": "bad", "type": "carousel" }
        ]))
        .unwrap();
        assert!(matches!(
            surface.restore(container, &bad),
            Err(HostError::Build(BuildError::UnsupportedComponent(_)))
        ));
        assert!(surface.tree().container(container).unwrap().children().is_empty());

        surface.restore(container, &saved).unwrap();
        assert_eq!(surface.serialize(container).unwrap().len(), 2);
        assert!(!surface.snapshot(container).unwrap().suspended);
    }
}
