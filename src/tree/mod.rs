//! Component tree model
//!
//! Nodes live in an arena and refer to each other by `NodeId`. A node's
//! parent is a handle, never an owning pointer, so the tree has no reference
//! cycles and walking upward is O(1).
//!
//! ```text
//! Container("chat-42")
//!   ├── #0 container
//!   │     ├── #1 header ─┐ companions: #5 line-break (before), #6 line-break (after)
//!   │     └── #2 button
//!   └── #3 suspendable { shouldSuspend }
//! ```
//!
//! Every mutator keeps both sides of the parent/child relation in sync inside
//! one call: a node is never observed with a parent whose children don't
//! contain it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

mod instance;
mod json;
mod props;

pub use instance::InstanceType;
pub use json::ComponentJson;
pub use props::{
    props_changed, Handler, HandlerFn, PropValue, Props, HANDLER_MARKER, KEY_PROP, VALUE_PROP,
};

// ─────────────────────────────────────────────────────────────────────────────
// Handles
// ─────────────────────────────────────────────────────────────────────────────

/// Arena slot of a component, tagged with the slot's generation
///
/// Freed slots are reused; a handle to the previous occupant stops
/// resolving because its generation no longer matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.generation == 0 {
            write!(f, "#{}", self.index)
        } else {
            write!(f, "#{}.{}", self.index, self.generation)
        }
    }
}

/// Arena index of a container (never reused)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(usize);

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "container#{}", self.0)
    }
}

/// Opaque root handle installed on a container at first mount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RootHandle(pub(crate) u64);

/// Back-reference from a node to whatever holds it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parent {
    /// Created but not attached yet
    #[default]
    None,
    Node(NodeId),
    /// Root sentinel: the node hangs directly off a container
    Container(ContainerId),
}

impl fmt::Display for Parent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parent::None => f.write_str("<detached>"),
            Parent::Node(id) => id.fmt(f),
            Parent::Container(id) => id.fmt(f),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("node {0} does not exist")]
    NodeNotFound(NodeId),

    #[error("{0} does not exist")]
    ContainerNotFound(ContainerId),

    #[error("node {child} is not a child of {parent}")]
    NotAChild { parent: Parent, child: NodeId },

    #[error("cannot attach {child} inside its own subtree")]
    Cycle { child: NodeId },

    #[error("{0} is not attached to a parent")]
    Detached(NodeId),

    #[error("no parent given")]
    NoParent,
}

// ─────────────────────────────────────────────────────────────────────────────
// Nodes and containers
// ─────────────────────────────────────────────────────────────────────────────

/// A node in the output tree
#[derive(Debug, Clone)]
pub struct Component {
    id: String,
    kind: InstanceType,
    props: Props,
    parent: Parent,
    children: Vec<NodeId>,
    /// Sibling nodes that travel with this one (placed before/after it)
    companions: Vec<NodeId>,
}

impl Component {
    pub fn new(id: impl Into<String>, kind: InstanceType, props: Props) -> Self {
        Self {
            id: id.into(),
            kind,
            props,
            parent: Parent::None,
            children: Vec::new(),
            companions: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &InstanceType {
        &self.kind
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    pub fn parent(&self) -> Parent {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn companions(&self) -> &[NodeId] {
        &self.companions
    }

    /// Whether this node hangs directly off a container
    pub fn is_root(&self) -> bool {
        matches!(self.parent, Parent::Container(_))
    }

    /// Absorb new props, reporting whether anything observable changed
    pub fn commit_update(&mut self, old: &Props, new: &Props) -> bool {
        let changed = props_changed(old, new);
        self.props = new.clone();
        changed
    }

    /// Overwrite the text value without running equality
    pub fn set_text(&mut self, text: &str) {
        self.props = self.props.with(VALUE_PROP, text);
    }

    /// Displayed text of a text node
    pub fn text(&self) -> Option<&str> {
        self.props.get(VALUE_PROP).and_then(PropValue::as_str)
    }
}

/// Shared "a commit reached this container since the last dispatch" flag
#[derive(Debug, Clone, Default)]
pub struct UpdateFlag(Arc<AtomicBool>);

impl UpdateFlag {
    pub fn mark(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag, returning the previous value
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// Root carrier for one renderable output unit
#[derive(Debug)]
pub struct Container {
    key: String,
    children: Vec<NodeId>,
    root: Option<RootHandle>,
    has_updated: UpdateFlag,
}

impl Container {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn root(&self) -> Option<RootHandle> {
        self.root
    }

    pub fn has_updated(&self) -> bool {
        self.has_updated.is_set()
    }

    pub fn update_flag(&self) -> &UpdateFlag {
        &self.has_updated
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Arena
// ─────────────────────────────────────────────────────────────────────────────

/// Where to put a node among its new siblings
#[derive(Debug, Clone, Copy)]
enum Placement {
    End,
    Before(NodeId),
    After(NodeId),
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    component: Option<Component>,
}

/// Arena holding every live node and container
#[derive(Debug, Default)]
pub struct Tree {
    nodes: Vec<Slot>,
    /// Indices of empty slots, reused LIFO
    free: Vec<u32>,
    containers: Vec<Option<Container>>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── lookup ────────────────────────────────────────────────────────────

    pub fn get(&self, id: NodeId) -> Option<&Component> {
        self.nodes
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.component.as_ref())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Component> {
        self.nodes
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.component.as_mut())
    }

    pub fn node(&self, id: NodeId) -> Result<&Component, TreeError> {
        self.get(id).ok_or(TreeError::NodeNotFound(id))
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Component, TreeError> {
        self.get_mut(id).ok_or(TreeError::NodeNotFound(id))
    }

    pub fn container(&self, id: ContainerId) -> Result<&Container, TreeError> {
        self.containers
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(TreeError::ContainerNotFound(id))
    }

    fn container_mut(&mut self, id: ContainerId) -> Result<&mut Container, TreeError> {
        self.containers
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(TreeError::ContainerNotFound(id))
    }

    /// Number of live nodes in the arena
    pub fn live_nodes(&self) -> usize {
        self.nodes
            .iter()
            .filter(|slot| slot.component.is_some())
            .count()
    }

    /// Number of slots ever allocated, live or free
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    /// Container a node ultimately hangs off, if it is attached to one
    pub fn container_of(&self, id: NodeId) -> Option<ContainerId> {
        let mut current = id;
        loop {
            match self.get(current)?.parent {
                Parent::Node(parent) => current = parent,
                Parent::Container(container) => return Some(container),
                Parent::None => return None,
            }
        }
    }

    /// Pre-order walk over a container's subtree
    pub fn descendants(&self, container: ContainerId) -> Result<Vec<NodeId>, TreeError> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self
            .container(container)?
            .children
            .iter()
            .rev()
            .copied()
            .collect();
        while let Some(id) = stack.pop() {
            let node = self.node(id)?;
            out.push(id);
            stack.extend(node.children.iter().rev().copied());
        }
        Ok(out)
    }

    /// First node under `container` whose id matches
    pub fn find_by_id(&self, container: ContainerId, id: &str) -> Option<NodeId> {
        self.descendants(container)
            .ok()?
            .into_iter()
            .find(|node| self.get(*node).is_some_and(|c| c.id == id))
    }

    // ─── creation ──────────────────────────────────────────────────────────

    /// Put a detached node into the arena, reusing a freed slot if any
    pub fn insert(&mut self, component: Component) -> NodeId {
        let component = Component {
            parent: Parent::None,
            children: Vec::new(),
            companions: Vec::new(),
            ..component
        };
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.nodes[index as usize];
                slot.component = Some(component);
                NodeId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.nodes.len() as u32;
                self.nodes.push(Slot {
                    generation: 0,
                    component: Some(component),
                });
                NodeId {
                    index,
                    generation: 0,
                }
            }
        }
    }

    /// Empty a slot and retire its generation
    fn take(&mut self, id: NodeId) -> Option<Component> {
        let slot = self
            .nodes
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)?;
        let component = slot.component.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Some(component)
    }

    pub fn create_container(&mut self, key: impl Into<String>) -> ContainerId {
        let id = ContainerId(self.containers.len());
        self.containers.push(Some(Container {
            key: key.into(),
            children: Vec::new(),
            root: None,
            has_updated: UpdateFlag::default(),
        }));
        id
    }

    /// Discard a container and everything under it
    pub fn remove_container(&mut self, id: ContainerId) -> Result<Container, TreeError> {
        self.clear_container(id)?;
        self.containers
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or(TreeError::ContainerNotFound(id))
    }

    pub(crate) fn set_root(&mut self, id: ContainerId, root: RootHandle) -> Result<(), TreeError> {
        self.container_mut(id)?.root = Some(root);
        Ok(())
    }

    /// Attach sibling companions to `owner`; placed right away if it is attached
    pub(crate) fn set_companions(
        &mut self,
        owner: NodeId,
        companions: Vec<NodeId>,
    ) -> Result<(), TreeError> {
        for companion in &companions {
            self.node(*companion)?;
        }
        self.node_mut(owner)?.companions = companions;
        if self.node(owner)?.parent != Parent::None {
            self.place_companions(owner)?;
        }
        Ok(())
    }

    // ─── structural mutation ───────────────────────────────────────────────

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        self.attach(Parent::Node(parent), child, Placement::End)
    }

    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        before: NodeId,
    ) -> Result<(), TreeError> {
        self.attach(Parent::Node(parent), child, Placement::Before(before))
    }

    pub fn insert_after(
        &mut self,
        parent: NodeId,
        child: NodeId,
        after: NodeId,
    ) -> Result<(), TreeError> {
        self.attach(Parent::Node(parent), child, Placement::After(after))
    }

    /// Detach `child` from `parent` and discard its whole subtree
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        self.remove_from(Parent::Node(parent), child)
    }

    pub fn append_to_container(
        &mut self,
        container: ContainerId,
        child: NodeId,
    ) -> Result<(), TreeError> {
        self.attach(Parent::Container(container), child, Placement::End)
    }

    pub fn insert_in_container_before(
        &mut self,
        container: ContainerId,
        child: NodeId,
        before: NodeId,
    ) -> Result<(), TreeError> {
        self.attach(Parent::Container(container), child, Placement::Before(before))
    }

    pub fn remove_from_container(
        &mut self,
        container: ContainerId,
        child: NodeId,
    ) -> Result<(), TreeError> {
        self.remove_from(Parent::Container(container), child)
    }

    /// Discard every root child of a container
    pub fn clear_container(&mut self, container: ContainerId) -> Result<(), TreeError> {
        let children = self.container(container)?.children.clone();
        for child in children {
            // Companions may already be gone with their owner
            if self.get(child).is_some() {
                self.remove_from(Parent::Container(container), child)?;
            }
        }
        Ok(())
    }

    fn children_of(&self, parent: Parent) -> Result<&Vec<NodeId>, TreeError> {
        match parent {
            Parent::Node(id) => Ok(&self.node(id)?.children),
            Parent::Container(id) => Ok(&self.container(id)?.children),
            Parent::None => Err(TreeError::NoParent),
        }
    }

    fn children_of_mut(&mut self, parent: Parent) -> Result<&mut Vec<NodeId>, TreeError> {
        match parent {
            Parent::Node(id) => Ok(&mut self.node_mut(id)?.children),
            Parent::Container(id) => Ok(&mut self.container_mut(id)?.children),
            Parent::None => Err(TreeError::NoParent),
        }
    }

    fn attach(
        &mut self,
        parent: Parent,
        child: NodeId,
        placement: Placement,
    ) -> Result<(), TreeError> {
        // Validate everything before touching anything
        self.node(child)?;
        let siblings = self.children_of(parent)?;
        if let Placement::Before(reference) | Placement::After(reference) = placement {
            let companions = &self.node(child)?.companions;
            if reference == child
                || companions.contains(&reference)
                || !siblings.contains(&reference)
            {
                return Err(TreeError::NotAChild {
                    parent,
                    child: reference,
                });
            }
        }
        if let Parent::Node(parent_id) = parent {
            if self.node(child)?.companions.contains(&parent_id) {
                return Err(TreeError::Cycle { child });
            }
            self.check_no_cycle(parent_id, child)?;
        }

        let companions = self.node(child)?.companions.clone();
        self.detach(child)?;
        for companion in &companions {
            if self.get(*companion).is_some() {
                self.detach(*companion)?;
            }
        }

        let index = match placement {
            Placement::End => self.children_of(parent)?.len(),
            Placement::Before(reference) => self.span_of(parent, reference)?.0,
            Placement::After(reference) => self.span_of(parent, reference)?.1 + 1,
        };
        self.children_of_mut(parent)?.insert(index, child);
        self.node_mut(child)?.parent = parent;

        if !companions.is_empty() {
            self.place_companions(child)?;
        }
        Ok(())
    }

    /// First and last sibling index covered by `reference` and its companions
    fn span_of(&self, parent: Parent, reference: NodeId) -> Result<(usize, usize), TreeError> {
        let siblings = self.children_of(parent)?;
        let at = position(siblings, reference, parent)?;
        let companions = &self.node(reference)?.companions;
        Ok(siblings
            .iter()
            .enumerate()
            .filter(|(_, id)| companions.contains(*id))
            .fold((at, at), |(first, last), (i, _)| (first.min(i), last.max(i))))
    }

    /// Walk up from `parent`; reaching `child` means the attach would loop
    fn check_no_cycle(&self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        let mut current = Parent::Node(parent);
        while let Parent::Node(id) = current {
            if id == child {
                return Err(TreeError::Cycle { child });
            }
            current = self.node(id)?.parent;
        }
        Ok(())
    }

    /// Unlink a node from its current parent without discarding it
    fn detach(&mut self, child: NodeId) -> Result<(), TreeError> {
        let parent = self.node(child)?.parent;
        if parent == Parent::None {
            return Ok(());
        }
        self.children_of_mut(parent)?.retain(|id| *id != child);
        self.node_mut(child)?.parent = Parent::None;
        Ok(())
    }

    /// Put an owner's companions immediately around it (first before, rest after)
    fn place_companions(&mut self, owner: NodeId) -> Result<(), TreeError> {
        let node = self.node(owner)?;
        let parent = node.parent;
        if parent == Parent::None {
            return Err(TreeError::Detached(owner));
        }
        let companions: Vec<NodeId> = node
            .companions
            .iter()
            .copied()
            .filter(|id| self.get(*id).is_some())
            .collect();

        for companion in &companions {
            self.detach(*companion)?;
        }
        let mut companions = companions.into_iter();
        let Some(before) = companions.next() else {
            return Ok(());
        };

        let siblings = self.children_of_mut(parent)?;
        let index = position(siblings, owner, parent)?;
        siblings.insert(index, before);
        let mut after_index = index + 2;
        let after: Vec<NodeId> = companions.collect();
        for companion in &after {
            siblings.insert(after_index, *companion);
            after_index += 1;
        }

        self.node_mut(before)?.parent = parent;
        for companion in after {
            self.node_mut(companion)?.parent = parent;
        }
        Ok(())
    }

    fn remove_from(&mut self, parent: Parent, child: NodeId) -> Result<(), TreeError> {
        self.node(child)?;
        if !self.children_of(parent)?.contains(&child) {
            return Err(TreeError::NotAChild { parent, child });
        }
        self.detach(child)?;
        self.discard(child);
        Ok(())
    }

    /// Free a detached subtree, companions included
    fn discard(&mut self, root: NodeId) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.take(id) else {
                continue;
            };
            stack.extend(node.children);
            for companion in node.companions {
                if self.get(companion).is_some() {
                    let _ = self.detach(companion);
                    stack.push(companion);
                }
            }
        }
    }

    // ─── serialization ─────────────────────────────────────────────────────

    pub fn to_json(&self, id: NodeId) -> Result<ComponentJson, TreeError> {
        let node = self.node(id)?;
        Ok(ComponentJson {
            id: node.id.clone(),
            kind: node.kind.clone(),
            props: node.props.clone(),
            children: node
                .children
                .iter()
                .map(|child| self.to_json(*child))
                .collect::<Result<_, _>>()?,
        })
    }

    pub fn container_to_json(&self, id: ContainerId) -> Result<Vec<ComponentJson>, TreeError> {
        self.container(id)?
            .children
            .iter()
            .map(|child| self.to_json(*child))
            .collect()
    }

    /// Check that every parent pointer matches exactly one children list
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        use std::collections::HashMap;

        let id_of = |index: usize, slot: &Slot| NodeId {
            index: index as u32,
            generation: slot.generation,
        };

        let mut owners: HashMap<NodeId, Vec<Parent>> = HashMap::new();
        for (index, slot) in self.nodes.iter().enumerate() {
            if let Some(node) = &slot.component {
                for child in &node.children {
                    owners
                        .entry(*child)
                        .or_default()
                        .push(Parent::Node(id_of(index, slot)));
                }
            }
        }
        for (index, container) in self.containers.iter().enumerate() {
            for child in container.iter().flat_map(|c| &c.children) {
                owners
                    .entry(*child)
                    .or_default()
                    .push(Parent::Container(ContainerId(index)));
            }
        }

        let live = owners.len();
        let mut listed_live = 0;
        for (index, slot) in self.nodes.iter().enumerate() {
            let id = id_of(index, slot);
            let Some(node) = &slot.component else {
                continue;
            };
            listed_live += usize::from(owners.contains_key(&id));
            let listed = owners.get(&id).cloned().unwrap_or_default();
            match node.parent {
                Parent::None => assert!(listed.is_empty(), "detached {id} listed in {listed:?}"),
                parent => assert_eq!(listed, vec![parent], "{id} parent mismatch"),
            }
        }
        assert_eq!(listed_live, live, "a dead node is still listed as a child");
    }
}

fn position(siblings: &[NodeId], reference: NodeId, parent: Parent) -> Result<usize, TreeError> {
    siblings
        .iter()
        .position(|id| *id == reference)
        .ok_or(TreeError::NotAChild {
            parent,
            child: reference,
        })
}
