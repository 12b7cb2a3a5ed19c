//! Component builder
//!
//! Turns an `(instance type, props, container, host context)` request into a
//! node in the arena, enforcing the interaction-key rules:
//!
//! - a node carrying a handler prop (`onClick`, …) must have a `key`
//! - that key must be unique within the container's current build cycle
//!
//! Each container has its own [`BuildSession`] holding the cycle's keys and
//! ids. A session is reset only by [`Builder::clear`], which the mutation
//! surface calls once per full rebuild of that container.
//!
//! Interactive nodes take their key as id so interactions can be routed back
//! to them. Every other node gets a generated id, since a diffing layer's keys
//! only have to be unique among siblings.
//!
//! The builder also rehydrates trees from their serialized form, running the
//! same checks before any node is created.

use crate::tree::{
    Component, ComponentJson, ContainerId, InstanceType, NodeId, Props, Tree, TreeError,
    VALUE_PROP,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("Unsupported component: <{0}>")]
    UnsupportedComponent(String),

    #[error("<{kind}> has an interaction handler but no `key` prop")]
    MissingRequiredKeyProps { kind: String },

    #[error("key `{0}` is used by more than one interactive component")]
    DuplicatedKeyProps(String),

    #[error("malformed component tree: {0}")]
    Malformed(String),

    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Per-subtree information handed down by the diffing layer
#[derive(Debug, Clone)]
pub struct HostContext {
    container_key: Arc<str>,
}

impl HostContext {
    pub fn new(container_key: impl Into<Arc<str>>) -> Self {
        Self {
            container_key: container_key.into(),
        }
    }

    pub fn container_key(&self) -> &str {
        &self.container_key
    }
}

/// Interaction keys and ids handed out during one build cycle of a container
#[derive(Debug, Default)]
pub struct BuildSession {
    keys: HashSet<String>,
    ids: HashSet<String>,
    next_id: u64,
}

impl BuildSession {
    pub fn contains_key(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Next `<container>:<kind>-<n>` not yet taken in this cycle
    fn generate_id(&mut self, ctx: &HostContext, kind: &InstanceType) -> String {
        loop {
            self.next_id += 1;
            let id = format!("{}:{}-{}", ctx.container_key(), kind, self.next_id);
            if self.ids.insert(id.clone()) {
                return id;
            }
        }
    }

    /// Returns the key that has to be recorded, if any
    fn check_keys(
        &self,
        kind: &InstanceType,
        props: &Props,
        pending: &HashSet<String>,
    ) -> Result<Option<String>, BuildError> {
        if let InstanceType::Unknown(name) = kind {
            return Err(BuildError::UnsupportedComponent(name.clone()));
        }
        if !props.is_interactive() {
            return Ok(None);
        }
        let Some(key) = props.key() else {
            return Err(BuildError::MissingRequiredKeyProps {
                kind: kind.to_string(),
            });
        };
        if self.keys.contains(key) || self.ids.contains(key) || pending.contains(key) {
            return Err(BuildError::DuplicatedKeyProps(key.to_string()));
        }
        Ok(Some(key.to_string()))
    }

    fn validate(
        &self,
        json: &ComponentJson,
        keys: &mut HashSet<String>,
        ids: &mut HashSet<String>,
    ) -> Result<(), BuildError> {
        if json.id.is_empty() {
            return Err(BuildError::Malformed(format!(
                "<{}> node without an id",
                json.kind
            )));
        }
        if let Some(key) = self.check_keys(&json.kind, &json.props, keys)? {
            keys.insert(key);
        }
        if self.ids.contains(&json.id) || !ids.insert(json.id.clone()) {
            return Err(BuildError::Malformed(format!(
                "id `{}` appears more than once",
                json.id
            )));
        }
        json.children
            .iter()
            .try_for_each(|child| self.validate(child, keys, ids))
    }

    fn reset(&mut self) {
        self.keys.clear();
        self.ids.clear();
        self.next_id = 0;
    }
}

/// Factory for component nodes
#[derive(Debug, Default)]
pub struct Builder {
    sessions: HashMap<ContainerId, BuildSession>,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current cycle of `container`; `None` until something was built there
    pub fn session(&self, container: ContainerId) -> Option<&BuildSession> {
        self.sessions.get(&container)
    }

    /// Create a detached node of `kind` in the arena
    pub fn build(
        &mut self,
        tree: &mut Tree,
        kind: InstanceType,
        props: Props,
        container: ContainerId,
        ctx: &HostContext,
    ) -> Result<NodeId, BuildError> {
        tree.container(container)?;
        let session = self.sessions.entry(container).or_default();

        let id = match session.check_keys(&kind, &props, &HashSet::new())? {
            Some(key) => {
                session.keys.insert(key.clone());
                session.ids.insert(key.clone());
                key
            }
            None => session.generate_id(ctx, &kind),
        };

        tracing::trace!(%kind, %id, container = ctx.container_key(), "component built");
        Ok(tree.insert(Component::new(id, kind, props)))
    }

    /// Plain text node standing in for a component that failed to build
    pub fn build_fallback(
        &mut self,
        tree: &mut Tree,
        error: &BuildError,
        container: ContainerId,
        ctx: &HostContext,
    ) -> NodeId {
        let id = self
            .sessions
            .entry(container)
            .or_default()
            .generate_id(ctx, &InstanceType::Text);
        tree.insert(Component::new(
            id,
            InstanceType::Text,
            Props::from_pairs([(VALUE_PROP, error.to_string())]),
        ))
    }

    /// Rebuild a detached subtree of `container` from its serialized form
    ///
    /// The whole tree is validated first, so a rejected document leaves no
    /// nodes behind in the arena. Ids are kept as they were.
    pub fn build_from_json(
        &mut self,
        tree: &mut Tree,
        json: &ComponentJson,
        container: ContainerId,
    ) -> Result<NodeId, BuildError> {
        tree.container(container)?;
        let session = self.sessions.entry(container).or_default();
        let (mut keys, mut ids) = (HashSet::new(), HashSet::new());
        session.validate(json, &mut keys, &mut ids)?;
        session.keys.extend(keys);
        session.ids.extend(ids);
        Ok(Self::instantiate(tree, json)?)
    }

    /// Parse raw JSON and rebuild it
    pub fn build_from_value(
        &mut self,
        tree: &mut Tree,
        value: serde_json::Value,
        container: ContainerId,
    ) -> Result<NodeId, BuildError> {
        let json: ComponentJson =
            serde_json::from_value(value).map_err(|e| BuildError::Malformed(e.to_string()))?;
        self.build_from_json(tree, &json, container)
    }

    /// Start a new build cycle for one container
    pub fn clear(&mut self, container: ContainerId) {
        if let Some(session) = self.sessions.get_mut(&container) {
            tracing::debug!(keys = session.key_count(), %container, "build session cleared");
            session.reset();
        }
    }

    /// Drop the session of a container that is gone
    pub fn forget(&mut self, container: ContainerId) {
        self.sessions.remove(&container);
    }

    /// Structural surgery some types need before their first mount
    ///
    /// Headers get a line break on each side. The breaks are companions of the
    /// header and follow it wherever it is attached.
    pub fn finalize_before_mount(
        &mut self,
        tree: &mut Tree,
        node: NodeId,
    ) -> Result<(), BuildError> {
        let component = tree.node(node)?;
        if *component.kind() != InstanceType::Header || !component.companions().is_empty() {
            return Ok(());
        }

        let header_id = component.id().to_string();
        let before = tree.insert(Component::new(
            format!("{header_id}:br-before"),
            InstanceType::LineBreak,
            Props::new(),
        ));
        let after = tree.insert(Component::new(
            format!("{header_id}:br-after"),
            InstanceType::LineBreak,
            Props::new(),
        ));
        tree.set_companions(node, vec![before, after])?;
        Ok(())
    }

    fn instantiate(tree: &mut Tree, json: &ComponentJson) -> Result<NodeId, TreeError> {
        let node = tree.insert(Component::new(
            json.id.clone(),
            json.kind.clone(),
            json.props.clone(),
        ));
        for child in &json.children {
            let child = Self::instantiate(tree, child)?;
            tree.append_child(node, child)?;
        }
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{Handler, PropValue};
    use serde_json::json;

    fn setup() -> (Tree, ContainerId, HostContext, Builder) {
        let mut tree = Tree::new();
        let container = tree.create_container("chat");
        (tree, container, HostContext::new("chat"), Builder::new())
    }

    fn clickable(key: Option<&str>) -> Props {
        let props = Props::new().with("onClick", Handler::new("() => pick()", || {}));
        match key {
            Some(key) => props.with("key", key),
            None => props,
        }
    }

    #[test]
    fn test_build_text() {
        let (mut tree, container, ctx, mut builder) = setup();
        let id = builder
            .build(
                &mut tree,
                InstanceType::Text,
                Props::from_pairs([("value", "hi")]),
                container,
                &ctx,
            )
            .unwrap();

        let node = tree.node(id).unwrap();
        assert_eq!(node.text(), Some("hi"));
        assert_eq!(node.id(), "chat:text-1");
    }

    #[test]
    fn test_unknown_type_is_unsupported() {
        let (mut tree, container, ctx, mut builder) = setup();
        let err = builder
            .build(
                &mut tree,
                InstanceType::from("carousel"),
                Props::new(),
                container,
                &ctx,
            )
            .unwrap_err();
        assert_eq!(err, BuildError::UnsupportedComponent("carousel".into()));
        assert_eq!(tree.live_nodes(), 0);
    }

    #[test]
    fn test_handler_without_key_is_rejected() {
        let (mut tree, container, ctx, mut builder) = setup();
        let err = builder
            .build(&mut tree, InstanceType::Button, clickable(None), container, &ctx)
            .unwrap_err();
        assert_eq!(
            err,
            BuildError::MissingRequiredKeyProps {
                kind: "button".into()
            }
        );
    }

    #[test]
    fn test_duplicate_key_fails_on_second_only() {
        let (mut tree, container, ctx, mut builder) = setup();
        let first = builder.build(
            &mut tree,
            InstanceType::Button,
            clickable(Some("ok")),
            container,
            &ctx,
        );
        assert!(first.is_ok());
        assert_eq!(tree.node(first.unwrap()).unwrap().id(), "ok");

        let second = builder.build(
            &mut tree,
            InstanceType::Button,
            clickable(Some("ok")),
            container,
            &ctx,
        );
        assert_eq!(second, Err(BuildError::DuplicatedKeyProps("ok".into())));
    }

    #[test]
    fn test_clear_allows_key_reuse() {
        let (mut tree, container, ctx, mut builder) = setup();
        builder
            .build(&mut tree, InstanceType::Button, clickable(Some("ok")), container, &ctx)
            .unwrap();
        builder.clear(container);
        assert!(builder
            .build(&mut tree, InstanceType::Button, clickable(Some("ok")), container, &ctx)
            .is_ok());
    }

    #[test]
    fn test_keys_are_scoped_per_container() {
        let (mut tree, first, ctx, mut builder) = setup();
        let second = tree.create_container("other");
        let other_ctx = HostContext::new("other");

        builder
            .build(&mut tree, InstanceType::Button, clickable(Some("inc")), first, &ctx)
            .unwrap();
        builder
            .build(&mut tree, InstanceType::Button, clickable(Some("inc")), second, &other_ctx)
            .unwrap();

        builder.clear(second);
        assert!(builder.session(first).unwrap().contains_key("inc"));
        assert!(!builder.session(second).unwrap().contains_key("inc"));

        // The first container's cycle is still running
        assert_eq!(
            builder.build(&mut tree, InstanceType::Button, clickable(Some("inc")), first, &ctx),
            Err(BuildError::DuplicatedKeyProps("inc".into()))
        );

        builder.forget(second);
        assert!(builder.session(second).is_none());
    }

    #[test]
    fn test_non_interactive_keys_are_not_tracked() {
        let (mut tree, container, ctx, mut builder) = setup();
        let props = Props::from_pairs([("key", "same")]);
        let nodes: Vec<_> = (0..2)
            .map(|_| {
                builder
                    .build(&mut tree, InstanceType::Text, props.clone(), container, &ctx)
                    .unwrap()
            })
            .collect();
        assert_eq!(builder.session(container).unwrap().key_count(), 0);

        let first = tree.node(nodes[0]).unwrap().id();
        let second = tree.node(nodes[1]).unwrap().id();
        assert_ne!(first, second);

        for node in nodes {
            tree.append_to_container(container, node).unwrap();
        }
        assert_eq!(tree.find_by_id(container, "same"), None);
    }

    #[test]
    fn test_generated_ids_skip_ids_taken_by_keys() {
        let (mut tree, container, ctx, mut builder) = setup();
        builder
            .build(
                &mut tree,
                InstanceType::Button,
                clickable(Some("chat:text-1")),
                container,
                &ctx,
            )
            .unwrap();
        let text = builder
            .build(&mut tree, InstanceType::Text, Props::new(), container, &ctx)
            .unwrap();
        assert_eq!(tree.node(text).unwrap().id(), "chat:text-2");
    }

    #[test]
    fn test_key_colliding_with_generated_id_is_rejected() {
        let (mut tree, container, ctx, mut builder) = setup();
        builder
            .build(&mut tree, InstanceType::Text, Props::new(), container, &ctx)
            .unwrap();
        assert_eq!(
            builder.build(
                &mut tree,
                InstanceType::Button,
                clickable(Some("chat:text-1")),
                container,
                &ctx,
            ),
            Err(BuildError::DuplicatedKeyProps("chat:text-1".into()))
        );
    }

    #[test]
    fn test_unknown_container_is_error() {
        let (mut tree, _, ctx, mut builder) = setup();
        // Second container of another arena has no counterpart in `tree`
        let mut other = Tree::new();
        other.create_container("a");
        let missing = other.create_container("b");

        assert!(matches!(
            builder.build(&mut tree, InstanceType::Text, Props::new(), missing, &ctx),
            Err(BuildError::Tree(TreeError::ContainerNotFound(_)))
        ));
    }

    #[test]
    fn test_header_finalize_adds_line_breaks() {
        let (mut tree, container, ctx, mut builder) = setup();
        let header = builder
            .build(&mut tree, InstanceType::Header, Props::new(), container, &ctx)
            .unwrap();
        builder.finalize_before_mount(&mut tree, header).unwrap();
        builder.finalize_before_mount(&mut tree, header).unwrap();
        tree.append_to_container(container, header).unwrap();

        let kinds: Vec<_> = tree
            .container(container)
            .unwrap()
            .children()
            .iter()
            .map(|id| tree.node(*id).unwrap().kind().clone())
            .collect();
        assert_eq!(
            kinds,
            vec![
                InstanceType::LineBreak,
                InstanceType::Header,
                InstanceType::LineBreak
            ]
        );
        tree.assert_consistent();
    }

    #[test]
    fn test_finalize_is_noop_for_other_types() {
        let (mut tree, container, ctx, mut builder) = setup();
        let text = builder
            .build(&mut tree, InstanceType::Text, Props::new(), container, &ctx)
            .unwrap();
        builder.finalize_before_mount(&mut tree, text).unwrap();
        assert_eq!(tree.live_nodes(), 1);
    }

    #[test]
    fn test_json_roundtrip_preserves_structure() {
        let (mut tree, container, ctx, mut builder) = setup();
        let root = builder
            .build(&mut tree, InstanceType::Container, Props::new(), container, &ctx)
            .unwrap();
        let text = builder
            .build(
                &mut tree,
                InstanceType::Text,
                Props::from_pairs([("value", "pick one")]),
                container,
                &ctx,
            )
            .unwrap();
        let button = builder
            .build(&mut tree, InstanceType::Button, clickable(Some("b1")), container, &ctx)
            .unwrap();
        tree.append_child(root, text).unwrap();
        tree.append_child(root, button).unwrap();
        let original = tree.to_json(root).unwrap();

        // Through the wire format, the way persisted trees come back
        builder.clear(container);
        let mut fresh = Tree::new();
        let restored = fresh.create_container("chat");
        let rebuilt = builder
            .build_from_value(&mut fresh, serde_json::to_value(&original).unwrap(), restored)
            .unwrap();
        let again = fresh.to_json(rebuilt).unwrap();

        assert_eq!(
            serde_json::to_value(&original).unwrap(),
            serde_json::to_value(&again).unwrap()
        );
        let button = fresh.node(rebuilt).unwrap().children()[1];
        assert_eq!(fresh.node(button).unwrap().id(), "b1");
        let handler = fresh
            .node(button)
            .unwrap()
            .props()
            .get("onClick")
            .and_then(PropValue::as_handler)
            .unwrap();
        assert!(handler.is_detached());
        assert!(builder.session(restored).unwrap().contains_key("b1"));
    }

    #[test]
    fn test_rehydrate_rejects_ids_already_in_use() {
        let (mut tree, container, ctx, mut builder) = setup();
        builder
            .build(&mut tree, InstanceType::Text, Props::new(), container, &ctx)
            .unwrap();

        let err = builder
            .build_from_value(
                &mut tree,
                json!({ "id": "chat:text-1", "type": "text" }),
                container,
            )
            .unwrap_err();
        assert!(matches!(err, BuildError::Malformed(_)));

        let err = builder
            .build_from_value(
                &mut tree,
                json!({ "id": "r", "type": "container", "children": [
                    { "id": "t", "type": "text" },
                    { "id": "t", "type": "text" }
                ]}),
                container,
            )
            .unwrap_err();
        assert!(matches!(err, BuildError::Malformed(_)));
        assert_eq!(tree.live_nodes(), 1);
    }

    #[test]
    fn test_rehydrate_rejects_unknown_type_without_leaving_nodes() {
        let (mut tree, container, _, mut builder) = setup();
        let err = builder
            .build_from_value(
                &mut tree,
                json!({
                    "id": "root", "type": "container",
                    "children": [ { "id": "x", "type": "carousel" } ]
                }),
                container,
            )
            .unwrap_err();
        assert_eq!(err, BuildError::UnsupportedComponent("carousel".into()));
        assert_eq!(tree.live_nodes(), 0);
    }

    #[test]
    fn test_rehydrate_rejects_duplicate_keys_inside_document() {
        let (mut tree, container, _, mut builder) = setup();
        let button = json!({
            "id": "b", "type": "button",
            "props": { "key": "b", "onClick": { "$handler": "go()" } }
        });
        let err = builder
            .build_from_value(
                &mut tree,
                json!({ "id": "root", "type": "menu", "children": [button.clone(), button] }),
                container,
            )
            .unwrap_err();
        assert_eq!(err, BuildError::DuplicatedKeyProps("b".into()));
        assert!(!builder.session(container).unwrap().contains_key("b"));
    }

    #[test]
    fn test_rehydrate_malformed_json() {
        let (mut tree, container, _, mut builder) = setup();
        let err = builder
            .build_from_value(&mut tree, json!({ "type": "text" }), container)
            .unwrap_err();
        assert!(matches!(err, BuildError::Malformed(_)));

        let err = builder
            .build_from_value(&mut tree, json!({ "id": "", "type": "text" }), container)
            .unwrap_err();
        assert!(matches!(err, BuildError::Malformed(_)));
    }
}
