//! Serialized component tree
//!
//! This is the wire format a storage backend persists:
//!
//! ```json
//! { "id": "btn-1", "type": "button", "props": { "key": "btn-1" }, "children": [] }
//! ```

use super::{InstanceType, Props};
use serde::{Deserialize, Serialize};

/// One serialized node (recursive)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentJson {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: InstanceType,
    #[serde(default)]
    pub props: Props,
    #[serde(default)]
    pub children: Vec<ComponentJson>,
}

impl ComponentJson {
    /// Depth-first search for the first node matching `pred`
    pub fn find(&self, pred: &impl Fn(&ComponentJson) -> bool) -> Option<&ComponentJson> {
        if pred(self) {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(pred))
    }

    /// Total node count including self
    pub fn node_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(ComponentJson::node_count)
            .sum::<usize>()
    }
}
