//! Instance type tags
//!
//! The set of renderable kinds is closed. Anything the diffing layer asks for
//! that we don't know ends up in `Unknown` so the builder can reject it with
//! the original name attached.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a component node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InstanceType {
    /// Generic grouping node
    Container,
    /// Plain text, value lives in the `value` prop
    Text,
    /// Bold heading line, surrounded by line breaks at mount
    Header,
    /// Clickable button (usually carries `onClick`)
    Button,
    /// Group of buttons rendered as a keyboard/menu
    Menu,
    Image,
    Link,
    LineBreak,
    /// Bot command declaration
    Command,
    /// Marker node whose `shouldSuspend` prop pauses outward dispatch
    Suspendable,
    /// Tag we have no constructor for
    Unknown(String),
}

impl InstanceType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Container => "container",
            Self::Text => "text",
            Self::Header => "header",
            Self::Button => "button",
            Self::Menu => "menu",
            Self::Image => "image",
            Self::Link => "link",
            Self::LineBreak => "line-break",
            Self::Command => "command",
            Self::Suspendable => "suspendable",
            Self::Unknown(name) => name,
        }
    }

    /// Whether this tag maps to a known constructor
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl From<&str> for InstanceType {
    fn from(s: &str) -> Self {
        match s {
            "container" => Self::Container,
            "text" => Self::Text,
            "header" => Self::Header,
            "button" => Self::Button,
            "menu" => Self::Menu,
            "image" => Self::Image,
            "link" => Self::Link,
            "line-break" | "br" => Self::LineBreak,
            "command" => Self::Command,
            "suspendable" => Self::Suspendable,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl From<String> for InstanceType {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<InstanceType> for String {
    fn from(kind: InstanceType) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
