//! Component properties and the commit-time equality check
//!
//! Props are shared behind an `Arc` so the diffing layer can hand the same
//! property set to `commit_update` twice and we can short-circuit on pointer
//! identity, the same way a JS reconciler compares `oldProps === newProps`.
//!
//! Equality policy (decides whether a root commit schedules a dispatch):
//!
//! ```text
//! same Arc            → unchanged
//! key count differs   → changed
//! array               → element-wise, same length
//! map                 → pointer identity only (fresh map == changed)
//! handler             → source text
//! everything else     → value equality
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Prop name carrying a node's interaction key
pub const KEY_PROP: &str = "key";

/// Prop name carrying a text node's displayed value
pub const VALUE_PROP: &str = "value";

/// JSON marker used when a handler is serialized
pub const HANDLER_MARKER: &str = "$handler";

/// Callable part of an interaction handler
pub type HandlerFn = Arc<dyn Fn() + Send + Sync>;

/// Interaction callback attached to a prop (`onClick` and friends)
///
/// Two handlers are equal when their source text matches, so re-created
/// closures with the same body don't count as a change. A handler rebuilt
/// from JSON has no callable and is "detached".
#[derive(Clone)]
pub struct Handler {
    source: Arc<str>,
    callback: Option<HandlerFn>,
}

impl Handler {
    pub fn new(source: impl Into<Arc<str>>, callback: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            source: source.into(),
            callback: Some(Arc::new(callback)),
        }
    }

    /// Handler known only by its source (rehydrated from storage)
    pub fn detached(source: impl Into<Arc<str>>) -> Self {
        Self {
            source: source.into(),
            callback: None,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_detached(&self) -> bool {
        self.callback.is_none()
    }

    /// Run the callback. Returns false for detached handlers.
    pub fn invoke(&self) -> bool {
        match &self.callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("source", &self.source)
            .field("detached", &self.is_detached())
            .finish()
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// A single property value
#[derive(Debug, Clone)]
pub enum PropValue {
    Null,
    Bool(bool),
    /// Integers stay exact past 2^53
    Integer(i64),
    Number(f64),
    String(String),
    Array(Vec<PropValue>),
    /// Nested map, compared by reference
    Map(Arc<BTreeMap<String, PropValue>>),
    Handler(Handler),
}

impl PropValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_handler(&self) -> Option<&Handler> {
        match self {
            Self::Handler(h) => Some(h),
            _ => None,
        }
    }

    /// Wrap a map so it gets its own identity
    pub fn map(entries: impl IntoIterator<Item = (String, PropValue)>) -> Self {
        Self::Map(Arc::new(entries.into_iter().collect()))
    }

    /// Commit-time equality (see module docs)
    pub fn same_as(&self, other: &PropValue) -> bool {
        match (self, other) {
            (Self::Array(a), Self::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_as(y))
            }
            (Self::Map(a), Self::Map(b)) => Arc::ptr_eq(a, b),
            (Self::Handler(a), Self::Handler(b)) => a == b,
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Integer(a), Self::Number(b)) | (Self::Number(b), Self::Integer(a)) => {
                *a as f64 == *b
            }
            (Self::String(a), Self::String(b)) => a == b,
            _ => false,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Integer(n) => Value::from(*n),
            Self::Number(n) => number_to_json(*n),
            Self::String(s) => Value::String(s.clone()),
            Self::Array(items) => Value::Array(items.iter().map(PropValue::to_json).collect()),
            Self::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Self::Handler(handler) => {
                let mut marker = Map::new();
                marker.insert(
                    HANDLER_MARKER.to_string(),
                    Value::String(handler.source().to_string()),
                );
                Value::Object(marker)
            }
        }
    }

    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Number(n.as_f64().unwrap_or(0.0)),
            },
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from_json).collect()),
            Value::Object(mut entries) => {
                if entries.len() == 1 {
                    if let Some(Value::String(source)) = entries.remove(HANDLER_MARKER) {
                        return Self::Handler(Handler::detached(source));
                    }
                }
                Self::map(entries.into_iter().map(|(k, v)| (k, Self::from_json(v))))
            }
        }
    }
}

/// Integral values go out as JSON integers so `1` doesn't turn into `1.0`
fn number_to_json(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

impl Serialize for PropValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PropValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(PropValue::from_json)
    }
}

impl From<bool> for PropValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for PropValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for PropValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for PropValue {
    fn from(n: i32) -> Self {
        Self::Integer(n.into())
    }
}

impl From<&str> for PropValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for PropValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Handler> for PropValue {
    fn from(h: Handler) -> Self {
        Self::Handler(h)
    }
}

impl<T: Into<PropValue>> From<Vec<T>> for PropValue {
    fn from(items: Vec<T>) -> Self {
        Self::Array(items.into_iter().map(Into::into).collect())
    }
}

/// Shared, immutable property set of one node
#[derive(Debug, Clone, Default)]
pub struct Props(Arc<BTreeMap<String, PropValue>>);

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a list of `(name, value)` pairs
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<PropValue>,
    {
        pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect()
    }

    /// Copy with one property replaced; always a new identity
    pub fn with(&self, name: impl Into<String>, value: impl Into<PropValue>) -> Self {
        let mut entries = (*self.0).clone();
        entries.insert(name.into(), value.into());
        Self(Arc::new(entries))
    }

    pub fn get(&self, name: &str) -> Option<&PropValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropValue)> {
        self.0.iter()
    }

    /// The interaction key, if one is set as a string
    pub fn key(&self) -> Option<&str> {
        self.get(KEY_PROP).and_then(PropValue::as_str)
    }

    /// Handler-valued props in name order
    pub fn handlers(&self) -> impl Iterator<Item = (&String, &Handler)> {
        self.0
            .iter()
            .filter_map(|(name, value)| value.as_handler().map(|h| (name, h)))
    }

    /// Whether any prop is an interaction handler
    pub fn is_interactive(&self) -> bool {
        self.handlers().next().is_some()
    }

    /// Pointer identity
    pub fn same(&self, other: &Props) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl FromIterator<(String, PropValue)> for Props {
    fn from_iter<I: IntoIterator<Item = (String, PropValue)>>(iter: I) -> Self {
        Self(Arc::new(iter.into_iter().collect()))
    }
}

impl Serialize for Props {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Props {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        BTreeMap::<String, PropValue>::deserialize(deserializer).map(|m| Self(Arc::new(m)))
    }
}

/// Decide whether a commit changed anything observable
pub fn props_changed(old: &Props, new: &Props) -> bool {
    if old.same(new) {
        return false;
    }
    if old.len() != new.len() {
        return true;
    }
    old.iter().any(|(name, old_value)| match new.get(name) {
        Some(new_value) => !old_value.same_as(new_value),
        None => true,
    })
}
