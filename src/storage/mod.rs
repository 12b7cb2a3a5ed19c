// Storage module - persists routes and serialized container trees
//
// Two kinds of record, both keyed by string:
// - routes: where a container currently points (written by redirects)
// - state:  the serialized children of a container, for rehydration
//
// FileStorage writes one pretty JSON file per key so state can be inspected
// with standard tools:
//   <dir>/routes/chat-42.json
//   <dir>/state/chat-42.json

use crate::adapter::{Navigator, Route};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Key/value persistence for routes and container state
pub trait StorageBackend: Send + Sync {
    fn save_route(&self, route_key: &str, route: &Route) -> Result<()>;
    fn restore_route(&self, route_key: &str) -> Result<Option<Route>>;
    fn save_state(&self, key: &str, state: &serde_json::Value) -> Result<()>;
    fn restore_state(&self, key: &str) -> Result<Option<serde_json::Value>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory
// ─────────────────────────────────────────────────────────────────────────────

/// Process-local storage, lost on exit
#[derive(Debug, Default)]
pub struct MemoryStorage {
    routes: Mutex<HashMap<String, Route>>,
    state: Mutex<HashMap<String, serde_json::Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryStorage {
    fn save_route(&self, route_key: &str, route: &Route) -> Result<()> {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(route_key.to_string(), route.clone());
        Ok(())
    }

    fn restore_route(&self, route_key: &str) -> Result<Option<Route>> {
        Ok(self
            .routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(route_key)
            .cloned())
    }

    fn save_state(&self, key: &str, state: &serde_json::Value) -> Result<()> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), state.clone());
        Ok(())
    }

    fn restore_state(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// On disk
// ─────────────────────────────────────────────────────────────────────────────

/// One JSON file per key under a base directory
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Create the directory layout if it doesn't exist
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        for sub in ["routes", "state"] {
            fs::create_dir_all(dir.join(sub))
                .with_context(|| format!("Failed to create storage directory {:?}", dir))?;
        }
        tracing::debug!("File storage at {:?}", dir);
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, kind: &str, key: &str) -> PathBuf {
        self.dir.join(kind).join(format!("{}.json", file_stem(key)))
    }

    fn write_json<T: serde::Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value).context("Failed to serialize record")?;
        let mut file =
            File::create(path).with_context(|| format!("Failed to open {:?}", path))?;
        writeln!(file, "{}", json).with_context(|| format!("Failed to write {:?}", path))?;
        // Flush immediately so the record survives a crash right after
        file.flush().context("Failed to flush storage file")?;
        Ok(())
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        if !path.exists() {
            return Ok(None);
        }
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        let value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {:?}", path))?;
        Ok(Some(value))
    }
}

impl StorageBackend for FileStorage {
    fn save_route(&self, route_key: &str, route: &Route) -> Result<()> {
        self.write_json(&self.path_for("routes", route_key), route)
    }

    fn restore_route(&self, route_key: &str) -> Result<Option<Route>> {
        self.read_json(&self.path_for("routes", route_key))
    }

    fn save_state(&self, key: &str, state: &serde_json::Value) -> Result<()> {
        self.write_json(&self.path_for("state", key), state)
    }

    fn restore_state(&self, key: &str) -> Result<Option<serde_json::Value>> {
        self.read_json(&self.path_for("state", key))
    }
}

/// Escape anything outside `[A-Za-z0-9_-]` as `%XX` so distinct keys stay distinct
fn file_stem(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' | b'-' => out.push(byte as char),
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Navigator that records redirects as stored routes
#[derive(Clone)]
pub struct StorageNavigator {
    storage: Arc<dyn StorageBackend>,
}

impl StorageNavigator {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }
}

impl Navigator for StorageNavigator {
    fn redirect(&self, route_key: &str, target: &Route) -> Result<()> {
        tracing::debug!(route_key, target = %target, "redirect recorded");
        self.storage
            .save_route(route_key, target)
            .with_context(|| format!("Failed to record redirect for {}", route_key))
    }
}
