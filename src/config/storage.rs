//! Storage configuration

use serde::Deserialize;
use std::path::PathBuf;

/// Storage settings
///
/// Without a directory, routes and container state live in memory only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageSettings {
    pub dir: Option<PathBuf>,
}

/// Storage settings as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileStorageSettings {
    pub dir: Option<String>,
}

impl StorageSettings {
    /// Create from file config with defaults
    pub fn from_file(file: Option<FileStorageSettings>) -> Self {
        let file = file.unwrap_or_default();
        Self {
            dir: file.dir.filter(|d| !d.is_empty()).map(PathBuf::from),
        }
    }
}
