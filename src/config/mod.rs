//! Configuration for the renderer and its binary
//!
//! Configuration is loaded in order of precedence:
//! 1. Environment variables (highest priority)
//! 2. Config file (~/.config/chatmount/config.toml)
//! 3. Built-in defaults (lowest priority)

use serde::Deserialize;
use std::path::PathBuf;

// ─────────────────────────────────────────────────────────────────────────────
// Submodules
// ─────────────────────────────────────────────────────────────────────────────

mod observability;
mod scheduler;
mod serialization;
mod storage;


// ─────────────────────────────────────────────────────────────────────────────
// Re-exports
// ─────────────────────────────────────────────────────────────────────────────

pub use observability::{FileLogging, LogRotation, LoggingConfig};
pub use scheduler::{FileScheduler, SchedulerMode, SchedulerSettings};
pub use storage::{FileStorageSettings, StorageSettings};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable names
pub const ENV_MODE: &str = "CHATMOUNT_MODE";
pub const ENV_DEBOUNCE_MS: &str = "CHATMOUNT_DEBOUNCE_MS";
pub const ENV_MAX_WAIT_MS: &str = "CHATMOUNT_MAX_WAIT_MS";
pub const ENV_STORAGE_DIR: &str = "CHATMOUNT_STORAGE_DIR";

// ─────────────────────────────────────────────────────────────────────────────
// Application Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    /// Debounce timing for container dispatch
    pub scheduler: SchedulerSettings,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Where persisted routes and container state live
    pub storage: StorageSettings,
}

// ─────────────────────────────────────────────────────────────────────────────
// File Configuration (deserialization layer)
// ─────────────────────────────────────────────────────────────────────────────

/// Config file structure
#[derive(Debug, Deserialize, Default)]
pub(crate) struct FileConfig {
    /// Optional [scheduler] section
    pub scheduler: Option<FileScheduler>,

    /// Optional [logging] section
    pub logging: Option<FileLogging>,

    /// Optional [storage] section
    pub storage: Option<FileStorageSettings>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration Loading
// ─────────────────────────────────────────────────────────────────────────────

impl Config {
    /// Get the config file path: ~/.config/chatmount/config.toml
    /// Uses Unix-style ~/.config on all platforms for consistency
    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".config").join("chatmount").join("config.toml"))
    }

    /// Create config file with defaults if it doesn't exist
    pub fn ensure_config_exists() {
        let Some(path) = Self::config_path() else {
            return;
        };

        // Don't overwrite existing config
        if path.exists() {
            return;
        }

        if let Some(parent) = path.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return; // Silently fail - config is optional
            }
        }

        // Use Config::default().to_toml() as single source of truth
        let _ = std::fs::write(&path, Self::default().to_toml());
    }

    /// Load file config if it exists
    ///
    /// A config file that exists but cannot be read or parsed exits the process.
    fn load_file_config() -> FileConfig {
        let Some(path) = Self::config_path() else {
            return FileConfig::default();
        };

        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("\n╔══════════════════════════════════════════════════════════════╗");
                    eprintln!("║  CONFIG ERROR - Failed to parse configuration file          ║");
                    eprintln!("╚══════════════════════════════════════════════════════════════╝\n");
                    eprintln!("  File: {}\n", path.display());
                    eprintln!("  Error: {}\n", e);
                    eprintln!("  Tip: Check for:\n");
                    eprintln!("    - Missing quotes around string values");
                    eprintln!("    - Numbers written as strings (debounce_ms = 100, not \"100\")");
                    eprintln!("    - Typos in section names\n");
                    eprintln!("  To reset, run `chatmount config --reset`.\n");
                    std::process::exit(1);
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => FileConfig::default(),
            Err(e) => {
                eprintln!("\n╔══════════════════════════════════════════════════════════════╗");
                eprintln!("║  CONFIG ERROR - Cannot read configuration file              ║");
                eprintln!("╚══════════════════════════════════════════════════════════════╝\n");
                eprintln!("  File: {}\n", path.display());
                eprintln!("  Error: {}\n", e);
                std::process::exit(1);
            }
        }
    }

    /// Load configuration: env vars -> file -> defaults
    pub fn from_env() -> Self {
        Self::resolve(Self::load_file_config(), |name| std::env::var(name).ok())
    }

    /// Merge a parsed file with an environment lookup
    pub(crate) fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let mut scheduler = SchedulerSettings::from_file(file.scheduler);

        // Mode: env > file > default
        if let Some(mode) = env(ENV_MODE) {
            scheduler.mode = SchedulerMode::from_str(&mode);
        }
        // Timing: env > file > mode preset (unparseable env values are ignored)
        if let Some(ms) = env(ENV_DEBOUNCE_MS).and_then(|v| v.parse().ok()) {
            scheduler.debounce_ms = ms;
        }
        if let Some(ms) = env(ENV_MAX_WAIT_MS).and_then(|v| v.parse().ok()) {
            scheduler.max_wait_ms = Some(ms);
        }

        let mut storage = StorageSettings::from_file(file.storage);
        if let Some(dir) = env(ENV_STORAGE_DIR) {
            storage.dir = Some(PathBuf::from(dir));
        }

        Self {
            scheduler,
            logging: LoggingConfig::from_file(file.logging),
            storage,
        }
    }
}
