//! Scheduler configuration: debounce window and max-wait ceiling

use crate::scheduler::SchedulerConfig;
use serde::Deserialize;
use std::time::Duration;

// ─────────────────────────────────────────────────────────────────────────────
// Mode
// ─────────────────────────────────────────────────────────────────────────────

/// Build mode, which picks the max-wait preset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SchedulerMode {
    /// 2 s ceiling (default)
    #[default]
    Production,
    /// 20 s ceiling, tolerant of breakpoints and slow rebuilds
    Development,
}

impl SchedulerMode {
    /// Parse mode string from config or env
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Self::Development,
            _ => Self::Production, // Unknown values fall back to production
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Development => "development",
        }
    }

    fn preset(&self) -> SchedulerConfig {
        match self {
            Self::Production => SchedulerConfig::production(),
            Self::Development => SchedulerConfig::development(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Settings
// ─────────────────────────────────────────────────────────────────────────────

/// Scheduler settings
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    pub mode: SchedulerMode,
    /// Quiet period before a container is dispatched
    pub debounce_ms: u64,
    /// Overrides the mode's ceiling when set
    pub max_wait_ms: Option<u64>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            mode: SchedulerMode::default(),
            debounce_ms: SchedulerConfig::DEFAULT_DEBOUNCE.as_millis() as u64,
            max_wait_ms: None,
        }
    }
}

/// Scheduler settings as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileScheduler {
    pub mode: Option<String>,
    pub debounce_ms: Option<u64>,
    pub max_wait_ms: Option<u64>,
}

impl SchedulerSettings {
    /// Create from file config with defaults
    pub fn from_file(file: Option<FileScheduler>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            mode: file
                .mode
                .map(|s| SchedulerMode::from_str(&s))
                .unwrap_or(defaults.mode),
            debounce_ms: file.debounce_ms.unwrap_or(defaults.debounce_ms),
            max_wait_ms: file.max_wait_ms.or(defaults.max_wait_ms),
        }
    }

    /// Effective ceiling in milliseconds
    pub fn effective_max_wait_ms(&self) -> u64 {
        self.max_wait_ms
            .unwrap_or_else(|| self.mode.preset().max_wait.as_millis() as u64)
    }

    /// Timing the scheduler actually runs with
    ///
    /// A ceiling shorter than the debounce would make every window close at
    /// the ceiling, so it is raised to the debounce.
    pub fn to_scheduler_config(&self) -> SchedulerConfig {
        let debounce = Duration::from_millis(self.debounce_ms);
        let max_wait = Duration::from_millis(self.effective_max_wait_ms()).max(debounce);
        SchedulerConfig { debounce, max_wait }
    }
}
