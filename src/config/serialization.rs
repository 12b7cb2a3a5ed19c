//! Config serialization to TOML
//!
//! Single source of truth for config file format.

use super::Config;

impl Config {
    /// `max_wait_ms` line: explicit value, or a commented hint with the preset
    fn max_wait_to_toml(&self) -> String {
        match self.scheduler.max_wait_ms {
            Some(ms) => format!("max_wait_ms = {ms}"),
            None => format!(
                "# max_wait_ms = {}  # defaults to the mode's ceiling",
                self.scheduler.effective_max_wait_ms()
            ),
        }
    }

    fn storage_dir_to_toml(&self) -> String {
        match &self.storage.dir {
            Some(dir) => format!("dir = {:?}", dir.display().to_string()),
            None => "# dir = \"~/.local/share/chatmount\"  # unset = in-memory only".to_string(),
        }
    }

    /// Serialize config to TOML format
    pub fn to_toml(&self) -> String {
        format!(
            r#"# chatmount configuration

# ─────────────────────────────────────────────────────────────────────────────
# Update scheduler
# ─────────────────────────────────────────────────────────────────────────────
# Commits to a container are coalesced: the platform adapter is called once
# the container has been quiet for debounce_ms, and at the latest max_wait_ms
# after the first commit of a burst.
[scheduler]
mode = "{mode}"  # production (2s ceiling), development (20s ceiling)
debounce_ms = {debounce_ms}
{max_wait}

# Logging configuration (RUST_LOG env var overrides)
[logging]
level = "{log_level}"
# File logging (in addition to stderr)
file_enabled = {log_file_enabled}
file_dir = {log_file_dir:?}
file_rotation = "{log_file_rotation}"  # hourly, daily, never
file_prefix = "{log_file_prefix}"

# Persisted routes and container state
[storage]
{storage_dir}
"#,
            mode = self.scheduler.mode.as_str(),
            debounce_ms = self.scheduler.debounce_ms,
            max_wait = self.max_wait_to_toml(),
            log_level = self.logging.level,
            log_file_enabled = self.logging.file_enabled,
            log_file_dir = self.logging.file_dir.display().to_string(),
            log_file_rotation = self.logging.file_rotation.as_str(),
            log_file_prefix = self.logging.file_prefix,
            storage_dir = self.storage_dir_to_toml(),
        )
    }
}
