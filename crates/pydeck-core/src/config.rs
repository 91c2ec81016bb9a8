//! Application configuration.
//!
//! A single [`PydeckConfig`] value is built once (defaults, optionally
//! overlaid from a TOML file) and passed by reference to the components that
//! need it.  There is no global settings store.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ── Serde default helpers ────────────────────────────────────────────────────

fn default_read_timeout_ms() -> u64 {
    2000
}
fn default_workspace_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Bounds applied to the configured serial read timeout.
pub const MIN_READ_TIMEOUT_MS: u64 = 100;
pub const MAX_READ_TIMEOUT_MS: u64 = 60_000;

// ── Serial settings ──────────────────────────────────────────────────────────

/// Serial link settings shared by all device operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialSettings {
    /// Preferred port (e.g. `/dev/ttyACM0`, `COM3`).  `None` means
    /// auto-select the first detected board.
    #[serde(default)]
    pub port: Option<String>,

    /// Read timeout for every blocking device exchange, in milliseconds.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: None,
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl SerialSettings {
    /// The read timeout clamped into its supported range.
    pub fn clamped_timeout_ms(&self) -> u64 {
        self.read_timeout_ms
            .clamp(MIN_READ_TIMEOUT_MS, MAX_READ_TIMEOUT_MS)
    }
}

// ── Top-level configuration ──────────────────────────────────────────────────

/// Complete PyDeck configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PydeckConfig {
    /// Serial link settings.
    #[serde(default)]
    pub serial: SerialSettings,

    /// Synchronisation settings.
    #[serde(default)]
    pub sync: SyncSettings,

    /// Whether to set the board clock from the host clock after connecting.
    #[serde(default)]
    pub sync_clock_on_connect: bool,
}

/// Settings for directory listing and synchronisation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Local workspace directory used as the default sync source.
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: PathBuf,

    /// Show hidden entries in local listings.
    #[serde(default)]
    pub show_hidden_local: bool,

    /// Show hidden entries in device listings.
    #[serde(default)]
    pub show_hidden_device: bool,

    /// Delete destination-only entries when synchronising (mirror mode).
    #[serde(default)]
    pub mirror: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            workspace_dir: default_workspace_dir(),
            show_hidden_local: false,
            show_hidden_device: false,
            mirror: false,
        }
    }
}

impl PydeckConfig {
    /// Load configuration from a TOML file.  Missing keys fall back to their
    /// defaults; a missing file is an error so callers can distinguish "no
    /// config" from "broken config" themselves.
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read config '{}': {}", path.display(), e))?;
        toml::from_str(&text)
            .map_err(|e| format!("cannot parse config '{}': {}", path.display(), e))
    }

    /// Load from `path` when it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Self {
        if path.is_file() {
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => log::warn!("{}; using defaults", e),
            }
        }
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = PydeckConfig::default();
        assert_eq!(cfg.serial.read_timeout_ms, 2000);
        assert!(cfg.serial.port.is_none());
        assert!(!cfg.sync.mirror);
        assert!(!cfg.sync.show_hidden_device);
        assert!(!cfg.sync_clock_on_connect);
    }

    #[test]
    fn test_timeout_clamping() {
        let mut settings = SerialSettings::default();
        settings.read_timeout_ms = 1;
        assert_eq!(settings.clamped_timeout_ms(), MIN_READ_TIMEOUT_MS);
        settings.read_timeout_ms = 10_000_000;
        assert_eq!(settings.clamped_timeout_ms(), MAX_READ_TIMEOUT_MS);
        settings.read_timeout_ms = 3500;
        assert_eq!(settings.clamped_timeout_ms(), 3500);
    }

    #[test]
    fn test_load_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pydeck.toml");
        std::fs::write(
            &path,
            "[serial]\nread_timeout_ms = 5000\n\n[sync]\nmirror = true\n",
        )
        .unwrap();

        let cfg = PydeckConfig::load(&path).unwrap();
        assert_eq!(cfg.serial.read_timeout_ms, 5000);
        assert!(cfg.sync.mirror);
        // Unspecified keys keep their defaults
        assert!(cfg.serial.port.is_none());
        assert!(!cfg.sync.show_hidden_local);
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(PydeckConfig::load(&path).is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = PydeckConfig::load_or_default(&dir.path().join("absent.toml"));
        assert_eq!(cfg.serial.read_timeout_ms, 2000);
    }
}
