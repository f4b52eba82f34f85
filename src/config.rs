//! Configuration loading and management

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use globalkey::backend::{self, Backend, MemoryBackend};
use globalkey::{Key, Modifier, Modifiers};
use serde::Deserialize;

/// Environment variable naming an explicit config file
const CONFIG_ENV: &str = "GLOBALKEY_CONFIG";

/// Which hotkey backend the daemon uses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// The platform's native backend
    #[default]
    Native,
    /// The in-process backend, optionally driven by simulated presses
    Memory,
}

/// Daemon configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Modifiers that make up the hotkey
    pub modifiers: Vec<Modifier>,

    /// Platform key code of the hotkey
    pub key: u32,

    /// Backend to register with
    pub backend: BackendKind,

    /// Period of simulated press/release pairs (memory backend only)
    pub simulate_interval_ms: Option<u64>,

    /// Default tracing filter when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            modifiers: vec![Modifier::Control, Modifier::Shift],
            // 's' on X11 keysyms; see the platform key tables for others
            key: 0x73,
            backend: BackendKind::Native,
            simulate_interval_ms: None,
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from `GLOBALKEY_CONFIG` or the default location
    ///
    /// A missing file yields the defaults.
    pub fn load() -> Result<Self> {
        let path = match std::env::var_os(CONFIG_ENV) {
            Some(path) => PathBuf::from(path),
            None => Self::default_path()?,
        };
        Self::load_from(&path)
    }

    /// Load configuration from `path`, falling back to defaults if absent
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    fn default_path() -> Result<PathBuf> {
        let home = std::env::var("HOME").context("HOME is not set")?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("globalkey")
            .join("config.json"))
    }

    /// The configured modifier set
    pub fn modifier_set(&self) -> Modifiers {
        self.modifiers.iter().copied().collect()
    }

    /// The configured key
    pub fn hotkey_key(&self) -> Key {
        Key::from_code(self.key)
    }

    /// Build the configured backend
    ///
    /// The memory backend is also returned concretely so the daemon can
    /// drive simulated presses.
    pub fn build_backend(&self) -> (Arc<dyn Backend>, Option<Arc<MemoryBackend>>) {
        match self.backend {
            BackendKind::Native => (backend::native(), None),
            BackendKind::Memory => {
                let memory = Arc::new(MemoryBackend::new());
                let backend: Arc<dyn Backend> = memory.clone();
                (backend, Some(memory))
            }
        }
    }
}
