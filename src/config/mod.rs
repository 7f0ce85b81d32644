//! Configuration management.
//!
//! Settings live in `~/.claude-history-sync/config.yaml`. Every field is
//! optional, `null` counts as unset, and a missing or empty file means all
//! defaults. JSON is valid YAML, so a JSON file passed with `--config`
//! works too. Unknown keys are ignored. After the file is read,
//! `CLAUDE_HISTORY_*` environment variables override individual fields.
//!
//! Resolution happens once at startup. The resulting [`Config`] is passed
//! down explicitly; nothing below the CLI reads the environment.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::sync::state::default_state_path;

/// App directory name under the home directory.
pub const APP_DIR_NAME: &str = ".claude-history-sync";

/// Config file name inside the app directory.
pub const CONFIG_FILE: &str = "config.yaml";

/// History service used when none is configured.
pub const DEFAULT_API_ENDPOINT: &str = "https://claude-history-mcp.devrel.hny.wtf";

/// Environment overrides, applied after the file.
pub const ENV_API_ENDPOINT: &str = "CLAUDE_HISTORY_API_ENDPOINT";
pub const ENV_MACHINE_ID: &str = "CLAUDE_HISTORY_MACHINE_ID";
pub const ENV_DATA_DIR: &str = "CLAUDE_HISTORY_DATA_DIR";

/// Sync configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the history service.
    #[serde(deserialize_with = "null_as_default")]
    pub api_endpoint: String,
    /// Identifies this machine to the server.
    #[serde(deserialize_with = "null_as_default")]
    pub machine_id: String,
    /// Root of the Claude conversation logs.
    #[serde(deserialize_with = "null_as_default")]
    pub claude_data_dir: PathBuf,
    /// Glob patterns (matched against file names) or substrings (matched
    /// against full paths) of logs to leave out.
    #[serde(deserialize_with = "null_as_default")]
    pub exclude_patterns: Vec<String>,
}

/// `key:` with no value parses as `null`; treat it like an absent key.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
            machine_id: default_machine_id(),
            claude_data_dir: default_claude_data_dir(),
            exclude_patterns: Vec::new(),
        }
    }
}

impl Config {
    /// Resolve the configuration for this process.
    ///
    /// Priority for each field:
    /// 1. `CLAUDE_HISTORY_*` environment variable
    /// 2. Config file (`explicit_path`, else `~/.claude-history-sync/config.yaml`)
    /// 3. Built-in default
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the config file exists but cannot be read
    /// or parsed.
    pub fn resolve(explicit_path: Option<&Path>) -> Result<Self> {
        let path = explicit_path.map_or_else(default_config_path, Path::to_path_buf);
        let mut config = Self::load_from(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from `path`; a missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(Error::Config(format!(
                    "cannot read {}: {e}",
                    path.display()
                )));
            }
        };

        let mut config: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(&content)
                .map_err(|e| Error::Config(format!("invalid {}: {e}", path.display())))?
        };
        config.normalize();
        Ok(config)
    }

    /// Apply overrides from `lookup` (normally the process environment).
    /// Blank values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(endpoint) = get(ENV_API_ENDPOINT) {
            self.api_endpoint = endpoint;
        }
        if let Some(machine_id) = get(ENV_MACHINE_ID) {
            self.machine_id = machine_id;
        }
        if let Some(dir) = get(ENV_DATA_DIR) {
            self.claude_data_dir = PathBuf::from(dir);
        }
        self.normalize();
    }

    /// Fill blank fields with defaults and drop blank exclude patterns.
    fn normalize(&mut self) {
        self.api_endpoint = self.api_endpoint.trim().trim_end_matches('/').to_string();
        if self.api_endpoint.is_empty() {
            self.api_endpoint = DEFAULT_API_ENDPOINT.to_string();
        }
        self.machine_id = self.machine_id.trim().to_string();
        if self.machine_id.is_empty() {
            self.machine_id = default_machine_id();
        }
        if self.claude_data_dir.as_os_str().is_empty() {
            self.claude_data_dir = default_claude_data_dir();
        }
        self.exclude_patterns.retain(|p| !p.trim().is_empty());
    }
}

/// The app directory: `~/.claude-history-sync`, or relative to the
/// working directory when there is no home directory.
#[must_use]
pub fn app_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(APP_DIR_NAME),
        |b| b.home_dir().join(APP_DIR_NAME),
    )
}

/// `~/.claude-history-sync/config.yaml`.
#[must_use]
pub fn default_config_path() -> PathBuf {
    app_dir().join(CONFIG_FILE)
}

/// `~/.claude/projects`.
#[must_use]
pub fn default_claude_data_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".claude").join("projects"),
        |b| b.home_dir().join(".claude").join("projects"),
    )
}

/// Resolve the state file path.
///
/// Priority:
/// 1. `explicit_path` (from `--state` or `CLAUDE_HISTORY_STATE`)
/// 2. `~/.claude-history-sync/state.json`
#[must_use]
pub fn resolve_state_path(explicit_path: Option<&Path>) -> PathBuf {
    explicit_path.map_or_else(|| default_state_path(&app_dir()), Path::to_path_buf)
}

/// Default machine identifier: the host name.
///
/// Priority:
/// 1. `HOSTNAME` environment variable
/// 2. `/etc/hostname`
/// 3. `hostname` command
/// 4. "unknown"
#[must_use]
pub fn default_machine_id() -> String {
    if let Ok(name) = std::env::var("HOSTNAME") {
        let name = name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
    }

    if let Ok(name) = fs::read_to_string("/etc/hostname") {
        let name = name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
    }

    if let Ok(output) = std::process::Command::new("hostname").output() {
        if output.status.success() {
            let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !name.is_empty() {
                return name;
            }
        }
    }

    "unknown".to_string()
}
