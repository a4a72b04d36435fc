use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::store::{GopassConfig, GopassStore};

/// Default gopass binary, found via PATH.
fn default_gopass_binary() -> String {
    "gopass".to_string()
}

/// Default state file name, next to the config file.
pub const DEFAULT_STATE_FILE: &str = "gopass-bridge.state.json";

/// Application configuration.
///
/// ```toml
/// gopass_binary = "/usr/local/bin/gopass"
/// store = "work"
/// store_path = "~/.password-store"
/// state_file = "state/secrets.json"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the gopass binary. Defaults to `gopass`.
    #[serde(default = "default_gopass_binary")]
    pub gopass_binary: String,

    /// Name of the gopass store (mount) to use. Defaults to the root store.
    pub store: Option<String>,

    /// Directory of the password store, exported as `PASSWORD_STORE_DIR`.
    /// If not set, gopass uses its own configuration.
    pub store_path: Option<String>,

    /// Where managed secret state is kept. If relative, resolved from the
    /// config file location.
    pub state_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gopass_binary: default_gopass_binary(),
            store: None,
            store_path: None,
            state_file: None,
        }
    }
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load config from a file, or return default config if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Resolve the state file path.
    ///
    /// A relative `state_file` is resolved against `config_dir`; without one
    /// the default file name inside `config_dir` is used.
    pub fn resolve_state_file(&self, config_dir: &Path) -> PathBuf {
        match &self.state_file {
            Some(state_file) if state_file.is_absolute() => state_file.clone(),
            Some(state_file) => config_dir.join(state_file),
            None => config_dir.join(DEFAULT_STATE_FILE),
        }
    }

    pub fn gopass(&self) -> GopassConfig {
        GopassConfig {
            binary: self.gopass_binary.clone(),
            store: self.store.clone(),
            store_path: self.store_path.clone(),
        }
    }
}

/// Loaded configuration with resolved paths.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The resolved state file path.
    pub state_file: PathBuf,

    /// gopass backend settings.
    pub gopass: GopassConfig,
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./gopass-bridge.toml` if it exists in current directory
/// 2. `~/.config/gopass-bridge/gopass-bridge.toml` (XDG config directory)
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from("gopass-bridge.toml");
    if local_config.exists() {
        return local_config;
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("gopass-bridge").join("gopass-bridge.toml");
    }

    local_config
}

impl ResolvedConfig {
    /// Load and resolve config from a file path.
    ///
    /// The state file is resolved relative to the config file's parent directory.
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_path = config_path
            .canonicalize()
            .with_context(|| format!("Config file not found: {}", config_path.display()))?;

        let config_dir = config_path
            .parent()
            .context("Config file has no parent directory")?;

        let config = Config::load(&config_path)?;
        Ok(Self::from_config(&config, config_dir))
    }

    /// Load config, falling back to defaults if the file doesn't exist.
    ///
    /// Without a config file the state file lives in the directory the
    /// config file would have been in.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            return Self::load(config_path);
        }

        let config_path = if config_path.is_relative() {
            std::env::current_dir()
                .context("Failed to get current directory")?
                .join(config_path)
        } else {
            config_path.to_path_buf()
        };

        let config_dir = config_path
            .parent()
            .context("Config path has no parent directory")?;

        Ok(Self::from_config(&Config::default(), config_dir))
    }

    fn from_config(config: &Config, config_dir: &Path) -> Self {
        Self {
            state_file: config.resolve_state_file(config_dir),
            gopass: config.gopass(),
        }
    }

    /// Build the gopass store handle. Done once per process and passed to
    /// every operation.
    pub fn build_store(&self) -> Result<GopassStore> {
        GopassStore::new(self.gopass.clone()).context("Failed to initialize gopass store")
    }
}
