//! Pipeline configuration.
//!
//! A TOML file at `~/.config/beatgate/config.toml` plus a resolution chain:
//! explicit override > env var > config file > default.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::generator::GenerationConfig;
use crate::orchestrator::{MAX_ATTEMPTS, OrchestratorConfig};
use crate::repair::RepairPolicy;

pub const ENV_STORE_ROOT: &str = "BEATGATE_STORE_ROOT";
pub const ENV_MODEL: &str = "BEATGATE_MODEL";
pub const ENV_MAX_ATTEMPTS: &str = "BEATGATE_MAX_ATTEMPTS";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub project: ProjectSection,
    pub generator: GenerationConfig,
    pub orchestrator: OrchestratorSection,
    pub store: StoreSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSection {
    pub id: String,
    pub stage: String,
    pub stage_name: String,
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            id: "default".to_string(),
            stage: "scene_board".to_string(),
            stage_name: "Scene Board".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    pub max_attempts: u32,
    pub repair_policy: RepairPolicy,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            repair_policy: RepairPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// Store root. Unset means [`default_store_root`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// `$XDG_CONFIG_HOME/beatgate` or `~/.config/beatgate`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("beatgate");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("beatgate")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// `$XDG_DATA_HOME/beatgate` or `~/.local/share/beatgate`.
pub fn default_store_root() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg).join("beatgate");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".local")
        .join("share")
        .join("beatgate")
}

// -----------------------------------------------------------------------
// Load / resolve
// -----------------------------------------------------------------------

impl PipelineConfig {
    /// Load and parse a config file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadConfig {
            path: path.display().to_string(),
            source: e,
        })?;
        toml::from_str(&contents).map_err(|e| ConfigError::ParseConfig {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Resolve configuration using the chain: override > env var > config
    /// file > default.
    ///
    /// - store root: `store_root_override` > `BEATGATE_STORE_ROOT` > `[store] root` > [`default_store_root`]
    /// - model: `BEATGATE_MODEL` > `[generator] model` > empty
    /// - max attempts: `BEATGATE_MAX_ATTEMPTS` > `[orchestrator] max_attempts` > `MAX_ATTEMPTS`
    ///
    /// A missing config file is not an error; an unreadable or malformed one
    /// is.
    pub fn resolve(store_root_override: Option<&Path>) -> Result<Self, ConfigError> {
        let path = config_path();
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            tracing::debug!(path = %path.display(), "no config file; using defaults");
            Self::default()
        };

        if let Ok(model) = std::env::var(ENV_MODEL) {
            config.generator.model = model;
        }

        if let Ok(raw) = std::env::var(ENV_MAX_ATTEMPTS) {
            config.orchestrator.max_attempts = parse_max_attempts(&raw)?;
        }

        config.store.root = Some(match store_root_override {
            Some(root) => root.to_path_buf(),
            None => match std::env::var(ENV_STORE_ROOT) {
                Ok(root) => PathBuf::from(root),
                Err(_) => config.store.root.take().unwrap_or_else(default_store_root),
            },
        });

        Ok(config)
    }

    /// Store root, falling back to [`default_store_root`].
    pub fn store_root(&self) -> PathBuf {
        self.store.root.clone().unwrap_or_else(default_store_root)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_attempts: self.orchestrator.max_attempts,
            repair_policy: self.orchestrator.repair_policy,
            generation: self.generator.clone(),
            project_id: self.project.id.clone(),
            stage_id: self.project.stage.clone(),
            stage_name: self.project.stage_name.clone(),
        }
    }
}

fn parse_max_attempts(raw: &str) -> Result<u32, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidValue {
        key: ENV_MAX_ATTEMPTS.to_string(),
        value: raw.to_string(),
        reason: reason.to_string(),
    };
    match raw.trim().parse::<u32>() {
        Ok(0) => Err(invalid("must be at least 1")),
        Ok(n) => Ok(n),
        Err(_) => Err(invalid("not a positive integer")),
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
