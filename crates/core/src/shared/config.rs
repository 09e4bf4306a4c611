//! Runtime configuration: an optional JSON settings file overlaid with
//! environment variables.
//!
//! Backend credentials are normally supplied through the environment; a
//! configuration without any vision backend is valid and makes escalation
//! resolve to its safe default.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::constants::{CAMERA_FPS, CAMERA_HEIGHT, CAMERA_WIDTH};

pub const ENV_CUSTOM_VLM_ENDPOINT: &str = "CUSTOM_VLM_ENDPOINT";
pub const ENV_CUSTOM_VLM_API_KEY: &str = "CUSTOM_VLM_API_KEY";
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_OPENAI_API_URL: &str = "OPENAI_API_URL";
pub const ENV_FLAG_STORE_URL: &str = "PROCTOR_FLAG_STORE_URL";
pub const ENV_FLAG_STORE_KEY: &str = "PROCTOR_FLAG_STORE_KEY";
pub const ENV_FLAG_LOG: &str = "PROCTOR_FLAG_LOG";

pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read settings {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write settings {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Device name or path; `None` picks the platform default camera.
    pub device: Option<String>,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: None,
            width: CAMERA_WIDTH,
            height: CAMERA_HEIGHT,
            fps: CAMERA_FPS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub bundled_dir: Option<PathBuf>,
    /// Run the optional object detector alongside the face mesh.
    pub object_detection: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// Base URL of a self-hosted OpenAI-compatible server, e.g. `https://vlm.local/v1`.
    pub custom_endpoint: Option<String>,
    #[serde(skip_serializing)]
    pub custom_api_key: Option<String>,
    #[serde(skip_serializing)]
    pub openai_api_key: Option<String>,
    pub openai_url: String,
    pub request_timeout_secs: u64,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            custom_endpoint: None,
            custom_api_key: None,
            openai_api_key: None,
            openai_url: DEFAULT_OPENAI_URL.to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagStoreConfig {
    /// PostgREST base URL; takes precedence over the local log when set.
    pub rest_url: Option<String>,
    #[serde(skip_serializing)]
    pub rest_key: Option<String>,
    /// JSON-lines file for flags; defaults to the user data directory.
    pub log_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProctorConfig {
    pub camera: CameraConfig,
    pub models: ModelConfig,
    pub escalation: EscalationConfig,
    pub flag_store: FlagStoreConfig,
    /// Arm fullscreen/context-menu/camera lockdown when a session starts.
    pub lockdown: bool,
}

impl Default for ProctorConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            models: ModelConfig::default(),
            escalation: EscalationConfig::default(),
            flag_store: FlagStoreConfig::default(),
            lockdown: true,
        }
    }
}

impl ProctorConfig {
    pub fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("Proctor").join("settings.json"))
    }

    /// Settings file (if any) overlaid with the process environment.
    ///
    /// A missing or unreadable settings file falls back to defaults.
    pub fn load() -> Self {
        let mut config = Self::settings_path()
            .filter(|p| p.exists())
            .and_then(|p| match Self::from_file(&p) {
                Ok(c) => Some(c),
                Err(e) => {
                    log::warn!("Ignoring settings: {e}");
                    None
                }
            })
            .unwrap_or_default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&json).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Writes non-secret settings; API keys are never persisted.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |e: std::io::Error| ConfigError::Write {
            path: path.to_path_buf(),
            source: e,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        fs::write(path, json).map_err(write_err)
    }

    /// Overlays values found through `lookup`. Empty strings count as unset.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_CUSTOM_VLM_ENDPOINT) {
            self.escalation.custom_endpoint = Some(v);
        }
        if let Some(v) = get(ENV_CUSTOM_VLM_API_KEY) {
            self.escalation.custom_api_key = Some(v);
        }
        if let Some(v) = get(ENV_OPENAI_API_KEY) {
            self.escalation.openai_api_key = Some(v);
        }
        if let Some(v) = get(ENV_OPENAI_API_URL) {
            self.escalation.openai_url = v;
        }
        if let Some(v) = get(ENV_FLAG_STORE_URL) {
            self.flag_store.rest_url = Some(v);
        }
        if let Some(v) = get(ENV_FLAG_STORE_KEY) {
            self.flag_store.rest_key = Some(v);
        }
        if let Some(v) = get(ENV_FLAG_LOG) {
            self.flag_store.log_path = Some(PathBuf::from(v));
        }
    }
}
