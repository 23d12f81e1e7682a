//! Configuration types for the SnapSolve tutor.
//!
//! This module provides the configuration used to reach the analysis
//! service, bound submitted images, and bind the HTTP server.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TutorError};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "snapsolve.json";

/// Default multimodal model used for analysis.
fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

/// Base URL of the Gemini REST API.
pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

/// Default environment variable holding the API key.
fn default_api_key_env() -> String {
    "API_KEY".to_string()
}

/// Default timeout in seconds for one analysis request.
const fn default_request_timeout() -> u32 {
    60
}

/// Default upper bound for submitted images (20 MiB, the inline data limit
/// of the Gemini API).
const fn default_max_image_bytes() -> u64 {
    crate::image::DEFAULT_MAX_IMAGE_BYTES
}

/// Default interface for the HTTP server.
fn default_host() -> String {
    "127.0.0.1".to_string()
}

/// Default port for the HTTP server.
const fn default_port() -> u16 {
    3000
}

/// Main configuration for SnapSolve.
///
/// Controls which model analyzes submissions, how the API key is found,
/// request and upload limits, and where the HTTP server listens.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Model name passed to the analysis service.
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of the analysis service REST API.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Name of the environment variable that holds the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Timeout for a single analysis request in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u32,

    /// Largest accepted image in bytes.
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: u64,

    /// Interface the HTTP server binds to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port the HTTP server binds to.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_base_url: default_api_base_url(),
            api_key_env: default_api_key_env(),
            request_timeout: default_request_timeout(),
            max_image_bytes: default_max_image_bytes(),
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `snapsolve.json` in the current directory. If not found,
    /// returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            TutorError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `snapsolve.json` in a specific directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        Self::load_from_file(&config_path)
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::ConfigParseError` if the file exists but contains
    /// invalid JSON.
    ///
    /// Returns `TutorError::ConfigValidationError` if the configuration values
    /// are invalid (e.g., zero timeout, empty model).
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(TutorError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| TutorError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// Checks that:
    /// - `model` and `api_key_env` are not empty
    /// - `api_base_url` is an http(s) URL
    /// - `request_timeout` and `max_image_bytes` are greater than 0
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(TutorError::config_validation(
                "model must not be empty",
                "Set model to a multimodal model such as \"gemini-2.5-flash\" in your snapsolve.json",
            ));
        }

        if !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://"))
        {
            return Err(TutorError::config_validation(
                format!("apiBaseUrl '{}' is not an http(s) URL", self.api_base_url),
                "Use the full URL including the scheme, e.g. https://generativelanguage.googleapis.com/v1beta",
            ));
        }

        if self.api_key_env.trim().is_empty() {
            return Err(TutorError::config_validation(
                "apiKeyEnv must not be empty",
                "Name the environment variable holding your API key, e.g. \"API_KEY\"",
            ));
        }

        if self.request_timeout == 0 {
            return Err(TutorError::config_validation(
                "requestTimeout must be greater than 0",
                "Set requestTimeout to at least 1 second in your snapsolve.json",
            ));
        }

        if self.max_image_bytes == 0 {
            return Err(TutorError::config_validation(
                "maxImageBytes must be greater than 0",
                "Remove maxImageBytes to use the 20 MiB default",
            ));
        }

        Ok(())
    }

    /// Returns the request timeout as a `Duration`.
    #[must_use]
    pub fn request_timeout_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.request_timeout))
    }

    /// Reads the API key from the configured environment variable.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::MissingApiKey` if the variable is unset or blank.
    pub fn api_key(&self) -> Result<String> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(TutorError::missing_api_key(&self.api_key_env)),
        }
    }
}
