//! # Session Configuration
//!
//! Loaded once at startup from TOML. Every section is optional.
//!
//! ```toml
//! [runtime]
//! seed = 1234
//!
//! [websocket]
//! url = "ws://127.0.0.1:7878"
//! room_id = "lobby"
//! player_id = "alice"
//!
//! [inspector]
//! max_actions = 256
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tether_networking::WsConfig;

use crate::error::ConfigError;
use crate::inspector::InspectorConfig;

/// Runtime settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Seed of the session random stream.
    pub seed: u64,
}

impl RuntimeConfig {
    /// Config with the given seed.
    #[must_use]
    pub const fn with_seed(seed: u64) -> Self {
        Self { seed }
    }
}

/// Everything a session needs at startup.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Runtime settings.
    pub runtime: RuntimeConfig,
    /// WebSocket transport settings, when that backend is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub websocket: Option<WsConfig>,
    /// Inspector limits.
    pub inspector: InspectorConfig,
}

impl SessionConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for bad TOML and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`SessionConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!(path = %path.display(), "session config loaded");
        Ok(config)
    }

    /// Checks ids and capacities.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ws) = &self.websocket {
            ws.validate().map_err(|err| ConfigError::Invalid(err.to_string()))?;
        }
        self.inspector.validate()
    }
}
