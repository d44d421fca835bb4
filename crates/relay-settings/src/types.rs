//! Settings structures and their compiled defaults.

use relay_core::DEFAULT_PALETTE;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Listener and per-connection limits.
    pub server: ServerSettings,
    /// Color palette handed out to clients.
    pub colors: ColorSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl RelaySettings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(SettingsError::InvalidValue("server.host is empty".into()));
        }
        if self.server.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.sendQueueCapacity must be at least 1".into(),
            ));
        }
        if self.server.max_message_size == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxMessageSize must be at least 1".into(),
            ));
        }
        if self.colors.palette.iter().any(|c| c.trim().is_empty()) {
            return Err(SettingsError::InvalidValue(
                "colors.palette contains an empty name".into(),
            ));
        }
        Ok(())
    }
}

/// Listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listening port.
    pub port: u16,
    /// Outbound frames buffered per connection before it is dropped as too slow.
    pub send_queue_capacity: usize,
    /// Largest inbound WebSocket message accepted, in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 1337,
            send_queue_capacity: 1024,
            max_message_size: 1024 * 1024,
        }
    }
}

/// Color palette settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColorSettings {
    /// Ordered palette.
    pub palette: Vec<String>,
    /// Shuffle the palette once at startup.
    pub shuffle: bool,
}

impl Default for ColorSettings {
    fn default() -> Self {
        Self {
            palette: DEFAULT_PALETTE.iter().map(|c| (*c).to_string()).collect(),
            shuffle: true,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of the compact text format.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
