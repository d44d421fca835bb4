//! Server configuration.

use relay_settings::ServerSettings;
use serde::{Deserialize, Serialize};

/// Configuration for the relay server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Outbound frames queued per connection before it is closed as too slow.
    pub send_queue_capacity: usize,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            send_queue_capacity: 1024,
            max_message_size: 1024 * 1024, // 1 MiB
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            send_queue_capacity: settings.send_queue_capacity,
            max_message_size: settings.max_message_size,
        }
    }
}

impl ServerConfig {
    /// `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_loopback_on_any_port() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.bind_addr(), "127.0.0.1:0");
    }

    #[test]
    fn default_limits() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.send_queue_capacity, 1024);
        assert_eq!(cfg.max_message_size, 1024 * 1024);
    }

    #[test]
    fn from_settings() {
        let settings = ServerSettings {
            host: "0.0.0.0".into(),
            port: 1337,
            send_queue_capacity: 16,
            max_message_size: 4096,
        };
        let cfg = ServerConfig::from(&settings);
        assert_eq!(cfg.bind_addr(), "0.0.0.0:1337");
        assert_eq!(cfg.send_queue_capacity, 16);
        assert_eq!(cfg.max_message_size, 4096);
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ServerConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.host, cfg.host);
        assert_eq!(back.port, cfg.port);
    }
}
