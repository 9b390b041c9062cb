use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

use url::Url;

use crate::error::{RealtimeError, Result};
use crate::transport::{ReconnectPolicy, TransportKind, TransportOptions};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// Base address of the messaging backend (http/https or ws/wss)
    #[serde(default = "default_url")]
    pub url: String,
    /// Engine.IO endpoint path
    #[serde(default = "default_path")]
    pub path: String,
    /// Transport preference order
    #[serde(default = "default_transports")]
    pub transports: Vec<TransportKind>,
    #[serde(default = "default_reconnection")]
    pub reconnection: bool,
    /// Reconnection attempt ceiling
    #[serde(default = "default_reconnection_attempts")]
    pub reconnection_attempts: u32,
    /// Delay between reconnection attempts in milliseconds
    #[serde(default = "default_reconnection_delay_ms")]
    pub reconnection_delay_ms: u64,
    /// Jitter applied to the reconnection delay (0.0 keeps it fixed)
    #[serde(default)]
    pub randomization_factor: f64,
    /// Handshake timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Outbound queue capacity per connection
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Fallback filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

/// Credentials and defaults used by the command-line client
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionConfig {
    pub token: Option<String>,
    pub conversation: Option<String>,
}

fn default_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_path() -> String {
    "/socket.io/".to_string()
}

fn default_transports() -> Vec<TransportKind> {
    vec![TransportKind::Websocket, TransportKind::Polling]
}

fn default_reconnection() -> bool {
    true
}

fn default_reconnection_attempts() -> u32 {
    5
}

fn default_reconnection_delay_ms() -> u64 {
    1000 // 1 second
}

fn default_connect_timeout_ms() -> u64 {
    20_000 // 20 seconds
}

fn default_outbound_buffer() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    pub fn new() -> std::result::Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("realtime.url", default_url())?
            .set_default("realtime.path", default_path())?
            .set_default("realtime.reconnection_attempts", default_reconnection_attempts())?
            .set_default("realtime.reconnection_delay_ms", default_reconnection_delay_ms())?
            .set_default("logging.level", default_log_level())?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // APP__REALTIME__URL, APP__SESSION__TOKEN, APP__REALTIME__TRANSPORTS=websocket,polling
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("realtime.transports"),
            );

        builder.build()?.try_deserialize()
    }
}

impl RealtimeConfig {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            enabled: self.reconnection,
            max_attempts: self.reconnection_attempts,
            delay: Duration::from_millis(self.reconnection_delay_ms),
            randomization_factor: self.randomization_factor.clamp(0.0, 1.0),
        }
    }

    /// Validate and convert into the options a connector is built from
    pub fn transport_options(&self) -> Result<TransportOptions> {
        let url = Url::parse(&self.url)
            .map_err(|e| RealtimeError::Validation(format!("invalid realtime url {}: {}", self.url, e)))?;

        if !matches!(url.scheme(), "http" | "https" | "ws" | "wss") {
            return Err(RealtimeError::Validation(format!(
                "unsupported realtime url scheme: {}",
                url.scheme()
            )));
        }

        if self.transports.is_empty() {
            return Err(RealtimeError::Validation(
                "at least one transport must be configured".to_string(),
            ));
        }

        let mut transports = Vec::with_capacity(self.transports.len());
        for kind in &self.transports {
            if !transports.contains(kind) {
                transports.push(*kind);
            }
        }

        Ok(TransportOptions {
            url,
            path: self.path.clone(),
            transports,
            reconnection: self.reconnect_policy(),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            outbound_buffer: self.outbound_buffer.max(1),
        })
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            path: default_path(),
            transports: default_transports(),
            reconnection: default_reconnection(),
            reconnection_attempts: default_reconnection_attempts(),
            reconnection_delay_ms: default_reconnection_delay_ms(),
            randomization_factor: 0.0,
            connect_timeout_ms: default_connect_timeout_ms(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let realtime = RealtimeConfig::default();
        assert_eq!(realtime.url, "http://localhost:5000");
        assert_eq!(realtime.reconnection_attempts, 5);
        assert_eq!(realtime.reconnection_delay_ms, 1000);
        assert_eq!(
            realtime.transports,
            vec![TransportKind::Websocket, TransportKind::Polling]
        );
    }

    #[test]
    fn test_transport_options_from_defaults() {
        let options = RealtimeConfig::default().transport_options().unwrap();
        assert_eq!(options.url.as_str(), "http://localhost:5000/");
        assert!(options.reconnection.enabled);
        assert_eq!(options.reconnection.max_attempts, 5);
        assert_eq!(options.reconnection.delay, Duration::from_secs(1));
        assert_eq!(options.connect_timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_transport_options_rejects_bad_url() {
        let config = RealtimeConfig {
            url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.transport_options(),
            Err(RealtimeError::Validation(_))
        ));

        let config = RealtimeConfig {
            url: "ftp://localhost".to_string(),
            ..Default::default()
        };
        assert!(config.transport_options().is_err());
    }

    #[test]
    fn test_transport_options_requires_a_transport() {
        let config = RealtimeConfig {
            transports: vec![],
            ..Default::default()
        };
        assert!(config.transport_options().is_err());
    }

    #[test]
    fn test_duplicate_transports_are_collapsed() {
        let config = RealtimeConfig {
            transports: vec![
                TransportKind::Polling,
                TransportKind::Websocket,
                TransportKind::Polling,
            ],
            ..Default::default()
        };
        let options = config.transport_options().unwrap();
        assert_eq!(
            options.transports,
            vec![TransportKind::Polling, TransportKind::Websocket]
        );
    }

    #[test]
    fn test_randomization_factor_is_clamped() {
        let config = RealtimeConfig {
            randomization_factor: 3.0,
            ..Default::default()
        };
        assert_eq!(config.reconnect_policy().randomization_factor, 1.0);
    }
}
