//! Gateway configuration

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// WebSocket server configuration
    pub server: ServerConfig,
    /// Upstream exchange feed configuration
    pub exchange: ExchangeConfig,
}

/// WebSocket listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listener host
    pub host: String,
    /// Listener port
    pub port: u16,
}

/// Upstream feed configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Instruments subscribed at startup
    pub instruments: Vec<String>,
    /// Simulated feed tick interval in milliseconds
    pub tick_interval_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 9001,
            },
            exchange: ExchangeConfig {
                instruments: vec!["BTC-PERPETUAL".to_string(), "ETH-PERPETUAL".to_string()],
                tick_interval_ms: 250,
            },
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a file, with `GATEWAY_`-prefixed
    /// environment variables layered on top.
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("GATEWAY").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Listener address in `host:port` form.
    #[must_use]
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_loopback_with_seed_instruments() {
        let config = GatewayConfig::default();
        assert_eq!(config.server_address(), "127.0.0.1:9001");
        assert!(config.exchange.instruments.contains(&"BTC-PERPETUAL".to_string()));
        assert!(config.exchange.tick_interval_ms > 0);
    }
}
