use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the VCM simulator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Local address to bind to
    pub bind_addr: SocketAddr,
    /// Address messages are sent to until a peer is observed
    pub default_peer_addr: SocketAddr,
    /// Period of the timer driving the state machine tick
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub tick_interval: Duration,
    /// Interval between periodic status broadcasts
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub broadcast_interval: Duration,
    /// SSID name reported in status snapshots
    pub wifi_ssid: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: format!("0.0.0.0:{}", super::DEFAULT_PORT).parse().unwrap(),
            default_peer_addr: format!("{}:{}", super::DEFAULT_PEER_IP, super::DEFAULT_PORT)
                .parse()
                .unwrap(),
            tick_interval: Duration::from_millis(100),
            broadcast_interval: Duration::from_secs(5),
            wifi_ssid: "testas".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.bind_addr.port(), super::super::DEFAULT_PORT);
        assert_eq!(config.broadcast_interval, Duration::from_secs(5));
        assert_eq!(config.wifi_ssid, "testas");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let serialized = serde_json::to_string(&config).unwrap();
        let deserialized: Config = serde_json::from_str(&serialized).unwrap();

        assert_eq!(deserialized.bind_addr, config.bind_addr);
        assert_eq!(deserialized.tick_interval, config.tick_interval);
        assert_eq!(deserialized.wifi_ssid, config.wifi_ssid);
    }
}
