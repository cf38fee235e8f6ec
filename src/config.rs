//! On-disk configuration.
//!
//! Every field is optional; a missing file section falls back to the broker defaults.
//! [`BridgeConfig::into_mqtt_config`] turns the file representation into the immutable
//! [`MqttConfig`] handed to the connection manager.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::mqtt::backoff::{BackoffStrategy, RetryPolicy};
use crate::mqtt::config::{
    random_client_id, DecodeFailurePolicy, MqttConfig, DEFAULT_HOST, DEFAULT_KEEP_ALIVE,
    DEFAULT_PORT,
};
use crate::mqtt::error::BridgeError;
use crate::mqtt::transport::TrustRoots;

const CONFIG_DIR: &str = "miraie-bridge";
const CONFIG_FILE: &str = "config.toml";

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    /// Status topics to subscribe to, in order.
    pub topics: Vec<String>,
    pub broker: BrokerSection,
    pub reconnect: ReconnectSection,
    pub dispatch: DispatchSection,
    pub logging: LoggingSection,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BrokerSection {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    /// PEM bundle of trusted CAs; the platform store is used when unset.
    pub ca_bundle: Option<PathBuf>,
    /// Randomized per process start when unset.
    pub client_id: Option<String>,
    pub keep_alive_secs: u64,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            use_tls: true,
            ca_bundle: None,
            client_id: None,
            keep_alive_secs: DEFAULT_KEEP_ALIVE.as_secs(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ReconnectSection {
    pub interval_secs: u64,
    /// Unlimited when unset.
    pub max_attempts: Option<u32>,
    pub strategy: BackoffStrategy,
    pub multiplier: f64,
    pub max_interval_secs: u64,
}

impl Default for ReconnectSection {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            interval_secs: policy.interval.as_secs(),
            max_attempts: policy.max_attempts,
            strategy: policy.strategy,
            multiplier: policy.multiplier,
            max_interval_secs: policy.max_interval.as_secs(),
        }
    }
}

impl From<&ReconnectSection> for RetryPolicy {
    fn from(section: &ReconnectSection) -> Self {
        RetryPolicy {
            interval: Duration::from_secs(section.interval_secs),
            strategy: section.strategy,
            multiplier: section.multiplier,
            max_interval: Duration::from_secs(section.max_interval_secs),
            max_attempts: section.max_attempts,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct DispatchSection {
    pub decode_failure: DecodeFailurePolicy,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct LoggingSection {
    /// `tracing` filter directive, e.g. `info` or `miraie_bridge=debug`.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl BridgeConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, BridgeError> {
        let config: BridgeConfig =
            toml::from_str(content).map_err(|e| BridgeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: &Path) -> Result<Self, BridgeError> {
        info!("Loading configuration from {}", path.display());
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_toml_str(&content)
    }

    /// Loads `path` if it exists, the defaults otherwise.
    pub async fn load_or_default(path: &Path) -> Result<Self, BridgeError> {
        if tokio::fs::try_exists(path).await? {
            Self::load(path).await
        } else {
            debug!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// `$XDG_CONFIG_HOME/miraie-bridge/config.toml` or the platform equivalent.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    pub fn to_toml_string(&self) -> Result<String, BridgeError> {
        toml::to_string_pretty(self).map_err(|e| BridgeError::Config(e.to_string()))
    }

    fn validate(&self) -> Result<(), BridgeError> {
        if self.broker.host.trim().is_empty() {
            return Err(BridgeError::Config("broker.host must not be empty".into()));
        }
        if self.broker.port == 0 {
            return Err(BridgeError::Config("broker.port must not be 0".into()));
        }
        if self.reconnect.interval_secs == 0 && self.reconnect.max_attempts.is_none() {
            return Err(BridgeError::Config(
                "reconnect.interval_secs = 0 without max_attempts would spin forever".into(),
            ));
        }
        Ok(())
    }

    pub fn into_mqtt_config(self) -> MqttConfig {
        let retry = RetryPolicy::from(&self.reconnect);
        let trust_roots = match self.broker.ca_bundle {
            Some(path) => TrustRoots::CaBundle(path),
            None => TrustRoots::Platform,
        };
        MqttConfig {
            host: self.broker.host,
            port: self.broker.port,
            use_tls: self.broker.use_tls,
            trust_roots,
            client_id: self.broker.client_id.unwrap_or_else(random_client_id),
            keep_alive: Duration::from_secs(self.broker.keep_alive_secs),
            subbed_topics: self.topics,
            retry,
            decode_failure: self.dispatch.decode_failure,
            ..MqttConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_yields_defaults() {
        let config = BridgeConfig::from_toml_str("").unwrap();
        assert_eq!(config, BridgeConfig::default());

        let mqtt = config.into_mqtt_config();
        assert_eq!(mqtt.host, "mqtt.miraie.in");
        assert_eq!(mqtt.port, 8883);
        assert!(mqtt.use_tls);
        assert_eq!(mqtt.trust_roots, TrustRoots::Platform);
        assert_eq!(mqtt.retry, RetryPolicy::default());
        assert_eq!(mqtt.decode_failure, DecodeFailurePolicy::Skip);
    }

    #[test]
    fn test_full_file() {
        let config = BridgeConfig::from_toml_str(
            r#"
            topics = ["u1/ac1/status", "u1/ac2/status"]

            [broker]
            host = "broker.local"
            port = 1883
            use_tls = false
            client_id = "bridge-7"
            ca_bundle = "/etc/ssl/certs/ca.pem"

            [reconnect]
            interval_secs = 2
            max_attempts = 4
            strategy = "exponential"
            multiplier = 3.0
            max_interval_secs = 60

            [dispatch]
            decode_failure = "reconnect"

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.logging.level, "debug");

        let mqtt = config.into_mqtt_config();
        assert_eq!(mqtt.host, "broker.local");
        assert_eq!(mqtt.port, 1883);
        assert!(!mqtt.use_tls);
        assert_eq!(mqtt.client_id, "bridge-7");
        assert_eq!(
            mqtt.trust_roots,
            TrustRoots::CaBundle(PathBuf::from("/etc/ssl/certs/ca.pem"))
        );
        assert_eq!(mqtt.subbed_topics, vec!["u1/ac1/status", "u1/ac2/status"]);
        assert_eq!(mqtt.retry.interval, Duration::from_secs(2));
        assert_eq!(mqtt.retry.max_attempts, Some(4));
        assert_eq!(mqtt.retry.strategy, BackoffStrategy::Exponential);
        assert_eq!(mqtt.retry.max_interval, Duration::from_secs(60));
        assert_eq!(mqtt.decode_failure, DecodeFailurePolicy::Reconnect);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(BridgeConfig::from_toml_str("[broker]\nhost = \"\"").is_err());
        assert!(BridgeConfig::from_toml_str("[broker]\nport = 0").is_err());
        assert!(BridgeConfig::from_toml_str("[reconnect]\ninterval_secs = 0").is_err());
        assert!(BridgeConfig::from_toml_str("[reconnect]\nstrategy = \"random\"").is_err());
    }

    #[test]
    fn test_round_trips_through_toml() {
        let mut config = BridgeConfig::default();
        config.topics.push("u/a/status".into());
        config.reconnect.max_attempts = Some(3);
        let text = config.to_toml_string().unwrap();
        assert_eq!(BridgeConfig::from_toml_str(&text).unwrap(), config);
    }

    #[tokio::test]
    async fn test_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("miraie-bridge-does-not-exist.toml");
        let config = BridgeConfig::load_or_default(&path).await.unwrap();
        assert_eq!(config, BridgeConfig::default());
    }
}
