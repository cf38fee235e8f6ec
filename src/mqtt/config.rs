use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::backoff::RetryPolicy;
use super::transport::{SessionParams, TrustRoots};

pub const DEFAULT_HOST: &str = "mqtt.miraie.in";
pub const DEFAULT_PORT: u16 = 8883;
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(30);

/// What the receive loop does with a message whose payload cannot be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DecodeFailurePolicy {
    /// Log it and keep the session.
    #[default]
    Skip,
    /// Treat it like a transport failure: drop the session and reconnect.
    Reconnect,
}

/// Static settings of one bridge instance, fixed for the lifetime of the manager.
#[derive(Debug, Clone, PartialEq)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    pub trust_roots: TrustRoots,
    pub client_id: String,
    pub keep_alive: Duration,
    pub request_capacity: usize,
    pub subbed_topics: Vec<String>,
    pub retry: RetryPolicy,
    pub decode_failure: DecodeFailurePolicy,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            use_tls: true,
            trust_roots: TrustRoots::Platform,
            client_id: random_client_id(),
            keep_alive: DEFAULT_KEEP_ALIVE,
            request_capacity: 100,
            subbed_topics: Vec::new(),
            retry: RetryPolicy::default(),
            decode_failure: DecodeFailurePolicy::default(),
        }
    }
}

impl MqttConfig {
    pub fn with_topics(mut self, topics: Vec<String>) -> Self {
        self.subbed_topics = topics;
        self
    }

    pub fn session_params(&self, username: &str, token: &str) -> SessionParams {
        SessionParams {
            host: self.host.clone(),
            port: self.port,
            client_id: self.client_id.clone(),
            username: username.to_string(),
            token: token.to_string(),
            tls: self.use_tls.then(|| self.trust_roots.clone()),
            keep_alive: self.keep_alive,
            request_capacity: self.request_capacity,
        }
    }
}

/// Client identifiers are picked once per process start.
pub fn random_client_id() -> String {
    let suffix: u16 = rand::thread_rng().gen_range(0..=1000);
    format!("ha-mirae-mqtt-{}", suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MqttConfig::default();
        assert_eq!(config.host, "mqtt.miraie.in");
        assert_eq!(config.port, 8883);
        assert!(config.use_tls);
        assert_eq!(config.retry.interval, Duration::from_secs(5));
        assert_eq!(config.retry.max_attempts, None);
        assert!(config.client_id.starts_with("ha-mirae-mqtt-"));
    }

    #[test]
    fn test_random_client_id_range() {
        for _ in 0..100 {
            let id = random_client_id();
            let n: u16 = id.trim_start_matches("ha-mirae-mqtt-").parse().unwrap();
            assert!(n <= 1000);
        }
    }

    #[test]
    fn test_session_params_without_tls() {
        let config = MqttConfig {
            use_tls: false,
            ..MqttConfig::default()
        };
        let params = config.session_params("user", "token");
        assert_eq!(params.tls, None);
        assert_eq!(params.username, "user");
        assert_eq!(params.token, "token");
        assert!(!format!("{:?}", params).contains("token\""));
    }
}
