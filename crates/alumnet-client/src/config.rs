//! Client configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use alumnet_shared::constants::DEFAULT_HTTP_PORT;
use alumnet_shared::types::UserId;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the alumnet server. The live channel URL is derived from
    /// it by switching the scheme to `ws`/`wss`.
    /// Env: `ALUMNET_SERVER_URL`
    /// Default: `http://127.0.0.1:5001`
    pub server_url: String,

    /// Session user. The terminal client asks for one when unset.
    /// Env: `ALUMNET_USER_ID`
    pub user_id: Option<UserId>,

    /// Directory for per-user session snapshots.
    /// Env: `ALUMNET_DATA_DIR`
    /// Default: platform data directory (see `SnapshotStore::new`).
    pub data_dir: Option<PathBuf>,

    /// First delay before reconnecting the live channel.
    /// Env: `ALUMNET_RECONNECT_MIN_MS`
    /// Default: `500`
    pub reconnect_min: Duration,

    /// Upper bound for the reconnect delay.
    /// Env: `ALUMNET_RECONNECT_MAX_MS`
    /// Default: `30000`
    pub reconnect_max: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: format!("http://127.0.0.1:{DEFAULT_HTTP_PORT}"),
            user_id: None,
            data_dir: None,
            reconnect_min: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("ALUMNET_SERVER_URL") {
            let url = url.trim().trim_end_matches('/');
            if !url.is_empty() {
                config.server_url = url.to_string();
            }
        }

        if let Some(id) = lookup("ALUMNET_USER_ID") {
            let id = id.trim();
            if !id.is_empty() {
                config.user_id = Some(UserId::from(id));
            }
        }

        if let Some(dir) = lookup("ALUMNET_DATA_DIR") {
            if !dir.is_empty() {
                config.data_dir = Some(PathBuf::from(dir));
            }
        }

        if let Some(val) = lookup("ALUMNET_RECONNECT_MIN_MS") {
            match val.parse::<u64>() {
                Ok(ms) if ms > 0 => config.reconnect_min = Duration::from_millis(ms),
                _ => tracing::warn!(value = %val, "Invalid ALUMNET_RECONNECT_MIN_MS, using default"),
            }
        }

        if let Some(val) = lookup("ALUMNET_RECONNECT_MAX_MS") {
            match val.parse::<u64>() {
                Ok(ms) if ms > 0 => config.reconnect_max = Duration::from_millis(ms),
                _ => tracing::warn!(value = %val, "Invalid ALUMNET_RECONNECT_MAX_MS, using default"),
            }
        }

        if config.reconnect_max < config.reconnect_min {
            tracing::warn!("ALUMNET_RECONNECT_MAX_MS below minimum, clamping");
            config.reconnect_max = config.reconnect_min;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.server_url, "http://127.0.0.1:5001");
        assert!(config.user_id.is_none());
        assert!(config.reconnect_min < config.reconnect_max);
    }

    #[test]
    fn test_env_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("ALUMNET_SERVER_URL", "https://alumni.example.org/"),
            ("ALUMNET_USER_ID", " 65f1c0 "),
            ("ALUMNET_DATA_DIR", "/tmp/alumnet"),
            ("ALUMNET_RECONNECT_MIN_MS", "100"),
            ("ALUMNET_RECONNECT_MAX_MS", "2000"),
        ]));
        assert_eq!(config.server_url, "https://alumni.example.org");
        assert_eq!(config.user_id, Some(UserId::from("65f1c0")));
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/alumnet")));
        assert_eq!(config.reconnect_min, Duration::from_millis(100));
        assert_eq!(config.reconnect_max, Duration::from_millis(2000));
    }

    #[test]
    fn test_invalid_backoff_falls_back() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("ALUMNET_RECONNECT_MIN_MS", "soon"),
            ("ALUMNET_RECONNECT_MAX_MS", "10"),
        ]));
        assert_eq!(config.reconnect_min, Duration::from_millis(500));
        assert_eq!(config.reconnect_max, config.reconnect_min);
    }
}
