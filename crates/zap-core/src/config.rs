//! Configuration management
//!
//! Settings are resolved in this order:
//! 1. Environment variables
//! 2. A `zapsync.toml` config file
//! 3. Defaults
//!
//! Inside the config file, `${VAR_NAME}` expands to the value of the
//! environment variable.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Error;

/// Bot control API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Base URL of the bot control backend
    #[serde(default = "default_control_url")]
    pub url: String,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            url: default_control_url(),
        }
    }
}

/// Document store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base URL of the document store REST surface
    #[serde(default = "default_store_url")]
    pub url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
        }
    }
}

/// Identity provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Base URL of the identity provider
    #[serde(default = "default_auth_url")]
    pub url: String,

    /// Sign-in email
    pub email: Option<String>,

    /// Sign-in password
    pub password: Option<String>,

    /// Token refresh interval in minutes (provider tokens expire after an hour)
    #[serde(default = "default_refresh_minutes")]
    pub refresh_minutes: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            url: default_auth_url(),
            email: None,
            password: None,
            refresh_minutes: default_refresh_minutes(),
        }
    }
}

/// Push channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    /// WebSocket URL of the push channel
    #[serde(default = "default_push_url")]
    pub url: String,

    /// Maximum reconnect attempts before giving up
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,

    /// Fixed delay between reconnect attempts, in seconds
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,

    /// Per-attempt connect timeout, in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            url: default_push_url(),
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Synchronizer timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Persisted-status poll interval, in seconds
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Lifetime of a QR payload before it is discarded, in seconds
    #[serde(default = "default_qr_timeout_secs")]
    pub qr_timeout_secs: u64,

    /// Deadline for the first QR after a start request, in seconds
    #[serde(default = "default_qr_timeout_secs")]
    pub start_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            qr_timeout_secs: default_qr_timeout_secs(),
            start_timeout_secs: default_qr_timeout_secs(),
        }
    }
}

/// Main configuration for zapsync
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub control: ControlConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub push: PushConfig,

    #[serde(default)]
    pub sync: SyncConfig,
}

fn default_control_url() -> String {
    "http://localhost:3001".to_string()
}

fn default_store_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_auth_url() -> String {
    "http://localhost:9099".to_string()
}

fn default_push_url() -> String {
    "ws://localhost:3001/ws".to_string()
}

fn default_refresh_minutes() -> u64 {
    45
}

fn default_reconnect_attempts() -> u32 {
    20
}

fn default_reconnect_delay_secs() -> u64 {
    2
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_qr_timeout_secs() -> u64 {
    30
}

impl Config {
    /// Expand `${VAR_NAME}` references to environment variable values.
    ///
    /// Unset variables expand to the empty string.
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next(); // consume '{'

                let mut var_name = String::new();
                while let Some(&c) = chars.peek() {
                    if c == '}' {
                        chars.next(); // consume '}'
                        break;
                    }
                    var_name.push(chars.next().unwrap());
                }

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// Load configuration from a TOML file.
    ///
    /// `${VAR_NAME}` inside the file is replaced with the environment
    /// variable's value; environment overrides are applied afterwards.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let toml_content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let expanded_content = Self::expand_env_vars(&toml_content);

        let mut config: Config = toml::from_str(&expanded_content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from the default locations.
    ///
    /// Tries `./zapsync.toml` first, then falls back to environment
    /// variables only.
    pub fn load() -> crate::Result<Self> {
        if Path::new("zapsync.toml").exists() {
            return Self::from_toml_file("zapsync.toml");
        }

        Ok(Self::from_env())
    }

    /// Load configuration from environment variables alone.
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Override settings from environment variables.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("ZAPSYNC_API_URL") {
            self.control.url = url;
        }
        if let Ok(url) = std::env::var("ZAPSYNC_STORE_URL") {
            self.store.url = url;
        }
        if let Ok(url) = std::env::var("ZAPSYNC_AUTH_URL") {
            self.auth.url = url;
        }
        if let Ok(email) = std::env::var("ZAPSYNC_AUTH_EMAIL") {
            self.auth.email = Some(email);
        }
        if let Ok(password) = std::env::var("ZAPSYNC_AUTH_PASSWORD") {
            self.auth.password = Some(password);
        }
        if let Ok(url) = std::env::var("ZAPSYNC_PUSH_URL") {
            self.push.url = url;
        }
        if let Ok(secs) = std::env::var("ZAPSYNC_POLL_INTERVAL_SECS") {
            if let Ok(v) = secs.parse() {
                self.sync.poll_interval_secs = v;
            }
        }
        if let Ok(secs) = std::env::var("ZAPSYNC_QR_TIMEOUT_SECS") {
            if let Ok(v) = secs.parse() {
                self.sync.qr_timeout_secs = v;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.control.url, "http://localhost:3001");
        assert_eq!(config.sync.poll_interval_secs, 5);
        assert_eq!(config.sync.qr_timeout_secs, 30);
        assert_eq!(config.push.reconnect_attempts, 20);
        assert_eq!(config.push.reconnect_delay_secs, 2);
        assert_eq!(config.auth.refresh_minutes, 45);
    }

    #[test]
    fn test_expand_env_vars() {
        unsafe {
            std::env::set_var("ZAPSYNC_TEST_VAR", "test_value");
        }

        let result = Config::expand_env_vars("prefix_${ZAPSYNC_TEST_VAR}_suffix");
        assert_eq!(result, "prefix_test_value_suffix");

        let result = Config::expand_env_vars("prefix_${NONEXISTENT_VAR}_suffix");
        assert_eq!(result, "prefix__suffix");

        unsafe {
            std::env::remove_var("ZAPSYNC_TEST_VAR");
        }
    }

    #[test]
    fn test_expand_env_vars_no_braces() {
        let result = Config::expand_env_vars("no_vars_here");
        assert_eq!(result, "no_vars_here");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_content = r#"
[control]
url = "https://backend.example.com"

[push]
url = "wss://backend.example.com/ws"
reconnect_attempts = 5

[sync]
poll_interval_secs = 10
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.control.url, "https://backend.example.com");
        assert_eq!(config.push.reconnect_attempts, 5);
        assert_eq!(config.push.reconnect_delay_secs, 2);
        assert_eq!(config.sync.poll_interval_secs, 10);
        assert_eq!(config.sync.qr_timeout_secs, 30);
    }
}
