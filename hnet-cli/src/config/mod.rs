use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf, time::Duration};
use tracing::{debug, info};

use crate::wait::WaitPolicy;

pub const ENV_NON_INTERACTIVE: &str = "HNET_NON_INTERACTIVE";
pub const ENV_DAEMON_API_ADDRESS: &str = "HNET_DAEMON_API_ADDRESS";
pub const ENV_DAEMON_API_PORT: &str = "HNET_DAEMON_API_PORT";
pub const ENV_DAEMON_API_SECRET: &str = "HNET_DAEMON_API_SECRET";
pub const ENV_DASHBOARD_URL: &str = "HNET_DASHBOARD_URL";

fn default_daemon_api_address() -> String {
    "127.0.0.1".to_string()
}

fn default_daemon_api_port() -> u16 {
    16216
}

fn default_dashboard_url() -> String {
    "https://app.husarnet.com".to_string()
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_wait_interval_ms() -> u64 {
    1000
}

fn default_wait_max_attempts() -> u32 {
    120
}

fn default_service_name() -> String {
    "husarnet".to_string()
}

fn default_daemon_binary() -> String {
    "husarnet-daemon".to_string()
}

/// What to do when the daemon refuses a connection on a retryable call.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RecoveryPolicy {
    /// Ask the user, then restart the service.
    #[default]
    PromptRestart,
    /// Ask the user, install the service unit if missing, then restart it.
    InstallAndRestart,
    /// Fail immediately.
    Never,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_daemon_api_address")]
    pub daemon_api_address: String,
    #[serde(default = "default_daemon_api_port")]
    pub daemon_api_port: u16,
    /// Overrides the secret file when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daemon_api_secret: Option<String>,
    #[serde(default = "default_dashboard_url")]
    pub dashboard_url: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub non_interactive: bool,
    #[serde(default = "default_wait_interval_ms")]
    pub wait_interval_ms: u64,
    #[serde(default = "default_wait_max_attempts")]
    pub wait_max_attempts: u32,
    #[serde(default)]
    pub recovery: RecoveryPolicy,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_daemon_binary")]
    pub daemon_binary: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon_api_address: default_daemon_api_address(),
            daemon_api_port: default_daemon_api_port(),
            daemon_api_secret: None,
            dashboard_url: default_dashboard_url(),
            log_level: default_log_level(),
            non_interactive: false,
            wait_interval_ms: default_wait_interval_ms(),
            wait_max_attempts: default_wait_max_attempts(),
            recovery: RecoveryPolicy::default(),
            service_name: default_service_name(),
            daemon_binary: default_daemon_binary(),
        }
    }
}

impl Config {
    /// Load the config file (defaults when absent) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        let mut config = Self::load_from(&path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let config_dir = path.parent().context("Failed to get config directory")?;
        fs::create_dir_all(config_dir).context("Failed to create config directory")?;

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents).context("Failed to write config file")?;

        info!("Config saved to: {:?}", path);
        Ok(())
    }

    /// Write a default config file unless one already exists. Returns the path.
    pub fn init() -> Result<PathBuf> {
        let path = Self::config_file_path()?;
        if path.exists() {
            bail!("Config file already exists at {}", path.display());
        }
        Self::default().save_to(&path)?;
        Ok(path)
    }

    pub fn config_file_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Failed to get config directory")?;
        Ok(config_dir.join("hnet").join("config.json"))
    }

    /// Apply `HNET_*` overrides. `lookup` is `std::env::var` outside of tests.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_DAEMON_API_ADDRESS).filter(|v| !v.is_empty()) {
            self.daemon_api_address = v;
        }
        if let Some(v) = lookup(ENV_DAEMON_API_PORT).filter(|v| !v.is_empty()) {
            self.daemon_api_port = v
                .parse()
                .with_context(|| format!("{} is not a valid port: {}", ENV_DAEMON_API_PORT, v))?;
        }
        if let Some(v) = lookup(ENV_DAEMON_API_SECRET).filter(|v| !v.is_empty()) {
            self.daemon_api_secret = Some(v);
        }
        if let Some(v) = lookup(ENV_DASHBOARD_URL).filter(|v| !v.is_empty()) {
            self.dashboard_url = v;
        }
        if let Some(v) = lookup(ENV_NON_INTERACTIVE) {
            self.non_interactive = parse_flag(&v);
        }
        Ok(())
    }

    pub fn daemon_api_url(&self) -> String {
        let address = &self.daemon_api_address;
        if address.contains(':') && !address.starts_with('[') {
            format!("http://[{}]:{}", address, self.daemon_api_port)
        } else {
            format!("http://{}:{}", address, self.daemon_api_port)
        }
    }

    pub fn graphql_url(&self) -> String {
        format!("{}/graphql", self.dashboard_url.trim_end_matches('/'))
    }

    /// Host part of the dashboard URL, as the daemon reports it.
    pub fn dashboard_fqdn(&self) -> String {
        self.dashboard_url
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
            .split('/')
            .next()
            .unwrap_or_default()
            .to_string()
    }

    pub fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy {
            interval: Duration::from_millis(self.wait_interval_ms),
            max_attempts: self.wait_max_attempts,
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.daemon_api_url(), "http://127.0.0.1:16216");
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.wait_max_attempts, 120);
        assert_eq!(config.recovery, RecoveryPolicy::PromptRestart);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"daemon_api_port": 9999, "recovery": "never"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.daemon_api_port, 9999);
        assert_eq!(config.recovery, RecoveryPolicy::Never);
        assert_eq!(config.dashboard_url, "https://app.husarnet.com");
    }

    #[test]
    fn test_missing_file_is_default_and_not_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(!path.exists());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hnet").join("config.json");
        let config = Config {
            recovery: RecoveryPolicy::InstallAndRestart,
            ..Default::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_DAEMON_API_ADDRESS, "::1"),
            (ENV_DAEMON_API_PORT, "1234"),
            (ENV_DAEMON_API_SECRET, "s3cret"),
            (ENV_NON_INTERACTIVE, "yes"),
        ]);
        let mut config = Config::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.daemon_api_url(), "http://[::1]:1234");
        assert_eq!(config.daemon_api_secret.as_deref(), Some("s3cret"));
        assert!(config.non_interactive);
    }

    #[test]
    fn test_invalid_port_env_is_an_error() {
        let mut config = Config::default();
        let result = config.apply_env(|k| (k == ENV_DAEMON_API_PORT).then(|| "abc".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_dashboard_fqdn() {
        let config = Config {
            dashboard_url: "https://dev.husarnet.com/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.dashboard_fqdn(), "dev.husarnet.com");
        assert_eq!(config.graphql_url(), "https://dev.husarnet.com/graphql");
    }
}
