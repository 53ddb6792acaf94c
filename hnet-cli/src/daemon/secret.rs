use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("error reading daemon API secret from {}, are you root/administrator? ({source})", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("daemon API secret file {} is empty", .0.display())]
    Empty(PathBuf),
}

/// Token authorizing control calls to the local daemon. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiSecret(String);

impl fmt::Debug for ApiSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiSecret(<{} bytes>)", self.0.len())
    }
}

impl ApiSecret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Use the configured override if any, otherwise read the secret file.
    pub fn resolve(override_value: Option<&str>, path: &Path) -> Result<Self, SecretError> {
        if let Some(v) = override_value.filter(|v| !v.is_empty()) {
            return Ok(Self::new(v));
        }

        let raw = std::fs::read_to_string(path).map_err(|source| SecretError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let value = raw.trim();
        if value.is_empty() {
            return Err(SecretError::Empty(path.to_path_buf()));
        }
        Ok(Self::new(value))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    #[cfg(windows)]
    pub fn default_path() -> PathBuf {
        let base = std::env::var_os("PROGRAMDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(r"C:\ProgramData"));
        base.join("husarnet").join("daemon_api_token")
    }

    #[cfg(not(windows))]
    pub fn default_path() -> PathBuf {
        PathBuf::from("/var/lib/husarnet/daemon_api_token")
    }
}
