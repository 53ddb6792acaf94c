use async_trait::async_trait;
use hnet_shared::daemon::{DaemonResponse, DaemonStatus};
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::Config;
use crate::wait::StatusSource;

mod error;
pub mod secret;
pub mod service;

pub use error::DaemonError;
pub(crate) use error::is_refused;
pub use secret::{ApiSecret, SecretError};

pub const USER_AGENT: &str = concat!("hnet CLI version ", env!("CARGO_PKG_VERSION"));

/// Whether a refused connection should trigger recovery and one more attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry {
    Yes,
    No,
}

/// Brings a stopped daemon back. Called at most once per request.
#[async_trait]
pub trait DaemonRecovery: Send + Sync {
    async fn recover(&self, client: &DaemonClient) -> Result<(), DaemonError>;
}

/// Client for the daemon's local control API.
#[derive(Clone)]
pub struct DaemonClient {
    http: reqwest::Client,
    base_url: String,
    secret_override: Option<String>,
    secret_path: PathBuf,
    recovery: Option<Arc<dyn DaemonRecovery>>,
}

impl DaemonClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, DaemonError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_override: None,
            secret_path: ApiSecret::default_path(),
            recovery: None,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, DaemonError> {
        let mut client = Self::new(config.daemon_api_url())?;
        client.secret_override = config.daemon_api_secret.clone();
        Ok(client)
    }

    pub fn with_secret_override(mut self, secret: impl Into<String>) -> Self {
        self.secret_override = Some(secret.into());
        self
    }

    pub fn with_secret_path(mut self, path: PathBuf) -> Self {
        self.secret_path = path;
        self
    }

    pub fn with_recovery(mut self, recovery: Arc<dyn DaemonRecovery>) -> Self {
        self.recovery = Some(recovery);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn secret(&self) -> Result<ApiSecret, SecretError> {
        ApiSecret::resolve(self.secret_override.as_deref(), &self.secret_path)
    }

    pub async fn get_daemon<T>(&self, route: &str, retry: Retry) -> Result<T, DaemonError>
    where
        T: DeserializeOwned + Default,
    {
        match self.get_once(route).await {
            Err(e) if e.is_connection_refused() && retry == Retry::Yes => {
                self.recover(e).await?;
                self.get_once(route).await
            }
            other => other,
        }
    }

    pub async fn post_daemon<T>(
        &self,
        route: &str,
        form: &[(&str, &str)],
        retry: Retry,
    ) -> Result<T, DaemonError>
    where
        T: DeserializeOwned + Default,
    {
        match self.post_once(route, form).await {
            Err(e) if e.is_connection_refused() && retry == Retry::Yes => {
                self.recover(e).await?;
                self.post_once(route, form).await
            }
            other => other,
        }
    }

    pub async fn status(&self, retry: Retry) -> Result<DaemonStatus, DaemonError> {
        self.get_daemon("/api/status", retry).await
    }

    async fn recover(&self, cause: DaemonError) -> Result<(), DaemonError> {
        let Some(recovery) = &self.recovery else {
            return Err(cause);
        };
        info!("{}", cause);
        recovery.recover(self).await?;
        debug!("Daemon recovered, retrying the request once");
        Ok(())
    }

    async fn get_once<T>(&self, route: &str) -> Result<T, DaemonError>
    where
        T: DeserializeOwned + Default,
    {
        let url = format!("{}{}", self.base_url, route);
        debug!("GET {}", url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;
        decode_envelope(route, response).await
    }

    async fn post_once<T>(&self, route: &str, form: &[(&str, &str)]) -> Result<T, DaemonError>
    where
        T: DeserializeOwned + Default,
    {
        let secret = self.secret()?;
        let mut body: Vec<(&str, &str)> = form.to_vec();
        body.push(("secret", secret.expose()));

        let url = format!("{}{}", self.base_url, route);
        debug!("POST {} ({} form fields)", url, form.len());
        let response = self
            .http
            .post(&url)
            .form(&body)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;
        decode_envelope(route, response).await
    }
}

fn transport_error(url: &str, err: reqwest::Error) -> DaemonError {
    if is_refused(&err) {
        DaemonError::ConnectionRefused {
            url: url.to_string(),
        }
    } else {
        DaemonError::Transport(err)
    }
}

async fn decode_envelope<T>(route: &str, response: reqwest::Response) -> Result<T, DaemonError>
where
    T: DeserializeOwned + Default,
{
    let http_status = response.status();
    let body = response.text().await?;

    let envelope: DaemonResponse<T> = serde_json::from_str(&body).map_err(|source| {
        debug!("Undecodable daemon body from {} ({}): {}", route, http_status, body);
        DaemonError::Decode {
            route: route.to_string(),
            source,
        }
    })?;

    if !envelope.is_ok() {
        return Err(DaemonError::Api {
            status: envelope.status,
            error: envelope.error,
        });
    }
    Ok(envelope.result.unwrap_or_default())
}

#[async_trait]
impl StatusSource for DaemonClient {
    async fn fetch_status(&self) -> Result<DaemonStatus, DaemonError> {
        self.status(Retry::No).await
    }
}
