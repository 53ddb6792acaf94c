//! Dashboard REST API, reached through the daemon's `/api/forward` proxy.

use hnet_shared::dashboard::{ApiResponse, MaybeError};
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::daemon::{DaemonClient, SecretError, is_refused};
use crate::util::format::print_warning;

pub mod ops;

pub use ops::DashboardOp;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("daemon refused the connection; make sure it is running before trying again")]
    DaemonRefused,

    #[error("request to the dashboard failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("API responded with {status}{}", .message.as_deref().map(|m| format!(": {}", m)).unwrap_or_default())]
    Http {
        status: String,
        message: Option<String>,
    },

    #[error("unable to decode dashboard response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0}")]
    Rejected(String),

    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Secret(#[from] SecretError),
}

pub struct DashboardClient {
    daemon: DaemonClient,
}

impl DashboardClient {
    pub fn new(daemon: DaemonClient) -> Self {
        Self { daemon }
    }

    pub fn forward_url(&self, endpoint: &str) -> String {
        format!("{}/api/forward{}", self.daemon.base_url(), endpoint)
    }

    /// Send one request and return the decoded envelope, whatever its type.
    pub async fn request<B, T>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&B>,
    ) -> Result<ApiResponse<T>, DashboardError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned + Default,
    {
        let secret = self.daemon.secret()?;
        debug!("{} {}", method, self.forward_url(endpoint));

        let mut request = self
            .daemon
            .http()
            .request(method, self.forward_url(endpoint))
            .query(&[("secret", secret.expose())]);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if is_refused(&e) {
                DashboardError::DaemonRefused
            } else {
                DashboardError::Transport(e)
            }
        })?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(DashboardError::Transport)?;

        if !status.is_success() {
            let message = serde_json::from_slice::<MaybeError>(&bytes)
                .ok()
                .map(|m| m.error)
                .filter(|m| !m.is_empty());
            return Err(DashboardError::Http {
                status: status.to_string(),
                message,
            });
        }

        serde_json::from_slice(&bytes).map_err(|source| {
            debug!(
                "Undecodable dashboard body from {}: {}",
                endpoint,
                String::from_utf8_lossy(&bytes)
            );
            DashboardError::Decode {
                endpoint: endpoint.to_string(),
                source,
            }
        })
    }

    /// Like [`request`](Self::request) but requires a `success` envelope and
    /// returns its payload. Warnings are shown to the user.
    pub async fn call<B, T>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&B>,
    ) -> Result<T, DashboardError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned + Default,
    {
        let response: ApiResponse<T> = self.request(method, endpoint, body).await?;
        if !response.is_success() {
            return Err(DashboardError::Rejected(response.failure_message()));
        }
        for warning in &response.warnings {
            print_warning(warning);
        }
        Ok(response.payload.unwrap_or_default())
    }

    pub async fn get<T>(&self, endpoint: &str) -> Result<T, DashboardError>
    where
        T: DeserializeOwned + Default,
    {
        self.call::<(), T>(Method::GET, endpoint, None).await
    }
}
