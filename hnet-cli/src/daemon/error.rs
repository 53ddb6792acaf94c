use thiserror::Error;

use super::secret::SecretError;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("daemon refused the connection at {url}; make sure it is running before trying again")]
    ConnectionRefused { url: String },

    #[error("request to the daemon failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unable to decode daemon response from {route}: {source}")]
    Decode {
        route: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("response status: {status}, error: {error}")]
    Api { status: String, error: String },

    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error("the daemon is not running and it was not restarted")]
    RecoveryDeclined,

    #[error("unable to bring the daemon back up: {0:#}")]
    Recovery(anyhow::Error),
}

impl DaemonError {
    pub fn is_connection_refused(&self) -> bool {
        matches!(self, DaemonError::ConnectionRefused { .. })
    }
}

/// True when the transport error was caused by a refused TCP connection.
pub(crate) fn is_refused(err: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        // some connectors box the OS error into a message
        if e.to_string().to_ascii_lowercase().contains("connection refused") {
            return true;
        }
        source = e.source();
    }
    false
}
