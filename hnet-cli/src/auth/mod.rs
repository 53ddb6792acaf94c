//! Dashboard authentication.
//!
//! [`AuthSession`] owns the bearer token for one command. It reads the token
//! from a [`TokenStore`], logs in through an [`AuthApi`] when there is none,
//! and renews the token after every successful call so that an active user
//! never sees it expire. When the server reports an expired or undecodable
//! signature the session logs in again exactly once and repeats the call.

use std::future::Future;
use std::io;
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod graphql;
pub mod prompt;
pub mod store;

pub use graphql::{AuthApi, GraphqlClient};
pub use prompt::{CredentialPrompt, Credentials, TerminalPrompt};
pub use store::{FileTokenStore, TokenStore, TokenStoreError};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("GraphQL server at {url} returned an error: {message}")]
    Server { url: String, message: String },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("authentication failed: {0}")]
    LoginFailed(String),

    #[error("fatal: unknown error from the server: {0}")]
    Unknown(String),

    #[error("the server rejected the session again right after logging in; giving up")]
    ReauthExhausted,

    #[error("dashboard credentials are required but input is disabled (non-interactive mode); run `hnet dashboard login` first")]
    NonInteractive,

    #[error("unable to read credentials: {0}")]
    Prompt(#[source] io::Error),

    #[error(transparent)]
    Store(#[from] TokenStoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Expired,
    Invalid,
    Other,
}

/// Sort a failed call by the server's error text.
pub fn classify_error(err: &AuthError) -> ErrorClass {
    let AuthError::Server { message, .. } = err else {
        return ErrorClass::Other;
    };
    let message = message.to_lowercase();
    if message.contains("signature has expired") {
        ErrorClass::Expired
    } else if message.contains("error decoding signature")
        || message.contains("signature decoding error")
    {
        ErrorClass::Invalid
    } else {
        ErrorClass::Other
    }
}

pub struct AuthSession<S, A, P> {
    store: S,
    api: A,
    prompt: P,
}

impl<S, A, P> AuthSession<S, A, P>
where
    S: TokenStore,
    A: AuthApi,
    P: CredentialPrompt,
{
    pub fn new(store: S, api: A, prompt: P) -> Self {
        Self { store, api, prompt }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Cached token, or a fresh one from an interactive login.
    pub async fn get_token(&self) -> Result<String, AuthError> {
        if let Some(token) = self.store.load()? {
            debug!("Using cached token");
            return Ok(token);
        }
        self.interactive_login().await
    }

    pub async fn interactive_login(&self) -> Result<String, AuthError> {
        let credentials = self.prompt.credentials()?;
        self.login(&credentials.username, &credentials.password)
            .await
    }

    /// Exchange credentials for a token and cache it. Never retried.
    pub async fn login(&self, username: &str, password: &str) -> Result<String, AuthError> {
        let token = self
            .api
            .obtain_token(username, password)
            .await
            .map_err(|e| match e {
                AuthError::Server { message, .. } => AuthError::LoginFailed(message),
                other => other,
            })?;
        self.store.save(&token)?;
        info!("Logged in to the dashboard");
        Ok(token)
    }

    /// Renew the session after a successful call. Failures are only logged.
    pub async fn refresh_after_call(&self, token: &str) {
        match self.api.refresh_token(token).await {
            Ok(renewed) => {
                if let Err(e) = self.store.save(&renewed) {
                    warn!("Unable to cache the refreshed token: {}", e);
                } else {
                    debug!("Token refreshed");
                }
            }
            Err(e) => warn!("Unable to refresh the dashboard token: {}", e),
        }
    }

    /// Run `op` with a valid token, logging in again at most once.
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T, AuthError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, AuthError>>,
    {
        let mut token = self.get_token().await?;
        let mut reauthenticated = false;

        loop {
            let err = match op(token.clone()).await {
                Ok(value) => {
                    self.refresh_after_call(&token).await;
                    return Ok(value);
                }
                Err(e) => e,
            };

            match classify_error(&err) {
                ErrorClass::Expired | ErrorClass::Invalid if reauthenticated => {
                    return Err(AuthError::ReauthExhausted);
                }
                class @ (ErrorClass::Expired | ErrorClass::Invalid) => {
                    info!("Dashboard session rejected ({:?}), logging in again", class);
                    token = self.interactive_login().await?;
                    reauthenticated = true;
                }
                ErrorClass::Other => {
                    return Err(match err {
                        AuthError::Server { message, .. } => AuthError::Unknown(message),
                        other => other,
                    });
                }
            }
        }
    }
}
