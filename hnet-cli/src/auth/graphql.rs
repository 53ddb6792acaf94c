use async_trait::async_trait;
use hnet_shared::graphql::{
    GraphqlRequest, GraphqlResponse, OBTAIN_TOKEN_MUTATION, ObtainTokenData,
    REFRESH_TOKEN_MUTATION, RefreshTokenData,
};
use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

use super::AuthError;
use crate::daemon::USER_AGENT;

/// Remote authentication and query endpoint.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn obtain_token(&self, username: &str, password: &str) -> Result<String, AuthError>;
    async fn refresh_token(&self, token: &str) -> Result<String, AuthError>;
    /// Run an authenticated GraphQL document and return its `data`.
    async fn query(&self, token: &str, document: &str, variables: Value)
    -> Result<Value, AuthError>;
}

#[derive(Debug, Clone)]
pub struct GraphqlClient {
    http: reqwest::Client,
    url: String,
}

impl GraphqlClient {
    pub fn new(url: impl Into<String>) -> Result<Self, AuthError> {
        let url = url.into();
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|source| AuthError::Transport {
                url: url.clone(),
                source,
            })?;
        Ok(Self { http, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn execute<T>(
        &self,
        token: Option<&str>,
        document: &str,
        variables: Value,
    ) -> Result<T, AuthError>
    where
        T: DeserializeOwned + Default,
    {
        let mut request = self.http.post(&self.url).json(&GraphqlRequest {
            query: document,
            variables,
        });
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("JWT {}", token));
        }

        let transport = |source| AuthError::Transport {
            url: self.url.clone(),
            source,
        };
        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        let body = response.text().await.map_err(transport)?;

        let parsed: GraphqlResponse<T> = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(e) => {
                // bodies may carry tokens, log the size only
                debug!("Undecodable GraphQL response ({}, {} bytes): {}", status, body.len(), e);
                return Err(AuthError::Decode {
                    url: self.url.clone(),
                    message: if status.is_success() {
                        e.to_string()
                    } else {
                        format!("HTTP {}", status)
                    },
                });
            }
        };

        if let Some(message) = parsed.error_text() {
            return Err(AuthError::Server {
                url: self.url.clone(),
                message,
            });
        }
        parsed.data.ok_or_else(|| AuthError::Decode {
            url: self.url.clone(),
            message: "response carried no data".into(),
        })
    }
}

#[async_trait]
impl AuthApi for GraphqlClient {
    async fn obtain_token(&self, username: &str, password: &str) -> Result<String, AuthError> {
        let data: ObtainTokenData = self
            .execute(
                None,
                OBTAIN_TOKEN_MUTATION,
                json!({ "username": username, "password": password }),
            )
            .await?;
        Ok(data.token_auth.token)
    }

    async fn refresh_token(&self, token: &str) -> Result<String, AuthError> {
        let data: RefreshTokenData = self
            .execute(Some(token), REFRESH_TOKEN_MUTATION, json!({ "token": token }))
            .await?;
        Ok(data.refresh_token.token)
    }

    async fn query(
        &self,
        token: &str,
        document: &str,
        variables: Value,
    ) -> Result<Value, AuthError> {
        self.execute(Some(token), document, variables).await
    }
}
