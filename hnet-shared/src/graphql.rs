use serde::{Deserialize, Serialize};

pub const OBTAIN_TOKEN_MUTATION: &str = "mutation ObtainToken($username: String!, $password: String!) { tokenAuth(username: $username, password: $password) { token } }";

pub const REFRESH_TOKEN_MUTATION: &str =
    "mutation RefreshToken($token: String!) { refreshToken(token: $token) { token } }";

#[derive(Debug, Clone, Serialize)]
pub struct GraphqlRequest<'a> {
    pub query: &'a str,
    pub variables: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphqlResponse<T> {
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphqlError>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GraphqlError {
    pub message: String,
}

impl<T> GraphqlResponse<T> {
    /// All server-reported error messages joined into one line.
    pub fn error_text(&self) -> Option<String> {
        if self.errors.is_empty() {
            return None;
        }
        Some(
            self.errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct TokenPayload {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ObtainTokenData {
    #[serde(rename = "tokenAuth")]
    pub token_auth: TokenPayload,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RefreshTokenData {
    #[serde(rename = "refreshToken")]
    pub refresh_token: TokenPayload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_text_joins_messages() {
        let resp: GraphqlResponse<ObtainTokenData> = serde_json::from_str(
            r#"{"data":null,"errors":[{"message":"Signature has expired"},{"message":"second"}]}"#,
        )
        .unwrap();
        assert!(resp.data.is_none());
        assert_eq!(
            resp.error_text().as_deref(),
            Some("Signature has expired; second")
        );
    }

    #[test]
    fn test_refresh_payload() {
        let resp: GraphqlResponse<RefreshTokenData> =
            serde_json::from_str(r#"{"data":{"refreshToken":{"token":"abc"}}}"#).unwrap();
        assert!(resp.error_text().is_none());
        assert_eq!(resp.data.unwrap().refresh_token.token, "abc");
    }
}
