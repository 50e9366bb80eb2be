use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::config::settings::{AuthConfig, ClientAuthMethod};
use crate::error::{Result, RevosError};
use crate::helpers::time::plus_seconds;
use crate::tokens::state::CachedToken;

/// Lifetime assumed when the endpoint omits `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECONDS: u64 = 3600;

/// Performs one token exchange. Implementations do not retry.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> Result<IssuedToken>;
}

/// Token as returned by the endpoint, before it gets an absolute expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_in: u64,
    pub token_type: String,
}

impl IssuedToken {
    pub fn into_cached(self, now: DateTime<Utc>) -> CachedToken {
        CachedToken::new(
            self.access_token,
            self.token_type,
            plus_seconds(now, self.expires_in),
        )
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    token_type: Option<String>,
}

/// OAuth2 client-credentials grant against `token_url`.
#[derive(Debug, Clone)]
pub struct ClientCredentialsSource {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    scope: Option<String>,
    auth_method: ClientAuthMethod,
}

impl ClientCredentialsSource {
    pub fn new(auth: &AuthConfig) -> Result<Self> {
        // token endpoints must not redirect credentials elsewhere
        let client = Client::builder()
            .timeout(Duration::from_secs(auth.request_timeout))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| RevosError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(auth, client))
    }

    pub fn with_client(auth: &AuthConfig, client: Client) -> Self {
        Self {
            client,
            token_url: auth.token_url.clone(),
            client_id: auth.client_id.clone(),
            client_secret: auth.client_secret.clone(),
            scope: auth.scope.clone(),
            auth_method: auth.auth_method,
        }
    }

    fn form(&self) -> Vec<(&'static str, &str)> {
        let mut form = vec![("grant_type", "client_credentials")];
        if self.auth_method == ClientAuthMethod::Form {
            form.push(("client_id", self.client_id.as_str()));
            form.push(("client_secret", self.client_secret.as_str()));
        }
        if let Some(scope) = &self.scope {
            form.push(("scope", scope.as_str()));
        }
        form
    }
}

#[async_trait]
impl TokenSource for ClientCredentialsSource {
    async fn fetch_token(&self) -> Result<IssuedToken> {
        let mut request = self
            .client
            .post(&self.token_url)
            .header(header::ACCEPT, "application/json")
            .form(&self.form());
        if self.auth_method == ClientAuthMethod::Basic {
            let credentials = STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret));
            request = request.header(header::AUTHORIZATION, format!("Basic {credentials}"));
        }

        debug!(url = %self.token_url, "requesting client-credentials token");
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status != StatusCode::OK {
            return Err(classify_status(status, &body));
        }
        parse_token_response(&body)
    }
}

fn classify_status(status: StatusCode, body: &str) -> RevosError {
    let detail = truncate(body, 200);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RevosError::authentication(format!(
            "token endpoint rejected the client credentials ({status}): {detail}"
        )),
        _ => RevosError::api(
            Some(status.as_u16()),
            format!("token endpoint answered {status}: {detail}"),
        ),
    }
}

pub(crate) fn parse_token_response(body: &str) -> Result<IssuedToken> {
    let parsed: TokenResponse = serde_json::from_str(body)
        .map_err(|e| RevosError::token(format!("malformed token response: {e}")))?;
    let access_token = parsed
        .access_token
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| RevosError::token("token response has no access_token"))?;
    Ok(IssuedToken {
        access_token,
        expires_in: parsed.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECONDS),
        token_type: parsed.token_type.unwrap_or_else(|| "Bearer".to_owned()),
    })
}

pub(crate) fn truncate(body: &str, max_chars: usize) -> String {
    match body.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::POST;
    use httpmock::MockServer;
    use serde_json::json;

    fn auth_for(server: &MockServer, method: ClientAuthMethod) -> AuthConfig {
        AuthConfig {
            client_id: "test-client-id".into(),
            client_secret: "test-client-secret".into(),
            token_url: server.url("/oauth/token"),
            auth_method: method,
            scope: Some("api".into()),
            ..AuthConfig::default()
        }
    }

    #[test]
    fn parses_full_and_minimal_bodies() {
        let token = parse_token_response(
            r#"{"access_token":"test-access-token","expires_in":3600,"token_type":"Bearer"}"#,
        )
        .unwrap();
        assert_eq!(token.access_token, "test-access-token");
        assert_eq!(token.expires_in, 3600);

        let token = parse_token_response(r#"{"access_token":"abc"}"#).unwrap();
        assert_eq!(token.expires_in, DEFAULT_EXPIRES_IN_SECONDS);
        assert_eq!(token.token_type, "Bearer");
    }

    #[test]
    fn malformed_bodies_are_token_errors() {
        for body in ["not json", r#"{"expires_in":10}"#, r#"{"access_token":"  "}"#] {
            let err = parse_token_response(body).unwrap_err();
            assert!(matches!(err, RevosError::Token(_)), "{body}: {err:?}");
        }
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(500);
        assert_eq!(truncate(&body, 200).len(), 203);
        assert_eq!(truncate("short", 200), "short");
    }

    #[tokio::test]
    async fn form_credentials_are_posted() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/oauth/token")
                    .form_urlencoded_tuple("grant_type", "client_credentials")
                    .form_urlencoded_tuple("client_id", "test-client-id")
                    .form_urlencoded_tuple("client_secret", "test-client-secret")
                    .form_urlencoded_tuple("scope", "api");
                then.status(200).json_body(json!({
                    "access_token": "form-token",
                    "expires_in": 120,
                    "token_type": "Bearer"
                }));
            })
            .await;

        let source =
            ClientCredentialsSource::new(&auth_for(&server, ClientAuthMethod::Form)).unwrap();
        let token = source.fetch_token().await.unwrap();
        assert_eq!(token.access_token, "form-token");
        assert_eq!(token.expires_in, 120);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn basic_credentials_use_authorization_header() {
        let server = MockServer::start_async().await;
        let expected = format!(
            "Basic {}",
            STANDARD.encode("test-client-id:test-client-secret")
        );
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/oauth/token")
                    .header("authorization", expected.as_str())
                    .form_urlencoded_tuple("grant_type", "client_credentials");
                then.status(200).json_body(json!({"access_token": "basic-token"}));
            })
            .await;

        let source =
            ClientCredentialsSource::new(&auth_for(&server, ClientAuthMethod::Basic)).unwrap();
        let token = source.fetch_token().await.unwrap();
        assert_eq!(token.access_token, "basic-token");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn status_codes_are_classified() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/rejected");
                then.status(401).body("invalid_client");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/broken");
                then.status(500).body("boom");
            })
            .await;

        let mut auth = auth_for(&server, ClientAuthMethod::Form);
        auth.token_url = server.url("/rejected");
        let err = ClientCredentialsSource::new(&auth).unwrap().fetch_token().await.unwrap_err();
        assert!(matches!(err, RevosError::Authentication(_)));

        auth.token_url = server.url("/broken");
        let err = ClientCredentialsSource::new(&auth).unwrap().fetch_token().await.unwrap_err();
        assert_eq!(err.reason(), "api");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_retryable_api_error() {
        let auth = AuthConfig {
            client_id: "id".into(),
            client_secret: "secret".into(),
            token_url: "http://127.0.0.1:1/oauth/token".into(),
            request_timeout: 2,
            ..AuthConfig::default()
        };
        let err = ClientCredentialsSource::new(&auth).unwrap().fetch_token().await.unwrap_err();
        assert!(matches!(err, RevosError::Api { status: None, .. }));
        assert!(err.is_retryable());
    }
}
