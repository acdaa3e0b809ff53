//! Authorization-code redirect and the token endpoint exchange.

use {
    async_trait::async_trait,
    reqwest::StatusCode,
    secrecy::ExposeSecret,
    serde::Deserialize,
    tracing::{debug, warn},
};

use crate::{
    error::TokenError,
    types::{OAuthConfig, TokenResponse},
};

/// The upstream token endpoint, as seen by the token manager.
///
/// A trait so the manager can be driven by a fake in tests.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// `grant_type=refresh_token`.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, TokenError>;

    /// `grant_type=authorization_code`.
    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, TokenError>;
}

/// Error body of the token endpoint (RFC 6749 §5.2).
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Build the provider URL the browser is redirected to.
pub fn authorize_url(config: &OAuthConfig, state: &str) -> Result<String, url::ParseError> {
    let scope = config.scopes.join(" ");
    let url = url::Url::parse_with_params(&config.auth_url, &[
        ("response_type", "code"),
        ("client_id", config.client_id.as_str()),
        ("scope", scope.as_str()),
        ("redirect_uri", config.redirect_uri.as_str()),
        ("state", state),
    ])?;
    Ok(url.into())
}

/// HTTP implementation of the OAuth authorization-code flow.
pub struct OAuthFlow {
    config: OAuthConfig,
    client: reqwest::Client,
}

impl OAuthFlow {
    pub fn new(config: OAuthConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    pub fn with_client(config: OAuthConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    pub fn authorize_url(&self, state: &str) -> Result<String, url::ParseError> {
        authorize_url(&self.config, state)
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse, TokenError> {
        let mut request = self.client.post(&self.config.token_url);
        request = match &self.config.client_secret {
            Some(secret) => request
                .basic_auth(&self.config.client_id, Some(secret.expose_secret()))
                .form(form),
            None => {
                let mut form = form.to_vec();
                form.push(("client_id", self.config.client_id.as_str()));
                request.form(&form)
            },
        };

        let response = request
            .send()
            .await
            .map_err(|e| TokenError::unavailable(format!("token request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TokenError::unavailable(format!("reading token response: {e}")))?;

        classify_response(status, &body)
    }
}

fn classify_response(status: StatusCode, body: &str) -> Result<TokenResponse, TokenError> {
    if status.is_success() {
        let parsed: TokenResponse = serde_json::from_str(body).map_err(|e| {
            TokenError::refresh_failed("invalid_response", Some(format!("malformed token body: {e}")))
        })?;
        if parsed.access_token.expose_secret().is_empty() {
            return Err(TokenError::refresh_failed(
                "invalid_response",
                Some("token response has an empty access_token".into()),
            ));
        }
        if !parsed.has_sane_lifetime() {
            return Err(TokenError::refresh_failed(
                "invalid_response",
                Some(format!("token response has an absurd expires_in: {}", parsed.expires_in)),
            ));
        }
        debug!(expires_in = parsed.expires_in, "token endpoint answered");
        return Ok(parsed);
    }

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        warn!(%status, "token endpoint temporarily unavailable");
        return Err(TokenError::unavailable(format!("token endpoint returned {status}")));
    }

    let err = match serde_json::from_str::<OAuthErrorBody>(body) {
        Ok(err) => TokenError::refresh_failed(err.error, err.error_description),
        Err(_) => TokenError::refresh_failed(format!("http_{}", status.as_u16()), None),
    };
    warn!(%status, error = %err, "token endpoint rejected request");
    Err(err)
}

#[async_trait]
impl TokenExchange for OAuthFlow {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, TokenError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, TokenError> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ])
        .await
    }
}
