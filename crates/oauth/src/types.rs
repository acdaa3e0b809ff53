use std::time::Duration;

use {
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
    tokio::time::Instant,
};

/// Longest access token lifetime accepted from the token endpoint.
pub const MAX_EXPIRES_IN: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// OAuth 2.0 client configuration for the upstream provider.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: Option<Secret<String>>,
    pub auth_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

/// Successful body of the token endpoint, for both the authorization-code
/// and the refresh-token grants.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: Secret<String>,
    /// Lifetime of `access_token` in seconds.
    pub expires_in: u64,
    /// Present when the provider issues or rotates the refresh token.
    #[serde(default)]
    pub refresh_token: Option<Secret<String>>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    pub fn new(access_token: impl Into<String>, expires_in: u64) -> Self {
        Self {
            access_token: Secret::new(access_token.into()),
            expires_in,
            refresh_token: None,
            token_type: Some("Bearer".into()),
            scope: None,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(Secret::new(refresh_token.into()));
        self
    }

    /// Whether `expires_in` is within [`MAX_EXPIRES_IN`].
    pub fn has_sane_lifetime(&self) -> bool {
        self.expires_in <= MAX_EXPIRES_IN.as_secs()
    }

    /// `expires_in`, capped at [`MAX_EXPIRES_IN`].
    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.expires_in).min(MAX_EXPIRES_IN)
    }
}

/// The session's credential. Only the token manager mutates it.
#[derive(Debug, Clone)]
pub struct Credential {
    pub access_token: Secret<String>,
    pub refresh_token: Option<Secret<String>>,
    pub expires_at: Instant,
}

impl Credential {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: Instant,
    ) -> Self {
        Self {
            access_token: Secret::new(access_token.into()),
            refresh_token: refresh_token.map(Secret::new),
            expires_at,
        }
    }

    /// Build a credential from a token endpoint response received at `now`.
    ///
    /// A response without a (non-empty) refresh token keeps `previous_refresh`.
    pub fn from_response(
        response: TokenResponse,
        previous_refresh: Option<Secret<String>>,
        now: Instant,
    ) -> Self {
        let lifetime = response.lifetime();
        let refresh_token = response
            .refresh_token
            .filter(|t| !t.expose_secret().is_empty())
            .or(previous_refresh);
        Self {
            access_token: response.access_token,
            refresh_token,
            expires_at: now + lifetime,
        }
    }

    /// True when the token is expired or expires within `margin` of `now`.
    pub fn needs_refresh(&self, now: Instant, margin: Duration) -> bool {
        now + margin >= self.expires_at
    }

    pub fn expires_in(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    pub fn access(&self) -> AccessToken {
        AccessToken {
            token: self.access_token.clone(),
            expires_at: self.expires_at,
        }
    }
}

/// What callers get back: the bearer token and when it stops being valid.
#[derive(Debug, Clone)]
pub struct AccessToken {
    token: Secret<String>,
    expires_at: Instant,
}

impl AccessToken {
    pub fn secret(&self) -> &str {
        self.token.expose_secret()
    }

    pub fn expires_in(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}
