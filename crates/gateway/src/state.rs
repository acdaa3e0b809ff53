use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use encore_oauth::{OAuthConfig, TokenExchange, TokenManager};

use crate::broadcast::Relay;

// ── Gateway state ────────────────────────────────────────────────────────────

/// Shared state behind every route and WebSocket connection.
pub struct GatewayState {
    pub version: String,
    pub oauth: OAuthConfig,
    pub exchange: Arc<dyn TokenExchange>,
    pub tokens: TokenManager,
    pub relay: Relay,
    /// CSRF state handed out by the last `/login`, consumed by `/callback`.
    pending_login: Mutex<Option<String>>,
}

impl GatewayState {
    pub fn new(
        oauth: OAuthConfig,
        exchange: Arc<dyn TokenExchange>,
        refresh_margin: Duration,
    ) -> Arc<Self> {
        let tokens = TokenManager::with_margin(Arc::clone(&exchange), refresh_margin);
        Arc::new(Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            oauth,
            exchange,
            tokens,
            relay: Relay::new(),
            pending_login: Mutex::new(None),
        })
    }

    /// Remember the state parameter of a login redirect, replacing any
    /// earlier one.
    pub fn begin_login(&self, state: String) {
        let mut pending = self
            .pending_login
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *pending = Some(state);
    }

    /// Consume the pending login state. True only when `given` matches it.
    pub fn finish_login(&self, given: Option<&str>) -> bool {
        let expected = self
            .pending_login
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match (expected, given) {
            (Some(expected), Some(given)) => safe_equal(&expected, given),
            _ => false,
        }
    }
}

/// Constant-time string comparison.
fn safe_equal(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let diff = a
        .as_bytes()
        .iter()
        .zip(b.as_bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y));
    diff == 0
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        async_trait::async_trait,
        encore_oauth::{TokenError, TokenResponse},
    };

    struct NoExchange;

    #[async_trait]
    impl TokenExchange for NoExchange {
        async fn refresh(&self, _: &str) -> Result<TokenResponse, TokenError> {
            Err(TokenError::unavailable("offline"))
        }

        async fn exchange_code(&self, _: &str) -> Result<TokenResponse, TokenError> {
            Err(TokenError::unavailable("offline"))
        }
    }

    fn state() -> Arc<GatewayState> {
        let oauth = OAuthConfig {
            client_id: "cid".into(),
            client_secret: None,
            auth_url: "https://accounts.example.com/authorize".into(),
            token_url: "https://accounts.example.com/api/token".into(),
            redirect_uri: "http://127.0.0.1:8081/callback".into(),
            scopes: vec!["streaming".into()],
        };
        GatewayState::new(oauth, Arc::new(NoExchange), Duration::from_secs(300))
    }

    #[test]
    fn login_state_is_single_use() {
        let state = state();
        state.begin_login("abc".into());
        assert!(state.finish_login(Some("abc")));
        assert!(!state.finish_login(Some("abc")));
    }

    #[test]
    fn login_state_must_match() {
        let state = state();
        assert!(!state.finish_login(Some("abc")));

        state.begin_login("abc".into());
        assert!(!state.finish_login(Some("abd")));
        // A mismatch still consumes the pending state.
        assert!(!state.finish_login(Some("abc")));

        state.begin_login("abc".into());
        assert!(!state.finish_login(None));
    }

    #[test]
    fn newer_login_replaces_older() {
        let state = state();
        state.begin_login("first".into());
        state.begin_login("second".into());
        assert!(!state.finish_login(Some("first")));
    }

    #[test]
    fn safe_equal_compares_bytes() {
        assert!(safe_equal("abc", "abc"));
        assert!(!safe_equal("abc", "abcd"));
        assert!(!safe_equal("abc", "abx"));
        assert!(safe_equal("", ""));
    }
}
