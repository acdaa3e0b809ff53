//! Auth routes: the browser login round-trip and token access for the player.
//!
//! Handlers only adapt HTTP to the token manager and map its errors to
//! status codes; the manager owns every state change.

use std::sync::Arc;

use {
    axum::{
        extract::{Query, State},
        http::StatusCode,
        response::{IntoResponse, Json, Redirect, Response},
    },
    serde::Deserialize,
    serde_json::json,
    tracing::{info, warn},
};

use encore_oauth::{AccessToken, TokenError, authorize_url, generate_state};

use crate::state::GatewayState;

const AUTH_FAILED_REDIRECT: &str = "/?error=auth_failed";

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// `GET /login`: redirect the browser to the provider's consent page.
pub async fn login(State(state): State<Arc<GatewayState>>) -> Response {
    let csrf = generate_state();
    match authorize_url(&state.oauth, &csrf) {
        Ok(url) => {
            state.begin_login(csrf);
            Redirect::to(&url).into_response()
        },
        Err(e) => {
            warn!(error = %e, "invalid authorize url");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "server_error", "message": "invalid authorize url" })),
            )
                .into_response()
        },
    }
}

/// `GET /callback`: finish the authorization-code flow and start the session.
pub async fn callback(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<CallbackQuery>,
) -> Redirect {
    if let Some(error) = query.error {
        warn!(error = %error, "authorization denied by provider");
        return Redirect::to(AUTH_FAILED_REDIRECT);
    }
    if !state.finish_login(query.state.as_deref()) {
        warn!("oauth callback state mismatch");
        return Redirect::to(AUTH_FAILED_REDIRECT);
    }
    let Some(code) = query.code else {
        warn!("oauth callback without code");
        return Redirect::to(AUTH_FAILED_REDIRECT);
    };

    match state.exchange.exchange_code(&code).await {
        Ok(response) => {
            let credential = state.tokens.init(response).await;
            info!(
                expires_in_secs = credential.expires_in().as_secs(),
                "login complete"
            );
            Redirect::to("/")
        },
        Err(e) => {
            warn!(error = %e, "authorization code exchange failed");
            Redirect::to(AUTH_FAILED_REDIRECT)
        },
    }
}

/// `GET /get-token`: a token valid right now.
pub async fn get_token(State(state): State<Arc<GatewayState>>) -> Response {
    token_response(state.tokens.get_valid_token().await)
}

/// `POST /refresh-token`: renew now regardless of expiry.
pub async fn refresh_token(State(state): State<Arc<GatewayState>>) -> Response {
    token_response(
        state
            .tokens
            .refresh()
            .await
            .map(|credential| credential.access()),
    )
}

/// `POST /logout`: end the token session.
pub async fn logout(State(state): State<Arc<GatewayState>>) -> StatusCode {
    state.tokens.dispose().await;
    StatusCode::NO_CONTENT
}

fn token_response(result: Result<AccessToken, TokenError>) -> Response {
    match result {
        Ok(token) => Json(json!({
            "token": token.secret(),
            "expires_in": token.expires_in().as_secs(),
        }))
        .into_response(),
        Err(e) => error_response(&e),
    }
}

/// Anything that needs a new login is a 401; transient upstream trouble is a 503.
fn error_response(err: &TokenError) -> Response {
    let (status, code) = if err.requires_reauth() {
        (StatusCode::UNAUTHORIZED, "auth_required")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "upstream_unavailable")
    };
    let message = match err {
        TokenError::AuthRequired => "Please log in to Spotify".to_string(),
        other => other.detail(),
    };
    let body = json!({ "error": code, "reason": err.code(), "message": message });
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_statuses() {
        assert_eq!(
            error_response(&TokenError::AuthRequired).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            error_response(&TokenError::refresh_failed("invalid_grant", None)).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            error_response(&TokenError::unavailable("timeout")).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
