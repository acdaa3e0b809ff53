//! OAuth plumbing for the upstream music service: client config, the token
//! endpoint exchange and the session's token lifecycle manager.

pub mod defaults;
pub mod error;
pub mod flow;
pub mod manager;
pub mod state;
pub mod types;

pub use {
    defaults::spotify_oauth_config,
    error::TokenError,
    flow::{OAuthFlow, TokenExchange, authorize_url},
    manager::{DEFAULT_REFRESH_MARGIN, TokenManager},
    state::generate_state,
    types::{AccessToken, Credential, MAX_EXPIRES_IN, OAuthConfig, TokenResponse},
};
