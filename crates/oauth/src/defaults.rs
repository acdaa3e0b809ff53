use {encore_config::SpotifyConfig, secrecy::Secret};

use crate::types::OAuthConfig;

pub const SPOTIFY_AUTH_URL: &str = "https://accounts.spotify.com/authorize";
pub const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8081/callback";

/// Scopes the Web Playback SDK needs to stream and report playback state.
pub const SPOTIFY_SCOPES: &[&str] = &[
    "streaming",
    "user-read-email",
    "user-read-private",
    "user-read-playback-state",
    "user-modify-playback-state",
];

/// Resolve the Spotify OAuth config.
///
/// Priority, lowest first:
/// 1. Built-in Spotify endpoints and scopes
/// 2. The `[spotify]` section of the config file
/// 3. Environment variables (`ENCORE_SPOTIFY_CLIENT_ID`, `..._CLIENT_SECRET`,
///    `..._REDIRECT_URI`, `..._AUTH_URL`, `..._TOKEN_URL`)
pub fn spotify_oauth_config(config: &SpotifyConfig) -> anyhow::Result<OAuthConfig> {
    resolve(config, |name| std::env::var(name).ok())
}

fn resolve(
    config: &SpotifyConfig,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<OAuthConfig> {
    let var = |suffix: &str| env(&format!("ENCORE_SPOTIFY_{suffix}")).filter(|v| !v.is_empty());

    let client_id = var("CLIENT_ID")
        .or_else(|| config.client_id.clone())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "missing Spotify client id: set [spotify].client_id or ENCORE_SPOTIFY_CLIENT_ID"
            )
        })?;

    let client_secret = var("CLIENT_SECRET")
        .map(Secret::new)
        .or_else(|| config.client_secret.clone());

    Ok(OAuthConfig {
        client_id,
        client_secret,
        auth_url: var("AUTH_URL")
            .or_else(|| config.auth_url.clone())
            .unwrap_or_else(|| SPOTIFY_AUTH_URL.into()),
        token_url: var("TOKEN_URL")
            .or_else(|| config.token_url.clone())
            .unwrap_or_else(|| SPOTIFY_TOKEN_URL.into()),
        redirect_uri: var("REDIRECT_URI")
            .or_else(|| config.redirect_uri.clone())
            .unwrap_or_else(|| DEFAULT_REDIRECT_URI.into()),
        scopes: config
            .scopes
            .clone()
            .unwrap_or_else(|| SPOTIFY_SCOPES.iter().map(|s| s.to_string()).collect()),
    })
}

#[cfg(test)]
mod tests {
    use {super::*, secrecy::ExposeSecret};

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn requires_client_id() {
        let err = resolve(&SpotifyConfig::default(), no_env).unwrap_err();
        assert!(err.to_string().contains("client id"));
    }

    #[test]
    fn builtin_endpoints() {
        let config = SpotifyConfig {
            client_id: Some("cid".into()),
            ..Default::default()
        };
        let oauth = resolve(&config, no_env).unwrap();
        assert_eq!(oauth.client_id, "cid");
        assert_eq!(oauth.token_url, SPOTIFY_TOKEN_URL);
        assert_eq!(oauth.auth_url, SPOTIFY_AUTH_URL);
        assert_eq!(oauth.redirect_uri, DEFAULT_REDIRECT_URI);
        assert!(oauth.scopes.iter().any(|s| s == "streaming"));
        assert!(oauth.client_secret.is_none());
    }

    #[test]
    fn env_overrides_file() {
        let config = SpotifyConfig {
            client_id: Some("from-file".into()),
            client_secret: Some(Secret::new("file-secret".into())),
            token_url: Some("http://file/token".into()),
            ..Default::default()
        };
        let oauth = resolve(&config, |name| match name {
            "ENCORE_SPOTIFY_CLIENT_ID" => Some("from-env".into()),
            "ENCORE_SPOTIFY_CLIENT_SECRET" => Some("env-secret".into()),
            "ENCORE_SPOTIFY_AUTH_URL" => Some(String::new()),
            _ => None,
        })
        .unwrap();
        assert_eq!(oauth.client_id, "from-env");
        assert_eq!(oauth.client_secret.unwrap().expose_secret(), "env-secret");
        assert_eq!(oauth.token_url, "http://file/token");
        // Empty env values do not override.
        assert_eq!(oauth.auth_url, SPOTIFY_AUTH_URL);
    }
}
