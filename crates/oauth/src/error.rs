use thiserror::Error;

/// Failures surfaced by the token lifecycle.
///
/// `Clone` because a single in-flight refresh fans its result out to every
/// caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// No credential has been established; the user has to authorize first.
    #[error("authorization required")]
    AuthRequired,

    /// The token endpoint rejected the refresh token, or answered with
    /// something that is not a usable token.
    #[error("token refresh rejected by upstream: {error}")]
    RefreshFailed {
        error: String,
        description: Option<String>,
    },

    /// Transport failure or a transient upstream error. The refresh token was
    /// never confirmed invalid, so the next request may simply try again.
    #[error("token endpoint unavailable: {reason}")]
    UpstreamUnavailable { reason: String },
}

impl TokenError {
    pub fn refresh_failed(error: impl Into<String>, description: Option<String>) -> Self {
        Self::RefreshFailed {
            error: error.into(),
            description,
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            reason: reason.into(),
        }
    }

    /// Whether the session has to go back through the authorization flow.
    pub fn requires_reauth(&self) -> bool {
        matches!(self, Self::AuthRequired | Self::RefreshFailed { .. })
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthRequired => "auth_required",
            Self::RefreshFailed { .. } => "refresh_failed",
            Self::UpstreamUnavailable { .. } => "upstream_unavailable",
        }
    }

    /// Human-readable detail, preferring the upstream description when present.
    pub fn detail(&self) -> String {
        match self {
            Self::RefreshFailed {
                description: Some(description),
                ..
            } => description.clone(),
            other => other.to_string(),
        }
    }
}
