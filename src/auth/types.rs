//! Auth configuration types

use chrono::{DateTime, Utc};

/// Seconds subtracted from a token's declared lifetime before it is
/// considered expired
pub const TOKEN_EXPIRY_MARGIN_SECS: i64 = 300;

/// Authentication configuration
#[derive(Debug, Clone, Default)]
pub enum AuthConfig {
    /// No authentication required
    #[default]
    None,

    /// Static bearer token (private app token)
    Bearer {
        /// The bearer token
        token: String,
    },

    /// OAuth2 Refresh Token flow
    Oauth2Refresh {
        /// Token endpoint URL
        token_url: String,
        /// Client ID
        client_id: String,
        /// Client secret
        client_secret: String,
        /// Refresh token
        refresh_token: String,
        /// Redirect URI registered with the app
        redirect_uri: Option<String>,
    },
}

impl AuthConfig {
    /// Whether a rejected token can be replaced by a fresh exchange
    pub fn can_refresh(&self) -> bool {
        matches!(self, Self::Oauth2Refresh { .. })
    }
}

/// Cached token with expiration
#[derive(Debug, Clone)]
pub struct CachedToken {
    /// The access token
    pub token: String,
    /// When the token expires
    pub expires_at: Option<DateTime<Utc>>,
}

impl CachedToken {
    /// Create a new cached token
    pub fn new(token: String, expires_at: Option<DateTime<Utc>>) -> Self {
        Self { token, expires_at }
    }

    /// Create a token that expires in N seconds from now
    pub fn expires_in(token: String, seconds: i64) -> Self {
        let expires_at = Utc::now() + chrono::Duration::seconds(seconds);
        Self {
            token,
            expires_at: Some(expires_at),
        }
    }

    /// Check if the token is expired (with the safety margin applied)
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => {
                let margin = chrono::Duration::seconds(TOKEN_EXPIRY_MARGIN_SECS);
                Utc::now() + margin >= expires_at
            }
            None => false,
        }
    }
}
