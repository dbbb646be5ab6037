//! Run configuration
//!
//! The configuration document carries OAuth refresh credentials, the
//! default extraction floor, and the knobs that select and shape streams.
//! It is loaded from JSON, or YAML when the file extension says so.

use crate::auth::AuthConfig;
use crate::error::{Error, Result, ResultExt};
use crate::http::HttpClientConfig;
use crate::types::{parse_timestamp, FailurePolicy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Production API root
pub const DEFAULT_BASE_URL: &str = "https://api.hubapi.com";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Complete run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Extraction floor for streams without a bookmark (ISO-8601)
    pub start_date: String,

    /// OAuth client id
    #[serde(default)]
    pub client_id: String,

    /// OAuth client secret
    #[serde(default)]
    pub client_secret: String,

    /// Long-lived refresh token exchanged for access tokens
    #[serde(default)]
    pub refresh_token: String,

    /// Redirect URI registered for the OAuth app
    #[serde(default)]
    pub redirect_uri: String,

    /// Static bearer token (private apps); bypasses the refresh exchange
    #[serde(default)]
    pub access_token: Option<String>,

    /// Enables the streams that need paid-tier scopes
    #[serde(default)]
    pub advanced_features_enabled: bool,

    /// API root, overridable for testing
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Page size for listing endpoints
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// What to do when a stream fails with an unclassified error
    #[serde(default)]
    pub on_stream_error: FailurePolicy,

    /// Account-specific object types to extract
    #[serde(default)]
    pub custom_objects: Vec<CustomObjectConfig>,

    /// Streams to sync (empty = every enabled stream)
    #[serde(default)]
    pub streams: Vec<String>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_page_size() -> u32 {
    250
}

/// An account-specific object type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomObjectConfig {
    /// Object name as defined in the account schema
    pub name: String,
    /// Owning portal (account) id
    pub portal_id: u64,
}

impl CustomObjectConfig {
    /// Fully qualified object type id used by the CRM endpoints
    pub fn object_type(&self) -> String {
        format!("p{}_{}", self.portal_id, self.name)
    }

    /// Name of the emitted stream
    pub fn stream_name(&self) -> String {
        self.name.clone()
    }
}

impl HubConfig {
    /// Create a config with the required fields
    pub fn new(
        start_date: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            start_date: start_date.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_token: refresh_token.into(),
            redirect_uri: String::new(),
            access_token: None,
            advanced_features_enabled: false,
            base_url: default_base_url(),
            request_timeout_secs: default_timeout_secs(),
            page_size: default_page_size(),
            on_stream_error: FailurePolicy::default(),
            custom_objects: Vec::new(),
            streams: Vec::new(),
        }
    }

    /// Point the config at a different API root
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Use a static bearer token instead of the refresh exchange
    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Enable or disable the advanced stream set
    #[must_use]
    pub fn with_advanced_features(mut self, enabled: bool) -> Self {
        self.advanced_features_enabled = enabled;
        self
    }

    /// Set the failure policy for unclassified stream errors
    #[must_use]
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.on_stream_error = policy;
        self
    }

    /// Restrict the run to the named streams
    #[must_use]
    pub fn with_streams<I, S>(mut self, streams: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.streams = streams.into_iter().map(Into::into).collect();
        self
    }

    /// Register a custom object
    #[must_use]
    pub fn with_custom_object(mut self, name: impl Into<String>, portal_id: u64) -> Self {
        self.custom_objects.push(CustomObjectConfig {
            name: name.into(),
            portal_id,
        });
        self
    }

    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));

        let config: Self = if is_yaml {
            serde_yaml::from_str(&content).context("Invalid config YAML")?
        } else {
            Self::from_json(&content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::config(format!("Invalid config JSON: {e}")))
    }

    /// Validate required fields and value formats
    pub fn validate(&self) -> Result<()> {
        self.start_datetime()?;

        url::Url::parse(&self.base_url)
            .map_err(|e| Error::invalid_value("base_url", e.to_string()))?;

        if self.access_token.as_deref().is_some_and(|t| !t.is_empty()) {
            return Ok(());
        }

        for (field, value) in [
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("refresh_token", &self.refresh_token),
        ] {
            if value.trim().is_empty() {
                return Err(Error::missing_field(field));
            }
        }

        Ok(())
    }

    /// Parsed extraction floor
    pub fn start_datetime(&self) -> Result<DateTime<Utc>> {
        if self.start_date.trim().is_empty() {
            return Err(Error::missing_field("start_date"));
        }
        parse_timestamp(&self.start_date)
            .map_err(|e| Error::invalid_value("start_date", e.to_string()))
    }

    /// Per-request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// OAuth token endpoint derived from the API root
    pub fn token_url(&self) -> String {
        format!("{}/oauth/v1/token", self.base_url.trim_end_matches('/'))
    }

    /// Credentials the HTTP layer authenticates with.
    ///
    /// A static access token wins over the refresh exchange.
    pub fn auth_config(&self) -> AuthConfig {
        if let Some(token) = self.access_token.as_ref().filter(|t| !t.is_empty()) {
            return AuthConfig::Bearer {
                token: token.clone(),
            };
        }
        AuthConfig::Oauth2Refresh {
            token_url: self.token_url(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            refresh_token: self.refresh_token.clone(),
            redirect_uri: (!self.redirect_uri.is_empty()).then(|| self.redirect_uri.clone()),
        }
    }

    /// HTTP client settings for this account
    pub fn http_config(&self) -> HttpClientConfig {
        HttpClientConfig::builder()
            .base_url(self.base_url.trim_end_matches('/'))
            .timeout(self.request_timeout())
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const MINIMAL: &str = r#"{
        "start_date": "2023-01-01T00:00:00Z",
        "client_id": "id",
        "client_secret": "secret",
        "refresh_token": "refresh",
        "redirect_uri": "https://example.com/callback"
    }"#;

    #[test]
    fn test_defaults() {
        let config = HubConfig::from_json(MINIMAL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.page_size, 250);
        assert!(!config.advanced_features_enabled);
        assert_eq!(config.on_stream_error, FailurePolicy::Abort);
        assert!(config.custom_objects.is_empty());
        assert_eq!(config.token_url(), "https://api.hubapi.com/oauth/v1/token");
    }

    #[test]
    fn test_start_datetime() {
        let config = HubConfig::from_json(MINIMAL).unwrap();
        assert_eq!(
            config.start_datetime().unwrap().to_rfc3339(),
            "2023-01-01T00:00:00+00:00"
        );

        let date_only = HubConfig::new("2023-06-01", "a", "b", "c");
        assert_eq!(
            date_only.start_datetime().unwrap().to_rfc3339(),
            "2023-06-01T00:00:00+00:00"
        );
    }

    #[test]
    fn test_validate_missing_credentials() {
        let config = HubConfig::new("2023-01-01", "id", "", "refresh");
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::MissingConfigField { ref field } if field == "client_secret"));
    }

    #[test]
    fn test_validate_access_token_skips_oauth_fields() {
        let config = HubConfig::new("2023-01-01", "", "", "").with_access_token("pat-123");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_bad_start_date() {
        let config = HubConfig::new("last tuesday", "a", "b", "c");
        assert!(matches!(
            config.validate().unwrap_err(),
            Error::InvalidConfigValue { .. }
        ));
    }

    #[test]
    fn test_validate_bad_base_url() {
        let config = HubConfig::new("2023-01-01", "a", "b", "c").with_base_url("not a url");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_auth_config_selection() {
        let oauth = HubConfig::from_json(MINIMAL).unwrap().auth_config();
        match oauth {
            AuthConfig::Oauth2Refresh {
                token_url,
                redirect_uri,
                ..
            } => {
                assert_eq!(token_url, "https://api.hubapi.com/oauth/v1/token");
                assert_eq!(redirect_uri.as_deref(), Some("https://example.com/callback"));
            }
            other => panic!("expected refresh exchange, got {other:?}"),
        }

        let bearer = HubConfig::new("2023-01-01", "", "", "")
            .with_access_token("pat-123")
            .auth_config();
        assert!(matches!(bearer, AuthConfig::Bearer { ref token } if token == "pat-123"));
    }

    #[test]
    fn test_http_config() {
        let config = HubConfig::from_json(MINIMAL)
            .unwrap()
            .with_base_url("http://localhost:9999/");
        let http = config.http_config();
        assert_eq!(http.base_url.as_deref(), Some("http://localhost:9999"));
        assert_eq!(http.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_custom_object_type() {
        let config = HubConfig::new("2023-01-01", "a", "b", "c").with_custom_object("pets", 4242);
        let object = &config.custom_objects[0];
        assert_eq!(object.object_type(), "p4242_pets");
        assert_eq!(object.stream_name(), "pets");
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "start_date: '2023-01-01T00:00:00Z'\nclient_id: id\nclient_secret: secret\nrefresh_token: refresh\non_stream_error: skip\nstreams: [contacts, deals]\ncustom_objects:\n  - name: pets\n    portal_id: 7"
        )
        .unwrap();

        let config = HubConfig::from_file(file.path()).unwrap();
        assert_eq!(config.on_stream_error, FailurePolicy::Skip);
        assert_eq!(config.streams, vec!["contacts", "deals"]);
        assert_eq!(config.custom_objects[0].object_type(), "p7_pets");
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let config = HubConfig::from_file(file.path()).unwrap();
        assert_eq!(config.client_id, "id");
    }

    #[test]
    fn test_file_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.json");
        let err = HubConfig::from_file(&missing).unwrap_err();
        assert!(err.to_string().contains("absent.json"));

        let yaml = dir.path().join("broken.yml");
        std::fs::write(&yaml, "start_date: [unclosed").unwrap();
        let err = HubConfig::from_file(&yaml).unwrap_err();
        assert!(err.to_string().starts_with("Invalid config YAML"));
    }
}
