//! OpenID relying-party configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::error::OpenIdError;
use crate::provider::ProviderKind;

/// Default lifetime of a pending authentication request (10 minutes).
pub const DEFAULT_FLOW_TTL: Duration = Duration::from_secs(600);

/// Upper bound for `flow_ttl` (24 hours).
pub const MAX_FLOW_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Configuration of an [`OpenIdProcessor`](crate::processor::OpenIdProcessor).
///
/// # Example (TOML)
///
/// ```toml
/// return_url = "https://app.example.com/openid/callback"
/// required_attributes = "email,fullname"
/// optional_attributes = "language timezone"
/// default_provider = "google"
/// flow_ttl = "10m"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OpenIdConfig {
    /// URL the provider redirects the user agent back to.
    pub return_url: String,

    /// Realm presented to the provider.
    /// Defaults to the origin of `return_url`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,

    /// Attributes the provider is asked to release, separated by commas
    /// or whitespace.
    pub required_attributes: String,

    /// Attributes requested if available.
    pub optional_attributes: String,

    /// Provider used when the request names none or an unknown one.
    pub default_provider: ProviderKind,

    /// How long a redirected user has to come back.
    #[serde(with = "humantime_serde")]
    pub flow_ttl: Duration,
}

impl Default for OpenIdConfig {
    fn default() -> Self {
        Self {
            return_url: "http://localhost:8080/openid/callback".to_string(),
            realm: None,
            required_attributes: String::new(),
            optional_attributes: String::new(),
            default_provider: ProviderKind::Google,
            flow_ttl: DEFAULT_FLOW_TTL,
        }
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// The configuration document could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

impl From<ConfigError> for OpenIdError {
    fn from(err: ConfigError) -> Self {
        OpenIdError::configuration(err.to_string())
    }
}

impl OpenIdConfig {
    /// Creates a configuration with the given return URL.
    #[must_use]
    pub fn new(return_url: impl Into<String>) -> Self {
        Self {
            return_url: return_url.into(),
            ..Self::default()
        }
    }

    /// Parses a configuration from TOML.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` if the document is malformed.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Sets the required attributes.
    #[must_use]
    pub fn with_required_attributes(mut self, attributes: impl Into<String>) -> Self {
        self.required_attributes = attributes.into();
        self
    }

    /// Sets the optional attributes.
    #[must_use]
    pub fn with_optional_attributes(mut self, attributes: impl Into<String>) -> Self {
        self.optional_attributes = attributes.into();
        self
    }

    /// Sets the realm.
    #[must_use]
    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    /// Sets the default provider.
    #[must_use]
    pub fn with_default_provider(mut self, provider: ProviderKind) -> Self {
        self.default_provider = provider;
        self
    }

    /// Sets the flow lifetime.
    #[must_use]
    pub fn with_flow_ttl(mut self, ttl: Duration) -> Self {
        self.flow_ttl = ttl;
        self
    }

    /// Parses the return URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the URL is empty, malformed or not HTTP(S).
    pub fn return_url(&self) -> Result<Url, ConfigError> {
        if self.return_url.trim().is_empty() {
            return Err(ConfigError::Missing("return_url".to_string()));
        }
        let url = Url::parse(&self.return_url).map_err(|e| {
            ConfigError::InvalidValue(format!("return_url '{}': {}", self.return_url, e))
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ConfigError::InvalidValue(format!(
                "return_url scheme '{}' must be http or https",
                other
            ))),
        }
    }

    /// Returns the realm, defaulting to the return URL origin.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the return URL is invalid.
    pub fn realm(&self) -> Result<String, ConfigError> {
        match &self.realm {
            Some(realm) => Ok(realm.clone()),
            None => Ok(format!("{}/", self.return_url()?.origin().ascii_serialization())),
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The return URL is missing or not an HTTP(S) URL
    /// - The realm is not a URL or does not cover the return URL
    /// - The flow TTL is zero or longer than [`MAX_FLOW_TTL`]
    pub fn validate(&self) -> Result<(), ConfigError> {
        let return_url = self.return_url()?;

        if let Some(realm) = &self.realm {
            let parsed = Url::parse(realm)
                .map_err(|e| ConfigError::InvalidValue(format!("realm '{}': {}", realm, e)))?;
            // Wildcard realms (`https://*.example.com/`) are not supported.
            if parsed.origin() != return_url.origin()
                || !path_within(return_url.path(), parsed.path())
            {
                return Err(ConfigError::InvalidValue(format!(
                    "return_url '{}' is outside realm '{}'",
                    return_url, realm
                )));
            }
        }

        if self.flow_ttl.is_zero() {
            return Err(ConfigError::InvalidValue(
                "flow_ttl must be > 0".to_string(),
            ));
        }

        if self.flow_ttl > MAX_FLOW_TTL {
            return Err(ConfigError::InvalidValue(format!(
                "flow_ttl must be at most {}s",
                MAX_FLOW_TTL.as_secs()
            )));
        }

        Ok(())
    }
}

/// Checks that `path` equals `realm_path` or lies below it at a segment boundary.
fn path_within(path: &str, realm_path: &str) -> bool {
    if path == realm_path || realm_path.ends_with('/') {
        return path.starts_with(realm_path);
    }
    path.strip_prefix(realm_path)
        .is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = OpenIdConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_provider, ProviderKind::Google);
        assert_eq!(config.flow_ttl, DEFAULT_FLOW_TTL);
    }

    #[test]
    fn test_builder() {
        let config = OpenIdConfig::new("https://app.example.com/openid/callback")
            .with_required_attributes("email,fullname")
            .with_optional_attributes("language")
            .with_default_provider(ProviderKind::Yahoo)
            .with_flow_ttl(Duration::from_secs(60));

        assert_eq!(config.required_attributes, "email,fullname");
        assert_eq!(config.optional_attributes, "language");
        assert_eq!(config.default_provider, ProviderKind::Yahoo);
        assert_eq!(config.flow_ttl, Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_realm_defaults_to_origin() {
        let config = OpenIdConfig::new("https://app.example.com:8443/openid/callback");
        assert_eq!(config.realm().unwrap(), "https://app.example.com:8443/");

        let config = config.with_realm("https://app.example.com:8443/openid/");
        assert_eq!(config.realm().unwrap(), "https://app.example.com:8443/openid/");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_return_url() {
        assert!(matches!(
            OpenIdConfig::new("").validate(),
            Err(ConfigError::Missing(_))
        ));
        assert!(matches!(
            OpenIdConfig::new("not a url").validate(),
            Err(ConfigError::InvalidValue(_))
        ));
        assert!(matches!(
            OpenIdConfig::new("ftp://app.example.com/cb").validate(),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_return_url_outside_realm() {
        let config = OpenIdConfig::new("https://app.example.com/cb")
            .with_realm("https://other.example.com/");
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));

        let config = OpenIdConfig::new("https://app.example.com/cb")
            .with_realm("https://app.example.com/admin/");
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_realm_path_segment_boundary() {
        let config = OpenIdConfig::new("https://app.example.com/openid/cb")
            .with_realm("https://app.example.com/op");
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));

        let config = OpenIdConfig::new("https://app.example.com/openid/cb")
            .with_realm("https://app.example.com/openid");
        assert!(config.validate().is_ok());

        let config = OpenIdConfig::new("https://app.example.com/openid")
            .with_realm("https://app.example.com/openid");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let config = OpenIdConfig::default().with_flow_ttl(Duration::ZERO);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_oversized_ttl_rejected() {
        let config = OpenIdConfig::from_toml_str(r#"flow_ttl = "100000years""#).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));

        let config = OpenIdConfig::default().with_flow_ttl(MAX_FLOW_TTL);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let config = OpenIdConfig::from_toml_str(
            r#"
            return_url = "https://app.example.com/openid/callback"
            required_attributes = "email,fullname"
            optional_attributes = "language"
            default_provider = "myopenid"
            flow_ttl = "5m"
            "#,
        )
        .unwrap();

        assert_eq!(config.return_url, "https://app.example.com/openid/callback");
        assert_eq!(config.default_provider, ProviderKind::MyOpenId);
        assert_eq!(config.flow_ttl, Duration::from_secs(300));
        assert!(config.realm.is_none());
    }

    #[test]
    fn test_from_toml_defaults_and_errors() {
        let config = OpenIdConfig::from_toml_str("").unwrap();
        assert_eq!(config.flow_ttl, DEFAULT_FLOW_TTL);

        let err = OpenIdConfig::from_toml_str("default_provider = \"aol\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_config_error_into_openid_error() {
        let err: OpenIdError = ConfigError::Missing("return_url".to_string()).into();
        assert!(matches!(err, OpenIdError::Configuration { .. }));
        assert!(err.to_string().contains("return_url"));
    }
}
