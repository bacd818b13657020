//! Well-known OpenID providers.
//!
//! Maps the short service keys accepted from the host (`?authType=yahoo`) to
//! the OpenID identifier that discovery is started from. Unknown or absent
//! keys never fail; they resolve to the registry default.

use serde::{Deserialize, Serialize};

/// Known OpenID 2.0 providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Google accounts (`google`); the default.
    #[default]
    Google,
    /// Yahoo (`yahoo`).
    Yahoo,
    /// MySpace (`myspace`).
    MySpace,
    /// myOpenID (`myopenid`).
    MyOpenId,
}

impl ProviderKind {
    /// All known providers, in registry order.
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Google,
        ProviderKind::Yahoo,
        ProviderKind::MySpace,
        ProviderKind::MyOpenId,
    ];

    /// Get the service key for this provider.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Google => "google",
            ProviderKind::Yahoo => "yahoo",
            ProviderKind::MySpace => "myspace",
            ProviderKind::MyOpenId => "myopenid",
        }
    }

    /// The OpenID identifier discovery is performed against.
    ///
    /// This is not always an absolute URL (`myspace.com`); normalization is
    /// left to the discovery layer.
    #[must_use]
    pub fn endpoint(&self) -> &'static str {
        match self {
            ProviderKind::Google => "https://www.google.com/accounts/o8/id",
            ProviderKind::Yahoo => "https://me.yahoo.com/",
            ProviderKind::MySpace => "myspace.com",
            ProviderKind::MyOpenId => "https://myopenid.com/",
        }
    }

    /// Looks up a provider by its exact service key.
    #[must_use]
    pub fn from_key(key: &str) -> Option<ProviderKind> {
        Self::ALL.into_iter().find(|p| p.as_str() == key)
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only provider lookup with a fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderRegistry {
    default: ProviderKind,
}

impl ProviderRegistry {
    /// Creates a registry that falls back to `default` for unknown keys.
    #[must_use]
    pub fn new(default: ProviderKind) -> Self {
        Self { default }
    }

    /// Returns the fallback provider.
    #[must_use]
    pub fn default_provider(&self) -> ProviderKind {
        self.default
    }

    /// Resolves an optional service key, falling back to the default.
    #[must_use]
    pub fn resolve(&self, key: Option<&str>) -> ProviderKind {
        key.filter(|k| !k.is_empty())
            .and_then(ProviderKind::from_key)
            .unwrap_or(self.default)
    }
}

/// Resolves a service key against the built-in table with Google as default.
#[must_use]
pub fn resolve_provider(key: Option<&str>) -> ProviderKind {
    ProviderRegistry::default().resolve(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_keys_resolve_to_fixed_endpoints() {
        assert_eq!(
            resolve_provider(Some("google")).endpoint(),
            "https://www.google.com/accounts/o8/id"
        );
        assert_eq!(
            resolve_provider(Some("yahoo")).endpoint(),
            "https://me.yahoo.com/"
        );
        assert_eq!(resolve_provider(Some("myspace")).endpoint(), "myspace.com");
        assert_eq!(
            resolve_provider(Some("myopenid")).endpoint(),
            "https://myopenid.com/"
        );
    }

    #[test]
    fn test_unknown_and_absent_keys_fall_back_to_google() {
        for key in [None, Some(""), Some("facebook"), Some("Google"), Some(" yahoo")] {
            assert_eq!(resolve_provider(key), ProviderKind::Google, "key {key:?}");
        }
    }

    #[test]
    fn test_registry_custom_default() {
        let registry = ProviderRegistry::new(ProviderKind::Yahoo);
        assert_eq!(registry.default_provider(), ProviderKind::Yahoo);
        assert_eq!(registry.resolve(Some("nope")), ProviderKind::Yahoo);
        assert_eq!(registry.resolve(Some("myopenid")), ProviderKind::MyOpenId);
    }

    #[test]
    fn test_key_round_trip() {
        for provider in ProviderKind::ALL {
            assert_eq!(ProviderKind::from_key(provider.as_str()), Some(provider));
            assert_eq!(provider.to_string(), provider.as_str());
        }
    }

    #[test]
    fn test_serde_uses_service_keys() {
        let json = serde_json::to_string(&ProviderKind::MyOpenId).unwrap();
        assert_eq!(json, "\"myopenid\"");
        let parsed: ProviderKind = serde_json::from_str("\"myspace\"").unwrap();
        assert_eq!(parsed, ProviderKind::MySpace);
    }
}
