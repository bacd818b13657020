//! Authenticated principals.
//!
//! A verified OpenID identifier plus the attributes fetched through
//! attribute exchange are turned into a [`Principal`] carrying the roles the
//! processor was initialized with. How the host realm consumes the principal
//! is declared up front through a [`PrincipalStrategy`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::OpenIdResult;

/// Identity established by a successful verification.
///
/// Exists only while the principal is being produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    /// The verified OpenID identifier.
    pub identifier: String,
    /// The provider endpoint that asserted the identity.
    pub provider_endpoint: Url,
    /// Attributes fetched through attribute exchange, keyed by alias.
    pub attributes: HashMap<String, Vec<String>>,
}

/// An authenticated OpenID user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Principal name; the raw verified identifier.
    pub name: String,

    /// The provider endpoint that asserted the identity.
    pub provider_endpoint: Url,

    /// Attributes fetched through attribute exchange, keyed by alias.
    #[serde(default)]
    pub attributes: HashMap<String, Vec<String>>,

    /// Roles granted to every user authenticated by this processor.
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Principal {
    /// Returns the first value of an attribute.
    #[must_use]
    pub fn attribute(&self, alias: &str) -> Option<&str> {
        self.attributes
            .get(alias)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Checks if the principal has the given role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Pairs a verified identity with the configured roles.
#[must_use]
pub fn materialize(identity: VerifiedIdentity, roles: &[String]) -> Principal {
    Principal {
        name: identity.identifier,
        provider_endpoint: identity.provider_endpoint,
        attributes: identity.attributes,
        roles: roles.to_vec(),
    }
}

/// The result of an authentication transaction, passed explicitly to any
/// follow-on realm authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationContext {
    /// The materialized principal.
    pub principal: Principal,
    /// Roles to grant in the host realm.
    pub roles: Vec<String>,
}

impl AuthenticationContext {
    /// Returns the principal name.
    #[must_use]
    pub fn principal_name(&self) -> &str {
        &self.principal.name
    }
}

/// A host realm that accepts OpenID-authenticated principals.
#[async_trait]
pub trait RealmAuthenticator: Send + Sync {
    /// Authenticates the principal in the realm.
    ///
    /// Returns `None` if the realm refuses the principal.
    async fn authenticate(&self, context: &AuthenticationContext)
    -> OpenIdResult<Option<Principal>>;
}

/// How the processor hands the materialized principal to the host.
#[derive(Clone, Default)]
pub enum PrincipalStrategy {
    /// Return the materialized principal directly.
    #[default]
    Generic,
    /// Let the host realm authenticate the principal.
    Realm(Arc<dyn RealmAuthenticator>),
}

impl PrincipalStrategy {
    /// Produces the principal the host should see.
    ///
    /// # Errors
    ///
    /// Propagates realm failures.
    pub async fn resolve(&self, context: &AuthenticationContext) -> OpenIdResult<Option<Principal>> {
        match self {
            Self::Generic => Ok(Some(context.principal.clone())),
            Self::Realm(realm) => realm.authenticate(context).await,
        }
    }
}

impl fmt::Debug for PrincipalStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generic => write!(f, "Generic"),
            Self::Realm(_) => write!(f, "Realm(..)"),
        }
    }
}
