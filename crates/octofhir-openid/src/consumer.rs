//! Contract with the OpenID consumer library.
//!
//! Discovery, association and response verification (signature checks,
//! nonce tracking, return-to validation) are provided by a standards
//! compliant OpenID library. This module defines the trait such a library is
//! adapted to, and the records exchanged across it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::message::AuthSuccess;

/// Raw callback parameters, as delivered by the user agent.
pub type ResponseParams = HashMap<String, Vec<String>>;

/// Errors raised by the consumer library.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConsumerError {
    /// A network error occurred while talking to the provider.
    #[error("Network error: {0}")]
    Network(String),

    /// The provider returned something that violates the protocol.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Discovery produced no usable endpoint.
    #[error("No OpenID endpoint found for {0}")]
    NoEndpoint(String),
}

impl ConsumerError {
    /// Creates a `Network` error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Creates a `Protocol` error.
    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}

/// Information about a discovered OpenID provider endpoint.
///
/// After association the record also carries the association handle used
/// to sign the provider's response. It is stored in the user's session
/// between the redirect and the callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryRecord {
    /// The provider endpoint authentication requests are sent to.
    pub op_endpoint: Url,

    /// The claimed identifier; `None` for an OP identifier (identifier select).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_identifier: Option<String>,

    /// The OP-local identifier, if it differs from the claimed identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate: Option<String>,

    /// Association handle established with the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assoc_handle: Option<String>,
}

impl DiscoveryRecord {
    /// Creates a record for an OP identifier.
    #[must_use]
    pub fn new(op_endpoint: Url) -> Self {
        Self {
            op_endpoint,
            claimed_identifier: None,
            delegate: None,
            assoc_handle: None,
        }
    }

    /// Sets the claimed identifier.
    #[must_use]
    pub fn with_claimed_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.claimed_identifier = Some(identifier.into());
        self
    }

    /// Sets the OP-local identifier.
    #[must_use]
    pub fn with_delegate(mut self, delegate: impl Into<String>) -> Self {
        self.delegate = Some(delegate.into());
        self
    }

    /// Sets the association handle.
    #[must_use]
    pub fn with_assoc_handle(mut self, handle: impl Into<String>) -> Self {
        self.assoc_handle = Some(handle.into());
        self
    }

    /// Returns `true` if the provider should select the user identifier.
    #[must_use]
    pub fn is_op_identifier(&self) -> bool {
        self.claimed_identifier.is_none()
    }
}

/// Outcome of verifying a provider response.
#[derive(Debug, Clone, Default)]
pub struct VerificationResult {
    /// The verified identifier; `None` if the assertion was not accepted.
    pub verified_id: Option<String>,

    /// The positive assertion, present when verification succeeded.
    pub auth_response: Option<AuthSuccess>,
}

impl VerificationResult {
    /// A result carrying no verified identity.
    #[must_use]
    pub fn rejected() -> Self {
        Self::default()
    }

    /// A successful verification.
    #[must_use]
    pub fn verified(identifier: impl Into<String>, response: AuthSuccess) -> Self {
        Self {
            verified_id: Some(identifier.into()),
            auth_response: Some(response),
        }
    }
}

/// OpenID consumer operations the authentication flow depends on.
#[async_trait]
pub trait OpenIdConsumer: Send + Sync {
    /// Resolves a user-supplied identifier to candidate endpoints.
    async fn discover(&self, identifier: &str) -> Result<Vec<DiscoveryRecord>, ConsumerError>;

    /// Picks an endpoint from `discoveries` and associates with it.
    async fn associate(
        &self,
        discoveries: &[DiscoveryRecord],
    ) -> Result<DiscoveryRecord, ConsumerError>;

    /// Verifies a provider response against the record the request was issued for.
    ///
    /// `receiving_url` must be the exact URL the provider redirected to.
    async fn verify(
        &self,
        receiving_url: &str,
        params: &ResponseParams,
        discovered: &DiscoveryRecord,
    ) -> Result<VerificationResult, ConsumerError>;
}

/// Creates the consumer when the processor is initialized.
pub type ConsumerFactory =
    Box<dyn Fn() -> Result<Arc<dyn OpenIdConsumer>, ConsumerError> + Send + Sync>;
