//! OpenID 2.0 relying-party authentication flow.
//!
//! # Overview
//!
//! The flow consists of two requests from the user agent:
//!
//! 1. **Prepare** - resolve the provider, run discovery and association,
//!    remember the associated record in the session and redirect the user
//!    agent to the provider with an attribute exchange fetch request.
//! 2. **Complete** - verify the provider's callback against the record this
//!    session stored, then materialize a [`Principal`].
//!
//! ```text
//!   (none) --prepare--> AUTH --complete/verified--> FINISH
//!                         \
//!                          `--complete/rejected---> FAILED
//! ```
//!
//! The pending record is consumed by the first callback, whatever its
//! outcome. A replayed or late callback fails with a lifecycle error and the
//! user has to start over.
//!
//! # Example
//!
//! ```ignore
//! let mut processor = OpenIdProcessor::new(config, PrincipalStrategy::Generic, factory)?;
//! processor.initialize(vec!["user".to_string()])?;
//!
//! // Request 1
//! let redirect = processor.prepare_request(params.get("authType"), &session).await?;
//! // respond with 302 redirect.location
//!
//! // Request 2 (callback)
//! let callback = CallbackRequest::new(request_url, query_string, params);
//! match processor.complete_request(&callback, Some(&session)).await? {
//!     CallbackOutcome::Authenticated(ctx) => { /* ctx.principal, ctx.roles */ }
//!     CallbackOutcome::Denied(failure) => { /* respond failure.status_code() */ }
//! }
//! ```

use std::sync::Arc;

use url::Url;

use crate::OpenIdResult;
use crate::attributes::FetchSpec;
use crate::config::OpenIdConfig;
use crate::consumer::{ConsumerError, ConsumerFactory, OpenIdConsumer, ResponseParams};
use crate::error::OpenIdError;
use crate::message::AuthRequest;
use crate::principal::{
    AuthenticationContext, Principal, PrincipalStrategy, VerifiedIdentity, materialize,
};
use crate::provider::{ProviderKind, ProviderRegistry};
use crate::session::{
    AUTH_TYPE, DISCOVERY_NOTE, FlowPhase, OPENID_NOTE, PRINCIPAL_NOTE, PendingDiscovery,
    STATE_NOTE, SessionStore, read_note, take_note, write_note,
};

/// HTTP status the host should answer a denied callback with.
pub const ACCESS_DENIED_STATUS: u16 = 403;

/// Where to send the user agent after [`OpenIdProcessor::prepare_request`].
#[derive(Debug, Clone)]
pub struct RedirectInstruction {
    /// Provider URL carrying the encoded authentication request.
    pub location: Url,
    /// The provider the flow was started with.
    pub provider: ProviderKind,
}

/// The callback request as received from the provider.
#[derive(Debug, Clone)]
pub struct CallbackRequest {
    /// Request URL without query string.
    pub request_url: String,
    /// Raw query string, exactly as received.
    pub query_string: Option<String>,
    /// Decoded request parameters.
    pub params: ResponseParams,
}

impl CallbackRequest {
    /// Creates a callback request.
    #[must_use]
    pub fn new(
        request_url: impl Into<String>,
        query_string: Option<String>,
        params: ResponseParams,
    ) -> Self {
        Self {
            request_url: request_url.into(),
            query_string,
            params,
        }
    }

    /// The exact URL the provider redirected to.
    ///
    /// The query string is appended verbatim; signatures are computed over
    /// what the provider sent, so it must not be re-encoded.
    #[must_use]
    pub fn receiving_url(&self) -> String {
        match self.query_string.as_deref() {
            Some(query) if !query.is_empty() => format!("{}?{}", self.request_url, query),
            _ => self.request_url.clone(),
        }
    }
}

/// A callback that was verified but did not authenticate anyone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationFailure {
    /// Why authentication failed.
    pub reason: String,
}

impl AuthenticationFailure {
    /// Creates a failure with the given reason.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// The HTTP status the host should respond with.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        ACCESS_DENIED_STATUS
    }
}

/// Result of [`OpenIdProcessor::complete_request`].
#[derive(Debug, Clone)]
pub enum CallbackOutcome {
    /// The user is authenticated.
    Authenticated(AuthenticationContext),
    /// The response did not yield an identity; answer with access denied.
    Denied(AuthenticationFailure),
}

impl CallbackOutcome {
    /// Returns the authenticated principal, if any.
    #[must_use]
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            Self::Authenticated(ctx) => Some(&ctx.principal),
            Self::Denied(_) => None,
        }
    }

    /// Returns `true` if the user is authenticated.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

/// Drives the OpenID authentication flow for one relying-party configuration.
///
/// After [`initialize`](Self::initialize) the processor is read-only and can
/// be shared between requests; all per-user state lives in the session.
pub struct OpenIdProcessor {
    config: OpenIdConfig,
    return_url: Url,
    realm: String,
    registry: ProviderRegistry,
    strategy: PrincipalStrategy,
    factory: ConsumerFactory,
    consumer: Option<Arc<dyn OpenIdConsumer>>,
    fetch: FetchSpec,
    roles: Vec<String>,
    initialized: bool,
}

impl OpenIdProcessor {
    /// Creates a processor.
    ///
    /// The consumer is not created until [`initialize`](Self::initialize).
    ///
    /// # Errors
    ///
    /// Returns [`OpenIdError::Configuration`] if the configuration is invalid.
    pub fn new(
        config: OpenIdConfig,
        strategy: PrincipalStrategy,
        factory: ConsumerFactory,
    ) -> OpenIdResult<Self> {
        config.validate()?;
        let return_url = config.return_url()?;
        let realm = config.realm()?;
        let registry = ProviderRegistry::new(config.default_provider);

        Ok(Self {
            config,
            return_url,
            realm,
            registry,
            strategy,
            factory,
            consumer: None,
            fetch: FetchSpec::default(),
            roles: Vec::new(),
            initialized: false,
        })
    }

    /// Returns whether [`initialize`](Self::initialize) has completed.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Returns the attributes requested with every authentication request.
    #[must_use]
    pub fn fetch_spec(&self) -> &FetchSpec {
        &self.fetch
    }

    /// Returns the roles granted to authenticated users.
    #[must_use]
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    /// Returns the processor configuration.
    #[must_use]
    pub fn config(&self) -> &OpenIdConfig {
        &self.config
    }

    /// Creates the consumer (once) and builds the fetch specification.
    ///
    /// Calling this again rebuilds the fetch specification and replaces the
    /// roles; the consumer is kept.
    ///
    /// # Errors
    ///
    /// Returns [`OpenIdError::Configuration`] if the consumer cannot be
    /// created or a required attribute has no known type.
    pub fn initialize(&mut self, required_roles: Vec<String>) -> OpenIdResult<()> {
        if self.consumer.is_none() {
            let consumer = (self.factory)().map_err(|e| {
                OpenIdError::configuration(format!("cannot create OpenID consumer: {e}"))
            })?;
            self.consumer = Some(consumer);
        }

        self.fetch = FetchSpec::build(
            &self.config.required_attributes,
            &self.config.optional_attributes,
        )?;
        self.roles = required_roles;
        self.initialized = true;

        tracing::info!(
            "Initialized OpenID processor: {} fetch attributes, roles {:?}",
            self.fetch.len(),
            self.roles
        );
        Ok(())
    }

    fn consumer(&self) -> OpenIdResult<&Arc<dyn OpenIdConsumer>> {
        match (&self.consumer, self.initialized) {
            (Some(consumer), true) => Ok(consumer),
            _ => Err(OpenIdError::lifecycle("processor is not initialized")),
        }
    }

    /// Starts an authentication flow.
    ///
    /// `service_hint` is the provider key sent by the user agent; if absent
    /// the `authType` session note is used, then the default provider.
    ///
    /// # Errors
    ///
    /// - [`OpenIdError::Lifecycle`] if the processor is not initialized
    /// - [`OpenIdError::Discovery`] / [`OpenIdError::Association`] if the
    ///   consumer fails (no retry is attempted)
    /// - [`OpenIdError::Session`] if the session store fails
    pub async fn prepare_request(
        &self,
        service_hint: Option<&str>,
        session: &dyn SessionStore,
    ) -> OpenIdResult<RedirectInstruction> {
        let consumer = self.consumer()?;

        let hint = match service_hint.filter(|h| !h.is_empty()) {
            Some(hint) => Some(hint.to_string()),
            None => read_note::<String>(session, AUTH_TYPE).await?,
        };
        let provider = self.registry.resolve(hint.as_deref());
        let identifier = provider.endpoint();

        // A restarted flow invalidates the previous one even if it fails.
        session.remove_note(DISCOVERY_NOTE).await?;
        session.remove_note(STATE_NOTE).await?;

        tracing::debug!(
            "Starting OpenID authentication with provider {} ({})",
            provider,
            identifier
        );

        write_note(session, OPENID_NOTE, &identifier).await?;

        let discoveries = consumer.discover(identifier).await.map_err(|e| {
            tracing::warn!("OpenID discovery failed for {}: {}", identifier, e);
            OpenIdError::Discovery(e)
        })?;
        if discoveries.is_empty() {
            return Err(OpenIdError::Discovery(
                ConsumerError::NoEndpoint(identifier.to_string()),
            ));
        }

        let discovered = consumer.associate(&discoveries).await.map_err(|e| {
            tracing::warn!("OpenID association failed for {}: {}", identifier, e);
            OpenIdError::Association(e)
        })?;

        let pending = PendingDiscovery::new(provider, discovered);
        write_note(session, DISCOVERY_NOTE, &pending).await?;

        let mut auth_request = AuthRequest::new(&pending.record, &self.return_url, &self.realm);
        auth_request.add_fetch_extension(&self.fetch);
        let location = auth_request.destination_url();

        write_note(session, STATE_NOTE, &FlowPhase::Auth).await?;

        tracing::debug!(
            "Redirecting flow {} to {}",
            pending.flow_id,
            &location[..url::Position::AfterPath]
        );

        Ok(RedirectInstruction { location, provider })
    }

    /// Completes an authentication flow from the provider callback.
    ///
    /// # Errors
    ///
    /// - [`OpenIdError::Lifecycle`] if there is no session, no pending
    ///   request, the request expired or was already completed
    /// - [`OpenIdError::Verification`] if the consumer fails to verify
    /// - [`OpenIdError::Message`] if the attribute exchange response is malformed
    /// - [`OpenIdError::Session`] if the session store fails
    ///
    /// Every error after the pending request was found leaves the flow in
    /// phase `FAILED`.
    ///
    /// A response that verifies without an identity is not an error; it is
    /// returned as [`CallbackOutcome::Denied`].
    pub async fn complete_request(
        &self,
        callback: &CallbackRequest,
        session: Option<&dyn SessionStore>,
    ) -> OpenIdResult<CallbackOutcome> {
        let session = session.ok_or_else(|| OpenIdError::lifecycle("session was null"))?;
        let consumer = self.consumer()?;

        let pending: PendingDiscovery = take_note(session, DISCOVERY_NOTE)
            .await?
            .ok_or_else(|| OpenIdError::lifecycle("no pending discovery information"))?;

        let phase = read_note::<FlowPhase>(session, STATE_NOTE).await?;
        if phase != Some(FlowPhase::Auth) {
            write_note(session, STATE_NOTE, &FlowPhase::Failed).await?;
            return Err(OpenIdError::lifecycle(format!(
                "flow {} is in phase {:?}, expected AUTH",
                pending.flow_id, phase
            )));
        }

        if pending.is_expired(self.config.flow_ttl) {
            tracing::warn!("OpenID flow {} expired before callback", pending.flow_id);
            write_note(session, STATE_NOTE, &FlowPhase::Failed).await?;
            return Err(OpenIdError::lifecycle(format!(
                "flow {} has expired",
                pending.flow_id
            )));
        }

        let receiving_url = callback.receiving_url();
        let verification = match consumer
            .verify(&receiving_url, &callback.params, &pending.record)
            .await
        {
            Ok(verification) => verification,
            Err(e) => {
                tracing::warn!("OpenID verification failed for flow {}: {}", pending.flow_id, e);
                write_note(session, STATE_NOTE, &FlowPhase::Failed).await?;
                return Err(OpenIdError::Verification(e));
            }
        };

        let Some(identifier) = verification.verified_id else {
            tracing::warn!(
                "OpenID response for flow {} carried no verified identifier",
                pending.flow_id
            );
            write_note(session, STATE_NOTE, &FlowPhase::Failed).await?;
            return Ok(CallbackOutcome::Denied(AuthenticationFailure::new(
                "response did not verify",
            )));
        };

        let attributes = match verification
            .auth_response
            .map(|success| success.attribute_exchange())
            .transpose()
        {
            Ok(attributes) => attributes.flatten().unwrap_or_default(),
            Err(e) => {
                tracing::warn!("OpenID response for flow {} is malformed: {}", pending.flow_id, e);
                write_note(session, STATE_NOTE, &FlowPhase::Failed).await?;
                return Err(e);
            }
        };

        let identity = VerifiedIdentity {
            identifier,
            provider_endpoint: pending.record.op_endpoint.clone(),
            attributes,
        };
        let context = AuthenticationContext {
            principal: materialize(identity, &self.roles),
            roles: self.roles.clone(),
        };

        let resolved = match self.strategy.resolve(&context).await {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::warn!(
                    "Realm failed to authenticate OpenID principal {}: {}",
                    context.principal_name(),
                    e
                );
                write_note(session, STATE_NOTE, &FlowPhase::Failed).await?;
                return Err(e);
            }
        };

        let Some(principal) = resolved else {
            tracing::warn!(
                "Realm refused OpenID principal {}",
                context.principal_name()
            );
            write_note(session, STATE_NOTE, &FlowPhase::Failed).await?;
            return Ok(CallbackOutcome::Denied(AuthenticationFailure::new(
                "principal refused by realm",
            )));
        };

        write_note(session, PRINCIPAL_NOTE, &principal).await?;
        write_note(session, STATE_NOTE, &FlowPhase::Finish).await?;

        tracing::info!(
            "Successfully authenticated {} via provider {}",
            principal.name,
            pending.provider
        );

        Ok(CallbackOutcome::Authenticated(AuthenticationContext {
            roles: context.roles,
            principal,
        }))
    }
}

impl std::fmt::Debug for OpenIdProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenIdProcessor")
            .field("return_url", &self.return_url.as_str())
            .field("realm", &self.realm)
            .field("default_provider", &self.registry.default_provider())
            .field("strategy", &self.strategy)
            .field("fetch", &self.fetch)
            .field("roles", &self.roles)
            .field("initialized", &self.initialized)
            .finish()
    }
}
