//! # octofhir-openid
//!
//! OpenID 2.0 relying-party authentication for the OctoFHIR server.
//!
//! This crate provides:
//! - Provider selection from a short service key
//! - Discovery and association through a pluggable consumer
//! - `checkid_setup` requests with attribute exchange
//! - Callback verification bound to the session that started the flow
//! - Principal materialization with configured roles
//!
//! ## Overview
//!
//! Authentication spans two requests. [`OpenIdProcessor::prepare_request`]
//! redirects the user agent to the provider;
//! [`OpenIdProcessor::complete_request`] handles the callback. State between
//! them lives in a host [`SessionStore`], never in the processor.
//!
//! ## Modules
//!
//! - [`config`] - Relying-party configuration
//! - [`error`] - Error types
//! - [`provider`] - Supported providers and service key resolution
//! - [`attributes`] - Attribute exchange schema and fetch specification
//! - [`consumer`] - Discovery, association and verification contract
//! - [`message`] - OpenID request and response messages
//! - [`session`] - Session notes and flow state
//! - [`principal`] - Authenticated principals and realm hand-off
//! - [`processor`] - The authentication flow

pub mod attributes;
pub mod config;
pub mod consumer;
pub mod error;
pub mod message;
pub mod principal;
pub mod processor;
pub mod provider;
pub mod session;

pub use attributes::{AX_NAMESPACE, FetchAttribute, FetchSpec};
pub use config::{ConfigError, DEFAULT_FLOW_TTL, OpenIdConfig};
pub use consumer::{
    ConsumerError, ConsumerFactory, DiscoveryRecord, OpenIdConsumer, ResponseParams,
    VerificationResult,
};
pub use error::{ErrorCategory, OpenIdError};
pub use message::{AuthRequest, AuthSuccess};
pub use principal::{
    AuthenticationContext, Principal, PrincipalStrategy, RealmAuthenticator, VerifiedIdentity,
};
pub use processor::{
    AuthenticationFailure, CallbackOutcome, CallbackRequest, OpenIdProcessor,
    RedirectInstruction,
};
pub use provider::{ProviderKind, ProviderRegistry};
pub use session::{FlowPhase, FlowState, MemorySessionStore, PendingDiscovery, SessionStore};

/// Type alias for OpenID results.
pub type OpenIdResult<T> = Result<T, OpenIdError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use octofhir_openid::prelude::*;
/// ```
pub mod prelude {
    pub use crate::OpenIdResult;
    pub use crate::config::{ConfigError, OpenIdConfig};
    pub use crate::consumer::{
        ConsumerError, ConsumerFactory, DiscoveryRecord, OpenIdConsumer, ResponseParams,
        VerificationResult,
    };
    pub use crate::error::{ErrorCategory, OpenIdError};
    pub use crate::message::AuthSuccess;
    pub use crate::principal::{
        AuthenticationContext, Principal, PrincipalStrategy, RealmAuthenticator,
    };
    pub use crate::processor::{
        AuthenticationFailure, CallbackOutcome, CallbackRequest, OpenIdProcessor,
        RedirectInstruction,
    };
    pub use crate::provider::ProviderKind;
    pub use crate::session::{FlowPhase, FlowState, MemorySessionStore, SessionStore};
}
