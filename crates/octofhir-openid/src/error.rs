//! Error types for the OpenID relying-party flow.
//!
//! Collaborator failures (discovery, association, verification) are wrapped
//! and surfaced to the caller as fatal for the current attempt. A negative
//! verification result is *not* an error: it is reported as
//! [`CallbackOutcome::Denied`](crate::processor::CallbackOutcome::Denied).

use std::fmt;

use crate::consumer::ConsumerError;

/// Errors that can occur while running an OpenID authentication flow.
#[derive(Debug, thiserror::Error)]
pub enum OpenIdError {
    /// The processor or its configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// Resolving the provider identifier failed.
    #[error("Discovery failed: {0}")]
    Discovery(#[source] ConsumerError),

    /// Establishing an association with the provider failed.
    #[error("Association failed: {0}")]
    Association(#[source] ConsumerError),

    /// The verification layer failed before producing a result.
    #[error("Verification failed: {0}")]
    Verification(#[source] ConsumerError),

    /// Flow state is missing, expired or already consumed.
    #[error("Wrong lifecycle: {message}")]
    Lifecycle {
        /// Description of the lifecycle violation.
        message: String,
    },

    /// The host session store failed or returned an unreadable note.
    #[error("Session error: {message}")]
    Session {
        /// Description of the session failure.
        message: String,
    },

    /// A provider message is malformed.
    #[error("Malformed message: {message}")]
    Message {
        /// Description of the defect.
        message: String,
    },
}

impl OpenIdError {
    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Lifecycle` error.
    #[must_use]
    pub fn lifecycle(message: impl Into<String>) -> Self {
        Self::Lifecycle {
            message: message.into(),
        }
    }

    /// Creates a new `Session` error.
    #[must_use]
    pub fn session(message: impl Into<String>) -> Self {
        Self::Session {
            message: message.into(),
        }
    }

    /// Creates a new `Message` error.
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    /// Returns `true` if the caller must restart the flow from `prepare_request`.
    #[must_use]
    pub fn is_lifecycle_error(&self) -> bool {
        matches!(self, Self::Lifecycle { .. })
    }

    /// Returns `true` if the error originated in the OpenID collaborator.
    #[must_use]
    pub fn is_external_error(&self) -> bool {
        matches!(
            self,
            Self::Discovery(_) | Self::Association(_) | Self::Verification(_)
        )
    }

    /// Returns `true` if this should be reported as a server error (5xx).
    ///
    /// Everything except lifecycle violations is a server-side failure from
    /// the user agent's point of view.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        !self.is_lifecycle_error()
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Discovery(_) | Self::Association(_) | Self::Verification(_) => {
                ErrorCategory::Federation
            }
            Self::Lifecycle { .. } => ErrorCategory::Lifecycle,
            Self::Session { .. } => ErrorCategory::Infrastructure,
            Self::Message { .. } => ErrorCategory::Protocol,
        }
    }
}

/// Categories of OpenID flow errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Invalid processor setup.
    Configuration,
    /// Identity provider collaborator failures.
    Federation,
    /// Missing or stale flow state.
    Lifecycle,
    /// Host session storage failures.
    Infrastructure,
    /// Malformed provider messages.
    Protocol,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Federation => write!(f, "federation"),
            Self::Lifecycle => write!(f, "lifecycle"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Protocol => write!(f, "protocol"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OpenIdError::lifecycle("session was null");
        assert_eq!(err.to_string(), "Wrong lifecycle: session was null");

        let err = OpenIdError::configuration("unknown attribute alias: shoe_size");
        assert_eq!(
            err.to_string(),
            "Configuration error: unknown attribute alias: shoe_size"
        );

        let err = OpenIdError::Discovery(ConsumerError::network("connection refused"));
        assert!(err.to_string().contains("Discovery failed"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_error_predicates() {
        let err = OpenIdError::lifecycle("x");
        assert!(err.is_lifecycle_error());
        assert!(!err.is_external_error());
        assert!(!err.is_server_error());

        let err = OpenIdError::Verification(ConsumerError::protocol("bad signature"));
        assert!(err.is_external_error());
        assert!(err.is_server_error());

        let err = OpenIdError::session("store unavailable");
        assert!(!err.is_external_error());
        assert!(err.is_server_error());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            OpenIdError::configuration("x").category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            OpenIdError::Association(ConsumerError::network("x")).category(),
            ErrorCategory::Federation
        );
        assert_eq!(
            OpenIdError::lifecycle("x").category(),
            ErrorCategory::Lifecycle
        );
        assert_eq!(
            OpenIdError::session("x").category(),
            ErrorCategory::Infrastructure
        );
    }

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::Federation.to_string(), "federation");
        assert_eq!(ErrorCategory::Lifecycle.to_string(), "lifecycle");
    }

    #[test]
    fn test_message_error() {
        let err = OpenIdError::message("attribute 'email' is missing value 1");
        assert_eq!(
            err.to_string(),
            "Malformed message: attribute 'email' is missing value 1"
        );
        assert_eq!(err.category(), ErrorCategory::Protocol);
        assert!(err.is_server_error());
        assert!(!err.is_external_error());
    }
}
