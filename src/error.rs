//! Error types for the notification engine.
//!
//! All errors are strongly typed using thiserror, with specific sub-enums
//! folded into one top-level [`NotifyError`] via `#[from]`. This keeps call
//! sites able to pattern-match on a specific failure while giving callers a
//! single type to propagate with `?`.

use thiserror::Error;

/// Errors raised while validating user-supplied configuration or annotations.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field was missing from a config document.
    #[error("required field '{field}' is missing")]
    MissingField {
        /// Name of the missing field.
        field: String,
    },

    /// An annotation or config value failed semantic validation.
    #[error("invalid field '{field}': {reason}")]
    InvalidField {
        /// Field name.
        field: String,
        /// Reason the field is invalid.
        reason: String,
    },

    /// A trigger or oncePer expression failed to parse.
    #[error("invalid expression '{expr}': {reason}")]
    InvalidExpression {
        /// The offending expression source.
        expr: String,
        /// Reason the expression is invalid.
        reason: String,
    },
}

impl ValidationError {
    /// Convenience constructor for [`ValidationError::InvalidField`].
    #[must_use]
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Convenience constructor for [`ValidationError::InvalidExpression`].
    #[must_use]
    pub fn invalid_expression(expr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidExpression {
            expr: expr.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while building or refreshing a namespace's [`crate::config::Api`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Fetching the ConfigMap or Secret failed for a reason other than "not found".
    #[error("failed to load {kind} '{name}' in namespace '{namespace}': {reason}")]
    LoadFailed {
        /// Either "configmap" or "secret".
        kind: &'static str,
        /// Object name.
        name: String,
        /// Namespace the object was looked up in.
        namespace: String,
        /// Underlying reason.
        reason: String,
    },

    /// The config document failed to parse.
    #[error("failed to parse config: {reason}")]
    ParseFailed {
        /// Parser-reported reason.
        reason: String,
    },

    /// One or more namespaces failed to build while others succeeded.
    #[error("{failed_count} of {attempted_count} namespace(s) failed to build: {first_reason}")]
    PartialFailure {
        /// Count of namespaces that failed.
        failed_count: usize,
        /// Count of namespaces attempted.
        attempted_count: usize,
        /// The first failure's reason, for a readable summary.
        first_reason: String,
    },
}

/// Errors raised while dispatching a notification to a service.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The named service is not registered in the built config.
    #[error("unknown notification service: {service}")]
    UnknownService {
        /// Service name.
        service: String,
    },

    /// The service adapter itself returned an error.
    #[error("delivery to {service}/{recipient} failed: {reason}")]
    SendFailed {
        /// Service name.
        service: String,
        /// Recipient identifier.
        recipient: String,
        /// Underlying reason.
        reason: String,
    },
}

/// Errors raised while persisting reconciliation state back onto a resource.
#[derive(Debug, Error)]
pub enum PatchError {
    /// The resource no longer exists in the informer's index.
    #[error("resource {namespace}/{name} not found")]
    NotFound {
        /// Resource namespace.
        namespace: String,
        /// Resource name.
        name: String,
    },

    /// The patch client rejected the merge-patch.
    #[error("patch of {namespace}/{name} failed: {reason}")]
    Rejected {
        /// Resource namespace.
        namespace: String,
        /// Resource name.
        name: String,
        /// Underlying reason.
        reason: String,
    },
}

/// Top-level error type for the notification engine.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Input validation failed.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Config/API factory failure.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Delivery failure.
    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// Annotation patch failure.
    #[error("patch error: {0}")]
    Patch(#[from] PatchError),

    /// Internal invariant violation.
    #[error("internal error: {message}")]
    Internal {
        /// Error description.
        message: String,
    },
}

impl NotifyError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a config-load error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if this is a delivery error.
    #[must_use]
    pub const fn is_delivery(&self) -> bool {
        matches!(self, Self::Delivery(_))
    }

    /// Returns true if the failure is scoped to a single reconciliation item
    /// and will naturally be retried on the next informer event, rather than
    /// indicating a programmer error that should propagate further.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Config(_) | Self::Delivery(_) | Self::Patch(_) => true,
            Self::Validation(_) | Self::Internal { .. } => false,
        }
    }
}

/// Result type alias for notification-engine operations.
pub type NotifyResult<T> = Result<T, NotifyError>;
