//! Error types for the provider.
//!
//! Errors coming back from the remote cloud API are classified once, at the
//! client boundary, into an [`ErrorKind`]. Everything above the client matches
//! on that kind instead of inspecting messages or status codes.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The main error type for the provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Resource store errors.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Reconciliation errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// A remote representation could not be mapped into local shape.
    #[error("Cannot map remote {kind}: {message}")]
    Mapping {
        /// Resource kind being mapped.
        kind: &'static str,
        /// Description of the decode failure.
        message: String,
    },

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// A credentials secret could not be resolved.
    #[error("Secret {namespace}/{name} unavailable: {message}")]
    SecretUnavailable {
        /// Secret namespace.
        namespace: String,
        /// Secret name.
        name: String,
        /// Description of the failure.
        message: String,
    },

    /// A required key is missing from a credentials secret.
    #[error("Secret {namespace}/{name} has no key '{key}'")]
    MissingSecretKey {
        /// Secret namespace.
        namespace: String,
        /// Secret name.
        name: String,
        /// The missing key.
        key: String,
    },
}

/// Resource store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The declarative resource does not exist in the store.
    #[error("{kind} '{name}' not found in store")]
    NotFound {
        /// Resource kind.
        kind: &'static str,
        /// Resource name.
        name: String,
    },

    /// A stored resource is corrupted.
    #[error("Stored resource is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Writing to the store failed.
    #[error("Failed to write store: {message}")]
    WriteFailed {
        /// Description of the write failure.
        message: String,
    },

    /// Serialization error.
    #[error("Store serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },
}

/// Classification of a remote API failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The remote object does not exist.
    NotFound,
    /// Stale concurrency token, or the object already exists.
    Conflict,
    /// Network, timeout, cancellation, throttling or server-side failure.
    Transient,
    /// The request can never succeed as sent.
    Fatal,
}

/// An error returned by a remote API client, already classified.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    /// Classification of the failure.
    pub kind: ErrorKind,
    /// HTTP status, when the failure came from a response.
    pub status: Option<u16>,
    /// Description of the failure.
    pub message: String,
}

/// Reconciliation phase in which an error happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Fetching remote state.
    Observe,
    /// Creating the remote object.
    Create,
    /// Updating the remote object.
    Update,
    /// Deleting the remote object.
    Delete,
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A remote call failed during a phase.
    #[error("cannot {phase} {kind} '{name}': {source}")]
    Remote {
        /// Phase that failed.
        phase: Phase,
        /// Resource kind.
        kind: &'static str,
        /// Declarative resource name.
        name: String,
        /// Underlying remote error.
        #[source]
        source: RemoteError,
    },

    /// Late-initialized desired state could not be written back.
    #[error("cannot persist late-initialized {kind} '{name}': {source}")]
    PersistLateInit {
        /// Resource kind.
        kind: &'static str,
        /// Declarative resource name.
        name: String,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },

    /// Update was requested for a resource that was never created.
    #[error("cannot update {kind} '{name}': no external name recorded")]
    MissingExternalName {
        /// Resource kind.
        kind: &'static str,
        /// Declarative resource name.
        name: String,
    },
}

/// Result type alias for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

impl ProviderError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Creates a mapping error for a resource kind.
    #[must_use]
    pub fn mapping(kind: &'static str, message: impl Into<String>) -> Self {
        Self::Mapping {
            kind,
            message: message.into(),
        }
    }

    /// Returns true if the scheduler should requeue the resource.
    ///
    /// Remote failures while observing, updating or deleting are always
    /// retryable: the next pass re-observes with a fresh concurrency token.
    /// A create is retried only when its classification allows it, and local
    /// mapping errors never are.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Reconcile(ReconcileError::Remote {
                phase: Phase::Observe | Phase::Update | Phase::Delete,
                ..
            }) => true,
            Self::Reconcile(ReconcileError::Remote { source, .. }) => source.is_retryable(),
            Self::Reconcile(ReconcileError::PersistLateInit { .. })
            | Self::Store(StoreError::WriteFailed { .. })
            | Self::Io(_) => true,
            _ => false,
        }
    }

    /// Returns the suggested requeue delay in seconds, if applicable.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        if !self.is_retryable() {
            return None;
        }
        match self {
            Self::Reconcile(ReconcileError::Remote { source, .. }) => match source.kind {
                ErrorKind::Conflict => Some(1),
                ErrorKind::NotFound => Some(5),
                ErrorKind::Transient | ErrorKind::Fatal => match source.status {
                    Some(429) => Some(60),
                    _ => Some(10),
                },
            },
            _ => Some(5),
        }
    }

    /// Returns the remote error kind behind this error, if any.
    #[must_use]
    pub const fn remote_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Reconcile(ReconcileError::Remote { source, .. }) => Some(source.kind),
            _ => None,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl StoreError {
    /// Creates a write error with the given message.
    #[must_use]
    pub fn write(message: impl Into<String>) -> Self {
        Self::WriteFailed {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

impl RemoteError {
    /// Creates an error of the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    /// Creates an error from an HTTP status, classifying it.
    #[must_use]
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: classify_status(status),
            status: Some(status),
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// Creates a transient error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    /// Creates a fatal error.
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, message)
    }

    /// Error reported when the caller cancelled an in-flight call.
    #[must_use]
    pub fn cancelled() -> Self {
        Self::transient("call cancelled")
    }

    /// Error reported when an in-flight call exceeded its deadline.
    #[must_use]
    pub fn timed_out(timeout: Duration) -> Self {
        Self::transient(format!("call timed out after {timeout:?}"))
    }

    /// Returns true if the remote object does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.kind, ErrorKind::NotFound)
    }

    /// Returns true if the failure is a conflict.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self.kind, ErrorKind::Conflict)
    }

    /// Returns true if a later attempt may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self.kind, ErrorKind::Fatal)
    }
}

/// Maps an HTTP status code to an error kind.
#[must_use]
pub const fn classify_status(status: u16) -> ErrorKind {
    match status {
        404 => ErrorKind::NotFound,
        409 | 410 | 412 => ErrorKind::Conflict,
        408 | 429 | 500..=599 => ErrorKind::Transient,
        _ => ErrorKind::Fatal,
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::NotFound => "not found",
            Self::Conflict => "conflict",
            Self::Transient => "transient",
            Self::Fatal => "fatal",
        };
        write!(f, "{kind}")
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            Self::Observe => "observe",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{phase}")
    }
}
