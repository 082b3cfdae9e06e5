//! Error types for queue, store, submission, and configuration failures.
//!
//! The taxonomy follows one rule: transport faults are surfaced as
//! [`BackendError`] and retried (or reported as 503) at the point of origin,
//! while application-level failures (unknown kind, handler fault, timeout)
//! are never errors at all -- they become terminal task outcomes published
//! to the result store.

use std::fmt;

/// Errors produced by queue and result-store backends.
///
/// Backends are transport adapters; the only failures they can report are
/// the transport being down and a record that cannot be encoded. Everything
/// else ("no such result", "queue empty") is expressed in the operation's
/// return type, not as an error.
///
/// # Examples
///
/// ```
/// use conveyor::error::BackendError;
///
/// let err = BackendError::unavailable("connection refused");
/// assert!(err.to_string().contains("connection refused"));
/// ```
#[derive(Debug)]
pub enum BackendError {
    /// The underlying transport is down or unreachable.
    ///
    /// Maps to HTTP 503 at the API boundary; the worker runtime retries
    /// result publication with bounded backoff on this variant only.
    Unavailable {
        /// Human-readable description of the failure.
        message: String,
        /// The underlying error, if available. Accessible via
        /// [`std::error::Error::source()`].
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A record could not be serialized for the wire or storage.
    Encoding {
        /// Human-readable description of the failure.
        message: String,
    },
}

impl BackendError {
    /// Creates an [`Unavailable`](BackendError::Unavailable) error with no
    /// underlying source.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
            source: None,
        }
    }

    /// Returns `true` if this error indicates the transport is down.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { message, .. } => {
                write!(f, "backend unavailable: {message}")
            }
            Self::Encoding { message } => write!(f, "encoding error: {message}"),
        }
    }
}

impl std::error::Error for BackendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Unavailable {
                source: Some(src), ..
            } => Some(src.as_ref()),
            _ => None,
        }
    }
}

impl From<redis::RedisError> for BackendError {
    fn from(err: redis::RedisError) -> Self {
        Self::Unavailable {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

/// Errors returned by [`Submitter::submit`](crate::submit::Submitter::submit).
///
/// A failed submission never enqueues anything and never returns an id;
/// the caller may retry.
#[derive(Debug)]
pub enum SubmitError {
    /// The task specification named no handler kind.
    EmptyKind,

    /// The queue backend rejected the push.
    Backend(BackendError),
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyKind => write!(f, "task kind must not be empty"),
            Self::Backend(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for SubmitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Backend(err) => Some(err),
            Self::EmptyKind => None,
        }
    }
}

impl From<BackendError> for SubmitError {
    fn from(err: BackendError) -> Self {
        Self::Backend(err)
    }
}

/// Errors produced while loading [`Config`](crate::config::Config).
#[derive(Debug)]
pub enum ConfigError {
    /// A configuration file could not be read.
    Io {
        /// The path that failed to load.
        path: String,
        /// The I/O error text.
        error: String,
    },

    /// The configuration file is not valid TOML.
    Parse(String),

    /// A key holds a value that cannot be interpreted.
    Invalid {
        /// The offending key (file key or environment variable name).
        key: String,
        /// What was wrong with the value.
        message: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, error } => write!(f, "failed to read {path}: {error}"),
            Self::Parse(msg) => write!(f, "invalid config file: {msg}"),
            Self::Invalid { key, message } => write!(f, "invalid value for {key}: {message}"),
        }
    }
}

impl std::error::Error for ConfigError {}
