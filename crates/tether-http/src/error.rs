//! HTTP pipeline error types
//!
//! Every fault the pipeline can surface is a variant of [`HttpError`]. The
//! variants are kept distinct so callers can tell a dispatch failure from a
//! fault raised inside one of their own handlers.

use std::{fmt, sync::Arc};

use thiserror::Error;

use crate::{handler::ChainKind, response::ResponseRecord};

/// Boxed error returned by caller-supplied callbacks and collaborators
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for HTTP pipeline operations
pub type Result<T> = std::result::Result<T, HttpError>;

/// HTTP pipeline errors
#[derive(Debug, Error)]
pub enum HttpError {
    /// Dispatch failed before a response was obtained
    #[error("Network request failed: {0}")]
    Transport(Arc<TransportError>),

    /// A registered handler faulted
    #[error("{chain} handler #{index} failed: {source}")]
    Handler {
        chain: ChainKind,
        index: usize,
        #[source]
        source: BoxError,
    },

    /// Enforce-success was active and the final status was outside 200..=299
    #[error("Response status code does not indicate success: {status}")]
    StatusEnforcement {
        status: u16,
        response: Arc<ResponseRecord>,
        #[source]
        source: Option<BoxError>,
    },

    /// Response body could not be converted into the target type
    #[error("Failed to deserialize response body: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// Request payload could not be serialized
    #[error("Failed to serialize request body: {0}")]
    Serialization(#[source] serde_json::Error),

    /// Cancellation was requested while the pipeline was suspended
    #[error("Request was cancelled")]
    Cancelled,

    /// Base address resolution failed
    #[error("Failed to resolve base address: {0}")]
    BaseAddress(#[source] BoxError),

    /// Authorization collaborator failed
    #[error("Failed to authorize request: {0}")]
    Authorization(#[source] BoxError),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Query parameter key or value is empty
    #[error("Invalid query parameter: {0}")]
    InvalidQueryParameter(String),

    /// Query parameter key already present
    #[error("Query parameter already added: {0}")]
    DuplicateQueryParameter(String),

    /// Header name or value rejected
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Invalid proxy configuration
    #[error("Invalid proxy configuration: {0}")]
    InvalidProxy(String),

    /// Client build error
    #[error("Failed to build HTTP client: {0}")]
    BuildError(String),
}

impl HttpError {
    /// Wrap a transport fault
    pub fn transport(error: TransportError) -> Self {
        HttpError::Transport(Arc::new(error))
    }

    /// Response carried by this fault, if any
    pub fn response(&self) -> Option<&Arc<ResponseRecord>> {
        match self {
            HttpError::StatusEnforcement { response, .. } => Some(response),
            _ => None,
        }
    }

    /// Check whether this fault is a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, HttpError::Cancelled)
    }

    /// Check whether this fault came from dispatch
    pub fn is_transport(&self) -> bool {
        matches!(self, HttpError::Transport(_))
    }

    /// Check whether this fault was raised inside a registered handler
    pub fn is_handler_fault(&self) -> bool {
        matches!(self, HttpError::Handler { .. })
    }
}

/// Classification of a dispatch failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Request,
    Body,
    Redirect,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Request => "request",
            TransportErrorKind::Body => "body",
            TransportErrorKind::Redirect => "redirect",
            TransportErrorKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// Failure raised by a [`Transport`](crate::Transport) before any response was available
#[derive(Debug, Error)]
#[error("{kind} error: {message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl TransportError {
    /// Create a transport error without an underlying cause
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the underlying cause
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        let kind = if error.is_timeout() {
            TransportErrorKind::Timeout
        } else if error.is_connect() {
            TransportErrorKind::Connect
        } else if error.is_redirect() {
            TransportErrorKind::Redirect
        } else if error.is_body() || error.is_decode() {
            TransportErrorKind::Body
        } else if error.is_request() {
            TransportErrorKind::Request
        } else {
            TransportErrorKind::Other
        };
        Self::new(kind, error.to_string()).with_source(error)
    }
}
