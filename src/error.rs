//! Error types.
//!
//! Two families live here and they never mix:
//!
//! - [`Error`] surfaces infrastructure failures: binding a port, a route
//!   table that cannot be built, a configuration that does not load. These
//!   happen at startup and are returned to `main`.
//! - [`Failure`] is what a [`Handler`](crate::Handler) returns when a request
//!   cannot be served. The transport adapter is the only place a `Failure`
//!   becomes an HTTP response (see [`IntoResponse`] below).

use http::{Method, StatusCode};
use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::response::{IntoResponse, Response};

/// The error type returned by corbel's fallible startup operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// A `(method, path)` pair collides with an existing registration.
    #[error("route conflict: {method} {path}: {source}")]
    RouteConflict {
        method: Method,
        path: String,
        #[source]
        source: matchit::InsertError,
    },

    /// The path is not a valid matcher pattern.
    #[error("invalid route: {method} {path}: {source}")]
    InvalidRoute {
        method: Method,
        path: String,
        #[source]
        source: matchit::InsertError,
    },

    #[error("config: {0}")]
    Config(#[from] ConfigError),
}

// ── Failure ──────────────────────────────────────────────────────────────────

/// A structured, request-level failure returned by a handler.
#[derive(Debug, Error)]
pub enum Failure {
    /// A problem the caller can act on. The message is sent verbatim.
    #[error("{message}")]
    Request {
        status: StatusCode,
        message: String,
        fields: Vec<FieldError>,
    },

    /// The request was cancelled or ran past its deadline.
    #[error("request cancelled")]
    Cancelled,

    /// The handler tried to write a second response.
    #[error("response already written")]
    AlreadyWritten,

    /// Anything else. The detail is logged, never sent.
    #[error("internal: {0}")]
    Internal(String),

    /// The process is no longer in a state it can trust. Returning this
    /// asks the supervisor to shut the process down.
    #[error("integrity: {0}")]
    Shutdown(String),
}

/// One invalid input field, reported back to the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub error: String,
}

impl Failure {
    pub fn request(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Request { status, message: message.into(), fields: Vec::new() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::request(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::request(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::Internal(detail.into())
    }

    pub fn shutdown(detail: impl Into<String>) -> Self {
        Self::Shutdown(detail.into())
    }

    /// Attaches a field error. Only meaningful on [`Failure::Request`];
    /// other variants are returned unchanged.
    pub fn with_field(mut self, field: impl Into<String>, error: impl Into<String>) -> Self {
        if let Self::Request { fields, .. } = &mut self {
            fields.push(FieldError { field: field.into(), error: error.into() });
        }
        self
    }

    /// Whether this failure should trigger a process shutdown.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown(_))
    }

    /// The HTTP status this failure translates to.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Request { status, .. } => *status,
            Self::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            Self::AlreadyWritten | Self::Internal(_) | Self::Shutdown(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// The JSON body of every translated failure.
#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "no_fields")]
    fields: &'a [FieldError],
}

fn no_fields(fields: &&[FieldError]) -> bool {
    fields.is_empty()
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, fields): (&str, &[FieldError]) = match &self {
            Self::Request { message, fields, .. } => (message.as_str(), fields.as_slice()),
            Self::Cancelled => ("request cancelled", &[][..]),
            Self::AlreadyWritten | Self::Internal(_) | Self::Shutdown(_) => {
                ("Internal Server Error", &[][..])
            }
        };
        let body = serde_json::to_vec(&ErrorBody { error: message, fields }).unwrap_or_default();
        Response::builder().status(status).json(body)
    }
}
