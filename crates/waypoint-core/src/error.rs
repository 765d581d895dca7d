//! Error types for waypoint
//!
//! Every failure that can reach the dispatcher's transform boundary is a
//! structured value. [`RouteError`] is the closed set of those values;
//! [`Rejection`] is what handlers return, and additionally carries the
//! [`EarlyResponse`] control signal, which is not an error.

use crate::config::Profile;
use crate::environment::EnvError;
use crate::request::Request;
use crate::response::{EarlyResponse, HttpResponse};
use crate::router::RouteConflictError;
use http::{Method, StatusCode};
use serde::Serialize;
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

/// Boxed error type used at collaborator seams (body sources, handlers)
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Shared error source, so errors stay cheap to clone
pub type SharedError = Arc<dyn StdError + Send + Sync>;

/// No registered route or mount matched the request
#[derive(Debug, Clone, Error)]
#[error("no route found for {method} {url}")]
pub struct RouteNotFound {
    /// Method of the unmatched request
    pub method: Method,
    /// URL the client sent, before any mount stripped it
    pub url: String,
}

/// Reading or decoding the request payload failed
#[derive(Debug, Clone, Error)]
pub enum RequestBodyError {
    /// The body source was handed out as a stream and cannot be read again
    #[error("request body has already been consumed")]
    AlreadyConsumed,

    /// A previous read was cancelled before it completed
    #[error("request body read was interrupted")]
    Interrupted,

    /// The body is larger than the configured limit
    #[error("request body exceeds limit of {limit} bytes")]
    TooLarge { limit: usize },

    /// The transport failed while the body was being read
    #[error("failed to read request body: {0}")]
    Read(#[source] SharedError),

    /// The body is not valid UTF-8
    #[error("request body is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// The body is not valid JSON
    #[error("invalid JSON body: {0}")]
    InvalidJson(#[source] Arc<serde_json::Error>),

    /// The body could not be parsed as form data
    #[error("invalid form body: {0}")]
    InvalidForm(String),
}

impl RequestBodyError {
    pub(crate) fn read(err: BoxError) -> Self {
        RequestBodyError::Read(Arc::from(err))
    }
}

impl From<serde_json::Error> for RequestBodyError {
    fn from(err: serde_json::Error) -> Self {
        RequestBodyError::InvalidJson(Arc::new(err))
    }
}

/// Field-level decode failure reported by a [`Schema`](crate::decode::Schema)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Field name (supports nested: "address.city"), `$` for the whole input
    pub field: String,
    /// Error code (e.g., "required", "length", "deserialize")
    pub code: String,
    /// Human-readable message
    pub message: String,
}

impl FieldError {
    /// Create a new field error
    pub fn new(
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Input failed schema validation
///
/// Carries the raw input and the originating request for diagnostics.
#[derive(Debug, Clone, Error)]
#[error("request failed schema validation with {} error(s)", errors.len())]
pub struct DecodeSchemaError {
    /// Validation errors, never empty
    pub errors: Vec<FieldError>,
    /// The request the input was taken from
    pub request: Request,
    /// The raw input given to the schema
    pub body: serde_json::Value,
}

/// A form field required by a decoder is absent
#[derive(Debug, Clone, Error)]
#[error("form field `{key}` not found")]
pub struct FormDataKeyNotFound {
    pub key: String,
}

/// A response byte stream failed
#[derive(Debug, Clone, Error)]
#[error("response stream failed: {cause}")]
pub struct HttpStreamError {
    #[source]
    pub cause: SharedError,
}

impl HttpStreamError {
    /// Wrap the underlying cause
    pub fn new(cause: impl Into<BoxError>) -> Self {
        Self {
            cause: Arc::from(cause.into()),
        }
    }
}

/// Every structured failure surfaced to the transform boundary
#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    RouteNotFound(#[from] RouteNotFound),

    #[error(transparent)]
    RequestBody(#[from] RequestBodyError),

    #[error(transparent)]
    DecodeSchema(#[from] DecodeSchemaError),

    #[error(transparent)]
    FormDataKeyNotFound(#[from] FormDataKeyNotFound),

    #[error(transparent)]
    HttpStream(#[from] HttpStreamError),

    /// A handler asked for a service its environment does not hold
    #[error("service `{0}` is not available in the route environment")]
    MissingService(&'static str),

    /// A handler failed with its own error
    #[error("handler failed: {0}")]
    Handler(#[source] BoxError),

    /// A handler panicked; the panic was caught at the dispatcher boundary
    #[error("handler panicked: {0}")]
    Panic(String),
}

impl RouteError {
    /// Wrap an application error raised by a handler
    pub fn handler(err: impl Into<BoxError>) -> Self {
        RouteError::Handler(err.into())
    }

    /// Status code used by the default error mapping
    pub fn status(&self) -> StatusCode {
        match self {
            RouteError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            RouteError::RequestBody(RequestBodyError::TooLarge { .. }) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            RouteError::RequestBody(_)
            | RouteError::DecodeSchema(_)
            | RouteError::FormDataKeyNotFound(_) => StatusCode::BAD_REQUEST,
            RouteError::HttpStream(_)
            | RouteError::MissingService(_)
            | RouteError::Handler(_)
            | RouteError::Panic(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable error type identifier used in JSON error bodies
    pub fn error_type(&self) -> &'static str {
        match self {
            RouteError::RouteNotFound(_) => "not_found",
            RouteError::RequestBody(RequestBodyError::TooLarge { .. }) => "payload_too_large",
            RouteError::RequestBody(_) => "request_body_error",
            RouteError::DecodeSchema(_) => "validation_error",
            RouteError::FormDataKeyNotFound(_) => "form_data_key_not_found",
            RouteError::HttpStream(_) => "stream_error",
            RouteError::MissingService(_) | RouteError::Handler(_) | RouteError::Panic(_) => {
                "internal_error"
            }
        }
    }

    /// Whether this error is a server-side fault rather than a bad request
    pub fn is_internal(&self) -> bool {
        self.status().is_server_error()
    }

    /// Convert into a JSON error response
    ///
    /// In the production profile the message of internal errors is masked.
    pub fn into_response(self, profile: Profile) -> HttpResponse {
        let status = self.status();
        let message = if profile.is_production() && self.is_internal() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        let fields = match &self {
            RouteError::DecodeSchema(err) => Some(err.errors.clone()),
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorBody {
                error_type: self.error_type(),
                message,
                fields,
            },
        };
        HttpResponse::json(&body).with_status(status)
    }
}

/// JSON representation of an error response
#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    #[serde(rename = "type")]
    error_type: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<Vec<FieldError>>,
}

/// Errors raised while turning a router into a dispatcher
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    RouteConflict(#[from] RouteConflictError),

    /// The route pattern is rejected by the matcher
    #[error("invalid route path `{path}`: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("mount prefix `{prefix}` is registered more than once")]
    DuplicateMount { prefix: String },

    /// A handler needs a service that no enclosing router provides
    #[error("route {method} {path} needs service `{service}`, which no router provides")]
    MissingService {
        method: Method,
        path: String,
        service: &'static str,
    },

    #[error(transparent)]
    Environment(#[from] EnvError),
}

/// What a handler returns when it does not produce a normal response
///
/// `?` converts every error type of this crate into a `Rejection`, so
/// handler bodies can propagate body, decode and early-response signals
/// uniformly.
#[derive(Debug)]
pub enum Rejection {
    /// Abort the handler and emit this response as-is
    Early(EarlyResponse),
    /// Abort the handler with a structured error
    Error(RouteError),
}

impl Rejection {
    /// Wrap an application error raised by a handler
    pub fn handler(err: impl Into<BoxError>) -> Self {
        Rejection::Error(RouteError::handler(err))
    }
}

impl From<EarlyResponse> for Rejection {
    fn from(early: EarlyResponse) -> Self {
        Rejection::Early(early)
    }
}

macro_rules! impl_rejection_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Rejection {
                fn from(err: $ty) -> Self {
                    Rejection::Error(err.into())
                }
            }
        )*
    };
}

impl_rejection_from!(
    RouteError,
    RouteNotFound,
    RequestBodyError,
    DecodeSchemaError,
    FormDataKeyNotFound,
    HttpStreamError
);
