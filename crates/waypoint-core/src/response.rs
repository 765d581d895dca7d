//! Response types for waypoint
//!
//! [`HttpResponse`] is a status, optional headers and one of a closed set
//! of [`Payload`] variants:
//!
//! | Constructor | Status | Content-Type | Payload |
//! |-------------|--------|--------------|---------|
//! | [`HttpResponse::empty`] | 204 | - | `Empty` |
//! | [`HttpResponse::text`] | 200 | text/plain | `Text` |
//! | [`HttpResponse::html`] | 200 | text/html | `Text` |
//! | [`HttpResponse::json`] | 200 | application/json | `Text` |
//! | [`HttpResponse::search_params`] | 200 | application/x-www-form-urlencoded | `Text` |
//! | [`HttpResponse::form_data`] | 200 | multipart/form-data | `FormData` |
//! | [`HttpResponse::stream`] | 200 | application/octet-stream | `Stream` |
//! | [`HttpResponse::raw`] | 200 | - | `Raw` |
//!
//! Responses are plain values; nothing is written until the transport
//! serializes them (see [`crate::stream`]).
//!
//! # Example
//!
//! ```rust,ignore
//! use waypoint_core::{early, HttpResponse, Rejection, RouteContext};
//! use http::StatusCode;
//!
//! async fn get_user(cx: RouteContext) -> Result<HttpResponse, Rejection> {
//!     if cx.param("id") == Some("0") {
//!         return early(HttpResponse::text("reserved").with_status(StatusCode::FORBIDDEN));
//!     }
//!     Ok(HttpResponse::json(&serde_json::json!({ "id": cx.param("id") })))
//! }
//! ```

use crate::error::{BoxError, HttpStreamError, Rejection};
use crate::form::{new_boundary, FormData};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::Serialize;
use std::any::Any;
use std::pin::Pin;

/// Fallible stream of response chunks
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, HttpStreamError>> + Send>>;

/// Opaque body handed to the transport untouched
pub type RawBody = Box<dyn Any + Send>;

/// Response payload
pub enum Payload {
    Empty,
    Text {
        content_type: String,
        body: String,
    },
    FormData(FormData),
    Stream {
        content_type: String,
        content_length: Option<u64>,
        body: ByteStream,
    },
    Raw(RawBody),
}

impl Payload {
    /// Variant name, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Empty => "empty",
            Payload::Text { .. } => "text",
            Payload::FormData(_) => "form_data",
            Payload::Stream { .. } => "stream",
            Payload::Raw(_) => "raw",
        }
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Payload::Empty => f.write_str("Empty"),
            Payload::Text { content_type, body } => f
                .debug_struct("Text")
                .field("content_type", content_type)
                .field("body", body)
                .finish(),
            Payload::FormData(form) => f.debug_tuple("FormData").field(form).finish(),
            Payload::Stream {
                content_type,
                content_length,
                ..
            } => f
                .debug_struct("Stream")
                .field("content_type", content_type)
                .field("content_length", content_length)
                .finish_non_exhaustive(),
            Payload::Raw(_) => f.write_str("Raw(..)"),
        }
    }
}

/// A response value produced by a handler
#[derive(Debug)]
pub struct HttpResponse {
    status: StatusCode,
    headers: Option<HeaderMap>,
    payload: Payload,
}

impl HttpResponse {
    pub fn new(status: StatusCode, payload: Payload) -> Self {
        Self {
            status,
            headers: None,
            payload,
        }
    }

    /// 204 with no body
    pub fn empty() -> Self {
        Self::new(StatusCode::NO_CONTENT, Payload::Empty)
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self::text_with_type("text/plain", body)
    }

    pub fn html(body: impl Into<String>) -> Self {
        Self::text_with_type("text/html", body)
    }

    /// Serialize `value` as JSON
    ///
    /// A value that fails to serialize yields a 500 text response.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(body) => Self::text_with_type("application/json", body),
            Err(err) => {
                tracing::error!(error = %err, "Failed to serialize JSON response");
                Self::text("Failed to serialize response")
                    .with_status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    /// Serialize `value` as an urlencoded query string
    pub fn search_params<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_urlencoded::to_string(value) {
            Ok(body) => Self::text_with_type("application/x-www-form-urlencoded", body),
            Err(err) => {
                tracing::error!(error = %err, "Failed to serialize search params response");
                Self::text("Failed to serialize response")
                    .with_status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    pub fn form_data(form: FormData) -> Self {
        Self::new(StatusCode::OK, Payload::FormData(form))
    }

    /// Stream the chunks produced by `stream`
    pub fn stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        Self::new(
            StatusCode::OK,
            Payload::Stream {
                content_type: "application/octet-stream".to_string(),
                content_length: None,
                body: stream.map(|chunk| chunk.map_err(HttpStreamError::new)).boxed(),
            },
        )
    }

    /// Hand an opaque body to the transport
    pub fn raw<T: Any + Send>(body: T) -> Self {
        Self::new(StatusCode::OK, Payload::Raw(Box::new(body)))
    }

    fn text_with_type(content_type: &str, body: impl Into<String>) -> Self {
        Self::new(
            StatusCode::OK,
            Payload::Text {
                content_type: content_type.to_string(),
                body: body.into(),
            },
        )
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Replace the header map
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Append one header
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers
            .get_or_insert_with(HeaderMap::new)
            .append(name, value);
        self
    }

    /// Override the content type of a `Text` or `Stream` payload
    pub fn with_content_type(mut self, value: impl Into<String>) -> Self {
        match &mut self.payload {
            Payload::Text { content_type, .. } | Payload::Stream { content_type, .. } => {
                *content_type = value.into();
            }
            Payload::Empty | Payload::FormData(_) | Payload::Raw(_) => {}
        }
        self
    }

    /// Declare the length of a `Stream` payload
    pub fn with_content_length(mut self, length: u64) -> Self {
        if let Payload::Stream { content_length, .. } = &mut self.payload {
            *content_length = Some(length);
        }
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> Option<&HeaderMap> {
        self.headers.as_ref()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }

    /// Content type the payload will be written with
    pub fn content_type(&self) -> Option<&str> {
        match &self.payload {
            Payload::Text { content_type, .. } | Payload::Stream { content_type, .. } => {
                Some(content_type)
            }
            Payload::FormData(_) => Some("multipart/form-data"),
            Payload::Empty | Payload::Raw(_) => None,
        }
    }

    /// Body of a `Text` payload
    pub fn text_body(&self) -> Option<&str> {
        match &self.payload {
            Payload::Text { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Wrap as an early-exit signal
    pub fn early(self) -> EarlyResponse {
        EarlyResponse(self)
    }

    /// Split into the status, the final header set and the body to write
    pub(crate) fn into_parts(self) -> (StatusCode, HeaderMap, OutgoingBody) {
        let mut headers = self.headers.unwrap_or_default();
        let body = match self.payload {
            Payload::Empty => OutgoingBody::None,
            Payload::Text { content_type, body } => {
                set_content_type(&mut headers, &content_type);
                headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
                OutgoingBody::Full(Bytes::from(body))
            }
            Payload::FormData(form) => {
                let boundary = new_boundary();
                let bytes = form.encode_multipart(&boundary);
                set_content_type(
                    &mut headers,
                    &format!("multipart/form-data; boundary={}", boundary),
                );
                headers.insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
                OutgoingBody::Full(bytes)
            }
            Payload::Stream {
                content_type,
                content_length,
                body,
            } => {
                set_content_type(&mut headers, &content_type);
                if let Some(length) = content_length {
                    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
                }
                OutgoingBody::Stream(body)
            }
            Payload::Raw(raw) => OutgoingBody::Raw(raw),
        };
        (self.status, headers, body)
    }
}

/// Body of a response after its headers have been fixed
pub(crate) enum OutgoingBody {
    None,
    Full(Bytes),
    Stream(ByteStream),
    Raw(RawBody),
}

fn set_content_type(headers: &mut HeaderMap, content_type: &str) {
    match HeaderValue::from_str(content_type) {
        Ok(value) => {
            headers.insert(header::CONTENT_TYPE, value);
        }
        Err(_) => {
            tracing::warn!(content_type, "Ignoring invalid content type");
        }
    }
}

/// A response that aborts the handler and is emitted as-is
///
/// Early responses are a control signal, not an error: the dispatcher
/// turns them back into a successful response before the transform sees
/// the outcome.
#[derive(Debug)]
pub struct EarlyResponse(HttpResponse);

impl EarlyResponse {
    pub fn response(&self) -> &HttpResponse {
        &self.0
    }

    pub fn into_response(self) -> HttpResponse {
        self.0
    }
}

/// Abort the current handler with `response`
///
/// ```rust,ignore
/// let user = match users.find(id) {
///     Some(user) => user,
///     None => return early(HttpResponse::text("gone").with_status(StatusCode::GONE)),
/// };
/// ```
pub fn early<T>(response: HttpResponse) -> Result<T, Rejection> {
    Err(Rejection::Early(response.early()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[test]
    fn test_constructor_defaults() {
        let empty = HttpResponse::empty();
        assert_eq!(empty.status(), StatusCode::NO_CONTENT);
        assert!(matches!(empty.payload(), Payload::Empty));

        let text = HttpResponse::text("hi");
        assert_eq!(text.status(), StatusCode::OK);
        assert_eq!(text.content_type(), Some("text/plain"));

        let html = HttpResponse::html("<p>hi</p>");
        assert_eq!(html.content_type(), Some("text/html"));

        let json = HttpResponse::json(&serde_json::json!({ "ok": true }));
        assert_eq!(json.content_type(), Some("application/json"));
        assert_eq!(json.text_body(), Some(r#"{"ok":true}"#));

        let params = HttpResponse::search_params(&[("q", "rust lang"), ("page", "2")]);
        assert_eq!(
            params.content_type(),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(params.text_body(), Some("q=rust+lang&page=2"));

        let streamed = HttpResponse::stream(stream::empty::<Result<Bytes, std::io::Error>>());
        assert_eq!(streamed.content_type(), Some("application/octet-stream"));

        let raw = HttpResponse::raw(Bytes::from_static(b"opaque"));
        assert_eq!(raw.content_type(), None);
        assert_eq!(raw.payload().kind(), "raw");
    }

    #[test]
    fn test_builders() {
        let response = HttpResponse::text("created")
            .with_status(StatusCode::CREATED)
            .with_header(
                HeaderName::from_static("x-request-id"),
                HeaderValue::from_static("abc"),
            )
            .with_content_type("text/markdown");

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().and_then(|h| h.get("x-request-id")),
            Some(&HeaderValue::from_static("abc"))
        );
        assert_eq!(response.content_type(), Some("text/markdown"));
    }

    #[test]
    fn test_text_parts_carry_length_and_type() {
        let (status, headers, body) = HttpResponse::text("hello").into_parts();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
        assert_eq!(headers[header::CONTENT_LENGTH], "5");
        assert!(matches!(body, OutgoingBody::Full(bytes) if bytes == "hello"));
    }

    #[test]
    fn test_stream_parts_use_declared_length() {
        let response = HttpResponse::stream(stream::iter(vec![Ok::<_, std::io::Error>(
            Bytes::from_static(b"abc"),
        )]))
        .with_content_length(3);

        let (_, headers, body) = response.into_parts();
        assert_eq!(headers[header::CONTENT_LENGTH], "3");
        assert!(matches!(body, OutgoingBody::Stream(_)));
    }

    #[test]
    fn test_form_data_parts_declare_boundary() {
        let response = HttpResponse::form_data(FormData::new().text("a", "1"));
        let (_, headers, body) = response.into_parts();

        let content_type = headers[header::CONTENT_TYPE].to_str().unwrap();
        let boundary = content_type
            .strip_prefix("multipart/form-data; boundary=")
            .unwrap();
        let OutgoingBody::Full(bytes) = body else {
            panic!("form data must be buffered");
        };
        let parsed = FormData::parse_multipart(&bytes, boundary).unwrap();
        assert_eq!(parsed.get("a").and_then(|v| v.as_text()), Some("1"));
    }

    #[test]
    fn test_early_produces_rejection() {
        let result: Result<(), Rejection> = early(HttpResponse::empty());
        match result {
            Err(Rejection::Early(early)) => {
                assert_eq!(early.response().status(), StatusCode::NO_CONTENT)
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
