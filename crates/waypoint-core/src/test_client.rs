//! TestClient for integration testing without network binding
//!
//! Drives a [`Dispatcher`] with simulated requests and buffers the
//! serialized response through a [`BufferedSink`], so tests see exactly
//! what a transport would write, including stream failures.
//!
//! # Example
//!
//! ```rust,ignore
//! use waypoint_core::{HttpResponse, Router, TestClient};
//!
//! async fn hello() -> HttpResponse {
//!     HttpResponse::text("Hello, World!")
//! }
//!
//! #[tokio::test]
//! async fn test_hello() {
//!     let client = TestClient::from_router(Router::new().get("/", hello)).await.unwrap();
//!
//!     let response = client.get("/").await;
//!     response.assert_status(StatusCode::OK);
//!     assert_eq!(response.text(), "Hello, World!");
//! }
//! ```

use crate::config::RequestOptions;
use crate::dispatcher::Dispatcher;
use crate::error::{BuildError, HttpStreamError};
use crate::form::{new_boundary, FormData};
use crate::request::Request;
use crate::response::{HttpResponse, RawBody};
use crate::router::Router;
use crate::stream::BufferedSink;
use crate::transform::DefaultTransform;
use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use serde::{de::DeserializeOwned, Serialize};
use std::any::Any;

/// Test client for integration testing without network binding
#[derive(Debug, Clone)]
pub struct TestClient {
    dispatcher: Dispatcher,
    options: RequestOptions,
}

impl TestClient {
    /// Create a new test client from a compiled dispatcher
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            options: RequestOptions::default(),
        }
    }

    /// Compile `router` with the default transform and wrap it
    pub async fn from_router(router: Router) -> Result<Self, BuildError> {
        let dispatcher = router.handle(DefaultTransform::default()).await?;
        Ok(Self::new(dispatcher))
    }

    /// Use a custom body limit for every request
    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.options.body_limit = limit;
        self
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request(TestRequest::get(path)).await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request(TestRequest::delete(path)).await
    }

    /// Send a POST request with a JSON body
    pub async fn post_json<T: Serialize>(&self, path: &str, body: &T) -> TestResponse {
        self.request(TestRequest::post(path).json(body)).await
    }

    /// Send a request built with [`TestRequest`]
    pub async fn request(&self, req: TestRequest) -> TestResponse {
        let uri = req.path.parse::<Uri>().unwrap_or_default();
        let body = req.body.unwrap_or_default();
        let request = Request::with_options(req.method, uri, req.headers, body, self.options);

        let response = self.dispatcher.dispatch(&req.path, request).await;
        TestResponse::from_response(response).await
    }
}

/// Request builder for [`TestClient::request`]
#[derive(Debug, Clone)]
pub struct TestRequest {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl TestRequest {
    fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: &str) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: &str) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: &str) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: &str) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Add a header; invalid names or values are ignored
    pub fn header(mut self, key: &str, value: &str) -> Self {
        if let (Ok(name), Ok(val)) = (
            key.parse::<http::header::HeaderName>(),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, val);
        }
        self
    }

    /// Set the request body as JSON, with `content-type: application/json`
    pub fn json<T: Serialize>(mut self, body: &T) -> Self {
        if let Ok(bytes) = serde_json::to_vec(body) {
            self.body = Some(Bytes::from(bytes));
            self.headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
        }
        self
    }

    /// Set the request body as a multipart form
    pub fn form(mut self, form: &FormData) -> Self {
        let boundary = new_boundary();
        self.body = Some(form.encode_multipart(&boundary));
        self.header(
            "content-type",
            &format!("multipart/form-data; boundary={}", boundary),
        )
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn content_type(self, content_type: &str) -> Self {
        self.header("content-type", content_type)
    }
}

/// Buffered response with assertion helpers
pub struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    chunks: usize,
    raw: Option<RawBody>,
    stream_error: Option<HttpStreamError>,
}

impl TestResponse {
    async fn from_response(response: HttpResponse) -> Self {
        let status = response.status();
        let mut sink = BufferedSink::new();
        let stream_error = response.write_to(&mut sink).await.err();

        Self {
            status: sink.status().unwrap_or(status),
            headers: sink.headers().cloned().unwrap_or_default(),
            body: Bytes::copy_from_slice(sink.body()),
            chunks: sink.chunks(),
            raw: sink.take_raw(),
            stream_error,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Number of body chunks the response was written in
    pub fn chunks(&self) -> usize {
        self.chunks
    }

    /// Body as a string, lossily decoded
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Opaque payload of a raw response, if it has type `T`
    pub fn raw<T: Any>(&self) -> Option<&T> {
        self.raw.as_ref().and_then(|raw| raw.downcast_ref::<T>())
    }

    /// The error that stopped a streamed body, if any
    pub fn stream_error(&self) -> Option<&HttpStreamError> {
        self.stream_error.as_ref()
    }

    /// Assert that the response has the expected status code
    ///
    /// # Panics
    ///
    /// Panics if the status code doesn't match.
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "Expected status {}, got {}. Body: {}",
            expected,
            self.status,
            self.text()
        );
        self
    }

    /// Assert that the response has the expected header value
    ///
    /// # Panics
    ///
    /// Panics if the header doesn't exist or doesn't match.
    pub fn assert_header(&self, key: &str, expected: &str) -> &Self {
        let actual = self.header(key).unwrap_or("");
        assert_eq!(
            actual, expected,
            "Expected header '{}' to be '{}', got '{}'",
            key, expected, actual
        );
        self
    }

    /// Assert that the body parses as JSON equal to `expected`
    ///
    /// # Panics
    ///
    /// Panics if the body can't be parsed as JSON or doesn't match.
    pub fn assert_json<T: DeserializeOwned + PartialEq + std::fmt::Debug>(
        &self,
        expected: &T,
    ) -> &Self {
        match self.json::<T>() {
            Ok(actual) => assert_eq!(&actual, expected, "JSON body mismatch"),
            Err(err) => panic!("Failed to parse response body as JSON: {}", err),
        }
        self
    }
}

impl std::fmt::Debug for TestResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("stream_error", &self.stream_error)
            .finish()
    }
}
