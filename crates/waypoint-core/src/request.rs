//! Request types for waypoint
//!
//! A [`Request`] is a cheap handle: clones, and the copies made by
//! [`Request::set_url`], share one body. The body source is read at most
//! once. Text, JSON and form accessors share the buffered bytes, while
//! [`Request::stream`] hands out the raw source and consumes it.

use crate::config::RequestOptions;
use crate::error::{BoxError, RequestBodyError};
use crate::form::{extract_boundary, FormData};
use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use http::{header, request::Parts, HeaderMap, Method, Uri};
use http_body::Frame;
use http_body_util::{combinators::UnsyncBoxBody, BodyExt, Empty, Full, StreamBody};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use tokio::sync::Mutex;

type BoxBody = UnsyncBoxBody<Bytes, BoxError>;

/// Raw request body source
pub struct Body {
    inner: BoxBody,
}

impl Body {
    /// Wrap any `http_body::Body`
    pub fn new<B>(body: B) -> Self
    where
        B: http_body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        Self {
            inner: body.map_err(|err| -> BoxError { err.into() }).boxed_unsync(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Empty::<Bytes>::new())
    }

    /// Body fed from a stream of chunks
    pub fn from_stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        Self::new(StreamBody::new(
            stream.map(|chunk| {
                chunk
                    .map(Frame::data)
                    .map_err(|err| -> BoxError { err.into() })
            }),
        ))
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::new(Full::new(bytes))
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Bytes::from(text).into()
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Bytes::from_static(text.as_bytes()).into()
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Bytes::from(bytes).into()
    }
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Body").finish_non_exhaustive()
    }
}

enum BodyState {
    Unread(Body),
    /// A read is in flight, or was cancelled before it finished
    Reading,
    Buffered(Bytes),
    Streamed,
    Failed(RequestBodyError),
}

struct Shared {
    method: Method,
    original_url: Uri,
    headers: HeaderMap,
    options: RequestOptions,
    body: Mutex<BodyState>,
}

/// HTTP request as seen by handlers
#[derive(Clone)]
pub struct Request {
    shared: Arc<Shared>,
    url: Uri,
}

impl Request {
    pub fn new(method: Method, url: Uri, headers: HeaderMap, body: impl Into<Body>) -> Self {
        Self::with_options(method, url, headers, body, RequestOptions::default())
    }

    pub fn with_options(
        method: Method,
        url: Uri,
        headers: HeaderMap,
        body: impl Into<Body>,
        options: RequestOptions,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                method,
                original_url: url.clone(),
                headers,
                options,
                body: Mutex::new(BodyState::Unread(body.into())),
            }),
            url,
        }
    }

    /// Build from the parts of an `http::Request`
    pub fn from_parts(parts: Parts, body: Body, options: RequestOptions) -> Self {
        Self::with_options(parts.method, parts.uri, parts.headers, body, options)
    }

    /// Build from an `http::Request` with any body type
    pub fn from_http<B>(request: http::Request<B>, options: RequestOptions) -> Self
    where
        B: http_body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = request.into_parts();
        Self::from_parts(parts, Body::new(body), options)
    }

    pub fn method(&self) -> &Method {
        &self.shared.method
    }

    /// Current URL, possibly rewritten by a mount
    pub fn url(&self) -> &Uri {
        &self.url
    }

    /// URL the request arrived with
    pub fn original_url(&self) -> &Uri {
        &self.shared.original_url
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.url.query()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.shared.headers
    }

    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.shared
            .headers
            .get(name)
            .and_then(|value| value.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(header::CONTENT_TYPE)
    }

    pub fn body_limit(&self) -> usize {
        self.shared.options.body_limit
    }

    /// Copy of this request with a different URL
    ///
    /// The copy shares the body of the original.
    pub fn set_url(&self, url: Uri) -> Request {
        Request {
            shared: Arc::clone(&self.shared),
            url,
        }
    }

    /// Read the whole body, enforcing the body limit
    pub async fn bytes(&self) -> Result<Bytes, RequestBodyError> {
        let mut state = self.shared.body.lock().await;
        match std::mem::replace(&mut *state, BodyState::Reading) {
            BodyState::Unread(body) => match read_limited(body, self.body_limit()).await {
                Ok(bytes) => {
                    *state = BodyState::Buffered(bytes.clone());
                    Ok(bytes)
                }
                Err(err) => {
                    *state = BodyState::Failed(err.clone());
                    Err(err)
                }
            },
            BodyState::Buffered(bytes) => {
                *state = BodyState::Buffered(bytes.clone());
                Ok(bytes)
            }
            BodyState::Reading => Err(RequestBodyError::Interrupted),
            BodyState::Streamed => {
                *state = BodyState::Streamed;
                Err(RequestBodyError::AlreadyConsumed)
            }
            BodyState::Failed(err) => {
                *state = BodyState::Failed(err.clone());
                Err(err)
            }
        }
    }

    pub async fn text(&self) -> Result<String, RequestBodyError> {
        let bytes = self.bytes().await?;
        Ok(std::str::from_utf8(&bytes)?.to_owned())
    }

    pub async fn json(&self) -> Result<serde_json::Value, RequestBodyError> {
        let bytes = self.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Parse the body as urlencoded or multipart form data
    pub async fn form_data(&self) -> Result<FormData, RequestBodyError> {
        let content_type = self.content_type().unwrap_or_default().to_ascii_lowercase();
        if content_type.starts_with("multipart/form-data") {
            let boundary = extract_boundary(self.content_type().unwrap_or_default())
                .ok_or_else(|| {
                    RequestBodyError::InvalidForm("missing multipart boundary".to_string())
                })?;
            let bytes = self.bytes().await?;
            FormData::parse_multipart(&bytes, &boundary)
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let bytes = self.bytes().await?;
            FormData::parse_urlencoded(&bytes)
        } else {
            Err(RequestBodyError::InvalidForm(format!(
                "unsupported content type `{}`",
                content_type
            )))
        }
    }

    /// Take the body as a stream of chunks
    ///
    /// After a buffered read the stream replays the cached bytes; otherwise
    /// the source is handed out and later accessors fail with
    /// `AlreadyConsumed`.
    pub async fn stream(&self) -> Result<BodyStream, RequestBodyError> {
        let limit = self.body_limit();
        let mut state = self.shared.body.lock().await;
        match std::mem::replace(&mut *state, BodyState::Streamed) {
            BodyState::Unread(body) => Ok(BodyStream::new(body, limit)),
            BodyState::Buffered(bytes) => {
                *state = BodyState::Buffered(bytes.clone());
                Ok(BodyStream::new(Body::from(bytes), limit))
            }
            BodyState::Streamed => Err(RequestBodyError::AlreadyConsumed),
            BodyState::Reading => {
                *state = BodyState::Reading;
                Err(RequestBodyError::Interrupted)
            }
            BodyState::Failed(err) => {
                *state = BodyState::Failed(err.clone());
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.shared.method)
            .field("url", &self.url)
            .field("original_url", &self.shared.original_url)
            .finish()
    }
}

async fn read_limited(body: Body, limit: usize) -> Result<Bytes, RequestBodyError> {
    let mut body = body.inner;
    if http_body::Body::size_hint(&body).lower() > limit as u64 {
        return Err(RequestBodyError::TooLarge { limit });
    }

    let mut buf = BytesMut::new();
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(RequestBodyError::read)?;
        // trailers carry no payload
        let Ok(data) = frame.into_data() else {
            continue;
        };
        if buf.len() + data.len() > limit {
            return Err(RequestBodyError::TooLarge { limit });
        }
        buf.extend_from_slice(&data);
    }
    Ok(buf.freeze())
}

pin_project! {
    /// Request body as a stream of chunks, limited to the body limit
    pub struct BodyStream {
        #[pin]
        body: BoxBody,
        limit: usize,
        seen: usize,
        done: bool,
    }
}

impl BodyStream {
    fn new(body: Body, limit: usize) -> Self {
        Self {
            body: body.inner,
            limit,
            seen: 0,
            done: false,
        }
    }
}

impl Stream for BodyStream {
    type Item = Result<Bytes, RequestBodyError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            if *this.done {
                return Poll::Ready(None);
            }
            match ready!(http_body::Body::poll_frame(this.body.as_mut(), cx)) {
                None => {
                    *this.done = true;
                    return Poll::Ready(None);
                }
                Some(Err(err)) => {
                    *this.done = true;
                    return Poll::Ready(Some(Err(RequestBodyError::read(err))));
                }
                Some(Ok(frame)) => {
                    // trailers carry no payload
                    let Ok(data) = frame.into_data() else {
                        continue;
                    };
                    *this.seen += data.len();
                    if *this.seen > *this.limit {
                        *this.done = true;
                        return Poll::Ready(Some(Err(RequestBodyError::TooLarge {
                            limit: *this.limit,
                        })));
                    }
                    return Poll::Ready(Some(Ok(data)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::time::Duration;

    fn post(body: impl Into<Body>) -> Request {
        Request::new(Method::POST, Uri::from_static("/upload"), HeaderMap::new(), body)
    }

    fn post_with_content_type(content_type: &'static str, body: impl Into<Body>) -> Request {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static(content_type));
        Request::new(Method::POST, Uri::from_static("/upload"), headers, body)
    }

    #[tokio::test]
    async fn test_bytes_are_cached_across_accessors() {
        let request = post(r#"{"name":"ada"}"#);

        let text = request.text().await.unwrap();
        assert_eq!(text, r#"{"name":"ada"}"#);

        let json = request.json().await.unwrap();
        assert_eq!(json["name"], "ada");

        assert_eq!(request.bytes().await.unwrap(), Bytes::from(text));
    }

    #[tokio::test]
    async fn test_stream_consumes_source() {
        let request = post(Body::from_stream(stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"chunk-1 ")),
            Ok(Bytes::from_static(b"chunk-2")),
        ])));

        let chunks: Vec<_> = request.stream().await.unwrap().collect().await;
        assert_eq!(chunks.len(), 2);

        assert!(matches!(
            request.text().await,
            Err(RequestBodyError::AlreadyConsumed)
        ));
        assert!(matches!(
            request.stream().await,
            Err(RequestBodyError::AlreadyConsumed)
        ));
    }

    #[tokio::test]
    async fn test_stream_after_buffered_read_replays_bytes() {
        let request = post("buffered");
        request.bytes().await.unwrap();

        let mut stream = request.stream().await.unwrap();
        let chunk = stream.next().await.unwrap().unwrap();
        assert_eq!(chunk, Bytes::from_static(b"buffered"));

        assert_eq!(request.text().await.unwrap(), "buffered");
    }

    #[tokio::test]
    async fn test_body_limit_is_enforced_and_remembered() {
        let request = Request::with_options(
            Method::POST,
            Uri::from_static("/upload"),
            HeaderMap::new(),
            vec![0u8; 64],
            RequestOptions { body_limit: 16 },
        );

        assert!(matches!(
            request.bytes().await,
            Err(RequestBodyError::TooLarge { limit: 16 })
        ));
        assert!(matches!(
            request.json().await,
            Err(RequestBodyError::TooLarge { limit: 16 })
        ));
    }

    #[tokio::test]
    async fn test_stream_enforces_body_limit() {
        let request = Request::with_options(
            Method::POST,
            Uri::from_static("/upload"),
            HeaderMap::new(),
            Body::from_stream(stream::iter(vec![
                Ok::<_, std::io::Error>(Bytes::from_static(b"12345678")),
                Ok(Bytes::from_static(b"12345678")),
            ])),
            RequestOptions { body_limit: 10 },
        );

        let items: Vec<_> = request.stream().await.unwrap().collect().await;
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(RequestBodyError::TooLarge { limit: 10 })));
    }

    #[tokio::test]
    async fn test_chunked_body_over_limit_is_too_large() {
        let request = Request::with_options(
            Method::POST,
            Uri::from_static("/upload"),
            HeaderMap::new(),
            Body::from_stream(stream::iter(vec![
                Ok::<_, std::io::Error>(Bytes::from_static(b"1234")),
                Ok(Bytes::from_static(b"5678")),
                Ok(Bytes::from_static(b"9")),
            ])),
            RequestOptions { body_limit: 8 },
        );

        assert!(matches!(
            request.bytes().await,
            Err(RequestBodyError::TooLarge { limit: 8 })
        ));
    }

    #[tokio::test]
    async fn test_body_at_exact_limit_is_read() {
        let request = Request::with_options(
            Method::POST,
            Uri::from_static("/upload"),
            HeaderMap::new(),
            vec![b'x'; 16],
            RequestOptions { body_limit: 16 },
        );

        assert_eq!(request.bytes().await.unwrap().len(), 16);
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn test_body_read_futures_are_send() {
        let request = post("{}");
        assert_send(&request.bytes());
        assert_send(&request.text());
        assert_send(&request.json());
        assert_send(&request.form_data());
        assert_send(&request.stream());
    }

    #[tokio::test]
    async fn test_concurrent_reads_pull_source_once() {
        let pulled = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&pulled);
        let source = stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"once ")),
            Ok(Bytes::from_static(b"only")),
        ])
        .inspect(move |_| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });
        let first = post(Body::from_stream(source));
        let second = first.clone();

        let (a, b) = tokio::join!(first.bytes(), second.bytes());

        assert_eq!(a.unwrap(), Bytes::from_static(b"once only"));
        assert_eq!(b.unwrap(), Bytes::from_static(b"once only"));
        assert_eq!(pulled.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_streams_hand_out_source_once() {
        let first = post("streamed");
        let second = first.clone();

        let (a, b) = tokio::join!(first.stream(), second.stream());

        let (winner, loser) = match (a, b) {
            (Ok(stream), Err(err)) | (Err(err), Ok(stream)) => (stream, err),
            (a, b) => panic!("expected exactly one stream, got {:?} and {:?}", a.is_ok(), b.is_ok()),
        };
        assert!(matches!(loser, RequestBodyError::AlreadyConsumed));

        let chunks: Vec<_> = winner.collect().await;
        assert_eq!(chunks.len(), 1);
        assert!(matches!(first.bytes().await, Err(RequestBodyError::AlreadyConsumed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_read_leaves_body_interrupted() {
        let source = stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(b"partial"))])
            .chain(stream::pending());
        let request = post(Body::from_stream(source));

        let cancelled = tokio::time::timeout(Duration::from_millis(50), request.bytes()).await;
        assert!(cancelled.is_err());

        assert!(matches!(
            request.bytes().await,
            Err(RequestBodyError::Interrupted)
        ));
    }

    #[tokio::test]
    async fn test_source_failure_is_reported() {
        let source = stream::iter(vec![
            Ok(Bytes::from_static(b"ok")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ]);
        let request = post(Body::from_stream(source));

        assert!(matches!(request.text().await, Err(RequestBodyError::Read(_))));
    }

    #[tokio::test]
    async fn test_set_url_shares_body_and_keeps_original_url() {
        let request = post("shared body");
        let rewritten = request.set_url(Uri::from_static("/inner?x=1"));

        assert_eq!(rewritten.path(), "/inner");
        assert_eq!(rewritten.query(), Some("x=1"));
        assert_eq!(rewritten.original_url().path(), "/upload");

        assert_eq!(rewritten.text().await.unwrap(), "shared body");
        assert_eq!(request.text().await.unwrap(), "shared body");
    }

    #[tokio::test]
    async fn test_invalid_json_and_utf8() {
        let request = post(vec![0xff, 0xfe]);
        assert!(matches!(request.text().await, Err(RequestBodyError::InvalidUtf8(_))));
        assert!(matches!(request.json().await, Err(RequestBodyError::InvalidJson(_))));
    }

    #[tokio::test]
    async fn test_form_data_by_content_type() {
        let request = post_with_content_type("application/x-www-form-urlencoded", "a=1&b=two");
        let form = request.form_data().await.unwrap();
        assert_eq!(form.get("b").and_then(|v| v.as_text()), Some("two"));

        let request = post_with_content_type("text/plain", "a=1");
        assert!(matches!(
            request.form_data().await,
            Err(RequestBodyError::InvalidForm(_))
        ));
    }

    #[tokio::test]
    async fn test_from_http_keeps_method_and_headers() {
        let http_request = http::Request::builder()
            .method(Method::PUT)
            .uri("/items/3?draft=true")
            .header("x-trace", "abc")
            .body(Full::new(Bytes::from_static(b"payload")))
            .unwrap();

        let request = Request::from_http(http_request, RequestOptions::default());
        assert_eq!(request.method(), Method::PUT);
        assert_eq!(request.header("x-trace"), Some("abc"));
        assert_eq!(request.query(), Some("draft=true"));
        assert_eq!(request.text().await.unwrap(), "payload");
    }
}
