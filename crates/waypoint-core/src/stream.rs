//! Response serialization
//!
//! A response is written either to a [`ResponseSink`] (status and headers
//! once, then body chunks in order) or converted into an `http::Response`
//! with a streaming body for hyper. In both cases a failing stream stops
//! the write: the failure is logged and surfaced as [`HttpStreamError`],
//! and no further chunks are written.
//!
//! # Example
//!
//! ```rust,ignore
//! use waypoint_core::stream::stream_from_strings;
//!
//! async fn numbers() -> HttpResponse {
//!     stream_from_strings((1..=3).map(|n| Ok::<_, std::io::Error>(format!("{n}\n"))))
//!         .with_content_type("text/plain")
//! }
//! ```

use crate::error::{BoxError, HttpStreamError};
use crate::response::{HttpResponse, OutgoingBody, RawBody};
use bytes::{Bytes, BytesMut};
use futures_util::{stream, StreamExt, TryStreamExt};
use http::{HeaderMap, StatusCode};
use http_body::Frame;
use http_body_util::{combinators::UnsyncBoxBody, BodyExt, Empty, Full, StreamBody};
use std::convert::Infallible;
use std::future::Future;

/// Body type handed to hyper
pub type HttpBody = UnsyncBoxBody<Bytes, HttpStreamError>;

/// Destination a response is written to
pub trait ResponseSink: Send {
    /// Write the status line and headers; called exactly once
    fn write_head(
        &mut self,
        status: StatusCode,
        headers: &HeaderMap,
    ) -> impl Future<Output = Result<(), HttpStreamError>> + Send;

    fn write_chunk(
        &mut self,
        chunk: Bytes,
    ) -> impl Future<Output = Result<(), HttpStreamError>> + Send;

    /// Accept an opaque body the sink knows how to write
    fn write_raw(
        &mut self,
        body: RawBody,
    ) -> impl Future<Output = Result<(), HttpStreamError>> + Send;

    fn finish(&mut self) -> impl Future<Output = Result<(), HttpStreamError>> + Send;
}

impl HttpResponse {
    /// Write this response to `sink`
    ///
    /// Dropping the returned future mid-stream drops the stream source.
    pub async fn write_to<S: ResponseSink>(self, sink: &mut S) -> Result<(), HttpStreamError> {
        let (status, headers, body) = self.into_parts();
        sink.write_head(status, &headers).await?;

        match body {
            OutgoingBody::None => {}
            OutgoingBody::Full(bytes) => {
                if !bytes.is_empty() {
                    sink.write_chunk(bytes).await?;
                }
            }
            OutgoingBody::Stream(mut chunks) => {
                while let Some(chunk) = chunks.next().await {
                    match chunk {
                        Ok(chunk) => sink.write_chunk(chunk).await?,
                        Err(err) => {
                            tracing::error!(error = %err, "Response stream failed");
                            return Err(err);
                        }
                    }
                }
            }
            OutgoingBody::Raw(raw) => sink.write_raw(raw).await?,
        }

        sink.finish().await
    }

    /// Convert into an `http::Response` for hyper
    ///
    /// Raw payloads are accepted when they hold an [`HttpBody`], `Bytes`,
    /// `String`, `Vec<u8>` or `&'static str`; anything else becomes an empty
    /// 500 response.
    pub fn into_http(self) -> http::Response<HttpBody> {
        let (mut status, headers, body) = self.into_parts();

        let body = match body {
            OutgoingBody::None => empty_body(),
            OutgoingBody::Full(bytes) => full_body(bytes),
            OutgoingBody::Stream(chunks) => StreamBody::new(
                chunks
                    .inspect_err(|err| tracing::error!(error = %err, "Response stream failed"))
                    .map_ok(Frame::data),
            )
            .boxed_unsync(),
            OutgoingBody::Raw(raw) => match raw_body(raw) {
                Some(body) => body,
                None => {
                    tracing::error!("Unsupported raw response body type");
                    status = StatusCode::INTERNAL_SERVER_ERROR;
                    empty_body()
                }
            },
        };

        let mut response = http::Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

fn empty_body() -> HttpBody {
    Empty::<Bytes>::new()
        .map_err(|never: Infallible| -> HttpStreamError { match never {} })
        .boxed_unsync()
}

fn full_body(bytes: Bytes) -> HttpBody {
    Full::new(bytes)
        .map_err(|never: Infallible| -> HttpStreamError { match never {} })
        .boxed_unsync()
}

fn raw_body(raw: RawBody) -> Option<HttpBody> {
    let raw = match raw.downcast::<HttpBody>() {
        Ok(body) => return Some(*body),
        Err(raw) => raw,
    };
    let raw = match raw.downcast::<Bytes>() {
        Ok(bytes) => return Some(full_body(*bytes)),
        Err(raw) => raw,
    };
    let raw = match raw.downcast::<String>() {
        Ok(text) => return Some(full_body(Bytes::from(*text))),
        Err(raw) => raw,
    };
    let raw = match raw.downcast::<Vec<u8>>() {
        Ok(bytes) => return Some(full_body(Bytes::from(*bytes))),
        Err(raw) => raw,
    };
    raw.downcast::<&'static str>()
        .ok()
        .map(|text| full_body(Bytes::from_static(text.as_bytes())))
}

/// Sink that keeps the written response in memory
#[derive(Default)]
pub struct BufferedSink {
    head: Option<(StatusCode, HeaderMap)>,
    body: BytesMut,
    raw: Option<RawBody>,
    chunks: usize,
    finished: bool,
}

impl BufferedSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.head.as_ref().map(|(status, _)| *status)
    }

    pub fn headers(&self) -> Option<&HeaderMap> {
        self.head.as_ref().map(|(_, headers)| headers)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Number of chunks written
    pub fn chunks(&self) -> usize {
        self.chunks
    }

    pub fn take_raw(&mut self) -> Option<RawBody> {
        self.raw.take()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl ResponseSink for BufferedSink {
    async fn write_head(
        &mut self,
        status: StatusCode,
        headers: &HeaderMap,
    ) -> Result<(), HttpStreamError> {
        if self.head.is_some() {
            return Err(HttpStreamError::new("response head written twice"));
        }
        self.head = Some((status, headers.clone()));
        Ok(())
    }

    async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), HttpStreamError> {
        self.body.extend_from_slice(&chunk);
        self.chunks += 1;
        Ok(())
    }

    async fn write_raw(&mut self, body: RawBody) -> Result<(), HttpStreamError> {
        self.raw = Some(body);
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), HttpStreamError> {
        self.finished = true;
        Ok(())
    }
}

/// Stream a fixed set of chunks
pub fn stream_from_iter<I, E>(chunks: I) -> HttpResponse
where
    I: IntoIterator<Item = Result<Bytes, E>>,
    I::IntoIter: Send + 'static,
    E: Into<BoxError> + 'static,
{
    HttpResponse::stream(stream::iter(chunks))
}

/// Stream a set of strings, one chunk each
pub fn stream_from_strings<I, S, E>(strings: I) -> HttpResponse
where
    I: IntoIterator<Item = Result<S, E>>,
    I::IntoIter: Send + 'static,
    S: Into<String> + 'static,
    E: Into<BoxError> + 'static,
{
    HttpResponse::stream(stream::iter(strings).map(|item| item.map(|s| Bytes::from(s.into()))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header;

    fn failing_after_first() -> HttpResponse {
        stream_from_iter(vec![
            Ok(Bytes::from_static(b"first")),
            Err(std::io::Error::new(std::io::ErrorKind::Other, "source broke")),
            Ok(Bytes::from_static(b"never")),
        ])
    }

    #[tokio::test]
    async fn test_write_text_response() {
        let mut sink = BufferedSink::new();
        HttpResponse::text("hello").write_to(&mut sink).await.unwrap();

        assert_eq!(sink.status(), Some(StatusCode::OK));
        assert_eq!(sink.headers().unwrap()[header::CONTENT_TYPE], "text/plain");
        assert_eq!(sink.body(), b"hello");
        assert!(sink.is_finished());
    }

    #[tokio::test]
    async fn test_write_stream_in_order() {
        let mut sink = BufferedSink::new();
        stream_from_strings(vec![Ok::<_, std::io::Error>("a"), Ok("b"), Ok("c")])
            .write_to(&mut sink)
            .await
            .unwrap();

        assert_eq!(sink.body(), b"abc");
        assert_eq!(sink.chunks(), 3);
    }

    #[tokio::test]
    async fn test_stream_failure_stops_writing() {
        let mut sink = BufferedSink::new();
        let err = failing_after_first().write_to(&mut sink).await.unwrap_err();

        assert!(err.to_string().contains("source broke"));
        assert_eq!(sink.status(), Some(StatusCode::OK));
        assert_eq!(sink.body(), b"first");
        assert!(!sink.is_finished());
    }

    #[tokio::test]
    async fn test_empty_response_writes_no_chunks() {
        let mut sink = BufferedSink::new();
        HttpResponse::empty().write_to(&mut sink).await.unwrap();

        assert_eq!(sink.status(), Some(StatusCode::NO_CONTENT));
        assert_eq!(sink.chunks(), 0);
    }

    #[tokio::test]
    async fn test_raw_reaches_sink_untouched() {
        let mut sink = BufferedSink::new();
        HttpResponse::raw(42u32).write_to(&mut sink).await.unwrap();

        let raw = sink.take_raw().unwrap();
        assert_eq!(raw.downcast_ref::<u32>(), Some(&42));
    }

    #[tokio::test]
    async fn test_into_http_stream_failure_is_a_body_error() {
        let response = failing_after_first().into_http();
        assert_eq!(response.status(), StatusCode::OK);

        let mut body = response.into_body();
        let first = body.frame().await.unwrap().unwrap();
        assert_eq!(first.into_data().unwrap(), Bytes::from_static(b"first"));
        assert!(body.frame().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_into_http_raw_bodies() {
        let response = HttpResponse::raw(String::from("raw text")).into_http();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(bytes, Bytes::from_static(b"raw text"));

        let response = HttpResponse::raw(std::time::Duration::from_secs(1)).into_http();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
