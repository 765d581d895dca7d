//! HTTP server implementation
//!
//! A thin hyper adapter: accept connections, turn each hyper request into
//! a [`Request`] with a streamed body, dispatch it and hand the converted
//! response back to hyper. [`DispatchService`] is the `tower` service that
//! does the conversion, so the same dispatcher can be embedded in any
//! tower-compatible stack.

use crate::config::{RequestOptions, ServerConfig};
use crate::dispatcher::Dispatcher;
use crate::error::BoxError;
use crate::request::{Body, Request};
use crate::stream::HttpBody;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::request::Parts;
use http::{header, HeaderName};
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use std::convert::Infallible;
use std::future::Future;
use std::task::{Context, Poll};
use tokio::net::TcpListener;
use tracing::{debug, error, info};

const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Rebuild the absolute URL a client addressed
///
/// The scheme is `https` on TLS connections, else `x-forwarded-proto`,
/// else `http`. The host comes from `x-forwarded-host`, then `host`, then
/// falls back to `localhost:<default_port>`.
pub fn request_url(parts: &Parts, default_port: u16, tls: bool) -> String {
    let lookup = |name: &HeaderName| {
        parts
            .headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    let proto = if tls {
        "https"
    } else {
        lookup(&X_FORWARDED_PROTO).unwrap_or("http")
    };
    let host = match lookup(&X_FORWARDED_HOST).or_else(|| lookup(&header::HOST)) {
        Some(host) => host.to_string(),
        None => format!("localhost:{}", default_port),
    };
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    format!("{}://{}{}", proto, host, path)
}

/// `tower` service dispatching `http` requests
#[derive(Debug, Clone)]
pub struct DispatchService {
    dispatcher: Dispatcher,
    options: RequestOptions,
    port: u16,
    tls: bool,
}

impl DispatchService {
    pub fn new(dispatcher: Dispatcher, config: &ServerConfig) -> Self {
        Self {
            dispatcher,
            options: config.request,
            port: config.addr.port(),
            tls: false,
        }
    }

    /// Mark requests as arriving over TLS
    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

impl<B> tower_service::Service<http::Request<B>> for DispatchService
where
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    type Response = http::Response<HttpBody>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: http::Request<B>) -> Self::Future {
        let (mut parts, body) = request.into_parts();
        let url = request_url(&parts, self.port, self.tls);
        match url.parse() {
            Ok(uri) => parts.uri = uri,
            Err(err) => debug!(url = %url, error = %err, "keeping request target as sent"),
        }

        let request = Request::from_parts(parts, Body::new(body), self.options);
        let response = self.dispatcher.dispatch(&url, request);
        Box::pin(async move { Ok(response.await.into_http()) })
    }
}

/// Bind `config.addr` and serve until the process ends
pub async fn run(dispatcher: Dispatcher, config: &ServerConfig) -> Result<(), BoxError> {
    let listener = TcpListener::bind(config.addr).await?;
    serve(listener, dispatcher, config).await
}

/// Serve connections accepted on `listener`
pub async fn serve(
    listener: TcpListener,
    dispatcher: Dispatcher,
    config: &ServerConfig,
) -> Result<(), BoxError> {
    serve_with_shutdown(listener, dispatcher, config, std::future::pending()).await
}

/// Serve connections until `signal` completes
///
/// Connections already accepted keep running to completion.
pub async fn serve_with_shutdown<F>(
    listener: TcpListener,
    dispatcher: Dispatcher,
    config: &ServerConfig,
    signal: F,
) -> Result<(), BoxError>
where
    F: Future<Output = ()>,
{
    let addr = listener.local_addr()?;
    let service = DispatchService::new(dispatcher, config).with_port(addr.port());
    info!(addr = %addr, profile = ?config.profile, "waypoint listening on http://{}", addr);

    tokio::pin!(signal);
    loop {
        let (stream, remote_addr) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = &mut signal => {
                info!("Shutdown signal received, no longer accepting connections");
                return Ok(());
            }
        };
        let io = TokioIo::new(stream);
        let service = TowerToHyperService::new(service.clone());

        tokio::spawn(async move {
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                error!(remote_addr = %remote_addr, "Connection error: {}", err);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::HttpResponse;
    use crate::router::Router;
    use crate::transform::DefaultTransform;
    use http::StatusCode;
    use http_body_util::{BodyExt, Full};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tower_service::Service;

    fn parts(uri: &str, headers: &[(&'static str, &'static str)]) -> Parts {
        let mut builder = http::Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_request_url_from_host() {
        let parts = parts("/users?page=2", &[("host", "example.com")]);
        assert_eq!(request_url(&parts, 8080, false), "http://example.com/users?page=2");
    }

    #[test]
    fn test_request_url_prefers_forwarded_headers() {
        let parts = parts(
            "/",
            &[
                ("host", "internal:3000"),
                ("x-forwarded-host", " api.example.com "),
                ("x-forwarded-proto", "https"),
            ],
        );
        assert_eq!(request_url(&parts, 8080, false), "https://api.example.com/");
    }

    #[test]
    fn test_request_url_tls_and_fallback_host() {
        let parts = parts("/x", &[("x-forwarded-proto", "http")]);
        assert_eq!(request_url(&parts, 9000, true), "https://localhost:9000/x");
        assert_eq!(request_url(&parts, 9000, false), "http://localhost:9000/x");
    }

    async fn dispatcher() -> Dispatcher {
        Router::new()
            .get("/ping", || async { HttpResponse::text("pong") })
            .post("/echo", |request: Request| async move {
                let body = request.text().await?;
                Ok::<_, crate::error::Rejection>(HttpResponse::text(format!(
                    "{} {}",
                    request.url(),
                    body
                )))
            })
            .handle(DefaultTransform::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_service_converts_requests() {
        let config = ServerConfig::default();
        let mut service = DispatchService::new(dispatcher().await, &config);

        let request = http::Request::builder()
            .method("POST")
            .uri("/echo")
            .header("host", "example.com")
            .body(Full::new(Bytes::from_static(b"hi")))
            .unwrap();
        let response = service.call(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"http://example.com/echo hi");
    }

    #[tokio::test]
    async fn test_serve_with_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
        let config = ServerConfig::default();
        let dispatcher = dispatcher().await;

        let server = tokio::spawn(async move {
            serve_with_shutdown(listener, dispatcher, &config, async {
                let _ = stopped.await;
            })
            .await
        });

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /ping HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();
        let raw = String::from_utf8_lossy(&raw);
        assert!(raw.starts_with("HTTP/1.1 200 OK"), "{}", raw);
        assert!(raw.ends_with("pong"), "{}", raw);

        let _ = stop.send(());
        assert!(server.await.unwrap().is_ok());
    }
}
