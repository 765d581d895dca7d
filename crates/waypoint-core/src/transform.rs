//! Outcome transforms
//!
//! Every dispatch outcome (a routed response, a mounted application's
//! response, a structured error) passes through the [`Transform`] given to
//! [`Router::handle`](crate::Router::handle). The transform decides what
//! the client finally sees; [`DefaultTransform`] logs each request and maps
//! errors to JSON error responses.

use crate::config::Profile;
use crate::error::RouteError;
use crate::response::HttpResponse;
use futures_util::future::BoxFuture;
use http::{Method, StatusCode};
use std::future::Future;
use std::time::Instant;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// What the transform knows about the request being answered
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub method: Method,
    /// URL as handed to the dispatcher
    pub url: String,
}

/// Result of running a route or mount
pub type Outcome = Result<HttpResponse, RouteError>;

/// Final step of every dispatch
///
/// Implemented for closures, so an application can supply its own mapping:
///
/// ```rust,ignore
/// let dispatcher = router
///     .handle(|_info: RequestInfo, outcome: BoxFuture<'static, Outcome>| async move {
///         outcome.await.unwrap_or_else(|err| HttpResponse::text(err.to_string()).with_status(err.status()))
///     })
///     .await?;
/// ```
pub trait Transform: Send + Sync {
    fn transform(
        &self,
        info: RequestInfo,
        outcome: BoxFuture<'static, Outcome>,
    ) -> BoxFuture<'static, HttpResponse>;
}

impl<F, Fut> Transform for F
where
    F: Fn(RequestInfo, BoxFuture<'static, Outcome>) -> Fut + Send + Sync,
    Fut: Future<Output = HttpResponse> + Send + 'static,
{
    fn transform(
        &self,
        info: RequestInfo,
        outcome: BoxFuture<'static, Outcome>,
    ) -> BoxFuture<'static, HttpResponse> {
        Box::pin(self(info, outcome))
    }
}

/// Logs each request and renders errors as JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTransform {
    profile: Profile,
}

impl DefaultTransform {
    pub fn new(profile: Profile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }
}

impl Transform for DefaultTransform {
    fn transform(
        &self,
        info: RequestInfo,
        outcome: BoxFuture<'static, Outcome>,
    ) -> BoxFuture<'static, HttpResponse> {
        let profile = self.profile;
        Box::pin(async move {
            let start = Instant::now();
            let response = match outcome.await {
                Ok(response) => response,
                Err(err) => {
                    if err.is_internal() {
                        error!(method = %info.method, url = %info.url, error = %err, "Handler failed");
                    } else {
                        debug!(method = %info.method, url = %info.url, error = %err, "Request rejected");
                    }
                    err.into_response(profile)
                }
            };
            log_request(&info.method, &info.url, response.status(), start);
            response
        })
    }
}

/// Log request completion
pub(crate) fn log_request(method: &Method, path: &str, status: StatusCode, start: Instant) {
    let elapsed = start.elapsed();

    if status.is_success() {
        info!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %elapsed.as_millis(),
            "Request completed"
        );
    } else {
        error!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %elapsed.as_millis(),
            "Request failed"
        );
    }
}

/// Install a fmt subscriber filtered by `RUST_LOG`
///
/// Defaults to `info,waypoint=debug`. Does nothing if a global subscriber
/// is already set.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,waypoint=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RouteNotFound, RouteError};

    fn info() -> RequestInfo {
        RequestInfo {
            method: Method::GET,
            url: "/missing".to_string(),
        }
    }

    #[tokio::test]
    async fn test_default_transform_passes_responses_through() {
        let transform = DefaultTransform::default();
        let outcome: BoxFuture<'static, Outcome> =
            Box::pin(async { Ok(HttpResponse::text("fine")) });

        let response = transform.transform(info(), outcome).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.text_body(), Some("fine"));
    }

    #[tokio::test]
    async fn test_default_transform_renders_errors() {
        let transform = DefaultTransform::new(Profile::Production);
        let outcome: BoxFuture<'static, Outcome> = Box::pin(async {
            Err(RouteError::from(RouteNotFound {
                method: Method::GET,
                url: "/missing".to_string(),
            }))
        });

        let response = transform.transform(info(), outcome).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.text_body().unwrap_or_default().contains("not_found"));
    }

    #[tokio::test]
    async fn test_closure_transform() {
        let transform = |info: RequestInfo, outcome: BoxFuture<'static, Outcome>| async move {
            match outcome.await {
                Ok(response) => response,
                Err(err) => HttpResponse::text(format!("{} failed: {}", info.url, err.error_type()))
                    .with_status(StatusCode::IM_A_TEAPOT),
            }
        };
        let outcome: BoxFuture<'static, Outcome> =
            Box::pin(async { Err(RouteError::Panic("boom".to_string())) });

        let response = transform.transform(info(), outcome).await;
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(response.text_body(), Some("/missing failed: internal_error"));
    }
}
