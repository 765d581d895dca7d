//! Request dispatch
//!
//! A [`Dispatcher`] is the compiled form of a [`Router`](crate::Router).
//! For each request it tries the mounts (longest prefix first), then the
//! route matcher, runs whatever it found, and hands the outcome to the
//! transform. Early responses are unwrapped and handler panics are caught
//! before the transform sees the outcome, so exactly one response comes
//! out of every dispatch.

use crate::context::RouteContext;
use crate::error::{Rejection, RouteError, RouteNotFound};
use crate::handler::{HandlerFuture, IntoRouteResult};
use crate::params::Params;
use crate::request::Request;
use crate::response::HttpResponse;
use crate::router::{Mount, RouteTable};
use crate::transform::{Outcome, RequestInfo, Transform};
use futures_util::future::{BoxFuture, FutureExt};
use http::Uri;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::debug;

/// An opaque sub-application that can be mounted at a prefix
///
/// Implemented for `Fn(Uri, Request) -> impl Future` closures and for
/// [`Dispatcher`], so a compiled router can be mounted inside another.
pub trait RequestHandler: Send + Sync + 'static {
    /// Handle a request; `url` is the URL with the mount prefix stripped
    fn call(&self, url: Uri, request: Request) -> HandlerFuture;
}

impl<F, Fut> RequestHandler for F
where
    F: Fn(Uri, Request) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: IntoRouteResult,
{
    fn call(&self, url: Uri, request: Request) -> HandlerFuture {
        let future = self(url, request);
        Box::pin(async move { future.await.into_route_result() })
    }
}

struct Inner {
    routes: RouteTable,
    mounts: Vec<Mount>,
    transform: Box<dyn Transform>,
}

/// Compiled router
///
/// Cheap to clone; all clones share the same read-only tables.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub(crate) fn new(routes: RouteTable, mounts: Vec<Mount>, transform: Box<dyn Transform>) -> Self {
        Self {
            inner: Arc::new(Inner {
                routes,
                mounts,
                transform,
            }),
        }
    }

    /// Dispatch `request`, addressed to `url`, and produce its response
    pub fn dispatch(&self, url: &str, request: Request) -> BoxFuture<'static, HttpResponse> {
        let info = RequestInfo {
            method: request.method().clone(),
            url: url.to_string(),
        };
        let outcome = resolve(Arc::clone(&self.inner), url.to_string(), request).boxed();
        self.inner.transform.transform(info, outcome)
    }

    /// Number of compiled routes
    pub fn route_count(&self) -> usize {
        self.inner.routes.len()
    }

    /// Mount prefixes in the order they are tried
    pub fn mount_prefixes(&self) -> Vec<&str> {
        self.inner.mounts.iter().map(Mount::prefix).collect()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.route_count())
            .field("mounts", &self.mount_prefixes())
            .finish()
    }
}

impl RequestHandler for Dispatcher {
    fn call(&self, url: Uri, request: Request) -> HandlerFuture {
        let response = self.dispatch(&url.to_string(), request);
        Box::pin(async move { Ok(response.await) })
    }
}

async fn resolve(inner: Arc<Inner>, url: String, request: Request) -> Outcome {
    // mounts rewrite `url`, never the original
    let not_found = |request: &Request| RouteNotFound {
        method: request.method().clone(),
        url: request.original_url().to_string(),
    };

    let Ok(uri) = url.parse::<Uri>() else {
        debug!(url = %url, "unparseable request url");
        return Err(not_found(&request).into());
    };

    if let Some(mount) = inner.mounts.iter().find(|mount| mount.matches(uri.path())) {
        let forwarded = mount
            .strip(&uri)
            .map_err(|_| RouteError::from(not_found(&request)))?;
        debug!(prefix = mount.prefix(), url = %forwarded, "dispatching to mount");

        let request = request.set_url(forwarded.clone());
        let handler = mount.handler();
        let future = std::panic::catch_unwind(AssertUnwindSafe(|| handler.call(forwarded, request)))
            .map_err(|panic| RouteError::Panic(panic_message(panic.as_ref())))?;
        return settle(future).await;
    }

    let Some((route, params)) = inner.routes.find(request.method(), uri.path()) else {
        debug!(method = %request.method(), url = %url, "no route matched");
        return Err(not_found(&request).into());
    };
    debug!(pattern = %route.pattern, params = params.len(), "route matched");

    let search_params = Params::from_query(uri.query().unwrap_or(""));
    let cx = RouteContext::new(request, params, search_params);
    settle(route.handler.call(cx, route.env.clone())).await
}

/// Run a handler future to its outcome
///
/// Early responses become successes; panics become [`RouteError::Panic`].
async fn settle(future: HandlerFuture) -> Outcome {
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(Rejection::Early(early))) => Ok(early.into_response()),
        Ok(Err(Rejection::Error(err))) => Err(err),
        Err(panic) => Err(RouteError::Panic(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
