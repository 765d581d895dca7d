//! Router implementation using radix tree (matchit)
//!
//! A [`Router`] is a persistent builder value. Every builder method takes
//! the router by value and returns the extended router; sub-routers are
//! shared behind `Arc`, so cloning a router before extending it leaves the
//! clone untouched.
//!
//! Nothing is matched against a `Router` directly. [`Router::handle`]
//! flattens the tree, runs every environment builder once and compiles
//! the routes into a [`Dispatcher`].
//!
//! # Example
//!
//! ```rust,ignore
//! use waypoint_core::{DefaultTransform, HttpResponse, Router};
//!
//! async fn health() -> HttpResponse {
//!     HttpResponse::text("ok")
//! }
//!
//! let api = Router::new().get("/users/{id}", get_user);
//! let app = Router::new()
//!     .get("/health", health)
//!     .mount_router("/api", api);
//!
//! let dispatcher = app.handle(DefaultTransform::default()).await?;
//! ```

use crate::dispatcher::{Dispatcher, RequestHandler};
use crate::environment::{EnvBuilder, EnvCache, EnvError, Environment};
use crate::error::{BoxError, BuildError};
use crate::handler::{BoxedHandler, Handler};
use crate::params::Params;
use crate::transform::Transform;
use http::{Method, Uri};
use matchit::{InsertError, Router as MatchitRouter};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

/// Error returned when two routes claim the same method and path
#[derive(Debug, Clone)]
pub struct RouteConflictError {
    /// The path that was being registered
    pub new_path: String,
    /// The HTTP method that conflicts, `None` when the patterns themselves clash
    pub method: Option<Method>,
    /// The existing path that conflicts
    pub existing_path: String,
    /// Detailed error message from the underlying router
    pub details: String,
}

impl std::fmt::Display for RouteConflictError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "route conflict: ")?;
        if let Some(ref method) = self.method {
            write!(f, "{} ", method)?;
        }
        write!(
            f,
            "`{}` collides with `{}` ({})",
            self.new_path, self.existing_path, self.details
        )
    }
}

impl std::error::Error for RouteConflictError {}

/// One registered method + path + handler unit
#[derive(Clone)]
pub struct Route {
    method: Method,
    path: String,
    handler: BoxedHandler,
    env: EnvBuilder,
}

impl Route {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Environment steps stamped on the route, outermost router first
    pub fn environment(&self) -> &EnvBuilder {
        &self.env
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("env", &self.env)
            .finish()
    }
}

#[derive(Clone)]
enum Entry {
    Route(Route),
    Concat(Arc<Router>),
    ConcatWithPrefix { prefix: String, router: Arc<Router> },
}

/// A sub-application delegated wholesale at a path prefix
#[derive(Clone)]
pub(crate) struct Mount {
    prefix: String,
    handler: Arc<dyn RequestHandler>,
}

impl Mount {
    pub(crate) fn prefix(&self) -> &str {
        &self.prefix
    }

    pub(crate) fn handler(&self) -> &Arc<dyn RequestHandler> {
        &self.handler
    }

    /// Whether `path` is the prefix itself or lies below it on a segment boundary
    pub(crate) fn matches(&self, path: &str) -> bool {
        if self.prefix == "/" {
            return true;
        }
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// URL as seen by the mounted application
    ///
    /// Scheme, authority and query survive; an empty remainder becomes `/`.
    pub(crate) fn strip(&self, url: &Uri) -> Result<Uri, http::Error> {
        let path = url.path();
        let rest = if self.prefix == "/" {
            path
        } else {
            &path[self.prefix.len().min(path.len())..]
        };
        let rest = if rest.is_empty() { "/" } else { rest };
        let path_and_query = match url.query() {
            Some(query) => format!("{}?{}", rest, query),
            None => rest.to_string(),
        };

        let mut builder = Uri::builder();
        if let Some(scheme) = url.scheme() {
            builder = builder.scheme(scheme.clone());
        }
        if let Some(authority) = url.authority() {
            builder = builder.authority(authority.clone());
        }
        builder.path_and_query(path_and_query).build()
    }
}

impl std::fmt::Debug for Mount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mount").field("prefix", &self.prefix).finish()
    }
}

/// Persistent router builder
#[derive(Clone, Default)]
pub struct Router {
    entries: Vec<Entry>,
    env: EnvBuilder,
    mounts: Vec<Mount>,
}

impl Router {
    /// Create a new router
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route for `method` at `path`
    ///
    /// Paths accept both `{name}` and `:name` parameters; `*name` captures
    /// the rest of the path. A path that does not start with `/` is
    /// reported by [`handle`](Router::handle).
    pub fn route<H, T>(mut self, method: Method, path: &str, handler: H) -> Self
    where
        H: Handler<T>,
        T: 'static,
    {
        self.entries.push(Entry::Route(Route {
            method,
            path: path.to_string(),
            handler: BoxedHandler::new(handler),
            env: EnvBuilder::new(),
        }));
        self
    }

    pub fn get<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T>,
        T: 'static,
    {
        self.route(Method::GET, path, handler)
    }

    pub fn post<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T>,
        T: 'static,
    {
        self.route(Method::POST, path, handler)
    }

    pub fn put<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T>,
        T: 'static,
    {
        self.route(Method::PUT, path, handler)
    }

    pub fn patch<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T>,
        T: 'static,
    {
        self.route(Method::PATCH, path, handler)
    }

    pub fn delete<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T>,
        T: 'static,
    {
        self.route(Method::DELETE, path, handler)
    }

    /// Delegate every request under `prefix` to `handler`
    ///
    /// The handler sees the URL with the prefix stripped. Mounts are
    /// checked before routes, longest prefix first.
    pub fn mount(mut self, prefix: &str, handler: impl RequestHandler) -> Self {
        self.mounts.push(Mount {
            prefix: normalize_prefix(prefix),
            handler: Arc::new(handler),
        });
        self
    }

    /// Nest `router` under `prefix`
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let users = Router::new()
    ///     .get("/", list_users)
    ///     .get("/{id}", get_user);
    ///
    /// // GET /api/users and GET /api/users/{id}
    /// let app = Router::new().mount_router("/api/users", users);
    /// ```
    pub fn mount_router(mut self, prefix: &str, router: Router) -> Self {
        self.entries.push(Entry::ConcatWithPrefix {
            prefix: normalize_prefix(prefix),
            router: Arc::new(router),
        });
        self
    }

    /// Merge the routes of `router` into this one, without a prefix
    pub fn combine_with(mut self, router: Router) -> Self {
        self.entries.push(Entry::Concat(Arc::new(router)));
        self
    }

    /// Provide a service to every route of this router and its children
    pub fn provide_service<S: Send + Sync + 'static>(mut self, service: S) -> Self {
        self.env = self.env.provide(service);
        self
    }

    /// Provide a service built from the environment assembled so far
    ///
    /// The effect runs once, when the router is compiled by
    /// [`handle`](Router::handle).
    pub fn provide_service_effect<S, F, Fut, E>(mut self, effect: F) -> Self
    where
        S: Send + Sync + 'static,
        F: Fn(Environment) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<S, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.env = self.env.provide_effect(effect);
        self
    }

    /// Flatten the router tree into fully prefixed routes
    ///
    /// Each level applies its own prefix once and layers its environment
    /// steps outside those of its children.
    pub fn routes_with_env(&self, prefix: Option<&str>) -> Vec<Route> {
        let mut routes = Vec::new();
        for entry in &self.entries {
            match entry {
                Entry::Route(route) => routes.push(route.clone()),
                Entry::Concat(router) => routes.extend(router.routes_with_env(None)),
                Entry::ConcatWithPrefix { prefix, router } => {
                    routes.extend(router.routes_with_env(Some(prefix)))
                }
            }
        }

        for route in &mut routes {
            route.env = EnvBuilder::layered(&self.env, &route.env);
            if let Some(prefix) = prefix {
                if route.path.starts_with('/') {
                    route.path = join_path(prefix, &route.path);
                }
            }
        }
        routes
    }

    /// Number of routes after flattening
    pub fn route_count(&self) -> usize {
        self.entries
            .iter()
            .map(|entry| match entry {
                Entry::Route(_) => 1,
                Entry::Concat(router) | Entry::ConcatWithPrefix { router, .. } => {
                    router.route_count()
                }
            })
            .sum()
    }

    /// Mounts of this router and its children, with prefixes applied
    fn mounts_with_prefix(&self, prefix: Option<&str>) -> Vec<Mount> {
        let mut mounts = self.mounts.clone();
        for entry in &self.entries {
            match entry {
                Entry::Route(_) => {}
                Entry::Concat(router) => mounts.extend(router.mounts_with_prefix(None)),
                Entry::ConcatWithPrefix { prefix, router } => {
                    mounts.extend(router.mounts_with_prefix(Some(prefix)))
                }
            }
        }

        if let Some(prefix) = prefix {
            for mount in &mut mounts {
                mount.prefix = join_path(prefix, &mount.prefix);
            }
        }
        mounts
    }

    /// Compile the router into a [`Dispatcher`]
    ///
    /// Every distinct environment is built here, once. Every dispatch
    /// outcome, including route misses, passes through `transform`.
    pub async fn handle<T>(&self, transform: T) -> Result<Dispatcher, BuildError>
    where
        T: Transform + 'static,
    {
        let table = self.compile_routes().await?;
        let mounts = self.compile_mounts()?;

        tracing::info!(
            routes = table.len(),
            mounts = mounts.len(),
            "router compiled"
        );
        Ok(Dispatcher::new(table, mounts, Box::new(transform)))
    }

    async fn compile_routes(&self) -> Result<RouteTable, BuildError> {
        let mut table = RouteTable::default();
        let mut cache = EnvCache::default();

        for route in self.routes_with_env(None) {
            if !route.path.starts_with('/') {
                return Err(BuildError::InvalidPath {
                    path: route.path,
                    reason: "path must start with `/`".to_string(),
                });
            }
            if let Some(missing) = route
                .handler
                .requirements()
                .iter()
                .find(|requirement| !route.env.provides(requirement))
            {
                return Err(BuildError::MissingService {
                    method: route.method,
                    path: route.path,
                    service: missing.name(),
                });
            }

            let env = cache.resolve(&route.env).await.map_err(|err: EnvError| {
                tracing::error!(service = err.service, error = %err.source, "service construction failed");
                err
            })?;
            table.insert(route, env)?;
        }

        tracing::debug!(environment_steps = cache.runs(), "route environments built");
        Ok(table)
    }

    fn compile_mounts(&self) -> Result<Vec<Mount>, BuildError> {
        let mut mounts = self.mounts_with_prefix(None);
        let mut seen = HashSet::new();
        for mount in &mounts {
            if !seen.insert(mount.prefix.clone()) {
                return Err(BuildError::DuplicateMount {
                    prefix: mount.prefix.clone(),
                });
            }
        }
        mounts.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Ok(mounts)
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes_with_env(None))
            .field("mounts", &self.mounts_with_prefix(None))
            .finish()
    }
}

/// A route ready to run: handler plus its built environment
pub(crate) struct CompiledRoute {
    pub(crate) handler: BoxedHandler,
    pub(crate) env: Environment,
    pub(crate) pattern: Arc<str>,
}

/// Compiled matcher: one matchit entry per path, one handler per method
#[derive(Default)]
pub(crate) struct RouteTable {
    inner: MatchitRouter<usize>,
    slots: Vec<HashMap<Method, CompiledRoute>>,
    paths: HashMap<String, usize>,
    count: usize,
}

impl RouteTable {
    fn insert(&mut self, route: Route, env: Environment) -> Result<(), BuildError> {
        let matchit_path = convert_path_params(&route.path);
        let compiled = CompiledRoute {
            handler: route.handler,
            env,
            pattern: Arc::from(route.path.as_str()),
        };

        let slot = match self.paths.get(&matchit_path) {
            Some(&slot) => slot,
            None => {
                let slot = self.slots.len();
                self.inner
                    .insert(matchit_path.clone(), slot)
                    .map_err(|err| insert_error(&route.path, err))?;
                self.slots.push(HashMap::new());
                self.paths.insert(matchit_path, slot);
                slot
            }
        };

        let methods = &mut self.slots[slot];
        if let Some(existing) = methods.get(&route.method) {
            return Err(RouteConflictError {
                new_path: route.path,
                method: Some(route.method),
                existing_path: existing.pattern.to_string(),
                details: "a handler is already registered for this method and path".to_string(),
            }
            .into());
        }
        methods.insert(route.method, compiled);
        self.count += 1;
        Ok(())
    }

    /// Find the route for `method` at `path`, with its captured parameters
    ///
    /// Parameter values are percent-decoded; a value that does not decode
    /// to UTF-8 is a miss.
    pub(crate) fn find(&self, method: &Method, path: &str) -> Option<(&CompiledRoute, Params)> {
        let matched = self.inner.at(path).ok()?;
        let route = self.slots.get(*matched.value)?.get(method)?;
        let params = matched
            .params
            .iter()
            .map(|(key, value)| {
                urlencoding::decode(value)
                    .ok()
                    .map(|value| (key.to_string(), value.into_owned()))
            })
            .collect::<Option<Params>>()?;
        Some((route, params))
    }

    pub(crate) fn len(&self) -> usize {
        self.count
    }
}

fn insert_error(path: &str, err: InsertError) -> BuildError {
    match err {
        InsertError::Conflict { ref with } => RouteConflictError {
            new_path: path.to_string(),
            method: None,
            existing_path: with.clone(),
            details: err.to_string(),
        }
        .into(),
        err => BuildError::InvalidPath {
            path: path.to_string(),
            reason: err.to_string(),
        },
    }
}

/// Convert {param} style to :param for matchit
fn convert_path_params(path: &str) -> String {
    let mut result = String::with_capacity(path.len());

    for ch in path.chars() {
        match ch {
            '{' => result.push(':'),
            '}' => {}
            _ => result.push(ch),
        }
    }

    result
}

/// Normalize a prefix to a leading slash and no trailing slash
///
/// Repeated slashes collapse; an empty or slash-only prefix becomes `/`.
pub(crate) fn normalize_prefix(prefix: &str) -> String {
    let segments: Vec<&str> = prefix.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return "/".to_string();
    }

    let mut result = String::with_capacity(prefix.len() + 1);
    for segment in segments {
        result.push('/');
        result.push_str(segment);
    }
    result
}

/// Prepend a normalized prefix; a child path of `/` collapses to the prefix
fn join_path(prefix: &str, path: &str) -> String {
    match (prefix, path) {
        ("/", path) => path.to_string(),
        (prefix, "/") => prefix.to_string(),
        (prefix, path) => format!("{}{}", prefix, path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::context::RouteContext;
    use crate::extract::Service;
    use crate::request::Request;
    use crate::response::HttpResponse;
    use crate::transform::DefaultTransform;
    use http::{HeaderMap, StatusCode};
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn ok() -> HttpResponse {
        HttpResponse::text("ok")
    }

    fn paths(router: &Router) -> Vec<String> {
        router
            .routes_with_env(None)
            .iter()
            .map(|route| format!("{} {}", route.method(), route.path()))
            .collect()
    }

    #[test]
    fn test_convert_path_params() {
        assert_eq!(convert_path_params("/users/{id}"), "/users/:id");
        assert_eq!(
            convert_path_params("/users/{user_id}/posts/{post_id}"),
            "/users/:user_id/posts/:post_id"
        );
        assert_eq!(convert_path_params("/files/*rest"), "/files/*rest");
        assert_eq!(convert_path_params("/users/:id"), "/users/:id");
    }

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("api"), "/api");
        assert_eq!(normalize_prefix("/api/"), "/api");
        assert_eq!(normalize_prefix("//api//v1//"), "/api/v1");
        assert_eq!(normalize_prefix(""), "/");
        assert_eq!(normalize_prefix("///"), "/");
    }

    #[test]
    fn test_nested_prefix_applied_once() {
        let users = Router::new().get("/", ok).get("/{id}", ok);
        let api = Router::new().mount_router("/users", users);
        let app = Router::new().get("/", ok).mount_router("/api/", api);

        assert_eq!(
            paths(&app),
            vec!["GET /", "GET /api/users", "GET /api/users/{id}"]
        );
        assert_eq!(app.route_count(), 3);
    }

    #[test]
    fn test_combine_with_keeps_paths() {
        let a = Router::new().get("/a", ok);
        let b = Router::new().post("/b", ok);
        let app = a.combine_with(b);

        assert_eq!(paths(&app), vec!["GET /a", "POST /b"]);
    }

    #[test]
    fn test_builder_values_are_persistent() {
        let base = Router::new().get("/a", ok);
        let extended = base.clone().get("/b", ok);
        let nested = Router::new().mount_router("/x", base.clone());

        assert_eq!(paths(&base), vec!["GET /a"]);
        assert_eq!(paths(&extended), vec!["GET /a", "GET /b"]);
        assert_eq!(paths(&nested), vec!["GET /x/a"]);
    }

    #[test]
    fn test_environment_layering_order() {
        struct Outer;
        struct Inner;

        let child = Router::new().get("/c", ok).provide_service(Inner);
        let app = Router::new()
            .mount_router("/child", child)
            .provide_service(Outer);

        let routes = app.routes_with_env(None);
        assert_eq!(routes.len(), 1);
        let env = format!("{:?}", routes[0].environment());
        let outer = env.find("Outer").unwrap();
        let inner = env.find("Inner").unwrap();
        assert!(outer < inner, "outer steps must run first: {}", env);
    }

    #[test]
    fn test_mount_matching() {
        let mount = Mount {
            prefix: normalize_prefix("/static/"),
            handler: Arc::new(|_url: Uri, _request: Request| async { HttpResponse::empty() }),
        };

        assert!(mount.matches("/static"));
        assert!(mount.matches("/static/css/site.css"));
        assert!(!mount.matches("/statics"));
        assert!(!mount.matches("/"));

        let url = Uri::from_static("http://example.com/static/css/site.css?v=3");
        assert_eq!(
            mount.strip(&url).unwrap().to_string(),
            "http://example.com/css/site.css?v=3"
        );
        assert_eq!(
            mount.strip(&Uri::from_static("/static")).unwrap().to_string(),
            "/"
        );
    }

    #[tokio::test]
    async fn test_duplicate_route_conflicts() {
        let router = Router::new().get("/users/{id}", ok).get("/users/:id", ok);

        match router.handle(DefaultTransform::default()).await {
            Err(BuildError::RouteConflict(err)) => {
                assert_eq!(err.method, Some(Method::GET));
                assert_eq!(err.existing_path, "/users/{id}");
            }
            other => panic!("expected a conflict, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_same_path_different_methods() {
        let router = Router::new().get("/items", ok).post("/items", ok);
        let dispatcher = router.handle(DefaultTransform::default()).await.unwrap();
        assert_eq!(dispatcher.route_count(), 2);
    }

    #[tokio::test]
    async fn test_conflicting_param_names() {
        let router = Router::new().get("/users/{id}", ok).post("/users/{name}", ok);
        assert!(matches!(
            router.handle(DefaultTransform::default()).await,
            Err(BuildError::RouteConflict(_))
        ));
    }

    #[tokio::test]
    async fn test_relative_path_rejected() {
        let router = Router::new().get("users", ok);
        assert!(matches!(
            router.handle(DefaultTransform::default()).await,
            Err(BuildError::InvalidPath { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_mount_rejected() {
        let files = |_url: Uri, _request: Request| async { HttpResponse::empty() };
        let router = Router::new().mount("/files", files).mount("/files/", files);
        assert!(matches!(
            router.handle(DefaultTransform::default()).await,
            Err(BuildError::DuplicateMount { .. })
        ));
    }

    #[tokio::test]
    async fn test_nested_mounts_carry_prefix() {
        let files = |_url: Uri, _request: Request| async { HttpResponse::empty() };
        let v1 = Router::new().mount("/files", files);
        let app = Router::new().mount_router("/v1", v1).mount("/", files);

        let dispatcher = app.handle(DefaultTransform::default()).await.unwrap();
        assert_eq!(dispatcher.mount_prefixes(), vec!["/v1/files", "/"]);
    }

    #[tokio::test]
    async fn test_missing_service_fails_build() {
        struct Database;

        async fn needs_db(_db: Service<Database>) -> HttpResponse {
            HttpResponse::empty()
        }

        let router = Router::new().get("/db", needs_db);
        match router.handle(DefaultTransform::default()).await {
            Err(BuildError::MissingService { path, service, .. }) => {
                assert_eq!(path, "/db");
                assert!(service.ends_with("Database"));
            }
            other => panic!("expected missing service, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_service_effect_runs_once() {
        struct Pool {
            id: usize,
        }

        async fn read(pool: Service<Pool>) -> HttpResponse {
            HttpResponse::text(pool.id.to_string())
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let router = Router::new()
            .get("/a", read)
            .get("/b", read)
            .mount_router("/nested", Router::new().get("/c", read))
            .provide_service_effect(move |_env: Environment| {
                let counted = Arc::clone(&counted);
                async move {
                    Ok::<_, BoxError>(Pool {
                        id: counted.fetch_add(1, Ordering::SeqCst),
                    })
                }
            });

        let dispatcher = router.handle(DefaultTransform::default()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let request = Request::new(Method::GET, Uri::from_static("/nested/c"), HeaderMap::new(), "");
        let response = dispatcher.dispatch("/nested/c", request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.text_body(), Some("0"));
    }

    #[tokio::test]
    async fn test_failing_effect_fails_build() {
        struct Pool;

        let router = Router::new()
            .get("/", ok)
            .provide_service_effect(|_env: Environment| async {
                Err::<Pool, _>("connection refused")
            });
        match router.handle(DefaultTransform::default()).await {
            Err(BuildError::Environment(err)) => {
                assert!(err.to_string().contains("connection refused"));
            }
            other => panic!("expected environment error, got {:?}", other.map(|_| ())),
        }
    }

    async fn echo_name(cx: RouteContext) -> HttpResponse {
        HttpResponse::text(cx.param("name").unwrap_or_default().to_string())
    }

    #[tokio::test]
    async fn test_path_params_are_percent_decoded() {
        let dispatcher = Router::new()
            .get("/files/{name}", echo_name)
            .handle(DefaultTransform::default())
            .await
            .unwrap();

        for (url, expected) in [
            ("/files/hello%20world", "hello world"),
            ("/files/caf%C3%A9", "caf\u{e9}"),
            ("/files/a%2Fb", "a/b"),
            ("/files/plain", "plain"),
        ] {
            let request = Request::new(Method::GET, url.parse().unwrap(), HeaderMap::new(), "");
            let response = dispatcher.dispatch(url, request).await;
            assert_eq!(response.text_body(), Some(expected), "{}", url);
        }
    }

    #[tokio::test]
    async fn test_undecodable_param_is_a_miss() {
        let dispatcher = Router::new()
            .get("/files/{name}", echo_name)
            .handle(DefaultTransform::default())
            .await
            .unwrap();

        let request = Request::new(Method::GET, Uri::from_static("/files/%FF"), HeaderMap::new(), "");
        let response = dispatcher.dispatch("/files/%FF", request).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
