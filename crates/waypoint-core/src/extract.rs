//! Extractors for waypoint
//!
//! Handler arguments are built from the matched [`RouteContext`] and the
//! route's [`Environment`]. Extraction never touches the request body;
//! body access stays explicit through the request accessors and the
//! [`decode`](crate::decode) helpers, so handlers decide when the single
//! read happens.

use crate::context::RouteContext;
use crate::environment::{Environment, Requirement};
use crate::error::{DecodeSchemaError, FieldError, Rejection, RouteError};
use crate::request::Request;
use serde::de::DeserializeOwned;
use std::ops::Deref;
use std::str::FromStr;
use std::sync::Arc;

/// Trait for types built from the route context before a handler runs
pub trait FromContext: Sized + Send + 'static {
    fn from_context(cx: &RouteContext, env: &Environment) -> Result<Self, Rejection>;

    /// Services this extractor needs from the environment
    ///
    /// Checked when the router is built, so a missing provision fails the
    /// build instead of the request.
    fn requirements(_out: &mut Vec<Requirement>) {}
}

impl FromContext for RouteContext {
    fn from_context(cx: &RouteContext, _env: &Environment) -> Result<Self, Rejection> {
        Ok(cx.clone())
    }
}

impl FromContext for Request {
    fn from_context(cx: &RouteContext, _env: &Environment) -> Result<Self, Rejection> {
        Ok(cx.request().clone())
    }
}

impl FromContext for Environment {
    fn from_context(_cx: &RouteContext, env: &Environment) -> Result<Self, Rejection> {
        Ok(env.clone())
    }
}

/// Service extractor
///
/// Looks up a service provided to the route's router.
///
/// # Example
///
/// ```rust,ignore
/// struct Users { /* ... */ }
///
/// async fn list_users(users: Service<Users>) -> HttpResponse {
///     HttpResponse::json(&users.all())
/// }
///
/// let router = Router::new()
///     .get("/users", list_users)
///     .provide_service(Users::default());
/// ```
#[derive(Debug)]
pub struct Service<T>(pub Arc<T>);

impl<T> Clone for Service<T> {
    fn clone(&self) -> Self {
        Service(Arc::clone(&self.0))
    }
}

impl<T: Send + Sync + 'static> FromContext for Service<T> {
    fn from_context(_cx: &RouteContext, env: &Environment) -> Result<Self, Rejection> {
        env.get::<T>()
            .map(Service)
            .ok_or_else(|| RouteError::MissingService(std::any::type_name::<T>()).into())
    }

    fn requirements(out: &mut Vec<Requirement>) {
        out.push(Requirement::of::<T>());
    }
}

impl<T> Deref for Service<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Path parameter extractor
///
/// Parses the first path parameter of the matched pattern.
///
/// ```rust,ignore
/// // GET /users/{id}
/// async fn get_user(Path(id): Path<u64>) -> HttpResponse { /* ... */ }
/// ```
#[derive(Debug, Clone)]
pub struct Path<T>(pub T);

impl<T> FromContext for Path<T>
where
    T: FromStr + Send + 'static,
    T::Err: std::fmt::Display,
{
    fn from_context(cx: &RouteContext, _env: &Environment) -> Result<Self, Rejection> {
        let Some((name, value)) = cx.params().iter().next() else {
            return Err(RouteError::handler("route has no path parameters").into());
        };
        value.parse::<T>().map(Path).map_err(|err| {
            DecodeSchemaError {
                errors: vec![FieldError::new(name, "parse", err.to_string())],
                request: cx.request().clone(),
                body: serde_json::Value::Object(cx.params().to_json_map()),
            }
            .into()
        })
    }
}

impl<T> Deref for Path<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Query string extractor
///
/// ```rust,ignore
/// #[derive(Deserialize)]
/// struct Pagination {
///     page: Option<u32>,
/// }
///
/// async fn list(Query(page): Query<Pagination>) -> HttpResponse { /* ... */ }
/// ```
#[derive(Debug, Clone)]
pub struct Query<T>(pub T);

impl<T: DeserializeOwned + Send + 'static> FromContext for Query<T> {
    fn from_context(cx: &RouteContext, _env: &Environment) -> Result<Self, Rejection> {
        let query = cx.request().query().unwrap_or("");
        serde_urlencoded::from_str(query).map(Query).map_err(|err| {
            DecodeSchemaError {
                errors: vec![FieldError::new("$query", "deserialize", err.to_string())],
                request: cx.request().clone(),
                body: serde_json::Value::Object(cx.search_params().to_json_map()),
            }
            .into()
        })
    }
}

impl<T> Deref for Query<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Optional extractor wrapper
///
/// Returns `None` instead of rejecting, and declares no requirements.
impl<T: FromContext> FromContext for Option<T> {
    fn from_context(cx: &RouteContext, env: &Environment) -> Result<Self, Rejection> {
        Ok(T::from_context(cx, env).ok())
    }
}
