//! # Waypoint Core
//!
//! Core engine of waypoint: route composition, dispatch, the request and
//! response model, service environments and the hyper transport adapter.
//!
//! This crate is not meant to be used directly. Use `waypoint-rs` instead.

mod config;
mod context;
pub mod decode;
mod dispatcher;
mod environment;
mod error;
mod extract;
mod form;
mod handler;
mod params;
mod request;
mod response;
mod router;
mod server;
pub mod stream;
#[cfg(any(test, feature = "test-utils"))]
mod test_client;
mod transform;

// Public API
pub use config::{
    ConfigError, Profile, RequestOptions, ServerConfig, DEFAULT_ADDR, DEFAULT_BODY_LIMIT,
    ENV_PREFIX,
};
pub use context::RouteContext;
pub use decode::{Json, Schema, Validated};
pub use dispatcher::{Dispatcher, RequestHandler};
pub use environment::{EnvBuilder, EnvError, Environment, Requirement};
pub use error::{
    BoxError, BuildError, DecodeSchemaError, FieldError, FormDataKeyNotFound, HttpStreamError,
    Rejection, RequestBodyError, RouteError, RouteNotFound,
};
pub use extract::{FromContext, Path, Query, Service};
pub use form::{FormData, FormValue};
pub use handler::{Handler, HandlerFuture, IntoRouteResult};
pub use params::Params;
pub use request::{Body, BodyStream, Request};
pub use response::{early, ByteStream, EarlyResponse, HttpResponse, Payload, RawBody};
pub use router::{Route, RouteConflictError, Router};
pub use server::{request_url, run, serve, serve_with_shutdown, DispatchService};
pub use stream::{BufferedSink, HttpBody, ResponseSink};
#[cfg(any(test, feature = "test-utils"))]
pub use test_client::{TestClient, TestRequest, TestResponse};
pub use transform::{init_tracing, DefaultTransform, Outcome, RequestInfo, Transform};
