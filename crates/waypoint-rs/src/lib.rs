//! # Waypoint
//!
//! Composable HTTP routing for async Rust.
//!
//! Routers are persistent values: every builder call returns a new router
//! sharing structure with the old one, so partial applications can be
//! reused, combined and nested freely. A router is compiled once into a
//! [`Dispatcher`], which matches exact routes, delegates whole prefixes
//! to mounted sub-applications and runs every outcome through a single
//! [`Transform`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use waypoint_rs::prelude::*;
//!
//! async fn hello(Path(name): Path<String>) -> HttpResponse {
//!     HttpResponse::text(format!("Hello, {}!", name))
//! }
//!
//! #[tokio::main]
//! async fn main() -> std::result::Result<(), BoxError> {
//!     init_tracing();
//!
//!     let dispatcher = Router::new()
//!         .get("/hello/{name}", hello)
//!         .handle(DefaultTransform::default())
//!         .await?;
//!
//!     waypoint_rs::run(dispatcher, &ServerConfig::from_env()?).await
//! }
//! ```
//!
//! ## Features
//!
//! - **Persistent builders**: `get`, `mount`, `combine_with` never mutate
//!   the router they are called on
//! - **Scoped services**: `provide_service` makes a value available to the
//!   routes of one router and everything nested below it
//! - **Mounts**: delegate a prefix to any [`RequestHandler`], including
//!   another compiled [`Dispatcher`]
//! - **Streaming**: request bodies and responses can be streamed chunk by
//!   chunk, with failures surfaced to the transport
//!
//! ## Optional Features
//!
//! - `test-utils` - in-process `TestClient` for integration tests
//!
//! ```toml
//! [dependencies]
//! waypoint-rs = { version = "0.1", features = ["test-utils"] }
//! ```

// Re-export core functionality
pub use waypoint_core::*;

// Re-export crates handlers commonly need
pub use http;
pub use serde;
pub use serde_json;
pub use tokio;
pub use tracing;
pub use validator;

/// Prelude module - import everything you need with `use waypoint_rs::prelude::*`
pub mod prelude {
    pub use waypoint_core::{
        // Decoding
        decode::{body_with_params, decode, decode_json_from_form_data, decode_params},
        // Responses
        early,
        // Logging
        init_tracing,
        BoxError,
        BuildError,
        DefaultTransform,
        // Dispatch
        Dispatcher,
        // Environments
        Environment,
        FormData,
        FormValue,
        HttpResponse,
        Json,
        Params,
        // Extractors
        Path,
        Query,
        Rejection,
        Request,
        RequestHandler,
        RouteContext,
        // Errors
        RouteError,
        // Router
        Router,
        Schema,
        // Configuration
        ServerConfig,
        Service,
        Transform,
        Validated,
    };

    // Status codes and methods for responses and routes
    pub use http::{Method, StatusCode};

    // Re-export validation - use validator derive macro directly
    pub use validator::Validate;

    // Re-export commonly used external types
    pub use serde::{Deserialize, Serialize};
    pub use tracing::{debug, error, info, trace, warn};
}
