//! Per-request route context
//!
//! Built by the dispatcher for each matched route: the request plus the
//! path parameters captured by the route pattern and the parsed search
//! parameters of the request URL.

use crate::error::RequestBodyError;
use crate::form::FormData;
use crate::params::Params;
use crate::request::{BodyStream, Request};

#[derive(Debug, Clone)]
pub struct RouteContext {
    request: Request,
    params: Params,
    search_params: Params,
}

impl RouteContext {
    pub fn new(request: Request, params: Params, search_params: Params) -> Self {
        Self {
            request,
            params,
            search_params,
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Path parameters captured by the route pattern
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Query string parameters, last value wins for repeated keys
    pub fn search_params(&self) -> &Params {
        &self.search_params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    pub fn search_param(&self, name: &str) -> Option<&str> {
        self.search_params.get(name)
    }

    /// Search parameters with path parameters laid over them
    pub fn all_params(&self) -> Params {
        self.search_params.merged(&self.params)
    }

    pub async fn text(&self) -> Result<String, RequestBodyError> {
        self.request.text().await
    }

    pub async fn json(&self) -> Result<serde_json::Value, RequestBodyError> {
        self.request.json().await
    }

    pub async fn form_data(&self) -> Result<FormData, RequestBodyError> {
        self.request.form_data().await
    }

    pub async fn stream(&self) -> Result<BodyStream, RequestBodyError> {
        self.request.stream().await
    }

    pub fn into_request(self) -> Request {
        self.request
    }
}
