//! Decoding helpers
//!
//! Turn the loosely typed inputs of a request (path parameters, query
//! string, body) into typed values through a [`Schema`]. Schema failures
//! become [`DecodeSchemaError`], which carries the raw input and the
//! request for diagnostics.
//!
//! # Example
//!
//! ```rust,ignore
//! use validator::Validate;
//!
//! #[derive(Deserialize, Validate)]
//! struct CreateUser {
//!     #[validate(length(min = 1, max = 100))]
//!     name: String,
//!     #[validate(email)]
//!     email: String,
//! }
//!
//! async fn create_user(cx: RouteContext) -> Result<HttpResponse, RouteError> {
//!     let user = decode(&cx, &Validated::<CreateUser>::new()).await?;
//!     Ok(HttpResponse::json(&user.name).with_status(StatusCode::CREATED))
//! }
//! ```

use crate::context::RouteContext;
use crate::error::{DecodeSchemaError, FieldError, FormDataKeyNotFound, RequestBodyError, RouteError};
use crate::form::{FormData, FormValue};
use crate::request::Request;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::marker::PhantomData;
use validator::{Validate, ValidationErrors};

/// Decoder from untyped JSON input to a typed value
pub trait Schema: Send + Sync {
    type Output;

    /// Decode `input`, reporting every failure found
    fn decode(&self, input: &Value) -> Result<Self::Output, Vec<FieldError>>;
}

/// Schema backed by serde deserialization
pub struct Json<T>(PhantomData<fn() -> T>);

impl<T> Json<T> {
    pub fn new() -> Self {
        Json(PhantomData)
    }
}

impl<T> Default for Json<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> Schema for Json<T> {
    type Output = T;

    fn decode(&self, input: &Value) -> Result<T, Vec<FieldError>> {
        T::deserialize(input).map_err(|err| vec![deserialize_error(&err)])
    }
}

/// Schema that deserializes with serde, then runs `validator` rules
pub struct Validated<T>(PhantomData<fn() -> T>);

impl<T> Validated<T> {
    pub fn new() -> Self {
        Validated(PhantomData)
    }
}

impl<T> Default for Validated<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned + Validate> Schema for Validated<T> {
    type Output = T;

    fn decode(&self, input: &Value) -> Result<T, Vec<FieldError>> {
        let value = T::deserialize(input).map_err(|err| vec![deserialize_error(&err)])?;
        value.validate().map_err(field_errors)?;
        Ok(value)
    }
}

fn deserialize_error(err: &serde_json::Error) -> FieldError {
    FieldError::new("$", "deserialize", err.to_string())
}

/// Flatten validator errors into field errors
fn field_errors(errors: ValidationErrors) -> Vec<FieldError> {
    let mut field_errors = Vec::new();

    for (field, error_kinds) in errors.field_errors() {
        for error in error_kinds {
            let message = error
                .message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| format!("Validation failed for field '{}'", field));
            field_errors.push(FieldError::new(field.to_string(), error.code.to_string(), message));
        }
    }

    field_errors.sort_by(|a, b| a.field.cmp(&b.field));
    field_errors
}

/// Parse the body according to its content type
///
/// JSON and urlencoded bodies are parsed; any other content type yields
/// `None` without reading the body.
pub async fn parse_body(request: &Request) -> Result<Option<Value>, RequestBodyError> {
    let content_type = request.content_type().unwrap_or_default().to_ascii_lowercase();

    if content_type.contains("application/json") {
        request.json().await.map(Some)
    } else if content_type.contains("application/x-www-form-urlencoded") {
        let body = request.bytes().await?;
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(&body)
            .map_err(|err| RequestBodyError::InvalidForm(err.to_string()))?;
        let object: Map<String, Value> = pairs
            .into_iter()
            .map(|(key, value)| (key, Value::String(value)))
            .collect();
        Ok(Some(Value::Object(object)))
    } else {
        Ok(None)
    }
}

/// Query parameters, overlaid by path parameters, overlaid by the body
///
/// A body that is not a JSON object is returned as-is.
pub async fn body_with_params(cx: &RouteContext) -> Result<Value, RequestBodyError> {
    let mut params = cx.all_params().to_json_map();
    match parse_body(cx.request()).await? {
        Some(Value::Object(body)) => {
            params.extend(body);
            Ok(Value::Object(params))
        }
        Some(body) => Ok(body),
        None => Ok(Value::Object(params)),
    }
}

/// Decode the body merged with the request parameters
pub async fn decode<S: Schema>(cx: &RouteContext, schema: &S) -> Result<S::Output, RouteError> {
    let input = body_with_params(cx).await?;
    run(schema, input, cx.request())
}

/// Decode the path and query parameters; path parameters win
pub fn decode_params<S: Schema>(cx: &RouteContext, schema: &S) -> Result<S::Output, RouteError> {
    let input = Value::Object(cx.all_params().to_json_map());
    run(schema, input, cx.request())
}

/// Decode one form field holding JSON
///
/// Uses `form` when given, otherwise reads the request's form data. The
/// form is handed back so the remaining fields stay usable.
pub async fn decode_json_from_form_data<S: Schema>(
    cx: &RouteContext,
    schema: &S,
    key: &str,
    form: Option<FormData>,
) -> Result<(S::Output, FormData), RouteError> {
    let form = match form {
        Some(form) => form,
        None => cx.request().form_data().await?,
    };

    let raw = match form.get(key) {
        Some(FormValue::Text(text)) => text.as_str(),
        Some(FormValue::File { data, .. }) => {
            std::str::from_utf8(data).map_err(RequestBodyError::from)?
        }
        None => {
            return Err(FormDataKeyNotFound {
                key: key.to_string(),
            }
            .into())
        }
    };
    let input: Value = serde_json::from_str(raw).map_err(RequestBodyError::from)?;

    let value = run(schema, input, cx.request())?;
    Ok((value, form))
}

fn run<S: Schema>(schema: &S, input: Value, request: &Request) -> Result<S::Output, RouteError> {
    schema.decode(&input).map_err(|errors| {
        tracing::debug!(errors = errors.len(), "schema decode failed");
        DecodeSchemaError {
            errors,
            request: request.clone(),
            body: input,
        }
        .into()
    })
}
