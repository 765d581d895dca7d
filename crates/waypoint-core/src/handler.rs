//! Handler trait and utilities

use crate::context::RouteContext;
use crate::environment::{Environment, Requirement};
use crate::error::Rejection;
use crate::extract::FromContext;
use crate::response::HttpResponse;
use futures_util::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

/// Future returned by every handler
pub type HandlerFuture = BoxFuture<'static, Result<HttpResponse, Rejection>>;

/// Trait representing an async handler function
///
/// Implemented for async functions taking up to six [`FromContext`]
/// arguments and returning anything that implements [`IntoRouteResult`].
pub trait Handler<T>: Clone + Send + Sync + Sized + 'static {
    fn call(self, cx: RouteContext, env: Environment) -> HandlerFuture;

    /// Services the handler's extractors need
    fn requirements(out: &mut Vec<Requirement>);
}

/// Conversion of a handler's return value into its outcome
pub trait IntoRouteResult {
    fn into_route_result(self) -> Result<HttpResponse, Rejection>;
}

impl IntoRouteResult for HttpResponse {
    fn into_route_result(self) -> Result<HttpResponse, Rejection> {
        Ok(self)
    }
}

impl<E: Into<Rejection>> IntoRouteResult for Result<HttpResponse, E> {
    fn into_route_result(self) -> Result<HttpResponse, Rejection> {
        self.map_err(Into::into)
    }
}

macro_rules! impl_handler {
    ($($ty:ident),*) => {
        #[allow(non_snake_case, unused_variables)]
        impl<F, Fut, Res, $($ty,)*> Handler<($($ty,)*)> for F
        where
            F: FnOnce($($ty),*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = Res> + Send + 'static,
            Res: IntoRouteResult,
            $($ty: FromContext,)*
        {
            fn call(self, cx: RouteContext, env: Environment) -> HandlerFuture {
                Box::pin(async move {
                    $(let $ty = <$ty as FromContext>::from_context(&cx, &env)?;)*
                    self($($ty),*).await.into_route_result()
                })
            }

            fn requirements(out: &mut Vec<Requirement>) {
                $(<$ty as FromContext>::requirements(out);)*
            }
        }
    };
}

impl_handler!();
impl_handler!(T1);
impl_handler!(T1, T2);
impl_handler!(T1, T2, T3);
impl_handler!(T1, T2, T3, T4);
impl_handler!(T1, T2, T3, T4, T5);
impl_handler!(T1, T2, T3, T4, T5, T6);

type ErasedCall = dyn Fn(RouteContext, Environment) -> HandlerFuture + Send + Sync;

/// Type-erased handler stored in routes
#[derive(Clone)]
pub(crate) struct BoxedHandler {
    call: Arc<ErasedCall>,
    requirements: Arc<[Requirement]>,
}

impl BoxedHandler {
    pub(crate) fn new<H, T>(handler: H) -> Self
    where
        H: Handler<T>,
        T: 'static,
    {
        let mut requirements = Vec::new();
        H::requirements(&mut requirements);
        Self {
            call: Arc::new(move |cx, env| Handler::<T>::call(handler.clone(), cx, env)),
            requirements: requirements.into(),
        }
    }

    pub(crate) fn call(&self, cx: RouteContext, env: Environment) -> HandlerFuture {
        (self.call)(cx, env)
    }

    pub(crate) fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RouteError;
    use crate::extract::Service;
    use crate::params::Params;
    use crate::request::Request;
    use crate::response::early;
    use http::{HeaderMap, Method, StatusCode, Uri};

    fn context() -> RouteContext {
        RouteContext::new(
            Request::new(Method::GET, Uri::from_static("/"), HeaderMap::new(), ""),
            Params::new(),
            Params::new(),
        )
    }

    struct Name(&'static str);

    #[tokio::test]
    async fn test_zero_arg_handler() {
        async fn hello() -> HttpResponse {
            HttpResponse::text("hello")
        }

        let handler = BoxedHandler::new(hello);
        let response = handler.call(context(), Environment::new()).await.unwrap();
        assert_eq!(response.text_body(), Some("hello"));
        assert!(handler.requirements().is_empty());
    }

    #[tokio::test]
    async fn test_extractor_arguments() {
        async fn greet(cx: RouteContext, name: Service<Name>) -> HttpResponse {
            HttpResponse::text(format!("{} at {}", name.0.0, cx.request().path()))
        }

        let handler = BoxedHandler::new(greet);
        assert_eq!(handler.requirements(), &[Requirement::of::<Name>()]);

        let env = Environment::new().with(Name("ada"));
        let response = handler.call(context(), env).await.unwrap();
        assert_eq!(response.text_body(), Some("ada at /"));
    }

    #[tokio::test]
    async fn test_result_handlers_propagate_rejections() {
        async fn fails() -> Result<HttpResponse, RouteError> {
            Err(RouteError::handler("nope"))
        }
        async fn exits_early() -> Result<HttpResponse, Rejection> {
            early(HttpResponse::empty().with_status(StatusCode::ACCEPTED))
        }

        let result = BoxedHandler::new(fails)
            .call(context(), Environment::new())
            .await;
        assert!(matches!(result, Err(Rejection::Error(RouteError::Handler(_)))));

        let result = BoxedHandler::new(exits_early)
            .call(context(), Environment::new())
            .await;
        assert!(matches!(result, Err(Rejection::Early(_))));
    }

    #[tokio::test]
    async fn test_closure_handler() {
        let prefix = String::from(">> ");
        let handler = BoxedHandler::new(move |cx: RouteContext| {
            let prefix = prefix.clone();
            async move { HttpResponse::text(format!("{}{}", prefix, cx.request().path())) }
        });

        let response = handler.call(context(), Environment::new()).await.unwrap();
        assert_eq!(response.text_body(), Some(">> /"));
    }
}
