//! A single stage in the request pipeline: a name (for introspection and
//! validation) plus a type-erased wrapping function from "the rest of the
//! stack" to "this stage plus the rest of the stack".
//!
//! Every stage operates over the same concrete request/response shape —
//! [`HttpRequest`]/[`HttpResponse`], bodies boxed via
//! [`http_body_util::combinators::BoxBody`] — so stages built from
//! unrelated `tower::Layer`s (the cache layer from `webcore-cache-tower`,
//! a user's own `tower::Layer`, a bare closure) can all be pushed onto one
//! [`crate::stack::MiddlewareStack`] regardless of their native body type.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::BodyExt;
use tower::util::BoxCloneService;
use tower::{Layer, Service, ServiceBuilder, ServiceExt};

/// A boxed, type-erased error, matching the error type every stage's
/// service is erased to.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The request body type every stage operates over.
pub type ReqBody = BoxBody<Bytes, BoxError>;
/// The response body type every stage operates over.
pub type ResBody = BoxBody<Bytes, BoxError>;
/// A request as seen by a compiled middleware stack.
pub type HttpRequest = http::Request<ReqBody>;
/// A response as produced by a compiled middleware stack.
pub type HttpResponse = http::Response<ResBody>;
/// The single concrete service type every stage wraps and produces.
pub type BoxHttpService = BoxCloneService<HttpRequest, HttpResponse, BoxError>;

/// An HTTP-status-carrying error a handler raises instead of returning a
/// response directly, for the inner exception-mapping stage (§4.2) to
/// translate according to its registered handler map.
///
/// Grounded on Starlette's `HTTPException`, which `ExceptionMiddleware`
/// (the original's analogue of this stage) catches by status code.
#[derive(Debug)]
pub struct HttpException {
    /// The status code the registered handler map is keyed by.
    pub status: u16,
    /// A human-readable detail message.
    pub message: String,
}

impl fmt::Display for HttpException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {}: {}", self.status, self.message)
    }
}

impl std::error::Error for HttpException {}

/// Renders an error (an [`HttpException`] or any other stage failure) as a
/// response body. The `webcore` crate's `ErrorRenderer` plays this same
/// role for the `TemplateRenderer`-backed collaborator case; this trait
/// exists here too so this crate doesn't have to depend on `webcore` (the
/// dependency runs the other way).
pub trait ErrorHandler: Send + Sync + 'static {
    /// Render `err` as a full HTTP response.
    fn render(&self, err: &BoxError) -> HttpResponse;
}

/// The fallback [`ErrorHandler`]: `text/plain`, `"{status} {message}"` for
/// an [`HttpException`], `"500 internal server error"` for anything else.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextErrorHandler;

impl ErrorHandler for PlainTextErrorHandler {
    fn render(&self, err: &BoxError) -> HttpResponse {
        let (status, message) = match err.downcast_ref::<HttpException>() {
            Some(exc) => (exc.status, exc.message.clone()),
            None => (500, err.to_string()),
        };
        http::Response::builder()
            .status(status)
            .header(http::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(BodyExt::boxed(http_body_util::Full::new(Bytes::from(
                format!("{status} {message}"),
            ))))
            .expect("status and content-type are always valid")
    }
}

/// A single stage in the compiled pipeline: a name for introspection and
/// [`crate::validate::validate`], and the function that wraps the service
/// representing the rest of the stack.
#[derive(Clone)]
pub struct MiddlewareStage {
    name: String,
    wrap: Arc<dyn Fn(BoxHttpService) -> BoxHttpService + Send + Sync>,
}

impl fmt::Debug for MiddlewareStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareStage").field("name", &self.name).finish_non_exhaustive()
    }
}

impl MiddlewareStage {
    /// Build a stage from a bare wrapping closure.
    pub fn custom(
        name: impl Into<String>,
        wrap: impl Fn(BoxHttpService) -> BoxHttpService + Send + Sync + 'static,
    ) -> Self {
        Self { name: name.into(), wrap: Arc::new(wrap) }
    }

    /// Build a stage from any `tower::Layer` whose output service shares
    /// this crate's request/response/error shape — the general-purpose
    /// escape hatch for plugging in a third-party Tower layer (CORS,
    /// compression, auth, ...) at a specific position.
    pub fn from_layer<L>(name: impl Into<String>, layer: L) -> Self
    where
        L: Layer<BoxHttpService> + Send + Sync + 'static,
        L::Service: Service<HttpRequest, Response = HttpResponse, Error = BoxError>
            + Clone
            + Send
            + 'static,
        <L::Service as Service<HttpRequest>>::Future: Send,
    {
        let layer = Arc::new(layer);
        Self::custom(name, move |inner| layer.layer(inner).boxed_clone())
    }

    /// The stage's name, as it appears in `GatherReport::execution_order`
    /// and in [`crate::validate::validate`]'s diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn apply(&self, inner: BoxHttpService) -> BoxHttpService {
        (self.wrap)(inner)
    }
}

/// Build the `CACHING` position's stage from a live
/// `webcore_cache_tower::CacheLayer`, adapting its `CacheBody` response
/// body into this crate's boxed body so it composes with every other
/// stage. Grounded on §4.2's "the cache sits inside auth/sessions so it
/// can key on authenticated identity if configured" placement note.
pub fn caching_stage<S>(cache_layer: webcore_cache_tower::CacheLayer<S>) -> MiddlewareStage
where
    S: webcore_cache::store::CacheStore,
{
    MiddlewareStage::custom(webcore_middleware_position_name(), move |inner: BoxHttpService| {
        ServiceBuilder::new()
            .layer(cache_layer.clone())
            .map_response(|res: http::Response<webcore_cache_tower::CacheBody>| {
                res.map(|body| body.boxed())
            })
            .service(inner)
            .boxed_clone()
    })
}

fn webcore_middleware_position_name() -> &'static str {
    crate::position::MiddlewarePosition::Caching.name()
}

/// Build the outermost error-handling stage (§4.2 step 1): catches any
/// error the inner stages propagate and renders it with `handler`. On
/// `debug_mode`, the stage also logs the error at `error` level before
/// delegating to `handler` (the original's `ServerErrorMiddleware` emits a
/// traceback to the client in debug mode; this crate leaves that richer
/// rendering to the `TemplateRenderer` collaborator and only logs here).
pub fn error_handling_stage(debug_mode: bool, handler: Arc<dyn ErrorHandler>) -> MiddlewareStage {
    MiddlewareStage::custom("ErrorHandlingMiddleware", move |inner: BoxHttpService| {
        let handler = handler.clone();
        tower::service_fn(move |req: HttpRequest| {
            let mut inner = inner.clone();
            let handler = handler.clone();
            async move {
                match inner.call(req).await {
                    Ok(res) => Ok::<HttpResponse, BoxError>(res),
                    Err(err) => {
                        if debug_mode {
                            log::error!("unhandled error reached the top of the stack: {err}");
                        }
                        Ok(handler.render(&err))
                    }
                }
            }
        })
        .boxed_clone()
    })
}

/// Build the inner exception-mapping stage (§4.2 step 4): converts an
/// [`HttpException`] raised by the router/handler into a response using
/// `handlers` (keyed by status code), falling back to `default` for an
/// unregistered status or any other error type (which then propagates
/// outward to the error-handling stage).
pub fn exception_mapping_stage(
    handlers: std::collections::HashMap<u16, Arc<dyn ErrorHandler>>,
    default: Arc<dyn ErrorHandler>,
) -> MiddlewareStage {
    MiddlewareStage::custom("ExceptionMappingMiddleware", move |inner: BoxHttpService| {
        let handlers = handlers.clone();
        let default = default.clone();
        tower::service_fn(move |req: HttpRequest| {
            let mut inner = inner.clone();
            let handlers = handlers.clone();
            let default = default.clone();
            async move {
                match inner.call(req).await {
                    Ok(res) => Ok::<HttpResponse, BoxError>(res),
                    Err(err) => match err.downcast_ref::<HttpException>() {
                        Some(exc) => {
                            let handler = handlers.get(&exc.status).unwrap_or(&default);
                            Ok(handler.render(&err))
                        }
                        None => Err(err),
                    },
                }
            }
        })
        .boxed_clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::Full;
    use tower::ServiceExt;

    fn ok_service(body: &'static str) -> BoxHttpService {
        tower::service_fn(move |_req: HttpRequest| async move {
            Ok::<HttpResponse, BoxError>(
                http::Response::builder()
                    .status(200)
                    .body(BodyExt::boxed(Full::new(Bytes::from(body))))
                    .unwrap(),
            )
        })
        .boxed_clone()
    }

    fn failing_service(err: BoxError) -> BoxHttpService {
        tower::service_fn(move |_req: HttpRequest| {
            let err = err.to_string();
            async move { Err::<HttpResponse, BoxError>(err.into()) }
        })
        .boxed_clone()
    }

    fn req() -> HttpRequest {
        http::Request::get("/x").body(BodyExt::boxed(Full::new(Bytes::new()))).unwrap()
    }

    #[tokio::test]
    async fn error_handling_stage_converts_failure_to_response() {
        let stage = error_handling_stage(false, Arc::new(PlainTextErrorHandler));
        let mut svc = stage.apply(failing_service("boom".into()));
        let res = svc.ready().await.unwrap().call(req()).await.unwrap();
        assert_eq!(res.status(), 500);
    }

    #[tokio::test]
    async fn exception_mapping_stage_uses_registered_handler_for_status() {
        struct TeapotHandler;
        impl ErrorHandler for TeapotHandler {
            fn render(&self, _err: &BoxError) -> HttpResponse {
                http::Response::builder()
                    .status(418)
                    .body(BodyExt::boxed(Full::new(Bytes::from("teapot"))))
                    .unwrap()
            }
        }
        let mut handlers: std::collections::HashMap<u16, Arc<dyn ErrorHandler>> =
            std::collections::HashMap::new();
        handlers.insert(418, Arc::new(TeapotHandler));
        let stage = exception_mapping_stage(handlers, Arc::new(PlainTextErrorHandler));

        let failing = tower::service_fn(|_req: HttpRequest| async move {
            Err::<HttpResponse, BoxError>(Box::new(HttpException {
                status: 418,
                message: "I'm a teapot".into(),
            }))
        })
        .boxed_clone();

        let mut svc = stage.apply(failing);
        let res = svc.ready().await.unwrap().call(req()).await.unwrap();
        assert_eq!(res.status(), 418);
    }

    #[tokio::test]
    async fn exception_mapping_stage_propagates_unregistered_status_as_default() {
        let stage =
            exception_mapping_stage(std::collections::HashMap::new(), Arc::new(PlainTextErrorHandler));
        let failing = tower::service_fn(|_req: HttpRequest| async move {
            Err::<HttpResponse, BoxError>(Box::new(HttpException {
                status: 404,
                message: "not found".into(),
            }))
        })
        .boxed_clone();
        let mut svc = stage.apply(failing);
        let res = svc.ready().await.unwrap().call(req()).await.unwrap();
        assert_eq!(res.status(), 404);
    }

    #[tokio::test]
    async fn custom_stage_wraps_inner_service() {
        let stage = MiddlewareStage::custom("Noop", |inner| inner);
        let mut svc = stage.apply(ok_service("hi"));
        let res = svc.ready().await.unwrap().call(req()).await.unwrap();
        assert_eq!(res.status(), 200);
    }
}
