//! Tower middleware wiring [`webcore_cache::CacheEngine`] into a live
//! request/response pipeline.
//!
//! This is the Tower-level half of the caching layer described in
//! `webcore-cache`'s crate docs: it owns the HTTP-framework-specific bits
//! (reading `http::Request`/`http::Response`, collecting bodies, writing
//! `X-Cache`) and delegates every decision about *whether* to cache to the
//! storage-agnostic [`CacheEngine`].
//!
//! # Example
//!
//! ```
//! use http::{Request, Response};
//! use http_body_util::Full;
//! use bytes::Bytes;
//! use tower::{Service, Layer};
//! use webcore_cache::{CacheEngine, store::MemoryStore};
//! use webcore_cache_tower::CacheLayer;
//!
//! # tokio_test::block_on(async {
//! let engine = CacheEngine::new("myapp", MemoryStore::new());
//! let layer = CacheLayer::new(engine);
//!
//! let service = tower::service_fn(|_req: Request<Full<Bytes>>| async {
//!     Ok::<_, std::convert::Infallible>(
//!         Response::builder()
//!             .status(200)
//!             .body(Full::new(Bytes::from("hello")))
//!             .unwrap(),
//!     )
//! });
//!
//! let mut cached = layer.layer(service);
//! # let _ = &mut cached;
//! # });
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

use std::error::Error as StdError;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use http::{HeaderValue, Request, Response};
use http_body::{Body as HttpBody, Frame};
use http_body_util::{BodyExt, Full};
use tower::{Layer, Service};

use webcore_cache::headers::{OrderedHeaders, SerializedResponse};
use webcore_cache::store::CacheStore;
use webcore_cache::{CacheEngine, CacheError, CacheableRequest};

/// A boxed, type-erased error, matching how downstream Tower services in
/// this workspace report failures.
pub type BoxError = Box<dyn StdError + Send + Sync>;

const INVALIDATING_METHODS: &[&str] = webcore_cache::INVALIDATING_METHODS;
const CACHABLE_METHODS: &[&str] = webcore_cache::CACHABLE_METHODS;

/// Marker inserted into a request's extensions the first time it passes
/// through a [`CacheService`].
///
/// Finding one already present means a second cache layer is wrapped
/// around the first *in the same scope* — the "duplicate caching"
/// configuration error from §4.1's duplicate-detection rule. This is the
/// Tower-level stand-in for the original's per-request `cache-sentinel`
/// context flag.
#[derive(Debug, Clone, Copy)]
struct CacheSentinel;

/// Tower layer applying [`CacheEngine`]'s four-outcome decision table
/// (not-cacheable-by-method, not-cacheable-by-rule, hit, miss) to the
/// wrapped service.
///
/// Place this layer wherever the compiled middleware stack's `CACHING`
/// position falls (see `webcore-middleware`); it should sit inside
/// authentication/sessions so it can see the identity those stages
/// establish, per §4.2.
#[derive(Clone)]
pub struct CacheLayer<S: CacheStore> {
    engine: Arc<CacheEngine<S>>,
}

impl<S: CacheStore> CacheLayer<S> {
    /// Wrap a built [`CacheEngine`] as a Tower layer.
    pub fn new(engine: CacheEngine<S>) -> Self {
        Self { engine: Arc::new(engine) }
    }
}

impl<Svc, S: CacheStore> Layer<Svc> for CacheLayer<S> {
    type Service = CacheService<Svc, S>;

    fn layer(&self, inner: Svc) -> Self::Service {
        CacheService { inner, engine: self.engine.clone() }
    }
}

/// The [`CacheLayer`]'s service half: does the actual read/forward/store
/// dance around `inner` for each request.
#[derive(Clone)]
pub struct CacheService<Svc, S: CacheStore> {
    inner: Svc,
    engine: Arc<CacheEngine<S>>,
}

/// The response body type this service always produces: the original
/// body, fully buffered, since every outcome (hit replay, miss-then-store,
/// pass-through) needs the bytes in hand before the wrapper can decide
/// what header to stamp on the way out.
#[derive(Debug)]
pub struct CacheBody(Option<Bytes>);

impl HttpBody for CacheBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.0.take() {
            Some(bytes) if !bytes.is_empty() => Poll::Ready(Some(Ok(Frame::data(bytes)))),
            _ => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        self.0.as_ref().is_none_or(Bytes::is_empty)
    }
}

impl<Svc, ReqBody, ResBody, S> Service<Request<ReqBody>> for CacheService<Svc, S>
where
    Svc: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    Svc::Error: Into<BoxError>,
    Svc::Future: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: HttpBody + Send + 'static,
    ResBody::Data: Send,
    ResBody::Error: Into<BoxError>,
    S: CacheStore,
{
    type Response = Response<CacheBody>;
    type Error = BoxError;
    type Future =
        Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let engine = self.engine.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            if req.extensions().get::<CacheSentinel>().is_some() {
                return Err(Box::new(CacheError::DuplicateCaching) as BoxError);
            }
            req.extensions_mut().insert(CacheSentinel);

            let method = req.method().as_str().to_ascii_uppercase();
            let url = req
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| req.uri().path().to_string());
            let path = req.uri().path().to_string();
            let has_cookies = req.headers().contains_key(http::header::COOKIE);
            let no_cache_requested = req
                .headers()
                .get("x-no-cache")
                .and_then(|v| v.to_str().ok())
                .map(|v| v == "1")
                .unwrap_or(false);
            let req_headers = ordered_headers_from(req.headers());

            let cache_request =
                CacheableRequest { method: method.clone(), path, url, headers: req_headers, has_cookies };

            if INVALIDATING_METHODS.contains(&method.as_str()) {
                let response = inner.call(req).await.map_err(Into::into)?;
                let (parts, body) = response.into_parts();
                let bytes = collect_body(body).await?;
                if parts.status.is_success() || parts.status.is_redirection() {
                    if let Err(err) = engine.delete_from_cache(&cache_request).await {
                        log::warn!("cache invalidation failed for mutating request: {err}");
                    }
                }
                return Ok(Response::from_parts(parts, CacheBody(Some(bytes))));
            }

            if !CACHABLE_METHODS.contains(&method.as_str()) || no_cache_requested {
                let response = inner.call(req).await.map_err(Into::into)?;
                let (parts, body) = response.into_parts();
                let bytes = collect_body(body).await?;
                return Ok(Response::from_parts(parts, CacheBody(Some(bytes))));
            }

            match engine.get_from_cache(&cache_request).await {
                Ok(Some(hit)) => return Ok(build_response(hit)),
                Ok(None) => {}
                Err(CacheError::RequestNotCachable { reason }) => {
                    log::debug!("cache bypass: {reason}");
                    let response = inner.call(req).await.map_err(Into::into)?;
                    let (parts, body) = response.into_parts();
                    let bytes = collect_body(body).await?;
                    return Ok(Response::from_parts(parts, CacheBody(Some(bytes))));
                }
                Err(err) => {
                    log::warn!("cache lookup failed, degrading to miss: {err}");
                }
            }

            let response = inner.call(req).await.map_err(Into::into)?;
            let (parts, body) = response.into_parts();
            let (bytes, frame_count) = collect_body_counting(body).await?;

            if frame_count > 1 {
                log::debug!("response body streamed in multiple chunks, bypassing cache store");
                return Ok(Response::from_parts(parts, CacheBody(Some(bytes))));
            }

            let vary_value =
                parts.headers.get(http::header::VARY).and_then(|v| v.to_str().ok()).map(String::from);
            let serialized = SerializedResponse::new(
                parts.status.as_u16(),
                ordered_headers_from(&parts.headers),
                bytes.to_vec(),
            );

            match engine.set_in_cache(&cache_request, serialized, vary_value.as_deref()).await {
                Ok(stored) => Ok(build_response(stored)),
                Err(CacheError::ResponseNotCachable { reason }) => {
                    log::debug!("response not cached: {reason}");
                    Ok(Response::from_parts(parts, CacheBody(Some(bytes))))
                }
                Err(err) => {
                    log::warn!("cache store failed, response served uncached: {err}");
                    Ok(Response::from_parts(parts, CacheBody(Some(bytes))))
                }
            }
        })
    }
}

fn ordered_headers_from(headers: &http::HeaderMap) -> OrderedHeaders {
    let mut out = OrderedHeaders::new();
    for (name, value) in headers.iter() {
        if let Ok(value) = value.to_str() {
            out.append(name.as_str(), value);
        }
    }
    out
}

fn build_response(serialized: SerializedResponse) -> Response<CacheBody> {
    let mut builder = Response::builder().status(serialized.status);
    for (name, value) in serialized.headers.iter() {
        if let Ok(value) = HeaderValue::from_str(value) {
            builder = builder.header(name, value);
        }
    }
    builder.body(CacheBody(Some(Bytes::from(serialized.body)))).unwrap_or_else(|_| {
        Response::builder().status(500).body(CacheBody(Some(Bytes::new()))).unwrap()
    })
}

async fn collect_body<B>(body: B) -> Result<Bytes, BoxError>
where
    B: HttpBody,
    B::Error: Into<BoxError>,
{
    body.collect().await.map(|collected| collected.to_bytes()).map_err(Into::into)
}

/// Collects a body to bytes while counting how many non-empty data frames
/// it yielded. More than one is this layer's signal for the streaming
/// bypass (§4.1 "Streaming responses").
async fn collect_body_counting<B>(mut body: B) -> Result<(Bytes, usize), BoxError>
where
    B: HttpBody + Unpin,
    B::Data: Send,
    B::Error: Into<BoxError>,
{
    use bytes::BytesMut;
    use std::future::poll_fn;

    let mut buf = BytesMut::new();
    let mut frame_count = 0usize;
    loop {
        let frame = poll_fn(|cx| Pin::new(&mut body).poll_frame(cx)).await;
        match frame {
            Some(Ok(frame)) => {
                if let Ok(data) = frame.into_data() {
                    if !data.as_ref().is_empty() {
                        frame_count += 1;
                        buf.extend_from_slice(data.as_ref());
                    }
                }
            }
            Some(Err(err)) => return Err(err.into()),
            None => break,
        }
    }
    Ok((buf.freeze(), frame_count))
}

/// Convenience alias used by callers constructing a simple, buffered
/// response body (e.g. in tests), matching the shape `CacheBody` collapses
/// everything into anyway.
pub type SimpleBody = Full<Bytes>;

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::{Service, ServiceExt};
    use webcore_cache::store::MemoryStore;

    fn engine() -> CacheEngine<MemoryStore> {
        CacheEngine::new("app", MemoryStore::new())
    }

    #[tokio::test]
    async fn miss_then_hit_sets_x_cache_header() {
        let layer = CacheLayer::new(engine());
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let mut service = layer.layer(tower::service_fn(move |_req: Request<Full<Bytes>>| {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, std::convert::Infallible>(
                    Response::builder()
                        .status(200)
                        .body(Full::new(Bytes::from("A")))
                        .unwrap(),
                )
            }
        }));

        let req = Request::get("/page").body(Full::new(Bytes::new())).unwrap();
        let res = service.ready().await.unwrap().call(req).await.unwrap();
        assert_eq!(res.headers().get("x-cache").unwrap(), "miss");

        let req2 = Request::get("/page").body(Full::new(Bytes::new())).unwrap();
        let res2 = service.ready().await.unwrap().call(req2).await.unwrap();
        assert_eq!(res2.headers().get("x-cache").unwrap(), "hit");
        assert_eq!(calls.load(Ordering::SeqCst), 1, "handler should not run on hit");
    }

    #[tokio::test]
    async fn delete_invalidates_after_mutating_method() {
        let eng = engine();
        let layer = CacheLayer::new(eng);
        let mut service = layer.layer(tower::service_fn(|req: Request<Full<Bytes>>| async move {
            let status = if req.method() == http::Method::DELETE { 204 } else { 200 };
            Ok::<_, std::convert::Infallible>(
                Response::builder().status(status).body(Full::new(Bytes::from("v1"))).unwrap(),
            )
        }));

        let get1 = Request::get("/item/7").body(Full::new(Bytes::new())).unwrap();
        let res1 = service.ready().await.unwrap().call(get1).await.unwrap();
        assert_eq!(res1.headers().get("x-cache").unwrap(), "miss");

        let get1b = Request::get("/item/7").body(Full::new(Bytes::new())).unwrap();
        let res1b = service.ready().await.unwrap().call(get1b).await.unwrap();
        assert_eq!(res1b.headers().get("x-cache").unwrap(), "hit");

        let delete = Request::delete("/item/7").body(Full::new(Bytes::new())).unwrap();
        service.ready().await.unwrap().call(delete).await.unwrap();

        let get2 = Request::get("/item/7").body(Full::new(Bytes::new())).unwrap();
        let res2 = service.ready().await.unwrap().call(get2).await.unwrap();
        assert_eq!(res2.headers().get("x-cache").unwrap(), "miss");
    }

    #[tokio::test]
    async fn x_no_cache_header_bypasses_lookup_and_store() {
        let layer = CacheLayer::new(engine());
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let mut service = layer.layer(tower::service_fn(move |_req: Request<Full<Bytes>>| {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, std::convert::Infallible>(
                    Response::builder().status(200).body(Full::new(Bytes::from("A"))).unwrap(),
                )
            }
        }));

        for _ in 0..2 {
            let req = Request::get("/page")
                .header("x-no-cache", "1")
                .body(Full::new(Bytes::new()))
                .unwrap();
            let res = service.ready().await.unwrap().call(req).await.unwrap();
            assert!(res.headers().get("x-cache").is_none());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2, "handler must run every time");
    }

    #[tokio::test]
    async fn post_is_forwarded_unchanged_and_never_cached() {
        let layer = CacheLayer::new(engine());
        let mut service = layer.layer(tower::service_fn(|_req: Request<Full<Bytes>>| async {
            Ok::<_, std::convert::Infallible>(
                Response::builder().status(201).body(Full::new(Bytes::from("created"))).unwrap(),
            )
        }));
        let req = Request::post("/items").body(Full::new(Bytes::new())).unwrap();
        let res = service.ready().await.unwrap().call(req).await.unwrap();
        assert!(res.headers().get("x-cache").is_none());
    }

    #[tokio::test]
    async fn non_cacheable_status_is_not_stored() {
        let layer = CacheLayer::new(engine());
        let mut service = layer.layer(tower::service_fn(|_req: Request<Full<Bytes>>| async {
            Ok::<_, std::convert::Infallible>(
                Response::builder().status(418).body(Full::new(Bytes::from("teapot"))).unwrap(),
            )
        }));
        let req = Request::get("/x").body(Full::new(Bytes::new())).unwrap();
        let res = service.ready().await.unwrap().call(req).await.unwrap();
        assert!(res.headers().get("x-cache").is_none());

        let req2 = Request::get("/x").body(Full::new(Bytes::new())).unwrap();
        let res2 = service.ready().await.unwrap().call(req2).await.unwrap();
        assert!(res2.headers().get("x-cache").is_none(), "status 418 must never be served from cache");
    }

    #[tokio::test]
    async fn vary_differentiates_cache_entries() {
        let layer = CacheLayer::new(engine());
        let mut service = layer.layer(tower::service_fn(|req: Request<Full<Bytes>>| async move {
            let accept = req
                .headers()
                .get("accept")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            let body = if accept == "a" { "X" } else { "Y" };
            Ok::<_, std::convert::Infallible>(
                Response::builder()
                    .status(200)
                    .header("vary", "Accept")
                    .body(Full::new(Bytes::from(body)))
                    .unwrap(),
            )
        }));

        let req_a = Request::get("/p").header("accept", "a").body(Full::new(Bytes::new())).unwrap();
        let res_a = service.ready().await.unwrap().call(req_a).await.unwrap();
        let body_a = collect_body(res_a.into_body()).await.unwrap();
        assert_eq!(body_a, Bytes::from("X"));

        let req_b = Request::get("/p").header("accept", "b").body(Full::new(Bytes::new())).unwrap();
        let res_b = service.ready().await.unwrap().call(req_b).await.unwrap();
        assert_eq!(res_b.headers().get("x-cache").unwrap(), "miss");
        let body_b = collect_body(res_b.into_body()).await.unwrap();
        assert_eq!(body_b, Bytes::from("Y"));

        let req_a2 = Request::get("/p").header("accept", "a").body(Full::new(Bytes::new())).unwrap();
        let res_a2 = service.ready().await.unwrap().call(req_a2).await.unwrap();
        assert_eq!(res_a2.headers().get("x-cache").unwrap(), "hit");
        let body_a2 = collect_body(res_a2.into_body()).await.unwrap();
        assert_eq!(body_a2, Bytes::from("X"));
    }

    #[tokio::test]
    async fn duplicate_cache_layer_in_same_scope_is_rejected() {
        let layer = CacheLayer::new(engine());
        let inner_layer = CacheLayer::new(engine());
        let inner_service =
            inner_layer.layer(tower::service_fn(|_req: Request<Full<Bytes>>| async {
                Ok::<_, std::convert::Infallible>(
                    Response::builder().status(200).body(Full::new(Bytes::from("A"))).unwrap(),
                )
            }));
        let mut service = layer.layer(inner_service);

        let req = Request::get("/x").body(Full::new(Bytes::new())).unwrap();
        let err = service.ready().await.unwrap().call(req).await.unwrap_err();
        let cache_err = err.downcast_ref::<CacheError>().expect("expected a CacheError");
        assert!(matches!(cache_err, CacheError::DuplicateCaching));
    }
}
