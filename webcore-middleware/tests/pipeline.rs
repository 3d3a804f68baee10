//! End-to-end exercises of a compiled stack: ordering, user/system
//! interleaving, cache-stage integration, and validation diagnostics.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use tower::{Service, ServiceExt};
use webcore_cache::store::MemoryStore;
use webcore_cache::CacheEngine;
use webcore_cache_tower::CacheLayer;
use webcore_middleware::{
    caching_stage, validate, BoxError, HttpRequest, HttpResponse, MiddlewarePosition,
    MiddlewareStack, MiddlewareStage,
};

fn router() -> webcore_middleware::BoxHttpService {
    tower::service_fn(|_req: HttpRequest| async move {
        Ok::<HttpResponse, BoxError>(
            http::Response::builder()
                .status(200)
                .header(http::header::CACHE_CONTROL, "max-age=60")
                .body(BodyExt::boxed(Full::new(Bytes::from("hello"))))
                .unwrap(),
        )
    })
    .boxed_clone()
}

fn get(path: &str) -> HttpRequest {
    http::Request::get(path).body(BodyExt::boxed(Full::new(Bytes::new()))).unwrap()
}

#[tokio::test]
async fn full_stack_with_cache_stage_serves_and_caches() {
    let engine = CacheEngine::new("pipeline-test", MemoryStore::new());
    let layer = CacheLayer::new(engine);

    let mut stack = MiddlewareStack::new(router());
    stack.add_system_middleware(MiddlewarePosition::Caching, caching_stage(layer));
    stack.add_system_middleware(
        MiddlewarePosition::Security,
        MiddlewareStage::custom("SecurityMiddleware", |inner| inner),
    );

    let compiled = stack.build();
    assert_eq!(compiled.execution_order[0], "ErrorHandlingMiddleware");
    assert!(compiled.execution_order.contains(&"CachingMiddleware".to_string()));

    let mut service = compiled.service.clone();
    let first = service.ready().await.unwrap().call(get("/page")).await.unwrap();
    assert_eq!(first.status(), 200);

    let second = service.ready().await.unwrap().call(get("/page")).await.unwrap();
    assert_eq!(second.status(), 200);
}

#[tokio::test]
async fn user_middleware_runs_before_system_stages() {
    let seen: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let make_stage = |name: &'static str, seen: Arc<Mutex<Vec<&'static str>>>| {
        MiddlewareStage::custom(name, move |inner: webcore_middleware::BoxHttpService| {
            let seen = seen.clone();
            tower::service_fn(move |req: HttpRequest| {
                let mut inner = inner.clone();
                let seen = seen.clone();
                async move {
                    seen.lock().unwrap().push(name);
                    inner.call(req).await
                }
            })
            .boxed_clone()
        })
    };

    let mut stack = MiddlewareStack::new(router());
    stack.add_user_middleware(make_stage("UserOne", seen.clone()), None);
    stack.add_system_middleware(
        MiddlewarePosition::Security,
        make_stage("SecurityMiddleware", seen.clone()),
    );

    let compiled = stack.build();
    let mut service = compiled.service.clone();
    service.ready().await.unwrap().call(get("/x")).await.unwrap();

    let order = seen.lock().unwrap().clone();
    let user_index = order.iter().position(|n| *n == "UserOne").unwrap();
    let security_index = order.iter().position(|n| *n == "SecurityMiddleware").unwrap();
    assert!(user_index < security_index, "user middleware should run before system middleware");
}

#[tokio::test]
async fn validation_flags_missing_security_and_session_auth_order() {
    let mut stack = MiddlewareStack::new(router());
    stack.add_system_middleware(
        MiddlewarePosition::Authentication,
        MiddlewareStage::custom("AuthenticationMiddleware", |inner| inner),
    );
    stack.add_system_middleware(
        MiddlewarePosition::Sessions,
        MiddlewareStage::custom("SessionMiddleware", |inner| inner),
    );

    let report = stack.build_report();
    let validation = validate(&report.execution_order);
    assert!(!validation.recommendations.is_empty());
    assert!(validation.warnings.is_empty());
}
