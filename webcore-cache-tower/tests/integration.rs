use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use tower::{Layer, Service, ServiceExt};

use webcore_cache::rule::{Match, Rule};
use webcore_cache::store::MemoryStore;
use webcore_cache::CacheEngine;
use webcore_cache_tower::CacheLayer;

async fn body_to_bytes<B>(body: B) -> Bytes
where
    B: http_body::Body<Data = Bytes>,
    B::Error: std::fmt::Debug,
{
    body.collect().await.unwrap().to_bytes()
}

#[tokio::test]
async fn full_request_response_cycle_across_two_paths() {
    let engine = CacheEngine::new("app", MemoryStore::new());
    let layer = CacheLayer::new(engine);

    let mut service = layer.layer(tower::service_fn(|req: Request<Full<Bytes>>| async move {
        let body = format!("body for {}", req.uri().path());
        Ok::<_, std::convert::Infallible>(
            Response::builder()
                .status(StatusCode::OK)
                .header("cache-control", "max-age=60")
                .body(Full::new(Bytes::from(body)))
                .unwrap(),
        )
    }));

    let req_a = Request::get("/a").body(Full::new(Bytes::new())).unwrap();
    let res_a = service.ready().await.unwrap().call(req_a).await.unwrap();
    assert_eq!(res_a.headers().get("x-cache").unwrap(), "miss");
    let (parts_a, body_a) = res_a.into_parts();
    assert_eq!(body_to_bytes(body_a).await, Bytes::from("body for /a"));
    assert!(parts_a.headers.get("cache-control").unwrap().to_str().unwrap().contains("max-age=60"));

    let req_b = Request::get("/b").body(Full::new(Bytes::new())).unwrap();
    let res_b = service.ready().await.unwrap().call(req_b).await.unwrap();
    assert_eq!(res_b.headers().get("x-cache").unwrap(), "miss");

    let req_a2 = Request::get("/a").body(Full::new(Bytes::new())).unwrap();
    let res_a2 = service.ready().await.unwrap().call(req_a2).await.unwrap();
    assert_eq!(res_a2.headers().get("x-cache").unwrap(), "hit");
    let (_, body_a2) = res_a2.into_parts();
    assert_eq!(body_to_bytes(body_a2).await, Bytes::from("body for /a"));
}

#[tokio::test]
async fn rule_restricted_path_is_never_cached() {
    let rules = vec![Rule { matches: Match::Literal("/cacheable".into()), status: None, ttl: None }];
    let engine = CacheEngine::with_rules("app", MemoryStore::new(), rules);
    let layer = CacheLayer::new(engine);

    let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let calls_clone = calls.clone();
    let mut service = layer.layer(tower::service_fn(move |_req: Request<Full<Bytes>>| {
        let calls = calls_clone.clone();
        async move {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok::<_, std::convert::Infallible>(
                Response::builder().status(StatusCode::OK).body(Full::new(Bytes::from("x"))).unwrap(),
            )
        }
    }));

    for _ in 0..3 {
        let req = Request::get("/uncached").body(Full::new(Bytes::new())).unwrap();
        let res = service.ready().await.unwrap().call(req).await.unwrap();
        assert!(res.headers().get("x-cache").is_none());
    }
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
}

#[tokio::test]
async fn write_then_read_through_multiple_methods() {
    let engine = CacheEngine::new("app", MemoryStore::new());
    let layer = CacheLayer::new(engine);

    let mut service = layer.layer(tower::service_fn(|_req: Request<Full<Bytes>>| async move {
        Ok::<_, std::convert::Infallible>(
            Response::builder().status(StatusCode::OK).body(Full::new(Bytes::from("resource-v1"))).unwrap(),
        )
    }));

    let get1 = Request::get("/resource/1").body(Full::new(Bytes::new())).unwrap();
    let res1 = service.ready().await.unwrap().call(get1).await.unwrap();
    assert_eq!(res1.headers().get("x-cache").unwrap(), "miss");

    let get2 = Request::get("/resource/1").body(Full::new(Bytes::new())).unwrap();
    let res2 = service.ready().await.unwrap().call(get2).await.unwrap();
    assert_eq!(res2.headers().get("x-cache").unwrap(), "hit");

    let put = Request::put("/resource/1").body(Full::new(Bytes::from("new"))).unwrap();
    let put_res = service.ready().await.unwrap().call(put).await.unwrap();
    assert!(put_res.headers().get("x-cache").is_none());

    let get3 = Request::get("/resource/1").body(Full::new(Bytes::new())).unwrap();
    let res3 = service.ready().await.unwrap().call(get3).await.unwrap();
    assert_eq!(res3.headers().get("x-cache").unwrap(), "miss", "PUT must invalidate the GET entry");
}
