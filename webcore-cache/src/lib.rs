#![forbid(unsafe_code)]
#![deny(missing_debug_implementations)]
//! RFC 7234-style HTTP response caching core.
//!
//! This crate holds the storage-agnostic pieces of the cache layer: the
//! request/response data model ([`headers`]), cache rules ([`rule`]), key
//! derivation and `Vary` learning ([`keys`]), `Cache-Control` directive
//! patching ([`directives`]), and the [`store::CacheStore`] collaborator
//! trait plus an in-memory implementation. The Tower-level integration
//! (the actual hit/miss decision against a live request/response pair)
//! lives in `webcore-cache-tower`; this crate is what it's built on.
//!
//! ```
//! use webcore_cache::{CacheEngine, store::MemoryStore};
//!
//! # async fn run() {
//! let engine = CacheEngine::new("myapp", MemoryStore::new());
//! # let _ = engine;
//! # }
//! ```

pub mod directives;
pub mod error;
pub mod headers;
pub mod keys;
pub mod rule;
pub mod store;

use std::sync::Arc;

use headers::{OrderedHeaders, SerializedResponse};
use keys::VaryingHeaders;
use rule::Rule;
use store::CacheStore;

pub use error::{CacheError, Result};

/// HTTP methods eligible for a cache lookup.
pub const CACHABLE_METHODS: &[&str] = &["GET", "HEAD"];

/// HTTP methods whose 2xx/3xx responses invalidate the cached entry for
/// the same URL.
pub const INVALIDATING_METHODS: &[&str] = &["POST", "PUT", "PATCH", "DELETE"];

/// Status codes eligible for storage, frozen to match RFC 7231 cacheable
/// defaults (the same set the original hard-codes).
pub const CACHABLE_STATUS_CODES: &[u16] =
    &[200, 203, 204, 206, 300, 301, 404, 405, 410, 414, 501];

/// The TTL substituted when a matching rule has no TTL and the store has
/// no configured default: effectively "cache indefinitely" without
/// actually meaning forever.
pub const ONE_YEAR_SECS: u64 = 60 * 60 * 24 * 365;

/// Drives the cache read/write/invalidate algorithm over a [`CacheStore`]
/// and a set of [`Rule`]s.
///
/// `app_name` namespaces every key this engine writes
/// (`{app_name}:cached:...`), so multiple engines can share one store
/// without colliding.
pub struct CacheEngine<S: CacheStore> {
    app_name: String,
    store: Arc<S>,
    rules: Vec<Rule>,
    default_ttl: Option<u64>,
}

impl<S: CacheStore> std::fmt::Debug for CacheEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEngine")
            .field("app_name", &self.app_name)
            .field("rules", &self.rules.len())
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

/// A request as seen by the cache engine: just enough to derive a key and
/// match rules.
#[derive(Debug, Clone)]
pub struct CacheableRequest {
    /// HTTP method, upper-cased.
    pub method: String,
    /// Request path (no query string — matches the original, which keys
    /// off `request.url.path`).
    pub path: String,
    /// The full URL string used for key derivation (path + query).
    pub url: String,
    /// Request headers, used to read the values of already-learned
    /// varying headers.
    pub headers: OrderedHeaders,
    /// Whether the client sent any cookies at all.
    pub has_cookies: bool,
}

impl<S: CacheStore> CacheEngine<S> {
    /// Build an engine with the catch-all rule (cache every GET/HEAD at
    /// the store's default TTL).
    pub fn new(app_name: impl Into<String>, store: S) -> Self {
        Self::with_rules(app_name, store, vec![Rule::catch_all()])
    }

    /// Build an engine with an explicit, ordered rule list. The first
    /// matching rule wins.
    pub fn with_rules(app_name: impl Into<String>, store: S, rules: Vec<Rule>) -> Self {
        Self { app_name: app_name.into(), store: Arc::new(store), rules, default_ttl: None }
    }

    /// Set the store-wide default TTL (seconds) used when a matching rule
    /// doesn't specify its own.
    pub fn with_default_ttl(mut self, seconds: u64) -> Self {
        self.default_ttl = Some(seconds);
        self
    }

    /// Look up a cached response for `request`.
    ///
    /// Returns `Ok(None)` on a clean miss. Returns
    /// `Err(CacheError::RequestNotCachable)` when the method isn't
    /// cachable or no rule matches the path — callers (the Tower layer)
    /// treat that the same way as a miss for GET/HEAD, but use it to
    /// decide whether a mutating-method response should trigger
    /// invalidation.
    pub async fn get_from_cache(
        &self,
        request: &CacheableRequest,
    ) -> Result<Option<SerializedResponse>> {
        log::debug!(
            "get_from_cache request.url={:?} request.method={:?}",
            request.url,
            request.method
        );
        if !CACHABLE_METHODS.contains(&request.method.as_str()) {
            log::debug!("request_not_cachable reason=method");
            return Err(CacheError::RequestNotCachable { reason: "method" });
        }
        if rule::rule_matching_request(&self.rules, &request.path).is_none() {
            log::debug!("request_not_cachable reason=rule");
            return Err(CacheError::RequestNotCachable { reason: "rule" });
        }

        for method in ["GET", "HEAD"] {
            if let Some(key) = self.lookup_key(request, method).await? {
                log::debug!("cache_key found=true cache_key={key:?}");
                if let Some(bytes) = self.get_raw(&key).await {
                    return Ok(Some(SerializedResponse::from_stored(&bytes)?));
                }
            }
        }
        log::debug!("cached_response found=false");
        Ok(None)
    }

    async fn lookup_key(
        &self,
        request: &CacheableRequest,
        method: &str,
    ) -> Result<Option<String>> {
        let vkey = keys::varying_headers_key(&request.path);
        let varying = match self.get_raw(&vkey).await {
            Some(bytes) => serde_json::from_slice::<Vec<String>>(&bytes)
                .map(VaryingHeaders)
                .unwrap_or_default(),
            None => return Ok(None),
        };
        Ok(keys::cache_key(&self.app_name, method, &request.url, &request.headers, &varying))
    }

    async fn get_raw(&self, key: &str) -> Option<Vec<u8>> {
        match self.store.get(key).await {
            Ok(value) => value,
            Err(err) => {
                log::warn!("cache store get failed, degrading to miss: {err}");
                None
            }
        }
    }

    /// Learn the `Vary`-derived key for `request`/response pair and store
    /// `response` under it.
    ///
    /// `has_set_cookie` must reflect whether the response carries a
    /// `Set-Cookie` header; per the original, a cookie-setting response to
    /// a cookieless request is never stored (storing it would leak the
    /// first visitor's session to everyone else who hits the cache).
    pub async fn set_in_cache(
        &self,
        request: &CacheableRequest,
        mut response: SerializedResponse,
        vary_header_value: Option<&str>,
    ) -> Result<SerializedResponse> {
        if !CACHABLE_STATUS_CODES.contains(&response.status) {
            log::debug!("response_not_cachable reason=status_code");
            return Err(CacheError::ResponseNotCachable { reason: "status_code" });
        }
        if !request.has_cookies && response.headers.contains_key("set-cookie") {
            log::debug!("response_not_cachable reason=cookies_for_cookieless_request");
            return Err(CacheError::ResponseNotCachable {
                reason: "cookies_for_cookieless_request",
            });
        }
        let rule = rule::rule_matching_response(&self.rules, &request.path, response.status)
            .ok_or(CacheError::ResponseNotCachable { reason: "rule" })?;

        let ttl = rule.ttl.or(self.default_ttl);
        let max_age = match ttl {
            Some(0) => {
                log::debug!("response_not_cachable reason=zero_ttl");
                return Err(CacheError::ResponseNotCachable { reason: "zero_ttl" });
            }
            Some(secs) => secs,
            None => ONE_YEAR_SECS,
        };
        log::debug!("set_in_cache max_age={max_age}");
        response.headers.insert("x-cache", "hit");

        if !response.headers.contains_key("expires") {
            if let Some(expires) = directives::expires_header(false, max_age as i64) {
                response.headers.insert("expires", expires);
            }
        }
        let patched = directives::patch_cache_control(
            response.headers.get("cache-control"),
            directives::CacheDirectives {
                max_age: Some(max_age),
                ..Default::default()
            },
            false,
            false,
        )?;
        match patched {
            Some(value) => response.headers.insert("cache-control", value),
            None => response.headers.remove("cache-control"),
        }

        let cache_key = self.learn_cache_key(request, vary_header_value, &mut response).await?;
        log::debug!("learnt_cache_key cache_key={cache_key:?}");
        // The bytes persisted carry `x-cache: hit`, since that's what a
        // later lookup should see; the response handed back here, for
        // *this* (miss) request, is flipped to `x-cache: miss` below.
        let stored = response.to_stored()?;
        if let Err(err) =
            self.store.set(&cache_key, stored, Some(std::time::Duration::from_secs(max_age))).await
        {
            log::warn!("cache store set failed, response served but not cached: {err}");
        }
        response.headers.insert("x-cache", "miss");
        Ok(response)
    }

    async fn learn_cache_key(
        &self,
        request: &CacheableRequest,
        vary_header_value: Option<&str>,
        response: &mut SerializedResponse,
    ) -> Result<String> {
        let vkey = keys::varying_headers_key(&request.path);
        let cached = match self.get_raw(&vkey).await {
            Some(bytes) => serde_json::from_slice::<Vec<String>>(&bytes)
                .map(VaryingHeaders)
                .unwrap_or_default(),
            None => VaryingHeaders::default(),
        };
        let merged = cached.merge_vary_value(vary_header_value);
        if let Some(header_value) = merged.as_header_value() {
            response.headers.insert("vary", header_value);
        }
        if let Ok(bytes) = serde_json::to_vec(&merged.0) {
            if let Err(err) = self.store.set(&vkey, bytes, None).await {
                log::warn!("failed to persist varying headers record: {err}");
            }
        }
        keys::cache_key(&self.app_name, &request.method, &request.url, &request.headers, &merged)
            .ok_or(CacheError::RequestNotCachable { reason: "method" })
    }

    /// Invalidate every cached entry (GET and HEAD) for `request`'s URL.
    ///
    /// Called after a 2xx/3xx response to a mutating method, per the
    /// invalidating-methods set.
    pub async fn delete_from_cache(&self, request: &CacheableRequest) -> Result<()> {
        let vkey = keys::varying_headers_key(&request.path);
        let varying = match self.get_raw(&vkey).await {
            Some(bytes) => serde_json::from_slice::<Vec<String>>(&bytes)
                .map(VaryingHeaders)
                .unwrap_or_default(),
            None => return Ok(()),
        };
        for method in ["GET", "HEAD"] {
            if let Some(key) =
                keys::cache_key(&self.app_name, method, &request.url, &request.headers, &varying)
            {
                log::debug!("clear_cache key={key:?}");
                if let Err(err) = self.store.delete(&key).await {
                    log::warn!("cache store delete failed: {err}");
                }
            }
        }
        if let Err(err) = self.store.delete(&vkey).await {
            log::warn!("cache store delete failed: {err}");
        }
        Ok(())
    }
}
