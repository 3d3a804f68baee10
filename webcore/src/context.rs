//! Per-request context threaded through `http::Extensions`.
//!
//! Grounded on §9's "Context propagation" design note: an explicit value
//! carried on the request, not a thread-local or task-local. The
//! individual subsystem crates (`webcore-cache-tower` in particular) keep
//! their own narrow, private markers for concerns local to them (its
//! duplicate-cache-layer sentinel, for one) rather than depending on this
//! crate — `webcore` sits above them in the dependency graph, so the
//! reverse would be a cycle. `RequestContext` is the place application
//! glue code (outside this workspace) records the handful of
//! cross-subsystem facts a handler might ask about, the cache-active flag
//! being the first of them.

use crate::error::WebcoreError;

/// Cross-subsystem facts about the request currently being handled.
///
/// Installed into `http::Extensions` by whatever composes the full
/// middleware stack (the `webcore-middleware`-built pipeline, in
/// practice), alongside the `webcore-cache-tower` layer itself. A handler
/// reaching for cache access through this context rather than a
/// service-located global gets a typed [`WebcoreError::MissingCaching`]
/// instead of a panic if no cache layer actually ran.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cache_active: bool,
}

impl RequestContext {
    /// A context with nothing recorded yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a cache layer is present in this request's scope.
    /// Called once, by whatever wires the compiled middleware stack's
    /// `CACHING` stage into the request extensions.
    pub fn mark_cache_active(&mut self) {
        self.cache_active = true;
    }

    /// Whether a cache layer is present in this request's scope.
    pub fn cache_active(&self) -> bool {
        self.cache_active
    }

    /// Fail with [`WebcoreError::MissingCaching`] unless a cache layer has
    /// marked itself active on this context. A helper that needs cache
    /// access (e.g. a manual invalidation call from a handler) should call
    /// this before assuming one is present.
    pub fn require_cache_active(&self) -> Result<(), WebcoreError> {
        if self.cache_active {
            Ok(())
        } else {
            Err(WebcoreError::Cache(webcore_cache::CacheError::MissingCaching))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_access_fails_until_marked_active() {
        let mut ctx = RequestContext::new();
        assert!(ctx.require_cache_active().is_err());
        ctx.mark_cache_active();
        assert!(ctx.require_cache_active().is_ok());
    }

    #[test]
    fn default_context_has_no_cache() {
        let ctx = RequestContext::default();
        assert!(!ctx.cache_active());
    }
}
