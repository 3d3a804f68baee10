//! Top-level error composing each subsystem's own error type.
//!
//! One `thiserror` enum per crate, composed here with `#[from]` — matches
//! the teacher's (legacy) root error type's role, generalized from one
//! subsystem to three.

use thiserror::Error;

/// The union of every error a caller driving `webcore` end-to-end might
/// see. Most callers only ever handle one subsystem's error directly
/// (a cache lookup, a sync run); this exists for code that genuinely sits
/// above all three, such as an application's top-level error handler.
#[derive(Error, Debug)]
pub enum WebcoreError {
    /// An error from the caching subsystem.
    #[error(transparent)]
    Cache(#[from] webcore_cache::CacheError),
    /// An error from the middleware stack manager.
    #[error(transparent)]
    Middleware(#[from] webcore_middleware::MiddlewareError),
    /// An error from the sync engine.
    #[error(transparent)]
    Sync(#[from] webcore_sync::SyncError),
}
