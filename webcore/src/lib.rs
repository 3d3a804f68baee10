#![forbid(unsafe_code)]
#![deny(missing_debug_implementations)]
//! Ties the three subsystems of this web framework core together:
//! [`webcore_cache`]/[`webcore_cache_tower`] (reverse caching),
//! [`webcore_middleware`] (position-indexed middleware composition), and
//! [`webcore_sync`] (bidirectional filesystem/object-store sync).
//!
//! This crate itself holds only the glue that spans all three: the
//! per-request [`RequestContext`], the collaborator stub traits the other
//! crates call out to at the edge (template rendering, validation,
//! configuration, error rendering — all explicitly out of scope for
//! implementation here), and [`WebcoreError`], the top-level error
//! composing each subsystem's own error type.
//!
//! ```
//! use webcore::RequestContext;
//!
//! let mut ctx = RequestContext::new();
//! assert!(ctx.require_cache_active().is_err());
//! ctx.mark_cache_active();
//! assert!(ctx.require_cache_active().is_ok());
//! ```

pub mod collaborators;
pub mod context;
pub mod error;

pub use collaborators::{Configuration, ConfigError, ConfigurationReloader, ErrorRenderer, Validator, TemplateRenderer};
pub use context::RequestContext;
pub use error::WebcoreError;

pub use webcore_cache;
pub use webcore_cache_tower;
pub use webcore_middleware;
pub use webcore_sync;
