//! Deterministic, position-indexed middleware stack manager.
//!
//! A [`stack::MiddlewareStack`] wraps an application's innermost router
//! service with, from the outside in: an error-handling stage, any
//! user-supplied middleware (in insertion order), the seven fixed
//! [`position::MiddlewarePosition`] system slots (security through
//! custom), and an inner exception-mapping stage. [`stack::MiddlewareStack::build`]
//! compiles this into one `tower` service and caches the result until the
//! stack changes; [`validate::validate`] runs a handful of ordering
//! sanity checks over the compiled order.
//!
//! Grounded throughout on
//! `examples/original_source/fastblocks/actions/gather/middleware.py`.

pub mod error;
pub mod position;
pub mod stack;
pub mod stage;
pub mod validate;

pub use error::{MiddlewareError, Result};
pub use position::MiddlewarePosition;
pub use stack::{CompiledStack, GatherReport, MiddlewareStack};
pub use stage::{
    caching_stage, error_handling_stage, exception_mapping_stage, BoxError, BoxHttpService,
    ErrorHandler, HttpException, HttpRequest, HttpResponse, MiddlewareStage, PlainTextErrorHandler,
    ReqBody, ResBody,
};
pub use validate::{validate, ValidationReport};
