use thiserror::Error;

/// A `Result` typedef to use with the [`CacheError`] type
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors raised by the caching core.
///
/// Most of these are recorded against the request/response path and never
/// propagate past the layer that produced them; `get`/`set`/`delete` degrade
/// to a miss or no-op on [`CacheError::Store`] rather than failing the
/// caller. The others are typed failures a caller is expected to match on.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The request is not eligible for a cache lookup (method, or no rule
    /// matches the request path).
    #[error("request is not cachable: {reason}")]
    RequestNotCachable {
        /// Why the request was rejected.
        reason: &'static str,
    },
    /// The response produced for a cachable request may not be stored.
    #[error("response is not cachable: {reason}")]
    ResponseNotCachable {
        /// Why the response was rejected.
        reason: &'static str,
    },
    /// A cache directive that is recognized but not implemented, e.g. the
    /// `public`/`private` `Cache-Control` directives.
    #[error("the '{0}' cache-control directive isn't supported yet")]
    DirectiveNotImplemented(&'static str),
    /// A value read back from the store did not have the expected shape.
    #[error("malformed cache entry: {0}")]
    Malformed(String),
    /// A request already carries this layer's cache sentinel, meaning a
    /// second caching layer is wrapped around the first in the same scope.
    /// Unlike the other variants this is a configuration mistake, not a
    /// per-request condition, and the Tower layer never degrades it to a
    /// no-op the way it does store errors.
    #[error("duplicate caching: a cache layer is already wrapping this request")]
    DuplicateCaching,
    /// A helper asked for cache access but no cache layer is present in the
    /// current request scope. Fatal for the handler that asked.
    #[error("no cache layer is present in this request's scope")]
    MissingCaching,
    /// The backing store returned an error. Callers are expected to log
    /// this and treat the operation as a miss/no-op rather than fail the
    /// request.
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),
    /// A URL could not be parsed.
    #[error(transparent)]
    InvalidUrl(#[from] url::ParseError),
    /// A header value could not be serialized/deserialized.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
