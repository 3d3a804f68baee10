use thiserror::Error;

/// A `Result` typedef to use with the [`MiddlewareError`] type.
pub type Result<T> = std::result::Result<T, MiddlewareError>;

/// Errors raised while assembling a middleware stack.
///
/// These are all configuration-time: nothing here is raised while a
/// request is in flight. A request-path failure inside a stage is a
/// [`crate::stage::BoxError`] caught by the outermost error-handling
/// stage, never a [`MiddlewareError`].
#[derive(Error, Debug)]
pub enum MiddlewareError {
    /// A raw numeric position (e.g. read from configuration) doesn't
    /// correspond to one of the seven fixed [`crate::position::MiddlewarePosition`]
    /// slots.
    #[error("middleware position index {index} is out of range (0..={max})")]
    InvalidPosition {
        /// The offending index.
        index: u8,
        /// The highest valid index (`MiddlewarePosition::Custom as u8`).
        max: u8,
    },
}
