//! The fixed, ordered enumeration of system middleware positions.
//!
//! Grounded on `MiddlewarePosition` in
//! `examples/original_source/fastblocks/actions/gather/middleware.py`: an
//! `Enum` of seven slots, `SECURITY` through `CUSTOM`, whose integer value
//! is also its place in the compiled stack's system-middleware segment.

use crate::error::MiddlewareError;

/// A slot in the system-middleware segment of the compiled pipeline.
///
/// Positions are evaluated low-to-high as the compiled stack is assembled
/// outer-to-inner (§4.2): `Security` sits outermost among the system
/// stages, `Custom` innermost, immediately before the exception-mapping
/// stage and the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MiddlewarePosition {
    /// Security headers (HSTS, frame options, content-type sniffing, ...).
    Security = 0,
    /// Cross-origin resource sharing.
    Cors = 1,
    /// Response body compression.
    Compression = 2,
    /// Session loading/persistence.
    Sessions = 3,
    /// Request authentication.
    Authentication = 4,
    /// Response caching (`webcore-cache-tower::CacheLayer`, typically).
    Caching = 5,
    /// Application-defined system middleware with no dedicated slot.
    Custom = 6,
}

impl MiddlewarePosition {
    /// Every position, in ascending (outermost-to-innermost-among-system)
    /// order.
    pub const ALL: [MiddlewarePosition; 7] = [
        MiddlewarePosition::Security,
        MiddlewarePosition::Cors,
        MiddlewarePosition::Compression,
        MiddlewarePosition::Sessions,
        MiddlewarePosition::Authentication,
        MiddlewarePosition::Caching,
        MiddlewarePosition::Custom,
    ];

    /// This position's fixed numeric value.
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Recover a [`MiddlewarePosition`] from a raw index (e.g. parsed from
    /// configuration), failing for anything outside `0..=6`.
    pub fn from_index(index: u8) -> Result<Self, MiddlewareError> {
        Self::ALL
            .into_iter()
            .find(|p| p.index() == index)
            .ok_or(MiddlewareError::InvalidPosition { index, max: MiddlewarePosition::Custom as u8 })
    }

    /// A human-readable name, used in [`crate::validate`]'s diagnostics and
    /// in `GatherReport::execution_order`.
    pub fn name(self) -> &'static str {
        match self {
            MiddlewarePosition::Security => "SecurityMiddleware",
            MiddlewarePosition::Cors => "CorsMiddleware",
            MiddlewarePosition::Compression => "CompressionMiddleware",
            MiddlewarePosition::Sessions => "SessionMiddleware",
            MiddlewarePosition::Authentication => "AuthenticationMiddleware",
            MiddlewarePosition::Caching => "CachingMiddleware",
            MiddlewarePosition::Custom => "CustomMiddleware",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_index_round_trips_every_defined_position() {
        for position in MiddlewarePosition::ALL {
            assert_eq!(MiddlewarePosition::from_index(position.index()).unwrap(), position);
        }
    }

    #[test]
    fn from_index_rejects_out_of_range() {
        let err = MiddlewarePosition::from_index(7).unwrap_err();
        assert!(matches!(err, MiddlewareError::InvalidPosition { index: 7, max: 6 }));
    }

    #[test]
    fn all_is_in_ascending_order() {
        let indices: Vec<u8> = MiddlewarePosition::ALL.iter().map(|p| p.index()).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5, 6]);
    }
}
