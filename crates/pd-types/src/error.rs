//! Error taxonomy shared by every crate in the workspace. Each domain crate
//! defines its own `thiserror` enum and implements [`ErrorCode`] on it so
//! logs and API responses carry a stable machine-readable identifier
//! alongside the human message, the same split the rest of the workspace
//! uses for its own error enums.

use std::fmt;

/// A stable, lowercase-hyphenated identifier for an error variant, suitable
/// for metrics labels and client-facing error payloads. Never changes
/// across refactors even if the display message's wording does.
pub trait ErrorCode: std::error::Error {
    fn code(&self) -> &'static str;
}

/// The top-level error type returned at crate boundaries that don't have a
/// narrower domain error of their own (e.g. `pd-types` helpers).
#[derive(Debug, thiserror::Error)]
pub enum PdError {
    #[error("request epoch is stale: {0}")]
    StaleRequest(String),

    #[error("cluster is not bootstrapped")]
    NotBootstrapped,

    #[error("this node is not the current leader")]
    NotLeader,

    #[error("store {0} is tombstone")]
    StoreTombstone(u64),

    #[error("region {0} not found")]
    RegionNotFound(u64),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("operator conflict: {0}")]
    OperatorConflict(String),

    #[error("rate limited: {0}")]
    RateLimited(String),
}

impl ErrorCode for PdError {
    fn code(&self) -> &'static str {
        match self {
            PdError::StaleRequest(_) => "STALE_REQUEST",
            PdError::NotBootstrapped => "NOT_BOOTSTRAPPED",
            PdError::NotLeader => "NOT_LEADER",
            PdError::StoreTombstone(_) => "STORE_TOMBSTONE",
            PdError::RegionNotFound(_) => "REGION_NOT_FOUND",
            PdError::InvalidConfig(_) => "INVALID_CONFIG",
            PdError::PersistenceFailure(_) => "PERSISTENCE_FAILURE",
            PdError::OperatorConflict(_) => "OPERATOR_CONFLICT",
            PdError::RateLimited(_) => "RATE_LIMITED",
        }
    }
}

/// Helper for `impl fmt::Display` bodies in domain error enums that wrap a
/// byte-string key for display (region boundaries are arbitrary bytes, not
/// necessarily UTF-8).
pub struct HexKey<'a>(pub &'a [u8]);

impl fmt::Display for HexKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable_identifiers() {
        assert_eq!(PdError::NotLeader.code(), "NOT_LEADER");
        assert_eq!(PdError::RegionNotFound(5).code(), "REGION_NOT_FOUND");
    }

    #[test]
    fn hex_key_formats_bytes() {
        assert_eq!(format!("{}", HexKey(&[0xde, 0xad, 0xbe, 0xef])), "deadbeef");
    }
}
