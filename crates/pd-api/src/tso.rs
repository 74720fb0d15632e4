//! Timestamp oracle contract (spec.md §4.I).

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum TsoError {
    #[error("persisted watermark would move backward: persisted={persisted} requested={requested}")]
    WatermarkRegression { persisted: u64, requested: u64 },
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),
    #[error("batch request timed out")]
    BatchTimeout,
    #[error("this node is not the current leader")]
    NotLeader,
}

impl pd_types::error::ErrorCode for TsoError {
    fn code(&self) -> &'static str {
        match self {
            TsoError::WatermarkRegression { .. } => "TSO_WATERMARK_REGRESSION",
            TsoError::PersistenceFailure(_) => "TSO_PERSISTENCE_FAILURE",
            TsoError::BatchTimeout => "TSO_BATCH_TIMEOUT",
            TsoError::NotLeader => "TSO_NOT_LEADER",
        }
    }
}

/// A single allocated timestamp, encoded on the wire as `physical << 18 |
/// logical` (spec.md §4.I).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    pub physical_ms: u64,
    pub logical: u64,
}

pub const LOGICAL_BITS: u32 = 18;
pub const MAX_LOGICAL: u64 = (1 << LOGICAL_BITS) - 1;

impl Timestamp {
    pub fn encode(self) -> u64 {
        (self.physical_ms << LOGICAL_BITS) | self.logical
    }

    pub fn decode(raw: u64) -> Self {
        Self { physical_ms: raw >> LOGICAL_BITS, logical: raw & MAX_LOGICAL }
    }
}

/// Allocates monotonic cluster-wide timestamps in batches, bidirectionally
/// streamed to clients (spec.md §4.I, §6 "TSO stream").
#[async_trait]
pub trait TimestampOracle: Send + Sync {
    /// Allocates `count` consecutive logical ticks, returning the first one
    /// minted; the caller derives the rest by incrementing `logical`.
    async fn alloc_timestamps(&self, count: u32) -> Result<Timestamp, TsoError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trips() {
        let ts = Timestamp { physical_ms: 1_700_000_000_000, logical: 42 };
        assert_eq!(Timestamp::decode(ts.encode()), ts);
    }
}
