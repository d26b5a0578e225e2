//! Write watermarks.
//!
//! Every completed write advances the cache's watermark. Consumers holding a
//! value can compare watermarks to tell whether anything was written since.

use chrono::{DateTime, Utc};

/// A point in the cache's write history.
///
/// Sequences are monotonically increasing; each write increments by one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Watermark {
    pub sequence: u64,
    /// When the write that produced this watermark started.
    pub observed_at: DateTime<Utc>,
}

impl Watermark {
    /// Create a new watermark with the given sequence number.
    pub fn new(sequence: u64) -> Self {
        Self {
            sequence,
            observed_at: Utc::now(),
        }
    }

    /// Create a zero watermark (no writes yet).
    pub fn zero() -> Self {
        Self {
            sequence: 0,
            observed_at: DateTime::UNIX_EPOCH,
        }
    }

    /// The watermark of the next write.
    pub fn advance(&self) -> Self {
        Self::new(self.sequence + 1)
    }

    pub fn is_newer_than(&self, other: &Watermark) -> bool {
        self.sequence > other.sequence
    }
}

impl Default for Watermark {
    fn default() -> Self {
        Self::zero()
    }
}
