//! Static reference price source.
//!
//! Serves fixed readings keyed by source handle. The daemon loads them from
//! configuration so that reference cross-checks can run without a live
//! upstream feed; tests use it to script feed failures.

use std::collections::HashMap;

use tally_types::SourceHandle;

use crate::reference::{FeedError, FeedReading, PriceSource};

/// A price source that answers from an in-memory table.
#[derive(Debug, Clone, Default)]
pub struct StaticPriceSource {
    readings: HashMap<SourceHandle, FeedReading>,
    /// Sources forced to fail, with the failure message.
    failing: HashMap<SourceHandle, String>,
}

impl StaticPriceSource {
    /// Create an empty source. Every handle is unknown.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source pre-loaded with readings.
    pub fn with_readings(readings: impl IntoIterator<Item = (SourceHandle, FeedReading)>) -> Self {
        Self {
            readings: readings.into_iter().collect(),
            failing: HashMap::new(),
        }
    }

    /// Replace the reading served for `source` and clear any forced failure.
    pub fn set_reading(&mut self, source: SourceHandle, reading: FeedReading) {
        tracing::debug!(
            source = %source,
            answer = reading.answer,
            updated_at = reading.updated_at,
            "static source: reading set"
        );
        self.failing.remove(&source);
        self.readings.insert(source, reading);
    }

    /// Make every query of `source` fail with `reason`.
    pub fn fail_source(&mut self, source: SourceHandle, reason: &str) {
        tracing::warn!(source = %source, reason, "static source: forced failure");
        self.failing.insert(source, reason.to_string());
    }

    /// Number of sources with a reading.
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

impl PriceSource for StaticPriceSource {
    fn latest_price(&self, source: &SourceHandle) -> Result<FeedReading, FeedError> {
        if let Some(reason) = self.failing.get(source) {
            return Err(FeedError::Failed(reason.clone()));
        }
        self.readings
            .get(source)
            .copied()
            .ok_or(FeedError::UnknownSource(*source))
    }
}
