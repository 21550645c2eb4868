//! Outlier detection and validator violations.
//!
//! After a round finalizes, every submission further than the outlier
//! threshold from the median costs its validator one violation. Counts never
//! decrease and span all assets. A validator whose count exceeds the
//! suspension threshold can no longer submit.

use std::collections::HashMap;

use tally_types::state::Submission;
use tally_types::{Bps, Price, ValidatorId};

use crate::exceeds;
use crate::math::deviation_bps;

/// A submission flagged against a round median.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outlier {
    pub validator: ValidatorId,
    pub submitted: Price,
    pub deviation_bps: u128,
}

/// Submissions deviating from `median` by more than `threshold`, in arrival order.
pub fn find_outliers(submissions: &[Submission], median: Price, threshold: Bps) -> Vec<Outlier> {
    submissions
        .iter()
        .filter_map(|s| {
            let deviation = deviation_bps(s.price, median);
            exceeds(deviation, threshold).then_some(Outlier {
                validator: s.validator,
                submitted: s.price,
                deviation_bps: deviation,
            })
        })
        .collect()
}

/// Permanent violation counters.
#[derive(Debug, Clone, Default)]
pub struct ViolationTracker {
    counts: HashMap<ValidatorId, u32>,
}

impl ViolationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = (ValidatorId, u32)>) -> Self {
        Self {
            counts: records.into_iter().collect(),
        }
    }

    pub fn count(&self, validator: &ValidatorId) -> u32 {
        self.counts.get(validator).copied().unwrap_or(0)
    }

    /// Whether the validator's count exceeds `threshold`.
    pub fn is_suspended(&self, validator: &ValidatorId, threshold: u32) -> bool {
        self.count(validator) > threshold
    }

    /// Add one violation and return the new count.
    pub fn record(&mut self, validator: ValidatorId) -> u32 {
        let count = self.counts.entry(validator).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// The stored counter, `None` if the validator was never flagged.
    pub fn record_of(&self, validator: &ValidatorId) -> Option<u32> {
        self.counts.get(validator).copied()
    }

    /// Put back an earlier counter.
    pub fn restore(&mut self, validator: ValidatorId, prior: Option<u32>) {
        match prior {
            Some(count) => self.counts.insert(validator, count),
            None => self.counts.remove(&validator),
        };
    }

    pub fn records(&self) -> Vec<(ValidatorId, u32)> {
        let mut records: Vec<_> = self.counts.iter().map(|(k, v)| (*k, *v)).collect();
        records.sort_by_key(|(validator, _)| *validator);
        records
    }
}
