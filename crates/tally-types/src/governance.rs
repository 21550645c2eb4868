//! Oracle parameters and upgrade records.

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::{Address, Bps, Timestamp};

/// Default quorum size.
pub const DEFAULT_MIN_VALIDATORS: u32 = 5;

/// Default tolerance used by price verification (1%).
pub const DEFAULT_CONSENSUS_TOLERANCE_BPS: Bps = 100;

/// Default staleness threshold (1 hour).
pub const DEFAULT_STALENESS_THRESHOLD: u64 = 3600;

/// Default circuit breaker threshold (10%).
pub const DEFAULT_CIRCUIT_BREAKER_BPS: Bps = 1000;

/// Default bound against the reference feed (5%).
pub const DEFAULT_REFERENCE_DEVIATION_BPS: Bps = 500;

/// Default TWAP window (30 minutes).
pub const DEFAULT_TWAP_WINDOW: u64 = 1800;

/// Default number of violations a validator may accumulate before suspension.
pub const DEFAULT_SUSPENSION_THRESHOLD: u32 = 10;

/// Global oracle parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameters {
    /// Submissions required to finalize a round.
    pub min_validators: u32,
    /// Tolerance applied by price verification.
    pub consensus_tolerance_bps: Bps,
    /// Seconds after which consensus and reference data are stale.
    pub staleness_threshold: u64,
    /// Maximum move against the previous consensus per submission.
    pub circuit_breaker_bps: Bps,
    /// Maximum deviation from the reference feed.
    pub reference_deviation_bps: Bps,
    /// TWAP window in seconds.
    pub twap_window: u64,
    /// Outlier flagging threshold. `None` tracks `circuit_breaker_bps`.
    pub outlier_threshold_bps: Option<Bps>,
    /// Violations tolerated before a validator is suspended.
    pub suspension_threshold: u32,
}

impl Parameters {
    /// The effective outlier flagging threshold.
    pub fn outlier_threshold(&self) -> Bps {
        self.outlier_threshold_bps.unwrap_or(self.circuit_breaker_bps)
    }
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            min_validators: DEFAULT_MIN_VALIDATORS,
            consensus_tolerance_bps: DEFAULT_CONSENSUS_TOLERANCE_BPS,
            staleness_threshold: DEFAULT_STALENESS_THRESHOLD,
            circuit_breaker_bps: DEFAULT_CIRCUIT_BREAKER_BPS,
            reference_deviation_bps: DEFAULT_REFERENCE_DEVIATION_BPS,
            twap_window: DEFAULT_TWAP_WINDOW,
            outlier_threshold_bps: None,
            suspension_threshold: DEFAULT_SUSPENSION_THRESHOLD,
        }
    }
}

/// A deployable oracle implementation.
#[serde_as]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplementationHandle {
    pub address: Address,
    /// All zero when the target carries no code.
    #[serde_as(as = "serde_with::hex::Hex")]
    pub code_hash: [u8; 32],
}

impl ImplementationHandle {
    /// Whether the target has code that can be executed.
    pub fn is_executable(&self) -> bool {
        self.code_hash != [0u8; 32]
    }
}

/// An upgrade waiting for its timelock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingUpgrade {
    pub implementation: ImplementationHandle,
    pub scheduled_at: Timestamp,
    /// Earliest time the upgrade may be applied.
    pub eta: Timestamp,
}
