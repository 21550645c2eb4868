//! Circuit breaker, staleness detection and emergency pause.
//!
//! ## Rate-of-change bound
//!
//! Once an asset has a consensus price, every submission must stay within
//! `circuit_breaker_bps` of it. The bound compares only against the last
//! finalized consensus; intra-hour drift is handled by [`crate::anchor`].
//!
//! ## Staleness
//!
//! A consensus older than the staleness threshold is stale. Consumers must
//! check staleness before relying on the price.
//!
//! ## Pause
//!
//! [`PauseSwitch`] gates every mutating oracle call. Queries never check it.

use tally_types::{Bps, Price, Timestamp};

use crate::math::deviation_bps;
use crate::{exceeds, OracleError, Result};

/// Check `attempted` against the previous consensus.
///
/// A zero `previous` means no consensus exists yet and the check is skipped.
///
/// # Errors
///
/// - [`OracleError::CircuitBreakerTriggered`] if the deviation exceeds `threshold`
pub fn check_price_change(previous: Price, attempted: Price, threshold: Bps) -> Result<()> {
    if previous == 0 {
        return Ok(());
    }
    let deviation = deviation_bps(attempted, previous);
    if exceeds(deviation, threshold) {
        tracing::warn!(
            previous,
            attempted,
            deviation_bps = %deviation,
            threshold,
            "circuit breaker triggered"
        );
        return Err(OracleError::CircuitBreakerTriggered {
            previous,
            attempted,
        });
    }
    Ok(())
}

/// Whether data last updated at `last_update` is stale at `current_time`.
///
/// A `last_update` of zero means no data was ever recorded, which is stale.
pub fn is_stale(last_update: Timestamp, current_time: Timestamp, threshold: u64) -> bool {
    last_update == 0 || current_time.saturating_sub(last_update) > threshold
}

/// Global pause gate.
#[derive(Debug, Clone, Default)]
pub struct PauseSwitch {
    paused: bool,
}

impl PauseSwitch {
    pub fn new(paused: bool) -> Self {
        Self { paused }
    }

    /// Fail with [`OracleError::Paused`] while paused.
    pub fn ensure_running(&self) -> Result<()> {
        if self.paused {
            return Err(OracleError::Paused);
        }
        Ok(())
    }

    /// Trigger an emergency pause. Returns `false` if already paused.
    pub fn trigger_pause(&mut self) -> bool {
        if self.paused {
            return false;
        }
        tracing::warn!("circuit breaker: oracle paused");
        self.paused = true;
        true
    }

    /// Resume from an emergency pause. Returns `false` if not paused.
    pub fn resume(&mut self) -> bool {
        if !self.paused {
            return false;
        }
        tracing::info!("circuit breaker: oracle resumed");
        self.paused = false;
        true
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }
}
