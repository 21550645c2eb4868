//! Parameter bounds and the upgrade timelock.
//!
//! Every configurable threshold has a hard bound. Batch updates treat a zero
//! field as "leave unchanged" and apply all-or-nothing.
//!
//! Upgrades follow a schedule → wait → apply lifecycle with a fixed
//! [`UPGRADE_DELAY_SECS`] between scheduling and applying.

use serde::{Deserialize, Serialize};
use tally_types::governance::{ImplementationHandle, Parameters, PendingUpgrade};
use tally_types::{Bps, Timestamp};

use crate::{OracleError, Result};

/// Smallest allowed quorum.
pub const MIN_VALIDATORS_FLOOR: u32 = 5;
/// Largest allowed quorum.
pub const MAX_VALIDATORS: u32 = 100;
/// Largest verification tolerance (5%).
pub const MAX_CONSENSUS_TOLERANCE_BPS: Bps = 500;
/// Staleness threshold bounds (5 minutes to 1 day).
pub const MIN_STALENESS_THRESHOLD: u64 = 300;
pub const MAX_STALENESS_THRESHOLD: u64 = 86_400;
/// Largest circuit breaker threshold (20%).
pub const MAX_CIRCUIT_BREAKER_BPS: Bps = 2000;
/// Largest reference deviation (50%).
pub const MAX_REFERENCE_DEVIATION_BPS: Bps = 5000;
/// TWAP window bounds (1 minute to 1 week).
pub const MIN_TWAP_WINDOW: u64 = 60;
pub const MAX_TWAP_WINDOW: u64 = 604_800;
/// Largest explicit outlier threshold (50%).
pub const MAX_OUTLIER_THRESHOLD_BPS: Bps = 5000;
/// Largest suspension threshold.
pub const MAX_SUSPENSION_THRESHOLD: u32 = 1000;

/// Delay between scheduling and applying an upgrade (48 hours).
pub const UPGRADE_DELAY_SECS: u64 = 48 * 3600;

/// A batch parameter update. Zero fields are left unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterUpdate {
    #[serde(default)]
    pub min_validators: u32,
    #[serde(default)]
    pub consensus_tolerance_bps: Bps,
    #[serde(default)]
    pub staleness_threshold: u64,
    #[serde(default)]
    pub circuit_breaker_bps: Bps,
}

fn check_range<T>(name: &'static str, value: T, min: T, max: T) -> Result<()>
where
    T: PartialOrd + Copy + Into<u64>,
{
    if value < min || value > max {
        return Err(OracleError::out_of_bounds(name, value));
    }
    Ok(())
}

pub fn check_min_validators(value: u32) -> Result<()> {
    check_range("min_validators", value, MIN_VALIDATORS_FLOOR, MAX_VALIDATORS)
}

pub fn check_consensus_tolerance(value: Bps) -> Result<()> {
    check_range("consensus_tolerance_bps", value, 1, MAX_CONSENSUS_TOLERANCE_BPS)
}

pub fn check_staleness_threshold(value: u64) -> Result<()> {
    check_range(
        "staleness_threshold",
        value,
        MIN_STALENESS_THRESHOLD,
        MAX_STALENESS_THRESHOLD,
    )
}

pub fn check_circuit_breaker(value: Bps) -> Result<()> {
    check_range("circuit_breaker_bps", value, 1, MAX_CIRCUIT_BREAKER_BPS)
}

pub fn check_reference_deviation(value: Bps) -> Result<()> {
    check_range("reference_deviation_bps", value, 1, MAX_REFERENCE_DEVIATION_BPS)
}

pub fn check_twap_window(value: u64) -> Result<()> {
    check_range("twap_window", value, MIN_TWAP_WINDOW, MAX_TWAP_WINDOW)
}

pub fn check_outlier_threshold(value: Bps) -> Result<()> {
    check_range("outlier_threshold_bps", value, 1, MAX_OUTLIER_THRESHOLD_BPS)
}

pub fn check_suspension_threshold(value: u32) -> Result<()> {
    check_range("suspension_threshold", value, 1, MAX_SUSPENSION_THRESHOLD)
}

/// Validate a complete parameter set.
pub fn validate(params: &Parameters) -> Result<()> {
    check_min_validators(params.min_validators)?;
    check_consensus_tolerance(params.consensus_tolerance_bps)?;
    check_staleness_threshold(params.staleness_threshold)?;
    check_circuit_breaker(params.circuit_breaker_bps)?;
    check_reference_deviation(params.reference_deviation_bps)?;
    check_twap_window(params.twap_window)?;
    if let Some(outlier) = params.outlier_threshold_bps {
        check_outlier_threshold(outlier)?;
    }
    check_suspension_threshold(params.suspension_threshold)?;
    Ok(())
}

/// Apply a batch update to `current`, returning the new parameter set.
///
/// Nothing is returned unless every non-zero field is within bounds.
///
/// # Errors
///
/// - [`OracleError::ParameterOutOfBounds`] for the first out-of-bounds field
pub fn apply_update(current: &Parameters, update: &ParameterUpdate) -> Result<Parameters> {
    let mut next = current.clone();

    if update.min_validators != 0 {
        check_min_validators(update.min_validators)?;
        next.min_validators = update.min_validators;
    }
    if update.consensus_tolerance_bps != 0 {
        check_consensus_tolerance(update.consensus_tolerance_bps)?;
        next.consensus_tolerance_bps = update.consensus_tolerance_bps;
    }
    if update.staleness_threshold != 0 {
        check_staleness_threshold(update.staleness_threshold)?;
        next.staleness_threshold = update.staleness_threshold;
    }
    if update.circuit_breaker_bps != 0 {
        check_circuit_breaker(update.circuit_breaker_bps)?;
        next.circuit_breaker_bps = update.circuit_breaker_bps;
    }

    Ok(next)
}

/// Upgrade scheduling state.
#[derive(Debug, Clone, Default)]
pub struct UpgradeTimelock {
    implementation: Option<ImplementationHandle>,
    pending: Option<PendingUpgrade>,
}

impl UpgradeTimelock {
    pub fn new(
        implementation: Option<ImplementationHandle>,
        pending: Option<PendingUpgrade>,
    ) -> Self {
        Self {
            implementation,
            pending,
        }
    }

    /// The active implementation, if any upgrade was ever applied.
    pub fn implementation(&self) -> Option<ImplementationHandle> {
        self.implementation
    }

    pub fn pending(&self) -> Option<PendingUpgrade> {
        self.pending
    }

    /// Schedule `target` for `now + UPGRADE_DELAY_SECS`.
    ///
    /// # Errors
    ///
    /// - [`OracleError::ZeroAddress`] for a zero target
    /// - [`OracleError::NotExecutable`] if the target has no code
    /// - [`OracleError::UpgradeAlreadyScheduled`] if another upgrade is pending
    pub fn schedule(&mut self, target: ImplementationHandle, now: Timestamp) -> Result<PendingUpgrade> {
        if target.address.is_zero() {
            return Err(OracleError::ZeroAddress);
        }
        if !target.is_executable() {
            return Err(OracleError::NotExecutable(target.address));
        }
        if let Some(pending) = self.pending {
            return Err(OracleError::UpgradeAlreadyScheduled { eta: pending.eta });
        }

        let pending = PendingUpgrade {
            implementation: target,
            scheduled_at: now,
            eta: now.saturating_add(UPGRADE_DELAY_SECS),
        };
        self.pending = Some(pending);
        Ok(pending)
    }

    /// Drop the pending upgrade.
    ///
    /// # Errors
    ///
    /// - [`OracleError::NoUpgradeScheduled`] if nothing is pending
    pub fn cancel(&mut self) -> Result<PendingUpgrade> {
        self.pending.take().ok_or(OracleError::NoUpgradeScheduled)
    }

    /// Activate the pending upgrade once its delay has elapsed.
    ///
    /// # Errors
    ///
    /// - [`OracleError::NoUpgradeScheduled`] if nothing is pending
    /// - [`OracleError::TimelockNotElapsed`] before the eta
    pub fn apply(&mut self, now: Timestamp) -> Result<ImplementationHandle> {
        let pending = self.pending.ok_or(OracleError::NoUpgradeScheduled)?;
        if now < pending.eta {
            return Err(OracleError::TimelockNotElapsed {
                eta: pending.eta,
                now,
            });
        }
        self.pending = None;
        self.implementation = Some(pending.implementation);
        Ok(pending.implementation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_types::Address;

    fn target(n: u8) -> ImplementationHandle {
        ImplementationHandle {
            address: Address::from_low_u8(n),
            code_hash: [n; 32],
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        validate(&Parameters::default()).expect("defaults within bounds");
    }

    #[test]
    fn test_zero_fields_leave_unchanged() {
        let current = Parameters::default();
        let next = apply_update(&current, &ParameterUpdate::default()).expect("no-op");
        assert_eq!(next, current);
    }

    #[test]
    fn test_partial_update() {
        let current = Parameters::default();
        let next = apply_update(
            &current,
            &ParameterUpdate {
                min_validators: 7,
                circuit_breaker_bps: 1500,
                ..Default::default()
            },
        )
        .expect("update");
        assert_eq!(next.min_validators, 7);
        assert_eq!(next.circuit_breaker_bps, 1500);
        assert_eq!(next.staleness_threshold, current.staleness_threshold);
    }

    #[test]
    fn test_out_of_bounds_rejects_whole_update() {
        let current = Parameters::default();
        let err = apply_update(
            &current,
            &ParameterUpdate {
                min_validators: 9,
                circuit_breaker_bps: 2001,
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(
            err,
            OracleError::ParameterOutOfBounds {
                name: "circuit_breaker_bps",
                value: 2001
            }
        );
    }

    #[test]
    fn test_bounds() {
        assert!(check_min_validators(4).is_err());
        assert!(check_min_validators(5).is_ok());
        assert!(check_consensus_tolerance(501).is_err());
        assert!(check_consensus_tolerance(500).is_ok());
        assert!(check_staleness_threshold(299).is_err());
        assert!(check_staleness_threshold(300).is_ok());
        assert!(check_staleness_threshold(86_400).is_ok());
        assert!(check_staleness_threshold(86_401).is_err());
        assert!(check_circuit_breaker(2000).is_ok());
        assert!(check_twap_window(59).is_err());
        assert!(check_suspension_threshold(0).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_outlier_threshold() {
        let params = Parameters {
            outlier_threshold_bps: Some(0),
            ..Parameters::default()
        };
        assert!(matches!(
            validate(&params),
            Err(OracleError::ParameterOutOfBounds {
                name: "outlier_threshold_bps",
                ..
            })
        ));
    }

    #[test]
    fn test_apply_without_schedule() {
        let mut timelock = UpgradeTimelock::default();
        assert_eq!(timelock.apply(0), Err(OracleError::NoUpgradeScheduled));
        assert_eq!(timelock.cancel(), Err(OracleError::NoUpgradeScheduled));
    }

    #[test]
    fn test_timelock_lifecycle() {
        let mut timelock = UpgradeTimelock::default();
        let pending = timelock.schedule(target(1), 1000).expect("schedule");
        assert_eq!(pending.eta, 1000 + UPGRADE_DELAY_SECS);

        assert_eq!(
            timelock.apply(pending.eta - 1),
            Err(OracleError::TimelockNotElapsed {
                eta: pending.eta,
                now: pending.eta - 1
            })
        );
        assert_eq!(timelock.apply(pending.eta), Ok(target(1)));
        assert_eq!(timelock.implementation(), Some(target(1)));
        assert!(timelock.pending().is_none());
    }

    #[test]
    fn test_schedule_rejections() {
        let mut timelock = UpgradeTimelock::default();
        let zero = ImplementationHandle {
            address: Address::ZERO,
            code_hash: [1; 32],
        };
        assert_eq!(timelock.schedule(zero, 0), Err(OracleError::ZeroAddress));

        let no_code = ImplementationHandle {
            address: Address::from_low_u8(2),
            code_hash: [0; 32],
        };
        assert_eq!(
            timelock.schedule(no_code, 0),
            Err(OracleError::NotExecutable(no_code.address))
        );

        timelock.schedule(target(3), 0).expect("schedule");
        assert!(matches!(
            timelock.schedule(target(4), 10),
            Err(OracleError::UpgradeAlreadyScheduled { .. })
        ));
    }

    #[test]
    fn test_cancel_then_reschedule() {
        let mut timelock = UpgradeTimelock::default();
        timelock.schedule(target(1), 0).expect("schedule");
        let cancelled = timelock.cancel().expect("cancel");
        assert_eq!(cancelled.implementation, target(1));
        timelock.schedule(target(2), 5).expect("reschedule");
    }
}
