//! The price oracle state machine.
//!
//! [`PriceOracle`] owns every per-asset record and exposes the full mutating
//! and query surface. Mutations take `&mut self` and run to completion, so a
//! host that serializes access to the value preserves round atomicity.
//!
//! A submission passes, in order: pause gate, role and input checks,
//! suspension, circuit breaker, anchor, reference feed. Nothing is written
//! until all checks pass. Recording the quorum-th submission finalizes the
//! round, appends the TWAP observation and scans for outliers before the call
//! returns.
//!
//! Notifications are buffered and handed to the host by
//! [`drain_events`](PriceOracle::drain_events).
//!
//! Every record a mutation touches is journaled with its prior value. A host
//! persisting incrementally writes [`changes`](PriceOracle::changes), then
//! calls [`mark_persisted`](PriceOracle::mark_persisted) on success or
//! [`rollback`](PriceOracle::rollback) on failure. Hosts that only take full
//! snapshots call `mark_persisted` after each one to bound the journal.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tally_types::events::{OracleEvent, SkipReason};
use tally_types::governance::{ImplementationHandle, Parameters, PendingUpgrade};
use tally_types::state::{
    ConsensusState, OracleSnapshot, ReferenceFeedConfig, RoundRecord, StateDelta, TrackedAsset,
    UpgradeState,
};
use tally_types::{Address, AssetId, Bps, Price, RoundIndex, Timestamp, ValidatorId, BPS_DENOMINATOR};
use tracing::{debug, info, warn};

use crate::access::AccessControl;
use crate::anchor::{AnchorCheck, AnchorTracker};
use crate::circuit_breaker::{self, PauseSwitch};
use crate::governor::{self, ParameterUpdate, UpgradeTimelock};
use crate::journal::{keep, keep_slot, sorted, Journal};
use crate::math::deviation_bps;
use crate::reference::{self, PriceSource, ReferencePrice, Unavailable, MAX_SOURCE_DECIMALS};
use crate::registry::AssetRegistry;
use crate::round::{FinalizedRound, RoundBook};
use crate::twap::TwapLog;
use crate::violations::{find_outliers, ViolationTracker};
use crate::{exceeds, OracleError, Result};

/// Outcome of an accepted submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub asset: AssetId,
    pub round: RoundIndex,
    /// Submissions in the round after this one.
    pub submissions: u32,
    /// Set when this submission finalized the round.
    pub consensus: Option<Price>,
}

/// Outcome of a batch submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub accepted: Vec<SubmissionReceipt>,
    pub skipped: Vec<(AssetId, SkipReason)>,
}

/// Result of checking a candidate price against consensus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceVerification {
    pub within_tolerance: bool,
    pub deviation_bps: u128,
}

/// Checks that passed for a submission, ready to be committed.
struct Validated {
    anchor: AnchorCheck,
    reference_failure: Option<Unavailable>,
}

/// Median-consensus price oracle.
pub struct PriceOracle<A, S> {
    access: A,
    sources: S,
    params: Parameters,
    pause: PauseSwitch,
    registry: AssetRegistry,
    anchors: AnchorTracker,
    feeds: HashMap<AssetId, ReferenceFeedConfig>,
    rounds: RoundBook,
    twap: TwapLog,
    violations: ViolationTracker,
    upgrades: UpgradeTimelock,
    events: Vec<OracleEvent>,
    journal: Journal,
}

impl<A: AccessControl, S: PriceSource> PriceOracle<A, S> {
    /// Create an empty oracle.
    ///
    /// # Errors
    ///
    /// - [`OracleError::ParameterOutOfBounds`] if `params` violate a bound
    pub fn new(access: A, sources: S, params: Parameters) -> Result<Self> {
        governor::validate(&params)?;
        Ok(Self {
            access,
            sources,
            params,
            pause: PauseSwitch::default(),
            registry: AssetRegistry::new(),
            anchors: AnchorTracker::new(),
            feeds: HashMap::new(),
            rounds: RoundBook::new(),
            twap: TwapLog::new(),
            violations: ViolationTracker::new(),
            upgrades: UpgradeTimelock::default(),
            events: Vec::new(),
            journal: Journal::default(),
        })
    }

    /// Rebuild an oracle from a persisted snapshot.
    ///
    /// # Errors
    ///
    /// - [`OracleError::ParameterOutOfBounds`] if the stored parameters violate a bound
    pub fn restore(access: A, sources: S, snapshot: OracleSnapshot) -> Result<Self> {
        governor::validate(&snapshot.parameters)?;
        Ok(Self {
            access,
            sources,
            params: snapshot.parameters,
            pause: PauseSwitch::new(snapshot.paused),
            registry: AssetRegistry::from_records(snapshot.assets),
            anchors: AnchorTracker::from_records(snapshot.anchors),
            feeds: snapshot.reference_feeds.into_iter().collect(),
            rounds: RoundBook::from_records(snapshot.consensus, snapshot.rounds),
            twap: TwapLog::from_records(snapshot.observations),
            violations: ViolationTracker::from_records(snapshot.violations),
            upgrades: UpgradeTimelock::new(snapshot.implementation, snapshot.pending_upgrade),
            events: Vec::new(),
            journal: Journal::default(),
        })
    }

    /// Capture all persistent state.
    pub fn snapshot(&self) -> OracleSnapshot {
        let mut reference_feeds: Vec<_> = self.feeds.iter().map(|(k, v)| (*k, *v)).collect();
        reference_feeds.sort_by_key(|(asset, _)| *asset);

        OracleSnapshot {
            parameters: self.params.clone(),
            paused: self.pause.is_paused(),
            assets: self.registry.records(),
            consensus: self.rounds.consensus_records(),
            anchors: self.anchors.records(),
            reference_feeds,
            rounds: self.rounds.round_records(),
            observations: self.twap.records(),
            violations: self.violations.records(),
            implementation: self.upgrades.implementation(),
            pending_upgrade: self.upgrades.pending(),
        }
    }

    /// Records changed since the last [`mark_persisted`](Self::mark_persisted),
    /// at their current values.
    pub fn changes(&self) -> StateDelta {
        let journal = &self.journal;
        if journal.is_empty() {
            return StateDelta::default();
        }
        StateDelta {
            parameters: journal.parameters.as_ref().map(|_| self.params.clone()),
            paused: journal.paused.map(|_| self.pause.is_paused()),
            upgrades: journal.upgrades.map(|_| self.upgrade_state()),
            assets: sorted(&journal.assets)
                .into_iter()
                .filter_map(|(id, _)| Some((self.registry.position(&id)?, *self.registry.get(&id)?)))
                .collect(),
            consensus: sorted(&journal.consensus)
                .into_iter()
                .filter_map(|(asset, _)| Some((asset, self.rounds.consensus_record(&asset)?)))
                .collect(),
            anchors: sorted(&journal.anchors)
                .into_iter()
                .filter_map(|(asset, _)| Some((asset, self.anchors.get(&asset)?)))
                .collect(),
            reference_feeds: sorted(&journal.feeds)
                .into_iter()
                .map(|(asset, _)| (asset, self.feeds.get(&asset).copied()))
                .collect(),
            rounds: sorted(&journal.rounds)
                .into_iter()
                .filter_map(|((asset, index), _)| self.rounds.round(&asset, index).cloned())
                .collect(),
            observations: sorted(&journal.observations)
                .into_iter()
                .flat_map(|(asset, from)| {
                    self.twap
                        .observations(&asset)
                        .iter()
                        .enumerate()
                        .skip(*from)
                        .map(move |(seq, obs)| (asset, seq, *obs))
                })
                .collect(),
            violations: sorted(&journal.violations)
                .into_iter()
                .filter_map(|(validator, _)| Some((validator, self.violations.record_of(&validator)?)))
                .collect(),
        }
    }

    /// Forget the journal: everything up to now is persisted.
    pub fn mark_persisted(&mut self) {
        self.journal = Journal::default();
    }

    /// Undo every change since the last [`mark_persisted`](Self::mark_persisted)
    /// and drop the notifications buffered for them.
    pub fn rollback(&mut self) {
        let journal = std::mem::take(&mut self.journal);
        if let Some(params) = journal.parameters {
            self.params = params;
        }
        if let Some(paused) = journal.paused {
            self.pause = PauseSwitch::new(paused);
        }
        if let Some(UpgradeState {
            implementation,
            pending,
        }) = journal.upgrades
        {
            self.upgrades = UpgradeTimelock::new(implementation, pending);
        }
        for (id, prior) in journal.assets {
            self.registry.restore(id, prior);
        }
        for (asset, prior) in journal.consensus {
            self.rounds.restore_consensus(asset, prior);
        }
        for ((asset, index), prior) in journal.rounds {
            self.rounds.restore_round(asset, index, prior);
        }
        for (asset, prior) in journal.anchors {
            self.anchors.restore(asset, prior);
        }
        for (asset, prior) in journal.feeds {
            match prior {
                Some(config) => self.feeds.insert(asset, config),
                None => self.feeds.remove(&asset),
            };
        }
        for (asset, len) in journal.observations {
            self.twap.truncate(&asset, len);
        }
        for (validator, prior) in journal.violations {
            self.violations.restore(validator, prior);
        }
        debug!(dropped_events = self.events.len(), "rolled back unpersisted changes");
        self.events.clear();
    }

    /// Take all buffered notifications.
    pub fn drain_events(&mut self) -> Vec<OracleEvent> {
        std::mem::take(&mut self.events)
    }

    fn upgrade_state(&self) -> UpgradeState {
        UpgradeState {
            implementation: self.upgrades.implementation(),
            pending: self.upgrades.pending(),
        }
    }

    pub fn access(&self) -> &A {
        &self.access
    }

    pub fn access_mut(&mut self) -> &mut A {
        &mut self.access
    }

    pub fn sources_mut(&mut self) -> &mut S {
        &mut self.sources
    }

    fn ensure_admin(&self, caller: &Address) -> Result<()> {
        if !self.access.is_admin(caller) {
            return Err(OracleError::NotAdmin(*caller));
        }
        Ok(())
    }

    /// Pause gate then admin role, the prologue of every governed mutation.
    fn ensure_admin_running(&self, caller: &Address) -> Result<()> {
        self.pause.ensure_running()?;
        self.ensure_admin(caller)
    }

    fn ensure_validator(&self, caller: &ValidatorId) -> Result<()> {
        if !self.access.is_validator(caller) {
            return Err(OracleError::NotValidator(*caller));
        }
        Ok(())
    }

    fn ensure_not_suspended(&self, validator: &ValidatorId) -> Result<()> {
        if self
            .violations
            .is_suspended(validator, self.params.suspension_threshold)
        {
            return Err(OracleError::ValidatorSuspended {
                validator: *validator,
                violations: self.violations.count(validator),
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Asset registry
    // ------------------------------------------------------------------

    /// Register an asset. Registering an active asset is a no-op.
    pub fn register_asset(&mut self, caller: &Address, asset: AssetId, now: Timestamp) -> Result<()> {
        self.ensure_admin_running(caller)?;
        let prior = self.registry.get(&asset).copied();
        if self.registry.register(asset, now)? {
            keep(&mut self.journal.assets, asset, || prior);
            info!(asset = %asset, "asset registered");
            self.events.push(OracleEvent::AssetRegistered {
                asset,
                timestamp: now,
            });
        }
        Ok(())
    }

    /// Deactivate an asset.
    pub fn deregister_asset(&mut self, caller: &Address, asset: AssetId) -> Result<()> {
        self.ensure_admin_running(caller)?;
        let prior = self.registry.get(&asset).copied();
        self.registry.deregister(&asset)?;
        keep(&mut self.journal.assets, asset, || prior);
        info!(asset = %asset, "asset deregistered");
        self.events.push(OracleEvent::AssetDeregistered { asset });
        Ok(())
    }

    pub fn list_assets(&self, offset: usize, limit: usize) -> Result<Vec<TrackedAsset>> {
        self.registry.list(offset, limit)
    }

    pub fn is_registered(&self, asset: &AssetId) -> bool {
        self.registry.is_active(asset)
    }

    pub fn active_asset_count(&self) -> usize {
        self.registry.active_count()
    }

    // ------------------------------------------------------------------
    // Submissions
    // ------------------------------------------------------------------

    /// Submit a price for `asset` as `validator`.
    ///
    /// # Errors
    ///
    /// Every rejection leaves state untouched:
    /// [`Paused`](OracleError::Paused), [`NotValidator`](OracleError::NotValidator),
    /// [`ZeroAddress`](OracleError::ZeroAddress),
    /// [`AssetNotRegistered`](OracleError::AssetNotRegistered),
    /// [`InvalidPrice`](OracleError::InvalidPrice),
    /// [`AlreadySubmitted`](OracleError::AlreadySubmitted),
    /// [`ValidatorSuspended`](OracleError::ValidatorSuspended),
    /// [`CircuitBreakerTriggered`](OracleError::CircuitBreakerTriggered),
    /// [`CumulativeDeviationExceeded`](OracleError::CumulativeDeviationExceeded),
    /// [`ReferenceDeviationExceeded`](OracleError::ReferenceDeviationExceeded).
    pub fn submit_price(
        &mut self,
        validator: &ValidatorId,
        asset: AssetId,
        price: Price,
        now: Timestamp,
    ) -> Result<SubmissionReceipt> {
        self.pause.ensure_running()?;
        self.ensure_validator(validator)?;
        if asset.is_zero() {
            return Err(OracleError::ZeroAddress);
        }
        if !self.registry.is_active(&asset) {
            return Err(OracleError::AssetNotRegistered(asset));
        }
        if price == 0 {
            return Err(OracleError::InvalidPrice(price));
        }

        let validated = self.validate_submission(validator, asset, price, now)?;
        Ok(self.accept(*validator, asset, price, now, validated))
    }

    /// Submit prices for several assets as one validator.
    ///
    /// Zero-address, zero-price and unregistered items are skipped, as are
    /// items rejected by a protocol-safety check; each skip is notified and
    /// the rest of the batch proceeds.
    ///
    /// # Errors
    ///
    /// - [`OracleError::ArrayLengthMismatch`] if `assets` and `prices` differ in length
    /// - [`OracleError::Paused`], [`OracleError::NotValidator`],
    ///   [`OracleError::ValidatorSuspended`] before any item is processed
    pub fn submit_price_batch(
        &mut self,
        validator: &ValidatorId,
        assets: &[AssetId],
        prices: &[Price],
        now: Timestamp,
    ) -> Result<BatchReport> {
        self.pause.ensure_running()?;
        self.ensure_validator(validator)?;
        if assets.len() != prices.len() {
            return Err(OracleError::ArrayLengthMismatch {
                assets: assets.len(),
                prices: prices.len(),
            });
        }
        self.ensure_not_suspended(validator)?;

        let mut report = BatchReport::default();
        for (&asset, &price) in assets.iter().zip(prices) {
            let outcome = if asset.is_zero() {
                Err(SkipReason::ZeroAddress)
            } else if price == 0 {
                Err(SkipReason::InvalidPrice)
            } else if !self.registry.is_active(&asset) {
                Err(SkipReason::AssetNotRegistered)
            } else {
                self.validate_submission(validator, asset, price, now)
                    .map_err(|e| SkipReason::Rejected {
                        detail: e.to_string(),
                    })
            };

            match outcome {
                Ok(validated) => {
                    let receipt = self.accept(*validator, asset, price, now, validated);
                    report.accepted.push(receipt);
                }
                Err(reason) => {
                    debug!(asset = %asset, validator = %validator, ?reason, "batch item skipped");
                    self.events.push(OracleEvent::SubmissionSkipped {
                        asset,
                        validator: *validator,
                        reason: reason.clone(),
                    });
                    report.skipped.push((asset, reason));
                }
            }
        }

        Ok(report)
    }

    /// Side-effect-free checks from the duplicate check through the reference feed.
    fn validate_submission(
        &self,
        validator: &ValidatorId,
        asset: AssetId,
        price: Price,
        now: Timestamp,
    ) -> Result<Validated> {
        if self.rounds.has_submitted(&asset, validator) {
            return Err(OracleError::AlreadySubmitted {
                asset,
                validator: *validator,
                round: self.rounds.current_round(&asset),
            });
        }
        self.ensure_not_suspended(validator)?;

        let previous = self.rounds.consensus(&asset).latest_price;
        circuit_breaker::check_price_change(previous, price, self.params.circuit_breaker_bps)?;

        let anchor = self.anchors.check(&asset, price, now).inspect_err(|e| {
            warn!(asset = %asset, validator = %validator, error = %e, "anchor check failed");
        })?;

        let reference_failure = match self.reference_price(&asset, now) {
            ReferencePrice::NotConfigured => None,
            ReferencePrice::Unavailable(reason) => Some(reason),
            ReferencePrice::Available(reference) => {
                let deviation = deviation_bps(price, reference);
                if exceeds(deviation, self.params.reference_deviation_bps) {
                    warn!(
                        asset = %asset,
                        validator = %validator,
                        reference,
                        attempted = price,
                        deviation_bps = %deviation,
                        "reference deviation exceeded"
                    );
                    return Err(OracleError::ReferenceDeviationExceeded {
                        reference,
                        attempted: price,
                        deviation_bps: deviation,
                    });
                }
                None
            }
        };

        Ok(Validated {
            anchor,
            reference_failure,
        })
    }

    /// Commit a validated submission and finalize the round on quorum.
    fn accept(
        &mut self,
        validator: ValidatorId,
        asset: AssetId,
        price: Price,
        now: Timestamp,
        validated: Validated,
    ) -> SubmissionReceipt {
        if let Some(reason) = validated.reference_failure {
            warn!(asset = %asset, %reason, "reference feed unavailable, bound skipped");
            self.events.push(OracleEvent::ReferenceFeedFailed {
                asset,
                reason: reason.to_string(),
            });
        }
        if matches!(validated.anchor, AnchorCheck::Reset(_)) {
            keep(&mut self.journal.anchors, asset, || self.anchors.get(&asset));
        }
        self.anchors.commit(asset, validated.anchor);

        let open = self.rounds.current_round(&asset);
        keep(&mut self.journal.rounds, (asset, open), || {
            self.rounds.round(&asset, open).cloned()
        });
        let (round, submissions) = self.rounds.record(asset, validator, price);
        debug!(asset = %asset, validator = %validator, price, round, submissions, "price submitted");
        self.events.push(OracleEvent::PriceSubmitted {
            asset,
            validator,
            price,
            round,
        });

        let mut receipt = SubmissionReceipt {
            asset,
            round,
            submissions,
            consensus: None,
        };

        if submissions >= self.params.min_validators {
            keep(&mut self.journal.consensus, asset, || {
                self.rounds.consensus_record(&asset)
            });
            if let Some(finalized) = self.rounds.finalize(asset, now) {
                receipt.consensus = Some(finalized.median);
                self.on_finalized(finalized);
            }
        }
        receipt
    }

    fn on_finalized(&mut self, finalized: FinalizedRound) {
        let FinalizedRound {
            asset,
            round,
            median,
            submissions,
            timestamp,
        } = finalized;

        keep(&mut self.journal.observations, asset, || self.twap.len(&asset));
        self.twap.record(asset, median, timestamp);

        let threshold = self.params.outlier_threshold();
        for outlier in find_outliers(&submissions, median, threshold) {
            let was_suspended = self
                .violations
                .is_suspended(&outlier.validator, self.params.suspension_threshold);
            keep(&mut self.journal.violations, outlier.validator, || {
                self.violations.record_of(&outlier.validator)
            });
            let count = self.violations.record(outlier.validator);
            warn!(
                asset = %asset,
                validator = %outlier.validator,
                submitted = outlier.submitted,
                median,
                deviation_bps = %outlier.deviation_bps,
                violations = count,
                "outlier detected"
            );
            self.events.push(OracleEvent::OutlierDetected {
                asset,
                validator: outlier.validator,
                submitted: outlier.submitted,
                median,
                violations_added: 1,
            });

            if !was_suspended
                && self
                    .violations
                    .is_suspended(&outlier.validator, self.params.suspension_threshold)
            {
                warn!(validator = %outlier.validator, violations = count, "validator suspended");
                self.events.push(OracleEvent::ValidatorSuspended {
                    validator: outlier.validator,
                    violations: count,
                });
            }
        }

        info!(
            asset = %asset,
            price = median,
            round,
            submissions = submissions.len(),
            "consensus reached"
        );
        self.events.push(OracleEvent::ConsensusReached {
            asset,
            price: median,
            round,
            submissions: submissions.len() as u32,
            timestamp,
        });
    }

    // ------------------------------------------------------------------
    // Reference feeds
    // ------------------------------------------------------------------

    /// Bind a reference feed to a registered asset.
    ///
    /// # Errors
    ///
    /// - [`OracleError::AssetNotRegistered`] for an unknown or inactive asset
    /// - [`OracleError::ZeroAddress`] for a zero source
    /// - [`OracleError::InvalidFeedConfig`] if the decimals exceed [`MAX_SOURCE_DECIMALS`]
    pub fn set_reference_feed(
        &mut self,
        caller: &Address,
        asset: AssetId,
        config: ReferenceFeedConfig,
    ) -> Result<()> {
        self.ensure_admin_running(caller)?;
        if !self.registry.is_active(&asset) {
            return Err(OracleError::AssetNotRegistered(asset));
        }
        if config.source.is_zero() {
            return Err(OracleError::ZeroAddress);
        }
        if config.source_decimals > MAX_SOURCE_DECIMALS {
            return Err(OracleError::InvalidFeedConfig(format!(
                "source decimals {} exceed {MAX_SOURCE_DECIMALS}",
                config.source_decimals
            )));
        }

        info!(asset = %asset, source = %config.source, enabled = config.enabled, "reference feed set");
        keep(&mut self.journal.feeds, asset, || self.feeds.get(&asset).copied());
        self.feeds.insert(asset, config);
        self.events.push(OracleEvent::ReferenceFeedSet {
            asset,
            source: config.source,
            decimals: config.source_decimals,
        });
        Ok(())
    }

    /// Remove the reference feed of an asset.
    pub fn clear_reference_feed(&mut self, caller: &Address, asset: AssetId) -> Result<()> {
        self.ensure_admin_running(caller)?;
        let prior = self
            .feeds
            .remove(&asset)
            .ok_or(OracleError::NoReferenceFeed(asset))?;
        keep(&mut self.journal.feeds, asset, || Some(prior));
        info!(asset = %asset, "reference feed cleared");
        self.events.push(OracleEvent::ReferenceFeedCleared { asset });
        Ok(())
    }

    pub fn reference_feed(&self, asset: &AssetId) -> Option<ReferenceFeedConfig> {
        self.feeds.get(asset).copied()
    }

    /// Classified reference price for an asset at `now`.
    pub fn reference_price(&self, asset: &AssetId, now: Timestamp) -> ReferencePrice {
        reference::query(
            self.feeds.get(asset),
            &self.sources,
            now,
            self.params.staleness_threshold,
        )
    }

    // ------------------------------------------------------------------
    // Parameters
    // ------------------------------------------------------------------

    fn commit_parameters(&mut self, next: Parameters) -> Parameters {
        info!(
            min_validators = next.min_validators,
            consensus_tolerance_bps = next.consensus_tolerance_bps,
            staleness_threshold = next.staleness_threshold,
            circuit_breaker_bps = next.circuit_breaker_bps,
            reference_deviation_bps = next.reference_deviation_bps,
            twap_window = next.twap_window,
            outlier_threshold_bps = next.outlier_threshold(),
            suspension_threshold = next.suspension_threshold,
            "parameters updated"
        );
        keep_slot(&mut self.journal.parameters, || self.params.clone());
        self.params = next.clone();
        self.events.push(OracleEvent::ParametersUpdated {
            parameters: next.clone(),
        });
        next
    }

    /// Apply a batch update; zero fields are left unchanged.
    pub fn update_parameters(&mut self, caller: &Address, update: ParameterUpdate) -> Result<Parameters> {
        self.ensure_admin_running(caller)?;
        let next = governor::apply_update(&self.params, &update)?;
        Ok(self.commit_parameters(next))
    }

    pub fn set_reference_deviation_threshold(&mut self, caller: &Address, bps: Bps) -> Result<Parameters> {
        self.ensure_admin_running(caller)?;
        governor::check_reference_deviation(bps)?;
        let next = Parameters {
            reference_deviation_bps: bps,
            ..self.params.clone()
        };
        Ok(self.commit_parameters(next))
    }

    pub fn set_twap_window(&mut self, caller: &Address, window: u64) -> Result<Parameters> {
        self.ensure_admin_running(caller)?;
        governor::check_twap_window(window)?;
        let next = Parameters {
            twap_window: window,
            ..self.params.clone()
        };
        Ok(self.commit_parameters(next))
    }

    /// Set an explicit outlier threshold, or `None` to track the circuit breaker.
    pub fn set_outlier_threshold(&mut self, caller: &Address, bps: Option<Bps>) -> Result<Parameters> {
        self.ensure_admin_running(caller)?;
        if let Some(bps) = bps {
            governor::check_outlier_threshold(bps)?;
        }
        let next = Parameters {
            outlier_threshold_bps: bps,
            ..self.params.clone()
        };
        Ok(self.commit_parameters(next))
    }

    pub fn set_suspension_threshold(&mut self, caller: &Address, violations: u32) -> Result<Parameters> {
        self.ensure_admin_running(caller)?;
        governor::check_suspension_threshold(violations)?;
        let next = Parameters {
            suspension_threshold: violations,
            ..self.params.clone()
        };
        Ok(self.commit_parameters(next))
    }

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    // ------------------------------------------------------------------
    // Pause and upgrades
    // ------------------------------------------------------------------

    pub fn pause(&mut self, caller: &Address) -> Result<()> {
        self.ensure_admin(caller)?;
        if self.pause.trigger_pause() {
            keep_slot(&mut self.journal.paused, || false);
            self.events.push(OracleEvent::Paused);
        }
        Ok(())
    }

    pub fn unpause(&mut self, caller: &Address) -> Result<()> {
        self.ensure_admin(caller)?;
        if self.pause.resume() {
            keep_slot(&mut self.journal.paused, || true);
            self.events.push(OracleEvent::Unpaused);
        }
        Ok(())
    }

    pub fn is_paused(&self) -> bool {
        self.pause.is_paused()
    }

    pub fn schedule_upgrade(
        &mut self,
        caller: &Address,
        implementation: ImplementationHandle,
        now: Timestamp,
    ) -> Result<PendingUpgrade> {
        self.ensure_admin(caller)?;
        let prior = self.upgrade_state();
        let pending = self.upgrades.schedule(implementation, now)?;
        keep_slot(&mut self.journal.upgrades, || prior);
        info!(implementation = %implementation.address, eta = pending.eta, "upgrade scheduled");
        self.events.push(OracleEvent::UpgradeScheduled {
            implementation,
            eta: pending.eta,
        });
        Ok(pending)
    }

    pub fn cancel_upgrade(&mut self, caller: &Address) -> Result<()> {
        self.ensure_admin(caller)?;
        let prior = self.upgrade_state();
        let cancelled = self.upgrades.cancel()?;
        keep_slot(&mut self.journal.upgrades, || prior);
        info!(implementation = %cancelled.implementation.address, "upgrade cancelled");
        self.events.push(OracleEvent::UpgradeCancelled {
            implementation: cancelled.implementation,
        });
        Ok(())
    }

    pub fn apply_upgrade(&mut self, caller: &Address, now: Timestamp) -> Result<ImplementationHandle> {
        self.ensure_admin(caller)?;
        let prior = self.upgrade_state();
        let implementation = self.upgrades.apply(now)?;
        keep_slot(&mut self.journal.upgrades, || prior);
        info!(implementation = %implementation.address, "upgrade applied");
        self.events.push(OracleEvent::UpgradeApplied { implementation });
        Ok(implementation)
    }

    pub fn pending_upgrade(&self) -> Option<PendingUpgrade> {
        self.upgrades.pending()
    }

    pub fn implementation(&self) -> Option<ImplementationHandle> {
        self.upgrades.implementation()
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Latest consensus price, zero if none.
    pub fn latest_price(&self, asset: &AssetId) -> Price {
        self.rounds.consensus(asset).latest_price
    }

    pub fn consensus(&self, asset: &AssetId) -> ConsensusState {
        self.rounds.consensus(asset)
    }

    /// Whether the consensus is missing or older than the staleness threshold.
    pub fn is_stale(&self, asset: &AssetId, now: Timestamp) -> bool {
        circuit_breaker::is_stale(
            self.rounds.consensus(asset).last_update,
            now,
            self.params.staleness_threshold,
        )
    }

    pub fn twap(&self, asset: &AssetId, now: Timestamp) -> Price {
        self.twap.twap(asset, now, self.params.twap_window)
    }

    /// Compare `candidate` with the stored consensus.
    ///
    /// Without a consensus the result is `(false, 10000)`.
    pub fn verify_price(&self, asset: &AssetId, candidate: Price) -> PriceVerification {
        let consensus = self.latest_price(asset);
        if consensus == 0 {
            return PriceVerification {
                within_tolerance: false,
                deviation_bps: u128::from(BPS_DENOMINATOR),
            };
        }
        let deviation = deviation_bps(candidate, consensus);
        PriceVerification {
            within_tolerance: !exceeds(deviation, self.params.consensus_tolerance_bps),
            deviation_bps: deviation,
        }
    }

    pub fn round(&self, asset: &AssetId, index: RoundIndex) -> Option<&RoundRecord> {
        self.rounds.round(asset, index)
    }

    pub fn violation_count(&self, validator: &ValidatorId) -> u32 {
        self.violations.count(validator)
    }

    pub fn is_suspended(&self, validator: &ValidatorId) -> bool {
        self.violations
            .is_suspended(validator, self.params.suspension_threshold)
    }
}
