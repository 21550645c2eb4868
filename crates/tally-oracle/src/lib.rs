//! # tally-oracle
//!
//! Median-consensus price oracle.
//!
//! A permissioned set of validators submits prices for registered assets. Each
//! asset collects submissions in rounds; once a quorum is reached the round is
//! finalized at the median, the result is appended to a TWAP log and outliers
//! are charged a violation. Every submission is bounded three ways: against
//! the previous consensus (circuit breaker), against an hourly anchor
//! (cumulative drift), and against an optional external reference feed.
//!
//! ## Modules
//!
//! - [`oracle`]: [`PriceOracle`], the state machine tying everything together
//! - [`registry`]: asset registration
//! - [`round`]: round bookkeeping and median finalization
//! - [`anchor`]: hourly anchor and cumulative deviation ceiling
//! - [`reference`]: reference feed classification and normalization
//! - [`stub`]: static, configuration-driven reference source
//! - [`twap`]: recency-weighted TWAP
//! - [`violations`]: outlier scan and validator suspension
//! - [`circuit_breaker`]: rate-of-change bound, staleness, pause switch
//! - [`governor`]: parameter bounds and the upgrade timelock
//! - `journal`: priors of records changed since the last persisted point
//! - [`access`]: admin and validator roles
//! - [`math`]: basis-point deviation and median

pub mod access;
pub mod anchor;
pub mod circuit_breaker;
pub mod governor;
mod journal;
pub mod math;
pub mod oracle;
pub mod reference;
pub mod registry;
pub mod round;
pub mod stub;
pub mod twap;
pub mod violations;

pub use oracle::{BatchReport, PriceOracle, PriceVerification, SubmissionReceipt};

use tally_types::{Address, AssetId, Bps, Price, RoundIndex, Timestamp, ValidatorId};

/// Error types for oracle operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    /// Caller lacks the admin role.
    #[error("caller {0} is not an admin")]
    NotAdmin(Address),

    /// Caller lacks the validator role.
    #[error("caller {0} is not a validator")]
    NotValidator(Address),

    /// A required identifier is the zero address.
    #[error("zero address")]
    ZeroAddress,

    /// Submission targets an asset that is not actively registered.
    #[error("asset {0} is not registered")]
    AssetNotRegistered(AssetId),

    /// Deregistration of an asset that is absent or already inactive.
    #[error("asset {0} not registered")]
    NotRegistered(AssetId),

    /// The registry reached its maximum cardinality.
    #[error("asset registry full ({max} assets)")]
    RegistryFull {
        /// Maximum number of assets.
        max: usize,
    },

    /// Pagination offset past the end of the registry.
    #[error("offset {offset} out of bounds for {size} assets")]
    OffsetOutOfBounds {
        /// Requested offset.
        offset: usize,
        /// Number of registered assets.
        size: usize,
    },

    /// Price is zero.
    #[error("invalid price: {0}")]
    InvalidPrice(Price),

    /// The validator already submitted in the open round.
    #[error("validator {validator} already submitted for {asset} round {round}")]
    AlreadySubmitted {
        asset: AssetId,
        validator: ValidatorId,
        round: RoundIndex,
    },

    /// The validator accumulated too many violations.
    #[error("validator {validator} suspended after {violations} violations")]
    ValidatorSuspended {
        validator: ValidatorId,
        violations: u32,
    },

    /// The price moved too far from the previous consensus.
    #[error("circuit breaker triggered: previous {previous}, attempted {attempted}")]
    CircuitBreakerTriggered {
        /// Latest finalized consensus.
        previous: Price,
        /// Rejected price.
        attempted: Price,
    },

    /// The price drifted too far from the hourly anchor.
    #[error("cumulative deviation {deviation_bps} bps from anchor {anchor} (attempted {attempted})")]
    CumulativeDeviationExceeded {
        anchor: Price,
        attempted: Price,
        deviation_bps: u128,
    },

    /// The price disagrees with the reference feed.
    #[error("reference deviation {deviation_bps} bps from {reference} (attempted {attempted})")]
    ReferenceDeviationExceeded {
        reference: Price,
        attempted: Price,
        deviation_bps: u128,
    },

    /// Batch arrays differ in length.
    #[error("array length mismatch: {assets} assets, {prices} prices")]
    ArrayLengthMismatch { assets: usize, prices: usize },

    /// A parameter value is outside its bound.
    #[error("parameter {name} out of bounds: {value}")]
    ParameterOutOfBounds {
        /// Parameter name.
        name: &'static str,
        /// Rejected value.
        value: u64,
    },

    /// No reference feed is configured for the asset.
    #[error("no reference feed for asset {0}")]
    NoReferenceFeed(AssetId),

    /// Reference feed configuration is unusable.
    #[error("invalid reference feed config: {0}")]
    InvalidFeedConfig(String),

    /// The oracle is paused.
    #[error("oracle is paused")]
    Paused,

    /// No upgrade is pending.
    #[error("no upgrade scheduled")]
    NoUpgradeScheduled,

    /// An upgrade is already pending.
    #[error("upgrade already scheduled (eta {eta})")]
    UpgradeAlreadyScheduled {
        /// Earliest apply time of the pending upgrade.
        eta: Timestamp,
    },

    /// The upgrade delay has not elapsed.
    #[error("timelock not elapsed: eta {eta}, now {now}")]
    TimelockNotElapsed { eta: Timestamp, now: Timestamp },

    /// The upgrade target has no code.
    #[error("upgrade target {0} is not executable")]
    NotExecutable(Address),
}

impl OracleError {
    /// Convenience constructor for bound failures.
    pub(crate) fn out_of_bounds(name: &'static str, value: impl Into<u64>) -> Self {
        Self::ParameterOutOfBounds {
            name,
            value: value.into(),
        }
    }
}

/// Convenience result type for oracle operations.
pub type Result<T> = std::result::Result<T, OracleError>;

/// Compare a deviation against a basis-point threshold.
pub(crate) fn exceeds(deviation_bps: u128, threshold: Bps) -> bool {
    deviation_bps > u128::from(threshold)
}
