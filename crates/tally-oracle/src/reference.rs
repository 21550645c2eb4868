//! Reference feed adapter.
//!
//! Wraps an external price source per asset. A reading is only usable when it
//! is positive, fresh, reported at the configured decimals and representable
//! at [`PRICE_DECIMALS`]. Anything else degrades to [`ReferencePrice::Unavailable`]
//! and never fails a submission on its own.

use std::fmt;

use tally_types::state::ReferenceFeedConfig;
use tally_types::{Price, SourceHandle, Timestamp, PRICE_DECIMALS};

/// Largest accepted source decimals.
pub const MAX_SOURCE_DECIMALS: u8 = 36;

/// A raw reading from an external source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedReading {
    /// Signed answer; non-positive values are unusable.
    pub answer: i128,
    pub decimals: u8,
    pub updated_at: Timestamp,
}

/// Failure reaching a source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    /// The source call reverted or errored.
    #[error("source call failed: {0}")]
    Failed(String),

    /// The source did not answer in time.
    #[error("source timed out")]
    Timeout,

    /// No source is known under this handle.
    #[error("unknown source {0}")]
    UnknownSource(SourceHandle),
}

/// An external price source.
///
/// Implementations must be fail-fast: report [`FeedError::Timeout`] instead of
/// blocking.
pub trait PriceSource {
    fn latest_price(&self, source: &SourceHandle) -> Result<FeedReading, FeedError>;
}

/// Why a reference reading was discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unavailable {
    Failed(FeedError),
    NonPositive(i128),
    Stale { updated_at: Timestamp, age: u64 },
    DecimalsMismatch { configured: u8, reported: u8 },
    Unrepresentable,
}

impl fmt::Display for Unavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(e) => write!(f, "{e}"),
            Self::NonPositive(answer) => write!(f, "non-positive answer {answer}"),
            Self::Stale { updated_at, age } => {
                write!(f, "stale answer from {updated_at} ({age}s old)")
            }
            Self::DecimalsMismatch {
                configured,
                reported,
            } => write!(f, "decimals mismatch: configured {configured}, reported {reported}"),
            Self::Unrepresentable => write!(f, "answer not representable at {PRICE_DECIMALS} decimals"),
        }
    }
}

/// Classified reference price for one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferencePrice {
    /// No feed configured, or the feed is disabled.
    NotConfigured,
    Unavailable(Unavailable),
    /// Normalized to [`PRICE_DECIMALS`].
    Available(Price),
}

/// Rescale `value` from `from_decimals` to [`PRICE_DECIMALS`].
///
/// Scaling down truncates. Returns `None` on overflow.
pub fn normalize(value: u128, from_decimals: u8) -> Option<Price> {
    if from_decimals >= PRICE_DECIMALS {
        let factor = 10u128.checked_pow(u32::from(from_decimals - PRICE_DECIMALS))?;
        Some(value / factor)
    } else {
        let factor = 10u128.checked_pow(u32::from(PRICE_DECIMALS - from_decimals))?;
        value.checked_mul(factor)
    }
}

/// Query and classify the reference price for a feed configuration.
pub fn query<S: PriceSource + ?Sized>(
    config: Option<&ReferenceFeedConfig>,
    source: &S,
    now: Timestamp,
    staleness_threshold: u64,
) -> ReferencePrice {
    let config = match config {
        Some(c) if c.enabled => c,
        _ => return ReferencePrice::NotConfigured,
    };

    let reading = match source.latest_price(&config.source) {
        Ok(reading) => reading,
        Err(e) => return ReferencePrice::Unavailable(Unavailable::Failed(e)),
    };

    if reading.answer <= 0 {
        return ReferencePrice::Unavailable(Unavailable::NonPositive(reading.answer));
    }

    let age = now.saturating_sub(reading.updated_at);
    if age > staleness_threshold {
        return ReferencePrice::Unavailable(Unavailable::Stale {
            updated_at: reading.updated_at,
            age,
        });
    }

    if reading.decimals != config.source_decimals {
        return ReferencePrice::Unavailable(Unavailable::DecimalsMismatch {
            configured: config.source_decimals,
            reported: reading.decimals,
        });
    }

    // answer > 0 so the cast is lossless
    match normalize(reading.answer as u128, config.source_decimals) {
        Some(0) | None => ReferencePrice::Unavailable(Unavailable::Unrepresentable),
        Some(price) => ReferencePrice::Available(price),
    }
}
