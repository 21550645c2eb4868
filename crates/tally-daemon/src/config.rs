//! Configuration file management.
//!
//! `config.toml` lives in the data directory. Every section and field is
//! optional; a missing file yields the defaults.

use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tally_oracle::access::StaticAccess;
use tally_oracle::reference::FeedReading;
use tally_oracle::stub::StaticPriceSource;
use tally_types::governance::{
    Parameters, DEFAULT_CIRCUIT_BREAKER_BPS, DEFAULT_CONSENSUS_TOLERANCE_BPS,
    DEFAULT_MIN_VALIDATORS, DEFAULT_REFERENCE_DEVIATION_BPS, DEFAULT_STALENESS_THRESHOLD,
    DEFAULT_SUSPENSION_THRESHOLD, DEFAULT_TWAP_WINDOW,
};
use tally_types::{Address, Bps};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "TALLY_DATA_DIR";

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    /// Initial oracle parameters. Ignored once parameters are stored.
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub access: AccessConfig,
    /// Static reference feed readings.
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
    #[serde(default)]
    pub advanced: AdvancedConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
}

/// Oracle parameter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default = "default_min_validators")]
    pub min_validators: u32,
    #[serde(default = "default_consensus_tolerance")]
    pub consensus_tolerance_bps: Bps,
    #[serde(default = "default_staleness")]
    pub staleness_threshold_secs: u64,
    #[serde(default = "default_circuit_breaker")]
    pub circuit_breaker_bps: Bps,
    #[serde(default = "default_reference_deviation")]
    pub reference_deviation_bps: Bps,
    #[serde(default = "default_twap_window")]
    pub twap_window_secs: u64,
    /// Absent = track `circuit_breaker_bps`.
    #[serde(default)]
    pub outlier_threshold_bps: Option<Bps>,
    #[serde(default = "default_suspension_threshold")]
    pub suspension_threshold: u32,
}

/// Role assignments, as hex addresses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessConfig {
    #[serde(default)]
    pub admins: Vec<String>,
    #[serde(default)]
    pub validators: Vec<String>,
}

/// A static reading served for one reference source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub source: String,
    pub answer: i64,
    #[serde(default = "default_feed_decimals")]
    pub decimals: u8,
    /// Unix seconds. 0 = daemon start time.
    #[serde(default)]
    pub updated_at: u64,
}

/// Advanced configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    /// Log level: "trace" | "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Event bus capacity per subscriber.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

// Default value functions

fn default_min_validators() -> u32 {
    DEFAULT_MIN_VALIDATORS
}

fn default_consensus_tolerance() -> Bps {
    DEFAULT_CONSENSUS_TOLERANCE_BPS
}

fn default_staleness() -> u64 {
    DEFAULT_STALENESS_THRESHOLD
}

fn default_circuit_breaker() -> Bps {
    DEFAULT_CIRCUIT_BREAKER_BPS
}

fn default_reference_deviation() -> Bps {
    DEFAULT_REFERENCE_DEVIATION_BPS
}

fn default_twap_window() -> u64 {
    DEFAULT_TWAP_WINDOW
}

fn default_suspension_threshold() -> u32 {
    DEFAULT_SUSPENSION_THRESHOLD
}

fn default_feed_decimals() -> u8 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_event_buffer() -> usize {
    1000
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            min_validators: default_min_validators(),
            consensus_tolerance_bps: default_consensus_tolerance(),
            staleness_threshold_secs: default_staleness(),
            circuit_breaker_bps: default_circuit_breaker(),
            reference_deviation_bps: default_reference_deviation(),
            twap_window_secs: default_twap_window(),
            outlier_threshold_bps: None,
            suspension_threshold: default_suspension_threshold(),
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl OracleConfig {
    /// Oracle parameters. Bounds are checked when the oracle is built.
    pub fn to_parameters(&self) -> Parameters {
        Parameters {
            min_validators: self.min_validators,
            consensus_tolerance_bps: self.consensus_tolerance_bps,
            staleness_threshold: self.staleness_threshold_secs,
            circuit_breaker_bps: self.circuit_breaker_bps,
            reference_deviation_bps: self.reference_deviation_bps,
            twap_window: self.twap_window_secs,
            outlier_threshold_bps: self.outlier_threshold_bps,
            suspension_threshold: self.suspension_threshold,
        }
    }
}

fn parse_addresses(field: &str, values: &[String]) -> anyhow::Result<Vec<Address>> {
    values
        .iter()
        .map(|v| {
            v.parse::<Address>()
                .with_context(|| format!("invalid address in {field}: {v}"))
        })
        .collect()
}

impl AccessConfig {
    pub fn to_access(&self) -> anyhow::Result<StaticAccess> {
        Ok(StaticAccess::new(
            parse_addresses("access.admins", &self.admins)?,
            parse_addresses("access.validators", &self.validators)?,
        ))
    }
}

impl DaemonConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: DaemonConfig = toml::from_str(&content)
                .with_context(|| format!("parsing {}", config_path.display()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Build the static reference source. Readings with `updated_at = 0` are
    /// stamped with `now`.
    pub fn price_source(&self, now: u64) -> anyhow::Result<StaticPriceSource> {
        let readings = self
            .feeds
            .iter()
            .map(|feed| {
                let source = feed
                    .source
                    .parse::<Address>()
                    .with_context(|| format!("invalid feed source: {}", feed.source))?;
                let updated_at = if feed.updated_at == 0 {
                    now
                } else {
                    feed.updated_at
                };
                Ok((
                    source,
                    FeedReading {
                        answer: i128::from(feed.answer),
                        decimals: feed.decimals,
                        updated_at,
                    },
                ))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(StaticPriceSource::with_readings(readings))
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> PathBuf {
        if self.storage.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.storage.data_dir)
        }
    }

    fn config_path() -> PathBuf {
        Self::default_data_dir().join("config.toml")
    }

    /// Platform-specific default data directory.
    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            return PathBuf::from(dir);
        }
        #[cfg(target_os = "macos")]
        {
            dirs_fallback("Library/Application Support/Tally")
        }
        #[cfg(not(target_os = "macos"))]
        {
            dirs_fallback(".tally")
        }
    }
}

/// Fallback home directory resolution.
fn dirs_fallback(subpath: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(subpath))
        .unwrap_or_else(|_| PathBuf::from("/tmp/tally"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_oracle::access::AccessControl;
    use tally_oracle::reference::PriceSource;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.oracle.to_parameters(), Parameters::default());
        assert_eq!(config.advanced.log_level, "info");
        assert_eq!(config.advanced.event_buffer, 1000);
        assert!(config.feeds.is_empty());
    }

    #[test]
    fn test_config_serialization() {
        let config = DaemonConfig::default();
        let toml_str = toml::to_string(&config).expect("serialize");
        let _parsed: DaemonConfig = toml::from_str(&toml_str).expect("parse");
    }

    #[test]
    fn test_partial_config() {
        let config: DaemonConfig = toml::from_str(
            r#"
            [oracle]
            min_validators = 7
            outlier_threshold_bps = 300

            [access]
            admins = ["0x00000000000000000000000000000000000000aa"]
            validators = ["0000000000000000000000000000000000000001"]

            [[feeds]]
            source = "0x00000000000000000000000000000000000000fe"
            answer = 200000000000
            decimals = 8
            "#,
        )
        .expect("parse");

        let params = config.oracle.to_parameters();
        assert_eq!(params.min_validators, 7);
        assert_eq!(params.outlier_threshold(), 300);
        assert_eq!(params.circuit_breaker_bps, DEFAULT_CIRCUIT_BREAKER_BPS);

        let access = config.access.to_access().expect("access");
        assert!(access.is_admin(&Address::from_low_u8(0xaa)));
        assert!(access.is_validator(&Address::from_low_u8(1)));

        let source = config.price_source(42).expect("source");
        let reading = source
            .latest_price(&Address::from_low_u8(0xfe))
            .expect("reading");
        assert_eq!(reading.answer, 200_000_000_000);
        assert_eq!(reading.updated_at, 42);
    }

    #[test]
    fn test_bad_address_rejected() {
        let config: DaemonConfig = toml::from_str(
            r#"
            [access]
            validators = ["0xnothex"]
            "#,
        )
        .expect("parse");
        assert!(config.access.to_access().is_err());
    }
}
