//! SQL schema definitions.

/// Complete schema for the v1 database.
pub const SCHEMA_V1: &str = r#"
-- ============================================================
-- Registry
-- ============================================================

CREATE TABLE IF NOT EXISTS assets (
    asset BLOB PRIMARY KEY,
    active INTEGER NOT NULL DEFAULT 1,
    registered_at INTEGER NOT NULL,
    position INTEGER NOT NULL
);

-- ============================================================
-- Consensus & rounds
-- ============================================================

CREATE TABLE IF NOT EXISTS consensus (
    asset BLOB PRIMARY KEY,
    latest_price TEXT NOT NULL,
    last_update INTEGER NOT NULL,
    current_round INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS rounds (
    asset BLOB NOT NULL,
    round_index INTEGER NOT NULL,
    finalized INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (asset, round_index)
);

CREATE TABLE IF NOT EXISTS round_submissions (
    asset BLOB NOT NULL,
    round_index INTEGER NOT NULL,
    seq INTEGER NOT NULL,
    validator BLOB NOT NULL,
    price TEXT NOT NULL,
    PRIMARY KEY (asset, round_index, seq),
    UNIQUE (asset, round_index, validator),
    FOREIGN KEY (asset, round_index) REFERENCES rounds(asset, round_index) ON DELETE CASCADE
);

-- ============================================================
-- Manipulation bounds
-- ============================================================

CREATE TABLE IF NOT EXISTS anchors (
    asset BLOB PRIMARY KEY,
    price TEXT NOT NULL,
    timestamp INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS reference_feeds (
    asset BLOB PRIMARY KEY,
    source BLOB NOT NULL,
    source_decimals INTEGER NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1
);

-- ============================================================
-- TWAP & violations
-- ============================================================

CREATE TABLE IF NOT EXISTS twap_observations (
    asset BLOB NOT NULL,
    seq INTEGER NOT NULL,
    price TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    PRIMARY KEY (asset, seq)
);

CREATE TABLE IF NOT EXISTS violations (
    validator BLOB PRIMARY KEY,
    count INTEGER NOT NULL
);

-- ============================================================
-- Global settings (parameters, pause flag, upgrade state)
-- ============================================================

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;
