//! Integration test crate for the tally oracle.
//!
//! This crate has no library code. It only contains integration tests that
//! drive the oracle end to end across `tally-types`, `tally-oracle` and
//! `tally-db`: consensus rounds, validator discipline, governance and
//! reference feeds, with state persisted and restored between steps.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p tally-integration-tests
//! ```
