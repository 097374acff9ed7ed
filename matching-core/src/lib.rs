//! In-memory order/tick index and settlement state machine for a
//! privacy-preserving exchange's off-chain matcher.
//!
//! This crate owns the "hard part" of the matcher: ingesting orders,
//! detecting overlapping buy/sell liquidity by price tick, validating
//! that two candidate orders may legally cross, and emitting
//! deterministic settlement proposals. Everything else (the UI, the
//! ledger primitive that witnesses orders on-chain, cryptographic
//! escrow) lives outside this crate; see [`core::ledger`] for the
//! thin capability boundary this crate expects from its host.

pub mod core;

pub use core::prelude;
