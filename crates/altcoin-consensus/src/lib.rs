//! Consensus core for Bitcoin-family proof-of-work chains.
//!
//! This library provides per-chain consensus parameters with a genesis
//! self-check, the SHA-256d, scrypt and X11 proof-of-work pipelines, and the
//! difficulty retarget rules of Bitcoin, Litecoin, Dogecoin and Darkcoin,
//! including the testnet minimum-difficulty rule.

#![cfg_attr(test, allow(clippy::arithmetic_side_effects))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::cast_sign_loss))]
#![cfg_attr(test, allow(clippy::indexing_slicing))]
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::cast_possible_truncation))]

/// Block headers, stored blocks and genesis blocks.
pub mod blockdata;
/// Consensus parameters, difficulty rules and proof-of-work verification.
pub mod consensus;
/// Proof-of-work hash pipelines.
pub mod hashes;
/// Supported chains.
pub mod network;
/// Proof of Work related functionality.
pub mod pow;
/// Chain storage consumed by the difficulty engine.
pub mod store;
/// Utility functions and types.
pub mod util;

#[cfg(test)]
mod test_util;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
