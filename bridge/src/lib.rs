// Copyright (c) Unit Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Custodial deposit-bridging agent.
//!
//! For each `(source chain, destination chain, asset, user address)`
//! subscription the agent issues a unique deposit address on the source
//! chain, watches finalized blocks for transfers into it, credits the
//! equivalent value on the destination chain from the operator hot wallet,
//! and finally sweeps the deposit back into the operator treasury. Every
//! observed deposit is driven through a durable state machine to `DONE` or
//! a terminal `FAILED` across process restarts.

pub mod chain;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod node;
pub mod processor;
pub mod publisher;
pub mod server;
pub mod stores;
pub mod types;
pub mod workflow;

#[cfg(test)]
pub mod eth_mock_provider;

#[cfg(test)]
pub mod test_utils;

/// Returns the current unix time in milliseconds. All workflow timestamps
/// use this clock.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
