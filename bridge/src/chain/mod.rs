// Copyright (c) Unit Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Chain abstraction. The engine only ever talks to a [`ChainAdapter`];
//! chain-specific quirks (nonce discipline, gas, typed-data signing,
//! finality models) stay behind this seam.

pub mod evm;
pub mod hyperliquid;

use std::sync::Arc;

use async_trait::async_trait;
use ethers::types::{Address, U256};

use crate::error::BridgeResult;
use crate::types::Chain;

/// Uniform transaction surface over one chain.
///
/// Unsigned payloads are opaque strings owned by the adapter that produced
/// them; callers persist and replay them without interpretation.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    /// Build an unsigned transfer of `amount` from `from` to `to`. Used to
    /// credit a deposit on the destination chain.
    async fn build_send(&self, from: Address, to: Address, amount: U256) -> BridgeResult<String>;

    /// Build an unsigned transfer of `from`'s entire balance (minus fees)
    /// to `to`. Used to sweep deposit addresses into the treasury.
    async fn build_sweep(&self, from: Address, to: Address) -> BridgeResult<String>;

    /// Sign `unsigned_tx` as `from` and submit it. Returns the canonical
    /// transaction identifier.
    async fn broadcast(&self, unsigned_tx: &str, from: Address) -> BridgeResult<String>;

    /// Whether `tx_hash` is at least `min_confirmations` deep and did not
    /// revert. `Err(Rejected)` when the chain executed and reverted it.
    async fn is_confirmed(&self, tx_hash: &str, min_confirmations: u64) -> BridgeResult<bool>;
}

/// Maps a [`Chain`] to its adapter. The single dispatch point between the
/// engine and chain-specific code.
pub trait ChainProvider: Send + Sync {
    fn with_chain(&self, chain: Chain) -> Arc<dyn ChainAdapter>;
}

/// Production provider: one EVM adapter for the source chain, one
/// settlement adapter for the destination.
pub struct AgentChainProvider {
    ethereum: Arc<dyn ChainAdapter>,
    hyperliquid: Arc<dyn ChainAdapter>,
}

impl AgentChainProvider {
    pub fn new(ethereum: Arc<dyn ChainAdapter>, hyperliquid: Arc<dyn ChainAdapter>) -> Self {
        Self {
            ethereum,
            hyperliquid,
        }
    }
}

impl ChainProvider for AgentChainProvider {
    fn with_chain(&self, chain: Chain) -> Arc<dyn ChainAdapter> {
        match chain {
            Chain::Ethereum => self.ethereum.clone(),
            Chain::Hyperliquid => self.hyperliquid.clone(),
        }
    }
}
