// Copyright (c) Unit Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Domain types shared across the agent: chain identifiers, bridge
//! subscriptions (accounts) and the block shape the publisher emits.

use std::fmt;
use std::str::FromStr;

use ethers::types::{Address, Block, Transaction, H256, U256};
use ethers::utils::to_checksum;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};

/// Chains the agent knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Ethereum,
    Hyperliquid,
}

impl Chain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Hyperliquid => "hyperliquid",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ethereum" => Ok(Chain::Ethereum),
            "hyperliquid" => Ok(Chain::Hyperliquid),
            other => Err(BridgeError::Config(format!("unsupported chain: {other}"))),
        }
    }
}

/// Validates a hex address string and returns its EIP-55 checksummed form.
/// Checksumming is the normal form for storage and account ids.
pub fn checksummed(address: &str) -> BridgeResult<String> {
    let parsed: Address = address
        .parse()
        .map_err(|_| BridgeError::InvalidAddress(address.to_string()))?;
    Ok(to_checksum(&parsed, None))
}

/// Canonical account id for a `(src, dst, user destination)` subscription.
pub fn account_id(src_chain: Chain, dst_chain: Chain, user_dst_addr: Address) -> String {
    format!(
        "{}:{}:{}",
        src_chain,
        dst_chain,
        to_checksum(&user_dst_addr, None)
    )
}

/// A bridge subscription. One deposit address on the source chain is
/// uniquely owned by one account; transfers into it are credited to
/// `user_dst_addr` on the destination chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub src_chain: Chain,
    pub dst_chain: Chain,
    pub user_dst_addr: Address,
    pub deposit_addr: Address,
    pub created_at: u64,
}

impl Account {
    /// Build an account from raw address strings, validating and
    /// checksumming both. The deposit address is set exactly once here.
    pub fn new(
        src_chain: Chain,
        dst_chain: Chain,
        user_dst_addr: &str,
        deposit_addr: &str,
    ) -> BridgeResult<Self> {
        let user_dst_addr: Address = user_dst_addr
            .parse()
            .map_err(|_| BridgeError::InvalidAddress(user_dst_addr.to_string()))?;
        let deposit_addr: Address = deposit_addr
            .parse()
            .map_err(|_| BridgeError::InvalidAddress(deposit_addr.to_string()))?;
        Ok(Self {
            id: account_id(src_chain, dst_chain, user_dst_addr),
            src_chain,
            dst_chain,
            user_dst_addr,
            deposit_addr,
            created_at: crate::now_ms(),
        })
    }
}

/// A native transfer observed in a source-chain block. `to` is absent for
/// contract deployments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeTransfer {
    pub to: Option<Address>,
    pub value: U256,
    pub tx_hash: H256,
}

/// The block shape published to the processor: number, hash and the
/// transfers it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceBlock {
    pub number: u64,
    pub hash: H256,
    pub transfers: Vec<NativeTransfer>,
}

impl SourceBlock {
    pub fn from_eth_block(block: &Block<Transaction>) -> Self {
        Self {
            number: block.number.map(|n| n.as_u64()).unwrap_or_default(),
            hash: block.hash.unwrap_or_default(),
            transfers: block
                .transactions
                .iter()
                .map(|tx| NativeTransfer {
                    to: tx.to,
                    value: tx.value,
                    tx_hash: tx.hash,
                })
                .collect(),
        }
    }
}
