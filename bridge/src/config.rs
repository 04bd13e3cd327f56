// Copyright (c) Unit Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Agent configuration. Value-typed records passed in at construction;
//! nothing here is a process-wide singleton.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use ethers::types::Address;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};

/// Keystore passphrase. Keys only ever protect testnet funds in this
/// deployment; a production rollout would source this from an operator
/// secret.
pub const KEYSTORE_PASSPHRASE: &str = "unit-bridge-keystore";

pub const ENV_SEPOLIA_RPC_URL: &str = "SEPOLIA_RPC_URL";
pub const ENV_HOT_WALLET_ADDRESS: &str = "HOT_WALLET_ADDRESS";
pub const ENV_HOT_WALLET_PRIVATE_KEY: &str = "HOT_WALLET_PRIVATE_KEY";

pub const HYPERLIQUID_TESTNET_API_URL: &str = "https://api.hyperliquid-testnet.xyz";
/// USDC token identifier on the Hyperliquid testnet spot book.
pub const USDC_TESTNET_TOKEN: &str = "USDC:0xeb62eee3685fc4c43992febcd9e75443";

/// Source-chain (EVM) parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EthChainConfig {
    pub rpc_url: String,
    /// Depth below the head at which a transaction is treated as
    /// irreversible.
    pub min_confirmations: u64,
    /// Gas limit for a native-transfer sweep.
    pub sweep_gas_limit: u64,
}

impl EthChainConfig {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            min_confirmations: 14,
            sweep_gas_limit: 21_000,
        }
    }
}

/// Destination-chain (Hyperliquid) parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HyperliquidConfig {
    pub api_url: String,
    /// Spot token credited for bridged deposits.
    pub token: String,
    /// Destination units credited per whole source coin (10^18 wei).
    pub units_per_native: u64,
    pub is_mainnet: bool,
}

impl Default for HyperliquidConfig {
    fn default() -> Self {
        Self {
            api_url: HYPERLIQUID_TESTNET_API_URL.to_string(),
            token: USDC_TESTNET_TOKEN.to_string(),
            units_per_native: 1_000,
            is_mainnet: false,
        }
    }
}

/// Workflow engine knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EngineConfig {
    /// How often the engine enumerates workflows.
    pub scan_interval: Duration,
    /// Consecutive failures before a workflow is parked in FAILED.
    pub max_attempts: u32,
    /// Deposits at or below this value (in wei) are ignored. Zero leaves
    /// the gate open to everything above zero.
    pub min_deposit_wei: u128,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(2),
            max_attempts: 8,
            min_deposit_wei: 0,
        }
    }
}

/// Block publisher knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PublisherConfig {
    pub poll_interval: Duration,
    pub channel_size: usize,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            channel_size: 20,
        }
    }
}

/// Top-level agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub api_listen_port: u16,
    pub data_dir: PathBuf,
    pub eth: EthChainConfig,
    pub hyperliquid: HyperliquidConfig,
    pub engine: EngineConfig,
    pub publisher: PublisherConfig,
    /// Operator hot wallet; funds destination credits and receives sweeps.
    pub hot_wallet_address: Address,
    pub src_chains: Vec<String>,
    pub dst_chains: Vec<String>,
    pub assets: Vec<String>,
}

impl AgentConfig {
    /// Assemble configuration from the environment. `SEPOLIA_RPC_URL` and
    /// `HOT_WALLET_ADDRESS` are required; everything else has defaults.
    pub fn from_env() -> BridgeResult<Self> {
        let rpc_url = require_env(ENV_SEPOLIA_RPC_URL)?;
        let hot_wallet = require_env(ENV_HOT_WALLET_ADDRESS)?;
        let hot_wallet_address: Address = hot_wallet
            .parse()
            .map_err(|_| BridgeError::InvalidAddress(hot_wallet))?;

        Ok(Self {
            api_listen_port: 8000,
            data_dir: default_data_dir(),
            eth: EthChainConfig::new(rpc_url),
            hyperliquid: HyperliquidConfig::default(),
            engine: EngineConfig::default(),
            publisher: PublisherConfig::default(),
            hot_wallet_address,
            src_chains: vec!["ethereum".to_string()],
            dst_chains: vec!["hyperliquid".to_string()],
            assets: vec!["eth".to_string()],
        })
    }

    pub fn paths(&self) -> DataPaths {
        DataPaths::new(self.data_dir.clone())
    }
}

/// Locations of everything the agent persists under its data directory.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub root: PathBuf,
}

impl DataPaths {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn keystore(&self) -> PathBuf {
        self.root.join("keystore")
    }

    pub fn accounts_db(&self) -> PathBuf {
        self.root.join("accounts.db")
    }

    pub fn state_db(&self) -> PathBuf {
        self.root.join("state.db")
    }
}

pub fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn require_env(name: &str) -> BridgeResult<String> {
    env::var(name).map_err(|_| BridgeError::Config(format!("{name} is not set")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let engine = EngineConfig::default();
        assert_eq!(engine.scan_interval, Duration::from_secs(2));
        assert_eq!(engine.max_attempts, 8);
        assert_eq!(engine.min_deposit_wei, 0);

        let publisher = PublisherConfig::default();
        assert_eq!(publisher.poll_interval, Duration::from_secs(2));
        assert_eq!(publisher.channel_size, 20);

        let eth = EthChainConfig::new("http://localhost:8545");
        assert_eq!(eth.min_confirmations, 14);
        assert_eq!(eth.sweep_gas_limit, 21_000);
    }

    #[test]
    fn test_data_paths() {
        let config = AgentConfig {
            api_listen_port: 8000,
            data_dir: PathBuf::from("/tmp/agent"),
            eth: EthChainConfig::new("http://localhost:8545"),
            hyperliquid: HyperliquidConfig::default(),
            engine: EngineConfig::default(),
            publisher: PublisherConfig::default(),
            hot_wallet_address: Address::repeat_byte(1),
            src_chains: vec!["ethereum".into()],
            dst_chains: vec!["hyperliquid".into()],
            assets: vec!["eth".into()],
        };
        let paths = config.paths();
        assert_eq!(paths.keystore(), PathBuf::from("/tmp/agent/keystore"));
        assert_eq!(paths.accounts_db(), PathBuf::from("/tmp/agent/accounts.db"));
        assert_eq!(paths.state_db(), PathBuf::from("/tmp/agent/state.db"));
    }
}
