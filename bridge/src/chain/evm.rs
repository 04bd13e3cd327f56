// Copyright (c) Unit Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! EVM chain adapter.
//!
//! Builds legacy transactions with a freshly fetched pending nonce and gas
//! quote, signs through the keystore, and checks confirmation depth against
//! the latest head. Unsigned payloads are hex-encoded RLP so the durable
//! workflow record stays chain-agnostic.

use std::sync::Arc;

use async_trait::async_trait;
use ethers::providers::{JsonRpcClient, Middleware, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, BlockNumber, TransactionRequest, H256, U256};
use ethers::utils::{keccak256, rlp};
use tap::TapFallible;
use tracing::{debug, info};
use unit_bridge_keys::LocalKeyStore;

use crate::chain::ChainAdapter;
use crate::error::{BridgeError, BridgeResult};

pub struct EvmAdapter<P> {
    provider: Provider<P>,
    keys: Arc<LocalKeyStore>,
    sweep_gas_limit: u64,
}

impl<P> EvmAdapter<P>
where
    P: JsonRpcClient + 'static,
{
    pub fn new(provider: Provider<P>, keys: Arc<LocalKeyStore>, sweep_gas_limit: u64) -> Self {
        Self {
            provider,
            keys,
            sweep_gas_limit,
        }
    }

    async fn pending_nonce(&self, address: Address) -> BridgeResult<U256> {
        Ok(self
            .provider
            .get_transaction_count(address, Some(BlockNumber::Pending.into()))
            .await?)
    }
}

#[async_trait]
impl<P> ChainAdapter for EvmAdapter<P>
where
    P: JsonRpcClient + 'static,
{
    async fn build_send(&self, from: Address, to: Address, amount: U256) -> BridgeResult<String> {
        if !self.keys.has_key(from) {
            return Err(BridgeError::UnknownAddress(format!("{from:#x}")));
        }

        let nonce = self.pending_nonce(from).await?;
        let balance = self.provider.get_balance(from, None).await?;
        let gas_price = self.provider.get_gas_price().await?;

        let probe: TypedTransaction = TransactionRequest::new()
            .from(from)
            .to(to)
            .value(amount)
            .into();
        let gas_limit = self.provider.estimate_gas(&probe, None).await?;

        let fee = gas_price
            .checked_mul(gas_limit)
            .ok_or_else(|| BridgeError::Internal("gas fee overflow".into()))?;
        let needed = amount
            .checked_add(fee)
            .ok_or_else(|| BridgeError::Internal("amount overflow".into()))?;
        if balance < needed {
            return Err(BridgeError::InsufficientBalance {
                have: balance.to_string(),
                need: needed.to_string(),
            });
        }

        let tx = TransactionRequest::new()
            .from(from)
            .to(to)
            .value(amount)
            .nonce(nonce)
            .gas(gas_limit)
            .gas_price(gas_price);
        debug!(
            "built send tx: from={:#x} to={:#x} value={} nonce={} gas={} gas_price={}",
            from, to, amount, nonce, gas_limit, gas_price
        );
        Ok(hex::encode(tx.rlp()))
    }

    async fn build_sweep(&self, from: Address, to: Address) -> BridgeResult<String> {
        if !self.keys.has_key(from) {
            return Err(BridgeError::UnknownAddress(format!("{from:#x}")));
        }

        let nonce = self.pending_nonce(from).await?;
        let balance = self.provider.get_balance(from, None).await?;
        let gas_price = self.provider.get_gas_price().await?;

        // Native transfer, fixed gas; everything above the fee is swept.
        let fee = gas_price
            .checked_mul(U256::from(self.sweep_gas_limit))
            .ok_or_else(|| BridgeError::Internal("gas fee overflow".into()))?;
        if fee >= balance {
            return Err(BridgeError::InsufficientBalance {
                have: balance.to_string(),
                need: fee.to_string(),
            });
        }
        let value = balance - fee;

        let tx = TransactionRequest::new()
            .from(from)
            .to(to)
            .value(value)
            .nonce(nonce)
            .gas(self.sweep_gas_limit)
            .gas_price(gas_price);
        debug!(
            "built sweep tx: from={:#x} to={:#x} value={} nonce={}",
            from, to, value, nonce
        );
        Ok(hex::encode(tx.rlp()))
    }

    async fn broadcast(&self, unsigned_tx: &str, from: Address) -> BridgeResult<String> {
        let raw = hex::decode(unsigned_tx.trim_start_matches("0x"))
            .map_err(|e| BridgeError::Serialization(format!("bad unsigned tx hex: {e}")))?;
        let request = TransactionRequest::decode_unsigned_rlp(&rlp::Rlp::new(&raw))
            .map_err(|e| BridgeError::Serialization(format!("bad unsigned tx rlp: {e}")))?;

        let chain_id = self.provider.get_chainid().await?.as_u64();
        let tx: TypedTransaction = request.from(from).into();
        let signed = self.keys.sign_tx(from, &tx, chain_id)?;
        let tx_hash = H256::from(keccak256(&signed));

        self.provider
            .send_raw_transaction(signed)
            .await
            .tap_err(|e| tracing::warn!("broadcast of {tx_hash:#x} failed: {e}"))?;
        info!("broadcast tx {tx_hash:#x} from {from:#x}");
        Ok(format!("{tx_hash:#x}"))
    }

    async fn is_confirmed(&self, tx_hash: &str, min_confirmations: u64) -> BridgeResult<bool> {
        let hash: H256 = tx_hash
            .parse()
            .map_err(|_| BridgeError::Serialization(format!("bad tx hash: {tx_hash}")))?;

        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await?
            .ok_or_else(|| BridgeError::Transient(format!("no receipt yet for {tx_hash}")))?;

        if receipt.status.map(|s| s.as_u64()) != Some(1) {
            return Err(BridgeError::Rejected(format!(
                "tx {tx_hash} reverted, status={:?}",
                receipt.status
            )));
        }

        let tx_block = receipt
            .block_number
            .ok_or_else(|| BridgeError::Transient(format!("receipt for {tx_hash} has no block")))?
            .as_u64();
        let head = self.provider.get_block_number().await?.as_u64();
        Ok(head >= tx_block.saturating_add(min_confirmations))
    }
}
