// Copyright (c) Unit Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared test doubles: scripted chain adapters and a provider that serves
//! them by chain.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ethers::types::{Address, U256};

use crate::chain::{ChainAdapter, ChainProvider};
use crate::error::{BridgeError, BridgeResult};
use crate::types::Chain;

type BuildSendFn = dyn Fn(Address, Address, U256) -> BridgeResult<String> + Send + Sync;
type BuildSweepFn = dyn Fn(Address, Address) -> BridgeResult<String> + Send + Sync;
type BroadcastFn = dyn Fn(&str, Address) -> BridgeResult<String> + Send + Sync;
type IsConfirmedFn = dyn Fn(&str, u64) -> BridgeResult<bool> + Send + Sync;

/// A chain adapter whose behavior is scripted per operation. Unscripted
/// operations fail the test that reaches them. Call counts are recorded for
/// assertions.
#[derive(Default)]
pub struct MockChainAdapter {
    build_send_fn: Option<Box<BuildSendFn>>,
    build_sweep_fn: Option<Box<BuildSweepFn>>,
    broadcast_fn: Option<Box<BroadcastFn>>,
    is_confirmed_fn: Option<Box<IsConfirmedFn>>,
    calls: Mutex<HashMap<&'static str, u32>>,
}

impl MockChainAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_build_send(
        mut self,
        f: impl Fn(Address, Address, U256) -> BridgeResult<String> + Send + Sync + 'static,
    ) -> Self {
        self.build_send_fn = Some(Box::new(f));
        self
    }

    pub fn on_build_sweep(
        mut self,
        f: impl Fn(Address, Address) -> BridgeResult<String> + Send + Sync + 'static,
    ) -> Self {
        self.build_sweep_fn = Some(Box::new(f));
        self
    }

    pub fn on_broadcast(
        mut self,
        f: impl Fn(&str, Address) -> BridgeResult<String> + Send + Sync + 'static,
    ) -> Self {
        self.broadcast_fn = Some(Box::new(f));
        self
    }

    pub fn on_is_confirmed(
        mut self,
        f: impl Fn(&str, u64) -> BridgeResult<bool> + Send + Sync + 'static,
    ) -> Self {
        self.is_confirmed_fn = Some(Box::new(f));
        self
    }

    pub fn call_count(&self, op: &str) -> u32 {
        *self.calls.lock().unwrap().get(op).unwrap_or(&0)
    }

    fn record(&self, op: &'static str) {
        *self.calls.lock().unwrap().entry(op).or_insert(0) += 1;
    }
}

#[async_trait]
impl ChainAdapter for MockChainAdapter {
    async fn build_send(&self, from: Address, to: Address, amount: U256) -> BridgeResult<String> {
        self.record("build_send");
        match &self.build_send_fn {
            Some(f) => f(from, to, amount),
            None => Err(BridgeError::Internal("unexpected build_send".into())),
        }
    }

    async fn build_sweep(&self, from: Address, to: Address) -> BridgeResult<String> {
        self.record("build_sweep");
        match &self.build_sweep_fn {
            Some(f) => f(from, to),
            None => Err(BridgeError::Internal("unexpected build_sweep".into())),
        }
    }

    async fn broadcast(&self, unsigned_tx: &str, from: Address) -> BridgeResult<String> {
        self.record("broadcast");
        match &self.broadcast_fn {
            Some(f) => f(unsigned_tx, from),
            None => Err(BridgeError::Internal("unexpected broadcast".into())),
        }
    }

    async fn is_confirmed(&self, tx_hash: &str, min_confirmations: u64) -> BridgeResult<bool> {
        self.record("is_confirmed");
        match &self.is_confirmed_fn {
            Some(f) => f(tx_hash, min_confirmations),
            None => Err(BridgeError::Internal("unexpected is_confirmed".into())),
        }
    }
}

/// Serves mock adapters by chain.
pub struct MockChainProvider {
    by_chain: HashMap<Chain, Arc<MockChainAdapter>>,
}

impl MockChainProvider {
    pub fn new(by_chain: HashMap<Chain, Arc<MockChainAdapter>>) -> Self {
        Self { by_chain }
    }
}

impl ChainProvider for MockChainProvider {
    fn with_chain(&self, chain: Chain) -> Arc<dyn ChainAdapter> {
        self.by_chain
            .get(&chain)
            .cloned()
            .unwrap_or_else(|| panic!("no mock adapter for chain {chain}"))
    }
}
