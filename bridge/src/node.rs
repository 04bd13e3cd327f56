// Copyright (c) Unit Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Agent wiring: opens the stores and keystore, builds the chain adapters,
//! and spawns the publisher, block dispatcher, workflow engine and API
//! server as independent tasks tied to one cancellation token.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use ethers::providers::{Http, Provider};
use prometheus::Registry;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use unit_bridge_keys::LocalKeyStore;

use crate::chain::evm::EvmAdapter;
use crate::chain::hyperliquid::HyperliquidAdapter;
use crate::chain::AgentChainProvider;
use crate::config::{AgentConfig, KEYSTORE_PASSPHRASE};
use crate::engine::WorkflowEngine;
use crate::metrics::BridgeMetrics;
use crate::processor::BlockProcessor;
use crate::publisher::BlockPublisher;
use crate::server::{run_server, AllowedRoutes, ApiState};
use crate::stores::{AccountStore, StateStore};
use crate::types::Chain;

const RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// Start every agent task. Returned handles complete once `cancel` fires
/// (the API server task is aborted by the caller on shutdown).
pub async fn run_agent_node(
    config: AgentConfig,
    registry: Registry,
    cancel: CancellationToken,
) -> anyhow::Result<Vec<JoinHandle<()>>> {
    let metrics = Arc::new(BridgeMetrics::new(&registry));
    let paths = config.paths();

    let keys = Arc::new(
        LocalKeyStore::open(paths.keystore(), KEYSTORE_PASSPHRASE)
            .context("opening keystore")?,
    );
    let accounts =
        Arc::new(AccountStore::open(paths.accounts_db()).context("opening account store")?);
    let states = Arc::new(StateStore::open(paths.state_db()).context("opening state store")?);
    info!("stores opened under {:?}", paths.root);

    let url: reqwest::Url = config
        .eth
        .rpc_url
        .parse()
        .context("parsing source chain RPC url")?;
    let http_client = reqwest::Client::builder()
        .timeout(RPC_TIMEOUT)
        .build()
        .context("building RPC http client")?;
    let provider = Provider::new(Http::new_with_client(url, http_client));

    let evm = Arc::new(EvmAdapter::new(
        provider.clone(),
        keys.clone(),
        config.eth.sweep_gas_limit,
    ));
    let hyperliquid = Arc::new(HyperliquidAdapter::new(
        keys.clone(),
        config.hot_wallet_address,
        config.hyperliquid.clone(),
    )?);
    let chain_provider = Arc::new(AgentChainProvider::new(evm, hyperliquid));

    if !keys.has_key(config.hot_wallet_address) {
        warn!(
            "hot wallet {:#x} is not in the keystore; run `unit-bridge init` first",
            config.hot_wallet_address
        );
    }

    let hot_wallets = HashMap::from([
        (Chain::Ethereum, config.hot_wallet_address),
        (Chain::Hyperliquid, config.hot_wallet_address),
    ]);
    let confirmations = HashMap::from([
        (Chain::Ethereum, config.eth.min_confirmations),
        (Chain::Hyperliquid, 1),
    ]);

    let engine = Arc::new(WorkflowEngine::new(
        chain_provider,
        states.clone(),
        hot_wallets,
        confirmations,
        config.engine.clone(),
        metrics.clone(),
    ));
    let processor = BlockProcessor::new(
        accounts.clone(),
        states.clone(),
        config.engine.min_deposit_wei,
        metrics.clone(),
    );

    let mut handles = Vec::new();

    let publisher = BlockPublisher::new(provider, config.publisher.clone(), metrics.clone());
    let (publisher_handle, mut block_rx, mut err_rx) = publisher.run(cancel.clone());
    handles.push(publisher_handle);

    // Block dispatcher: consumes published blocks synchronously so workflow
    // seeding keeps pace with publication (backpressure through the bounded
    // channel).
    let dispatch_cancel = cancel.clone();
    handles.push(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = dispatch_cancel.cancelled() => break,
                block = block_rx.recv() => {
                    let Some(block) = block else { break };
                    info!("finalized block {} ({:#x})", block.number, block.hash);
                    if let Err(err) = processor.process_block(&block) {
                        error!("processing block {} failed: {err}", block.number);
                    }
                }
                err = err_rx.recv() => {
                    let Some(err) = err else { break };
                    warn!("block publisher error: {err}");
                }
            }
        }
        info!("block dispatcher stopped");
    }));

    handles.push(engine.run(cancel.clone()));

    let socket_address = SocketAddr::new(
        IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        config.api_listen_port,
    );
    let state = ApiState {
        keys,
        accounts,
        allowed: Arc::new(AllowedRoutes {
            src_chains: config.src_chains.clone(),
            dst_chains: config.dst_chains.clone(),
            assets: config.assets.clone(),
        }),
        metrics,
        registry,
    };
    handles.push(run_server(&socket_address, state));

    Ok(handles)
}
