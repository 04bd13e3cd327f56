// Copyright (c) Unit Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! The deposit workflow engine.
//!
//! A scan loop enumerates all non-terminal workflows each tick and applies
//! at most one transition per workflow, skipping those still inside their
//! retry backoff window. Transitions persist before the next one runs, so a
//! crash resumes from the last committed state. A workflow never advances
//! past a `*_SENT` state without its broadcast hash persisted.

use std::collections::HashMap;
use std::sync::Arc;

use ethers::types::Address;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::chain::ChainProvider;
use crate::config::EngineConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::metrics::BridgeMetrics;
use crate::stores::StateStore;
use crate::types::Chain;
use crate::workflow::{backoff, DepositWorkflow, WorkflowState};

pub struct WorkflowEngine {
    provider: Arc<dyn ChainProvider>,
    states: Arc<StateStore>,
    /// Operator wallet per chain. The destination-chain wallet funds
    /// credits; the source-chain wallet doubles as the sweep treasury.
    hot_wallets: HashMap<Chain, Address>,
    /// Confirmation depth per chain.
    confirmations: HashMap<Chain, u64>,
    config: EngineConfig,
    metrics: Arc<BridgeMetrics>,
}

impl WorkflowEngine {
    pub fn new(
        provider: Arc<dyn ChainProvider>,
        states: Arc<StateStore>,
        hot_wallets: HashMap<Chain, Address>,
        confirmations: HashMap<Chain, u64>,
        config: EngineConfig,
        metrics: Arc<BridgeMetrics>,
    ) -> Self {
        Self {
            provider,
            states,
            hot_wallets,
            confirmations,
            config,
            metrics,
        }
    }

    /// Spawn the scan loop.
    pub fn run(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "workflow engine starting (scan_interval={:?}, max_attempts={})",
                self.config.scan_interval, self.config.max_attempts
            );
            let mut interval = time::interval(self.config.scan_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("workflow engine cancelled");
                        break;
                    }
                    _ = interval.tick() => {
                        if let Err(err) = self.tick(&cancel).await {
                            error!("workflow engine tick failed: {err}");
                        }
                    }
                }
            }
        })
    }

    /// One scan pass: snapshot the due workflows, then advance each and
    /// persist. Writes never interleave with the snapshot iteration.
    pub async fn tick(&self, cancel: &CancellationToken) -> BridgeResult<()> {
        let now = crate::now_ms();
        let mut due = Vec::new();
        self.states.scan(cancel, |wf| {
            if wf.state.is_terminal() {
                return Ok(());
            }
            let wait = backoff(wf.attempts).as_millis() as u64;
            if now.saturating_sub(wf.updated_at) < wait {
                return Ok(());
            }
            due.push(wf);
            Ok(())
        })?;

        for mut wf in due {
            if cancel.is_cancelled() {
                break;
            }
            self.advance(&mut wf).await?;
        }
        Ok(())
    }

    /// Apply one transition to `wf` and commit the bookkeeping. Only store
    /// failures propagate; transition failures are absorbed into the
    /// record's attempt counter.
    pub async fn advance(&self, wf: &mut DepositWorkflow) -> BridgeResult<()> {
        let before = wf.state;
        match self.transition(wf).await {
            Ok(true) => {
                wf.attempts = 0;
                // A terminal failure keeps its reason; every other state
                // change starts clean.
                if wf.state != WorkflowState::Failed {
                    wf.last_error.clear();
                }
                wf.updated_at = crate::now_ms();
                self.metrics.transitions.with_label_values(&["advanced"]).inc();
                if wf.state.is_terminal() {
                    let outcome = if wf.state == WorkflowState::Done {
                        "done"
                    } else {
                        "failed"
                    };
                    self.metrics
                        .workflows_terminal
                        .with_label_values(&[outcome])
                        .inc();
                }
                info!("workflow {}: {} -> {}", wf.id, before, wf.state);
                self.states.put(wf)
            }
            Ok(false) => {
                // No progress (e.g. waiting on confirmations): refresh the
                // timestamp so the next visit is interval-paced.
                wf.updated_at = crate::now_ms();
                self.metrics
                    .transitions
                    .with_label_values(&["no_progress"])
                    .inc();
                self.states.put(wf)
            }
            Err(err) => {
                wf.attempts += 1;
                wf.last_error = err.to_string();
                wf.updated_at = crate::now_ms();
                self.metrics.transitions.with_label_values(&["error"]).inc();
                self.metrics
                    .transition_errors
                    .with_label_values(&[err.error_type()])
                    .inc();
                warn!(
                    "workflow {} failed in {} (attempt {}/{}): {}",
                    wf.id, before, wf.attempts, self.config.max_attempts, err
                );
                if wf.attempts >= self.config.max_attempts {
                    wf.state = WorkflowState::Failed;
                    wf.last_error = "retries exhausted".to_string();
                    self.metrics
                        .workflows_terminal
                        .with_label_values(&["failed"])
                        .inc();
                    warn!("workflow {} parked in FAILED after {} attempts", wf.id, wf.attempts);
                }
                self.states.put(wf)
            }
        }
    }

    /// The transition function. Mutates `wf` along exactly one edge of the
    /// state machine and reports whether the state changed.
    async fn transition(&self, wf: &mut DepositWorkflow) -> BridgeResult<bool> {
        match wf.state {
            WorkflowState::SrcTxDiscovered => {
                let src = self.provider.with_chain(wf.src_chain);
                match src
                    .is_confirmed(&wf.src_tx_hash, self.confirmations(wf.src_chain))
                    .await
                {
                    Ok(true) => {
                        wf.state = WorkflowState::SrcTxConfirmed;
                        Ok(true)
                    }
                    Ok(false) => Ok(false),
                    Err(err) if err.is_rejection() => {
                        // The user's own deposit reverted; nothing to credit.
                        warn!("workflow {}: source tx reverted: {err}", wf.id);
                        wf.state = WorkflowState::Failed;
                        wf.last_error = format!("source tx reverted: {err}");
                        Ok(true)
                    }
                    Err(err) => Err(err),
                }
            }

            WorkflowState::SrcTxConfirmed | WorkflowState::DstTxResend => {
                let dst = self.provider.with_chain(wf.dst_chain);
                let from = self.hot_wallet(wf.dst_chain)?;
                wf.unsigned_dst_tx = dst
                    .build_send(from, wf.user_dst_addr, wf.amount_wei)
                    .await?;
                wf.state = WorkflowState::DstTxBuilt;
                Ok(true)
            }

            WorkflowState::DstTxBuilt => {
                let dst = self.provider.with_chain(wf.dst_chain);
                let from = self.hot_wallet(wf.dst_chain)?;
                wf.sent_dst_tx_hash = dst.broadcast(&wf.unsigned_dst_tx, from).await?;
                wf.state = WorkflowState::DstTxSent;
                Ok(true)
            }

            WorkflowState::DstTxSent => {
                let dst = self.provider.with_chain(wf.dst_chain);
                match dst
                    .is_confirmed(&wf.sent_dst_tx_hash, self.confirmations(wf.dst_chain))
                    .await
                {
                    Ok(true) => {
                        wf.state = WorkflowState::DstTxConfirmed;
                        Ok(true)
                    }
                    Ok(false) => Ok(false),
                    Err(err) if err.is_rejection() => {
                        warn!("workflow {}: destination tx rejected: {err}", wf.id);
                        wf.state = WorkflowState::DstTxRejected;
                        Ok(true)
                    }
                    Err(err) => Err(err),
                }
            }

            WorkflowState::DstTxRejected => {
                // Retry path: rebuild with a fresh nonce and quote.
                wf.state = WorkflowState::DstTxResend;
                Ok(true)
            }

            WorkflowState::DstTxConfirmed | WorkflowState::SweepTxResend => {
                let src = self.provider.with_chain(wf.src_chain);
                let treasury = self.hot_wallet(wf.src_chain)?;
                wf.unsigned_sweep_tx = src.build_sweep(wf.deposit_addr, treasury).await?;
                wf.state = WorkflowState::SweepTxBuilt;
                Ok(true)
            }

            WorkflowState::SweepTxBuilt => {
                let src = self.provider.with_chain(wf.src_chain);
                wf.sent_sweep_tx_hash = src.broadcast(&wf.unsigned_sweep_tx, wf.deposit_addr).await?;
                wf.state = WorkflowState::SweepTxSent;
                Ok(true)
            }

            WorkflowState::SweepTxSent => {
                let src = self.provider.with_chain(wf.src_chain);
                match src
                    .is_confirmed(&wf.sent_sweep_tx_hash, self.confirmations(wf.src_chain))
                    .await
                {
                    Ok(true) => {
                        wf.state = WorkflowState::SweepTxConfirmed;
                        Ok(true)
                    }
                    Ok(false) => Ok(false),
                    Err(err) if err.is_rejection() => {
                        warn!("workflow {}: sweep tx rejected: {err}", wf.id);
                        wf.state = WorkflowState::SweepTxRejected;
                        Ok(true)
                    }
                    Err(err) => Err(err),
                }
            }

            WorkflowState::SweepTxRejected => {
                wf.state = WorkflowState::SweepTxResend;
                Ok(true)
            }

            WorkflowState::SweepTxConfirmed => {
                wf.state = WorkflowState::Done;
                Ok(true)
            }

            WorkflowState::Done | WorkflowState::Failed => Ok(false),
        }
    }

    fn hot_wallet(&self, chain: Chain) -> BridgeResult<Address> {
        self.hot_wallets
            .get(&chain)
            .copied()
            .ok_or_else(|| BridgeError::Config(format!("no hot wallet configured for {chain}")))
    }

    fn confirmations(&self, chain: Chain) -> u64 {
        self.confirmations.get(&chain).copied().unwrap_or(1)
    }
}
