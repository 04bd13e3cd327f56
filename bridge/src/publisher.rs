// Copyright (c) Unit Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Finalized-block publisher.
//!
//! Polls the source chain for the latest finalized block and publishes every
//! block since the last one seen, in strictly increasing order, on a bounded
//! channel. A slow consumer applies backpressure; a transient RPC failure is
//! reported on the error channel and the batch resumes from the same cursor
//! on the next tick.
//!
//! The cursor is not persisted; a restarted agent anchors one block behind
//! the current finalized head and therefore skips blocks finalized while it
//! was down. `with_start_block` leaves room for a checkpoint to seed the
//! cursor instead.

use std::sync::Arc;

use ethers::providers::{JsonRpcClient, Middleware, Provider};
use ethers::types::BlockNumber;
use tap::TapFallible;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PublisherConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::metrics::BridgeMetrics;
use crate::types::SourceBlock;

pub struct BlockPublisher<P> {
    provider: Provider<P>,
    config: PublisherConfig,
    start_block: Option<u64>,
    metrics: Arc<BridgeMetrics>,
}

impl<P> BlockPublisher<P>
where
    P: JsonRpcClient + 'static,
{
    pub fn new(provider: Provider<P>, config: PublisherConfig, metrics: Arc<BridgeMetrics>) -> Self {
        Self {
            provider,
            config,
            start_block: None,
            metrics,
        }
    }

    /// Seed the cursor instead of anchoring at the finalized head. Blocks
    /// strictly after `last_seen` will be published.
    pub fn with_start_block(mut self, last_seen: u64) -> Self {
        self.start_block = Some(last_seen);
        self
    }

    /// Spawn the polling loop. Returns the task handle plus the block and
    /// error channels; both close when the loop exits.
    pub fn run(
        self,
        cancel: CancellationToken,
    ) -> (
        JoinHandle<()>,
        mpsc::Receiver<SourceBlock>,
        mpsc::Receiver<BridgeError>,
    ) {
        let (out_tx, out_rx) = mpsc::channel(self.config.channel_size.max(1));
        let (err_tx, err_rx) = mpsc::channel(1);
        let handle = tokio::spawn(async move {
            self.run_loop(cancel, out_tx, err_tx).await;
        });
        (handle, out_rx, err_rx)
    }

    async fn run_loop(
        self,
        cancel: CancellationToken,
        out_tx: mpsc::Sender<SourceBlock>,
        err_tx: mpsc::Sender<BridgeError>,
    ) {
        info!(
            "block publisher starting (poll_interval={:?})",
            self.config.poll_interval
        );
        let mut interval = time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_seen = self.start_block;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("block publisher cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(err) = self.tick(&cancel, &mut last_seen, &out_tx).await {
                        warn!("block publisher tick failed: {err}");
                        self.metrics.publisher_errors.inc();
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = err_tx.send(err) => {}
                        }
                    }
                }
            }
        }
        // Senders drop here, closing both channels for the consumer.
    }

    async fn tick(
        &self,
        cancel: &CancellationToken,
        last_seen: &mut Option<u64>,
        out_tx: &mpsc::Sender<SourceBlock>,
    ) -> BridgeResult<()> {
        let head = self.finalized_head().await?;

        let cursor = match *last_seen {
            Some(cursor) => cursor,
            None => {
                // Fresh start: anchor one block behind the finalized head so
                // the agent does not replay the whole chain.
                let anchor = head.saturating_sub(1);
                *last_seen = Some(anchor);
                info!("anchored publisher at block {anchor} (finalized head {head})");
                anchor
            }
        };

        if head <= cursor {
            debug!("finalized head {head} <= cursor {cursor}, nothing to publish");
            return Ok(());
        }

        for number in (cursor + 1)..=head {
            let block = self.fetch_block(number).await?;
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                sent = out_tx.send(block) => {
                    if sent.is_err() {
                        // Consumer is gone; the loop will exit on the next
                        // cancellation check.
                        return Ok(());
                    }
                }
            }
            *last_seen = Some(number);
            self.metrics.blocks_published.inc();
            self.metrics.last_published_block.set(number as i64);
            debug!("published finalized block {number}");
        }
        Ok(())
    }

    async fn finalized_head(&self) -> BridgeResult<u64> {
        let block = self
            .provider
            .get_block(BlockNumber::Finalized)
            .await?
            .ok_or_else(|| BridgeError::Transient("node returned no finalized block".into()))?;
        block
            .number
            .map(|n| n.as_u64())
            .ok_or_else(|| BridgeError::Transient("finalized block has no number".into()))
    }

    async fn fetch_block(&self, number: u64) -> BridgeResult<SourceBlock> {
        let block = self
            .provider
            .get_block_with_txs(number)
            .await
            .tap_err(|e| warn!("fetch of block {number} failed: {e}"))?
            .ok_or_else(|| BridgeError::Transient(format!("block {number} not available")))?;
        Ok(SourceBlock::from_eth_block(&block))
    }
}
