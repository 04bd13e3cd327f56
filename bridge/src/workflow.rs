// Copyright (c) Unit Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! The durable deposit workflow record and its state space.
//!
//! One workflow exists per observed transfer into a known deposit address.
//! Records are created by the block processor, mutated only by the workflow
//! engine, and never deleted: terminal states are retained for audit.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::error::BridgeError;
use crate::types::Chain;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowState {
    SrcTxDiscovered,
    SrcTxConfirmed,
    DstTxBuilt,
    DstTxSent,
    DstTxConfirmed,
    DstTxRejected,
    DstTxResend,
    SweepTxBuilt,
    SweepTxSent,
    SweepTxConfirmed,
    SweepTxRejected,
    SweepTxResend,
    Done,
    Failed,
}

impl WorkflowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::SrcTxDiscovered => "SRC_TX_DISCOVERED",
            WorkflowState::SrcTxConfirmed => "SRC_TX_CONFIRMED",
            WorkflowState::DstTxBuilt => "DST_TX_BUILT",
            WorkflowState::DstTxSent => "DST_TX_SENT",
            WorkflowState::DstTxConfirmed => "DST_TX_CONFIRMED",
            WorkflowState::DstTxRejected => "DST_TX_REJECTED",
            WorkflowState::DstTxResend => "DST_TX_RESEND",
            WorkflowState::SweepTxBuilt => "SWEEP_TX_BUILT",
            WorkflowState::SweepTxSent => "SWEEP_TX_SENT",
            WorkflowState::SweepTxConfirmed => "SWEEP_TX_CONFIRMED",
            WorkflowState::SweepTxRejected => "SWEEP_TX_REJECTED",
            WorkflowState::SweepTxResend => "SWEEP_TX_RESEND",
            WorkflowState::Done => "DONE",
            WorkflowState::Failed => "FAILED",
        }
    }

    /// Terminal states yield no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Done | WorkflowState::Failed)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowState {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| BridgeError::UnknownState(s.to_string()))
    }
}

/// One observed deposit, driven from discovery to completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositWorkflow {
    /// Natural primary key: `<deposit_addr>|<src_tx_hash>`.
    pub id: String,
    pub src_chain: Chain,
    pub dst_chain: Chain,
    pub deposit_addr: Address,
    pub user_dst_addr: Address,
    pub src_tx_hash: String,
    /// Deposit amount in the source chain's smallest unit.
    pub amount_wei: U256,
    pub state: WorkflowState,
    /// Chain-adapter-opaque payloads and identifiers. Each is populated
    /// exactly when its state is entered and is required by the states that
    /// consume it.
    #[serde(default)]
    pub unsigned_dst_tx: String,
    #[serde(default)]
    pub sent_dst_tx_hash: String,
    #[serde(default)]
    pub unsigned_sweep_tx: String,
    #[serde(default)]
    pub sent_sweep_tx_hash: String,
    /// Consecutive failed transitions since the last state change.
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_error: String,
    pub created_at: u64,
    pub updated_at: u64,
}

impl DepositWorkflow {
    pub fn workflow_id(deposit_addr: Address, src_tx_hash: &str) -> String {
        format!("{deposit_addr:#x}|{src_tx_hash}")
    }

    /// A freshly discovered deposit, as seeded by the block processor.
    pub fn discovered(
        src_chain: Chain,
        dst_chain: Chain,
        deposit_addr: Address,
        user_dst_addr: Address,
        src_tx_hash: String,
        amount_wei: U256,
    ) -> Self {
        let now = crate::now_ms();
        Self {
            id: Self::workflow_id(deposit_addr, &src_tx_hash),
            src_chain,
            dst_chain,
            deposit_addr,
            user_dst_addr,
            src_tx_hash,
            amount_wei,
            state: WorkflowState::SrcTxDiscovered,
            unsigned_dst_tx: String::new(),
            sent_dst_tx_hash: String::new(),
            unsigned_sweep_tx: String::new(),
            sent_sweep_tx_hash: String::new(),
            attempts: 0,
            last_error: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Retry backoff for failed transitions: `min(2^min(n, 10) seconds, 2 min)`.
pub fn backoff(attempts: u32) -> Duration {
    let secs = 1u64 << attempts.min(10);
    Duration::from_secs(secs.min(120))
}
