// Copyright (c) Unit Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

use std::path::Path;

use sled::Tree;
use tokio_util::sync::CancellationToken;

use crate::error::{BridgeError, BridgeResult};
use crate::workflow::DepositWorkflow;

const WORKFLOWS_TREE: &[u8] = b"workflows";

/// Durable keyed store of deposit workflow records.
///
/// Writers serialize through sled; `scan` decodes a snapshot copy of each
/// entry, so visitors never observe torn writes and may run concurrently
/// with the engine's puts.
pub struct StateStore {
    db: sled::Db,
    workflows: Tree,
}

impl StateStore {
    pub fn open(path: impl AsRef<Path>) -> BridgeResult<Self> {
        let db = sled::open(path)?;
        let workflows = db.open_tree(WORKFLOWS_TREE)?;
        Ok(Self { db, workflows })
    }

    /// Insert only if no record exists for the workflow's id. Re-delivery
    /// of the same deposit is a no-op.
    pub fn put_if_absent(&self, workflow: &DepositWorkflow) -> BridgeResult<()> {
        let blob = serde_json::to_vec(workflow)?;
        // compare_and_swap against an absent key; losing the race to an
        // existing record is the expected idempotent outcome.
        let _ = self.workflows.compare_and_swap(
            workflow.id.as_bytes(),
            None::<&[u8]>,
            Some(blob),
        )?;
        Ok(())
    }

    /// Unconditional overwrite; used to commit transitions.
    pub fn put(&self, workflow: &DepositWorkflow) -> BridgeResult<()> {
        let blob = serde_json::to_vec(workflow)?;
        self.workflows.insert(workflow.id.as_bytes(), blob)?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> BridgeResult<DepositWorkflow> {
        match self.workflows.get(id.as_bytes())? {
            Some(blob) => Ok(serde_json::from_slice(&blob)?),
            None => Err(BridgeError::Storage(format!("workflow {id} not found"))),
        }
    }

    /// Visit every workflow with a decoded snapshot copy. The visitor may
    /// abort the scan by returning an error; iteration stops when the
    /// cancellation token fires.
    pub fn scan<F>(&self, cancel: &CancellationToken, mut visit: F) -> BridgeResult<()>
    where
        F: FnMut(DepositWorkflow) -> BridgeResult<()>,
    {
        for entry in self.workflows.iter() {
            if cancel.is_cancelled() {
                return Ok(());
            }
            let (_, blob) = entry?;
            let workflow: DepositWorkflow = serde_json::from_slice(&blob)?;
            visit(workflow)?;
        }
        Ok(())
    }

    pub fn close(&self) -> BridgeResult<()> {
        self.db.flush()?;
        Ok(())
    }
}
