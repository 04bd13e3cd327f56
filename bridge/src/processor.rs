// Copyright (c) Unit Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Deposit discovery.
//!
//! Consumes published finalized blocks, matches transaction recipients
//! against known deposit addresses, and seeds a workflow for each hit.
//! Seeding uses `put_if_absent`, so re-delivery of a block is harmless.

use std::sync::Arc;

use ethers::types::U256;
use tracing::{debug, info};

use crate::error::{BridgeError, BridgeResult};
use crate::metrics::BridgeMetrics;
use crate::stores::{AccountStore, StateStore};
use crate::types::SourceBlock;
use crate::workflow::DepositWorkflow;

pub struct BlockProcessor {
    accounts: Arc<AccountStore>,
    states: Arc<StateStore>,
    /// Deposits must exceed this to seed a workflow. Zero admits any
    /// non-zero transfer.
    min_deposit_wei: U256,
    metrics: Arc<BridgeMetrics>,
}

impl BlockProcessor {
    pub fn new(
        accounts: Arc<AccountStore>,
        states: Arc<StateStore>,
        min_deposit_wei: u128,
        metrics: Arc<BridgeMetrics>,
    ) -> Self {
        Self {
            accounts,
            states,
            min_deposit_wei: U256::from(min_deposit_wei),
            metrics,
        }
    }

    /// Scan one block for transfers into known deposit addresses.
    pub fn process_block(&self, block: &SourceBlock) -> BridgeResult<()> {
        for transfer in &block.transfers {
            // Contract deployments carry no recipient.
            let to = match transfer.to {
                Some(to) => to,
                None => continue,
            };

            let account = match self.accounts.get_by_deposit_addr(to) {
                Ok(account) => account,
                Err(BridgeError::AccountNotFound) => continue,
                Err(err) => return Err(err),
            };

            if transfer.value <= self.min_deposit_wei {
                debug!(
                    "skipping deposit below threshold: tx={:#x} value={}",
                    transfer.tx_hash, transfer.value
                );
                continue;
            }

            let workflow = DepositWorkflow::discovered(
                account.src_chain,
                account.dst_chain,
                account.deposit_addr,
                account.user_dst_addr,
                format!("{:#x}", transfer.tx_hash),
                transfer.value,
            );
            info!(
                "discovered deposit: block={} tx={:#x} deposit_addr={:#x} value={}",
                block.number, transfer.tx_hash, account.deposit_addr, transfer.value
            );
            self.states.put_if_absent(&workflow)?;
            self.metrics.workflows_created.inc();
        }
        self.metrics.blocks_processed.inc();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Account, Chain, NativeTransfer};
    use crate::workflow::WorkflowState;
    use ethers::types::{Address, H256};
    use tokio_util::sync::CancellationToken;

    struct Fixture {
        _dir: tempfile::TempDir,
        accounts: Arc<AccountStore>,
        states: Arc<StateStore>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let accounts = Arc::new(AccountStore::open(dir.path().join("accounts.db")).unwrap());
        let states = Arc::new(StateStore::open(dir.path().join("state.db")).unwrap());
        Fixture {
            _dir: dir,
            accounts,
            states,
        }
    }

    fn processor(fx: &Fixture, min_deposit_wei: u128) -> BlockProcessor {
        BlockProcessor::new(
            fx.accounts.clone(),
            fx.states.clone(),
            min_deposit_wei,
            BridgeMetrics::new_for_testing(),
        )
    }

    fn seeded_account(fx: &Fixture) -> Account {
        let account = Account::new(
            Chain::Ethereum,
            Chain::Hyperliquid,
            "0x2222222222222222222222222222222222222222",
            "0x1111111111111111111111111111111111111111",
        )
        .unwrap();
        fx.accounts.insert(&account).unwrap();
        account
    }

    fn block(number: u64, transfers: Vec<NativeTransfer>) -> SourceBlock {
        SourceBlock {
            number,
            hash: H256::repeat_byte(number as u8),
            transfers,
        }
    }

    fn workflows(fx: &Fixture) -> Vec<DepositWorkflow> {
        let mut all = Vec::new();
        fx.states
            .scan(&CancellationToken::new(), |wf| {
                all.push(wf);
                Ok(())
            })
            .unwrap();
        all
    }

    #[test]
    fn test_matching_transfer_seeds_workflow() {
        let fx = fixture();
        let account = seeded_account(&fx);
        let proc = processor(&fx, 0);

        let tx_hash = H256::repeat_byte(0xAB);
        proc.process_block(&block(
            1,
            vec![NativeTransfer {
                to: Some(account.deposit_addr),
                value: U256::from(100u64),
                tx_hash,
            }],
        ))
        .unwrap();

        let all = workflows(&fx);
        assert_eq!(all.len(), 1);
        let wf = &all[0];
        assert_eq!(wf.state, WorkflowState::SrcTxDiscovered);
        assert_eq!(wf.deposit_addr, account.deposit_addr);
        assert_eq!(wf.user_dst_addr, account.user_dst_addr);
        assert_eq!(wf.amount_wei, U256::from(100u64));
        assert_eq!(wf.src_tx_hash, format!("{tx_hash:#x}"));
        assert_eq!(
            wf.id,
            DepositWorkflow::workflow_id(account.deposit_addr, &format!("{tx_hash:#x}"))
        );
    }

    #[test]
    fn test_unknown_deposit_address_is_skipped() {
        let fx = fixture();
        seeded_account(&fx);
        let proc = processor(&fx, 0);

        proc.process_block(&block(
            3,
            vec![NativeTransfer {
                to: Some(Address::repeat_byte(0x33)),
                value: U256::one(),
                tx_hash: H256::repeat_byte(1),
            }],
        ))
        .unwrap();

        assert!(workflows(&fx).is_empty());
    }

    #[test]
    fn test_contract_deployment_is_skipped() {
        let fx = fixture();
        seeded_account(&fx);
        let proc = processor(&fx, 0);

        proc.process_block(&block(
            4,
            vec![NativeTransfer {
                to: None,
                value: U256::from(5u64),
                tx_hash: H256::repeat_byte(2),
            }],
        ))
        .unwrap();

        assert!(workflows(&fx).is_empty());
    }

    #[test]
    fn test_zero_value_transfer_is_skipped() {
        let fx = fixture();
        let account = seeded_account(&fx);
        let proc = processor(&fx, 0);

        proc.process_block(&block(
            5,
            vec![NativeTransfer {
                to: Some(account.deposit_addr),
                value: U256::zero(),
                tx_hash: H256::repeat_byte(3),
            }],
        ))
        .unwrap();

        assert!(workflows(&fx).is_empty());
    }

    #[test]
    fn test_min_deposit_threshold() {
        let fx = fixture();
        let account = seeded_account(&fx);
        let proc = processor(&fx, 1_000);

        proc.process_block(&block(
            6,
            vec![
                NativeTransfer {
                    to: Some(account.deposit_addr),
                    value: U256::from(1_000u64),
                    tx_hash: H256::repeat_byte(4),
                },
                NativeTransfer {
                    to: Some(account.deposit_addr),
                    value: U256::from(1_001u64),
                    tx_hash: H256::repeat_byte(5),
                },
            ],
        ))
        .unwrap();

        let all = workflows(&fx);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].amount_wei, U256::from(1_001u64));
    }

    #[test]
    fn test_reprocessing_is_idempotent() {
        let fx = fixture();
        let account = seeded_account(&fx);
        let proc = processor(&fx, 0);

        let b = block(
            7,
            vec![NativeTransfer {
                to: Some(account.deposit_addr),
                value: U256::from(42u64),
                tx_hash: H256::repeat_byte(6),
            }],
        );
        proc.process_block(&b).unwrap();

        // Mutate the stored record, then re-process: the record must win.
        let mut stored = workflows(&fx).remove(0);
        stored.state = WorkflowState::DstTxSent;
        stored.sent_dst_tx_hash = "0xsent".to_string();
        fx.states.put(&stored).unwrap();

        proc.process_block(&b).unwrap();
        let all = workflows(&fx);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].state, WorkflowState::DstTxSent);
        assert_eq!(all[0].sent_dst_tx_hash, "0xsent");
    }

    #[test]
    fn test_two_deposits_same_address_different_txs() {
        let fx = fixture();
        let account = seeded_account(&fx);
        let proc = processor(&fx, 0);

        proc.process_block(&block(
            8,
            vec![
                NativeTransfer {
                    to: Some(account.deposit_addr),
                    value: U256::from(1u64),
                    tx_hash: H256::repeat_byte(7),
                },
                NativeTransfer {
                    to: Some(account.deposit_addr),
                    value: U256::from(2u64),
                    tx_hash: H256::repeat_byte(8),
                },
            ],
        ))
        .unwrap();

        assert_eq!(workflows(&fx).len(), 2);
    }
}
