// Copyright (c) Unit Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

use std::path::Path;

use ethers::types::Address;
use sled::transaction::ConflictableTransactionError;
use sled::{Transactional, Tree};
use tracing::debug;

use crate::error::{BridgeError, BridgeResult};
use crate::types::Account;

const ACCOUNTS_TREE: &[u8] = b"accounts";
const DEPOSIT_INDEX_TREE: &[u8] = b"deposit_index";

/// Persistent store of bridge subscriptions.
///
/// Two trees: the primary `accounts` tree keyed by account id, and a
/// `deposit_index` tree mapping deposit address to account id. Both are
/// written in one sled transaction so the pair is either fully present or
/// fully absent.
pub struct AccountStore {
    db: sled::Db,
    accounts: Tree,
    deposit_index: Tree,
}

impl AccountStore {
    pub fn open(path: impl AsRef<Path>) -> BridgeResult<Self> {
        let db = sled::open(path)?;
        let accounts = db.open_tree(ACCOUNTS_TREE)?;
        let deposit_index = db.open_tree(DEPOSIT_INDEX_TREE)?;
        Ok(Self {
            db,
            accounts,
            deposit_index,
        })
    }

    /// Insert a new account, maintaining the reverse index atomically.
    /// Fails if the id or the deposit address is already taken.
    pub fn insert(&self, account: &Account) -> BridgeResult<()> {
        let id = account.id.as_bytes().to_vec();
        let index_key = index_key(account.deposit_addr);
        let blob = serde_json::to_vec(account)?;

        (&self.accounts, &self.deposit_index)
            .transaction(|(accounts, index)| {
                if accounts.get(&id)?.is_some() {
                    return Err(ConflictableTransactionError::Abort(BridgeError::Storage(
                        format!("account {} already exists", account.id),
                    )));
                }
                if index.get(&index_key)?.is_some() {
                    return Err(ConflictableTransactionError::Abort(BridgeError::Storage(
                        format!(
                            "deposit address {:#x} already assigned",
                            account.deposit_addr
                        ),
                    )));
                }
                accounts.insert(id.as_slice(), blob.as_slice())?;
                index.insert(index_key.as_slice(), id.as_slice())?;
                Ok(())
            })
            .map_err(|e| match e {
                sled::transaction::TransactionError::Abort(err) => err,
                sled::transaction::TransactionError::Storage(err) => err.into(),
            })?;

        debug!(
            "inserted account {} with deposit address {:#x}",
            account.id, account.deposit_addr
        );
        Ok(())
    }

    pub fn get(&self, id: &str) -> BridgeResult<Account> {
        match self.accounts.get(id.as_bytes())? {
            Some(blob) => Ok(serde_json::from_slice(&blob)?),
            None => Err(BridgeError::AccountNotFound),
        }
    }

    /// Reverse lookup: which account owns this deposit address?
    pub fn get_by_deposit_addr(&self, deposit_addr: Address) -> BridgeResult<Account> {
        let id = match self.deposit_index.get(index_key(deposit_addr))? {
            Some(id) => id,
            None => return Err(BridgeError::AccountNotFound),
        };
        let id = String::from_utf8(id.to_vec())
            .map_err(|e| BridgeError::Storage(format!("corrupt deposit index entry: {e}")))?;
        self.get(&id)
    }

    pub fn close(&self) -> BridgeResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

fn index_key(deposit_addr: Address) -> Vec<u8> {
    format!("{deposit_addr:#x}").into_bytes()
}
