// Copyright (c) Unit Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Passphrase-protected local keystore for the bridge agent.
//!
//! Each key lives in its own Web3-secret-storage JSON file under the keystore
//! root, named by its lowercase address. Signing decrypts the key for the
//! scope of a single call; the decrypted wallet is dropped on every exit
//! path, so key material never outlives the operation that needed it and
//! never leaves the process except as a signature.

use std::fs;
use std::path::{Path, PathBuf};

use ethers::signers::{LocalWallet, Signer, WalletError};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Signature, H256};

#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    #[error("no key for address {0}")]
    UnknownAddress(String),
    #[error("key is locked: {0}")]
    Locked(String),
    #[error("signing failed: {0}")]
    Signing(String),
    #[error("invalid private key: {0}")]
    InvalidKey(String),
    #[error("keystore io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type KeyStoreResult<T> = Result<T, KeyStoreError>;

/// Directory-backed keystore. All keys are encrypted under a single
/// process-level passphrase.
pub struct LocalKeyStore {
    root_dir: PathBuf,
    passphrase: String,
}

impl LocalKeyStore {
    /// Open (creating if needed) a keystore rooted at `root_dir`.
    pub fn open(root_dir: impl AsRef<Path>, passphrase: &str) -> KeyStoreResult<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        fs::create_dir_all(&root_dir)?;
        Ok(Self {
            root_dir,
            passphrase: passphrase.to_string(),
        })
    }

    /// Generate a fresh key, persist it encrypted, and return its address.
    pub fn create_key(&self) -> KeyStoreResult<Address> {
        let (wallet, uuid) = LocalWallet::new_keystore(
            &self.root_dir,
            &mut rand::thread_rng(),
            self.passphrase.as_bytes(),
            None,
        )
        .map_err(map_wallet_error)?;
        let address = wallet.address();
        // new_keystore names the file by a random uuid; rename so lookups by
        // address are a plain path probe.
        fs::rename(self.root_dir.join(uuid), self.key_path(address))?;
        tracing::debug!("created keystore entry for {:#x}", address);
        Ok(address)
    }

    pub fn has_key(&self, address: Address) -> bool {
        self.key_path(address).exists()
    }

    /// Sign a transaction for `address` under EIP-155 with `chain_id`.
    /// Returns the raw signed RLP, ready for `eth_sendRawTransaction`.
    pub fn sign_tx(
        &self,
        address: Address,
        tx: &TypedTransaction,
        chain_id: u64,
    ) -> KeyStoreResult<Bytes> {
        let wallet = self.unlock(address)?.with_chain_id(chain_id);
        let mut tx = tx.clone();
        tx.set_chain_id(chain_id);
        tx.set_from(address);
        let signature = wallet
            .sign_transaction_sync(&tx)
            .map_err(|e| KeyStoreError::Signing(e.to_string()))?;
        Ok(tx.rlp_signed(&signature))
    }

    /// Sign a 32-byte digest for `address`. The returned signature is the
    /// 65-byte `r || s || v` form with `v` in `{27, 28}`.
    pub fn sign_hash(&self, address: Address, digest: H256) -> KeyStoreResult<Signature> {
        let wallet = self.unlock(address)?;
        wallet
            .sign_hash(digest)
            .map_err(|e| KeyStoreError::Signing(e.to_string()))
    }

    /// Import an externally generated private key (hex, with or without the
    /// `0x` prefix). Used by the bootstrap tool to seed the operator hot
    /// wallet; never called on the serving path.
    pub fn import_external(&self, private_key_hex: &str) -> KeyStoreResult<Address> {
        let raw = hex::decode(private_key_hex.trim_start_matches("0x"))
            .map_err(|e| KeyStoreError::InvalidKey(e.to_string()))?;
        let wallet = LocalWallet::from_bytes(&raw)
            .map_err(|e| KeyStoreError::InvalidKey(e.to_string()))?;
        let address = wallet.address();
        let name = file_name(address);
        LocalWallet::encrypt_keystore(
            &self.root_dir,
            &mut rand::thread_rng(),
            &raw,
            self.passphrase.as_bytes(),
            Some(&name),
        )
        .map_err(map_wallet_error)?;
        tracing::info!("imported external key for {:#x}", address);
        Ok(address)
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    // Scoped unlock: decrypts the key file for the duration of one signing
    // call. Dropping the wallet zeroizes the key material.
    fn unlock(&self, address: Address) -> KeyStoreResult<LocalWallet> {
        let path = self.key_path(address);
        if !path.exists() {
            return Err(KeyStoreError::UnknownAddress(format!("{address:#x}")));
        }
        let wallet = LocalWallet::decrypt_keystore(&path, self.passphrase.as_bytes())
            .map_err(|e| KeyStoreError::Locked(e.to_string()))?;
        if wallet.address() != address {
            return Err(KeyStoreError::Locked(format!(
                "keystore file for {address:#x} holds a different key"
            )));
        }
        Ok(wallet)
    }

    fn key_path(&self, address: Address) -> PathBuf {
        self.root_dir.join(file_name(address))
    }
}

fn file_name(address: Address) -> String {
    format!("{address:#x}")
}

fn map_wallet_error(err: WalletError) -> KeyStoreError {
    match err {
        WalletError::IoError(e) => KeyStoreError::Io(e),
        other => KeyStoreError::Locked(other.to_string()),
    }
}
