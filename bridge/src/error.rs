// Copyright (c) Unit Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

use unit_bridge_keys::KeyStoreError;

/// Error kinds visible to the workflow engine's transition function.
///
/// `Transient` covers anything worth retrying under backoff (network
/// flakiness, a node that has not seen a receipt yet). `Rejected` means the
/// chain executed and reverted the transaction; the engine reacts by moving
/// the workflow onto a rebuild path rather than retrying the same payload.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("transient: {0}")]
    Transient(String),
    #[error("transaction rejected: {0}")]
    Rejected(String),
    #[error("insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: String, need: String },
    #[error("zero balance for {0}")]
    ZeroBalance(String),
    #[error("unknown key address: {0}")]
    UnknownAddress(String),
    #[error("unknown workflow state: {0}")]
    UnknownState(String),
    #[error("account not found")]
    AccountNotFound,
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("keystore error: {0}")]
    KeyStore(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("{0}")]
    Internal(String),
}

impl BridgeError {
    /// Short stable identifier used as a metrics label.
    pub fn error_type(&self) -> &'static str {
        match self {
            BridgeError::Transient(_) => "transient",
            BridgeError::Rejected(_) => "rejected",
            BridgeError::InsufficientBalance { .. } => "insufficient_balance",
            BridgeError::ZeroBalance(_) => "zero_balance",
            BridgeError::UnknownAddress(_) => "unknown_address",
            BridgeError::UnknownState(_) => "unknown_state",
            BridgeError::AccountNotFound => "account_not_found",
            BridgeError::InvalidAddress(_) => "invalid_address",
            BridgeError::Storage(_) => "storage",
            BridgeError::Serialization(_) => "serialization",
            BridgeError::KeyStore(_) => "keystore",
            BridgeError::Config(_) => "config",
            BridgeError::Internal(_) => "internal",
        }
    }

    /// True when the chain accepted but reverted the transaction.
    pub fn is_rejection(&self) -> bool {
        matches!(self, BridgeError::Rejected(_))
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;

impl From<ethers::providers::ProviderError> for BridgeError {
    fn from(err: ethers::providers::ProviderError) -> Self {
        BridgeError::Transient(err.to_string())
    }
}

impl From<sled::Error> for BridgeError {
    fn from(err: sled::Error) -> Self {
        BridgeError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        BridgeError::Transient(err.to_string())
    }
}

impl From<KeyStoreError> for BridgeError {
    fn from(err: KeyStoreError) -> Self {
        match err {
            KeyStoreError::UnknownAddress(addr) => BridgeError::UnknownAddress(addr),
            other => BridgeError::KeyStore(other.to_string()),
        }
    }
}
