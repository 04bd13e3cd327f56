// Copyright (c) Unit Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! A JSON-RPC client for tests that serves canned responses matched on
//! method name and serialized parameters. A `"*"` params entry acts as a
//! method-wide fallback for calls whose exact parameters are irrelevant to
//! the test.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ethers::providers::{JsonRpcClient, JsonRpcError, ProviderError, RpcError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Default)]
pub struct EthMockProvider {
    responses: Arc<Mutex<HashMap<(String, String), Value>>>,
}

#[derive(Debug, thiserror::Error)]
pub enum MockError {
    #[error("no mock response for {0}")]
    NoResponse(String),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl RpcError for MockError {
    fn as_error_response(&self) -> Option<&JsonRpcError> {
        None
    }

    fn as_serde_error(&self) -> Option<&serde_json::Error> {
        match self {
            MockError::SerdeJson(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MockError> for ProviderError {
    fn from(err: MockError) -> Self {
        ProviderError::JsonRpcClientError(Box::new(err))
    }
}

impl EthMockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a response for an exact `(method, params)` pair. Replaces
    /// any previous entry, so tests can advance mocked chain state.
    pub fn add_response<P: Serialize, R: Serialize>(
        &self,
        method: &str,
        params: P,
        response: R,
    ) -> Result<(), MockError> {
        let key = (method.to_string(), serde_json::to_string(&params)?);
        let value = serde_json::to_value(response)?;
        self.responses.lock().unwrap().insert(key, value);
        Ok(())
    }

    /// Register a fallback response used for any params of `method`.
    pub fn add_method_response<R: Serialize>(
        &self,
        method: &str,
        response: R,
    ) -> Result<(), MockError> {
        let value = serde_json::to_value(response)?;
        self.responses
            .lock()
            .unwrap()
            .insert((method.to_string(), "*".to_string()), value);
        Ok(())
    }

    /// Remove a registered response so subsequent calls fail, simulating a
    /// transient RPC outage for that query.
    pub fn remove_response<P: Serialize>(&self, method: &str, params: P) -> Result<(), MockError> {
        let key = (method.to_string(), serde_json::to_string(&params)?);
        self.responses.lock().unwrap().remove(&key);
        Ok(())
    }
}

#[async_trait]
impl JsonRpcClient for EthMockProvider {
    type Error = MockError;

    async fn request<T, R>(&self, method: &str, params: T) -> Result<R, Self::Error>
    where
        T: Debug + Serialize + Send + Sync,
        R: DeserializeOwned + Send,
    {
        let params_json = serde_json::to_string(&params)?;
        let value = {
            let responses = self.responses.lock().unwrap();
            responses
                .get(&(method.to_string(), params_json.clone()))
                .or_else(|| responses.get(&(method.to_string(), "*".to_string())))
                .cloned()
        }
        .ok_or_else(|| MockError::NoResponse(format!("{method} {params_json}")))?;
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::providers::Middleware;
    use ethers::providers::Provider;
    use ethers::types::U64;

    #[tokio::test]
    async fn test_exact_and_wildcard_matching() {
        let mock = EthMockProvider::new();
        mock.add_response("eth_blockNumber", (), U64::from(7u64))
            .unwrap();

        let provider = Provider::new(mock.clone());
        let head = provider.get_block_number().await.unwrap();
        assert_eq!(head.as_u64(), 7);

        // Wildcard answers regardless of params.
        mock.add_method_response("eth_gasPrice", U64::from(42u64))
            .unwrap();
        let price = provider.get_gas_price().await.unwrap();
        assert_eq!(price.as_u64(), 42);
    }

    #[tokio::test]
    async fn test_missing_response_errors() {
        let mock = EthMockProvider::new();
        let provider = Provider::new(mock);
        assert!(provider.get_block_number().await.is_err());
    }

    #[tokio::test]
    async fn test_remove_response() {
        let mock = EthMockProvider::new();
        mock.add_response("eth_blockNumber", (), U64::from(1u64))
            .unwrap();
        let provider = Provider::new(mock.clone());
        assert!(provider.get_block_number().await.is_ok());

        mock.remove_response("eth_blockNumber", ()).unwrap();
        assert!(provider.get_block_number().await.is_err());
    }
}
