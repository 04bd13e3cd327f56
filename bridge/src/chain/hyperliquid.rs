// Copyright (c) Unit Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Hyperliquid settlement adapter.
//!
//! Deposits are credited by signing a spot-send action under Hyperliquid's
//! EIP-712 user-signed-action scheme and posting it to the exchange
//! endpoint. The `time` field doubles as the exchange nonce; it is frozen
//! into the unsigned action at build time so a re-broadcast after a crash
//! replays the same nonce instead of minting a second transfer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::transaction::eip712::{Eip712, TypedData};
use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};
use unit_bridge_keys::LocalKeyStore;

use crate::chain::ChainAdapter;
use crate::config::HyperliquidConfig;
use crate::error::{BridgeError, BridgeResult};

/// Signing domain fixed by the Hyperliquid API.
const SIGNATURE_CHAIN_ID: &str = "0x66eee";
const DOMAIN_NAME: &str = "HyperliquidSignTransaction";
const DOMAIN_VERSION: &str = "1";
const ZERO_VERIFYING_CONTRACT: &str = "0x0000000000000000000000000000000000000000";

pub const SPOT_SEND_PRIMARY_TYPE: &str = "HyperliquidTransaction:SpotSend";

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// The unsigned spot-send payload persisted in the workflow record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotSendAction {
    pub primary_type: String,
    #[serde(rename = "type")]
    pub action_type: String,
    pub destination: String,
    pub amount: String,
    pub token: String,
    /// Milliseconds timestamp; also the exchange nonce.
    pub time: u64,
}

#[derive(Debug, Deserialize)]
struct TransferResponse {
    status: String,
    #[serde(rename = "txHash", default)]
    tx_hash: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpotBalance {
    coin: String,
    total: String,
}

#[derive(Debug, Deserialize)]
struct SpotUserState {
    #[serde(default)]
    balances: Vec<SpotBalance>,
}

/// Thin JSON-over-HTTP client for the exchange API.
pub struct ExchangeClient {
    http: reqwest::Client,
    base_url: String,
}

impl ExchangeClient {
    pub fn new(base_url: &str) -> BridgeResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| BridgeError::Config(format!("http client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn post(&self, path: &str, body: &Value) -> BridgeResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.post(&url).json(body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if status.is_client_error() || status.is_server_error() {
            return Err(BridgeError::Transient(format!("{url}: status {status}: {text}")));
        }
        serde_json::from_str(&text).map_err(Into::into)
    }
}

pub struct HyperliquidAdapter {
    client: ExchangeClient,
    keys: Arc<LocalKeyStore>,
    /// Operator hot wallet; signs every spot-send.
    operator: Address,
    config: HyperliquidConfig,
}

impl HyperliquidAdapter {
    pub fn new(
        keys: Arc<LocalKeyStore>,
        operator: Address,
        config: HyperliquidConfig,
    ) -> BridgeResult<Self> {
        Ok(Self {
            client: ExchangeClient::new(&config.api_url)?,
            keys,
            operator,
            config,
        })
    }

    fn hyperliquid_chain(&self) -> &'static str {
        if self.config.is_mainnet {
            "Mainnet"
        } else {
            "Testnet"
        }
    }

    /// Coin symbol of the configured token (the part before the token id).
    fn coin(&self) -> &str {
        self.config.token.split(':').next().unwrap_or("USDC")
    }

    fn spot_send(&self, destination: Address, amount: String) -> SpotSendAction {
        SpotSendAction {
            primary_type: SPOT_SEND_PRIMARY_TYPE.to_string(),
            action_type: "spotSend".to_string(),
            // The signing scheme requires a lowercase destination; normalize
            // here so the signed and posted forms always agree.
            destination: format!("{destination:#x}"),
            amount,
            token: self.config.token.clone(),
            time: crate::now_ms(),
        }
    }
}

#[async_trait]
impl ChainAdapter for HyperliquidAdapter {
    async fn build_send(&self, _from: Address, to: Address, amount: U256) -> BridgeResult<String> {
        let units = format_destination_amount(amount, self.config.units_per_native);
        let action = self.spot_send(to, units);
        debug!(
            "built spot send: destination={} amount={} time={}",
            action.destination, action.amount, action.time
        );
        Ok(serde_json::to_string(&action)?)
    }

    async fn build_sweep(&self, from: Address, to: Address) -> BridgeResult<String> {
        let state: SpotUserState = serde_json::from_value(
            self.client
                .post(
                    "/info",
                    &json!({
                        "type": "spotClearinghouseState",
                        "user": format!("{from:#x}"),
                    }),
                )
                .await?,
        )?;

        let total = state
            .balances
            .iter()
            .find(|b| b.coin == self.coin())
            .map(|b| b.total.clone())
            .unwrap_or_else(|| "0.0".to_string());
        if total.parse::<f64>().unwrap_or(0.0) == 0.0 {
            return Err(BridgeError::ZeroBalance(format!("{from:#x}")));
        }

        let action = self.spot_send(to, total);
        Ok(serde_json::to_string(&action)?)
    }

    async fn broadcast(&self, unsigned_tx: &str, _from: Address) -> BridgeResult<String> {
        let action: SpotSendAction = serde_json::from_str(unsigned_tx)?;
        let chain = self.hyperliquid_chain();

        let digest = user_signed_digest(&action, chain)?;
        let signature = self.keys.sign_hash(self.operator, digest)?;

        // The posted action carries the signing-domain fields alongside the
        // typed message fields.
        let payload = json!({
            "action": {
                "type": action.action_type,
                "signatureChainId": SIGNATURE_CHAIN_ID,
                "hyperliquidChain": chain,
                "destination": action.destination,
                "token": action.token,
                "amount": action.amount,
                "time": action.time,
            },
            "nonce": action.time,
            "signature": {
                "r": format!("0x{:064x}", signature.r),
                "s": format!("0x{:064x}", signature.s),
                "v": signature.v,
            },
        });

        let response: TransferResponse =
            serde_json::from_value(self.client.post("/exchange", &payload).await?)?;
        if response.status != "ok" {
            return Err(BridgeError::Transient(format!(
                "exchange rejected spot send: status={} error={:?}",
                response.status, response.error
            )));
        }

        let tx_hash = response.tx_hash.unwrap_or_default();
        info!(
            "spot send accepted: destination={} amount={} tx_hash={:?}",
            action.destination, action.amount, tx_hash
        );
        Ok(tx_hash)
    }

    async fn is_confirmed(&self, _tx_hash: &str, _min_confirmations: u64) -> BridgeResult<bool> {
        // Single-block finality (~200ms block times); an accepted transfer
        // is final as far as this agent is concerned.
        Ok(true)
    }
}

/// Convert a source amount in wei into destination units, formatted to six
/// decimals. Integer arithmetic throughout; truncation, not rounding.
pub fn format_destination_amount(amount_wei: U256, units_per_native: u64) -> String {
    let micro_units =
        amount_wei * U256::from(units_per_native) * U256::from(1_000_000u64) / U256::exp10(18);
    let whole = micro_units / U256::from(1_000_000u64);
    let frac = (micro_units % U256::from(1_000_000u64)).as_u64();
    format!("{whole}.{frac:06}")
}

/// EIP-712 digest of a user-signed spot-send action under the fixed
/// Hyperliquid signing domain.
pub fn user_signed_digest(action: &SpotSendAction, hyperliquid_chain: &str) -> BridgeResult<H256> {
    let mut types = serde_json::Map::new();
    types.insert(
        "EIP712Domain".to_string(),
        json!([
            { "name": "name", "type": "string" },
            { "name": "version", "type": "string" },
            { "name": "chainId", "type": "uint256" },
            { "name": "verifyingContract", "type": "address" },
        ]),
    );
    types.insert(
        action.primary_type.clone(),
        json!([
            { "name": "hyperliquidChain", "type": "string" },
            { "name": "destination", "type": "string" },
            { "name": "token", "type": "string" },
            { "name": "amount", "type": "string" },
            { "name": "time", "type": "uint64" },
        ]),
    );

    let typed: TypedData = serde_json::from_value(json!({
        "types": types,
        "primaryType": action.primary_type,
        "domain": {
            "name": DOMAIN_NAME,
            "version": DOMAIN_VERSION,
            "chainId": SIGNATURE_CHAIN_ID,
            "verifyingContract": ZERO_VERIFYING_CONTRACT,
        },
        "message": {
            "hyperliquidChain": hyperliquid_chain,
            "destination": action.destination,
            "token": action.token,
            "amount": action.amount,
            "time": action.time,
        },
    }))?;

    let digest = typed
        .encode_eip712()
        .map_err(|e| BridgeError::Serialization(format!("eip712 encoding: {e}")))?;
    Ok(H256::from(digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Json, Router};
    use ethers::types::RecoveryMessage;
    use std::sync::Mutex;

    fn test_config(api_url: &str) -> HyperliquidConfig {
        HyperliquidConfig {
            api_url: api_url.to_string(),
            ..Default::default()
        }
    }

    fn new_adapter(api_url: &str) -> (tempfile::TempDir, Address, HyperliquidAdapter) {
        let dir = tempfile::tempdir().unwrap();
        let keys = Arc::new(LocalKeyStore::open(dir.path(), "test").unwrap());
        let operator = keys.create_key().unwrap();
        let adapter = HyperliquidAdapter::new(keys, operator, test_config(api_url)).unwrap();
        (dir, operator, adapter)
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn test_format_destination_amount() {
        // 0.01 ETH at 1000 units per coin
        assert_eq!(
            format_destination_amount(U256::from(10_000_000_000_000_000u64), 1_000),
            "10.000000"
        );
        assert_eq!(format_destination_amount(U256::exp10(18), 1_000), "1000.000000");
        assert_eq!(format_destination_amount(U256::one(), 1_000), "0.000000");
        // 0.0123456 ETH -> 12.345600
        assert_eq!(
            format_destination_amount(U256::from(12_345_600_000_000_000u64), 1_000),
            "12.345600"
        );
    }

    #[tokio::test]
    async fn test_build_send_freezes_time_and_lowercases_destination() {
        let (_dir, _operator, adapter) = new_adapter("http://localhost:1");
        let to: Address = "0x960B650301E941C095AEF35F57AE1B2D73FC4DF1"
            .parse()
            .unwrap();

        let raw = adapter
            .build_send(
                Address::repeat_byte(1),
                to,
                U256::from(10_000_000_000_000_000u64),
            )
            .await
            .unwrap();
        let action: SpotSendAction = serde_json::from_str(&raw).unwrap();

        assert_eq!(action.primary_type, SPOT_SEND_PRIMARY_TYPE);
        assert_eq!(action.action_type, "spotSend");
        assert_eq!(
            action.destination,
            "0x960b650301e941c095aef35f57ae1b2d73fc4df1"
        );
        assert_eq!(action.amount, "10.000000");
        assert_eq!(action.token, crate::config::USDC_TESTNET_TOKEN);
        assert!(action.time > 0);
    }

    #[test]
    fn test_digest_signature_recovers_operator() {
        let dir = tempfile::tempdir().unwrap();
        let keys = Arc::new(LocalKeyStore::open(dir.path(), "test").unwrap());
        let operator = keys.create_key().unwrap();

        let action = SpotSendAction {
            primary_type: SPOT_SEND_PRIMARY_TYPE.to_string(),
            action_type: "spotSend".to_string(),
            destination: "0x960b650301e941c095aef35f57ae1b2d73fc4df1".to_string(),
            amount: "10.000000".to_string(),
            token: crate::config::USDC_TESTNET_TOKEN.to_string(),
            time: 1_700_000_000_000,
        };

        let digest = user_signed_digest(&action, "Testnet").unwrap();
        let signature = keys.sign_hash(operator, digest).unwrap();
        let recovered = signature.recover(RecoveryMessage::Hash(digest)).unwrap();
        assert_eq!(recovered, operator);
    }

    #[test]
    fn test_digest_is_stable() {
        let action = SpotSendAction {
            primary_type: SPOT_SEND_PRIMARY_TYPE.to_string(),
            action_type: "spotSend".to_string(),
            destination: "0x960b650301e941c095aef35f57ae1b2d73fc4df1".to_string(),
            amount: "10.000000".to_string(),
            token: crate::config::USDC_TESTNET_TOKEN.to_string(),
            time: 1_700_000_000_000,
        };
        let first = user_signed_digest(&action, "Testnet").unwrap();
        let second = user_signed_digest(&action, "Testnet").unwrap();
        assert_eq!(first, second);
        // Chain label participates in the digest.
        let mainnet = user_signed_digest(&action, "Mainnet").unwrap();
        assert_ne!(first, mainnet);
    }

    #[tokio::test]
    async fn test_broadcast_posts_signed_action() {
        let captured: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
        let captured_clone = captured.clone();
        let router = Router::new().route(
            "/exchange",
            post(move |Json(body): Json<Value>| {
                let captured = captured_clone.clone();
                async move {
                    *captured.lock().unwrap() = Some(body);
                    Json(json!({ "status": "ok", "txHash": "0xhltx" }))
                }
            }),
        );
        let base_url = serve(router).await;
        let (_dir, _operator, adapter) = new_adapter(&base_url);

        let raw = adapter
            .build_send(
                Address::repeat_byte(1),
                Address::repeat_byte(2),
                U256::from(10_000_000_000_000_000u64),
            )
            .await
            .unwrap();
        let action: SpotSendAction = serde_json::from_str(&raw).unwrap();

        let tx_hash = adapter
            .broadcast(&raw, Address::repeat_byte(1))
            .await
            .unwrap();
        assert_eq!(tx_hash, "0xhltx");

        let body = captured.lock().unwrap().clone().unwrap();
        // The frozen build-time nonce is replayed verbatim.
        assert_eq!(body["nonce"].as_u64().unwrap(), action.time);
        assert_eq!(body["action"]["time"].as_u64().unwrap(), action.time);
        assert_eq!(body["action"]["type"], "spotSend");
        assert_eq!(body["action"]["signatureChainId"], SIGNATURE_CHAIN_ID);
        assert_eq!(body["action"]["hyperliquidChain"], "Testnet");
        assert_eq!(
            body["action"]["destination"],
            "0x0202020202020202020202020202020202020202"
        );
        assert!(body["signature"]["r"].as_str().unwrap().starts_with("0x"));
        assert!(body["signature"]["s"].as_str().unwrap().starts_with("0x"));
        let v = body["signature"]["v"].as_u64().unwrap();
        assert!(v == 27 || v == 28);
    }

    #[tokio::test]
    async fn test_broadcast_non_ok_status_is_transient() {
        let router = Router::new().route(
            "/exchange",
            post(|| async { Json(json!({ "status": "err", "error": "nope" })) }),
        );
        let base_url = serve(router).await;
        let (_dir, _operator, adapter) = new_adapter(&base_url);

        let raw = adapter
            .build_send(Address::repeat_byte(1), Address::repeat_byte(2), U256::exp10(16))
            .await
            .unwrap();
        let err = adapter
            .broadcast(&raw, Address::repeat_byte(1))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Transient(_)));
    }

    #[tokio::test]
    async fn test_broadcast_missing_tx_hash_is_empty_string() {
        let router = Router::new().route(
            "/exchange",
            post(|| async { Json(json!({ "status": "ok" })) }),
        );
        let base_url = serve(router).await;
        let (_dir, _operator, adapter) = new_adapter(&base_url);

        let raw = adapter
            .build_send(Address::repeat_byte(1), Address::repeat_byte(2), U256::exp10(16))
            .await
            .unwrap();
        let tx_hash = adapter
            .broadcast(&raw, Address::repeat_byte(1))
            .await
            .unwrap();
        assert_eq!(tx_hash, "");
    }

    #[tokio::test]
    async fn test_build_sweep_full_balance() {
        let router = Router::new().route(
            "/info",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["type"], "spotClearinghouseState");
                Json(json!({
                    "balances": [
                        { "coin": "HYPE", "total": "5.0" },
                        { "coin": "USDC", "total": "12.5" },
                    ]
                }))
            }),
        );
        let base_url = serve(router).await;
        let (_dir, _operator, adapter) = new_adapter(&base_url);

        let raw = adapter
            .build_sweep(Address::repeat_byte(3), Address::repeat_byte(4))
            .await
            .unwrap();
        let action: SpotSendAction = serde_json::from_str(&raw).unwrap();
        assert_eq!(action.amount, "12.5");
        assert_eq!(
            action.destination,
            "0x0404040404040404040404040404040404040404"
        );
    }

    #[tokio::test]
    async fn test_build_sweep_zero_balance() {
        let router = Router::new().route(
            "/info",
            post(|| async { Json(json!({ "balances": [{ "coin": "USDC", "total": "0.0" }] })) }),
        );
        let base_url = serve(router).await;
        let (_dir, _operator, adapter) = new_adapter(&base_url);

        let err = adapter
            .build_sweep(Address::repeat_byte(3), Address::repeat_byte(4))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::ZeroBalance(_)));
    }

    #[tokio::test]
    async fn test_is_confirmed_always_true() {
        let (_dir, _operator, adapter) = new_adapter("http://localhost:1");
        assert!(adapter.is_confirmed("0xanything", 99).await.unwrap());
    }
}
