// Copyright (c) Unit Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Address-issuance API.
//!
//! `GET /gen/:src_chain/:dst_chain/:asset/:dst_addr` mints (or returns the
//! existing) deposit address for a subscription. Issuance is idempotent per
//! `(src, dst, user address)` tuple. Also serves `/health` and the
//! prometheus `/metrics` exposition.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use ethers::utils::to_checksum;
use prometheus::{Registry, TextEncoder};
use tracing::{error, info, instrument};
use unit_bridge_keys::LocalKeyStore;

use crate::error::BridgeError;
use crate::metrics::BridgeMetrics;
use crate::stores::AccountStore;
use crate::types::{account_id, Account, Chain};

pub const GEN_PATH: &str = "/gen/:src_chain/:dst_chain/:asset/:dst_addr";

/// Allowed path-segment values, from configuration.
pub struct AllowedRoutes {
    pub src_chains: Vec<String>,
    pub dst_chains: Vec<String>,
    pub assets: Vec<String>,
}

#[derive(Clone)]
pub struct ApiState {
    pub keys: Arc<LocalKeyStore>,
    pub accounts: Arc<AccountStore>,
    pub allowed: Arc<AllowedRoutes>,
    pub metrics: Arc<BridgeMetrics>,
    pub registry: Registry,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct GenerateResponse {
    pub address: String,
    pub status: String,
}

pub fn make_router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/metrics", get(serve_metrics))
        .route(GEN_PATH, get(handle_generate))
        .with_state(state)
}

/// Bind and serve the API on `socket_address` until the task is aborted.
pub fn run_server(socket_address: &SocketAddr, state: ApiState) -> tokio::task::JoinHandle<()> {
    let socket_address = *socket_address;
    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(socket_address).await.unwrap();
        info!("API listening on {socket_address}");
        axum::serve(listener, make_router(state).into_make_service())
            .await
            .unwrap();
    })
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

async fn serve_metrics(State(state): State<ApiState>) -> Result<String, (StatusCode, String)> {
    TextEncoder::new()
        .encode_to_string(&state.registry.gather())
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("metrics encoding failed: {e}"),
            )
        })
}

#[instrument(level = "info", skip(state))]
async fn handle_generate(
    Path((src_chain, dst_chain, asset, dst_addr)): Path<(String, String, String, String)>,
    State(state): State<ApiState>,
) -> Result<Json<GenerateResponse>, (StatusCode, String)> {
    state
        .metrics
        .requests_received
        .with_label_values(&["generate"])
        .inc();

    let result = generate(&state, &src_chain, &dst_chain, &asset, &dst_addr).await;
    match &result {
        Ok(_) => state.metrics.requests_ok.with_label_values(&["generate"]).inc(),
        Err(_) => state.metrics.err_requests.with_label_values(&["generate"]).inc(),
    }
    result
}

async fn generate(
    state: &ApiState,
    src_chain: &str,
    dst_chain: &str,
    asset: &str,
    dst_addr: &str,
) -> Result<Json<GenerateResponse>, (StatusCode, String)> {
    if !state.allowed.src_chains.iter().any(|c| c == src_chain) {
        return Err(bad_request("unsupported chain"));
    }
    if !state.allowed.dst_chains.iter().any(|c| c == dst_chain) {
        return Err(bad_request("unsupported destination chain"));
    }
    if !state.allowed.assets.iter().any(|a| a == asset) {
        return Err(bad_request("unsupported asset"));
    }
    let src: Chain = src_chain.parse().map_err(|_| bad_request("unsupported chain"))?;
    let dst: Chain = dst_chain
        .parse()
        .map_err(|_| bad_request("unsupported destination chain"))?;
    let user_dst_addr = match dst_addr.parse::<ethers::types::Address>() {
        Ok(addr) => addr,
        Err(_) => return Err(bad_request("invalid destination address")),
    };

    // Idempotent: an existing subscription returns its deposit address.
    let id = account_id(src, dst, user_dst_addr);
    match state.accounts.get(&id) {
        Ok(existing) => {
            return Ok(Json(GenerateResponse {
                address: to_checksum(&existing.deposit_addr, None),
                status: "ok".to_string(),
            }));
        }
        Err(BridgeError::AccountNotFound) => {}
        Err(err) => {
            error!("account lookup for {id} failed: {err}");
            return Err(internal_error());
        }
    }

    let deposit_addr = state.keys.create_key().map_err(|err| {
        error!("deposit key creation failed: {err}");
        internal_error()
    })?;
    let deposit_checksummed = to_checksum(&deposit_addr, None);

    let account = Account::new(src, dst, dst_addr, &deposit_checksummed).map_err(|err| {
        error!("account construction failed: {err}");
        internal_error()
    })?;
    state.accounts.insert(&account).map_err(|err| {
        error!("account insert for {} failed: {err}", account.id);
        internal_error()
    })?;

    info!(
        "issued deposit address {} for {}",
        deposit_checksummed, account.id
    );
    Ok(Json(GenerateResponse {
        address: deposit_checksummed,
        status: "ok".to_string(),
    }))
}

fn bad_request(message: &str) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, message.to_string())
}

fn internal_error() -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal server error".to_string(),
    )
}
