// Copyright (c) Unit Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Context;
use clap::{Parser, Subcommand};
use prometheus::Registry;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;
use unit_bridge::config::{
    default_data_dir, AgentConfig, DataPaths, ENV_HOT_WALLET_PRIVATE_KEY, KEYSTORE_PASSPHRASE,
};
use unit_bridge::node::run_agent_node;
use unit_bridge_keys::LocalKeyStore;

#[derive(Parser)]
#[clap(name = "unit-bridge", rename_all = "kebab-case")]
#[clap(about = "Custodial deposit-bridging agent")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import the operator hot wallet key from the environment into the
    /// keystore.
    Init,
    /// Run the API, block publisher and workflow engine in one process.
    Start,
    /// Delete all local persisted state (keystore and both databases).
    Teardown,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; the environment may be set directly.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match args.command {
        Command::Init => init(),
        Command::Start => start().await,
        Command::Teardown => teardown(),
    }
}

fn init() -> anyhow::Result<()> {
    let private_key = std::env::var(ENV_HOT_WALLET_PRIVATE_KEY)
        .with_context(|| format!("{ENV_HOT_WALLET_PRIVATE_KEY} is not set"))?;

    let paths = DataPaths::new(default_data_dir());
    let keystore = LocalKeyStore::open(paths.keystore(), KEYSTORE_PASSPHRASE)
        .context("opening keystore")?;
    let address = keystore
        .import_external(&private_key)
        .context("importing hot wallet key")?;
    info!("imported hot wallet key, address {address:#x}");
    Ok(())
}

async fn start() -> anyhow::Result<()> {
    let config = AgentConfig::from_env()?;
    let registry = Registry::new();
    let cancel = CancellationToken::new();

    let mut handles = run_agent_node(config, registry, cancel.clone()).await?;
    info!("agent started; press ctrl-c to stop");

    wait_for_shutdown().await;
    info!("shutting down");
    cancel.cancel();

    // The API server task (spawned last) has no cancellation path of its
    // own; abort it once the workers have drained.
    let server = handles.pop();
    for handle in handles {
        let _ = handle.await;
    }
    if let Some(server) = server {
        server.abort();
    }
    Ok(())
}

fn teardown() -> anyhow::Result<()> {
    let paths = DataPaths::new(default_data_dir());
    for path in [paths.keystore(), paths.accounts_db(), paths.state_db()] {
        match std::fs::remove_dir_all(&path) {
            Ok(()) => info!("removed {path:?}"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err).with_context(|| format!("removing {path:?}")),
        }
    }
    Ok(())
}

async fn wait_for_shutdown() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("installing SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
