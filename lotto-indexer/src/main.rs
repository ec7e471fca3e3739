// Copyright (c) BCLot, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use lotto_indexer::chain::ConfiguredAdapterFactory;
use lotto_indexer::config::{Config, IndexerConfig};
use lotto_indexer::metrics::IndexerMetrics;
use lotto_indexer::notify::{LogAutomationTrigger, LogWinNotifier};
use lotto_indexer::server::{run_api_server, ApiState};
use lotto_indexer::store::pg::PgStore;
use lotto_indexer::supervisor::ConnectionSupervisor;
use lotto_pg_db::{Db, DbArgs};
use prometheus::Registry;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(rename_all = "kebab-case", author, version)]
struct Args {
    #[command(flatten)]
    db_args: DbArgs,
    /// Chain and sync configuration, YAML or JSON.
    #[clap(env, long, default_value = "lotto_indexer_config.yaml")]
    config_path: PathBuf,
    #[clap(env, long, default_value = "0.0.0.0:9184")]
    api_address: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = IndexerConfig::load(&args.config_path)
        .with_context(|| format!("reading config from {:?}", args.config_path))?;
    config.validate().context("invalid configuration")?;
    let config = Arc::new(config);

    let db = Db::for_write(args.db_args).await.context("connecting to database")?;
    db.run_migrations(&lotto_schema::MIGRATIONS).await?;
    let store = Arc::new(PgStore::new(db));

    let registry = Registry::new();
    let metrics = Arc::new(IndexerMetrics::new(&registry));

    let supervisor = Arc::new(ConnectionSupervisor::new(
        config.clone(),
        store,
        Arc::new(LogWinNotifier),
        Arc::new(LogAutomationTrigger),
        metrics,
    ));
    for chain_config in &config.chains {
        info!(
            "[{}] registering {} chain ({} contract(s))",
            chain_config.chain_name,
            chain_config.kind,
            chain_config.contract_addresses.len()
        );
        supervisor.add_chain(
            chain_config.clone(),
            Arc::new(ConfiguredAdapterFactory::new(chain_config.clone())),
        );
    }
    supervisor.start();

    let cancel = CancellationToken::new();
    let api = tokio::spawn(run_api_server(
        args.api_address,
        Arc::new(ApiState {
            supervisor: supervisor.clone(),
            registry,
        }),
        cancel.clone(),
    ));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down ...");
    cancel.cancel();
    supervisor.shutdown().await;
    api.await??;
    Ok(())
}
