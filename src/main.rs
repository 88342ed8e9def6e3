//! Yieldscope - yield vault valuation backend
//!
//! Resolves wrapped deposit tokens, attributes strategy funds to
//! external protocols and publishes windowed system snapshots, either
//! as a one-shot JSON dump or over HTTP.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tokio::time::interval;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use yieldscope_backend::api;
use yieldscope_backend::attribution::AttributionEngine;
use yieldscope_backend::chain::rpc::JsonRpcChainReader;
use yieldscope_backend::chain::ChainReader;
use yieldscope_backend::listing::{HttpVaultListingFeed, VaultListingFeed};
use yieldscope_backend::metadata::{coingecko::CoingeckoClient, MetadataService};
use yieldscope_backend::models::Config;
use yieldscope_backend::pipeline::AggregationPipeline;
use yieldscope_backend::resolver::{
    AssetInfoCache, TokenTreeResolver, WrapperTables,
};

#[derive(Parser, Debug)]
#[command(name = "yieldscope", about = "Yield vault valuation backend")]
struct Args {
    /// First vault index of the aggregation window
    #[arg(long)]
    offset: Option<usize>,

    /// Number of vaults in the aggregation window
    #[arg(long)]
    size: Option<usize>,

    /// Path to a wrapper classification tables file (overrides the
    /// compiled-in tables)
    #[arg(long)]
    tables: Option<String>,

    /// JSON file of known asset metadata to pre-warm the cache with
    #[arg(long, env = "ASSET_SEED_PATH")]
    asset_seed: Option<String>,

    /// Serve snapshots over HTTP instead of printing one and exiting
    #[arg(long)]
    serve: bool,

    /// HTTP port when serving
    #[arg(long)]
    port: Option<u16>,

    /// Seconds between pipeline runs when serving
    #[arg(long, default_value_t = 300)]
    refresh_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "yieldscope_backend=info,yieldscope=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;

    let offset = args.offset.unwrap_or(config.window_offset);
    let size = args.size.unwrap_or(config.window_size);
    let port = args.port.unwrap_or(config.port);

    let tables = match args.tables.as_deref().or(config.wrapper_tables_path.as_deref()) {
        Some(path) => WrapperTables::from_path(path)
            .with_context(|| format!("loading wrapper tables from {path}"))?,
        None => WrapperTables::load_default().context("loading built-in wrapper tables")?,
    };

    let chain: Arc<dyn ChainReader> = Arc::new(
        JsonRpcChainReader::new(config.rpc_url.clone()).context("building chain reader")?,
    );
    let metadata: Arc<dyn MetadataService> = Arc::new(
        CoingeckoClient::new(config.coingecko_api.clone()).context("building metadata client")?,
    );
    let feed = HttpVaultListingFeed::new(
        config.vaults_api.clone(),
        config.vault_registry_api.clone(),
    )
    .context("building vault listing feed")?;

    let cache = match &args.asset_seed {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading asset seed {path}"))?;
            let entries: Vec<yieldscope_backend::models::AssetInfo> =
                serde_json::from_str(&raw).with_context(|| format!("parsing asset seed {path}"))?;
            info!(entries = entries.len(), "asset cache pre-warmed");
            AssetInfoCache::seeded(entries)
        }
        None => AssetInfoCache::new(),
    };

    let tables = Arc::new(tables);
    let resolver = Arc::new(TokenTreeResolver::new(
        chain.clone(),
        metadata.clone(),
        Arc::new(cache),
        tables.clone(),
    ));
    let engine = Arc::new(AttributionEngine::new(
        chain.clone(),
        tables,
        resolver.clone(),
    ));
    let pipeline = Arc::new(AggregationPipeline::new(
        chain,
        metadata,
        resolver,
        engine,
        config.max_concurrent_vaults,
    ));

    info!(rpc = %config.rpc_url, offset, size, "yieldscope starting");

    if !args.serve {
        let vaults = feed.fetch_vaults().await.context("fetching vault listing")?;
        let snapshot = pipeline.run(&vaults, offset, size).await;
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    let store = api::new_store();

    // refresh loop; the listing is re-fetched each run so new vaults
    // and strategies show up without a restart
    {
        let store = store.clone();
        let pipeline = pipeline.clone();
        let refresh = Duration::from_secs(args.refresh_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = interval(refresh);
            loop {
                ticker.tick().await;
                match feed.fetch_vaults().await {
                    Ok(vaults) => {
                        let snapshot = pipeline.run(&vaults, offset, size).await;
                        *store.write() = Some(snapshot);
                    }
                    Err(e) => {
                        // keep the previous snapshot on listing outage
                        warn!(error = %e, "vault listing fetch failed, snapshot kept");
                    }
                }
            }
        });
    }

    let app = api::router(store);
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding port {port}"))?;
    info!(port, "serving snapshots");
    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "http server exited");
    }
    Ok(())
}
