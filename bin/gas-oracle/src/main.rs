use std::{net::SocketAddr, sync::Arc, time::Duration};

use alloy_primitives::U256;
use clap::Parser;
use dotenvy::dotenv;
use metrics_exporter_prometheus::PrometheusBuilder;
use oracle_api::ApiServer;
use oracle_estimator::{
    EstimateProvider, EstimateReader, Estimator, EstimatorOptions, HybridStrategy,
    ReadinessChecker, GWEI,
};
use oracle_eth::{RpcClient, WsSubscriber};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod logging;
use logging::LogArgs;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// HTTP JSON-RPC endpoint of the Ethereum node
    #[arg(long, env = "GAS_NODE_HTTP_URL")]
    node_http_url: String,

    /// WebSocket endpoint of the Ethereum node
    #[arg(long, env = "GAS_NODE_WS_URL")]
    node_ws_url: String,

    /// Address to serve the estimate API and health probes on
    #[arg(long, env = "GAS_HTTP_ADDR", default_value = "0.0.0.0:8080")]
    http_addr: SocketAddr,

    /// Number of recent blocks to keep for historical fee data
    #[arg(long, env = "GAS_HISTORY_BLOCKS", default_value = "20")]
    history_blocks: usize,

    /// Target number of pending transactions to sample from the mempool
    #[arg(long, env = "GAS_MEMPOOL_SAMPLES", default_value = "500")]
    mempool_samples: usize,

    /// Interval in milliseconds between estimate recomputations
    #[arg(long, env = "GAS_RECALC_INTERVAL_MS", default_value = "200")]
    recalc_interval_ms: u64,

    /// Floor for priority-fee recommendations, in gwei
    #[arg(long, env = "GAS_MIN_PRIORITY_FEE_GWEI", default_value = "1")]
    min_priority_fee_gwei: u64,

    /// Ceiling for priority-fee recommendations, in gwei
    #[arg(long, env = "GAS_MAX_PRIORITY_FEE_GWEI", default_value = "500")]
    max_priority_fee_gwei: u64,

    /// Weight on historical block data versus live mempool data
    #[arg(long, env = "GAS_HISTORICAL_WEIGHT", default_value = "0.3")]
    historical_weight: f64,

    /// Weight on the previous estimate when smoothing
    #[arg(long, env = "GAS_SMOOTHING_FACTOR", default_value = "0.1")]
    smoothing_factor: f64,

    /// Enable Prometheus metrics
    #[arg(long, env = "GAS_METRICS", default_value = "true")]
    metrics: bool,

    /// Address to run the metrics server on
    #[arg(long, env = "GAS_METRICS_ADDR", default_value = "0.0.0.0:9000")]
    metrics_addr: SocketAddr,

    #[command(flatten)]
    log: LogArgs,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    args.log.init_tracing()?;

    if args.metrics {
        info!(address = %args.metrics_addr, "starting metrics server");
        PrometheusBuilder::new()
            .with_http_listener(args.metrics_addr)
            .install()?;
    }

    let strategy = HybridStrategy {
        min_priority_fee: U256::from(args.min_priority_fee_gwei) * GWEI,
        max_priority_fee: U256::from(args.max_priority_fee_gwei) * GWEI,
        historical_weight: args.historical_weight,
        smoothing_factor: args.smoothing_factor,
    };
    strategy.validate()?;

    let options = EstimatorOptions::default()
        .with_history_size(args.history_blocks)
        .with_mempool_samples(args.mempool_samples)
        .with_recalc_interval(Duration::from_millis(args.recalc_interval_ms));

    let client = Arc::new(RpcClient::new(&args.node_http_url));
    let subscriber = WsSubscriber::connect(&args.node_ws_url).await?;
    let provider = Arc::new(EstimateProvider::new());

    let estimator = Estimator::new(
        client,
        subscriber,
        Arc::clone(&provider),
        Arc::new(strategy),
        options,
    )?;

    let reader: Arc<dyn EstimateReader> = Arc::clone(&provider) as Arc<dyn EstimateReader>;
    let checker: Arc<dyn ReadinessChecker> = provider;
    let api = ApiServer::new(
        args.http_addr,
        reader,
        checker,
        Duration::from_millis(args.recalc_interval_ms),
    );

    let token = CancellationToken::new();
    let estimator_task = tokio::spawn(estimator.run(token.clone()));
    let server_task = tokio::spawn(api.listen(token.clone()));

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::select! {
        result = estimator_task => {
            match result {
                Ok(Ok(())) => info!("estimator task terminated"),
                Ok(Err(err)) => error!(error = %err, "estimator failed"),
                Err(err) => error!(error = %err, "estimator task aborted"),
            }
            token.cancel();
        }
        result = server_task => {
            match result {
                Ok(Ok(())) => info!("api server terminated"),
                Ok(Err(err)) => error!(error = %err, "api server failed"),
                Err(err) => error!(error = %err, "api server task aborted"),
            }
            token.cancel();
        }
        _ = interrupt.recv() => {
            info!("process interrupted, shutting down");
            token.cancel();
        }
        _ = terminate.recv() => {
            info!("process terminated, shutting down");
            token.cancel();
        }
    }

    Ok(())
}
