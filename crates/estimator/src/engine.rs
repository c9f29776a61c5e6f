use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use alloy_primitives::U256;
use oracle_eth::{Block, BlockReader, Subscriber, TransactionReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    BlockData, BlockHistory, CalculatorInput, EngineMetrics, EstimateError, EstimateProvider,
    EstimateReader, MempoolSampler, Strategy, GWEI,
};

/// Pending hashes are fetched in batches of up to this many entries.
const PENDING_BATCH_SIZE: usize = 100;
/// A partial batch is flushed after this long.
const PENDING_BATCH_TIMEOUT: Duration = Duration::from_millis(50);
/// Deadline for the batched pending-transaction fetch.
const PENDING_FETCH_TIMEOUT: Duration = Duration::from_secs(2);

/// Tuning knobs for the ingestion loop.
#[derive(Debug, Clone)]
pub struct EstimatorOptions {
    /// Blocks retained in the history. Valid range 1..=1000.
    pub history_size: usize,
    /// Target mempool view size; the sampler holds twice this many records.
    /// Valid range 0..=10_000.
    pub mempool_samples: usize,
    /// Period of the recomputation ticker. At least 10 ms.
    pub recalc_interval: Duration,
}

impl Default for EstimatorOptions {
    fn default() -> Self {
        Self {
            history_size: 20,
            mempool_samples: 500,
            recalc_interval: Duration::from_millis(200),
        }
    }
}

impl EstimatorOptions {
    pub fn with_history_size(mut self, history_size: usize) -> Self {
        self.history_size = history_size;
        self
    }

    pub fn with_mempool_samples(mut self, mempool_samples: usize) -> Self {
        self.mempool_samples = mempool_samples;
        self
    }

    pub fn with_recalc_interval(mut self, recalc_interval: Duration) -> Self {
        self.recalc_interval = recalc_interval;
        self
    }

    pub fn validate(&self) -> Result<(), EstimateError> {
        if !(1..=1000).contains(&self.history_size) {
            return Err(EstimateError::InvalidConfig(
                "history_size must be between 1 and 1000".into(),
            ));
        }
        if self.mempool_samples > 10_000 {
            return Err(EstimateError::InvalidConfig(
                "mempool_samples must be between 0 and 10000".into(),
            ));
        }
        if self.recalc_interval < Duration::from_millis(10) {
            return Err(EstimateError::InvalidConfig(
                "recalc_interval must be at least 10ms".into(),
            ));
        }
        Ok(())
    }
}

/// The ingestion loop: sole mutator of the history, the mempool sample, and
/// the publication slot.
///
/// Orchestrates bootstrap, block arrival, pending-transaction ingest, and
/// periodic recomputation. Spawned sub-tasks (full-block fetch, pending-batch
/// fetch) do their I/O and then mutate through the data structures' own
/// locks; there is no outer lock.
pub struct Estimator<C, B> {
    client: Arc<C>,
    subscriber: B,
    provider: Arc<EstimateProvider>,
    strategy: Arc<dyn Strategy>,
    options: EstimatorOptions,
}

impl<C, B> Estimator<C, B>
where
    C: BlockReader + TransactionReader + Send + Sync + 'static,
    B: Subscriber,
{
    pub fn new(
        client: Arc<C>,
        subscriber: B,
        provider: Arc<EstimateProvider>,
        strategy: Arc<dyn Strategy>,
        options: EstimatorOptions,
    ) -> Result<Self, EstimateError> {
        options.validate()?;
        Ok(Self { client, subscriber, provider, strategy, options })
    }

    /// Runs until `token` is cancelled (clean return) or a fatal error:
    /// chain-id fetch failure, a bootstrap that loads no blocks, or a closed
    /// subscription stream.
    pub async fn run(self, token: CancellationToken) -> Result<(), EstimateError> {
        let chain_id = self.client.chain_id().await.map_err(EstimateError::ChainId)?;
        info!(chain_id, "connected to chain");

        let core = Arc::new(Core {
            client: Arc::clone(&self.client),
            history: BlockHistory::new(self.options.history_size),
            pool: MempoolSampler::new(self.options.mempool_samples.saturating_mul(2)),
            provider: Arc::clone(&self.provider),
            strategy: Arc::clone(&self.strategy),
            metrics: EngineMetrics::default(),
            chain_id,
        });

        core.bootstrap(&token).await?;
        if token.is_cancelled() {
            return Ok(());
        }

        let mut heads = self
            .subscriber
            .subscribe_new_heads()
            .await
            .map_err(|source| EstimateError::Subscribe { stream: "newHeads", source })?;
        let hashes = self
            .subscriber
            .subscribe_new_pending_transactions()
            .await
            .map_err(|source| EstimateError::Subscribe {
                stream: "newPendingTransactions",
                source,
            })?;

        tokio::spawn(process_pending(Arc::clone(&core), hashes, token.clone()));

        let mut ticker = tokio::time::interval(self.options.recalc_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            strategy = core.strategy.name(),
            history_size = self.options.history_size,
            mempool_samples = self.options.mempool_samples,
            recalc_interval_ms = self.options.recalc_interval.as_millis() as u64,
            "estimator running"
        );

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("estimator stopping");
                    return Ok(());
                }
                head = heads.recv() => match head {
                    Some(header) => {
                        // Re-fetch the full block off the subscription's
                        // critical path to avoid head-of-line blocking.
                        let core = Arc::clone(&core);
                        let token = token.clone();
                        tokio::spawn(async move {
                            if token.is_cancelled() {
                                return;
                            }
                            core.handle_new_block(header).await;
                        });
                    }
                    None => return Err(EstimateError::SubscriptionClosed("newHeads")),
                },
                _ = ticker.tick() => core.recalculate(),
            }
        }
    }
}

/// State shared between the select loop and its spawned sub-tasks.
struct Core<C> {
    client: Arc<C>,
    history: BlockHistory,
    pool: MempoolSampler,
    provider: Arc<EstimateProvider>,
    strategy: Arc<dyn Strategy>,
    metrics: EngineMetrics,
    chain_id: u64,
}

impl<C> Core<C>
where
    C: BlockReader + TransactionReader + Send + Sync + 'static,
{
    /// Walks backwards from the latest block to warm up the history, then
    /// runs the initial recomputation so readiness flips as soon as any
    /// block is known. Individual fetch failures are skipped; loading
    /// nothing at all is fatal.
    async fn bootstrap(&self, token: &CancellationToken) -> Result<(), EstimateError> {
        let latest = self
            .client
            .latest_block()
            .await
            .map_err(|err| EstimateError::Bootstrap(format!("fetching latest block: {err}")))?;
        let latest_number = latest.number;
        info!(latest_block = latest_number, "bootstrapping history");
        self.ingest_block(&latest);

        for depth in 1..self.history.cap() as u64 {
            if latest_number < depth || token.is_cancelled() {
                break;
            }
            let number = latest_number - depth;
            match self.client.block_by_number(Some(U256::from(number))).await {
                Ok(block) => self.ingest_block(&block),
                Err(err) => {
                    warn!(block = number, error = %err, "failed to fetch bootstrap block");
                }
            }
        }

        if self.history.is_empty() {
            return Err(EstimateError::Bootstrap("no blocks loaded".into()));
        }

        info!(blocks_loaded = self.history.len(), "bootstrap complete");
        self.recalculate();
        Ok(())
    }

    fn ingest_block(&self, block: &Block) {
        let data = Arc::new(BlockData::from(block));
        self.metrics.latest_block.set(data.number as f64);
        self.metrics.blocks_processed.increment(1);
        self.history.push(data);
    }

    /// A header arrived: fetch the full block for its transaction list, push
    /// it, and recompute.
    async fn handle_new_block(&self, header: Block) {
        let started = Instant::now();
        let number = header.number;

        let full = match self.client.block_by_number(Some(U256::from(number))).await {
            Ok(block) => block,
            Err(err) => {
                self.metrics.block_fetch_failures.increment(1);
                warn!(block = number, error = %err, "failed to fetch full block");
                return;
            }
        };

        self.ingest_block(&full);
        self.recalculate();

        info!(
            block = number,
            base_fee_gwei = wei_to_gwei(full.base_fee.unwrap_or(U256::ZERO)),
            txs = full.transactions.len(),
            processing_ms = started.elapsed().as_millis() as u64,
            "processed new block"
        );
    }

    /// Snapshot, compute, publish. On any error the previous bundle stays
    /// published.
    fn recalculate(&self) {
        let started = Instant::now();

        let recent_blocks = self.history.snapshot();
        let Some(current_block) = recent_blocks.first().cloned() else {
            warn!("recalculation skipped: no blocks in history");
            return;
        };

        let input = CalculatorInput {
            chain_id: self.chain_id,
            current_block: Some(current_block),
            recent_blocks,
            pending_txs: self.pool.snapshot(),
            previous: self.provider.current().ok(),
        };

        match self.strategy.calculate(&input) {
            Ok(estimate) => {
                debug!(
                    block = estimate.block_number,
                    base_fee_gwei = wei_to_gwei(estimate.base_fee),
                    urgent_priority_gwei =
                        wei_to_gwei(estimate.urgent.max_priority_fee_per_gas),
                    standard_priority_gwei =
                        wei_to_gwei(estimate.standard.max_priority_fee_per_gas),
                    duration_us = started.elapsed().as_micros() as u64,
                    "estimate updated"
                );
                self.provider.update(estimate);
                self.metrics.recalculations.increment(1);
                self.metrics.recalculation_duration.record(started.elapsed().as_secs_f64());
            }
            Err(err) => {
                self.metrics.recalculation_failures.increment(1);
                error!(error = %err, "recalculation failed, keeping previous estimate");
            }
        }
    }

    /// Fetches one batch of pending transactions and samples them. Failures
    /// drop the batch; pending transactions are frequently gone before they
    /// can be fetched.
    async fn fetch_and_add(&self, hashes: &[String]) {
        let fetch = self.client.transactions_by_hashes(hashes);
        match tokio::time::timeout(PENDING_FETCH_TIMEOUT, fetch).await {
            Ok(Ok(txs)) => {
                self.metrics.pending_txs_sampled.increment(txs.len() as u64);
                for tx in &txs {
                    self.pool.add(tx);
                }
            }
            Ok(Err(err)) => {
                self.metrics.pending_batch_failures.increment(1);
                debug!(batch = hashes.len(), error = %err, "pending batch fetch failed");
            }
            Err(_) => {
                self.metrics.pending_batch_failures.increment(1);
                debug!(batch = hashes.len(), "pending batch fetch timed out");
            }
        }
    }
}

/// Accumulates pending-transaction hashes into batches of up to
/// [`PENDING_BATCH_SIZE`] entries or [`PENDING_BATCH_TIMEOUT`] of waiting,
/// whichever comes first, then fetches each batch with one RPC call.
async fn process_pending<C>(
    core: Arc<Core<C>>,
    mut hashes: mpsc::Receiver<String>,
    token: CancellationToken,
) where
    C: BlockReader + TransactionReader + Send + Sync + 'static,
{
    let mut batch: Vec<String> = Vec::with_capacity(PENDING_BATCH_SIZE);
    let mut flush = tokio::time::interval(PENDING_BATCH_TIMEOUT);
    flush.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            hash = hashes.recv() => match hash {
                Some(hash) => {
                    batch.push(hash);
                    if batch.len() >= PENDING_BATCH_SIZE {
                        core.fetch_and_add(&batch).await;
                        batch.clear();
                        flush.reset();
                    }
                }
                None => return,
            },
            _ = flush.tick() => {
                if !batch.is_empty() {
                    core.fetch_and_add(&batch).await;
                    batch.clear();
                }
            }
        }
    }
}

fn wei_to_gwei(wei: U256) -> f64 {
    u64::try_from(wei / GWEI).unwrap_or(u64::MAX) as f64
}
