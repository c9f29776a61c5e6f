use metrics::{Counter, Gauge, Histogram};
use metrics_derive::Metrics;

/// Engine metrics, exported under the `gas_oracle` scope.
#[derive(Metrics)]
#[metrics(scope = "gas_oracle")]
pub struct EngineMetrics {
    #[metric(describe = "Blocks ingested into the history")]
    pub blocks_processed: Counter,

    #[metric(describe = "Pending transactions added to the mempool sample")]
    pub pending_txs_sampled: Counter,

    #[metric(describe = "Pending-transaction batches whose fetch failed or timed out")]
    pub pending_batch_failures: Counter,

    #[metric(describe = "Full-block fetches that failed after a header arrived")]
    pub block_fetch_failures: Counter,

    #[metric(describe = "Recomputations that produced a published bundle")]
    pub recalculations: Counter,

    #[metric(describe = "Recomputations aborted by an error")]
    pub recalculation_failures: Counter,

    #[metric(describe = "Duration of one recomputation in seconds")]
    pub recalculation_duration: Histogram,

    #[metric(describe = "Block number of the most recently ingested block")]
    pub latest_block: Gauge,
}
