use std::{sync::Arc, time::SystemTime};

use alloy_primitives::U256;
use oracle_eth::{Block, Transaction};

/// A point-in-time gas recommendation bundle.
///
/// Immutable after publication: readers share it by reference and may hold it
/// across publications of newer bundles.
#[derive(Debug, Clone, PartialEq)]
pub struct GasEstimate {
    pub chain_id: u64,
    /// The block the computation was anchored on.
    pub block_number: u64,
    /// Wall-clock time of the computation.
    pub timestamp: SystemTime,
    /// Predicted base fee for the next block.
    pub base_fee: U256,
    /// 99th percentile, ~1 block inclusion.
    pub urgent: PriorityEstimate,
    /// 90th percentile, ~3 blocks.
    pub fast: PriorityEstimate,
    /// 50th percentile, ~6 blocks.
    pub standard: PriorityEstimate,
    /// 25th percentile, ~12+ blocks.
    pub slow: PriorityEstimate,
}

/// A recommendation at one confidence tier.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorityEstimate {
    pub max_priority_fee_per_gas: U256,
    /// `base_fee * 2 + max_priority_fee_per_gas`; the 2x headroom covers
    /// roughly six consecutive full blocks of base-fee growth.
    pub max_fee_per_gas: U256,
    /// Probability of inclusion, in `(0.0, 1.0)`.
    pub confidence: f64,
}

/// Everything a [`crate::Strategy`] needs to compute a bundle.
#[derive(Debug, Clone, Default)]
pub struct CalculatorInput {
    pub chain_id: u64,
    pub current_block: Option<Arc<BlockData>>,
    /// Recent blocks, as snapshotted from the history.
    pub recent_blocks: Vec<Arc<BlockData>>,
    /// Sampled pending transactions, oldest first.
    pub pending_txs: Vec<TxData>,
    /// The last published bundle, for smoothing.
    pub previous: Option<Arc<GasEstimate>>,
}

/// A block reduced to what estimation needs. The priority-fee vector is
/// derived once at ingest, against the block's own base fee, so the
/// recomputation path never walks transaction lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockData {
    pub number: u64,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    pub base_fee: Option<U256>,
    pub gas_used: u64,
    pub gas_limit: u64,
    /// Non-zero effective priority fees of the included transactions.
    pub priority_fees: Vec<U256>,
}

impl BlockData {
    /// Ratio of gas used to gas limit, in `[0.0, 1.0]`.
    pub fn gas_utilization(&self) -> f64 {
        if self.gas_limit == 0 {
            return 0.0;
        }
        self.gas_used as f64 / self.gas_limit as f64
    }
}

impl From<&Block> for BlockData {
    fn from(block: &Block) -> Self {
        let priority_fees = block
            .transactions
            .iter()
            .map(|tx| tx.effective_priority_fee(block.base_fee))
            .filter(|fee| !fee.is_zero())
            .collect();

        Self {
            number: block.number,
            timestamp: block.timestamp,
            base_fee: block.base_fee,
            gas_used: block.gas_used,
            gas_limit: block.gas_limit,
            priority_fees,
        }
    }
}

/// A pending transaction reduced to its fee fields. The hash is not retained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxData {
    pub max_priority_fee_per_gas: Option<U256>,
    pub max_fee_per_gas: Option<U256>,
    /// Legacy transactions.
    pub gas_price: Option<U256>,
    pub is_eip1559: bool,
}

impl TxData {
    /// The priority fee this transaction would pay against `base_fee`.
    /// Same contract as [`Transaction::effective_priority_fee`].
    pub fn effective_priority_fee(&self, base_fee: Option<U256>) -> U256 {
        let base = base_fee.unwrap_or(U256::ZERO);
        if base.is_zero() {
            if self.is_eip1559 {
                if let Some(tip) = self.max_priority_fee_per_gas {
                    return tip;
                }
            }
            return self.gas_price.unwrap_or(U256::ZERO);
        }

        if self.is_eip1559 {
            if let (Some(max_fee), Some(tip)) =
                (self.max_fee_per_gas, self.max_priority_fee_per_gas)
            {
                if max_fee < base {
                    return U256::ZERO;
                }
                return tip.min(max_fee - base);
            }
        }

        match self.gas_price {
            Some(price) if price >= base => price - base,
            _ => U256::ZERO,
        }
    }
}

impl From<&Transaction> for TxData {
    fn from(tx: &Transaction) -> Self {
        if tx.is_eip1559() {
            Self {
                max_priority_fee_per_gas: tx.max_priority_fee_per_gas,
                max_fee_per_gas: tx.max_fee_per_gas,
                gas_price: None,
                is_eip1559: true,
            }
        } else {
            Self {
                max_priority_fee_per_gas: None,
                max_fee_per_gas: None,
                gas_price: tx.gas_price,
                is_eip1559: false,
            }
        }
    }
}
