use std::time::UNIX_EPOCH;

use oracle_estimator::{GasEstimate, PriorityEstimate};
use serde::Serialize;

/// JSON body of `GET /v1/gas/estimate`. Fee quantities are decimal strings
/// because they do not fit JSON numbers.
#[derive(Debug, Serialize)]
pub struct GasEstimateResponse {
    pub chain_id: u64,
    pub block_number: u64,
    /// Milliseconds since the Unix epoch, at computation time.
    pub timestamp_ms: u64,
    pub base_fee: String,
    pub estimates: EstimatesBundle,
}

#[derive(Debug, Serialize)]
pub struct EstimatesBundle {
    pub urgent: EstimateLevel,
    pub fast: EstimateLevel,
    pub standard: EstimateLevel,
    pub slow: EstimateLevel,
}

#[derive(Debug, Serialize)]
pub struct EstimateLevel {
    pub max_priority_fee_per_gas: String,
    pub max_fee_per_gas: String,
    pub confidence: f64,
}

impl From<&GasEstimate> for GasEstimateResponse {
    fn from(estimate: &GasEstimate) -> Self {
        let timestamp_ms = estimate
            .timestamp
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        Self {
            chain_id: estimate.chain_id,
            block_number: estimate.block_number,
            timestamp_ms,
            base_fee: estimate.base_fee.to_string(),
            estimates: EstimatesBundle {
                urgent: EstimateLevel::from(&estimate.urgent),
                fast: EstimateLevel::from(&estimate.fast),
                standard: EstimateLevel::from(&estimate.standard),
                slow: EstimateLevel::from(&estimate.slow),
            },
        }
    }
}

impl From<&PriorityEstimate> for EstimateLevel {
    fn from(tier: &PriorityEstimate) -> Self {
        Self {
            max_priority_fee_per_gas: tier.max_priority_fee_per_gas.to_string(),
            max_fee_per_gas: tier.max_fee_per_gas.to_string(),
            confidence: tier.confidence,
        }
    }
}

/// Compact per-block payload for the SSE stream.
#[derive(Debug, Serialize)]
pub struct StreamUpdate {
    pub block_number: u64,
    pub base_fee: String,
    pub urgent: String,
    pub fast: String,
    pub standard: String,
    pub slow: String,
}

impl From<&GasEstimate> for StreamUpdate {
    fn from(estimate: &GasEstimate) -> Self {
        Self {
            block_number: estimate.block_number,
            base_fee: estimate.base_fee.to_string(),
            urgent: estimate.urgent.max_priority_fee_per_gas.to_string(),
            fast: estimate.fast.max_priority_fee_per_gas.to_string(),
            standard: estimate.standard.max_priority_fee_per_gas.to_string(),
            slow: estimate.slow.max_priority_fee_per_gas.to_string(),
        }
    }
}
