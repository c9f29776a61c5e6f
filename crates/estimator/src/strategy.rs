use std::time::SystemTime;

use alloy_primitives::U256;

use crate::{
    blend, clamp, percentile, BlockData, CalculatorInput, EstimateError, GasEstimate,
    PriorityEstimate, GWEI,
};

/// An estimation algorithm. Implementations are stateless and deterministic:
/// identical inputs produce identical bundles, except for the timestamp.
pub trait Strategy: Send + Sync {
    fn calculate(&self, input: &CalculatorInput) -> Result<GasEstimate, EstimateError>;

    /// Human-readable name, for logs and metrics.
    fn name(&self) -> &'static str;
}

/// Hybrid estimation: fuses what recent blocks actually paid (historical
/// inclusion) with what the pending pool is currently bidding (live
/// competition), anchored on an EIP-1559 prediction of the next base fee.
#[derive(Debug, Clone)]
pub struct HybridStrategy {
    /// Floor for priority-fee estimates, in wei.
    pub min_priority_fee: U256,
    /// Ceiling for priority-fee estimates, in wei.
    pub max_priority_fee: U256,
    /// Weight on historical data when both sources are available.
    /// 0.0 = mempool only, 1.0 = historical only.
    pub historical_weight: f64,
    /// Weight on the previous bundle. 0.0 disables smoothing.
    pub smoothing_factor: f64,
}

impl Default for HybridStrategy {
    fn default() -> Self {
        Self {
            min_priority_fee: GWEI,
            max_priority_fee: U256::from(500u64) * GWEI,
            historical_weight: 0.3,
            smoothing_factor: 0.1,
        }
    }
}

impl HybridStrategy {
    /// Checks the tunables are inside their valid ranges.
    pub fn validate(&self) -> Result<(), EstimateError> {
        if self.min_priority_fee.is_zero() {
            return Err(EstimateError::InvalidConfig(
                "min_priority_fee must be positive".into(),
            ));
        }
        if self.max_priority_fee < self.min_priority_fee {
            return Err(EstimateError::InvalidConfig(
                "max_priority_fee must be at least min_priority_fee".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.historical_weight) {
            return Err(EstimateError::InvalidConfig(
                "historical_weight must be within [0.0, 1.0]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.smoothing_factor) {
            return Err(EstimateError::InvalidConfig(
                "smoothing_factor must be within [0.0, 1.0]".into(),
            ));
        }
        Ok(())
    }

    /// Applies the EIP-1559 update rule to `block` to predict the next base
    /// fee: `delta = base * |gas_used - target| / target / 8` with
    /// `target = gas_limit / 2`, added or subtracted depending on which side
    /// of the target the block landed.
    fn predict_base_fee(&self, block: &BlockData) -> Result<U256, EstimateError> {
        let base = block.base_fee.unwrap_or(GWEI);
        let target = block.gas_limit / 2;

        if target == 0 || block.gas_used == target {
            return Ok(base);
        }

        let distance = if block.gas_used > target {
            block.gas_used - target
        } else {
            target - block.gas_used
        };
        let delta = base
            .checked_mul(U256::from(distance))
            .ok_or(EstimateError::Overflow("base fee prediction"))?
            / U256::from(target)
            / U256::from(8u64);

        if block.gas_used > target {
            base.checked_add(delta).ok_or(EstimateError::Overflow("base fee prediction"))
        } else {
            Ok(base.saturating_sub(delta))
        }
    }

    /// Priority-fee selection at one percentile, over pre-sorted fee vectors.
    fn tier(
        &self,
        base_fee: U256,
        historical: &[U256],
        mempool: &[U256],
        confidence: f64,
    ) -> Result<PriorityEstimate, EstimateError> {
        let priority = match (percentile(historical, confidence), percentile(mempool, confidence))
        {
            (Some(hist), Some(memp)) => blend(hist, memp, self.historical_weight)?,
            (None, Some(memp)) => memp,
            (Some(hist), None) => hist,
            (None, None) => self.default_priority_fee(confidence)?,
        };

        let priority = clamp(priority, self.min_priority_fee, self.max_priority_fee);

        let max_fee = base_fee
            .checked_mul(U256::from(2u64))
            .and_then(|doubled| doubled.checked_add(priority))
            .ok_or(EstimateError::Overflow("max fee"))?;

        Ok(PriorityEstimate {
            max_priority_fee_per_gas: priority,
            max_fee_per_gas: max_fee,
            confidence,
        })
    }

    /// With no data at all, ramp between the floor and ceiling by percentile.
    fn default_priority_fee(&self, confidence: f64) -> Result<U256, EstimateError> {
        let span = self.max_priority_fee.saturating_sub(self.min_priority_fee);
        let scaled = span
            .checked_mul(U256::from((confidence * 100.0).round() as u64))
            .ok_or(EstimateError::Overflow("default priority fee"))?
            / U256::from(100u64);
        self.min_priority_fee
            .checked_add(scaled)
            .ok_or(EstimateError::Overflow("default priority fee"))
    }

    /// Exponential smoothing against the previous bundle. The predicted base
    /// fee is not smoothed; confidence comes from the fresh computation.
    fn smooth(
        &self,
        current: GasEstimate,
        previous: &GasEstimate,
    ) -> Result<GasEstimate, EstimateError> {
        let factor = self.smoothing_factor;
        Ok(GasEstimate {
            urgent: self.smooth_tier(&current.urgent, &previous.urgent, factor)?,
            fast: self.smooth_tier(&current.fast, &previous.fast, factor)?,
            standard: self.smooth_tier(&current.standard, &previous.standard, factor)?,
            slow: self.smooth_tier(&current.slow, &previous.slow, factor)?,
            ..current
        })
    }

    fn smooth_tier(
        &self,
        current: &PriorityEstimate,
        previous: &PriorityEstimate,
        factor: f64,
    ) -> Result<PriorityEstimate, EstimateError> {
        Ok(PriorityEstimate {
            max_priority_fee_per_gas: blend(
                previous.max_priority_fee_per_gas,
                current.max_priority_fee_per_gas,
                factor,
            )?,
            max_fee_per_gas: blend(previous.max_fee_per_gas, current.max_fee_per_gas, factor)?,
            confidence: current.confidence,
        })
    }
}

impl Strategy for HybridStrategy {
    fn calculate(&self, input: &CalculatorInput) -> Result<GasEstimate, EstimateError> {
        let current = input.current_block.as_deref().ok_or(EstimateError::NotReady)?;

        let predicted_base_fee = self.predict_base_fee(current)?;

        let mut historical: Vec<U256> = input
            .recent_blocks
            .iter()
            .flat_map(|block| block.priority_fees.iter().copied())
            .collect();
        historical.sort();

        let mut mempool: Vec<U256> = input
            .pending_txs
            .iter()
            .map(|tx| tx.effective_priority_fee(Some(predicted_base_fee)))
            .filter(|fee| !fee.is_zero())
            .collect();
        mempool.sort();

        let estimate = GasEstimate {
            chain_id: input.chain_id,
            block_number: current.number,
            timestamp: SystemTime::now(),
            base_fee: predicted_base_fee,
            urgent: self.tier(predicted_base_fee, &historical, &mempool, 0.99)?,
            fast: self.tier(predicted_base_fee, &historical, &mempool, 0.90)?,
            standard: self.tier(predicted_base_fee, &historical, &mempool, 0.50)?,
            slow: self.tier(predicted_base_fee, &historical, &mempool, 0.25)?,
        };

        match &input.previous {
            Some(previous) if self.smoothing_factor > 0.0 => self.smooth(estimate, previous),
            _ => Ok(estimate),
        }
    }

    fn name(&self) -> &'static str {
        "hybrid"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TxData;
    use std::sync::Arc;

    fn u(v: u64) -> U256 {
        U256::from(v)
    }

    fn make_block(
        number: u64,
        base_fee: u64,
        gas_used: u64,
        gas_limit: u64,
        priority_fees: &[u64],
    ) -> Arc<BlockData> {
        Arc::new(BlockData {
            number,
            base_fee: Some(u(base_fee)),
            gas_used,
            gas_limit,
            priority_fees: priority_fees.iter().copied().map(U256::from).collect(),
            ..Default::default()
        })
    }

    fn input_with(current: Arc<BlockData>) -> CalculatorInput {
        CalculatorInput {
            chain_id: 1,
            recent_blocks: vec![Arc::clone(&current)],
            current_block: Some(current),
            ..Default::default()
        }
    }

    fn pending(priority: u64, max_fee: u64) -> TxData {
        TxData {
            is_eip1559: true,
            max_priority_fee_per_gas: Some(u(priority)),
            max_fee_per_gas: Some(u(max_fee)),
            ..Default::default()
        }
    }

    #[test]
    fn not_ready_without_current_block() {
        let strategy = HybridStrategy::default();
        let result = strategy.calculate(&CalculatorInput::default());
        assert!(matches!(result, Err(EstimateError::NotReady)));
    }

    #[test]
    fn base_fee_unchanged_at_target_usage() {
        let strategy = HybridStrategy::default();
        let input = input_with(make_block(100, 1_000_000_000, 15_000_000, 30_000_000, &[]));

        let estimate = strategy.calculate(&input).unwrap();
        assert_eq!(estimate.base_fee, u(1_000_000_000));
        assert_eq!(estimate.block_number, 100);
    }

    #[test]
    fn base_fee_rises_after_full_block() {
        let strategy = HybridStrategy::default();
        let input = input_with(make_block(100, 1_000_000_000, 30_000_000, 30_000_000, &[]));

        // delta = 1e9 * 15e6 / 15e6 / 8 = 125_000_000.
        let estimate = strategy.calculate(&input).unwrap();
        assert_eq!(estimate.base_fee, u(1_125_000_000));
    }

    #[test]
    fn base_fee_falls_after_empty_block() {
        let strategy = HybridStrategy::default();
        let input = input_with(make_block(100, 1_000_000_000, 0, 30_000_000, &[]));

        let estimate = strategy.calculate(&input).unwrap();
        assert_eq!(estimate.base_fee, u(875_000_000));
    }

    #[test]
    fn base_fee_change_is_capped_at_an_eighth() {
        let strategy = HybridStrategy::default();
        let base = 1_000_000_000u64;

        for (gas_used, gas_limit) in [(0u64, 30_000_000u64), (30_000_000, 30_000_000), (29_999_999, 30_000_000)] {
            let block = make_block(1, base, gas_used, gas_limit, &[]);
            let predicted = strategy.predict_base_fee(&block).unwrap();
            let delta =
                predicted.abs_diff(u(base));
            assert!(delta <= u(base / 8), "delta {delta} exceeds base/8");
        }
    }

    #[test]
    fn default_ramp_when_no_data() {
        let strategy = HybridStrategy::default();
        let input = input_with(make_block(100, 1_000_000_000, 15_000_000, 30_000_000, &[]));

        let estimate = strategy.calculate(&input).unwrap();
        // 1 gwei + 499 gwei * 99 / 100 = 495.01 gwei.
        assert_eq!(estimate.urgent.max_priority_fee_per_gas, u(495_010_000_000));
        assert_eq!(estimate.urgent.confidence, 0.99);
        // max_fee = base * 2 + priority for every tier.
        for tier in [&estimate.urgent, &estimate.fast, &estimate.standard, &estimate.slow] {
            assert_eq!(
                tier.max_fee_per_gas,
                estimate.base_fee * u(2) + tier.max_priority_fee_per_gas
            );
        }
    }

    #[test]
    fn historical_only_uses_block_fees() {
        let strategy = HybridStrategy::default();
        let current = make_block(
            100,
            1_000_000_000,
            15_000_000,
            30_000_000,
            &[2_000_000_000, 3_000_000_000, 4_000_000_000, 5_000_000_000],
        );
        let input = input_with(current);

        let estimate = strategy.calculate(&input).unwrap();
        // Sorted fees [2, 3, 4, 5] gwei; standard = idx floor(3 * 0.5) = 1.
        assert_eq!(estimate.standard.max_priority_fee_per_gas, u(3_000_000_000));
        // urgent = idx floor(3 * 0.99) = 2.
        assert_eq!(estimate.urgent.max_priority_fee_per_gas, u(4_000_000_000));
    }

    #[test]
    fn mempool_only_evaluates_against_predicted_base_fee() {
        let strategy = HybridStrategy::default();
        let current = make_block(100, 1_000_000_000, 15_000_000, 30_000_000, &[]);
        let mut input = input_with(current);
        // Tips of 2, 3 and 4 gwei, caps far above the predicted base fee.
        input.pending_txs = vec![
            pending(3_000_000_000, 50_000_000_000),
            pending(2_000_000_000, 50_000_000_000),
            pending(4_000_000_000, 50_000_000_000),
        ];

        let estimate = strategy.calculate(&input).unwrap();
        // Sorted [2, 3, 4] gwei: urgent = idx floor(2 * 0.99) = 1,
        // slow = idx floor(2 * 0.25) = 0.
        assert_eq!(estimate.urgent.max_priority_fee_per_gas, u(3_000_000_000));
        assert_eq!(estimate.slow.max_priority_fee_per_gas, u(2_000_000_000));
    }

    #[test]
    fn blends_historical_and_mempool() {
        let strategy = HybridStrategy::default();
        let current =
            make_block(100, 1_000_000_000, 15_000_000, 30_000_000, &[10_000_000_000]);
        let mut input = input_with(current);
        input.pending_txs = vec![pending(20_000_000_000, 100_000_000_000)];

        let estimate = strategy.calculate(&input).unwrap();
        // hist 10 gwei at weight 0.3, mempool 20 gwei at 0.7 -> 17 gwei.
        assert_eq!(estimate.standard.max_priority_fee_per_gas, u(17_000_000_000));
    }

    #[test]
    fn clamps_to_floor_and_ceiling() {
        let strategy = HybridStrategy::default();
        // One historical fee of 1 wei: clamped up to 1 gwei.
        let current = make_block(100, 1_000_000_000, 15_000_000, 30_000_000, &[1]);
        let estimate = strategy.calculate(&input_with(current)).unwrap();
        assert_eq!(estimate.slow.max_priority_fee_per_gas, GWEI);

        // One absurd fee of 10_000 gwei: clamped down to 500 gwei.
        let current =
            make_block(100, 1_000_000_000, 15_000_000, 30_000_000, &[10_000_000_000_000]);
        let estimate = strategy.calculate(&input_with(current)).unwrap();
        assert_eq!(estimate.urgent.max_priority_fee_per_gas, u(500) * GWEI);
    }

    #[test]
    fn smoothing_blends_with_previous_bundle() {
        let strategy = HybridStrategy::default();
        let current = make_block(100, 1_000_000_000, 15_000_000, 30_000_000, &[]);
        let mut input = input_with(Arc::clone(&current));

        let first = strategy.calculate(&input).unwrap();
        input.previous = Some(Arc::new(first.clone()));

        let second = strategy.calculate(&input).unwrap();
        // Identical fresh computation, so the 10/90 blend is a fixed point.
        assert_eq!(
            second.urgent.max_priority_fee_per_gas,
            first.urgent.max_priority_fee_per_gas
        );

        // Now smooth against a very different previous bundle.
        let mut shifted = first.clone();
        shifted.urgent.max_priority_fee_per_gas = u(100_000_000_000);
        shifted.urgent.max_fee_per_gas = u(102_000_000_000);
        input.previous = Some(Arc::new(shifted));

        let smoothed = strategy.calculate(&input).unwrap();
        let expected_priority =
            blend(u(100_000_000_000), first.urgent.max_priority_fee_per_gas, 0.1).unwrap();
        let expected_max_fee =
            blend(u(102_000_000_000), first.urgent.max_fee_per_gas, 0.1).unwrap();
        assert_eq!(smoothed.urgent.max_priority_fee_per_gas, expected_priority);
        assert_eq!(smoothed.urgent.max_fee_per_gas, expected_max_fee);
        // Base fee itself is never smoothed.
        assert_eq!(smoothed.base_fee, first.base_fee);
        assert_eq!(smoothed.urgent.confidence, 0.99);
    }

    #[test]
    fn smoothing_disabled_at_zero_factor() {
        let strategy = HybridStrategy { smoothing_factor: 0.0, ..Default::default() };
        let current = make_block(100, 1_000_000_000, 15_000_000, 30_000_000, &[]);
        let mut input = input_with(current);

        let first = strategy.calculate(&input).unwrap();
        let mut shifted = first.clone();
        shifted.urgent.max_priority_fee_per_gas = u(100_000_000_000);
        input.previous = Some(Arc::new(shifted));

        let second = strategy.calculate(&input).unwrap();
        assert_eq!(
            second.urgent.max_priority_fee_per_gas,
            first.urgent.max_priority_fee_per_gas
        );
    }

    #[test]
    fn deterministic_apart_from_timestamp() {
        let strategy = HybridStrategy::default();
        let current = make_block(
            100,
            1_000_000_000,
            22_000_000,
            30_000_000,
            &[1_500_000_000, 2_500_000_000],
        );
        let mut input = input_with(current);
        input.pending_txs = vec![pending(3_000_000_000, 60_000_000_000)];

        let a = strategy.calculate(&input).unwrap();
        let b = strategy.calculate(&input).unwrap();

        assert_eq!(a.base_fee, b.base_fee);
        assert_eq!(a.urgent, b.urgent);
        assert_eq!(a.fast, b.fast);
        assert_eq!(a.standard, b.standard);
        assert_eq!(a.slow, b.slow);
        assert_eq!(a.chain_id, b.chain_id);
        assert_eq!(a.block_number, b.block_number);
    }

    #[test]
    fn overflow_aborts_the_computation() {
        let strategy = HybridStrategy::default();
        // A base fee so large that doubling it overflows.
        let current = Arc::new(BlockData {
            number: 1,
            base_fee: Some(U256::MAX),
            gas_used: 15_000_000,
            gas_limit: 30_000_000,
            ..Default::default()
        });
        let result = strategy.calculate(&input_with(current));
        assert!(matches!(result, Err(EstimateError::Overflow(_))));
    }

    #[test]
    fn missing_base_fee_defaults_to_one_gwei() {
        let strategy = HybridStrategy::default();
        let current = Arc::new(BlockData {
            number: 1,
            base_fee: None,
            gas_used: 15_000_000,
            gas_limit: 30_000_000,
            ..Default::default()
        });
        let estimate = strategy.calculate(&input_with(current)).unwrap();
        assert_eq!(estimate.base_fee, GWEI);
    }

    #[test]
    fn zero_gas_limit_leaves_base_fee_unchanged() {
        let strategy = HybridStrategy::default();
        let current = Arc::new(BlockData {
            number: 1,
            base_fee: Some(u(7)),
            gas_used: 100,
            gas_limit: 0,
            ..Default::default()
        });
        let estimate = strategy.calculate(&input_with(current)).unwrap();
        assert_eq!(estimate.base_fee, u(7));
    }

    #[test]
    fn validate_rejects_bad_config() {
        let ok = HybridStrategy::default();
        assert!(ok.validate().is_ok());

        let zero_floor = HybridStrategy { min_priority_fee: U256::ZERO, ..Default::default() };
        assert!(zero_floor.validate().is_err());

        let inverted = HybridStrategy {
            max_priority_fee: U256::from(1u64),
            ..Default::default()
        };
        assert!(inverted.validate().is_err());

        let bad_weight = HybridStrategy { historical_weight: 1.5, ..Default::default() };
        assert!(bad_weight.validate().is_err());

        let bad_smoothing = HybridStrategy { smoothing_factor: -0.1, ..Default::default() };
        assert!(bad_smoothing.validate().is_err());
    }
}
