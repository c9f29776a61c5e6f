use oracle_eth::Transaction;
use parking_lot::RwLock;

use crate::TxData;

/// Fixed-capacity ring of recently seen pending transactions.
///
/// A low-latency sample of mempool competition, filled from the streamed
/// pending-hash subscription; eviction is strictly FIFO. `add` sits on the
/// per-transaction hot path, so the lock is held only for the slot write.
#[derive(Debug)]
pub struct MempoolSampler {
    inner: RwLock<Ring>,
}

#[derive(Debug)]
struct Ring {
    txs: Vec<Option<TxData>>,
    /// Next write position.
    pos: usize,
    count: usize,
}

impl MempoolSampler {
    /// Creates a sampler holding at most `capacity` records. A capacity of
    /// zero is valid and yields an always-empty sampler.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Ring { txs: vec![None; capacity], pos: 0, count: 0 }),
        }
    }

    /// Normalises `tx` into its fee fields and inserts it, evicting the
    /// oldest record when full.
    pub fn add(&self, tx: &Transaction) {
        let data = TxData::from(tx);

        let mut ring = self.inner.write();
        let capacity = ring.txs.len();
        if capacity == 0 {
            return;
        }
        let pos = ring.pos;
        ring.txs[pos] = Some(data);
        ring.pos = (pos + 1) % capacity;
        if ring.count < capacity {
            ring.count += 1;
        }
    }

    /// A caller-owned copy of the stored records, oldest first.
    pub fn snapshot(&self) -> Vec<TxData> {
        let ring = self.inner.read();
        let capacity = ring.txs.len();
        let mut result = Vec::with_capacity(ring.count);
        for i in 0..ring.count {
            let idx = (ring.pos + capacity - ring.count + i) % capacity;
            if let Some(tx) = ring.txs[idx] {
                result.push(tx);
            }
        }
        result
    }

    /// Number of records currently stored.
    pub fn len(&self) -> usize {
        self.inner.read().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use oracle_eth::TX_TYPE_EIP1559;

    fn tx(priority: u64) -> Transaction {
        Transaction {
            tx_type: TX_TYPE_EIP1559,
            max_priority_fee_per_gas: Some(U256::from(priority)),
            max_fee_per_gas: Some(U256::from(priority * 2)),
            ..Default::default()
        }
    }

    fn priorities(pool: &MempoolSampler) -> Vec<u64> {
        pool.snapshot()
            .iter()
            .map(|t| t.max_priority_fee_per_gas.unwrap().to::<u64>())
            .collect()
    }

    #[test]
    fn snapshot_oldest_first() {
        let pool = MempoolSampler::new(3);
        pool.add(&tx(10));
        pool.add(&tx(20));
        pool.add(&tx(30));

        assert_eq!(pool.len(), 3);
        assert_eq!(priorities(&pool), vec![10, 20, 30]);
    }

    #[test]
    fn overwrites_oldest_when_full() {
        let pool = MempoolSampler::new(3);
        for priority in [10, 20, 30, 40] {
            pool.add(&tx(priority));
        }

        assert_eq!(pool.len(), 3);
        assert_eq!(priorities(&pool), vec![20, 30, 40]);
    }

    #[test]
    fn partial_fill() {
        let pool = MempoolSampler::new(8);
        pool.add(&tx(5));
        pool.add(&tx(6));
        assert_eq!(priorities(&pool), vec![5, 6]);
    }

    #[test]
    fn zero_capacity_stays_empty() {
        let pool = MempoolSampler::new(0);
        pool.add(&tx(10));
        assert!(pool.is_empty());
        assert!(pool.snapshot().is_empty());
    }

    #[test]
    fn legacy_transactions_keep_gas_price() {
        let pool = MempoolSampler::new(2);
        pool.add(&Transaction { gas_price: Some(U256::from(77u64)), ..Default::default() });

        let snap = pool.snapshot();
        assert_eq!(snap.len(), 1);
        assert!(!snap[0].is_eip1559);
        assert_eq!(snap[0].gas_price, Some(U256::from(77u64)));
    }
}
