use std::sync::Arc;

use parking_lot::RwLock;

use crate::BlockData;

/// Fixed-capacity ring of recently observed blocks.
///
/// One writer (the ingestion loop), many readers. Writes land about once per
/// block interval, so a read-write lock gives readers a consistent snapshot
/// without lock-free machinery.
#[derive(Debug)]
pub struct BlockHistory {
    inner: RwLock<Ring>,
}

#[derive(Debug)]
struct Ring {
    blocks: Vec<Option<Arc<BlockData>>>,
    /// Next write position.
    head: usize,
    count: usize,
}

impl BlockHistory {
    /// Creates a history holding at most `capacity` blocks.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: RwLock::new(Ring {
                blocks: vec![None; capacity],
                head: 0,
                count: 0,
            }),
        }
    }

    /// Adds a block, evicting the oldest when full. O(1).
    pub fn push(&self, block: Arc<BlockData>) {
        let mut ring = self.inner.write();
        let capacity = ring.blocks.len();
        let head = ring.head;
        ring.blocks[head] = Some(block);
        ring.head = (head + 1) % capacity;
        if ring.count < capacity {
            ring.count += 1;
        }
    }

    /// The most recently pushed block, or `None` if empty.
    pub fn latest(&self) -> Option<Arc<BlockData>> {
        let ring = self.inner.read();
        if ring.count == 0 {
            return None;
        }
        let capacity = ring.blocks.len();
        let idx = (ring.head + capacity - 1) % capacity;
        ring.blocks[idx].clone()
    }

    /// A caller-owned copy of the stored blocks, newest first. O(count).
    pub fn snapshot(&self) -> Vec<Arc<BlockData>> {
        let ring = self.inner.read();
        let capacity = ring.blocks.len();
        let mut result = Vec::with_capacity(ring.count);
        for i in 0..ring.count {
            let idx = (ring.head + capacity - 1 - i) % capacity;
            if let Some(block) = &ring.blocks[idx] {
                result.push(Arc::clone(block));
            }
        }
        result
    }

    /// Number of blocks currently stored.
    pub fn len(&self) -> usize {
        self.inner.read().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum capacity.
    pub fn cap(&self) -> usize {
        self.inner.read().blocks.len()
    }

    /// Removes all stored blocks.
    pub fn clear(&self) {
        let mut ring = self.inner.write();
        ring.blocks.iter_mut().for_each(|slot| *slot = None);
        ring.head = 0;
        ring.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(number: u64) -> Arc<BlockData> {
        Arc::new(BlockData { number, ..Default::default() })
    }

    fn numbers(history: &BlockHistory) -> Vec<u64> {
        history.snapshot().iter().map(|b| b.number).collect()
    }

    #[test]
    fn push_and_snapshot_newest_first() {
        let history = BlockHistory::new(3);
        assert!(history.is_empty());
        assert!(history.latest().is_none());

        history.push(block(1));
        assert_eq!(history.len(), 1);
        assert_eq!(history.latest().unwrap().number, 1);

        history.push(block(2));
        history.push(block(3));
        assert_eq!(history.len(), 3);
        assert_eq!(history.latest().unwrap().number, 3);
        assert_eq!(numbers(&history), vec![3, 2, 1]);
    }

    #[test]
    fn push_past_capacity_evicts_oldest() {
        let history = BlockHistory::new(3);
        for n in 1..=4 {
            history.push(block(n));
        }

        assert_eq!(history.len(), 3);
        assert_eq!(history.cap(), 3);
        assert_eq!(history.latest().unwrap().number, 4);
        assert_eq!(numbers(&history), vec![4, 3, 2]);
    }

    #[test]
    fn snapshot_of_long_sequence() {
        // Pushing b1..bk into capacity c leaves [bk, ..., b(k-c+1)].
        let history = BlockHistory::new(5);
        for n in 1..=37 {
            history.push(block(n));
        }
        assert_eq!(numbers(&history), vec![37, 36, 35, 34, 33]);
    }

    #[test]
    fn clear_resets() {
        let history = BlockHistory::new(3);
        history.push(block(1));
        history.push(block(2));

        history.clear();
        assert!(history.is_empty());
        assert!(history.latest().is_none());
        assert!(history.snapshot().is_empty());

        // Reusable after clear.
        history.push(block(9));
        assert_eq!(numbers(&history), vec![9]);
    }

    #[test]
    fn capacity_one() {
        let history = BlockHistory::new(1);
        history.push(block(1));
        history.push(block(2));
        assert_eq!(history.len(), 1);
        assert_eq!(numbers(&history), vec![2]);
    }
}
