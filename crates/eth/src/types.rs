use alloy_primitives::{U256, U64};
use serde::Deserialize;

/// Transaction type marker for EIP-1559 (dynamic fee) transactions.
pub const TX_TYPE_EIP1559: u8 = 2;

/// A block as observed from the node, reduced to the fields the oracle uses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    pub number: u64,
    pub hash: String,
    pub parent_hash: String,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// `None` for pre-EIP-1559 blocks.
    pub base_fee: Option<U256>,
    pub gas_used: u64,
    pub gas_limit: u64,
    /// Included transactions. Empty when the block was fetched as a header.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Ratio of gas used to gas limit, in `[0.0, 1.0]`.
    pub fn gas_utilization(&self) -> f64 {
        if self.gas_limit == 0 {
            return 0.0;
        }
        self.gas_used as f64 / self.gas_limit as f64
    }
}

/// A transaction as observed from the node, reduced to its fee fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    pub hash: String,
    /// Legacy transactions.
    pub gas_price: Option<U256>,
    /// EIP-1559 transactions.
    pub max_fee_per_gas: Option<U256>,
    /// EIP-1559 transactions.
    pub max_priority_fee_per_gas: Option<U256>,
    /// Type marker: 0 = legacy, 2 = EIP-1559.
    pub tx_type: u8,
}

impl Transaction {
    /// Returns `true` if this is an EIP-1559 (dynamic fee) transaction.
    pub fn is_eip1559(&self) -> bool {
        self.tx_type == TX_TYPE_EIP1559
    }

    /// The priority fee this transaction would actually pay against `base_fee`.
    ///
    /// EIP-1559: `min(max_priority_fee, max_fee - base_fee)`, zero when the
    /// fee cap is below the base fee. Legacy: `gas_price - base_fee`,
    /// saturating at zero. With an absent or zero base fee the declared tip
    /// (or gas price) is returned as-is.
    pub fn effective_priority_fee(&self, base_fee: Option<U256>) -> U256 {
        let base = base_fee.unwrap_or(U256::ZERO);
        if base.is_zero() {
            if self.is_eip1559() {
                if let Some(tip) = self.max_priority_fee_per_gas {
                    return tip;
                }
            }
            return self.gas_price.unwrap_or(U256::ZERO);
        }

        if self.is_eip1559() {
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

/// JSON-RPC wire representation of a block.
///
/// Quantities arrive as `0x`-prefixed hex strings; the `transactions` field
/// holds either full objects or bare hashes depending on the request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RpcBlock {
    number: U64,
    #[serde(default)]
    hash: Option<String>,
    #[serde(default)]
    parent_hash: Option<String>,
    timestamp: U64,
    #[serde(default, rename = "baseFeePerGas")]
    base_fee: Option<U256>,
    gas_used: U64,
    gas_limit: U64,
    #[serde(default)]
    transactions: RpcBlockTransactions,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RpcBlockTransactions {
    Hashes(Vec<String>),
    Full(Vec<RpcTransaction>),
}

impl Default for RpcBlockTransactions {
    fn default() -> Self {
        Self::Hashes(Vec::new())
    }
}

impl RpcBlock {
    pub(crate) fn into_block(self) -> Block {
        let transactions = match self.transactions {
            RpcBlockTransactions::Hashes(_) => Vec::new(),
            RpcBlockTransactions::Full(txs) => {
                txs.into_iter().map(RpcTransaction::into_transaction).collect()
            }
        };

        Block {
            number: self.number.to::<u64>(),
            hash: self.hash.unwrap_or_default(),
            parent_hash: self.parent_hash.unwrap_or_default(),
            timestamp: self.timestamp.to::<u64>(),
            base_fee: self.base_fee,
            gas_used: self.gas_used.to::<u64>(),
            gas_limit: self.gas_limit.to::<u64>(),
            transactions,
        }
    }
}

/// JSON-RPC wire representation of a transaction.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RpcTransaction {
    hash: String,
    #[serde(default)]
    gas_price: Option<U256>,
    #[serde(default)]
    max_fee_per_gas: Option<U256>,
    #[serde(default)]
    max_priority_fee_per_gas: Option<U256>,
    #[serde(default, rename = "type")]
    tx_type: Option<U64>,
}

impl RpcTransaction {
    pub(crate) fn into_transaction(self) -> Transaction {
        Transaction {
            hash: self.hash,
            gas_price: self.gas_price,
            max_fee_per_gas: self.max_fee_per_gas,
            max_priority_fee_per_gas: self.max_priority_fee_per_gas,
            tx_type: self.tx_type.map(|t| t.to::<u64>() as u8).unwrap_or(0),
        }
    }
}
