use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use alloy_primitives::U256;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::value::RawValue;
use tokio::sync::mpsc;

use crate::{Block, EthError, RpcBlock, RpcTransaction, Transaction};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Read access to chain head and historical blocks.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait BlockReader: Send + Sync {
    async fn chain_id(&self) -> Result<u64, EthError>;

    async fn latest_block(&self) -> Result<Block, EthError>;

    /// Fetches the block at `number` with its full transaction list.
    /// `None` fetches the latest block.
    async fn block_by_number(&self, number: Option<U256>) -> Result<Block, EthError>;
}

/// Read access to individual transactions.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait TransactionReader: Send + Sync {
    /// Returns `None` if the transaction is unknown to the node.
    async fn transaction_by_hash(&self, hash: &str) -> Result<Option<Transaction>, EthError>;

    /// Fetches many transactions in one batched request. Hashes the node no
    /// longer knows are absent from the result.
    async fn transactions_by_hashes(&self, hashes: &[String]) -> Result<Vec<Transaction>, EthError>;
}

/// Sampled access to the node's pending pool.
///
/// Dumping the pool is expensive on busy chains; prefer the streamed
/// pending-hash subscription on [`Subscriber`]. This remains for nodes
/// without subscription support.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait TxPoolReader: Send + Sync {
    async fn pending_transactions(&self, limit: usize) -> Result<Vec<Transaction>, EthError>;
}

/// Streamed notifications from the node.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Subscribes to new block headers. The delivered blocks carry no
    /// transaction bodies; re-fetch by number for the full block.
    async fn subscribe_new_heads(&self) -> Result<mpsc::Receiver<Block>, EthError>;

    /// Subscribes to pending-transaction hashes.
    async fn subscribe_new_pending_transactions(&self)
        -> Result<mpsc::Receiver<String>, EthError>;

    /// Tears down the connection; open subscription channels close.
    async fn close(&self);
}

/// JSON-RPC 2.0 client over HTTP.
#[derive(Debug)]
pub struct RpcClient {
    url: String,
    http: reqwest::Client,
    request_id: AtomicU64,
}

impl RpcClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .pool_idle_timeout(Duration::from_secs(90))
                .build()
                .expect("reqwest client construction cannot fail with static options"),
            request_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn call<R: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<R, EthError> {
        let request = RpcRequest { jsonrpc: "2.0", id: self.next_id(), method, params };

        let response: RpcResponse = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = response.error {
            return Err(EthError::Rpc { code: err.code, message: err.message });
        }

        // A `null` (or omitted) result deserializes as `None` above; feed it
        // back through as JSON null so `R = Option<_>` resolves to `None` and
        // anything else surfaces as an invalid response.
        match response.result {
            Some(result) => Ok(serde_json::from_str(result.get())?),
            None => Ok(serde_json::from_str("null")?),
        }
    }

    async fn batch_call(&self, requests: &[RpcRequest<'_>]) -> Result<Vec<RpcResponse>, EthError> {
        let responses: Vec<RpcResponse> = self
            .http
            .post(&self.url)
            .json(requests)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(responses)
    }

    async fn block_by_tag(&self, tag: &str) -> Result<Block, EthError> {
        let raw: Option<RpcBlock> =
            self.call("eth_getBlockByNumber", serde_json::json!([tag, true])).await?;
        let raw = raw
            .ok_or_else(|| EthError::InvalidResponse(format!("block {tag} not found")))?;
        Ok(raw.into_block())
    }
}

#[async_trait]
impl BlockReader for RpcClient {
    async fn chain_id(&self) -> Result<u64, EthError> {
        let id: alloy_primitives::U64 =
            self.call("eth_chainId", serde_json::json!([])).await?;
        Ok(id.to::<u64>())
    }

    async fn latest_block(&self) -> Result<Block, EthError> {
        self.block_by_tag("latest").await
    }

    async fn block_by_number(&self, number: Option<U256>) -> Result<Block, EthError> {
        match number {
            Some(n) => self.block_by_tag(&format!("0x{n:x}")).await,
            None => self.latest_block().await,
        }
    }
}

#[async_trait]
impl TransactionReader for RpcClient {
    async fn transaction_by_hash(&self, hash: &str) -> Result<Option<Transaction>, EthError> {
        let raw: Option<RpcTransaction> =
            self.call("eth_getTransactionByHash", serde_json::json!([hash])).await?;
        Ok(raw.map(RpcTransaction::into_transaction))
    }

    async fn transactions_by_hashes(&self, hashes: &[String]) -> Result<Vec<Transaction>, EthError> {
        if hashes.is_empty() {
            return Ok(Vec::new());
        }

        let requests: Vec<RpcRequest<'_>> = hashes
            .iter()
            .map(|hash| RpcRequest {
                jsonrpc: "2.0",
                id: self.next_id(),
                method: "eth_getTransactionByHash",
                params: serde_json::json!([hash]),
            })
            .collect();

        let responses = self.batch_call(&requests).await?;

        // Pending transactions evaporate quickly; entries that errored,
        // resolved to null, or fail to decode are simply skipped.
        let mut txs = Vec::with_capacity(responses.len());
        for response in responses {
            if response.error.is_some() {
                continue;
            }
            let Some(result) = response.result else { continue };
            match serde_json::from_str::<Option<RpcTransaction>>(result.get()) {
                Ok(Some(raw)) => txs.push(raw.into_transaction()),
                Ok(None) | Err(_) => {}
            }
        }
        Ok(txs)
    }
}

#[async_trait]
impl TxPoolReader for RpcClient {
    async fn pending_transactions(&self, limit: usize) -> Result<Vec<Transaction>, EthError> {
        // `txpool_content` returns the entire pool keyed by sender and nonce.
        #[derive(Deserialize)]
        struct TxPoolContent {
            #[serde(default)]
            pending: std::collections::HashMap<
                String,
                std::collections::HashMap<String, RpcTransaction>,
            >,
        }

        match self.call::<TxPoolContent>("txpool_content", serde_json::json!([])).await {
            Ok(content) => {
                let mut txs = Vec::with_capacity(limit);
                for (_, by_nonce) in content.pending {
                    for (_, raw) in by_nonce {
                        txs.push(raw.into_transaction());
                        if txs.len() >= limit {
                            return Ok(txs);
                        }
                    }
                }
                Ok(txs)
            }
            Err(EthError::Rpc { .. }) => {
                // Node does not expose txpool_content.
                let raw: Vec<RpcTransaction> =
                    self.call("eth_pendingTransactions", serde_json::json!([])).await?;
                Ok(raw
                    .into_iter()
                    .take(limit)
                    .map(RpcTransaction::into_transaction)
                    .collect())
            }
            Err(err) => Err(err),
        }
    }
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Box<RawValue>>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}
