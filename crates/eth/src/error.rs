use thiserror::Error;

/// Errors surfaced by the node facade.
#[derive(Debug, Error)]
pub enum EthError {
    /// The HTTP transport failed (connection, timeout, non-2xx status).
    #[error("http transport: {0}")]
    Http(#[from] reqwest::Error),

    /// The node returned a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The response decoded but did not have the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The WebSocket transport failed.
    #[error("websocket: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),

    /// An `eth_subscribe` request was not answered in time.
    #[error("subscription setup timed out")]
    SubscribeTimeout,

    /// The subscriber has been closed.
    #[error("subscriber closed")]
    Closed,
}

impl From<serde_json::Error> for EthError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}
