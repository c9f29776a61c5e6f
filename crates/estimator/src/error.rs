use thiserror::Error;

/// Errors surfaced by the estimation engine.
#[derive(Debug, Error)]
pub enum EstimateError {
    /// No bundle has been computed yet. Expected at startup; never logged.
    #[error("estimator not ready")]
    NotReady,

    /// The chain-id query failed at startup. Fatal.
    #[error("fetching chain id: {0}")]
    ChainId(#[source] oracle_eth::EthError),

    /// Setting up a subscription failed at startup. Fatal.
    #[error("subscribing to {stream}: {source}")]
    Subscribe {
        stream: &'static str,
        #[source]
        source: oracle_eth::EthError,
    },

    /// A subscription stream ended while the engine was running. Fatal to the
    /// ingestion loop; the supervisor decides whether to restart.
    #[error("{0} subscription closed")]
    SubscriptionClosed(&'static str),

    /// Bootstrap could not load a single block. Fatal.
    #[error("bootstrap: {0}")]
    Bootstrap(String),

    /// A 256-bit addition or multiplication exceeded the representable range.
    /// The recomputation is aborted and the previous bundle retained.
    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),

    /// A configuration value is outside its valid range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
