use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::value::RawValue;
use tokio::{
    net::TcpStream,
    sync::{mpsc, mpsc::error::TrySendError, oneshot},
};
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{Block, EthError, RpcBlock, Subscriber};

/// New heads arrive roughly once per block; dropping one is unexpected.
const HEADS_BUFFER: usize = 16;
/// Pending hashes are a sample; overflow is dropped silently.
const PENDING_HASHES_BUFFER: usize = 128;

const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(10);

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

enum SubscriptionSink {
    Heads(mpsc::Sender<Block>),
    PendingHashes(mpsc::Sender<String>),
}

struct PendingSubscribe {
    sink: SubscriptionSink,
    waiter: oneshot::Sender<Result<String, EthError>>,
}

#[derive(Default)]
struct Shared {
    /// Active subscriptions keyed by the node-assigned subscription id.
    subs: Mutex<HashMap<String, SubscriptionSink>>,
    /// In-flight `eth_subscribe` requests keyed by request id. The read task
    /// moves the sink into `subs` when the response arrives, so no
    /// notification can slip through before the sink is registered.
    pending: Mutex<HashMap<u64, PendingSubscribe>>,
}

/// WebSocket [`Subscriber`] speaking `eth_subscribe`.
///
/// One connection carries all subscriptions. A background task reads frames
/// and routes notifications into per-subscription bounded channels; when the
/// connection ends, for any reason, every channel closes and it is up to the
/// supervisor to rebuild the subscriber.
pub struct WsSubscriber {
    writer: tokio::sync::Mutex<WsSink>,
    shared: Arc<Shared>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
}

impl WsSubscriber {
    /// Connects to the node's WebSocket endpoint and starts the read task.
    pub async fn connect(url: &str) -> Result<Self, EthError> {
        let (stream, _) = tokio_tungstenite::connect_async(url).await?;
        let (writer, reader) = stream.split();

        let shared = Arc::new(Shared::default());
        let shutdown = CancellationToken::new();
        tokio::spawn(read_loop(reader, Arc::clone(&shared), shutdown.clone()));

        info!(url, "websocket connected");

        Ok(Self {
            writer: tokio::sync::Mutex::new(writer),
            shared,
            next_id: AtomicU64::new(1),
            shutdown,
        })
    }

    async fn subscribe(&self, event: &str, sink: SubscriptionSink) -> Result<String, EthError> {
        if self.shutdown.is_cancelled() {
            return Err(EthError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().insert(id, PendingSubscribe { sink, waiter: tx });

        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "eth_subscribe",
            "params": [event],
        });

        {
            let mut writer = self.writer.lock().await;
            if let Err(err) = writer.send(Message::Text(request.to_string().into())).await {
                self.shared.pending.lock().remove(&id);
                return Err(err.into());
            }
        }

        match tokio::time::timeout(SUBSCRIBE_TIMEOUT, rx).await {
            Ok(Ok(outcome)) => {
                let sub_id = outcome?;
                debug!(event, subscription_id = %sub_id, "subscribed");
                Ok(sub_id)
            }
            // The read loop ended before answering.
            Ok(Err(_)) => Err(EthError::Closed),
            Err(_) => {
                self.shared.pending.lock().remove(&id);
                Err(EthError::SubscribeTimeout)
            }
        }
    }
}

#[async_trait]
impl Subscriber for WsSubscriber {
    async fn subscribe_new_heads(&self) -> Result<mpsc::Receiver<Block>, EthError> {
        let (tx, rx) = mpsc::channel(HEADS_BUFFER);
        self.subscribe("newHeads", SubscriptionSink::Heads(tx)).await?;
        Ok(rx)
    }

    async fn subscribe_new_pending_transactions(
        &self,
    ) -> Result<mpsc::Receiver<String>, EthError> {
        let (tx, rx) = mpsc::channel(PENDING_HASHES_BUFFER);
        self.subscribe("newPendingTransactions", SubscriptionSink::PendingHashes(tx)).await?;
        Ok(rx)
    }

    async fn close(&self) {
        self.shutdown.cancel();
        let mut writer = self.writer.lock().await;
        let _ = writer.send(Message::Close(None)).await;
    }
}

async fn read_loop(mut reader: WsSource, shared: Arc<Shared>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = reader.next() => match frame {
                None => {
                    info!("websocket stream ended");
                    break;
                }
                Some(Err(err)) => {
                    if !shutdown.is_cancelled() {
                        error!(error = %err, "websocket read failed");
                    }
                    break;
                }
                Some(Ok(Message::Text(text))) => dispatch(&text, &shared),
                Some(Ok(Message::Close(_))) => {
                    info!("received close frame");
                    break;
                }
                Some(Ok(_)) => {}
            }
        }
    }

    // Dropping the senders closes every subscription channel, which readers
    // observe as end-of-stream. In-flight subscribe calls fail.
    shared.subs.lock().clear();
    for (_, entry) in shared.pending.lock().drain() {
        let _ = entry.waiter.send(Err(EthError::Closed));
    }
}

#[derive(Deserialize)]
struct WsIncoming {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<WsSubscriptionParams>,
    #[serde(default)]
    result: Option<Box<RawValue>>,
    #[serde(default)]
    error: Option<WsErrorObject>,
}

#[derive(Deserialize)]
struct WsSubscriptionParams {
    subscription: String,
    result: Box<RawValue>,
}

#[derive(Deserialize)]
struct WsErrorObject {
    code: i64,
    message: String,
}

fn dispatch(text: &str, shared: &Shared) {
    let incoming: WsIncoming = match serde_json::from_str(text) {
        Ok(incoming) => incoming,
        Err(err) => {
            warn!(error = %err, "unparseable websocket message");
            return;
        }
    };

    if incoming.method.as_deref() == Some("eth_subscription") {
        let Some(params) = incoming.params else {
            warn!("subscription notification without params");
            return;
        };
        route_notification(&params, shared);
        return;
    }

    // Response to an eth_subscribe request.
    if let Some(id) = incoming.id {
        let Some(entry) = shared.pending.lock().remove(&id) else { return };
        let outcome = match (incoming.error, incoming.result) {
            (Some(err), _) => Err(EthError::Rpc { code: err.code, message: err.message }),
            (None, Some(result)) => {
                serde_json::from_str::<String>(result.get()).map_err(Into::into)
            }
            (None, None) => {
                Err(EthError::InvalidResponse("subscribe response missing result".into()))
            }
        };
        match outcome {
            Ok(sub_id) => {
                shared.subs.lock().insert(sub_id.clone(), entry.sink);
                let _ = entry.waiter.send(Ok(sub_id));
            }
            Err(err) => {
                let _ = entry.waiter.send(Err(err));
            }
        }
    }
}

fn route_notification(params: &WsSubscriptionParams, shared: &Shared) {
    let mut subs = shared.subs.lock();
    let Some(sink) = subs.get(&params.subscription) else { return };

    let receiver_gone = match sink {
        SubscriptionSink::Heads(tx) => match serde_json::from_str::<RpcBlock>(params.result.get())
        {
            Ok(raw) => {
                let block = raw.into_block();
                match tx.try_send(block) {
                    Ok(()) => false,
                    Err(TrySendError::Full(block)) => {
                        warn!(block = block.number, "new-heads channel full, dropping header");
                        false
                    }
                    Err(TrySendError::Closed(_)) => true,
                }
            }
            Err(err) => {
                warn!(error = %err, "unparseable block header notification");
                false
            }
        },
        SubscriptionSink::PendingHashes(tx) => {
            match serde_json::from_str::<String>(params.result.get()) {
                // The pool view is a sample; overflow is dropped.
                Ok(hash) => matches!(tx.try_send(hash), Err(TrySendError::Closed(_))),
                Err(err) => {
                    warn!(error = %err, "unparseable pending-transaction notification");
                    false
                }
            }
        }
    };

    if receiver_gone {
        subs.remove(&params.subscription);
    }
}
