//! Live pending-transaction feed reconciled against gas analysis.

use crate::{
    error::GasSaverError,
    models::{CandidateTransaction, ConnectionStatus, StreamEntry, StreamStats},
    services::{analysis::GasAnalyzer, rpc_queue::RateLimitedRequestQueue},
};
use async_trait::async_trait;
use chrono::Utc;
use ethers::providers::{Middleware, Provider, Ws};
use ethers::types::{Transaction, TxHash};
use futures::{channel::mpsc, stream::BoxStream, SinkExt, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, RwLock};

pub const STREAM_BUFFER_CAPACITY: usize = 100;
const HASH_CHANNEL_CAPACITY: usize = 1024;
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Bounded, newest-first history of stream entries.
pub struct StreamBuffer {
    entries: RwLock<VecDeque<StreamEntry>>,
    capacity: usize,
}

impl Default for StreamBuffer {
    fn default() -> Self {
        Self::new(STREAM_BUFFER_CAPACITY)
    }
}

impl StreamBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append and trim under a single write lock.
    pub async fn push(&self, entry: StreamEntry) {
        let mut entries = self.entries.write().await;
        entries.push_front(entry);
        entries.truncate(self.capacity);
    }

    /// Copy of the current contents, newest first.
    pub async fn snapshot(&self) -> Vec<StreamEntry> {
        self.entries.read().await.iter().cloned().collect()
    }

    pub async fn stats(&self) -> StreamStats {
        let entries = self.entries.read().await;
        let prices: Vec<f64> = entries
            .iter()
            .filter_map(|e| e.transaction.stated_gas_price())
            .collect();

        StreamStats {
            total_transactions: entries.len(),
            average_gas_price: if prices.is_empty() {
                None
            } else {
                Some(prices.iter().sum::<f64>() / prices.len() as f64)
            },
            optimizable_transactions: entries.iter().filter(|e| e.is_optimizable()).count(),
        }
    }
}

pub type HashEvent = Result<TxHash, GasSaverError>;

/// Where pending transaction hashes come from and how they are resolved.
#[async_trait]
pub trait PendingTransactionSource: Send + Sync {
    /// Hashes as they arrive. An `Err` item is the reason the subscription
    /// ended and is the last item of the stream.
    async fn subscribe(&self) -> Result<BoxStream<'static, HashEvent>, GasSaverError>;

    /// `Ok(None)` when the node no longer knows the transaction.
    async fn resolve(&self, hash: TxHash) -> Result<Option<CandidateTransaction>, GasSaverError>;
}

/// Pending hashes from a websocket subscription, details through the
/// network's rate-limited HTTP queue.
pub struct ChainPendingSource {
    wss_url: String,
    network: String,
    queue: Arc<RateLimitedRequestQueue>,
}

impl ChainPendingSource {
    pub fn new(wss_url: &str, network: &str, queue: Arc<RateLimitedRequestQueue>) -> Self {
        Self {
            wss_url: wss_url.to_string(),
            network: network.to_string(),
            queue,
        }
    }
}

#[async_trait]
impl PendingTransactionSource for ChainPendingSource {
    async fn subscribe(&self) -> Result<BoxStream<'static, HashEvent>, GasSaverError> {
        let ws = Ws::connect(&self.wss_url)
            .await
            .map_err(|e| GasSaverError::TransientRpc {
                message: format!("websocket connect failed: {}", e),
                attempts: 1,
            })?;
        let provider = Provider::new(ws);
        tracing::info!("Pending transaction stream connected to WebSocket");

        let (mut sender, receiver) = mpsc::channel(HASH_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let mut hashes = match provider.subscribe_pending_txs().await {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!("Failed to subscribe to pending transactions: {}", e);
                    let _ = sender
                        .send(Err(GasSaverError::TransientRpc {
                            message: format!("eth_subscribe rejected: {}", e),
                            attempts: 1,
                        }))
                        .await;
                    return;
                }
            };

            while let Some(hash) = hashes.next().await {
                // Blocks when the consumer falls behind.
                if sender.send(Ok(hash)).await.is_err() {
                    return;
                }
            }
            tracing::debug!("Pending transaction subscription ended");
            let _ = sender
                .send(Err(GasSaverError::TransientRpc {
                    message: "websocket closed by the node".to_string(),
                    attempts: 1,
                }))
                .await;
        });

        Ok(receiver.boxed())
    }

    async fn resolve(&self, hash: TxHash) -> Result<Option<CandidateTransaction>, GasSaverError> {
        let raw = self.queue.get_transaction_by_hash(hash).await?;
        let tx: Option<Transaction> = serde_json::from_value(raw)
            .map_err(|e| GasSaverError::StreamEvent(format!("malformed transaction {:?}: {}", hash, e)))?;
        Ok(tx.map(|tx| CandidateTransaction::from_pending(&tx, &self.network)))
    }
}

pub struct PendingTransactionStream {
    source: Arc<dyn PendingTransactionSource>,
    analyzer: Arc<GasAnalyzer>,
    network: String,
    buffer: Arc<StreamBuffer>,
    status: watch::Sender<ConnectionStatus>,
    events: broadcast::Sender<StreamEntry>,
}

impl PendingTransactionStream {
    pub fn new(
        source: Arc<dyn PendingTransactionSource>,
        analyzer: Arc<GasAnalyzer>,
        network: &str,
        buffer: Arc<StreamBuffer>,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Idle);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            source,
            analyzer,
            network: network.to_string(),
            buffer,
            status,
            events,
        }
    }

    pub fn buffer(&self) -> &Arc<StreamBuffer> {
        &self.buffer
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    /// Every entry appended to the buffer, in arrival order.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEntry> {
        self.events.subscribe()
    }

    /// Consume one subscription until it ends. Call again to reconnect.
    pub async fn run(&self) -> Result<(), GasSaverError> {
        let mut hashes = match self.source.subscribe().await {
            Ok(hashes) => hashes,
            Err(e) => {
                self.mark_disconnected(Some(e.to_string()));
                return Err(e);
            }
        };
        self.status.send_replace(ConnectionStatus::Connected);

        let reason = loop {
            match hashes.next().await {
                Some(Ok(hash)) => {
                    self.process(hash).await;
                }
                Some(Err(e)) => break e,
                None => {
                    break GasSaverError::StreamEvent(
                        "pending transaction subscription closed".to_string(),
                    )
                }
            }
        };

        self.mark_disconnected(Some(reason.to_string()));
        Err(reason)
    }

    /// Resolve, analyze and record a single event. Failures stay local.
    pub async fn process(&self, hash: TxHash) -> Option<StreamEntry> {
        let tx = match self.source.resolve(hash).await {
            Ok(Some(tx)) => tx,
            Ok(None) => {
                tracing::debug!("Pending transaction {:?} not found, skipping", hash);
                return None;
            }
            Err(e) => {
                tracing::warn!("Error resolving transaction {:?}: {}", hash, e);
                return None;
            }
        };

        let observed_at = Utc::now();
        let entry = match self.analyzer.analyze(&tx, &self.network).await {
            Ok(result) => StreamEntry::analyzed(result, observed_at),
            Err(e) => {
                tracing::warn!("Analysis failed for {:?}, keeping raw entry: {}", hash, e);
                StreamEntry::raw(tx, observed_at)
            }
        };

        self.buffer.push(entry.clone()).await;
        // No receivers is fine.
        let _ = self.events.send(entry.clone());
        Some(entry)
    }

    fn mark_disconnected(&self, last_error: Option<String>) {
        tracing::warn!("Pending transaction stream disconnected: {:?}", last_error);
        self.status
            .send_replace(ConnectionStatus::Disconnected { last_error });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::{Address, U256};

    fn entry(n: u64) -> StreamEntry {
        let mut tx = CandidateTransaction::transfer(Address::zero(), U256::from(n), "ethereum");
        tx.gas_price = Some(n as f64);
        StreamEntry::raw(tx, Utc::now())
    }

    #[tokio::test]
    async fn buffer_keeps_most_recent_hundred() {
        let buffer = StreamBuffer::default();
        for n in 0..250 {
            buffer.push(entry(n)).await;
        }

        let contents = buffer.snapshot().await;
        assert_eq!(contents.len(), 100);
        let values: Vec<u64> = contents.iter().map(|e| e.transaction.value.as_u64()).collect();
        let expected: Vec<u64> = (150..250).rev().collect();
        assert_eq!(values, expected);
    }

    #[tokio::test]
    async fn stats_average_stated_prices() {
        let buffer = StreamBuffer::new(10);
        assert_eq!(buffer.stats().await.average_gas_price, None);

        for n in [10, 20, 30] {
            buffer.push(entry(n)).await;
        }
        let stats = buffer.stats().await;
        assert_eq!(stats.total_transactions, 3);
        assert_eq!(stats.average_gas_price, Some(20.0));
        assert_eq!(stats.optimizable_transactions, 0);
    }
}
