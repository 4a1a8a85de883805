//! Serialized, rate-limited JSON-RPC pipeline to a chain-data provider.
//!
//! Every call a network makes goes through one [`RateLimitedRequestQueue`].
//! A single drain task per queue issues requests in FIFO order, never more
//! than the configured budget in any one-second window, and transparently
//! re-issues calls the provider rejected for rate limiting.

use crate::error::GasSaverError;
use anyhow::Context;
use async_trait::async_trait;
use ethers::providers::{Http, HttpClientError, JsonRpcClient};
use ethers::types::H256;
use futures::future::join_all;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, sleep_until, Instant};

pub const RATE_LIMIT_MESSAGE: &str = "request limit reached";
pub const RATE_LIMIT_CODE: i64 = -32007;

const BATCH_SIZE: usize = 10;

/// Whether a provider error belongs to the rate-limit class.
pub fn is_rate_limit(code: i64, message: &str) -> bool {
    code == RATE_LIMIT_CODE || message.to_lowercase().contains(RATE_LIMIT_MESSAGE)
}

#[derive(Debug, Clone, PartialEq)]
pub enum RpcFailure {
    RateLimited(String),
    Provider { code: i64, message: String },
    Transport(String),
}

impl RpcFailure {
    pub fn from_provider(code: i64, message: String) -> Self {
        if is_rate_limit(code, &message) {
            RpcFailure::RateLimited(message)
        } else {
            RpcFailure::Provider { code, message }
        }
    }
}

#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcFailure>;
}

/// JSON-RPC over HTTP, authenticated with the provider's `x-api-key` header.
pub struct HttpTransport {
    client: Http,
}

impl HttpTransport {
    pub fn new(rpc_url: &str, api_key: Option<&str>) -> anyhow::Result<Self> {
        let url = reqwest::Url::parse(rpc_url)
            .with_context(|| format!("Invalid RPC URL: {}", rpc_url))?;

        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            headers.insert("x-api-key", HeaderValue::from_str(key).context("Invalid API_KEY")?);
        }
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client: Http::new_with_client(url, client),
        })
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcFailure> {
        self.client
            .request::<Value, Value>(method, params)
            .await
            .map_err(|e| match e {
                HttpClientError::JsonRpcError(err) => RpcFailure::from_provider(err.code, err.message),
                // Non-JSON bodies, e.g. a bare 429 page from the gateway.
                HttpClientError::SerdeJson { text, .. }
                    if is_rate_limit(0, &text) || text.to_lowercase().contains("too many requests") =>
                {
                    RpcFailure::RateLimited(text)
                }
                other => RpcFailure::Transport(other.to_string()),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueState {
    Idle,
    Draining,
    Throttled,
}

impl QueueState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => QueueState::Draining,
            2 => QueueState::Throttled,
            _ => QueueState::Idle,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub requests_per_second: u32,
    pub window: Duration,
    pub rate_limit_pause: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 120,
            window: Duration::from_secs(1),
            rate_limit_pause: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub issued: u64,
    pub retried: u64,
    pub failed: u64,
    pub pending: u64,
}

#[derive(Default)]
struct QueueCounters {
    issued: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
    pending: AtomicU64,
    state: AtomicU8,
}

struct QueuedRequest {
    method: String,
    params: Value,
    reply: oneshot::Sender<Result<Value, GasSaverError>>,
    enqueued_at: Instant,
}

pub struct RateLimitedRequestQueue {
    sender: mpsc::UnboundedSender<QueuedRequest>,
    counters: Arc<QueueCounters>,
}

impl RateLimitedRequestQueue {
    /// Spawns the queue's drain task; must be called inside a tokio runtime.
    pub fn new(transport: Arc<dyn RpcTransport>, config: QueueConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let counters = Arc::new(QueueCounters::default());

        let drain = DrainLoop {
            transport,
            receiver,
            queue: VecDeque::new(),
            issued_at: VecDeque::new(),
            counters: counters.clone(),
            budget: config.requests_per_second.max(1) as usize,
            config,
        };
        tokio::spawn(drain.run());

        Self { sender, counters }
    }

    /// Queue a call and wait for its result. Rate-limit rejections are
    /// retried internally and never surface here.
    pub async fn enqueue(&self, method: &str, params: Value) -> Result<Value, GasSaverError> {
        let (reply, response) = oneshot::channel();
        let request = QueuedRequest {
            method: method.to_string(),
            params,
            reply,
            enqueued_at: Instant::now(),
        };

        self.counters.pending.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(request).is_err() {
            self.counters.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(GasSaverError::InternalError("request queue is closed".to_string()));
        }

        response
            .await
            .map_err(|_| GasSaverError::InternalError("request queue dropped the request".to_string()))?
    }

    pub fn state(&self) -> QueueState {
        QueueState::from_u8(self.counters.state.load(Ordering::SeqCst))
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            issued: self.counters.issued.load(Ordering::SeqCst),
            retried: self.counters.retried.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            pending: self.counters.pending.load(Ordering::SeqCst),
        }
    }

    pub async fn gas_price(&self) -> Result<Value, GasSaverError> {
        self.enqueue("eth_gasPrice", json!([])).await
    }

    pub async fn max_priority_fee_per_gas(&self) -> Result<Value, GasSaverError> {
        self.enqueue("eth_maxPriorityFeePerGas", json!([])).await
    }

    pub async fn block_number(&self) -> Result<Value, GasSaverError> {
        self.enqueue("eth_blockNumber", json!([])).await
    }

    /// `block` is a tag (`"latest"`) or a hex block number.
    pub async fn get_block_by_number(
        &self,
        block: &str,
        include_transactions: bool,
    ) -> Result<Value, GasSaverError> {
        self.enqueue("eth_getBlockByNumber", json!([block, include_transactions]))
            .await
    }

    pub async fn get_transaction_by_hash(&self, hash: H256) -> Result<Value, GasSaverError> {
        self.enqueue("eth_getTransactionByHash", json!([hash])).await
    }

    /// Resolve many transactions, ten at a time.
    pub async fn batch_get_transactions(
        &self,
        hashes: &[H256],
    ) -> Vec<Result<Value, GasSaverError>> {
        let mut results = Vec::with_capacity(hashes.len());
        for chunk in hashes.chunks(BATCH_SIZE) {
            let batch = chunk.iter().map(|hash| self.get_transaction_by_hash(*hash));
            results.extend(join_all(batch).await);
        }
        results
    }
}

struct DrainLoop {
    transport: Arc<dyn RpcTransport>,
    receiver: mpsc::UnboundedReceiver<QueuedRequest>,
    queue: VecDeque<QueuedRequest>,
    // Issue instants inside the current sliding window, oldest first.
    issued_at: VecDeque<Instant>,
    counters: Arc<QueueCounters>,
    budget: usize,
    config: QueueConfig,
}

impl DrainLoop {
    async fn run(mut self) {
        loop {
            if self.queue.is_empty() {
                self.set_state(QueueState::Idle);
                match self.receiver.recv().await {
                    Some(request) => self.queue.push_back(request),
                    None => break,
                }
            }
            while let Ok(request) = self.receiver.try_recv() {
                self.queue.push_back(request);
            }
            self.set_state(QueueState::Draining);

            let now = Instant::now();
            while let Some(oldest) = self.issued_at.front() {
                if now.duration_since(*oldest) >= self.config.window {
                    self.issued_at.pop_front();
                } else {
                    break;
                }
            }

            if self.issued_at.len() >= self.budget {
                if let Some(oldest) = self.issued_at.front() {
                    let resume_at = *oldest + self.config.window;
                    self.set_state(QueueState::Throttled);
                    tracing::debug!(
                        "Request budget of {}/s exhausted, {} queued, sleeping {:?}",
                        self.budget,
                        self.queue.len(),
                        resume_at.saturating_duration_since(now)
                    );
                    sleep_until(resume_at).await;
                }
                continue;
            }

            let Some(request) = self.queue.pop_front() else {
                continue;
            };
            if request.reply.is_closed() {
                self.counters.pending.fetch_sub(1, Ordering::SeqCst);
                continue;
            }

            self.issued_at.push_back(now);
            self.counters.issued.fetch_add(1, Ordering::SeqCst);

            match self.transport.call(&request.method, request.params.clone()).await {
                Ok(result) => self.resolve(request, Ok(result)),
                Err(RpcFailure::RateLimited(message)) => {
                    self.counters.retried.fetch_add(1, Ordering::SeqCst);
                    tracing::warn!(
                        "Provider rate limited {} (queued {:?} ago): {}, retrying",
                        request.method,
                        request.enqueued_at.elapsed(),
                        message
                    );
                    self.queue.push_front(request);
                    sleep(self.config.rate_limit_pause).await;
                }
                Err(RpcFailure::Provider { code, message }) => {
                    self.counters.failed.fetch_add(1, Ordering::SeqCst);
                    self.resolve(request, Err(GasSaverError::Rpc { code, message }));
                }
                Err(RpcFailure::Transport(message)) => {
                    self.counters.failed.fetch_add(1, Ordering::SeqCst);
                    self.resolve(request, Err(GasSaverError::TransientRpc { message, attempts: 1 }));
                }
            }
        }

        tracing::debug!("Request queue closed");
    }

    fn resolve(&self, request: QueuedRequest, result: Result<Value, GasSaverError>) {
        self.counters.pending.fetch_sub(1, Ordering::SeqCst);
        // The caller may have given up waiting.
        let _ = request.reply.send(result);
    }

    fn set_state(&self, state: QueueState) {
        self.counters.state.store(state as u8, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_rate_limit_by_code_or_message() {
        assert!(is_rate_limit(-32007, "whatever"));
        assert!(is_rate_limit(-32000, "API request limit reached for this key"));
        assert!(!is_rate_limit(-32000, "execution reverted"));
    }

    #[test]
    fn provider_failures_are_classified() {
        assert_eq!(
            RpcFailure::from_provider(-32007, "slow down".to_string()),
            RpcFailure::RateLimited("slow down".to_string())
        );
        assert_eq!(
            RpcFailure::from_provider(-32601, "method not found".to_string()),
            RpcFailure::Provider { code: -32601, message: "method not found".to_string() }
        );
    }

    #[test]
    fn state_discriminants_round_trip() {
        for state in [QueueState::Idle, QueueState::Draining, QueueState::Throttled] {
            assert_eq!(QueueState::from_u8(state as u8), state);
        }
    }
}
