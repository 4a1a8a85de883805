#![allow(dead_code)]

use async_trait::async_trait;
use ethers::types::{Address, TxHash, U256};
use futures::stream::{self, BoxStream, StreamExt};
use gas_saver::{
    error::GasSaverError,
    models::CandidateTransaction,
    services::{
        rpc_queue::{RpcFailure, RpcTransport},
        ChainRegistry, FeeHistorySource, GasAnalysisEngine, GasAnalyzer, HashEvent, PendingTransactionSource,
        QueueConfig, RateLimitedRequestQueue, RetryPolicy,
    },
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

type Handler = dyn Fn(&str, &Value) -> Result<Value, RpcFailure> + Send + Sync;

/// Scripted JSON-RPC endpoint that records when each call was issued.
pub struct MockTransport {
    handler: Box<Handler>,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl MockTransport {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&str, &Value) -> Result<Value, RpcFailure> + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<(String, Instant)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.calls().into_iter().map(|(method, _)| method).collect()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls().iter().filter(|(m, _)| m == method).count()
    }
}

#[async_trait]
impl RpcTransport for MockTransport {
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcFailure> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), Instant::now()));
        (self.handler)(method, &params)
    }
}

/// 30 gwei base fee, 2 gwei tip, 50 gwei network price.
pub fn healthy_chain(method: &str, _params: &Value) -> Result<Value, RpcFailure> {
    match method {
        "eth_gasPrice" => Ok(json!("0xba43b7400")),
        "eth_maxPriorityFeePerGas" => Ok(json!("0x77359400")),
        "eth_getBlockByNumber" => Ok(json!({ "number": "0x64", "baseFeePerGas": "0x6fc23ac00" })),
        "eth_blockNumber" => Ok(json!("0x64")),
        other => Err(RpcFailure::Provider {
            code: -32601,
            message: format!("method {} not found", other),
        }),
    }
}

pub fn queue(transport: Arc<MockTransport>, requests_per_second: u32) -> Arc<RateLimitedRequestQueue> {
    Arc::new(RateLimitedRequestQueue::new(
        transport,
        QueueConfig {
            requests_per_second,
            rate_limit_pause: Duration::from_millis(500),
            ..Default::default()
        },
    ))
}

pub fn analyzer_for(network: &str, transport: Arc<MockTransport>) -> Arc<GasAnalyzer> {
    let source = FeeHistorySource::new(
        network,
        queue(transport, 1_000),
        RetryPolicy::new(3, Duration::from_millis(10)),
        Duration::from_secs(60),
    );
    let mut registry = ChainRegistry::default();
    registry.insert(Arc::new(source));
    Arc::new(GasAnalyzer::new(GasAnalysisEngine::default(), registry))
}

pub fn priced_tx(hash: TxHash, gas_price: Option<f64>) -> CandidateTransaction {
    let mut tx = CandidateTransaction::transfer(Address::repeat_byte(0x42), U256::zero(), "ethereum");
    tx.hash = Some(hash);
    tx.gas_price = gas_price;
    tx.gas_limit = Some(21_000);
    tx
}

pub enum Resolution {
    Found(CandidateTransaction),
    Missing,
    Fails,
}

/// Replays a fixed list of pending hashes.
pub struct ScriptedSource {
    hashes: Vec<TxHash>,
    resolve: Box<dyn Fn(TxHash) -> Resolution + Send + Sync>,
    subscribe_fails: bool,
    /// Error the subscription ends with after replaying every hash.
    ends_with: Option<String>,
    pub subscriptions: AtomicUsize,
}

impl ScriptedSource {
    pub fn new<F>(hashes: Vec<TxHash>, resolve: F) -> Arc<Self>
    where
        F: Fn(TxHash) -> Resolution + Send + Sync + 'static,
    {
        Arc::new(Self {
            hashes,
            resolve: Box::new(resolve),
            subscribe_fails: false,
            ends_with: None,
            subscriptions: AtomicUsize::new(0),
        })
    }

    pub fn dropping_after<F>(hashes: Vec<TxHash>, error: &str, resolve: F) -> Arc<Self>
    where
        F: Fn(TxHash) -> Resolution + Send + Sync + 'static,
    {
        Arc::new(Self {
            hashes,
            resolve: Box::new(resolve),
            subscribe_fails: false,
            ends_with: Some(error.to_string()),
            subscriptions: AtomicUsize::new(0),
        })
    }

    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            hashes: Vec::new(),
            resolve: Box::new(|_| Resolution::Missing),
            subscribe_fails: true,
            ends_with: None,
            subscriptions: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl PendingTransactionSource for ScriptedSource {
    async fn subscribe(&self) -> Result<BoxStream<'static, HashEvent>, GasSaverError> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        if self.subscribe_fails {
            return Err(GasSaverError::TransientRpc {
                message: "websocket connect failed".to_string(),
                attempts: 1,
            });
        }
        let terminal = self.ends_with.clone().map(|message| {
            Err(GasSaverError::TransientRpc {
                message,
                attempts: 1,
            })
        });
        Ok(stream::iter(self.hashes.clone().into_iter().map(Ok))
            .chain(stream::iter(terminal))
            .boxed())
    }

    async fn resolve(&self, hash: TxHash) -> Result<Option<CandidateTransaction>, GasSaverError> {
        match (self.resolve)(hash) {
            Resolution::Found(tx) => Ok(Some(tx)),
            Resolution::Missing => Ok(None),
            Resolution::Fails => Err(GasSaverError::StreamEvent(format!("cannot resolve {:?}", hash))),
        }
    }
}
