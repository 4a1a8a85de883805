pub mod aggregator;
pub mod analysis;
pub mod analytics;
pub mod chain;
pub mod fee_history;
pub mod monitor;
pub mod notifier;
pub mod retry;
pub mod rpc_queue;
pub mod stream;

pub use aggregator::AggregatorClient;
pub use analysis::{FeePolicy, GasAnalysisEngine, GasAnalyzer, MarketConditions, SyntheticFeePolicy};
pub use analytics::Analytics;
pub use chain::ChainRegistry;
pub use fee_history::FeeHistorySource;
pub use monitor::SharedTarget;
pub use notifier::{NotifierPolicy, OptimizationNotifier};
pub use retry::RetryPolicy;
pub use rpc_queue::{HttpTransport, QueueConfig, RateLimitedRequestQueue, RpcTransport};
pub use stream::{
    ChainPendingSource, HashEvent, PendingTransactionSource, PendingTransactionStream, StreamBuffer,
};
