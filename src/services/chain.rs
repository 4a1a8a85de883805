use crate::{
    config::Config,
    error::GasSaverError,
    services::{
        fee_history::FeeHistorySource,
        retry::RetryPolicy,
        rpc_queue::{HttpTransport, QueueConfig, RateLimitedRequestQueue, RpcTransport},
    },
};
use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One fee source (and therefore one request queue) per configured network.
#[derive(Clone, Default)]
pub struct ChainRegistry {
    sources: BTreeMap<String, Arc<FeeHistorySource>>,
}

impl ChainRegistry {
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut registry = Self::default();
        let retry = RetryPolicy::new(config.retry_attempts, config.retry_base_delay);

        for endpoint in config.networks.values() {
            let transport: Arc<dyn RpcTransport> = Arc::new(HttpTransport::new(
                &endpoint.rpc_url,
                config.api_key.as_deref(),
            )?);
            let queue = Arc::new(RateLimitedRequestQueue::new(
                transport,
                QueueConfig {
                    requests_per_second: config.requests_per_second,
                    rate_limit_pause: config.rate_limit_pause,
                    ..Default::default()
                },
            ));

            registry.insert(Arc::new(FeeHistorySource::new(
                &endpoint.name,
                queue,
                retry.clone(),
                config.fee_cache_ttl,
            )));

            tracing::info!(
                "Registered {} (chain {}) at {} req/s",
                endpoint.name,
                endpoint.chain_id,
                config.requests_per_second
            );
        }

        Ok(registry)
    }

    pub fn insert(&mut self, source: Arc<FeeHistorySource>) {
        self.sources.insert(source.network().to_lowercase(), source);
    }

    pub fn get(&self, network: &str) -> Result<Arc<FeeHistorySource>, GasSaverError> {
        self.sources
            .get(&network.to_lowercase())
            .cloned()
            .ok_or_else(|| GasSaverError::missing_network(network))
    }

    pub fn sources(&self) -> impl Iterator<Item = &Arc<FeeHistorySource>> {
        self.sources.values()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
