//! Background tasks owned by the service binary.

use crate::{
    models::NotificationEvent,
    services::{
        analytics::Analytics, chain::ChainRegistry, notifier::OptimizationNotifier,
        retry::RetryPolicy, stream::PendingTransactionStream,
    },
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};

/// The user's target gas price in Gwei, shared with the HTTP handlers.
pub type SharedTarget = Arc<RwLock<Option<f64>>>;

/// Keeps every network's fee snapshot warm.
pub fn spawn_fee_ticker(registry: ChainRegistry, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            for source in registry.sources() {
                let snapshot = source.refresh().await;
                if !snapshot.supports_eip1559() {
                    tracing::debug!("{} reports no EIP-1559 fees", source.network());
                }
            }
        }
    })
}

/// Runs the pending transaction stream forever, reconnecting with
/// exponential backoff. The backoff resets once a subscription has
/// delivered for longer than the first delay.
pub fn spawn_stream(stream: Arc<PendingTransactionStream>, retry: RetryPolicy) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut failures: u32 = 0;
        loop {
            let started = tokio::time::Instant::now();
            if let Err(e) = stream.run().await {
                tracing::warn!("Pending transaction stream ended: {}", e);
            }

            if started.elapsed() > retry.delay_for(0) {
                failures = 0;
            }
            let delay = retry.delay_for(failures.min(6));
            failures = failures.saturating_add(1);

            tracing::info!("Reconnecting pending transaction stream in {:?}", delay);
            sleep(delay).await;
        }
    })
}

/// Feeds every analyzed stream entry to the notifier and publishes the
/// target matches that fire.
pub fn spawn_notifier(
    stream: &PendingTransactionStream,
    notifier: Arc<OptimizationNotifier>,
    target: SharedTarget,
    analytics: Arc<Analytics>,
    notifications: broadcast::Sender<NotificationEvent>,
) -> JoinHandle<()> {
    let mut entries = stream.subscribe();

    tokio::spawn(async move {
        loop {
            let entry = match entries.recv().await {
                Ok(entry) => entry,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Notifier lagged behind the stream by {} entries", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            let Some(analysis) = entry.gas_analysis.as_ref() else {
                continue;
            };
            let suggestions = entry
                .optimization
                .as_ref()
                .map(|o| o.suggestions.as_slice())
                .unwrap_or_default();
            analytics.record(analysis, suggestions);

            let now = Utc::now();
            notifier.observe(entry.transaction.hash, analysis, suggestions, now);

            let current_target = *target.read().await;
            if let Some(event) = notifier.check_analysis(analysis, current_target, now) {
                analytics.record_notification();
                // No dashboard clients is fine.
                let _ = notifications.send(event);
            }
        }

        tracing::debug!("Notifier task stopped");
    })
}
