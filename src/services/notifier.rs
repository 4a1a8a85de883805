use crate::models::{
    AnalysisResult, CurrentOptimization, GasAnalysis, NotificationEvent, Suggestion, SuggestionNotice,
};
use chrono::{DateTime, Utc};
use ethers::types::TxHash;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const RECENT_CAPACITY: usize = 5;
/// A current optimization older than this is no longer shown.
const CURRENT_OPTIMIZATION_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct NotifierPolicy {
    /// Savings below this many ETH are not worth interrupting the user for.
    pub min_savings_eth: f64,
    pub tolerance_gwei: f64,
    pub cooldown: Duration,
}

impl Default for NotifierPolicy {
    fn default() -> Self {
        Self {
            min_savings_eth: 0.001,
            tolerance_gwei: 0.5,
            cooldown: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Default)]
struct NotificationState {
    last_notified_at: Option<DateTime<Utc>>,
    recent: VecDeque<NotificationEvent>,
    suggestions: VecDeque<SuggestionNotice>,
    current: Option<CurrentOptimization>,
}

/// Decides when the live network price has reached the user's target, and
/// keeps the suggestion feed and current optimization shown to the user.
///
/// Evaluation is driven by the caller (normally once per new analysis) and
/// the clock is passed in, so the notifier owns no timers.
#[derive(Debug, Default)]
pub struct OptimizationNotifier {
    policy: NotifierPolicy,
    state: Mutex<NotificationState>,
}

impl OptimizationNotifier {
    pub fn new(policy: NotifierPolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(NotificationState::default()),
        }
    }

    /// Record what a stream entry suggests. Every entry with suggestions
    /// lands in the feed; only material savings replace the current
    /// optimization.
    pub fn observe(
        &self,
        hash: Option<TxHash>,
        analysis: &GasAnalysis,
        suggestions: &[Suggestion],
        now: DateTime<Utc>,
    ) {
        let Some(first) = suggestions.first() else {
            return;
        };

        let mut state = self.lock();
        state.suggestions.push_front(SuggestionNotice {
            transaction_hash: hash,
            message: first.message().to_string(),
            severity: first.severity(),
            savings_eth: analysis.potential_savings.map(|s| s.eth).unwrap_or(0.0),
            observed_at: now,
        });
        state.suggestions.truncate(RECENT_CAPACITY);

        if let Some(savings) = analysis.potential_savings {
            if savings.eth > self.policy.min_savings_eth {
                state.current = Some(CurrentOptimization {
                    current_gas_price: analysis.current_gas_price,
                    recommended_gas_price: analysis.current_gas_price - savings.gwei,
                    potential_savings_eth: savings.eth,
                    observed_at: now,
                });
            }
        }
    }

    pub fn check(
        &self,
        current: &AnalysisResult,
        target: Option<f64>,
        now: DateTime<Utc>,
    ) -> Option<NotificationEvent> {
        self.check_analysis(&current.gas_analysis, target, now)
    }

    /// Same decision for a bare [`GasAnalysis`], as carried by stream entries.
    pub fn check_analysis(
        &self,
        analysis: &GasAnalysis,
        target: Option<f64>,
        now: DateTime<Utc>,
    ) -> Option<NotificationEvent> {
        let target = target?;
        let savings = analysis.potential_savings?;
        if savings.eth <= self.policy.min_savings_eth {
            return None;
        }

        let current_price = analysis.current_gas_price;
        if (current_price - target).abs() > self.policy.tolerance_gwei {
            return None;
        }

        // Cooldown check and update happen under one lock.
        let mut state = self.lock();
        if let Some(last) = state.last_notified_at {
            let elapsed = now.signed_duration_since(last).to_std().unwrap_or_default();
            if elapsed < self.policy.cooldown {
                tracing::debug!("Target match suppressed, last notification {:?} ago", elapsed);
                return None;
            }
        }
        state.last_notified_at = Some(now);

        let event = NotificationEvent {
            title: "Gas Price Match Alert".to_string(),
            message: format!(
                "Current network gas price ({:.2} Gwei) matches your optimized target price ({:.2} Gwei). Consider executing your transaction now.",
                current_price, target
            ),
            current_gas_price: current_price,
            target_gas_price: target,
            recommended_gas_price: current_price - savings.gwei,
            potential_savings_eth: savings.eth,
            fired_at: now,
        };

        state.recent.push_front(event.clone());
        state.recent.truncate(RECENT_CAPACITY);

        tracing::info!(
            "Gas price {:.2} gwei within {} gwei of target {:.2}",
            current_price,
            self.policy.tolerance_gwei,
            target
        );

        Some(event)
    }

    /// Most recent notifications, newest first.
    pub fn recent(&self) -> Vec<NotificationEvent> {
        self.lock().recent.iter().cloned().collect()
    }

    /// Latest suggestions from the stream, newest first.
    pub fn suggestions(&self) -> Vec<SuggestionNotice> {
        self.lock().suggestions.iter().cloned().collect()
    }

    /// The current optimization, unless it has gone stale by `now`.
    pub fn current_optimization(&self, now: DateTime<Utc>) -> Option<CurrentOptimization> {
        let state = self.lock();
        let current = state.current.as_ref()?;
        let age = now.signed_duration_since(current.observed_at).to_std().unwrap_or_default();
        (age <= CURRENT_OPTIMIZATION_TTL).then(|| current.clone())
    }

    pub fn last_notified_at(&self) -> Option<DateTime<Utc>> {
        self.lock().last_notified_at
    }

    fn lock(&self) -> MutexGuard<'_, NotificationState> {
        // State stays consistent even if a holder panicked.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
