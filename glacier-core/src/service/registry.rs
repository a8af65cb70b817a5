//! Subscription registry
//!
//! Owns one listener task per (principal, hashtag) pair. Each listener opens its own upstream
//! stream, drives a dedicated [`EventRelay`] and stops when its cancellation token fires.
//!
//! All mutations of a principal's subscription set happen under that principal's map entry,
//! so concurrent subscribe/terminate calls for the same pair are linearizable.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::reconciler::SubscriptionReaper;
use super::relay::{EventRelay, RelayContext, RelayOutcome};
use crate::models::{Hashtag, Principal};
use crate::upstream::{HashtagStream, HashtagStreaming};
use crate::{Error, Result};

/// A listener that fails sooner than this after starting counts as a rapid restart.
const RAPID_RESTART: Duration = Duration::from_secs(30);

/// While restarts keep failing rapidly, only every n-th one is logged at warn.
const RESTART_WARN_EVERY: u32 = 100;

/// Live subscription: the listener generation and its cancellation token.
struct SubscriptionHandle {
    generation: u64,
    cancel: CancellationToken,
    started: Instant,
    /// Rapid restarts in a row that led to this listener
    consecutive_restarts: u32,
}

pub struct SubscriptionRegistry {
    /// principal -> hashtag -> handle. Principals without subscriptions are removed.
    subscriptions: DashMap<Principal, HashMap<Hashtag, SubscriptionHandle>>,
    next_generation: AtomicU64,
    streaming: Arc<dyn HashtagStreaming>,
    relay: RelayContext,
    shutdown: CancellationToken,
    this: Weak<Self>,
}

impl SubscriptionRegistry {
    #[must_use]
    pub fn new(streaming: Arc<dyn HashtagStreaming>, relay: RelayContext) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            subscriptions: DashMap::new(),
            next_generation: AtomicU64::new(1),
            streaming,
            relay,
            shutdown: CancellationToken::new(),
            this: this.clone(),
        })
    }

    /// Subscribe `principal` to `hashtag`. Subscribing an existing pair is a no-op.
    pub fn subscribe(&self, principal: &str, hashtag: &str) -> Result<()> {
        let principal = Principal::new(principal)?;
        let hashtag = Hashtag::new(hashtag)?;

        if self.shutdown.is_cancelled() {
            return Err(Error::Internal("subscription registry is shut down".to_string()));
        }

        let mut entry = self.subscriptions.entry(principal.clone()).or_default();
        if entry.contains_key(&hashtag) {
            debug!(principal = %principal, hashtag = %hashtag, "Already subscribed");
            return Ok(());
        }

        // the handle is stored before the entry lock is released, so the listener is always
        // findable by terminate
        let handle = self.start_listener(&principal, &hashtag);
        info!(
            principal = %principal,
            hashtag = %hashtag,
            generation = handle.generation,
            "Subscription created"
        );
        entry.insert(hashtag, handle);
        Ok(())
    }

    /// Terminate one subscription and close its upstream stream.
    pub fn terminate_subscription(&self, principal: &str, hashtag: &str) -> Result<()> {
        let principal = Principal::new(principal)?;
        let hashtag = Hashtag::new(hashtag)?;

        {
            let Some(mut entry) = self.subscriptions.get_mut(&principal) else {
                return Err(Error::UnknownPrincipal(principal.to_string()));
            };
            if entry.is_empty() {
                return Err(Error::UnknownPrincipal(principal.to_string()));
            }
            let Some(handle) = entry.remove(&hashtag) else {
                return Err(Error::UnknownSubscription {
                    principal: principal.to_string(),
                    hashtag: hashtag.to_string(),
                });
            };
            handle.cancel.cancel();
        }

        self.subscriptions
            .remove_if(&principal, |_, subscriptions| subscriptions.is_empty());
        info!(principal = %principal, hashtag = %hashtag, "Subscription terminated");
        Ok(())
    }

    /// Terminate every subscription of `principal`. Returns how many were cancelled.
    pub fn terminate_all_subscriptions(&self, principal: &Principal) -> usize {
        let Some((_, subscriptions)) = self.subscriptions.remove(principal) else {
            debug!(principal = %principal, "No subscriptions to terminate");
            return 0;
        };

        for handle in subscriptions.values() {
            handle.cancel.cancel();
        }
        info!(
            principal = %principal,
            count = subscriptions.len(),
            "All subscriptions terminated"
        );
        subscriptions.len()
    }

    #[must_use]
    pub fn has_subscriptions(&self, principal: &str) -> bool {
        self.subscriptions
            .get(principal)
            .is_some_and(|subscriptions| !subscriptions.is_empty())
    }

    #[must_use]
    pub fn is_subscribed(&self, principal: &str, hashtag: &str) -> bool {
        self.subscriptions
            .get(principal)
            .is_some_and(|subscriptions| subscriptions.contains_key(hashtag))
    }

    #[must_use]
    pub fn subscription_count(&self, principal: &str) -> usize {
        self.subscriptions
            .get(principal)
            .map_or(0, |subscriptions| subscriptions.len())
    }

    /// Hashtags `principal` is subscribed to, sorted.
    #[must_use]
    pub fn hashtags(&self, principal: &str) -> Vec<Hashtag> {
        let mut hashtags: Vec<Hashtag> = self
            .subscriptions
            .get(principal)
            .map(|subscriptions| subscriptions.keys().cloned().collect())
            .unwrap_or_default();
        hashtags.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        hashtags
    }

    /// Total number of live subscriptions across all principals.
    #[must_use]
    pub fn total_subscriptions(&self) -> usize {
        self.subscriptions.iter().map(|entry| entry.len()).sum()
    }

    /// Cancel every listener and refuse new subscriptions.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let total = self.total_subscriptions();
        self.subscriptions.clear();
        info!(subscriptions = total, "Subscription registry shut down");
    }

    fn start_listener(&self, principal: &Principal, hashtag: &Hashtag) -> SubscriptionHandle {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = self.shutdown.child_token();

        let relay = EventRelay::new(
            principal.clone(),
            hashtag.clone(),
            self.relay.clone(),
            cancel.clone(),
        );
        let stream = self.streaming.open_hashtag_stream(hashtag);
        tokio::spawn(listen(
            self.this.clone(),
            stream,
            relay,
            generation,
            cancel.clone(),
        ));

        SubscriptionHandle {
            generation,
            cancel,
            started: Instant::now(),
            consecutive_restarts: 0,
        }
    }

    /// Replace the listener of `generation` with a fresh one.
    ///
    /// A no-op when the pair was terminated or already replaced in the meantime, so one
    /// failure never produces two listeners.
    fn restart(&self, principal: &Principal, hashtag: &Hashtag, generation: u64) {
        if self.shutdown.is_cancelled() {
            return;
        }

        let Some(mut entry) = self.subscriptions.get_mut(principal) else {
            debug!(principal = %principal, hashtag = %hashtag, "Subscription gone; not restarting");
            return;
        };
        let consecutive_restarts = match entry.get(hashtag) {
            Some(current) if current.generation == generation => {
                if current.started.elapsed() < RAPID_RESTART {
                    current.consecutive_restarts + 1
                } else {
                    1
                }
            }
            _ => {
                debug!(principal = %principal, hashtag = %hashtag, "Subscription replaced; not restarting");
                return;
            }
        };

        let mut handle = self.start_listener(principal, hashtag);
        handle.consecutive_restarts = consecutive_restarts;
        if consecutive_restarts == 1 || consecutive_restarts % RESTART_WARN_EVERY == 0 {
            warn!(
                principal = %principal,
                hashtag = %hashtag,
                generation = handle.generation,
                consecutive_restarts,
                "Subscription restarted"
            );
        } else {
            debug!(
                principal = %principal,
                hashtag = %hashtag,
                generation = handle.generation,
                consecutive_restarts,
                "Subscription restarted again"
            );
        }
        if let Some(previous) = entry.insert(hashtag.clone(), handle) {
            previous.cancel.cancel();
        }
    }
}

#[cfg(test)]
impl SubscriptionRegistry {
    fn consecutive_restarts(&self, principal: &str, hashtag: &str) -> Option<u32> {
        self.subscriptions
            .get(principal)
            .and_then(|subscriptions| subscriptions.get(hashtag).map(|h| h.consecutive_restarts))
    }
}

impl SubscriptionReaper for SubscriptionRegistry {
    fn terminate_all_subscriptions(&self, principal: &Principal) -> usize {
        Self::terminate_all_subscriptions(self, principal)
    }
}

/// Pump upstream events into `relay` in delivery order until cancelled.
async fn listen(
    registry: Weak<SubscriptionRegistry>,
    mut stream: HashtagStream,
    relay: EventRelay,
    generation: u64,
    cancel: CancellationToken,
) {
    debug!(
        principal = %relay.principal(),
        hashtag = %relay.hashtag(),
        generation,
        "Listener started"
    );

    let restart = loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break false,
            event = stream.next() => event,
        };

        let Some(event) = event else {
            warn!(
                principal = %relay.principal(),
                hashtag = %relay.hashtag(),
                "Upstream stream ended"
            );
            break true;
        };

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => break false,
            outcome = relay.relay(event) => outcome,
        };
        if outcome == RelayOutcome::Restart {
            break true;
        }
    };

    stream.close();
    debug!(
        principal = %relay.principal(),
        hashtag = %relay.hashtag(),
        generation,
        "Listener stopped"
    );

    if restart && !cancel.is_cancelled() {
        if let Some(registry) = registry.upgrade() {
            registry.restart(relay.principal(), relay.hashtag(), generation);
        }
    }
}
