//! Disconnect grace period.
//!
//! A disconnect starts a timer for the principal; a reconnect before it fires cancels it.
//! When the timer fires, all of the principal's subscriptions are terminated.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::Principal;

/// Bulk termination target of the reconciler.
#[cfg_attr(test, mockall::automock)]
pub trait SubscriptionReaper: Send + Sync {
    /// Terminate every subscription of `principal`, returning how many there were.
    fn terminate_all_subscriptions(&self, principal: &Principal) -> usize;
}

struct PendingTimer {
    id: u64,
    cancel: CancellationToken,
}

pub struct DisconnectReconciler {
    reaper: Arc<dyn SubscriptionReaper>,
    grace: Duration,
    timers: Arc<DashMap<Principal, PendingTimer>>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
}

impl DisconnectReconciler {
    #[must_use]
    pub fn new(reaper: Arc<dyn SubscriptionReaper>, grace: Duration) -> Self {
        Self {
            reaper,
            grace,
            timers: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        }
    }

    #[must_use]
    pub const fn grace(&self) -> Duration {
        self.grace
    }

    /// A client of `principal` connected; cancel its pending timer, if any.
    pub fn on_connect(&self, principal: Option<&str>) {
        let Some(principal) = resolve(principal, "connect") else {
            return;
        };

        match self.timers.remove(&principal) {
            Some((_, timer)) => {
                timer.cancel.cancel();
                info!(principal = %principal, "Reconnected within grace period");
            }
            None => debug!(principal = %principal, "Connected"),
        }
    }

    /// The last client of `principal` disconnected; start the grace period.
    pub fn on_disconnect(&self, principal: Option<&str>) {
        let Some(principal) = resolve(principal, "disconnect") else {
            return;
        };
        if self.shutdown.is_cancelled() {
            return;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = self.shutdown.child_token();
        let previous = self.timers.insert(
            principal.clone(),
            PendingTimer {
                id,
                cancel: cancel.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }

        info!(
            principal = %principal,
            grace_secs = self.grace.as_secs(),
            "Disconnected; grace period started"
        );

        let timers = Arc::clone(&self.timers);
        let reaper = Arc::clone(&self.reaper);
        let grace = self.grace;
        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!(principal = %principal, timer = id, "Disconnect timer cancelled");
                }
                () = tokio::time::sleep(grace) => {
                    // claim the entry; a racing connect that removed it first wins
                    if timers.remove_if(&principal, |_, timer| timer.id == id).is_none() {
                        return;
                    }
                    let terminated = reaper.terminate_all_subscriptions(&principal);
                    info!(
                        principal = %principal,
                        terminated,
                        "Grace period elapsed; subscriptions terminated"
                    );
                }
            }
        });
    }

    #[must_use]
    pub fn has_pending_timer(&self, principal: &str) -> bool {
        self.timers.contains_key(principal)
    }

    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Cancel every pending timer without terminating anything.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.timers.clear();
    }
}

fn resolve(principal: Option<&str>, signal: &str) -> Option<Principal> {
    match principal.map(Principal::new) {
        Some(Ok(principal)) => Some(principal),
        Some(Err(e)) => {
            warn!(signal, error = %e, "Ignoring lifecycle signal");
            None
        }
        None => {
            warn!(signal, "Ignoring lifecycle signal without principal");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    const GRACE: Duration = Duration::from_secs(300);

    fn counting_reaper(expected: &'static str) -> (Arc<MockSubscriptionReaper>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut mock = MockSubscriptionReaper::new();
        let counter = Arc::clone(&calls);
        mock.expect_terminate_all_subscriptions()
            .withf(move |p| p.as_str() == expected)
            .returning(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                1
            });
        (Arc::new(mock), calls)
    }

    async fn advance(duration: Duration) {
        tokio::time::sleep(duration).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_within_grace_keeps_subscriptions() {
        let (reaper, calls) = counting_reaper("wall-1");
        let reconciler = DisconnectReconciler::new(reaper, GRACE);

        reconciler.on_disconnect(Some("wall-1"));
        assert!(reconciler.has_pending_timer("wall-1"));

        advance(GRACE - Duration::from_secs(1)).await;
        reconciler.on_connect(Some("wall-1"));
        assert!(!reconciler.has_pending_timer("wall-1"));

        advance(GRACE * 2).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_terminates_exactly_once() {
        let (reaper, calls) = counting_reaper("wall-1");
        let reconciler = DisconnectReconciler::new(reaper, GRACE);

        reconciler.on_disconnect(Some("wall-1"));
        advance(GRACE + Duration::from_secs(1)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!reconciler.has_pending_timer("wall-1"));

        // a late connect is a no-op
        reconciler.on_connect(Some("wall-1"));
        advance(GRACE).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_disconnect_restarts_grace_period() {
        let (reaper, calls) = counting_reaper("wall-1");
        let reconciler = DisconnectReconciler::new(reaper, GRACE);

        reconciler.on_disconnect(Some("wall-1"));
        advance(GRACE / 2).await;
        reconciler.on_disconnect(Some("wall-1"));
        assert_eq!(reconciler.pending_timers(), 1);

        // first deadline passes without firing
        advance(GRACE / 2 + Duration::from_secs(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        advance(GRACE / 2).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_principal_is_ignored() {
        let mut mock = MockSubscriptionReaper::new();
        mock.expect_terminate_all_subscriptions().never();
        let reconciler = DisconnectReconciler::new(Arc::new(mock), GRACE);

        reconciler.on_disconnect(None);
        reconciler.on_disconnect(Some("  "));
        reconciler.on_connect(None);
        assert_eq!(reconciler.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_without_timer_is_noop() {
        let (reaper, calls) = counting_reaper("wall-1");
        let reconciler = DisconnectReconciler::new(reaper, GRACE);

        reconciler.on_connect(Some("wall-1"));
        advance(GRACE * 2).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_principals_have_independent_timers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut mock = MockSubscriptionReaper::new();
        let counter = Arc::clone(&calls);
        mock.expect_terminate_all_subscriptions()
            .withf(|p| p.as_str() == "b")
            .returning(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                0
            });
        let reconciler = DisconnectReconciler::new(Arc::new(mock), GRACE);

        reconciler.on_disconnect(Some("a"));
        reconciler.on_disconnect(Some("b"));
        reconciler.on_connect(Some("a"));

        advance(GRACE + Duration::from_secs(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drops_pending_timers() {
        let (reaper, calls) = counting_reaper("wall-1");
        let reconciler = DisconnectReconciler::new(reaper, GRACE);

        reconciler.on_disconnect(Some("wall-1"));
        reconciler.shutdown();
        advance(GRACE * 2).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(reconciler.pending_timers(), 0);
    }
}
