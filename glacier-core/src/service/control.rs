use std::sync::Arc;

use tracing::{info, warn};

use super::registry::SubscriptionRegistry;
use crate::models::{SubscriptionAck, TerminationAck};

/// Request-facing surface of the registry. Every call produces an acknowledgement;
/// failures are reported in the ack, never raised.
#[derive(Clone)]
pub struct SubscriptionControl {
    registry: Arc<SubscriptionRegistry>,
}

impl SubscriptionControl {
    #[must_use]
    pub const fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self { registry }
    }

    pub fn subscribe(&self, principal: &str, hashtag: &str) -> SubscriptionAck {
        let result = self.registry.subscribe(principal, hashtag);
        let error = match result {
            Ok(()) => {
                info!(principal, hashtag, "Subscribed");
                None
            }
            Err(e) => {
                warn!(principal, hashtag, error = %e, "Subscribe rejected");
                Some(e.to_string())
            }
        };

        SubscriptionAck {
            hashtag: hashtag.to_string(),
            principal: principal.to_string(),
            subscribed: error.is_none(),
            error,
        }
    }

    pub fn unsubscribe(&self, principal: &str, hashtag: &str) -> TerminationAck {
        let error = match self.registry.terminate_subscription(principal, hashtag) {
            Ok(()) => {
                info!(principal, hashtag, "Unsubscribed");
                None
            }
            Err(e) if e.is_not_subscribed() => {
                info!(principal, hashtag, reason = %e, "Unsubscribe for a pair that is not subscribed");
                Some(e.to_string())
            }
            Err(e) => {
                warn!(principal, hashtag, error = %e, "Unsubscribe rejected");
                Some(e.to_string())
            }
        };

        TerminationAck {
            principal: principal.to_string(),
            hashtag: hashtag.to_string(),
            terminated: error.is_none(),
            error,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }
}
