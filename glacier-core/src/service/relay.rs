//! Per-subscription translation of upstream events into outbound notifications.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::embed_policy;
use crate::models::{
    Destination, GenericMessage, Hashtag, OutboundNotification, Principal, Status, UpstreamEvent,
};
use crate::upstream::{HeaderFetcher, NotificationPublisher};
use crate::{Error, Result};

/// Bot account handle; statuses opt in by mentioning its local part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotHandle {
    handle: String,
    local_part: String,
}

impl BotHandle {
    /// Accepts `@user@instance` or `user@instance`.
    pub fn parse(handle: &str) -> Result<Self> {
        let handle = handle.trim();
        let unprefixed = handle.strip_prefix('@').unwrap_or(handle);

        let Some((local_part, _instance)) = unprefixed.split_once('@') else {
            return Err(Error::InvalidArgument(format!(
                "handle '{handle}' must have the form @user@instance"
            )));
        };
        if local_part.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "handle '{handle}' has no local part"
            )));
        }

        Ok(Self {
            handle: handle.to_string(),
            local_part: local_part.to_string(),
        })
    }

    #[must_use]
    pub fn local_part(&self) -> &str {
        &self.local_part
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.handle
    }
}

/// Settings every relay of the process shares.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    domain: String,
    handle: BotHandle,
}

impl RelaySettings {
    pub fn new(domain: impl Into<String>, handle: &str) -> Result<Self> {
        let domain = domain.into();
        if domain.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "embedding domain must not be empty".to_string(),
            ));
        }
        Ok(Self {
            domain,
            handle: BotHandle::parse(handle)?,
        })
    }

    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    #[must_use]
    pub const fn handle(&self) -> &BotHandle {
        &self.handle
    }
}

/// Collaborators handed to each relay.
#[derive(Clone)]
pub struct RelayContext {
    pub settings: Arc<RelaySettings>,
    pub headers: Arc<dyn HeaderFetcher>,
    pub publisher: Arc<dyn NotificationPublisher>,
}

impl RelayContext {
    #[must_use]
    pub fn new(
        settings: RelaySettings,
        headers: Arc<dyn HeaderFetcher>,
        publisher: Arc<dyn NotificationPublisher>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            headers,
            publisher,
        }
    }
}

/// What the listener should do after an event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Continue,
    /// The upstream connection failed; tear down and resubscribe.
    Restart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusChange {
    Created,
    Edited,
}

/// Whether a status must mention the bot before it is relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OptIn {
    Required,
    NotRequired,
}

/// Relay bound to one (principal, hashtag) subscription.
///
/// Each listener task owns its relay; nothing in here is shared between subscriptions.
pub struct EventRelay {
    principal: Principal,
    hashtag: Hashtag,
    ctx: RelayContext,
    cancel: CancellationToken,
}

impl EventRelay {
    #[must_use]
    pub const fn new(
        principal: Principal,
        hashtag: Hashtag,
        ctx: RelayContext,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            principal,
            hashtag,
            ctx,
            cancel,
        }
    }

    #[must_use]
    pub const fn principal(&self) -> &Principal {
        &self.principal
    }

    #[must_use]
    pub const fn hashtag(&self) -> &Hashtag {
        &self.hashtag
    }

    /// Handle one event. Never fails; problems are logged and the event dropped.
    pub async fn relay(&self, event: UpstreamEvent) -> RelayOutcome {
        match event {
            UpstreamEvent::StatusCreated(status) => {
                self.relay_status(&status, StatusChange::Created, OptIn::NotRequired)
                    .await;
            }
            UpstreamEvent::StatusEdited(status) => {
                self.relay_status(&status, StatusChange::Edited, OptIn::NotRequired)
                    .await;
            }
            UpstreamEvent::StatusDeleted(id) => {
                self.publish(OutboundNotification::StatusDeleted { id });
            }
            UpstreamEvent::GenericMessage(message) => self.relay_generic(&message).await,
            UpstreamEvent::TechnicalOpen
            | UpstreamEvent::TechnicalClosing
            | UpstreamEvent::TechnicalClosed => {
                info!(
                    principal = %self.principal,
                    hashtag = %self.hashtag,
                    event = event.event_type(),
                    "Upstream connection event"
                );
            }
            UpstreamEvent::TechnicalFailure(cause) => {
                error!(
                    principal = %self.principal,
                    hashtag = %self.hashtag,
                    error = %cause,
                    "Upstream connection failed"
                );
                return RelayOutcome::Restart;
            }
            UpstreamEvent::Unknown(description) => {
                info!(
                    principal = %self.principal,
                    hashtag = %self.hashtag,
                    description = %description,
                    "Unknown event"
                );
            }
        }
        RelayOutcome::Continue
    }

    async fn relay_generic(&self, message: &GenericMessage) {
        let payload: serde_json::Value = match serde_json::from_str(&message.payload) {
            Ok(payload) => payload,
            Err(e) => {
                let err = Error::from(e);
                warn!(
                    principal = %self.principal,
                    hashtag = %self.hashtag,
                    event = %message.event,
                    error = %err,
                    error_type = err.as_label(),
                    "Dropping generic message"
                );
                return;
            }
        };

        if !message.is_hashtag_stream() {
            info!(
                principal = %self.principal,
                hashtag = %self.hashtag,
                event = %message.event,
                "Not an update event for the subscribed hashtag"
            );
            return;
        }

        match message.event.as_str() {
            "update" => {
                if let Some(status) = self.parse_status(payload) {
                    self.relay_status(&status, StatusChange::Created, OptIn::Required)
                        .await;
                }
            }
            "status.update" => {
                if let Some(status) = self.parse_status(payload) {
                    self.relay_status(&status, StatusChange::Edited, OptIn::Required)
                        .await;
                }
            }
            "delete" | "status.delete" => match deleted_id(&payload, &message.payload) {
                Some(id) => self.publish(OutboundNotification::StatusDeleted { id }),
                None => warn!(
                    principal = %self.principal,
                    hashtag = %self.hashtag,
                    payload = %message.payload,
                    "Deletion without status id"
                ),
            },
            other => info!(
                principal = %self.principal,
                hashtag = %self.hashtag,
                event = other,
                "Not an update event for the subscribed hashtag"
            ),
        }
    }

    fn parse_status(&self, payload: serde_json::Value) -> Option<Status> {
        match serde_json::from_value::<Status>(payload) {
            Ok(status) => Some(status),
            Err(e) => {
                let err = Error::from(e);
                warn!(
                    principal = %self.principal,
                    hashtag = %self.hashtag,
                    error = %err,
                    error_type = err.as_label(),
                    "Dropping status payload"
                );
                None
            }
        }
    }

    async fn relay_status(&self, status: &Status, change: StatusChange, opt_in: OptIn) {
        let Some(url) = status.embed_url() else {
            warn!(
                principal = %self.principal,
                hashtag = %self.hashtag,
                status_id = %status.id,
                "Status without URL dropped"
            );
            return;
        };

        let local_part = self.ctx.settings.handle().local_part();
        if opt_in == OptIn::Required && !status.mentions_account(local_part) {
            debug!(
                principal = %self.principal,
                hashtag = %self.hashtag,
                status_id = %status.id,
                "Status does not mention the bot account; dropped"
            );
            return;
        }

        let headers = match self.ctx.headers.fetch_headers(&url).await {
            Ok(headers) => headers,
            Err(e) => {
                // fail closed: unknown policy is treated as not embeddable
                warn!(
                    principal = %self.principal,
                    hashtag = %self.hashtag,
                    status_id = %status.id,
                    error = %e,
                    "Header fetch failed; status dropped"
                );
                return;
            }
        };

        let decision = embed_policy::evaluate(&headers, self.ctx.settings.domain());
        if !decision.embeddable {
            info!(
                principal = %self.principal,
                hashtag = %self.hashtag,
                status_id = %status.id,
                evidence = ?decision.evidence,
                "Status is not embeddable; dropped"
            );
            return;
        }

        let notification = match change {
            StatusChange::Created => OutboundNotification::StatusCreated {
                id: status.id.clone(),
                author: status.author().map(str::to_string),
                url,
            },
            StatusChange::Edited => OutboundNotification::StatusUpdated {
                id: status.id.clone(),
                url,
                edited_at: status.edited_at.clone(),
            },
        };
        self.publish(notification);
    }

    fn publish(&self, notification: OutboundNotification) {
        if self.cancel.is_cancelled() {
            debug!(
                principal = %self.principal,
                hashtag = %self.hashtag,
                "Subscription terminated; notification discarded"
            );
            return;
        }

        let destination = Destination::new(
            self.principal.clone(),
            self.hashtag.clone(),
            notification.kind(),
        );
        debug!(destination = %destination, id = notification.id(), "Publishing notification");
        self.ctx.publisher.publish(&destination, &notification);
    }
}

/// Status id of a deletion payload: a JSON string, or a bare number kept as written.
fn deleted_id(payload: &serde_json::Value, raw: &str) -> Option<String> {
    match payload {
        serde_json::Value::String(id) if !id.is_empty() => Some(id.clone()),
        serde_json::Value::Number(_) => Some(raw.trim().to_string()),
        _ => None,
    }
}
