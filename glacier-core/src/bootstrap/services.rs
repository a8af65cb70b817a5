//! Service initialization and dependency injection

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::{
    service::{
        DisconnectReconciler, RelayContext, RelaySettings, SubscriptionControl,
        SubscriptionRegistry,
    },
    upstream::{HashtagStreaming, HeaderFetcher, HttpHeaderFetcher, MastodonStreaming, NotificationPublisher},
    Config,
};

/// Container for all initialized services
#[derive(Clone)]
pub struct Services {
    /// Live upstream subscriptions
    pub registry: Arc<SubscriptionRegistry>,
    /// Subscribe/unsubscribe with acknowledgements
    pub control: SubscriptionControl,
    /// Disconnect grace period handling
    pub reconciler: Arc<DisconnectReconciler>,
}

impl Services {
    /// Stop all listeners and pending timers.
    pub fn shutdown(&self) {
        self.reconciler.shutdown();
        self.registry.shutdown();
    }
}

/// Initialize the core services against the real Mastodon instance.
///
/// `publisher` is the transport that delivers notifications to connected walls.
pub fn init_services(
    config: &Config,
    publisher: Arc<dyn NotificationPublisher>,
) -> anyhow::Result<Services> {
    info!(instance = %config.mastodon.instance, "Initializing services...");

    let headers: Arc<dyn HeaderFetcher> = Arc::new(
        HttpHeaderFetcher::from_config(&config.mastodon, &config.glacier)
            .context("Failed to build header fetcher")?,
    );
    let streaming: Arc<dyn HashtagStreaming> = Arc::new(MastodonStreaming::new(&config.mastodon));

    build_services(config, streaming, headers, publisher)
}

/// Wire the services around the given upstream capabilities.
pub fn build_services(
    config: &Config,
    streaming: Arc<dyn HashtagStreaming>,
    headers: Arc<dyn HeaderFetcher>,
    publisher: Arc<dyn NotificationPublisher>,
) -> anyhow::Result<Services> {
    let settings = RelaySettings::new(&config.glacier.domain, &config.mastodon.handle)
        .context("Invalid relay settings")?;
    let registry = SubscriptionRegistry::new(streaming, RelayContext::new(settings, headers, publisher));
    let reconciler = Arc::new(DisconnectReconciler::new(
        registry.clone(),
        config.glacier.disconnect_grace(),
    ));
    let control = SubscriptionControl::new(Arc::clone(&registry));

    info!(
        grace_secs = config.glacier.disconnect_grace_seconds,
        domain = %config.glacier.domain,
        "Services initialized"
    );

    Ok(Services {
        registry,
        control,
        reconciler,
    })
}
