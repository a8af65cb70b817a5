//! Capabilities the subscription core consumes.
//!
//! ```text
//! SubscriptionRegistry ──open──► HashtagStreaming ──► HashtagStream (events + close handle)
//!          │
//!          └── EventRelay ──► HeaderFetcher (response headers of a status page)
//!                        └──► NotificationPublisher (fire-and-forget, per destination)
//! ```

pub mod headers;
pub mod mastodon;

use async_trait::async_trait;
use http::HeaderMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::models::{Destination, Hashtag, OutboundNotification, UpstreamEvent};
use crate::Result;

pub use headers::HttpHeaderFetcher;
pub use mastodon::MastodonStreaming;

/// Opens one filtered upstream stream per hashtag.
///
/// Opening never blocks on the network: connection progress and errors are reported as
/// technical events on the returned stream.
pub trait HashtagStreaming: Send + Sync {
    fn open_hashtag_stream(&self, hashtag: &Hashtag) -> HashtagStream;
}

/// Fetches the response headers of a remote page.
#[async_trait]
pub trait HeaderFetcher: Send + Sync {
    async fn fetch_headers(&self, url: &str) -> Result<HeaderMap>;
}

/// Delivers a notification to whoever listens on `destination`.
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, destination: &Destination, notification: &OutboundNotification);
}

/// Receiving half of an upstream stream plus its close handle.
///
/// Dropping the stream closes it, which tells the producer to tear down its connection.
pub struct HashtagStream {
    events: mpsc::Receiver<UpstreamEvent>,
    close: CancellationToken,
}

impl HashtagStream {
    /// Create a connected (producer, stream) pair with the given buffer size.
    #[must_use]
    pub fn channel(buffer: usize) -> (UpstreamSender, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let close = CancellationToken::new();
        (
            UpstreamSender {
                tx,
                close: close.clone(),
            },
            Self { events: rx, close },
        )
    }

    /// Next event in delivery order, `None` once the producer is gone.
    pub async fn next(&mut self) -> Option<UpstreamEvent> {
        self.events.recv().await
    }

    /// Close the handle; the producer observes this and drops its connection.
    pub fn close(&self) {
        self.close.cancel();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.close.is_cancelled()
    }
}

impl Drop for HashtagStream {
    fn drop(&mut self) {
        self.close.cancel();
    }
}

/// Producing half handed to a streaming implementation.
#[derive(Clone)]
pub struct UpstreamSender {
    tx: mpsc::Sender<UpstreamEvent>,
    close: CancellationToken,
}

impl UpstreamSender {
    /// Push an event. Returns `false` when the consumer closed the stream.
    pub async fn send(&self, event: UpstreamEvent) -> bool {
        tokio::select! {
            biased;
            () = self.close.cancelled() => false,
            sent = self.tx.send(event) => sent.is_ok(),
        }
    }

    /// Resolves once the consumer closes the stream.
    pub async fn closed(&self) {
        self.close.cancelled().await;
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.close.is_cancelled() || self.tx.is_closed()
    }
}
