//! In-memory collaborators for unit tests.

use async_trait::async_trait;
use http::header::X_FRAME_OPTIONS;
use http::{HeaderMap, HeaderValue};
use parking_lot::Mutex;

use crate::models::{Destination, Hashtag, OutboundNotification, UpstreamEvent};
use crate::upstream::{
    HashtagStream, HashtagStreaming, HeaderFetcher, NotificationPublisher, UpstreamSender,
};
use crate::{Error, Result};

/// Records every published notification with its rendered destination.
#[derive(Default)]
pub struct RecordingPublisher {
    sent: Mutex<Vec<(String, OutboundNotification)>>,
}

impl RecordingPublisher {
    pub fn sent(&self) -> Vec<(String, OutboundNotification)> {
        self.sent.lock().clone()
    }
}

impl NotificationPublisher for RecordingPublisher {
    fn publish(&self, destination: &Destination, notification: &OutboundNotification) {
        self.sent
            .lock()
            .push((destination.to_string(), notification.clone()));
    }
}

/// Returns the same headers for every URL, or fails every fetch.
///
/// With `denied_outside_embed` set, any URL not ending in `/embed` answers
/// `X-Frame-Options: DENY`, like a Mastodon status page.
pub struct StaticHeaderFetcher {
    headers: Option<HeaderMap>,
    denied_outside_embed: bool,
    calls: Mutex<Vec<String>>,
}

impl StaticHeaderFetcher {
    pub fn allow_all() -> Self {
        Self::with_headers(HeaderMap::new())
    }

    pub fn with_headers(headers: HeaderMap) -> Self {
        Self {
            headers: Some(headers),
            denied_outside_embed: false,
            calls: Mutex::default(),
        }
    }

    /// Status pages forbid framing, their `/embed` pages allow it.
    pub fn embed_only() -> Self {
        Self {
            headers: Some(HeaderMap::new()),
            denied_outside_embed: true,
            calls: Mutex::default(),
        }
    }

    pub fn failing() -> Self {
        Self {
            headers: None,
            denied_outside_embed: false,
            calls: Mutex::default(),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl HeaderFetcher for StaticHeaderFetcher {
    async fn fetch_headers(&self, url: &str) -> Result<HeaderMap> {
        self.calls.lock().push(url.to_string());
        if self.denied_outside_embed && !url.ends_with("/embed") {
            let mut denied = HeaderMap::new();
            denied.insert(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
            return Ok(denied);
        }
        self.headers.clone().ok_or_else(|| Error::HeaderFetch {
            url: url.to_string(),
            reason: "connection refused".to_string(),
        })
    }
}

/// Hands out channel-backed streams and keeps the producing halves for the test to drive.
#[derive(Default)]
pub struct FakeStreaming {
    opened: Mutex<Vec<(Hashtag, UpstreamSender)>>,
}

impl FakeStreaming {
    pub fn open_count(&self) -> usize {
        self.opened.lock().len()
    }

    /// Producer of the most recently opened stream for `hashtag`.
    pub fn latest(&self, hashtag: &str) -> UpstreamSender {
        self.opened
            .lock()
            .iter()
            .rev()
            .find(|(tag, _)| tag.as_str() == hashtag)
            .map(|(_, tx)| tx.clone())
            .expect("no stream opened for hashtag")
    }

    /// Producers whose consumer has not closed the stream yet.
    pub fn live_count(&self) -> usize {
        self.opened
            .lock()
            .iter()
            .filter(|(_, tx)| !tx.is_closed())
            .count()
    }

    pub async fn emit(&self, hashtag: &str, event: UpstreamEvent) -> bool {
        let tx = self.latest(hashtag);
        tx.send(event).await
    }
}

impl HashtagStreaming for FakeStreaming {
    fn open_hashtag_stream(&self, hashtag: &Hashtag) -> HashtagStream {
        let (tx, stream) = HashtagStream::channel(16);
        self.opened.lock().push((hashtag.clone(), tx));
        stream
    }
}
