//! Mastodon WebSocket streaming client.
//!
//! One socket per hashtag subscription:
//! `wss://{instance}/api/v1/streaming?stream=hashtag&tag={tag}`.
//! Every text frame is an envelope `{"stream": [...], "event": "...", "payload": "..."}` and is
//! forwarded as an [`UpstreamEvent::GenericMessage`]; interpreting the payload is left to the
//! relay.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue, Request};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

use super::{HashtagStream, HashtagStreaming, UpstreamSender};
use crate::config::MastodonConfig;
use crate::models::{GenericMessage, Hashtag, UpstreamEvent};
use crate::{Error, Result};

const STREAMING_PATH: &str = "/api/v1/streaming";

/// Streaming capability backed by the Mastodon WebSocket API.
#[derive(Debug, Clone)]
pub struct MastodonStreaming {
    instance: String,
    access_token: String,
    buffer: usize,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl MastodonStreaming {
    #[must_use]
    pub fn new(config: &MastodonConfig) -> Self {
        Self {
            instance: config.instance.clone(),
            access_token: config.access_token.clone(),
            buffer: config.stream_buffer,
            connect_timeout: config.connect_timeout(),
            read_timeout: config.read_timeout(),
        }
    }

    fn request(&self, hashtag: &Hashtag) -> Result<Request<()>> {
        let url = streaming_url(&self.instance, hashtag)?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::UpstreamFailure(format!("Invalid streaming request: {e}")))?;

        if !self.access_token.is_empty() {
            let bearer = HeaderValue::from_str(&format!("Bearer {}", self.access_token))
                .map_err(|e| Error::Configuration(format!("Invalid access token: {e}")))?;
            request.headers_mut().insert(AUTHORIZATION, bearer);
        }
        Ok(request)
    }
}

impl HashtagStreaming for MastodonStreaming {
    fn open_hashtag_stream(&self, hashtag: &Hashtag) -> HashtagStream {
        let (tx, stream) = HashtagStream::channel(self.buffer);

        match self.request(hashtag) {
            Ok(request) => {
                tokio::spawn(pump(
                    request,
                    hashtag.clone(),
                    self.connect_timeout,
                    self.read_timeout,
                    tx,
                ));
            }
            Err(e) => {
                tokio::spawn(async move {
                    tx.send(UpstreamEvent::TechnicalFailure(e.to_string())).await;
                });
            }
        }

        stream
    }
}

/// Build the streaming URL. `instance` may be a bare host or an http(s) URL.
pub fn streaming_url(instance: &str, hashtag: &Hashtag) -> Result<Url> {
    let instance = instance.trim().trim_end_matches('/');
    let base = if let Some(rest) = instance.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = instance.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if instance.starts_with("wss://") || instance.starts_with("ws://") {
        instance.to_string()
    } else {
        format!("wss://{instance}")
    };

    let mut url = Url::parse(&format!("{base}{STREAMING_PATH}"))
        .map_err(|e| Error::Configuration(format!("Invalid instance {instance}: {e}")))?;
    url.query_pairs_mut()
        .append_pair("stream", "hashtag")
        .append_pair("tag", hashtag.as_str());
    Ok(url)
}

/// Read frames until the socket ends, fails, or the consumer closes the stream.
async fn pump(
    request: Request<()>,
    hashtag: Hashtag,
    connect_timeout: Duration,
    read_timeout: Duration,
    tx: UpstreamSender,
) {
    let connected = tokio::select! {
        () = tx.closed() => {
            debug!(hashtag = %hashtag, "Stream closed before the upstream connection was established");
            return;
        }
        res = timeout(connect_timeout, connect_async(request)) => res,
    };

    let socket = match connected {
        Ok(Ok((socket, _))) => socket,
        Ok(Err(e)) => {
            tx.send(UpstreamEvent::TechnicalFailure(format!("connect failed: {e}")))
                .await;
            return;
        }
        Err(_) => {
            tx.send(UpstreamEvent::TechnicalFailure(format!(
                "connect timed out after {connect_timeout:?}"
            )))
            .await;
            return;
        }
    };

    info!(hashtag = %hashtag, "Upstream hashtag stream connected");
    if !tx.send(UpstreamEvent::TechnicalOpen).await {
        return;
    }

    let (mut sink, mut frames) = socket.split();

    loop {
        let frame = tokio::select! {
            () = tx.closed() => {
                if let Err(e) = sink.send(Message::Close(None)).await {
                    debug!(hashtag = %hashtag, error = %e, "Close frame not delivered");
                }
                debug!(hashtag = %hashtag, "Upstream stream closed by consumer");
                return;
            }
            frame = timeout(read_timeout, frames.next()) => frame,
        };

        let event = match frame {
            Err(_) => UpstreamEvent::TechnicalFailure(format!(
                "no data received within {read_timeout:?}"
            )),
            Ok(None) => UpstreamEvent::TechnicalClosed,
            Ok(Some(Err(e))) => UpstreamEvent::TechnicalFailure(e.to_string()),
            Ok(Some(Ok(Message::Text(text)))) => match GenericMessage::from_frame(text.as_str()) {
                Ok(message) => UpstreamEvent::GenericMessage(message),
                Err(e) => {
                    warn!(hashtag = %hashtag, error = %e, "Undecodable streaming frame");
                    UpstreamEvent::Unknown(format!("undecodable frame: {e}"))
                }
            },
            Ok(Some(Ok(Message::Close(_)))) => UpstreamEvent::TechnicalClosing,
            // ping/pong are answered by tungstenite itself
            Ok(Some(Ok(_))) => continue,
        };

        let terminal = matches!(
            event,
            UpstreamEvent::TechnicalClosed | UpstreamEvent::TechnicalFailure(_)
        );
        if !tx.send(event).await || terminal {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn tag(s: &str) -> Hashtag {
        Hashtag::new(s).unwrap()
    }

    #[test]
    fn test_streaming_url_from_bare_host() {
        let url = streaming_url("mastodon.social", &tag("rust")).unwrap();
        assert_eq!(
            url.as_str(),
            "wss://mastodon.social/api/v1/streaming?stream=hashtag&tag=rust"
        );
    }

    #[test]
    fn test_streaming_url_maps_http_schemes() {
        let url = streaming_url("https://social.example/", &tag("Café")).unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.host_str(), Some("social.example"));
        assert!(url.query().unwrap().contains("tag=Caf%C3%A9"));

        let local = streaming_url("http://localhost:3000", &tag("x")).unwrap();
        assert_eq!(local.scheme(), "ws");
        assert_eq!(local.port(), Some(3000));
    }

    #[tokio::test]
    async fn test_frames_become_generic_messages() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.send(Message::text(
                r#"{"stream":["hashtag","rust"],"event":"delete","payload":"42"}"#,
            ))
            .await
            .unwrap();
            ws.send(Message::text("garbage")).await.unwrap();
            // keep the socket open until the client goes away
            while let Some(Ok(_)) = ws.next().await {}
        });

        let streaming = MastodonStreaming::new(&MastodonConfig {
            instance: format!("http://{addr}"),
            ..Default::default()
        });
        let mut stream = streaming.open_hashtag_stream(&tag("rust"));

        assert_eq!(stream.next().await, Some(UpstreamEvent::TechnicalOpen));
        match stream.next().await {
            Some(UpstreamEvent::GenericMessage(msg)) => {
                assert_eq!(msg.event, "delete");
                assert_eq!(msg.payload, "42");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(stream.next().await, Some(UpstreamEvent::Unknown(_))));

        stream.close();
        drop(stream);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_instance_reports_failure() {
        // bind then drop to get a port nobody listens on
        let addr = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();

        let streaming = MastodonStreaming::new(&MastodonConfig {
            instance: format!("http://{addr}"),
            ..Default::default()
        });
        let mut stream = streaming.open_hashtag_stream(&tag("rust"));
        assert!(matches!(
            stream.next().await,
            Some(UpstreamEvent::TechnicalFailure(_))
        ));
    }
}
