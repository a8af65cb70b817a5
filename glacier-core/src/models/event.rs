use serde::Deserialize;

use super::status::Status;
use crate::Result;

/// Raw streaming envelope as sent by the upstream WebSocket API.
///
/// `payload` stays opaque here; the relay decides how to interpret it per event name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericMessage {
    pub stream: Vec<String>,
    pub event: String,
    pub payload: String,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    stream: Vec<String>,
    event: String,
    #[serde(default)]
    payload: serde_json::Value,
}

impl GenericMessage {
    /// Decode an envelope frame `{"stream": [...], "event": "...", "payload": ...}`.
    ///
    /// A string payload is kept verbatim (Mastodon double-encodes statuses); any other JSON
    /// payload is re-serialised.
    pub fn from_frame(text: &str) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(text)?;
        let payload = match envelope.payload {
            serde_json::Value::String(s) => s,
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        };
        Ok(Self {
            stream: envelope.stream,
            event: envelope.event,
            payload,
        })
    }

    /// Whether the envelope was routed through a hashtag stream.
    #[must_use]
    pub fn is_hashtag_stream(&self) -> bool {
        self.stream.iter().any(|s| s.contains("hashtag"))
    }
}

/// One event delivered by the upstream streaming capability.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    StatusCreated(Status),
    StatusEdited(Status),
    StatusDeleted(String),
    GenericMessage(GenericMessage),
    TechnicalOpen,
    TechnicalClosing,
    TechnicalClosed,
    TechnicalFailure(String),
    /// Anything the streaming client could not classify; carries a short description.
    Unknown(String),
}

impl UpstreamEvent {
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::StatusCreated(_) => "status_created",
            Self::StatusEdited(_) => "status_edited",
            Self::StatusDeleted(_) => "status_deleted",
            Self::GenericMessage(_) => "generic_message",
            Self::TechnicalOpen => "technical_open",
            Self::TechnicalClosing => "technical_closing",
            Self::TechnicalClosed => "technical_closed",
            Self::TechnicalFailure(_) => "technical_failure",
            Self::Unknown(_) => "unknown",
        }
    }
}
