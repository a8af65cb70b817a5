use thiserror::Error;

/// Errors raised by the subscription core.
///
/// Only `InvalidArgument`, `UnknownPrincipal` and `UnknownSubscription` ever reach a caller of
/// the registry. `MalformedEvent`, `UpstreamFailure` and `HeaderFetch` are produced and
/// consumed inside a listener task and end up in the logs.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown principal: {0}")]
    UnknownPrincipal(String),

    #[error("Principal {principal} is not subscribed to hashtag {hashtag}")]
    UnknownSubscription { principal: String, hashtag: String },

    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Upstream failure: {0}")]
    UpstreamFailure(String),

    #[error("Header fetch failed for {url}: {reason}")]
    HeaderFetch { url: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Short stable label for structured log fields.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::UnknownPrincipal(_) => "unknown_principal",
            Self::UnknownSubscription { .. } => "unknown_subscription",
            Self::MalformedEvent(_) => "malformed_event",
            Self::UpstreamFailure(_) => "upstream_failure",
            Self::HeaderFetch { .. } => "header_fetch",
            Self::Configuration(_) => "configuration",
            Self::Internal(_) => "internal",
        }
    }

    /// True for the two terminate outcomes that mean "already not subscribed".
    #[must_use]
    pub const fn is_not_subscribed(&self) -> bool {
        matches!(
            self,
            Self::UnknownPrincipal(_) | Self::UnknownSubscription { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedEvent(err.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_stable() {
        assert_eq!(
            Error::InvalidArgument("x".to_string()).as_label(),
            "invalid_argument"
        );
        assert_eq!(
            Error::UnknownSubscription {
                principal: "p".to_string(),
                hashtag: "h".to_string()
            }
            .as_label(),
            "unknown_subscription"
        );
    }

    #[test]
    fn test_not_subscribed_classification() {
        assert!(Error::UnknownPrincipal("ghost".to_string()).is_not_subscribed());
        assert!(Error::UnknownSubscription {
            principal: "p".to_string(),
            hashtag: "h".to_string()
        }
        .is_not_subscribed());
        assert!(!Error::InvalidArgument("empty".to_string()).is_not_subscribed());
    }

    #[test]
    fn test_json_error_maps_to_malformed_event() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert_eq!(err.as_label(), "malformed_event");
    }
}
