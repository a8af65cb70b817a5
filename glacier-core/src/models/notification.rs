use serde::Serialize;

use super::id::{Hashtag, Principal};

/// Prefix shared by every notification destination.
pub const DESTINATION_PREFIX: &str = "/topic/hashtags";

/// Which of the three per-subscription channels a notification goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Creation,
    Modification,
    Deletion,
}

impl NotificationKind {
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Creation => "creation",
            Self::Modification => "modification",
            Self::Deletion => "deletion",
        }
    }
}

/// Routable destination `/topic/hashtags/{principal}/{hashtag}/{kind}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    principal: Principal,
    hashtag: Hashtag,
    kind: NotificationKind,
}

impl Destination {
    #[must_use]
    pub const fn new(principal: Principal, hashtag: Hashtag, kind: NotificationKind) -> Self {
        Self {
            principal,
            hashtag,
            kind,
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

    #[must_use]
    pub const fn kind(&self) -> NotificationKind {
        self.kind
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{DESTINATION_PREFIX}/{}/{}/{}",
            self.principal,
            self.hashtag,
            self.kind.suffix()
        )
    }
}

/// Payload pushed to the browser. The destination already names the kind, so the JSON body
/// carries only the fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OutboundNotification {
    StatusCreated {
        id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        author: Option<String>,
        url: String,
    },
    StatusUpdated {
        id: String,
        url: String,
        #[serde(rename = "editedAt", skip_serializing_if = "Option::is_none")]
        edited_at: Option<String>,
    },
    StatusDeleted {
        id: String,
    },
}

impl OutboundNotification {
    #[must_use]
    pub const fn kind(&self) -> NotificationKind {
        match self {
            Self::StatusCreated { .. } => NotificationKind::Creation,
            Self::StatusUpdated { .. } => NotificationKind::Modification,
            Self::StatusDeleted { .. } => NotificationKind::Deletion,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::StatusCreated { id, .. }
            | Self::StatusUpdated { id, .. }
            | Self::StatusDeleted { id } => id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_format() {
        let dest = Destination::new(
            Principal::new("wall-1").unwrap(),
            Hashtag::new("Rust").unwrap(),
            NotificationKind::Modification,
        );
        assert_eq!(dest.to_string(), "/topic/hashtags/wall-1/Rust/modification");
    }

    #[test]
    fn test_notification_json_shape() {
        let created = OutboundNotification::StatusCreated {
            id: "1".to_string(),
            author: None,
            url: "https://a.example/1".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&created).unwrap(),
            serde_json::json!({"id": "1", "url": "https://a.example/1"})
        );

        let updated = OutboundNotification::StatusUpdated {
            id: "2".to_string(),
            url: "https://a.example/2".to_string(),
            edited_at: Some("2024-01-01T00:00:00Z".to_string()),
        };
        assert_eq!(
            serde_json::to_value(&updated).unwrap(),
            serde_json::json!({
                "id": "2",
                "url": "https://a.example/2",
                "editedAt": "2024-01-01T00:00:00Z"
            })
        );
        assert_eq!(updated.kind(), NotificationKind::Modification);
    }
}
