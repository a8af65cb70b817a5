use serde::{Deserialize, Serialize};

/// Author of a status, as delivered by the upstream instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub acct: String,
    #[serde(default)]
    pub display_name: String,
}

/// A mentioned account inside a status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub acct: String,
}

/// The subset of a status the relay needs. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub account: Option<Account>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub edited_at: Option<String>,
    #[serde(default)]
    pub mentions: Vec<Mention>,
}

impl Status {
    /// The URL a browser would open for this status.
    ///
    /// Remote statuses carry their origin page in `url`; `uri` is the ActivityPub id and only
    /// used when no page URL is present.
    #[must_use]
    pub fn canonical_url(&self) -> Option<&str> {
        self.url
            .as_deref()
            .filter(|u| !u.is_empty())
            .or_else(|| self.uri.as_deref().filter(|u| !u.is_empty()))
    }

    /// Embeddable variant of the status page; this is what a wall frames.
    #[must_use]
    pub fn embed_url(&self) -> Option<String> {
        self.canonical_url()
            .map(|url| format!("{}/embed", url.trim_end_matches('/')))
    }

    #[must_use]
    pub fn author(&self) -> Option<&str> {
        self.account
            .as_ref()
            .map(|a| a.display_name.as_str())
            .filter(|name| !name.is_empty())
    }

    /// Whether any mention's `acct` equals `local_part` exactly.
    #[must_use]
    pub fn mentions_account(&self, local_part: &str) -> bool {
        self.mentions.iter().any(|m| m.acct == local_part)
    }
}
