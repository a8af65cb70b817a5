//! Iframe embeddability of a remote page, decided from its response headers.
//!
//! Precedence:
//! 1. `Content-Security-Policy` with a `frame-ancestors` directive decides alone.
//! 2. Otherwise `X-Frame-Options` decides; unrecognised values deny.
//! 3. Otherwise the page is embeddable.

use http::header::{CONTENT_SECURITY_POLICY, X_FRAME_OPTIONS};
use http::HeaderMap;

/// Which header produced the decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyEvidence {
    FrameAncestors { sources: Vec<String> },
    XFrameOptions { value: String },
    NoPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedDecision {
    pub embeddable: bool,
    pub evidence: PolicyEvidence,
}

impl EmbedDecision {
    const fn new(embeddable: bool, evidence: PolicyEvidence) -> Self {
        Self {
            embeddable,
            evidence,
        }
    }
}

/// Decide whether a page with `headers` may be framed by pages served from `domain`.
#[must_use]
pub fn evaluate(headers: &HeaderMap, domain: &str) -> EmbedDecision {
    let domain = normalize_domain(domain);

    if let Some(sources) = frame_ancestors(headers) {
        let embeddable = sources.iter().any(|s| source_matches(s, &domain));
        return EmbedDecision::new(embeddable, PolicyEvidence::FrameAncestors { sources });
    }

    if let Some(value) = x_frame_options(headers) {
        let embeddable = x_frame_options_allows(&value);
        return EmbedDecision::new(embeddable, PolicyEvidence::XFrameOptions { value });
    }

    EmbedDecision::new(true, PolicyEvidence::NoPolicy)
}

/// Source list of the `frame-ancestors` directive in the first non-empty CSP value.
fn frame_ancestors(headers: &HeaderMap) -> Option<Vec<String>> {
    let policy = headers
        .get(CONTENT_SECURITY_POLICY)?
        .to_str()
        .ok()
        .filter(|p| !p.trim().is_empty())?;

    policy.split(';').find_map(|directive| {
        let mut tokens = directive.split_ascii_whitespace();
        let name = tokens.next()?;
        name.eq_ignore_ascii_case("frame-ancestors")
            .then(|| tokens.map(str::to_string).collect())
    })
}

/// All `X-Frame-Options` values joined; `None` when the header is absent.
fn x_frame_options(headers: &HeaderMap) -> Option<String> {
    let values: Vec<&str> = headers
        .get_all(X_FRAME_OPTIONS)
        .iter()
        .map(|v| v.to_str().unwrap_or("<non-ascii>"))
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values.join(", "))
    }
}

fn x_frame_options_allows(value: &str) -> bool {
    let tokens: Vec<&str> = value
        .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect();

    // exactly one recognised token, anything else fails closed
    match tokens.as_slice() {
        [token] => token.eq_ignore_ascii_case("ALLOWALL"),
        _ => false,
    }
}

fn source_matches(source: &str, domain: &str) -> bool {
    let source = source.to_ascii_lowercase();

    if source == "*" || source == "http:" || source == "https:" {
        return true;
    }
    // 'none', 'self' and other keywords never name our domain
    if source.starts_with('\'') {
        return false;
    }

    let rest = source
        .strip_prefix("https://")
        .or_else(|| source.strip_prefix("http://"))
        .unwrap_or(&source);
    if rest.contains("://") || rest.ends_with(':') {
        return false;
    }

    let host_port = rest.split('/').next().unwrap_or_default();
    let (host, port) = match host_port.rsplit_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (host_port, None),
    };
    if port.is_some_and(|p| !matches!(p, "80" | "443" | "*")) {
        return false;
    }

    host_matches(host, domain)
}

fn host_matches(pattern: &str, domain: &str) -> bool {
    if pattern == domain {
        return true;
    }
    pattern
        .strip_prefix("*.")
        .is_some_and(|suffix| domain.ends_with(&format!(".{suffix}")))
}

/// Reduce a configured domain to a bare lower-case host.
fn normalize_domain(domain: &str) -> String {
    let domain = domain.trim().to_ascii_lowercase();
    let rest = domain
        .strip_prefix("https://")
        .or_else(|| domain.strip_prefix("http://"))
        .unwrap_or(&domain);
    let host_port = rest.split('/').next().unwrap_or_default();
    host_port
        .split_once(':')
        .map_or(host_port, |(host, _)| host)
        .to_string()
}
