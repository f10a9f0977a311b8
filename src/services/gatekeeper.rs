//! Request screening: bot filter, well-formedness and shared-secret auth.
//!
//! Screening only looks at headers and never touches the store, so it can be
//! evaluated (and tested) without any I/O.

use crate::errors::Rejection;
use axum::http::HeaderMap;
use std::fmt;

/// User-Agent fragments that mark a request as automated traffic.
const BOT_KEYWORDS: [&str; 5] = ["bot", "crawl", "spider", "slurp", "mediapartners"];

pub const AUTH_KEY_HEADER: &str = "auth-key";
pub const SOURCE_HEADER: &str = "source";
pub const VERSION_HEADER: &str = "version";

/// What a request that passed screening is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Well-formed but without the shared secret: reads only.
    Anonymous,
    /// Well-formed and carrying the shared secret: reads and writes.
    Authorized,
}

impl Access {
    pub fn is_authorized(self) -> bool {
        matches!(self, Access::Authorized)
    }
}

/// Holds the shared secret for the lifetime of the process.
#[derive(Clone)]
pub struct Gatekeeper {
    auth_key: String,
}

impl fmt::Debug for Gatekeeper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gatekeeper")
            .field("auth_key", &"<redacted>")
            .finish()
    }
}

impl Gatekeeper {
    pub fn new(auth_key: impl Into<String>) -> Self {
        Self {
            auth_key: auth_key.into(),
        }
    }

    /// Classify a request by its headers.
    ///
    /// Order matters: the bot filter runs first, then the Source/Version
    /// check. Only requests that pass both get an `Access` level.
    pub fn screen(&self, headers: &HeaderMap) -> Result<Access, Rejection> {
        if is_bot(headers) {
            return Err(Rejection::Bot);
        }
        if !is_well_formed(headers) {
            return Err(Rejection::Malformed);
        }
        if self.is_authorized(headers) {
            Ok(Access::Authorized)
        } else {
            Ok(Access::Anonymous)
        }
    }

    /// Exact match of `Auth-Key` against the secret, on top of the
    /// well-formedness requirement.
    pub fn is_authorized(&self, headers: &HeaderMap) -> bool {
        let Some(presented) = headers.get(AUTH_KEY_HEADER) else {
            return false;
        };
        secrets_match(presented.as_bytes(), self.auth_key.as_bytes()) && is_well_formed(headers)
    }
}

/// Case-insensitive substring match of the User-Agent against `BOT_KEYWORDS`.
pub fn is_bot(headers: &HeaderMap) -> bool {
    let Some(user_agent) = headers.get(axum::http::header::USER_AGENT) else {
        return false;
    };
    let user_agent = String::from_utf8_lossy(user_agent.as_bytes()).to_ascii_lowercase();
    BOT_KEYWORDS.iter().any(|kw| user_agent.contains(kw))
}

/// Both `Source` and `Version` present and non-empty.
pub fn is_well_formed(headers: &HeaderMap) -> bool {
    has_value(headers, SOURCE_HEADER) && has_value(headers, VERSION_HEADER)
}

fn has_value(headers: &HeaderMap, name: &str) -> bool {
    headers.get(name).is_some_and(|v| !v.as_bytes().is_empty())
}

/// Equality that does not short-circuit on the first differing byte.
fn secrets_match(presented: &[u8], expected: &[u8]) -> bool {
    if presented.len() != expected.len() {
        return false;
    }
    presented
        .iter()
        .zip(expected)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(*value));
        }
        map
    }

    #[test]
    fn bot_keywords_match_case_insensitively() {
        for ua in [
            "Googlebot/2.1",
            "Mozilla/5.0 (compatible; BINGBOT/2.0)",
            "some-Crawler",
            "BaiduSpider",
            "Yahoo! Slurp",
            "Mediapartners-Google",
        ] {
            assert!(is_bot(&headers(&[("user-agent", ua)])), "{ua}");
        }
        assert!(!is_bot(&headers(&[("user-agent", "python-requests/2.31")])));
        assert!(!is_bot(&HeaderMap::new()));
    }

    #[test]
    fn bot_filter_runs_before_everything_else() {
        let gate = Gatekeeper::new("s3cret");
        let h = headers(&[
            ("user-agent", "robot"),
            ("auth-key", "s3cret"),
            ("source", "app"),
            ("version", "1"),
        ]);
        assert_eq!(gate.screen(&h), Err(Rejection::Bot));
    }

    #[test]
    fn missing_or_empty_source_version_is_malformed() {
        let gate = Gatekeeper::new("s3cret");
        for h in [
            headers(&[]),
            headers(&[("source", "app")]),
            headers(&[("version", "1")]),
            headers(&[("source", ""), ("version", "1")]),
            headers(&[("auth-key", "s3cret"), ("source", "app"), ("version", "")]),
        ] {
            assert_eq!(gate.screen(&h), Err(Rejection::Malformed));
        }
    }

    #[test]
    fn access_depends_on_exact_secret() {
        let gate = Gatekeeper::new("s3cret");
        let base = [("source", "app"), ("version", "1")];

        assert_eq!(gate.screen(&headers(&base)), Ok(Access::Anonymous));

        for wrong in ["S3CRET", "s3cret ", "s3cre", ""] {
            let mut h = headers(&base);
            h.insert("auth-key", HeaderValue::from_static(wrong));
            assert_eq!(gate.screen(&h), Ok(Access::Anonymous), "{wrong:?}");
        }

        let mut h = headers(&base);
        h.insert("auth-key", HeaderValue::from_static("s3cret"));
        assert_eq!(gate.screen(&h), Ok(Access::Authorized));
    }

    #[test]
    fn authorization_requires_well_formedness() {
        let gate = Gatekeeper::new("s3cret");
        assert!(!gate.is_authorized(&headers(&[("auth-key", "s3cret")])));
    }

    #[test]
    fn debug_output_hides_secret() {
        let rendered = format!("{:?}", Gatekeeper::new("s3cret"));
        assert!(!rendered.contains("s3cret"));
    }
}
