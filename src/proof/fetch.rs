//! The outside world, as far as proof checking is concerned: something that
//! takes a URL and hands back a page, and a parsed form of that page we can
//! run css selectors against.
//!
//! Transport is up to the caller (timeouts included). All we need is for
//! failures to come back as a [FetchError] so they can be sorted into soft and
//! hard proof errors.

use crate::proof::{ProofError, ProofErrorKind};
use scraper::{Html, Selector};
use thiserror::Error;

/// Ways fetching a page can fail.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("host unreachable: {0}")]
    HostUnreachable(String),

    #[error("dns lookup failed: {0}")]
    Dns(String),

    /// The server answered with a non-success status.
    #[error("http status {0}")]
    Status(u16),

    /// The response came back but couldn't be read (truncated body, bad
    /// encoding).
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Classify this failure as a proof error.
    pub fn to_proof_error(&self, url: &str) -> ProofError {
        let kind = match self {
            Self::Timeout => ProofErrorKind::Timeout,
            Self::HostUnreachable(_) => ProofErrorKind::HostUnreachable,
            Self::Dns(_) => ProofErrorKind::DnsError,
            Self::Status(429) => ProofErrorKind::Http429,
            Self::Status(404) => ProofErrorKind::NotFound,
            Self::Status(code) if (500..600).contains(code) => ProofErrorKind::Http500,
            Self::Status(code) if (400..500).contains(code) => ProofErrorKind::Http400,
            Self::Status(code) if (300..400).contains(code) => ProofErrorKind::Http300,
            Self::Status(_) => ProofErrorKind::HttpOther,
            Self::Malformed(_) => ProofErrorKind::MalformedResponse,
        };
        ProofError::new(kind, format!("fetching {}: {}", url, self))
    }
}

/// Fetches a page by URL. Implementations are shared between threads, and may
/// block.
pub trait HtmlFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// A parsed html page.
pub struct HtmlDocument {
    html: Html,
}

impl HtmlDocument {
    pub fn parse(body: &str) -> Self {
        Self {
            html: Html::parse_document(body),
        }
    }

    /// The inner html of the first element matching `selector`, if any.
    pub fn select_first_html(&self, selector: &str) -> Result<Option<String>, ProofError> {
        let sel = Selector::parse(selector)
            .map_err(|e| ProofError::new(ProofErrorKind::InternalError, format!("bad selector {:?}: {}", selector, e)))?;
        Ok(self.html.select(&sel).next().map(|el| el.inner_html()))
    }
}
