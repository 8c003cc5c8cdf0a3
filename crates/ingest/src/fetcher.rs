//! URL ingestion — fetch an allowlisted page and reduce it to text.

use std::error::Error as _;
use std::time::Duration;

use aenki_core::error::IngestError;
use aenki_security::DomainAllowlist;
use reqwest::header::USER_AGENT;
use reqwest::redirect::{Attempt, Policy};
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::html::extract_page;

const MAX_REDIRECTS: usize = 10;
/// Bytes of HTML read per page; the rest of the body is dropped.
pub const DEFAULT_MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

/// Readable content of one fetched page.
#[derive(Debug, Clone, Serialize)]
pub struct IngestedPage {
    pub url: String,
    pub title: String,
    pub content: String,
}

/// Fetches pages from allowlisted domains.
#[derive(Debug, Clone)]
pub struct UrlIngestor {
    client: reqwest::Client,
    allowlist: DomainAllowlist,
    user_agent: String,
    max_chars: usize,
    max_body_bytes: usize,
}

impl UrlIngestor {
    pub fn new(
        allowlist: DomainAllowlist,
        timeout: Duration,
        user_agent: impl Into<String>,
        max_chars: usize,
    ) -> Result<Self, IngestError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(redirect_policy(allowlist.clone()))
            .build()
            .map_err(|e| IngestError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            allowlist,
            user_agent: user_agent.into(),
            max_chars: max_chars.max(1),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        })
    }

    pub fn max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes.max(1);
        self
    }

    pub fn allowlist(&self) -> &DomainAllowlist {
        &self.allowlist
    }

    /// Fetch `raw_url` if the allowlist permits it and extract its text.
    pub async fn ingest_url(&self, raw_url: &str) -> Result<IngestedPage, IngestError> {
        let url = self.allowlist.check(raw_url).inspect_err(|e| {
            warn!(url = %raw_url, error = %e, "Rejected ingestion URL");
        })?;
        info!(url = %url, "Ingesting content");
        self.fetch_page(url).await
    }

    pub(crate) async fn fetch_page(&self, url: Url) -> Result<IngestedPage, IngestError> {
        let response = self
            .client
            .get(url.clone())
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(|e| {
                if let Some(rejected) = redirect_rejection(&e) {
                    warn!(url = %url, error = %rejected, "Rejected redirect target");
                    rejected
                } else if e.is_timeout() {
                    IngestError::RequestFailed(format!("timed out fetching {url}"))
                } else {
                    IngestError::RequestFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::HttpStatus {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        let html = self.read_body(response).await?;

        let page = extract_page(&html);
        if page.text.is_empty() {
            return Err(IngestError::EmptyContent(url.to_string()));
        }

        let content: String = page.text.chars().take(self.max_chars).collect();
        debug!(url = %url, title = %page.title, chars = content.chars().count(), "Extracted page");

        Ok(IngestedPage {
            url: url.to_string(),
            title: page.title,
            content,
        })
    }

    /// Read at most `max_body_bytes` of the body.
    async fn read_body(&self, mut response: reqwest::Response) -> Result<String, IngestError> {
        let url = response.url().clone();
        if response.content_length().is_some_and(|len| len > self.max_body_bytes as u64) {
            debug!(url = %url, limit = self.max_body_bytes, "Body larger than limit, reading a prefix");
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| IngestError::RequestFailed(format!("read body: {e}")))?
        {
            let room = self.max_body_bytes - body.len();
            if chunk.len() >= room {
                body.extend_from_slice(&chunk[..room]);
                warn!(url = %url, limit = self.max_body_bytes, "Page body truncated");
                break;
            }
            body.extend_from_slice(&chunk);
        }

        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

/// Follow a redirect only if its target passes the allowlist again.
fn redirect_policy(allowlist: DomainAllowlist) -> Policy {
    Policy::custom(move |attempt: Attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error(IngestError::RequestFailed("too many redirects".into()));
        }
        match allowlist.check(attempt.url().as_str()) {
            Ok(_) => attempt.follow(),
            Err(e) => attempt.error(e),
        }
    })
}

fn redirect_rejection(e: &reqwest::Error) -> Option<IngestError> {
    let mut source = e.source();
    while let Some(inner) = source {
        if let Some(rejected) = inner.downcast_ref::<IngestError>() {
            return Some(rejected.clone());
        }
        source = inner.source();
    }
    None
}
