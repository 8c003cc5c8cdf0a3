//! Domain allowlist for URL ingestion.
//!
//! A URL may be fetched only if it is http(s), does not point at a
//! private or internal host, and its host equals or is a subdomain of
//! one of the allowed domains.

use std::net::IpAddr;

use aenki_core::error::IngestError;
use url::Url;

/// Which hosts URL training may reach.
#[derive(Debug, Clone)]
pub struct DomainAllowlist {
    domains: Vec<String>,
}

impl DomainAllowlist {
    /// Domains are matched case-insensitively; `*` allows any public host.
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            domains: domains
                .into_iter()
                .map(|d| d.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    /// Parse `raw` and check it against the policy.
    pub fn check(&self, raw: &str) -> Result<Url, IngestError> {
        let url = Url::parse(raw.trim()).map_err(|_| IngestError::InvalidUrl(raw.to_string()))?;

        match url.scheme() {
            "http" | "https" => {}
            _ => return Err(IngestError::InvalidUrl(raw.to_string())),
        }

        let host = url
            .host_str()
            .ok_or_else(|| IngestError::InvalidUrl(raw.to_string()))?
            .trim_end_matches('.')
            .to_ascii_lowercase();

        // SSRF prevention
        if is_private_host(&host) {
            return Err(IngestError::DomainNotAllowed(host));
        }

        if self.domains.iter().any(|d| d == "*" || host_matches(&host, d)) {
            Ok(url)
        } else {
            Err(IngestError::DomainNotAllowed(host))
        }
    }

    pub fn is_allowed(&self, raw: &str) -> bool {
        self.check(raw).is_ok()
    }
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Check if a host is loopback, private, link-local or otherwise internal.
fn is_private_host(host: &str) -> bool {
    if host == "localhost" || host.ends_with(".localhost") || host.ends_with(".internal") {
        return true;
    }

    let bare = host.trim_start_matches('[').trim_end_matches(']');
    match bare.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => {
            ip.is_loopback() || ip.is_private() || ip.is_link_local() || ip.is_unspecified() || ip.is_broadcast()
        }
        Ok(IpAddr::V6(ip)) => {
            ip.is_loopback()
                || ip.is_unspecified()
                // fc00::/7 unique local, fe80::/10 link-local
                || (ip.segments()[0] & 0xfe00) == 0xfc00
                || (ip.segments()[0] & 0xffc0) == 0xfe80
        }
        Err(_) => false,
    }
}
