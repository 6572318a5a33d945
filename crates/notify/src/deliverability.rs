//! Pre-send recipient verification.
//!
//! Syntax, then a static deny-list of reserved and disposable domains, then
//! an MX lookup (falling back to an A record) over DNS-over-HTTPS. Lookup
//! failures never reject an address.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use mailcast_core::{is_plausible_address, DeliverabilityConfig};

/// Domains that never receive real mail or only hand out throwaway inboxes.
pub const DENIED_DOMAINS: &[&str] = &[
    "example.com",
    "example.org",
    "example.net",
    "test.com",
    "invalid.com",
    "mailinator.com",
    "yopmail.com",
    "guerrillamail.com",
    "10minutemail.com",
    "tempmail.com",
    "temp-mail.org",
    "throwaway.email",
    "trashmail.com",
    "sharklasers.com",
    "dispostable.com",
];

const DNS_NXDOMAIN: u32 = 3;

/// Outcome of checking one address.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Verdict {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Verdict {
    pub fn valid() -> Self {
        Self { valid: true, reason: None }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

#[async_trait]
pub trait DeliverabilityChecker: Send + Sync {
    async fn check(&self, address: &str) -> Verdict;
}

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("DNS request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("DNS response unusable: {0}")]
    Response(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Mx,
    A,
}

impl RecordKind {
    fn as_str(self) -> &'static str {
        match self {
            RecordKind::Mx => "MX",
            RecordKind::A => "A",
        }
    }

    /// RR type code as it appears in answers.
    fn code(self) -> u32 {
        match self {
            RecordKind::Mx => 15,
            RecordKind::A => 1,
        }
    }
}

/// Answers "does `domain` publish records of `kind`".
#[async_trait]
pub trait DnsLookup: Send + Sync {
    async fn has_records(&self, domain: &str, kind: RecordKind) -> Result<bool, LookupError>;
}

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Status")]
    status: u32,
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "type")]
    kind: u32,
}

/// Interpret a DNS JSON API body (Google / Cloudflare shape).
pub fn parse_answer(body: &[u8], kind: RecordKind) -> Result<bool, LookupError> {
    let response: DohResponse =
        serde_json::from_slice(body).map_err(|e| LookupError::Response(e.to_string()))?;
    match response.status {
        0 => Ok(response.answer.iter().any(|a| a.kind == kind.code())),
        DNS_NXDOMAIN => Ok(false),
        other => Err(LookupError::Response(format!("resolver status {other}"))),
    }
}

/// DNS-over-HTTPS JSON client.
#[derive(Debug, Clone)]
pub struct DohResolver {
    client: reqwest::Client,
    url: String,
}

impl DohResolver {
    pub fn from_config(config: &DeliverabilityConfig) -> Result<Self, LookupError> {
        let client = reqwest::Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            url: config.resolver_url.clone(),
        })
    }
}

#[async_trait]
impl DnsLookup for DohResolver {
    async fn has_records(&self, domain: &str, kind: RecordKind) -> Result<bool, LookupError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("name", domain), ("type", kind.as_str())])
            .header(reqwest::header::ACCEPT, "application/dns-json")
            .send()
            .await?
            .error_for_status()?;
        let body = response.bytes().await?;
        parse_answer(&body, kind)
    }
}

/// The standard checker: syntax, deny-list, MX then A.
pub struct DomainChecker {
    lookup: Arc<dyn DnsLookup>,
    denied: HashSet<String>,
}

impl DomainChecker {
    pub fn new(lookup: Arc<dyn DnsLookup>) -> Self {
        Self {
            lookup,
            denied: DENIED_DOMAINS.iter().map(|d| d.to_string()).collect(),
        }
    }

    pub fn from_config(config: &DeliverabilityConfig) -> Result<Self, LookupError> {
        Ok(Self::new(Arc::new(DohResolver::from_config(config)?)))
    }

    async fn resolves(&self, domain: &str, kind: RecordKind) -> Option<bool> {
        match self.lookup.has_records(domain, kind).await {
            Ok(found) => Some(found),
            Err(e) => {
                tracing::warn!(domain, kind = kind.as_str(), error = %e, "DNS lookup failed, accepting address");
                None
            }
        }
    }
}

#[async_trait]
impl DeliverabilityChecker for DomainChecker {
    async fn check(&self, address: &str) -> Verdict {
        let address = address.trim();
        if !is_plausible_address(address) {
            return Verdict::invalid("invalid address syntax");
        }
        let domain = match address.rsplit_once('@') {
            Some((_, domain)) => domain.to_ascii_lowercase(),
            None => return Verdict::invalid("invalid address syntax"),
        };
        if self.denied.contains(&domain) {
            return Verdict::invalid(format!("disposable or reserved domain: {domain}"));
        }

        match self.resolves(&domain, RecordKind::Mx).await {
            Some(true) | None => return Verdict::valid(),
            Some(false) => {}
        }
        match self.resolves(&domain, RecordKind::A).await {
            Some(true) | None => Verdict::valid(),
            Some(false) => Verdict::invalid(format!("domain {domain} does not accept mail")),
        }
    }
}
