use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Provenance of an enumerated name.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Tag {
    Search,
    Dns,
    Brute,
    Alt,
    Archive,
    Cert,
    Scrape,
}

/// The unit flowing through the pipeline. `address` is `None` on ingress and
/// always populated on every request the pipeline emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub name: String,
    /// The apex the name is enumerated under. Empty means bootstrap only,
    /// the pipeline will not resolve it.
    pub domain: String,
    pub address: Option<IpAddr>,
    pub tag: Tag,
    pub source: String,
}

impl Request {
    pub fn new(
        name: impl Into<String>,
        domain: impl Into<String>,
        tag: Tag,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            domain: domain.into(),
            address: None,
            tag,
            source: source.into(),
        }
    }
}

const ENCODED_SLASH: &str = "%2f";

/// Some upstream scrapers emit URL fragments with an encoded slash glued to
/// the front of the hostname.
pub fn normalise(name: &str) -> String {
    let mut name = name.trim();

    while name
        .as_bytes()
        .get(..ENCODED_SLASH.len())
        .map_or(false, |prefix| {
            prefix.eq_ignore_ascii_case(ENCODED_SLASH.as_bytes())
        })
    {
        name = &name[ENCODED_SLASH.len()..];
    }

    name.to_ascii_lowercase()
}

/// A name is in scope when it equals the apex or sits somewhere under it.
pub fn in_scope(name: &str, domain: &str) -> bool {
    if domain.is_empty() {
        return false;
    }

    match name.strip_suffix(domain) {
        Some("") => true,
        Some(prefix) => prefix.ends_with('.'),
        None => false,
    }
}
