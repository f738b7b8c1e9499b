pub mod pool;
pub mod query;
pub mod udp;

#[cfg(test)]
pub(crate) mod mock;

use crate::Result;
use hickory_proto::rr::{RData, Record, RecordType};
use std::{
    collections::HashSet,
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

/// A single answer record. Names are lower-cased with the trailing root dot
/// removed so they compare cleanly against request names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsAnswer {
    pub name: String,
    pub record_type: RecordType,
    pub data: String,
    pub ttl: u32,
}

impl DnsAnswer {
    pub(crate) fn from_record(record: &Record) -> Option<Self> {
        let data = match record.data()? {
            RData::A(ip) => ip.to_string(),
            RData::AAAA(ip) => ip.to_string(),
            RData::CNAME(target) => strip_root(&target.0.to_utf8()),
            other => other.to_string(),
        };

        Some(Self {
            name: strip_root(&record.name().to_utf8()),
            record_type: record.record_type(),
            data,
            ttl: record.ttl(),
        })
    }
}

fn strip_root(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

/// Every parsed address among the terminal records of an answer list.
pub fn address_set(answers: &[DnsAnswer]) -> HashSet<IpAddr> {
    answers
        .iter()
        .filter(|a| matches!(a.record_type, RecordType::A | RecordType::AAAA))
        .filter_map(|a| a.data.parse().ok())
        .collect()
}

/// The address published on emitted requests: the first A record, or the
/// first AAAA record when the name only resolves over IPv6.
pub fn representative_address(answers: &[DnsAnswer]) -> Option<IpAddr> {
    answers
        .iter()
        .find(|a| a.record_type == RecordType::A)
        .or_else(|| answers.iter().find(|a| a.record_type == RecordType::AAAA))
        .and_then(|a| a.data.parse().ok())
}

/// The seam to the low-level DNS codec: one query of one record type against
/// one recursive resolver.
#[async_trait::async_trait]
pub trait DnsClient: Send + Sync {
    async fn query(
        &self,
        name: &str,
        server: SocketAddr,
        record_type: RecordType,
    ) -> Result<Vec<DnsAnswer>>;
}

#[async_trait::async_trait]
impl<C: DnsClient + ?Sized> DnsClient for Arc<C> {
    async fn query(
        &self,
        name: &str,
        server: SocketAddr,
        record_type: RecordType,
    ) -> Result<Vec<DnsAnswer>> {
        C::query(self, name, server, record_type).await
    }
}
