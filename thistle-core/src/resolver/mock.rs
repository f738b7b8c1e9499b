use super::{DnsAnswer, DnsClient};
use crate::Result;
use anyhow::bail;
use hickory_proto::rr::RecordType;
use std::{
    collections::{HashMap, HashSet},
    net::SocketAddr,
    sync::Mutex,
};

/// Scripted replacement for the network: answers from a fixed record table,
/// optionally synthesises wildcard answers, and logs every query it sees.
#[derive(Default)]
pub struct MockClient {
    records: HashMap<(String, RecordType), Vec<String>>,
    wildcards: Vec<(String, Vec<String>)>,
    refuse_servers: HashSet<SocketAddr>,
    refuse_all: bool,
    log: Mutex<Vec<(String, RecordType)>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn a(self, name: &str, address: &str) -> Self {
        self.record(name, RecordType::A, address)
    }

    pub fn aaaa(self, name: &str, address: &str) -> Self {
        self.record(name, RecordType::AAAA, address)
    }

    pub fn cname(self, name: &str, target: &str) -> Self {
        self.record(name, RecordType::CNAME, target)
    }

    fn record(mut self, name: &str, record_type: RecordType, data: &str) -> Self {
        self.records
            .entry((name.to_owned(), record_type))
            .or_default()
            .push(data.to_owned());
        self
    }

    /// Any A query for a name under `suffix` answers with `addresses`,
    /// mimicking a wildcard record.
    pub fn wildcard(mut self, suffix: &str, addresses: &[&str]) -> Self {
        self.wildcards.push((
            suffix.to_owned(),
            addresses.iter().map(|a| a.to_string()).collect(),
        ));
        self
    }

    pub fn refuse_all(mut self) -> Self {
        self.refuse_all = true;
        self
    }

    pub fn refuse_server(mut self, server: SocketAddr) -> Self {
        self.refuse_servers.insert(server);
        self
    }

    pub fn queries(&self) -> Vec<(String, RecordType)> {
        self.log.lock().unwrap().clone()
    }

    pub fn query_count(&self, name: &str, record_type: RecordType) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, t)| n == name && *t == record_type)
            .count()
    }
}

#[async_trait::async_trait]
impl DnsClient for MockClient {
    async fn query(
        &self,
        name: &str,
        server: SocketAddr,
        record_type: RecordType,
    ) -> Result<Vec<DnsAnswer>> {
        self.log
            .lock()
            .unwrap()
            .push((name.to_owned(), record_type));

        if self.refuse_all || self.refuse_servers.contains(&server) {
            bail!("{} refused the query", server);
        }

        if let Some(data) = self.records.get(&(name.to_owned(), record_type)) {
            return Ok(data
                .iter()
                .map(|d| DnsAnswer {
                    name: name.to_owned(),
                    record_type,
                    data: d.clone(),
                    ttl: 300,
                })
                .collect());
        }

        if record_type == RecordType::A {
            for (suffix, addresses) in &self.wildcards {
                if name.ends_with(&format!(".{suffix}")) {
                    return Ok(addresses
                        .iter()
                        .map(|d| DnsAnswer {
                            name: name.to_owned(),
                            record_type,
                            data: d.clone(),
                            ttl: 300,
                        })
                        .collect());
                }
            }
        }

        bail!("no {} records for {}", record_type, name)
    }
}
