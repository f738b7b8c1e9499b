use super::DnsClient;
use futures::future::join_all;
use hickory_proto::rr::RecordType;
use rand::{thread_rng, Rng};
use std::net::SocketAddr;
use tracing::info;

/// Queried once per candidate during bootstrap to decide whether the
/// resolver is usable.
const PROBE_NAME: &str = "google.com";

// Public recursive resolvers. Secondaries for the same operator are kept so
// a single-operator outage cannot empty the pool.
const KNOWN_PUBLIC_SERVERS: &[&str] = &[
    "8.8.8.8:53",         // Google
    "64.6.64.6:53",       // Verisign
    "9.9.9.9:53",         // Quad9
    "84.200.69.80:53",    // DNS.WATCH
    "8.26.56.26:53",      // Comodo Secure DNS
    "208.67.222.222:53",  // OpenDNS Home
    "195.46.39.39:53",    // SafeDNS
    "69.195.152.204:53",  // OpenNIC
    "216.146.35.35:53",   // Dyn
    "37.235.1.174:53",    // FreeDNS
    "198.101.242.72:53",  // Alternate DNS
    "77.88.8.8:53",       // Yandex.DNS
    "91.239.100.100:53",  // UncensoredDNS
    "74.82.42.42:53",     // Hurricane Electric
    "156.154.70.1:53",    // Neustar
    "8.8.4.4:53",         // Google Secondary
    "149.112.112.112:53", // Quad9 Secondary
    "84.200.70.40:53",    // DNS.WATCH Secondary
    "8.20.247.20:53",     // Comodo Secure DNS Secondary
    "208.67.220.220:53",  // OpenDNS Home Secondary
    "195.46.39.40:53",    // SafeDNS Secondary
    "216.146.36.36:53",   // Dyn Secondary
    "77.88.8.1:53",       // Yandex.DNS Secondary
    "89.233.43.71:53",    // UncensoredDNS Secondary
    "156.154.71.1:53",    // Neustar Secondary
    // "37.235.1.177:53",    // FreeDNS Secondary
    // "23.253.163.53:53",   // Alternate DNS Secondary
    // "64.6.65.6:53",       // Verisign Secondary
];

#[derive(strum::Display, thiserror::Error, Debug)]
pub enum PoolError {
    NoUsableResolvers,
}

/// The vetted set of recursive resolvers for one run. Built once at startup
/// and read-only afterwards, so concurrent access needs no coordination.
#[derive(Debug, Clone)]
pub struct ResolverPool {
    servers: Vec<SocketAddr>,
}

impl ResolverPool {
    /// Probes every known public server and keeps the ones that answer.
    pub async fn bootstrap(client: &dyn DnsClient) -> Result<Self, PoolError> {
        let candidates: Vec<SocketAddr> = KNOWN_PUBLIC_SERVERS
            .iter()
            .filter_map(|server| server.parse().ok())
            .collect();

        let probes = candidates.iter().map(|&server| async move {
            client
                .query(PROBE_NAME, server, RecordType::A)
                .await
                .ok()
                .map(|_| server)
        });

        let servers: Vec<SocketAddr> = join_all(probes).await.into_iter().flatten().collect();

        if servers.is_empty() {
            return Err(PoolError::NoUsableResolvers);
        }

        info!(
            "{} of {} public resolvers are usable",
            servers.len(),
            candidates.len()
        );
        Ok(Self { servers })
    }

    /// A uniformly random usable resolver. Random selection spreads load
    /// across concurrent lookups without a shared cursor.
    pub fn next(&self) -> SocketAddr {
        self.servers[thread_rng().gen_range(0..self.servers.len())]
    }

    pub fn servers(&self) -> &[SocketAddr] {
        &self.servers
    }
}
