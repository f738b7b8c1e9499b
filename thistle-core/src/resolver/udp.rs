use super::{DnsAnswer, DnsClient};
use crate::Result;
use anyhow::bail;
use hickory_client::{
    client::{AsyncClient, ClientHandle},
    udp::UdpClientStream,
};
use hickory_proto::rr::{DNSClass, Name, RecordType};
use itertools::Itertools;
use std::{net::SocketAddr, str::FromStr, time::Duration};
use tokio::{net::UdpSocket, time::timeout};

/// Production client: one plain UDP exchange per query against whichever
/// resolver the caller picked.
pub struct UdpClient {
    timeout: Duration,
}

impl UdpClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait::async_trait]
impl DnsClient for UdpClient {
    async fn query(
        &self,
        name: &str,
        server: SocketAddr,
        record_type: RecordType,
    ) -> Result<Vec<DnsAnswer>> {
        let stream = UdpClientStream::<UdpSocket>::new(server);
        let (mut client, bg) = timeout(self.timeout, AsyncClient::connect(stream)).await??;
        tokio::spawn(bg);

        let response = timeout(
            self.timeout,
            client.query(Name::from_str(name)?, DNSClass::IN, record_type),
        )
        .await??;

        let answers = response
            .answers()
            .iter()
            .filter(|record| record.record_type() == record_type)
            .filter_map(DnsAnswer::from_record)
            .collect_vec();

        if answers.is_empty() {
            bail!("no {} records for {}", record_type, name);
        }
        Ok(answers)
    }
}
