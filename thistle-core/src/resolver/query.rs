use super::{DnsAnswer, DnsClient};
use crate::Result;
use hickory_proto::rr::RecordType;
use std::net::SocketAddr;

// Pathological alias chains are cut off instead of followed forever.
const MAX_CNAME_HOPS: usize = 10;

#[derive(strum::Display, thiserror::Error, Debug)]
pub enum ResolveError {
    NoAddressRecords,
}

/// One logical lookup: follow the alias chain from `name`, then collect the
/// terminal address records. Every answer seen along the way is returned so
/// the caller can emit discovered aliases. Per-type transport failures are
/// swallowed; the lookup only fails when neither A nor AAAA resolves.
pub async fn resolve(
    client: &dyn DnsClient,
    name: &str,
    server: SocketAddr,
) -> Result<Vec<DnsAnswer>> {
    let mut answers = Vec::new();
    let mut name = name.to_owned();

    for _ in 0..MAX_CNAME_HOPS {
        let alias = match client.query(&name, server, RecordType::CNAME).await {
            Ok(chain) => match chain.into_iter().next() {
                Some(alias) => alias,
                None => break,
            },
            Err(_) => break,
        };

        name = alias.data.clone();
        answers.push(alias);
    }

    let mut resolved = false;
    for record_type in [RecordType::A, RecordType::AAAA] {
        if let Ok(records) = client.query(&name, server, record_type).await {
            answers.extend(records);
            resolved = true;
        }
    }

    if !resolved {
        return Err(ResolveError::NoAddressRecords.into());
    }
    Ok(answers)
}
