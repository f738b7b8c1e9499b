use crate::resolver::{address_set, pool::ResolverPool, query::resolve, DnsClient};
use rand::{seq::SliceRandom, thread_rng, Rng};
use std::{
    collections::{HashMap, HashSet},
    net::{IpAddr, SocketAddr},
    sync::Arc,
};
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    task::JoinHandle,
};
use tracing::debug;

const MAX_NAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;
const LDH_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789-";

// Bounds memory amplification when resolutions outrun the worker.
const QUEUE_CAPACITY: usize = 50;

struct MatchQuery {
    name: String,
    domain: String,
    addresses: HashSet<IpAddr>,
    reply: oneshot::Sender<bool>,
}

/// Handle to the single worker that owns the wildcard cache. Every cache
/// access goes through the channel, so the cache itself needs no lock.
#[derive(Clone)]
pub struct WildcardFilter {
    queries: mpsc::Sender<MatchQuery>,
}

impl WildcardFilter {
    pub fn spawn(
        client: Arc<dyn DnsClient>,
        pool: Arc<ResolverPool>,
        quit: broadcast::Receiver<()>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let handle = tokio::spawn(run_worker(client, pool, rx, quit));

        (Self { queries: tx }, handle)
    }

    /// Whether any of `addresses` is explained by a wildcard somewhere on
    /// the label path between `name` and `domain`. Answers `false` once the
    /// worker has shut down.
    pub async fn matches(&self, name: &str, domain: &str, addresses: HashSet<IpAddr>) -> bool {
        let (reply, answer) = oneshot::channel();
        let query = MatchQuery {
            name: name.to_owned(),
            domain: domain.to_owned(),
            addresses,
            reply,
        };

        if self.queries.send(query).await.is_err() {
            return false;
        }
        answer.await.unwrap_or(false)
    }
}

async fn run_worker(
    client: Arc<dyn DnsClient>,
    pool: Arc<ResolverPool>,
    mut queries: mpsc::Receiver<MatchQuery>,
    mut quit: broadcast::Receiver<()>,
) {
    let mut cache: HashMap<String, Option<HashSet<IpAddr>>> = HashMap::new();

    loop {
        tokio::select! {
            query = queries.recv() => match query {
                Some(query) => {
                    let matched = matches_wildcard(&mut cache, &*client, &pool, &query).await;
                    let _ = query.reply.send(matched);
                }
                None => break,
            },
            _ = quit.recv() => break,
        }
    }
}

async fn matches_wildcard(
    cache: &mut HashMap<String, Option<HashSet<IpAddr>>>,
    client: &dyn DnsClient,
    pool: &ResolverPool,
    query: &MatchQuery,
) -> bool {
    let mut matched = false;

    for sub in label_suffixes(&query.name, &query.domain) {
        // Detection is one-shot per suffix; the entry is never rewritten.
        if !cache.contains_key(&sub) {
            let entry = detect(client, pool, &sub).await;
            if entry.is_some() {
                debug!("wildcard detected under {}", sub);
            }
            cache.insert(sub.clone(), entry);
        }

        if let Some(Some(answers)) = cache.get(&sub) {
            if !answers.is_disjoint(&query.addresses) {
                matched = true;
            }
        }
    }

    matched
}

/// Every label suffix from the apex up to the candidate's immediate parent.
/// The entry describing `*.apex` is keyed by the apex itself.
fn label_suffixes(name: &str, domain: &str) -> Vec<String> {
    let labels: Vec<&str> = name.split('.').collect();
    let base = domain.split('.').count();

    (1..=labels.len().saturating_sub(base))
        .rev()
        .map(|i| labels[i..].join("."))
        .collect()
}

// All three probes go to one resolver so a per-resolver wildcard policy
// cannot split the verdict.
async fn detect(
    client: &dyn DnsClient,
    pool: &ResolverPool,
    sub: &str,
) -> Option<HashSet<IpAddr>> {
    let server = pool.next();

    let first = probe(client, sub, server).await?;
    let second = probe(client, sub, server).await?;
    let third = probe(client, sub, server).await?;

    // Equal non-empty answer sets across all three probes mean the suffix
    // hands out the same addresses for any name.
    (!first.is_empty() && first == second && second == third).then_some(first)
}

async fn probe(client: &dyn DnsClient, sub: &str, server: SocketAddr) -> Option<HashSet<IpAddr>> {
    let name = unlikely_name(sub)?;
    let answers = resolve(client, &name, server).await.ok()?;

    Some(address_set(&answers))
}

/// A name that almost certainly does not exist under `sub`. The label is
/// LDH-only, never starts or ends with a hyphen, and the full name stays
/// within the 253-octet limit.
fn unlikely_name(sub: &str) -> Option<String> {
    let room = MAX_NAME_LEN.checked_sub(sub.len() + 1)?;
    let len = room.min(MAX_LABEL_LEN / 2);
    if len == 0 {
        return None;
    }

    let mut rng = thread_rng();
    let mut alphabet = LDH_CHARS.to_vec();
    alphabet.shuffle(&mut rng);

    let mut label = String::with_capacity(len);
    for position in 0..len {
        let boundary = position == 0 || position == len - 1;
        loop {
            let picked = alphabet[rng.gen_range(0..alphabet.len())] as char;
            if boundary && picked == '-' {
                continue;
            }
            label.push(picked);
            break;
        }
    }

    Some(format!("{label}.{sub}"))
}
