use crate::{
    request::{in_scope, normalise, Request, Tag},
    resolver::{
        address_set, pool::ResolverPool, query::resolve, representative_address, udp::UdpClient,
        DnsClient,
    },
    wildcard::WildcardFilter,
    Result,
};
use anyhow::Context;
use serde::Deserialize;
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use std::{
    collections::{HashSet, VecDeque},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
    time,
};
use tracing::{debug, info};

// How often an empty queue clears the activity flag.
const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Capability contract shared by pipeline stages: external orchestration
/// starts and stops them and polls for quiescence.
pub trait Service {
    fn start(&mut self) -> Result<()>;
    fn stop(&mut self);
    fn is_active(&self) -> bool;
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Pacing interval between outbound resolutions.
    #[serde_as(as = "DurationMilliSeconds")]
    pub frequency: Duration,
    /// Timeout applied to every underlying DNS query.
    #[serde_as(as = "DurationSeconds")]
    pub query_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            frequency: Duration::from_millis(5),
            query_timeout: Duration::from_secs(5),
        }
    }
}

// The wildcard worker and the pipeline loop must not outlive the service
// that owns them; shutdown is normally cooperative via the quit broadcast,
// dropping the service is the hard stop.
struct Tasks {
    wildcard_worker: JoinHandle<()>,
    pipeline: JoinHandle<()>,
}

impl Drop for Tasks {
    fn drop(&mut self) {
        self.wildcard_worker.abort();
        self.pipeline.abort();
    }
}

/// The paced, deduplicating resolution stage between name producers and
/// downstream consumers.
pub struct DnsService {
    client: Arc<dyn DnsClient>,
    pool: Arc<ResolverPool>,
    input: Option<mpsc::Receiver<Request>>,
    output: mpsc::Sender<Request>,
    active: Arc<AtomicBool>,
    frequency: watch::Sender<Duration>,
    quit: broadcast::Sender<()>,
    tasks: Option<Tasks>,
}

impl DnsService {
    pub fn new(
        config: &ServiceConfig,
        client: Arc<dyn DnsClient>,
        pool: Arc<ResolverPool>,
        input: mpsc::Receiver<Request>,
        output: mpsc::Sender<Request>,
    ) -> Self {
        let (frequency, _) = watch::channel(config.frequency);
        let (quit, _) = broadcast::channel(1);

        Self {
            client,
            pool,
            input: Some(input),
            output,
            active: Arc::new(AtomicBool::new(false)),
            frequency,
            quit,
            tasks: None,
        }
    }

    /// Resolves over plain UDP, applying the configured per-query timeout.
    /// Callers that want a different transport inject their own client
    /// through [`DnsService::new`].
    pub fn with_udp_client(
        config: &ServiceConfig,
        pool: Arc<ResolverPool>,
        input: mpsc::Receiver<Request>,
        output: mpsc::Sender<Request>,
    ) -> Self {
        Self::new(
            config,
            Arc::new(UdpClient::new(config.query_timeout)),
            pool,
            input,
            output,
        )
    }

    pub fn frequency(&self) -> Duration {
        *self.frequency.borrow()
    }

    /// Takes effect immediately: the pipeline rebuilds its ticker when the
    /// value changes.
    pub fn set_frequency(&self, frequency: Duration) {
        self.frequency.send_replace(frequency);
    }
}

impl Service for DnsService {
    fn start(&mut self) -> Result<()> {
        let input = self.input.take().context("service is already running")?;

        let (filter, wildcard_worker) =
            WildcardFilter::spawn(self.client.clone(), self.pool.clone(), self.quit.subscribe());

        let pipeline = Arc::new(Pipeline {
            client: self.client.clone(),
            pool: self.pool.clone(),
            filter,
            output: self.output.clone(),
            active: self.active.clone(),
        });
        let pipeline = tokio::spawn(pipeline.run(
            input,
            self.frequency.subscribe(),
            self.quit.subscribe(),
        ));

        self.tasks = Some(Tasks {
            wildcard_worker,
            pipeline,
        });

        info!("DNS service started");
        Ok(())
    }

    fn stop(&mut self) {
        let _ = self.quit.send(());
        info!("DNS service stopping");
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

struct Pipeline {
    client: Arc<dyn DnsClient>,
    pool: Arc<ResolverPool>,
    filter: WildcardFilter,
    output: mpsc::Sender<Request>,
    active: Arc<AtomicBool>,
}

impl Pipeline {
    async fn run(
        self: Arc<Self>,
        mut input: mpsc::Receiver<Request>,
        mut frequency: watch::Receiver<Duration>,
        mut quit: broadcast::Receiver<()>,
    ) {
        let mut queue: VecDeque<Request> = VecDeque::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut ticker = time::interval(*frequency.borrow_and_update());
        let mut idle_check = time::interval(IDLE_CHECK_INTERVAL);
        let mut draining = true;
        let mut watching = true;

        loop {
            tokio::select! {
                request = input.recv(), if draining => match request {
                    Some(request) => self.admit(request, &mut queue, &mut seen),
                    None => draining = false,
                },
                _ = ticker.tick() => {
                    if let Some(request) = queue.pop_front() {
                        // Bootstrap-only requests hold a dedup slot but are
                        // never resolved.
                        if !request.domain.is_empty() {
                            tokio::spawn(self.clone().resolve_request(request));
                        }
                    }
                }
                _ = idle_check.tick() => {
                    if queue.is_empty() {
                        self.active.store(false, Ordering::SeqCst);
                    }
                }
                changed = frequency.changed(), if watching => match changed {
                    Ok(()) => ticker = time::interval(*frequency.borrow_and_update()),
                    Err(_) => watching = false,
                },
                _ = quit.recv() => break,
            }
        }
    }

    fn admit(&self, mut request: Request, queue: &mut VecDeque<Request>, seen: &mut HashSet<String>) {
        request.name = normalise(&request.name);

        if request.name.is_empty() || !seen.insert(request.name.clone()) {
            return;
        }

        queue.push_back(request);
        self.active.store(true, Ordering::SeqCst);
    }

    async fn resolve_request(self: Arc<Self>, request: Request) {
        self.active.store(true, Ordering::SeqCst);

        let answers = match resolve(&*self.client, &request.name, self.pool.next()).await {
            Ok(answers) => answers,
            Err(err) => {
                debug!("failed to resolve {}: {:#}", request.name, err);
                return;
            }
        };

        let Some(address) = representative_address(&answers) else {
            return;
        };

        let matched = self
            .filter
            .matches(&request.name, &request.domain, address_set(&answers))
            .await;
        // Names backed by search-engine evidence are exempt from wildcard
        // suppression.
        if request.tag != Tag::Search && matched {
            debug!("discarding wildcard artefact {}", request.name);
            return;
        }

        for answer in &answers {
            if !in_scope(&answer.name, &request.domain) {
                continue;
            }

            let (tag, source) = if answer.name == request.name {
                (request.tag, request.source.clone())
            } else {
                (Tag::Dns, Tag::Dns.to_string())
            };

            self.send_out(Request {
                name: answer.name.clone(),
                domain: request.domain.clone(),
                address: Some(address),
                tag,
                source,
            })
            .await;
        }
    }

    async fn send_out(&self, mut request: Request) {
        request.name = normalise(&request.name);

        if self.output.send(request).await.is_ok() {
            self.active.store(true, Ordering::SeqCst);
        }
    }
}
