//! `Listener`: the per-chain worker.
//!
//! ```text
//! Created ──start()──► Started ──stop()──► Stopped
//! ```
//!
//! One listener watches one source chain's outbox. Its worker task waits on
//! a multiplexed `select!` over the stop signal, incoming logs, subscription
//! errors and (poll mode) its poll timer and manual poll requests. Each log is processed to completion
//! inside the select arm, so stopping never interrupts an event half-way.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use callrelay_core::error::{RegistryError, StoreError};
use callrelay_core::registry::{ChainProfile, TrustRegistry};
use callrelay_core::store::{CheckpointStore, RequestQueue};
use callrelay_core::types::{LogPosition, RawLog};
use callrelay_core::validator::{RequestValidator, TrustValidator};

use crate::decoder::{AbiDecoder, Decoder};
use crate::metrics::{ListenerMetrics, MetricsSnapshot};
use crate::pipeline::{Pipeline, ProcessError};
use crate::poll::{PollScheduler, PollTimer};
use crate::signature;
use crate::source::{EventSource, LogFilter, LogSubscription, RpcEventSource, SourceError, SourceMode};

#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub chain_id: u64,
    /// Delay between polls. Zero disables re-arming after the first poll.
    pub poll_interval: Duration,
    /// Upper bound on each range query.
    pub poll_timeout: Duration,
    /// First block to scan when the chain has no checkpoint yet.
    pub from_block: u64,
}

impl ListenerConfig {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            poll_interval: Duration::from_secs(3),
            poll_timeout: Duration::from_secs(10),
            from_block: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Created,
    Started,
    Stopped,
}

/// Why a listener could not be built. Fatal to that chain only.
#[derive(Debug, Error)]
pub enum ConstructionError {
    #[error(transparent)]
    UnknownChain(#[from] RegistryError),

    #[error("chain {chain_id} has no outbox address")]
    MissingOutbox { chain_id: u64 },

    #[error("chain {chain_id} has no RPC endpoint configured")]
    MissingEndpoint { chain_id: u64 },

    #[error("chain {chain_id}: connect failed: {source}")]
    Connect {
        chain_id: u64,
        #[source]
        source: SourceError,
    },
}

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error(transparent)]
    Construction(#[from] ConstructionError),

    #[error("event source setup failed: {0}")]
    Source(#[from] SourceError),

    #[error("checkpoint read failed: {0}")]
    Store(#[from] StoreError),

    #[error("cannot {op} a listener that is {state:?}")]
    InvalidState {
        op: &'static str,
        state: ListenerState,
    },
}

fn outbox_filter(profile: &ChainProfile) -> Result<LogFilter, ConstructionError> {
    let outbox = profile.outbox().ok_or(ConstructionError::MissingOutbox {
        chain_id: profile.chain_id,
    })?;
    Ok(LogFilter::new(outbox, signature::event_topic()))
}

pub struct Listener {
    config: ListenerConfig,
    filter: LogFilter,
    source: Arc<dyn EventSource>,
    pipeline: Arc<Pipeline>,
    checkpoints: Arc<dyn CheckpointStore>,
    metrics: Arc<ListenerMetrics>,
    cancel: CancellationToken,
    state: ListenerState,
    worker: Option<JoinHandle<()>>,
    scheduler: Option<PollScheduler>,
}

impl Listener {
    /// Resolve the chain profile, connect to its endpoint and build the pipeline.
    pub async fn connect(
        config: ListenerConfig,
        registry: Arc<TrustRegistry>,
        queue: Arc<dyn RequestQueue>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Result<Self, ListenerError> {
        let chain_id = config.chain_id;
        let profile = registry.lookup(chain_id).map_err(ConstructionError::from)?;
        outbox_filter(profile)?;
        if profile.rpc_url.is_empty() {
            return Err(ConstructionError::MissingEndpoint { chain_id }.into());
        }
        let source = RpcEventSource::connect(&profile.rpc_url)
            .await
            .map_err(|source| ConstructionError::Connect { chain_id, source })?;
        Self::with_source(config, registry, Arc::new(source), queue, checkpoints)
    }

    /// Build a listener over an existing event source.
    pub fn with_source(
        config: ListenerConfig,
        registry: Arc<TrustRegistry>,
        source: Arc<dyn EventSource>,
        queue: Arc<dyn RequestQueue>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Result<Self, ListenerError> {
        let profile = registry
            .lookup(config.chain_id)
            .map_err(ConstructionError::from)?;
        let filter = outbox_filter(profile)?;
        let validator =
            TrustValidator::new(registry.clone(), config.chain_id).map_err(ConstructionError::from)?;
        Ok(Self::from_parts(
            config,
            filter,
            source,
            Arc::new(AbiDecoder::new()),
            Arc::new(validator),
            queue,
            checkpoints,
        ))
    }

    /// Assemble a listener from explicit collaborators.
    pub fn from_parts(
        config: ListenerConfig,
        filter: LogFilter,
        source: Arc<dyn EventSource>,
        decoder: Arc<dyn Decoder>,
        validator: Arc<dyn RequestValidator>,
        queue: Arc<dyn RequestQueue>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        let metrics = Arc::new(ListenerMetrics::default());
        let pipeline = Pipeline::new(
            config.chain_id,
            decoder,
            validator,
            queue,
            checkpoints.clone(),
            metrics.clone(),
        );
        Self {
            config,
            filter,
            source,
            pipeline: Arc::new(pipeline),
            checkpoints,
            metrics,
            cancel: CancellationToken::new(),
            state: ListenerState::Created,
            worker: None,
            scheduler: None,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    pub fn mode(&self) -> SourceMode {
        self.source.mode()
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    pub fn filter(&self) -> &LogFilter {
        &self.filter
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Ask for an immediate poll. Dropped (returns `false`) if one is pending or
    /// executing, and always `false` outside a started poll-mode listener.
    pub fn request_poll(&self) -> bool {
        match (&self.scheduler, self.state) {
            (Some(scheduler), ListenerState::Started) => scheduler.request(),
            _ => false,
        }
    }

    /// Wire the event source and spawn the worker. Returns once the
    /// subscription is open (push) or the first poll is requested (poll).
    pub async fn start(&mut self) -> Result<(), ListenerError> {
        if self.state != ListenerState::Created {
            return Err(ListenerError::InvalidState {
                op: "start",
                state: self.state,
            });
        }

        let chain_id = self.config.chain_id;
        let checkpoint = self.checkpoints.read_checkpoint(chain_id).await?;
        let next_block = if checkpoint > 0 {
            checkpoint + 1
        } else {
            self.config.from_block
        };

        let worker = Worker {
            chain_id,
            filter: self.filter,
            source: self.source.clone(),
            pipeline: self.pipeline.clone(),
            metrics: self.metrics.clone(),
            cancel: self.cancel.clone(),
            poll_interval: self.config.poll_interval,
            poll_timeout: self.config.poll_timeout,
        };

        let mode = self.source.mode();
        let handle = match mode {
            SourceMode::Push => {
                let sub = self.source.subscribe(&self.filter).await?;
                let catch_up = (next_block > 0).then_some(next_block);
                tokio::spawn(worker.run_push(sub, catch_up))
            }
            SourceMode::Poll => {
                let (scheduler, requests) = PollScheduler::new(self.metrics.clone());
                scheduler.request();
                self.scheduler = Some(scheduler.clone());
                tokio::spawn(worker.run_poll(scheduler, requests, next_block))
            }
        };

        info!(
            chain_id,
            %mode,
            outbox = %self.filter.address,
            checkpoint,
            next_block,
            "listener started"
        );
        self.worker = Some(handle);
        self.state = ListenerState::Started;
        Ok(())
    }

    /// Signal cancellation and wait for the worker to exit.
    ///
    /// An event already being processed finishes first. A second call fails
    /// with `InvalidState`.
    pub async fn stop(&mut self) -> Result<(), ListenerError> {
        match self.state {
            ListenerState::Stopped => {
                return Err(ListenerError::InvalidState {
                    op: "stop",
                    state: self.state,
                })
            }
            ListenerState::Created | ListenerState::Started => {}
        }

        self.state = ListenerState::Stopped;
        self.cancel.cancel();
        if let Some(handle) = self.worker.take() {
            if let Err(e) = handle.await {
                error!(chain_id = self.config.chain_id, error = %e, "listener worker panicked");
            }
        }
        info!(chain_id = self.config.chain_id, "listener stopped");
        Ok(())
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ─── Worker ──────────────────────────────────────────────────────────────────

struct Worker {
    chain_id: u64,
    filter: LogFilter,
    source: Arc<dyn EventSource>,
    pipeline: Arc<Pipeline>,
    metrics: Arc<ListenerMetrics>,
    cancel: CancellationToken,
    poll_interval: Duration,
    poll_timeout: Duration,
}

impl Worker {
    /// Bounded range query, sorted into processing order.
    async fn fetch(&self, from_block: u64) -> Result<Vec<RawLog>, SourceError> {
        let query = self.source.logs_since(&self.filter, from_block);
        let mut logs = tokio::time::timeout(self.poll_timeout, query)
            .await
            .map_err(|_| SourceError::Timeout {
                ms: self.poll_timeout.as_millis() as u64,
            })??;
        logs.sort_by_key(RawLog::position);
        Ok(logs)
    }

    fn skip(&self, log: &RawLog, reason: &'static str) {
        ListenerMetrics::incr(&self.metrics.logs_skipped);
        debug!(chain_id = self.chain_id, position = %log.position(), reason, "log skipped");
    }

    /// Push mode has no cursor to hold back, so every outcome moves on to the
    /// next log. The pipeline has already logged and counted failures.
    async fn process_live(&self, log: &RawLog) {
        if let Err(ProcessError::Store(_)) = self.pipeline.process(log).await {
            debug!(chain_id = self.chain_id, position = %log.position(), "store failure not retried in push mode");
        }
    }

    async fn run_push(self, mut sub: LogSubscription, catch_up_from: Option<u64>) {
        let mut last: Option<LogPosition> = None;

        if let Some(from_block) = catch_up_from {
            match self.fetch(from_block).await {
                Ok(logs) => {
                    info!(chain_id = self.chain_id, from_block, count = logs.len(), "catching up");
                    for log in logs {
                        if self.cancel.is_cancelled() {
                            break;
                        }
                        if log.removed || log.block_number < from_block {
                            self.skip(&log, "outside catch-up range");
                            continue;
                        }
                        self.process_live(&log).await;
                        last = last.max(Some(log.position()));
                    }
                }
                Err(e) => {
                    ListenerMetrics::incr(&self.metrics.subscription_errors);
                    warn!(chain_id = self.chain_id, from_block, error = %e, "catch-up query failed, following live logs only");
                }
            }
        }

        let mut errors_open = true;
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                log = sub.logs.recv() => match log {
                    Some(log) => {
                        if log.removed {
                            self.skip(&log, "removed by reorg");
                        } else if last.is_some_and(|p| log.position() <= p) {
                            self.skip(&log, "already processed");
                        } else {
                            self.process_live(&log).await;
                            last = last.max(Some(log.position()));
                        }
                    }
                    None => {
                        warn!(chain_id = self.chain_id, "log stream ended, waiting for stop");
                        self.cancel.cancelled().await;
                        break;
                    }
                },
                err = sub.errors.recv(), if errors_open => match err {
                    Some(e) => {
                        ListenerMetrics::incr(&self.metrics.subscription_errors);
                        warn!(chain_id = self.chain_id, error = %e, "subscription error");
                    }
                    None => errors_open = false,
                },
            }
        }

        if let Err(e) = self.source.unsubscribe(sub.id).await {
            warn!(chain_id = self.chain_id, error = %e, "unsubscribe failed");
        }
        debug!(chain_id = self.chain_id, "push worker exited");
    }

    async fn run_poll(
        self,
        scheduler: PollScheduler,
        mut requests: mpsc::Receiver<()>,
        mut next_block: u64,
    ) {
        let mut timer = PollTimer::new(self.poll_interval, self.metrics.clone());
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = timer.fired() => {
                    if requests.try_recv().is_ok() {
                        debug!(chain_id = self.chain_id, "poll request merged into timer tick");
                    }
                }
                req = requests.recv() => {
                    if req.is_none() {
                        break;
                    }
                }
            }
            let guard = scheduler.begin();
            next_block = self.poll_once(next_block).await;
            drop(guard);
            timer.arm();
        }
        debug!(chain_id = self.chain_id, next_block, "poll worker exited");
    }

    /// One poll from `next_block`. Returns the block the following poll starts at.
    ///
    /// The cursor moves past every block that was fully handled. A store
    /// failure pins it at the failing block so the event is fetched again.
    async fn poll_once(&self, next_block: u64) -> u64 {
        ListenerMetrics::incr(&self.metrics.polls_started);
        let logs = match self.fetch(next_block).await {
            Ok(logs) => logs,
            Err(e) => {
                ListenerMetrics::incr(&self.metrics.polls_failed);
                warn!(chain_id = self.chain_id, from_block = next_block, error = %e, "poll failed");
                return next_block;
            }
        };
        debug!(chain_id = self.chain_id, from_block = next_block, count = logs.len(), "poll returned");

        let mut cursor = next_block;
        for log in logs {
            if self.cancel.is_cancelled() {
                break;
            }
            if log.removed || log.block_number < next_block {
                self.skip(&log, "outside poll range");
                continue;
            }
            match self.pipeline.process(&log).await {
                Err(ProcessError::Store(_)) => return log.block_number,
                _ => cursor = cursor.max(log.block_number + 1),
            }
        }
        cursor
    }
}
