//! Deduplicated background-population job queue.
//!
//! Job identity is the pointer-record key the job will populate. The
//! cross-process dedup latch is a registry counter at `jobs:pending:{id}`:
//! the first `incr` returns 1 and wins, later ones see a higher count and
//! drop the job silently, guaranteeing at most one in-flight population per
//! key. The latch carries a lease TTL so a crashed worker's claim expires
//! on its own. Workers drain a bounded channel and run the populate routine
//! with bounded retries; a job that exhausts its attempts is dropped and
//! the key reverts to absent (the next read re-triggers it).

use crate::error::{DeliveryError, DeliveryResult};
use crate::fetch::{Credentials, FetchSpec};
use crate::populate::Populator;
use glossa_core::KeyParts;
use glossa_core::config::DeliveryConfig;
use glossa_registry::RegistryStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;

/// One unit of population work; `id()` doubles as the dedup key.
#[derive(Clone, Debug)]
pub struct PopulationJob {
    pub key: KeyParts,
    pub spec: FetchSpec,
    pub credentials: Credentials,
}

impl PopulationJob {
    /// Derive the default job for a key: fetch its language content.
    pub fn for_key(key: &KeyParts, credentials: &Credentials) -> Self {
        Self {
            key: key.clone(),
            spec: FetchSpec::language_content(key),
            credentials: credentials.clone(),
        }
    }

    pub fn id(&self) -> String {
        self.key.record_key()
    }
}

/// Queue depth snapshot for observability.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub waiting: u64,
    pub active: u64,
    pub delayed: u64,
}

pub(crate) fn latch_key(id: &str) -> String {
    format!("jobs:pending:{id}")
}

#[derive(Default)]
struct Counters {
    waiting: AtomicU64,
    active: AtomicU64,
    delayed: AtomicU64,
}

/// Deduplicated population queue with an in-process worker pool.
pub struct PopulationQueue {
    registry: Arc<dyn RegistryStore>,
    tx: mpsc::Sender<PopulationJob>,
    counters: Arc<Counters>,
    lease: Duration,
    shutdown_tx: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl PopulationQueue {
    pub(crate) fn new(
        registry: Arc<dyn RegistryStore>,
        populator: Arc<Populator>,
        config: &DeliveryConfig,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));
        let (shutdown_tx, _) = watch::channel(false);
        let counters = Arc::new(Counters::default());

        let mut workers = Vec::with_capacity(config.workers);
        for worker_id in 0..config.workers {
            workers.push(tokio::spawn(worker_loop(
                worker_id,
                rx.clone(),
                registry.clone(),
                populator.clone(),
                counters.clone(),
                config.clone(),
                shutdown_tx.subscribe(),
            )));
        }

        Arc::new(Self {
            registry,
            tx,
            counters,
            lease: config.job_lease(),
            shutdown_tx,
            workers: Mutex::new(workers),
        })
    }

    /// Enqueue a job unless one with the same id is already queued or
    /// running. Returns whether the job was accepted.
    pub async fn enqueue(&self, job: PopulationJob) -> DeliveryResult<bool> {
        if *self.shutdown_tx.borrow() {
            return Err(DeliveryError::QueueClosed);
        }

        let id = job.id();
        let latch = latch_key(&id);
        let holders = self.registry.incr(&latch, 1, Some(self.lease)).await?;
        if holders > 1 {
            tracing::debug!(key = %id, "population already in flight, dropping duplicate");
            return Ok(false);
        }

        self.counters.waiting.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(job).await.is_err() {
            self.counters.waiting.fetch_sub(1, Ordering::Relaxed);
            let _ = self.registry.del(&latch).await;
            return Err(DeliveryError::QueueClosed);
        }
        Ok(true)
    }

    /// Whether a job with this id is queued or running.
    pub async fn has(&self, id: &str) -> DeliveryResult<bool> {
        Ok(self.registry.get(&latch_key(id)).await?.is_some())
    }

    /// Process-local depth counters.
    pub fn counts(&self) -> QueueCounts {
        QueueCounts {
            waiting: self.counters.waiting.load(Ordering::Relaxed),
            active: self.counters.active.load(Ordering::Relaxed),
            delayed: self.counters.delayed.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting jobs and wait for workers to exit.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            if let Err(err) = handle.await {
                tracing::error!(error = ?err, "population worker failed");
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<PopulationJob>>>,
    registry: Arc<dyn RegistryStore>,
    populator: Arc<Populator>,
    counters: Arc<Counters>,
    config: DeliveryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let job = tokio::select! {
            job = async { rx.lock().await.recv().await } => job,
            _ = shutdown_rx.changed() => break,
        };
        let Some(job) = job else { break };

        counters.waiting.fetch_sub(1, Ordering::Relaxed);
        counters.active.fetch_add(1, Ordering::Relaxed);

        let id = job.id();
        run_job(&populator, &counters, &config, &job).await;

        counters.active.fetch_sub(1, Ordering::Relaxed);

        // Release the dedup latch whatever the outcome; a completed key is
        // re-populatable and a dropped key must revert to triggerable.
        if let Err(err) = registry.del(&latch_key(&id)).await {
            tracing::warn!(worker_id, key = %id, error = %err, "failed to release job latch");
        }
    }
    tracing::debug!(worker_id, "population worker stopped");
}

/// Run a job with bounded retries. Cached outcomes (success or upstream
/// client error) terminate the job; anything else retries up to the
/// configured attempt count and is then dropped silently.
async fn run_job(
    populator: &Populator,
    counters: &Counters,
    config: &DeliveryConfig,
    job: &PopulationJob,
) {
    let id = job.id();
    let mut attempt = 1u32;
    loop {
        match populator.run(&job.key, &job.spec, &job.credentials).await {
            Ok(record) => {
                tracing::debug!(key = %id, status = ?record.status, attempt, "population complete");
                return;
            }
            Err(err) if attempt < config.job_attempts => {
                tracing::warn!(key = %id, attempt, error = %err, "population attempt failed, retrying");
                counters.delayed.fetch_add(1, Ordering::Relaxed);
                tokio::time::sleep(config.job_retry_delay()).await;
                counters.delayed.fetch_sub(1, Ordering::Relaxed);
                attempt += 1;
            }
            Err(err) => {
                tracing::warn!(key = %id, attempts = attempt, error = %err, "population failed, dropping job");
                return;
            }
        }
    }
}
