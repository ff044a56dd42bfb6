//! Dual-backend registry: durable store accelerated by an in-process cache.
//!
//! The durable store is authoritative; the fast store is a cache of it and
//! may be momentarily stale, never wrong for longer than one reconciliation
//! interval. Reads that hit the accelerator report the key (and the value
//! snapshot they observed) to a background reconciler over a channel; each
//! tick the reconciler re-reads the durable store for every touched key and
//! refreshes or drops the fast copy when the snapshot no longer matches.
//! This keeps the read path at a single store call.
//!
//! Writes go to both stores, except for keys under a configured list of
//! high-volume prefixes, which bypass the accelerator entirely. Set records
//! are walk-path data and live only in the durable store.

use crate::error::RegistryResult;
use crate::traits::RegistryStore;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::instrument;

struct Touched {
    key: String,
    snapshot: Value,
}

/// Hybrid durable+accelerator registry store.
pub struct HybridBackend {
    durable: Arc<dyn RegistryStore>,
    fast: Arc<dyn RegistryStore>,
    write_skip: Vec<String>,
    touched_tx: mpsc::UnboundedSender<Touched>,
    shutdown_tx: watch::Sender<bool>,
    reconciler: Mutex<Option<JoinHandle<()>>>,
}

impl HybridBackend {
    /// Build the hybrid store and start its reconciler.
    pub fn new(
        durable: Arc<dyn RegistryStore>,
        fast: Arc<dyn RegistryStore>,
        reconcile_interval: Duration,
        write_skip: Vec<String>,
    ) -> Arc<Self> {
        let (touched_tx, touched_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let interval = if reconcile_interval.is_zero() {
            tracing::warn!("reconcile interval is zero, using 1s");
            Duration::from_secs(1)
        } else {
            reconcile_interval
        };

        let handle = tokio::spawn(reconcile_loop(
            durable.clone(),
            fast.clone(),
            touched_rx,
            shutdown_rx,
            interval,
        ));

        Arc::new(Self {
            durable,
            fast,
            write_skip,
            touched_tx,
            shutdown_tx,
            reconciler: Mutex::new(Some(handle)),
        })
    }

    /// Stop the background reconciler. Store operations keep working, with
    /// the accelerator no longer converging.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.reconciler.lock().await.take() {
            if let Err(err) = handle.await {
                tracing::error!(error = ?err, "reconciler task failed");
            }
        }
    }

    fn skips_fast(&self, key: &str) -> bool {
        self.write_skip.iter().any(|prefix| key.starts_with(prefix))
    }

    async fn drop_fast_copy(&self, key: &str) {
        if let Err(err) = self.fast.del(key).await {
            tracing::warn!(key, error = %err, "failed to drop accelerator copy");
        }
    }
}

async fn reconcile_loop(
    durable: Arc<dyn RegistryStore>,
    fast: Arc<dyn RegistryStore>,
    mut touched_rx: mpsc::UnboundedReceiver<Touched>,
    mut shutdown_rx: watch::Receiver<bool>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await; // immediate first tick

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                reconcile_touched(&durable, &fast, &mut touched_rx).await;
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::debug!("reconciler stopping");
                    break;
                }
            }
        }
    }
}

/// Drain the touched-key channel and converge the fast store on the
/// durable state for every key read since the last tick.
async fn reconcile_touched(
    durable: &Arc<dyn RegistryStore>,
    fast: &Arc<dyn RegistryStore>,
    touched_rx: &mut mpsc::UnboundedReceiver<Touched>,
) {
    let mut touched: HashMap<String, Value> = HashMap::new();
    while let Ok(t) = touched_rx.try_recv() {
        // Later observations win; one re-read per key per tick.
        touched.insert(t.key, t.snapshot);
    }
    if touched.is_empty() {
        return;
    }

    tracing::debug!(keys = touched.len(), "reconciling touched keys");
    for (key, snapshot) in touched {
        match durable.get(&key).await {
            Ok(None) => {
                if let Err(err) = fast.del(&key).await {
                    tracing::warn!(key, error = %err, "reconcile delete failed");
                }
            }
            Ok(Some(value)) if value != snapshot => {
                let ttl = match durable.ttl_remaining(&key).await {
                    Ok(ttl) => ttl,
                    Err(err) => {
                        tracing::warn!(key, error = %err, "reconcile ttl lookup failed");
                        continue;
                    }
                };
                if let Err(err) = fast.set(&key, value, ttl).await {
                    tracing::warn!(key, error = %err, "reconcile refresh failed");
                }
            }
            Ok(Some(_)) => {}
            Err(err) => {
                tracing::warn!(key, error = %err, "reconcile read failed");
            }
        }
    }
}

#[async_trait]
impl RegistryStore for HybridBackend {
    #[instrument(skip(self), fields(backend = "hybrid"))]
    async fn get(&self, key: &str) -> RegistryResult<Option<Value>> {
        if let Some(value) = self.fast.get(key).await? {
            // Remember what we served; the reconciler re-checks it upstream.
            let _ = self.touched_tx.send(Touched {
                key: key.to_string(),
                snapshot: value.clone(),
            });
            return Ok(Some(value));
        }

        match self.durable.get(key).await? {
            Some(value) => {
                if !self.skips_fast(key) {
                    let ttl = self.durable.ttl_remaining(key).await?;
                    if let Err(err) = self.fast.set(key, value.clone(), ttl).await {
                        tracing::warn!(key, error = %err, "accelerator backfill failed");
                    }
                }
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self, value), fields(backend = "hybrid"))]
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> RegistryResult<()> {
        self.durable.set(key, value.clone(), ttl).await?;
        if !self.skips_fast(key) {
            if let Err(err) = self.fast.set(key, value, ttl).await {
                tracing::warn!(key, error = %err, "accelerator write failed, dropping copy");
                self.drop_fast_copy(key).await;
            }
        }
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "hybrid"))]
    async fn del(&self, key: &str) -> RegistryResult<()> {
        self.durable.del(key).await?;
        if !self.skips_fast(key) {
            self.fast.del(key).await?;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "hybrid"))]
    async fn find(&self, pattern: &str) -> RegistryResult<Vec<String>> {
        self.durable.find(pattern).await
    }

    #[instrument(skip(self), fields(backend = "hybrid"))]
    async fn incr(&self, key: &str, delta: i64, ttl: Option<Duration>) -> RegistryResult<i64> {
        let next = self.durable.incr(key, delta, ttl).await?;
        if !self.skips_fast(key) {
            let remaining = self.durable.ttl_remaining(key).await?;
            if let Err(err) = self.fast.set(key, Value::from(next), remaining).await {
                tracing::warn!(key, error = %err, "accelerator counter write failed");
                self.drop_fast_copy(key).await;
            }
        }
        Ok(next)
    }

    #[instrument(skip(self), fields(backend = "hybrid"))]
    async fn add_to_set(
        &self,
        key: &str,
        member: &str,
        ttl: Option<Duration>,
    ) -> RegistryResult<bool> {
        self.durable.add_to_set(key, member, ttl).await
    }

    #[instrument(skip(self), fields(backend = "hybrid"))]
    async fn list_set(&self, key: &str) -> RegistryResult<Vec<String>> {
        self.durable.list_set(key).await
    }

    #[instrument(skip(self), fields(backend = "hybrid"))]
    async fn del_from_set(&self, key: &str, member: &str) -> RegistryResult<()> {
        self.durable.del_from_set(key, member).await
    }

    #[instrument(skip(self), fields(backend = "hybrid"))]
    async fn ttl_remaining(&self, key: &str) -> RegistryResult<Option<Duration>> {
        self.durable.ttl_remaining(key).await
    }

    async fn reap_expired(&self) -> RegistryResult<u64> {
        self.durable.reap_expired().await
    }

    fn backend_name(&self) -> &'static str {
        "hybrid"
    }

    async fn health_check(&self) -> RegistryResult<()> {
        self.durable.health_check().await?;
        self.fast.health_check().await
    }
}
