//! Bounded worker pool with fail-fast backpressure.
//!
//! A fixed set of tokio tasks drains one bounded queue. [`WorkerPool::submit`]
//! never waits for space: a full queue is reported as [`PoolError::QueueFull`]
//! and the caller decides how to back off. A job's own failure, including a
//! panic, is recorded in [`PoolStats`] and never reaches the pool machinery or
//! the other jobs.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::dedup::DedupCache;
use crate::error::PoolError;

/// A unit of work. Receives a token that is cancelled when the pool is
/// dropped without being closed.
pub type Job = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, anyhow::Result<()>> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_workers: usize,
    pub max_queue: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 5,
            max_queue: 100,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_workers == 0 {
            return Err(PoolError::InvalidConfig(
                "max_workers must be at least 1".into(),
            ));
        }
        if self.max_queue == 0 {
            return Err(PoolError::InvalidConfig(
                "max_queue must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Lifecycle of the pool. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PoolState {
    Open,
    Closing,
    Closed,
}

impl PoolState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PoolState::Open,
            1 => PoolState::Closing,
            _ => PoolState::Closed,
        }
    }
}

/// Counters since the pool was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Jobs accepted into the queue.
    pub submitted: u64,
    /// Jobs that returned `Ok`.
    pub completed: u64,
    /// Jobs that returned `Err` or panicked.
    pub failed: u64,
    /// Submissions refused with `QueueFull` or `PoolClosed`.
    pub rejected: u64,
}

#[derive(Default)]
struct Counters {
    active: AtomicUsize,
    /// Queued plus executing.
    pending: AtomicUsize,
    drained: Notify,
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
}

impl Counters {
    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.notify_waiters();
        }
    }
}

pub struct WorkerPool {
    config: PoolConfig,
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    counters: Arc<Counters>,
    workers: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
    state: AtomicU8,
    shutdown: CancellationToken,
    seen: DedupCache,
}

impl WorkerPool {
    /// Spawns `max_workers` worker tasks. Must be called inside a tokio runtime.
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;

        let (tx, rx) = mpsc::channel::<Job>(config.max_queue);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let counters = Arc::new(Counters::default());
        let shutdown = CancellationToken::new();

        let workers = (0..config.max_workers)
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    Arc::clone(&rx),
                    Arc::clone(&counters),
                    shutdown.clone(),
                ))
            })
            .collect();

        info!(
            max_workers = config.max_workers,
            max_queue = config.max_queue,
            "worker pool started"
        );

        Ok(Self {
            config,
            sender: Mutex::new(Some(tx)),
            counters,
            workers: tokio::sync::Mutex::new(workers),
            state: AtomicU8::new(0),
            shutdown,
            seen: DedupCache::new(),
        })
    }

    pub fn config(&self) -> PoolConfig {
        self.config
    }

    /// Enqueues `job` without blocking.
    pub fn submit<F, Fut>(&self, job: F) -> Result<(), PoolError>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.submit_boxed(Box::new(move |token| job(token).boxed()))
    }

    pub fn submit_boxed(&self, job: Job) -> Result<(), PoolError> {
        let sender = self.sender.lock().unwrap_or_else(|p| p.into_inner());
        let Some(tx) = sender.as_ref().filter(|_| self.state() == PoolState::Open) else {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            debug!("submit rejected: pool closed");
            return Err(PoolError::PoolClosed);
        };

        self.counters.pending.fetch_add(1, Ordering::SeqCst);
        match tx.try_send(job) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(err) => {
                self.counters.finish_one();
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                match err {
                    mpsc::error::TrySendError::Full(_) => {
                        warn!(queue_depth = self.config.max_queue, "submit rejected: queue full");
                        Err(PoolError::QueueFull)
                    }
                    mpsc::error::TrySendError::Closed(_) => Err(PoolError::PoolClosed),
                }
            }
        }
    }

    /// Waits until every accepted job has finished, or `cancel` fires.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<(), PoolError> {
        loop {
            let notified = self.counters.drained.notified();
            tokio::pin!(notified);
            // Register before checking so a completion in between is not lost.
            notified.as_mut().enable();

            if self.counters.pending.load(Ordering::SeqCst) == 0 {
                return Ok(());
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PoolError::Cancelled),
                _ = &mut notified => {}
            }
        }
    }

    /// Stops accepting work, drains the queue and joins every worker.
    /// Safe to call more than once.
    pub async fn close(&self) {
        if self
            .state
            .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let sender = self.sender.lock().unwrap_or_else(|p| p.into_inner()).take();
            drop(sender);
            info!(pending = self.counters.pending.load(Ordering::SeqCst), "worker pool closing");
        }

        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "worker task ended abnormally");
            }
        }
        if self.state.swap(2, Ordering::SeqCst) != 2 {
            info!(stats = ?self.stats(), "worker pool closed");
        }
    }

    pub fn state(&self) -> PoolState {
        PoolState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn active_workers(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }

    /// Jobs accepted but not yet picked up by a worker.
    pub fn queue_depth(&self) -> usize {
        let sender = self.sender.lock().unwrap_or_else(|p| p.into_inner());
        match sender.as_ref() {
            Some(tx) => tx.max_capacity() - tx.capacity(),
            None => self
                .counters
                .pending
                .load(Ordering::SeqCst)
                .saturating_sub(self.active_workers()),
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }

    /// Marks `key` in the pool's helper cache; `true` if it was new.
    pub fn mark_seen(&self, key: &str) -> bool {
        self.seen.mark_seen(key)
    }

    pub fn is_duplicate(&self, key: &str) -> bool {
        self.seen.is_duplicate(key)
    }

    pub fn clear_duplicate_cache(&self) {
        self.seen.clear();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn worker_loop(
    id: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
    counters: Arc<Counters>,
    shutdown: CancellationToken,
) {
    loop {
        let next = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        // Channel closed and drained.
        let Some(job) = next else { break };

        counters.active.fetch_add(1, Ordering::SeqCst);
        let token = shutdown.child_token();
        let outcome = AssertUnwindSafe(async move { job(token).await })
            .catch_unwind()
            .await;
        counters.active.fetch_sub(1, Ordering::SeqCst);

        match outcome {
            Ok(Ok(())) => {
                counters.completed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                debug!(worker = id, error = %e, "job failed");
            }
            Err(_) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(worker = id, "job panicked");
            }
        }
        counters.finish_one();
    }
    debug!(worker = id, "worker exiting");
}
