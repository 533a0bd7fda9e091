//! Delivery of events to a view, one key at a time.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};

use common::{EventId, InstanceKey};
use futures_core::Stream;
use futures_util::StreamExt;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::{Mutex, mpsc};
use tokio::task::{JoinError, JoinSet};
use view::{UpdateEngine, UpdateOutcome, ViewDefinition, ViewEvent, ViewState};

use crate::config::{ErrorPolicy, RuntimeConfig};
use crate::error::{Result, RuntimeError};
use crate::store::ViewStore;

type KeyLocks = std::sync::Mutex<HashMap<InstanceKey, Arc<Mutex<()>>>>;

/// A single event that could not be folded.
#[derive(Debug)]
pub struct EventFailure {
    pub event_id: EventId,
    pub key: InstanceKey,
    pub method: String,
    pub error: RuntimeError,
}

/// Outcome of a [`ViewProcessor::run`].
#[derive(Debug, Default)]
pub struct RunReport {
    /// Events whose fold completed (updated or not).
    pub processed: u64,
    /// Events that produced a new state.
    pub updated: u64,
    /// Events whose handler returned no update.
    pub unchanged: u64,
    /// Events that failed.
    pub failures: Vec<EventFailure>,
    /// Events never delivered because their key was halted.
    pub dropped: u64,
    /// Keys that stopped receiving events.
    pub halted_keys: Vec<InstanceKey>,
    /// Key workers started, counting restarts after a worker went idle.
    pub workers_started: u64,
    /// Most key workers alive at the same time.
    pub peak_workers: usize,
}

impl RunReport {
    fn merge(&mut self, other: RunReport) {
        self.processed += other.processed;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.failures.extend(other.failures);
        self.dropped += other.dropped;
        self.halted_keys.extend(other.halted_keys);
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.dropped == 0
    }
}

/// Feeds events to one view and persists the results.
///
/// Events for the same key are folded strictly in delivery order: each fold
/// completes, and its state is stored, before the next event for that key
/// is handed to the engine. Distinct keys proceed independently.
pub struct ViewProcessor<S: ViewStore> {
    view_id: String,
    engine: UpdateEngine,
    store: S,
    config: RuntimeConfig,
    key_locks: KeyLocks,
}

/// Drops a key's lock from the map once no other caller holds it. Runs on
/// completion and on cancellation alike.
struct KeyLockRelease<'a> {
    locks: &'a KeyLocks,
    key: &'a InstanceKey,
    lock: Arc<Mutex<()>>,
}

impl Drop for KeyLockRelease<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // The map and this guard hold the only references: nobody is waiting.
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(self.key);
        }
    }
}

impl<S: ViewStore> ViewProcessor<S> {
    /// Creates a processor with the default configuration.
    pub fn new(definition: &ViewDefinition, store: S) -> Self {
        Self::with_config(definition, store, RuntimeConfig::default())
    }

    pub fn with_config(definition: &ViewDefinition, store: S, config: RuntimeConfig) -> Self {
        Self {
            view_id: definition.id().to_string(),
            engine: definition.engine(),
            store,
            config,
            key_locks: KeyLocks::default(),
        }
    }

    pub fn view_id(&self) -> &str {
        &self.view_id
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Current state of a key.
    pub async fn state(&self, key: &InstanceKey) -> Result<Option<ViewState>> {
        Ok(self.store.load(&self.view_id, key).await?)
    }

    /// All states of the view, ordered by key.
    pub async fn states(&self) -> Result<Vec<(InstanceKey, ViewState)>> {
        Ok(self.store.list(&self.view_id).await?)
    }

    fn key_lock<'a>(&'a self, key: &'a InstanceKey) -> KeyLockRelease<'a> {
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        KeyLockRelease {
            locks: &self.key_locks,
            key,
            lock: Arc::clone(locks.entry(key.clone()).or_default()),
        }
    }

    /// Folds one event into the stored state of its key.
    ///
    /// Concurrent calls for the same key are serialized. State is saved only
    /// when the fold returns `Updated`; dropping this future before it
    /// completes leaves the store untouched.
    #[tracing::instrument(skip(self, event), fields(view_id = %self.view_id, key = %event.instance_key, method = %event.method))]
    pub async fn process(&self, event: &ViewEvent) -> Result<UpdateOutcome<ViewState>> {
        let release = self.key_lock(&event.instance_key);
        let _guard = release.lock.lock().await;
        self.fold_and_store(event).await
    }

    async fn fold_and_store(&self, event: &ViewEvent) -> Result<UpdateOutcome<ViewState>> {
        let previous = self.store.load(&self.view_id, &event.instance_key).await?;
        let outcome = self.engine.handle(event, previous).await?;
        if let UpdateOutcome::Updated(state) = &outcome {
            self.store
                .save(&self.view_id, &event.instance_key, state.clone())
                .await?;
        }
        metrics::counter!("view_events_processed", "view" => self.view_id.clone()).increment(1);
        Ok(outcome)
    }
}

/// Live worker of one key during a run.
struct KeyWorker {
    generation: u64,
    tx: mpsc::Sender<ViewEvent>,
    /// Set by the worker before it stops accepting events for a halted key.
    halted: Arc<AtomicBool>,
    /// Held by a worker for its whole life, so a replacement started while
    /// its predecessor drains waits its turn.
    turn: Arc<Mutex<()>>,
}

struct WorkerExit {
    key: InstanceKey,
    generation: u64,
    report: RunReport,
}

/// Key workers of one run.
#[derive(Default)]
struct Workers {
    live: HashMap<InstanceKey, KeyWorker>,
    halted: HashSet<InstanceKey>,
    tasks: JoinSet<WorkerExit>,
    next_generation: u64,
}

impl<S: ViewStore + 'static> ViewProcessor<S> {
    /// Consumes an event stream until it ends.
    ///
    /// Each key gets its own worker task fed through a bounded channel, so
    /// keys run in parallel while each key's events stay in stream order.
    /// A worker that sees no event for
    /// [`worker_idle_timeout`](RuntimeConfig::worker_idle_timeout) retires,
    /// and a later event for its key starts a new one. Failures are collected
    /// in the report; the configured [`ErrorPolicy`] decides whether a key
    /// keeps receiving events after a handler failure. Unhandled events
    /// always halt their key.
    #[tracing::instrument(skip(self, events), fields(view_id = %self.view_id))]
    pub async fn run<St>(self: Arc<Self>, mut events: St) -> RunReport
    where
        St: Stream<Item = ViewEvent> + Unpin,
    {
        let mut workers = Workers::default();
        let mut report = RunReport::default();

        loop {
            tokio::select! {
                Some(joined) = workers.tasks.join_next(), if !workers.tasks.is_empty() => {
                    workers.finish(joined, &mut report);
                }
                next = events.next() => match next {
                    Some(event) => self.dispatch(&mut workers, &mut report, event).await,
                    None => break,
                },
            }
        }

        workers.live.clear();
        while let Some(joined) = workers.tasks.join_next().await {
            workers.finish(joined, &mut report);
        }

        tracing::info!(
            processed = report.processed,
            updated = report.updated,
            failures = report.failures.len(),
            dropped = report.dropped,
            workers = report.workers_started,
            "run complete"
        );
        report
    }

    async fn dispatch(self: &Arc<Self>, workers: &mut Workers, report: &mut RunReport, event: ViewEvent) {
        let key = event.instance_key.clone();
        if workers.halted.contains(&key) {
            report.dropped += 1;
            return;
        }

        let event = match workers.live.get(&key) {
            Some(worker) => match worker.tx.send(event).await {
                Ok(()) => return,
                Err(SendError(_)) if worker.halted.load(Ordering::Acquire) => {
                    report.dropped += 1;
                    return;
                }
                // The worker went idle and retired.
                Err(SendError(event)) => event,
            },
            None => event,
        };

        let (halted, turn) = workers
            .live
            .remove(&key)
            .map(|w| (w.halted, w.turn))
            .unwrap_or_default();
        let generation = workers.next_generation;
        workers.next_generation += 1;

        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        workers.tasks.spawn(Arc::clone(self).drain_key(
            key.clone(),
            generation,
            rx,
            Arc::clone(&halted),
            Arc::clone(&turn),
        ));
        report.workers_started += 1;

        // A worker only closes its queue after waiting a full idle period.
        if tx.send(event).await.is_err() {
            report.dropped += 1;
        }
        workers.live.insert(
            key,
            KeyWorker {
                generation,
                tx,
                halted,
                turn,
            },
        );
        report.peak_workers = report.peak_workers.max(workers.live.len());
    }

    async fn drain_key(
        self: Arc<Self>,
        key: InstanceKey,
        generation: u64,
        mut rx: mpsc::Receiver<ViewEvent>,
        halted: Arc<AtomicBool>,
        turn: Arc<Mutex<()>>,
    ) -> WorkerExit {
        let _turn = turn.lock_owned().await;
        let mut report = RunReport::default();
        let mut retiring = false;

        // A predecessor halted the key while this worker waited its turn.
        if halted.load(Ordering::Acquire) {
            report.dropped += discard(&mut rx).await;
            return WorkerExit {
                key,
                generation,
                report,
            };
        }

        loop {
            let next = if retiring {
                rx.recv().await
            } else {
                match tokio::time::timeout(self.config.worker_idle_timeout, rx.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        tracing::debug!(%key, "key worker idle, retiring");
                        // Events that raced in before the close are still folded.
                        rx.close();
                        retiring = true;
                        continue;
                    }
                }
            };
            let Some(event) = next else { break };

            match self.process(&event).await {
                Ok(UpdateOutcome::Updated(_)) => {
                    report.processed += 1;
                    report.updated += 1;
                }
                Ok(UpdateOutcome::NoUpdate) => {
                    report.processed += 1;
                    report.unchanged += 1;
                }
                Err(error) => {
                    let halt = error.is_fatal_for_key()
                        || self.config.error_policy == ErrorPolicy::HaltKey;
                    tracing::warn!(%key, error = %error, halt, "event failed");
                    report.failures.push(EventFailure {
                        event_id: event.event_id,
                        key: key.clone(),
                        method: event.method,
                        error,
                    });
                    if halt {
                        halted.store(true, Ordering::Release);
                        report.dropped += discard(&mut rx).await;
                        report.halted_keys.push(key.clone());
                        break;
                    }
                }
            }
        }

        WorkerExit {
            key,
            generation,
            report,
        }
    }
}

/// Closes the queue and counts what was still buffered.
async fn discard(rx: &mut mpsc::Receiver<ViewEvent>) -> u64 {
    rx.close();
    let mut dropped = 0;
    while rx.recv().await.is_some() {
        dropped += 1;
    }
    dropped
}

impl Workers {
    fn finish(&mut self, joined: std::result::Result<WorkerExit, JoinError>, report: &mut RunReport) {
        let exit = match joined {
            Ok(exit) => exit,
            Err(err) => {
                tracing::error!(error = %err, "key worker aborted");
                return;
            }
        };
        if !exit.report.halted_keys.is_empty() {
            self.halted.insert(exit.key.clone());
        }
        // A newer worker for the key may already have replaced this one.
        if self
            .live
            .get(&exit.key)
            .is_some_and(|w| w.generation == exit.generation)
        {
            self.live.remove(&exit.key);
        }
        report.merge(exit.report);
    }
}
