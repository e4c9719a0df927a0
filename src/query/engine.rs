//! Serial reconciliation worker
//!
//! One worker task per document source. Source signals are queued on an
//! unbounded channel and handled strictly in arrival order; the previous
//! snapshot lives inside the worker and only leaves it as an immutable
//! `Arc<ResultSet>`.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::edit::{self, EditOperation};
use super::filter::{AllowList, ExtensionFilter};
use super::local;
use super::reconcile::{self, ChangeBatch, Changes, DiffPolicy, Reconciliation};
use crate::state::document::RawItem;
use crate::state::results::ResultSet;

/// Where the engine currently gets its documents from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceMode {
    /// The external indexing source pushes batches
    Remote,
    /// The engine scans a local directory
    Local,
}

/// What subscribers receive after each effective batch
#[derive(Debug, Clone)]
pub struct QueryUpdate {
    pub results: Arc<ResultSet>,
    pub edits: Vec<EditOperation>,
}

impl QueryUpdate {
    pub fn is_reload(&self) -> bool {
        edit::is_reload(&self.edits)
    }
}

/// Engine settings fixed at spawn time
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub policy: DiffPolicy,
    /// Directory scanned in local mode
    pub local_directory: PathBuf,
    pub initial_mode: SourceMode,
}

/// Source signals that go through the ordered queue
#[derive(Debug)]
enum Batch {
    InitialGather(Vec<RawItem>),
    ItemsChanged(ChangeBatch),
    SourceUnavailable(String),
    RescanLocal,
}

#[derive(Debug)]
enum Command {
    Batch(Batch),
    Pause,
    Resume,
    Subscribe(mpsc::UnboundedSender<QueryUpdate>),
}

/// Handle to a running reconciliation worker.
///
/// Every method only enqueues; the worker applies signals one at a time, in
/// the order they were sent.
pub struct QueryEngine {
    commands: mpsc::UnboundedSender<Command>,
    mode: watch::Receiver<SourceMode>,
    worker: JoinHandle<()>,
}

impl QueryEngine {
    /// Start a worker on the current tokio runtime.
    ///
    /// In local mode the directory is scanned right away.
    pub fn spawn(config: EngineConfig, allow_list: Arc<dyn AllowList>) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let (mode_tx, mode) = watch::channel(config.initial_mode);

        if config.initial_mode == SourceMode::Local {
            // Cannot fail: the receiver is still alive
            let _ = commands.send(Command::Batch(Batch::RescanLocal));
        }

        let worker = Worker {
            allow_list,
            policy: config.policy,
            local_directory: config.local_directory,
            mode: mode_tx,
            previous: None,
            subscribers: Vec::new(),
            paused: false,
            backlog: VecDeque::new(),
        };
        let worker = tokio::spawn(worker.run(receiver));

        Self {
            commands,
            mode,
            worker,
        }
    }

    /// The source finished its initial gather; `items` is the full result set
    pub fn initial_gather_complete(&self, items: Vec<RawItem>) {
        self.send(Command::Batch(Batch::InitialGather(items)));
    }

    /// The source reported an incremental change
    pub fn items_changed(&self, changed: Vec<RawItem>, removed: Vec<RawItem>, added: Vec<RawItem>) {
        self.send(Command::Batch(Batch::ItemsChanged(ChangeBatch {
            changed,
            removed,
            added,
        })));
    }

    /// The source cannot be queried; fall back to scanning the local directory
    pub fn source_unavailable(&self, reason: impl Into<String>) {
        self.send(Command::Batch(Batch::SourceUnavailable(reason.into())));
    }

    /// Re-scan the local directory (ignored while the remote source is active)
    pub fn rescan_local(&self) {
        self.send(Command::Batch(Batch::RescanLocal));
    }

    /// Hold batches in arrival order until [`resume`](Self::resume)
    pub fn pause(&self) {
        self.send(Command::Pause);
    }

    pub fn resume(&self) {
        self.send(Command::Resume);
    }

    /// Attach an independent subscriber.
    ///
    /// If a snapshot already exists it is delivered first, as `ReloadAll`.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<QueryUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.send(Command::Subscribe(tx));
        rx
    }

    pub fn mode(&self) -> SourceMode {
        *self.mode.borrow()
    }

    /// Stop accepting input and wait for the worker to drain what is queued
    pub async fn shutdown(self) {
        let QueryEngine {
            commands, worker, ..
        } = self;
        drop(commands);
        if let Err(err) = worker.await {
            warn!("Query worker ended abnormally: {err}");
        }
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("Query worker is gone, dropping signal");
        }
    }
}

struct Worker {
    allow_list: Arc<dyn AllowList>,
    policy: DiffPolicy,
    local_directory: PathBuf,
    mode: watch::Sender<SourceMode>,
    previous: Option<Arc<ResultSet>>,
    subscribers: Vec<mpsc::UnboundedSender<QueryUpdate>>,
    paused: bool,
    backlog: VecDeque<Batch>,
}

impl Worker {
    async fn run(mut self, mut receiver: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = receiver.recv().await {
            match command {
                Command::Batch(batch) if self.paused => self.backlog.push_back(batch),
                Command::Batch(batch) => self.process(batch).await,
                Command::Pause => {
                    debug!("Query paused");
                    self.paused = true;
                }
                Command::Resume => {
                    debug!("Query resumed with {} queued batches", self.backlog.len());
                    self.paused = false;
                    self.drain_backlog().await;
                }
                Command::Subscribe(subscriber) => self.attach(subscriber),
            }
        }

        // Channel closed: nothing queued is lost
        self.drain_backlog().await;
        debug!("Query worker stopped");
    }

    async fn drain_backlog(&mut self) {
        while let Some(batch) = self.backlog.pop_front() {
            self.process(batch).await;
        }
    }

    async fn process(&mut self, batch: Batch) {
        // Consulted once per batch
        let filter = ExtensionFilter::from_allow_list(self.allow_list.as_ref());

        let reconciliation = match batch {
            Batch::InitialGather(items) => {
                self.set_mode(SourceMode::Remote);
                debug!("Initial gather with {} items", items.len());
                reconcile::snapshot(&items, &filter)
            }
            Batch::ItemsChanged(batch) => {
                if *self.mode.borrow() == SourceMode::Local {
                    warn!("Ignoring remote changes while scanning locally");
                    return;
                }
                self.incremental(&batch, &filter)
            }
            Batch::SourceUnavailable(reason) => {
                warn!("Document source unavailable ({reason}), using local documents");
                self.set_mode(SourceMode::Local);
                self.scan_local(filter).await
            }
            Batch::RescanLocal => {
                if *self.mode.borrow() == SourceMode::Remote {
                    debug!("Ignoring local rescan while the remote source is active");
                    return;
                }
                self.scan_local(filter).await
            }
        };

        self.publish(reconciliation);
    }

    fn incremental(&self, batch: &ChangeBatch, filter: &ExtensionFilter) -> Reconciliation {
        let empty = ResultSet::new();
        let previous = self.previous.as_deref().unwrap_or(&empty);
        let changes = Changes::from_raw(batch, filter, previous);
        debug!(
            "Batch: {} changed, {} removed, {} added",
            changes.changed.len(),
            changes.removed.len(),
            changes.added.len()
        );

        let mut reconciliation = reconcile::reconcile(previous, changes, self.policy);
        if self.previous.is_none() {
            // No earlier snapshot to diff against
            reconciliation.edits = edit::reload();
        }
        reconciliation
    }

    async fn scan_local(&self, filter: ExtensionFilter) -> Reconciliation {
        let directory = self.local_directory.clone();
        let scanned =
            tokio::task::spawn_blocking(move || local::enumerate(&directory, &filter)).await;

        let results = match scanned {
            Ok(Ok(results)) => results,
            Ok(Err(err)) => {
                warn!("Local scan failed: {err}");
                ResultSet::new()
            }
            Err(err) => {
                warn!("Local scan task failed: {err}");
                ResultSet::new()
            }
        };
        Reconciliation {
            results,
            edits: edit::reload(),
        }
    }

    fn publish(&mut self, reconciliation: Reconciliation) {
        let Reconciliation { results, edits } = reconciliation;
        let results = Arc::new(results);
        self.previous = Some(Arc::clone(&results));

        if edits.is_empty() {
            return;
        }

        let update = QueryUpdate { results, edits };
        self.subscribers
            .retain(|subscriber| subscriber.send(update.clone()).is_ok());
    }

    fn attach(&mut self, subscriber: mpsc::UnboundedSender<QueryUpdate>) {
        if let Some(results) = &self.previous {
            let update = QueryUpdate {
                results: Arc::clone(results),
                edits: edit::reload(),
            };
            if subscriber.send(update).is_err() {
                return;
            }
        }
        self.subscribers.push(subscriber);
    }

    fn set_mode(&self, mode: SourceMode) {
        let changed = self.mode.send_if_modified(|current| {
            let changed = *current != mode;
            *current = mode;
            changed
        });
        if changed {
            info!("Document source switched to {mode:?}");
        }
    }
}
