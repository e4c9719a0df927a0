use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Semaphore};

use super::render::ThumbnailRenderer;
use crate::error::{BrowserError, Result};
use crate::state::document::{DocumentId, DocumentIdentity};

/// A rendered thumbnail, shared between the cache and its readers
pub type Thumbnail = Arc<RgbaImage>;

/// Configuration for [`ThumbnailCache`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    /// Maximum thumbnail size in pixels (width, height)
    pub max_size: [u32; 2],
    /// Maximum number of cached entries
    pub max_entries: usize,
    /// Maximum number of renders running at once
    pub max_concurrent_renders: usize,
    /// Completions landing within this window are reported together
    pub notify_coalesce_ms: u64,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            max_size: [220, 270],
            max_entries: 256,
            max_concurrent_renders: 4,
            notify_coalesce_ms: 16,
        }
    }
}

/// What [`ThumbnailCache::load`] hands back immediately
#[derive(Clone, Debug)]
pub enum ThumbnailLookup {
    /// Up-to-date thumbnail
    Ready(Thumbnail),
    /// Stale thumbnail, usable until the re-render lands
    Stale(Thumbnail),
    /// Nothing rendered yet
    Placeholder,
}

impl ThumbnailLookup {
    pub fn image(&self) -> Option<&Thumbnail> {
        match self {
            ThumbnailLookup::Ready(image) | ThumbnailLookup::Stale(image) => Some(image),
            ThumbnailLookup::Placeholder => None,
        }
    }
}

/// Externally visible state of one entry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThumbnailState {
    Absent,
    Loading,
    Loaded,
    Dirty,
    Failed,
}

/// Batched load notifications
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ThumbnailEvent {
    /// These documents have a new image
    Loaded(HashSet<DocumentId>),
    /// Rendering failed for these documents; the next load retries
    Failed(HashSet<DocumentId>),
}

#[derive(Debug)]
enum EntryState {
    Loading {
        generation: u64,
        /// Previous image, kept while re-rendering a dirty entry
        fallback: Option<Thumbnail>,
        /// Marked dirty while the render was running
        invalidated: bool,
    },
    Loaded(Thumbnail),
    Dirty(Thumbnail),
    Failed(String),
}

#[derive(Debug)]
struct Entry {
    state: EntryState,
    lru_stamp: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<DocumentId, Entry>,
    next_generation: u64,
    next_stamp: u64,
    loaded: HashSet<DocumentId>,
    failed: HashSet<DocumentId>,
    flush_scheduled: bool,
    subscribers: Vec<mpsc::UnboundedSender<ThumbnailEvent>>,
}

struct Inner {
    config: ThumbnailConfig,
    renderer: Arc<dyn ThumbnailRenderer>,
    runtime: Handle,
    permits: Arc<Semaphore>,
    state: Mutex<CacheState>,
}

/// Identity-keyed thumbnail cache with an asynchronous render pool.
///
/// Lookups never block: [`load`](Self::load) returns whatever is cached and
/// schedules a render when the entry is absent, dirty or failed. Renders run
/// in parallel on the blocking pool and finish in any order. Each entry's
/// transitions happen under one lock, and every render carries a generation
/// number so a result that arrives after a cancel, an eviction or a newer
/// request is thrown away.
///
/// Completed loads are reported in batches to every subscriber.
#[derive(Clone)]
pub struct ThumbnailCache {
    inner: Arc<Inner>,
}

impl ThumbnailCache {
    /// Create a cache whose renders and notifications run on `runtime`
    pub fn new(
        config: ThumbnailConfig,
        renderer: Arc<dyn ThumbnailRenderer>,
        runtime: Handle,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_renders.max(1)));
        Self {
            inner: Arc::new(Inner {
                config,
                renderer,
                runtime,
                permits,
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    pub fn config(&self) -> &ThumbnailConfig {
        &self.inner.config
    }

    /// Return the cached image for `document`, rendering it in the background if needed
    pub fn load(&self, document: &DocumentIdentity) -> ThumbnailLookup {
        let id = document.id();
        let mut state = self.inner.state.lock();
        let stamp = state.alloc_stamp();

        let (lookup, fallback) = match state.entries.get_mut(id) {
            Some(entry) => {
                entry.lru_stamp = stamp;
                match &entry.state {
                    EntryState::Loaded(image) => return ThumbnailLookup::Ready(Arc::clone(image)),
                    EntryState::Loading { fallback, .. } => {
                        return fallback
                            .as_ref()
                            .map(|image| ThumbnailLookup::Stale(Arc::clone(image)))
                            .unwrap_or(ThumbnailLookup::Placeholder);
                    }
                    EntryState::Dirty(image) => {
                        (ThumbnailLookup::Stale(Arc::clone(image)), Some(Arc::clone(image)))
                    }
                    EntryState::Failed(_) => (ThumbnailLookup::Placeholder, None),
                }
            }
            None => (ThumbnailLookup::Placeholder, None),
        };

        let generation = state.alloc_generation();
        state.entries.insert(
            id.clone(),
            Entry {
                state: EntryState::Loading {
                    generation,
                    fallback,
                    invalidated: false,
                },
                lru_stamp: stamp,
            },
        );
        self.inner.evict_to_fit(&mut state);
        drop(state);

        self.spawn_render(id.clone(), document.location().to_path_buf(), generation);
        lookup
    }

    pub fn state(&self, id: &DocumentId) -> ThumbnailState {
        let state = self.inner.state.lock();
        match state.entries.get(id).map(|entry| &entry.state) {
            None => ThumbnailState::Absent,
            Some(EntryState::Loading { .. }) => ThumbnailState::Loading,
            Some(EntryState::Loaded(_)) => ThumbnailState::Loaded,
            Some(EntryState::Dirty(_)) => ThumbnailState::Dirty,
            Some(EntryState::Failed(_)) => ThumbnailState::Failed,
        }
    }

    /// Why the last render of `id` failed, while the entry is `Failed`
    pub fn failure(&self, id: &DocumentId) -> Option<String> {
        match &self.inner.state.lock().entries.get(id)?.state {
            EntryState::Failed(reason) => Some(reason.clone()),
            _ => None,
        }
    }

    /// Mark one entry stale; its image stays usable until re-rendered
    pub fn mark_dirty(&self, id: &DocumentId) {
        let mut state = self.inner.state.lock();
        if let Some(entry) = state.entries.get_mut(id) {
            entry.invalidate();
        }
    }

    /// Mark every entry stale without dropping any rendered image
    pub fn mark_all_dirty(&self) {
        let mut state = self.inner.state.lock();
        for entry in state.entries.values_mut() {
            entry.invalidate();
        }
    }

    pub fn remove(&self, id: &DocumentId) {
        let mut state = self.inner.state.lock();
        if state.entries.remove(id).is_some() {
            debug!("Evicted thumbnail for {id}");
        }
        state.loaded.remove(id);
        state.failed.remove(id);
    }

    /// Evict every entry whose id fails `keep`
    pub fn retain<F>(&self, mut keep: F)
    where
        F: FnMut(&DocumentId) -> bool,
    {
        let mut state = self.inner.state.lock();
        let before = state.entries.len();
        state.entries.retain(|id, _| keep(id));
        let CacheState {
            entries,
            loaded,
            failed,
            ..
        } = &mut *state;
        loaded.retain(|id| entries.contains_key(id));
        failed.retain(|id| entries.contains_key(id));

        let evicted = before - state.entries.len();
        if evicted > 0 {
            debug!("Evicted {evicted} unreferenced thumbnails");
        }
    }

    /// Stop caring about an in-flight render.
    ///
    /// The entry goes back to its previous image (as dirty) or to absent. A
    /// render that still finishes is discarded. No-op when nothing is loading.
    pub fn cancel_load(&self, id: &DocumentId) {
        let mut state = self.inner.state.lock();
        let Some(entry) = state.entries.get_mut(id) else {
            return;
        };
        let fallback = match &mut entry.state {
            EntryState::Loading { fallback, .. } => fallback.take(),
            _ => return,
        };
        match fallback {
            Some(image) => entry.state = EntryState::Dirty(image),
            None => {
                state.entries.remove(id);
            }
        }
        debug!("Cancelled thumbnail load for {id}");
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Attach an independent listener for batched load notifications
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ThumbnailEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.state.lock().subscribers.push(tx);
        rx
    }

    fn spawn_render(&self, id: DocumentId, path: PathBuf, generation: u64) {
        let inner = Arc::clone(&self.inner);
        self.inner.runtime.spawn(async move {
            // The semaphore is never closed
            let _permit = Arc::clone(&inner.permits).acquire_owned().await.ok();

            let renderer = Arc::clone(&inner.renderer);
            let max_size = inner.config.max_size;
            let render_path = path.clone();
            let result =
                tokio::task::spawn_blocking(move || renderer.render(&render_path, max_size))
                    .await
                    .unwrap_or_else(|err| Err(BrowserError::render_failed(&path, err)));

            Inner::complete(&inner, id, generation, result);
        });
    }
}

impl Entry {
    fn invalidate(&mut self) {
        let stale = match &mut self.state {
            EntryState::Loaded(image) => Arc::clone(image),
            EntryState::Loading { invalidated, .. } => {
                *invalidated = true;
                return;
            }
            EntryState::Dirty(_) | EntryState::Failed(_) => return,
        };
        self.state = EntryState::Dirty(stale);
    }
}

impl CacheState {
    fn alloc_stamp(&mut self) -> u64 {
        let s = self.next_stamp;
        self.next_stamp = self.next_stamp.wrapping_add(1);
        s
    }

    fn alloc_generation(&mut self) -> u64 {
        let g = self.next_generation;
        self.next_generation = self.next_generation.wrapping_add(1);
        g
    }
}

impl Inner {
    fn complete(inner: &Arc<Inner>, id: DocumentId, generation: u64, result: Result<RgbaImage>) {
        let mut state = inner.state.lock();

        let Some(entry) = state.entries.get_mut(&id) else {
            debug!("Dropping thumbnail for evicted {id}");
            return;
        };
        let invalidated = match entry.state {
            EntryState::Loading {
                generation: current,
                invalidated,
                ..
            } if current == generation => invalidated,
            _ => {
                debug!("Dropping superseded thumbnail for {id}");
                return;
            }
        };

        match result {
            Ok(image) => {
                let image = Arc::new(image);
                entry.state = if invalidated {
                    EntryState::Dirty(image)
                } else {
                    EntryState::Loaded(image)
                };
                state.loaded.insert(id);
            }
            Err(err) => {
                warn!("Thumbnail for {id} failed: {err}");
                entry.state = EntryState::Failed(err.to_string());
                state.failed.insert(id);
            }
        }

        inner.evict_to_fit(&mut state);

        if !state.flush_scheduled {
            state.flush_scheduled = true;
            let inner = Arc::clone(inner);
            let window = Duration::from_millis(inner.config.notify_coalesce_ms);
            inner.runtime.clone().spawn(async move {
                tokio::time::sleep(window).await;
                inner.flush();
            });
        }
    }

    /// Deliver everything that completed since the last flush
    fn flush(&self) {
        let mut state = self.state.lock();
        state.flush_scheduled = false;

        let loaded = std::mem::take(&mut state.loaded);
        let failed = std::mem::take(&mut state.failed);
        let mut events = Vec::with_capacity(2);
        if !loaded.is_empty() {
            events.push(ThumbnailEvent::Loaded(loaded));
        }
        if !failed.is_empty() {
            events.push(ThumbnailEvent::Failed(failed));
        }

        state.subscribers.retain(|subscriber| {
            events
                .iter()
                .all(|event| subscriber.send(event.clone()).is_ok())
        });
    }

    /// Drop least recently touched entries until the cache fits.
    /// Stops at an entry that is still loading.
    fn evict_to_fit(&self, state: &mut CacheState) {
        while state.entries.len() > self.config.max_entries {
            let Some((oldest, loading)) = state
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.lru_stamp)
                .map(|(id, entry)| (id.clone(), matches!(entry.state, EntryState::Loading { .. })))
            else {
                break;
            };
            if loading {
                break;
            }
            state.entries.remove(&oldest);
            state.loaded.remove(&oldest);
            state.failed.remove(&oldest);
            debug!("Evicted least recently used thumbnail for {oldest}");
        }
    }
}
