//! Browser coordinator
//!
//! The delivery context: the only place where the lists a user sees change.
//! Query updates and thumbnail notifications arrive on channels, are applied
//! here one at a time and then handed to a [`Presenter`].

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::query::edit::{self, EditOperation};
use crate::query::engine::{QueryEngine, QueryUpdate};
use crate::state::catalog::Catalog;
use crate::state::document::{DocumentId, DocumentIdentity};
use crate::state::preferences::Preferences;
use crate::state::recents::{RecentsTracker, RecentsUpdate};
use crate::state::results::ResultSet;
use crate::thumbnail::cache::{ThumbnailCache, ThumbnailEvent, ThumbnailLookup};

/// The two lists shown by the browser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Recents,
    Documents,
}

/// A row in one of the sections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexPath {
    pub section: Section,
    pub row: usize,
}

impl IndexPath {
    pub fn new(section: Section, row: usize) -> Self {
        Self { section, row }
    }
}

/// What sits at an index path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserEntry<'a> {
    Document(&'a DocumentIdentity),
    Recent(&'a DocumentIdentity),
}

impl<'a> BrowserEntry<'a> {
    pub fn document(&self) -> &'a DocumentIdentity {
        match *self {
            BrowserEntry::Document(document) | BrowserEntry::Recent(document) => document,
        }
    }
}

/// Receives every change the browser applies, in order
pub trait Presenter {
    fn documents_changed(&mut self, documents: &ResultSet, edits: &[EditOperation]);

    fn recents_changed(&mut self, recents: &[DocumentIdentity], edits: &[EditOperation]);

    /// New thumbnails are available for these rows
    fn thumbnails_ready(&mut self, paths: &[IndexPath]);

    /// Rendering failed for these rows
    fn thumbnails_failed(&mut self, _paths: &[IndexPath]) {}
}

/// Everything one query update changed
#[derive(Debug, Clone, Default)]
pub struct BrowserChanges {
    pub documents: Vec<EditOperation>,
    /// Recents changes, each relative to the list left by the one before
    pub recents: Vec<RecentsUpdate>,
}

pub struct DocumentBrowser {
    documents: Arc<ResultSet>,
    recents: RecentsTracker,
    thumbnails: ThumbnailCache,
    catalog: Option<Catalog>,
    preferences: Preferences,
    query_updates: mpsc::UnboundedReceiver<QueryUpdate>,
    thumbnail_events: mpsc::UnboundedReceiver<ThumbnailEvent>,
}

impl DocumentBrowser {
    /// Subscribe to `engine` and `thumbnails`.
    ///
    /// With a catalog, recents and preferences are restored from it and
    /// every later change is written back.
    pub fn new(
        engine: &QueryEngine,
        thumbnails: ThumbnailCache,
        recents_capacity: usize,
        catalog: Option<Catalog>,
    ) -> Result<Self> {
        let (recents, preferences) = match &catalog {
            Some(catalog) => (
                RecentsTracker::with_entries(recents_capacity, catalog.load_recents()?),
                Preferences::load(catalog)?,
            ),
            None => (RecentsTracker::new(recents_capacity), Preferences::default()),
        };

        let mut browser = Self {
            documents: Arc::new(ResultSet::new()),
            recents,
            query_updates: engine.subscribe(),
            thumbnail_events: thumbnails.subscribe(),
            thumbnails,
            catalog,
            preferences,
        };
        if browser.recents.prune_missing().is_some() {
            browser.persist_recents();
        }
        Ok(browser)
    }

    pub fn documents(&self) -> &ResultSet {
        &self.documents
    }

    pub fn recents(&self) -> &[DocumentIdentity] {
        self.recents.entries()
    }

    pub fn thumbnails(&self) -> &ThumbnailCache {
        &self.thumbnails
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn row_count(&self, section: Section) -> usize {
        match section {
            Section::Recents => self.recents.len(),
            Section::Documents => self.documents.len(),
        }
    }

    pub fn entry_at(&self, section: Section, row: usize) -> Option<BrowserEntry<'_>> {
        match section {
            Section::Recents => self.recents.get(row).map(BrowserEntry::Recent),
            Section::Documents => self.documents.get(row).map(BrowserEntry::Document),
        }
    }

    /// Thumbnail for the row at `path`, scheduling a render if needed
    pub fn thumbnail_at(&self, path: IndexPath) -> Option<ThumbnailLookup> {
        self.entry_at(path.section, path.row)
            .map(|entry| self.thumbnails.load(entry.document()))
    }

    /// Install a new document list and bring recents and thumbnails in line with it
    pub fn apply_query_update(&mut self, update: QueryUpdate) -> BrowserChanges {
        let previous = std::mem::replace(&mut self.documents, update.results);
        let mut recents = Vec::new();

        if edit::is_reload(&update.edits) {
            // Only documents that left the list are forgotten; recents opened
            // from elsewhere stay
            for document in previous.iter() {
                if !self.documents.contains(document.id()) {
                    recents.extend(self.recents.remove(document.id()));
                }
            }

            self.thumbnails.mark_all_dirty();
            let documents = &self.documents;
            let tracked = &self.recents;
            self.thumbnails
                .retain(|id| documents.contains(id) || tracked.contains(id));
        } else {
            for operation in &update.edits {
                match *operation {
                    EditOperation::Delete(index) => {
                        if let Some(document) = previous.get(index) {
                            self.thumbnails.remove(document.id());
                            recents.extend(self.recents.remove(document.id()));
                        }
                    }
                    EditOperation::Update(index) => {
                        if let Some(document) = self.documents.get(index) {
                            self.thumbnails.mark_dirty(document.id());
                        }
                    }
                    _ => {}
                }
            }
        }

        recents.extend(self.recents.refresh(&self.documents));
        if !recents.is_empty() {
            self.persist_recents();
        }

        BrowserChanges {
            documents: update.edits,
            recents,
        }
    }

    /// Record that the user opened `document`
    pub fn open_document(&mut self, document: &DocumentIdentity) -> Result<RecentsUpdate> {
        let before = self.recents.entries().to_vec();
        let update = self.recents.add(document.clone());
        self.evict_dropped_recents(&before, &update);
        if let Some(catalog) = &mut self.catalog {
            self.preferences
                .set_current_document(catalog, Some(document.location()))?;
            catalog.save_recents(self.recents.entries())?;
        }
        Ok(update)
    }

    /// Rows currently showing any of `ids`; ids no longer listed are dropped
    pub fn thumbnails_ready(&self, ids: &HashSet<DocumentId>) -> Vec<IndexPath> {
        let recents = self
            .recents
            .entries()
            .iter()
            .enumerate()
            .filter(|(_, document)| ids.contains(document.id()))
            .map(|(row, _)| IndexPath::new(Section::Recents, row));
        let documents = self
            .documents
            .iter()
            .enumerate()
            .filter(|(_, document)| ids.contains(document.id()))
            .map(|(row, _)| IndexPath::new(Section::Documents, row));
        recents.chain(documents).collect()
    }

    /// The row at `path` scrolled out of view.
    ///
    /// The pending thumbnail load is cancelled unless the same document is
    /// still shown in one of the `visible` rows.
    pub fn end_displaying(&self, path: IndexPath, visible: &[IndexPath]) {
        let Some(entry) = self.entry_at(path.section, path.row) else {
            return;
        };
        let id = entry.document().id();
        let still_visible = visible
            .iter()
            .filter_map(|other| self.entry_at(other.section, other.row))
            .any(|other| other.document().id() == id);
        if !still_visible {
            self.thumbnails.cancel_load(id);
        }
    }

    /// Wait for the next query update or thumbnail notification and deliver it.
    ///
    /// Returns `false` once the query engine has shut down.
    pub async fn step<P: Presenter + ?Sized>(&mut self, presenter: &mut P) -> bool {
        tokio::select! {
            update = self.query_updates.recv() => match update {
                Some(update) => {
                    let changes = self.apply_query_update(update);
                    presenter.documents_changed(&self.documents, &changes.documents);
                    for recents in &changes.recents {
                        presenter.recents_changed(&recents.list, &recents.edits);
                    }
                    true
                }
                None => false,
            },
            Some(event) = self.thumbnail_events.recv() => {
                self.deliver_thumbnails(event, presenter);
                true
            }
        }
    }

    /// Deliver everything until the query engine shuts down
    pub async fn run<P: Presenter + ?Sized>(&mut self, presenter: &mut P) {
        while self.step(presenter).await {}
        debug!("Query engine closed, browser stopped");
    }

    fn deliver_thumbnails<P: Presenter + ?Sized>(&self, event: ThumbnailEvent, presenter: &mut P) {
        match event {
            ThumbnailEvent::Loaded(ids) => {
                let paths = self.thumbnails_ready(&ids);
                if !paths.is_empty() {
                    presenter.thumbnails_ready(&paths);
                }
            }
            ThumbnailEvent::Failed(ids) => {
                let paths = self.thumbnails_ready(&ids);
                if !paths.is_empty() {
                    presenter.thumbnails_failed(&paths);
                }
            }
        }
    }

    /// Drop thumbnails of recents removed by `update` that are not listed anywhere else
    fn evict_dropped_recents(&self, before: &[DocumentIdentity], update: &RecentsUpdate) {
        for operation in &update.edits {
            let EditOperation::Delete(index) = *operation else {
                continue;
            };
            let Some(dropped) = before.get(index) else {
                continue;
            };
            let id = dropped.id();
            if !self.documents.contains(id) && !self.recents.contains(id) {
                self.thumbnails.remove(id);
            }
        }
    }

    fn persist_recents(&mut self) {
        if let Some(catalog) = &mut self.catalog {
            if let Err(err) = catalog.save_recents(self.recents.entries()) {
                warn!("Failed to save recents: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::engine::{EngineConfig, SourceMode};
    use crate::query::reconcile::DiffPolicy;
    use crate::state::document::RawItem;
    use crate::thumbnail::cache::{ThumbnailConfig, ThumbnailState};
    use crate::thumbnail::render::ThumbnailRenderer;
    use image::RgbaImage;
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use tokio::runtime::Handle;
    use tokio::time::timeout;
    use EditOperation::*;

    struct SolidRenderer {
        delay: Duration,
    }

    impl ThumbnailRenderer for SolidRenderer {
        fn render(&self, _path: &Path, _max_size: [u32; 2]) -> Result<RgbaImage> {
            std::thread::sleep(self.delay);
            Ok(RgbaImage::new(1, 1))
        }
    }

    #[derive(Default)]
    struct RecordingPresenter {
        documents: Vec<Vec<EditOperation>>,
        recents: Vec<Vec<EditOperation>>,
        ready: Vec<IndexPath>,
    }

    impl Presenter for RecordingPresenter {
        fn documents_changed(&mut self, _documents: &ResultSet, edits: &[EditOperation]) {
            self.documents.push(edits.to_vec());
        }

        fn recents_changed(&mut self, _recents: &[DocumentIdentity], edits: &[EditOperation]) {
            self.recents.push(edits.to_vec());
        }

        fn thumbnails_ready(&mut self, paths: &[IndexPath]) {
            self.ready.extend_from_slice(paths);
        }
    }

    fn raw(id: &str, name: &str) -> RawItem {
        RawItem::new(format!("/docs/{name}.rtf")).with_item_id(id)
    }

    fn item(id: &str) -> DocumentId {
        DocumentId::Item(id.to_string())
    }

    fn setup(policy: DiffPolicy, render_delay: Duration) -> (QueryEngine, DocumentBrowser) {
        let engine = QueryEngine::spawn(
            EngineConfig {
                policy,
                local_directory: PathBuf::from("/nonexistent"),
                initial_mode: SourceMode::Remote,
            },
            Arc::new(vec!["rtf".to_string()]),
        );
        let cache = ThumbnailCache::new(
            ThumbnailConfig::default(),
            Arc::new(SolidRenderer {
                delay: render_delay,
            }),
            Handle::current(),
        );
        let catalog = Catalog::open_in_memory().unwrap();
        let browser = DocumentBrowser::new(&engine, cache, 3, Some(catalog)).unwrap();
        (engine, browser)
    }

    async fn step(browser: &mut DocumentBrowser, presenter: &mut RecordingPresenter) {
        let alive = timeout(Duration::from_secs(5), browser.step(presenter))
            .await
            .expect("browser step timed out");
        assert!(alive);
    }

    async fn load_thumbnail(browser: &mut DocumentBrowser, presenter: &mut RecordingPresenter, path: IndexPath) {
        browser.thumbnail_at(path).unwrap();
        let id = browser.entry_at(path.section, path.row).unwrap().document().id().clone();
        while browser.thumbnails().state(&id) != ThumbnailState::Loaded {
            step(browser, presenter).await;
        }
    }

    #[tokio::test]
    async fn test_initial_gather_is_presented() {
        let (engine, mut browser) = setup(DiffPolicy::FineGrained, Duration::ZERO);
        let mut presenter = RecordingPresenter::default();

        engine.initial_gather_complete(vec![raw("2", "beta"), raw("1", "alpha")]);
        step(&mut browser, &mut presenter).await;

        assert_eq!(presenter.documents, vec![vec![ReloadAll]]);
        assert_eq!(browser.row_count(Section::Documents), 2);
        assert_eq!(browser.row_count(Section::Recents), 0);
        let first = browser.entry_at(Section::Documents, 0).unwrap();
        assert_eq!(first.document().display_name(), "alpha");
        assert!(matches!(first, BrowserEntry::Document(_)));
        assert!(browser.entry_at(Section::Documents, 2).is_none());
    }

    #[tokio::test]
    async fn test_open_document_updates_recents_and_preferences() {
        let (engine, mut browser) = setup(DiffPolicy::FineGrained, Duration::ZERO);
        let mut presenter = RecordingPresenter::default();
        engine.initial_gather_complete(vec![raw("1", "alpha"), raw("2", "beta")]);
        step(&mut browser, &mut presenter).await;

        let alpha = browser.documents().get(0).unwrap().clone();
        let beta = browser.documents().get(1).unwrap().clone();
        assert_eq!(browser.open_document(&alpha).unwrap().edits, vec![Add(0)]);
        assert_eq!(browser.open_document(&beta).unwrap().edits, vec![Add(0)]);
        assert_eq!(
            browser.open_document(&alpha).unwrap().edits,
            vec![Update(0), Move { from: 1, to: 0 }]
        );

        let recent = browser.entry_at(Section::Recents, 0).unwrap();
        assert!(matches!(recent, BrowserEntry::Recent(_)));
        assert_eq!(recent.document().id(), alpha.id());
        assert_eq!(browser.preferences().current_document(), Some(Path::new("/docs/alpha.rtf")));
    }

    #[tokio::test]
    async fn test_delete_evicts_thumbnail_and_recent() {
        let (engine, mut browser) = setup(DiffPolicy::FineGrained, Duration::ZERO);
        let mut presenter = RecordingPresenter::default();
        engine.initial_gather_complete(vec![raw("a", "alpha"), raw("b", "beta")]);
        step(&mut browser, &mut presenter).await;

        let alpha = browser.documents().get(0).unwrap().clone();
        browser.open_document(&alpha).unwrap();
        load_thumbnail(&mut browser, &mut presenter, IndexPath::new(Section::Documents, 0)).await;
        assert!(presenter.ready.contains(&IndexPath::new(Section::Recents, 0)));
        assert!(presenter.ready.contains(&IndexPath::new(Section::Documents, 0)));

        engine.items_changed(vec![], vec![raw("a", "alpha")], vec![]);
        step(&mut browser, &mut presenter).await;

        assert_eq!(presenter.documents.last().unwrap(), &vec![Delete(0)]);
        assert_eq!(presenter.recents.last().unwrap(), &vec![Delete(0)]);
        assert_eq!(browser.thumbnails().state(&item("a")), ThumbnailState::Absent);
        assert!(browser.recents().is_empty());
        assert_eq!(browser.documents().len(), 1);
    }

    #[tokio::test]
    async fn test_recents_cap_evicts_unlisted_thumbnail() {
        let (_engine, mut browser) = setup(DiffPolicy::FineGrained, Duration::ZERO);
        let mut presenter = RecordingPresenter::default();

        // Opened from outside the document list
        let outside = DocumentIdentity::from_raw(&raw("x", "outside")).unwrap();
        browser.open_document(&outside).unwrap();
        load_thumbnail(&mut browser, &mut presenter, IndexPath::new(Section::Recents, 0)).await;

        for name in ["p", "q"] {
            let document = DocumentIdentity::from_raw(&raw(name, name)).unwrap();
            assert_eq!(browser.open_document(&document).unwrap().edits, vec![Add(0)]);
        }
        assert_eq!(browser.thumbnails().state(&item("x")), ThumbnailState::Loaded);

        let last = DocumentIdentity::from_raw(&raw("r", "r")).unwrap();
        assert_eq!(browser.open_document(&last).unwrap().edits, vec![Delete(2), Add(0)]);
        assert_eq!(browser.thumbnails().state(&item("x")), ThumbnailState::Absent);
    }

    #[tokio::test]
    async fn test_recents_cap_keeps_listed_thumbnail() {
        let (engine, mut browser) = setup(DiffPolicy::FineGrained, Duration::ZERO);
        let mut presenter = RecordingPresenter::default();
        engine.initial_gather_complete(vec![raw("a", "alpha")]);
        step(&mut browser, &mut presenter).await;

        let alpha = browser.documents().get(0).unwrap().clone();
        browser.open_document(&alpha).unwrap();
        load_thumbnail(&mut browser, &mut presenter, IndexPath::new(Section::Documents, 0)).await;

        for name in ["p", "q", "r"] {
            let document = DocumentIdentity::from_raw(&raw(name, name)).unwrap();
            browser.open_document(&document).unwrap();
        }
        assert!(!browser.recents().iter().any(|d| d.id() == alpha.id()));
        assert_eq!(browser.thumbnails().state(&item("a")), ThumbnailState::Loaded);
    }

    #[tokio::test]
    async fn test_update_marks_dirty_and_refreshes_recents() {
        let (engine, mut browser) = setup(DiffPolicy::FineGrained, Duration::ZERO);
        let mut presenter = RecordingPresenter::default();
        engine.initial_gather_complete(vec![raw("a", "alpha")]);
        step(&mut browser, &mut presenter).await;

        let alpha = browser.documents().get(0).unwrap().clone();
        browser.open_document(&alpha).unwrap();
        load_thumbnail(&mut browser, &mut presenter, IndexPath::new(Section::Recents, 0)).await;

        engine.items_changed(vec![raw("a", "zed")], vec![], vec![]);
        step(&mut browser, &mut presenter).await;

        assert_eq!(browser.thumbnails().state(&item("a")), ThumbnailState::Dirty);
        assert_eq!(browser.recents()[0].display_name(), "zed");
        assert_eq!(presenter.recents.last().unwrap(), &vec![Update(0)]);
    }

    #[tokio::test]
    async fn test_reload_evicts_unreferenced_thumbnails() {
        let (engine, mut browser) = setup(DiffPolicy::AlwaysReload, Duration::ZERO);
        let mut presenter = RecordingPresenter::default();
        engine.initial_gather_complete(vec![raw("a", "alpha"), raw("b", "beta")]);
        step(&mut browser, &mut presenter).await;

        load_thumbnail(&mut browser, &mut presenter, IndexPath::new(Section::Documents, 0)).await;
        load_thumbnail(&mut browser, &mut presenter, IndexPath::new(Section::Documents, 1)).await;

        engine.items_changed(vec![], vec![raw("b", "beta")], vec![]);
        step(&mut browser, &mut presenter).await;

        assert_eq!(presenter.documents.last().unwrap(), &vec![ReloadAll]);
        assert_eq!(browser.thumbnails().state(&item("b")), ThumbnailState::Absent);
        assert_eq!(browser.thumbnails().state(&item("a")), ThumbnailState::Dirty);
    }

    #[tokio::test]
    async fn test_thumbnails_ready_only_reports_listed_rows() {
        let (engine, mut browser) = setup(DiffPolicy::FineGrained, Duration::ZERO);
        let mut presenter = RecordingPresenter::default();
        engine.initial_gather_complete(vec![raw("a", "alpha")]);
        step(&mut browser, &mut presenter).await;

        let ids: HashSet<_> = [item("a"), item("gone")].into_iter().collect();
        assert_eq!(
            browser.thumbnails_ready(&ids),
            vec![IndexPath::new(Section::Documents, 0)]
        );
    }

    #[tokio::test]
    async fn test_end_displaying_cancels_hidden_loads() {
        let (engine, mut browser) = setup(DiffPolicy::FineGrained, Duration::from_millis(200));
        let mut presenter = RecordingPresenter::default();
        engine.initial_gather_complete(vec![raw("a", "alpha"), raw("b", "beta")]);
        step(&mut browser, &mut presenter).await;

        let alpha = browser.documents().get(0).unwrap().clone();
        browser.open_document(&alpha).unwrap();

        let alpha_row = IndexPath::new(Section::Documents, 0);
        let beta_row = IndexPath::new(Section::Documents, 1);
        browser.thumbnail_at(alpha_row).unwrap();
        browser.thumbnail_at(beta_row).unwrap();

        // Still shown in the recents section
        browser.end_displaying(alpha_row, &[IndexPath::new(Section::Recents, 0)]);
        assert_eq!(browser.thumbnails().state(&item("a")), ThumbnailState::Loading);

        browser.end_displaying(beta_row, &[alpha_row]);
        assert_eq!(browser.thumbnails().state(&item("b")), ThumbnailState::Absent);
    }

    #[tokio::test]
    async fn test_run_stops_after_engine_shutdown() {
        let (engine, mut browser) = setup(DiffPolicy::FineGrained, Duration::ZERO);
        let mut presenter = RecordingPresenter::default();

        engine.initial_gather_complete(vec![raw("a", "alpha")]);
        engine.items_changed(vec![], vec![], vec![raw("b", "beta")]);
        engine.shutdown().await;

        timeout(Duration::from_secs(5), browser.run(&mut presenter))
            .await
            .unwrap();
        assert_eq!(presenter.documents, vec![vec![ReloadAll], vec![Add(1)]]);
    }

    #[tokio::test]
    async fn test_recents_restored_from_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let location = dir.path().join("kept.rtf");
        std::fs::write(&location, b"x").unwrap();
        let kept = DocumentIdentity::from_local(location, None).unwrap();
        let gone = DocumentIdentity::from_local(dir.path().join("gone.rtf"), None).unwrap();

        let mut catalog = Catalog::open_in_memory().unwrap();
        catalog.save_recents(&[gone, kept.clone()]).unwrap();

        let engine = QueryEngine::spawn(
            EngineConfig {
                policy: DiffPolicy::FineGrained,
                local_directory: dir.path().to_path_buf(),
                initial_mode: SourceMode::Remote,
            },
            Arc::new(vec!["rtf".to_string()]),
        );
        let cache = ThumbnailCache::new(
            ThumbnailConfig::default(),
            Arc::new(SolidRenderer {
                delay: Duration::ZERO,
            }),
            Handle::current(),
        );
        let browser = DocumentBrowser::new(&engine, cache, 3, Some(catalog)).unwrap();

        assert_eq!(browser.recents().len(), 1);
        assert!(browser.recents()[0].same_contents(&kept));
    }
}
