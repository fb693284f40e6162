use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::{
    BookmarkStore, CatalogEntry, CatalogStore, DocumentBackend, DocumentLoader, FilePicker,
    LoadError, ViewSurface, ViewerConfig, ViewerError, ViewportSpec,
};

/// In-memory state for the currently open document. Destroyed when another
/// document is opened or the catalog becomes empty; never persisted.
pub struct SessionState {
    pub path: PathBuf,
    pub page_count: u32,
    /// 1-indexed; always within `1..=page_count`.
    pub current_page: u32,
    /// Reset to 1.0 on every load.
    pub zoom: f32,
    backend: Arc<dyn DocumentBackend>,
}

/// Turns catalog entries into live rendering sessions and keeps navigation
/// state, the displayed page column, and the two persisted stores mutually
/// consistent.
///
/// All work runs on one control flow; overlapping render passes are
/// serialized by the generation counter rather than locks, and scroll-driven
/// page detection is suppressed by a boolean guard while a programmatic
/// scroll or render pass is in flight.
pub struct Coordinator<V: ViewSurface> {
    catalog_store: Arc<dyn CatalogStore>,
    bookmark_store: Arc<dyn BookmarkStore>,
    loader: Arc<dyn DocumentLoader>,
    config: ViewerConfig,
    view: V,
    catalog: Vec<CatalogEntry>,
    bookmarks: crate::BookmarkMap,
    session: Option<SessionState>,
    /// Incremented at the start of every full render pass; in-flight work
    /// compares its captured token against this to detect supersession.
    generation: Arc<AtomicU64>,
    scroll_guard: bool,
    filter: String,
}

impl<V: ViewSurface> Coordinator<V> {
    pub fn new(
        catalog_store: Arc<dyn CatalogStore>,
        bookmark_store: Arc<dyn BookmarkStore>,
        loader: Arc<dyn DocumentLoader>,
        config: ViewerConfig,
        view: V,
    ) -> Self {
        Self {
            catalog_store,
            bookmark_store,
            loader,
            config,
            view,
            catalog: Vec::new(),
            bookmarks: crate::BookmarkMap::new(),
            session: None,
            generation: Arc::new(AtomicU64::new(0)),
            scroll_guard: false,
            filter: String::new(),
        }
    }

    pub fn catalog(&self) -> &[CatalogEntry] {
        &self.catalog
    }

    pub fn bookmarks(&self) -> &crate::BookmarkMap {
        &self.bookmarks
    }

    pub fn session(&self) -> Option<&SessionState> {
        self.session.as_ref()
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    /// Shared handle to the render generation counter. Exposed so embedders
    /// and tests can observe pass supersession.
    pub fn generation(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.generation)
    }

    /// Loads both stores, prunes catalog entries whose file no longer
    /// exists, and opens the first entry when nothing is open yet. Store
    /// failures degrade to an empty catalog / bookmark map.
    pub async fn initialize(&mut self) {
        self.catalog = match self.catalog_store.load().await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(error = %err, "failed to load catalog, starting empty");
                Vec::new()
            }
        };
        let before = self.catalog.len();
        let loader = Arc::clone(&self.loader);
        self.catalog.retain(|entry| loader.file_exists(&entry.path));
        if self.catalog.len() != before {
            debug!(
                pruned = before - self.catalog.len(),
                "dropped catalog entries with missing files"
            );
        }

        self.bookmarks = match self.bookmark_store.load().await {
            Ok(map) => map,
            Err(err) => {
                warn!(error = %err, "failed to load bookmarks, starting empty");
                crate::BookmarkMap::new()
            }
        };

        self.refresh_catalog_view();

        if self.session.is_none() {
            if let Some(first) = self.catalog.first().map(|entry| entry.path.clone()) {
                if let Err(err) = self.open_document(&first).await {
                    warn!(path = %first.display(), error = %err, "failed to auto-open first catalog entry");
                }
            }
        }
    }

    /// Opens a catalog entry. On any failure the previous session (if any)
    /// is left untouched and no partial session is published.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn open_document(&mut self, path: &Path) -> Result<(), ViewerError> {
        if !self.catalog.iter().any(|entry| entry.path == path) {
            warn!("open requested for a path not in the catalog");
            return Err(ViewerError::NotInCatalog(path.to_path_buf()));
        }

        let bytes = match self.loader.read_bytes(path).await {
            Some(bytes) => bytes,
            None => {
                warn!("document bytes could not be read");
                return Err(LoadError::Unreadable(path.to_path_buf()).into());
            }
        };
        let backend = match self.loader.parse(bytes).await {
            Ok(backend) => backend,
            Err(err) => {
                warn!(error = %err, "document failed to parse");
                return Err(err.into());
            }
        };
        let page_count = backend.page_count();
        if page_count == 0 {
            warn!("document has no pages");
            return Err(ViewerError::Load(LoadError::Parse(
                "document has no pages".into(),
            )));
        }

        info!(pages = page_count, "opened document");
        self.session = Some(SessionState {
            path: path.to_path_buf(),
            page_count,
            current_page: 1,
            zoom: 1.0,
            backend,
        });

        self.render_all().await;
        let pages = self.bookmarks_for(path);
        self.view.show_bookmarks(&pages);
        Ok(())
    }

    /// Sets the current page and scrolls its surface to the top of the
    /// viewport. Out-of-bounds requests are ignored; never re-renders.
    pub fn go_to_page(&mut self, page: u32) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if page < 1 || page > session.page_count {
            debug!(page, page_count = session.page_count, "page out of bounds");
            return;
        }
        session.current_page = page;
        let total = session.page_count;
        self.scroll_guard = true;
        self.view.scroll_to_page(page);
        self.view.set_page_indicator(page, total);
        self.scroll_guard = false;
    }

    pub async fn zoom_in(&mut self) {
        let step = self.config.zoom_step;
        self.apply_zoom(step).await;
    }

    pub async fn zoom_out(&mut self) {
        let step = self.config.zoom_step;
        self.apply_zoom(1.0 / step).await;
    }

    async fn apply_zoom(&mut self, factor: f32) {
        let (min, max) = (self.config.min_zoom, self.config.max_zoom);
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.zoom = (session.zoom * factor).clamp(min, max);
        self.render_all().await;
    }

    /// Container geometry changed: recompute the fit scale and re-render at
    /// the unchanged zoom factor.
    pub async fn on_container_resize(&mut self) {
        if self.session.is_some() {
            self.render_all().await;
        }
    }

    /// Scroll-driven page detection: picks the displayed surface whose
    /// vertical center is nearest the viewport center (ties go to the
    /// lowest page number) and updates the page indicator only. Suppressed
    /// while a programmatic scroll or render pass is in flight.
    pub fn on_user_scroll(&mut self, scroll_top: f32) {
        if self.scroll_guard {
            return;
        }
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let total = session.page_count;
        let viewport_center = scroll_top + self.view.metrics().viewport_height / 2.0;

        let mut nearest: Option<(u32, f32)> = None;
        for extent in self.view.page_extents() {
            let distance = (extent.center() - viewport_center).abs();
            if nearest.map_or(true, |(_, best)| distance < best) {
                nearest = Some((extent.page, distance));
            }
        }
        let Some((page, _)) = nearest else {
            return;
        };

        if let Some(session) = self.session.as_mut() {
            session.current_page = page;
        }
        self.view.set_page_indicator(page, total);
    }

    /// Regenerates the entire page column for the current session, strictly
    /// in ascending page order. A page that fails to render is skipped; a
    /// pass superseded by a newer one abandons silently before its next
    /// append.
    async fn render_all(&mut self) {
        let (backend, page_count, zoom) = match self.session.as_ref() {
            Some(session) => (
                Arc::clone(&session.backend),
                session.page_count,
                session.zoom,
            ),
            None => return,
        };
        let token = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.scroll_guard = true;

        let metrics = self.view.metrics();
        let width = (metrics.container_width - self.config.container_padding).max(1.0);
        self.view.clear_pages();

        for page in 1..=page_count {
            let size = match backend.page_size(page) {
                Ok(size) => size,
                Err(err) => {
                    warn!(page, error = %err, "failed to measure page, skipping");
                    continue;
                }
            };
            let spec = ViewportSpec::fit(size, width, zoom, metrics.pixel_ratio);
            let surface = match backend.render_page(page, &spec) {
                Ok(surface) => surface,
                Err(err) => {
                    warn!(page, error = %err, "failed to render page, skipping");
                    continue;
                }
            };
            // A newer pass owns the display now; appending would interleave
            // its output with ours.
            if self.generation.load(Ordering::SeqCst) != token {
                debug!(token, "render pass superseded, discarding");
                self.scroll_guard = false;
                return;
            }
            self.view.append_page(page, surface);
            tokio::task::yield_now().await;
        }

        if self.generation.load(Ordering::SeqCst) == token {
            let (current, zoom) = self
                .session
                .as_ref()
                .map(|session| (session.current_page, session.zoom))
                .unwrap_or((1, 1.0));
            self.view.scroll_to_page(current);
            self.view.set_page_indicator(current, page_count);
            self.view.set_zoom_indicator(zoom);
        }
        self.scroll_guard = false;
    }

    /// Appends candidates that exist on disk and are not already cataloged,
    /// then persists once for the whole batch. No save happens when nothing
    /// new was added.
    pub async fn add_files(&mut self, candidates: Vec<CatalogEntry>) {
        let mut added = false;
        for entry in candidates {
            if !self.loader.file_exists(&entry.path) {
                debug!(path = %entry.path.display(), "skipping missing file");
                continue;
            }
            if self.catalog.iter().any(|known| known.path == entry.path) {
                continue;
            }
            info!(path = %entry.path.display(), "adding to catalog");
            self.catalog.push(entry);
            added = true;
        }
        if added {
            self.persist_catalog().await;
            self.refresh_catalog_view();
        }
    }

    /// Runs the file picker and adds whatever the user selected.
    pub async fn pick_and_add<P: FilePicker>(&mut self, picker: &P) {
        let picked = picker.pick_files().await;
        if !picked.is_empty() {
            self.add_files(picked).await;
        }
    }

    /// Removes one entry; if its document is currently open the session is
    /// closed and the display cleared before the list refresh.
    pub async fn remove_entry(&mut self, path: &Path) {
        let Some(index) = self.catalog.iter().position(|entry| entry.path == path) else {
            return;
        };
        self.catalog.remove(index);
        self.persist_catalog().await;

        let is_open = self
            .session
            .as_ref()
            .map(|session| session.path == path)
            .unwrap_or(false);
        if is_open {
            self.close_session();
        }
        self.refresh_catalog_view();
    }

    /// Clears the whole catalog and closes any open session. Callers must
    /// obtain explicit user confirmation before invoking this.
    pub async fn close_all(&mut self) {
        self.catalog.clear();
        self.persist_catalog().await;
        self.close_session();
        self.refresh_catalog_view();
    }

    /// Bookmarks the open document's current page. Idempotent: a page that
    /// is already bookmarked triggers neither a mutation nor a save.
    pub async fn bookmark_current_page(&mut self) {
        let Some((path, page)) = self
            .session
            .as_ref()
            .map(|session| (session.path.clone(), session.current_page))
        else {
            return;
        };
        let pages = self.bookmarks.entry(path.clone()).or_default();
        if pages.contains(&page) {
            return;
        }
        pages.push(page);
        self.persist_bookmarks().await;
        let pages = self.bookmarks_for(&path);
        self.view.show_bookmarks(&pages);
    }

    /// Removes exactly the matching page number from the open document's
    /// bookmark set.
    pub async fn remove_bookmark(&mut self, page: u32) {
        let Some(path) = self.session.as_ref().map(|session| session.path.clone()) else {
            return;
        };
        let Some(pages) = self.bookmarks.get_mut(&path) else {
            return;
        };
        let before = pages.len();
        pages.retain(|&p| p != page);
        if pages.len() == before {
            return;
        }
        self.persist_bookmarks().await;
        let pages = self.bookmarks_for(&path);
        self.view.show_bookmarks(&pages);
    }

    pub fn bookmarks_for(&self, path: &Path) -> Vec<u32> {
        self.bookmarks.get(path).cloned().unwrap_or_default()
    }

    /// Case-insensitive display-name filter for the catalog list. Affects
    /// only what the view shows, never the persisted catalog.
    pub fn set_filter(&mut self, term: &str) {
        self.filter = term.to_lowercase();
        self.refresh_catalog_view();
    }

    fn close_session(&mut self) {
        if self.session.take().is_some() {
            self.view.clear_pages();
            self.view.set_page_indicator(0, 0);
            self.view.show_bookmarks(&[]);
        }
    }

    fn refresh_catalog_view(&mut self) {
        if self.filter.is_empty() {
            let entries = self.catalog.clone();
            self.view.show_catalog(&entries);
            return;
        }
        let filtered: Vec<CatalogEntry> = self
            .catalog
            .iter()
            .filter(|entry| entry.display_name.to_lowercase().contains(&self.filter))
            .cloned()
            .collect();
        self.view.show_catalog(&filtered);
    }

    async fn persist_catalog(&mut self) {
        if let Err(err) = self.catalog_store.save(&self.catalog).await {
            warn!(error = %err, "failed to persist catalog");
        }
    }

    async fn persist_bookmarks(&mut self) {
        if let Err(err) = self.bookmark_store.save(&self.bookmarks).await {
            warn!(error = %err, "failed to persist bookmarks");
            self.view
                .notify(&format!("Failed to save bookmarks: {err}"));
        }
    }

    #[cfg(test)]
    fn set_scroll_guard(&mut self, value: bool) {
        self.scroll_guard = value;
    }
}
