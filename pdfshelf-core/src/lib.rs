use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

pub mod config;
pub mod coordinator;
mod error;

pub use config::ViewerConfig;
pub use coordinator::{Coordinator, SessionState};
pub use error::{LoadError, RenderError, StoreError, ViewerError};

/// One persisted catalog record. The path is the entry's identity: no two
/// catalog entries may share a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub path: PathBuf,
    pub display_name: String,
}

impl CatalogEntry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let display_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self { path, display_name }
    }
}

/// Bookmarks per document path: page numbers in insertion order, no
/// duplicates within one document. An emptied list is kept, not pruned.
pub type BookmarkMap = BTreeMap<PathBuf, Vec<u32>>;

/// Native page dimensions in document units (PDF points).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

/// Rasterization parameters for one page, derived from the container
/// width, the page's native width, the zoom factor, and the device pixel
/// ratio. Never stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportSpec {
    pub scale: f32,
    pub pixel_ratio: f32,
    pub pixel_width: u32,
    pub pixel_height: u32,
}

impl ViewportSpec {
    pub fn fit(native: PageSize, container_width: f32, zoom: f32, pixel_ratio: f32) -> Self {
        let width = native.width.max(1.0);
        let scale = (container_width.max(1.0) / width) * zoom;
        let pixel_width = (native.width * scale * pixel_ratio).round().max(1.0) as u32;
        let pixel_height = (native.height * scale * pixel_ratio).round().max(1.0) as u32;
        Self {
            scale,
            pixel_ratio,
            pixel_width,
            pixel_height,
        }
    }

    /// Logical (pre-pixel-ratio) height of the rasterized page in the view.
    pub fn logical_height(&self) -> f32 {
        self.pixel_height as f32 / self.pixel_ratio.max(f32::EPSILON)
    }
}

/// RGBA8 raster output for one page.
#[derive(Debug, Clone)]
pub struct PixelSurface {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Vertical placement of one displayed page surface, in logical pixels
/// from the top of the page column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageExtent {
    pub page: u32,
    pub top: f32,
    pub height: f32,
}

impl PageExtent {
    pub fn center(&self) -> f32 {
        self.top + self.height / 2.0
    }
}

/// Geometry of the scrollable container the coordinator renders into.
#[derive(Debug, Clone, Copy)]
pub struct ViewMetrics {
    pub container_width: f32,
    pub viewport_height: f32,
    pub pixel_ratio: f32,
}

#[async_trait::async_trait]
pub trait CatalogStore: Send + Sync {
    async fn load(&self) -> Result<Vec<CatalogEntry>, StoreError>;
    async fn save(&self, entries: &[CatalogEntry]) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
pub trait BookmarkStore: Send + Sync {
    async fn load(&self) -> Result<BookmarkMap, StoreError>;
    async fn save(&self, bookmarks: &BookmarkMap) -> Result<(), StoreError>;
}

/// Filesystem access and document parsing, kept behind one seam so the
/// coordinator never touches the disk directly.
#[async_trait::async_trait]
pub trait DocumentLoader: Send + Sync {
    fn file_exists(&self, path: &Path) -> bool;
    /// Returns `None` when the file cannot be read.
    async fn read_bytes(&self, path: &Path) -> Option<Vec<u8>>;
    async fn parse(&self, bytes: Vec<u8>) -> Result<Arc<dyn DocumentBackend>, LoadError>;
}

/// An open document: fixed page count plus per-page geometry and
/// rasterization. Pages are 1-indexed throughout.
pub trait DocumentBackend: Send + Sync {
    fn page_count(&self) -> u32;
    fn page_size(&self, page: u32) -> Result<PageSize, RenderError>;
    fn render_page(&self, page: u32, spec: &ViewportSpec) -> Result<PixelSurface, RenderError>;
}

/// User file selection dialog (PDF-only filter). Returns an empty vec when
/// the dialog is cancelled.
#[async_trait::async_trait]
pub trait FilePicker: Send + Sync {
    async fn pick_files(&self) -> Vec<CatalogEntry>;
}

/// The display elements the coordinator reads and writes. Implementations
/// own the rendered page column; the coordinator is the sole mutator of
/// everything behind this trait.
pub trait ViewSurface: Send {
    fn metrics(&self) -> ViewMetrics;
    fn clear_pages(&mut self);
    fn append_page(&mut self, page: u32, surface: PixelSurface);
    /// Extents of the displayed surfaces, in ascending page order.
    fn page_extents(&self) -> Vec<PageExtent>;
    fn scroll_to_page(&mut self, page: u32);
    fn set_page_indicator(&mut self, current: u32, total: u32);
    fn set_zoom_indicator(&mut self, zoom: f32);
    fn show_catalog(&mut self, entries: &[CatalogEntry]);
    fn show_bookmarks(&mut self, pages: &[u32]);
    fn notify(&mut self, message: &str);
}

/// In-memory catalog store used by tests and as a last-resort fallback.
/// Counts saves so callers can assert on persistence batching.
#[derive(Default)]
pub struct MemoryCatalogStore {
    inner: Mutex<Vec<CatalogEntry>>,
    saves: Mutex<usize>,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<CatalogEntry>) -> Self {
        Self {
            inner: Mutex::new(entries),
            saves: Mutex::new(0),
        }
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }

    pub fn entries(&self) -> Vec<CatalogEntry> {
        self.inner.lock().clone()
    }
}

#[async_trait::async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn load(&self) -> Result<Vec<CatalogEntry>, StoreError> {
        Ok(self.inner.lock().clone())
    }

    async fn save(&self, entries: &[CatalogEntry]) -> Result<(), StoreError> {
        *self.inner.lock() = entries.to_vec();
        *self.saves.lock() += 1;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryBookmarkStore {
    inner: Mutex<BookmarkMap>,
    saves: Mutex<usize>,
}

impl MemoryBookmarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bookmarks(bookmarks: BookmarkMap) -> Self {
        Self {
            inner: Mutex::new(bookmarks),
            saves: Mutex::new(0),
        }
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }

    pub fn bookmarks(&self) -> BookmarkMap {
        self.inner.lock().clone()
    }
}

#[async_trait::async_trait]
impl BookmarkStore for MemoryBookmarkStore {
    async fn load(&self) -> Result<BookmarkMap, StoreError> {
        Ok(self.inner.lock().clone())
    }

    async fn save(&self, bookmarks: &BookmarkMap) -> Result<(), StoreError> {
        *self.inner.lock() = bookmarks.clone();
        *self.saves.lock() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_entry_derives_display_name_from_file_name() {
        let entry = CatalogEntry::new("/books/intro to systems.pdf");
        assert_eq!(entry.display_name, "intro to systems.pdf");
    }

    #[test]
    fn viewport_spec_scales_to_container_width() {
        let native = PageSize {
            width: 600.0,
            height: 800.0,
        };
        let spec = ViewportSpec::fit(native, 1200.0, 1.0, 1.0);
        assert!((spec.scale - 2.0).abs() < 1e-5);
        assert_eq!(spec.pixel_width, 1200);
        assert_eq!(spec.pixel_height, 1600);
    }

    #[test]
    fn viewport_spec_applies_zoom_and_pixel_ratio() {
        let native = PageSize {
            width: 500.0,
            height: 500.0,
        };
        let spec = ViewportSpec::fit(native, 1000.0, 1.5, 2.0);
        assert!((spec.scale - 3.0).abs() < 1e-5);
        assert_eq!(spec.pixel_width, 3000);
        assert!((spec.logical_height() - 1500.0).abs() < 1e-3);
    }

    #[test]
    fn viewport_spec_survives_degenerate_native_width() {
        let native = PageSize {
            width: 0.0,
            height: 100.0,
        };
        let spec = ViewportSpec::fit(native, 800.0, 1.0, 1.0);
        assert!(spec.scale.is_finite());
        assert!(spec.pixel_width >= 1);
    }

    #[tokio::test]
    async fn memory_stores_round_trip() {
        let catalog = MemoryCatalogStore::new();
        let entries = vec![CatalogEntry::new("/tmp/a.pdf")];
        catalog.save(&entries).await.unwrap();
        assert_eq!(catalog.load().await.unwrap(), entries);
        assert_eq!(catalog.save_count(), 1);

        let bookmarks = MemoryBookmarkStore::new();
        let mut map = BookmarkMap::new();
        map.insert(PathBuf::from("/tmp/a.pdf"), vec![3, 1]);
        bookmarks.save(&map).await.unwrap();
        assert_eq!(bookmarks.load().await.unwrap(), map);
    }
}
