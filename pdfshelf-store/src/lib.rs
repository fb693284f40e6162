//! File-backed catalog and bookmark stores.
//!
//! Both stores are plain JSON files that are loaded once at startup and
//! rewritten wholesale on every mutation. Writes go through a temp file in
//! the same directory followed by a rename, so a crash mid-write never
//! leaves a truncated store behind.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use pdfshelf_core::{BookmarkMap, BookmarkStore, CatalogEntry, CatalogStore, StoreError};
use tracing::debug;

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }
    let mut file = File::open(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut buf = String::new();
    file.read_to_string(&mut buf)
        .map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let value = serde_json::from_str(&buf).map_err(|source| StoreError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(value))
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let payload = serde_json::to_string_pretty(value).map_err(StoreError::Encode)?;
    let tmp = path.with_extension("json.tmp");
    let io_err = |source| StoreError::Io {
        path: tmp.clone(),
        source,
    };
    let mut file = File::create(&tmp).map_err(io_err)?;
    file.write_all(payload.as_bytes()).map_err(io_err)?;
    file.flush().map_err(io_err)?;
    fs::rename(&tmp, path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StoreError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

/// Catalog persisted as a JSON array of `{path, display_name}` records.
pub struct FileCatalogStore {
    path: PathBuf,
}

impl FileCatalogStore {
    pub fn new(root: &Path) -> Result<Self, StoreError> {
        let path = root.join("catalog.json");
        ensure_parent(&path)?;
        Ok(Self { path })
    }
}

#[async_trait::async_trait]
impl CatalogStore for FileCatalogStore {
    async fn load(&self) -> Result<Vec<CatalogEntry>, StoreError> {
        let entries = read_json(&self.path)?.unwrap_or_default();
        debug!(path = %self.path.display(), "loaded catalog");
        Ok(entries)
    }

    async fn save(&self, entries: &[CatalogEntry]) -> Result<(), StoreError> {
        write_json(&self.path, &entries)
    }
}

/// Bookmarks persisted as a JSON object mapping document path to an array
/// of page numbers.
pub struct FileBookmarkStore {
    path: PathBuf,
}

impl FileBookmarkStore {
    pub fn new(root: &Path) -> Result<Self, StoreError> {
        let path = root.join("bookmarks.json");
        ensure_parent(&path)?;
        Ok(Self { path })
    }
}

#[async_trait::async_trait]
impl BookmarkStore for FileBookmarkStore {
    async fn load(&self) -> Result<BookmarkMap, StoreError> {
        let bookmarks = read_json(&self.path)?.unwrap_or_default();
        debug!(path = %self.path.display(), "loaded bookmarks");
        Ok(bookmarks)
    }

    async fn save(&self, bookmarks: &BookmarkMap) -> Result<(), StoreError> {
        write_json(&self.path, bookmarks)
    }
}
