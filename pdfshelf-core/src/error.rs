use std::path::PathBuf;

use thiserror::Error;

/// Failure while reading or writing one of the persisted stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access store file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode store file {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode store payload: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Failure while turning a catalog entry into an open document.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not read document bytes from {0}")]
    Unreadable(PathBuf),
    #[error("failed to parse document: {0}")]
    Parse(String),
}

/// Failure while rasterizing a single page.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("page {page} out of range 1..={page_count}")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("renderer failed on page {page}: {message}")]
    Backend { page: u32, message: String },
}

/// Coordinator-level failures surfaced to callers.
#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("{0} is not in the catalog")]
    NotInCatalog(PathBuf),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Persist(#[from] StoreError),
}
