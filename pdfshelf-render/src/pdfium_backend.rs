use std::convert::TryFrom;
use std::fs;
use std::mem;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use pdfium_render::prelude::*;
use pdfshelf_core::{
    DocumentBackend, DocumentLoader, LoadError, PageSize, PixelSurface, RenderError, ViewportSpec,
};
use tracing::{instrument, warn};

/// Binds a pdfium library once and hands out byte-parsed documents.
pub struct PdfiumDocumentLoader {
    pdfium: Arc<Pdfium>,
}

impl PdfiumDocumentLoader {
    pub fn new() -> Result<Self> {
        let pdfium = match bind_pdfium_from_build_hint() {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }
}

#[async_trait]
impl DocumentLoader for PdfiumDocumentLoader {
    fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    async fn read_bytes(&self, path: &Path) -> Option<Vec<u8>> {
        match fs::read(path) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read document bytes");
                None
            }
        }
    }

    async fn parse(&self, bytes: Vec<u8>) -> Result<Arc<dyn DocumentBackend>, LoadError> {
        // Validate and count pages up front so a bad document never
        // reaches the coordinator as a session.
        let page_count = {
            let document = self
                .pdfium
                .load_pdf_from_byte_slice(&bytes, None)
                .map_err(|err| LoadError::Parse(err.to_string()))?;
            u32::from(document.pages().len())
        };
        Ok(Arc::new(PdfiumDocument::new(
            Arc::clone(&self.pdfium),
            bytes,
            page_count,
        )))
    }
}

struct PdfiumDocument {
    // Field order matters: `document` holds references into `bytes` and
    // `pdfium` and must drop before either of them.
    document: Mutex<Option<PdfDocument<'static>>>,
    bytes: Box<[u8]>,
    pdfium: Arc<Pdfium>,
    page_count: u32,
}

impl PdfiumDocument {
    fn new(pdfium: Arc<Pdfium>, bytes: Vec<u8>, page_count: u32) -> Self {
        Self {
            document: Mutex::new(None),
            bytes: bytes.into_boxed_slice(),
            pdfium,
            page_count,
        }
    }

    fn open_document(&self) -> Result<PdfDocument<'static>> {
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(&self.bytes, None)
            .map_err(|err| anyhow!("failed to reopen parsed document: {err}"))?;
        // SAFETY: the returned PdfDocument borrows the Pdfium bindings and
        // the byte buffer, both owned by self. The heap allocation behind
        // self.bytes never moves, and struct fields drop in declaration
        // order, so the cached document is gone before bytes or pdfium.
        let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };
        Ok(document)
    }

    fn with_document<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&PdfDocument<'static>) -> Result<R>,
    {
        let mut guard = self.document.lock();
        if guard.is_none() {
            let document = self.open_document()?;
            *guard = Some(document);
        }
        let document = guard.as_ref().expect("document must be loaded");
        f(document)
    }

    fn page_index(&self, page: u32) -> Result<PdfPageIndex, RenderError> {
        if page < 1 || page > self.page_count {
            return Err(RenderError::PageOutOfRange {
                page,
                page_count: self.page_count,
            });
        }
        PdfPageIndex::try_from(page - 1).map_err(|_| RenderError::PageOutOfRange {
            page,
            page_count: self.page_count,
        })
    }
}

impl DocumentBackend for PdfiumDocument {
    fn page_count(&self) -> u32 {
        self.page_count
    }

    fn page_size(&self, page: u32) -> Result<PageSize, RenderError> {
        let index = self.page_index(page)?;
        self.with_document(|document| {
            let handle = document
                .pages()
                .get(index)
                .map_err(|err| anyhow!("page {page} lookup failed: {err}"))?;
            Ok(PageSize {
                width: handle.width().value,
                height: handle.height().value,
            })
        })
        .map_err(|err| RenderError::Backend {
            page,
            message: err.to_string(),
        })
    }

    #[instrument(skip(self, spec), fields(page, scale = spec.scale))]
    fn render_page(&self, page: u32, spec: &ViewportSpec) -> Result<PixelSurface, RenderError> {
        let index = self.page_index(page)?;
        let factor = (spec.scale * spec.pixel_ratio).max(0.01);
        self.with_document(|document| {
            let handle = document
                .pages()
                .get(index)
                .map_err(|err| anyhow!("page {page} lookup failed: {err}"))?;
            let config = PdfRenderConfig::new().scale_page_by_factor(factor);
            let bitmap = handle
                .render_with_config(&config)
                .map_err(|err| anyhow!("failed to rasterize page {page}: {err}"))?;
            let image = bitmap.as_image().to_rgba8();
            let (width, height) = (image.width(), image.height());
            Ok(PixelSurface {
                width,
                height,
                pixels: image.into_raw(),
            })
        })
        .map_err(|err| RenderError::Backend {
            page,
            message: err.to_string(),
        })
    }
}

fn bind_pdfium_from_build_hint() -> Option<Pdfium> {
    match option_env!("PDFSHELF_PDFIUM_LIBRARY_PATH") {
        Some(path) if !path.is_empty() => match Pdfium::bind_to_library(path) {
            Ok(bindings) => Some(Pdfium::new(bindings)),
            Err(err) => {
                warn!(
                    "failed to load Pdfium from build-provided path {}: {}",
                    path, err
                );
                None
            }
        },
        _ => None,
    }
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");

    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("{}: {}", cwd_path.display(), err));
        }
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; ensure it is installed ({})",
                errors.join(", ")
            ))
        }
    }
}
