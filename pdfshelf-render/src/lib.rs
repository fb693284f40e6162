//! pdfium-backed implementation of the document loader and page renderer
//! seams. Everything pdfium-specific sits behind the `pdf` feature so the
//! rest of the workspace builds without a pdfium library installed.

#[cfg(feature = "pdf")]
mod pdfium_backend;

#[cfg(feature = "pdf")]
pub use pdfium_backend::PdfiumDocumentLoader;
