//! # officekit-core
//!
//! Safe lifecycle management for a shared native document engine
//! (LibreOfficeKit).
//!
//! The engine does all parsing, layout and rendering. This crate makes
//! sure it is started once, that every document handle it hands out is
//! released exactly once, that tile buffers are always freed, and that no
//! two calls into the engine ever overlap.
//!
//! - [`Office`] starts and tears down the engine and opens documents
//! - [`DocumentSession`] wraps one open document
//! - [`render`] turns painted tiles into images and PNG files
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use officekit_core::{EngineConfig, ExportFormat, Office, OfficeConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let office = Office::libreoffice(OfficeConfig::default())?;
//!     office.initialize(&EngineConfig::default())?;
//!
//!     // One-shot conversion, closing the document afterwards
//!     office.convert("report.docx", "report.pdf", ExportFormat::Pdf)?;
//!
//!     // Render slide 3 of a deck
//!     let deck = office.open_document("deck.pptx")?;
//!     let image = deck.render_page(800, 600, 2)?;
//!     image.save("slide3.png")?;
//!     deck.close();
//!
//!     office.destroy()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Async
//!
//! ```rust,no_run
//! use officekit_core::{EngineConfig, Office, OfficeConfig, RenderRequest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let office = Office::libreoffice(OfficeConfig::default())?;
//!     office.initialize(&EngineConfig::default())?;
//!
//!     office.convert_to_pdf_async("sheet.xlsx", "sheet.pdf").await?;
//!
//!     let request = RenderRequest::new("deck.pptx", "./slides", 1280, 720);
//!     let result = office.render_to_png_async(request).await?;
//!     println!("Rendered {} pages", result.page_count);
//!     Ok(())
//! }
//! ```

pub mod buffer;
pub mod config;
pub mod engine;
pub mod error;
#[cfg(unix)]
pub mod lok;
pub mod mock;
pub mod office;
pub mod render;
pub mod session;

pub use buffer::{BufferAllocator, BufferLease, HeapAllocator, TileBuffer};
pub use config::{
    BatchResult, ConversionRequest, EngineConfig, FailedFile, FileResult, OfficeConfig,
    RenderConfig, RenderRequest,
};
pub use engine::{Backend, DocumentHandle, DocumentKind, Engine, ExportFormat, TileMode, UnoCommand};
pub use error::{ErrorKind, OfficeError, Result};
#[cfg(unix)]
pub use lok::LibreOfficeKit;
pub use office::{EngineVersion, Office};
pub use render::RenderedPage;
pub use session::DocumentSession;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Document extensions the engine is commonly asked to open.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "docx", "doc", "odt", "rtf", "xlsx", "xls", "ods", "csv", "pptx", "ppt", "odp", "odg", "pdf",
];

/// Check if a file extension is supported.
pub fn is_supported_extension(ext: &str) -> bool {
    SUPPORTED_EXTENSIONS
        .iter()
        .any(|&e| e.eq_ignore_ascii_case(ext))
}

/// Initialize the library's logging.
/// Call this once at application startup if you want to see logs.
pub fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();
}

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
