//! Document sessions.
//!
//! A [`DocumentSession`] exclusively owns one engine document handle and
//! releases it exactly once, either through [`DocumentSession::close`] or
//! when the last clone of an unclosed session is dropped.
//!
//! Every call into a document handle holds the session lock and then the
//! engine lock shared by all sessions of that engine, so operations on one
//! engine never interleave. Multi-step operations such as rendering run
//! entirely under those locks.

use crate::buffer::{BufferAllocator, BufferLease};
use crate::config::RenderConfig;
use crate::engine::{DocumentHandle, DocumentKind, Engine, ExportFormat, TileMode, UnoCommand};
use crate::error::{OfficeError, Result};
use crate::lock;
use crate::render::{self, RenderedPage};
use image::RgbaImage;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, warn};

const PLAIN_TEXT_MIME: &str = "text/plain;charset=utf-8";

/// Engine instance shared by the manager and its sessions.
pub(crate) struct EngineShared<E: Engine> {
    /// None once the engine has been destroyed.
    pub(crate) engine: Mutex<Option<E>>,
    open_sessions: AtomicUsize,
}

impl<E: Engine> EngineShared<E> {
    pub(crate) fn new(engine: E) -> Self {
        Self {
            engine: Mutex::new(Some(engine)),
            open_sessions: AtomicUsize::new(0),
        }
    }

    pub(crate) fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }
}

/// An open document.
///
/// Cloning is cheap and yields another reference to the same document;
/// closing through any clone closes it for all of them.
pub struct DocumentSession<E: Engine> {
    inner: Arc<SessionInner<E>>,
}

struct SessionInner<E: Engine> {
    source_path: PathBuf,
    handle: Mutex<Option<E::Document>>,
    engine: Arc<EngineShared<E>>,
    allocator: Arc<dyn BufferAllocator>,
    render: RenderConfig,
}

impl<E: Engine> Clone for DocumentSession<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Engine> fmt::Debug for DocumentSession<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentSession")
            .field("source_path", &self.inner.source_path)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<E: Engine> DocumentSession<E> {
    pub(crate) fn new(
        source_path: PathBuf,
        handle: E::Document,
        engine: Arc<EngineShared<E>>,
        allocator: Arc<dyn BufferAllocator>,
        render: RenderConfig,
    ) -> Self {
        engine.open_sessions.fetch_add(1, Ordering::SeqCst);
        Self {
            inner: Arc::new(SessionInner {
                source_path,
                handle: Mutex::new(Some(handle)),
                engine,
                allocator,
                render,
            }),
        }
    }

    /// Path the document was opened from.
    pub fn source_path(&self) -> &Path {
        &self.inner.source_path
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.inner.handle).is_none()
    }

    fn with_handle<T>(&self, f: impl FnOnce(&mut E::Document, &mut E) -> Result<T>) -> Result<T> {
        let mut handle_guard = lock(&self.inner.handle);
        let handle = handle_guard.as_mut().ok_or_else(|| OfficeError::Closed {
            path: self.inner.source_path.clone(),
        })?;

        let mut engine_guard = lock(&self.inner.engine.engine);
        let engine = engine_guard.as_mut().ok_or(OfficeError::Uninitialized)?;

        f(handle, engine)
    }

    /// Kind of document.
    pub fn kind(&self) -> Result<DocumentKind> {
        self.with_handle(|doc, _| Ok(DocumentKind::from_code(doc.document_type())))
    }

    /// Document width in twips.
    pub fn width(&self) -> Result<i64> {
        self.size().map(|(w, _)| w)
    }

    /// Document height in twips.
    pub fn height(&self) -> Result<i64> {
        self.size().map(|(_, h)| h)
    }

    /// Document width and height in twips.
    pub fn size(&self) -> Result<(i64, i64)> {
        self.with_handle(|doc, _| Ok(doc.document_size()))
    }

    /// Number of pages, sheets or slides.
    pub fn page_count(&self) -> Result<usize> {
        self.with_handle(|doc, _| Ok(part_count(doc)))
    }

    /// Index of the active page.
    pub fn current_page(&self) -> Result<usize> {
        self.with_handle(|doc, _| Ok(doc.part().max(0) as usize))
    }

    /// Make `page` the active page.
    pub fn set_current_page(&self, page: usize) -> Result<()> {
        self.with_handle(|doc, _| {
            let part = checked_part(doc, page)?;
            doc.set_part(part);
            Ok(())
        })
    }

    /// Name of a page, sheet or slide.
    pub fn page_name(&self, index: usize) -> Result<Option<String>> {
        self.with_handle(|doc, _| {
            let part = checked_part(doc, index)?;
            Ok(doc.part_name(part).filter(|name| !name.is_empty()))
        })
    }

    /// Write the document to `output` in the given format.
    ///
    /// This is a long-running, blocking call. A failure may leave a partial
    /// file behind; [`crate::Office::convert`] stages output to avoid that.
    pub fn save_as(&self, output: impl AsRef<Path>, format: ExportFormat) -> Result<()> {
        let output = output.as_ref();
        let start = Instant::now();

        self.with_handle(|doc, engine| {
            let target = output.to_string_lossy();
            if doc.save_as(&target, format.extension(), Some(format.filter())) {
                debug!(
                    "Saved {:?} as {} to {:?} in {:?}",
                    self.inner.source_path,
                    format,
                    output,
                    start.elapsed()
                );
                Ok(())
            } else {
                Err(OfficeError::SaveFailed {
                    path: output.to_path_buf(),
                    format: format.to_string(),
                    message: engine
                        .last_error()
                        .filter(|m| !m.is_empty())
                        .unwrap_or_else(|| "engine reported failure".to_string()),
                })
            }
        })
    }

    /// Rasterize the whole of page `page_index` into a `width` x `height`
    /// image. The page becomes the active page.
    pub fn render_page(&self, width: u32, height: u32, page_index: usize) -> Result<RgbaImage> {
        let len = render::tile_len(width, height, self.inner.render.max_dimension)?;
        self.with_handle(|doc, _| self.paint_page(doc, len, width, height, page_index))
    }

    /// [`DocumentSession::render_page`] on the blocking thread pool.
    pub async fn render_page_async(
        &self,
        width: u32,
        height: u32,
        page_index: usize,
    ) -> Result<RgbaImage> {
        let session = self.clone();
        tokio::task::spawn_blocking(move || session.render_page(width, height, page_index)).await?
    }

    /// Render every page at the same size. The last page is left active.
    pub fn render_pages(&self, width: u32, height: u32) -> Result<Vec<RenderedPage>> {
        let len = render::tile_len(width, height, self.inner.render.max_dimension)?;
        let start = Instant::now();

        let pages = self.with_handle(|doc, _| {
            (0..part_count(doc))
                .map(|page_index| {
                    let image = self.paint_page(doc, len, width, height, page_index)?;
                    Ok(RenderedPage { page_index, image })
                })
                .collect::<Result<Vec<_>>>()
        })?;

        debug!(
            "Rendered {} pages of {:?} in {:?}",
            pages.len(),
            self.inner.source_path,
            start.elapsed()
        );
        Ok(pages)
    }

    fn paint_page(
        &self,
        doc: &mut E::Document,
        len: usize,
        width: u32,
        height: u32,
        page_index: usize,
    ) -> Result<RgbaImage> {
        let part = checked_part(doc, page_index)?;
        doc.set_part(part);
        doc.initialize_for_rendering(None);

        let mut lease = BufferLease::acquire(self.inner.allocator.as_ref(), len)?;

        let (doc_width, doc_height) = doc.document_size();
        doc.paint_tile(
            lease.as_mut_slice(),
            width as i32,
            height as i32,
            0,
            0,
            clamp_twips(doc_width),
            clamp_twips(doc_height),
        );

        lease.rewind();
        let mode = TileMode::from_code(doc.tile_mode());
        render::copy_tile(&mut lease, width, height, mode, &self.inner.render)
    }

    /// Current selection as plain text, None if nothing is selected.
    pub fn selected_text(&self) -> Result<Option<String>> {
        self.with_handle(|doc, _| {
            Ok(doc
                .text_selection(PLAIN_TEXT_MIME)
                .filter(|text| !text.is_empty()))
        })
    }

    /// Dispatch a formatting or editing command. The engine gives no
    /// confirmation; only a closed session is reported as an error.
    pub fn execute_command(
        &self,
        command: impl Into<UnoCommand>,
        arguments: Option<&str>,
    ) -> Result<()> {
        let command = command.into().dispatch_name();
        self.with_handle(|doc, _| {
            debug!("Dispatching {} to {:?}", command, self.inner.source_path);
            doc.post_uno_command(&command, arguments, false);
            Ok(())
        })
    }

    /// Release the document handle.
    ///
    /// Returns true if this call released it and false if the session was
    /// already closed. Never fails.
    pub fn close(&self) -> bool {
        let mut handle_guard = lock(&self.inner.handle);
        match handle_guard.take() {
            Some(handle) => {
                self.inner.release(handle);
                debug!("Closed document {:?}", self.inner.source_path);
                true
            }
            None => false,
        }
    }
}

impl<E: Engine> SessionInner<E> {
    fn release(&self, handle: E::Document) {
        let engine_guard = lock(&self.engine.engine);
        drop(handle);
        self.engine.open_sessions.fetch_sub(1, Ordering::SeqCst);
        drop(engine_guard);
    }
}

impl<E: Engine> Drop for SessionInner<E> {
    fn drop(&mut self) {
        let handle = self
            .handle
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            warn!(
                "Document session for {:?} dropped without close(); releasing it",
                self.source_path
            );
            self.release(handle);
        }
    }
}

fn part_count<D: DocumentHandle>(doc: &mut D) -> usize {
    doc.parts().max(0) as usize
}

fn checked_part<D: DocumentHandle>(doc: &mut D, index: usize) -> Result<i32> {
    let count = part_count(doc);
    if index >= count {
        return Err(OfficeError::PageOutOfRange { index, count });
    }
    Ok(index as i32)
}

fn clamp_twips(value: i64) -> i32 {
    value.clamp(0, i32::MAX as i64) as i32
}
