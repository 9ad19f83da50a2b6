//! Engine lifecycle manager.
//!
//! [`Office`] owns the one engine instance a process may have. It moves
//! between three states:
//!
//! ```text
//! Uninitialized --initialize--> Ready --destroy--> Destroyed
//!                                 ^                    |
//!                                 +----initialize------+
//! ```
//!
//! Documents can only be opened while Ready. Every open document is a
//! [`DocumentSession`] that keeps the engine alive until it is closed, and
//! `destroy` refuses to run while any session is still open.

use crate::buffer::{BufferAllocator, HeapAllocator};
use crate::config::{
    BatchResult, ConversionRequest, EngineConfig, FailedFile, FileResult, OfficeConfig,
    RenderRequest,
};
use crate::engine::{Backend, Engine, ExportFormat};
use crate::error::{OfficeError, Result};
use crate::lock;
use crate::render;
use crate::session::{DocumentSession, EngineShared};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Version information reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EngineVersion {
    pub product_name: String,
    pub product_version: String,
    #[serde(default)]
    pub product_extension: String,
    #[serde(default)]
    pub build_id: String,
}

enum Lifecycle<E: Engine> {
    Uninitialized,
    Ready {
        shared: Arc<EngineShared<E>>,
        load_options: Option<String>,
    },
    Destroyed,
}

impl<E: Engine> Lifecycle<E> {
    fn name(&self) -> &'static str {
        match self {
            Lifecycle::Uninitialized => "uninitialized",
            Lifecycle::Ready { .. } => "ready",
            Lifecycle::Destroyed => "destroyed",
        }
    }
}

/// Safe front end to a document engine.
///
/// Cloning is cheap; all clones share the same engine and state.
pub struct Office<B: Backend> {
    inner: Arc<OfficeInner<B>>,
}

struct OfficeInner<B: Backend> {
    backend: B,
    config: OfficeConfig,
    allocator: Arc<dyn BufferAllocator>,
    /// Thread pool for PNG encoding.
    pool: rayon::ThreadPool,
    state: Mutex<Lifecycle<B::Engine>>,
}

impl<B: Backend> Clone for Office<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Backend> std::fmt::Debug for Office<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Office")
            .field("state", &lock(&self.inner.state).name())
            .field("config", &self.inner.config)
            .finish()
    }
}

#[cfg(unix)]
impl Office<crate::lok::LibreOfficeKit> {
    /// Manager backed by the installed LibreOffice.
    pub fn libreoffice(config: OfficeConfig) -> Result<Self> {
        Self::new(crate::lok::LibreOfficeKit::new(), config)
    }
}

impl<B: Backend> Office<B> {
    /// Create a manager. The engine is not started until
    /// [`Office::initialize`] is called.
    pub fn new(backend: B, config: OfficeConfig) -> Result<Self> {
        Self::with_allocator(backend, config, Arc::new(HeapAllocator::new()))
    }

    /// Create a manager that leases tile buffers from `allocator`.
    pub fn with_allocator(
        backend: B,
        config: OfficeConfig,
        allocator: Arc<dyn BufferAllocator>,
    ) -> Result<Self> {
        config.validate()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.render.render_threads)
            .build()
            .map_err(|e| OfficeError::InvalidConfig(format!("Failed to create thread pool: {}", e)))?;

        Ok(Self {
            inner: Arc::new(OfficeInner {
                backend,
                config,
                allocator,
                pool,
                state: Mutex::new(Lifecycle::Uninitialized),
            }),
        })
    }

    pub fn config(&self) -> &OfficeConfig {
        &self.inner.config
    }

    /// Start the engine. Calling this while already initialized does nothing.
    ///
    /// After a failed start the manager stays uninitialized and the call can
    /// be retried.
    pub fn initialize(&self, config: &EngineConfig) -> Result<()> {
        let mut state = lock(&self.inner.state);
        if let Lifecycle::Ready { .. } = *state {
            debug!("Office engine already initialized");
            return Ok(());
        }

        let start = Instant::now();
        let engine = self.inner.backend.start(config)?;
        *state = Lifecycle::Ready {
            shared: Arc::new(EngineShared::new(engine)),
            load_options: config.load_options.clone(),
        };

        info!("Office engine initialized in {:?}", start.elapsed());
        Ok(())
    }

    /// Whether the engine is running. Does not wait for document loads.
    pub fn is_ready(&self) -> bool {
        matches!(*lock(&self.inner.state), Lifecycle::Ready { .. })
    }

    /// Number of document sessions not yet closed.
    pub fn open_sessions(&self) -> usize {
        match &*lock(&self.inner.state) {
            Lifecycle::Ready { shared, .. } => shared.open_sessions(),
            _ => 0,
        }
    }

    /// Tear the engine down.
    ///
    /// Does nothing when the engine is not running. Fails with
    /// [`OfficeError::SessionsOpen`] while any document session is open.
    pub fn destroy(&self) -> Result<()> {
        let mut state = lock(&self.inner.state);
        let shared = match &*state {
            Lifecycle::Ready { shared, .. } => Arc::clone(shared),
            _ => return Ok(()),
        };

        let mut engine = lock(&shared.engine);
        let count = shared.open_sessions();
        if count > 0 {
            warn!("Refusing to destroy office engine with {} open session(s)", count);
            return Err(OfficeError::SessionsOpen { count });
        }

        drop(engine.take());
        drop(engine);
        *state = Lifecycle::Destroyed;

        info!("Office engine destroyed");
        Ok(())
    }

    /// Open a document with the default load options.
    pub fn open_document(&self, path: impl AsRef<Path>) -> Result<DocumentSession<B::Engine>> {
        self.open(path.as_ref(), None)
    }

    /// Open a document with explicit load options such as `Language=en-US`.
    pub fn open_document_with_options(
        &self,
        path: impl AsRef<Path>,
        options: &str,
    ) -> Result<DocumentSession<B::Engine>> {
        self.open(path.as_ref(), Some(options))
    }

    /// [`Office::open_document`] on the blocking thread pool.
    pub async fn open_document_async(
        &self,
        path: impl Into<PathBuf>,
    ) -> Result<DocumentSession<B::Engine>> {
        let office = self.clone();
        let path = path.into();
        tokio::task::spawn_blocking(move || office.open_document(path)).await?
    }

    fn open(&self, path: &Path, options: Option<&str>) -> Result<DocumentSession<B::Engine>> {
        // Load without the lifecycle lock. The session is registered under
        // the engine lock, the same lock `destroy` counts sessions under.
        let (shared, options) = match &*lock(&self.inner.state) {
            Lifecycle::Ready {
                shared,
                load_options,
            } => (
                Arc::clone(shared),
                options.map(str::to_string).or_else(|| load_options.clone()),
            ),
            _ => return Err(OfficeError::Uninitialized),
        };

        let start = Instant::now();
        let mut engine_guard = lock(&shared.engine);
        let engine = engine_guard.as_mut().ok_or(OfficeError::Uninitialized)?;
        let handle = match engine.load_document(&path.to_string_lossy(), options.as_deref()) {
            Some(handle) => handle,
            None => {
                let e = OfficeError::OpenFailed {
                    path: path.to_path_buf(),
                    message: engine
                        .last_error()
                        .filter(|m| !m.is_empty())
                        .unwrap_or_else(|| "engine could not load the document".to_string()),
                };
                debug!("Failed to open {:?}: {}", path, e);
                return Err(e);
            }
        };

        let session = DocumentSession::new(
            path.to_path_buf(),
            handle,
            Arc::clone(&shared),
            Arc::clone(&self.inner.allocator),
            self.inner.config.render.clone(),
        );
        drop(engine_guard);

        debug!("Opened {:?} in {:?}", path, start.elapsed());
        Ok(session)
    }

    /// Last error recorded by the engine. None if there is none or the
    /// engine is not running.
    pub fn last_error(&self) -> Option<String> {
        let state = lock(&self.inner.state);
        let Lifecycle::Ready { shared, .. } = &*state else {
            return None;
        };
        let mut engine = lock(&shared.engine);
        engine
            .as_mut()
            .and_then(|e| e.last_error())
            .filter(|m| !m.is_empty())
    }

    /// Engine product and version details.
    pub fn version_info(&self) -> Result<Option<EngineVersion>> {
        let state = lock(&self.inner.state);
        let Lifecycle::Ready { shared, .. } = &*state else {
            return Err(OfficeError::Uninitialized);
        };
        let raw = lock(&shared.engine)
            .as_mut()
            .ok_or(OfficeError::Uninitialized)?
            .version_info();

        Ok(raw.and_then(|json| match serde_json::from_str(&json) {
            Ok(version) => Some(version),
            Err(e) => {
                warn!("Unparseable engine version info {:?}: {}", json, e);
                None
            }
        }))
    }

    /// Convert `input` to `output` in the given format.
    ///
    /// The document is always closed afterwards. Unless atomic saving is
    /// disabled, a failed conversion leaves `output` untouched.
    pub fn convert(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        format: ExportFormat,
    ) -> Result<()> {
        self.convert_counting(input.as_ref(), output.as_ref(), format)
            .map(|_| ())
    }

    /// [`Office::convert`] reporting only success.
    pub fn convert_lossy(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        format: ExportFormat,
    ) -> bool {
        let input = input.as_ref();
        match self.convert(input, output, format) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to convert {:?}: {}", input, e);
                false
            }
        }
    }

    pub fn convert_to_pdf(&self, input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<()> {
        self.convert(input, output, ExportFormat::Pdf)
    }

    /// [`Office::convert`] on the blocking thread pool.
    pub async fn convert_async(
        &self,
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        format: ExportFormat,
    ) -> Result<()> {
        let office = self.clone();
        let (input, output) = (input.into(), output.into());
        tokio::task::spawn_blocking(move || office.convert(input, output, format)).await?
    }

    pub async fn convert_to_pdf_async(
        &self,
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Result<()> {
        self.convert_async(input, output, ExportFormat::Pdf).await
    }

    fn convert_counting(&self, input: &Path, output: &Path, format: ExportFormat) -> Result<usize> {
        let start = Instant::now();
        let session = self.open_document(input)?;

        let result = session.page_count().and_then(|pages| {
            if self.inner.config.atomic_save {
                save_staged(&session, output, format)?;
            } else {
                session.save_as(output, format)?;
            }
            Ok(pages)
        });
        session.close();

        if result.is_ok() {
            info!(
                "Converted {:?} to {} in {:?}",
                input,
                format,
                start.elapsed()
            );
        }
        result
    }

    fn convert_request(&self, request: ConversionRequest) -> std::result::Result<FileResult, FailedFile> {
        let start = Instant::now();
        match self.convert_counting(&request.input_path, &request.output_path, request.format) {
            Ok(page_count) => Ok(FileResult {
                input_path: request.input_path,
                output_paths: vec![request.output_path],
                page_count,
                duration: start.elapsed(),
            }),
            Err(e) => {
                error!("Failed to convert {:?}: {}", request.input_path, e);
                Err(FailedFile {
                    input_path: request.input_path,
                    error: e.to_string(),
                })
            }
        }
    }

    /// Run several conversions, collecting successes and failures.
    pub fn convert_batch(&self, requests: Vec<ConversionRequest>) -> BatchResult {
        let start = Instant::now();
        let mut successful = Vec::new();
        let mut failed = Vec::new();

        for request in requests {
            match self.convert_request(request) {
                Ok(result) => successful.push(result),
                Err(failure) => failed.push(failure),
            }
        }

        BatchResult {
            successful,
            failed,
            total_duration: start.elapsed(),
        }
    }

    /// [`Office::convert_batch`] with each conversion on the blocking pool.
    pub async fn convert_batch_async(&self, requests: Vec<ConversionRequest>) -> BatchResult {
        let start = Instant::now();

        let results: Vec<std::result::Result<FileResult, FailedFile>> = stream::iter(requests)
            .then(|request| {
                let office = self.clone();
                let input_path = request.input_path.clone();
                async move {
                    tokio::task::spawn_blocking(move || office.convert_request(request))
                        .await
                        .unwrap_or_else(|e| {
                            Err(FailedFile {
                                input_path,
                                error: OfficeError::from(e).to_string(),
                            })
                        })
                }
            })
            .collect()
            .await;

        let mut successful = Vec::new();
        let mut failed = Vec::new();
        for result in results {
            match result {
                Ok(file_result) => successful.push(file_result),
                Err(failure) => failed.push(failure),
            }
        }

        BatchResult {
            successful,
            failed,
            total_duration: start.elapsed(),
        }
    }

    /// Rasterize every page of a document and write one PNG per page.
    pub fn render_to_png(&self, request: &RenderRequest) -> Result<FileResult> {
        let start = Instant::now();
        let session = self.open_document(&request.input_path)?;
        let pages = session.render_pages(request.width, request.height);
        session.close();
        let pages = pages?;

        let output_paths = render::write_pages_png(
            &self.inner.pool,
            &pages,
            &request.output_dir,
            &request.get_output_prefix(),
            self.inner.config.render.png_compression,
        )?;

        info!(
            "Rendered {:?} to {} PNG pages in {:?}",
            request.input_path,
            output_paths.len(),
            start.elapsed()
        );

        Ok(FileResult {
            input_path: request.input_path.clone(),
            page_count: pages.len(),
            output_paths,
            duration: start.elapsed(),
        })
    }

    /// [`Office::render_to_png`] on the blocking thread pool.
    pub async fn render_to_png_async(&self, request: RenderRequest) -> Result<FileResult> {
        let office = self.clone();
        tokio::task::spawn_blocking(move || office.render_to_png(&request)).await?
    }
}

impl<B: Backend> Drop for OfficeInner<B> {
    fn drop(&mut self) {
        let state = self
            .state
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Lifecycle::Ready { shared, .. } = state {
            let open = shared.open_sessions();
            if open > 0 {
                warn!(
                    "Office dropped with {} open session(s); engine stays alive until they close",
                    open
                );
            } else {
                debug!("Office dropped while ready; releasing engine");
            }
        }
    }
}

/// Hidden sibling of `output` that a conversion writes before renaming.
fn staging_path(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let staged = format!(".{}.{}.partial", name, uuid::Uuid::new_v4());
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(staged),
        _ => PathBuf::from(staged),
    }
}

fn save_staged<E: Engine>(
    session: &DocumentSession<E>,
    output: &Path,
    format: ExportFormat,
) -> Result<()> {
    let staging = staging_path(output);

    let saved = session.save_as(&staging, format).and_then(|()| {
        std::fs::rename(&staging, output).map_err(|e| OfficeError::OutputDirError {
            path: output.to_path_buf(),
            message: e.to_string(),
        })
    });

    match saved {
        Ok(()) => Ok(()),
        Err(e) => {
            if staging.exists() {
                if let Err(remove_err) = std::fs::remove_file(&staging) {
                    warn!("Failed to remove staged output {:?}: {}", staging, remove_err);
                }
            }
            Err(match e {
                OfficeError::SaveFailed {
                    format, message, ..
                } => OfficeError::SaveFailed {
                    path: output.to_path_buf(),
                    format,
                    message,
                },
                other => other,
            })
        }
    }
}
