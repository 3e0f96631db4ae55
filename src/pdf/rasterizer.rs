//! Rasterizer - owns one document session and its dispatcher

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, JoinHandle};

use flume::{Receiver, Sender};
use image::RgbImage;
use log::{debug, error, info, warn};

use super::backend::{PageSource, RenderBackend, read_document_info};
use super::geometry::{self, RenderSize, Resolved};
use super::locks::PageLocks;
use super::request::{PendingReply, RasterError, RasterRequest, RequestId};
use super::types::{Artifact, DocumentInfo, OutputKind};
use super::worker::{RenderContext, dispatch_loop};
use crate::settings::RasterConfig;

/// Where a session's document bytes come from
#[derive(Clone)]
pub enum DocumentSource {
    Path(PathBuf),
    Bytes(Arc<[u8]>),
}

impl DocumentSource {
    /// Read the whole document into memory
    pub fn load(&self) -> Result<Arc<[u8]>, RasterError> {
        match self {
            Self::Path(path) => std::fs::read(path)
                .map(Arc::from)
                .map_err(|e| RasterError::open_failed(format!("{}: {e}", path.display()))),
            Self::Bytes(bytes) => Ok(Arc::clone(bytes)),
        }
    }
}

impl fmt::Debug for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
        }
    }
}

impl fmt::Display for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

impl From<PathBuf> for DocumentSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for DocumentSource {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<Vec<u8>> for DocumentSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Arc::from(bytes))
    }
}

impl From<&[u8]> for DocumentSource {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(Arc::from(bytes))
    }
}

impl From<Arc<[u8]>> for DocumentSource {
    fn from(bytes: Arc<[u8]>) -> Self {
        Self::Bytes(bytes)
    }
}

/// A live session: queue, metadata and the dispatcher thread
struct Running {
    requests: Sender<RasterRequest>,
    /// Second handle on the queue, used at shutdown to answer whatever the
    /// dispatcher has not taken yet
    backlog: Receiver<RasterRequest>,
    info: Arc<DocumentInfo>,
    locks: Arc<PageLocks<RasterRequest>>,
    dispatcher: JoinHandle<()>,
}

impl Running {
    /// Refuse requests still in the queue, close it, let the dispatcher
    /// finish everything it already took, join it
    fn shutdown(self) {
        let Self {
            requests,
            backlog,
            info,
            locks,
            dispatcher,
        } = self;

        let mut refused = 0usize;
        for request in backlog.try_iter() {
            debug!("Refusing request {} queued before stop", request.id);
            request.respond(Err(RasterError::Stopped));
            refused += 1;
        }
        drop(backlog);
        drop(requests);
        let touched_pages = locks.len();
        drop(locks);
        drop(info);

        if dispatcher.join().is_err() {
            error!("Dispatcher thread panicked during shutdown");
        }
        info!("Rasterizer stopped ({touched_pages} distinct pages rendered, {refused} queued requests refused)");
    }
}

enum State {
    Unstarted,
    Running(Running),
    /// Start failed; the session is permanently unusable
    Failed(RasterError),
    Stopped,
}

struct Lifecycle {
    /// A start was attempted; never reset
    started: bool,
    state: State,
}

/// Renders pages of one document for many concurrent callers.
///
/// A `Rasterizer` is single-use: [`start`](Self::start) it once, render from
/// any number of threads, then [`stop`](Self::stop) it (dropping also stops).
/// Requests for the same page are serialized; different pages render in
/// parallel on the render pool.
pub struct Rasterizer {
    source: DocumentSource,
    backend: Arc<dyn RenderBackend>,
    config: RasterConfig,
    lifecycle: RwLock<Lifecycle>,
    next_request_id: AtomicU64,
}

impl Rasterizer {
    /// Create a rasterizer with default configuration
    #[must_use]
    pub fn new(source: impl Into<DocumentSource>, backend: Arc<dyn RenderBackend>) -> Self {
        Self::with_config(source, backend, RasterConfig::default())
    }

    /// Create a rasterizer with custom configuration
    #[must_use]
    pub fn with_config(
        source: impl Into<DocumentSource>,
        backend: Arc<dyn RenderBackend>,
        config: RasterConfig,
    ) -> Self {
        Self {
            source: source.into(),
            backend,
            config,
            lifecycle: RwLock::new(Lifecycle {
                started: false,
                state: State::Unstarted,
            }),
            next_request_id: AtomicU64::new(1),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Lifecycle> {
        self.lifecycle.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Lifecycle> {
        self.lifecycle.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the document and start serving requests.
    ///
    /// Only the first call can succeed; any later call fails with
    /// `AlreadyStarted`, whatever happened the first time.
    pub fn start(&self) -> Result<(), RasterError> {
        let mut lifecycle = self.write();
        if lifecycle.started {
            return Err(RasterError::AlreadyStarted);
        }
        if matches!(lifecycle.state, State::Stopped) {
            return Err(RasterError::Stopped);
        }
        lifecycle.started = true;

        match self.launch() {
            Ok(running) => {
                info!(
                    "Rasterizer started for {} ({} pages, landscape: {}, backend: {})",
                    self.source,
                    running.info.page_count(),
                    running.info.landscape,
                    self.backend.name()
                );
                lifecycle.state = State::Running(running);
                Ok(())
            }
            Err(e) => {
                warn!("Rasterizer failed to start for {}: {e}", self.source);
                lifecycle.state = State::Failed(e.clone());
                Err(e)
            }
        }
    }

    fn launch(&self) -> Result<Running, RasterError> {
        self.config
            .validate()
            .map_err(|e| RasterError::open_failed(e.to_string()))?;

        let bytes = self.source.load()?;
        let source: Arc<dyn PageSource> = Arc::from(self.backend.open(bytes)?);
        let info = read_document_info(source.as_ref()).map_err(|e| match e {
            e @ RasterError::OpenFailed { .. } => e,
            other => RasterError::open_failed(other.to_string()),
        })?;
        let info = Arc::new(info);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .thread_name(|i| format!("lazyraster-render-{i}"))
            .build()
            .map_err(|e| RasterError::open_failed(format!("cannot start render pool: {e}")))?;

        let (requests, request_rx) = flume::bounded(self.config.queue_capacity);
        let backlog = request_rx.clone();
        let locks = Arc::new(PageLocks::new());

        let ctx = RenderContext {
            source,
            info: Arc::clone(&info),
            locks: Arc::clone(&locks),
            defaults: self.config.default_scales(),
        };

        let dispatcher = thread::Builder::new()
            .name("lazyraster-dispatch".to_string())
            .spawn(move || dispatch_loop(ctx, request_rx, pool))
            .map_err(|e| RasterError::open_failed(format!("cannot start dispatcher: {e}")))?;

        Ok(Running {
            requests,
            backlog,
            info,
            locks,
            dispatcher,
        })
    }

    /// Stop serving requests.
    ///
    /// Every request the dispatcher already took is rendered and answered;
    /// requests still waiting in the queue are answered with `Stopped`. Safe to
    /// call at any time, any number of times. A stopped rasterizer cannot be
    /// restarted.
    pub fn stop(&self) {
        let running = {
            let mut lifecycle = self.write();
            match std::mem::replace(&mut lifecycle.state, State::Stopped) {
                State::Running(running) => running,
                State::Failed(e) => {
                    lifecycle.state = State::Failed(e);
                    return;
                }
                State::Unstarted | State::Stopped => return,
            }
        };
        // The lifecycle lock is released before joining so callers waiting on
        // it see `Stopped` instead of blocking behind the drain.
        running.shutdown();
    }

    /// Queue a request without waiting for it
    pub fn submit(
        &self,
        page: usize,
        size: RenderSize,
        kind: OutputKind,
    ) -> Result<PendingReply, RasterError> {
        let lifecycle = self.read();
        let running = match &lifecycle.state {
            State::Running(running) => running,
            State::Unstarted => return Err(RasterError::NotStarted),
            State::Failed(_) => return Err(RasterError::CleanedUp),
            State::Stopped => return Err(RasterError::Stopped),
        };

        let page_count = running.info.page_count();
        if page == 0 || page > page_count {
            return Err(RasterError::BadPage { page, page_count });
        }

        let id = RequestId::new(self.next_request_id.fetch_add(1, Ordering::Relaxed));
        let (request, pending) = RasterRequest::new(id, page, size, kind);
        debug!("Submitting request {id}: page {page} as {}", kind.as_str());

        running
            .requests
            .send(request)
            .map_err(|_| RasterError::Stopped)?;
        Ok(pending)
    }

    /// Render a page (1-based) to an RGB image, blocking until done
    pub fn render_image(&self, page: usize, size: RenderSize) -> Result<RgbImage, RasterError> {
        match self.submit(page, size, OutputKind::Image)?.wait()? {
            Artifact::Image(img) => Ok(img),
            Artifact::Vector(_) => Err(RasterError::render_failed(page, "expected an image")),
        }
    }

    /// Render a page (1-based) to SVG text, blocking until done
    pub fn render_vector(&self, page: usize, size: RenderSize) -> Result<String, RasterError> {
        match self.submit(page, size, OutputKind::Vector)?.wait()? {
            Artifact::Vector(svg) => Ok(svg),
            Artifact::Image(_) => Err(RasterError::render_failed(page, "expected an SVG")),
        }
    }

    /// Scale and pixel size a page would render at, without rendering it
    pub fn resolve(&self, page: usize, size: RenderSize) -> Result<Resolved, RasterError> {
        let info = self.running_info()?;
        let geometry = info.page(page).ok_or(RasterError::BadPage {
            page,
            page_count: info.page_count(),
        })?;
        Ok(geometry::resolve(
            geometry,
            size,
            info.landscape,
            self.config.default_scales(),
        ))
    }

    fn running_info(&self) -> Result<Arc<DocumentInfo>, RasterError> {
        match &self.read().state {
            State::Running(running) => Ok(Arc::clone(&running.info)),
            State::Unstarted => Err(RasterError::NotStarted),
            State::Failed(_) => Err(RasterError::CleanedUp),
            State::Stopped => Err(RasterError::Stopped),
        }
    }

    #[must_use]
    pub fn source(&self) -> &DocumentSource {
        &self.source
    }

    #[must_use]
    pub fn config(&self) -> &RasterConfig {
        &self.config
    }

    /// Page count of a running session
    #[must_use]
    pub fn page_count(&self) -> Option<usize> {
        self.document_info().map(|info| info.page_count())
    }

    /// Document-wide landscape flag of a running session
    #[must_use]
    pub fn is_landscape(&self) -> Option<bool> {
        self.document_info().map(|info| info.landscape)
    }

    #[must_use]
    pub fn document_info(&self) -> Option<Arc<DocumentInfo>> {
        self.running_info().ok()
    }

    /// True once a start was attempted, even after stopping
    #[must_use]
    pub fn has_started(&self) -> bool {
        self.read().started
    }

    /// True while the request queue exists
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        matches!(self.read().state, State::Running(_))
    }

    /// Pages with a lock in the registry; `None` once the registry is gone
    #[must_use]
    pub fn lock_registry_len(&self) -> Option<usize> {
        match &self.read().state {
            State::Running(running) => Some(running.locks.len()),
            _ => None,
        }
    }

    /// The error that made `start` fail, if it did
    #[must_use]
    pub fn open_error(&self) -> Option<RasterError> {
        match &self.read().state {
            State::Failed(e) => Some(e.clone()),
            _ => None,
        }
    }
}

impl fmt::Debug for Rasterizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rasterizer")
            .field("source", &self.source)
            .field("backend", &self.backend.name())
            .field("started", &self.has_started())
            .field("accepting", &self.is_accepting())
            .finish_non_exhaustive()
    }
}

impl Drop for Rasterizer {
    fn drop(&mut self) {
        self.stop();
    }
}
