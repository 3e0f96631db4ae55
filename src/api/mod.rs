//! One-shot operations over a fully buffered document
//!
//! Each call opens a fresh session, performs one operation and stops the
//! session again. The functions here use the MuPDF engine; the same
//! operations over any [`RenderBackend`] live in [`with_backend`].

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use log::debug;

use crate::pdf::{RasterError, Rasterizer, RenderBackend};
use crate::settings::RasterConfig;

pub mod with_backend;

/// Where a one-shot operation failed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Open,
    Render,
    Encode,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Open => "open",
            Self::Render => "render",
            Self::Encode => "encode",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("open stage failed: {0}")]
    Open(#[source] RasterError),

    #[error("render stage failed for page {page}: {source}")]
    Render {
        page: u16,
        #[source]
        source: RasterError,
    },

    #[error("encode stage failed for page {page}: {source}")]
    Encode {
        page: u16,
        #[source]
        source: image::ImageError,
    },
}

impl OperationError {
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::Open(_) => Stage::Open,
            Self::Render { .. } => Stage::Render,
            Self::Encode { .. } => Stage::Encode,
        }
    }

    #[must_use]
    pub fn page(&self) -> Option<u16> {
        match self {
            Self::Open(_) => None,
            Self::Render { page, .. } | Self::Encode { page, .. } => Some(*page),
        }
    }

    /// The session error behind an open or render failure
    #[must_use]
    pub fn raster_error(&self) -> Option<&RasterError> {
        match self {
            Self::Open(e) | Self::Render { source: e, .. } => Some(e),
            Self::Encode { .. } => None,
        }
    }
}

/// Backend used by the CLI and the convenience wrappers
#[cfg(feature = "pdf")]
#[must_use]
pub fn default_backend() -> Arc<dyn RenderBackend> {
    Arc::new(crate::pdf::backend::MupdfBackend::new())
}

/// Run `f` against a single-worker session over `payload`, stopping it after
fn with_session<T>(
    operation: &str,
    backend: Arc<dyn RenderBackend>,
    payload: &[u8],
    f: impl FnOnce(&Rasterizer) -> Result<T, OperationError>,
) -> Result<T, OperationError> {
    let started = Instant::now();
    let config = RasterConfig {
        workers: 1,
        ..RasterConfig::default()
    };
    let raster = Rasterizer::with_config(payload, backend, config);

    let result = raster.start().map_err(OperationError::Open).and_then(|()| f(&raster));
    raster.stop();

    match &result {
        Ok(_) => debug!("{operation} finished in {:?}", started.elapsed()),
        Err(e) => debug!("{operation} failed after {:?}: {e}", started.elapsed()),
    }
    result
}

/// Render one page (1-based) of a PDF to PNG bytes. Width wins over scale
/// when both are given; zero means unspecified for either.
#[cfg(feature = "pdf")]
pub fn render_page_to_png(
    page: u16,
    width: u16,
    scale: f32,
    payload: &[u8],
) -> Result<Vec<u8>, OperationError> {
    with_backend::render_page_to_png(default_backend(), page, width, scale, payload)
}

/// Render one page (1-based) of a PDF to SVG text
#[cfg(feature = "pdf")]
pub fn render_page_to_svg(
    page: u16,
    width: u16,
    scale: f32,
    payload: &[u8],
) -> Result<String, OperationError> {
    with_backend::render_page_to_svg(default_backend(), page, width, scale, payload)
}

/// Number of pages in a PDF
#[cfg(feature = "pdf")]
pub fn count_pages(payload: &[u8]) -> Result<usize, OperationError> {
    with_backend::count_pages(default_backend(), payload)
}

/// Pixel size a PDF page (1-based) renders at for the given width/scale
#[cfg(feature = "pdf")]
pub fn page_dimensions(
    page: u16,
    width: u16,
    scale: f32,
    payload: &[u8],
) -> Result<(u32, u32), OperationError> {
    with_backend::page_dimensions(default_backend(), page, width, scale, payload)
}
