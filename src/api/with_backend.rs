//! One-shot operations over an explicit rendering engine

use std::io::Cursor;
use std::sync::Arc;

use image::ImageFormat;

use super::{OperationError, with_session};
use crate::pdf::{RasterError, RenderBackend, RenderSize};

/// Render one page (1-based) to PNG bytes. Width wins over scale when both
/// are given; zero means unspecified for either.
pub fn render_page_to_png(
    backend: Arc<dyn RenderBackend>,
    page: u16,
    width: u16,
    scale: f32,
    payload: &[u8],
) -> Result<Vec<u8>, OperationError> {
    with_session("render_page_to_png", backend, payload, |raster| {
        let img = raster
            .render_image(usize::from(page), RenderSize::new(width, scale))
            .map_err(|source| OperationError::Render { page, source })?;

        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|source| OperationError::Encode { page, source })?;
        Ok(png)
    })
}

/// Render one page (1-based) to SVG text
pub fn render_page_to_svg(
    backend: Arc<dyn RenderBackend>,
    page: u16,
    width: u16,
    scale: f32,
    payload: &[u8],
) -> Result<String, OperationError> {
    with_session("render_page_to_svg", backend, payload, |raster| {
        raster
            .render_vector(usize::from(page), RenderSize::new(width, scale))
            .map_err(|source| OperationError::Render { page, source })
    })
}

/// Number of pages in the document
pub fn count_pages(backend: Arc<dyn RenderBackend>, payload: &[u8]) -> Result<usize, OperationError> {
    with_session("count_pages", backend, payload, |raster| {
        raster
            .page_count()
            .ok_or(OperationError::Open(RasterError::NotStarted))
    })
}

/// Pixel size a page (1-based) renders at for the given width/scale
pub fn page_dimensions(
    backend: Arc<dyn RenderBackend>,
    page: u16,
    width: u16,
    scale: f32,
    payload: &[u8],
) -> Result<(u32, u32), OperationError> {
    with_session("page_dimensions", backend, payload, |raster| {
        raster
            .resolve(usize::from(page), RenderSize::new(width, scale))
            .map(|resolved| (resolved.width_px, resolved.height_px))
            .map_err(|source| OperationError::Render { page, source })
    })
}
