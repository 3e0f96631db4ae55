//! MuPDF-backed rendering engine

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use image::RgbImage;
use log::{debug, warn};
use mupdf::pdf::PdfDocument;
use mupdf::{Colorspace, Document, Matrix, Pixmap};

use super::{PageSource, RenderBackend, bad_index};
use crate::pdf::request::RasterError;
use crate::pdf::types::Rotation;

const PDF_MAGIC: &str = "application/pdf";

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    // MuPDF documents cannot be shared between threads, so every render thread
    // opens its own copy from the shared bytes on first use.
    static OPENED: RefCell<HashMap<u64, Document>> = RefCell::new(HashMap::new());
}

/// Renders PDF documents with MuPDF
#[derive(Clone, Copy, Debug, Default)]
pub struct MupdfBackend;

impl MupdfBackend {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl RenderBackend for MupdfBackend {
    fn name(&self) -> &'static str {
        "mupdf"
    }

    fn open(&self, bytes: Arc<[u8]>) -> Result<Box<dyn PageSource>, RasterError> {
        let doc = PdfDocument::from_bytes(&bytes).map_err(|e| RasterError::open_failed(e.to_string()))?;
        let page_count = doc
            .page_count()
            .map_err(|e| RasterError::open_failed(e.to_string()))?;
        let page_count = usize::try_from(page_count).unwrap_or(0);

        let mut pages = Vec::with_capacity(page_count);
        for index in 0..page_count {
            let number = engine_index(index, page_count)?;
            pages.push(read_page_meta(&doc, number).map_err(|e| {
                RasterError::open_failed(format!("page {}: {e}", index + 1))
            })?);
        }

        let id = NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed);
        debug!("Opened document {id} with {page_count} pages");

        Ok(Box::new(MupdfSource { id, bytes, pages }))
    }
}

/// MuPDF page index for a 0-based index, refusing ones it cannot address
fn engine_index(index: usize, page_count: usize) -> Result<i32, RasterError> {
    i32::try_from(index).map_err(|_| bad_index(index, page_count))
}

#[derive(Clone, Copy, Debug)]
struct PageMeta {
    rotation: Rotation,
    native: (f32, f32),
}

fn read_page_meta(doc: &PdfDocument, index: i32) -> Result<PageMeta, mupdf::error::Error> {
    let rotation = doc
        .find_page(index)?
        .get_dict_inheritable("Rotate")?
        .map(|obj| obj.as_int())
        .transpose()?
        .map_or(Rotation::Deg0, Rotation::from_degrees);

    // MuPDF reports bounds with the rotation already applied
    let bounds = doc.load_page(index)?.bounds()?;
    let width = (bounds.x1 - bounds.x0).abs();
    let height = (bounds.y1 - bounds.y0).abs();
    let native = if rotation.is_sideways() {
        (height, width)
    } else {
        (width, height)
    };

    Ok(PageMeta { rotation, native })
}

struct MupdfSource {
    id: u64,
    bytes: Arc<[u8]>,
    pages: Vec<PageMeta>,
}

impl MupdfSource {
    fn meta(&self, index: usize) -> Result<&PageMeta, RasterError> {
        self.pages
            .get(index)
            .ok_or_else(|| bad_index(index, self.pages.len()))
    }

    fn with_page<T>(
        &self,
        index: usize,
        f: impl FnOnce(&mupdf::Page) -> Result<T, mupdf::error::Error>,
    ) -> Result<T, RasterError> {
        self.meta(index)?;
        let number = engine_index(index, self.pages.len())?;
        let fail = |e: mupdf::error::Error| RasterError::render_failed(index + 1, e.to_string());

        OPENED.with(|opened| {
            let mut opened = opened.borrow_mut();
            if !opened.contains_key(&self.id) {
                let doc = Document::from_bytes(&self.bytes, PDF_MAGIC).map_err(fail)?;
                opened.insert(self.id, doc);
            }
            let Some(doc) = opened.get(&self.id) else {
                return Err(RasterError::render_failed(index + 1, "document not loaded"));
            };
            let page = doc.load_page(number).map_err(fail)?;
            f(&page).map_err(fail)
        })
    }
}

impl PageSource for MupdfSource {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_rotation(&self, index: usize) -> Result<Rotation, RasterError> {
        self.meta(index).map(|meta| meta.rotation)
    }

    fn page_native_size(&self, index: usize) -> Result<(f32, f32), RasterError> {
        self.meta(index).map(|meta| meta.native)
    }

    fn render_image(&self, index: usize, scale: f32) -> Result<RgbImage, RasterError> {
        let pixmap = self.with_page(index, |page| {
            let rgb = Colorspace::device_rgb();
            page.to_pixmap(&Matrix::new_scale(scale, scale), &rgb, false, false)
        })?;
        pixmap_to_image(&pixmap).map_err(|reason| RasterError::render_failed(index + 1, reason))
    }

    fn render_vector(&self, index: usize, scale: f32) -> Result<String, RasterError> {
        self.with_page(index, |page| page.to_svg(&Matrix::new_scale(scale, scale)))
    }
}

impl Drop for MupdfSource {
    fn drop(&mut self) {
        // Only the dropping thread's copy can be released here; render threads
        // release theirs when the render pool shuts down.
        let _ = OPENED.try_with(|opened| opened.borrow_mut().remove(&self.id));
    }
}

fn pixmap_to_image(pixmap: &Pixmap) -> Result<RgbImage, String> {
    let n = pixmap.n() as usize;
    if n < 3 {
        return Err(format!("Unsupported pixmap format: {n} channels"));
    }

    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    let stride = pixmap.stride() as usize;
    let samples = pixmap.samples();
    let row_bytes = width * n;
    let expected_min = stride.saturating_mul(height);
    if samples.len() < expected_min || row_bytes > stride {
        warn!("Pixmap buffer size mismatch: {} < {expected_min}", samples.len());
        return Err("Pixmap buffer size mismatch".to_string());
    }

    let mut out = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        let row_start = y * stride;
        let row = &samples[row_start..row_start + row_bytes];
        if n == 3 {
            out.extend_from_slice(row);
        } else {
            for px in row.chunks_exact(n) {
                out.extend_from_slice(&px[..3]);
            }
        }
    }

    RgbImage::from_raw(pixmap.width(), pixmap.height(), out)
        .ok_or_else(|| "Pixmap dimensions do not match its samples".to_string())
}
