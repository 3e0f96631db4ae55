//! Rendering engine adapters
//!
//! The rasterizer never talks to a PDF library directly. It opens documents
//! through a [`RenderBackend`] and renders through the [`PageSource`] it gets
//! back. Page indices are 0-based at this boundary.

#[cfg(feature = "pdf")]
mod mupdf_backend;
#[cfg(any(test, feature = "test-utils"))]
pub mod synthetic;

use std::sync::Arc;

use image::RgbImage;

#[cfg(feature = "pdf")]
pub use self::mupdf_backend::MupdfBackend;
#[cfg(any(test, feature = "test-utils"))]
pub use self::synthetic::{RenderStats, SyntheticBackend};

use super::request::RasterError;
use super::types::{DocumentInfo, PageGeometry, Rotation};

/// Opens documents for rendering
pub trait RenderBackend: Send + Sync {
    /// Short name used in log lines
    fn name(&self) -> &'static str;

    /// Open a fully buffered document.
    ///
    /// Fails with [`RasterError::OpenFailed`] if the bytes are not a document
    /// this backend understands.
    fn open(&self, bytes: Arc<[u8]>) -> Result<Box<dyn PageSource>, RasterError>;
}

/// An opened document. Dropping it closes the document.
///
/// Implementations must tolerate concurrent calls for different pages. The
/// rasterizer never issues concurrent calls for the same page.
pub trait PageSource: Send + Sync {
    fn page_count(&self) -> usize;

    /// Intrinsic rotation of the page at `index`
    fn page_rotation(&self, index: usize) -> Result<Rotation, RasterError>;

    /// Width and height of the page at rotation 0
    fn page_native_size(&self, index: usize) -> Result<(f32, f32), RasterError>;

    /// Rasterize a page, rotation applied, at `scale`
    fn render_image(&self, index: usize, scale: f32) -> Result<RgbImage, RasterError>;

    /// Render a page to SVG text at `scale`
    fn render_vector(&self, index: usize, scale: f32) -> Result<String, RasterError>;
}

/// `BadPage` for a 0-based index
pub(crate) fn bad_index(index: usize, page_count: usize) -> RasterError {
    RasterError::BadPage {
        page: index + 1,
        page_count,
    }
}

/// Scan every page's geometry once
pub fn read_document_info(source: &dyn PageSource) -> Result<DocumentInfo, RasterError> {
    let pages = (0..source.page_count())
        .map(|index| {
            let rotation = source.page_rotation(index)?;
            let (width, height) = source.page_native_size(index)?;
            Ok(PageGeometry::new(width, height, rotation))
        })
        .collect::<Result<Vec<_>, RasterError>>()?;

    Ok(DocumentInfo::new(pages))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_helpers::SyntheticDoc;

    #[test]
    fn document_info_covers_every_page() {
        let bytes = SyntheticDoc::new()
            .page(612.0, 792.0)
            .rotated_page(595.0, 842.0, 90)
            .into_bytes();
        let source = SyntheticBackend::new().open(bytes).unwrap();

        let info = read_document_info(source.as_ref()).unwrap();
        assert_eq!(info.page_count(), 2);
        assert_eq!(info.pages[1].rotation, Rotation::Deg90);
        assert!(info.landscape);
    }

    #[test]
    fn bad_index_reports_page_number() {
        assert_eq!(
            bad_index(2, 2),
            RasterError::BadPage {
                page: 3,
                page_count: 2
            }
        );
    }
}
