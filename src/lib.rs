//! On-demand page rasterization for many concurrent callers sharing one
//! opened document.

pub mod api;
pub mod pdf;
pub mod settings;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use pdf::{
    DocumentSource, OutputKind, PageGeometry, RasterError, Rasterizer, RenderBackend, RenderSize,
    Rotation,
};
pub use settings::{ConfigError, RasterConfig};
