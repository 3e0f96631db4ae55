//! PDF rasterization infrastructure

pub mod backend;
mod geometry;
mod locks;
mod rasterizer;
mod request;
mod types;
mod worker;

pub use backend::{PageSource, RenderBackend};
pub use geometry::{DefaultScales, RenderSize, Resolved, resolve};
pub use locks::PageLocks;
pub use rasterizer::{DocumentSource, Rasterizer};
pub use request::{PendingReply, RasterError, RasterRequest, Reply, RequestId};
pub use types::*;
