//! Core types for page rasterization

use image::RgbImage;

/// Clockwise page rotation, as stored in the document
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Normalize a raw rotation in degrees.
    ///
    /// Any multiple of 90 is accepted (so `-90` is `Deg270` and `450` is `Deg90`).
    /// Anything else is treated as unrotated, the same way viewers ignore a
    /// malformed `/Rotate` entry.
    #[must_use]
    pub fn from_degrees(degrees: i32) -> Self {
        match degrees.rem_euclid(360) {
            90 => Self::Deg90,
            180 => Self::Deg180,
            270 => Self::Deg270,
            _ => Self::Deg0,
        }
    }

    #[must_use]
    pub const fn degrees(self) -> u16 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    /// Returns true if the rotation swaps the page's width and height
    #[must_use]
    pub const fn is_sideways(self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }
}

/// Native page size (rotation 0) plus the page's intrinsic rotation
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageGeometry {
    /// Width in points at rotation 0
    pub width: f32,
    /// Height in points at rotation 0
    pub height: f32,
    pub rotation: Rotation,
}

impl PageGeometry {
    #[must_use]
    pub const fn new(width: f32, height: f32, rotation: Rotation) -> Self {
        Self {
            width,
            height,
            rotation,
        }
    }

    /// Width and height after the page rotation has been applied
    #[must_use]
    pub fn oriented_size(&self) -> (f32, f32) {
        if self.rotation.is_sideways() {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        }
    }

    #[must_use]
    pub fn is_landscape(&self) -> bool {
        let (width, height) = self.oriented_size();
        width > height
    }
}

/// Document metadata gathered once when a session starts
#[derive(Clone, Debug)]
pub struct DocumentInfo {
    /// Per-page geometry, indexed by 0-based page index
    pub pages: Vec<PageGeometry>,
    /// True if any page is wider than tall once rotated
    pub landscape: bool,
}

impl DocumentInfo {
    #[must_use]
    pub fn new(pages: Vec<PageGeometry>) -> Self {
        let landscape = pages.iter().any(PageGeometry::is_landscape);
        Self { pages, landscape }
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Geometry for a 1-based page number
    #[must_use]
    pub fn page(&self, page: usize) -> Option<&PageGeometry> {
        page.checked_sub(1).and_then(|index| self.pages.get(index))
    }
}

/// What a request should produce
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputKind {
    Image,
    Vector,
}

impl OutputKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Vector => "svg",
        }
    }
}

/// Rendered output handed back to the caller
pub enum Artifact {
    Image(RgbImage),
    Vector(String),
}

impl std::fmt::Debug for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Image(img) => f
                .debug_struct("Image")
                .field("width", &img.width())
                .field("height", &img.height())
                .finish_non_exhaustive(),
            Self::Vector(svg) => f
                .debug_struct("Vector")
                .field("len", &svg.len())
                .finish_non_exhaustive(),
        }
    }
}
