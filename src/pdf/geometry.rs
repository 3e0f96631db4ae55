//! Scale resolution for page rendering
//!
//! Turns the caller's optional width/scale into the effective scale applied to a
//! page, taking the page rotation and the document-wide landscape flag into
//! account.

use super::types::PageGeometry;

/// Requested output size. Zero means "not specified" for either field.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RenderSize {
    /// Target width in pixels
    pub width: u16,
    /// Scale factor relative to the page's native size
    pub scale: f32,
}

impl RenderSize {
    #[must_use]
    pub const fn new(width: u16, scale: f32) -> Self {
        Self { width, scale }
    }

    #[must_use]
    pub const fn width(width: u16) -> Self {
        Self { width, scale: 0.0 }
    }

    #[must_use]
    pub const fn scale(scale: f32) -> Self {
        Self { width: 0, scale }
    }

    /// Neither width nor scale: the document default applies
    #[must_use]
    pub const fn auto() -> Self {
        Self {
            width: 0,
            scale: 0.0,
        }
    }

    fn explicit_scale(self) -> Option<f32> {
        (self.scale.is_finite() && self.scale > 0.0).then_some(self.scale)
    }
}

/// Scales used when a request specifies neither width nor scale
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DefaultScales {
    pub landscape: f32,
    pub portrait: f32,
}

impl DefaultScales {
    /// Default scale for documents containing a landscape page
    pub const LANDSCAPE: f32 = 1.0;
    /// Default scale for all-portrait documents
    pub const PORTRAIT: f32 = 1.5;

    #[must_use]
    pub const fn pick(self, landscape_document: bool) -> f32 {
        if landscape_document {
            self.landscape
        } else {
            self.portrait
        }
    }
}

impl Default for DefaultScales {
    fn default() -> Self {
        Self {
            landscape: Self::LANDSCAPE,
            portrait: Self::PORTRAIT,
        }
    }
}

/// Effective scale and resulting pixel size for one page
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Resolved {
    pub scale: f32,
    pub width_px: u32,
    pub height_px: u32,
}

/// Resolve the effective scale for `page`.
///
/// Priority: an explicit width wins, then an explicit scale, then the
/// document-wide default picked by `landscape_document`.
#[must_use]
pub fn resolve(
    page: &PageGeometry,
    size: RenderSize,
    landscape_document: bool,
    defaults: DefaultScales,
) -> Resolved {
    let (width, height) = page.oriented_size();

    let scale = if size.width > 0 && width > 0.0 {
        f32::from(size.width) / width
    } else if let Some(scale) = size.explicit_scale() {
        scale
    } else {
        defaults.pick(landscape_document)
    };

    Resolved {
        scale,
        width_px: scaled_px(width, scale),
        height_px: scaled_px(height, scale),
    }
}

fn scaled_px(points: f32, scale: f32) -> u32 {
    let px = (points * scale).round();
    if px.is_finite() && px > 0.0 {
        px as u32
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::types::Rotation;

    const A4: (f32, f32) = (595.28, 841.89);
    const LETTER: (f32, f32) = (612.0, 792.0);

    fn page(size: (f32, f32), rotation: Rotation) -> PageGeometry {
        PageGeometry::new(size.0, size.1, rotation)
    }

    #[test]
    fn width_wins_over_scale() {
        let p = page((600.0, 800.0), Rotation::Deg0);
        let r = resolve(&p, RenderSize::new(1024, 1.1), false, DefaultScales::default());
        assert_eq!(r.width_px, 1024);
        assert_eq!(r.height_px, 1365);
    }

    #[test]
    fn explicit_scale_applies_directly() {
        let p = page(A4, Rotation::Deg0);
        let r = resolve(&p, RenderSize::scale(1.1), false, DefaultScales::default());
        assert!((r.scale - 1.1).abs() < f32::EPSILON);
        assert_eq!(r.width_px, 655);
    }

    #[test]
    fn default_scale_depends_on_document_flag() {
        let p = page(A4, Rotation::Deg0);
        let portrait = resolve(&p, RenderSize::auto(), false, DefaultScales::default());
        assert_eq!(portrait.width_px, 893);

        let p = page(LETTER, Rotation::Deg0);
        let landscape = resolve(&p, RenderSize::auto(), true, DefaultScales::default());
        assert_eq!(landscape.width_px, 612);
        assert!((landscape.scale - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn sideways_rotation_swaps_before_scaling() {
        let p = page(A4, Rotation::Deg90);
        let r = resolve(&p, RenderSize::auto(), true, DefaultScales::default());
        assert_eq!(r.width_px, 842);
        assert_eq!(r.height_px, 595);

        let p = page((600.0, 800.0), Rotation::Deg270);
        let r = resolve(&p, RenderSize::width(400), false, DefaultScales::default());
        assert!((r.scale - 0.5).abs() < f32::EPSILON);
        assert_eq!(r.height_px, 300);
    }

    #[test]
    fn upside_down_keeps_orientation() {
        let p = page(A4, Rotation::Deg180);
        let r = resolve(&p, RenderSize::scale(1.0), false, DefaultScales::default());
        assert_eq!((r.width_px, r.height_px), (595, 842));
    }

    #[test]
    fn invalid_scale_falls_back_to_default() {
        let p = page(LETTER, Rotation::Deg0);
        for scale in [-1.0, f32::NAN, f32::INFINITY] {
            let r = resolve(&p, RenderSize::scale(scale), false, DefaultScales::default());
            assert_eq!(r.width_px, 918);
        }
    }

    #[test]
    fn custom_defaults_are_honoured() {
        let defaults = DefaultScales {
            landscape: 2.0,
            portrait: 0.5,
        };
        let p = page(LETTER, Rotation::Deg0);
        assert_eq!(resolve(&p, RenderSize::auto(), true, defaults).width_px, 1224);
        assert_eq!(resolve(&p, RenderSize::auto(), false, defaults).width_px, 306);
    }

    #[test]
    fn zero_sized_page_ignores_width() {
        let p = page((0.0, 0.0), Rotation::Deg0);
        let r = resolve(&p, RenderSize::width(1024), false, DefaultScales::default());
        assert!((r.scale - DefaultScales::PORTRAIT).abs() < f32::EPSILON);
        assert_eq!(r.width_px, 0);
    }
}
