//! In-memory rendering engine for tests
//!
//! Documents are plain text:
//!
//! ```text
//! %SYNTHETIC
//! 612x792
//! 842x595@90
//! 612x792!fail
//! 612x792~25
//! ```
//!
//! One line per page: native `WIDTHxHEIGHT`, optional `@ROTATION`, optional
//! `!fail` or `!panic` to make every render of that page fail, and an optional
//! `~MILLIS` render delay. Blank lines and lines starting with `#` are ignored.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use image::{Rgb, RgbImage};

use super::{PageSource, RenderBackend, bad_index};
use crate::pdf::request::RasterError;
use crate::pdf::types::{PageGeometry, Rotation};

pub const HEADER: &str = "%SYNTHETIC";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Fault {
    Fail,
    Panic,
}

#[derive(Clone, Debug)]
struct SyntheticPage {
    geometry: PageGeometry,
    fault: Option<Fault>,
    delay: Duration,
}

/// Backend whose documents are described by the text format above
#[derive(Clone, Debug, Default)]
pub struct SyntheticBackend {
    stats: Arc<RenderStats>,
}

impl SyntheticBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Call statistics shared by every document this backend opened
    #[must_use]
    pub fn stats(&self) -> Arc<RenderStats> {
        Arc::clone(&self.stats)
    }
}

impl RenderBackend for SyntheticBackend {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn open(&self, bytes: Arc<[u8]>) -> Result<Box<dyn PageSource>, RasterError> {
        let text = std::str::from_utf8(&bytes)
            .map_err(|_| RasterError::open_failed("document is not valid UTF-8"))?;
        let pages = parse(text).map_err(RasterError::open_failed)?;

        Ok(Box::new(SyntheticSource {
            pages,
            stats: Arc::clone(&self.stats),
        }))
    }
}

fn parse(text: &str) -> Result<Vec<SyntheticPage>, String> {
    let mut lines = text.lines().map(str::trim);
    if lines.next() != Some(HEADER) {
        return Err(format!("missing {HEADER} header"));
    }

    lines
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .enumerate()
        .map(|(index, line)| {
            parse_page(line).map_err(|e| format!("page {}: {e} in {line:?}", index + 1))
        })
        .collect()
}

fn parse_page(line: &str) -> Result<SyntheticPage, String> {
    let (line, delay) = match line.split_once('~') {
        Some((rest, millis)) => {
            let millis: u64 = millis.parse().map_err(|_| "bad delay".to_string())?;
            (rest, Duration::from_millis(millis))
        }
        None => (line, Duration::ZERO),
    };

    let (line, fault) = match line.split_once('!') {
        Some((rest, "fail")) => (rest, Some(Fault::Fail)),
        Some((rest, "panic")) => (rest, Some(Fault::Panic)),
        Some((_, other)) => return Err(format!("unknown fault {other:?}")),
        None => (line, None),
    };

    let (size, rotation) = match line.split_once('@') {
        Some((size, degrees)) => {
            let degrees: i32 = degrees.parse().map_err(|_| "bad rotation".to_string())?;
            (size, Rotation::from_degrees(degrees))
        }
        None => (line, Rotation::Deg0),
    };

    let (width, height) = size.split_once('x').ok_or("expected WIDTHxHEIGHT")?;
    let width: f32 = width.parse().map_err(|_| "bad width".to_string())?;
    let height: f32 = height.parse().map_err(|_| "bad height".to_string())?;
    if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
        return Err("page size must be positive".to_string());
    }

    Ok(SyntheticPage {
        geometry: PageGeometry::new(width, height, rotation),
        fault,
        delay,
    })
}

struct SyntheticSource {
    pages: Vec<SyntheticPage>,
    stats: Arc<RenderStats>,
}

impl SyntheticSource {
    fn page(&self, index: usize) -> Result<&SyntheticPage, RasterError> {
        self.pages
            .get(index)
            .ok_or_else(|| bad_index(index, self.pages.len()))
    }

    /// Common path for both output kinds: bookkeeping, delay, injected faults
    fn render<T>(
        &self,
        index: usize,
        scale: f32,
        f: impl FnOnce(u32, u32) -> T,
    ) -> Result<T, RasterError> {
        let page = self.page(index)?;
        let (width, height) = page.geometry.oriented_size();
        let width_px = (width * scale).round().max(1.0) as u32;
        let height_px = (height * scale).round().max(1.0) as u32;
        let _visit = self.stats.enter(index + 1, width_px);

        if !page.delay.is_zero() {
            thread::sleep(page.delay);
        }
        match page.fault {
            Some(Fault::Fail) => {
                return Err(RasterError::render_failed(index + 1, "injected failure"));
            }
            Some(Fault::Panic) => panic!("injected panic on page {}", index + 1),
            None => {}
        }
        Ok(f(width_px, height_px))
    }
}

impl PageSource for SyntheticSource {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_rotation(&self, index: usize) -> Result<Rotation, RasterError> {
        self.page(index).map(|p| p.geometry.rotation)
    }

    fn page_native_size(&self, index: usize) -> Result<(f32, f32), RasterError> {
        self.page(index).map(|p| (p.geometry.width, p.geometry.height))
    }

    fn render_image(&self, index: usize, scale: f32) -> Result<RgbImage, RasterError> {
        let shade = (index % 8) as u8 * 32;
        self.render(index, scale, |w, h| {
            RgbImage::from_pixel(w, h, Rgb([shade, 255 - shade, 128]))
        })
    }

    fn render_vector(&self, index: usize, scale: f32) -> Result<String, RasterError> {
        self.render(index, scale, |w, h| {
            format!(
                concat!(
                    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"no\"?>\n",
                    "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">\n",
                    "<clipPath id=\"page{page}\"><rect width=\"{w}\" height=\"{h}\"/></clipPath>\n",
                    "<rect clip-path=\"url(#page{page})\" width=\"{w}\" height=\"{h}\" fill=\"white\"/>\n",
                    "</svg>\n"
                ),
                w = w,
                h = h,
                page = index + 1
            )
        })
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct PageCounters {
    active: usize,
    peak: usize,
    calls: usize,
}

/// Concurrency bookkeeping for render calls
#[derive(Debug, Default)]
pub struct RenderStats {
    pages: Mutex<HashMap<usize, PageCounters>>,
    active: AtomicUsize,
    peak: AtomicUsize,
    /// (page, width in pixels) of every render call, in the order they began
    started: Mutex<Vec<(usize, u32)>>,
}

/// Marks one render call as in progress until dropped
struct Visit<'a> {
    stats: &'a RenderStats,
    page: usize,
}

impl Drop for Visit<'_> {
    fn drop(&mut self) {
        self.stats.active.fetch_sub(1, Ordering::SeqCst);
        let mut pages = self.stats.pages.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(counters) = pages.get_mut(&self.page) {
            counters.active = counters.active.saturating_sub(1);
        }
    }
}

impl RenderStats {
    fn enter(&self, page: usize, width_px: u32) -> Visit<'_> {
        self.started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((page, width_px));
        {
            let mut pages = self.pages.lock().unwrap_or_else(PoisonError::into_inner);
            let counters = pages.entry(page).or_default();
            counters.active += 1;
            counters.calls += 1;
            counters.peak = counters.peak.max(counters.active);
        }
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        Visit { stats: self, page }
    }

    fn counters(&self, page: usize) -> PageCounters {
        self.pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&page)
            .copied()
            .unwrap_or_default()
    }

    /// Most render calls ever in progress at once for a 1-based page
    #[must_use]
    pub fn peak_for(&self, page: usize) -> usize {
        self.counters(page).peak
    }

    /// Render calls made for a 1-based page
    #[must_use]
    pub fn calls_for(&self, page: usize) -> usize {
        self.counters(page).calls
    }

    /// Most render calls ever in progress at once, across all pages
    #[must_use]
    pub fn peak_overall(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Output widths of the render calls for a 1-based page, in start order
    #[must_use]
    pub fn widths_for(&self, page: usize) -> Vec<u32> {
        self.started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(p, _)| *p == page)
            .map(|(_, w)| *w)
            .collect()
    }

    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|c| c.calls)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(text: &str) -> Result<Box<dyn PageSource>, RasterError> {
        SyntheticBackend::new().open(Arc::from(text.as_bytes()))
    }

    #[test]
    fn parses_pages_with_modifiers() {
        let source = open("%SYNTHETIC\n# comment\n612x792\n\n842x595@-90!fail~5\n").unwrap();
        assert_eq!(source.page_count(), 2);
        assert_eq!(source.page_native_size(0).unwrap(), (612.0, 792.0));
        assert_eq!(source.page_rotation(1).unwrap(), Rotation::Deg270);
        assert!(matches!(
            source.render_image(1, 1.0),
            Err(RasterError::RenderFailed { page: 2, .. })
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(open("hot garbage"), Err(RasterError::OpenFailed { .. })));
        assert!(matches!(
            open("%SYNTHETIC\n612 by 792\n"),
            Err(RasterError::OpenFailed { .. })
        ));
        assert!(matches!(
            open("%SYNTHETIC\n612x792!explode\n"),
            Err(RasterError::OpenFailed { .. })
        ));
    }

    #[test]
    fn image_size_follows_rotation_and_scale() {
        let source = open("%SYNTHETIC\n600x800@90\n").unwrap();
        let img = source.render_image(0, 0.5).unwrap();
        assert_eq!(img.dimensions(), (400, 300));
    }

    #[test]
    fn svg_looks_like_svg() {
        let source = open("%SYNTHETIC\n612x792\n").unwrap();
        let svg = source.render_vector(0, 1.0).unwrap();
        assert!(svg.starts_with(r#"<?xml version="1.0" encoding="UTF-8" standalone="no"?>"#));
        assert!(svg.contains("</clipPath>"));
        assert!(svg.ends_with("</svg>\n"));
    }

    #[test]
    fn out_of_range_index_is_bad_page() {
        let source = open("%SYNTHETIC\n612x792\n").unwrap();
        assert_eq!(
            source.page_rotation(1).unwrap_err(),
            RasterError::BadPage {
                page: 2,
                page_count: 1
            }
        );
    }

    #[test]
    fn stats_count_calls_per_page() {
        let backend = SyntheticBackend::new();
        let source = backend
            .open(Arc::from("%SYNTHETIC\n10x10\n10x10\n".as_bytes()))
            .unwrap();
        source.render_image(0, 1.0).unwrap();
        source.render_vector(0, 1.0).unwrap();
        source.render_image(1, 1.0).unwrap();

        let stats = backend.stats();
        assert_eq!(stats.calls_for(1), 2);
        assert_eq!(stats.calls_for(2), 1);
        assert_eq!(stats.total_calls(), 3);
        assert_eq!(stats.peak_for(1), 1);
    }
}
