//! Rasterizing page regions for blank detection
//!
//! [`RegionRasterizer`] is the seam between the pipeline and whatever turns
//! a cell into pixels. [`PdfRasterizer`] is the built-in implementation: it
//! interprets the page's content stream onto a white tiny-skia canvas
//! covering the cell, clipped to the page box.

pub mod color;
mod image;
mod ops;
mod render;

use crate::blank::PixelBuffer;
use crate::document::SourceDocument;
use crate::error::SplitError;
use crate::geometry::CellRect;
use ops::{parse_operations, ContentOperation};
use render::{ImageCache, Renderer};
use std::rc::Rc;
use thiserror::Error;
use tiny_skia::{Color, Pixmap, Transform};

/// Samples per point at which cells are classified (72 dpi)
pub const DEFAULT_SCALE: f64 = 1.0;

/// Errors raised while rasterizing a region
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("source page unavailable: {0}")]
    Source(String),

    #[error("content stream could not be decoded: {0}")]
    Content(#[from] lopdf::Error),

    #[error("cannot allocate a {width}x{height} canvas")]
    Canvas { width: u32, height: u32 },
}

impl From<SplitError> for RenderError {
    fn from(err: SplitError) -> Self {
        RenderError::Source(err.to_string())
    }
}

/// Turns a region of a source page into pixels
pub trait RegionRasterizer {
    /// Rasterize `rect` (top-left page coordinates) of page `page`.
    ///
    /// The region is clipped to the page box; a region entirely outside it
    /// yields an empty buffer.
    fn rasterize(
        &mut self,
        source: &SourceDocument,
        page: usize,
        rect: &CellRect,
    ) -> Result<PixelBuffer, RenderError>;

    /// Drop anything cached from a previous document
    fn reset(&mut self) {}
}

/// Content-stream rasterizer on tiny-skia
pub struct PdfRasterizer {
    scale: f64,
    page_operations: Option<(usize, Rc<Vec<ContentOperation>>)>,
    images: ImageCache,
}

impl Default for PdfRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfRasterizer {
    pub fn new() -> Self {
        Self::with_scale(DEFAULT_SCALE)
    }

    /// Rasterize at `scale` samples per point
    pub fn with_scale(scale: f64) -> Self {
        Self {
            scale,
            page_operations: None,
            images: ImageCache::new(),
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Parsed content of `page`, reused across the cells of one page
    fn operations(
        &mut self,
        source: &SourceDocument,
        page: usize,
    ) -> Result<Rc<Vec<ContentOperation>>, RenderError> {
        if let Some((cached, operations)) = &self.page_operations {
            if *cached == page {
                return Ok(Rc::clone(operations));
            }
        }
        let content = source.content(page)?;
        let operations = Rc::new(parse_operations(&content)?);
        tracing::debug!("Page {page}: {} content operations", operations.len());
        self.page_operations = Some((page, Rc::clone(&operations)));
        Ok(operations)
    }
}

impl RegionRasterizer for PdfRasterizer {
    fn rasterize(
        &mut self,
        source: &SourceDocument,
        page: usize,
        rect: &CellRect,
    ) -> Result<PixelBuffer, RenderError> {
        let frame = source.page_frame(page)?;
        let Some(clip) = rect.intersect(&frame.page_rect()) else {
            return Ok(PixelBuffer::empty());
        };

        // Snap outwards to the pixel grid
        let s = self.scale;
        let px0 = (clip.x0 * s).floor();
        let py0 = (clip.y0 * s).floor();
        let width = ((clip.x1 * s).ceil() - px0).max(0.0) as u32;
        let height = ((clip.y1 * s).ceil() - py0).max(0.0) as u32;
        if width == 0 || height == 0 {
            return Ok(PixelBuffer::empty());
        }

        let mut pixmap = Pixmap::new(width, height).ok_or(RenderError::Canvas { width, height })?;
        pixmap.fill(Color::WHITE);

        // User space to displayed page coordinates, then to canvas pixels
        let [a, b, c, d, e, f] = frame.user_to_page();
        let base = Transform::from_row(
            (s * a) as f32,
            (s * b) as f32,
            (s * c) as f32,
            (s * d) as f32,
            (s * e - px0) as f32,
            (s * f - py0) as f32,
        );

        let operations = self.operations(source, page)?;
        let resources = source.resources(page)?;
        let mut renderer = Renderer::new(source.inner(), pixmap, base, &mut self.images);
        renderer.render(&operations, resources)?;

        Ok(PixelBuffer::new(width, height, 4, renderer.finish().take()))
    }

    fn reset(&mut self) {
        self.page_operations = None;
        self.images.clear();
    }
}
