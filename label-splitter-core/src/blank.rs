//! Blank-label detection
//!
//! A cell is blank when fewer than `threshold` of its sampled pixels are
//! non-white. A pixel is non-white when any of its first three channels is
//! below the white level. The constants are empirical: they match what the
//! sheets this tool was tuned on produce at unit scale, and are exposed as
//! parameters rather than treated as physical limits.

/// Default fraction of non-white pixels under which a cell is blank
pub const DEFAULT_BLANK_THRESHOLD: f64 = 0.005;

/// Default channel value at or above which a sample counts as white
pub const DEFAULT_WHITE_LEVEL: u8 = 250;

/// Rasterized samples of one cell, row-major, `channels` bytes per pixel
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub samples: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, channels: u8, samples: Vec<u8>) -> Self {
        Self {
            width,
            height,
            channels,
            samples,
        }
    }

    /// A buffer without pixel data, as produced for an empty clip
    pub fn empty() -> Self {
        Self::default()
    }

    /// A uniformly coloured RGB buffer
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let samples = rgb.iter().copied().cycle().take(pixels * 3).collect();
        Self::new(width, height, 3, samples)
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.pixel_count() == 0 || self.samples.is_empty()
    }

    /// Iterate over pixels as channel slices
    pub fn pixels(&self) -> impl Iterator<Item = &[u8]> {
        self.samples.chunks_exact(usize::from(self.channels.max(1)))
    }
}

/// Classifies pixel buffers as blank or populated
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlankDetector {
    pub threshold: f64,
    pub white_level: u8,
}

impl Default for BlankDetector {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_BLANK_THRESHOLD,
            white_level: DEFAULT_WHITE_LEVEL,
        }
    }
}

impl BlankDetector {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            ..Default::default()
        }
    }

    pub fn with_white_level(mut self, white_level: u8) -> Self {
        self.white_level = white_level;
        self
    }

    /// Fraction of non-white pixels, `None` for a buffer without pixel data
    pub fn nonwhite_fraction(&self, buffer: &PixelBuffer) -> Option<f64> {
        if buffer.is_empty() || buffer.channels < 3 {
            return None;
        }
        let nonwhite = buffer
            .pixels()
            .filter(|px| px[..3].iter().any(|&channel| channel < self.white_level))
            .count();
        Some(nonwhite as f64 / buffer.pixel_count() as f64)
    }

    /// True when the buffer is mostly blank. Empty buffers are blank.
    pub fn is_blank(&self, buffer: &PixelBuffer) -> bool {
        match self.nonwhite_fraction(buffer) {
            Some(fraction) => fraction < self.threshold,
            None => true,
        }
    }
}
