//! # label-splitter
//!
//! Split multi-label PDF sheets into a PDF with one page per label.
//!
//! ## Features
//!
//! - **Grid Geometry**: Cell rectangles for the configured sheet formats (`6up`, `45up`) with per-format calibration offsets
//! - **Blank Detection**: Each cell is rasterized at 72 dpi and dropped when fewer than 0.5% of its pixels carry ink
//! - **Page Composition**: Every remaining label becomes its own page, cropped from the source without scaling
//! - **Progress Reporting**: A callback receives `processed / total` after every cell
//! - **Atomic Output**: The output file is written once, at the end, and never left half-written
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use label_splitter::{split_labels, FormatId, Result, SplitOptions};
//!
//! # fn main() -> Result<()> {
//! let options = SplitOptions::new(FormatId::FortyFiveUp).with_custom_name("shipping");
//! let report = split_labels("sheet.pdf", options, &mut |fraction: f64| {
//!     eprintln!("{:.0}%", fraction * 100.0);
//! })?;
//!
//! println!(
//!     "Saved {} labels to {}",
//!     report.labels_written,
//!     report.output_path.display()
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Dry Runs
//!
//! ```rust,no_run
//! use label_splitter::{scan_labels, SplitOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! for scan in scan_labels("sheet.pdf", &SplitOptions::default())? {
//!     println!(
//!         "page {} row {} col {}: {:?} blank={}",
//!         scan.cell.page + 1,
//!         scan.cell.row,
//!         scan.cell.col,
//!         scan.nonwhite_fraction,
//!         scan.blank
//!     );
//! }
//! # Ok(())
//! # }
//! ```

pub mod blank;
pub mod document;
pub mod error;
pub mod format;
pub mod geometry;
pub mod naming;
pub mod pipeline;
pub mod progress;
pub mod raster;

pub use blank::{BlankDetector, PixelBuffer};
pub use document::{OutputDocument, Placement, SourceDocument};
pub use error::{ErrorKind, Result, SplitError};
pub use format::{CalibrationOffset, FormatId, LabelFormat};
pub use geometry::{CellIndex, CellRect, GridLayout, PageBox, PageFrame};
pub use naming::{resolve_output_name, resolve_output_path};
pub use pipeline::{
    scan_labels, split_labels, CellScan, LabelSplitter, PipelineState, SplitOptions, SplitReport,
};
pub use progress::{NoProgress, ProgressBar, ProgressInfo, ProgressSink, ProgressTracker};
pub use raster::{PdfRasterizer, RegionRasterizer, RenderError};

/// Current version of label-splitter
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_every_format_resolves() {
        for id in FormatId::ALL {
            let layout = GridLayout::for_format(id).unwrap();
            assert!(layout.format.cells_per_page() > 0);
        }
    }
}
