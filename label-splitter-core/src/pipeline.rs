//! The label extraction pipeline
//!
//! Opens a sheet, walks every cell (pages in order, rows outer, columns
//! inner), drops the blank ones and writes the rest as one page each. The
//! run is synchronous and reports `processed / total` after every cell.
//!
//! ```text
//! Idle -> Opened -> IteratingCells -> Finalizing -> Saved
//!            \            \               \
//!             +------------+---------------+--> Failed
//! ```

use crate::blank::{BlankDetector, DEFAULT_BLANK_THRESHOLD, DEFAULT_WHITE_LEVEL};
use crate::document::{OutputDocument, Placement, SourceDocument};
use crate::error::{Result, SplitError};
use crate::format::FormatId;
use crate::geometry::{CellIndex, CellRect, GridLayout};
use crate::naming::resolve_output_path;
use crate::progress::{ProgressSink, ProgressTracker};
use crate::raster::{PdfRasterizer, RegionRasterizer};
use std::path::{Path, PathBuf};

/// Options for one run
#[derive(Debug, Clone, PartialEq)]
pub struct SplitOptions {
    pub format: FormatId,
    /// Output file name; `Split_<source stem>.pdf` when absent or blank
    pub custom_name: Option<String>,
    /// Directory the output is written to; the working directory when absent
    pub output_dir: Option<PathBuf>,
    /// Fraction of non-white pixels under which a cell is blank
    pub threshold: f64,
    /// Channel value at or above which a sample is white
    pub white_level: u8,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            format: FormatId::default(),
            custom_name: None,
            output_dir: None,
            threshold: DEFAULT_BLANK_THRESHOLD,
            white_level: DEFAULT_WHITE_LEVEL,
        }
    }
}

impl SplitOptions {
    pub fn new(format: FormatId) -> Self {
        Self {
            format,
            ..Default::default()
        }
    }

    pub fn with_custom_name(mut self, name: impl Into<String>) -> Self {
        self.custom_name = Some(name.into());
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_white_level(mut self, white_level: u8) -> Self {
        self.white_level = white_level;
        self
    }

    /// Reject thresholds outside (0, 1]
    pub fn validate(&self) -> Result<()> {
        if !(self.threshold.is_finite() && self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(SplitError::InvalidInput(format!(
                "blank threshold must be in (0, 1], got {}",
                self.threshold
            )));
        }
        Ok(())
    }

    pub fn detector(&self) -> BlankDetector {
        BlankDetector::new(self.threshold).with_white_level(self.white_level)
    }

    /// Where a run on `source` will write its output
    pub fn output_path(&self, source: &Path) -> PathBuf {
        resolve_output_path(
            source,
            self.custom_name.as_deref(),
            self.output_dir.as_deref(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Opened,
    IteratingCells,
    Finalizing,
    Saved,
    Failed,
}

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SplitReport {
    pub output_path: PathBuf,
    /// Source pages scanned
    pub pages: usize,
    pub total_cells: usize,
    pub blank_cells: usize,
    /// Pages in the output, one per non-blank cell
    pub labels_written: usize,
}

/// Classification of one cell, as produced by a dry run
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CellScan {
    pub cell: CellIndex,
    pub rect: CellRect,
    /// `None` when the cell lies entirely outside the page
    pub nonwhite_fraction: Option<f64>,
    pub blank: bool,
}

/// Runs the pipeline with a pluggable rasterizer
pub struct LabelSplitter<R = PdfRasterizer> {
    options: SplitOptions,
    layout: GridLayout,
    detector: BlankDetector,
    rasterizer: R,
    state: PipelineState,
}

impl LabelSplitter<PdfRasterizer> {
    pub fn new(options: SplitOptions) -> Result<Self> {
        Self::with_rasterizer(options, PdfRasterizer::new())
    }
}

impl<R: RegionRasterizer> LabelSplitter<R> {
    pub fn with_rasterizer(options: SplitOptions, rasterizer: R) -> Result<Self> {
        options.validate()?;
        let layout = GridLayout::for_format(options.format)?;
        Ok(Self {
            detector: options.detector(),
            options,
            layout,
            rasterizer,
            state: PipelineState::Idle,
        })
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn options(&self) -> &SplitOptions {
        &self.options
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    /// Open `source_path` and split it
    pub fn split<P, S>(&mut self, source_path: P, progress: &mut S) -> Result<SplitReport>
    where
        P: AsRef<Path>,
        S: ProgressSink + ?Sized,
    {
        self.transition(PipelineState::Idle);
        let source = match SourceDocument::open(source_path) {
            Ok(source) => source,
            Err(e) => {
                self.transition(PipelineState::Failed);
                return Err(e);
            }
        };
        self.split_document(&source, progress)
    }

    /// Split an already opened source
    pub fn split_document<S>(&mut self, source: &SourceDocument, progress: &mut S) -> Result<SplitReport>
    where
        S: ProgressSink + ?Sized,
    {
        let result = self.run(source, progress);
        if result.is_err() {
            self.transition(PipelineState::Failed);
        }
        result
    }

    /// Classify every cell without writing anything
    pub fn scan(&mut self, source: &SourceDocument) -> Result<Vec<CellScan>> {
        self.rasterizer.reset();
        let layout = self.layout;
        let mut scans = Vec::with_capacity(layout.total_cells(source.page_count()));
        for cell in layout.cells(source.page_count()) {
            let rect = layout.rect_at(cell);
            let (nonwhite_fraction, blank) = self.classify(source, cell, &rect)?;
            scans.push(CellScan {
                cell,
                rect,
                nonwhite_fraction,
                blank,
            });
        }
        Ok(scans)
    }

    fn run<S>(&mut self, source: &SourceDocument, progress: &mut S) -> Result<SplitReport>
    where
        S: ProgressSink + ?Sized,
    {
        self.rasterizer.reset();
        self.transition(PipelineState::Opened);

        let pages = source.page_count();
        for page in 0..pages {
            let rotation = source.rotation(page)?;
            if rotation != 0 {
                tracing::debug!("Page {} is measured as displayed, rotated {rotation} degrees", page + 1);
            }
        }

        let layout = self.layout;
        let total_cells = layout.total_cells(pages);
        let mut tracker = ProgressTracker::new(total_cells);
        let mut output = OutputDocument::new();
        let mut blank_cells = 0;

        self.transition(PipelineState::IteratingCells);
        for cell in layout.cells(pages) {
            let rect = layout.rect_at(cell);
            let (_, blank) = self.classify(source, cell, &rect)?;
            if blank {
                blank_cells += 1;
            } else {
                let placement = Placement::for_cell(&layout.format, &rect);
                output.add_label_page(source, cell.page, &rect, &placement)?;
            }
            progress.on_cell(&tracker.advance());
        }

        self.transition(PipelineState::Finalizing);
        if output.is_empty() {
            return Err(SplitError::AllLabelsBlank);
        }

        let output_path = self.options.output_path(source.path());
        let labels_written = output.page_count();
        output.save(&output_path)?;
        self.transition(PipelineState::Saved);

        Ok(SplitReport {
            output_path,
            pages,
            total_cells,
            blank_cells,
            labels_written,
        })
    }

    fn classify(
        &mut self,
        source: &SourceDocument,
        cell: CellIndex,
        rect: &CellRect,
    ) -> Result<(Option<f64>, bool)> {
        let buffer = self
            .rasterizer
            .rasterize(source, cell.page, rect)
            .map_err(|e| SplitError::RenderFailure {
                page: cell.page,
                row: cell.row,
                col: cell.col,
                reason: e.to_string(),
            })?;
        let fraction = self.detector.nonwhite_fraction(&buffer);
        let blank = self.detector.is_blank(&buffer);
        tracing::debug!(
            "Cell page {} row {} col {}: non-white {:?}, {}",
            cell.page,
            cell.row,
            cell.col,
            fraction,
            if blank { "blank" } else { "label" }
        );
        Ok((fraction, blank))
    }

    fn transition(&mut self, next: PipelineState) {
        if self.state != next {
            tracing::debug!("Pipeline {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}

/// Split the sheet at `source_path` with the built-in rasterizer
pub fn split_labels<P, S>(source_path: P, options: SplitOptions, progress: &mut S) -> Result<SplitReport>
where
    P: AsRef<Path>,
    S: ProgressSink + ?Sized,
{
    LabelSplitter::new(options)?.split(source_path, progress)
}

/// Classify every cell of the sheet at `source_path` without writing output
pub fn scan_labels<P: AsRef<Path>>(source_path: P, options: &SplitOptions) -> Result<Vec<CellScan>> {
    let source = SourceDocument::open(source_path)?;
    LabelSplitter::new(options.clone())?.scan(&source)
}
