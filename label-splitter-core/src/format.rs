//! Label sheet formats and their calibration offsets
//!
//! Both tables are process-wide static configuration: they are built once on
//! first access and never mutated. Formats are keyed by their short name
//! (`"6up"`, `"45up"`), which is also what drivers accept on the command line.

use crate::error::{Result, SplitError};
use crate::geometry::mm_to_pt;
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Grid description of a label sheet
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LabelFormat {
    /// Number of label columns per sheet
    pub columns: u32,
    /// Number of label rows per sheet
    pub rows: u32,
    /// Label width in millimetres
    pub label_width_mm: f64,
    /// Label height in millimetres
    pub label_height_mm: f64,
    /// Fixed output page height in millimetres. When set, each label is
    /// vertically centered on a page of this height instead of getting a
    /// page of its own size.
    pub page_height_mm: Option<f64>,
}

impl LabelFormat {
    pub fn label_width_pt(&self) -> f64 {
        mm_to_pt(self.label_width_mm)
    }

    pub fn label_height_pt(&self) -> f64 {
        mm_to_pt(self.label_height_mm)
    }

    pub fn page_height_pt(&self) -> Option<f64> {
        self.page_height_mm.map(mm_to_pt)
    }

    /// Number of cells on one source page
    pub fn cells_per_page(&self) -> usize {
        self.columns as usize * self.rows as usize
    }

    /// Check the grid invariants: at least one row and column, positive sizes
    pub fn validate(&self) -> Result<()> {
        if self.columns == 0 || self.rows == 0 {
            return Err(SplitError::InvalidInput(format!(
                "label grid must have at least one row and column, got {}x{}",
                self.columns, self.rows
            )));
        }
        if !(self.label_width_mm > 0.0 && self.label_height_mm > 0.0) {
            return Err(SplitError::InvalidInput(format!(
                "label size must be positive, got {}x{} mm",
                self.label_width_mm, self.label_height_mm
            )));
        }
        if let Some(page_height) = self.page_height_mm {
            if !(page_height > 0.0) {
                return Err(SplitError::InvalidInput(format!(
                    "output page height must be positive, got {page_height} mm"
                )));
            }
        }
        Ok(())
    }
}

/// Print-alignment correction applied to every cell origin of a format
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CalibrationOffset {
    pub x_mm: f64,
    pub y_mm: f64,
}

impl CalibrationOffset {
    pub fn new(x_mm: f64, y_mm: f64) -> Self {
        Self { x_mm, y_mm }
    }

    pub fn x_pt(&self) -> f64 {
        mm_to_pt(self.x_mm)
    }

    pub fn y_pt(&self) -> f64 {
        mm_to_pt(self.y_mm)
    }
}

lazy_static! {
    static ref LABEL_FORMATS: HashMap<&'static str, LabelFormat> = {
        let mut formats = HashMap::new();
        formats.insert(
            "6up",
            LabelFormat {
                columns: 2,
                rows: 3,
                label_width_mm: 100.0,
                label_height_mm: 100.0,
                page_height_mm: Some(150.0),
            },
        );
        formats.insert(
            "45up",
            LabelFormat {
                columns: 5,
                rows: 9,
                label_width_mm: 40.0,
                label_height_mm: 30.0,
                page_height_mm: None,
            },
        );
        formats
    };

    // Adjust these to move where the grid cuts for a given printer/sheet stock.
    static ref CALIBRATION_OFFSETS: HashMap<&'static str, CalibrationOffset> = {
        let mut offsets = HashMap::new();
        offsets.insert("6up", CalibrationOffset::new(2.0, -7.0));
        offsets.insert("45up", CalibrationOffset::new(3.0, 14.0));
        offsets
    };
}

/// Identifier of one of the configured label formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FormatId {
    /// 2 x 3 grid of 100 x 100 mm labels, centered on 100 x 150 mm pages
    #[default]
    SixUp,
    /// 5 x 9 grid of 40 x 30 mm labels
    FortyFiveUp,
}

impl FormatId {
    pub const ALL: [FormatId; 2] = [FormatId::SixUp, FormatId::FortyFiveUp];

    pub fn name(self) -> &'static str {
        match self {
            FormatId::SixUp => "6up",
            FormatId::FortyFiveUp => "45up",
        }
    }

    /// The grid description of this format
    pub fn label_format(self) -> Result<LabelFormat> {
        LABEL_FORMATS
            .get(self.name())
            .copied()
            .ok_or_else(|| SplitError::UnknownFormat(self.name().to_string()))
    }

    /// The calibration offset of this format, zero when none is configured
    pub fn offset(self) -> CalibrationOffset {
        CALIBRATION_OFFSETS
            .get(self.name())
            .copied()
            .unwrap_or_default()
    }
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FormatId {
    type Err = SplitError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        FormatId::ALL
            .into_iter()
            .find(|id| id.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| SplitError::UnknownFormat(s.to_string()))
    }
}
