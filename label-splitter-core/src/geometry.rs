//! Grid geometry for label sheets
//!
//! Cell rectangles are expressed in page coordinates with the origin at the
//! top-left corner of the page box and y growing downwards, the way a sheet
//! is measured with a ruler. On a page with `/Rotate` the page is measured
//! as displayed, after rotation. [`PageFrame`] converts them into PDF user
//! space (origin bottom-left) where the renderer and the compositor need it.

use crate::error::Result;
use crate::format::{CalibrationOffset, FormatId, LabelFormat};

/// Points per millimetre (1 inch = 72 points = 25.4 mm)
pub const MM_TO_PT: f64 = 72.0 / 25.4;

/// Convert millimetres to points
#[inline]
pub fn mm_to_pt(mm: f64) -> f64 {
    mm * MM_TO_PT
}

/// Convert points to millimetres
#[inline]
pub fn pt_to_mm(pt: f64) -> f64 {
    pt / MM_TO_PT
}

/// Axis-aligned rectangle in top-left page coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CellRect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl CellRect {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    /// True when the rectangle covers no area
    pub fn is_empty(&self) -> bool {
        !(self.x1 > self.x0 && self.y1 > self.y0)
    }

    /// Overlap of two rectangles, `None` when they do not overlap
    pub fn intersect(&self, other: &CellRect) -> Option<CellRect> {
        let rect = CellRect {
            x0: self.x0.max(other.x0),
            y0: self.y0.max(other.y0),
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
        };
        (!rect.is_empty()).then_some(rect)
    }
}

/// A page box (CropBox or MediaBox) in PDF user space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub llx: f64,
    pub lly: f64,
    pub urx: f64,
    pub ury: f64,
}

impl PageBox {
    /// Build a box from two corners given in any order
    pub fn from_corners(ax: f64, ay: f64, bx: f64, by: f64) -> Self {
        Self {
            llx: ax.min(bx),
            lly: ay.min(by),
            urx: ax.max(bx),
            ury: ay.max(by),
        }
    }

    pub fn width(&self) -> f64 {
        self.urx - self.llx
    }

    pub fn height(&self) -> f64 {
        self.ury - self.lly
    }
}

/// A page box together with the clockwise `/Rotate` it is displayed with
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageFrame {
    pub page_box: PageBox,
    /// 0, 90, 180 or 270
    pub rotation: i64,
}

impl PageFrame {
    pub fn new(page_box: PageBox, rotation: i64) -> Self {
        let rotation = match rotation.rem_euclid(360) {
            r @ (90 | 180 | 270) => r,
            _ => 0,
        };
        Self { page_box, rotation }
    }

    /// Width and height of the page as displayed
    fn displayed_size(&self) -> (f64, f64) {
        let (w, h) = (self.page_box.width(), self.page_box.height());
        match self.rotation {
            90 | 270 => (h, w),
            _ => (w, h),
        }
    }

    /// The whole displayed page in top-left page coordinates
    pub fn page_rect(&self) -> CellRect {
        let (width, height) = self.displayed_size();
        CellRect::new(0.0, 0.0, width, height)
    }

    /// Matrix `[a b c d e f]` from user space to top-left page coordinates
    pub fn user_to_page(&self) -> [f64; 6] {
        let PageBox { llx, lly, urx, ury } = self.page_box;
        match self.rotation {
            90 => [0.0, 1.0, 1.0, 0.0, -lly, -llx],
            180 => [-1.0, 0.0, 0.0, 1.0, urx, -lly],
            270 => [0.0, -1.0, -1.0, 0.0, ury, urx],
            _ => [1.0, 0.0, 0.0, -1.0, -llx, ury],
        }
    }

    /// Map a top-left page rectangle into user space
    pub fn to_user_space(&self, rect: &CellRect) -> PageBox {
        let PageBox { llx, lly, urx, ury } = self.page_box;
        let corner = |x: f64, y: f64| match self.rotation {
            90 => (llx + y, lly + x),
            180 => (urx - x, lly + y),
            270 => (urx - y, ury - x),
            _ => (llx + x, ury - y),
        };
        let (ax, ay) = corner(rect.x0, rect.y0);
        let (bx, by) = corner(rect.x1, rect.y1);
        PageBox::from_corners(ax, ay, bx, by)
    }
}

/// One grid position on one source page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CellIndex {
    /// Source page, 0-based
    pub page: usize,
    pub row: u32,
    pub col: u32,
}

/// A format resolved together with its calibration offset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLayout {
    pub format: LabelFormat,
    pub offset: CalibrationOffset,
}

impl GridLayout {
    pub fn new(format: LabelFormat, offset: CalibrationOffset) -> Self {
        Self { format, offset }
    }

    /// Look up a configured format and its offset
    pub fn for_format(id: FormatId) -> Result<Self> {
        let format = id.label_format()?;
        format.validate()?;
        Ok(Self::new(format, id.offset()))
    }

    /// Rectangle of the cell at `row`, `col`. The same on every page.
    ///
    /// No bounds checking against the page size is done: a misconfigured
    /// offset can produce rectangles partly or fully outside the page.
    pub fn cell_rect(&self, row: u32, col: u32) -> CellRect {
        let width = self.format.label_width_pt();
        let height = self.format.label_height_pt();
        let x0 = f64::from(col) * self.format.label_width_mm * MM_TO_PT + self.offset.x_pt();
        let y0 = f64::from(row) * self.format.label_height_mm * MM_TO_PT + self.offset.y_pt();
        CellRect::new(x0, y0, x0 + width, y0 + height)
    }

    /// Rectangle of an indexed cell; the page index does not move the grid
    pub fn rect_at(&self, cell: CellIndex) -> CellRect {
        self.cell_rect(cell.row, cell.col)
    }

    /// Total number of cells across `page_count` pages
    pub fn total_cells(&self, page_count: usize) -> usize {
        self.format.cells_per_page() * page_count
    }

    /// Every cell of `page_count` pages in processing order: pages in source
    /// order, rows outer, columns inner.
    pub fn cells(&self, page_count: usize) -> impl Iterator<Item = CellIndex> + '_ {
        let rows = self.format.rows;
        let columns = self.format.columns;
        (0..page_count).flat_map(move |page| {
            (0..rows).flat_map(move |row| (0..columns).map(move |col| CellIndex { page, row, col }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_mm_to_pt() {
        assert!(close(mm_to_pt(25.4), 72.0));
        assert!(close(pt_to_mm(72.0), 25.4));
        assert_eq!(mm_to_pt(0.0), 0.0);
    }

    #[test]
    fn test_six_up_first_cell() {
        let layout = GridLayout::for_format(FormatId::SixUp).unwrap();
        let rect = layout.cell_rect(0, 0);

        assert!(close(rect.x0, 2.0 * MM_TO_PT));
        assert!(close(rect.y0, -7.0 * MM_TO_PT));
        assert!(close(rect.width(), 100.0 * MM_TO_PT));
        assert!(close(rect.height(), 100.0 * MM_TO_PT));
    }

    #[test]
    fn test_forty_five_up_last_cell() {
        let layout = GridLayout::for_format(FormatId::FortyFiveUp).unwrap();
        let rect = layout.cell_rect(8, 4);

        assert!(close(rect.x0, (4.0 * 40.0 + 3.0) * MM_TO_PT));
        assert!(close(rect.y0, (8.0 * 30.0 + 14.0) * MM_TO_PT));
        assert!(close(rect.x1, (5.0 * 40.0 + 3.0) * MM_TO_PT));
        assert!(close(rect.y1, (9.0 * 30.0 + 14.0) * MM_TO_PT));
    }

    #[test]
    fn test_cells_iteration_order() {
        let layout = GridLayout::for_format(FormatId::SixUp).unwrap();
        let cells: Vec<CellIndex> = layout.cells(2).collect();

        assert_eq!(cells.len(), layout.total_cells(2));
        assert_eq!(cells.len(), 12);
        assert_eq!(cells[0], CellIndex { page: 0, row: 0, col: 0 });
        assert_eq!(cells[1], CellIndex { page: 0, row: 0, col: 1 });
        assert_eq!(cells[2], CellIndex { page: 0, row: 1, col: 0 });
        assert_eq!(cells[6], CellIndex { page: 1, row: 0, col: 0 });

        let mut sorted = cells.clone();
        sorted.sort();
        assert_eq!(cells, sorted);
    }

    #[test]
    fn test_cells_on_empty_document() {
        let layout = GridLayout::for_format(FormatId::FortyFiveUp).unwrap();
        assert_eq!(layout.cells(0).count(), 0);
        assert_eq!(layout.total_cells(0), 0);
    }

    #[test]
    fn test_rect_at_ignores_page() {
        let layout = GridLayout::for_format(FormatId::FortyFiveUp).unwrap();
        let a = layout.rect_at(CellIndex { page: 0, row: 3, col: 2 });
        let b = layout.rect_at(CellIndex { page: 7, row: 3, col: 2 });
        assert_eq!(a, b);
    }

    #[test]
    fn test_intersect() {
        let page = CellRect::new(0.0, 0.0, 100.0, 100.0);

        let inside = CellRect::new(10.0, 10.0, 20.0, 20.0);
        assert_eq!(page.intersect(&inside), Some(inside));

        let straddling = CellRect::new(-10.0, 90.0, 10.0, 110.0);
        assert_eq!(
            page.intersect(&straddling),
            Some(CellRect::new(0.0, 90.0, 10.0, 100.0))
        );

        let outside = CellRect::new(200.0, 200.0, 210.0, 210.0);
        assert_eq!(page.intersect(&outside), None);

        let touching = CellRect::new(100.0, 0.0, 120.0, 10.0);
        assert_eq!(page.intersect(&touching), None);
    }

    #[test]
    fn test_page_box_to_user_space() {
        let frame = PageFrame::new(PageBox::from_corners(0.0, 0.0, 612.0, 792.0), 0);
        let rect = CellRect::new(10.0, 20.0, 110.0, 70.0);
        let user = frame.to_user_space(&rect);

        assert_eq!(user.llx, 10.0);
        assert_eq!(user.urx, 110.0);
        assert_eq!(user.ury, 772.0);
        assert_eq!(user.lly, 722.0);
        assert_eq!(user.width(), rect.width());
        assert_eq!(user.height(), rect.height());
    }

    #[test]
    fn test_page_box_with_offset_origin() {
        let page_box = PageBox::from_corners(50.0, 100.0, 10.0, 20.0);
        assert_eq!(page_box.llx, 10.0);
        assert_eq!(page_box.lly, 20.0);

        let frame = PageFrame::new(page_box, 0);
        assert_eq!(frame.page_rect(), CellRect::new(0.0, 0.0, 40.0, 80.0));
        let user = frame.to_user_space(&CellRect::new(0.0, 0.0, 5.0, 5.0));
        assert_eq!(user, PageBox::from_corners(10.0, 95.0, 15.0, 100.0));
    }

    #[test]
    fn test_rotated_page_rect_swaps_sides() {
        let page_box = PageBox::from_corners(0.0, 0.0, 200.0, 100.0);
        assert_eq!(PageFrame::new(page_box, 90).page_rect(), CellRect::new(0.0, 0.0, 100.0, 200.0));
        assert_eq!(PageFrame::new(page_box, 180).page_rect(), CellRect::new(0.0, 0.0, 200.0, 100.0));
        assert_eq!(PageFrame::new(page_box, -90).rotation, 270);
        assert_eq!(PageFrame::new(page_box, 45).rotation, 0);
    }

    #[test]
    fn test_rotated_top_left_corner() {
        // Top-left corner of the displayed page, in user space
        let page_box = PageBox::from_corners(10.0, 20.0, 210.0, 120.0);
        let corner = CellRect::new(0.0, 0.0, 1.0, 1.0);
        let cases = [
            (0, PageBox::from_corners(10.0, 119.0, 11.0, 120.0)),
            (90, PageBox::from_corners(10.0, 20.0, 11.0, 21.0)),
            (180, PageBox::from_corners(209.0, 20.0, 210.0, 21.0)),
            (270, PageBox::from_corners(209.0, 119.0, 210.0, 120.0)),
        ];
        for (rotation, expected) in cases {
            let frame = PageFrame::new(page_box, rotation);
            assert_eq!(frame.to_user_space(&corner), expected, "rotation {rotation}");
        }
    }

    #[test]
    fn test_user_to_page_inverts_to_user_space() {
        let page_box = PageBox::from_corners(10.0, 20.0, 210.0, 120.0);
        let rect = CellRect::new(5.0, 15.0, 40.0, 60.0);
        for rotation in [0, 90, 180, 270] {
            let frame = PageFrame::new(page_box, rotation);
            let user = frame.to_user_space(&rect);
            let [a, b, c, d, e, f] = frame.user_to_page();
            let map = |x: f64, y: f64| (a * x + c * y + e, b * x + d * y + f);
            let (x0, y0) = map(user.llx, user.lly);
            let (x1, y1) = map(user.urx, user.ury);
            let mapped = CellRect::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1));
            assert_eq!(mapped, rect, "rotation {rotation}");
        }
    }
}
