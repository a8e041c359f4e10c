//! Content stream interpreter painting onto a tiny-skia canvas
//!
//! The goal is ink coverage rather than fidelity. Vector paths, clipping
//! and images are rendered for real. Text is painted as one box per glyph
//! (advance width by 0.7 em, or the `FontBBox` height for Type3 fonts) since
//! glyph outlines would not change whether a label is blank. Shadings and inline images are painted as mid-grey.

use super::color::{ColorSpace, Rgb, UNRESOLVED_GRAY};
use super::image::{decode_image, decode_stencil_mask, is_stencil_mask};
use super::ops::{parse_operations, ContentOperation, TextElement};
use super::RenderError;
use crate::document::{dict_get, number, resolve, stream_data};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashMap;
use std::rc::Rc;
use tiny_skia::{
    FillRule, Mask, Path, PathBuilder, Pixmap, PixmapPaint, Rect, Stroke, Transform,
};

/// Nesting limit for form XObjects drawing other forms
pub(crate) const MAX_FORM_DEPTH: usize = 16;

/// Height of a glyph box in text space units per unit of font size
const GLYPH_HEIGHT: f32 = 0.7;

/// Advance of simple-font glyphs without a `Widths` entry, in 1/1000 em
const DEFAULT_GLYPH_WIDTH: f32 = 500.0;

/// Default `DW` of CID fonts, in 1/1000 em
const DEFAULT_CID_WIDTH: f32 = 1000.0;

/// Largest `W` range expanded for a CID font
const MAX_CID_RANGE: u32 = 0x1_0000;

/// Decoded images by object, `None` for images that failed to decode
pub(crate) type ImageCache = HashMap<ObjectId, Option<Rc<Pixmap>>>;

/// Glyph advances of a font, enough to size glyph boxes
#[derive(Debug, Clone)]
struct FontMetrics {
    two_byte: bool,
    first_char: u32,
    widths: Vec<f32>,
    cid_widths: HashMap<u32, f32>,
    default_width: f32,
    /// Text space units per width unit: 1/1000 em, or `FontMatrix` for Type3
    width_scale: f32,
    /// Bottom of the glyph box, in text space units per unit of font size
    box_bottom: f32,
    /// Height of the glyph box, in text space units per unit of font size
    box_height: f32,
}

impl Default for FontMetrics {
    fn default() -> Self {
        Self {
            two_byte: false,
            first_char: 0,
            widths: Vec::new(),
            cid_widths: HashMap::new(),
            default_width: DEFAULT_GLYPH_WIDTH,
            width_scale: 0.001,
            box_bottom: 0.0,
            box_height: GLYPH_HEIGHT,
        }
    }
}

impl FontMetrics {
    fn load(document: &Document, font: &Dictionary) -> Self {
        let subtype = match dict_get(document, font, b"Subtype") {
            Some(Object::Name(name)) => name.as_slice(),
            _ => b"".as_slice(),
        };
        match subtype {
            b"Type0" => Self::load_composite(document, font),
            b"Type3" => Self::load_type3(document, font),
            _ => Self::load_simple(document, font),
        }
    }

    fn load_simple(document: &Document, font: &Dictionary) -> Self {
        let first_char = dict_get(document, font, b"FirstChar")
            .and_then(number)
            .map(|v| v as u32)
            .unwrap_or(0);
        let widths = match dict_get(document, font, b"Widths") {
            Some(Object::Array(items)) => items
                .iter()
                .map(|item| {
                    resolve(document, item)
                        .and_then(number)
                        .unwrap_or(0.0) as f32
                })
                .collect(),
            _ => Vec::new(),
        };
        let default_width = match dict_get(document, font, b"FontDescriptor") {
            Some(Object::Dictionary(descriptor)) => dict_get(document, descriptor, b"MissingWidth")
                .and_then(number)
                .filter(|w| *w > 0.0)
                .map(|w| w as f32),
            _ => None,
        }
        .unwrap_or(DEFAULT_GLYPH_WIDTH);

        Self {
            first_char,
            widths,
            default_width,
            ..Self::default()
        }
    }

    /// Type3 font: widths and `FontBBox` are in glyph space, mapped to text
    /// space by `FontMatrix`
    fn load_type3(document: &Document, font: &Dictionary) -> Self {
        let [a, _, _, d, _, f] = dict_get(document, font, b"FontMatrix")
            .and_then(|m| numbers6(document, m))
            .unwrap_or([0.001, 0.0, 0.0, 0.001, 0.0, 0.0]);

        // Glyphs missing from Widths have no procedure to paint
        let missing_width = match dict_get(document, font, b"FontDescriptor") {
            Some(Object::Dictionary(descriptor)) => dict_get(document, descriptor, b"MissingWidth")
                .and_then(number)
                .map(|w| w as f32),
            _ => None,
        };
        let mut metrics = Self {
            width_scale: a.abs(),
            default_width: missing_width.unwrap_or(0.0),
            ..Self::load_simple(document, font)
        };

        let bbox = dict_get(document, font, b"FontBBox")
            .and_then(|b| numbers4(document, b))
            .filter(|[_, lly, _, ury]| (ury - lly) * d != 0.0);
        match bbox {
            Some([_, lly, _, ury]) => {
                let (y0, y1) = (lly * d + f, ury * d + f);
                metrics.box_bottom = y0.min(y1);
                metrics.box_height = (y1 - y0).abs();
            }
            // FontBBox may be all zeros; size glyphs as squares of the mean advance
            None => {
                let positive: Vec<f32> = metrics.widths.iter().copied().filter(|w| *w > 0.0).collect();
                metrics.box_height = if positive.is_empty() {
                    GLYPH_HEIGHT * 1000.0 * d.abs()
                } else {
                    positive.iter().sum::<f32>() / positive.len() as f32 * d.abs()
                };
            }
        }
        metrics
    }

    /// Type0 font: two-byte codes, widths from the descendant's `DW`/`W`
    fn load_composite(document: &Document, font: &Dictionary) -> Self {
        let mut metrics = Self {
            two_byte: true,
            default_width: DEFAULT_CID_WIDTH,
            ..Self::default()
        };
        let descendant = match dict_get(document, font, b"DescendantFonts") {
            Some(Object::Array(items)) => items.first().and_then(|obj| resolve(document, obj)),
            _ => None,
        };
        let Some(Object::Dictionary(descendant)) = descendant else {
            return metrics;
        };

        if let Some(dw) = dict_get(document, descendant, b"DW").and_then(number) {
            metrics.default_width = dw as f32;
        }
        let Some(Object::Array(w)) = dict_get(document, descendant, b"W") else {
            return metrics;
        };

        let value = |obj: Option<&Object>| obj.and_then(|o| resolve(document, o)).and_then(number);
        let mut i = 0;
        while i < w.len() {
            let Some(first) = value(w.get(i)) else {
                break;
            };
            let first = first as u32;
            match w.get(i + 1).and_then(|obj| resolve(document, obj)) {
                // c [w1 w2 ...]
                Some(Object::Array(run)) => {
                    for (offset, width) in run.iter().enumerate() {
                        if let Some(width) = value(Some(width)) {
                            metrics.cid_widths.insert(first + offset as u32, width as f32);
                        }
                    }
                    i += 2;
                }
                // c_first c_last w
                Some(last) => {
                    let (Some(last), Some(width)) = (number(last), value(w.get(i + 2))) else {
                        break;
                    };
                    let last = (last as u32).min(first.saturating_add(MAX_CID_RANGE));
                    for cid in first..=last {
                        metrics.cid_widths.insert(cid, width as f32);
                    }
                    i += 3;
                }
                None => break,
            }
        }
        metrics
    }

    fn codes(&self, bytes: &[u8]) -> Vec<u32> {
        if self.two_byte {
            bytes
                .chunks(2)
                .map(|pair| pair.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b)))
                .collect()
        } else {
            bytes.iter().map(|b| u32::from(*b)).collect()
        }
    }

    /// Advance of `code` in width units, see `width_scale`
    fn width(&self, code: u32) -> f32 {
        if self.two_byte {
            return self
                .cid_widths
                .get(&code)
                .copied()
                .unwrap_or(self.default_width);
        }
        code.checked_sub(self.first_char)
            .and_then(|i| self.widths.get(i as usize))
            .copied()
            .filter(|w| *w > 0.0)
            .unwrap_or(self.default_width)
    }

    /// Single-byte code 32 takes word spacing and paints nothing
    fn is_space(&self, code: u32) -> bool {
        !self.two_byte && code == 32
    }
}

#[derive(Debug, Clone)]
struct TextState {
    char_spacing: f32,
    word_spacing: f32,
    /// `Tz` as a factor (100% = 1.0)
    horizontal_scaling: f32,
    leading: f32,
    font: Rc<FontMetrics>,
    font_size: f32,
    rise: f32,
    render_mode: i64,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scaling: 1.0,
            leading: 0.0,
            font: Rc::new(FontMetrics::default()),
            font_size: 0.0,
            rise: 0.0,
            render_mode: 0,
        }
    }
}

#[derive(Clone)]
struct GraphicsState {
    /// User space to device pixels
    ctm: Transform,
    clip: Option<Rc<Mask>>,
    line_width: f32,
    fill_space: ColorSpace,
    fill: Rgb,
    stroke_space: ColorSpace,
    stroke: Rgb,
    text: TextState,
}

impl GraphicsState {
    fn new(ctm: Transform) -> Self {
        Self {
            ctm,
            clip: None,
            line_width: 1.0,
            fill_space: ColorSpace::Gray,
            fill: Rgb::BLACK,
            stroke_space: ColorSpace::Gray,
            stroke: Rgb::BLACK,
            text: TextState::default(),
        }
    }
}

pub(crate) struct Renderer<'a, 'c> {
    document: &'a Document,
    pixmap: Pixmap,
    images: &'c mut ImageCache,
    state: GraphicsState,
    saved: Vec<GraphicsState>,
    path: PathBuilder,
    current_point: Option<(f32, f32)>,
    subpath_start: Option<(f32, f32)>,
    pending_clip: Option<FillRule>,
    text_matrix: Transform,
    line_matrix: Transform,
}

impl<'a, 'c> Renderer<'a, 'c> {
    /// `base` maps page user space onto `pixmap`
    pub(crate) fn new(
        document: &'a Document,
        pixmap: Pixmap,
        base: Transform,
        images: &'c mut ImageCache,
    ) -> Self {
        Self {
            document,
            pixmap,
            images,
            state: GraphicsState::new(base),
            saved: Vec::new(),
            path: PathBuilder::new(),
            current_point: None,
            subpath_start: None,
            pending_clip: None,
            text_matrix: Transform::identity(),
            line_matrix: Transform::identity(),
        }
    }

    pub(crate) fn render(
        &mut self,
        operations: &[ContentOperation],
        resources: Option<&'a Dictionary>,
    ) -> Result<(), RenderError> {
        self.execute(operations, resources, 0)
    }

    pub(crate) fn finish(self) -> Pixmap {
        self.pixmap
    }

    fn execute(
        &mut self,
        operations: &[ContentOperation],
        resources: Option<&'a Dictionary>,
        depth: usize,
    ) -> Result<(), RenderError> {
        use ContentOperation::*;

        let base_depth = self.saved.len();
        for op in operations {
            match op {
                SaveGraphicsState => self.saved.push(self.state.clone()),
                RestoreGraphicsState => {
                    // Never pop a state saved outside this stream
                    if self.saved.len() > base_depth {
                        if let Some(state) = self.saved.pop() {
                            self.state = state;
                        }
                    }
                }
                SetTransformMatrix(m) => self.state.ctm = self.state.ctm.pre_concat(matrix(*m)),
                SetLineWidth(width) => self.state.line_width = *width,

                MoveTo(x, y) => self.move_to(*x, *y),
                LineTo(x, y) => self.line_to(*x, *y),
                CurveTo(x1, y1, x2, y2, x3, y3) => self.curve_to(*x1, *y1, *x2, *y2, *x3, *y3),
                CurveToV(x2, y2, x3, y3) => {
                    let (x1, y1) = self.current_point.unwrap_or((*x2, *y2));
                    self.curve_to(x1, y1, *x2, *y2, *x3, *y3);
                }
                CurveToY(x1, y1, x3, y3) => self.curve_to(*x1, *y1, *x3, *y3, *x3, *y3),
                ClosePath => self.close_path(),
                Rectangle(x, y, width, height) => {
                    self.move_to(*x, *y);
                    self.line_to(x + width, *y);
                    self.line_to(x + width, y + height);
                    self.line_to(*x, y + height);
                    self.close_path();
                }

                Stroke => self.paint_path(None, true, false),
                CloseStroke => self.paint_path(None, true, true),
                Fill => self.paint_path(Some(FillRule::Winding), false, false),
                FillEvenOdd => self.paint_path(Some(FillRule::EvenOdd), false, false),
                FillStroke => self.paint_path(Some(FillRule::Winding), true, false),
                FillStrokeEvenOdd => self.paint_path(Some(FillRule::EvenOdd), true, false),
                CloseFillStroke => self.paint_path(Some(FillRule::Winding), true, true),
                CloseFillStrokeEvenOdd => self.paint_path(Some(FillRule::EvenOdd), true, true),
                EndPath => self.paint_path(None, false, false),

                Clip => self.pending_clip = Some(FillRule::Winding),
                ClipEvenOdd => self.pending_clip = Some(FillRule::EvenOdd),

                SetStrokingColorSpace(name) => {
                    let space = self.color_space(name, resources);
                    self.state.stroke_space = space;
                    self.state.stroke = space.initial_color();
                }
                SetNonStrokingColorSpace(name) => {
                    let space = self.color_space(name, resources);
                    self.state.fill_space = space;
                    self.state.fill = space.initial_color();
                }
                SetStrokingColor(comps) => {
                    self.state.stroke = self.state.stroke_space.to_rgb(comps);
                }
                SetNonStrokingColor(comps) => {
                    self.state.fill = self.state.fill_space.to_rgb(comps);
                }
                SetStrokingGray(g) => {
                    self.state.stroke_space = ColorSpace::Gray;
                    self.state.stroke = Rgb::gray(*g);
                }
                SetNonStrokingGray(g) => {
                    self.state.fill_space = ColorSpace::Gray;
                    self.state.fill = Rgb::gray(*g);
                }
                SetStrokingRGB(r, g, b) => {
                    self.state.stroke_space = ColorSpace::Rgb;
                    self.state.stroke = Rgb::new(*r, *g, *b);
                }
                SetNonStrokingRGB(r, g, b) => {
                    self.state.fill_space = ColorSpace::Rgb;
                    self.state.fill = Rgb::new(*r, *g, *b);
                }
                SetStrokingCMYK(c, m, y, k) => {
                    self.state.stroke_space = ColorSpace::Cmyk;
                    self.state.stroke = ColorSpace::Cmyk.to_rgb(&[*c, *m, *y, *k]);
                }
                SetNonStrokingCMYK(c, m, y, k) => {
                    self.state.fill_space = ColorSpace::Cmyk;
                    self.state.fill = ColorSpace::Cmyk.to_rgb(&[*c, *m, *y, *k]);
                }

                BeginText => {
                    self.text_matrix = Transform::identity();
                    self.line_matrix = Transform::identity();
                }
                EndText => {}
                SetCharSpacing(spacing) => self.state.text.char_spacing = *spacing,
                SetWordSpacing(spacing) => self.state.text.word_spacing = *spacing,
                SetHorizontalScaling(scale) => self.state.text.horizontal_scaling = scale / 100.0,
                SetLeading(leading) => self.state.text.leading = *leading,
                SetFont(name, size) => {
                    self.state.text.font = Rc::new(self.font_metrics(name, resources));
                    self.state.text.font_size = *size;
                }
                SetTextRenderMode(mode) => self.state.text.render_mode = *mode,
                SetTextRise(rise) => self.state.text.rise = *rise,
                MoveText(tx, ty) => self.move_text(*tx, *ty),
                MoveTextSetLeading(tx, ty) => {
                    self.state.text.leading = -ty;
                    self.move_text(*tx, *ty);
                }
                SetTextMatrix(m) => {
                    self.text_matrix = matrix(*m);
                    self.line_matrix = self.text_matrix;
                }
                NextLine => self.next_line(),
                ShowText(bytes) => self.show_text(bytes),
                ShowTextArray(elements) => {
                    for element in elements {
                        match element {
                            TextElement::Text(bytes) => self.show_text(bytes),
                            TextElement::Spacing(adjust) => {
                                let text = &self.state.text;
                                let tx = -adjust / 1000.0 * text.font_size * text.horizontal_scaling;
                                self.text_matrix = self.text_matrix.pre_translate(tx, 0.0);
                            }
                        }
                    }
                }
                NextLineShowText(bytes) => {
                    self.next_line();
                    self.show_text(bytes);
                }
                SetSpacingNextLineShowText(word, char, bytes) => {
                    self.state.text.word_spacing = *word;
                    self.state.text.char_spacing = *char;
                    self.next_line();
                    self.show_text(bytes);
                }

                ShadingFill => self.paint_clip_area(Rgb::gray(UNRESOLVED_GRAY)),
                InlineImage => self.paint_unit_square(Rgb::gray(UNRESOLVED_GRAY)),
                PaintXObject(name) => self.paint_xobject(name, resources, depth)?,
            }
        }

        // Unbalanced q inside this stream
        if self.saved.len() > base_depth {
            self.saved.truncate(base_depth + 1);
            if let Some(state) = self.saved.pop() {
                self.state = state;
            }
        }
        Ok(())
    }

    fn move_to(&mut self, x: f32, y: f32) {
        self.path.move_to(x, y);
        self.current_point = Some((x, y));
        self.subpath_start = Some((x, y));
    }

    fn line_to(&mut self, x: f32, y: f32) {
        if self.current_point.is_none() {
            self.move_to(x, y);
            return;
        }
        self.path.line_to(x, y);
        self.current_point = Some((x, y));
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x3: f32, y3: f32) {
        if self.current_point.is_none() {
            self.move_to(x1, y1);
        }
        self.path.cubic_to(x1, y1, x2, y2, x3, y3);
        self.current_point = Some((x3, y3));
    }

    fn close_path(&mut self) {
        if self.current_point.is_some() {
            self.path.close();
            self.current_point = self.subpath_start;
        }
    }

    /// Paint the current path, then apply a pending clip and start anew
    fn paint_path(&mut self, fill: Option<FillRule>, stroke: bool, close: bool) {
        if close {
            self.close_path();
        }
        let builder = std::mem::replace(&mut self.path, PathBuilder::new());
        self.current_point = None;
        self.subpath_start = None;
        let path = builder.finish();

        if let Some(path) = &path {
            let clip = self.state.clip.clone();
            if let Some(rule) = fill {
                self.pixmap.fill_path(
                    path,
                    &self.state.fill.paint(),
                    rule,
                    self.state.ctm,
                    clip.as_deref(),
                );
            }
            if stroke {
                let style = Stroke {
                    width: self.state.line_width.max(0.0),
                    ..Stroke::default()
                };
                self.pixmap.stroke_path(
                    path,
                    &self.state.stroke.paint(),
                    &style,
                    self.state.ctm,
                    clip.as_deref(),
                );
            }
        }

        if let Some(rule) = self.pending_clip.take() {
            self.intersect_clip(path.as_ref(), rule);
        }
    }

    /// Intersect the clip with `path` under the current transform
    fn intersect_clip(&mut self, path: Option<&Path>, rule: FillRule) {
        let (width, height) = (self.pixmap.width(), self.pixmap.height());
        let mask = match (path, self.state.clip.as_deref()) {
            (Some(path), Some(current)) => {
                let mut mask = current.clone();
                mask.intersect_path(path, rule, true, self.state.ctm);
                Some(mask)
            }
            (Some(path), None) => Mask::new(width, height).map(|mut mask| {
                mask.fill_path(path, rule, true, self.state.ctm);
                mask
            }),
            // Clipping to an empty path hides everything
            (None, _) => Mask::new(width, height),
        };
        if let Some(mask) = mask {
            self.state.clip = Some(Rc::new(mask));
        }
    }

    /// Fill everything the clip lets through
    fn paint_clip_area(&mut self, color: Rgb) {
        let Some(rect) = Rect::from_xywh(
            0.0,
            0.0,
            self.pixmap.width() as f32,
            self.pixmap.height() as f32,
        ) else {
            return;
        };
        let clip = self.state.clip.clone();
        self.pixmap
            .fill_rect(rect, &color.paint(), Transform::identity(), clip.as_deref());
    }

    /// Fill the unit square of user space, where images land
    fn paint_unit_square(&mut self, color: Rgb) {
        self.fill_box(0.0, 0.0, 1.0, 1.0, self.state.ctm, color);
    }

    fn fill_box(&mut self, x: f32, y: f32, width: f32, height: f32, transform: Transform, color: Rgb) {
        let Some(path) = rect_path(x, y, width, height) else {
            return;
        };
        let clip = self.state.clip.clone();
        self.pixmap.fill_path(
            &path,
            &color.paint(),
            FillRule::Winding,
            transform,
            clip.as_deref(),
        );
    }

    fn color_space(&self, name: &[u8], resources: Option<&Dictionary>) -> ColorSpace {
        ColorSpace::from_object(self.document, &Object::Name(name.to_vec()), resources)
    }

    fn font_metrics(&self, name: &[u8], resources: Option<&'a Dictionary>) -> FontMetrics {
        let font = resources
            .and_then(|res| dict_get(self.document, res, b"Font"))
            .and_then(|fonts| match fonts {
                Object::Dictionary(fonts) => dict_get(self.document, fonts, name),
                _ => None,
            });
        match font {
            Some(Object::Dictionary(font)) => FontMetrics::load(self.document, font),
            _ => {
                tracing::debug!("Font {} not found, using default metrics", String::from_utf8_lossy(name));
                FontMetrics::default()
            }
        }
    }

    fn move_text(&mut self, tx: f32, ty: f32) {
        self.line_matrix = self.line_matrix.pre_translate(tx, ty);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        let leading = self.state.text.leading;
        self.move_text(0.0, -leading);
    }

    /// Paint one box per glyph and advance the text matrix
    fn show_text(&mut self, bytes: &[u8]) {
        let text = self.state.text.clone();
        let color = match text.render_mode {
            3 | 7 => None,
            1 | 5 => Some(self.state.stroke),
            _ => Some(self.state.fill),
        };

        for code in text.font.codes(bytes) {
            let advance = text.font.width(code) * text.font.width_scale;
            let is_space = text.font.is_space(code);

            if let Some(color) = color {
                if !is_space && text.font_size != 0.0 {
                    let transform = self.state.ctm.pre_concat(self.text_matrix);
                    self.fill_box(
                        0.0,
                        text.rise + text.font.box_bottom * text.font_size,
                        advance * text.font_size * text.horizontal_scaling,
                        text.font.box_height * text.font_size,
                        transform,
                        color,
                    );
                }
            }

            let spacing = text.char_spacing + if is_space { text.word_spacing } else { 0.0 };
            let tx = (advance * text.font_size + spacing) * text.horizontal_scaling;
            self.text_matrix = self.text_matrix.pre_translate(tx, 0.0);
        }
    }

    fn paint_xobject(
        &mut self,
        name: &[u8],
        resources: Option<&'a Dictionary>,
        depth: usize,
    ) -> Result<(), RenderError> {
        let document = self.document;
        let entry = resources
            .and_then(|res| dict_get(document, res, b"XObject"))
            .and_then(|xobjects| match xobjects {
                Object::Dictionary(xobjects) => xobjects.get(name).ok(),
                _ => None,
            });
        let Some(entry) = entry else {
            tracing::debug!("XObject {} not found", String::from_utf8_lossy(name));
            return Ok(());
        };
        let id = match entry {
            Object::Reference(id) => Some(*id),
            _ => None,
        };
        let Some(Object::Stream(stream)) = resolve(document, entry) else {
            return Ok(());
        };

        match dict_get(document, &stream.dict, b"Subtype") {
            Some(Object::Name(subtype)) if subtype.as_slice() == b"Image" => {
                self.paint_image(id, stream);
                Ok(())
            }
            Some(Object::Name(subtype)) if subtype.as_slice() == b"Form" => {
                self.paint_form(stream, resources, depth)
            }
            _ => Ok(()),
        }
    }

    fn paint_image(&mut self, id: Option<ObjectId>, stream: &Stream) {
        let document = self.document;
        if is_stencil_mask(document, &stream.dict) {
            // Colour depends on the fill, so masks are not cached
            let mask = decode_stencil_mask(document, stream, self.state.fill);
            self.draw_image(mask.as_ref());
            return;
        }

        let image = match id {
            Some(id) => self
                .images
                .entry(id)
                .or_insert_with(|| decode_image(document, stream).map(Rc::new))
                .clone(),
            None => decode_image(document, stream).map(Rc::new),
        };
        self.draw_image(image.as_deref());
    }

    fn draw_image(&mut self, image: Option<&Pixmap>) {
        let Some(image) = image else {
            self.paint_unit_square(Rgb::gray(UNRESOLVED_GRAY));
            return;
        };
        // Image space: one unit square, first sample row at the top
        let to_unit = Transform::from_row(
            1.0 / image.width() as f32,
            0.0,
            0.0,
            -1.0 / image.height() as f32,
            0.0,
            1.0,
        );
        let clip = self.state.clip.clone();
        self.pixmap.draw_pixmap(
            0,
            0,
            image.as_ref(),
            &PixmapPaint::default(),
            self.state.ctm.pre_concat(to_unit),
            clip.as_deref(),
        );
    }

    fn paint_form(
        &mut self,
        stream: &'a Stream,
        parent_resources: Option<&'a Dictionary>,
        depth: usize,
    ) -> Result<(), RenderError> {
        if depth >= MAX_FORM_DEPTH {
            tracing::warn!("Form XObjects nested deeper than {MAX_FORM_DEPTH}, skipping");
            return Ok(());
        }
        let document = self.document;
        let content = stream_data(stream)?;
        let operations = parse_operations(&content)?;
        let resources = match dict_get(document, &stream.dict, b"Resources") {
            Some(Object::Dictionary(dict)) => Some(dict),
            _ => parent_resources,
        };

        self.saved.push(self.state.clone());
        if let Some(m) = dict_get(document, &stream.dict, b"Matrix").and_then(|m| numbers6(document, m)) {
            self.state.ctm = self.state.ctm.pre_concat(matrix(m));
        }
        if let Some([x0, y0, x1, y1]) = dict_get(document, &stream.dict, b"BBox").and_then(|b| numbers4(document, b)) {
            let bbox = rect_path(x0, y0, x1 - x0, y1 - y0);
            self.intersect_clip(bbox.as_ref(), FillRule::Winding);
        }

        let result = self.execute(&operations, resources, depth + 1);
        if let Some(state) = self.saved.pop() {
            self.state = state;
        }
        result
    }
}

fn matrix([a, b, c, d, e, f]: [f32; 6]) -> Transform {
    Transform::from_row(a, b, c, d, e, f)
}

fn numbers_n<const N: usize>(document: &Document, object: &Object) -> Option<[f32; N]> {
    let Object::Array(items) = object else {
        return None;
    };
    if items.len() != N {
        return None;
    }
    let mut values = [0.0f32; N];
    for (value, item) in values.iter_mut().zip(items) {
        *value = resolve(document, item).and_then(number)? as f32;
    }
    Some(values)
}

fn numbers4(document: &Document, object: &Object) -> Option<[f32; 4]> {
    numbers_n(document, object)
}

fn numbers6(document: &Document, object: &Object) -> Option<[f32; 6]> {
    numbers_n(document, object)
}

/// Closed rectangle path; width and height may be negative
fn rect_path(x: f32, y: f32, width: f32, height: f32) -> Option<Path> {
    let mut builder = PathBuilder::new();
    builder.move_to(x, y);
    builder.line_to(x + width, y);
    builder.line_to(x + width, y + height);
    builder.line_to(x, y + height);
    builder.close();
    builder.finish()
}
