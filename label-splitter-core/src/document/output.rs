use super::{real, SourceDocument};
use crate::error::Result;
use crate::format::LabelFormat;
use crate::geometry::{CellRect, PageBox};
use chrono::{DateTime, Utc};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::collections::{BTreeMap, HashMap};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Where a label lands on its output page, in points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub page_width: f64,
    pub page_height: f64,
    /// Distance of the label's left edge from the page's left edge
    pub x: f64,
    /// Distance of the label's top edge from the page's top edge
    pub y: f64,
}

impl Placement {
    /// Placement of `rect` for `format`.
    ///
    /// Formats with a fixed page height get a page of (label width, page
    /// height) with the label flush left and vertically centered. Other
    /// formats get a page exactly the size of the cell with the label at the
    /// origin.
    pub fn for_cell(format: &LabelFormat, rect: &CellRect) -> Self {
        match format.page_height_pt() {
            Some(page_height) => {
                let label_height = format.label_height_pt();
                Self {
                    page_width: format.label_width_pt(),
                    page_height,
                    x: 0.0,
                    y: (page_height - label_height) / 2.0,
                }
            }
            None => Self {
                page_width: rect.width(),
                page_height: rect.height(),
                x: 0.0,
                y: 0.0,
            },
        }
    }
}

/// Append-only document of single-label pages.
///
/// Every source page that contributes a label is imported once as a form
/// XObject. Each label page then draws a small wrapper form whose bounding
/// box is the cell, which clips the shared page to that one label.
pub struct OutputDocument {
    document: Document,
    pages_id: ObjectId,
    page_ids: Vec<ObjectId>,
    templates: HashMap<usize, ObjectId>,
    imported: BTreeMap<ObjectId, ObjectId>,
    producer: String,
}

impl Default for OutputDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputDocument {
    pub fn new() -> Self {
        let mut document = Document::with_version("1.7");
        let pages_id = document.new_object_id();
        Self {
            document,
            pages_id,
            page_ids: Vec::new(),
            templates: HashMap::new(),
            imported: BTreeMap::new(),
            producer: format!("label-splitter v{}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.page_ids.is_empty()
    }

    /// Append a page showing `clip` of source page `page` at `placement`.
    ///
    /// The clip is taken as given: parts of it outside the source page stay
    /// empty on the output page. Content is copied, never scaled.
    pub fn add_label_page(
        &mut self,
        source: &SourceDocument,
        page: usize,
        clip: &CellRect,
        placement: &Placement,
    ) -> Result<ObjectId> {
        let frame = source.page_frame(page)?;
        let template = self.page_template(source, page, &frame.page_box)?;
        let cell = frame.to_user_space(clip);

        let wrapper = self.document.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => rect_array(&cell),
                "Resources" => dictionary! {
                    "XObject" => dictionary! { "P" => Object::Reference(template) },
                },
            },
            b"/P Do".to_vec(),
        ));

        // Lower-left corner of the label on the output page
        let target_x = placement.x;
        let target_y = placement.page_height - placement.y - clip.height();
        // Source user space to displayed page coordinates, then flipped so
        // the clip's top-left lands on the label's top-left
        let [a, b, c, d, e, f] = frame.user_to_page();
        let content = format!(
            "q {} {} {} {} {:.4} {:.4} cm /L Do Q",
            a as i64,
            -b as i64,
            c as i64,
            -d as i64,
            e - clip.x0 + target_x,
            clip.y1 + target_y - f
        );
        let content_id = self
            .document
            .add_object(Stream::new(Dictionary::new(), content.into_bytes()));

        let page_id = self.document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(self.pages_id),
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                real(placement.page_width),
                real(placement.page_height),
            ],
            "Contents" => Object::Reference(content_id),
            "Resources" => dictionary! {
                "XObject" => dictionary! { "L" => Object::Reference(wrapper) },
            },
        });
        self.page_ids.push(page_id);
        Ok(page_id)
    }

    /// Write the document to `path`.
    ///
    /// The bytes go to a temporary file next to `path` which is then renamed
    /// over it, so a failed save leaves nothing behind.
    pub fn save<P: AsRef<Path>>(mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.finalize(Utc::now());

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut builder = tempfile::Builder::new();
        builder.prefix(".label-splitter-").suffix(".part");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            builder.permissions(std::fs::Permissions::from_mode(0o644));
        }
        let mut temp = builder.tempfile_in(dir)?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            self.document.save_to(&mut writer)?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| e.error)?;

        tracing::info!(
            "Saved {} label page(s) to {}",
            self.page_ids.len(),
            path.display()
        );
        Ok(())
    }

    /// Serialize into a byte buffer
    pub fn to_bytes(mut self) -> Result<Vec<u8>> {
        self.finalize(Utc::now());
        let mut buffer = Vec::new();
        self.document.save_to(&mut buffer)?;
        Ok(buffer)
    }

    /// Build the page tree, catalog and info dictionary
    fn finalize(&mut self, created: DateTime<Utc>) {
        let kids: Vec<Object> = self.page_ids.iter().map(|id| Object::Reference(*id)).collect();
        self.document.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => Object::Integer(self.page_ids.len() as i64),
            }),
        );

        let catalog_id = self.document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(self.pages_id),
        });
        let info_id = self.document.add_object(dictionary! {
            "Producer" => Object::String(self.producer.clone().into_bytes(), StringFormat::Literal),
            "CreationDate" => Object::String(format_pdf_date(created).into_bytes(), StringFormat::Literal),
        });
        self.document.trailer.set("Root", Object::Reference(catalog_id));
        self.document.trailer.set("Info", Object::Reference(info_id));
    }

    /// Import a whole source page as a form XObject, once per page
    fn page_template(
        &mut self,
        source: &SourceDocument,
        page: usize,
        page_box: &PageBox,
    ) -> Result<ObjectId> {
        if let Some(&id) = self.templates.get(&page) {
            return Ok(id);
        }

        let content = source.content(page)?;
        let resources = match source.resources(page)? {
            Some(dict) => self.import_dictionary(source.inner(), dict),
            None => Dictionary::new(),
        };

        let dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => rect_array(page_box),
            "Resources" => resources,
            "Filter" => "FlateDecode",
        };
        let id = self
            .document
            .add_object(Stream::new(dict, compress(&content)?));
        self.templates.insert(page, id);

        tracing::debug!("Imported source page {page} as form {id:?}");
        Ok(id)
    }

    fn import_object(&mut self, source: &Document, object: &Object) -> Object {
        match object {
            Object::Reference(id) => Object::Reference(self.import_reference(source, *id)),
            Object::Array(items) => Object::Array(
                items
                    .iter()
                    .map(|item| self.import_object(source, item))
                    .collect(),
            ),
            Object::Dictionary(dict) => Object::Dictionary(self.import_dictionary(source, dict)),
            Object::Stream(stream) => {
                let dict = self.import_dictionary(source, &stream.dict);
                Object::Stream(Stream::new(dict, stream.content.clone()))
            }
            other => other.clone(),
        }
    }

    fn import_dictionary(&mut self, source: &Document, dict: &Dictionary) -> Dictionary {
        let mut copy = Dictionary::new();
        for (key, value) in dict.iter() {
            // Back-links into the page tree would drag in every page
            if key.as_slice() == b"Parent" {
                continue;
            }
            copy.set(key.clone(), self.import_object(source, value));
        }
        copy
    }

    /// Copy an indirect object, mapping it to one id per source object
    fn import_reference(&mut self, source: &Document, id: ObjectId) -> ObjectId {
        if let Some(&mapped) = self.imported.get(&id) {
            return mapped;
        }
        let new_id = self.document.new_object_id();
        self.imported.insert(id, new_id);

        let copy = match source.get_object(id) {
            Ok(object) => self.import_object(source, object),
            Err(_) => Object::Null,
        };
        self.document.objects.insert(new_id, copy);
        new_id
    }
}

fn rect_array(rect: &PageBox) -> Vec<Object> {
    vec![real(rect.llx), real(rect.lly), real(rect.urx), real(rect.ury)]
}

/// Compress data using Flate/Zlib compression
fn compress(data: &[u8]) -> Result<Vec<u8>> {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn format_pdf_date(date: DateTime<Utc>) -> String {
    // D:YYYYMMDDHHmmSSOHH'mm, always UTC here
    let formatted = date.format("D:%Y%m%d%H%M%S");
    format!("{formatted}+00'00")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FormatId;
    use crate::geometry::GridLayout;

    fn blank_sheet(width: i64, height: i64) -> SourceDocument {
        rotated_sheet(width, height, 0)
    }

    fn rotated_sheet(width: i64, height: i64, rotation: i64) -> SourceDocument {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let content = doc.add_object(Stream::new(
            Dictionary::new(),
            b"0 0 1 rg 10 10 50 50 re f".to_vec(),
        ));
        let page = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(width),
                Object::Integer(height),
            ],
            "Rotate" => Object::Integer(rotation),
            "Contents" => Object::Reference(content),
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => Object::Reference(font_id) },
            },
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page)],
                "Count" => Object::Integer(1),
            }),
        );
        let catalog = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog));
        SourceDocument::from_document("sheet.pdf", doc)
    }

    fn media_box(doc: &Document, page_id: ObjectId) -> Vec<f64> {
        let page = doc.get_dictionary(page_id).unwrap();
        match page.get(b"MediaBox").unwrap() {
            Object::Array(items) => items.iter().filter_map(super::super::number).collect(),
            _ => panic!("MediaBox is not an array"),
        }
    }

    #[test]
    fn test_placement_fixed_page_height_centers_label() {
        let layout = GridLayout::for_format(FormatId::SixUp).unwrap();
        let rect = layout.cell_rect(1, 1);
        let placement = Placement::for_cell(&layout.format, &rect);

        let label_height = layout.format.label_height_pt();
        assert!((placement.page_width - layout.format.label_width_pt()).abs() < 1e-9);
        assert!((placement.page_height - 150.0 * 72.0 / 25.4).abs() < 1e-9);
        assert_eq!(placement.x, 0.0);

        let bottom_margin = placement.page_height - placement.y - label_height;
        assert!((placement.y - bottom_margin).abs() < 1e-9);
    }

    #[test]
    fn test_placement_cell_sized_page() {
        let layout = GridLayout::for_format(FormatId::FortyFiveUp).unwrap();
        let rect = layout.cell_rect(0, 0);
        let placement = Placement::for_cell(&layout.format, &rect);

        assert_eq!(placement.page_width, rect.width());
        assert_eq!(placement.page_height, rect.height());
        assert_eq!((placement.x, placement.y), (0.0, 0.0));
    }

    #[test]
    fn test_empty_output_document() {
        let output = OutputDocument::new();
        assert!(output.is_empty());
        assert_eq!(output.page_count(), 0);
    }

    #[test]
    fn test_add_label_page_sizes_and_reuses_template() {
        let source = blank_sheet(612, 792);
        let mut output = OutputDocument::new();
        let placement = Placement {
            page_width: 100.0,
            page_height: 150.0,
            x: 0.0,
            y: 25.0,
        };

        let first = output
            .add_label_page(&source, 0, &CellRect::new(0.0, 0.0, 100.0, 100.0), &placement)
            .unwrap();
        let second = output
            .add_label_page(&source, 0, &CellRect::new(100.0, 0.0, 200.0, 100.0), &placement)
            .unwrap();

        assert_eq!(output.page_count(), 2);
        assert_ne!(first, second);
        assert_eq!(output.templates.len(), 1);
        assert_eq!(media_box(&output.document, first), vec![0.0, 0.0, 100.0, 150.0]);
    }

    #[test]
    fn test_label_content_translation() {
        let source = blank_sheet(612, 792);
        let mut output = OutputDocument::new();
        let placement = Placement {
            page_width: 100.0,
            page_height: 150.0,
            x: 0.0,
            y: 25.0,
        };
        let page_id = output
            .add_label_page(&source, 0, &CellRect::new(100.0, 200.0, 200.0, 300.0), &placement)
            .unwrap();

        // Cell in user space: llx 100, lly 792 - 300 = 492. Target lower-left: (0, 25).
        let content = output.document.get_page_content(page_id).unwrap();
        let content = String::from_utf8(content).unwrap();
        assert_eq!(content, "q 1 0 0 1 -100.0000 -467.0000 cm /L Do Q");
    }

    #[test]
    fn test_rotated_page_label_is_upright() {
        // 200 x 100 page displayed as 100 x 200; its top-left 50 x 50 is the
        // lower-left of user space
        let source = rotated_sheet(200, 100, 90);
        let mut output = OutputDocument::new();
        let placement = Placement {
            page_width: 50.0,
            page_height: 50.0,
            x: 0.0,
            y: 0.0,
        };
        let page_id = output
            .add_label_page(&source, 0, &CellRect::new(0.0, 0.0, 50.0, 50.0), &placement)
            .unwrap();

        let content = output.document.get_page_content(page_id).unwrap();
        let content = String::from_utf8(content).unwrap();
        assert_eq!(content, "q 0 -1 1 0 0.0000 50.0000 cm /L Do Q");

        let page = output.document.get_dictionary(page_id).unwrap();
        let xobjects = page
            .get(b"Resources")
            .and_then(Object::as_dict)
            .and_then(|resources| resources.get(b"XObject"))
            .and_then(Object::as_dict)
            .unwrap();
        let wrapper_id = xobjects.get(b"L").and_then(Object::as_reference).unwrap();
        let wrapper = output.document.get_object(wrapper_id).and_then(Object::as_stream).unwrap();
        let bbox: Vec<f64> = match wrapper.dict.get(b"BBox").unwrap() {
            Object::Array(items) => items.iter().filter_map(super::super::number).collect(),
            _ => panic!("BBox is not an array"),
        };
        assert_eq!(bbox, vec![0.0, 0.0, 50.0, 50.0]);
    }

    #[test]
    fn test_resources_are_deep_copied() {
        let source = blank_sheet(612, 792);
        let mut output = OutputDocument::new();
        let placement = Placement {
            page_width: 50.0,
            page_height: 50.0,
            x: 0.0,
            y: 0.0,
        };
        output
            .add_label_page(&source, 0, &CellRect::new(0.0, 0.0, 50.0, 50.0), &placement)
            .unwrap();

        assert_eq!(output.imported.len(), 1);
        let font_id = *output.imported.values().next().unwrap();
        let font = output.document.get_dictionary(font_id).unwrap();
        assert!(matches!(font.get(b"BaseFont"), Ok(Object::Name(name)) if name == b"Helvetica"));
    }

    #[test]
    fn test_to_bytes_round_trip() {
        let source = blank_sheet(612, 792);
        let mut output = OutputDocument::new();
        let placement = Placement {
            page_width: 50.0,
            page_height: 60.0,
            x: 0.0,
            y: 0.0,
        };
        for _ in 0..3 {
            output
                .add_label_page(&source, 0, &CellRect::new(0.0, 0.0, 50.0, 60.0), &placement)
                .unwrap();
        }

        let bytes = output.to_bytes().unwrap();
        assert!(bytes.starts_with(b"%PDF-1.7"));

        let reloaded = Document::load_mem(&bytes).unwrap();
        assert_eq!(reloaded.get_pages().len(), 3);
    }

    #[test]
    fn test_save_writes_file_atomically() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("labels.pdf");
        let source = blank_sheet(612, 792);
        let mut output = OutputDocument::new();
        let placement = Placement {
            page_width: 50.0,
            page_height: 60.0,
            x: 0.0,
            y: 0.0,
        };
        output
            .add_label_page(&source, 0, &CellRect::new(0.0, 0.0, 50.0, 60.0), &placement)
            .unwrap();
        output.save(&path).unwrap();

        assert!(path.exists());
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".part"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_save_into_missing_directory_fails_cleanly() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("missing").join("labels.pdf");
        let output = OutputDocument::new();
        assert!(output.save(&path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_format_pdf_date() {
        use chrono::TimeZone;
        let date = Utc.with_ymd_and_hms(2023, 1, 1, 12, 30, 45).unwrap();
        assert_eq!(format_pdf_date(date), "D:20230101123045+00'00");
    }
}
