use super::{dict_get, number, resolve, stream_data};
use crate::error::{Result, SplitError};
use crate::geometry::{PageBox, PageFrame};
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::path::{Path, PathBuf};

/// US Letter, used when a page and its ancestors carry no MediaBox
const FALLBACK_PAGE_BOX: PageBox = PageBox {
    llx: 0.0,
    lly: 0.0,
    urx: 612.0,
    ury: 792.0,
};

/// Depth limit when walking up the page tree for inherited attributes
const MAX_TREE_DEPTH: usize = 64;

/// A label sheet opened for reading
pub struct SourceDocument {
    path: PathBuf,
    document: Document,
    pages: Vec<ObjectId>,
}

impl SourceDocument {
    /// Open and parse a PDF file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(SplitError::InvalidInput(
                "no source PDF selected".to_string(),
            ));
        }
        if !path.exists() {
            return Err(SplitError::SourceNotFound(path.to_path_buf()));
        }

        let bytes = std::fs::read(path)?;
        let document = Document::load_mem(&bytes).map_err(|e| {
            SplitError::InvalidInput(format!("{} is not a readable PDF: {e}", path.display()))
        })?;

        tracing::debug!("Opened {} ({} bytes)", path.display(), bytes.len());
        Ok(Self::from_document(path, document))
    }

    /// Wrap an already loaded document
    pub fn from_document<P: AsRef<Path>>(path: P, document: Document) -> Self {
        let pages = document.get_pages().into_values().collect();
        Self {
            path: path.as_ref().to_path_buf(),
            document,
            pages,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// The underlying lopdf document
    pub fn inner(&self) -> &Document {
        &self.document
    }

    pub fn page_id(&self, index: usize) -> Result<ObjectId> {
        self.pages.get(index).copied().ok_or_else(|| {
            SplitError::InvalidInput(format!(
                "page index {index} out of bounds (document has {} pages)",
                self.pages.len()
            ))
        })
    }

    /// Visible page area: the CropBox when present, otherwise the MediaBox
    pub fn page_box(&self, index: usize) -> Result<PageBox> {
        let page_id = self.page_id(index)?;
        let page_box = self
            .inherited(page_id, b"CropBox")
            .and_then(|obj| self.rect(obj))
            .or_else(|| {
                self.inherited(page_id, b"MediaBox")
                    .and_then(|obj| self.rect(obj))
            })
            .unwrap_or(FALLBACK_PAGE_BOX);
        Ok(page_box)
    }

    /// Page rotation in degrees, normalized to 0, 90, 180 or 270
    pub fn rotation(&self, index: usize) -> Result<i64> {
        let page_id = self.page_id(index)?;
        let degrees = match self.inherited(page_id, b"Rotate") {
            Some(Object::Integer(degrees)) => *degrees,
            _ => 0,
        };
        if degrees % 90 != 0 {
            tracing::warn!("Page {}: ignoring /Rotate {degrees}", index + 1);
            return Ok(0);
        }
        Ok(degrees.rem_euclid(360))
    }

    /// Page box and rotation: the page as it is displayed
    pub fn page_frame(&self, index: usize) -> Result<PageFrame> {
        Ok(PageFrame::new(self.page_box(index)?, self.rotation(index)?))
    }

    /// Resource dictionary of a page, inherited from the page tree if needed
    pub fn resources(&self, index: usize) -> Result<Option<&Dictionary>> {
        let page_id = self.page_id(index)?;
        Ok(match self.inherited(page_id, b"Resources") {
            Some(Object::Dictionary(dict)) => Some(dict),
            _ => None,
        })
    }

    /// Decoded content of a page, all content streams joined in order
    pub fn content(&self, index: usize) -> Result<Vec<u8>> {
        let page_id = self.page_id(index)?;
        let page = self.document.get_dictionary(page_id)?;

        let streams: Vec<&Object> = match page.get(b"Contents") {
            Ok(Object::Array(items)) => items.iter().collect(),
            Ok(other) => match resolve(&self.document, other) {
                Some(Object::Array(items)) => items.iter().collect(),
                Some(_) => vec![other],
                None => Vec::new(),
            },
            Err(_) => Vec::new(),
        };

        let mut content = Vec::new();
        for object in streams {
            if let Some(Object::Stream(stream)) = resolve(&self.document, object) {
                content.extend_from_slice(&stream_data(stream)?);
                content.push(b'\n');
            }
        }
        Ok(content)
    }

    /// Look up a page attribute, walking up the page tree for inheritable keys
    fn inherited(&self, page_id: ObjectId, key: &[u8]) -> Option<&Object> {
        let mut node = self.document.get_dictionary(page_id).ok()?;
        for _ in 0..MAX_TREE_DEPTH {
            if let Some(value) = dict_get(&self.document, node, key) {
                return Some(value);
            }
            node = match dict_get(&self.document, node, b"Parent") {
                Some(Object::Dictionary(parent)) => parent,
                _ => return None,
            };
        }
        None
    }

    fn rect(&self, object: &Object) -> Option<PageBox> {
        let Object::Array(items) = object else {
            return None;
        };
        let values: Vec<f64> = items
            .iter()
            .filter_map(|item| resolve(&self.document, item).and_then(number))
            .collect();
        match values.as_slice() {
            [ax, ay, bx, by] => {
                let page_box = PageBox::from_corners(*ax, *ay, *bx, *by);
                (page_box.width() > 0.0 && page_box.height() > 0.0).then_some(page_box)
            }
            _ => None,
        }
    }
}

impl std::fmt::Debug for SourceDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceDocument")
            .field("path", &self.path)
            .field("pages", &self.pages.len())
            .finish()
    }
}
