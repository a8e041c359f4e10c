//! PDF documents on both ends of the pipeline
//!
//! [`SourceDocument`] is the label sheet being read, [`OutputDocument`] the
//! append-only document of single labels being built. Both sit on lopdf's
//! object model; the helpers below are shared with the rasterizer.

mod output;
mod source;

pub use output::{OutputDocument, Placement};
pub use source::SourceDocument;

use lopdf::{Dictionary, Document, Object, Stream};

/// Depth after which reference chains are treated as broken
const MAX_REFERENCE_DEPTH: usize = 32;

/// Follow references until a direct object is reached
pub(crate) fn resolve<'a>(document: &'a Document, object: &'a Object) -> Option<&'a Object> {
    let mut current = object;
    for _ in 0..MAX_REFERENCE_DEPTH {
        match current {
            Object::Reference(id) => current = document.get_object(*id).ok()?,
            other => return Some(other),
        }
    }
    None
}

/// Look up `key` in `dict`, following references
pub(crate) fn dict_get<'a>(
    document: &'a Document,
    dict: &'a Dictionary,
    key: &[u8],
) -> Option<&'a Object> {
    dict.get(key).ok().and_then(|obj| resolve(document, obj))
}

/// Numeric value of an integer or real object
pub(crate) fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

/// A real object from an f64, in lopdf's real representation
pub(crate) fn real(value: f64) -> Object {
    Object::Real((value as f32).into())
}

/// Names of the filters applied to a stream, outermost first
pub(crate) fn filter_names(document: &Document, dict: &Dictionary) -> Vec<Vec<u8>> {
    match dict_get(document, dict, b"Filter") {
        Some(Object::Name(name)) => vec![name.clone()],
        Some(Object::Array(items)) => items
            .iter()
            .filter_map(|item| match resolve(document, item) {
                Some(Object::Name(name)) => Some(name.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Decoded bytes of a stream
pub(crate) fn stream_data(stream: &Stream) -> lopdf::Result<Vec<u8>> {
    if stream.dict.has(b"Filter") {
        stream.decompressed_content()
    } else {
        Ok(stream.content.clone())
    }
}
