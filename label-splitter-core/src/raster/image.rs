//! Image XObject decoding into tiny-skia pixmaps
//!
//! Supported: DCT (JPEG) through the `image` crate, and raw or
//! Flate/LZW-compressed samples at 1, 2, 4, 8 or 16 bits in device, ICC,
//! Separation, DeviceN and Indexed spaces, with an optional soft mask.
//! Anything else yields `None` and is painted as a grey square by the
//! renderer.

use super::color::{ColorSpace, Rgb};
use crate::document::{dict_get, filter_names, number, resolve, stream_data};
use lopdf::{Dictionary, Document, Object, Stream};
use tiny_skia::{IntSize, Pixmap};

/// Images above this many pixels are not decoded
const MAX_IMAGE_PIXELS: u64 = 64 * 1024 * 1024;

/// More components than any device or DeviceN space in practice
const MAX_COMPONENTS: usize = 8;

struct ImageHeader {
    width: u32,
    height: u32,
    bits: u8,
}

impl ImageHeader {
    fn read(document: &Document, dict: &Dictionary, default_bits: u8) -> Option<Self> {
        let dimension = |key: &[u8]| {
            dict_get(document, dict, key)
                .and_then(number)
                .filter(|v| *v >= 1.0)
                .map(|v| v as u32)
        };
        let width = dimension(b"Width")?;
        let height = dimension(b"Height")?;
        let bits = dict_get(document, dict, b"BitsPerComponent")
            .and_then(number)
            .map(|v| v as u8)
            .unwrap_or(default_bits);

        if !matches!(bits, 1 | 2 | 4 | 8 | 16) {
            return None;
        }
        if u64::from(width) * u64::from(height) > MAX_IMAGE_PIXELS {
            return None;
        }
        Some(Self {
            width,
            height,
            bits,
        })
    }

    fn row_len(&self, components: usize) -> usize {
        (self.width as usize * components * self.bits as usize).div_ceil(8)
    }

    fn max_value(&self) -> f32 {
        ((1u32 << self.bits) - 1) as f32
    }
}

/// True for a 1-bit stencil mask painted in the current fill colour
pub(crate) fn is_stencil_mask(document: &Document, dict: &Dictionary) -> bool {
    matches!(
        dict_get(document, dict, b"ImageMask"),
        Some(Object::Boolean(true))
    )
}

/// Decode an image XObject to a premultiplied pixmap
pub(crate) fn decode_image(document: &Document, stream: &Stream) -> Option<Pixmap> {
    let dict = &stream.dict;
    let filters = filter_names(document, dict);

    let (width, height, mut rgba) = match filters.last().map(Vec::as_slice) {
        Some(b"DCTDecode") if filters.len() == 1 => decode_jpeg(&stream.content)?,
        Some(b"DCTDecode" | b"JPXDecode" | b"JBIG2Decode" | b"CCITTFaxDecode") => {
            let name = filters.last().map(|f| String::from_utf8_lossy(f).into_owned());
            tracing::warn!("Unsupported image encoding {name:?}, treating the image as ink");
            return None;
        }
        _ => {
            let header = ImageHeader::read(document, dict, 8)?;
            let data = stream_data(stream).ok()?;
            let rgba = decode_samples(document, dict, &header, &data)?;
            (header.width, header.height, rgba)
        }
    };

    if let Some(Object::Stream(mask)) = dict_get(document, dict, b"SMask") {
        apply_soft_mask(document, mask, width, height, &mut rgba);
    }
    into_pixmap(width, height, rgba)
}

/// Decode a stencil mask, painting set samples in `color`
pub(crate) fn decode_stencil_mask(document: &Document, stream: &Stream, color: Rgb) -> Option<Pixmap> {
    let dict = &stream.dict;
    let header = ImageHeader::read(document, dict, 1)?;
    let data = stream_data(stream).ok()?;
    let row_len = header.row_len(1);
    if data.len() < row_len * header.height as usize {
        return None;
    }

    // Samples of 0 paint unless Decode is [1 0]
    let paint_value = match dict_get(document, dict, b"Decode") {
        Some(Object::Array(decode)) => match decode.first().and_then(number) {
            Some(first) if first >= 1.0 => 1,
            _ => 0,
        },
        _ => 0,
    };

    let [r, g, b, _] = color.to_rgba8();
    let mut rgba = Vec::with_capacity(header.width as usize * header.height as usize * 4);
    for row in data.chunks(row_len).take(header.height as usize) {
        for x in 0..header.width as usize {
            if read_sample(row, x, 1) == paint_value {
                rgba.extend_from_slice(&[r, g, b, 255]);
            } else {
                rgba.extend_from_slice(&[0, 0, 0, 0]);
            }
        }
    }
    into_pixmap(header.width, header.height, rgba)
}

fn decode_jpeg(data: &[u8]) -> Option<(u32, u32, Vec<u8>)> {
    match image::load_from_memory_with_format(data, image::ImageFormat::Jpeg) {
        Ok(decoded) => {
            let rgba = decoded.to_rgba8();
            Some((rgba.width(), rgba.height(), rgba.into_raw()))
        }
        Err(e) => {
            tracing::warn!("JPEG image could not be decoded: {e}");
            None
        }
    }
}

/// Convert raw samples to straight RGBA
fn decode_samples(
    document: &Document,
    dict: &Dictionary,
    header: &ImageHeader,
    data: &[u8],
) -> Option<Vec<u8>> {
    let space_object = dict_get(document, dict, b"ColorSpace")?;
    let palette = indexed_palette(document, space_object);
    let components = match &palette {
        Some(_) => 1,
        None => ColorSpace::from_object(document, space_object, None).components(),
    };
    if components == 0 || components > MAX_COMPONENTS {
        return None;
    }
    let space = ColorSpace::from_object(document, space_object, None);

    let row_len = header.row_len(components);
    if data.len() < row_len * header.height as usize {
        tracing::warn!(
            "Image data truncated ({} of {} bytes)",
            data.len(),
            row_len * header.height as usize
        );
        return None;
    }

    let max = header.max_value();
    // Palette indices decode to [0, max], colour components to [0, 1]
    let default_range = if palette.is_some() { (0.0, max) } else { (0.0, 1.0) };
    let ranges = decode_ranges(document, dict, components, default_range);

    let mut rgba = Vec::with_capacity(header.width as usize * header.height as usize * 4);
    let mut comps = [0.0f32; MAX_COMPONENTS];
    for row in data.chunks(row_len).take(header.height as usize) {
        for x in 0..header.width as usize {
            let pixel = match &palette {
                Some(palette) => {
                    let sample = f32::from(read_sample(row, x, header.bits));
                    let (dmin, dmax) = ranges.first().copied().unwrap_or(default_range);
                    let index = (dmin + sample * (dmax - dmin) / max).round().max(0.0) as usize;
                    palette
                        .get(index)
                        .or_else(|| palette.last())
                        .copied()
                        .unwrap_or(Rgb::BLACK)
                }
                None => {
                    for (c, (comp, &(dmin, dmax))) in
                        comps.iter_mut().zip(&ranges).enumerate().take(components)
                    {
                        let sample = f32::from(read_sample(row, x * components + c, header.bits));
                        *comp = dmin + sample * (dmax - dmin) / max;
                    }
                    space.to_rgb(&comps[..components])
                }
            };
            rgba.extend_from_slice(&pixel.to_rgba8());
        }
    }
    Some(rgba)
}

/// `(Dmin, Dmax)` per component from `Decode`, or `default` for each when
/// the array is absent or malformed
fn decode_ranges(
    document: &Document,
    dict: &Dictionary,
    components: usize,
    default: (f32, f32),
) -> Vec<(f32, f32)> {
    let defaults = vec![default; components];
    let Some(Object::Array(items)) = dict_get(document, dict, b"Decode") else {
        return defaults;
    };
    if items.len() != components * 2 {
        return defaults;
    }
    let values: Option<Vec<f32>> = items
        .iter()
        .map(|item| resolve(document, item).and_then(number).map(|v| v as f32))
        .collect();
    match values {
        Some(values) => values.chunks_exact(2).map(|pair| (pair[0], pair[1])).collect(),
        None => defaults,
    }
}

/// Palette of an `[/Indexed base hival lookup]` space, as RGB entries
fn indexed_palette(document: &Document, space: &Object) -> Option<Vec<Rgb>> {
    let Object::Array(items) = space else {
        return None;
    };
    match items.first().and_then(|obj| resolve(document, obj)) {
        Some(Object::Name(name)) if matches!(name.as_slice(), b"Indexed" | b"I") => {}
        _ => return None,
    }

    let base = ColorSpace::from_object(document, items.get(1)?, None);
    let hival = items.get(2).and_then(|obj| resolve(document, obj)).and_then(number)? as usize;
    let lookup = match items.get(3).and_then(|obj| resolve(document, obj))? {
        Object::String(bytes, _) => bytes.clone(),
        Object::Stream(stream) => stream_data(stream).ok()?,
        _ => return None,
    };

    let n = base.components();
    if n == 0 || n > MAX_COMPONENTS {
        return None;
    }
    let palette = lookup
        .chunks_exact(n)
        .take(hival + 1)
        .map(|entry| {
            let mut comps = [0.0f32; MAX_COMPONENTS];
            for (comp, byte) in comps.iter_mut().zip(entry) {
                *comp = f32::from(*byte) / 255.0;
            }
            base.to_rgb(&comps[..n])
        })
        .collect();
    Some(palette)
}

/// Multiply alpha from a soft mask of the same dimensions
fn apply_soft_mask(document: &Document, mask: &Stream, width: u32, height: u32, rgba: &mut [u8]) {
    let Some(header) = ImageHeader::read(document, &mask.dict, 8) else {
        return;
    };
    if header.width != width || header.height != height {
        tracing::debug!("Soft mask size differs from its image, ignoring it");
        return;
    }
    let Ok(data) = stream_data(mask) else {
        return;
    };
    let row_len = header.row_len(1);
    if data.len() < row_len * height as usize {
        return;
    }

    let max = header.max_value();
    for (y, row) in data.chunks(row_len).take(height as usize).enumerate() {
        for x in 0..width as usize {
            let alpha = read_sample(row, x, header.bits) as f32 / max;
            let offset = (y * width as usize + x) * 4 + 3;
            if let Some(a) = rgba.get_mut(offset) {
                *a = (f32::from(*a) * alpha).round() as u8;
            }
        }
    }
}

/// Sample `index` of a row packed at `bits` per sample
fn read_sample(row: &[u8], index: usize, bits: u8) -> u16 {
    match bits {
        8 => row.get(index).copied().map(u16::from).unwrap_or(0),
        16 => match (row.get(index * 2), row.get(index * 2 + 1)) {
            (Some(hi), Some(lo)) => u16::from_be_bytes([*hi, *lo]),
            _ => 0,
        },
        _ => {
            let bit = index * bits as usize;
            let Some(byte) = row.get(bit / 8) else {
                return 0;
            };
            let shift = 8 - bits as usize - bit % 8;
            let mask = (1u16 << bits) - 1;
            (u16::from(*byte) >> shift) & mask
        }
    }
}

/// Premultiply straight RGBA and wrap it in a pixmap
fn into_pixmap(width: u32, height: u32, mut rgba: Vec<u8>) -> Option<Pixmap> {
    for px in rgba.chunks_exact_mut(4) {
        let alpha = u16::from(px[3]);
        if alpha < 255 {
            for channel in &mut px[..3] {
                *channel = ((u16::from(*channel) * alpha + 127) / 255) as u8;
            }
        }
    }
    Pixmap::from_vec(rgba, IntSize::from_wh(width, height)?)
}
