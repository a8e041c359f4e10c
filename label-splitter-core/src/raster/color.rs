//! Colour spaces, reduced to what ink coverage needs

use crate::document::{dict_get, resolve};
use lopdf::{Dictionary, Document, Object};

/// Grey used for content whose colour cannot be resolved (patterns,
/// shadings, undecodable images). Dark enough to count as ink.
pub const UNRESOLVED_GRAY: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColorSpace {
    Gray,
    Rgb,
    Cmyk,
    Lab,
    /// Separation or DeviceN: tints of one or more colorants
    Tint(usize),
    /// Indexed palette (1 component, lookup not resolved)
    Indexed,
    Pattern,
    /// Anything else, with its component count when known
    Other(usize),
}

impl ColorSpace {
    pub fn components(&self) -> usize {
        match self {
            ColorSpace::Gray | ColorSpace::Indexed | ColorSpace::Pattern => 1,
            ColorSpace::Rgb | ColorSpace::Lab => 3,
            ColorSpace::Cmyk => 4,
            ColorSpace::Tint(n) | ColorSpace::Other(n) => *n,
        }
    }

    /// Colour a freshly selected space starts with
    pub fn initial_color(&self) -> Rgb {
        match self {
            ColorSpace::Indexed | ColorSpace::Pattern | ColorSpace::Other(_) => {
                Rgb::gray(UNRESOLVED_GRAY)
            }
            ColorSpace::Lab => Rgb::gray(0.0),
            _ => Rgb::BLACK,
        }
    }

    /// Convert components in this space to RGB
    pub fn to_rgb(&self, comps: &[f32]) -> Rgb {
        match (self, comps) {
            (ColorSpace::Gray, [g, ..]) => Rgb::gray(*g),
            (ColorSpace::Rgb, [r, g, b, ..]) => Rgb::new(*r, *g, *b),
            (ColorSpace::Cmyk, [c, m, y, k, ..]) => cmyk_to_rgb(*c, *m, *y, *k),
            (ColorSpace::Lab, [l, ..]) => Rgb::gray(*l / 100.0),
            (ColorSpace::Tint(_), tints) if !tints.is_empty() => {
                let strongest = tints.iter().copied().fold(0.0f32, f32::max);
                Rgb::gray(1.0 - strongest)
            }
            (ColorSpace::Other(_), [g]) => Rgb::gray(*g),
            (ColorSpace::Other(_), [r, g, b]) => Rgb::new(*r, *g, *b),
            (ColorSpace::Other(_), [c, m, y, k]) => cmyk_to_rgb(*c, *m, *y, *k),
            _ => Rgb::gray(UNRESOLVED_GRAY),
        }
    }

    /// Parse a colour space operand or dictionary value.
    ///
    /// Names not among the device spaces are looked up in the `ColorSpace`
    /// category of `resources`.
    pub fn from_object(
        document: &Document,
        object: &Object,
        resources: Option<&Dictionary>,
    ) -> ColorSpace {
        match resolve(document, object) {
            Some(Object::Name(name)) => match Self::from_device_name(name) {
                Some(space) => space,
                None => resources
                    .and_then(|res| dict_get(document, res, b"ColorSpace"))
                    .and_then(|obj| match obj {
                        Object::Dictionary(spaces) => dict_get(document, spaces, name),
                        _ => None,
                    })
                    .map(|value| Self::from_object(document, value, None))
                    .unwrap_or(ColorSpace::Other(0)),
            },
            Some(Object::Array(items)) => Self::from_family(document, items),
            _ => ColorSpace::Other(0),
        }
    }

    fn from_device_name(name: &[u8]) -> Option<ColorSpace> {
        match name {
            b"DeviceGray" | b"G" | b"CalGray" => Some(ColorSpace::Gray),
            b"DeviceRGB" | b"RGB" | b"CalRGB" => Some(ColorSpace::Rgb),
            b"DeviceCMYK" | b"CMYK" => Some(ColorSpace::Cmyk),
            b"Lab" => Some(ColorSpace::Lab),
            b"Pattern" => Some(ColorSpace::Pattern),
            b"Indexed" | b"I" => Some(ColorSpace::Indexed),
            _ => None,
        }
    }

    fn from_family(document: &Document, items: &[Object]) -> ColorSpace {
        let family = match items.first().and_then(|obj| resolve(document, obj)) {
            Some(Object::Name(name)) => name.as_slice(),
            _ => return ColorSpace::Other(0),
        };
        match family {
            b"ICCBased" => {
                let n = items
                    .get(1)
                    .and_then(|obj| resolve(document, obj))
                    .and_then(|obj| match obj {
                        Object::Stream(stream) => stream.dict.get(b"N").ok(),
                        _ => None,
                    })
                    .and_then(|n| match n {
                        Object::Integer(n) => Some(*n),
                        _ => None,
                    });
                match n {
                    Some(1) => ColorSpace::Gray,
                    Some(3) => ColorSpace::Rgb,
                    Some(4) => ColorSpace::Cmyk,
                    Some(n) if n > 0 => ColorSpace::Other(n as usize),
                    _ => ColorSpace::Other(0),
                }
            }
            b"Separation" => ColorSpace::Tint(1),
            b"DeviceN" => {
                let n = match items.get(1).and_then(|obj| resolve(document, obj)) {
                    Some(Object::Array(names)) => names.len(),
                    _ => 1,
                };
                ColorSpace::Tint(n.max(1))
            }
            b"Indexed" | b"I" => ColorSpace::Indexed,
            b"Pattern" => ColorSpace::Pattern,
            other => Self::from_device_name(other).unwrap_or(ColorSpace::Other(0)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    pub fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn gray(level: f32) -> Self {
        Self::new(level, level, level)
    }

    pub fn to_rgba8(self) -> [u8; 4] {
        let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        [channel(self.r), channel(self.g), channel(self.b), 255]
    }

    pub fn paint(self) -> tiny_skia::Paint<'static> {
        let [r, g, b, a] = self.to_rgba8();
        let mut paint = tiny_skia::Paint::default();
        paint.set_color_rgba8(r, g, b, a);
        paint.anti_alias = true;
        paint
    }
}

pub fn cmyk_to_rgb(c: f32, m: f32, y: f32, k: f32) -> Rgb {
    Rgb::new(
        (1.0 - c) * (1.0 - k),
        (1.0 - m) * (1.0 - k),
        (1.0 - y) * (1.0 - k),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Stream};

    #[test]
    fn test_device_conversions() {
        assert_eq!(ColorSpace::Gray.to_rgb(&[0.25]), Rgb::gray(0.25));
        assert_eq!(
            ColorSpace::Rgb.to_rgb(&[1.0, 0.5, 0.0]),
            Rgb::new(1.0, 0.5, 0.0)
        );
        assert_eq!(ColorSpace::Cmyk.to_rgb(&[0.0, 0.0, 0.0, 0.0]), Rgb::gray(1.0));
        assert_eq!(ColorSpace::Cmyk.to_rgb(&[0.0, 0.0, 0.0, 1.0]), Rgb::BLACK);
    }

    #[test]
    fn test_tints_darken_with_ink() {
        assert_eq!(ColorSpace::Tint(1).to_rgb(&[0.0]), Rgb::gray(1.0));
        assert_eq!(ColorSpace::Tint(1).to_rgb(&[1.0]), Rgb::BLACK);
        assert_eq!(ColorSpace::Tint(2).to_rgb(&[0.2, 0.6]).r, 1.0 - 0.6);
    }

    #[test]
    fn test_unresolved_spaces_are_gray() {
        assert_eq!(
            ColorSpace::Pattern.to_rgb(&[]),
            Rgb::gray(UNRESOLVED_GRAY)
        );
        assert_eq!(
            ColorSpace::Indexed.initial_color(),
            Rgb::gray(UNRESOLVED_GRAY)
        );
        assert_eq!(ColorSpace::Rgb.to_rgb(&[0.5]), Rgb::gray(UNRESOLVED_GRAY));
    }

    #[test]
    fn test_to_rgba8_clamps() {
        assert_eq!(Rgb::new(2.0, -1.0, 0.5).to_rgba8(), [255, 0, 128, 255]);
    }

    #[test]
    fn test_parse_device_names() {
        let doc = Document::with_version("1.5");
        let parse = |name: &str| ColorSpace::from_object(&doc, &Object::Name(name.into()), None);
        assert_eq!(parse("DeviceGray"), ColorSpace::Gray);
        assert_eq!(parse("DeviceRGB"), ColorSpace::Rgb);
        assert_eq!(parse("DeviceCMYK"), ColorSpace::Cmyk);
        assert_eq!(parse("Pattern"), ColorSpace::Pattern);
        assert_eq!(parse("CS9"), ColorSpace::Other(0));
    }

    #[test]
    fn test_parse_named_icc_space_from_resources() {
        let mut doc = Document::with_version("1.5");
        let icc = doc.add_object(Stream::new(dictionary! { "N" => Object::Integer(4) }, Vec::new()));
        let resources = dictionary! {
            "ColorSpace" => dictionary! {
                "CS0" => vec![Object::Name(b"ICCBased".to_vec()), Object::Reference(icc)],
                "CS1" => vec![
                    Object::Name(b"Separation".to_vec()),
                    Object::Name(b"Spot".to_vec()),
                    Object::Name(b"DeviceCMYK".to_vec()),
                ],
            },
        };

        let cs0 = ColorSpace::from_object(&doc, &Object::Name(b"CS0".to_vec()), Some(&resources));
        assert_eq!(cs0, ColorSpace::Cmyk);
        assert_eq!(cs0.components(), 4);

        let cs1 = ColorSpace::from_object(&doc, &Object::Name(b"CS1".to_vec()), Some(&resources));
        assert_eq!(cs1, ColorSpace::Tint(1));
    }
}
