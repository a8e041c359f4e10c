//! Content stream operations relevant to ink coverage
//!
//! lopdf tokenizes the stream into untyped operations; this module turns
//! them into a typed enum and drops what cannot change a pixel (marked
//! content, compatibility sections, rendering intents and the like).
//! Operators with malformed operands are skipped, as viewers do.

use crate::document::number;
use lopdf::content::{Content, Operation};
use lopdf::Object;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ContentOperation {
    // Graphics state
    SaveGraphicsState,            // q
    RestoreGraphicsState,         // Q
    SetTransformMatrix([f32; 6]), // cm
    SetLineWidth(f32),            // w

    // Path construction
    MoveTo(f32, f32),                      // m
    LineTo(f32, f32),                      // l
    CurveTo(f32, f32, f32, f32, f32, f32), // c
    CurveToV(f32, f32, f32, f32),          // v
    CurveToY(f32, f32, f32, f32),          // y
    ClosePath,                             // h
    Rectangle(f32, f32, f32, f32),         // re

    // Path painting
    Stroke,                 // S
    CloseStroke,            // s
    Fill,                   // f, F
    FillEvenOdd,            // f*
    FillStroke,             // B
    FillStrokeEvenOdd,      // B*
    CloseFillStroke,        // b
    CloseFillStrokeEvenOdd, // b*
    EndPath,                // n

    // Clipping
    Clip,        // W
    ClipEvenOdd, // W*

    // Colour
    SetStrokingColorSpace(Vec<u8>),         // CS
    SetNonStrokingColorSpace(Vec<u8>),      // cs
    SetStrokingColor(Vec<f32>),             // SC, SCN
    SetNonStrokingColor(Vec<f32>),          // sc, scn
    SetStrokingGray(f32),                   // G
    SetNonStrokingGray(f32),                // g
    SetStrokingRGB(f32, f32, f32),          // RG
    SetNonStrokingRGB(f32, f32, f32),       // rg
    SetStrokingCMYK(f32, f32, f32, f32),    // K
    SetNonStrokingCMYK(f32, f32, f32, f32), // k

    // Text
    BeginText,                                     // BT
    EndText,                                       // ET
    SetCharSpacing(f32),                           // Tc
    SetWordSpacing(f32),                           // Tw
    SetHorizontalScaling(f32),                     // Tz
    SetLeading(f32),                               // TL
    SetFont(Vec<u8>, f32),                         // Tf
    SetTextRenderMode(i64),                        // Tr
    SetTextRise(f32),                              // Ts
    MoveText(f32, f32),                            // Td
    MoveTextSetLeading(f32, f32),                  // TD
    SetTextMatrix([f32; 6]),                       // Tm
    NextLine,                                      // T*
    ShowText(Vec<u8>),                             // Tj
    ShowTextArray(Vec<TextElement>),               // TJ
    NextLineShowText(Vec<u8>),                     // '
    SetSpacingNextLineShowText(f32, f32, Vec<u8>), // "

    // Opaque painting
    ShadingFill,           // sh
    InlineImage,           // BI .. ID .. EI
    PaintXObject(Vec<u8>), // Do
}

/// Element of a `TJ` array
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TextElement {
    Text(Vec<u8>),
    /// Adjustment in thousandths of text space, subtracted from the advance
    Spacing(f32),
}

/// Decode a content stream into the operations the renderer acts on
pub(crate) fn parse_operations(content: &[u8]) -> lopdf::Result<Vec<ContentOperation>> {
    let content = Content::decode(content)?;
    Ok(content
        .operations
        .iter()
        .filter_map(parse_operation)
        .collect())
}

fn parse_operation(operation: &Operation) -> Option<ContentOperation> {
    use ContentOperation::*;

    let operands = operation.operands.as_slice();
    let op = match operation.operator.as_str() {
        "q" => SaveGraphicsState,
        "Q" => RestoreGraphicsState,
        "cm" => SetTransformMatrix(numbers::<6>(operands)?),
        "w" => {
            let [width] = numbers(operands)?;
            SetLineWidth(width)
        }

        "m" => {
            let [x, y] = numbers(operands)?;
            MoveTo(x, y)
        }
        "l" => {
            let [x, y] = numbers(operands)?;
            LineTo(x, y)
        }
        "c" => {
            let [x1, y1, x2, y2, x3, y3] = numbers(operands)?;
            CurveTo(x1, y1, x2, y2, x3, y3)
        }
        "v" => {
            let [x2, y2, x3, y3] = numbers(operands)?;
            CurveToV(x2, y2, x3, y3)
        }
        "y" => {
            let [x1, y1, x3, y3] = numbers(operands)?;
            CurveToY(x1, y1, x3, y3)
        }
        "h" => ClosePath,
        "re" => {
            let [x, y, width, height] = numbers(operands)?;
            Rectangle(x, y, width, height)
        }

        "S" => Stroke,
        "s" => CloseStroke,
        "f" | "F" => Fill,
        "f*" => FillEvenOdd,
        "B" => FillStroke,
        "B*" => FillStrokeEvenOdd,
        "b" => CloseFillStroke,
        "b*" => CloseFillStrokeEvenOdd,
        "n" => EndPath,

        "W" => Clip,
        "W*" => ClipEvenOdd,

        "CS" => match operands.last()? {
            Object::Name(name) => SetStrokingColorSpace(name.clone()),
            _ => return None,
        },
        "cs" => match operands.last()? {
            Object::Name(name) => SetNonStrokingColorSpace(name.clone()),
            _ => return None,
        },
        "SC" | "SCN" => SetStrokingColor(color_components(operands)),
        "sc" | "scn" => SetNonStrokingColor(color_components(operands)),
        "G" => {
            let [gray] = numbers(operands)?;
            SetStrokingGray(gray)
        }
        "g" => {
            let [gray] = numbers(operands)?;
            SetNonStrokingGray(gray)
        }
        "RG" => {
            let [r, g, b] = numbers(operands)?;
            SetStrokingRGB(r, g, b)
        }
        "rg" => {
            let [r, g, b] = numbers(operands)?;
            SetNonStrokingRGB(r, g, b)
        }
        "K" => {
            let [c, m, y, k] = numbers(operands)?;
            SetStrokingCMYK(c, m, y, k)
        }
        "k" => {
            let [c, m, y, k] = numbers(operands)?;
            SetNonStrokingCMYK(c, m, y, k)
        }

        "BT" => BeginText,
        "ET" => EndText,
        "Tc" => {
            let [spacing] = numbers(operands)?;
            SetCharSpacing(spacing)
        }
        "Tw" => {
            let [spacing] = numbers(operands)?;
            SetWordSpacing(spacing)
        }
        "Tz" => {
            let [scale] = numbers(operands)?;
            SetHorizontalScaling(scale)
        }
        "TL" => {
            let [leading] = numbers(operands)?;
            SetLeading(leading)
        }
        "Tf" => match operands {
            [.., Object::Name(font), size] => SetFont(font.clone(), number(size)? as f32),
            _ => return None,
        },
        "Tr" => match operands.last()? {
            Object::Integer(mode) => SetTextRenderMode(*mode),
            _ => return None,
        },
        "Ts" => {
            let [rise] = numbers(operands)?;
            SetTextRise(rise)
        }
        "Td" => {
            let [tx, ty] = numbers(operands)?;
            MoveText(tx, ty)
        }
        "TD" => {
            let [tx, ty] = numbers(operands)?;
            MoveTextSetLeading(tx, ty)
        }
        "Tm" => SetTextMatrix(numbers::<6>(operands)?),
        "T*" => NextLine,
        "Tj" => ShowText(string(operands.last()?)?),
        "TJ" => match operands.last()? {
            Object::Array(items) => ShowTextArray(
                items
                    .iter()
                    .filter_map(|item| match item {
                        Object::String(bytes, _) => Some(TextElement::Text(bytes.clone())),
                        other => number(other).map(|n| TextElement::Spacing(n as f32)),
                    })
                    .collect(),
            ),
            _ => return None,
        },
        "'" => NextLineShowText(string(operands.last()?)?),
        "\"" => match operands {
            [.., word, char, text] => SetSpacingNextLineShowText(
                number(word)? as f32,
                number(char)? as f32,
                string(text)?,
            ),
            _ => return None,
        },

        "sh" => ShadingFill,
        "BI" | "EI" => InlineImage,
        "Do" => match operands.last()? {
            Object::Name(name) => PaintXObject(name.clone()),
            _ => return None,
        },

        _ => return None,
    };
    Some(op)
}

/// The trailing `N` operands as numbers
fn numbers<const N: usize>(operands: &[Object]) -> Option<[f32; N]> {
    let start = operands.len().checked_sub(N)?;
    let mut values = [0.0f32; N];
    for (value, operand) in values.iter_mut().zip(&operands[start..]) {
        *value = number(operand)? as f32;
    }
    Some(values)
}

/// Numeric colour components; a trailing pattern name is dropped
fn color_components(operands: &[Object]) -> Vec<f32> {
    operands
        .iter()
        .filter_map(number)
        .map(|n| n as f32)
        .collect()
}

fn string(operand: &Object) -> Option<Vec<u8>> {
    match operand {
        Object::String(bytes, _) => Some(bytes.clone()),
        _ => None,
    }
}
