//! Advance widths for the two base-14 faces the documents are set in.
//!
//! Widths are in 1/1000 em, straight from the Helvetica and Helvetica-Bold
//! AFM files. Codepoints outside the table fall back to 0.6 em.

use crate::layout::{PlacedRun, TextLine};
use crate::markup::{RichText, Run};
use crate::style::{FontWeight, TextStyle};
use crate::types::Pt;

const FALLBACK_WIDTH: u16 = 600;

#[rustfmt::skip]
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

fn char_width(weight: FontWeight, ch: char) -> u16 {
    let table = match weight {
        FontWeight::Regular => &HELVETICA,
        FontWeight::Bold => &HELVETICA_BOLD,
    };
    let lookup = |c: char| {
        let code = c as u32;
        if (32..127).contains(&code) {
            Some(table[(code - 32) as usize])
        } else {
            None
        }
    };
    if let Some(width) = lookup(ch) {
        return width;
    }
    match ch {
        '\u{00A0}' => lookup(' ').unwrap_or(FALLBACK_WIDTH),
        '\u{2013}' => 556,
        '\u{2014}' => 1000,
        '\u{2022}' => 350,
        '\u{2026}' => 1000,
        '\u{2018}' | '\u{2019}' => lookup('\'').unwrap_or(FALLBACK_WIDTH),
        '\u{201C}' | '\u{201D}' => lookup('"').unwrap_or(FALLBACK_WIDTH),
        '\u{20AC}' => 556,
        _ => fold_latin1(ch)
            .and_then(lookup)
            .unwrap_or(FALLBACK_WIDTH),
    }
}

// Accented Latin-1 letters share the advance of their base letter.
fn fold_latin1(ch: char) -> Option<char> {
    let base = match ch {
        'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => 'A',
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'È' | 'É' | 'Ê' | 'Ë' => 'E',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'Ì' | 'Í' | 'Î' | 'Ï' => 'I',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' => 'O',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'Ù' | 'Ú' | 'Û' | 'Ü' => 'U',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'Ç' => 'C',
        'ç' => 'c',
        'Ñ' => 'N',
        'ñ' => 'n',
        _ => return None,
    };
    Some(base)
}

pub fn measure_text_width(weight: FontWeight, font_size: Pt, text: &str) -> Pt {
    let units: i64 = text.chars().map(|ch| char_width(weight, ch) as i64).sum();
    let milli = font_size.to_milli_i64() as i128 * units as i128 / 1000;
    Pt::from_milli_i64(milli as i64)
}

#[derive(Debug, Clone)]
struct Piece {
    text: String,
    weight: FontWeight,
    width: Pt,
    is_space: bool,
}

fn split_pieces(runs: &[Run], font_size: Pt) -> Vec<Piece> {
    let mut pieces = Vec::new();
    for run in runs {
        let weight = if run.bold {
            FontWeight::Bold
        } else {
            FontWeight::Regular
        };
        let mut current = String::new();
        let mut current_space = false;
        for ch in run.text.chars() {
            let is_space = ch.is_whitespace();
            if !current.is_empty() && is_space != current_space {
                let text = std::mem::take(&mut current);
                pieces.push(Piece {
                    width: measure_text_width(weight, font_size, &text),
                    text,
                    weight,
                    is_space: current_space,
                });
            }
            current.push(if is_space { ' ' } else { ch });
            current_space = is_space;
        }
        if !current.is_empty() {
            pieces.push(Piece {
                width: measure_text_width(weight, font_size, &current),
                text: current,
                weight,
                is_space: current_space,
            });
        }
    }
    pieces
}

fn split_long_word_by_width(piece: &Piece, font_size: Pt, max_width: Pt) -> Vec<Piece> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut current_width = Pt::ZERO;
    for ch in piece.text.chars() {
        let w = measure_text_width(piece.weight, font_size, ch.encode_utf8(&mut [0u8; 4]));
        let mut next_width = current_width + w;
        if !current.is_empty() && next_width > max_width {
            parts.push(Piece {
                text: std::mem::take(&mut current),
                weight: piece.weight,
                width: current_width,
                is_space: false,
            });
            next_width = w;
        }
        current.push(ch);
        current_width = next_width;
    }
    if !current.is_empty() {
        parts.push(Piece {
            text: current,
            weight: piece.weight,
            width: current_width,
            is_space: false,
        });
    }
    parts
}

#[derive(Default)]
struct LineBuilder {
    runs: Vec<PlacedRun>,
    width: Pt,
}

impl LineBuilder {
    fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    fn push(&mut self, piece: &Piece) {
        let bold = piece.weight == FontWeight::Bold;
        match self.runs.last_mut() {
            Some(last) if last.bold == bold => last.text.push_str(&piece.text),
            _ => self.runs.push(PlacedRun {
                text: piece.text.clone(),
                bold,
                x_offset: self.width,
            }),
        }
        self.width += piece.width;
    }

    fn finish(&mut self) -> TextLine {
        TextLine {
            runs: std::mem::take(&mut self.runs),
            width: std::mem::replace(&mut self.width, Pt::ZERO),
        }
    }
}

/// Greedy word wrap of bold/regular runs into lines no wider than `max_width`.
///
/// Runs continue on the same line; whitespace at a break is dropped and a
/// word wider than the line is split between characters.
pub fn wrap_rich_text(text: &RichText, font_size: Pt, max_width: Pt) -> Vec<TextLine> {
    let pieces = split_pieces(&text.runs, font_size);
    let mut lines = Vec::new();
    let mut line = LineBuilder::default();
    let mut pending_space: Option<Piece> = None;

    for piece in pieces {
        if piece.is_space {
            if !line.is_empty() {
                pending_space = Some(piece);
            }
            continue;
        }
        let space_width = pending_space.as_ref().map(|s| s.width).unwrap_or(Pt::ZERO);
        if !line.is_empty() && line.width + space_width + piece.width > max_width {
            lines.push(line.finish());
            pending_space = None;
        }
        if let Some(space) = pending_space.take() {
            line.push(&space);
        }
        if piece.width > max_width && max_width > Pt::ZERO {
            let parts = split_long_word_by_width(&piece, font_size, max_width);
            let last = parts.len().saturating_sub(1);
            for (idx, part) in parts.iter().enumerate() {
                if !line.is_empty() && line.width + part.width > max_width {
                    lines.push(line.finish());
                }
                line.push(part);
                if idx < last {
                    lines.push(line.finish());
                }
            }
        } else {
            line.push(&piece);
        }
    }
    if !line.is_empty() {
        lines.push(line.finish());
    }
    lines
}

pub fn wrap_plain(text: &str, weight: FontWeight, font_size: Pt, max_width: Pt) -> Vec<TextLine> {
    let rich = RichText {
        runs: vec![Run {
            text: text.to_string(),
            bold: weight == FontWeight::Bold,
        }],
    };
    wrap_rich_text(&rich, font_size, max_width)
}

/// Height of `text` wrapped at `max_width`: one line height per line, at least one line.
pub fn measure_text_height(text: &RichText, style: &TextStyle, max_width: Pt) -> Pt {
    let lines = wrap_rich_text(text, style.font_size, max_width).len().max(1);
    style.line_height() * lines as i32
}

pub fn truncate_text_with_ellipsis(
    text: &str,
    weight: FontWeight,
    font_size: Pt,
    max_width: Pt,
) -> String {
    if measure_text_width(weight, font_size, text) <= max_width {
        return text.to_string();
    }
    let ellipsis = "\u{2026}";
    if max_width <= Pt::ZERO {
        return String::new();
    }
    if measure_text_width(weight, font_size, ellipsis) >= max_width {
        return ellipsis.to_string();
    }

    let mut boundaries: Vec<usize> = text.char_indices().map(|(idx, _)| idx).collect();
    boundaries.push(text.len());

    let mut lo = 0usize;
    let mut hi = boundaries.len() - 1;
    let mut best = 0usize;
    while lo <= hi {
        let mid = (lo + hi) / 2;
        let candidate = format!("{}{}", text[..boundaries[mid]].trim_end(), ellipsis);
        if measure_text_width(weight, font_size, &candidate) <= max_width {
            best = mid;
            lo = mid + 1;
        } else {
            if mid == 0 {
                break;
            }
            hi = mid - 1;
        }
    }
    format!("{}{}", text[..boundaries[best]].trim_end(), ellipsis)
}
