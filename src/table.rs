//! Table classification and row measurement.
//!
//! Produces a page-independent [`TableLayout`]; the flow pass later slices it
//! into per-page fragments.

use regex::Regex;
use std::sync::OnceLock;

use crate::font::{truncate_text_with_ellipsis, wrap_plain, wrap_rich_text};
use crate::layout::{CellContent, TableFragment, TableRowLayout, TextLine};
use crate::markup::{RichText, TableBlock};
use crate::risk::RiskTier;
use crate::style::{FontWeight, Palette, TextAlignMode, TextStyle};
use crate::types::{Color, Pt};

pub const HEADER_HEIGHT: f32 = 26.0;
pub const MIN_ROW_HEIGHT: f32 = 22.0;
pub const PAD_H: f32 = 6.0;
pub const PAD_V: f32 = 5.0;
pub const BADGE_WIDTH: f32 = 30.0;
pub const BADGE_HEIGHT: f32 = 16.0;
pub const PICTOGRAM_RADIUS: f32 = 9.0;
/// Pictogram center, measured from the cell's left edge.
pub const PICTOGRAM_CENTER_X: f32 = 13.0;
/// Start of the code text beside a pictogram.
pub const PICTOGRAM_TEXT_X: f32 = 28.0;
pub const ACCENT_BAR_WIDTH: f32 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    Risk,
    Signage,
    Default,
}

impl TableKind {
    pub fn css_class(self) -> &'static str {
        match self {
            TableKind::Risk => "table-risk",
            TableKind::Signage => "table-signage",
            TableKind::Default => "table-default",
        }
    }
}

/// Safety-sign families, keyed by the first letter of an ISO 7010 code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PictogramGlyph {
    Prohibition,
    Warning,
    Mandatory,
    Emergency,
    FireSafety,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlyphShape {
    Circle,
    Triangle,
    RoundedRect,
}

impl PictogramGlyph {
    pub fn from_code(code: &str) -> Option<PictogramGlyph> {
        match code.trim().chars().next()?.to_ascii_uppercase() {
            'P' => Some(PictogramGlyph::Prohibition),
            'W' => Some(PictogramGlyph::Warning),
            'M' => Some(PictogramGlyph::Mandatory),
            'E' => Some(PictogramGlyph::Emergency),
            'F' => Some(PictogramGlyph::FireSafety),
            _ => None,
        }
    }

    pub fn shape(self) -> GlyphShape {
        match self {
            PictogramGlyph::Prohibition | PictogramGlyph::Mandatory => GlyphShape::Circle,
            PictogramGlyph::Warning => GlyphShape::Triangle,
            PictogramGlyph::Emergency | PictogramGlyph::FireSafety => GlyphShape::RoundedRect,
        }
    }

    pub fn fill(self) -> Color {
        match self {
            PictogramGlyph::Prohibition | PictogramGlyph::FireSafety => Color::from_hex(0xE74C3C),
            PictogramGlyph::Warning => Color::from_hex(0xF39C12),
            PictogramGlyph::Mandatory => Color::from_hex(0x2E86AB),
            PictogramGlyph::Emergency => Color::from_hex(0x27AE60),
        }
    }

    pub fn outline(self) -> Option<Color> {
        match self {
            PictogramGlyph::Prohibition => Some(Color::from_hex(0xC0392B)),
            PictogramGlyph::Warning => Some(Color::from_hex(0xD68910)),
            PictogramGlyph::Mandatory => Some(Color::from_hex(0x1A6A8A)),
            PictogramGlyph::Emergency | PictogramGlyph::FireSafety => None,
        }
    }
}

fn risk_header_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)r\s*\(p\s*x\s*d\)|probabilit|livello\s*di\s*rischio")
            .expect("regex for risk table headers")
    })
}

fn signage_header_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)cartello|segnale|pittogramma").expect("regex for signage table headers")
    })
}

fn risk_value_header_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)r\s*[\(=]|^r$").expect("regex for risk value headers"))
}

fn numeric_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+([,.]\d+)?$").expect("regex for numeric cells"))
}

fn leading_number_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+([,.]\d+)?").expect("regex for leading numbers"))
}

fn pictogram_code_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^[PWMEF]\d+$").expect("regex for pictogram codes"))
}

pub fn classify_table(header: &[String]) -> TableKind {
    let joined = header.join(" ");
    let single_factor = header
        .iter()
        .any(|cell| matches!(cell.trim(), "P" | "D" | "p" | "d"));
    if risk_header_pattern().is_match(&joined) || single_factor {
        TableKind::Risk
    } else if signage_header_pattern().is_match(&joined) {
        TableKind::Signage
    } else {
        TableKind::Default
    }
}

pub fn is_risk_value_header(header: &str) -> bool {
    risk_value_header_pattern().is_match(header.trim())
}

pub fn is_level_header(header: &str) -> bool {
    header.to_lowercase().contains("livello")
}

pub fn is_numeric_cell(text: &str) -> bool {
    numeric_pattern().is_match(text.trim())
}

/// Tier from the number a cell starts with, so "9 (alto)" still counts as 9.
pub fn leading_risk_tier(text: &str) -> Option<RiskTier> {
    let found = leading_number_pattern().find(text.trim())?;
    RiskTier::from_value(found.as_str())
}

/// How one data cell is drawn, decided from table kind, column and content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellTreatment {
    Pictogram(PictogramGlyph),
    Badge(RiskTier),
    Level(RiskTier),
    Plain,
}

pub fn decide_cell(kind: TableKind, column: usize, header: &str, text: &str) -> CellTreatment {
    let text = text.trim();
    if kind == TableKind::Signage && column == 0 && pictogram_code_pattern().is_match(text) {
        if let Some(glyph) = PictogramGlyph::from_code(text) {
            return CellTreatment::Pictogram(glyph);
        }
    }
    if is_risk_value_header(header) && is_numeric_cell(text) {
        if let Some(tier) = RiskTier::from_value(text) {
            return CellTreatment::Badge(tier);
        }
    }
    if is_level_header(header) {
        if let Some(tier) = RiskTier::from_level(text) {
            return CellTreatment::Level(tier);
        }
    }
    CellTreatment::Plain
}

/// Uniform split of `available` into `count` columns; the last column takes the rounding remainder.
pub fn column_widths(count: usize, available: Pt) -> Vec<Pt> {
    if count == 0 {
        return Vec::new();
    }
    let each = available / count as i32;
    let mut widths = vec![each; count];
    let used: Pt = widths[..count - 1].iter().sum();
    widths[count - 1] = available - used;
    widths
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableLayout {
    pub kind: TableKind,
    pub columns: Vec<Pt>,
    pub header: TableRowLayout,
    pub rows: Vec<TableRowLayout>,
}

impl TableLayout {
    pub fn fragment(&self, x: Pt, y: Pt, rows: Vec<TableRowLayout>) -> TableFragment {
        TableFragment {
            x,
            y,
            kind: self.kind,
            columns: self.columns.clone(),
            header: self.header.clone(),
            rows,
        }
    }
}

fn pad_h() -> Pt {
    Pt::from_f32(PAD_H)
}

fn pad_v() -> Pt {
    Pt::from_f32(PAD_V)
}

fn content_height(content: &CellContent) -> Pt {
    match content {
        CellContent::Badge { .. } => Pt::from_f32(BADGE_HEIGHT),
        CellContent::Text { style, lines }
        | CellContent::Level { style, lines, .. }
        | CellContent::Pictogram { style, lines, .. } => {
            style.line_height() * lines.len().max(1) as i32
        }
    }
}

fn layout_cell(treatment: CellTreatment, text: &str, column_width: Pt) -> CellContent {
    let inner = (column_width - pad_h() * 2).max(Pt::from_i32(1));
    match treatment {
        CellTreatment::Pictogram(glyph) => {
            let style = TextStyle::new(8.0, FontWeight::Regular, Palette::TEXT);
            let width = (column_width - Pt::from_i32(32)).max(Pt::from_i32(1));
            CellContent::Pictogram {
                code: text.trim().to_string(),
                glyph,
                style,
                lines: wrap_plain(text.trim(), FontWeight::Regular, style.font_size, width),
            }
        }
        CellTreatment::Badge(tier) => CellContent::Badge {
            label: text.trim().to_string(),
            tier,
        },
        CellTreatment::Level(tier) => {
            let style = TextStyle::cell()
                .with_weight(FontWeight::Bold)
                .with_color(tier.color())
                .with_align(TextAlignMode::Center);
            CellContent::Level {
                style,
                lines: wrap_plain(text.trim(), FontWeight::Bold, style.font_size, inner),
                tier,
            }
        }
        CellTreatment::Plain => {
            let style = TextStyle::cell();
            CellContent::Text {
                style,
                lines: wrap_rich_text(&RichText::parse(text.trim()), style.font_size, inner),
            }
        }
    }
}

fn clamp_lines(content: &mut CellContent, max_lines: usize, column_width: Pt) {
    let (style, lines) = match content {
        CellContent::Badge { .. } => return,
        CellContent::Text { style, lines }
        | CellContent::Level { style, lines, .. }
        | CellContent::Pictogram { style, lines, .. } => (*style, lines),
    };
    if lines.len() <= max_lines {
        return;
    }
    let keep = max_lines.max(1);
    let rest: Vec<String> = lines[keep - 1..].iter().map(TextLine::plain_text).collect();
    lines.truncate(keep - 1);
    let available = (column_width - pad_h() * 2).max(Pt::from_i32(1));
    let last = truncate_text_with_ellipsis(
        &format!("{}\u{2026}", rest.join(" ")),
        style.weight,
        style.font_size,
        available,
    );
    lines.extend(wrap_plain(&last, style.weight, style.font_size, available).into_iter().take(1));
}

/// Measures every row of `table` for the given width.
///
/// A row taller than the usable page height minus the header is clamped to
/// that height and its over-long cells end in an ellipsis, so a row never
/// needs more than one page.
pub fn layout_table(table: &TableBlock, available_width: Pt, usable_height: Pt) -> TableLayout {
    let header = table.header();
    let kind = classify_table(header);
    let columns = column_widths(header.len(), available_width);

    let header_style = TextStyle::cell()
        .with_weight(FontWeight::Bold)
        .with_color(Palette::WHITE)
        .with_line_gap(0.0);
    let header_cells: Vec<CellContent> = header
        .iter()
        .zip(&columns)
        .map(|(text, width)| CellContent::Text {
            style: header_style,
            lines: wrap_plain(
                text,
                FontWeight::Bold,
                header_style.font_size,
                (*width - pad_h() * 2).max(Pt::from_i32(1)),
            ),
        })
        .collect();
    let header_height = header_cells
        .iter()
        .map(|c| content_height(c) + pad_v() * 2)
        .fold(Pt::from_f32(HEADER_HEIGHT), Pt::max);
    let max_row_height = (usable_height - header_height).max(Pt::from_f32(MIN_ROW_HEIGHT));

    let risk_column = header.iter().position(|h| is_risk_value_header(h));
    let mut rows = Vec::with_capacity(table.data_rows().len());
    for (index, raw) in table.data_rows().iter().enumerate() {
        let mut cells: Vec<CellContent> = raw
            .iter()
            .zip(header.iter())
            .zip(&columns)
            .enumerate()
            .map(|(col, ((text, head), width))| {
                layout_cell(decide_cell(kind, col, head, text), text, *width)
            })
            .collect();
        let mut height = cells
            .iter()
            .map(|c| content_height(c) + pad_v() * 2)
            .fold(Pt::from_f32(MIN_ROW_HEIGHT), Pt::max);
        if height > max_row_height {
            height = max_row_height;
            for (cell, width) in cells.iter_mut().zip(&columns) {
                let line_height = match cell {
                    CellContent::Badge { .. } => continue,
                    CellContent::Text { style, .. }
                    | CellContent::Level { style, .. }
                    | CellContent::Pictogram { style, .. } => style.line_height(),
                };
                let room = (height - pad_v() * 2).to_milli_i64().max(0);
                let max_lines = (room / line_height.to_milli_i64().max(1)) as usize;
                clamp_lines(cell, max_lines, *width);
            }
        }
        let accent = if kind == TableKind::Risk {
            risk_column
                .and_then(|col| raw.get(col))
                .and_then(|value| leading_risk_tier(value))
        } else {
            None
        };
        rows.push(TableRowLayout {
            height,
            cells,
            background: if index % 2 == 0 {
                Palette::TABLE_ALT
            } else {
                Palette::WHITE
            },
            accent,
        });
    }

    TableLayout {
        kind,
        columns,
        header: TableRowLayout {
            height: header_height,
            cells: header_cells,
            background: Palette::TABLE_HEADER,
            accent: None,
        },
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::{Block, tokenize};

    fn table(source: &str) -> TableBlock {
        match tokenize(source).into_iter().next() {
            Some(Block::Table(table)) => table,
            other => panic!("expected a table, got {other:?}"),
        }
    }

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn classifies_by_header_text() {
        assert_eq!(
            classify_table(&strings(&["Lavorazione", "P", "D", "R (PxD)"])),
            TableKind::Risk
        );
        assert_eq!(
            classify_table(&strings(&["Rischio", "Probabilità"])),
            TableKind::Risk
        );
        assert_eq!(
            classify_table(&strings(&["Codice", "Cartello", "Ubicazione"])),
            TableKind::Signage
        );
        assert_eq!(
            classify_table(&strings(&["Campo", "Valore"])),
            TableKind::Default
        );
    }

    #[test]
    fn cell_rules_follow_precedence() {
        assert_eq!(
            decide_cell(TableKind::Signage, 0, "Codice", "W012"),
            CellTreatment::Pictogram(PictogramGlyph::Warning)
        );
        assert_eq!(
            decide_cell(TableKind::Signage, 1, "Codice", "W012"),
            CellTreatment::Plain
        );
        assert_eq!(
            decide_cell(TableKind::Signage, 0, "Codice", "Pericolo"),
            CellTreatment::Plain
        );
        assert_eq!(
            decide_cell(TableKind::Default, 2, "R", "9"),
            CellTreatment::Badge(RiskTier::High)
        );
        assert_eq!(
            decide_cell(TableKind::Default, 2, "R = P x D", "4,5"),
            CellTreatment::Badge(RiskTier::Medium)
        );
        assert_eq!(
            decide_cell(TableKind::Default, 2, "R", "nove"),
            CellTreatment::Plain
        );
        assert_eq!(
            decide_cell(TableKind::Default, 1, "Livello", "Alto"),
            CellTreatment::Level(RiskTier::High)
        );
        assert_eq!(
            decide_cell(TableKind::Default, 1, "Livello", "da valutare"),
            CellTreatment::Plain
        );
        assert_eq!(
            decide_cell(TableKind::Default, 0, "Rischio", "Caduta"),
            CellTreatment::Plain
        );
    }

    #[test]
    fn columns_sum_to_available_width() {
        let available = Pt::from_f32(495.28);
        for count in 1..=9 {
            let widths = column_widths(count, available);
            assert_eq!(widths.len(), count);
            assert_eq!(widths.iter().copied().sum::<Pt>(), available);
        }
    }

    #[test]
    fn short_table_badge_and_level_agree() {
        let layout = layout_table(
            &table("| R | Livello |\n|---|---|\n| 9 | Alto |"),
            Pt::from_f32(495.28),
            Pt::from_i32(600),
        );
        assert_eq!(layout.kind, TableKind::Default);
        let row = &layout.rows[0];
        let CellContent::Badge { tier: badge, .. } = &row.cells[0] else {
            panic!("expected badge, got {:?}", row.cells[0]);
        };
        let CellContent::Level {
            tier: level, style, ..
        } = &row.cells[1]
        else {
            panic!("expected level, got {:?}", row.cells[1]);
        };
        assert_eq!(*badge, RiskTier::High);
        assert_eq!(badge, level);
        assert_eq!(style.color, Palette::RISK_HIGH);
        assert_eq!(row.accent, None);
    }

    #[test]
    fn rows_respect_floor_and_grow_with_text() {
        let long = "parola ".repeat(60);
        let source = format!("| A | B |\n| x | y |\n| {long} | z |");
        let layout = layout_table(&table(&source), Pt::from_i32(300), Pt::from_i32(600));
        assert_eq!(layout.header.height, Pt::from_f32(HEADER_HEIGHT));
        assert_eq!(layout.rows[0].height, Pt::from_f32(MIN_ROW_HEIGHT));
        assert!(layout.rows[1].height > Pt::from_i32(60));
        assert_eq!(layout.rows[0].background, Palette::TABLE_ALT);
        assert_eq!(layout.rows[1].background, Palette::WHITE);
    }

    #[test]
    fn risk_rows_carry_an_accent_from_the_r_column() {
        let layout = layout_table(
            &table("| Lavorazione | P | D | R |\n| Scavo | 2 | 2 | 4 |\n| Getto | 4 | 4 | 16 |"),
            Pt::from_f32(495.28),
            Pt::from_i32(600),
        );
        assert_eq!(layout.kind, TableKind::Risk);
        assert_eq!(layout.rows[0].accent, Some(RiskTier::Medium));
        assert_eq!(layout.rows[1].accent, Some(RiskTier::VeryHigh));
    }

    #[test]
    fn accent_reads_the_number_a_cell_starts_with() {
        let layout = layout_table(
            &table("| Lavorazione | P | D | R |\n| Scavo | 3 | 3 | 9 (alto) |\n| Getto | 1 | 1 | n.d. |"),
            Pt::from_f32(495.28),
            Pt::from_i32(600),
        );
        assert_eq!(layout.rows[0].accent, Some(RiskTier::High));
        assert_eq!(layout.rows[1].accent, None);
        assert_eq!(leading_risk_tier(" 2,5 medio"), RiskTier::from_value("2.5"));
        assert!(matches!(layout.rows[0].cells[3], CellContent::Text { .. }));
    }

    #[test]
    fn oversized_rows_are_clamped_with_ellipsis() {
        let long = "calcestruzzo ".repeat(400);
        let source = format!("| Descrizione |\n| {long} |");
        let cap = Pt::from_i32(200);
        let layout = layout_table(&table(&source), Pt::from_i32(200), cap + Pt::from_i32(26));
        let row = &layout.rows[0];
        assert_eq!(row.height, cap);
        let CellContent::Text { lines, style } = &row.cells[0] else {
            panic!("expected text cell");
        };
        assert!(style.line_height() * lines.len() as i32 + Pt::from_i32(10) <= cap);
        let last = lines.last().map(TextLine::plain_text).unwrap_or_default();
        assert!(last.ends_with('\u{2026}'));
    }
}
