//! Positioned output of the layout pass.
//!
//! Coordinates are page space with a top-left origin; text is anchored at the
//! top of its line box. Both backends read only these types.

use crate::risk::RiskTier;
use crate::style::{TextAlignMode, TextStyle};
use crate::table::{PictogramGlyph, TableKind};
use crate::types::{Color, Margins, Pt, Rect, Size};

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedRun {
    pub text: String,
    pub bold: bool,
    /// Offset from the start of the line.
    pub x_offset: Pt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub runs: Vec<PlacedRun>,
    pub width: Pt,
}

impl TextLine {
    pub fn plain_text(&self) -> String {
        self.runs.iter().map(|run| run.text.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub x: Pt,
    pub y: Pt,
    pub width: Pt,
    pub style: TextStyle,
    pub lines: Vec<TextLine>,
}

impl TextBlock {
    pub fn height(&self) -> Pt {
        self.style.line_height() * self.lines.len() as i32
    }

    pub fn line_top(&self, index: usize) -> Pt {
        self.y + self.style.line_height() * index as i32
    }

    pub fn line_left(&self, line: &TextLine) -> Pt {
        match self.style.align {
            TextAlignMode::Left => self.x,
            TextAlignMode::Center => self.x + ((self.width - line.width) / 2).max(Pt::ZERO),
            TextAlignMode::Right => self.x + (self.width - line.width).max(Pt::ZERO),
        }
    }

    pub fn plain_text(&self) -> String {
        self.lines
            .iter()
            .map(TextLine::plain_text)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stroke {
    pub color: Color,
    pub width: Pt,
}

impl Stroke {
    pub fn new(color: Color, width: f32) -> Self {
        Self {
            color,
            width: Pt::from_f32(width),
        }
    }
}

/// What a group of primitives stands for; used for styling hooks and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Cover,
    CoverInfo,
    SectionBanner,
    Heading,
    SubHeading,
    Bullet,
    Rule,
    SignatureBox,
    EmergencyGrid,
    ImageTile,
    RunningHeader,
    RunningFooter,
}

impl Role {
    pub fn css_class(self) -> &'static str {
        match self {
            Role::Cover => "cover",
            Role::CoverInfo => "cover-info",
            Role::SectionBanner => "section-banner",
            Role::Heading => "heading",
            Role::SubHeading => "sub-heading",
            Role::Bullet => "bullet",
            Role::Rule => "rule",
            Role::SignatureBox => "signature-box",
            Role::EmergencyGrid => "emergency-grid",
            Role::ImageTile => "image-tile",
            Role::RunningHeader => "running-header",
            Role::RunningFooter => "running-footer",
        }
    }

    pub fn is_running(self) -> bool {
        matches!(self, Role::RunningHeader | Role::RunningFooter)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellContent {
    Text {
        style: TextStyle,
        lines: Vec<TextLine>,
    },
    Badge {
        label: String,
        tier: RiskTier,
    },
    Level {
        style: TextStyle,
        lines: Vec<TextLine>,
        tier: RiskTier,
    },
    Pictogram {
        code: String,
        glyph: PictogramGlyph,
        style: TextStyle,
        lines: Vec<TextLine>,
    },
}

impl CellContent {
    pub fn plain_text(&self) -> String {
        match self {
            CellContent::Badge { label, .. } => label.clone(),
            CellContent::Text { lines, .. }
            | CellContent::Level { lines, .. }
            | CellContent::Pictogram { lines, .. } => lines
                .iter()
                .map(TextLine::plain_text)
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRowLayout {
    pub height: Pt,
    pub cells: Vec<CellContent>,
    pub background: Color,
    /// Left accent bar for risk tables.
    pub accent: Option<RiskTier>,
}

/// The part of one table that landed on one page, header included.
#[derive(Debug, Clone, PartialEq)]
pub struct TableFragment {
    pub x: Pt,
    pub y: Pt,
    pub kind: TableKind,
    pub columns: Vec<Pt>,
    pub header: TableRowLayout,
    pub rows: Vec<TableRowLayout>,
}

impl TableFragment {
    pub fn width(&self) -> Pt {
        self.columns.iter().sum()
    }

    pub fn height(&self) -> Pt {
        self.header.height + self.rows.iter().map(|r| r.height).sum::<Pt>()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Text(TextBlock),
    Line {
        x1: Pt,
        y1: Pt,
        x2: Pt,
        y2: Pt,
        stroke: Stroke,
    },
    Rect {
        rect: Rect,
        radius: Pt,
        fill: Option<Color>,
        stroke: Option<Stroke>,
    },
    Circle {
        cx: Pt,
        cy: Pt,
        r: Pt,
        fill: Option<Color>,
        stroke: Option<Stroke>,
    },
    Polygon {
        points: Vec<(Pt, Pt)>,
        fill: Option<Color>,
        stroke: Option<Stroke>,
    },
    Image {
        rect: Rect,
        resource_id: String,
    },
    Table(TableFragment),
    Group {
        role: Role,
        children: Vec<Element>,
    },
}

impl Element {
    pub fn filled_rect(rect: Rect, color: Color) -> Element {
        Element::Rect {
            rect,
            radius: Pt::ZERO,
            fill: Some(color),
            stroke: None,
        }
    }

    pub fn rounded_rect(rect: Rect, radius: f32, color: Color) -> Element {
        Element::Rect {
            rect,
            radius: Pt::from_f32(radius),
            fill: Some(color),
            stroke: None,
        }
    }

    pub fn hline(x1: Pt, x2: Pt, y: Pt, stroke: Stroke) -> Element {
        Element::Line {
            x1,
            y1: y,
            x2,
            y2: y,
            stroke,
        }
    }

    fn collect_text(&self, out: &mut Vec<String>) {
        match self {
            Element::Text(block) => {
                for line in &block.lines {
                    out.push(line.plain_text());
                }
            }
            Element::Table(fragment) => {
                for row in std::iter::once(&fragment.header).chain(fragment.rows.iter()) {
                    for cell in &row.cells {
                        out.push(cell.plain_text());
                    }
                }
            }
            Element::Group { children, .. } => {
                for child in children {
                    child.collect_text(out);
                }
            }
            _ => {}
        }
    }

    fn count_role(&self, role: Role) -> usize {
        match self {
            Element::Group {
                role: own,
                children,
            } => {
                let nested: usize = children.iter().map(|c| c.count_role(role)).sum();
                nested + usize::from(*own == role)
            }
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Cover,
    Content,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutPage {
    pub kind: PageKind,
    pub elements: Vec<Element>,
}

impl LayoutPage {
    pub fn new(kind: PageKind) -> Self {
        Self {
            kind,
            elements: Vec::new(),
        }
    }

    /// Every text line on the page, table cells included, in emission order.
    pub fn texts(&self) -> Vec<String> {
        let mut out = Vec::new();
        for element in &self.elements {
            element.collect_text(&mut out);
        }
        out
    }

    pub fn contains_text(&self, needle: &str) -> bool {
        self.texts().iter().any(|t| t.contains(needle))
    }

    pub fn table_fragments(&self) -> impl Iterator<Item = &TableFragment> {
        self.elements.iter().filter_map(|element| match element {
            Element::Table(fragment) => Some(fragment),
            _ => None,
        })
    }

    pub fn count_role(&self, role: Role) -> usize {
        self.elements.iter().map(|e| e.count_role(role)).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutDocument {
    pub page_size: Size,
    pub margins: Margins,
    pub title: String,
    pub pages: Vec<LayoutPage>,
}

impl LayoutDocument {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn contains_text(&self, needle: &str) -> bool {
        self.pages.iter().any(|page| page.contains_text(needle))
    }

    pub fn count_role(&self, role: Role) -> usize {
        self.pages.iter().map(|p| p.count_role(role)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::{FontWeight, TextStyle};
    use crate::types::Color;

    fn line(text: &str, width: f32) -> TextLine {
        TextLine {
            runs: vec![PlacedRun {
                text: text.to_string(),
                bold: false,
                x_offset: Pt::ZERO,
            }],
            width: Pt::from_f32(width),
        }
    }

    #[test]
    fn aligned_lines_start_inside_the_block() {
        let style = TextStyle::new(10.0, FontWeight::Regular, Color::BLACK);
        let mut block = TextBlock {
            x: Pt::from_i32(50),
            y: Pt::from_i32(100),
            width: Pt::from_i32(200),
            style,
            lines: vec![line("abc", 40.0)],
        };
        assert_eq!(block.line_left(&block.lines[0]), Pt::from_i32(50));
        block.style.align = TextAlignMode::Center;
        assert_eq!(block.line_left(&block.lines[0]), Pt::from_i32(130));
        block.style.align = TextAlignMode::Right;
        assert_eq!(block.line_left(&block.lines[0]), Pt::from_i32(210));
        assert_eq!(block.line_top(1), Pt::from_i32(112));
    }

    #[test]
    fn page_text_includes_nested_groups() {
        let style = TextStyle::new(10.0, FontWeight::Bold, Color::BLACK);
        let mut page = LayoutPage::new(PageKind::Content);
        page.elements.push(Element::Group {
            role: Role::SignatureBox,
            children: vec![Element::Text(TextBlock {
                x: Pt::ZERO,
                y: Pt::ZERO,
                width: Pt::from_i32(100),
                style,
                lines: vec![line("RSPP", 20.0)],
            })],
        });
        assert!(page.contains_text("RSPP"));
        assert_eq!(page.count_role(Role::SignatureBox), 1);
        assert_eq!(page.count_role(Role::Bullet), 0);
    }
}
