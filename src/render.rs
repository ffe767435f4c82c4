//! Block renderers.
//!
//! Each renderer reserves space through the [`PageFlow`], pushes positioned
//! elements and moves the cursor past them.

use crate::font::{measure_text_width, truncate_text_with_ellipsis, wrap_plain, wrap_rich_text};
use crate::frame::PageFlow;
use crate::layout::{Element, LayoutPage, PageKind, Role, Stroke, TextBlock, TextLine};
use crate::markup::{Block, RichText, TableBlock};
use crate::style::{FontWeight, Palette, TextAlignMode, TextStyle};
use crate::table::layout_table;
use crate::template::present;
use crate::types::{Pt, Rect, Size};

pub const SIGNATURE_ROLES: [&str; 5] = [
    "Datore di Lavoro dell'impresa esecutrice",
    "RSPP",
    "RLS",
    "Medico Competente",
    "CSE (per presa visione)",
];

pub const EMERGENCY_CONTACTS: [(&str, &str); 6] = [
    ("112", "Emergenza Unica Europea"),
    ("115", "Vigili del Fuoco"),
    ("118", "Emergenza Sanitaria"),
    ("113", "Polizia di Stato"),
    ("112", "Carabinieri"),
    ("02 66101029", "Centro Antiveleni Milano"),
];

const BANNER_HEIGHT: f32 = 32.0;
const EMERGENCY_CARD_HEIGHT: f32 = 50.0;
const EMERGENCY_GAP: f32 = 7.0;

/// Horizontal frame and text style a renderer draws with.
///
/// Copies are cheap; narrowing the frame or switching styles returns a new
/// value and leaves the caller's context untouched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderContext {
    pub left: Pt,
    pub width: Pt,
    pub style: TextStyle,
}

impl RenderContext {
    pub fn for_flow(flow: &PageFlow) -> Self {
        let config = flow.config();
        Self {
            left: config.content_left(),
            width: config.content_width(),
            style: TextStyle::body(),
        }
    }

    pub fn indented(self, amount: f32) -> Self {
        let amount = Pt::from_f32(amount);
        Self {
            left: self.left + amount,
            width: self.width - amount,
            ..self
        }
    }

    pub fn with_style(self, style: TextStyle) -> Self {
        Self { style, ..self }
    }

    pub fn right(&self) -> Pt {
        self.left + self.width
    }

    /// Vertical gap of `lines` body lines, the unit block spacing is measured in.
    fn lines(&self, lines: f32) -> Pt {
        Pt::from_f32(self.style.font_size.to_f32() * 1.2 * lines)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Emergency number cards after a section banner that mentions EMERGENZA.
    pub emergency_grid: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            emergency_grid: true,
        }
    }
}

pub(crate) fn text_at(x: Pt, y: Pt, width: Pt, style: TextStyle, text: &str) -> TextBlock {
    TextBlock {
        x,
        y,
        width,
        style,
        lines: wrap_plain(text, style.weight, style.font_size, width),
    }
}

/// One line, cut with an ellipsis when it does not fit.
pub(crate) fn single_line_at(x: Pt, y: Pt, width: Pt, style: TextStyle, text: &str) -> TextBlock {
    let fitted = truncate_text_with_ellipsis(text, style.weight, style.font_size, width);
    let mut block = text_at(x, y, width, style, &fitted);
    block.lines.truncate(1);
    block
}

pub fn render_blocks(flow: &mut PageFlow, blocks: &[Block], options: &RenderOptions) {
    let ctx = RenderContext::for_flow(flow);
    for block in blocks {
        render_block(flow, ctx, block, options);
    }
}

pub fn render_block(flow: &mut PageFlow, ctx: RenderContext, block: &Block, options: &RenderOptions) {
    match block {
        Block::Heading { level, text } => render_heading(flow, ctx, *level, text),
        Block::NumberedHeading { text } => {
            let style = TextStyle::new(14.0, FontWeight::Bold, Palette::PRIMARY);
            let rule = Some((Stroke::new(Palette::ACCENT, 1.0), ctx.width));
            heading_block(flow, ctx, text, style, (1.5, 0.3, 0.5), rule, Role::Heading);
        }
        Block::CapsHeading { text } => {
            let style = TextStyle::new(12.0, FontWeight::Bold, Palette::PRIMARY);
            heading_block(flow, ctx, text, style, (0.8, 0.0, 0.4), None, Role::Heading);
        }
        Block::SectionBanner { number, title } => {
            let grid = options.emergency_grid && title.to_uppercase().contains("EMERGENZA");
            let keep = if grid { emergency_grid_space() } else { Pt::ZERO };
            render_section_banner(flow, ctx, number, title, keep);
            if grid {
                render_emergency_grid(flow, ctx);
            }
        }
        Block::SubHeading { text } => render_sub_heading(flow, ctx, text),
        Block::Bullet { text } => render_bullet(flow, ctx, text),
        Block::NumberedItem { text } => {
            let style = TextStyle::new(11.0, FontWeight::Bold, Palette::TEXT);
            gap_unless_top(flow, ctx.lines(0.3));
            flow.ensure_space(flow.config().reserves.content, "numbered item");
            let inner = ctx.indented(10.0).with_style(style);
            let lines = wrap_plain(text, style.weight, style.font_size, inner.width);
            flow_text(flow, inner.left, inner.width, inner.style, lines, |_, block| {
                Element::Text(block)
            });
            flow.advance(ctx.lines(0.2));
        }
        Block::SignatureLine { role } => render_signature_line(flow, ctx, role),
        Block::Table(table) => render_table(flow, ctx, table),
        Block::Paragraph { text } => render_paragraph(flow, ctx, text),
        Block::Blank => {
            let gap = ctx.lines(0.4);
            if !flow.is_page_empty() && flow.fits(gap) {
                flow.advance(gap);
            }
        }
        Block::Rule => {
            flow.ensure_space(flow.config().reserves.content, "rule");
            let y = flow.cursor() + Pt::from_i32(6);
            flow.push(Element::Group {
                role: Role::Rule,
                children: vec![Element::hline(
                    ctx.left,
                    ctx.right(),
                    y,
                    Stroke::new(Palette::LINE, 0.5),
                )],
            });
            flow.advance(Pt::from_i32(12));
        }
    }
}

fn gap_unless_top(flow: &mut PageFlow, gap: Pt) {
    if !flow.is_page_empty() {
        flow.advance(gap);
    }
}

fn render_heading(flow: &mut PageFlow, ctx: RenderContext, level: u8, text: &str) {
    match level {
        1 => {
            let style = TextStyle::new(16.0, FontWeight::Bold, Palette::PRIMARY);
            let rule = Some((Stroke::new(Palette::ACCENT, 1.5), ctx.width));
            heading_block(flow, ctx, text, style, (1.5, 0.3, 0.8), rule, Role::Heading);
        }
        2 => render_sub_heading(flow, ctx, text),
        _ => {
            let style = TextStyle::new(11.0, FontWeight::Bold, Palette::PRIMARY);
            heading_block(flow, ctx, text, style, (0.6, 0.0, 0.4), None, Role::Heading);
        }
    }
}

/// A heading kept whole on one page: spacing before, the text, an optional
/// rule of the given length below it, spacing after. Spacing is in body lines.
fn heading_block(
    flow: &mut PageFlow,
    ctx: RenderContext,
    text: &str,
    style: TextStyle,
    (before, rule_gap, after): (f32, f32, f32),
    rule: Option<(Stroke, Pt)>,
    role: Role,
) {
    let lines = wrap_plain(text, style.weight, style.font_size, ctx.width);
    let height = style.line_height() * lines.len().max(1) as i32;
    let reserve = flow.config().reserves.heading;
    flow.ensure_space(ctx.lines(before) + height + reserve, "heading");
    gap_unless_top(flow, ctx.lines(before));

    let y = flow.cursor();
    let mut children = vec![Element::Text(TextBlock {
        x: ctx.left,
        y,
        width: ctx.width,
        style,
        lines,
    })];
    let mut bottom = y + height;
    if let Some((stroke, length)) = rule {
        bottom += ctx.lines(rule_gap);
        children.push(Element::hline(ctx.left, ctx.left + length, bottom, stroke));
    }
    flow.push(Element::Group { role, children });
    flow.advance(bottom - y + ctx.lines(after));
}

/// `keep` is the height of whatever must follow on the same page.
fn render_section_banner(flow: &mut PageFlow, ctx: RenderContext, number: &str, title: &str, keep: Pt) {
    let band = Pt::from_f32(BANNER_HEIGHT);
    let after = if keep > Pt::ZERO {
        Pt::from_i32(8) + keep
    } else {
        flow.config().reserves.heading
    };
    flow.ensure_space(ctx.lines(0.8) + band + after, "section banner");
    gap_unless_top(flow, ctx.lines(0.8));

    let y = flow.cursor();
    let cx = ctx.left + Pt::from_i32(22);
    let cy = y + band / 2;
    let radius = Pt::from_i32(10);
    let number_style = TextStyle::new(9.0, FontWeight::Bold, Palette::WHITE)
        .with_line_gap(0.0)
        .with_align(TextAlignMode::Center);
    let title_style = TextStyle::new(11.0, FontWeight::Bold, Palette::PRIMARY);

    let children = vec![
        Element::filled_rect(Rect::new(ctx.left, y, ctx.width, band), Palette::LIGHT_BLUE),
        Element::filled_rect(Rect::new(ctx.left, y, Pt::from_i32(4), band), Palette::PRIMARY),
        Element::Circle {
            cx,
            cy,
            r: radius,
            fill: Some(Palette::PRIMARY),
            stroke: None,
        },
        Element::Text(single_line_at(
            cx - radius,
            cy - number_style.line_height() / 2,
            radius * 2,
            number_style,
            number,
        )),
        Element::Text(single_line_at(
            ctx.left + Pt::from_i32(40),
            y + Pt::from_i32(10),
            ctx.width - Pt::from_i32(50),
            title_style,
            &title.to_uppercase(),
        )),
    ];
    flow.push(Element::Group {
        role: Role::SectionBanner,
        children,
    });
    flow.advance(band + Pt::from_i32(8));
}

fn render_sub_heading(flow: &mut PageFlow, ctx: RenderContext, text: &str) {
    render_sub_heading_keeping(flow, ctx, text, Pt::ZERO);
}

/// Sub-heading that moves to the next page unless `keep` more points fit below it.
pub(crate) fn render_sub_heading_keeping(flow: &mut PageFlow, ctx: RenderContext, text: &str, keep: Pt) {
    let style = TextStyle::new(13.0, FontWeight::Bold, Palette::PRIMARY);
    let lines = wrap_plain(text, style.weight, style.font_size, ctx.width);
    let height = style.line_height() * lines.len().max(1) as i32;
    let after = if keep > Pt::ZERO {
        Pt::from_i32(9) + keep
    } else {
        flow.config().reserves.heading
    };
    flow.ensure_space(ctx.lines(0.8) + height + after, "sub-heading");
    gap_unless_top(flow, ctx.lines(0.8));

    let y = flow.cursor();
    let underline = y + height + Pt::from_i32(1);
    flow.push(Element::Group {
        role: Role::SubHeading,
        children: vec![
            Element::Text(TextBlock {
                x: ctx.left,
                y,
                width: ctx.width,
                style,
                lines,
            }),
            Element::hline(
                ctx.left,
                ctx.left + Pt::from_i32(80),
                underline,
                Stroke::new(Palette::ACCENT, 1.5),
            ),
        ],
    });
    flow.advance(underline - y + Pt::from_i32(8));
}

fn render_bullet(flow: &mut PageFlow, ctx: RenderContext, text: &RichText) {
    flow.ensure_space(flow.config().reserves.bullet, "bullet");
    let inner = ctx.indented(24.0);
    let style = ctx.style;
    let lines = wrap_rich_text(text, style.font_size, inner.width);
    let dot_x = ctx.left + Pt::from_i32(10);
    flow_text(flow, inner.left, inner.width, style, lines, |first, block| {
        let mut children = Vec::with_capacity(2);
        if first {
            children.push(Element::Circle {
                cx: dot_x,
                cy: block.y + Pt::from_i32(6),
                r: Pt::from_i32(3),
                fill: Some(Palette::PRIMARY),
                stroke: None,
            });
        }
        children.push(Element::Text(block));
        Element::Group {
            role: Role::Bullet,
            children,
        }
    });
    flow.advance(ctx.lines(0.2));
}

fn render_paragraph(flow: &mut PageFlow, ctx: RenderContext, text: &RichText) {
    flow.ensure_space(flow.config().reserves.content, "paragraph");
    let lines = wrap_rich_text(text, ctx.style.font_size, ctx.width);
    flow_text(flow, ctx.left, ctx.width, ctx.style, lines, |_, block| {
        Element::Text(block)
    });
    flow.advance(ctx.lines(0.2));
}

/// Places `lines` from the cursor down, continuing on fresh pages when the
/// current one runs out. `wrap` turns each page's chunk into an element and
/// learns whether it is the first chunk.
fn flow_text(
    flow: &mut PageFlow,
    x: Pt,
    width: Pt,
    style: TextStyle,
    lines: Vec<TextLine>,
    mut wrap: impl FnMut(bool, TextBlock) -> Element,
) {
    let line_height = style.line_height().to_milli_i64().max(1);
    let mut rest = lines;
    let mut first = true;
    while !rest.is_empty() {
        let mut fit = (flow.remaining().to_milli_i64() / line_height) as usize;
        if fit == 0 {
            if flow.new_page("text continues") {
                continue;
            }
            fit = 1;
        }
        let chunk: Vec<TextLine> = rest.drain(..fit.min(rest.len())).collect();
        let block = TextBlock {
            x,
            y: flow.cursor(),
            width,
            style,
            lines: chunk,
        };
        let height = block.height();
        flow.push(wrap(first, block));
        flow.advance(height);
        first = false;
        if !rest.is_empty() {
            flow.new_page("text continues");
        }
    }
}

pub fn render_table(flow: &mut PageFlow, ctx: RenderContext, table: &TableBlock) {
    if table.rows.is_empty() {
        return;
    }
    let layout = layout_table(table, ctx.width, flow.config().usable_height());
    let first_row = layout.rows.first().map(|r| r.height).unwrap_or(Pt::ZERO);
    let reserve = flow.config().reserves.table_start;
    flow.ensure_space(reserve.max(layout.header.height + first_row), "table start");
    gap_unless_top(flow, ctx.lines(0.3));

    let bottom = flow.config().content_bottom();
    let mut top = flow.cursor();
    let mut y = top + layout.header.height;
    let mut rows = Vec::new();
    for row in &layout.rows {
        if y + row.height > bottom {
            if !rows.is_empty() {
                flow.push(Element::Table(layout.fragment(
                    ctx.left,
                    top,
                    std::mem::take(&mut rows),
                )));
                flow.advance(y - top);
                flow.new_page("table continues");
            } else {
                flow.new_page("table start");
            }
            top = flow.cursor();
            y = top + layout.header.height;
        }
        rows.push(row.clone());
        y += row.height;
    }
    flow.push(Element::Table(layout.fragment(ctx.left, top, rows)));
    flow.advance(y - top + ctx.lines(0.5));
}

/// Field labels and rule geometry of a signature box.
struct SignatureFields {
    inset: f32,
    role_top: f32,
    first_row: f32,
    second_row: f32,
    underline: f32,
    label_size: f32,
    line_len: f32,
    gap: f32,
}

const LABEL_WIDTH: f32 = 42.0;

fn signature_box(ctx: RenderContext, y: Pt, height: f32, role: &str, f: &SignatureFields) -> Element {
    let height = Pt::from_f32(height);
    let left = ctx.left + Pt::from_f32(f.inset);
    let label = TextStyle::new(f.label_size, FontWeight::Regular, Palette::TEXT_GRAY);
    let rule = Stroke::new(Palette::LINE, 0.5);
    let field = |x: Pt, row: f32, text: &str| -> [Element; 2] {
        let row_y = y + Pt::from_f32(row);
        let line_y = row_y + Pt::from_f32(f.underline);
        let start = x + Pt::from_f32(LABEL_WIDTH);
        [
            Element::Text(single_line_at(x, row_y, Pt::from_f32(LABEL_WIDTH), label, text)),
            Element::hline(start, start + Pt::from_f32(f.line_len), line_y, rule),
        ]
    };
    let firma_x = left + Pt::from_f32(LABEL_WIDTH + f.line_len + f.gap);

    let mut children = vec![
        Element::rounded_rect(Rect::new(ctx.left, y, ctx.width, height), 3.0, Palette::SECTION_BG),
        Element::filled_rect(Rect::new(ctx.left, y, Pt::from_i32(3), height), Palette::PRIMARY),
        Element::Text(single_line_at(
            left,
            y + Pt::from_f32(f.role_top),
            ctx.width - Pt::from_f32(f.inset * 2.0),
            TextStyle::new(11.0, FontWeight::Bold, Palette::PRIMARY),
            role,
        )),
    ];
    children.extend(field(left, f.first_row, "Nome"));
    children.extend(field(firma_x, f.first_row, "Firma"));
    children.extend(field(left, f.second_row, "Data"));
    Element::Group {
        role: Role::SignatureBox,
        children,
    }
}

fn render_signature_line(flow: &mut PageFlow, ctx: RenderContext, role: &str) {
    gap_unless_top(flow, ctx.lines(0.5));
    flow.ensure_space(flow.config().reserves.signature, "signature");
    let fields = SignatureFields {
        inset: 14.0,
        role_top: 10.0,
        first_row: 32.0,
        second_row: 58.0,
        underline: 10.0,
        label_size: 8.0,
        line_len: 140.0,
        gap: 20.0,
    };
    let y = flow.cursor();
    flow.push(signature_box(ctx, y, 80.0, role, &fields));
    flow.advance(Pt::from_i32(90));
}

/// "FIRME E APPROVAZIONE" band followed by one box per canonical role.
pub fn render_signature_page(flow: &mut PageFlow, ctx: RenderContext) {
    flow.new_page("signature page");
    gap_unless_top(flow, ctx.lines(1.0));
    let band = Pt::from_f32(BANNER_HEIGHT);
    let y = flow.cursor();
    flow.push(Element::Group {
        role: Role::SectionBanner,
        children: vec![
            Element::filled_rect(Rect::new(ctx.left, y, ctx.width, band), Palette::LIGHT_BLUE),
            Element::filled_rect(Rect::new(ctx.left, y, Pt::from_i32(4), band), Palette::PRIMARY),
            Element::Text(single_line_at(
                ctx.left + Pt::from_i32(14),
                y + Pt::from_i32(9),
                ctx.width - Pt::from_i32(20),
                TextStyle::new(13.0, FontWeight::Bold, Palette::PRIMARY),
                "FIRME E APPROVAZIONE",
            )),
        ],
    });
    flow.advance(band + Pt::from_i32(16));

    let fields = SignatureFields {
        inset: 16.0,
        role_top: 12.0,
        first_row: 36.0,
        second_row: 66.0,
        underline: 12.0,
        label_size: 9.0,
        line_len: 150.0,
        gap: 25.0,
    };
    for role in SIGNATURE_ROLES {
        flow.ensure_space(flow.config().reserves.signature, "signature");
        let y = flow.cursor();
        flow.push(signature_box(ctx, y, 95.0, role, &fields));
        flow.advance(Pt::from_i32(110));
    }
}

fn emergency_grid_height() -> Pt {
    let rows = EMERGENCY_CONTACTS.len().div_ceil(3) as i32;
    Pt::from_f32(EMERGENCY_CARD_HEIGHT) * rows + Pt::from_f32(EMERGENCY_GAP) * (rows - 1)
}

/// Space the grid asks for before it starts drawing.
fn emergency_grid_space() -> Pt {
    emergency_grid_height() + Pt::from_i32(22)
}

/// Three-column grid of emergency number cards.
pub fn render_emergency_grid(flow: &mut PageFlow, ctx: RenderContext) {
    let card_h = Pt::from_f32(EMERGENCY_CARD_HEIGHT);
    let gap = Pt::from_f32(EMERGENCY_GAP);
    let grid_h = emergency_grid_height();
    flow.ensure_space(emergency_grid_space(), "emergency grid");
    flow.advance(Pt::from_i32(8));

    let top = flow.cursor();
    let card_w = (ctx.width - gap * 2) / 3;
    let last = EMERGENCY_CONTACTS.len() - 1;
    let mut children = Vec::with_capacity(EMERGENCY_CONTACTS.len() * 3);
    for (index, (number, label)) in EMERGENCY_CONTACTS.iter().enumerate() {
        let col = (index % 3) as i32;
        let row = (index / 3) as i32;
        let x = ctx.left + (card_w + gap) * col;
        let y = top + (card_h + gap) * row;
        let (fill, number_size) = if index == last {
            (Palette::EMERGENCY_CARD_ALT, 13.0)
        } else {
            (Palette::EMERGENCY_CARD, 20.0)
        };
        let number_style = TextStyle::new(number_size, FontWeight::Bold, Palette::WHITE)
            .with_align(TextAlignMode::Center);
        let label_style = TextStyle::new(7.0, FontWeight::Regular, Palette::EMERGENCY_LABEL)
            .with_align(TextAlignMode::Center);
        let inner_x = x + Pt::from_i32(6);
        let inner_w = card_w - Pt::from_i32(12);
        children.push(Element::rounded_rect(Rect::new(x, y, card_w, card_h), 3.0, fill));
        children.push(Element::Text(single_line_at(
            inner_x,
            y + Pt::from_i32(8),
            inner_w,
            number_style,
            number,
        )));
        children.push(Element::Text(single_line_at(
            inner_x,
            y + Pt::from_i32(34),
            inner_w,
            label_style,
            label,
        )));
    }
    flow.push(Element::Group {
        role: Role::EmergencyGrid,
        children,
    });
    flow.advance(grid_h + Pt::from_i32(14));
}

/// What the cover shows. Rows are already filtered to present values.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverData {
    pub revision: String,
    pub rows: Vec<(String, String)>,
    pub issued_on: String,
}

impl CoverData {
    /// Keeps only the rows whose value is present, non-blank and not "N/A" in any case.
    pub fn new(revision: impl Into<String>, candidates: Vec<(&str, Option<String>)>, issued_on: impl Into<String>) -> Self {
        let rows = candidates
            .into_iter()
            .filter_map(|(label, value)| {
                let value = present(value.as_deref())?;
                Some((label.to_string(), value.to_string()))
            })
            .collect();
        Self {
            revision: revision.into(),
            rows,
            issued_on: issued_on.into(),
        }
    }
}

pub fn render_cover(page_size: Size, margin: Pt, cover: &CoverData) -> LayoutPage {
    let w = page_size.width;
    let h = page_size.height;
    let band_h = Pt::from_i32(130);
    let centered = |size: f32, weight: FontWeight| {
        TextStyle::new(size, weight, Palette::WHITE).with_align(TextAlignMode::Center)
    };

    let mut children = vec![
        Element::filled_rect(Rect::new(Pt::ZERO, Pt::ZERO, w, h), Palette::LIGHT_BLUE),
        Element::filled_rect(Rect::new(Pt::ZERO, Pt::ZERO, w, band_h), Palette::PRIMARY),
        Element::Text(single_line_at(Pt::ZERO, Pt::from_i32(26), w, centered(38.0, FontWeight::Bold), "PALLADIA")),
        Element::Text(single_line_at(
            Pt::ZERO,
            Pt::from_i32(74),
            w,
            centered(13.0, FontWeight::Regular),
            "Piano Operativo di Sicurezza",
        )),
        Element::Text(single_line_at(
            Pt::ZERO,
            Pt::from_i32(94),
            w,
            centered(10.0, FontWeight::Regular),
            "ai sensi D.lgs 81/2008 e s.m.i.",
        )),
    ];

    let badge_w = Pt::from_i32(90);
    let badge_h = Pt::from_i32(26);
    let badge_x = (w - badge_w) / 2;
    let badge_y = band_h + Pt::from_i32(18);
    children.push(Element::rounded_rect(
        Rect::new(badge_x, badge_y, badge_w, badge_h),
        6.0,
        Palette::ACCENT,
    ));
    children.push(Element::Text(single_line_at(
        badge_x,
        badge_y + Pt::from_i32(7),
        badge_w,
        centered(11.0, FontWeight::Bold),
        &format!("Rev. {}", cover.revision),
    )));

    let divider_y = badge_y + badge_h + Pt::from_i32(18);
    children.push(Element::hline(
        margin + Pt::from_i32(40),
        w - margin - Pt::from_i32(40),
        divider_y,
        Stroke::new(Palette::PRIMARY, 1.5),
    ));

    let mut page = LayoutPage::new(PageKind::Cover);
    page.elements.push(Element::Group {
        role: Role::Cover,
        children,
    });

    if !cover.rows.is_empty() {
        let pad = Pt::from_i32(14);
        let line_h = Pt::from_i32(24);
        let box_x = margin + Pt::from_i32(20);
        let box_w = w - margin * 2 - Pt::from_i32(40);
        let box_y = divider_y + Pt::from_i32(18);
        let box_h = pad * 2 + line_h * cover.rows.len() as i32;
        let mut info = vec![
            Element::rounded_rect(Rect::new(box_x, box_y, box_w, box_h), 4.0, Palette::SECTION_BG),
            Element::filled_rect(Rect::new(box_x, box_y, Pt::from_i32(4), box_h), Palette::PRIMARY),
        ];
        let style = TextStyle::new(10.0, FontWeight::Regular, Palette::TEXT);
        let text_w = box_w - Pt::from_i32(20);
        for (index, (label, value)) in cover.rows.iter().enumerate() {
            let label = format!("{label}: ");
            let label_w = measure_text_width(FontWeight::Bold, style.font_size, &label);
            let value = truncate_text_with_ellipsis(
                value,
                FontWeight::Regular,
                style.font_size,
                (text_w - label_w).max(Pt::ZERO),
            );
            let rich = RichText {
                runs: vec![
                    crate::markup::Run {
                        text: label,
                        bold: true,
                    },
                    crate::markup::Run {
                        text: value,
                        bold: false,
                    },
                ],
            };
            let mut lines = wrap_rich_text(&rich, style.font_size, text_w);
            lines.truncate(1);
            info.push(Element::Text(TextBlock {
                x: box_x + Pt::from_i32(14),
                y: box_y + pad + line_h * index as i32,
                width: text_w,
                style,
                lines,
            }));
        }
        page.elements.push(Element::Group {
            role: Role::CoverInfo,
            children: info,
        });
    }

    let strip_h = Pt::from_i32(36);
    page.elements.push(Element::Group {
        role: Role::Cover,
        children: vec![
            Element::filled_rect(Rect::new(Pt::ZERO, h - strip_h, w, strip_h), Palette::PRIMARY),
            Element::Text(single_line_at(
                Pt::ZERO,
                h - strip_h + Pt::from_i32(12),
                w,
                centered(9.0, FontWeight::Regular),
                &format!("Documento emesso il {}", cover.issued_on),
            )),
        ],
    });
    page
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FlowConfig;
    use crate::layout::{CellContent, LayoutPage};
    use crate::markup::tokenize;

    fn run(source: &str) -> Vec<LayoutPage> {
        let mut flow = PageFlow::new(FlowConfig::default());
        render_blocks(&mut flow, &tokenize(source), &RenderOptions::default());
        flow.finish()
    }

    fn long_table(rows: usize) -> String {
        let mut source = String::from("| Fase | Attrezzatura | Note |\n|---|---|---|\n");
        for index in 0..rows {
            source.push_str(&format!("| Fase {index} | Betoniera | ok |\n"));
        }
        source
    }

    #[test]
    fn bold_runs_stay_on_one_line() {
        let pages = run("Indossare **sempre** il casco");
        let Element::Text(block) = &pages[0].elements[0] else {
            panic!("expected text");
        };
        assert_eq!(block.lines.len(), 1);
        let runs: Vec<(&str, bool)> = block.lines[0]
            .runs
            .iter()
            .map(|r| (r.text.as_str(), r.bold))
            .collect();
        assert_eq!(
            runs,
            vec![("Indossare ", false), ("sempre", true), (" il casco", false)]
        );
        assert!(block.lines[0].runs[1].x_offset > Pt::ZERO);
    }

    #[test]
    fn page_spanning_table_repeats_its_header() {
        let pages = run(&format!("Premessa al registro.\n{}", long_table(40)));
        let fragments: Vec<_> = pages.iter().flat_map(|p| p.table_fragments()).collect();
        assert_eq!(fragments.len(), 2);
        assert!((25..=31).contains(&fragments[0].rows.len()));
        assert_eq!(fragments[0].rows.len() + fragments[1].rows.len(), 40);
        assert_eq!(fragments[0].header, fragments[1].header);
        assert_eq!(fragments[1].y, Pt::from_i32(80));
        for page in &pages {
            for fragment in page.table_fragments() {
                assert!(fragment.y + fragment.height() <= FlowConfig::default().content_bottom());
            }
        }
    }

    #[test]
    fn table_columns_cover_content_width() {
        let pages = run("| A | B | C | D | E | F | G |\n| 1 | 2 | 3 | 4 | 5 | 6 | 7 |");
        let fragment = pages[0].table_fragments().next().expect("fragment");
        assert_eq!(fragment.columns.len(), 7);
        assert_eq!(fragment.width(), FlowConfig::default().content_width());
        assert!(fragment.rows.iter().all(|r| r.cells.len() == 7));
    }

    #[test]
    fn short_rows_are_padded_with_empty_cells() {
        let pages = run("| Ruolo | Nome | Telefono |\n| RSPP | Rossi |");
        let fragment = pages[0].table_fragments().next().expect("fragment");
        let row = &fragment.rows[0];
        assert_eq!(row.cells.len(), 3);
        assert!(matches!(&row.cells[2], CellContent::Text { lines, .. } if lines.is_empty()));
    }

    #[test]
    fn long_paragraph_continues_on_next_page() {
        let text = "Lavorazione in quota con uso di trabattello. ".repeat(400);
        let pages = run(&text);
        assert!(pages.len() >= 2);
        let bottom = FlowConfig::default().content_bottom();
        for page in &pages {
            for element in &page.elements {
                if let Element::Text(block) = element {
                    assert!(block.y + block.height() <= bottom);
                }
            }
        }
    }

    #[test]
    fn emergency_banner_gets_the_card_grid() {
        let pages = run("## SEZIONE 7 - Procedure di emergenza\nTesto.");
        assert_eq!(pages[0].count_role(Role::SectionBanner), 1);
        assert_eq!(pages[0].count_role(Role::EmergencyGrid), 1);
        assert!(pages[0].contains_text("PROCEDURE DI EMERGENZA"));
        assert!(pages[0].contains_text("Vigili del Fuoco"));

        let mut flow = PageFlow::new(FlowConfig::default());
        let options = RenderOptions {
            emergency_grid: false,
        };
        render_blocks(&mut flow, &tokenize("## SEZIONE 7 - Emergenze"), &options);
        assert_eq!(flow.finish()[0].count_role(Role::EmergencyGrid), 0);
    }

    #[test]
    fn signature_page_lists_the_five_roles() {
        let mut flow = PageFlow::new(FlowConfig::default());
        let ctx = RenderContext::for_flow(&flow);
        render_signature_page(&mut flow, ctx);
        let pages = flow.finish();
        let boxes: usize = pages.iter().map(|p| p.count_role(Role::SignatureBox)).sum();
        assert_eq!(boxes, 5);
        assert!(pages[0].contains_text("FIRME E APPROVAZIONE"));
        assert!(pages.iter().any(|p| p.contains_text("Medico Competente")));
    }

    #[test]
    fn cover_omits_missing_and_sentinel_fields() {
        let cover = CoverData::new(
            "2",
            vec![
                ("Cantiere", Some("X".to_string())),
                ("Indirizzo", Some("N/A".to_string())),
                ("Committente", Some("Y".to_string())),
                ("P.IVA", None),
            ],
            "16/10/2026",
        );
        assert_eq!(cover.rows.len(), 2);
        let page = render_cover(Size::a4(), Pt::from_i32(50), &cover);
        let info = page
            .elements
            .iter()
            .find_map(|e| match e {
                Element::Group {
                    role: Role::CoverInfo,
                    children,
                } => Some(children),
                _ => None,
            })
            .expect("info box");
        let rows = info.iter().filter(|e| matches!(e, Element::Text(_))).count();
        assert_eq!(rows, 2);
        assert!(page.contains_text("Cantiere: X"));
        assert!(!page.contains_text("N/A"));
        assert!(page.contains_text("Rev. 2"));
        assert!(page.contains_text("Documento emesso il 16/10/2026"));
    }

    #[test]
    fn cover_sentinel_is_case_insensitive() {
        let cover = CoverData::new(
            "1",
            vec![
                ("Cantiere", Some("Via Roma".to_string())),
                ("Indirizzo", Some("n/a".to_string())),
                ("Committente", Some(" N/a ".to_string())),
            ],
            "16/10/2026",
        );
        assert_eq!(cover.rows, vec![("Cantiere".to_string(), "Via Roma".to_string())]);
    }

    #[test]
    fn long_cover_values_end_with_ellipsis() {
        let address = "Via Giuseppe Garibaldi angolo Piazza della Repubblica, lotto 14, \
                       comparto nord, 20121 Milano (MI), ingresso carrabile da via Manzoni";
        let cover = CoverData::new(
            "1",
            vec![("Indirizzo", Some(address.to_string()))],
            "16/10/2026",
        );
        let page = render_cover(Size::a4(), Pt::from_i32(50), &cover);
        let Some(Element::Group { children, .. }) = page
            .elements
            .iter()
            .find(|e| matches!(e, Element::Group { role: Role::CoverInfo, .. }))
        else {
            panic!("info box");
        };
        let Some(Element::Text(block)) = children.iter().find(|e| matches!(e, Element::Text(_))) else {
            panic!("info row");
        };
        assert_eq!(block.lines.len(), 1);
        let value = &block.lines[0].runs.last().expect("value run").text;
        assert!(value.ends_with('\u{2026}'), "{value}");
        assert!(value.starts_with("Via Giuseppe"));
        assert!(block.lines[0].width <= block.width);
    }

    #[test]
    fn emergency_banner_is_kept_with_its_grid() {
        let mut flow = PageFlow::new(FlowConfig::default());
        let ctx = RenderContext::for_flow(&flow);
        render_paragraph(&mut flow, ctx, &RichText::plain("apertura"));
        flow.advance(flow.remaining() - Pt::from_i32(80));
        render_blocks(
            &mut flow,
            &tokenize("## SEZIONE 7 - Procedure di emergenza"),
            &RenderOptions::default(),
        );
        let pages = flow.finish();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].count_role(Role::SectionBanner), 0);
        assert_eq!(pages[1].count_role(Role::SectionBanner), 1);
        assert_eq!(pages[1].count_role(Role::EmergencyGrid), 1);
    }

    #[test]
    fn heading_at_page_bottom_moves_to_next_page() {
        let mut flow = PageFlow::new(FlowConfig::default());
        let ctx = RenderContext::for_flow(&flow);
        render_paragraph(&mut flow, ctx, &RichText::plain("apertura"));
        flow.advance(flow.remaining() - Pt::from_i32(15));
        render_block(
            &mut flow,
            ctx,
            &Block::SubHeading {
                text: "Rischi specifici".to_string(),
            },
            &RenderOptions::default(),
        );
        let pages = flow.finish();
        assert_eq!(pages.len(), 2);
        assert!(pages[1].contains_text("Rischi specifici"));
    }
}
