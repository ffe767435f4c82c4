//! HTML backend: the same positioned elements, printed by a headless browser.
//!
//! Every layout page becomes one `<section class="page">`. Elements keep the
//! coordinates computed by the layout pass, so page breaks are decided here
//! and never by the browser.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::fmt::Write as _;

use crate::assets::ImageStore;
use crate::finalize::RunningElements;
use crate::layout::{
    CellContent, Element, LayoutDocument, LayoutPage, PageKind, Stroke, TableFragment,
    TableRowLayout, TextBlock, TextLine,
};
use crate::pdf::format_milli;
use crate::style::{Palette, TextStyle};
use crate::table::{
    GlyphShape, PAD_H, PICTOGRAM_CENTER_X, PICTOGRAM_RADIUS, PICTOGRAM_TEXT_X, PictogramGlyph,
};
use crate::types::{Color, Pt};

/// Who draws the running header and footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderFooterMode {
    /// The converter prints its own header and footer templates in the page margins.
    Native,
    /// The stamped running elements are part of each page section.
    #[default]
    InlineFixed,
}

/// Header and footer instructions handed to the converter alongside the markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderFooter {
    Native {
        header_template: String,
        footer_template: String,
    },
    InlineFixed,
}

#[derive(Debug, Clone)]
pub struct RenderedHtml {
    pub html: String,
    pub header_footer: HeaderFooter,
}

fn css_pt(value: Pt) -> String {
    format!("{}pt", format_milli(value.to_milli_i64()))
}

fn escape_html_text(input: &str, out: &mut String) {
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

fn escape_html_attr(input: &str, out: &mut String) {
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
}

fn escaped(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    escape_html_text(input, &mut out);
    out
}

pub fn render_html(
    document: &LayoutDocument,
    images: &ImageStore,
    mode: HeaderFooterMode,
    running: &RunningElements,
) -> RenderedHtml {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html lang=\"it\">\n<head>\n<meta charset=\"utf-8\">\n<title>");
    escape_html_text(&document.title, &mut html);
    html.push_str("</title>\n<style>\n");
    html.push_str(&stylesheet(document, mode));
    html.push_str("</style>\n</head>\n<body>\n");
    for page in &document.pages {
        render_page(&mut html, document, page, images, mode);
    }
    html.push_str("</body>\n</html>\n");

    let header_footer = match mode {
        HeaderFooterMode::Native => HeaderFooter::Native {
            header_template: native_header_template(running),
            footer_template: native_footer_template(running),
        },
        HeaderFooterMode::InlineFixed => HeaderFooter::InlineFixed,
    };
    RenderedHtml {
        html,
        header_footer,
    }
}

fn stylesheet(document: &LayoutDocument, mode: HeaderFooterMode) -> String {
    let size = document.page_size;
    let margins = document.margins;
    let page_margin = match mode {
        HeaderFooterMode::Native => format!(
            "{} {} {} {}",
            css_pt(margins.top),
            css_pt(margins.right),
            css_pt(margins.bottom),
            css_pt(margins.left)
        ),
        HeaderFooterMode::InlineFixed => "0".to_string(),
    };
    let mut css = String::new();
    let _ = writeln!(
        css,
        "@page {{ size: {} {}; margin: {}; }}",
        css_pt(size.width),
        css_pt(size.height),
        page_margin
    );
    css.push_str("@page :first { margin: 0; }\n");
    let _ = writeln!(
        css,
        "* {{ box-sizing: border-box; margin: 0; padding: 0; }}\n\
         html, body {{ -webkit-print-color-adjust: exact; print-color-adjust: exact; }}\n\
         body {{ font-family: Helvetica, Arial, sans-serif; color: {}; }}\n\
         .page {{ position: relative; overflow: hidden; break-after: page; page-break-after: always; }}\n\
         .page:last-child {{ break-after: auto; page-break-after: auto; }}\n\
         .text {{ position: absolute; white-space: nowrap; }}\n\
         .text .line {{ overflow: hidden; }}\n\
         .box, .shape, .tile {{ position: absolute; }}\n\
         table {{ position: absolute; table-layout: fixed; border-collapse: collapse; }}\n\
         th, td {{ overflow: hidden; overflow-wrap: anywhere; border: 0.5pt solid {}; padding: 0 {}; vertical-align: middle; }}\n\
         th {{ background: {}; color: {}; font-size: 9pt; font-weight: 700; text-align: left; }}\n\
         td .line {{ white-space: nowrap; }}\n\
         td.badge-cell, td.level {{ text-align: center; }}\n\
         .badge {{ display: inline-block; width: 30pt; height: 16pt; border-radius: 4pt; color: {}; font-size: 8pt; font-weight: 700; line-height: 16pt; text-align: center; }}\n\
         .glyph {{ position: absolute; left: {}; width: {}; height: {}; }}\n\
         td.pictogram {{ position: relative; padding-left: {}; }}",
        Palette::TEXT.to_css_hex(),
        Palette::LINE.to_css_hex(),
        css_pt(Pt::from_f32(PAD_H)),
        Palette::TABLE_HEADER.to_css_hex(),
        Palette::WHITE.to_css_hex(),
        Palette::WHITE.to_css_hex(),
        css_pt(Pt::from_f32(PICTOGRAM_CENTER_X - PICTOGRAM_RADIUS)),
        css_pt(Pt::from_f32(PICTOGRAM_RADIUS * 2.0)),
        css_pt(Pt::from_f32(PICTOGRAM_RADIUS * 2.0)),
        css_pt(Pt::from_f32(PICTOGRAM_TEXT_X)),
    );
    for tier in [
        crate::risk::RiskTier::Low,
        crate::risk::RiskTier::Medium,
        crate::risk::RiskTier::High,
        crate::risk::RiskTier::VeryHigh,
    ] {
        let _ = writeln!(
            css,
            ".badge.{class} {{ background: {color}; }}\ntd.level.{class} {{ background: {tint}; color: {color}; font-weight: 700; }}",
            class = tier.css_class(),
            color = tier.color().to_css_hex(),
            tint = tier.color().tint(0.18).to_css_hex(),
        );
    }
    css
}

/// Page-space offset of a section's origin.
fn section_origin(document: &LayoutDocument, page: &LayoutPage, mode: HeaderFooterMode) -> (Pt, Pt) {
    match (page.kind, mode) {
        (PageKind::Content, HeaderFooterMode::Native) => {
            (document.margins.left, document.margins.top)
        }
        _ => (Pt::ZERO, Pt::ZERO),
    }
}

fn render_page(
    out: &mut String,
    document: &LayoutDocument,
    page: &LayoutPage,
    images: &ImageStore,
    mode: HeaderFooterMode,
) {
    let origin = section_origin(document, page, mode);
    let size = document.page_size;
    let (width, height) = if origin == (Pt::ZERO, Pt::ZERO) {
        (size.width, size.height)
    } else {
        (
            size.width - document.margins.left - document.margins.right,
            size.height - document.margins.top - document.margins.bottom,
        )
    };
    let kind = match page.kind {
        PageKind::Cover => "cover",
        PageKind::Content => "content",
    };
    let _ = writeln!(
        out,
        "<section class=\"page {}\" style=\"width: {}; height: {};\">",
        kind,
        css_pt(width),
        css_pt(height)
    );
    let mut writer = ElementWriter {
        out: &mut *out,
        origin,
        images,
        mode,
    };
    for element in &page.elements {
        writer.element(element);
    }
    out.push_str("</section>\n");
}

struct ElementWriter<'a> {
    out: &'a mut String,
    origin: (Pt, Pt),
    images: &'a ImageStore,
    mode: HeaderFooterMode,
}

impl ElementWriter<'_> {
    fn left(&self, x: Pt) -> String {
        css_pt(x - self.origin.0)
    }

    fn top(&self, y: Pt) -> String {
        css_pt(y - self.origin.1)
    }

    fn element(&mut self, element: &Element) {
        match element {
            Element::Text(block) => self.text_block(block),
            Element::Line {
                x1,
                y1,
                x2,
                y2,
                stroke,
            } => self.line(*x1, *y1, *x2, *y2, *stroke),
            Element::Rect {
                rect,
                radius,
                fill,
                stroke,
            } => {
                let _ = write!(
                    self.out,
                    "<div class=\"box\" style=\"left: {}; top: {}; width: {}; height: {};",
                    self.left(rect.x),
                    self.top(rect.y),
                    css_pt(rect.width),
                    css_pt(rect.height)
                );
                self.paint_box(*fill, *stroke, Some(*radius));
                self.out.push_str("\"></div>\n");
            }
            Element::Circle {
                cx,
                cy,
                r,
                fill,
                stroke,
            } => {
                let _ = write!(
                    self.out,
                    "<div class=\"shape\" style=\"left: {}; top: {}; width: {}; height: {}; border-radius: 50%;",
                    self.left(*cx - *r),
                    self.top(*cy - *r),
                    css_pt(*r * 2),
                    css_pt(*r * 2)
                );
                self.paint_box(*fill, *stroke, None);
                self.out.push_str("\"></div>\n");
            }
            Element::Polygon {
                points,
                fill,
                stroke,
            } => self.polygon(points, *fill, *stroke),
            Element::Image { rect, resource_id } => {
                let Some(stored) = self.images.get(resource_id) else {
                    log::warn!("image {} is not in the store; skipped", resource_id);
                    return;
                };
                let _ = writeln!(
                    self.out,
                    "<img class=\"tile\" alt=\"\" style=\"left: {}; top: {}; width: {}; height: {};\" src=\"data:{};base64,{}\">",
                    self.left(rect.x),
                    self.top(rect.y),
                    css_pt(rect.width),
                    css_pt(rect.height),
                    stored.mime,
                    BASE64.encode(&stored.source)
                );
            }
            Element::Table(fragment) => self.table(fragment),
            Element::Group { role, children } => {
                if role.is_running() && self.mode == HeaderFooterMode::Native {
                    return;
                }
                let _ = writeln!(self.out, "<div class=\"{}\">", role.css_class());
                for child in children {
                    self.element(child);
                }
                self.out.push_str("</div>\n");
            }
        }
    }

    fn paint_box(&mut self, fill: Option<Color>, stroke: Option<Stroke>, radius: Option<Pt>) {
        if let Some(color) = fill {
            let _ = write!(self.out, " background: {};", color.to_css_hex());
        }
        if let Some(stroke) = stroke {
            let _ = write!(
                self.out,
                " border: {} solid {};",
                css_pt(stroke.width),
                stroke.color.to_css_hex()
            );
        }
        if let Some(radius) = radius.filter(|r| *r > Pt::ZERO) {
            let _ = write!(self.out, " border-radius: {};", css_pt(radius));
        }
    }

    fn text_style(&mut self, style: &TextStyle) {
        let _ = write!(
            self.out,
            " font-size: {}; line-height: {}; color: {}; font-weight: {}; text-align: {};",
            css_pt(style.font_size),
            css_pt(style.line_height()),
            style.color.to_css_hex(),
            style.weight.css_weight(),
            style.align.as_css()
        );
    }

    fn text_block(&mut self, block: &TextBlock) {
        let _ = write!(
            self.out,
            "<div class=\"text\" style=\"left: {}; top: {}; width: {};",
            self.left(block.x),
            self.top(block.y),
            css_pt(block.width)
        );
        self.text_style(&block.style);
        self.out.push_str("\">");
        self.lines(&block.lines, block.style.line_height());
        self.out.push_str("</div>\n");
    }

    fn lines(&mut self, lines: &[TextLine], line_height: Pt) {
        for line in lines {
            let _ = write!(self.out, "<div class=\"line\" style=\"height: {};\">", css_pt(line_height));
            for run in &line.runs {
                if run.bold {
                    self.out.push_str("<strong>");
                    escape_html_text(&run.text, self.out);
                    self.out.push_str("</strong>");
                } else {
                    self.out.push_str("<span style=\"font-weight: 400;\">");
                    escape_html_text(&run.text, self.out);
                    self.out.push_str("</span>");
                }
            }
            self.out.push_str("</div>");
        }
    }

    fn line(&mut self, x1: Pt, y1: Pt, x2: Pt, y2: Pt, stroke: Stroke) {
        let half = stroke.width / 2;
        if y1 == y2 || x1 == x2 {
            let (left, top, width, height) = if y1 == y2 {
                (x1.min(x2), y1 - half, (x2 - x1).max(x1 - x2), stroke.width)
            } else {
                (x1 - half, y1.min(y2), stroke.width, (y2 - y1).max(y1 - y2))
            };
            let _ = writeln!(
                self.out,
                "<div class=\"shape\" style=\"left: {}; top: {}; width: {}; height: {}; background: {};\"></div>",
                self.left(left),
                self.top(top),
                css_pt(width),
                css_pt(height),
                stroke.color.to_css_hex()
            );
            return;
        }
        let points = [(x1, y1), (x2, y2)];
        self.svg(&points, None, Some(stroke), false);
    }

    fn polygon(&mut self, points: &[(Pt, Pt)], fill: Option<Color>, stroke: Option<Stroke>) {
        if points.len() < 3 {
            return;
        }
        self.svg(points, fill, stroke, true);
    }

    /// Inline SVG sized to the bounding box of `points`.
    fn svg(&mut self, points: &[(Pt, Pt)], fill: Option<Color>, stroke: Option<Stroke>, closed: bool) {
        let pad = stroke.map(|s| s.width).unwrap_or(Pt::ZERO);
        let min_x = points.iter().map(|p| p.0).fold(points[0].0, Pt::min) - pad;
        let min_y = points.iter().map(|p| p.1).fold(points[0].1, Pt::min) - pad;
        let max_x = points.iter().map(|p| p.0).fold(points[0].0, Pt::max) + pad;
        let max_y = points.iter().map(|p| p.1).fold(points[0].1, Pt::max) + pad;
        let width = max_x - min_x;
        let height = max_y - min_y;
        let coords = points
            .iter()
            .map(|(x, y)| {
                format!(
                    "{},{}",
                    format_milli((*x - min_x).to_milli_i64()),
                    format_milli((*y - min_y).to_milli_i64())
                )
            })
            .collect::<Vec<_>>()
            .join(" ");
        let tag = if closed { "polygon" } else { "polyline" };
        let _ = write!(
            self.out,
            "<svg class=\"shape\" style=\"left: {}; top: {};\" width=\"{}\" height=\"{}\" viewBox=\"0 0 {} {}\"><{} points=\"{}\" fill=\"{}\"",
            self.left(min_x),
            self.top(min_y),
            css_pt(width),
            css_pt(height),
            format_milli(width.to_milli_i64()),
            format_milli(height.to_milli_i64()),
            tag,
            coords,
            fill.map(Color::to_css_hex).unwrap_or_else(|| "none".to_string())
        );
        if let Some(stroke) = stroke {
            let _ = write!(
                self.out,
                " stroke=\"{}\" stroke-width=\"{}\"",
                stroke.color.to_css_hex(),
                format_milli(stroke.width.to_milli_i64())
            );
        }
        self.out.push_str("/></svg>\n");
    }

    fn table(&mut self, fragment: &TableFragment) {
        let _ = writeln!(
            self.out,
            "<table class=\"{}\" style=\"left: {}; top: {}; width: {};\">",
            fragment.kind.css_class(),
            self.left(fragment.x),
            self.top(fragment.y),
            css_pt(fragment.width())
        );
        self.out.push_str("<colgroup>");
        for column in &fragment.columns {
            let _ = write!(self.out, "<col style=\"width: {};\">", css_pt(*column));
        }
        self.out.push_str("</colgroup>\n<thead>");
        self.row(&fragment.header, "th");
        self.out.push_str("</thead>\n<tbody>");
        for row in &fragment.rows {
            self.row(row, "td");
        }
        self.out.push_str("</tbody>\n</table>\n");
    }

    fn row(&mut self, row: &TableRowLayout, cell_tag: &str) {
        let _ = write!(
            self.out,
            "<tr style=\"height: {}; background: {};\">",
            css_pt(row.height),
            row.background.to_css_hex()
        );
        for (index, cell) in row.cells.iter().enumerate() {
            let accent = row
                .accent
                .filter(|_| index == 0)
                .map(|tier| format!(" box-shadow: inset 3pt 0 0 {};", tier.color().to_css_hex()))
                .unwrap_or_default();
            let height = format!("height: {};", css_pt(row.height));
            match cell {
                CellContent::Text { style, lines } => {
                    let _ = write!(self.out, "<{} style=\"{}{}", cell_tag, height, accent);
                    self.text_style(style);
                    self.out.push_str("\">");
                    self.lines(lines, style.line_height());
                }
                CellContent::Badge { label, tier } => {
                    let _ = write!(
                        self.out,
                        "<{} class=\"badge-cell\" style=\"{}{}\"><span class=\"badge {}\">{}</span>",
                        cell_tag,
                        height,
                        accent,
                        tier.css_class(),
                        escaped(label)
                    );
                }
                CellContent::Level { style, lines, tier } => {
                    let _ = write!(
                        self.out,
                        "<{} class=\"level {}\" style=\"{}{} font-size: {}; line-height: {};\">",
                        cell_tag,
                        tier.css_class(),
                        height,
                        accent,
                        css_pt(style.font_size),
                        css_pt(style.line_height())
                    );
                    self.lines(lines, style.line_height());
                }
                CellContent::Pictogram {
                    code,
                    glyph,
                    style,
                    lines,
                } => {
                    let _ = write!(
                        self.out,
                        "<{} class=\"pictogram\" title=\"",
                        cell_tag
                    );
                    escape_html_attr(code, self.out);
                    let _ = write!(self.out, "\" style=\"{}{}", height, accent);
                    self.text_style(style);
                    self.out.push_str("\">");
                    self.glyph(*glyph);
                    self.lines(lines, style.line_height());
                }
            }
            let _ = write!(self.out, "</{}>", cell_tag);
        }
        self.out.push_str("</tr>\n");
    }

    fn glyph(&mut self, glyph: PictogramGlyph) {
        let diameter = format_milli(Pt::from_f32(PICTOGRAM_RADIUS * 2.0).to_milli_i64());
        let r = format_milli(Pt::from_f32(PICTOGRAM_RADIUS).to_milli_i64());
        let stroke = glyph
            .outline()
            .map(|color| format!(" stroke=\"{}\" stroke-width=\"1\"", color.to_css_hex()))
            .unwrap_or_default();
        let fill = glyph.fill().to_css_hex();
        let shape = match glyph.shape() {
            GlyphShape::Circle => format!("<circle cx=\"{r}\" cy=\"{r}\" r=\"{r}\" fill=\"{fill}\"{stroke}/>"),
            GlyphShape::Triangle => format!(
                "<polygon points=\"{r},0 {d},{b} 0,{b}\" fill=\"{fill}\"{stroke}/>",
                d = diameter,
                b = format_milli(Pt::from_f32(PICTOGRAM_RADIUS * 1.8).to_milli_i64())
            ),
            GlyphShape::RoundedRect => format!(
                "<rect width=\"{diameter}\" height=\"{diameter}\" rx=\"3\" fill=\"{fill}\"{stroke}/>"
            ),
        };
        let _ = write!(
            self.out,
            "<svg class=\"glyph\" style=\"top: calc(50% - {r}pt);\" viewBox=\"0 0 {diameter} {diameter}\">{shape}</svg>"
        );
    }
}

fn native_header_template(running: &RunningElements) -> String {
    format!(
        "<div style=\"width: 100%; margin: 0 50pt; font-family: Helvetica, Arial, sans-serif; display: flex; justify-content: space-between; border-bottom: 1pt solid {};\">\
         <span style=\"font-size: 9pt; font-weight: 700; color: {};\">{}</span>\
         <span style=\"font-size: 8pt; color: {};\">{}</span></div>",
        Palette::ACCENT.to_css_hex(),
        Palette::PRIMARY.to_css_hex(),
        escaped(&running.brand),
        Palette::TEXT_GRAY.to_css_hex(),
        escaped(&running.title)
    )
}

fn native_footer_template(running: &RunningElements) -> String {
    let label = escaped(&running.footer_template)
        .replace("{page}", "<span class=\"pageNumber\"></span>")
        .replace("{pages}", "<span class=\"totalPages\"></span>");
    format!(
        "<div style=\"width: 100%; margin: 0 50pt; font-family: Helvetica, Arial, sans-serif; font-size: 8pt; display: flex; justify-content: space-between; border-top: 1pt solid {};\">\
         <span style=\"font-weight: 700; color: {};\">{}</span>\
         <span style=\"color: {};\">{}</span>\
         <span style=\"color: {};\">{}</span></div>",
        Palette::PRIMARY.to_css_hex(),
        Palette::PRIMARY.to_css_hex(),
        label,
        Palette::TEXT_GRAY.to_css_hex(),
        escaped(&running.title),
        Palette::TEXT_GRAY.to_css_hex(),
        escaped(&running.notice)
    )
}
