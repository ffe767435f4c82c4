//! Paints a [`LayoutDocument`] onto the command canvas the PDF writer reads.

use crate::canvas::{Canvas, Document};
use crate::font::measure_text_width;
use crate::layout::{
    CellContent, Element, LayoutDocument, LayoutPage, Stroke, TableFragment, TableRowLayout,
    TextBlock, TextLine,
};
use crate::style::{FontWeight, Palette, TextAlignMode, TextStyle};
use crate::table::{
    ACCENT_BAR_WIDTH, BADGE_HEIGHT, BADGE_WIDTH, GlyphShape, PAD_H, PICTOGRAM_CENTER_X,
    PICTOGRAM_RADIUS, PICTOGRAM_TEXT_X, PictogramGlyph,
};
use crate::types::{Color, Pt, Rect};

const BADGE_RADIUS: f32 = 4.0;
const LEVEL_TINT: f32 = 0.18;
const BORDER_WIDTH: f32 = 0.5;

pub fn draw_document(document: &LayoutDocument) -> Document {
    let mut canvas = Canvas::new(document.page_size);
    for page in &document.pages {
        draw_page(&mut canvas, page);
        canvas.show_page();
    }
    canvas.finish(document.title.clone())
}

fn draw_page(canvas: &mut Canvas, page: &LayoutPage) {
    for element in &page.elements {
        draw_element(canvas, element);
    }
}

fn draw_element(canvas: &mut Canvas, element: &Element) {
    match element {
        Element::Text(block) => draw_text_block(canvas, block),
        Element::Line {
            x1,
            y1,
            x2,
            y2,
            stroke,
        } => {
            apply_stroke(canvas, *stroke);
            canvas.move_to(*x1, *y1);
            canvas.line_to(*x2, *y2);
            canvas.stroke();
        }
        Element::Rect {
            rect,
            radius,
            fill,
            stroke,
        } => {
            if *radius == Pt::ZERO && stroke.is_none() {
                if let Some(color) = fill {
                    canvas.set_fill_color(*color);
                    canvas.draw_rect(rect.x, rect.y, rect.width, rect.height);
                }
                return;
            }
            canvas.rounded_rect_path(rect.x, rect.y, rect.width, rect.height, *radius);
            paint(canvas, *fill, *stroke);
        }
        Element::Circle {
            cx,
            cy,
            r,
            fill,
            stroke,
        } => {
            canvas.circle_path(*cx, *cy, *r);
            paint(canvas, *fill, *stroke);
        }
        Element::Polygon {
            points,
            fill,
            stroke,
        } => {
            if points.len() < 3 {
                return;
            }
            canvas.polygon_path(points);
            paint(canvas, *fill, *stroke);
        }
        Element::Image { rect, resource_id } => {
            canvas.draw_image(rect.x, rect.y, rect.width, rect.height, resource_id.clone());
        }
        Element::Table(fragment) => {
            canvas.save_state();
            draw_table(canvas, fragment);
            canvas.restore_state();
        }
        Element::Group { children, .. } => {
            canvas.save_state();
            for child in children {
                draw_element(canvas, child);
            }
            canvas.restore_state();
        }
    }
}

fn apply_stroke(canvas: &mut Canvas, stroke: Stroke) {
    canvas.set_stroke_color(stroke.color);
    canvas.set_line_width(stroke.width);
}

/// Paints the current path; without a stroke it is filled in the current color.
fn paint(canvas: &mut Canvas, fill: Option<Color>, stroke: Option<Stroke>) {
    if let Some(color) = fill {
        canvas.set_fill_color(color);
    }
    if let Some(stroke) = stroke {
        apply_stroke(canvas, stroke);
    }
    match (fill.is_some(), stroke.is_some()) {
        (true, true) => canvas.fill_stroke(),
        (false, true) => canvas.stroke(),
        _ => canvas.fill(),
    }
}

fn draw_text_block(canvas: &mut Canvas, block: &TextBlock) {
    for (index, line) in block.lines.iter().enumerate() {
        draw_line(
            canvas,
            block.line_left(line),
            block.line_top(index),
            &block.style,
            line,
        );
    }
}

fn draw_line(canvas: &mut Canvas, left: Pt, top: Pt, style: &TextStyle, line: &TextLine) {
    canvas.set_fill_color(style.color);
    canvas.set_font_size(style.font_size);
    for run in &line.runs {
        if run.text.is_empty() {
            continue;
        }
        canvas.set_font(if run.bold {
            FontWeight::Bold
        } else {
            FontWeight::Regular
        });
        canvas.draw_string(left + run.x_offset, top, run.text.clone());
    }
}

/// Lines centered vertically in `height`, aligned horizontally inside `[left, left + width]`.
fn draw_cell_lines(
    canvas: &mut Canvas,
    left: Pt,
    width: Pt,
    top: Pt,
    height: Pt,
    style: &TextStyle,
    lines: &[TextLine],
) {
    let line_height = style.line_height();
    let block_height = line_height * lines.len() as i32;
    let start = top + ((height - block_height) / 2).max(Pt::ZERO);
    for (index, line) in lines.iter().enumerate() {
        let x = match style.align {
            TextAlignMode::Left => left,
            TextAlignMode::Center => left + ((width - line.width) / 2).max(Pt::ZERO),
            TextAlignMode::Right => left + (width - line.width).max(Pt::ZERO),
        };
        draw_line(canvas, x, start + line_height * index as i32, style, line);
    }
}

fn draw_table(canvas: &mut Canvas, fragment: &TableFragment) {
    let width = fragment.width();
    canvas.clip_rect(fragment.x, fragment.y, width, fragment.height());

    let mut y = fragment.y;
    draw_row(canvas, fragment, &fragment.header, y);
    y += fragment.header.height;
    for row in &fragment.rows {
        draw_row(canvas, fragment, row, y);
        y += row.height;
    }

    canvas.set_stroke_color(Palette::LINE);
    canvas.set_line_width(Pt::from_f32(BORDER_WIDTH));
    let bottom = fragment.y + fragment.height();
    let mut x = fragment.x;
    for column in &fragment.columns[..fragment.columns.len().saturating_sub(1)] {
        x += *column;
        canvas.move_to(x, fragment.y);
        canvas.line_to(x, bottom);
    }
    let mut row_y = fragment.y + fragment.header.height;
    for row in &fragment.rows {
        canvas.move_to(fragment.x, row_y);
        canvas.line_to(fragment.x + width, row_y);
        row_y += row.height;
    }
    canvas.stroke();
    canvas.rounded_rect_path(fragment.x, fragment.y, width, fragment.height(), Pt::ZERO);
    canvas.stroke();
}

fn draw_row(canvas: &mut Canvas, fragment: &TableFragment, row: &TableRowLayout, y: Pt) {
    canvas.set_fill_color(row.background);
    canvas.draw_rect(fragment.x, y, fragment.width(), row.height);

    let pad = Pt::from_f32(PAD_H);
    let mut x = fragment.x;
    for (cell, column) in row.cells.iter().zip(&fragment.columns) {
        let inner = (*column - pad * 2).max(Pt::ZERO);
        match cell {
            CellContent::Text { style, lines } => {
                draw_cell_lines(canvas, x + pad, inner, y, row.height, style, lines);
            }
            CellContent::Badge { label, tier } => {
                draw_badge(canvas, x, y, *column, row.height, label, tier.color());
            }
            CellContent::Level { style, lines, tier } => {
                canvas.set_fill_color(tier.color().tint(LEVEL_TINT));
                canvas.draw_rect(
                    x + Pt::from_i32(2),
                    y + Pt::from_i32(2),
                    (*column - Pt::from_i32(4)).max(Pt::ZERO),
                    (row.height - Pt::from_i32(4)).max(Pt::ZERO),
                );
                draw_cell_lines(canvas, x + pad, inner, y, row.height, style, lines);
            }
            CellContent::Pictogram {
                glyph,
                style,
                lines,
                ..
            } => {
                let cx = x + Pt::from_f32(PICTOGRAM_CENTER_X);
                let cy = y + row.height / 2;
                draw_glyph(canvas, *glyph, cx, cy);
                let text_x = x + Pt::from_f32(PICTOGRAM_TEXT_X);
                let text_width = (x + *column - text_x).max(Pt::ZERO);
                draw_cell_lines(canvas, text_x, text_width, y, row.height, style, lines);
            }
        }
        x += *column;
    }

    if let Some(tier) = row.accent {
        canvas.set_fill_color(tier.color());
        canvas.draw_rect(fragment.x, y, Pt::from_f32(ACCENT_BAR_WIDTH), row.height);
    }
}

fn draw_badge(canvas: &mut Canvas, x: Pt, y: Pt, column: Pt, height: Pt, label: &str, color: Color) {
    let bw = Pt::from_f32(BADGE_WIDTH);
    let bh = Pt::from_f32(BADGE_HEIGHT);
    let bx = x + ((column - bw) / 2).max(Pt::ZERO);
    let by = y + ((height - bh) / 2).max(Pt::ZERO);
    canvas.set_fill_color(color);
    canvas.rounded_rect_path(bx, by, bw, bh, Pt::from_f32(BADGE_RADIUS));
    canvas.fill();

    let size = Pt::from_i32(8);
    let text_width = measure_text_width(FontWeight::Bold, size, label);
    canvas.set_fill_color(Palette::WHITE);
    canvas.set_font(FontWeight::Bold);
    canvas.set_font_size(size);
    canvas.draw_string(
        bx + ((bw - text_width) / 2).max(Pt::ZERO),
        by + Pt::from_i32(3),
        label,
    );
}

fn draw_glyph(canvas: &mut Canvas, glyph: PictogramGlyph, cx: Pt, cy: Pt) {
    let r = Pt::from_f32(PICTOGRAM_RADIUS);
    match glyph.shape() {
        GlyphShape::Circle => canvas.circle_path(cx, cy, r),
        GlyphShape::Triangle => canvas.polygon_path(&[
            (cx, cy - r),
            (cx + r, cy + r * 0.8),
            (cx - r, cy + r * 0.8),
        ]),
        GlyphShape::RoundedRect => {
            canvas.rounded_rect_path(cx - r, cy - r, r * 2, r * 2, Pt::from_i32(3))
        }
    }
    let stroke = glyph.outline().map(|color| Stroke::new(color, 1.0));
    paint(canvas, Some(glyph.fill()), stroke);
}

/// Bounding box of everything a table fragment paints.
pub fn fragment_bounds(fragment: &TableFragment) -> Rect {
    Rect::new(fragment.x, fragment.y, fragment.width(), fragment.height())
}
