//! Second pass over committed pages: running header and footer.
//!
//! Stamping needs the final page count, so it runs once layout is complete.

use crate::layout::{Element, LayoutPage, PageKind, Role, Stroke};
use crate::render::single_line_at;
use crate::style::{FontWeight, Palette, TextAlignMode, TextStyle};
use crate::types::{Margins, Pt, Size};

pub const DEFAULT_FOOTER_TEMPLATE: &str = "Pagina {page} di {pages}";

#[derive(Debug, Clone, PartialEq)]
pub struct RunningElements {
    pub brand: String,
    pub title: String,
    /// `{page}` and `{pages}` are substituted per page.
    pub footer_template: String,
    pub notice: String,
}

impl RunningElements {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            brand: "PALLADIA".to_string(),
            title: title.into(),
            footer_template: DEFAULT_FOOTER_TEMPLATE.to_string(),
            notice: "Riservato".to_string(),
        }
    }

    pub fn with_footer_template(mut self, template: impl Into<String>) -> Self {
        self.footer_template = template.into();
        self
    }
}

pub fn footer_label(template: &str, page: usize, pages: usize) -> String {
    template
        .replace("{page}", &page.to_string())
        .replace("{pages}", &pages.to_string())
}

/// Stamps every content page; the cover keeps its full-bleed layout.
/// Page numbers count the cover. Returns the number of stamped pages.
pub fn stamp_pages(
    pages: &mut [LayoutPage],
    page_size: Size,
    margins: Margins,
    running: &RunningElements,
) -> usize {
    let total = pages.len();
    let mut stamped = 0;
    for (index, page) in pages.iter_mut().enumerate() {
        if page.kind == PageKind::Cover {
            continue;
        }
        page.elements.push(header(page_size, margins, running));
        page.elements.push(footer(page_size, margins, running, index + 1, total));
        stamped += 1;
    }
    stamped
}

fn header(page_size: Size, margins: Margins, running: &RunningElements) -> Element {
    let left = margins.left;
    let width = page_size.width - margins.left - margins.right;
    let y = Pt::from_i32(20);
    let title_style = TextStyle::new(8.0, FontWeight::Regular, Palette::TEXT_GRAY)
        .with_align(TextAlignMode::Right);
    Element::Group {
        role: Role::RunningHeader,
        children: vec![
            Element::Text(single_line_at(
                left,
                y,
                width.mul_ratio(1, 3),
                TextStyle::new(9.0, FontWeight::Bold, Palette::PRIMARY),
                &running.brand,
            )),
            Element::Text(single_line_at(
                left + width.mul_ratio(1, 3),
                y,
                width - width.mul_ratio(1, 3),
                title_style,
                &running.title,
            )),
            Element::hline(
                left,
                left + width,
                Pt::from_i32(36),
                Stroke::new(Palette::ACCENT, 1.0),
            ),
        ],
    }
}

fn footer(
    page_size: Size,
    margins: Margins,
    running: &RunningElements,
    page: usize,
    pages: usize,
) -> Element {
    let left = margins.left;
    let width = page_size.width - margins.left - margins.right;
    let third = width / 3;
    let line_y = page_size.height - Pt::from_i32(50);
    let text_y = page_size.height - Pt::from_i32(38);
    let gray = TextStyle::new(8.0, FontWeight::Regular, Palette::TEXT_GRAY);
    Element::Group {
        role: Role::RunningFooter,
        children: vec![
            Element::hline(left, left + width, line_y, Stroke::new(Palette::PRIMARY, 1.0)),
            Element::Text(single_line_at(
                left,
                text_y,
                third,
                TextStyle::new(8.0, FontWeight::Bold, Palette::PRIMARY),
                &footer_label(&running.footer_template, page, pages),
            )),
            Element::Text(single_line_at(
                left + third,
                text_y,
                third,
                gray.with_align(TextAlignMode::Center),
                &running.title,
            )),
            Element::Text(single_line_at(
                left + third * 2,
                text_y,
                width - third * 2,
                gray.with_align(TextAlignMode::Right),
                &running.notice,
            )),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages() -> Vec<LayoutPage> {
        vec![
            LayoutPage::new(PageKind::Cover),
            LayoutPage::new(PageKind::Content),
            LayoutPage::new(PageKind::Content),
        ]
    }

    #[test]
    fn footer_template_substitutes_both_numbers() {
        assert_eq!(footer_label(DEFAULT_FOOTER_TEMPLATE, 2, 7), "Pagina 2 di 7");
        assert_eq!(footer_label("{page}/{pages}", 3, 3), "3/3");
    }

    #[test]
    fn cover_is_never_stamped() {
        let mut pages = pages();
        let running = RunningElements::new("POS – Scuola – Rev. 1");
        let stamped = stamp_pages(&mut pages, Size::a4(), Margins::pos_default(), &running);
        assert_eq!(stamped, 2);
        assert!(pages[0].elements.is_empty());
        assert_eq!(pages[1].count_role(Role::RunningHeader), 1);
        assert_eq!(pages[2].count_role(Role::RunningFooter), 1);
        assert!(pages[1].contains_text("Pagina 2 di 3"));
        assert!(pages[2].contains_text("Pagina 3 di 3"));
        assert!(pages[2].contains_text("Riservato"));
        assert!(pages[2].contains_text("PALLADIA"));
    }

    #[test]
    fn running_elements_stay_in_the_margins() {
        let mut pages = pages();
        let margins = Margins::pos_default();
        let size = Size::a4();
        stamp_pages(&mut pages, size, margins, &RunningElements::new("POS"));
        for element in &pages[1].elements {
            let Element::Group { children, .. } = element else {
                continue;
            };
            for child in children {
                if let Element::Text(block) = child {
                    let in_top = block.y + block.height() <= margins.top;
                    let in_bottom = block.y >= size.height - margins.bottom;
                    assert!(in_top || in_bottom);
                }
            }
        }
    }
}
