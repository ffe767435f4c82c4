use serde_json::json;

use crate::debug::DebugLogger;
use crate::error::{PosError, Result};
use crate::layout::{Element, LayoutPage, PageKind};
use crate::types::{Margins, Pt, Size};

/// Space a block asks for before it starts drawing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reserves {
    pub content: Pt,
    /// Added to the heading's own height.
    pub heading: Pt,
    pub bullet: Pt,
    pub table_start: Pt,
    pub signature: Pt,
}

impl Default for Reserves {
    fn default() -> Self {
        Self {
            content: Pt::from_i32(30),
            heading: Pt::from_i32(10),
            bullet: Pt::from_i32(20),
            table_start: Pt::from_i32(30),
            signature: Pt::from_i32(140),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowConfig {
    pub page_size: Size,
    pub margins: Margins,
    /// A reserve-driven break only happens once the cursor is this far below the top margin.
    pub min_advance: Pt,
    pub reserves: Reserves,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            page_size: Size::a4(),
            margins: Margins::pos_default(),
            min_advance: Pt::from_i32(40),
            reserves: Reserves::default(),
        }
    }
}

impl FlowConfig {
    pub fn content_left(&self) -> Pt {
        self.margins.left
    }

    pub fn content_width(&self) -> Pt {
        self.page_size.width - self.margins.left - self.margins.right
    }

    pub fn content_top(&self) -> Pt {
        self.margins.top
    }

    pub fn content_bottom(&self) -> Pt {
        self.page_size.height - self.margins.bottom
    }

    pub fn usable_height(&self) -> Pt {
        self.content_bottom() - self.content_top()
    }

    pub fn validate(&self) -> Result<()> {
        if self.content_width() <= Pt::from_i32(100) {
            return Err(PosError::InvalidConfiguration(format!(
                "content width {:.2}pt leaves no room for tables",
                self.content_width().to_f32()
            )));
        }
        if self.usable_height() <= Pt::from_i32(200) {
            return Err(PosError::InvalidConfiguration(format!(
                "usable page height {:.2}pt is too small",
                self.usable_height().to_f32()
            )));
        }
        if self.min_advance < Pt::ZERO || self.min_advance >= self.usable_height() {
            return Err(PosError::InvalidConfiguration(
                "min_advance must lie inside the usable page height".to_string(),
            ));
        }
        let r = &self.reserves;
        for (name, value) in [
            ("content", r.content),
            ("heading", r.heading),
            ("bullet", r.bullet),
            ("table_start", r.table_start),
            ("signature", r.signature),
        ] {
            if value < Pt::ZERO || value >= self.usable_height() {
                return Err(PosError::InvalidConfiguration(format!(
                    "{name} reserve must lie inside the usable page height"
                )));
            }
        }
        Ok(())
    }
}

/// Vertical cursor over a sequence of pages.
///
/// Pages are committed in order and never revisited; the cursor only moves
/// down until the next break resets it to the top margin.
pub struct PageFlow {
    config: FlowConfig,
    pages: Vec<LayoutPage>,
    current: LayoutPage,
    cursor: Pt,
    debug: Option<DebugLogger>,
}

impl PageFlow {
    pub fn new(config: FlowConfig) -> Self {
        Self {
            cursor: config.content_top(),
            config,
            pages: Vec::new(),
            current: LayoutPage::new(PageKind::Content),
            debug: None,
        }
    }

    pub(crate) fn with_debug(mut self, debug: Option<DebugLogger>) -> Self {
        self.debug = debug;
        self
    }

    /// Commits a finished page (the cover) ahead of the flowing content.
    pub fn with_leading_page(mut self, page: LayoutPage) -> Self {
        self.pages.push(page);
        self
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    pub fn cursor(&self) -> Pt {
        self.cursor
    }

    pub fn remaining(&self) -> Pt {
        (self.config.content_bottom() - self.cursor).max(Pt::ZERO)
    }

    /// 1-based number of the page being filled.
    pub fn page_number(&self) -> usize {
        self.pages.len() + 1
    }

    pub fn is_page_empty(&self) -> bool {
        self.current.elements.is_empty()
    }

    pub fn fits(&self, height: Pt) -> bool {
        self.cursor + height <= self.config.content_bottom()
    }

    /// Breaks when fewer than `min_remaining` points are left, unless the
    /// cursor is still within `min_advance` of the top margin.
    pub fn ensure_space(&mut self, min_remaining: Pt, reason: &str) -> bool {
        if self.fits(min_remaining) {
            return false;
        }
        if self.cursor - self.config.content_top() < self.config.min_advance {
            return false;
        }
        self.commit_break(reason)
    }

    pub fn advance(&mut self, amount: Pt) {
        self.cursor += amount;
    }

    /// Unconditional break; a no-op while the current page is still empty.
    pub fn new_page(&mut self, reason: &str) -> bool {
        if self.is_page_empty() {
            self.cursor = self.config.content_top();
            return false;
        }
        self.commit_break(reason)
    }

    pub fn push(&mut self, element: Element) {
        self.current.elements.push(element);
    }

    fn commit_break(&mut self, reason: &str) -> bool {
        let from_page = self.page_number();
        let page = std::mem::replace(&mut self.current, LayoutPage::new(PageKind::Content));
        self.pages.push(page);
        self.cursor = self.config.content_top();
        if let Some(debug) = &self.debug {
            debug.log_event(&json!({
                "type": "layout.page_break",
                "reason": reason,
                "from_page": from_page,
                "to_page": from_page + 1,
            }));
            debug.increment("layout.page_break", 1);
        }
        true
    }

    /// Closes the flow; a trailing empty page is dropped.
    pub fn finish(mut self) -> Vec<LayoutPage> {
        if !self.current.elements.is_empty() {
            self.pages.push(self.current);
        }
        self.pages
    }
}
