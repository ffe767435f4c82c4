use crate::layout::{LayoutDocument, PageKind};

#[derive(Debug, Clone, PartialEq)]
pub struct PageMetrics {
    pub page_number: usize,
    pub kind: PageKind,
    pub element_count: usize,
    pub table_fragments: usize,
    pub table_rows: usize,
    /// Size of the page's PDF content stream; zero until the PDF backend runs.
    pub content_bytes: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentMetrics {
    pub pages: Vec<PageMetrics>,
    pub layout_ms: f64,
    pub total_bytes: usize,
}

impl DocumentMetrics {
    pub fn from_layout(document: &LayoutDocument, layout_ms: f64) -> Self {
        let pages = document
            .pages
            .iter()
            .enumerate()
            .map(|(index, page)| {
                let fragments: Vec<_> = page.table_fragments().collect();
                PageMetrics {
                    page_number: index + 1,
                    kind: page.kind,
                    element_count: page.elements.len(),
                    table_fragments: fragments.len(),
                    table_rows: fragments.iter().map(|f| f.rows.len()).sum(),
                    content_bytes: 0,
                }
            })
            .collect();
        Self {
            pages,
            layout_ms,
            total_bytes: 0,
        }
    }

    pub fn table_fragments(&self) -> usize {
        self.pages.iter().map(|p| p.table_fragments).sum()
    }

    pub fn element_count(&self) -> usize {
        self.pages.iter().map(|p| p.element_count).sum()
    }
}
