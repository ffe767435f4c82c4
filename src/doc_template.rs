use chrono::NaiveDate;
use serde_json::json;
use std::time::Instant;

use crate::assets::ImageStore;
use crate::debug::DebugLogger;
use crate::error::Result;
use crate::finalize::{RunningElements, stamp_pages};
use crate::frame::{FlowConfig, PageFlow};
use crate::layout::LayoutDocument;
use crate::markup::tokenize;
use crate::metrics::DocumentMetrics;
use crate::render::{
    CoverData, RenderContext, RenderOptions, render_blocks, render_cover, render_signature_page,
};
use crate::signs::{Sign, render_appendix};
use crate::template::{SiteData, placeholder, present};

/// A laid-out document with the images its pages reference.
#[derive(Debug)]
pub struct Assembled {
    pub document: LayoutDocument,
    pub images: ImageStore,
    pub metrics: DocumentMetrics,
}

/// "POS – {site} – Rev. {rev}", shown in the running header and footer.
pub fn document_title(site_name: Option<&str>, revision: &str) -> String {
    format!("POS \u{2013} {} \u{2013} Rev. {}", placeholder(site_name), revision)
}

/// Cover rows in display order; absent values are dropped by [`CoverData::new`].
pub fn cover_from_site(data: &SiteData, revision: &str, issued_on: NaiveDate) -> CoverData {
    let period = match (
        present(data.start_date.as_deref()),
        present(data.end_date.as_deref()),
    ) {
        (Some(start), Some(end)) => Some(format!("{start} \u{2013} {end}")),
        _ => None,
    };
    CoverData::new(
        revision,
        vec![
            ("Cantiere", data.site_name.clone()),
            ("Indirizzo", data.site_address.clone()),
            ("Committente", data.client.clone()),
            ("Natura lavori", data.work_type.clone()),
            ("Impresa esecutrice", data.company_name.clone()),
            ("P.IVA", data.company_vat.clone()),
            ("Periodo", period),
        ],
        issued_on.format("%d/%m/%Y").to_string(),
    )
}

/// Runs cover, content, appendix, signature page and stamping in that order.
pub struct DocTemplate {
    config: FlowConfig,
    title: String,
    cover: CoverData,
    source: String,
    signs: Vec<Sign>,
    options: RenderOptions,
    image_grid: bool,
    footer_template: Option<String>,
    debug: Option<DebugLogger>,
}

impl DocTemplate {
    pub fn new(config: FlowConfig, title: impl Into<String>, cover: CoverData, source: impl Into<String>) -> Self {
        Self {
            config,
            title: title.into(),
            cover,
            source: source.into(),
            signs: Vec::new(),
            options: RenderOptions::default(),
            image_grid: true,
            footer_template: None,
            debug: None,
        }
    }

    pub fn with_signs(mut self, signs: Vec<Sign>) -> Self {
        self.signs = signs;
        self
    }

    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_image_grid(mut self, enabled: bool) -> Self {
        self.image_grid = enabled;
        self
    }

    pub fn with_footer_template(mut self, template: impl Into<String>) -> Self {
        self.footer_template = Some(template.into());
        self
    }

    pub(crate) fn with_debug(mut self, debug: Option<DebugLogger>) -> Self {
        self.debug = debug;
        self
    }

    pub fn build(self) -> Result<LayoutDocument> {
        Ok(self.build_with_assets()?.document)
    }

    pub fn build_with_assets(self) -> Result<Assembled> {
        self.config.validate()?;
        let started = Instant::now();
        let debug = self.debug.clone();
        let blocks = tokenize(&self.source);
        if let Some(logger) = &debug {
            logger.log_event(&json!({
                "type": "layout.start",
                "title": self.title,
                "blocks": blocks.len(),
                "signs": self.signs.len(),
            }));
            for block in &blocks {
                logger.increment(&format!("block.{}", block.kind()), 1);
            }
        }

        let cover = render_cover(self.config.page_size, self.config.margins.left, &self.cover);
        let mut flow = PageFlow::new(self.config)
            .with_debug(debug.clone())
            .with_leading_page(cover);
        let ctx = RenderContext::for_flow(&flow);
        render_blocks(&mut flow, &blocks, &self.options);

        let mut images = ImageStore::new();
        if !self.signs.is_empty() {
            let store = self.image_grid.then_some(&mut images);
            render_appendix(&mut flow, ctx, &self.signs, store);
        }
        if !self.source.contains("FIRME") {
            render_signature_page(&mut flow, ctx);
        }

        let mut pages = flow.finish();
        let mut running = RunningElements::new(self.title.clone());
        if let Some(template) = self.footer_template {
            running = running.with_footer_template(template);
        }
        let stamped = stamp_pages(&mut pages, self.config.page_size, self.config.margins, &running);

        let document = LayoutDocument {
            page_size: self.config.page_size,
            margins: self.config.margins,
            title: self.title,
            pages,
        };
        let layout_ms = started.elapsed().as_secs_f64() * 1000.0;
        let metrics = DocumentMetrics::from_layout(&document, layout_ms);
        if let Some(logger) = &debug {
            logger.log_event(&json!({
                "type": "layout.finish",
                "pages": document.page_count(),
                "stamped": stamped,
                "table_fragments": metrics.table_fragments(),
                "images": images.len(),
                "layout_ms": layout_ms,
            }));
            logger.emit_summary("layout");
            logger.flush();
        }
        Ok(Assembled {
            document,
            images,
            metrics,
        })
    }
}
