mod assets;
mod browser;
mod canvas;
mod debug;
mod doc_template;
mod draw;
mod error;
mod finalize;
mod font;
mod frame;
mod html;
mod inspect;
mod layout;
mod markup;
mod metrics;
mod narrative;
mod pdf;
mod render;
mod risk;
mod signs;
mod style;
mod table;
mod template;
mod types;

pub use assets::{AssetError, ImageHandle, ImageStore};
pub use browser::{
    Browser, BrowserLauncher, BrowserPool, BrowserTab, CHROMIUM_ENV, ChromiumLauncher,
    ConvertOptions, DEFAULT_TIMEOUT, HtmlConverter, TabGuard,
};
pub use canvas::{Canvas, Command, Document, Page};
pub use doc_template::{Assembled, DocTemplate, cover_from_site, document_title};
pub use draw::draw_document;
pub use error::{PosError, Result};
pub use finalize::{DEFAULT_FOOTER_TEMPLATE, RunningElements};
pub use frame::{FlowConfig, Reserves};
pub use html::{HeaderFooter, HeaderFooterMode, RenderedHtml, render_html};
pub use inspect::{InspectError, InspectErrorCode, PdfReport, inspect_pdf_bytes, require_printable};
pub use layout::{CellContent, Element, LayoutDocument, LayoutPage, PageKind, Role};
pub use markup::{Block, RichText, TableBlock, tokenize};
pub use metrics::{DocumentMetrics, PageMetrics};
pub use narrative::{DEFAULT_KEEP_ALIVE, StreamEvent, consume_token_stream};
pub use pdf::{PdfInfo, PdfOutput, document_to_pdf};
pub use render::{CoverData, RenderOptions};
pub use risk::RiskTier;
pub use signs::{Sign, Zone};
pub use template::{PLACEHOLDER, SiteData, Worker, build_document_source, placeholder};
pub use types::{Color, Margins, Pt, Rect, Size};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use debug::DebugLogger;

/// Which path turns the layout into PDF bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// Vector drawing straight into PDF content streams.
    #[default]
    Direct,
    /// HTML handed to an external converter.
    Html,
}

/// Everything one generation needs, as received from the request layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GenerationRequest {
    pub site: SiteData,
    pub revision: Option<String>,
    /// Generated risk narrative; `None` leaves a visible callout in its section.
    pub narrative: Option<String>,
    pub signs: Vec<Sign>,
    /// Defaults to today's local date.
    pub issued_on: Option<NaiveDate>,
}

impl GenerationRequest {
    pub fn new(site: SiteData) -> Self {
        Self {
            site,
            ..Self::default()
        }
    }

    pub fn revision(&self) -> &str {
        template::present(self.revision.as_deref()).unwrap_or("1")
    }

    pub fn issued_on(&self) -> NaiveDate {
        self.issued_on
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }
}

#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub pdf: Vec<u8>,
    pub page_count: usize,
    pub metrics: DocumentMetrics,
}

pub struct Palladia {
    flow: FlowConfig,
    backend: Backend,
    header_footer: HeaderFooterMode,
    render_options: RenderOptions,
    image_grid: bool,
    footer_template: Option<String>,
    timeout: Duration,
    debug: Option<DebugLogger>,
    converter: Option<Arc<dyn HtmlConverter>>,
}

#[derive(Clone)]
pub struct PalladiaBuilder {
    flow: FlowConfig,
    backend: Backend,
    header_footer: HeaderFooterMode,
    render_options: RenderOptions,
    image_grid: bool,
    footer_template: Option<String>,
    timeout: Duration,
    debug_path: Option<PathBuf>,
    converter: Option<Arc<dyn HtmlConverter>>,
}

impl Palladia {
    pub fn builder() -> PalladiaBuilder {
        PalladiaBuilder::new()
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn flow_config(&self) -> &FlowConfig {
        &self.flow
    }

    /// The Markdown-like source the layout engine consumes for `request`.
    pub fn document_source(&self, request: &GenerationRequest) -> String {
        build_document_source(
            &request.site,
            request.revision(),
            request.narrative.as_deref(),
            request.issued_on(),
        )
    }

    pub fn layout(&self, request: &GenerationRequest) -> Result<LayoutDocument> {
        Ok(self.layout_with_assets(request)?.document)
    }

    /// Layout plus the decoded sign images and per-page metrics.
    pub fn layout_with_assets(&self, request: &GenerationRequest) -> Result<Assembled> {
        let source = self.document_source(request);
        self.layout_source(request, &source)
    }

    /// Lays out an already assembled source with the cover and title derived from `request`.
    pub fn layout_source(&self, request: &GenerationRequest, source: &str) -> Result<Assembled> {
        let revision = request.revision();
        let title = document_title(request.site.site_name.as_deref(), revision);
        let cover = cover_from_site(&request.site, revision, request.issued_on());
        let mut template = DocTemplate::new(self.flow, title, cover, source)
            .with_signs(request.signs.clone())
            .with_options(self.render_options)
            .with_image_grid(self.image_grid)
            .with_debug(self.debug.clone());
        if let Some(footer) = &self.footer_template {
            template = template.with_footer_template(footer.clone());
        }
        template.build_with_assets()
    }

    pub fn render_html(&self, request: &GenerationRequest) -> Result<String> {
        Ok(self.render_html_with_templates(request)?.html)
    }

    /// The markup together with the header/footer instructions for the converter.
    pub fn render_html_with_templates(&self, request: &GenerationRequest) -> Result<RenderedHtml> {
        let assembled = self.layout_with_assets(request)?;
        Ok(self.html_for(&assembled))
    }

    pub fn render_pdf(&self, request: &GenerationRequest) -> Result<Vec<u8>> {
        Ok(self.render_pdf_with_metrics(request)?.pdf)
    }

    pub fn render_pdf_with_metrics(&self, request: &GenerationRequest) -> Result<RenderOutput> {
        let assembled = self.layout_with_assets(request)?;
        self.render_assembled(assembled)
    }

    pub fn render_assembled(&self, assembled: Assembled) -> Result<RenderOutput> {
        let started = Instant::now();
        let Assembled {
            document,
            images,
            mut metrics,
        } = assembled;
        let pdf = match self.backend {
            Backend::Direct => {
                let canvas = draw_document(&document);
                let output = document_to_pdf(&canvas, &images, &PdfInfo::new(&document.title))?;
                for (page, bytes) in metrics.pages.iter_mut().zip(&output.page_content_bytes) {
                    page.content_bytes = *bytes;
                }
                output.bytes
            }
            Backend::Html => {
                let converter = self.converter.as_ref().ok_or_else(|| {
                    PosError::InvalidConfiguration("html backend has no converter".to_string())
                })?;
                let rendered = html::render_html(
                    &document,
                    &images,
                    self.header_footer,
                    &self.running(&document.title),
                );
                let margins = match rendered.header_footer {
                    HeaderFooter::Native { .. } => document.margins,
                    HeaderFooter::InlineFixed => Margins::all(0.0),
                };
                let options = ConvertOptions::new(document.page_size, margins, rendered.header_footer)
                    .with_timeout(self.timeout);
                converter.convert(&rendered.html, &options)?
            }
        };
        metrics.total_bytes = pdf.len();
        if let Some(logger) = &self.debug {
            logger.log_event(&json!({
                "type": "render.finish",
                "backend": format!("{:?}", self.backend),
                "pages": document.page_count(),
                "bytes": pdf.len(),
                "render_ms": started.elapsed().as_secs_f64() * 1000.0,
            }));
            logger.flush();
        }
        Ok(RenderOutput {
            pdf,
            page_count: document.page_count(),
            metrics,
        })
    }

    fn html_for(&self, assembled: &Assembled) -> RenderedHtml {
        html::render_html(
            &assembled.document,
            &assembled.images,
            self.header_footer,
            &self.running(&assembled.document.title),
        )
    }

    fn running(&self, title: &str) -> RunningElements {
        let running = RunningElements::new(title);
        match &self.footer_template {
            Some(template) => running.with_footer_template(template.clone()),
            None => running,
        }
    }
}

impl Default for PalladiaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PalladiaBuilder {
    pub fn new() -> Self {
        Self {
            flow: FlowConfig::default(),
            backend: Backend::Direct,
            header_footer: HeaderFooterMode::default(),
            render_options: RenderOptions::default(),
            image_grid: true,
            footer_template: None,
            timeout: DEFAULT_TIMEOUT,
            debug_path: None,
            converter: None,
        }
    }

    pub fn page_size(mut self, size: Size) -> Self {
        self.flow.page_size = size;
        self
    }

    pub fn margins(mut self, margins: Margins) -> Self {
        self.flow.margins = margins;
        self
    }

    /// Distance below the top margin the cursor must reach before a reserve can break the page.
    pub fn min_advance(mut self, points: f32) -> Self {
        self.flow.min_advance = Pt::from_f32(points);
        self
    }

    pub fn reserves(mut self, reserves: Reserves) -> Self {
        self.flow.reserves = reserves;
        self
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn header_footer(mut self, mode: HeaderFooterMode) -> Self {
        self.header_footer = mode;
        self
    }

    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    pub fn image_grid(mut self, enabled: bool) -> Self {
        self.image_grid = enabled;
        self
    }

    pub fn emergency_grid(mut self, enabled: bool) -> Self {
        self.render_options.emergency_grid = enabled;
        self
    }

    pub fn footer_template(mut self, template: impl Into<String>) -> Self {
        self.footer_template = Some(template.into());
        self
    }

    pub fn converter_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replaces the Chromium pool used by [`Backend::Html`].
    pub fn converter(mut self, converter: Arc<dyn HtmlConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn build(self) -> Result<Palladia> {
        self.flow.validate()?;
        if self.timeout.is_zero() {
            return Err(PosError::InvalidConfiguration(
                "converter timeout must be positive".to_string(),
            ));
        }
        if let Some(template) = &self.footer_template {
            if !template.contains("{page}") {
                return Err(PosError::InvalidConfiguration(
                    "footer template must contain {page}".to_string(),
                ));
            }
        }
        // Command-line Chromium cannot take the page-number templates Native mode relies on.
        if self.backend == Backend::Html
            && self.header_footer == HeaderFooterMode::Native
            && self.converter.is_none()
        {
            return Err(PosError::InvalidConfiguration(
                "native header/footer needs a converter that accepts templates; \
                 use InlineFixed with the built-in Chromium launcher"
                    .to_string(),
            ));
        }
        let converter = match (self.backend, self.converter) {
            (Backend::Html, None) => {
                let launcher = ChromiumLauncher::locate()?;
                log::info!("html backend uses {}", launcher.executable().display());
                Some(Arc::new(BrowserPool::new(launcher)) as Arc<dyn HtmlConverter>)
            }
            (_, converter) => converter,
        };
        let debug = match &self.debug_path {
            Some(path) => Some(DebugLogger::new(path)?),
            None => None,
        };
        Ok(Palladia {
            flow: self.flow,
            backend: self.backend,
            header_footer: self.header_footer,
            render_options: self.render_options,
            image_grid: self.image_grid,
            footer_template: self.footer_template,
            timeout: self.timeout,
            debug,
            converter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn request() -> GenerationRequest {
        let site = SiteData {
            site_name: Some("Ampliamento Scuola Manzoni".to_string()),
            company_name: Some("Edil Rossi S.r.l.".to_string()),
            company_vat: Some("01234567890".to_string()),
            client: Some("Comune di Bergamo".to_string()),
            ..SiteData::default()
        };
        GenerationRequest {
            revision: Some("2".to_string()),
            narrative: Some(
                "## RISCHI SPECIFICI\n| Attività | Rischio | Livello |\n|---|---|---|\n\
                 | Scavi | Seppellimento | ALTO |\n| Ponteggi | Caduta dall'alto | MEDIO |"
                    .to_string(),
            ),
            issued_on: NaiveDate::from_ymd_opt(2026, 10, 16),
            ..GenerationRequest::new(site)
        }
    }

    /// Records the options it was called with and answers with a direct-backend PDF.
    struct RecordingConverter {
        seen: Mutex<Vec<ConvertOptions>>,
        html_len: Mutex<usize>,
    }

    impl HtmlConverter for RecordingConverter {
        fn convert(&self, html: &str, options: &ConvertOptions) -> Result<Vec<u8>> {
            self.seen.lock().expect("lock").push(options.clone());
            *self.html_len.lock().expect("lock") = html.len();
            let canvas = Canvas::new(options.page_size).finish("converted");
            Ok(document_to_pdf(&canvas, &ImageStore::new(), &PdfInfo::new("converted"))?.bytes)
        }
    }

    #[test]
    fn direct_backend_produces_a_readable_pdf() {
        let engine = Palladia::builder().build().expect("engine");
        let output = engine.render_pdf_with_metrics(&request()).expect("render");
        let report = inspect_pdf_bytes(&output.pdf).expect("inspect");
        assert_eq!(report.page_count, output.page_count);
        assert!(output.page_count >= 3);
        assert_eq!(output.metrics.total_bytes, output.pdf.len());
        assert!(output.metrics.pages.iter().all(|p| p.content_bytes > 0));
        assert_eq!(
            report.title.as_deref(),
            Some("POS \u{2013} Ampliamento Scuola Manzoni \u{2013} Rev. 2")
        );
    }

    #[test]
    fn layout_contains_narrative_and_site_data() {
        let engine = Palladia::builder().build().expect("engine");
        let document = engine.layout(&request()).expect("layout");
        assert_eq!(document.pages[0].kind, PageKind::Cover);
        assert!(document.contains_text("Seppellimento"));
        assert!(document.contains_text("Edil Rossi S.r.l."));
    }

    #[test]
    fn missing_narrative_leaves_a_callout() {
        let engine = Palladia::builder().build().expect("engine");
        let mut request = request();
        request.narrative = None;
        let source = engine.document_source(&request);
        assert!(source.contains(template::MISSING_NARRATIVE));
    }

    #[test]
    fn html_backend_passes_templates_and_margins_to_the_converter() {
        let converter = Arc::new(RecordingConverter {
            seen: Mutex::new(Vec::new()),
            html_len: Mutex::new(0),
        });
        let engine = Palladia::builder()
            .backend(Backend::Html)
            .header_footer(HeaderFooterMode::Native)
            .converter_timeout(Duration::from_secs(5))
            .converter(converter.clone())
            .build()
            .expect("engine");
        let pdf = engine.render_pdf(&request()).expect("render");
        assert!(pdf.starts_with(b"%PDF"));
        assert!(*converter.html_len.lock().expect("lock") > 0);

        let seen = converter.seen.lock().expect("lock");
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].timeout, Duration::from_secs(5));
        assert_eq!(seen[0].margins, Margins::pos_default());
        match &seen[0].header_footer {
            HeaderFooter::Native {
                footer_template, ..
            } => assert!(footer_template.contains("totalPages")),
            other => panic!("unexpected header/footer {:?}", other),
        }
    }

    #[test]
    fn inline_html_uses_full_page_sections() {
        let converter = Arc::new(RecordingConverter {
            seen: Mutex::new(Vec::new()),
            html_len: Mutex::new(0),
        });
        let engine = Palladia::builder()
            .backend(Backend::Html)
            .converter(converter.clone())
            .build()
            .expect("engine");
        engine.render_pdf(&request()).expect("render");
        let seen = converter.seen.lock().expect("lock");
        assert_eq!(seen[0].header_footer, HeaderFooter::InlineFixed);
        assert_eq!(seen[0].margins, Margins::all(0.0));

        let html = engine.render_html(&request()).expect("html");
        assert!(html.contains("PALLADIA"));
        let rendered = engine.render_html_with_templates(&request()).expect("html");
        assert_eq!(rendered.header_footer, HeaderFooter::InlineFixed);
    }

    #[test]
    fn builder_rejects_invalid_configuration() {
        let err = Palladia::builder()
            .margins(Margins::all(280.0))
            .build()
            .err()
            .expect("margins");
        assert!(matches!(err, PosError::InvalidConfiguration(_)));

        let err = Palladia::builder()
            .converter_timeout(Duration::ZERO)
            .build()
            .err()
            .expect("timeout");
        assert!(matches!(err, PosError::InvalidConfiguration(_)));

        let err = Palladia::builder()
            .footer_template("Pagina")
            .build()
            .err()
            .expect("footer");
        assert!(matches!(err, PosError::InvalidConfiguration(_)));
    }

    #[test]
    fn native_header_footer_needs_a_template_aware_converter() {
        let err = Palladia::builder()
            .backend(Backend::Html)
            .header_footer(HeaderFooterMode::Native)
            .build()
            .err()
            .expect("native without converter");
        assert!(matches!(err, PosError::InvalidConfiguration(ref m) if m.contains("native")));

        let engine = Palladia::builder()
            .header_footer(HeaderFooterMode::Native)
            .build()
            .expect("direct backend ignores the html mode");
        assert_eq!(engine.backend(), Backend::Direct);
    }

    #[test]
    fn debug_log_records_layout_and_render() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("palladia.jsonl");
        let engine = Palladia::builder().debug_log(&path).build().expect("engine");
        engine.render_pdf(&request()).expect("render");
        let log = std::fs::read_to_string(&path).expect("log");
        assert!(log.contains("\"layout.finish\""));
        assert!(log.contains("\"render.finish\""));
    }

    #[test]
    fn request_deserializes_from_json() {
        let request: GenerationRequest = serde_json::from_value(json!({
            "site": {
                "siteName": "Via Roma 12",
                "companyName": "N/A",
                "numWorkers": 4
            },
            "revision": "3",
            "issuedOn": "2026-10-16",
            "signs": [
                { "path": "signs/casco.jpg", "name": "casco.jpg", "category": "obbligo", "zone": "ingresso" }
            ]
        }))
        .expect("request");
        assert_eq!(request.revision(), "3");
        assert_eq!(request.issued_on(), NaiveDate::from_ymd_opt(2026, 10, 16).expect("date"));
        assert_eq!(request.site.site_name.as_deref(), Some("Via Roma 12"));
        assert_eq!(request.signs.len(), 1);
        assert!(request.narrative.is_none());
        assert_eq!(GenerationRequest::default().revision(), "1");
    }
}
