use lopdf::{Document as LoDocument, Object};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InspectErrorCode {
    ParseFailed,
    Encrypted,
    NoPages,
}

impl InspectErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InspectErrorCode::ParseFailed => "PDF_PARSE_FAILED",
            InspectErrorCode::Encrypted => "PDF_ENCRYPTED",
            InspectErrorCode::NoPages => "PDF_NO_PAGES",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectError {
    pub code: InspectErrorCode,
    pub message: String,
}

impl std::fmt::Display for InspectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for InspectError {}

/// What a finished document looks like from the outside.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfReport {
    pub pdf_version: String,
    pub page_count: usize,
    pub encrypted: bool,
    pub byte_len: usize,
    /// MediaBox width and height of the first page, in points.
    pub first_page_size: Option<(f32, f32)>,
    pub title: Option<String>,
}

pub fn inspect_pdf_bytes(bytes: &[u8]) -> Result<PdfReport, InspectError> {
    let pdf = LoDocument::load_mem(bytes).map_err(|err| InspectError {
        code: InspectErrorCode::ParseFailed,
        message: err.to_string(),
    })?;
    let pages = pdf.get_pages();
    let first_page_size = pages
        .values()
        .next()
        .and_then(|id| pdf.get_dictionary(*id).ok())
        .and_then(|page| page.get(b"MediaBox").ok())
        .and_then(|media_box| media_box.as_array().ok())
        .and_then(|values| media_box_size(values));

    Ok(PdfReport {
        pdf_version: pdf.version.clone(),
        page_count: pages.len(),
        encrypted: pdf.is_encrypted(),
        byte_len: bytes.len(),
        first_page_size,
        title: info_title(&pdf),
    })
}

/// Checks that converter output is a document a reader can open and print.
pub fn require_printable(report: &PdfReport) -> Result<(), InspectError> {
    if report.encrypted {
        return Err(InspectError {
            code: InspectErrorCode::Encrypted,
            message: "encrypted output is not accepted".to_string(),
        });
    }
    if report.page_count == 0 {
        return Err(InspectError {
            code: InspectErrorCode::NoPages,
            message: "document has no pages".to_string(),
        });
    }
    Ok(())
}

fn media_box_size(values: &[Object]) -> Option<(f32, f32)> {
    let number = |object: &Object| match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value),
        _ => None,
    };
    match values {
        [x0, y0, x1, y1] => {
            Some((number(x1)? - number(x0)?, number(y1)? - number(y0)?))
        }
        _ => None,
    }
}

fn info_title(pdf: &LoDocument) -> Option<String> {
    let info = match pdf.trailer.get(b"Info").ok()? {
        Object::Reference(id) => pdf.get_dictionary(*id).ok()?,
        Object::Dictionary(dict) => dict,
        _ => return None,
    };
    let raw = info.get(b"Title").ok()?.as_str().ok()?;
    Some(decode_text_string(raw))
}

fn decode_text_string(raw: &[u8]) -> String {
    if let Some(utf16) = raw.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    raw.iter().map(|b| *b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Canvas;
    use crate::pdf::{PdfInfo, document_to_pdf};
    use crate::types::{Pt, Size};

    fn sample_pdf(title: &str, pages: usize) -> Vec<u8> {
        let mut canvas = Canvas::new(Size::a4());
        for n in 0..pages {
            canvas.draw_string(Pt::from_i32(50), Pt::from_i32(80), format!("Pagina {}", n + 1));
            canvas.show_page();
        }
        document_to_pdf(
            &canvas.finish(title),
            &crate::assets::ImageStore::new(),
            &PdfInfo::new(title),
        )
        .expect("pdf")
        .bytes
    }

    #[test]
    fn report_reads_pages_size_and_title() {
        let bytes = sample_pdf("POS – Cantiere Via Roma", 3);
        let report = inspect_pdf_bytes(&bytes).expect("inspect");
        assert_eq!(report.page_count, 3);
        assert_eq!(report.byte_len, bytes.len());
        assert!(!report.encrypted);
        let (width, height) = report.first_page_size.expect("media box");
        assert!((width - 595.28).abs() < 0.01);
        assert!((height - 841.89).abs() < 0.01);
        assert_eq!(report.title.as_deref(), Some("POS – Cantiere Via Roma"));
        require_printable(&report).expect("printable");
    }

    #[test]
    fn malformed_bytes_fail_to_parse() {
        let err = inspect_pdf_bytes(b"<html>oops</html>").expect_err("invalid");
        assert_eq!(err.code, InspectErrorCode::ParseFailed);
    }

    #[test]
    fn empty_or_encrypted_reports_are_not_printable() {
        let mut report = PdfReport {
            pdf_version: "1.7".to_string(),
            page_count: 0,
            encrypted: false,
            byte_len: 10,
            first_page_size: None,
            title: None,
        };
        assert_eq!(
            require_printable(&report).expect_err("no pages").code,
            InspectErrorCode::NoPages
        );
        report.page_count = 2;
        report.encrypted = true;
        assert_eq!(
            require_printable(&report).expect_err("encrypted").code,
            InspectErrorCode::Encrypted
        );
    }
}
