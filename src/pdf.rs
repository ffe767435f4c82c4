//! Direct PDF writer for the canvas command stream.
//!
//! Objects are formatted as strings and laid out in a fixed order: catalog,
//! page tree, the two base-14 fonts, image XObjects, then one page and one
//! content stream per canvas page, and the info dictionary last.

use fixed::types::I32F32;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fmt::Write as _;

use crate::assets::{AlphaPlane, ImageData, ImageStore};
use crate::canvas::{Command, Document, Page};
use crate::error::{PosError, Result};
use crate::style::FontWeight;
use crate::types::{Color, Pt};

const PDF_HEADER: &[u8] = b"%PDF-1.7\n";

/// Document information dictionary entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfInfo {
    pub title: String,
    pub author: String,
    pub subject: String,
}

impl PdfInfo {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            author: "Palladia".to_string(),
            subject: "Piano Operativo di Sicurezza".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PdfOutput {
    pub bytes: Vec<u8>,
    /// Uncompressed content stream size per page, in page order.
    pub page_content_bytes: Vec<usize>,
}

pub fn document_to_pdf(document: &Document, images: &ImageStore, info: &PdfInfo) -> Result<PdfOutput> {
    let page_size = document.page_size;
    if page_size.width <= Pt::ZERO || page_size.height <= Pt::ZERO {
        return Err(PosError::Pdf(format!(
            "page size must be positive, got {} x {}",
            fmt_pt(page_size.width),
            fmt_pt(page_size.height)
        )));
    }
    if document.pages.is_empty() {
        return Err(PosError::Pdf("document has no pages".to_string()));
    }

    let mut objects: Vec<String> = Vec::new();
    let catalog_id = push_placeholder(&mut objects);
    let pages_id = push_placeholder(&mut objects);
    let regular_id = push_object(&mut objects, font_object(FontWeight::Regular.pdf_name()));
    let bold_id = push_object(&mut objects, font_object(FontWeight::Bold.pdf_name()));

    let mut image_map: HashMap<String, String> = HashMap::new();
    let mut image_resources: Vec<(String, usize)> = Vec::new();
    for stored in images.images() {
        let smask_id = stored
            .pdf
            .alpha
            .as_ref()
            .map(|alpha| push_object(&mut objects, image_smask_object(alpha)));
        let image_id = push_object(&mut objects, image_object(&stored.pdf, smask_id));
        image_map.insert(stored.handle.id.clone(), stored.handle.id.clone());
        image_resources.push((stored.handle.id.clone(), image_id));
    }

    let contents: Vec<String> = document
        .pages
        .par_iter()
        .map(|page| render_page(page, page_size.height, &image_map))
        .collect();

    let resources = format!(
        "<< /Font {} /XObject {} >>",
        font_resources(&[("F1".to_string(), regular_id), ("F2".to_string(), bold_id)]),
        xobject_resources(&image_resources)
    );
    let media_box = format!(
        "[0 0 {} {}]",
        fmt_pt(page_size.width),
        fmt_pt(page_size.height)
    );
    let mut page_ids = Vec::with_capacity(contents.len());
    let mut page_content_bytes = Vec::with_capacity(contents.len());
    for content in &contents {
        page_content_bytes.push(content.len());
        let content_id = push_object(&mut objects, stream_object(content));
        let page_id = push_object(
            &mut objects,
            format!(
                "<< /Type /Page /Parent {} 0 R /MediaBox {} /Resources {} /Contents {} 0 R >>",
                pages_id, media_box, resources, content_id
            ),
        );
        page_ids.push(page_id);
    }

    let kids = page_ids
        .iter()
        .map(|id| format!("{} 0 R", id))
        .collect::<Vec<_>>()
        .join(" ");
    objects[pages_id - 1] = format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids,
        page_ids.len()
    );
    objects[catalog_id - 1] = format!("<< /Type /Catalog /Pages {} 0 R >>", pages_id);
    let info_id = push_object(&mut objects, info_object(info));

    Ok(PdfOutput {
        bytes: build_pdf(&objects, catalog_id, Some(info_id)),
        page_content_bytes,
    })
}

fn push_object(objects: &mut Vec<String>, body: String) -> usize {
    objects.push(body);
    objects.len()
}

fn push_placeholder(objects: &mut Vec<String>) -> usize {
    push_object(objects, String::new())
}

fn font_resource(font: FontWeight) -> &'static str {
    match font {
        FontWeight::Regular => "F1",
        FontWeight::Bold => "F2",
    }
}

fn render_page(page: &Page, page_height: Pt, image_map: &HashMap<String, String>) -> String {
    let mut out = String::new();
    let mut current_font_size = Pt::from_i32(12);
    let mut current_font = FontWeight::Regular;

    for cmd in &page.commands {
        match cmd {
            Command::SaveState => out.push_str("q\n"),
            Command::RestoreState => out.push_str("Q\n"),
            Command::SetFillColor(color) => out.push_str(&color_to_pdf_fill(*color)),
            Command::SetStrokeColor(color) => out.push_str(&color_to_pdf_stroke(*color)),
            Command::SetLineWidth(width) => {
                let _ = writeln!(out, "{} w", fmt_pt(*width));
            }
            Command::SetFont(font) => current_font = *font,
            Command::SetFontSize(size) => current_font_size = *size,
            Command::ClipRect {
                x,
                y,
                width,
                height,
            } => {
                let _ = write!(
                    out,
                    "{} {} {} {} re\nW\nn\n",
                    fmt_pt(*x),
                    fmt_pt(page_height - *y - *height),
                    fmt_pt(*width),
                    fmt_pt(*height)
                );
            }
            Command::MoveTo { x, y } => {
                let _ = writeln!(out, "{} {} m", fmt_pt(*x), fmt_pt(page_height - *y));
            }
            Command::LineTo { x, y } => {
                let _ = writeln!(out, "{} {} l", fmt_pt(*x), fmt_pt(page_height - *y));
            }
            Command::CurveTo {
                x1,
                y1,
                x2,
                y2,
                x,
                y,
            } => {
                let _ = writeln!(
                    out,
                    "{} {} {} {} {} {} c",
                    fmt_pt(*x1),
                    fmt_pt(page_height - *y1),
                    fmt_pt(*x2),
                    fmt_pt(page_height - *y2),
                    fmt_pt(*x),
                    fmt_pt(page_height - *y),
                );
            }
            Command::ClosePath => out.push_str("h\n"),
            Command::Fill => out.push_str("f\n"),
            Command::Stroke => out.push_str("S\n"),
            Command::FillStroke => out.push_str("B\n"),
            Command::DrawString { x, y, text } => {
                let encoded = encode_winansi_pdf_string(text);
                if encoded.replaced > 0 {
                    log::debug!(
                        "{} character(s) outside WinAnsi replaced in {:?}",
                        encoded.replaced,
                        text
                    );
                }
                let _ = write!(
                    out,
                    "BT\n/{} {} Tf\n{} {} Td\n({}) Tj\nET\n",
                    font_resource(current_font),
                    fmt_pt(current_font_size),
                    fmt_pt(*x),
                    fmt_pt(page_height - *y - current_font_size),
                    encoded.text
                );
            }
            Command::DrawRect {
                x,
                y,
                width,
                height,
            } => {
                let _ = write!(
                    out,
                    "{} {} {} {} re\nf\n",
                    fmt_pt(*x),
                    fmt_pt(page_height - *y - *height),
                    fmt_pt(*width),
                    fmt_pt(*height)
                );
            }
            Command::DrawImage {
                x,
                y,
                width,
                height,
                resource_id,
            } => {
                if let Some(name) = image_map.get(resource_id) {
                    let _ = write!(
                        out,
                        "q\n{} 0 0 {} {} {} cm\n/{} Do\nQ\n",
                        fmt_pt(*width),
                        fmt_pt(*height),
                        fmt_pt(*x),
                        fmt_pt(page_height - *y - *height),
                        name
                    );
                } else {
                    log::warn!("image {} is not in the store; skipped", resource_id);
                }
            }
        }
    }

    out
}

fn image_object(image: &ImageData, smask_id: Option<usize>) -> String {
    let stream_data = encode_stream_data(&image.data);
    let filters = match image.filter {
        "/DCTDecode" => "[/ASCIIHexDecode /DCTDecode]",
        _ => "[/ASCIIHexDecode /FlateDecode]",
    };
    let smask = smask_id
        .map(|id| format!(" /SMask {} 0 R", id))
        .unwrap_or_default();
    format!(
        "<< /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace {} /BitsPerComponent {} /Length {} /Filter {}{} >>
stream
{}
endstream",
        image.width,
        image.height,
        image.color_space,
        image.bits_per_component,
        stream_data.len(),
        filters,
        smask,
        stream_data
    )
}

fn image_smask_object(alpha: &AlphaPlane) -> String {
    let stream_data = encode_stream_data(&alpha.data);
    format!(
        "<< /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceGray /BitsPerComponent 8 /Length {} /Filter [/ASCIIHexDecode /FlateDecode] >>
stream
{}
endstream",
        alpha.width,
        alpha.height,
        stream_data.len(),
        stream_data
    )
}

fn encode_stream_data(data: &[u8]) -> String {
    let mut hex = ascii_hex_encode(data);
    hex.push('>');
    hex
}

fn ascii_hex_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2 + data.len() / 32);
    for (index, byte) in data.iter().enumerate() {
        let _ = write!(&mut out, "{:02X}", byte);
        if index % 32 == 31 {
            out.push('\n');
        }
    }
    out
}

fn font_object(name: &str) -> String {
    format!(
        "<< /Type /Font /Subtype /Type1 /BaseFont /{} /Encoding /WinAnsiEncoding >>",
        name
    )
}

fn font_resources(fonts: &[(String, usize)]) -> String {
    let entries: Vec<String> = fonts
        .iter()
        .map(|(resource, id)| format!("/{} {} 0 R", resource, id))
        .collect();
    format!("<< {} >>", entries.join(" "))
}

fn xobject_resources(images: &[(String, usize)]) -> String {
    let entries: Vec<String> = images
        .iter()
        .map(|(resource, id)| format!("/{} {} 0 R", resource, id))
        .collect();
    format!("<< {} >>", entries.join(" "))
}

fn stream_object(content: &str) -> String {
    format!(
        "<< /Length {} >>\nstream\n{}\nendstream",
        content.len(),
        content
    )
}

fn info_object(info: &PdfInfo) -> String {
    format!(
        "<< /Title {} /Author {} /Subject {} /Producer (Palladia) >>",
        pdf_text_string(&info.title),
        pdf_text_string(&info.author),
        pdf_text_string(&info.subject)
    )
}

/// Literal string for ASCII input, UTF-16BE hex with a byte order mark otherwise.
fn pdf_text_string(input: &str) -> String {
    if input.is_ascii() {
        return format!("({})", escape_pdf_string(input));
    }
    let mut out = String::from("<FEFF");
    for unit in input.encode_utf16() {
        let _ = write!(out, "{:04X}", unit);
    }
    out.push('>');
    out
}

fn build_pdf(objects: &[String], catalog_id: usize, info_id: Option<usize>) -> Vec<u8> {
    let mut out: Vec<u8> = Vec::new();
    out.extend_from_slice(PDF_HEADER);
    out.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");

    let mut offsets = Vec::with_capacity(objects.len());
    for (index, obj) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n", index + 1).as_bytes());
        out.extend_from_slice(obj.as_bytes());
        out.extend_from_slice(b"\nendobj\n");
    }

    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }

    let mut trailer = format!(
        "trailer\n<< /Size {} /Root {} 0 R",
        objects.len() + 1,
        catalog_id
    );
    if let Some(info_id) = info_id {
        let _ = write!(trailer, " /Info {} 0 R", info_id);
    }
    let _ = write!(trailer, " >>\nstartxref\n{}\n%%EOF", xref_start);
    out.extend_from_slice(trailer.as_bytes());
    out
}

fn escape_pdf_string(input: &str) -> String {
    let mut out = String::new();
    for ch in input.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out
}

struct WinAnsiEncoded {
    text: String,
    replaced: usize,
}

fn encode_winansi_pdf_string(input: &str) -> WinAnsiEncoded {
    let mut out = String::new();
    let mut replaced = 0usize;
    for ch in input.chars() {
        let byte = match ch {
            '\u{0000}'..='\u{007F}' => ch as u8,
            '\u{00A0}'..='\u{00FF}' => ch as u8,
            '\u{20AC}' => 0x80,
            '\u{201A}' => 0x82,
            '\u{0192}' => 0x83,
            '\u{201E}' => 0x84,
            '\u{2026}' => 0x85,
            '\u{2020}' => 0x86,
            '\u{2021}' => 0x87,
            '\u{02C6}' => 0x88,
            '\u{2030}' => 0x89,
            '\u{0160}' => 0x8A,
            '\u{2039}' => 0x8B,
            '\u{0152}' => 0x8C,
            '\u{017D}' => 0x8E,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{02DC}' => 0x98,
            '\u{2122}' => 0x99,
            '\u{0161}' => 0x9A,
            '\u{203A}' => 0x9B,
            '\u{0153}' => 0x9C,
            '\u{017E}' => 0x9E,
            '\u{0178}' => 0x9F,
            _ => {
                replaced += 1;
                b'?'
            }
        };

        match byte {
            b'\\' => out.push_str("\\\\"),
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b if b < 0x20 || b >= 0x7f => {
                let _ = write!(out, "\\{:03o}", b);
            }
            b => out.push(b as char),
        }
    }

    WinAnsiEncoded {
        text: out,
        replaced,
    }
}

fn fmt(value: f32) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let fixed = I32F32::from_num(value);
    let scaled = (fixed * I32F32::from_num(1000)).round();
    let milli: i64 = scaled.to_num();
    format_milli(milli)
}

pub(crate) fn format_milli(milli: i64) -> String {
    if milli == 0 {
        return "0".to_string();
    }
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.abs();
    let int_part = abs / 1000;
    let frac_part = abs % 1000;
    if frac_part == 0 {
        return format!("{}{}", sign, int_part);
    }
    let mut s = format!("{}{}.{:03}", sign, int_part, frac_part);
    while s.ends_with('0') {
        s.pop();
    }
    s
}

fn fmt_pt(value: Pt) -> String {
    format_milli(value.to_milli_i64())
}

fn color_to_pdf_fill(color: Color) -> String {
    format!("{} {} {} rg\n", fmt(color.r), fmt(color.g), fmt(color.b))
}

fn color_to_pdf_stroke(color: Color) -> String {
    format!("{} {} {} RG\n", fmt(color.r), fmt(color.g), fmt(color.b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Canvas;
    use crate::types::Size;
    use lopdf::Object as LoObject;

    fn two_page_document() -> Document {
        let mut canvas = Canvas::new(Size::a4());
        canvas.set_fill_color(Color::from_hex(0x1E3A5F));
        canvas.draw_rect(Pt::ZERO, Pt::ZERO, Pt::from_i32(100), Pt::from_i32(50));
        canvas.set_font(FontWeight::Bold);
        canvas.set_font_size(Pt::from_i32(10));
        canvas.draw_string(Pt::from_i32(50), Pt::from_i32(100), "Attività (fase 1)");
        canvas.show_page();
        canvas.set_stroke_color(Color::BLACK);
        canvas.circle_path(Pt::from_i32(60), Pt::from_i32(60), Pt::from_i32(9));
        canvas.stroke();
        canvas.finish("POS")
    }

    fn utf16_string(object: &LoObject) -> String {
        let LoObject::String(bytes, _) = object else {
            panic!("expected a string, got {object:?}");
        };
        if bytes.starts_with(&[0xFE, 0xFF]) {
            let units: Vec<u16> = bytes[2..]
                .chunks(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        } else {
            String::from_utf8_lossy(bytes).into_owned()
        }
    }

    #[test]
    fn output_parses_with_expected_pages_and_info() {
        let info = PdfInfo::new("POS \u{2013} Scuola \u{2013} Rev. 2");
        let output = document_to_pdf(&two_page_document(), &ImageStore::new(), &info).expect("pdf");
        let parsed = lopdf::Document::load_mem(&output.bytes).expect("parse");
        assert_eq!(parsed.get_pages().len(), 2);
        assert_eq!(output.page_content_bytes.len(), 2);

        let info_id = parsed
            .trailer
            .get(b"Info")
            .and_then(LoObject::as_reference)
            .expect("info ref");
        let dict = parsed
            .get_object(info_id)
            .and_then(LoObject::as_dict)
            .expect("info dict");
        assert_eq!(
            utf16_string(dict.get(b"Title").expect("title")),
            "POS \u{2013} Scuola \u{2013} Rev. 2"
        );
        assert_eq!(utf16_string(dict.get(b"Author").expect("author")), "Palladia");
        assert_eq!(
            utf16_string(dict.get(b"Subject").expect("subject")),
            "Piano Operativo di Sicurezza"
        );
    }

    #[test]
    fn text_is_placed_on_the_baseline_in_winansi() {
        let output = document_to_pdf(&two_page_document(), &ImageStore::new(), &PdfInfo::new("POS"))
            .expect("pdf");
        let parsed = lopdf::Document::load_mem(&output.bytes).expect("parse");
        let pages = parsed.get_pages();
        let first = *pages.get(&1).expect("page 1");
        let content = String::from_utf8_lossy(&parsed.get_page_content(first).expect("content"))
            .into_owned();
        assert!(content.contains("/F2 10 Tf"));
        // 841.89 - 100 - 10
        assert!(content.contains("50 731.89 Td"));
        assert!(content.contains("(Attivit\\340 \\(fase 1\\)) Tj"));
        assert!(content.contains("0 791.89 100 50 re\nf"));
    }

    #[test]
    fn number_formatting_strips_trailing_zeros() {
        assert_eq!(format_milli(0), "0");
        assert_eq!(format_milli(1500), "1.5");
        assert_eq!(format_milli(-250), "-0.25");
        assert_eq!(format_milli(12000), "12");
        assert_eq!(fmt(1.0), "1");
    }

    #[test]
    fn unknown_characters_are_replaced() {
        let encoded = encode_winansi_pdf_string("a\u{2265}b\u{2013}");
        assert_eq!(encoded.text, "a?b\\226");
        assert_eq!(encoded.replaced, 1);
    }

    #[test]
    fn stored_images_become_xobjects_with_soft_masks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cartello.png");
        std::fs::write(&path, crate::assets::tests::png_bytes(3, 3, [10, 20, 30, 100]))
            .expect("write");
        let mut store = ImageStore::new();
        let handle = store.load_image(&path).expect("load");

        let mut canvas = Canvas::new(Size::a4());
        canvas.draw_image(
            Pt::from_i32(50),
            Pt::from_i32(50),
            Pt::from_i32(30),
            Pt::from_i32(30),
            handle.id.clone(),
        );
        canvas.draw_image(Pt::ZERO, Pt::ZERO, Pt::from_i32(5), Pt::from_i32(5), "Im99");
        let output = document_to_pdf(&canvas.finish("POS"), &store, &PdfInfo::new("POS"))
            .expect("pdf");
        let text = String::from_utf8_lossy(&output.bytes);
        assert!(text.contains("/SMask"));
        assert!(text.contains("/Im1 Do"));
        assert!(!text.contains("/Im99 Do"));
        let parsed = lopdf::Document::load_mem(&output.bytes).expect("parse");
        assert_eq!(parsed.get_pages().len(), 1);
    }

    #[test]
    fn empty_document_is_rejected() {
        let document = Document {
            page_size: Size::a4(),
            title: "POS".to_string(),
            pages: Vec::new(),
        };
        let err = document_to_pdf(&document, &ImageStore::new(), &PdfInfo::new("POS"))
            .expect_err("no pages");
        assert!(matches!(err, PosError::Pdf(_)));
    }
}
