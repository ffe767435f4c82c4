//! Line-oriented tokenizer for the document source dialect.
//!
//! Every non-blank line maps to exactly one [`Block`]; consecutive pipe lines
//! are gathered into a single table block.

use regex::Regex;
use std::sync::OnceLock;

/// Minimum underscore run that marks a signature placeholder.
const SIGNATURE_RUN: &str = "_________________";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub text: String,
    pub bold: bool,
}

/// Text with inline `**bold**` spans, kept as alternating runs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RichText {
    pub runs: Vec<Run>,
}

impl RichText {
    pub fn parse(source: &str) -> Self {
        static BOLD: OnceLock<Regex> = OnceLock::new();
        let bold = BOLD.get_or_init(|| Regex::new(r"\*\*([^*]+)\*\*").expect("regex for bold spans"));

        let mut runs = Vec::new();
        let mut last = 0usize;
        for caps in bold.captures_iter(source) {
            let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if whole.start() > last {
                runs.push(Run {
                    text: source[last..whole.start()].to_string(),
                    bold: false,
                });
            }
            runs.push(Run {
                text: inner.as_str().to_string(),
                bold: true,
            });
            last = whole.end();
        }
        if last < source.len() {
            runs.push(Run {
                text: source[last..].to_string(),
                bold: false,
            });
        }
        Self { runs }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            runs: vec![Run {
                text: text.into(),
                bold: false,
            }],
        }
    }

    pub fn bold(text: impl Into<String>) -> Self {
        Self {
            runs: vec![Run {
                text: text.into(),
                bold: true,
            }],
        }
    }

    pub fn plain_text(&self) -> String {
        self.runs.iter().map(|run| run.text.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.iter().all(|run| run.text.trim().is_empty())
    }
}

pub type RawRow = Vec<String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableBlock {
    /// First row is the header. Every row has exactly the header's cell count.
    pub rows: Vec<RawRow>,
}

impl TableBlock {
    pub fn header(&self) -> &[String] {
        self.rows.first().map(|r| r.as_slice()).unwrap_or(&[])
    }

    pub fn data_rows(&self) -> &[RawRow] {
        self.rows.get(1..).unwrap_or(&[])
    }

    pub fn column_count(&self) -> usize {
        self.header().len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading { level: u8, text: String },
    /// `N. TITLE` written entirely in capitals.
    NumberedHeading { text: String },
    CapsHeading { text: String },
    SectionBanner { number: String, title: String },
    SubHeading { text: String },
    Bullet { text: RichText },
    NumberedItem { text: String },
    SignatureLine { role: String },
    Table(TableBlock),
    Paragraph { text: RichText },
    Blank,
    Rule,
}

impl Block {
    pub fn kind(&self) -> &'static str {
        match self {
            Block::Heading { .. } => "heading",
            Block::NumberedHeading { .. } => "numbered_heading",
            Block::CapsHeading { .. } => "caps_heading",
            Block::SectionBanner { .. } => "section_banner",
            Block::SubHeading { .. } => "sub_heading",
            Block::Bullet { .. } => "bullet",
            Block::NumberedItem { .. } => "numbered_item",
            Block::SignatureLine { .. } => "signature_line",
            Block::Table(_) => "table",
            Block::Paragraph { .. } => "paragraph",
            Block::Blank => "blank",
            Block::Rule => "rule",
        }
    }
}

pub fn tokenize(source: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut table_rows: Vec<RawRow> = Vec::new();
    let mut blank_run = 0usize;

    for line in source.lines() {
        let trimmed = line.trim();
        if is_table_line(trimmed) {
            flush_blanks(&mut blocks, &mut blank_run);
            table_rows.push(split_cells(trimmed));
            continue;
        }
        flush_table(&mut blocks, &mut table_rows);
        if trimmed.is_empty() {
            blank_run += 1;
            continue;
        }
        flush_blanks(&mut blocks, &mut blank_run);
        blocks.push(classify_line(trimmed));
    }
    flush_table(&mut blocks, &mut table_rows);
    flush_blanks(&mut blocks, &mut blank_run);
    blocks
}

fn flush_blanks(blocks: &mut Vec<Block>, run: &mut usize) {
    let count = if *run >= 3 { 1 } else { *run };
    blocks.extend(std::iter::repeat_n(Block::Blank, count));
    *run = 0;
}

fn flush_table(blocks: &mut Vec<Block>, rows: &mut Vec<RawRow>) {
    if rows.is_empty() {
        return;
    }
    let mut kept: Vec<RawRow> = std::mem::take(rows)
        .into_iter()
        .filter(|row| !is_separator_row(row))
        .collect();
    let Some(header) = kept.first_mut() else {
        return;
    };
    for cell in header.iter_mut() {
        *cell = cell.replace("**", "").trim().to_string();
    }
    let width = header.len();
    for row in kept.iter_mut() {
        row.resize(width, String::new());
    }
    blocks.push(Block::Table(TableBlock { rows: kept }));
}

fn is_table_line(trimmed: &str) -> bool {
    trimmed.starts_with('|') && trimmed.ends_with('|')
}

fn split_cells(trimmed: &str) -> RawRow {
    let inner = trimmed
        .strip_prefix('|')
        .and_then(|rest| rest.strip_suffix('|'))
        .unwrap_or("");
    inner.split('|').map(|cell| cell.trim().to_string()).collect()
}

fn is_separator_row(row: &RawRow) -> bool {
    let mut saw_marker = false;
    for cell in row.iter().filter(|c| !c.is_empty()) {
        if !cell.chars().all(|ch| ch == '-' || ch == ':' || ch.is_whitespace()) {
            return false;
        }
        saw_marker = true;
    }
    saw_marker
}

fn section_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^SEZIONE\s+(\d+)\s*[-:]\s*(.+)$").expect("regex for section banners")
    })
}

fn numbered_heading_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+\.\s+[A-ZÀÈÉÌÒÙ]").expect("regex for numbered headings"))
}

fn caps_heading_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-ZÀÈÉÌÒÙ\s]{5,}$").expect("regex for caps headings"))
}

fn numbered_item_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+\.\d+").expect("regex for numbered items"))
}

/// Classifies one trimmed, non-blank, non-table line.
pub fn classify_line(trimmed: &str) -> Block {
    if let Some(text) = trimmed.strip_prefix("# ") {
        return Block::Heading {
            level: 1,
            text: text.trim().to_string(),
        };
    }
    if let Some(text) = trimmed.strip_prefix("## ") {
        let text = text.trim();
        if let Some(caps) = section_pattern().captures(text) {
            return Block::SectionBanner {
                number: caps[1].to_string(),
                title: caps[2].trim().to_string(),
            };
        }
        return Block::SubHeading {
            text: text.to_string(),
        };
    }
    if let Some(text) = trimmed.strip_prefix("### ") {
        return Block::Heading {
            level: 3,
            text: text.trim().to_string(),
        };
    }
    if numbered_heading_pattern().is_match(trimmed) && trimmed == trimmed.to_uppercase() {
        return Block::NumberedHeading {
            text: trimmed.to_string(),
        };
    }
    if caps_heading_pattern().is_match(trimmed) && !trimmed.starts_with('-') {
        return Block::CapsHeading {
            text: trimmed.to_string(),
        };
    }
    if let Some(rest) = trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("• "))
    {
        return Block::Bullet {
            text: RichText::parse(rest),
        };
    }
    if numbered_item_pattern().is_match(trimmed) {
        return Block::NumberedItem {
            text: trimmed.to_string(),
        };
    }
    if trimmed.contains(SIGNATURE_RUN) {
        return Block::SignatureLine {
            role: signature_role(trimmed),
        };
    }
    if trimmed == "---" {
        return Block::Rule;
    }
    Block::Paragraph {
        text: RichText::parse(trimmed),
    }
}

fn signature_role(line: &str) -> String {
    let colon = line.find(':');
    let underscore = line.find('_');
    let end = match (colon, underscore) {
        (Some(a), Some(b)) => a.min(b),
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => line.len(),
    };
    line[..end]
        .trim_start_matches(|ch: char| ch == '-' || ch == '•' || ch == '*' || ch.is_whitespace())
        .trim()
        .to_string()
}
