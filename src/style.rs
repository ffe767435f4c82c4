use crate::types::{Color, Pt};

/// Brand palette shared by both backends.
pub struct Palette;

impl Palette {
    pub const PRIMARY: Color = Color::from_hex(0x1E3A5F);
    pub const ACCENT: Color = Color::from_hex(0x2E86AB);
    pub const LIGHT_BLUE: Color = Color::from_hex(0xEBF4FA);
    pub const SECTION_BG: Color = Color::from_hex(0xF0F4F8);
    pub const TABLE_HEADER: Color = Color::from_hex(0x1E3A5F);
    pub const TABLE_ALT: Color = Color::from_hex(0xF8FBFF);
    pub const TEXT: Color = Color::from_hex(0x2C3E50);
    pub const TEXT_GRAY: Color = Color::from_hex(0x7F8C8D);
    pub const LINE: Color = Color::from_hex(0xBDC3C7);
    pub const WHITE: Color = Color::WHITE;
    pub const RISK_LOW: Color = Color::from_hex(0x27AE60);
    pub const RISK_MEDIUM: Color = Color::from_hex(0xF39C12);
    pub const RISK_HIGH: Color = Color::from_hex(0xE67E22);
    pub const RISK_VERY_HIGH: Color = Color::from_hex(0xE74C3C);
    pub const EMERGENCY_CARD: Color = Color::from_hex(0x3A3A3A);
    pub const EMERGENCY_CARD_ALT: Color = Color::from_hex(0x555555);
    pub const EMERGENCY_LABEL: Color = Color::from_hex(0xBBBBBB);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontWeight {
    Regular,
    Bold,
}

impl FontWeight {
    pub fn pdf_name(self) -> &'static str {
        match self {
            FontWeight::Regular => "Helvetica",
            FontWeight::Bold => "Helvetica-Bold",
        }
    }

    pub fn css_weight(self) -> u16 {
        match self {
            FontWeight::Regular => 400,
            FontWeight::Bold => 700,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlignMode {
    Left,
    Center,
    Right,
}

impl TextAlignMode {
    pub fn as_css(self) -> &'static str {
        match self {
            TextAlignMode::Left => "left",
            TextAlignMode::Center => "center",
            TextAlignMode::Right => "right",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub font_size: Pt,
    pub line_gap: Pt,
    pub color: Color,
    pub weight: FontWeight,
    pub align: TextAlignMode,
}

impl TextStyle {
    pub fn new(font_size: f32, weight: FontWeight, color: Color) -> Self {
        Self {
            font_size: Pt::from_f32(font_size),
            line_gap: Pt::ZERO,
            color,
            weight,
            align: TextAlignMode::Left,
        }
    }

    pub fn body() -> Self {
        Self::new(10.0, FontWeight::Regular, Palette::TEXT).with_line_gap(2.0)
    }

    pub fn cell() -> Self {
        Self::new(9.0, FontWeight::Regular, Palette::TEXT).with_line_gap(1.0)
    }

    pub fn with_line_gap(mut self, gap: f32) -> Self {
        self.line_gap = Pt::from_f32(gap);
        self
    }

    pub fn with_align(mut self, align: TextAlignMode) -> Self {
        self.align = align;
        self
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn with_weight(mut self, weight: FontWeight) -> Self {
        self.weight = weight;
        self
    }

    pub fn line_height(&self) -> Pt {
        self.font_size.mul_ratio(6, 5) + self.line_gap
    }
}
