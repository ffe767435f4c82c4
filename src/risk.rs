use crate::style::Palette;
use crate::types::Color;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RiskTier {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl RiskTier {
    /// R = P x D thresholds: 3, 8, 12.
    pub fn from_score(score: f64) -> RiskTier {
        if score <= 3.0 {
            RiskTier::Low
        } else if score <= 8.0 {
            RiskTier::Medium
        } else if score <= 12.0 {
            RiskTier::High
        } else {
            RiskTier::VeryHigh
        }
    }

    /// Parses a numeric cell ("9", "4,5", "4.5") and maps it to a tier.
    pub fn from_value(raw: &str) -> Option<RiskTier> {
        let normalized = raw.trim().replacen(',', ".", 1);
        let score: f64 = normalized.parse().ok()?;
        if !score.is_finite() {
            return None;
        }
        Some(RiskTier::from_score(score))
    }

    /// Keyword match on a textual level such as "Molto alto" or "Accettabile".
    pub fn from_level(text: &str) -> Option<RiskTier> {
        let lower = text.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
        if has(&["molto alto", "intollerabile", "critico"]) {
            Some(RiskTier::VeryHigh)
        } else if has(&["alto", "rilevante"]) {
            Some(RiskTier::High)
        } else if has(&["medio", "moderato"]) {
            Some(RiskTier::Medium)
        } else if has(&["basso", "accettabile", "trascurabile"]) {
            Some(RiskTier::Low)
        } else {
            None
        }
    }

    pub fn color(self) -> Color {
        match self {
            RiskTier::Low => Palette::RISK_LOW,
            RiskTier::Medium => Palette::RISK_MEDIUM,
            RiskTier::High => Palette::RISK_HIGH,
            RiskTier::VeryHigh => Palette::RISK_VERY_HIGH,
        }
    }

    pub fn css_class(self) -> &'static str {
        match self {
            RiskTier::Low => "risk-low",
            RiskTier::Medium => "risk-medium",
            RiskTier::High => "risk-high",
            RiskTier::VeryHigh => "risk-very-high",
        }
    }
}
