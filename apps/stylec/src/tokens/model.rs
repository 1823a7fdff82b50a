//! Token data model: named, typed design values with explicit unit and derivation.

use std::fmt;

use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Units
// ────────────────────────────────────────────────────────────────────────────

/// Absolute length units accepted in token sources and emitted in stylesheets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    Pt,
    Cm,
    Mm,
    In,
    Px,
}

impl LengthUnit {
    pub fn suffix(self) -> &'static str {
        match self {
            LengthUnit::Pt => "pt",
            LengthUnit::Cm => "cm",
            LengthUnit::Mm => "mm",
            LengthUnit::In => "in",
            LengthUnit::Px => "px",
        }
    }

    pub fn from_suffix(s: &str) -> Option<Self> {
        match s {
            "pt" => Some(LengthUnit::Pt),
            "cm" => Some(LengthUnit::Cm),
            "mm" => Some(LengthUnit::Mm),
            "in" => Some(LengthUnit::In),
            "px" => Some(LengthUnit::Px),
            _ => None,
        }
    }
}

/// The unit a token's source value is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "unit", rename_all = "kebab-case")]
pub enum SourceUnit {
    /// Multiple of the governing font size (`em`).
    FontRelative,
    AbsoluteLength(LengthUnit),
    Color,
    Glyph,
    /// Unitless: weights, ratios, typeface names.
    None,
}

impl SourceUnit {
    /// Parses the `unit` key of a token source leaf. Unknown names are rejected.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "em" => Some(SourceUnit::FontRelative),
            "color" => Some(SourceUnit::Color),
            "glyph" => Some(SourceUnit::Glyph),
            "none" => Some(SourceUnit::None),
            other => LengthUnit::from_suffix(other).map(SourceUnit::AbsoluteLength),
        }
    }

    pub fn as_source_str(&self) -> &'static str {
        match self {
            SourceUnit::FontRelative => "em",
            SourceUnit::AbsoluteLength(u) => u.suffix(),
            SourceUnit::Color => "color",
            SourceUnit::Glyph => "glyph",
            SourceUnit::None => "none",
        }
    }

    pub fn is_length(&self) -> bool {
        matches!(self, SourceUnit::FontRelative | SourceUnit::AbsoluteLength(_))
    }
}

impl fmt::Display for SourceUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_source_str())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Values and derivations
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TokenValue {
    Number(f64),
    Text(String),
}

impl TokenValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            TokenValue::Number(n) => Some(*n),
            TokenValue::Text(_) => None,
        }
    }

}

impl fmt::Display for TokenValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenValue::Number(n) => write!(f, "{n}"),
            TokenValue::Text(s) => f.write_str(s),
        }
    }
}

/// How a computed token is derived from its source token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Formula {
    Identity,
    Scale { factor: f64 },
    Offset { delta: f64 },
    /// Produced by the unit converter; never written in a token source.
    Convert {
        from: SourceUnit,
        to: LengthUnit,
        font_size_pt: Option<f64>,
    },
}

impl Formula {
    /// Parses the `formula` key of a computed leaf: `identity`, `scale(<k>)` or `offset(<d>)`.
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s == "identity" {
            return Ok(Formula::Identity);
        }
        let (name, rest) = s
            .split_once('(')
            .ok_or_else(|| format!("malformed formula '{s}'"))?;
        let arg = rest
            .strip_suffix(')')
            .ok_or_else(|| format!("malformed formula '{s}': missing ')'"))?;
        let n: f64 = arg
            .trim()
            .parse()
            .map_err(|_| format!("malformed numeric literal '{}' in formula '{s}'", arg.trim()))?;
        if !n.is_finite() {
            return Err(format!("non-finite argument in formula '{s}'"));
        }
        match name.trim() {
            "scale" => Ok(Formula::Scale { factor: n }),
            "offset" => Ok(Formula::Offset { delta: n }),
            other => Err(format!("unknown formula '{other}'")),
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::Identity => f.write_str("identity"),
            Formula::Scale { factor } => write!(f, "scale({factor})"),
            Formula::Offset { delta } => write!(f, "offset({delta})"),
            Formula::Convert {
                from,
                to,
                font_size_pt,
            } => match font_size_pt {
                Some(pt) => write!(f, "convert({from}->{}, {pt}pt)", to.suffix()),
                None => write!(f, "convert({from}->{})", to.suffix()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Derivation {
    Literal,
    Computed { from: String, formula: Formula },
}

// ────────────────────────────────────────────────────────────────────────────
// Token
// ────────────────────────────────────────────────────────────────────────────

/// A named design value. Immutable once published in a snapshot.
///
/// For computed tokens `value` and `unit` hold the resolved result of the
/// derivation chain at load time; `derivation` keeps the provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    /// Semantic tag, e.g. `bullet-indent` or `section-header-border-color`.
    pub role: String,
    pub value: TokenValue,
    pub unit: SourceUnit,
    pub derivation: Derivation,
    /// Token governing a font-relative value. Falls back to the `base-font-size` role.
    pub font: Option<String>,
}

impl Token {
    pub fn literal(id: &str, role: &str, value: TokenValue, unit: SourceUnit) -> Self {
        Token {
            id: id.to_string(),
            role: role.to_string(),
            value,
            unit,
            derivation: Derivation::Literal,
            font: None,
        }
    }
}

/// Normalizes `#rgb` / `#rrggbb` (any case) to lowercase `#rrggbb`.
pub fn normalize_hex_color(raw: &str) -> Option<String> {
    let hex = raw.trim().strip_prefix('#')?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let expanded: String = match hex.len() {
        3 => hex.chars().flat_map(|c| [c, c]).collect(),
        6 => hex.to_string(),
        _ => return None,
    };
    Some(format!("#{}", expanded.to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_unit_parse_accepts_known_names() {
        assert_eq!(SourceUnit::parse("em"), Some(SourceUnit::FontRelative));
        assert_eq!(
            SourceUnit::parse("cm"),
            Some(SourceUnit::AbsoluteLength(LengthUnit::Cm))
        );
        assert_eq!(SourceUnit::parse("glyph"), Some(SourceUnit::Glyph));
        assert_eq!(SourceUnit::parse("rem"), None);
        assert_eq!(SourceUnit::parse("EM"), None);
    }

    #[test]
    fn test_formula_parse() {
        assert_eq!(Formula::parse("identity"), Ok(Formula::Identity));
        assert_eq!(
            Formula::parse("scale(0.5)"),
            Ok(Formula::Scale { factor: 0.5 })
        );
        assert_eq!(
            Formula::parse(" offset(-2) "),
            Ok(Formula::Offset { delta: -2.0 })
        );
        assert!(Formula::parse("scale(abc)").is_err());
        assert!(Formula::parse("scale(1").is_err());
        assert!(Formula::parse("rotate(90)").is_err());
        assert!(Formula::parse("scale(inf)").is_err());
    }

    #[test]
    fn test_normalize_hex_color() {
        assert_eq!(normalize_hex_color("#1F2937").as_deref(), Some("#1f2937"));
        assert_eq!(normalize_hex_color("#abc").as_deref(), Some("#aabbcc"));
        assert_eq!(normalize_hex_color("1f2937"), None);
        assert_eq!(normalize_hex_color("#12"), None);
        assert_eq!(normalize_hex_color("#gggggg"), None);
    }
}
