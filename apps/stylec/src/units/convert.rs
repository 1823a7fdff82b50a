//! Unit conversion between font-relative and absolute lengths.
//!
//! The only physical constants are `1pt = 1/72in` and `1in = 2.54cm`. A font-relative
//! length converts as `value_em × font_size_pt × points_to(target)`; nothing else
//! (no per-target fudge factors) is allowed to influence the result.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::errors::StyleError;
use crate::tokens::model::{Derivation, Formula, LengthUnit, SourceUnit, Token, TokenValue};
use crate::tokens::snapshot::{SnapshotVersion, TokenSnapshot};
use crate::units::font_metrics::{governing_font, FontMetric};

pub const PT_PER_INCH: f64 = 72.0;
pub const CM_PER_INCH: f64 = 2.54;
/// 0.0352777… cm per point.
pub const CM_PER_PT: f64 = CM_PER_INCH / PT_PER_INCH;
/// CSS reference pixel: 1px = 1/96in.
pub const PT_PER_PX: f64 = 0.75;

impl LengthUnit {
    pub fn points_per_unit(self) -> f64 {
        match self {
            LengthUnit::Pt => 1.0,
            LengthUnit::Cm => PT_PER_INCH / CM_PER_INCH,
            LengthUnit::Mm => PT_PER_INCH / (CM_PER_INCH * 10.0),
            LengthUnit::In => PT_PER_INCH,
            LengthUnit::Px => PT_PER_PX,
        }
    }
}

/// Converts a length in points to `unit`.
pub fn points_to(unit: LengthUnit, points: f64) -> f64 {
    points / unit.points_per_unit()
}

pub fn to_points(value: f64, unit: LengthUnit) -> f64 {
    value * unit.points_per_unit()
}

/// Derives an absolute-length token from `token`.
///
/// `from` must match the token's unit. Font-relative tokens need `font`; the font size
/// is recorded in the derived token's formula so the value can be replayed.
pub fn convert(
    token: &Token,
    from: SourceUnit,
    to: LengthUnit,
    font: Option<&FontMetric>,
) -> Result<Token, StyleError> {
    if token.unit != from {
        return Err(StyleError::Conversion {
            token_id: token.id.clone(),
            message: format!("token is expressed in {}, not {from}", token.unit),
        });
    }
    let value = match &token.value {
        TokenValue::Number(n) => *n,
        TokenValue::Text(s) => {
            return Err(StyleError::Conversion {
                token_id: token.id.clone(),
                message: format!("'{s}' is not a numeric length"),
            })
        }
    };

    let (points, font_size_pt) = match from {
        SourceUnit::FontRelative => {
            let metric = font.ok_or_else(|| StyleError::MissingFontMetric {
                token_id: token.id.clone(),
                reason: "no font metric supplied".to_string(),
            })?;
            (value * metric.size_pt, Some(metric.size_pt))
        }
        SourceUnit::AbsoluteLength(unit) => (to_points(value, unit), None),
        other => {
            return Err(StyleError::Conversion {
                token_id: token.id.clone(),
                message: format!("{other} values have no length"),
            })
        }
    };

    Ok(Token {
        id: format!("{}@{}", token.id, to.suffix()),
        role: token.role.clone(),
        value: TokenValue::Number(points_to(to, points)),
        unit: SourceUnit::AbsoluteLength(to),
        derivation: Derivation::Computed {
            from: token.id.clone(),
            formula: Formula::Convert {
                from,
                to,
                font_size_pt,
            },
        },
        font: token.font.clone(),
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Snapshot-wide conversion
// ────────────────────────────────────────────────────────────────────────────

/// Every length token of a snapshot, converted to centimetres.
///
/// Keyed by the source token id. Print stylesheets and the document mapper read
/// absolute lengths from here and nowhere else.
#[derive(Debug, Clone, Serialize)]
pub struct ConvertedTokens {
    pub snapshot_version: SnapshotVersion,
    tokens: BTreeMap<String, Token>,
}

impl ConvertedTokens {
    pub fn get(&self, source_id: &str) -> Option<&Token> {
        self.tokens.get(source_id)
    }

    pub fn cm(&self, source_id: &str) -> Option<f64> {
        self.tokens.get(source_id).and_then(|t| t.value.as_number())
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }
}

/// Converts every length token in `snapshot` to `cm`.
///
/// Font-relative tokens are converted against their governing font, so changing a
/// font size re-derives every dependent length on the next build.
pub fn convert_snapshot(snapshot: &TokenSnapshot) -> Result<ConvertedTokens, StyleError> {
    let mut tokens = BTreeMap::new();
    for token in snapshot.tokens().iter().filter(|t| t.unit.is_length()) {
        let metric = match token.unit {
            SourceUnit::FontRelative => Some(governing_font(snapshot, token)?),
            _ => None,
        };
        let derived = convert(token, token.unit, LengthUnit::Cm, metric.as_ref())?;
        tokens.insert(token.id.clone(), derived);
    }
    debug!(
        version = %snapshot.version(),
        converted = tokens.len(),
        "Length tokens converted to cm"
    );
    Ok(ConvertedTokens {
        snapshot_version: snapshot.version().clone(),
        tokens,
    })
}

/// Formats a number for emission: at most 4 decimals, no trailing zeros, no `-0`.
pub fn format_number(value: f64) -> String {
    let rounded = (value * 10_000.0).round() / 10_000.0;
    if rounded == 0.0 {
        return "0".to_string();
    }
    let text = format!("{rounded:.4}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::model::TokenValue;

    fn em_token(value: f64) -> Token {
        Token::literal(
            "spacing.bullet-indent",
            "bullet-indent",
            TokenValue::Number(value),
            SourceUnit::FontRelative,
        )
    }

    fn metric(pt: f64) -> FontMetric {
        FontMetric {
            size_pt: pt,
            source_token: "typography.base-size".to_string(),
        }
    }

    // ── closed form ─────────────────────────────────────────────────────────

    #[test]
    fn test_bullet_indent_one_em_at_11pt_is_0_388cm() {
        let out = convert(
            &em_token(1.0),
            SourceUnit::FontRelative,
            LengthUnit::Cm,
            Some(&metric(11.0)),
        )
        .unwrap();
        let cm = out.value.as_number().unwrap();
        assert!((cm - 0.388056).abs() < 1e-5, "got {cm}");
        assert_eq!(format_number(cm), "0.3881");
    }

    #[test]
    fn test_conversion_matches_closed_form_for_many_inputs() {
        for value in [0.0, 0.25, 0.5, 1.0, 1.5, 2.75, -0.5] {
            for pt in [8.0, 9.5, 10.0, 11.0, 12.0, 14.0, 20.0] {
                let out = convert(
                    &em_token(value),
                    SourceUnit::FontRelative,
                    LengthUnit::Cm,
                    Some(&metric(pt)),
                )
                .unwrap();
                let expected = value * pt * CM_PER_PT;
                let got = out.value.as_number().unwrap();
                assert!((got - expected).abs() < 1e-12, "{value}em @ {pt}pt");
            }
        }
    }

    #[test]
    fn test_conversion_is_deterministic() {
        let a = convert(
            &em_token(1.3),
            SourceUnit::FontRelative,
            LengthUnit::Cm,
            Some(&metric(10.5)),
        )
        .unwrap();
        let b = convert(
            &em_token(1.3),
            SourceUnit::FontRelative,
            LengthUnit::Cm,
            Some(&metric(10.5)),
        )
        .unwrap();
        assert_eq!(a, b);
        assert_eq!(
            a.value.as_number().unwrap().to_bits(),
            b.value.as_number().unwrap().to_bits()
        );
    }

    #[test]
    fn test_converted_token_records_provenance() {
        let out = convert(
            &em_token(1.0),
            SourceUnit::FontRelative,
            LengthUnit::Pt,
            Some(&metric(11.0)),
        )
        .unwrap();
        assert_eq!(out.id, "spacing.bullet-indent@pt");
        assert_eq!(out.role, "bullet-indent");
        assert_eq!(out.value, TokenValue::Number(11.0));
        assert_eq!(
            out.derivation,
            Derivation::Computed {
                from: "spacing.bullet-indent".into(),
                formula: Formula::Convert {
                    from: SourceUnit::FontRelative,
                    to: LengthUnit::Pt,
                    font_size_pt: Some(11.0),
                },
            }
        );
    }

    // ── absolute lengths ────────────────────────────────────────────────────

    #[test]
    fn test_absolute_conversions_use_physical_constants() {
        let inch = Token::literal(
            "page.margin",
            "page-margin",
            TokenValue::Number(1.0),
            SourceUnit::AbsoluteLength(LengthUnit::In),
        );
        let out = convert(
            &inch,
            SourceUnit::AbsoluteLength(LengthUnit::In),
            LengthUnit::Cm,
            None,
        )
        .unwrap();
        assert!((out.value.as_number().unwrap() - 2.54).abs() < 1e-12);

        assert!((points_to(LengthUnit::Mm, 72.0) - 25.4).abs() < 1e-9);
        assert!((to_points(16.0, LengthUnit::Px) - 12.0).abs() < 1e-12);
    }

    // ── failures ────────────────────────────────────────────────────────────

    #[test]
    fn test_missing_font_metric_is_reported() {
        let err = convert(&em_token(1.0), SourceUnit::FontRelative, LengthUnit::Cm, None)
            .unwrap_err();
        assert!(matches!(err, StyleError::MissingFontMetric { ref token_id, .. } if token_id == "spacing.bullet-indent"));
    }

    #[test]
    fn test_unit_mismatch_is_rejected() {
        let err = convert(
            &em_token(1.0),
            SourceUnit::AbsoluteLength(LengthUnit::Pt),
            LengthUnit::Cm,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, StyleError::Conversion { .. }));
    }

    #[test]
    fn test_color_has_no_length() {
        let color = Token::literal(
            "color.text",
            "text-color",
            TokenValue::Text("#000000".into()),
            SourceUnit::Color,
        );
        let err = convert(&color, SourceUnit::Color, LengthUnit::Cm, None).unwrap_err();
        assert!(matches!(err, StyleError::Conversion { .. }));
    }

    // ── snapshot-wide ───────────────────────────────────────────────────────

    #[test]
    fn test_convert_snapshot_rederives_after_font_change() {
        let src = r##"
[typography.base-size]
value = 11
unit = "pt"
role = "base-font-size"

[spacing.bullet-indent]
value = 1
unit = "em"

[color.text]
value = "#000"
unit = "color"
"##;
        let first = TokenSnapshot::load(src).unwrap();
        let converted = convert_snapshot(&first).unwrap();
        assert_eq!(converted.len(), 2, "only length tokens are converted");
        let indent_cm = converted.cm("spacing.bullet-indent").unwrap();
        assert!((to_points(indent_cm, LengthUnit::Cm) - 11.0).abs() < 1e-9);
        assert!(converted.get("color.text").is_none());

        let second = first.supersede(&src.replace("value = 11", "value = 12")).unwrap();
        let reconverted = convert_snapshot(&second).unwrap();
        let indent_cm = reconverted.cm("spacing.bullet-indent").unwrap();
        assert!((to_points(indent_cm, LengthUnit::Cm) - 12.0).abs() < 1e-9);
        assert_eq!(reconverted.snapshot_version, *second.version());
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0.388056), "0.3881");
        assert_eq!(format_number(11.0), "11");
        assert_eq!(format_number(1.25), "1.25");
        assert_eq!(format_number(-0.00001), "0");
        assert_eq!(format_number(-0.5), "-0.5");
    }
}
