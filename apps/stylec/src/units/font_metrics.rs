//! Governing font metrics for font-relative tokens.
//!
//! An `em` value only has a length once the font size it is relative to is known.
//! The governing font of a token is, in order:
//! 1. the token named by its own `font` key (or inherited along its derivation chain),
//! 2. the snapshot token with role `base-font-size`.
//!
//! The governing token must resolve to a positive absolute length.

use serde::{Deserialize, Serialize};

use crate::errors::StyleError;
use crate::tokens::model::{SourceUnit, Token, TokenValue};
use crate::tokens::resolve::resolve;
use crate::tokens::snapshot::{TokenSnapshot, BASE_FONT_SIZE_ROLE};
use crate::units::convert::to_points;

/// Point size of the typography governing a font-relative value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontMetric {
    pub size_pt: f64,
    /// Token the size was read from.
    pub source_token: String,
}

/// Finds the font metric governing `token` within `snapshot`.
pub fn governing_font(snapshot: &TokenSnapshot, token: &Token) -> Result<FontMetric, StyleError> {
    let missing = |reason: String| StyleError::MissingFontMetric {
        token_id: token.id.clone(),
        reason,
    };

    let chain_font = resolve(snapshot, &token.id)?.font;
    let font_id = match chain_font {
        Some(id) => id,
        None => snapshot
            .by_role(BASE_FONT_SIZE_ROLE)
            .map(|t| t.id.clone())
            .ok_or_else(|| {
                missing(format!(
                    "no `font` reference and no token with role '{BASE_FONT_SIZE_ROLE}'"
                ))
            })?,
    };

    let font = resolve(snapshot, &font_id)?;
    let size_pt = match (&font.value, font.unit) {
        (TokenValue::Number(n), SourceUnit::AbsoluteLength(unit)) => to_points(*n, unit),
        (_, SourceUnit::FontRelative) => {
            return Err(missing(format!(
                "governing font '{font_id}' is itself font-relative"
            )))
        }
        (_, unit) => {
            return Err(missing(format!(
                "governing font '{font_id}' is not a length ({unit})"
            )))
        }
    };
    if size_pt <= 0.0 {
        return Err(missing(format!(
            "governing font '{font_id}' has non-positive size {size_pt}pt"
        )));
    }

    Ok(FontMetric {
        size_pt,
        source_token: font_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(src: &str) -> TokenSnapshot {
        TokenSnapshot::load(src).unwrap()
    }

    #[test]
    fn test_base_font_size_governs_by_default() {
        let snap = snapshot(
            "[base]\nvalue = 11\nunit = \"pt\"\nrole = \"base-font-size\"\n[gap]\nvalue = 1\nunit = \"em\"\n",
        );
        let metric = governing_font(&snap, snap.get("gap").unwrap()).unwrap();
        assert_eq!(metric.size_pt, 11.0);
        assert_eq!(metric.source_token, "base");
    }

    #[test]
    fn test_explicit_font_reference_wins() {
        let snap = snapshot(
            r#"
[base]
value = 11
unit = "pt"
role = "base-font-size"
[header]
derived_from = "base"
formula = "offset(2)"
[gap]
value = 0.3
unit = "em"
font = "header"
"#,
        );
        let metric = governing_font(&snap, snap.get("gap").unwrap()).unwrap();
        assert_eq!(metric.size_pt, 13.0);
        assert_eq!(metric.source_token, "header");
    }

    #[test]
    fn test_font_size_in_other_units_is_converted_to_points() {
        let snap = snapshot(
            "[base]\nvalue = 16\nunit = \"px\"\nrole = \"base-font-size\"\n[gap]\nvalue = 1\nunit = \"em\"\n",
        );
        let metric = governing_font(&snap, snap.get("gap").unwrap()).unwrap();
        assert_eq!(metric.size_pt, 12.0);
    }

    #[test]
    fn test_missing_base_font_is_reported() {
        let snap = snapshot("[gap]\nvalue = 1\nunit = \"em\"\n");
        let err = governing_font(&snap, snap.get("gap").unwrap()).unwrap_err();
        match err {
            StyleError::MissingFontMetric { token_id, reason } => {
                assert_eq!(token_id, "gap");
                assert!(reason.contains("base-font-size"));
            }
            other => panic!("expected MissingFontMetric, got {other:?}"),
        }
    }

    #[test]
    fn test_font_relative_governing_font_is_rejected() {
        let snap = snapshot(
            "[base]\nvalue = 1\nunit = \"em\"\nrole = \"base-font-size\"\n[gap]\nvalue = 1\nunit = \"em\"\n",
        );
        let err = governing_font(&snap, snap.get("gap").unwrap()).unwrap_err();
        assert!(err.to_string().contains("itself font-relative"));
    }

    #[test]
    fn test_zero_font_size_is_rejected() {
        let snap = snapshot(
            "[base]\nvalue = 0\nunit = \"pt\"\nrole = \"base-font-size\"\n[gap]\nvalue = 1\nunit = \"em\"\n",
        );
        assert!(matches!(
            governing_font(&snap, snap.get("gap").unwrap()),
            Err(StyleError::MissingFontMetric { .. })
        ));
    }
}
