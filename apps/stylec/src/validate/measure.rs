//! Reads emitted values back out of compiled artifacts as comparable measurements.
//!
//! Stylesheet `em` values are resolved against the font size in effect for the
//! element that carries them: the selector's own `font-size`, else `body`, `html`
//! or `:root`. This mirrors what a browser does for the flat rule sets we emit.

use crate::document::model::{DocumentStyleTree, FieldValue};
use crate::pipeline::artifact::RuleKey;
use crate::stylesheet::cascade::Cascade;
use crate::tokens::model::{normalize_hex_color, LengthUnit};
use crate::units::{points_to, to_points, CM_PER_PT};
use crate::validate::report::MeasuredValue;

const FONT_FALLBACKS: [&str; 3] = ["body", "html", ":root"];

/// Measures `selector { property }`. `None` when the artifact does not emit it.
pub fn measure_stylesheet(cascade: &Cascade, key: &RuleKey) -> Option<(String, MeasuredValue)> {
    let decl = cascade.effective(&key.scope, &key.field)?;
    let value = classify(&decl.value, || font_size_pt(cascade, &key.scope));
    Some((decl.value.clone(), value))
}

/// Measures a document style field. `None` when the tree has no such field.
pub fn measure_document(tree: &DocumentStyleTree, key: &RuleKey) -> Option<(String, MeasuredValue)> {
    let value = match tree.field(&key.scope, &key.field)? {
        FieldValue::Length { cm } => MeasuredValue::Length { cm },
        FieldValue::Color(hex) => match normalize_hex_color(&hex) {
            Some(hex) => MeasuredValue::Color { hex },
            None => MeasuredValue::Unmeasurable {
                reason: format!("malformed color '{hex}'"),
            },
        },
        FieldValue::Text(value) => MeasuredValue::Text { value },
        FieldValue::Number(value) => MeasuredValue::Number { value },
    };
    Some((value.to_string(), value))
}

/// Length of `selector { property }` in cm; 0 when absent.
pub fn length_or_zero(cascade: &Cascade, selector: &str, property: &str) -> Result<f64, String> {
    let Some(decl) = cascade.effective(selector, property) else {
        return Ok(0.0);
    };
    match classify(&decl.value, || font_size_pt(cascade, selector)) {
        MeasuredValue::Length { cm } => Ok(cm),
        MeasuredValue::Number { value } if value == 0.0 => Ok(0.0),
        MeasuredValue::Unmeasurable { reason } => Err(reason),
        other => Err(format!("{selector} {{ {property} }} is {other}, not a length")),
    }
}

fn classify(raw: &str, font_pt: impl FnOnce() -> Result<f64, String>) -> MeasuredValue {
    let text = raw.trim();
    if text.starts_with('#') {
        return match normalize_hex_color(text) {
            Some(hex) => MeasuredValue::Color { hex },
            None => MeasuredValue::Unmeasurable {
                reason: format!("malformed color '{text}'"),
            },
        };
    }
    if let Some((n, suffix)) = split_number(text) {
        if suffix.is_empty() {
            return MeasuredValue::Number { value: n };
        }
        if suffix == "em" {
            return match font_pt() {
                Ok(pt) => MeasuredValue::Length {
                    cm: n * pt * CM_PER_PT,
                },
                Err(reason) => MeasuredValue::Unmeasurable { reason },
            };
        }
        if let Some(unit) = LengthUnit::from_suffix(suffix) {
            return MeasuredValue::Length {
                cm: points_to(LengthUnit::Cm, to_points(n, unit)),
            };
        }
    }
    MeasuredValue::Text {
        value: first_item(text),
    }
}

/// `"Inter", sans-serif` → `Inter`; `"\""` → `"`.
fn first_item(text: &str) -> String {
    let first = if text.starts_with('"') || text.starts_with('\'') {
        text
    } else {
        text.split(',').next().unwrap_or(text)
    };
    let mut out = first.trim();
    if let Some(quote) = out.chars().next().filter(|c| *c == '"' || *c == '\'') {
        out = out.strip_prefix(quote).unwrap_or(out);
        out = match out.find(quote).filter(|i| !out[..*i].ends_with('\\')) {
            Some(end) => &out[..end],
            None => out.rfind(quote).map(|end| &out[..end]).unwrap_or(out),
        };
    }
    out.replace("\\\"", "\"").replace("\\\\", "\\")
}

fn split_number(text: &str) -> Option<(f64, &str)> {
    let end = text
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || (i == 0 && (c == '-' || c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    if end == 0 {
        return None;
    }
    let n: f64 = text[..end].parse().ok()?;
    Some((n, &text[end..]))
}

/// Font size in points governing `selector`.
fn font_size_pt(cascade: &Cascade, selector: &str) -> Result<f64, String> {
    let candidates = std::iter::once(selector).chain(FONT_FALLBACKS);
    for candidate in candidates {
        let Some(decl) = cascade.effective(candidate, "font-size") else {
            continue;
        };
        let Some((n, suffix)) = split_number(decl.value.trim()) else {
            return Err(format!("font-size '{}' of {candidate} is not a length", decl.value));
        };
        if let Some(unit) = LengthUnit::from_suffix(suffix) {
            return Ok(to_points(n, unit));
        }
        if suffix == "em" && !FONT_FALLBACKS.contains(&candidate) {
            return font_size_pt(cascade, "body").map(|pt| n * pt);
        }
        return Err(format!(
            "font-size '{}' of {candidate} cannot be resolved",
            decl.value
        ));
    }
    Err(format!("no font-size governs '{selector}'"))
}
