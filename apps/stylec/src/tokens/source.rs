//! Strict parser for the TOML token source.
//!
//! Any table holding `value` or `derived_from` is a token leaf; every other table is
//! a namespace. The leaf id is its dotted path from the document root:
//!
//! ```toml
//! [spacing.bullet-indent]
//! value = 1
//! unit = "em"
//! role = "bullet-indent"
//!
//! [spacing.bullet-hanging]
//! derived_from = "spacing.bullet-indent"
//! formula = "scale(0.5)"
//! ```

use toml::{Table, Value};

use crate::errors::StyleError;
use crate::tokens::model::{normalize_hex_color, Formula, SourceUnit, TokenValue};

const LITERAL_KEYS: &[&str] = &["value", "unit", "role", "font"];
const COMPUTED_KEYS: &[&str] = &["derived_from", "formula", "role", "font"];

/// One token leaf as written in the source, before resolution.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawEntry {
    pub id: String,
    pub role: String,
    pub kind: RawKind,
    pub font: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RawKind {
    Literal { value: TokenValue, unit: SourceUnit },
    Computed { from: String, formula: Formula },
}

/// Parses a token source document into leaves, in source order.
pub(crate) fn parse_source(source: &str) -> Result<Vec<RawEntry>, StyleError> {
    let table: Table = toml::from_str(source)
        .map_err(|e| StyleError::token_parse(None, format!("malformed token source: {e}")))?;

    let mut entries = Vec::new();
    walk(&table, "", &mut entries)?;

    if entries.is_empty() {
        return Err(StyleError::token_parse(None, "token source declares no tokens"));
    }
    Ok(entries)
}

fn walk(table: &Table, prefix: &str, out: &mut Vec<RawEntry>) -> Result<(), StyleError> {
    for (key, value) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Table(inner) if is_leaf(inner) => out.push(parse_leaf(&path, key, inner)?),
            Value::Table(inner) => walk(inner, &path, out)?,
            other => {
                return Err(StyleError::token_parse(
                    Some(&path),
                    format!(
                        "expected a token table or namespace, found {}",
                        other.type_str()
                    ),
                ))
            }
        }
    }
    Ok(())
}

fn is_leaf(table: &Table) -> bool {
    table.contains_key("value") || table.contains_key("derived_from")
}

fn parse_leaf(id: &str, key: &str, table: &Table) -> Result<RawEntry, StyleError> {
    if table.contains_key("value") && table.contains_key("derived_from") {
        return Err(StyleError::token_parse(
            Some(id),
            "a token declares either `value` or `derived_from`, not both",
        ));
    }

    let allowed = if table.contains_key("value") {
        LITERAL_KEYS
    } else {
        COMPUTED_KEYS
    };
    if let Some(unknown) = table.keys().find(|k| !allowed.contains(&k.as_str())) {
        return Err(StyleError::token_parse(
            Some(id),
            format!("unknown key `{unknown}`"),
        ));
    }

    let role = match table.get("role") {
        Some(v) => string_field(id, "role", v)?,
        None => key.to_string(),
    };
    let font = table
        .get("font")
        .map(|v| string_field(id, "font", v))
        .transpose()?;

    let kind = if let Some(raw_value) = table.get("value") {
        let unit_name = table
            .get("unit")
            .ok_or_else(|| StyleError::token_parse(Some(id), "missing `unit`"))
            .and_then(|v| string_field(id, "unit", v))?;
        let unit = SourceUnit::parse(&unit_name)
            .ok_or_else(|| StyleError::token_parse(Some(id), format!("unknown unit '{unit_name}'")))?;
        let value = parse_value(id, raw_value, unit)?;
        RawKind::Literal { value, unit }
    } else {
        let from = table
            .get("derived_from")
            .map(|v| string_field(id, "derived_from", v))
            .transpose()?
            .unwrap_or_default();
        let formula = match table.get("formula") {
            Some(v) => {
                let text = string_field(id, "formula", v)?;
                Formula::parse(&text).map_err(|msg| StyleError::token_parse(Some(id), msg))?
            }
            None => Formula::Identity,
        };
        RawKind::Computed { from, formula }
    };

    Ok(RawEntry {
        id: id.to_string(),
        role,
        kind,
        font,
    })
}

fn parse_value(id: &str, raw: &Value, unit: SourceUnit) -> Result<TokenValue, StyleError> {
    match unit {
        SourceUnit::FontRelative | SourceUnit::AbsoluteLength(_) => {
            number_field(id, raw).map(TokenValue::Number)
        }
        SourceUnit::Color => {
            let text = string_field(id, "value", raw)?;
            normalize_hex_color(&text)
                .map(TokenValue::Text)
                .ok_or_else(|| StyleError::token_parse(Some(id), format!("malformed color '{text}'")))
        }
        SourceUnit::Glyph => {
            let text = string_field(id, "value", raw)?;
            if text.is_empty() {
                return Err(StyleError::token_parse(Some(id), "glyph value is empty"));
            }
            Ok(TokenValue::Text(text))
        }
        SourceUnit::None => match raw {
            Value::String(s) => Ok(TokenValue::Text(s.clone())),
            other => number_field(id, other).map(TokenValue::Number),
        },
    }
}

fn number_field(id: &str, raw: &Value) -> Result<f64, StyleError> {
    let n = match raw {
        Value::Integer(i) => *i as f64,
        Value::Float(f) => *f,
        Value::String(s) => {
            return Err(StyleError::token_parse(
                Some(id),
                format!("malformed numeric literal '{s}'"),
            ))
        }
        other => {
            return Err(StyleError::token_parse(
                Some(id),
                format!("expected a number, found {}", other.type_str()),
            ))
        }
    };
    if !n.is_finite() {
        return Err(StyleError::token_parse(
            Some(id),
            format!("malformed numeric literal '{n}'"),
        ));
    }
    Ok(n)
}

fn string_field(id: &str, field: &str, raw: &Value) -> Result<String, StyleError> {
    raw.as_str().map(str::to_string).ok_or_else(|| {
        StyleError::token_parse(
            Some(id),
            format!("`{field}` must be a string, found {}", raw.type_str()),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::model::LengthUnit;

    fn parse_err(src: &str) -> String {
        match parse_source(src) {
            Err(e) => e.to_string(),
            Ok(entries) => panic!("expected parse error, got {entries:?}"),
        }
    }

    #[test]
    fn test_nested_tables_produce_dotted_ids_in_order() {
        let src = r##"
[spacing.bullet-indent]
value = 1
unit = "em"
role = "bullet-indent"

[color.text]
value = "#1F2937"
unit = "color"
"##;
        let entries = parse_source(src).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "spacing.bullet-indent");
        assert_eq!(entries[0].role, "bullet-indent");
        assert_eq!(entries[1].id, "color.text");
        // role defaults to the leaf key
        assert_eq!(entries[1].role, "text");
        assert_eq!(
            entries[1].kind,
            RawKind::Literal {
                value: TokenValue::Text("#1f2937".into()),
                unit: SourceUnit::Color
            }
        );
    }

    #[test]
    fn test_computed_leaf_defaults_to_identity() {
        let src = r#"
[a]
value = 12
unit = "pt"
[b]
derived_from = "a"
font = "a"
"#;
        let entries = parse_source(src).unwrap();
        assert_eq!(
            entries[0].kind,
            RawKind::Literal {
                value: TokenValue::Number(12.0),
                unit: SourceUnit::AbsoluteLength(LengthUnit::Pt)
            }
        );
        assert_eq!(
            entries[1].kind,
            RawKind::Computed {
                from: "a".into(),
                formula: Formula::Identity
            }
        );
        assert_eq!(entries[1].font.as_deref(), Some("a"));
    }

    #[test]
    fn test_unknown_unit_is_rejected() {
        let msg = parse_err("[a]\nvalue = 1\nunit = \"rem\"\n");
        assert!(msg.contains("unknown unit 'rem'"), "{msg}");
    }

    #[test]
    fn test_string_length_is_malformed_numeric_literal() {
        let msg = parse_err("[a]\nvalue = \"1.5\"\nunit = \"em\"\n");
        assert!(msg.contains("malformed numeric literal '1.5'"), "{msg}");
    }

    #[test]
    fn test_non_finite_number_is_rejected() {
        let msg = parse_err("[a]\nvalue = nan\nunit = \"pt\"\n");
        assert!(msg.contains("malformed numeric literal"), "{msg}");
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let msg = parse_err("[a]\nvalue = 1\nunit = \"pt\"\ncolour = \"red\"\n");
        assert!(msg.contains("unknown key `colour`"), "{msg}");
    }

    #[test]
    fn test_value_and_derived_from_are_exclusive() {
        let msg = parse_err("[a]\nvalue = 1\nunit = \"pt\"\nderived_from = \"b\"\n");
        assert!(msg.contains("not both"), "{msg}");
    }

    #[test]
    fn test_missing_unit_is_rejected() {
        let msg = parse_err("[a]\nvalue = 1\n");
        assert!(msg.contains("missing `unit`"), "{msg}");
    }

    #[test]
    fn test_scalar_outside_leaf_is_rejected() {
        let msg = parse_err("name = \"classic\"\n");
        assert!(msg.contains("expected a token table"), "{msg}");
    }

    #[test]
    fn test_malformed_toml_and_empty_source() {
        assert!(parse_err("[a\nvalue = 1").contains("malformed token source"));
        assert!(parse_err("").contains("declares no tokens"));
    }

    #[test]
    fn test_bad_formula_is_reported() {
        let msg = parse_err("[a]\nvalue = 1\nunit = \"pt\"\n[b]\nderived_from = \"a\"\nformula = \"scale(x)\"\n");
        assert!(msg.contains("in 'b'"), "{msg}");
        assert!(msg.contains("malformed numeric literal 'x'"), "{msg}");
    }
}
