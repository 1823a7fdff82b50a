//! Topological resolution of `computed` chains.
//!
//! A chain is walked from the requested token back to its literal root with a
//! visited set; formulas are then applied root-outward. Revisiting a token is a
//! cycle and fails with `CyclicTokenError` instead of looping.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::errors::StyleError;
use crate::tokens::model::{Derivation, Formula, SourceUnit, TokenValue};
use crate::tokens::snapshot::TokenSnapshot;
use crate::units::convert::points_to;

/// A token's literal value after its derivation chain has been applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedToken {
    pub id: String,
    pub value: TokenValue,
    pub unit: SourceUnit,
    /// First `font` reference found walking from the token towards its root.
    pub font: Option<String>,
}

/// One link of a derivation chain, borrowed from whatever stores the tokens.
pub(crate) enum Link<'a> {
    Literal {
        value: &'a TokenValue,
        unit: SourceUnit,
        font: Option<&'a str>,
    },
    Computed {
        from: &'a str,
        formula: &'a Formula,
        font: Option<&'a str>,
    },
}

/// Resolves `id` through `lookup`. `lookup` returns `None` for unknown ids.
pub(crate) fn resolve_chain<'a, F>(id: &str, lookup: F) -> Result<ResolvedToken, StyleError>
where
    F: Fn(&str) -> Option<Link<'a>>,
{
    let mut path: Vec<String> = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut steps: Vec<(String, &'a Formula)> = Vec::new();
    let mut font: Option<String> = None;
    let mut current = id.to_string();

    let (root_value, root_unit) = loop {
        if !visited.insert(current.clone()) {
            let start = path.iter().position(|p| *p == current).unwrap_or(0);
            let mut cycle: Vec<String> = path[start..].to_vec();
            cycle.push(current);
            return Err(StyleError::CyclicToken { cycle });
        }
        path.push(current.clone());

        let link = lookup(&current).ok_or_else(|| {
            let referrer = path.len().checked_sub(2).map(|i| path[i].as_str());
            StyleError::token_parse(
                referrer.or(Some(current.as_str())),
                format!("unresolved token reference '{current}'"),
            )
        })?;

        match link {
            Link::Literal {
                value,
                unit,
                font: f,
            } => {
                if font.is_none() {
                    font = f.map(str::to_string);
                }
                break (value.clone(), unit);
            }
            Link::Computed {
                from,
                formula,
                font: f,
            } => {
                if font.is_none() {
                    font = f.map(str::to_string);
                }
                steps.push((current.clone(), formula));
                current = from.to_string();
            }
        }
    };

    let mut value = root_value;
    let mut unit = root_unit;
    for (step_id, formula) in steps.iter().rev() {
        let (v, u) = apply_formula(formula, &value, unit)
            .map_err(|msg| StyleError::token_parse(Some(step_id), msg))?;
        value = v;
        unit = u;
    }

    Ok(ResolvedToken {
        id: id.to_string(),
        value,
        unit,
        font,
    })
}

/// Applies one derivation step. Scale and offset keep the unit; `Convert` changes it.
pub(crate) fn apply_formula(
    formula: &Formula,
    value: &TokenValue,
    unit: SourceUnit,
) -> Result<(TokenValue, SourceUnit), String> {
    match formula {
        Formula::Identity => Ok((value.clone(), unit)),
        Formula::Scale { factor } => {
            let n = numeric(value, formula, unit)?;
            Ok((TokenValue::Number(n * factor), unit))
        }
        Formula::Offset { delta } => {
            let n = numeric(value, formula, unit)?;
            Ok((TokenValue::Number(n + delta), unit))
        }
        Formula::Convert {
            from,
            to,
            font_size_pt,
        } => {
            if *from != unit {
                return Err(format!("{formula} applied to a value in {unit}"));
            }
            let n = numeric(value, formula, unit)?;
            let points = match unit {
                SourceUnit::FontRelative => {
                    let pt = font_size_pt
                        .ok_or_else(|| format!("{formula} lacks a governing font size"))?;
                    n * pt
                }
                SourceUnit::AbsoluteLength(u) => n * u.points_per_unit(),
                other => return Err(format!("{formula} cannot convert a {other} value")),
            };
            Ok((
                TokenValue::Number(points_to(*to, points)),
                SourceUnit::AbsoluteLength(*to),
            ))
        }
    }
}

fn numeric(value: &TokenValue, formula: &Formula, unit: SourceUnit) -> Result<f64, String> {
    match (value, unit) {
        (TokenValue::Number(n), u) if u != SourceUnit::Color && u != SourceUnit::Glyph => Ok(*n),
        _ => Err(format!(
            "formula '{formula}' requires a numeric source, found '{value}' ({unit})"
        )),
    }
}

/// Resolves a token of a published snapshot to its literal value.
pub fn resolve(snapshot: &TokenSnapshot, token_id: &str) -> Result<ResolvedToken, StyleError> {
    resolve_chain(token_id, |id| {
        snapshot.get(id).map(|t| match &t.derivation {
            Derivation::Literal => Link::Literal {
                value: &t.value,
                unit: t.unit,
                font: t.font.as_deref(),
            },
            Derivation::Computed { from, formula } => Link::Computed {
                from,
                formula,
                font: t.font.as_deref(),
            },
        })
    })
}
