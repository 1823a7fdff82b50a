//! Stylesheet compiler: template layers + token snapshot → one flat stylesheet.
//!
//! Placeholders are substituted per target (`em` survives in preview, becomes `cm`
//! in print), the layers are resolved through the cascade, and the winners are
//! emitted in first-appearance order. The emitted text is then parsed back and
//! every protected declaration is checked against what actually came out.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::errors::{StyleError, TemplateLocation};
use crate::pipeline::artifact::{ArtifactContent, CompiledArtifact, RuleKey, Target};
use crate::stylesheet::cascade::{Applied, Cascade, CascadedDeclaration, Precedence};
use crate::stylesheet::template::TargetTemplate;
use crate::tokens::model::{SourceUnit, Token, TokenValue};
use crate::tokens::snapshot::{SnapshotVersion, TokenSnapshot};
use crate::units::{format_number, ConvertedTokens};

/// Compiles `template` against `snapshot`.
///
/// `converted` must come from the same snapshot; print lengths are read from it.
pub fn compile(
    snapshot: &TokenSnapshot,
    converted: &ConvertedTokens,
    template: &TargetTemplate,
) -> Result<CompiledArtifact, StyleError> {
    let target = template.target;
    if !target.is_stylesheet() {
        return Err(StyleError::Internal(format!(
            "{target} is not a stylesheet target"
        )));
    }
    if converted.snapshot_version != *snapshot.version() {
        return Err(StyleError::Internal(format!(
            "converted tokens belong to {}, snapshot is {}",
            converted.snapshot_version,
            snapshot.version()
        )));
    }

    let mut cascade = Cascade::new();
    let mut order = 0;
    for (layer_idx, layer) in template.layers.iter().enumerate() {
        for rule in &layer.rules {
            for decl in &rule.declarations {
                order += 1;
                let location = TemplateLocation::at_line(&layer.name, decl.line);
                let (value, token) =
                    substitute(&decl.value, &location, target, snapshot, converted)?;
                let candidate = CascadedDeclaration {
                    value,
                    precedence: Precedence {
                        important: decl.important,
                        layer: layer_idx,
                        order,
                    },
                    location,
                    token,
                };
                match cascade.apply(&rule.selector, &decl.property, candidate) {
                    Applied::Won(Some(displaced)) => debug!(
                        artifact = %target,
                        selector = %rule.selector,
                        property = %decl.property,
                        displaced = %displaced.location,
                        winner = %TemplateLocation::at_line(&layer.name, decl.line),
                        "Declaration overridden"
                    ),
                    Applied::Lost => debug!(
                        artifact = %target,
                        selector = %rule.selector,
                        property = %decl.property,
                        loser = %TemplateLocation::at_line(&layer.name, decl.line),
                        "Declaration lost the cascade"
                    ),
                    Applied::Won(None) => {}
                }
            }
        }
    }

    let css = emit(target, snapshot.version(), &cascade);

    let mut rule_provenance = BTreeMap::new();
    for (selector, decls) in cascade.rules() {
        for (property, decl) in decls {
            if let Some(token_id) = &decl.token {
                rule_provenance.insert(RuleKey::new(selector, property), token_id.clone());
            }
        }
    }

    check_protected(template, &cascade, &css, snapshot, converted)?;

    info!(
        artifact = %target,
        snapshot = %snapshot.version(),
        rules = cascade.rules().count(),
        bound = rule_provenance.len(),
        "Stylesheet compiled"
    );

    Ok(CompiledArtifact {
        target,
        snapshot_version: snapshot.version().clone(),
        content: ArtifactContent::Stylesheet(css),
        rule_provenance,
        bindings: template.bindings(),
    })
}

/// Replaces the (single) placeholder in `raw`. Returns the bound token id, if any.
fn substitute(
    raw: &str,
    location: &TemplateLocation,
    target: Target,
    snapshot: &TokenSnapshot,
    converted: &ConvertedTokens,
) -> Result<(String, Option<String>), StyleError> {
    let Some(start) = raw.find("{{") else {
        return Ok((raw.to_string(), None));
    };
    let end = raw[start..]
        .find("}}")
        .map(|offset| start + offset)
        .ok_or_else(|| StyleError::template(location.clone(), "unterminated placeholder"))?;
    let token_id = raw[start + 2..end].trim();
    let token = snapshot
        .get(token_id)
        .ok_or_else(|| StyleError::UnboundPlaceholder {
            token_id: token_id.to_string(),
            location: location.clone(),
        })?;
    let value = emit_value(token, target, converted)?;
    Ok((
        format!("{}{}{}", &raw[..start], value, &raw[end + 2..]),
        Some(token_id.to_string()),
    ))
}

/// Renders a token value in the unit system of `target`.
pub fn emit_value(
    token: &Token,
    target: Target,
    converted: &ConvertedTokens,
) -> Result<String, StyleError> {
    match (token.unit, &token.value) {
        (SourceUnit::FontRelative, TokenValue::Number(n)) => match target {
            Target::Preview => Ok(format!("{}em", format_number(*n))),
            _ => {
                let cm = converted.cm(&token.id).ok_or_else(|| {
                    StyleError::Internal(format!("no converted length for '{}'", token.id))
                })?;
                Ok(format!("{}cm", format_number(cm)))
            }
        },
        (SourceUnit::AbsoluteLength(unit), TokenValue::Number(n)) => {
            Ok(format!("{}{}", format_number(*n), unit.suffix()))
        }
        (SourceUnit::Color, TokenValue::Text(hex)) => Ok(hex.clone()),
        (SourceUnit::Glyph, TokenValue::Text(glyph)) => {
            Ok(glyph.replace('\\', "\\\\").replace('"', "\\\""))
        }
        (SourceUnit::None, TokenValue::Number(n)) => Ok(format_number(*n)),
        (SourceUnit::None, TokenValue::Text(text)) => Ok(text.clone()),
        (unit, value) => Err(StyleError::Conversion {
            token_id: token.id.clone(),
            message: format!("cannot emit '{value}' as {unit}"),
        }),
    }
}

fn emit(target: Target, version: &SnapshotVersion, cascade: &Cascade) -> String {
    let mut out = format!("/* stylec: target={target} snapshot={version} */\n");
    for (selector, decls) in cascade.rules() {
        out.push('\n');
        out.push_str(&format!("{selector} {{\n"));
        for (property, decl) in decls {
            let important = if decl.precedence.important {
                " !important"
            } else {
                ""
            };
            out.push_str(&format!("  {property}: {}{important};\n", decl.value));
        }
        out.push_str("}\n");
    }
    out
}

/// Every protected declaration must appear in the emitted text with its token value.
fn check_protected(
    template: &TargetTemplate,
    cascade: &Cascade,
    css: &str,
    snapshot: &TokenSnapshot,
    converted: &ConvertedTokens,
) -> Result<(), StyleError> {
    let target = template.target;
    let emitted = Cascade::from_emitted(&format!("{target}.css"), css)?;

    for protected in template.protected_rules() {
        let (expected, _) = substitute(
            &protected.value,
            &protected.location,
            target,
            snapshot,
            converted,
        )?;
        let reason = match emitted.effective(&protected.selector, &protected.property) {
            None => Some("was removed from the output".to_string()),
            Some(actual) if actual.value != expected => {
                let by = cascade
                    .effective(&protected.selector, &protected.property)
                    .map(|w| w.location.to_string())
                    .unwrap_or_else(|| actual.location.to_string());
                Some(format!(
                    "is overridden by {by} with '{}' (expected '{expected}')",
                    actual.value
                ))
            }
            Some(_) => None,
        };
        if let Some(reason) = reason {
            return Err(StyleError::ProtectedRuleViolation {
                target,
                selector: protected.selector,
                property: protected.property,
                token_id: protected.token_id,
                location: protected.location,
                reason,
            });
        }
    }
    Ok(())
}
