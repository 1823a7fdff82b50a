//! Stylesheet rule templates per target.
//!
//! A target template is an ordered list of layers. The built-in set is
//! `base.css` + `preview.css` for the preview target and `base.css` + `print.css`
//! for print. Layer order is the cascade order (see `cascade.rs`).

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Serialize;

use crate::errors::{StyleError, TemplateLocation};
use crate::pipeline::artifact::{RuleKey, Target};
use crate::stylesheet::parse::{parse_stylesheet, placeholders, StyleRule};

pub const BASE_TEMPLATE: &str = include_str!("../../templates/base.css");
pub const PREVIEW_TEMPLATE: &str = include_str!("../../templates/preview.css");
pub const PRINT_TEMPLATE: &str = include_str!("../../templates/print.css");

#[derive(Debug, Clone)]
pub struct TemplateLayer {
    pub name: String,
    pub rules: Vec<StyleRule>,
}

/// A declaration the template guarantees to emit with its token-derived value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProtectedRule {
    pub token_id: String,
    pub selector: String,
    pub property: String,
    /// Declaration value as written in the template, placeholder included.
    pub value: String,
    pub location: TemplateLocation,
}

#[derive(Debug, Clone)]
pub struct TargetTemplate {
    pub target: Target,
    pub layers: Vec<TemplateLayer>,
}

impl TargetTemplate {
    /// Parses `(layer name, text)` pairs, lowest precedence first.
    pub fn from_sources(target: Target, sources: &[(&str, &str)]) -> Result<Self, StyleError> {
        let layers = sources
            .iter()
            .map(|(name, text)| {
                let rules = parse_stylesheet(name, text)?;
                check_rules(name, &rules)?;
                Ok(TemplateLayer {
                    name: name.to_string(),
                    rules,
                })
            })
            .collect::<Result<Vec<_>, StyleError>>()?;
        Ok(TargetTemplate { target, layers })
    }

    /// Every location each token is bound to, across all layers. Declarations that
    /// later lose the cascade are included.
    pub fn bindings(&self) -> BTreeMap<String, BTreeSet<RuleKey>> {
        let mut out: BTreeMap<String, BTreeSet<RuleKey>> = BTreeMap::new();
        for layer in &self.layers {
            for rule in &layer.rules {
                for decl in &rule.declarations {
                    for token_id in placeholders(&decl.value) {
                        out.entry(token_id.to_string())
                            .or_default()
                            .insert(RuleKey::new(&rule.selector, &decl.property));
                    }
                }
            }
        }
        out
    }

    /// Every declaration in a `@protected` rule that is bound to the protecting token.
    pub fn protected_rules(&self) -> Vec<ProtectedRule> {
        let mut out = Vec::new();
        for layer in &self.layers {
            for rule in &layer.rules {
                let Some(token_id) = &rule.protected else {
                    continue;
                };
                for decl in &rule.declarations {
                    if placeholders(&decl.value).contains(&token_id.as_str()) {
                        out.push(ProtectedRule {
                            token_id: token_id.clone(),
                            selector: rule.selector.clone(),
                            property: decl.property.clone(),
                            value: decl.value.clone(),
                            location: TemplateLocation::at_line(&layer.name, decl.line),
                        });
                    }
                }
            }
        }
        out
    }
}

/// Structural checks that do not need the token snapshot.
fn check_rules(name: &str, rules: &[StyleRule]) -> Result<(), StyleError> {
    for rule in rules {
        for decl in &rule.declarations {
            let ids = placeholders(&decl.value);
            if ids.len() > 1 {
                return Err(StyleError::template(
                    TemplateLocation::at_line(name, decl.line),
                    format!(
                        "'{}' binds {} tokens; a declaration may bind at most one",
                        decl.property,
                        ids.len()
                    ),
                ));
            }
            if ids.iter().any(|id| id.is_empty()) {
                return Err(StyleError::template(
                    TemplateLocation::at_line(name, decl.line),
                    "empty placeholder",
                ));
            }
        }
        if let Some(token_id) = &rule.protected {
            let bound = rule
                .declarations
                .iter()
                .any(|d| placeholders(&d.value).contains(&token_id.as_str()));
            if !bound {
                return Err(StyleError::template(
                    TemplateLocation::at_line(name, rule.line),
                    format!(
                        "@protected {token_id} annotates '{}', which does not reference it",
                        rule.selector
                    ),
                ));
            }
        }
    }
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// Template set
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TemplateSet {
    pub preview: TargetTemplate,
    pub print: TargetTemplate,
}

impl TemplateSet {
    /// The templates shipped with the binary.
    pub fn builtin() -> Result<Self, StyleError> {
        Self::from_texts(BASE_TEMPLATE, PREVIEW_TEMPLATE, PRINT_TEMPLATE)
    }

    /// Loads `base.css`, `preview.css` and `print.css` from `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self, StyleError> {
        let base = std::fs::read_to_string(dir.join("base.css"))?;
        let preview = std::fs::read_to_string(dir.join("preview.css"))?;
        let print = std::fs::read_to_string(dir.join("print.css"))?;
        Self::from_texts(&base, &preview, &print)
    }

    pub fn from_texts(base: &str, preview: &str, print: &str) -> Result<Self, StyleError> {
        Ok(TemplateSet {
            preview: TargetTemplate::from_sources(
                Target::Preview,
                &[("base.css", base), ("preview.css", preview)],
            )?,
            print: TargetTemplate::from_sources(
                Target::Print,
                &[("base.css", base), ("print.css", print)],
            )?,
        })
    }

    pub fn for_target(&self, target: Target) -> Option<&TargetTemplate> {
        match target {
            Target::Preview => Some(&self.preview),
            Target::Print => Some(&self.print),
            Target::Document => None,
        }
    }
}
