//! Explicit cascade resolution for stylesheet targets.
//!
//! Precedence, highest first:
//! 1. `!important` declarations over normal ones;
//! 2. a later template layer over an earlier one (`base` < target layer);
//! 3. later source order within the same layer.
//!
//! Selectors match by exact (whitespace-normalized) text; there is no specificity
//! calculation because templates address each element through one selector.

use std::collections::HashMap;

use crate::errors::{StyleError, TemplateLocation};
use crate::stylesheet::parse::parse_stylesheet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Precedence {
    pub important: bool,
    pub layer: usize,
    pub order: usize,
}

/// A declaration competing in the cascade.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadedDeclaration {
    pub value: String,
    pub precedence: Precedence,
    pub location: TemplateLocation,
    /// Token whose placeholder produced the value, if any.
    pub token: Option<String>,
}

/// Outcome of offering a declaration to the cascade.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// New winner; carries the declaration it displaced, if any.
    Won(Option<CascadedDeclaration>),
    /// An existing declaration has higher precedence.
    Lost,
}

#[derive(Debug, Clone, Default)]
pub struct Cascade {
    /// Selectors in first-appearance order, each with properties in first-appearance order.
    rules: Vec<(String, Vec<String>)>,
    winners: HashMap<(String, String), CascadedDeclaration>,
}

impl Cascade {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, selector: &str, property: &str, decl: CascadedDeclaration) -> Applied {
        let key = (selector.to_string(), property.to_string());
        match self.winners.get(&key) {
            Some(existing) if existing.precedence > decl.precedence => Applied::Lost,
            _ => {
                self.record_position(selector, property);
                Applied::Won(self.winners.insert(key, decl))
            }
        }
    }

    fn record_position(&mut self, selector: &str, property: &str) {
        let idx = match self.rules.iter().position(|(s, _)| s == selector) {
            Some(i) => i,
            None => {
                self.rules.push((selector.to_string(), Vec::new()));
                self.rules.len() - 1
            }
        };
        let props = &mut self.rules[idx].1;
        if !props.iter().any(|p| p == property) {
            props.push(property.to_string());
        }
    }

    /// The winning declaration for `selector { property }`.
    pub fn effective(&self, selector: &str, property: &str) -> Option<&CascadedDeclaration> {
        self.winners
            .get(&(selector.to_string(), property.to_string()))
    }

    /// Flattened rules in first-appearance order.
    pub fn rules(&self) -> impl Iterator<Item = (&str, Vec<(&str, &CascadedDeclaration)>)> + '_ {
        self.rules.iter().map(move |(selector, props)| {
            let decls = props
                .iter()
                .filter_map(|p| {
                    self.winners
                        .get(&(selector.clone(), p.clone()))
                        .map(|d| (p.as_str(), d))
                })
                .collect();
            (selector.as_str(), decls)
        })
    }

    /// Rebuilds the cascade of an emitted stylesheet (a single layer).
    ///
    /// The emitted text no longer carries placeholders, so `token` is always `None`;
    /// provenance travels separately on the artifact.
    pub fn from_emitted(name: &str, text: &str) -> Result<Self, StyleError> {
        let mut cascade = Cascade::new();
        let mut order = 0;
        for rule in parse_stylesheet(name, text)? {
            for decl in rule.declarations {
                order += 1;
                cascade.apply(
                    &rule.selector,
                    &decl.property,
                    CascadedDeclaration {
                        value: decl.value,
                        precedence: Precedence {
                            important: decl.important,
                            layer: 0,
                            order,
                        },
                        location: TemplateLocation::at_line(name, decl.line),
                        token: None,
                    },
                );
            }
        }
        Ok(cascade)
    }
}
