//! Document binding template (`document.toml`).
//!
//! Names the paragraph, run and border styles of the document target and binds each
//! of their fields to a token id.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::document::content::ContentKind;
use crate::document::model::{Alignment, BorderEdge};
use crate::errors::{StyleError, TemplateLocation};

pub const DOCUMENT_TEMPLATE_NAME: &str = "document.toml";
pub const DOCUMENT_TEMPLATE: &str = include_str!("../../templates/document.toml");

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParagraphBinding {
    #[serde(default)]
    pub alignment: Alignment,
    pub spacing_before: Option<String>,
    pub spacing_after: Option<String>,
    pub indent_left: Option<String>,
    pub indent_hanging: Option<String>,
    pub bullet: Option<String>,
    /// Run style name, not a token.
    pub run: Option<String>,
    /// Border style name, not a token.
    pub border: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunBinding {
    pub typeface: String,
    pub size: String,
    pub weight: Option<String>,
    #[serde(default)]
    pub italic: bool,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BorderBinding {
    pub edges: Vec<BorderEdge>,
    pub width: String,
    pub color: String,
    pub fill: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentTemplate {
    #[serde(default)]
    pub paragraph: BTreeMap<String, ParagraphBinding>,
    #[serde(default)]
    pub run: BTreeMap<String, RunBinding>,
    #[serde(default)]
    pub border: BTreeMap<String, BorderBinding>,
}

impl DocumentTemplate {
    pub fn builtin() -> Result<Self, StyleError> {
        Self::parse(DOCUMENT_TEMPLATE)
    }

    pub fn from_path(path: &Path) -> Result<Self, StyleError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, StyleError> {
        let template: DocumentTemplate = toml::from_str(text).map_err(|e| {
            let line = e
                .span()
                .map(|span| text[..span.start.min(text.len())].lines().count().max(1))
                .unwrap_or(1);
            StyleError::template(
                TemplateLocation::at_line(DOCUMENT_TEMPLATE_NAME, line),
                e.message().to_string(),
            )
        })?;
        template.check_references()?;
        Ok(template)
    }

    /// Every content kind needs a paragraph style, and style references must resolve.
    fn check_references(&self) -> Result<(), StyleError> {
        for kind in ContentKind::ALL {
            if !self.paragraph.contains_key(kind.style_name()) {
                return Err(StyleError::template(
                    TemplateLocation::at_field(DOCUMENT_TEMPLATE_NAME, "paragraph"),
                    format!(
                        "missing paragraph style '{}' (used for {})",
                        kind.style_name(),
                        kind.selector()
                    ),
                ));
            }
        }
        for (name, p) in &self.paragraph {
            if let Some(run) = &p.run {
                if !self.run.contains_key(run) {
                    return Err(StyleError::template(
                        TemplateLocation::at_field(
                            DOCUMENT_TEMPLATE_NAME,
                            &format!("paragraph.{name}.run"),
                        ),
                        format!("unknown run style '{run}'"),
                    ));
                }
            }
            if let Some(border) = &p.border {
                if !self.border.contains_key(border) {
                    return Err(StyleError::template(
                        TemplateLocation::at_field(
                            DOCUMENT_TEMPLATE_NAME,
                            &format!("paragraph.{name}.border"),
                        ),
                        format!("unknown border style '{border}'"),
                    ));
                }
            }
        }
        for (name, b) in &self.border {
            if b.edges.is_empty() {
                return Err(StyleError::template(
                    TemplateLocation::at_field(
                        DOCUMENT_TEMPLATE_NAME,
                        &format!("border.{name}.edges"),
                    ),
                    "a border needs at least one edge",
                ));
            }
        }
        Ok(())
    }
}
