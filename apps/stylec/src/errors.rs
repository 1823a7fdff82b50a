use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::artifact::Target;
use crate::validate::report::DivergenceReport;

/// Where in a template a problem was found.
///
/// Stylesheet templates report `base.css:14`; the document binding template
/// reports the field path, e.g. `document.toml:paragraph.ListBullet.indent_left`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateLocation {
    pub template: String,
    pub position: String,
}

impl TemplateLocation {
    pub fn at_line(template: &str, line: usize) -> Self {
        TemplateLocation {
            template: template.to_string(),
            position: line.to_string(),
        }
    }

    pub fn at_field(template: &str, path: &str) -> Self {
        TemplateLocation {
            template: template.to_string(),
            position: path.to_string(),
        }
    }
}

impl fmt::Display for TemplateLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.template, self.position)
    }
}

/// Pipeline-level error type.
/// Every variant carries enough context (token id, template location) to fix the
/// problem without re-running the build under a debugger.
#[derive(Debug, Error)]
pub enum StyleError {
    #[error("Token parse error{}: {message}", .token_id.as_deref().map(|id| format!(" in '{id}'")).unwrap_or_default())]
    TokenParse {
        token_id: Option<String>,
        message: String,
    },

    #[error("Cyclic token derivation: {}", .cycle.join(" -> "))]
    CyclicToken { cycle: Vec<String> },

    #[error("Missing font metric for font-relative token '{token_id}': {reason}")]
    MissingFontMetric { token_id: String, reason: String },

    #[error("Cannot convert token '{token_id}': {message}")]
    Conversion { token_id: String, message: String },

    #[error("Unbound placeholder '{{{{{token_id}}}}}' at {location}")]
    UnboundPlaceholder {
        token_id: String,
        location: TemplateLocation,
    },

    #[error("Template error at {location}: {message}")]
    Template {
        location: TemplateLocation,
        message: String,
    },

    #[error("Protected rule violation in {target} stylesheet: '{selector} {{ {property} }}' bound to '{token_id}' (declared at {location}) {reason}")]
    ProtectedRuleViolation {
        target: Target,
        selector: String,
        property: String,
        token_id: String,
        location: TemplateLocation,
        reason: String,
    },

    #[error("Consistency divergence: {}", .report.summary_line())]
    ConsistencyDivergence { report: Box<DivergenceReport> },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StyleError {
    pub fn token_parse(token_id: Option<&str>, message: impl Into<String>) -> Self {
        StyleError::TokenParse {
            token_id: token_id.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn template(location: TemplateLocation, message: impl Into<String>) -> Self {
        StyleError::Template {
            location,
            message: message.into(),
        }
    }

    /// Process exit code for the `build` command.
    ///
    /// 1 = parse/conversion/template error, 2 = protected rule violation,
    /// 3 = consistency divergence (only raised in strict mode).
    pub fn exit_code(&self) -> u8 {
        match self {
            StyleError::ProtectedRuleViolation { .. } => 2,
            StyleError::ConsistencyDivergence { .. } => 3,
            StyleError::TokenParse { .. }
            | StyleError::CyclicToken { .. }
            | StyleError::MissingFontMetric { .. }
            | StyleError::Conversion { .. }
            | StyleError::UnboundPlaceholder { .. }
            | StyleError::Template { .. }
            | StyleError::Io(_)
            | StyleError::Internal(_) => 1,
        }
    }
}
