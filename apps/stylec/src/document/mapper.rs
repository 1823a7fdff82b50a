//! Document Style Mapper: tokens → paragraph, run and border styles.
//!
//! Lengths are read from the converted (`cm`) tokens only, never from the raw `em`
//! value, so the document target sees exactly the numbers the print stylesheet sees.

use std::collections::BTreeMap;

use tracing::info;

use crate::document::model::{
    BorderSpec, DocumentStyleTree, EighthPoints, HalfPoints, ParagraphStyle, RunStyle, Twips,
};
use crate::document::template::{DocumentTemplate, DOCUMENT_TEMPLATE_NAME};
use crate::errors::{StyleError, TemplateLocation};
use crate::pipeline::artifact::{ArtifactContent, CompiledArtifact, RuleKey, Target};
use crate::tokens::model::{SourceUnit, Token, TokenValue};
use crate::tokens::snapshot::TokenSnapshot;
use crate::units::{format_number, ConvertedTokens};

/// Looks up bound tokens and records which field each one ends up in.
struct Binder<'a> {
    snapshot: &'a TokenSnapshot,
    converted: &'a ConvertedTokens,
    provenance: BTreeMap<RuleKey, String>,
}

impl<'a> Binder<'a> {
    fn token(&mut self, scope: &str, field: &str, token_id: &str) -> Result<&'a Token, StyleError> {
        let snapshot = self.snapshot;
        let token = snapshot
            .get(token_id)
            .ok_or_else(|| StyleError::UnboundPlaceholder {
                token_id: token_id.to_string(),
                location: location(scope, field),
            })?;
        self.provenance
            .insert(RuleKey::new(scope, field), token_id.to_string());
        Ok(token)
    }

    fn length_cm(&mut self, scope: &str, field: &str, token_id: &str) -> Result<f64, StyleError> {
        let token = self.token(scope, field, token_id)?;
        if !token.unit.is_length() {
            return Err(wrong_kind(scope, field, token, "a length"));
        }
        self.converted.cm(token_id).ok_or_else(|| {
            StyleError::Internal(format!("no converted length for '{token_id}'"))
        })
    }

    fn color(&mut self, scope: &str, field: &str, token_id: &str) -> Result<String, StyleError> {
        let token = self.token(scope, field, token_id)?;
        match (token.unit, &token.value) {
            (SourceUnit::Color, TokenValue::Text(hex)) => {
                Ok(hex.trim_start_matches('#').to_string())
            }
            _ => Err(wrong_kind(scope, field, token, "a color")),
        }
    }

    fn text(&mut self, scope: &str, field: &str, token_id: &str) -> Result<String, StyleError> {
        let token = self.token(scope, field, token_id)?;
        match (token.unit, &token.value) {
            (SourceUnit::Glyph | SourceUnit::None, TokenValue::Text(text)) => Ok(text.clone()),
            _ => Err(wrong_kind(scope, field, token, "text")),
        }
    }

    fn weight(&mut self, scope: &str, field: &str, token_id: &str) -> Result<u16, StyleError> {
        let token = self.token(scope, field, token_id)?;
        match (token.unit, &token.value) {
            (SourceUnit::None, TokenValue::Number(n)) if (1.0..=1000.0).contains(n) => {
                Ok(n.round() as u16)
            }
            _ => Err(wrong_kind(scope, field, token, "a weight between 1 and 1000")),
        }
    }

    fn twips(
        &mut self,
        scope: &str,
        field: &str,
        token_id: Option<&String>,
    ) -> Result<Option<Twips>, StyleError> {
        token_id
            .map(|id| self.length_cm(scope, field, id).map(Twips::from_cm))
            .transpose()
    }
}

fn location(scope: &str, field: &str) -> TemplateLocation {
    TemplateLocation::at_field(DOCUMENT_TEMPLATE_NAME, &format!("{scope}.{field}"))
}

fn wrong_kind(scope: &str, field: &str, token: &Token, expected: &str) -> StyleError {
    let shown = match &token.value {
        TokenValue::Number(n) => format_number(*n),
        TokenValue::Text(s) => s.clone(),
    };
    StyleError::template(
        location(scope, field),
        format!(
            "'{}' is '{shown}' ({}), expected {expected}",
            token.id, token.unit
        ),
    )
}

/// Maps `template` onto `snapshot`, producing the document style tree.
pub fn compile(
    snapshot: &TokenSnapshot,
    converted: &ConvertedTokens,
    template: &DocumentTemplate,
) -> Result<CompiledArtifact, StyleError> {
    if converted.snapshot_version != *snapshot.version() {
        return Err(StyleError::Internal(format!(
            "converted tokens belong to {}, snapshot is {}",
            converted.snapshot_version,
            snapshot.version()
        )));
    }

    let mut binder = Binder {
        snapshot,
        converted,
        provenance: BTreeMap::new(),
    };

    let mut runs = BTreeMap::new();
    for (name, b) in &template.run {
        let scope = format!("run.{name}");
        let size_cm = binder.length_cm(&scope, "size", &b.size)?;
        let run = RunStyle {
            typeface: binder.text(&scope, "typeface", &b.typeface)?,
            size: HalfPoints::from_cm(size_cm),
            weight: b
                .weight
                .as_ref()
                .map(|id| binder.weight(&scope, "weight", id))
                .transpose()?,
            italic: b.italic,
            color: binder.color(&scope, "color", &b.color)?,
        };
        runs.insert(name.clone(), run);
    }

    let mut borders = BTreeMap::new();
    for (name, b) in &template.border {
        let scope = format!("border.{name}");
        let width_cm = binder.length_cm(&scope, "width", &b.width)?;
        let border = BorderSpec {
            edges: b.edges.clone(),
            width: EighthPoints::from_cm(width_cm),
            color: binder.color(&scope, "color", &b.color)?,
            fill: b
                .fill
                .as_ref()
                .map(|id| binder.color(&scope, "fill", id))
                .transpose()?,
        };
        borders.insert(name.clone(), border);
    }

    let mut paragraphs = BTreeMap::new();
    for (name, b) in &template.paragraph {
        let scope = format!("paragraph.{name}");
        let paragraph = ParagraphStyle {
            alignment: b.alignment,
            spacing_before: binder.twips(&scope, "spacing_before", b.spacing_before.as_ref())?,
            spacing_after: binder.twips(&scope, "spacing_after", b.spacing_after.as_ref())?,
            indent_left: binder.twips(&scope, "indent_left", b.indent_left.as_ref())?,
            indent_hanging: binder.twips(&scope, "indent_hanging", b.indent_hanging.as_ref())?,
            bullet: b
                .bullet
                .as_ref()
                .map(|id| binder.text(&scope, "bullet", id))
                .transpose()?,
            run: b.run.clone(),
            border: b.border.clone(),
        };
        paragraphs.insert(name.clone(), paragraph);
    }

    let tree = DocumentStyleTree {
        snapshot_version: snapshot.version().clone(),
        paragraphs,
        runs,
        borders,
    };

    info!(
        snapshot = %snapshot.version(),
        paragraphs = tree.paragraphs.len(),
        runs = tree.runs.len(),
        borders = tree.borders.len(),
        bound = binder.provenance.len(),
        "Document styles mapped"
    );

    Ok(CompiledArtifact {
        target: Target::Document,
        snapshot_version: snapshot.version().clone(),
        content: ArtifactContent::Document(tree),
        bindings: CompiledArtifact::bindings_of(&binder.provenance),
        rule_provenance: binder.provenance,
    })
}
