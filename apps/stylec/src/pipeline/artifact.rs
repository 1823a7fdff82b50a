//! Targets, target descriptors and compiled artifacts.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::model::DocumentStyleTree;
use crate::document::template::DocumentTemplate;
use crate::stylesheet::template::{TargetTemplate, TemplateSet};
use crate::tokens::snapshot::SnapshotVersion;

// ────────────────────────────────────────────────────────────────────────────
// Targets
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// Screen preview stylesheet.
    Preview,
    /// Paper/PDF stylesheet.
    Print,
    /// Word-processor style objects.
    Document,
}

impl Target {
    pub const ALL: [Target; 3] = [Target::Preview, Target::Print, Target::Document];

    pub fn name(self) -> &'static str {
        match self {
            Target::Preview => "preview",
            Target::Print => "print",
            Target::Document => "document",
        }
    }

    pub fn unit_system(self) -> UnitSystem {
        match self {
            Target::Preview => UnitSystem::FontRelative,
            Target::Print => UnitSystem::AbsoluteLength,
            Target::Document => UnitSystem::StructuredStyle,
        }
    }

    pub fn is_stylesheet(self) -> bool {
        !matches!(self, Target::Document)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a target expresses lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnitSystem {
    /// `em` stays `em`; the browser resolves it against the element's font.
    FontRelative,
    /// Every length is physical (`cm`, `pt`).
    AbsoluteLength,
    /// Quantized word-processor units (twips, half-points, eighth-points).
    StructuredStyle,
}

#[derive(Debug, Clone)]
pub enum RulesTemplate {
    Stylesheet(TargetTemplate),
    Document(DocumentTemplate),
}

#[derive(Debug, Clone)]
pub struct TargetDescriptor {
    pub target: Target,
    pub unit_system: UnitSystem,
    pub rules_template: RulesTemplate,
}

impl TargetDescriptor {
    /// The fixed target set: preview, print, document.
    pub fn standard_set(templates: &TemplateSet, document: &DocumentTemplate) -> Vec<TargetDescriptor> {
        vec![
            TargetDescriptor {
                target: Target::Preview,
                unit_system: Target::Preview.unit_system(),
                rules_template: RulesTemplate::Stylesheet(templates.preview.clone()),
            },
            TargetDescriptor {
                target: Target::Print,
                unit_system: Target::Print.unit_system(),
                rules_template: RulesTemplate::Stylesheet(templates.print.clone()),
            },
            TargetDescriptor {
                target: Target::Document,
                unit_system: Target::Document.unit_system(),
                rules_template: RulesTemplate::Document(document.clone()),
            },
        ]
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Artifacts
// ────────────────────────────────────────────────────────────────────────────

/// Location of an emitted value: `selector`/`property` for stylesheets,
/// `style`/`field` for the document tree (e.g. `paragraph.ListBullet` / `indent_left`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleKey {
    pub scope: String,
    pub field: String,
}

impl RuleKey {
    pub fn new(scope: &str, field: &str) -> Self {
        RuleKey {
            scope: scope.to_string(),
            field: field.to_string(),
        }
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{ {} }}", self.scope, self.field)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum ArtifactContent {
    Stylesheet(String),
    Document(DocumentStyleTree),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledArtifact {
    pub target: Target,
    pub snapshot_version: SnapshotVersion,
    pub content: ArtifactContent,
    /// Emitted rule location → originating token id.
    pub rule_provenance: BTreeMap<RuleKey, String>,
    /// Token id → every location the template bound it to, including bindings
    /// that a later declaration overrode.
    pub bindings: BTreeMap<String, BTreeSet<RuleKey>>,
}

impl CompiledArtifact {
    pub fn stylesheet(&self) -> Option<&str> {
        match &self.content {
            ArtifactContent::Stylesheet(css) => Some(css),
            ArtifactContent::Document(_) => None,
        }
    }

    pub fn document(&self) -> Option<&DocumentStyleTree> {
        match &self.content {
            ArtifactContent::Document(tree) => Some(tree),
            ArtifactContent::Stylesheet(_) => None,
        }
    }

    /// Groups `provenance` by token id.
    pub fn bindings_of(provenance: &BTreeMap<RuleKey, String>) -> BTreeMap<String, BTreeSet<RuleKey>> {
        let mut out: BTreeMap<String, BTreeSet<RuleKey>> = BTreeMap::new();
        for (key, token_id) in provenance {
            out.entry(token_id.clone()).or_default().insert(key.clone());
        }
        out
    }

    /// Rule locations bound to `token_id`.
    pub fn locations_of<'a>(&'a self, token_id: &'a str) -> impl Iterator<Item = &'a RuleKey> + 'a {
        self.rule_provenance
            .iter()
            .filter(move |(_, t)| t.as_str() == token_id)
            .map(|(k, _)| k)
    }
}
