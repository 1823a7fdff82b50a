//! Compilation Orchestrator: one build of every target from one snapshot.
//!
//! # Stages
//! resolve → convert → {compile preview, compile print, compile document} → validate
//!
//! # spawn_blocking pattern
//! The three compiles are pure and CPU-bound. Each runs in `spawn_blocking` over
//! `Arc`-shared inputs; all three are awaited before any result is inspected, so
//! errors always surface in stage order regardless of which task finished first.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::document::template::DocumentTemplate;
use crate::errors::StyleError;
use crate::pipeline::artifact::{CompiledArtifact, RulesTemplate, Target, TargetDescriptor};
use crate::stylesheet::template::TemplateSet;
use crate::tokens::resolve::resolve;
use crate::tokens::snapshot::TokenSnapshot;
use crate::units::convert_snapshot;
use crate::validate::probe::{run_render_check, RenderProbe, StaticLayoutProbe};
use crate::validate::report::{DivergenceReport, Verdict};
use crate::validate::validator::{validate, DEFAULT_TOLERANCE_CM};

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(2000);

// ────────────────────────────────────────────────────────────────────────────
// Options
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildMode {
    /// Divergence fails the build.
    #[default]
    Strict,
    /// Divergence is logged and reported; artifacts are still produced.
    Lenient,
}

impl FromStr for BuildMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(BuildMode::Strict),
            "lenient" => Ok(BuildMode::Lenient),
            other => Err(format!("unknown build mode '{other}' (expected strict or lenient)")),
        }
    }
}

#[derive(Clone)]
pub struct BuildOptions {
    pub mode: BuildMode,
    pub tolerance_cm: f64,
    pub templates: TemplateSet,
    pub document_template: DocumentTemplate,
    /// `None` disables the render check.
    pub probe: Option<Arc<dyn RenderProbe>>,
    pub probe_timeout: Duration,
}

impl BuildOptions {
    /// Built-in templates, strict mode, default tolerance, static layout probe.
    pub fn builtin() -> Result<Self, StyleError> {
        Ok(BuildOptions {
            mode: BuildMode::Strict,
            tolerance_cm: DEFAULT_TOLERANCE_CM,
            templates: TemplateSet::builtin()?,
            document_template: DocumentTemplate::builtin()?,
            probe: Some(Arc::new(StaticLayoutProbe::default())),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors and output
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolve,
    Convert,
    CompilePreview,
    CompilePrint,
    CompileDocument,
    Validate,
}

impl Stage {
    fn compile(target: Target) -> Self {
        match target {
            Target::Preview => Stage::CompilePreview,
            Target::Print => Stage::CompilePrint,
            Target::Document => Stage::CompileDocument,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Resolve => "resolve",
            Stage::Convert => "convert",
            Stage::CompilePreview => "compile-preview",
            Stage::CompilePrint => "compile-print",
            Stage::CompileDocument => "compile-document",
            Stage::Validate => "validate",
        })
    }
}

#[derive(Debug, Error)]
#[error("build failed at {stage}: {source}")]
pub struct BuildError {
    pub stage: Stage,
    #[source]
    pub source: StyleError,
}

impl BuildError {
    fn at(stage: Stage) -> impl Fn(StyleError) -> BuildError {
        move |source| BuildError { stage, source }
    }

    pub fn exit_code(&self) -> u8 {
        self.source.exit_code()
    }

    /// The divergence report of a strict-mode consistency failure.
    pub fn report(&self) -> Option<&DivergenceReport> {
        match &self.source {
            StyleError::ConsistencyDivergence { report } => Some(report.as_ref()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// In target order: preview, print, document.
    pub artifacts: Vec<CompiledArtifact>,
    pub report: DivergenceReport,
}

impl BuildOutput {
    pub fn artifact(&self, target: Target) -> Option<&CompiledArtifact> {
        self.artifacts.iter().find(|a| a.target == target)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Build
// ────────────────────────────────────────────────────────────────────────────

/// Compiles every target from `snapshot` and validates the results.
pub async fn build_all(
    snapshot: Arc<TokenSnapshot>,
    options: &BuildOptions,
) -> Result<BuildOutput, BuildError> {
    let build_id = Uuid::new_v4();
    let span = info_span!("build", %build_id, snapshot = %snapshot.version());
    run_build(snapshot, options).instrument(span).await
}

async fn run_build(
    snapshot: Arc<TokenSnapshot>,
    options: &BuildOptions,
) -> Result<BuildOutput, BuildError> {
    info!(tokens = snapshot.len(), mode = ?options.mode, "Build started");

    for token in snapshot.tokens() {
        resolve(&snapshot, &token.id).map_err(BuildError::at(Stage::Resolve))?;
    }

    let converted = Arc::new(convert_snapshot(&snapshot).map_err(BuildError::at(Stage::Convert))?);
    debug!(lengths = converted.len(), "Lengths converted to cm");

    // Independent compiles; spawn_blocking keeps the runtime free while they run.
    let descriptors = TargetDescriptor::standard_set(&options.templates, &options.document_template);
    let handles: Vec<_> = descriptors
        .into_iter()
        .map(|descriptor| {
            let snapshot = Arc::clone(&snapshot);
            let converted = Arc::clone(&converted);
            let stage = Stage::compile(descriptor.target);
            debug!(
                target = %descriptor.target,
                unit_system = ?descriptor.unit_system,
                "Compiling target"
            );
            let handle = tokio::task::spawn_blocking(move || match descriptor.rules_template {
                RulesTemplate::Stylesheet(template) => {
                    crate::stylesheet::compile(&snapshot, &converted, &template)
                }
                RulesTemplate::Document(template) => {
                    crate::document::compile(&snapshot, &converted, &template)
                }
            });
            (stage, handle)
        })
        .collect();

    // Barrier: every compile finishes before any outcome is inspected.
    let mut joined = Vec::with_capacity(handles.len());
    for (stage, handle) in handles {
        joined.push((stage, handle.await));
    }

    let mut artifacts = Vec::with_capacity(joined.len());
    for (stage, outcome) in joined {
        let compiled = outcome.map_err(|e| BuildError {
            stage,
            source: StyleError::Internal(format!("spawn_blocking failed in {stage}: {e}")),
        })?;
        artifacts.push(compiled.map_err(BuildError::at(stage))?);
    }

    let mut report = validate(&artifacts, &snapshot, options.tolerance_cm)
        .map_err(BuildError::at(Stage::Validate))?;
    if let Some(probe) = &options.probe {
        let render = run_render_check(
            probe.as_ref(),
            &artifacts,
            options.probe_timeout,
            options.tolerance_cm,
        )
        .await;
        report = report.with_render(render);
    }

    if !report.is_consistent() {
        log_divergences(&report);
        if options.mode == BuildMode::Strict {
            return Err(BuildError {
                stage: Stage::Validate,
                source: StyleError::ConsistencyDivergence {
                    report: Box::new(report),
                },
            });
        }
    }

    info!(
        artifacts = artifacts.len(),
        verdict = ?report.verdict,
        summary = %report.summary_line(),
        "Build complete"
    );
    Ok(BuildOutput { artifacts, report })
}

/// One warning per divergent token (with every measured value) and per divergent box.
fn log_divergences(report: &DivergenceReport) {
    for check in report.checks.iter().filter(|c| c.verdict == Verdict::Divergent) {
        let measured: Vec<String> = check
            .measurements
            .iter()
            .map(|m| format!("{} {} = {}", m.target, m.location, m.value))
            .collect();
        warn!(
            token = %check.token_id,
            role = %check.role,
            measured = %measured.join("; "),
            "Token diverges across targets"
        );
    }
    for check in report.divergent_boxes() {
        let measured: Vec<String> = check
            .measurements
            .iter()
            .map(|m| format!("{} = {:.4}cm", m.target, m.left_cm))
            .collect();
        warn!(
            element = %check.element,
            measured = %measured.join("; "),
            "Rendered box diverges across targets"
        );
    }
}
