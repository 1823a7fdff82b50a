//! Render probes: optional layout measurement of compiled artifacts.
//!
//! Token checks compare emitted values. A probe instead measures where content
//! actually starts, which also catches untokenized rules that shift a box.
//!
//! `StaticLayoutProbe` is the default backend: it computes the left edge of each
//! content kind from the flat rule set (`margin-left + padding-left`) or from the
//! paragraph indent. Probes are held as `Arc<dyn RenderProbe>` so a browser-backed
//! implementation can be swapped in from config.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::document::content::ContentBlock;
use crate::document::model::Twips;
use crate::errors::StyleError;
use crate::pipeline::artifact::{ArtifactContent, CompiledArtifact};
use crate::stylesheet::cascade::Cascade;
use crate::validate::measure::length_or_zero;
use crate::validate::report::{BoxCheck, BoxMeasurement, RenderCheckStatus, Verdict};

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait RenderProbe: Send + Sync {
    fn name(&self) -> &str;

    /// Left edge of every probed element in `artifact`.
    async fn measure(&self, artifact: &CompiledArtifact) -> Result<Vec<BoxMeasurement>, StyleError>;
}

// ────────────────────────────────────────────────────────────────────────────
// StaticLayoutProbe
// ────────────────────────────────────────────────────────────────────────────

pub struct StaticLayoutProbe {
    content: Vec<ContentBlock>,
}

impl StaticLayoutProbe {
    pub fn new(content: Vec<ContentBlock>) -> Self {
        StaticLayoutProbe { content }
    }
}

impl Default for StaticLayoutProbe {
    fn default() -> Self {
        Self::new(ContentBlock::sample())
    }
}

#[async_trait]
impl RenderProbe for StaticLayoutProbe {
    fn name(&self) -> &str {
        "static-layout"
    }

    async fn measure(&self, artifact: &CompiledArtifact) -> Result<Vec<BoxMeasurement>, StyleError> {
        let mut out: Vec<BoxMeasurement> = Vec::new();
        match &artifact.content {
            ArtifactContent::Stylesheet(css) => {
                let cascade = Cascade::from_emitted(&format!("{}.css", artifact.target), css)?;
                for block in &self.content {
                    let selector = block.kind().selector();
                    if out.iter().any(|m| m.element == selector) {
                        continue;
                    }
                    let edge = length_or_zero(&cascade, selector, "margin-left")
                        .and_then(|m| Ok(m + length_or_zero(&cascade, selector, "padding-left")?))
                        .map_err(|reason| {
                            StyleError::Internal(format!("{} {selector}: {reason}", artifact.target))
                        })?;
                    out.push(BoxMeasurement {
                        target: artifact.target,
                        element: selector.to_string(),
                        left_cm: edge,
                    });
                }
            }
            ArtifactContent::Document(tree) => {
                for block in &self.content {
                    let selector = block.kind().selector();
                    if out.iter().any(|m| m.element == selector) {
                        continue;
                    }
                    let left_cm = tree
                        .paragraph_for(block)
                        .and_then(|p| p.indent_left)
                        .map(Twips::to_cm)
                        .unwrap_or(0.0);
                    out.push(BoxMeasurement {
                        target: artifact.target,
                        element: selector.to_string(),
                        left_cm,
                    });
                }
            }
        }
        Ok(out)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Render check
// ────────────────────────────────────────────────────────────────────────────

/// Runs `probe` over every artifact within `timeout`.
///
/// A probe failure or timeout never fails the build; the check is reported as
/// skipped instead.
pub async fn run_render_check(
    probe: &dyn RenderProbe,
    artifacts: &[CompiledArtifact],
    timeout: Duration,
    tolerance_cm: f64,
) -> RenderCheckStatus {
    let measured = tokio::time::timeout(timeout, async {
        let mut all = Vec::new();
        for artifact in artifacts {
            all.extend(probe.measure(artifact).await?);
        }
        Ok::<_, StyleError>(all)
    })
    .await;

    let measurements = match measured {
        Ok(Ok(m)) => m,
        Ok(Err(e)) => {
            warn!(probe = probe.name(), error = %e, "Render probe failed; check skipped");
            return RenderCheckStatus::Skipped {
                reason: format!("{} failed: {e}", probe.name()),
            };
        }
        Err(_) => {
            warn!(
                probe = probe.name(),
                timeout_ms = timeout.as_millis() as u64,
                "Render probe timed out; check skipped"
            );
            return RenderCheckStatus::Skipped {
                reason: format!(
                    "{} timed out after {}ms",
                    probe.name(),
                    timeout.as_millis()
                ),
            };
        }
    };

    let mut order: Vec<String> = Vec::new();
    let mut by_element: BTreeMap<String, Vec<BoxMeasurement>> = BTreeMap::new();
    for m in measurements {
        if !by_element.contains_key(&m.element) {
            order.push(m.element.clone());
        }
        by_element.entry(m.element.clone()).or_default().push(m);
    }

    let checks: Vec<BoxCheck> = order
        .into_iter()
        .filter_map(|element| {
            let measurements = by_element.remove(&element)?;
            let min = measurements.iter().map(|m| m.left_cm).fold(f64::INFINITY, f64::min);
            let max = measurements
                .iter()
                .map(|m| m.left_cm)
                .fold(f64::NEG_INFINITY, f64::max);
            let max_delta_cm = max - min;
            let verdict = if max_delta_cm <= tolerance_cm + 1e-9 {
                Verdict::Consistent
            } else {
                Verdict::Divergent
            };
            Some(BoxCheck {
                element,
                measurements,
                verdict,
                max_delta_cm,
            })
        })
        .collect();

    info!(
        probe = probe.name(),
        elements = checks.len(),
        divergent = checks.iter().filter(|c| c.verdict == Verdict::Divergent).count(),
        "Render check complete"
    );
    RenderCheckStatus::Ran {
        probe: probe.name().to_string(),
        checks,
    }
}
