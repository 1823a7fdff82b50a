//! Consistency Validator: compares every shared token across compiled artifacts.
//!
//! A token is shared when at least two targets bind it. Bindings are read from the
//! templates before the cascade, so a declaration that a literal later overrode
//! still counts. Stylesheet targets also inherit the bindings of the built-in
//! templates, which keeps a token in the check set when a custom template replaced
//! its only placeholder with a literal.
//!
//! Each stylesheet location any of those bindings names is read back from every
//! stylesheet artifact. A location whose emitted value came from a different
//! token is skipped for this one. Document fields are read from the document
//! artifact's own provenance.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::document::model::DocumentStyleTree;
use crate::errors::StyleError;
use crate::pipeline::artifact::{ArtifactContent, CompiledArtifact, RuleKey, Target};
use crate::stylesheet::cascade::Cascade;
use crate::stylesheet::template::TemplateSet;
use crate::tokens::snapshot::TokenSnapshot;
use crate::validate::measure::{measure_document, measure_stylesheet};
use crate::validate::report::{
    ConsistencyCheck, DivergenceReport, MeasuredValue, Measurement, PairVerdict,
    RenderCheckStatus, Verdict,
};

/// Largest acceptable spread of a length token across targets.
pub const DEFAULT_TOLERANCE_CM: f64 = 0.01;

/// Float noise allowance on top of the tolerance.
const EPSILON: f64 = 1e-9;

enum Parsed<'a> {
    Stylesheet(Cascade),
    Document(&'a DocumentStyleTree),
}

/// Validates `artifacts` compiled from `snapshot`. The render check is left `Disabled`.
pub fn validate(
    artifacts: &[CompiledArtifact],
    snapshot: &TokenSnapshot,
    tolerance_cm: f64,
) -> Result<DivergenceReport, StyleError> {
    if !(tolerance_cm >= 0.0 && tolerance_cm.is_finite()) {
        return Err(StyleError::Internal(format!(
            "tolerance must be a non-negative length, got {tolerance_cm}"
        )));
    }

    let mut parsed = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        if artifact.snapshot_version != *snapshot.version() {
            return Err(StyleError::Internal(format!(
                "{} artifact was compiled from {}, expected {}",
                artifact.target,
                artifact.snapshot_version,
                snapshot.version()
            )));
        }
        let p = match &artifact.content {
            ArtifactContent::Stylesheet(css) => {
                Parsed::Stylesheet(Cascade::from_emitted(&format!("{}.css", artifact.target), css)?)
            }
            ArtifactContent::Document(tree) => Parsed::Document(tree),
        };
        parsed.push((artifact, p));
    }

    let builtin = TemplateSet::builtin()?;
    let expected: BTreeMap<Target, BTreeMap<String, BTreeSet<RuleKey>>> = Target::ALL
        .into_iter()
        .filter_map(|target| builtin.for_target(target).map(|t| (target, t.bindings())))
        .collect();

    let mut consumers: BTreeMap<&str, BTreeSet<Target>> = BTreeMap::new();
    let mut stylesheet_points: BTreeMap<&str, BTreeSet<&RuleKey>> = BTreeMap::new();
    for artifact in artifacts {
        let declared = artifact.bindings.iter();
        let inherited = expected.get(&artifact.target).into_iter().flatten();
        for (token_id, keys) in declared.chain(inherited) {
            consumers
                .entry(token_id.as_str())
                .or_default()
                .insert(artifact.target);
            if artifact.target.is_stylesheet() {
                stylesheet_points
                    .entry(token_id.as_str())
                    .or_default()
                    .extend(keys);
            }
        }
    }

    let mut checks = Vec::new();
    for token in snapshot.tokens() {
        let shared = consumers
            .get(token.id.as_str())
            .is_some_and(|targets| targets.len() >= 2);
        if !shared {
            continue;
        }

        let mut measurements = Vec::new();
        for (artifact, p) in &parsed {
            match p {
                Parsed::Stylesheet(cascade) => {
                    let points = stylesheet_points.get(token.id.as_str());
                    for key in points.into_iter().flatten() {
                        let rebound = artifact
                            .rule_provenance
                            .get(*key)
                            .is_some_and(|bound| *bound != token.id);
                        if rebound {
                            continue;
                        }
                        if let Some((raw, value)) = measure_stylesheet(cascade, key) {
                            measurements.push(Measurement {
                                target: artifact.target,
                                location: (*key).clone(),
                                raw,
                                value,
                            });
                        }
                    }
                }
                Parsed::Document(tree) => {
                    for key in artifact.locations_of(&token.id) {
                        if let Some((raw, value)) = measure_document(tree, key) {
                            measurements.push(Measurement {
                                target: artifact.target,
                                location: key.clone(),
                                raw,
                                value,
                            });
                        }
                    }
                }
            }
        }

        let values: Vec<&MeasuredValue> = measurements.iter().map(|m| &m.value).collect();
        let (verdict, max_delta_cm) = compare(&values, tolerance_cm);
        debug!(
            token = %token.id,
            measurements = measurements.len(),
            verdict = ?verdict,
            "Token checked"
        );
        checks.push(ConsistencyCheck {
            token_id: token.id.clone(),
            role: token.role.clone(),
            measurements,
            verdict,
            max_delta_cm,
        });
    }

    let targets: Vec<Target> = artifacts.iter().map(|a| a.target).collect();
    let mut pairs = Vec::new();
    for (i, &a) in targets.iter().enumerate() {
        for &b in &targets[i + 1..] {
            pairs.push(pair_verdict(&checks, a, b, tolerance_cm));
        }
    }

    let report = DivergenceReport {
        snapshot_version: snapshot.version().clone(),
        tolerance_cm,
        verdict: Verdict::Consistent,
        checks,
        pairs,
        render: RenderCheckStatus::Disabled,
    }
    .with_render(RenderCheckStatus::Disabled);

    info!(
        snapshot = %report.snapshot_version,
        shared_tokens = report.checks.len(),
        verdict = ?report.verdict,
        "Consistency validation complete"
    );
    Ok(report)
}

fn pair_verdict(checks: &[ConsistencyCheck], a: Target, b: Target, tolerance_cm: f64) -> PairVerdict {
    let offending_token_ids: Vec<String> = checks
        .iter()
        .filter(|check| {
            let values: Vec<&MeasuredValue> = check
                .measurements
                .iter()
                .filter(|m| m.target == a || m.target == b)
                .map(|m| &m.value)
                .collect();
            let has_both = check.measurements.iter().any(|m| m.target == a)
                && check.measurements.iter().any(|m| m.target == b);
            has_both && compare(&values, tolerance_cm).0 == Verdict::Divergent
        })
        .map(|check| check.token_id.clone())
        .collect();
    PairVerdict {
        a,
        b,
        verdict: if offending_token_ids.is_empty() {
            Verdict::Consistent
        } else {
            Verdict::Divergent
        },
        offending_token_ids,
    }
}

/// Verdict over a set of measurements, plus the spread when they are all lengths.
pub fn compare(values: &[&MeasuredValue], tolerance_cm: f64) -> (Verdict, Option<f64>) {
    let verdict = |ok: bool| {
        if ok {
            Verdict::Consistent
        } else {
            Verdict::Divergent
        }
    };

    if values
        .iter()
        .any(|v| matches!(v, MeasuredValue::Unmeasurable { .. }))
    {
        return (Verdict::Divergent, None);
    }
    let Some(first) = values.first() else {
        return (Verdict::Consistent, None);
    };

    let lengths: Vec<f64> = values
        .iter()
        .filter_map(|v| match v {
            MeasuredValue::Length { cm } => Some(*cm),
            _ => None,
        })
        .collect();
    if !lengths.is_empty() {
        if lengths.len() != values.len() {
            return (Verdict::Divergent, None);
        }
        let min = lengths.iter().copied().fold(f64::INFINITY, f64::min);
        let max = lengths.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let delta = max - min;
        return (verdict(delta <= tolerance_cm + EPSILON), Some(delta));
    }

    let all_agree = values.iter().all(|v| match (first, v) {
        (MeasuredValue::Number { value: a }, MeasuredValue::Number { value: b }) => {
            (a - b).abs() <= EPSILON
        }
        (a, b) => a == b,
    });
    (verdict(all_agree), None)
}
