//! Divergence report: per-token verdicts, per-target-pair verdicts and the optional
//! rendered layout check. Serialized verbatim into `report.json`.

use std::fmt;

use serde::Serialize;

use crate::pipeline::artifact::{RuleKey, Target};
use crate::tokens::snapshot::SnapshotVersion;
use crate::units::format_number;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Consistent,
    Divergent,
}

/// A value read back out of an artifact, normalized for comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MeasuredValue {
    Length { cm: f64 },
    /// Lowercase `#rrggbb`.
    Color { hex: String },
    Number { value: f64 },
    Text { value: String },
    /// The value could not be interpreted; always divergent.
    Unmeasurable { reason: String },
}

impl fmt::Display for MeasuredValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeasuredValue::Length { cm } => write!(f, "{}cm", format_number(*cm)),
            MeasuredValue::Color { hex } => f.write_str(hex),
            MeasuredValue::Number { value } => f.write_str(&format_number(*value)),
            MeasuredValue::Text { value } => write!(f, "'{value}'"),
            MeasuredValue::Unmeasurable { reason } => write!(f, "unmeasurable ({reason})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub target: Target,
    pub location: RuleKey,
    /// Value as emitted, before normalization.
    pub raw: String,
    pub value: MeasuredValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsistencyCheck {
    pub token_id: String,
    pub role: String,
    pub measurements: Vec<Measurement>,
    pub verdict: Verdict,
    /// Spread of length measurements; `None` for non-length tokens.
    pub max_delta_cm: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairVerdict {
    pub a: Target,
    pub b: Target,
    pub verdict: Verdict,
    pub offending_token_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxMeasurement {
    pub target: Target,
    /// Element selector, e.g. `.bullets li`.
    pub element: String,
    /// Left edge of the text box relative to the content box.
    pub left_cm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxCheck {
    pub element: String,
    pub measurements: Vec<BoxMeasurement>,
    pub verdict: Verdict,
    pub max_delta_cm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RenderCheckStatus {
    Disabled,
    Skipped { reason: String },
    Ran { probe: String, checks: Vec<BoxCheck> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DivergenceReport {
    pub snapshot_version: SnapshotVersion,
    pub tolerance_cm: f64,
    pub verdict: Verdict,
    pub checks: Vec<ConsistencyCheck>,
    pub pairs: Vec<PairVerdict>,
    pub render: RenderCheckStatus,
}

impl DivergenceReport {
    pub fn is_consistent(&self) -> bool {
        self.verdict == Verdict::Consistent
    }

    /// Ids of tokens with a divergent check, in check order.
    pub fn offending_token_ids(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|c| c.verdict == Verdict::Divergent)
            .map(|c| c.token_id.as_str())
            .collect()
    }

    pub fn divergent_boxes(&self) -> Vec<&BoxCheck> {
        match &self.render {
            RenderCheckStatus::Ran { checks, .. } => checks
                .iter()
                .filter(|c| c.verdict == Verdict::Divergent)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Attaches the outcome of the render check and recomputes the overall verdict.
    pub fn with_render(mut self, render: RenderCheckStatus) -> Self {
        self.render = render;
        self.verdict = if self.offending_token_ids().is_empty() && self.divergent_boxes().is_empty()
        {
            Verdict::Consistent
        } else {
            Verdict::Divergent
        };
        self
    }

    pub fn summary_line(&self) -> String {
        let offending = self.offending_token_ids();
        let boxes = self.divergent_boxes();
        if offending.is_empty() && boxes.is_empty() {
            return format!(
                "{} shared tokens consistent within {}cm",
                self.checks.len(),
                format_number(self.tolerance_cm)
            );
        }
        let mut parts = Vec::new();
        if !offending.is_empty() {
            parts.push(format!(
                "{} of {} shared tokens diverge ({})",
                offending.len(),
                self.checks.len(),
                offending.join(", ")
            ));
        }
        if !boxes.is_empty() {
            let elements: Vec<&str> = boxes.iter().map(|b| b.element.as_str()).collect();
            parts.push(format!("rendered boxes differ for {}", elements.join(", ")));
        }
        parts.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(id: &str, verdict: Verdict) -> ConsistencyCheck {
        ConsistencyCheck {
            token_id: id.into(),
            role: id.into(),
            measurements: Vec::new(),
            verdict,
            max_delta_cm: None,
        }
    }

    fn report(checks: Vec<ConsistencyCheck>) -> DivergenceReport {
        DivergenceReport {
            snapshot_version: SnapshotVersion {
                sequence: 1,
                digest: "0".repeat(16),
            },
            tolerance_cm: 0.01,
            verdict: Verdict::Consistent,
            checks,
            pairs: Vec::new(),
            render: RenderCheckStatus::Disabled,
        }
        .with_render(RenderCheckStatus::Disabled)
    }

    #[test]
    fn test_summary_lists_offending_tokens() {
        let r = report(vec![
            check("spacing.section-gap", Verdict::Divergent),
            check("color.text", Verdict::Consistent),
        ]);
        assert!(!r.is_consistent());
        assert_eq!(r.offending_token_ids(), vec!["spacing.section-gap"]);
        assert_eq!(
            r.summary_line(),
            "1 of 2 shared tokens diverge (spacing.section-gap)"
        );
    }

    #[test]
    fn test_divergent_box_makes_report_divergent() {
        let r = report(vec![check("a", Verdict::Consistent)]);
        assert!(r.is_consistent());
        assert_eq!(r.summary_line(), "1 shared tokens consistent within 0.01cm");

        let r = r.with_render(RenderCheckStatus::Ran {
            probe: "static-layout".into(),
            checks: vec![BoxCheck {
                element: ".bullets li".into(),
                measurements: Vec::new(),
                verdict: Verdict::Divergent,
                max_delta_cm: 0.6,
            }],
        });
        assert!(!r.is_consistent());
        assert!(r.summary_line().contains("rendered boxes differ for .bullets li"));
    }

    #[test]
    fn test_skipped_render_check_does_not_fail() {
        let r = report(vec![]).with_render(RenderCheckStatus::Skipped {
            reason: "probe timed out".into(),
        });
        assert!(r.is_consistent());
    }

    #[test]
    fn test_measured_value_display() {
        assert_eq!(MeasuredValue::Length { cm: 0.388056 }.to_string(), "0.3881cm");
        assert_eq!(
            MeasuredValue::Text {
                value: "Inter".into()
            }
            .to_string(),
            "'Inter'"
        );
    }
}
