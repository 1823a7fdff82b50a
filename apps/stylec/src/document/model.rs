//! Word-processor style objects.
//!
//! Lengths are quantized the way word processors store them: paragraph spacing and
//! indents in twips (1/20 pt), run sizes in half-points, border widths in
//! eighth-points. Quantization happens once, at mapping time, from the converted
//! `cm` value; the tree never sees a font-relative number.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::tokens::model::LengthUnit;
use crate::tokens::snapshot::SnapshotVersion;
use crate::units::{points_to, to_points};

// ────────────────────────────────────────────────────────────────────────────
// Quantized lengths
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Twips(pub i32);

impl Twips {
    pub fn from_cm(cm: f64) -> Self {
        Twips((to_points(cm, LengthUnit::Cm) * 20.0).round() as i32)
    }

    pub fn to_cm(self) -> f64 {
        points_to(LengthUnit::Cm, f64::from(self.0) / 20.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HalfPoints(pub u32);

impl HalfPoints {
    pub fn from_cm(cm: f64) -> Self {
        HalfPoints((to_points(cm, LengthUnit::Cm) * 2.0).round().max(0.0) as u32)
    }

    pub fn to_cm(self) -> f64 {
        points_to(LengthUnit::Cm, f64::from(self.0) / 2.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EighthPoints(pub u32);

impl EighthPoints {
    pub fn from_cm(cm: f64) -> Self {
        EighthPoints((to_points(cm, LengthUnit::Cm) * 8.0).round().max(0.0) as u32)
    }

    pub fn to_cm(self) -> f64 {
        points_to(LengthUnit::Cm, f64::from(self.0) / 8.0)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Styles
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

impl Alignment {
    pub fn as_str(self) -> &'static str {
        match self {
            Alignment::Left => "left",
            Alignment::Center => "center",
            Alignment::Right => "right",
            Alignment::Justify => "justify",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BorderEdge {
    Top,
    Bottom,
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParagraphStyle {
    pub alignment: Alignment,
    pub spacing_before: Option<Twips>,
    pub spacing_after: Option<Twips>,
    pub indent_left: Option<Twips>,
    /// Hanging indent of the first line (bullet glyph sits in this gap).
    pub indent_hanging: Option<Twips>,
    pub bullet: Option<String>,
    /// Name of the run style applied to the paragraph text.
    pub run: Option<String>,
    pub border: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStyle {
    pub typeface: String,
    pub size: HalfPoints,
    pub weight: Option<u16>,
    pub italic: bool,
    /// `rrggbb`, no leading `#`.
    pub color: String,
}

impl RunStyle {
    pub fn bold(&self) -> bool {
        self.weight.is_some_and(|w| w >= 600)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BorderSpec {
    pub edges: Vec<BorderEdge>,
    pub width: EighthPoints,
    /// `rrggbb`, no leading `#`.
    pub color: String,
    pub fill: Option<String>,
}

/// A value read back out of the tree, in comparable units.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Length { cm: f64 },
    /// `#rrggbb`.
    Color(String),
    Text(String),
    Number(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentStyleTree {
    pub snapshot_version: SnapshotVersion,
    pub paragraphs: BTreeMap<String, ParagraphStyle>,
    pub runs: BTreeMap<String, RunStyle>,
    pub borders: BTreeMap<String, BorderSpec>,
}

impl DocumentStyleTree {
    /// Reads `field` of the style named by `scope` (`paragraph.X`, `run.X`, `border.X`).
    pub fn field(&self, scope: &str, field: &str) -> Option<FieldValue> {
        let (kind, name) = scope.split_once('.')?;
        match kind {
            "paragraph" => {
                let p = self.paragraphs.get(name)?;
                let twips = |t: Option<Twips>| t.map(|t| FieldValue::Length { cm: t.to_cm() });
                match field {
                    "alignment" => Some(FieldValue::Text(p.alignment.as_str().to_string())),
                    "spacing_before" => twips(p.spacing_before),
                    "spacing_after" => twips(p.spacing_after),
                    "indent_left" => twips(p.indent_left),
                    "indent_hanging" => twips(p.indent_hanging),
                    "bullet" => p.bullet.clone().map(FieldValue::Text),
                    _ => None,
                }
            }
            "run" => {
                let r = self.runs.get(name)?;
                match field {
                    "typeface" => Some(FieldValue::Text(r.typeface.clone())),
                    "size" => Some(FieldValue::Length { cm: r.size.to_cm() }),
                    "weight" => r.weight.map(|w| FieldValue::Number(f64::from(w))),
                    "bold" => Some(FieldValue::Text(r.bold().to_string())),
                    "italic" => Some(FieldValue::Text(r.italic.to_string())),
                    "color" => Some(FieldValue::Color(format!("#{}", r.color))),
                    _ => None,
                }
            }
            "border" => {
                let b = self.borders.get(name)?;
                match field {
                    "width" => Some(FieldValue::Length { cm: b.width.to_cm() }),
                    "color" => Some(FieldValue::Color(format!("#{}", b.color))),
                    "fill" => b.fill.as_ref().map(|f| FieldValue::Color(format!("#{f}"))),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}
