// Unit Converter: derives absolute lengths from font-relative ones.
// Pure functions only; the same (token, font metric) always yields the same bits.

pub mod convert;
pub mod font_metrics;

pub use convert::{
    convert_snapshot, format_number, points_to, to_points, ConvertedTokens, CM_PER_PT,
};
