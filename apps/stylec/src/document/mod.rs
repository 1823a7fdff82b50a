// Document Style Mapper: tokens → structured word-processor styles.
// Reads converted lengths only; quantizes to twips / half-points / eighth-points.

pub mod content;
pub mod mapper;
pub mod model;
pub mod template;

pub use mapper::compile;
