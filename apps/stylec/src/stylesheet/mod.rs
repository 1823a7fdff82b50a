// Stylesheet Compiler: template layers + tokens → preview and print stylesheets.
// The cascade is resolved here, so emitted files contain exactly one winning
// declaration per selector/property.

pub mod cascade;
pub mod compiler;
pub mod parse;
pub mod template;

pub use compiler::compile;
