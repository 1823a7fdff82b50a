// Compilation Orchestrator: resolve → convert → compile ×3 → validate.
// Compiles run concurrently via spawn_blocking; outputs go to fixed paths.

pub mod artifact;
pub mod orchestrator;
pub mod writer;

pub use orchestrator::{build_all, BuildError, BuildMode};
pub use writer::{remove_stale_stylesheets, write_artifacts, write_report};
